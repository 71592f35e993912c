//! PKCS#10 certification requests.
//!
//! A [`CertificationRequest`] is consumed by
//! [`Certificate::from_request`](crate::certificate::Certificate::from_request)
//! and is never modified by it. [`RequestBuilder`] creates and self-signs new
//! requests from a slash-notation subject.

use std::io::{Read, Seek, Write};

use der::asn1::{Any, BitString, SetOfVec};
use der::{Decode, Encode};
use openssl::pkey::{PKey, PKeyRef, Private, Public};
use x509_cert::attr::Attribute;
use x509_cert::ext::Extension;
use x509_cert::name::Name;
use x509_cert::request::{CertReq, CertReqInfo, Version};

use crate::algorithms;
use crate::data_format::{self, DataFormat};
use crate::error::{PkiError, Result};
use crate::extensions::ExtensionCollection;
use crate::name_codec;
use crate::oids;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificationRequest {
    inner: CertReq,
}

impl CertificationRequest {
    pub fn from_der(der: &[u8]) -> Result<Self> {
        Self::import(der, DataFormat::Der)
    }

    pub fn from_pem(pem: &str) -> Result<Self> {
        Self::import(pem.as_bytes(), DataFormat::Base64)
    }

    pub fn import(bytes: &[u8], format: DataFormat) -> Result<Self> {
        crate::init();
        let inner = data_format::decode::<CertReq>(bytes, format, data_format::REQUEST)?;
        Ok(Self { inner })
    }

    /// Rewind `source` and decode it.
    pub fn read<R: Read + Seek>(source: &mut R, format: DataFormat) -> Result<Self> {
        let bytes = data_format::read_all(source)?;
        Self::import(&bytes, format)
    }

    pub fn export(&self, format: DataFormat) -> Result<Vec<u8>> {
        data_format::encode(&self.inner, format, data_format::REQUEST)
    }

    pub fn write<W: Write>(&self, sink: &mut W, format: DataFormat) -> Result<()> {
        let bytes = self.export(format)?;
        data_format::write_all(sink, &bytes)
    }

    pub fn to_der(&self) -> Result<Vec<u8>> {
        self.export(DataFormat::Der)
    }

    pub(crate) fn inner(&self) -> &CertReq {
        &self.inner
    }

    pub fn version(&self) -> u8 {
        match self.inner.info.version {
            Version::V1 => 0,
        }
    }

    pub fn subject(&self) -> &Name {
        &self.inner.info.subject
    }

    pub fn subject_name(&self) -> String {
        name_codec::format_name(&self.inner.info.subject)
    }

    /// Whether the request carries key material.
    pub fn has_public_key(&self) -> bool {
        !self
            .inner
            .info
            .public_key
            .subject_public_key
            .raw_bytes()
            .is_empty()
    }

    pub fn public_key(&self) -> Result<PKey<Public>> {
        algorithms::public_key_from_spki(&self.inner.info.public_key)
    }

    /// Extensions from the PKCS#9 extensionRequest attribute; empty when absent.
    pub fn extensions(&self) -> Result<ExtensionCollection> {
        let attribute = match self
            .inner
            .info
            .attributes
            .iter()
            .find(|attr| attr.oid == oids::EXTENSION_REQUEST)
        {
            Some(attr) => attr,
            None => return Ok(ExtensionCollection::new()),
        };

        let mut collection = ExtensionCollection::new();
        for value in attribute.values.iter() {
            let der = value
                .to_der()
                .map_err(|e| PkiError::encoding("Unable to re-encode extensionRequest", e))?;
            let extensions = Vec::<Extension>::from_der(&der)
                .map_err(|e| PkiError::parse("Invalid extensionRequest attribute", e))?;
            for ext in extensions {
                collection.push(ext);
            }
        }
        Ok(collection)
    }

    /// Check the self-signature with the enclosed public key.
    ///
    /// `Ok(false)` is a mismatch; `Err` means the check could not run.
    pub fn verify(&self) -> Result<bool> {
        let key = self.public_key()?;
        let tbs = self
            .inner
            .info
            .to_der()
            .map_err(|e| PkiError::encoding("Unable to encode request info", e))?;
        algorithms::verify(
            &key,
            &self.inner.algorithm.oid,
            &tbs,
            self.inner.signature.raw_bytes(),
        )
    }
}

/// Builder for self-signed PKCS#10 requests
///
/// ```rust,no_run
/// # use pki_store::request::RequestBuilder;
/// # fn example(key: &openssl::pkey::PKey<openssl::pkey::Private>) -> pki_store::Result<()> {
/// let csr = RequestBuilder::new()
///     .subject("/CN=test/O=Org/")
///     .digest("sha256")
///     .build(key)?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Default)]
pub struct RequestBuilder {
    subject: String,
    digest: Option<String>,
    extensions: ExtensionCollection,
}

impl RequestBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subject in slash notation.
    pub fn subject(mut self, subject: &str) -> Self {
        self.subject = subject.to_string();
        self
    }

    pub fn digest(mut self, digest: &str) -> Self {
        self.digest = Some(digest.to_string());
        self
    }

    pub fn extensions(mut self, extensions: ExtensionCollection) -> Self {
        self.extensions = extensions;
        self
    }

    pub fn build(self, key: &PKeyRef<Private>) -> Result<CertificationRequest> {
        crate::init();

        let subject = name_codec::parse_name(&self.subject)?;
        let public_key = algorithms::spki_from_key(key)?;

        let mut requested = Vec::new();
        if !self.extensions.is_empty() {
            let der = self
                .extensions
                .clone()
                .into_vec()
                .to_der()
                .map_err(|e| PkiError::encoding("Unable to encode requested extensions", e))?;
            let value = Any::from_der(&der)
                .map_err(|e| PkiError::encoding("Unable to encode requested extensions", e))?;
            let values = SetOfVec::try_from(vec![value])
                .map_err(|e| PkiError::encoding("Unable to encode requested extensions", e))?;
            requested.push(Attribute {
                oid: oids::EXTENSION_REQUEST,
                values,
            });
        }
        let attributes = SetOfVec::try_from(requested)
            .map_err(|e| PkiError::encoding("Unable to add extensionRequest attribute", e))?;

        let info = CertReqInfo {
            version: Version::V1,
            subject,
            public_key,
            attributes,
        };

        let digest = algorithms::resolve_digest(key, self.digest.as_deref())?;
        let algorithm = algorithms::signature_algorithm(key, digest)?;
        let tbs = info
            .to_der()
            .map_err(|e| PkiError::encoding("Unable to encode request info", e))?;
        let signature = algorithms::sign(key, digest, &tbs)?;
        let signature = BitString::from_bytes(&signature)
            .map_err(|e| PkiError::encoding("Unable to encode request signature", e))?;

        Ok(CertificationRequest {
            inner: CertReq {
                info,
                algorithm,
                signature,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::test_support::ec_key;
    use x509_cert::ext::pkix::BasicConstraints;

    #[test]
    fn test_build_and_verify() {
        let key = ec_key();
        let csr = RequestBuilder::new().subject("/CN=test/O=Org/").build(&key).unwrap();

        assert_eq!(csr.subject_name(), "/CN=test/O=Org");
        assert!(csr.has_public_key());
        assert!(csr.verify().unwrap());
        assert!(csr.extensions().unwrap().is_empty());
        assert_eq!(csr.version(), 0);
    }

    #[test]
    fn test_requested_extensions_survive_encoding() {
        let key = ec_key();
        let mut exts = ExtensionCollection::new();
        exts.push_value(
            true,
            &BasicConstraints {
                ca: false,
                path_len_constraint: None,
            },
        )
        .unwrap();

        let csr = RequestBuilder::new()
            .subject("/CN=ext")
            .extensions(exts)
            .build(&key)
            .unwrap();
        let decoded = CertificationRequest::from_der(&csr.to_der().unwrap()).unwrap();

        let found = decoded.extensions().unwrap();
        assert_eq!(found.len(), 1);
        assert!(found.contains(&oids::BASIC_CONSTRAINTS));
        assert!(decoded.verify().unwrap());
    }

    #[test]
    fn test_pem_read_write() {
        let key = ec_key();
        let csr = RequestBuilder::new().subject("/CN=pem").build(&key).unwrap();

        let mut out = Vec::new();
        csr.write(&mut out, DataFormat::Base64).unwrap();
        assert!(out.starts_with(b"-----BEGIN CERTIFICATE REQUEST-----"));

        let mut cursor = std::io::Cursor::new(out);
        let back = CertificationRequest::read(&mut cursor, DataFormat::Base64).unwrap();
        assert_eq!(back, csr);
    }

    #[test]
    fn test_tampered_signature_is_mismatch() {
        let key = ec_key();
        let csr = RequestBuilder::new().subject("/CN=a").build(&key).unwrap();
        let mut inner = csr.inner().clone();
        inner.info.subject = name_codec::parse_name("/CN=b").unwrap();
        let tampered = CertificationRequest { inner };
        assert!(!tampered.verify().unwrap());
    }

    #[test]
    fn test_empty_input() {
        let err = CertificationRequest::from_der(&[]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);

        let err = CertificationRequest::from_der(&[0x30, 0x01, 0x00]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Parse);
    }
}
