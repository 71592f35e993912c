//! Certificate revocation list model.

use std::cmp::Ordering;
use std::fs;
use std::io::{Read, Seek, Write};
use std::path::Path;

use const_oid::ObjectIdentifier;
use der::asn1::Int;
use der::{Decode, Encode};
use openssl::pkey::{HasPublic, PKeyRef};
use x509_cert::certificate::Version;
use x509_cert::crl::{CertificateList, RevokedCert};
use x509_cert::ext::pkix::{AuthorityKeyIdentifier, CrlReason};
use x509_cert::ext::Extension;

use crate::algorithms;
use crate::certificate::{integer_text, Certificate, NO_COMMON_NAME};
use crate::data_format::{self, DataFormat};
use crate::error::{PkiError, Result};
use crate::name_codec;
use crate::oids;
use crate::thumbprint::{self, Thumbprint};
use crate::timefmt;

/// One revoked certificate listed by a CRL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RevokedEntry {
    /// Serial in the same text form as [`Certificate::serial_number`].
    pub serial: String,
    pub revocation_date: String,
    /// CRLReason code (RFC 5280 section 5.3.1), when the entry carries one.
    pub reason: Option<u32>,
}

#[derive(Debug, Clone)]
pub struct Crl {
    inner: CertificateList,
}

impl Crl {
    pub fn from_der(der: &[u8]) -> Result<Self> {
        Self::import(der, DataFormat::Der)
    }

    pub fn from_pem(pem: &str) -> Result<Self> {
        Self::import(pem.as_bytes(), DataFormat::Base64)
    }

    pub fn import(bytes: &[u8], format: DataFormat) -> Result<Self> {
        crate::init();
        let inner = data_format::decode::<CertificateList>(bytes, format, data_format::CRL)?;
        Ok(Self { inner })
    }

    /// Rewind `source` and decode a CRL from it.
    pub fn read<R: Read + Seek>(source: &mut R, format: DataFormat) -> Result<Self> {
        let bytes = data_format::read_all(source)?;
        Self::import(&bytes, format)
    }

    pub fn load<P: AsRef<Path>>(path: P, format: DataFormat) -> Result<Self> {
        let path = path.as_ref();
        let bytes = fs::read(path)
            .map_err(|e| PkiError::io(format!("Unable to read {}", path.display()), e))?;
        Self::import(&bytes, format)
    }

    pub fn export(&self, format: DataFormat) -> Result<Vec<u8>> {
        data_format::encode(&self.inner, format, data_format::CRL)
    }

    pub fn write<W: Write>(&self, sink: &mut W, format: DataFormat) -> Result<()> {
        let bytes = self.export(format)?;
        data_format::write_all(sink, &bytes)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P, format: DataFormat) -> Result<()> {
        let path = path.as_ref();
        let bytes = self.export(format)?;
        fs::write(path, bytes)
            .map_err(|e| PkiError::io(format!("Unable to write {}", path.display()), e))
    }

    pub fn encoded(&self) -> Result<Vec<u8>> {
        self.export(DataFormat::Der)
    }

    pub fn duplicate(&self) -> Result<Self> {
        let der = self.inner.to_der().map_err(|e| PkiError::Clone {
            context: "Unable to encode CRL".to_string(),
            source: Some(Box::new(e)),
        })?;
        let inner = CertificateList::from_der(&der).map_err(|e| PkiError::Clone {
            context: "Unable to decode CRL copy".to_string(),
            source: Some(Box::new(e)),
        })?;
        Ok(Self { inner })
    }

    pub fn version(&self) -> u8 {
        match self.inner.tbs_cert_list.version {
            Version::V1 => 0,
            Version::V2 => 1,
            Version::V3 => 2,
        }
    }

    pub fn issuer_name(&self) -> String {
        name_codec::format_name(&self.inner.tbs_cert_list.issuer)
    }

    pub fn issuer_friendly_name(&self) -> String {
        name_codec::first_attribute(&self.inner.tbs_cert_list.issuer, &oids::COMMON_NAME)
            .unwrap_or_else(|| NO_COMMON_NAME.to_string())
    }

    pub fn this_update(&self) -> String {
        timefmt::format_time(&self.inner.tbs_cert_list.this_update)
    }

    /// Empty when the CRL carries no nextUpdate.
    pub fn next_update(&self) -> String {
        self.inner
            .tbs_cert_list
            .next_update
            .as_ref()
            .map(timefmt::format_time)
            .unwrap_or_default()
    }

    pub fn signature_algorithm(&self) -> String {
        algorithms::algorithm_name(&self.inner.signature_algorithm.oid)
    }

    pub fn signature_digest_algorithm(&self) -> String {
        algorithms::digest_name_for_signature(&self.inner.signature_algorithm.oid)
    }

    pub fn signature(&self) -> &[u8] {
        self.inner.signature.raw_bytes()
    }

    /// keyIdentifier of the authorityKeyIdentifier extension as lowercase hex, or `""`.
    pub fn authority_key_id(&self) -> String {
        self.extension(&oids::AUTHORITY_KEY_IDENTIFIER)
            .and_then(|ext| AuthorityKeyIdentifier::from_der(ext.extn_value.as_bytes()).ok())
            .and_then(|aki| aki.key_identifier)
            .map(|id| thumbprint::hex_encode(id.as_bytes()))
            .unwrap_or_default()
    }

    /// cRLNumber as uppercase hex, or `""` when absent.
    pub fn crl_number(&self) -> String {
        self.extension(&oids::CRL_NUMBER)
            .and_then(|ext| Int::from_der(ext.extn_value.as_bytes()).ok())
            .map(|number| integer_text(number.as_bytes()))
            .unwrap_or_default()
    }

    fn extension(&self, oid: &ObjectIdentifier) -> Option<&Extension> {
        self.inner
            .tbs_cert_list
            .crl_extensions
            .as_ref()
            .and_then(|exts| exts.iter().find(|ext| &ext.extn_id == oid))
    }

    pub fn revoked(&self) -> Vec<RevokedEntry> {
        self.revoked_certs().iter().map(revoked_entry).collect()
    }

    /// Entry for a serial written as [`Certificate::serial_number`] prints it.
    pub fn revoked_by_serial(&self, serial: &str) -> Option<RevokedEntry> {
        self.revoked_certs()
            .iter()
            .find(|rc| integer_text(rc.serial_number.as_bytes()).eq_ignore_ascii_case(serial))
            .map(revoked_entry)
    }

    /// Entry for `certificate` when it was issued by this CRL's issuer.
    pub fn revoked_by_certificate(&self, certificate: &Certificate) -> Option<RevokedEntry> {
        let tbs = &certificate.inner().tbs_certificate;
        if tbs.issuer != self.inner.tbs_cert_list.issuer {
            return None;
        }
        self.revoked_by_serial(&certificate.serial_number())
    }

    fn revoked_certs(&self) -> &[RevokedCert] {
        self.inner
            .tbs_cert_list
            .revoked_certificates
            .as_deref()
            .unwrap_or(&[])
    }

    pub fn verify<T: HasPublic>(&self, issuer_key: &PKeyRef<T>) -> Result<bool> {
        let tbs = self
            .inner
            .tbs_cert_list
            .to_der()
            .map_err(|e| PkiError::encoding("Unable to encode CRL", e))?;
        algorithms::verify(
            issuer_key,
            &self.inner.signature_algorithm.oid,
            &tbs,
            self.inner.signature.raw_bytes(),
        )
    }

    pub fn thumbprint(&self) -> Result<Thumbprint> {
        Ok(Thumbprint::of(&self.encoded()?))
    }

    pub fn hash(&self, digest: &str) -> Result<Vec<u8>> {
        thumbprint::digest_named(&self.encoded()?, digest)
    }

    pub fn equals(&self, other: &Crl) -> bool {
        match (self.thumbprint(), other.thumbprint()) {
            (Ok(a), Ok(b)) => a == b,
            _ => false,
        }
    }

    /// Order of the DER encodings; fails when either side cannot be encoded.
    pub fn try_compare(&self, other: &Crl) -> Result<Ordering> {
        Ok(self.encoded()?.cmp(&other.encoded()?))
    }

    /// Total order over the DER encodings. An unencodable CRL sorts first.
    pub fn compare(&self, other: &Crl) -> Ordering {
        match (self.encoded(), other.encoded()) {
            (Ok(a), Ok(b)) => a.cmp(&b),
            (Err(_), Ok(_)) => Ordering::Less,
            (Ok(_), Err(_)) => Ordering::Greater,
            (Err(_), Err(_)) => Ordering::Equal,
        }
    }

    pub(crate) fn from_inner(inner: CertificateList) -> Self {
        Self { inner }
    }
}

impl PartialEq for Crl {
    fn eq(&self, other: &Self) -> bool {
        self.equals(other)
    }
}

impl Eq for Crl {}

fn revoked_entry(rc: &RevokedCert) -> RevokedEntry {
    let reason = rc
        .crl_entry_extensions
        .as_ref()
        .and_then(|exts| exts.iter().find(|ext| ext.extn_id == oids::CRL_REASON))
        .and_then(|ext| CrlReason::from_der(ext.extn_value.as_bytes()).ok())
        .map(|reason| reason as u32);

    RevokedEntry {
        serial: integer_text(rc.serial_number.as_bytes()),
        revocation_date: timefmt::format_time(&rc.revocation_date),
        reason,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::test_support::{ec_key, self_signed, signed_crl};

    #[test]
    fn test_inspection() {
        let key = ec_key();
        let crl = signed_crl(&key, "/CN=Test CA/O=Org", &[("0A1B", Some(CrlReason::KeyCompromise))]);

        assert_eq!(crl.issuer_name(), "/CN=Test CA/O=Org");
        assert_eq!(crl.issuer_friendly_name(), "Test CA");
        assert_eq!(crl.signature_algorithm(), "ecdsa-with-SHA256");
        assert_eq!(crl.signature_digest_algorithm(), "sha256");
        assert_eq!(crl.crl_number(), "2A");
        assert_eq!(crl.authority_key_id(), "0102030405");
        assert_eq!(crl.version(), 1);
        assert!(!crl.next_update().is_empty());
        assert!(crl.verify(&key).unwrap());
    }

    #[test]
    fn test_revoked_entries() {
        let key = ec_key();
        let crl = signed_crl(
            &key,
            "/CN=Test CA",
            &[("0A1B", Some(CrlReason::KeyCompromise)), ("FF", None)],
        );

        let revoked = crl.revoked();
        assert_eq!(revoked.len(), 2);
        assert_eq!(revoked[0].serial, "0A1B");
        assert_eq!(revoked[0].reason, Some(1));
        assert_eq!(revoked[1].reason, None);

        assert!(crl.revoked_by_serial("0a1b").is_some());
        assert!(crl.revoked_by_serial("0C").is_none());
    }

    #[test]
    fn test_revoked_by_certificate_checks_issuer() {
        let key = ec_key();
        let (mut cert, _) = self_signed("/CN=Test CA");
        cert.set_serial_number("0xFF").unwrap();

        let crl = signed_crl(&key, "/CN=Test CA", &[("FF", None)]);
        assert!(crl.revoked_by_certificate(&cert).is_some());

        let other = signed_crl(&key, "/CN=Other CA", &[("FF", None)]);
        assert!(other.revoked_by_certificate(&cert).is_none());
    }

    #[test]
    fn test_round_trip_and_duplicate() {
        let key = ec_key();
        let crl = signed_crl(&key, "/CN=Test CA", &[]);
        assert!(crl.revoked().is_empty());

        let pem = crl.export(DataFormat::Base64).unwrap();
        assert!(pem.starts_with(b"-----BEGIN X509 CRL-----"));
        let mut cursor = std::io::Cursor::new(pem);
        let back = Crl::read(&mut cursor, DataFormat::Base64).unwrap();
        assert_eq!(back, crl);

        let copy = crl.duplicate().unwrap();
        assert_eq!(copy.thumbprint().unwrap(), crl.thumbprint().unwrap());
        assert_eq!(copy.compare(&crl), Ordering::Equal);
        let other = signed_crl(&key, "/CN=Other CA", &[]);
        assert_eq!(crl.try_compare(&other).unwrap(), crl.compare(&other));
        assert_eq!(crl.compare(&other), other.compare(&crl).reverse());
        assert_eq!(crl.hash("sha1").unwrap(), crl.thumbprint().unwrap().as_bytes());
    }

    #[test]
    fn test_undecodable() {
        assert_eq!(Crl::from_der(&[]).unwrap_err().kind(), ErrorKind::InvalidInput);
        assert_eq!(Crl::from_der(&[0x30, 0x00]).unwrap_err().kind(), ErrorKind::Parse);
    }
}
