//! X.509 certificate model.
//!
//! [`Certificate`] owns one decoded certificate structure. It can be built
//! from a [`CertificationRequest`], signed, encoded to DER or PEM, and
//! inspected through getters that return the human readable values listed in
//! store enumerations.
//!
//! The model does not keep the signature consistent with the content: any
//! mutator leaves a stale signature until [`Certificate::sign`] runs again.
//! Signature checks are explicit through [`Certificate::verify`] and
//! [`Certificate::is_self_signed`].

use std::cmp::Ordering;
use std::fs;
use std::io::{Read, Seek, Write};
use std::path::Path;

use der::asn1::{BitString, Ia5String};
use der::{Decode, Encode};
use openssl::bn::{BigNum, MsbOption};
use openssl::pkey::{HasPublic, PKey, PKeyRef, Private, Public};
use x509_cert::certificate::{TbsCertificate, Version};
use x509_cert::ext::pkix::name::GeneralName;
use x509_cert::ext::pkix::{AuthorityInfoAccessSyntax, BasicConstraints};
use x509_cert::serial_number::SerialNumber;
use x509_cert::time::Validity;

use crate::algorithms;
use crate::configs::CertificateDefaults;
use crate::data_format::{self, DataFormat};
use crate::error::{PkiError, Result, ResultExt, VerificationFailure};
use crate::extensions::ExtensionCollection;
use crate::name_codec;
use crate::oids;
use crate::request::CertificationRequest;
use crate::thumbprint::{self, Thumbprint};
use crate::timefmt;

/// Friendly name reported when a name has no commonName.
pub const NO_COMMON_NAME: &str = "No common name";

/// Key usage mask reported when the extension is absent.
pub const KEY_USAGE_ABSENT: u32 = u32::MAX;

// Key usage bits as laid out in the first two bytes of the BIT STRING.
pub const KU_DIGITAL_SIGNATURE: u32 = 0x0080;
pub const KU_NON_REPUDIATION: u32 = 0x0040;
pub const KU_KEY_ENCIPHERMENT: u32 = 0x0020;
pub const KU_DATA_ENCIPHERMENT: u32 = 0x0010;
pub const KU_KEY_AGREEMENT: u32 = 0x0008;
pub const KU_KEY_CERT_SIGN: u32 = 0x0004;
pub const KU_CRL_SIGN: u32 = 0x0002;
pub const KU_ENCIPHER_ONLY: u32 = 0x0001;
pub const KU_DECIPHER_ONLY: u32 = 0x8000;

const SECONDS_PER_DAY: i64 = 86_400;

#[derive(Debug, Clone)]
pub struct Certificate {
    inner: x509_cert::Certificate,
}

impl Certificate {
    /// Build an unsigned certificate from a request with the default settings.
    pub fn from_request(csr: &CertificationRequest) -> Result<Self> {
        Self::from_request_with_defaults(csr, &CertificateDefaults::default())
    }

    /// Build an unsigned certificate from a request.
    ///
    /// The request self-signature must verify. Subject and issuer are both set
    /// to the request subject, validity starts now, and the request's
    /// extensions are copied (making the certificate v3). The signature stays
    /// empty until [`sign`](Self::sign) is called.
    pub fn from_request_with_defaults(
        csr: &CertificationRequest,
        defaults: &CertificateDefaults,
    ) -> Result<Self> {
        crate::init();

        if !csr.has_public_key() {
            return Err(PkiError::invalid_input("Request has no public key"));
        }

        match csr.verify() {
            Ok(true) => {}
            Ok(false) => {
                return Err(PkiError::verification(
                    VerificationFailure::Mismatch,
                    "Request signature does not match its content",
                ))
            }
            Err(e) => {
                return Err(PkiError::SignatureVerification {
                    reason: VerificationFailure::Errored,
                    context: "Unable to verify request signature".to_string(),
                    source: Some(Box::new(e)),
                })
            }
        }

        let mut extensions = ExtensionCollection::new();
        extensions.merge(&csr.extensions()?);

        let validity_secs = i64::from(defaults.validity_days) * SECONDS_PER_DAY;
        let validity = Validity {
            not_before: timefmt::time_from_now(0)?,
            not_after: timefmt::time_from_now(validity_secs)?,
        };

        let request = csr.inner();
        let tbs_certificate = TbsCertificate {
            version: if extensions.is_empty() {
                Version::V1
            } else {
                Version::V3
            },
            serial_number: random_serial(defaults.serial_bits)?,
            signature: request.algorithm.clone(),
            issuer: request.info.subject.clone(),
            validity,
            subject: request.info.subject.clone(),
            subject_public_key_info: request.info.public_key.clone(),
            issuer_unique_id: None,
            subject_unique_id: None,
            extensions: if extensions.is_empty() {
                None
            } else {
                Some(extensions.into_vec())
            },
        };

        tracing::debug!(subject = %csr.subject_name(), "Certificate built from request");

        Ok(Self {
            inner: x509_cert::Certificate {
                tbs_certificate,
                signature_algorithm: request.algorithm.clone(),
                signature: BitString::new(0, Vec::new())
                    .map_err(|e| PkiError::encoding("Unable to create empty signature", e))?,
            },
        })
    }

    /// Sign with `key`; `digest` of `None` uses the key's default digest.
    pub fn sign(&mut self, key: &PKeyRef<Private>, digest: Option<&str>) -> Result<()> {
        crate::init();

        let md = algorithms::resolve_digest(key, digest)?;
        let algorithm = algorithms::signature_algorithm(key, md)?;

        self.inner.tbs_certificate.signature = algorithm.clone();
        let tbs = self
            .inner
            .tbs_certificate
            .to_der()
            .map_err(|e| PkiError::encoding("Unable to encode certificate for signing", e))?;
        let signature = algorithms::sign(key, md, &tbs).context("Error sign certificate")?;

        self.inner.signature_algorithm = algorithm;
        self.inner.signature = BitString::from_bytes(&signature)
            .map_err(|e| PkiError::encoding("Unable to store certificate signature", e))?;
        Ok(())
    }

    /// Check the signature with an issuer public key.
    pub fn verify<T: HasPublic>(&self, issuer_key: &PKeyRef<T>) -> Result<bool> {
        let tbs = self
            .inner
            .tbs_certificate
            .to_der()
            .map_err(|e| PkiError::encoding("Unable to encode certificate", e))?;
        algorithms::verify(
            issuer_key,
            &self.inner.signature_algorithm.oid,
            &tbs,
            self.inner.signature.raw_bytes(),
        )
    }

    pub fn from_der(der: &[u8]) -> Result<Self> {
        Self::import(der, DataFormat::Der)
    }

    pub fn from_pem(pem: &str) -> Result<Self> {
        Self::import(pem.as_bytes(), DataFormat::Base64)
    }

    pub fn import(bytes: &[u8], format: DataFormat) -> Result<Self> {
        crate::init();
        let inner = data_format::decode::<x509_cert::Certificate>(bytes, format, data_format::CERTIFICATE)?;
        Ok(Self { inner })
    }

    /// Rewind `source` and decode a certificate from it.
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
        data_format::encode(&self.inner, format, data_format::CERTIFICATE)
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

    /// DER encoding.
    pub fn encoded(&self) -> Result<Vec<u8>> {
        self.export(DataFormat::Der)
    }

    /// Independent deep copy made by re-decoding the encoding.
    pub fn duplicate(&self) -> Result<Self> {
        let der = self.inner.to_der().map_err(|e| PkiError::Clone {
            context: "Unable to encode certificate".to_string(),
            source: Some(Box::new(e)),
        })?;
        let inner = x509_cert::Certificate::from_der(&der).map_err(|e| PkiError::Clone {
            context: "Unable to decode certificate copy".to_string(),
            source: Some(Box::new(e)),
        })?;
        Ok(Self { inner })
    }

    // Names

    pub fn subject_name(&self) -> String {
        name_codec::format_name(&self.inner.tbs_certificate.subject)
    }

    pub fn issuer_name(&self) -> String {
        name_codec::format_name(&self.inner.tbs_certificate.issuer)
    }

    pub fn subject_friendly_name(&self) -> String {
        name_codec::first_attribute(&self.inner.tbs_certificate.subject, &oids::COMMON_NAME)
            .unwrap_or_else(|| NO_COMMON_NAME.to_string())
    }

    pub fn issuer_friendly_name(&self) -> String {
        name_codec::first_attribute(&self.inner.tbs_certificate.issuer, &oids::COMMON_NAME)
            .unwrap_or_else(|| NO_COMMON_NAME.to_string())
    }

    pub fn organization_name(&self) -> String {
        name_codec::first_attribute(&self.inner.tbs_certificate.subject, &oids::ORGANIZATION_NAME)
            .unwrap_or_default()
    }

    // Identity and validity

    /// Serial number as uppercase hex of its magnitude.
    pub fn serial_number(&self) -> String {
        integer_text(self.inner.tbs_certificate.serial_number.as_bytes())
    }

    /// X.509 version number: 0, 1 or 2 for v1, v2 and v3.
    pub fn version(&self) -> u8 {
        match self.inner.tbs_certificate.version {
            Version::V1 => 0,
            Version::V2 => 1,
            Version::V3 => 2,
        }
    }

    pub fn not_before(&self) -> String {
        timefmt::format_time(&self.inner.tbs_certificate.validity.not_before)
    }

    pub fn not_after(&self) -> String {
        timefmt::format_time(&self.inner.tbs_certificate.validity.not_after)
    }

    // Algorithms

    pub fn signature_algorithm(&self) -> String {
        algorithms::algorithm_name(&self.inner.signature_algorithm.oid)
    }

    pub fn signature_digest_algorithm(&self) -> String {
        algorithms::digest_name_for_signature(&self.inner.signature_algorithm.oid)
    }

    pub fn public_key_algorithm(&self) -> String {
        algorithms::algorithm_name(&self.inner.tbs_certificate.subject_public_key_info.algorithm.oid)
    }

    pub fn public_key(&self) -> Result<PKey<Public>> {
        algorithms::public_key_from_spki(&self.inner.tbs_certificate.subject_public_key_info)
    }

    // Extensions

    pub fn extensions(&self) -> ExtensionCollection {
        self.inner
            .tbs_certificate
            .extensions
            .clone()
            .map(ExtensionCollection::from)
            .unwrap_or_default()
    }

    /// Key usage bits (`KU_*`), or [`KEY_USAGE_ABSENT`] when the extension is
    /// missing or cannot be decoded.
    pub fn key_usage(&self) -> u32 {
        let ext = match self.extension(&oids::KEY_USAGE) {
            Some(ext) => ext,
            None => return KEY_USAGE_ABSENT,
        };
        match BitString::from_der(ext.extn_value.as_bytes()) {
            Ok(bits) => {
                let bytes = bits.raw_bytes();
                let low = bytes.first().copied().unwrap_or(0) as u32;
                let high = bytes.get(1).copied().unwrap_or(0) as u32;
                low | (high << 8)
            }
            Err(e) => {
                tracing::debug!(error = %e, "Malformed key usage extension");
                KEY_USAGE_ABSENT
            }
        }
    }

    pub fn ocsp_urls(&self) -> Vec<String> {
        self.access_urls(&oids::AD_OCSP)
    }

    pub fn ca_issuers_urls(&self) -> Vec<String> {
        self.access_urls(&oids::AD_CA_ISSUERS)
    }

    fn access_urls(&self, method: &const_oid::ObjectIdentifier) -> Vec<String> {
        let Some(ext) = self.extension(&oids::AUTHORITY_INFO_ACCESS) else {
            return Vec::new();
        };
        let Ok(aia) = AuthorityInfoAccessSyntax::from_der(ext.extn_value.as_bytes()) else {
            return Vec::new();
        };
        aia.0
            .iter()
            .filter(|desc| &desc.access_method == method)
            .filter_map(|desc| match &desc.access_location {
                GeneralName::UniformResourceIdentifier(uri) => Some(ia5_to_string(uri)),
                _ => None,
            })
            .collect()
    }

    fn extension(&self, oid: &const_oid::ObjectIdentifier) -> Option<&x509_cert::ext::Extension> {
        self.inner
            .tbs_certificate
            .extensions
            .as_ref()
            .and_then(|exts| exts.iter().find(|ext| &ext.extn_id == oid))
    }

    // Trust flags

    /// Issuer equals subject and the signature verifies under the certificate's own key.
    pub fn is_self_signed(&self) -> bool {
        if self.inner.tbs_certificate.subject != self.inner.tbs_certificate.issuer {
            return false;
        }
        match self.public_key() {
            Ok(key) => self.verify(&key).unwrap_or(false),
            Err(_) => false,
        }
    }

    /// Whether the certificate may issue others.
    ///
    /// A keyUsage without keyCertSign rules it out. Otherwise basicConstraints
    /// decides, then keyCertSign alone, then a self-signed v1 certificate.
    pub fn is_ca(&self) -> bool {
        let usage = self.key_usage();
        if usage != KEY_USAGE_ABSENT && usage & KU_KEY_CERT_SIGN == 0 {
            return false;
        }
        if let Some(ext) = self.extension(&oids::BASIC_CONSTRAINTS) {
            return BasicConstraints::from_der(ext.extn_value.as_bytes())
                .map(|bc| bc.ca)
                .unwrap_or(false);
        }
        if usage != KEY_USAGE_ABSENT {
            return true;
        }
        self.inner.tbs_certificate.version == Version::V1 && self.is_self_signed()
    }

    // Hashes and comparison

    pub fn thumbprint(&self) -> Result<Thumbprint> {
        Ok(Thumbprint::of(&self.encoded()?))
    }

    /// Digest of the DER encoding with a named digest.
    pub fn hash(&self, digest: &str) -> Result<Vec<u8>> {
        thumbprint::digest_named(&self.encoded()?, digest)
    }

    pub fn equals(&self, other: &Certificate) -> bool {
        match (self.thumbprint(), other.thumbprint()) {
            (Ok(a), Ok(b)) => a == b,
            _ => false,
        }
    }

    /// Order of the DER encodings; fails when either side cannot be encoded.
    pub fn try_compare(&self, other: &Certificate) -> Result<Ordering> {
        Ok(self.encoded()?.cmp(&other.encoded()?))
    }

    /// Total order over the DER encodings.
    ///
    /// A certificate that cannot be encoded sorts before every encodable one.
    pub fn compare(&self, other: &Certificate) -> Ordering {
        match (self.encoded(), other.encoded()) {
            (Ok(a), Ok(b)) => a.cmp(&b),
            (Err(_), Ok(_)) => Ordering::Less,
            (Ok(_), Err(_)) => Ordering::Greater,
            (Err(_), Err(_)) => Ordering::Equal,
        }
    }

    // Mutators

    pub fn set_subject(&mut self, name: &str) -> Result<()> {
        self.inner.tbs_certificate.subject = parse_non_empty_name(name, "subject")?;
        Ok(())
    }

    pub fn set_issuer(&mut self, name: &str) -> Result<()> {
        self.inner.tbs_certificate.issuer = parse_non_empty_name(name, "issuer")?;
        Ok(())
    }

    /// Set the version number (0, 1 or 2).
    pub fn set_version(&mut self, version: u8) -> Result<()> {
        self.inner.tbs_certificate.version = match version {
            0 => Version::V1,
            1 => Version::V2,
            2 => Version::V3,
            other => {
                return Err(PkiError::invalid_input(format!(
                    "Unsupported certificate version {}",
                    other
                )))
            }
        };
        Ok(())
    }

    /// notBefore = now + `offset_secs`.
    pub fn set_not_before(&mut self, offset_secs: i64) -> Result<()> {
        self.inner.tbs_certificate.validity.not_before = timefmt::time_from_now(offset_secs)?;
        Ok(())
    }

    /// notAfter = now + `offset_secs`.
    pub fn set_not_after(&mut self, offset_secs: i64) -> Result<()> {
        self.inner.tbs_certificate.validity.not_after = timefmt::time_from_now(offset_secs)?;
        Ok(())
    }

    /// Merge `extensions` into the certificate's own, keeping existing OIDs.
    pub fn set_extensions(&mut self, extensions: &ExtensionCollection) -> Result<()> {
        if extensions.is_empty() {
            return Err(PkiError::invalid_input("Extension collection is empty"));
        }
        let mut current = self.extensions();
        current.merge(extensions);
        self.inner.tbs_certificate.extensions = Some(current.into_vec());
        self.inner.tbs_certificate.version = Version::V3;
        Ok(())
    }

    /// Set the serial from decimal or `0x`-prefixed hex text; empty text picks a random serial.
    pub fn set_serial_number(&mut self, serial: &str) -> Result<()> {
        self.set_serial_number_with_defaults(serial, &CertificateDefaults::default())
    }

    /// As [`set_serial_number`](Self::set_serial_number), drawing random
    /// serials of `defaults.serial_bits` bits.
    pub fn set_serial_number_with_defaults(
        &mut self,
        serial: &str,
        defaults: &CertificateDefaults,
    ) -> Result<()> {
        let serial = serial.trim();
        if serial.is_empty() {
            self.inner.tbs_certificate.serial_number = random_serial(defaults.serial_bits)?;
            return Ok(());
        }

        let parsed = match serial
            .strip_prefix("0x")
            .or_else(|| serial.strip_prefix("0X"))
        {
            Some(hex) => BigNum::from_hex_str(hex),
            None => BigNum::from_dec_str(serial),
        }
        .map_err(|e| PkiError::encoding(format!("Invalid serial number '{}'", serial), e))?;

        if parsed.is_negative() {
            return Err(PkiError::encoding_msg(format!(
                "Serial number '{}' is negative",
                serial
            )));
        }
        self.inner.tbs_certificate.serial_number = serial_from_bignum(&parsed)?;
        Ok(())
    }

    pub(crate) fn inner(&self) -> &x509_cert::Certificate {
        &self.inner
    }
}

impl PartialEq for Certificate {
    fn eq(&self, other: &Self) -> bool {
        self.equals(other)
    }
}

impl Eq for Certificate {}

impl PartialOrd for Certificate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Certificate {
    fn cmp(&self, other: &Self) -> Ordering {
        self.compare(other)
    }
}

fn parse_non_empty_name(name: &str, what: &str) -> Result<x509_cert::name::Name> {
    if name.trim_matches('/').is_empty() {
        return Err(PkiError::invalid_input(format!("Empty {} name", what)));
    }
    name_codec::parse_name(name).with_context(|| format!("Error set {} name", what))
}

/// Random positive serial with the top bit set, so it is exactly `bits` long.
pub(crate) fn random_serial(bits: i32) -> Result<SerialNumber> {
    if !(64..=159).contains(&bits) {
        return Err(PkiError::invalid_input(format!(
            "Serial number size {} bits outside 64..=159",
            bits
        )));
    }
    let mut serial = BigNum::new().map_err(|e| PkiError::encoding("Unable to allocate serial", e))?;
    serial
        .rand(bits, MsbOption::ONE, false)
        .map_err(|e| PkiError::encoding("Unable to generate serial", e))?;
    serial_from_bignum(&serial)
}

fn serial_from_bignum(value: &BigNum) -> Result<SerialNumber> {
    let mut bytes = value.to_vec();
    if bytes.is_empty() {
        bytes.push(0);
    }
    SerialNumber::new(&bytes).map_err(|e| PkiError::encoding("Serial number out of range", e))
}

/// Uppercase hex of an INTEGER's content octets with sign padding removed.
pub(crate) fn integer_text(bytes: &[u8]) -> String {
    let trimmed = match bytes.iter().position(|b| *b != 0) {
        Some(start) => &bytes[start..],
        None => return "00".to_string(),
    };
    hex::encode_upper(trimmed)
}

fn ia5_to_string(value: &Ia5String) -> String {
    value.to_string()
}
