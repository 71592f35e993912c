//! Denormalized records describing store entries, plus filtering and a JSON cache.
//!
//! A [`PkiItem`] is a snapshot: it copies every inspection value out of a
//! [`Certificate`] or [`Crl`] when a store is enumerated and is never written
//! back. [`PkiFilter`] selects items from an enumeration and [`PkiItemCache`]
//! keeps a snapshot on disk between runs.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::certificate::Certificate;
use crate::crl::Crl;
use crate::data_format::DataFormat;
use crate::error::{PkiError, Result, ResultExt};
use crate::timefmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PkiItemKind {
    Certificate,
    Crl,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PkiItem {
    /// Encoding of the stored object, always `"DER"` for native stores.
    pub format: String,
    #[serde(rename = "type")]
    pub kind: PkiItemKind,
    pub provider: String,
    pub category: String,
    /// Lowercase hex SHA-1 thumbprint.
    pub hash: String,
    #[serde(flatten)]
    pub details: PkiItemDetails,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PkiItemDetails {
    Certificate(CertificateDetails),
    Crl(CrlDetails),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CertificateDetails {
    pub subject_name: String,
    pub subject_friendly_name: String,
    pub issuer_name: String,
    pub issuer_friendly_name: String,
    pub organization_name: String,
    pub serial: String,
    pub not_before: String,
    pub not_after: String,
    pub signature_algorithm: String,
    pub signature_digest_algorithm: String,
    pub public_key_algorithm: String,
    /// A private key is paired with the certificate in the store.
    pub key: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CrlDetails {
    pub issuer_name: String,
    pub issuer_friendly_name: String,
    pub last_update: String,
    pub next_update: String,
    pub signature_algorithm: String,
    pub signature_digest_algorithm: String,
    pub authority_key_id: String,
    pub crl_number: String,
}

impl PkiItem {
    pub fn from_certificate(
        cert: &Certificate,
        provider: &str,
        category: &str,
        has_key: bool,
    ) -> Result<Self> {
        let hash = cert
            .thumbprint()
            .context("Error create PkiItem from certificate")?
            .to_hex();
        Ok(Self {
            format: DataFormat::Der.to_string(),
            kind: PkiItemKind::Certificate,
            provider: provider.to_string(),
            category: category.to_string(),
            hash,
            details: PkiItemDetails::Certificate(CertificateDetails {
                subject_name: cert.subject_name(),
                subject_friendly_name: cert.subject_friendly_name(),
                issuer_name: cert.issuer_name(),
                issuer_friendly_name: cert.issuer_friendly_name(),
                organization_name: cert.organization_name(),
                serial: cert.serial_number(),
                not_before: cert.not_before(),
                not_after: cert.not_after(),
                signature_algorithm: cert.signature_algorithm(),
                signature_digest_algorithm: cert.signature_digest_algorithm(),
                public_key_algorithm: cert.public_key_algorithm(),
                key: has_key,
            }),
        })
    }

    pub fn from_crl(crl: &Crl, provider: &str, category: &str) -> Result<Self> {
        let hash = crl
            .thumbprint()
            .context("Error create PkiItem from crl")?
            .to_hex();
        Ok(Self {
            format: DataFormat::Der.to_string(),
            kind: PkiItemKind::Crl,
            provider: provider.to_string(),
            category: category.to_string(),
            hash,
            details: PkiItemDetails::Crl(CrlDetails {
                issuer_name: crl.issuer_name(),
                issuer_friendly_name: crl.issuer_friendly_name(),
                last_update: crl.this_update(),
                next_update: crl.next_update(),
                signature_algorithm: crl.signature_algorithm(),
                signature_digest_algorithm: crl.signature_digest_algorithm(),
                authority_key_id: crl.authority_key_id(),
                crl_number: crl.crl_number(),
            }),
        })
    }

    pub fn subject_name(&self) -> Option<&str> {
        match &self.details {
            PkiItemDetails::Certificate(c) => Some(&c.subject_name),
            PkiItemDetails::Crl(_) => None,
        }
    }

    pub fn subject_friendly_name(&self) -> Option<&str> {
        match &self.details {
            PkiItemDetails::Certificate(c) => Some(&c.subject_friendly_name),
            PkiItemDetails::Crl(_) => None,
        }
    }

    pub fn issuer_name(&self) -> &str {
        match &self.details {
            PkiItemDetails::Certificate(c) => &c.issuer_name,
            PkiItemDetails::Crl(c) => &c.issuer_name,
        }
    }

    pub fn issuer_friendly_name(&self) -> &str {
        match &self.details {
            PkiItemDetails::Certificate(c) => &c.issuer_friendly_name,
            PkiItemDetails::Crl(c) => &c.issuer_friendly_name,
        }
    }

    pub fn serial(&self) -> Option<&str> {
        match &self.details {
            PkiItemDetails::Certificate(c) => Some(&c.serial),
            PkiItemDetails::Crl(_) => None,
        }
    }

    /// Private-key flag; always false for CRLs.
    pub fn has_key(&self) -> bool {
        matches!(&self.details, PkiItemDetails::Certificate(c) if c.key)
    }

    /// Certificates: now within [notBefore, notAfter]. CRLs: now within
    /// [lastUpdate, nextUpdate], with no upper bound when nextUpdate is absent.
    pub fn is_valid(&self) -> bool {
        let now = Utc::now();
        let (start, end) = match &self.details {
            PkiItemDetails::Certificate(c) => (c.not_before.as_str(), c.not_after.as_str()),
            PkiItemDetails::Crl(c) => (c.last_update.as_str(), c.next_update.as_str()),
        };
        let Ok(start) = timefmt::parse_time(start) else {
            return false;
        };
        if now < start {
            return false;
        }
        if end.is_empty() && self.kind == PkiItemKind::Crl {
            return true;
        }
        match timefmt::parse_time(end) {
            Ok(end) => now <= end,
            Err(_) => false,
        }
    }
}

/// Item selection; every constraint that is set must match.
///
/// List constraints match when the item's value is one of the entries. Name
/// and serial constraints are exact; the hash is compared case-insensitively.
/// Subject constraints never match CRLs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PkiFilter {
    #[serde(rename = "type")]
    pub kinds: Vec<PkiItemKind>,
    #[serde(rename = "provider")]
    pub providers: Vec<String>,
    #[serde(rename = "category")]
    pub categories: Vec<String>,
    pub hash: Option<String>,
    pub subject_name: Option<String>,
    pub subject_friendly_name: Option<String>,
    pub issuer_name: Option<String>,
    pub issuer_friendly_name: Option<String>,
    pub serial: Option<String>,
    pub is_valid: Option<bool>,
}

impl PkiFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn kind(mut self, kind: PkiItemKind) -> Self {
        self.kinds.push(kind);
        self
    }

    pub fn provider(mut self, provider: &str) -> Self {
        self.providers.push(provider.to_string());
        self
    }

    pub fn category(mut self, category: &str) -> Self {
        self.categories.push(category.to_string());
        self
    }

    pub fn hash(mut self, hash: &str) -> Self {
        self.hash = Some(hash.to_string());
        self
    }

    pub fn subject_name(mut self, name: &str) -> Self {
        self.subject_name = Some(name.to_string());
        self
    }

    pub fn subject_friendly_name(mut self, name: &str) -> Self {
        self.subject_friendly_name = Some(name.to_string());
        self
    }

    pub fn issuer_name(mut self, name: &str) -> Self {
        self.issuer_name = Some(name.to_string());
        self
    }

    pub fn issuer_friendly_name(mut self, name: &str) -> Self {
        self.issuer_friendly_name = Some(name.to_string());
        self
    }

    pub fn serial(mut self, serial: &str) -> Self {
        self.serial = Some(serial.to_string());
        self
    }

    pub fn valid(mut self, valid: bool) -> Self {
        self.is_valid = Some(valid);
        self
    }

    pub fn matches(&self, item: &PkiItem) -> bool {
        if !self.kinds.is_empty() && !self.kinds.contains(&item.kind) {
            return false;
        }
        if !self.providers.is_empty() && !self.providers.iter().any(|p| *p == item.provider) {
            return false;
        }
        if !self.categories.is_empty() && !self.categories.iter().any(|c| *c == item.category) {
            return false;
        }
        if let Some(hash) = &self.hash {
            if !hash.eq_ignore_ascii_case(&item.hash) {
                return false;
            }
        }
        if !optional_matches(&self.subject_name, item.subject_name())
            || !optional_matches(&self.subject_friendly_name, item.subject_friendly_name())
            || !optional_matches(&self.serial, item.serial())
            || !optional_matches(&self.issuer_name, Some(item.issuer_name()))
            || !optional_matches(&self.issuer_friendly_name, Some(item.issuer_friendly_name()))
        {
            return false;
        }
        match self.is_valid {
            Some(valid) => item.is_valid() == valid,
            None => true,
        }
    }

    pub fn apply<'a>(&self, items: &'a [PkiItem]) -> Vec<&'a PkiItem> {
        items.iter().filter(|item| self.matches(item)).collect()
    }
}

fn optional_matches(wanted: &Option<String>, actual: Option<&str>) -> bool {
    match wanted {
        None => true,
        Some(wanted) => actual == Some(wanted.as_str()),
    }
}

/// JSON snapshot of enumerated items.
#[derive(Debug, Clone, Default)]
pub struct PkiItemCache {
    path: PathBuf,
    items: Vec<PkiItem>,
}

impl PkiItemCache {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            items: Vec::new(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn items(&self) -> &[PkiItem] {
        &self.items
    }

    /// Replace the cached items.
    pub fn import(&mut self, items: &[PkiItem]) {
        self.items = items.to_vec();
    }

    pub fn push(&mut self, item: PkiItem) {
        self.items.push(item);
    }

    pub fn export(&self) -> Vec<PkiItem> {
        self.items.clone()
    }

    pub fn save(&self) -> Result<()> {
        let json = serde_json::to_string_pretty(&self.items)
            .map_err(|e| PkiError::encoding("Unable to serialize item cache", e))?;
        fs::write(&self.path, json).map_err(|e| {
            PkiError::io(format!("Unable to write cache {}", self.path.display()), e)
        })?;
        tracing::debug!(path = %self.path.display(), count = self.items.len(), "Item cache saved");
        Ok(())
    }

    /// Replace the cached items with the file's content.
    pub fn load(&mut self) -> Result<()> {
        let json = fs::read_to_string(&self.path).map_err(|e| {
            PkiError::io(format!("Unable to read cache {}", self.path.display()), e)
        })?;
        self.items = serde_json::from_str(&json).map_err(|e| {
            PkiError::parse(format!("Invalid cache file {}", self.path.display()), e)
        })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{ec_key, self_signed, signed_crl};

    fn sample_items() -> Vec<PkiItem> {
        let (cert, _) = self_signed("/CN=alice/O=Org");
        let crl = signed_crl(&ec_key(), "/CN=Test CA", &[]);
        vec![
            PkiItem::from_certificate(&cert, "MEMORY", "MY", true).unwrap(),
            PkiItem::from_crl(&crl, "MEMORY", "CA").unwrap(),
        ]
    }

    #[test]
    fn test_certificate_item_fields() {
        let (cert, _) = self_signed("/CN=alice/O=Org");
        let item = PkiItem::from_certificate(&cert, "MEMORY", "MY", false).unwrap();

        assert_eq!(item.format, "DER");
        assert_eq!(item.kind, PkiItemKind::Certificate);
        assert_eq!(item.hash, cert.thumbprint().unwrap().to_hex());
        assert_eq!(item.subject_friendly_name(), Some("alice"));
        assert_eq!(item.issuer_name(), "/CN=alice/O=Org");
        assert!(!item.has_key());
        assert!(item.is_valid());
    }

    #[test]
    fn test_json_shape() {
        let items = sample_items();
        let value = serde_json::to_value(&items).unwrap();

        assert_eq!(value[0]["type"], "CERTIFICATE");
        assert_eq!(value[0]["subjectFriendlyName"], "alice");
        assert_eq!(value[0]["key"], true);
        assert_eq!(value[1]["type"], "CRL");
        assert_eq!(value[1]["crlNumber"], "2A");
        assert!(value[1].get("subjectName").is_none());
    }

    #[test]
    fn test_filter() {
        let items = sample_items();

        let certs = PkiFilter::new().kind(PkiItemKind::Certificate).apply(&items);
        assert_eq!(certs.len(), 1);

        let by_hash = PkiFilter::new().hash(&items[1].hash.to_uppercase()).apply(&items);
        assert_eq!(by_hash.len(), 1);
        assert_eq!(by_hash[0].kind, PkiItemKind::Crl);

        let subject = PkiFilter::new().subject_friendly_name("alice").apply(&items);
        assert_eq!(subject.len(), 1);

        let none = PkiFilter::new().category("MY").issuer_friendly_name("Test CA").apply(&items);
        assert!(none.is_empty());

        assert_eq!(PkiFilter::new().valid(true).apply(&items).len(), 2);
        assert_eq!(PkiFilter::new().apply(&items).len(), 2);
    }

    #[test]
    fn test_cache_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("items.json");

        let mut cache = PkiItemCache::new(&path);
        cache.import(&sample_items());
        cache.save().unwrap();

        let mut loaded = PkiItemCache::new(&path);
        loaded.load().unwrap();
        assert_eq!(loaded.items(), cache.items());
    }

    #[test]
    fn test_cache_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut cache = PkiItemCache::new(dir.path().join("absent.json"));
        assert_eq!(cache.load().unwrap_err().kind(), crate::error::ErrorKind::Io);
    }
}
