//! Ordered X.509v3 extension collections keyed by OID.

use const_oid::{AssociatedOid, ObjectIdentifier};
use der::asn1::OctetString;
use der::Encode;
use x509_cert::ext::Extension;

use crate::error::{PkiError, Result};

/// Ordered sequence of extensions in which an OID appears at most once
/// after any [`merge`](ExtensionCollection::merge).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtensionCollection {
    items: Vec<Extension>,
}

impl ExtensionCollection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a record unconditionally.
    pub fn push(&mut self, extension: Extension) {
        self.items.push(extension);
    }

    /// Encode `value` as the body of the extension identified by its associated OID.
    pub fn push_value<T>(&mut self, critical: bool, value: &T) -> Result<()>
    where
        T: AssociatedOid + Encode,
    {
        let der = value
            .to_der()
            .map_err(|e| PkiError::encoding(format!("Failed to encode extension {}", T::OID), e))?;
        self.push_raw(T::OID, critical, der)
    }

    /// Append a record from an already DER-encoded extension value.
    pub fn push_raw(&mut self, oid: ObjectIdentifier, critical: bool, value: Vec<u8>) -> Result<()> {
        let extn_value = OctetString::new(value)
            .map_err(|e| PkiError::encoding(format!("Failed to wrap extension {}", oid), e))?;
        self.items.push(Extension {
            extn_id: oid,
            critical,
            extn_value,
        });
        Ok(())
    }

    /// First record with `oid`.
    pub fn find(&self, oid: &ObjectIdentifier) -> Option<&Extension> {
        self.items.iter().find(|ext| &ext.extn_id == oid)
    }

    pub fn contains(&self, oid: &ObjectIdentifier) -> bool {
        self.find(oid).is_some()
    }

    /// Append every record of `source` whose OID is not present yet.
    ///
    /// Existing records are never replaced; duplicates are dropped silently.
    /// Returns the number of records appended.
    pub fn merge(&mut self, source: &ExtensionCollection) -> usize {
        let mut added = 0;
        for ext in source.iter() {
            if self.contains(&ext.extn_id) {
                continue;
            }
            self.items.push(ext.clone());
            added += 1;
        }
        added
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Extension> {
        self.items.iter()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn into_vec(self) -> Vec<Extension> {
        self.items
    }
}

impl From<Vec<Extension>> for ExtensionCollection {
    fn from(items: Vec<Extension>) -> Self {
        Self { items }
    }
}

impl<'a> IntoIterator for &'a ExtensionCollection {
    type Item = &'a Extension;
    type IntoIter = std::slice::Iter<'a, Extension>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use x509_cert::ext::pkix::BasicConstraints;

    const A: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.3.1");
    const B: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.3.2");
    const C: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.3.3");

    fn collection(records: &[(ObjectIdentifier, u8)]) -> ExtensionCollection {
        let mut exts = ExtensionCollection::new();
        for (oid, marker) in records {
            exts.push_raw(*oid, false, vec![0x04, 0x01, *marker]).unwrap();
        }
        exts
    }

    #[test]
    fn test_merge_is_first_write_wins() {
        let mut dest = collection(&[(B, 1), (C, 1)]);
        let source = collection(&[(A, 2), (B, 2)]);

        assert_eq!(dest.merge(&source), 1);

        let order: Vec<_> = dest.iter().map(|e| e.extn_id).collect();
        assert_eq!(order, vec![B, C, A]);
        // original B record retained
        assert_eq!(dest.find(&B).unwrap().extn_value.as_bytes(), &[0x04, 0x01, 1]);
    }

    #[test]
    fn test_merge_into_self_copy_adds_nothing() {
        let mut dest = collection(&[(A, 1), (B, 1)]);
        let copy = dest.clone();
        assert_eq!(dest.merge(&copy), 0);
        assert_eq!(dest.len(), 2);
    }

    #[test]
    fn test_find_absent() {
        let exts = collection(&[(A, 1)]);
        assert!(exts.find(&C).is_none());
    }

    #[test]
    fn test_push_value_uses_associated_oid() {
        let mut exts = ExtensionCollection::new();
        let bc = BasicConstraints {
            ca: true,
            path_len_constraint: Some(0),
        };
        exts.push_value(true, &bc).unwrap();

        let ext = exts.find(&crate::oids::BASIC_CONSTRAINTS).unwrap();
        assert!(ext.critical);
    }
}
