//! Store provider: keeps certificate and CRL models in sync with a native store.
//!
//! # Lifecycle
//! [`StoreProvider::new`] enumerates every configured category once and
//! builds a [`PkiItem`] per entry. A category that cannot be opened is logged
//! and skipped; an entry that cannot be decoded fails the whole enumeration.
//! After that the provider is ready and each operation opens the store
//! handles it needs, releasing them before it returns.
//!
//! # Lookups
//! Certificates are found through the native hash index. CRLs have none, so
//! [`StoreProvider::lookup_crl`] decodes each entry in the category and
//! compares its thumbprint text with the requested hash. That comparison is
//! exact, so the hash must be given in lowercase.
//!
//! # Example
//! ```rust,no_run
//! use pki_store::memory_store::MemoryBackend;
//! use pki_store::provider::StoreProvider;
//! # fn example() -> pki_store::Result<()> {
//!
//! let provider = StoreProvider::new(MemoryBackend::new())?;
//! for item in provider.items() {
//!     println!("{} {} {}", item.category, item.hash, item.issuer_name());
//! }
//! # Ok(())
//! # }
//! ```

use std::path::PathBuf;

use crate::certificate::Certificate;
use crate::configs::ProviderConfig;
use crate::crl::Crl;
use crate::error::{PkiError, Result, ResultExt};
use crate::key_provider::{KeyContainerSpec, KeyProviderInfo, KeySpec, ProviderType};
use crate::native_store::{
    CertificateContext, ContainerKey, CrlContext, KeyContainer, NativeBackend, NativeStore,
    OpenMode,
};
use crate::pki_item::{PkiFilter, PkiItem, PkiItemCache};
use crate::thumbprint::Thumbprint;

/// Category consulted by [`StoreProvider::has_private_key`].
pub const PERSONAL_CATEGORY: &str = "MY";

pub struct StoreProvider<B: NativeBackend> {
    backend: B,
    categories: Vec<String>,
    cache_path: Option<PathBuf>,
    items: Vec<PkiItem>,
}

impl<B: NativeBackend> StoreProvider<B> {
    /// Enumerate the standard categories of `backend`.
    pub fn new(backend: B) -> Result<Self> {
        Self::with_config(backend, &ProviderConfig::default())
    }

    /// Enumerate the categories listed in `config`.
    pub fn with_config(backend: B, config: &ProviderConfig) -> Result<Self> {
        crate::init();
        let mut provider = Self {
            backend,
            categories: config.provider.categories.clone(),
            cache_path: config.cache.path.clone(),
            items: Vec::new(),
        };
        provider
            .refresh()
            .with_context(|| format!("Error init {} provider", provider.backend.provider_name()))?;
        Ok(provider)
    }

    /// Run a new enumeration pass; the previous items are replaced only on success.
    pub fn refresh(&mut self) -> Result<()> {
        let mut items = Vec::new();

        for category in &self.categories {
            let store = match self.backend.open_store(category, OpenMode::ReadOnly) {
                Ok(store) => store,
                Err(e) => {
                    tracing::warn!(category = %category, error = %e, "Error open store, skipping");
                    continue;
                }
            };
            self.enum_certificates(&store, category, &mut items)
                .context("Error enum certificates in store")?;
            self.enum_crls(&store, category, &mut items)
                .context("Error enum CRLs in store")?;
        }

        tracing::info!(
            provider = self.backend.provider_name(),
            count = items.len(),
            "Store enumeration complete"
        );
        self.items = items;
        Ok(())
    }

    fn enum_certificates(&self, store: &B::Store, category: &str, items: &mut Vec<PkiItem>) -> Result<()> {
        for context in store.certificates()? {
            let cert = Certificate::from_der(context.encoded())?;
            let has_key = context.key_provider_info().is_some();
            tracing::debug!(category, subject = %cert.subject_name(), "Certificate enumerated");
            items.push(PkiItem::from_certificate(
                &cert,
                self.backend.provider_name(),
                category,
                has_key,
            )?);
        }
        Ok(())
    }

    fn enum_crls(&self, store: &B::Store, category: &str, items: &mut Vec<PkiItem>) -> Result<()> {
        for context in store.crls()? {
            let crl = Crl::from_der(context.encoded())?;
            tracing::debug!(category, issuer = %crl.issuer_name(), "CRL enumerated");
            items.push(PkiItem::from_crl(&crl, self.backend.provider_name(), category)?);
        }
        Ok(())
    }

    pub fn provider_name(&self) -> &str {
        self.backend.provider_name()
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Items of the last enumeration pass.
    pub fn items(&self) -> &[PkiItem] {
        &self.items
    }

    pub fn find(&self, filter: &PkiFilter) -> Vec<&PkiItem> {
        filter.apply(&self.items)
    }

    /// Write the current items to the configured cache file.
    pub fn save_cache(&self) -> Result<()> {
        let path = self
            .cache_path
            .as_ref()
            .ok_or_else(|| PkiError::invalid_input("No cache path configured"))?;
        let mut cache = PkiItemCache::new(path);
        cache.import(&self.items);
        cache.save()
    }

    /// Certificate in `category` whose SHA-1 thumbprint is `hash` (hex, either case).
    ///
    /// Text that is not a thumbprint matches nothing.
    pub fn lookup_certificate(&self, hash: &str, category: &str) -> Result<Certificate> {
        self.find_certificate(hash, category)
            .context("Error get certificate")
    }

    fn find_certificate(&self, hash: &str, category: &str) -> Result<Certificate> {
        let thumbprint = Thumbprint::from_hex(hash).map_err(|e| PkiError::NotFound {
            context: format!("Cannot find certificate {} in {}", hash, category),
            source: Some(Box::new(e)),
        })?;

        let store = self.open_for_lookup(category)?;
        let context = store.find_certificate_by_hash(&thumbprint)?.ok_or_else(|| {
            PkiError::not_found(format!("Cannot find certificate {} in {}", hash, category))
        })?;
        Certificate::from_der(context.encoded())
    }

    /// CRL in `category` whose thumbprint text equals `hash` exactly.
    pub fn lookup_crl(&self, hash: &str, category: &str) -> Result<Crl> {
        self.find_crl(hash, category).context("Error get CRL")
    }

    fn find_crl(&self, hash: &str, category: &str) -> Result<Crl> {
        let store = self.open_for_lookup(category)?;
        for context in store.crls()? {
            let crl = Crl::from_der(context.encoded())?;
            if crl.thumbprint()?.to_hex() == hash {
                return Ok(crl);
            }
        }
        Err(PkiError::not_found(format!(
            "Cannot find CRL {} in {}",
            hash, category
        )))
    }

    fn open_for_lookup(&self, category: &str) -> Result<B::Store> {
        self.backend
            .open_store(category, OpenMode::ReadOnly)
            .map_err(|e| PkiError::NotFound {
                context: format!("Error open store {}", category),
                source: Some(Box::new(e)),
            })
    }

    /// Add or replace a certificate, optionally paired with a key container.
    pub fn add_certificate(
        &self,
        cert: &Certificate,
        category: &str,
        container: Option<&KeyContainerSpec>,
    ) -> Result<()> {
        self.store_certificate(cert, category, container)
            .context("Error add certificate to store")
    }

    fn store_certificate(
        &self,
        cert: &Certificate,
        category: &str,
        container: Option<&KeyContainerSpec>,
    ) -> Result<()> {
        let mut context = self.backend.create_certificate_context(&cert.encoded()?)?;

        if let Some(spec) = container.filter(|spec| !spec.name.is_empty() && spec.provider_type != 0) {
            let info = self.container_key_info(spec)?;
            context.set_key_provider_info(info)?;
        }

        let store = self.backend.open_store(category, OpenMode::ReadWrite)?;
        store.add_or_replace_certificate(&context)?;

        tracing::info!(
            category,
            subject = %cert.subject_name(),
            key = container.is_some(),
            "Certificate added to store"
        );
        Ok(())
    }

    /// Key-provider association for the signature key of a container, or its
    /// exchange key when there is no signature key.
    fn container_key_info(&self, spec: &KeyContainerSpec) -> Result<KeyProviderInfo> {
        let container = self.backend.acquire_container(&spec.name, spec.provider_type)?;

        let (key, key_spec) = match container.user_key(KeySpec::Signature)? {
            Some(key) => (key, KeySpec::Signature),
            None => match container.user_key(KeySpec::KeyExchange)? {
                Some(key) => (key, KeySpec::KeyExchange),
                None => {
                    return Err(PkiError::not_found(format!(
                        "Container {} holds no key",
                        spec.name
                    )))
                }
            },
        };

        let provider_type = ProviderType::for_algorithm(key.algorithm_id()?)?;
        Ok(KeyProviderInfo {
            container_name: spec.name.clone(),
            provider_name: provider_type.name().to_string(),
            provider_type,
            key_spec,
        })
    }

    /// Add or replace a CRL.
    pub fn add_crl(&self, crl: &Crl, category: &str) -> Result<()> {
        let result = (|| -> Result<()> {
            let context = self.backend.create_crl_context(&crl.encoded()?)?;
            let store = self.backend.open_store(category, OpenMode::ReadWrite)?;
            store.add_or_replace_crl(&context)
        })();
        result.context("Error add CRL to store")?;
        tracing::info!(category, issuer = %crl.issuer_name(), "CRL added to store");
        Ok(())
    }

    pub fn delete_certificate(&self, cert: &Certificate, category: &str) -> Result<()> {
        let result = (|| -> Result<()> {
            let needle = self.backend.create_certificate_context(&cert.encoded()?)?;
            let store = self.backend.open_store(category, OpenMode::ReadWrite)?;
            let found = store
                .find_existing_certificate(&needle)?
                .ok_or_else(|| PkiError::not_found("Cannot find existing certificate"))?;
            store.delete_certificate(found)
        })();
        result.context("Error delete certificate")?;
        tracing::info!(category, subject = %cert.subject_name(), "Certificate deleted from store");
        Ok(())
    }

    pub fn delete_crl(&self, crl: &Crl, category: &str) -> Result<()> {
        let result = (|| -> Result<()> {
            let needle = self.backend.create_crl_context(&crl.encoded()?)?;
            let store = self.backend.open_store(category, OpenMode::ReadWrite)?;
            let found = store
                .find_existing_crl(&needle)?
                .ok_or_else(|| PkiError::not_found("Cannot find existing CRL"))?;
            store.delete_crl(found)
        })();
        result.context("Error delete CRL")?;
        tracing::info!(category, issuer = %crl.issuer_name(), "CRL deleted from store");
        Ok(())
    }

    /// Whether `cert` is in the personal store with key-provider metadata.
    pub fn has_private_key(&self, cert: &Certificate) -> Result<bool> {
        let result = (|| -> Result<bool> {
            let needle = self.backend.create_certificate_context(&cert.encoded()?)?;
            let store = self.backend.open_store(PERSONAL_CATEGORY, OpenMode::ReadOnly)?;
            Ok(store
                .find_existing_certificate(&needle)?
                .map(|found| found.key_provider_info().is_some())
                .unwrap_or(false))
        })();
        result.context("Error check key existing")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::key_provider::AlgorithmId;
    use crate::memory_store::MemoryBackend;
    use crate::pki_item::PkiItemKind;
    use crate::test_support::{ec_key, self_signed, signed_crl};
    use crate::thumbprint::THUMBPRINT_LEN;

    fn seeded() -> (MemoryBackend, Certificate, Crl) {
        let backend = MemoryBackend::new();
        let (cert, _) = self_signed("/CN=alice/O=Org");
        let crl = signed_crl(&ec_key(), "/CN=Test CA", &[]);
        backend
            .add_certificate_der("MY", &cert.encoded().unwrap(), None)
            .unwrap();
        backend.add_crl_der("CA", &crl.encoded().unwrap()).unwrap();
        (backend, cert, crl)
    }

    #[test]
    fn test_enumeration_builds_items() {
        let (backend, cert, crl) = seeded();
        let provider = StoreProvider::new(backend.clone()).unwrap();

        let items = provider.items();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].kind, PkiItemKind::Certificate);
        assert_eq!(items[0].category, "MY");
        assert_eq!(items[0].hash, cert.thumbprint().unwrap().to_hex());
        assert_eq!(items[1].kind, PkiItemKind::Crl);
        assert_eq!(items[1].category, "CA");
        assert_eq!(items[1].hash, crl.thumbprint().unwrap().to_hex());
        assert_eq!(items[0].provider, "MEMORY");
        assert_eq!(backend.open_handles(), 0);
    }

    #[test]
    fn test_unopenable_category_is_skipped() {
        let (backend, _, _) = seeded();
        backend.mark_unavailable("CA").unwrap();

        let provider = StoreProvider::new(backend.clone()).unwrap();
        assert_eq!(provider.items().len(), 1);
        assert_eq!(backend.open_handles(), 0);
    }

    #[test]
    fn test_undecodable_entry_fails_enumeration() {
        let (backend, _, _) = seeded();
        backend.add_certificate_der("ROOT", b"not a certificate", None).unwrap();

        let err = StoreProvider::new(backend.clone()).err().unwrap();
        assert_eq!(err.kind(), ErrorKind::Parse);
        assert_eq!(backend.open_handles(), 0);
    }

    #[test]
    fn test_configured_categories() {
        let (backend, _, _) = seeded();
        let mut config = ProviderConfig::default();
        config.provider.categories = vec!["CA".to_string()];

        let provider = StoreProvider::with_config(backend, &config).unwrap();
        assert_eq!(provider.items().len(), 1);
        assert_eq!(provider.items()[0].kind, PkiItemKind::Crl);
    }

    #[test]
    fn test_save_cache() {
        let (backend, _, _) = seeded();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("items.json");

        let err = StoreProvider::new(backend.clone()).unwrap().save_cache().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);

        let mut config = ProviderConfig::default();
        config.cache.path = Some(path.clone());
        let provider = StoreProvider::with_config(backend, &config).unwrap();
        provider.save_cache().unwrap();

        let mut cache = PkiItemCache::new(&path);
        cache.load().unwrap();
        assert_eq!(cache.items(), provider.items());
    }

    #[test]
    fn test_lookup_certificate() {
        let (backend, cert, _) = seeded();
        let provider = StoreProvider::new(backend.clone()).unwrap();
        let hash = cert.thumbprint().unwrap().to_hex();

        let found = provider.lookup_certificate(&hash, "MY").unwrap();
        assert_eq!(found.thumbprint().unwrap().to_hex(), hash);
        // hex decode is case-insensitive
        assert!(provider.lookup_certificate(&hash.to_uppercase(), "MY").is_ok());

        let absent = "00".repeat(THUMBPRINT_LEN);
        let err = provider.lookup_certificate(&absent, "MY").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        let err = provider.lookup_certificate("abcd", "MY").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        let err = provider.lookup_certificate("not hex", "MY").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        backend.mark_unavailable("TRUST").unwrap();
        let err = provider.lookup_certificate(&hash, "TRUST").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(backend.open_handles(), 0);
    }

    #[test]
    fn test_lookup_crl_is_case_sensitive() {
        let (backend, _, crl) = seeded();
        let provider = StoreProvider::new(backend.clone()).unwrap();
        let hash = crl.thumbprint().unwrap().to_hex();

        assert!(provider.lookup_crl(&hash, "CA").unwrap().equals(&crl));
        let err = provider.lookup_crl(&hash.to_uppercase(), "CA").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(backend.open_handles(), 0);
    }

    #[test]
    fn test_add_with_container_pairs_key() {
        let backend = MemoryBackend::new();
        backend
            .add_container(
                "alice-key",
                75,
                &[(KeySpec::KeyExchange, AlgorithmId::DH_EL_SF)],
            )
            .unwrap();
        let provider = StoreProvider::new(backend.clone()).unwrap();
        let (cert, _) = self_signed("/CN=alice");

        assert!(!provider.has_private_key(&cert).unwrap());

        let spec = KeyContainerSpec::new("alice-key", 75);
        provider.add_certificate(&cert, "MY", Some(&spec)).unwrap();
        assert!(provider.has_private_key(&cert).unwrap());

        // adding again replaces the entry
        provider.add_certificate(&cert, "MY", Some(&spec)).unwrap();
        assert_eq!(backend.certificate_count("MY").unwrap(), 1);
        assert_eq!(backend.open_handles(), 0);
    }

    #[test]
    fn test_enumeration_reports_paired_key() {
        let backend = MemoryBackend::new();
        let (cert, _) = self_signed("/CN=carol");
        let info = KeyProviderInfo {
            container_name: "carol-key".to_string(),
            provider_name: ProviderType::EcEcdsaFull.name().to_string(),
            provider_type: ProviderType::EcEcdsaFull,
            key_spec: KeySpec::Signature,
        };
        backend
            .add_certificate_der("MY", &cert.encoded().unwrap(), Some(info))
            .unwrap();

        let provider = StoreProvider::new(backend.clone()).unwrap();
        let items = provider.items();
        assert_eq!(items.len(), 1);
        assert!(items[0].has_key());
        assert!(provider.has_private_key(&cert).unwrap());
    }

    #[test]
    fn test_container_signature_key_is_preferred() {
        let backend = MemoryBackend::new();
        backend
            .add_container(
                "dual-key",
                24,
                &[
                    (KeySpec::KeyExchange, AlgorithmId::ECDH),
                    (KeySpec::Signature, AlgorithmId::RSA_SIGN),
                ],
            )
            .unwrap();
        let provider = StoreProvider::new(backend.clone()).unwrap();
        let (cert, _) = self_signed("/CN=dual");

        let spec = KeyContainerSpec::new("dual-key", 24);
        provider.add_certificate(&cert, "MY", Some(&spec)).unwrap();

        {
            let store = backend.open_store("MY", OpenMode::ReadOnly).unwrap();
            let entry = store
                .find_certificate_by_hash(&cert.thumbprint().unwrap())
                .unwrap()
                .unwrap();
            let info = entry.key_provider_info().unwrap();
            assert_eq!(info.container_name, "dual-key");
            assert_eq!(info.key_spec, KeySpec::Signature);
            assert_eq!(info.provider_type, ProviderType::RsaAes);
            assert_eq!(info.provider_name, ProviderType::RsaAes.name());
        }
        assert_eq!(backend.open_handles(), 0);
    }

    #[test]
    fn test_add_without_container_has_no_key() {
        let backend = MemoryBackend::new();
        let mut provider = StoreProvider::new(backend.clone()).unwrap();
        let (cert, _) = self_signed("/CN=bob");

        provider.add_certificate(&cert, "MY", None).unwrap();
        assert!(!provider.has_private_key(&cert).unwrap());

        provider.refresh().unwrap();
        assert_eq!(provider.items().len(), 1);
        assert!(!provider.items()[0].has_key());
    }

    #[test]
    fn test_unsupported_container_algorithm_releases_handles() {
        let backend = MemoryBackend::new();
        backend
            .add_container("odd", 24, &[(KeySpec::Signature, AlgorithmId(0x6610))])
            .unwrap();
        let provider = StoreProvider::new(backend.clone()).unwrap();
        let (cert, _) = self_signed("/CN=odd");

        let err = provider
            .add_certificate(&cert, "MY", Some(&KeyContainerSpec::new("odd", 24)))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnsupportedAlgorithm);
        assert_eq!(backend.certificate_count("MY").unwrap(), 0);
        assert_eq!(backend.open_handles(), 0);
    }

    #[test]
    fn test_empty_container_is_not_found() {
        let backend = MemoryBackend::new();
        backend.add_container("empty", 16, &[]).unwrap();
        let provider = StoreProvider::new(backend.clone()).unwrap();
        let (cert, _) = self_signed("/CN=e");

        let err = provider
            .add_certificate(&cert, "MY", Some(&KeyContainerSpec::new("empty", 16)))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(backend.open_handles(), 0);
    }

    #[test]
    fn test_delete() {
        let (backend, cert, crl) = seeded();
        let provider = StoreProvider::new(backend.clone()).unwrap();

        provider.delete_certificate(&cert, "MY").unwrap();
        assert_eq!(backend.certificate_count("MY").unwrap(), 0);
        let err = provider.delete_certificate(&cert, "MY").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        provider.delete_crl(&crl, "CA").unwrap();
        let err = provider.delete_crl(&crl, "CA").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(backend.open_handles(), 0);
    }

    #[test]
    fn test_add_crl_and_find() {
        let backend = MemoryBackend::new();
        let mut provider = StoreProvider::new(backend.clone()).unwrap();
        let crl = signed_crl(&ec_key(), "/CN=Test CA", &[]);

        provider.add_crl(&crl, "CA").unwrap();
        provider.add_crl(&crl, "CA").unwrap();
        assert_eq!(backend.crl_count("CA").unwrap(), 1);

        provider.refresh().unwrap();
        let found = provider.find(&PkiFilter::new().kind(PkiItemKind::Crl).category("CA"));
        assert_eq!(found.len(), 1);
        assert_eq!(backend.open_handles(), 0);
    }
}
