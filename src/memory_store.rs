//! In-process native store.
//!
//! [`MemoryBackend`] implements the [`native_store`](crate::native_store)
//! traits over shared in-memory state. Every handle it returns is counted
//! while alive, so callers can check that nothing leaked with
//! [`MemoryBackend::open_handles`].

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::error::{PkiError, Result};
use crate::key_provider::{AlgorithmId, KeyProviderInfo, KeySpec};
use crate::native_store::{
    CertificateContext, ContainerKey, CrlContext, KeyContainer, NativeBackend, NativeStore,
    OpenMode,
};
use crate::thumbprint::Thumbprint;

pub const MEMORY_PROVIDER_NAME: &str = "MEMORY";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum HandleKind {
    Store,
    Certificate,
    Crl,
    Container,
    Key,
}

const HANDLE_KINDS: usize = 5;

impl HandleKind {
    fn index(self) -> usize {
        self as usize
    }
}

#[derive(Debug, Clone)]
struct CertEntry {
    der: Vec<u8>,
    key_info: Option<KeyProviderInfo>,
}

#[derive(Debug, Default)]
struct Category {
    certificates: Vec<CertEntry>,
    crls: Vec<Vec<u8>>,
}

#[derive(Debug, Clone)]
struct ContainerRecord {
    provider_type: u32,
    keys: HashMap<KeySpec, AlgorithmId>,
}

#[derive(Debug, Default)]
struct State {
    categories: BTreeMap<String, Category>,
    containers: HashMap<String, ContainerRecord>,
    unavailable: HashSet<String>,
}

#[derive(Debug, Default)]
struct Shared {
    state: Mutex<State>,
    handles: [AtomicUsize; HANDLE_KINDS],
}

impl Shared {
    fn lock(&self) -> Result<MutexGuard<'_, State>> {
        self.state
            .lock()
            .map_err(|_| PkiError::store("Memory store state poisoned"))
    }
}

/// Decrements its handle counter when dropped.
#[derive(Debug)]
struct HandleGuard {
    shared: Arc<Shared>,
    kind: HandleKind,
}

impl HandleGuard {
    fn acquire(shared: &Arc<Shared>, kind: HandleKind) -> Self {
        shared.handles[kind.index()].fetch_add(1, Ordering::SeqCst);
        Self {
            shared: Arc::clone(shared),
            kind,
        }
    }
}

impl Drop for HandleGuard {
    fn drop(&mut self) {
        self.shared.handles[self.kind.index()].fetch_sub(1, Ordering::SeqCst);
    }
}

/// In-memory category store with key containers.
#[derive(Debug, Clone)]
pub struct MemoryBackend {
    shared: Arc<Shared>,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBackend {
    /// Backend with the standard categories, all empty.
    pub fn new() -> Self {
        Self::with_categories(crate::CATEGORIES)
    }

    pub fn with_categories<S: AsRef<str>>(categories: &[S]) -> Self {
        let state = State {
            categories: categories
                .iter()
                .map(|c| (c.as_ref().to_string(), Category::default()))
                .collect(),
            ..State::default()
        };
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(state),
                handles: Default::default(),
            }),
        }
    }

    /// Seed a certificate entry directly.
    pub fn add_certificate_der(
        &self,
        category: &str,
        der: &[u8],
        key_info: Option<KeyProviderInfo>,
    ) -> Result<()> {
        let mut state = self.shared.lock()?;
        let category = category_mut(&mut state, category)?;
        category.certificates.push(CertEntry {
            der: der.to_vec(),
            key_info,
        });
        Ok(())
    }

    /// Seed a CRL entry directly.
    pub fn add_crl_der(&self, category: &str, der: &[u8]) -> Result<()> {
        let mut state = self.shared.lock()?;
        category_mut(&mut state, category)?.crls.push(der.to_vec());
        Ok(())
    }

    /// Register a key container holding keys of the given algorithms.
    pub fn add_container(&self, name: &str, provider_type: u32, keys: &[(KeySpec, AlgorithmId)]) -> Result<()> {
        let mut state = self.shared.lock()?;
        state.containers.insert(
            name.to_string(),
            ContainerRecord {
                provider_type,
                keys: keys.iter().copied().collect(),
            },
        );
        Ok(())
    }

    /// Make every later open of `category` fail.
    pub fn mark_unavailable(&self, category: &str) -> Result<()> {
        self.shared.lock()?.unavailable.insert(category.to_string());
        Ok(())
    }

    pub fn certificate_count(&self, category: &str) -> Result<usize> {
        let state = self.shared.lock()?;
        Ok(state
            .categories
            .get(category)
            .map(|c| c.certificates.len())
            .unwrap_or(0))
    }

    pub fn crl_count(&self, category: &str) -> Result<usize> {
        let state = self.shared.lock()?;
        Ok(state.categories.get(category).map(|c| c.crls.len()).unwrap_or(0))
    }

    /// Handles of any kind currently alive.
    pub fn open_handles(&self) -> usize {
        self.shared
            .handles
            .iter()
            .map(|count| count.load(Ordering::SeqCst))
            .sum()
    }
}

fn category_mut<'a>(state: &'a mut State, name: &str) -> Result<&'a mut Category> {
    state
        .categories
        .get_mut(name)
        .ok_or_else(|| PkiError::store(format!("No such category: {}", name)))
}

impl NativeBackend for MemoryBackend {
    type Store = MemoryStore;
    type Container = MemoryContainer;

    fn provider_name(&self) -> &str {
        MEMORY_PROVIDER_NAME
    }

    fn open_store(&self, category: &str, mode: OpenMode) -> Result<MemoryStore> {
        let state = self.shared.lock()?;
        if state.unavailable.contains(category) || !state.categories.contains_key(category) {
            return Err(PkiError::store(format!("Unable to open store {}", category)));
        }
        Ok(MemoryStore {
            shared: Arc::clone(&self.shared),
            category: category.to_string(),
            mode,
            _guard: HandleGuard::acquire(&self.shared, HandleKind::Store),
        })
    }

    fn create_certificate_context(&self, der: &[u8]) -> Result<MemoryCertContext> {
        if der.is_empty() {
            return Err(PkiError::invalid_input("Empty certificate encoding"));
        }
        Ok(MemoryCertContext::new(&self.shared, der.to_vec(), None))
    }

    fn create_crl_context(&self, der: &[u8]) -> Result<MemoryCrlContext> {
        if der.is_empty() {
            return Err(PkiError::invalid_input("Empty CRL encoding"));
        }
        Ok(MemoryCrlContext::new(&self.shared, der.to_vec()))
    }

    fn acquire_container(&self, name: &str, provider_type: u32) -> Result<MemoryContainer> {
        let state = self.shared.lock()?;
        let record = state
            .containers
            .get(name)
            .filter(|record| record.provider_type == provider_type)
            .ok_or_else(|| {
                PkiError::store(format!(
                    "Unable to acquire container {} (provider type {})",
                    name, provider_type
                ))
            })?;
        Ok(MemoryContainer {
            keys: record.keys.clone(),
            shared: Arc::clone(&self.shared),
            _guard: HandleGuard::acquire(&self.shared, HandleKind::Container),
        })
    }
}

#[derive(Debug)]
pub struct MemoryStore {
    shared: Arc<Shared>,
    category: String,
    mode: OpenMode,
    _guard: HandleGuard,
}

impl MemoryStore {
    fn check_writable(&self) -> Result<()> {
        match self.mode {
            OpenMode::ReadWrite => Ok(()),
            OpenMode::ReadOnly => Err(PkiError::store(format!(
                "Store {} is opened read-only",
                self.category
            ))),
        }
    }
}

impl NativeStore for MemoryStore {
    type CertContext = MemoryCertContext;
    type CrlContext = MemoryCrlContext;

    fn certificates(&self) -> Result<Vec<MemoryCertContext>> {
        let mut state = self.shared.lock()?;
        let category = category_mut(&mut state, &self.category)?;
        Ok(category
            .certificates
            .iter()
            .map(|entry| MemoryCertContext::new(&self.shared, entry.der.clone(), entry.key_info.clone()))
            .collect())
    }

    fn crls(&self) -> Result<Vec<MemoryCrlContext>> {
        let mut state = self.shared.lock()?;
        let category = category_mut(&mut state, &self.category)?;
        Ok(category
            .crls
            .iter()
            .map(|der| MemoryCrlContext::new(&self.shared, der.clone()))
            .collect())
    }

    fn find_certificate_by_hash(&self, hash: &Thumbprint) -> Result<Option<MemoryCertContext>> {
        let mut state = self.shared.lock()?;
        let category = category_mut(&mut state, &self.category)?;
        Ok(category
            .certificates
            .iter()
            .find(|entry| Thumbprint::of(&entry.der) == *hash)
            .map(|entry| MemoryCertContext::new(&self.shared, entry.der.clone(), entry.key_info.clone())))
    }

    fn find_existing_certificate(&self, needle: &MemoryCertContext) -> Result<Option<MemoryCertContext>> {
        self.find_certificate_by_hash(&needle.thumbprint())
    }

    fn find_existing_crl(&self, needle: &MemoryCrlContext) -> Result<Option<MemoryCrlContext>> {
        let hash = needle.thumbprint();
        let mut state = self.shared.lock()?;
        let category = category_mut(&mut state, &self.category)?;
        Ok(category
            .crls
            .iter()
            .find(|der| Thumbprint::of(der) == hash)
            .map(|der| MemoryCrlContext::new(&self.shared, der.clone())))
    }

    fn add_or_replace_certificate(&self, context: &MemoryCertContext) -> Result<()> {
        self.check_writable()?;
        let hash = context.thumbprint();
        let entry = CertEntry {
            der: context.der.clone(),
            key_info: context.key_info.clone(),
        };

        let mut state = self.shared.lock()?;
        let category = category_mut(&mut state, &self.category)?;
        match category
            .certificates
            .iter_mut()
            .find(|existing| Thumbprint::of(&existing.der) == hash)
        {
            Some(existing) => *existing = entry,
            None => category.certificates.push(entry),
        }
        Ok(())
    }

    fn add_or_replace_crl(&self, context: &MemoryCrlContext) -> Result<()> {
        self.check_writable()?;
        let hash = context.thumbprint();

        let mut state = self.shared.lock()?;
        let category = category_mut(&mut state, &self.category)?;
        match category.crls.iter_mut().find(|der| Thumbprint::of(der) == hash) {
            Some(existing) => *existing = context.der.clone(),
            None => category.crls.push(context.der.clone()),
        }
        Ok(())
    }

    fn delete_certificate(&self, context: MemoryCertContext) -> Result<()> {
        self.check_writable()?;
        let hash = context.thumbprint();

        let mut state = self.shared.lock()?;
        let category = category_mut(&mut state, &self.category)?;
        let before = category.certificates.len();
        category
            .certificates
            .retain(|entry| Thumbprint::of(&entry.der) != hash);
        if category.certificates.len() == before {
            return Err(PkiError::not_found(format!(
                "Certificate {} is not in {}",
                hash, self.category
            )));
        }
        Ok(())
    }

    fn delete_crl(&self, context: MemoryCrlContext) -> Result<()> {
        self.check_writable()?;
        let hash = context.thumbprint();

        let mut state = self.shared.lock()?;
        let category = category_mut(&mut state, &self.category)?;
        let before = category.crls.len();
        category.crls.retain(|der| Thumbprint::of(der) != hash);
        if category.crls.len() == before {
            return Err(PkiError::not_found(format!(
                "CRL {} is not in {}",
                hash, self.category
            )));
        }
        Ok(())
    }
}

#[derive(Debug)]
pub struct MemoryCertContext {
    der: Vec<u8>,
    key_info: Option<KeyProviderInfo>,
    _guard: HandleGuard,
}

impl MemoryCertContext {
    fn new(shared: &Arc<Shared>, der: Vec<u8>, key_info: Option<KeyProviderInfo>) -> Self {
        Self {
            der,
            key_info,
            _guard: HandleGuard::acquire(shared, HandleKind::Certificate),
        }
    }
}

impl CertificateContext for MemoryCertContext {
    fn encoded(&self) -> &[u8] {
        &self.der
    }

    fn key_provider_info(&self) -> Option<KeyProviderInfo> {
        self.key_info.clone()
    }

    fn set_key_provider_info(&mut self, info: KeyProviderInfo) -> Result<()> {
        self.key_info = Some(info);
        Ok(())
    }
}

#[derive(Debug)]
pub struct MemoryCrlContext {
    der: Vec<u8>,
    _guard: HandleGuard,
}

impl MemoryCrlContext {
    fn new(shared: &Arc<Shared>, der: Vec<u8>) -> Self {
        Self {
            der,
            _guard: HandleGuard::acquire(shared, HandleKind::Crl),
        }
    }
}

impl CrlContext for MemoryCrlContext {
    fn encoded(&self) -> &[u8] {
        &self.der
    }
}

#[derive(Debug)]
pub struct MemoryContainer {
    keys: HashMap<KeySpec, AlgorithmId>,
    shared: Arc<Shared>,
    _guard: HandleGuard,
}

impl KeyContainer for MemoryContainer {
    type Key = MemoryKey;

    fn user_key(&self, spec: KeySpec) -> Result<Option<MemoryKey>> {
        Ok(self.keys.get(&spec).map(|algorithm| MemoryKey {
            algorithm: *algorithm,
            _guard: HandleGuard::acquire(&self.shared, HandleKind::Key),
        }))
    }
}

#[derive(Debug)]
pub struct MemoryKey {
    algorithm: AlgorithmId,
    _guard: HandleGuard,
}

impl ContainerKey for MemoryKey {
    fn algorithm_id(&self) -> Result<AlgorithmId> {
        Ok(self.algorithm)
    }
}
