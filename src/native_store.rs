//! Seams between the store provider and a native credential store.
//!
//! A [`NativeBackend`] opens category stores, turns encoded objects into
//! native contexts and acquires key containers. Every handle it hands out
//! (store, context, container, key) is an owned value that releases the
//! native resource when dropped, so callers get release on every exit path
//! by letting values fall out of scope.

use crate::error::Result;
use crate::key_provider::{AlgorithmId, KeyProviderInfo, KeySpec};
use crate::thumbprint::Thumbprint;

/// Access requested when opening a category.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    ReadOnly,
    ReadWrite,
}

/// Native certificate entry or a detached context built from an encoding.
pub trait CertificateContext {
    /// DER encoding of the certificate.
    fn encoded(&self) -> &[u8];

    /// Key-provider association, if the entry is paired with a private key.
    fn key_provider_info(&self) -> Option<KeyProviderInfo>;

    fn set_key_provider_info(&mut self, info: KeyProviderInfo) -> Result<()>;

    fn thumbprint(&self) -> Thumbprint {
        Thumbprint::of(self.encoded())
    }
}

/// Native CRL entry or a detached context built from an encoding.
pub trait CrlContext {
    fn encoded(&self) -> &[u8];

    fn thumbprint(&self) -> Thumbprint {
        Thumbprint::of(self.encoded())
    }
}

/// Key held by a container.
pub trait ContainerKey {
    fn algorithm_id(&self) -> Result<AlgorithmId>;
}

/// Open key container.
pub trait KeyContainer {
    type Key: ContainerKey;

    /// Key stored under `spec`, or `None` when the container has no such key.
    fn user_key(&self, spec: KeySpec) -> Result<Option<Self::Key>>;
}

/// One opened category store.
pub trait NativeStore {
    type CertContext: CertificateContext;
    type CrlContext: CrlContext;

    fn certificates(&self) -> Result<Vec<Self::CertContext>>;

    fn crls(&self) -> Result<Vec<Self::CrlContext>>;

    /// Hash-indexed certificate lookup.
    fn find_certificate_by_hash(&self, hash: &Thumbprint) -> Result<Option<Self::CertContext>>;

    /// Stored entry matching a detached context.
    fn find_existing_certificate(
        &self,
        needle: &Self::CertContext,
    ) -> Result<Option<Self::CertContext>>;

    fn find_existing_crl(&self, needle: &Self::CrlContext) -> Result<Option<Self::CrlContext>>;

    /// Insert, replacing an existing entry for the same object.
    fn add_or_replace_certificate(&self, context: &Self::CertContext) -> Result<()>;

    fn add_or_replace_crl(&self, context: &Self::CrlContext) -> Result<()>;

    /// Remove a stored entry previously returned by this store.
    fn delete_certificate(&self, context: Self::CertContext) -> Result<()>;

    fn delete_crl(&self, context: Self::CrlContext) -> Result<()>;
}

/// Native store implementation together with its key container access.
pub trait NativeBackend {
    type Store: NativeStore;
    type Container: KeyContainer;

    /// Name recorded as the provider of enumerated items.
    fn provider_name(&self) -> &str;

    fn open_store(&self, category: &str, mode: OpenMode) -> Result<Self::Store>;

    fn create_certificate_context(
        &self,
        der: &[u8],
    ) -> Result<<Self::Store as NativeStore>::CertContext>;

    fn create_crl_context(&self, der: &[u8]) -> Result<<Self::Store as NativeStore>::CrlContext>;

    fn acquire_container(&self, name: &str, provider_type: u32) -> Result<Self::Container>;
}
