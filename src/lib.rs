//! PKI Store - X.509 Objects over a Category-Partitioned Credential Store
//!
//! A library for working with certificates, certificate requests and CRLs, and for
//! keeping them in a native credential store split into named categories
//! (`MY`, `ROOT`, `CA`, ...). The native store sits behind a small set of traits, so the
//! same provider logic runs against a platform store or the bundled in-memory backend.
//!
//! # Overview
//!
//! ```text
//! RequestBuilder ──build──> CertificationRequest ──from_request──> Certificate ──sign──┐
//!                                                                                      v
//! StoreProvider<B: NativeBackend> ── enumerate / lookup / add / delete ──> category stores
//!        │
//!        └── PkiItem snapshots ── PkiFilter ── PkiItemCache (JSON)
//! ```
//!
//! # Features
//!
//! - **Certificate model**: decode, inspect, mutate, sign and verify X.509 certificates
//! - **Requests**: build and verify PKCS#10 certification requests
//! - **CRLs**: inspect revocation lists and look up revoked entries
//! - **Store provider**: enumerate categories and pair certificates with key containers
//! - **Formats**: DER and PEM (`BASE64`) on every import and export path
//!
//! # Quick Start
//!
//! ```no_run
//! use pki_store::certificate::Certificate;
//! use pki_store::memory_store::MemoryBackend;
//! use pki_store::provider::StoreProvider;
//! use pki_store::request::RequestBuilder;
//! use pki_store::Result;
//! # use openssl::pkey::{PKey, Private};
//!
//! # fn example(key: PKey<Private>) -> Result<()> {
//! let request = RequestBuilder::new()
//!     .subject("/CN=alice/O=ACME Corp")
//!     .build(&key)?;
//!
//! let mut cert = Certificate::from_request(&request)?;
//! cert.set_issuer(&request.subject_name())?;
//! cert.sign(&key, None)?;
//!
//! let provider = StoreProvider::new(MemoryBackend::new())?;
//! provider.add_certificate(&cert, "MY", None)?;
//! # Ok(())
//! # }
//! ```
//!
//! # Module Overview
//!
//! ## [`certificate`], [`request`], [`crl`]
//!
//! The object models. Each wraps the decoded ASN.1 structure and exposes inspection
//! values as display strings: names in slash format (`/CN=alice/O=ACME Corp`), times as
//! `Mon DD HH:MM:SS YYYY GMT`, serials as uppercase hex.
//!
//! ## [`provider`]
//!
//! [`StoreProvider`](provider::StoreProvider) enumerates the configured categories into
//! [`PkiItem`](pki_item::PkiItem) records and performs lookups and mutations, opening
//! native handles per operation.
//!
//! ## [`native_store`] and [`memory_store`]
//!
//! The backend traits and the in-process implementation used by tests and tooling.
//!
//! ## [`configs`]
//!
//! `config.toml` loading for the category list, certificate defaults and the item cache.
//!
//! # Error Handling
//!
//! Library APIs return [`Result<T>`] with a typed [`PkiError`]. Use
//! [`PkiError::kind`] to branch on the failure category; context wrappers added along
//! the way are looked through:
//!
//! ```no_run
//! use pki_store::{ErrorKind, Result};
//! use pki_store::memory_store::MemoryBackend;
//! use pki_store::provider::StoreProvider;
//!
//! fn example() -> Result<()> {
//!     let provider = StoreProvider::new(MemoryBackend::new())?;
//!     match provider.lookup_certificate("00112233445566778899aabbccddeeff00112233", "MY") {
//!         Ok(cert) => println!("found {}", cert.subject_name()),
//!         Err(e) if e.kind() == ErrorKind::NotFound => println!("absent"),
//!         Err(e) => return Err(e),
//!     }
//!     Ok(())
//! }
//! ```

use std::sync::Once;

pub mod algorithms;
pub mod certificate;
pub mod configs;
pub mod crl;
pub mod data_format;
pub mod error;
pub mod extensions;
pub mod key_provider;
pub mod memory_store;
pub mod name_codec;
pub mod native_store;
pub mod oids;
pub mod pki_item;
pub mod provider;
pub mod request;
pub mod thumbprint;
pub mod timefmt;

#[cfg(test)]
mod test_support;

pub use certificate::Certificate;
pub use crl::Crl;
pub use data_format::DataFormat;
pub use error::{ErrorKind, PkiError, Result, ResultExt, VerificationFailure};
pub use extensions::ExtensionCollection;
pub use pki_item::{PkiFilter, PkiItem, PkiItemKind};
pub use provider::StoreProvider;
pub use request::{CertificationRequest, RequestBuilder};

/// Store categories enumerated by default.
pub const CATEGORIES: &[&str] = &["MY", "AddressBook", "ROOT", "TRUST", "CA", "Request"];

static INIT: Once = Once::new();

/// One-time library initialization; called by every entry point that touches OpenSSL.
pub fn init() {
    INIT.call_once(|| {
        openssl::init();
        tracing::debug!("pki-store initialized");
    });
}
