//! Error types shared by the certificate model and the store provider.
//!
//! Every failure carries one of the [`ErrorKind`] categories. Lower layers
//! produce a concrete variant (for example [`PkiError::Parse`]); each calling
//! layer may wrap it with [`ResultExt::context`] to state what it was doing.
//! The wrapped error stays reachable through [`std::error::Error::source`] and
//! [`PkiError::kind`] keeps reporting the innermost category.

use std::fmt;
use thiserror::Error;

/// Boxed low-level cause kept for diagnostics.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, PkiError>;

/// Category of a [`PkiError`], stable across context wrapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidInput,
    Parse,
    Encoding,
    SignatureVerification,
    UnsupportedAlgorithm,
    StoreAccess,
    NotFound,
    Clone,
    Io,
}

/// Why a signature check failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerificationFailure {
    /// The check itself could not run (bad key, unknown algorithm, malformed signature).
    Errored,
    /// The check ran and the signature does not match the signed data.
    Mismatch,
}

impl fmt::Display for VerificationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VerificationFailure::Errored => f.write_str("verification errored"),
            VerificationFailure::Mismatch => f.write_str("signature mismatch"),
        }
    }
}

#[derive(Debug, Error)]
pub enum PkiError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Parse error: {context}")]
    Parse {
        context: String,
        #[source]
        source: Option<BoxError>,
    },

    #[error("Encoding error: {context}")]
    Encoding {
        context: String,
        #[source]
        source: Option<BoxError>,
    },

    #[error("Signature verification error ({reason}): {context}")]
    SignatureVerification {
        reason: VerificationFailure,
        context: String,
        #[source]
        source: Option<BoxError>,
    },

    #[error("Unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),

    #[error("Store access error: {context}")]
    StoreAccess {
        context: String,
        #[source]
        source: Option<BoxError>,
    },

    #[error("Not found: {context}")]
    NotFound {
        context: String,
        #[source]
        source: Option<Box<PkiError>>,
    },

    #[error("Clone error: {context}")]
    Clone {
        context: String,
        #[source]
        source: Option<BoxError>,
    },

    #[error("I/O error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    /// An error wrapped with a description of the operation that failed.
    #[error("{context}")]
    Context {
        context: String,
        #[source]
        source: Box<PkiError>,
    },
}

impl PkiError {
    /// Category of the innermost concrete error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            PkiError::InvalidInput(_) => ErrorKind::InvalidInput,
            PkiError::Parse { .. } => ErrorKind::Parse,
            PkiError::Encoding { .. } => ErrorKind::Encoding,
            PkiError::SignatureVerification { .. } => ErrorKind::SignatureVerification,
            PkiError::UnsupportedAlgorithm(_) => ErrorKind::UnsupportedAlgorithm,
            PkiError::StoreAccess { .. } => ErrorKind::StoreAccess,
            PkiError::NotFound { .. } => ErrorKind::NotFound,
            PkiError::Clone { .. } => ErrorKind::Clone,
            PkiError::Io { .. } => ErrorKind::Io,
            PkiError::Context { source, .. } => source.kind(),
        }
    }

    /// Reason of a signature failure, looking through context wrappers.
    pub fn verification_failure(&self) -> Option<VerificationFailure> {
        match self {
            PkiError::SignatureVerification { reason, .. } => Some(*reason),
            PkiError::Context { source, .. } => source.verification_failure(),
            _ => None,
        }
    }

    pub fn invalid_input(context: impl Into<String>) -> Self {
        PkiError::InvalidInput(context.into())
    }

    pub fn parse(context: impl Into<String>, source: impl Into<BoxError>) -> Self {
        PkiError::Parse {
            context: context.into(),
            source: Some(source.into()),
        }
    }

    pub fn encoding(context: impl Into<String>, source: impl Into<BoxError>) -> Self {
        PkiError::Encoding {
            context: context.into(),
            source: Some(source.into()),
        }
    }

    pub fn encoding_msg(context: impl Into<String>) -> Self {
        PkiError::Encoding {
            context: context.into(),
            source: None,
        }
    }

    pub fn verification(reason: VerificationFailure, context: impl Into<String>) -> Self {
        PkiError::SignatureVerification {
            reason,
            context: context.into(),
            source: None,
        }
    }

    pub fn unsupported(context: impl Into<String>) -> Self {
        PkiError::UnsupportedAlgorithm(context.into())
    }

    pub fn store(context: impl Into<String>) -> Self {
        PkiError::StoreAccess {
            context: context.into(),
            source: None,
        }
    }

    pub fn not_found(context: impl Into<String>) -> Self {
        PkiError::NotFound {
            context: context.into(),
            source: None,
        }
    }

    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        PkiError::Io {
            context: context.into(),
            source,
        }
    }

    /// Wrap `self` with the operation that was being attempted.
    pub fn context(self, context: impl Into<String>) -> Self {
        PkiError::Context {
            context: context.into(),
            source: Box::new(self),
        }
    }
}

/// Adds `.context(...)` to crate results, in the spirit of `anyhow::Context`
/// but keeping the typed [`ErrorKind`].
pub trait ResultExt<T> {
    fn context(self, context: impl Into<String>) -> Result<T>;

    fn with_context<F, C>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> C,
        C: Into<String>;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.context(context))
    }

    fn with_context<F, C>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> C,
        C: Into<String>,
    {
        self.map_err(|e| e.context(f()))
    }
}
