//! Key container algorithms, provider types and key-provider metadata.
//!
//! When a certificate is added together with a key container, the algorithm
//! of the container's key decides which provider type is written into the
//! certificate's key-provider metadata. The mapping is a fixed table.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{PkiError, Result};

/// Algorithm identifier reported by a container key (`ALG_ID`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AlgorithmId(pub u32);

impl AlgorithmId {
    pub const GR3410EL: AlgorithmId = AlgorithmId(0x2e23);
    pub const DH_EL_SF: AlgorithmId = AlgorithmId(0xaa24);
    pub const GR3410_12_256: AlgorithmId = AlgorithmId(0x2e49);
    pub const DH_GR3410_12_256_SF: AlgorithmId = AlgorithmId(0xaa46);
    pub const GR3410_12_512: AlgorithmId = AlgorithmId(0x2e3d);
    pub const DH_GR3410_12_512_SF: AlgorithmId = AlgorithmId(0xaa42);
    pub const ECDSA: AlgorithmId = AlgorithmId(0x2203);
    pub const ECDH: AlgorithmId = AlgorithmId(0xaa05);
    pub const RSA_SIGN: AlgorithmId = AlgorithmId(0x2400);
    pub const RSA_KEYX: AlgorithmId = AlgorithmId(0xa400);
}

impl fmt::Display for AlgorithmId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:04x}", self.0)
    }
}

/// Provider families a container key can be bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProviderType {
    Gost2001Dh,
    #[cfg(feature = "gost-2012")]
    Gost2012_256,
    #[cfg(feature = "gost-2012")]
    Gost2012_512,
    EcEcdsaFull,
    RsaAes,
}

impl ProviderType {
    /// Numeric provider type (`PROV_*`).
    pub fn code(&self) -> u32 {
        match self {
            ProviderType::Gost2001Dh => 75,
            #[cfg(feature = "gost-2012")]
            ProviderType::Gost2012_256 => 80,
            #[cfg(feature = "gost-2012")]
            ProviderType::Gost2012_512 => 81,
            ProviderType::EcEcdsaFull => 16,
            ProviderType::RsaAes => 24,
        }
    }

    /// Default provider name for the type.
    pub fn name(&self) -> &'static str {
        match self {
            ProviderType::Gost2001Dh => "Crypto-Pro GOST R 34.10-2001 Cryptographic Service Provider",
            #[cfg(feature = "gost-2012")]
            ProviderType::Gost2012_256 => {
                "Crypto-Pro GOST R 34.10-2012 Cryptographic Service Provider"
            }
            #[cfg(feature = "gost-2012")]
            ProviderType::Gost2012_512 => {
                "Crypto-Pro GOST R 34.10-2012 Strong Cryptographic Service Provider"
            }
            ProviderType::EcEcdsaFull => "Crypto-Pro ECDSA and AES CSP",
            ProviderType::RsaAes => "Microsoft Enhanced RSA and AES Cryptographic Provider",
        }
    }

    /// Provider type for a container key algorithm.
    pub fn for_algorithm(algorithm: AlgorithmId) -> Result<ProviderType> {
        PROVIDER_TABLE
            .iter()
            .find(|(algs, _)| algs.contains(&algorithm))
            .map(|(_, provider)| *provider)
            .ok_or_else(|| {
                PkiError::unsupported(format!("Unsupported container key type {}", algorithm))
            })
    }
}

/// Signature and key-exchange algorithm pairs and the provider type they map to.
const PROVIDER_TABLE: &[([AlgorithmId; 2], ProviderType)] = &[
    (
        [AlgorithmId::GR3410EL, AlgorithmId::DH_EL_SF],
        ProviderType::Gost2001Dh,
    ),
    #[cfg(feature = "gost-2012")]
    (
        [AlgorithmId::GR3410_12_256, AlgorithmId::DH_GR3410_12_256_SF],
        ProviderType::Gost2012_256,
    ),
    #[cfg(feature = "gost-2012")]
    (
        [AlgorithmId::GR3410_12_512, AlgorithmId::DH_GR3410_12_512_SF],
        ProviderType::Gost2012_512,
    ),
    (
        [AlgorithmId::ECDSA, AlgorithmId::ECDH],
        ProviderType::EcEcdsaFull,
    ),
    (
        [AlgorithmId::RSA_SIGN, AlgorithmId::RSA_KEYX],
        ProviderType::RsaAes,
    ),
];

/// Which key of a container a certificate is bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KeySpec {
    KeyExchange,
    Signature,
}

impl KeySpec {
    /// Numeric key spec (`AT_*`).
    pub fn code(&self) -> u32 {
        match self {
            KeySpec::KeyExchange => 1,
            KeySpec::Signature => 2,
        }
    }
}

/// Key-provider association stored on a certificate entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyProviderInfo {
    pub container_name: String,
    pub provider_name: String,
    pub provider_type: ProviderType,
    pub key_spec: KeySpec,
}

/// Container to pair with a certificate being added to a store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyContainerSpec {
    pub name: String,
    /// Provider type code used to open the container.
    pub provider_type: u32,
}

impl KeyContainerSpec {
    pub fn new(name: impl Into<String>, provider_type: u32) -> Self {
        Self {
            name: name.into(),
            provider_type,
        }
    }
}
