use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

/// Provider configuration, read from TOML
///
/// ```toml
/// [provider]
/// categories = ["MY", "CA", "ROOT"]
///
/// [certificate]
/// validity_days = 730
///
/// [cache]
/// path = "var/pki-items.json"
/// ```
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct ProviderConfig {
    #[serde(default)]
    pub provider: ProviderSection,
    #[serde(default)]
    pub certificate: CertificateDefaults,
    #[serde(default)]
    pub cache: CacheSection,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ProviderSection {
    /// Categories enumerated by the store provider, in order.
    #[serde(default = "default_categories")]
    pub categories: Vec<String>,
}

impl Default for ProviderSection {
    fn default() -> Self {
        Self {
            categories: default_categories(),
        }
    }
}

fn default_categories() -> Vec<String> {
    crate::CATEGORIES.iter().map(|c| c.to_string()).collect()
}

/// Settings used when a certificate is built from a request.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CertificateDefaults {
    #[serde(default = "default_validity_days")]
    pub validity_days: u32,
    #[serde(default = "default_serial_bits")]
    pub serial_bits: i32,
}

impl Default for CertificateDefaults {
    fn default() -> Self {
        Self {
            validity_days: default_validity_days(),
            serial_bits: default_serial_bits(),
        }
    }
}

fn default_validity_days() -> u32 {
    365
}

fn default_serial_bits() -> i32 {
    128
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct CacheSection {
    /// Where [`PkiItemCache`](crate::pki_item::PkiItemCache) snapshots are kept; no cache when unset.
    pub path: Option<PathBuf>,
}

impl ProviderConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: &str) -> Result<Self> {
        let config_str =
            fs::read_to_string(path).context(format!("Failed to read config file: {}", path))?;

        let config: ProviderConfig =
            toml::from_str(&config_str).context("Failed to parse config file")?;

        Ok(config)
    }

    /// Load configuration with default path (config.toml)
    pub fn load() -> Result<Self> {
        Self::from_file("config.toml")
    }
}
