//! Media pipeline configuration.
//!
//! Handles loading, validating, and merging `media.toml`. Stock defaults
//! cover everything, so a config file only needs the keys it wants to change.
//!
//! ## Configuration Options
//!
//! ```toml
//! # All options are optional - defaults shown below
//!
//! [tiers.standard]
//! max_images = 10           # Gallery size limit
//! max_size_mb = 0.6         # Byte budget per image (MiB)
//! max_long_edge = 1920      # Longest edge in pixels (never upscaled)
//! quality = 90              # Starting encode quality (1-100)
//!
//! [tiers.premium]           # "Featured" listings
//! max_images = 15
//! max_size_mb = 1.0
//! max_long_edge = 2560
//! quality = 95
//!
//! [heif]
//! quality = 90              # HEIC/HEIF → JPEG re-encode quality
//!
//! [compression]
//! max_iterations = 10       # Encode attempts before settling for the smallest
//! min_quality = 50          # Quality floor before dimensions shrink
//!
//! [storage]
//! root = "storage"          # FsStorage root directory
//! public_base_url = "http://localhost:8080/listing-images"
//!
//! [processing]
//! max_processes = 4         # Max parallel workers (omit for auto = CPU cores)
//! ```
//!
//! ## Partial Configuration
//!
//! ```toml
//! # Only give featured listings more room
//! [tiers.premium]
//! max_images = 20
//! ```
//!
//! Unknown keys are rejected to catch typos early.

use crate::imaging::{CompressionProfile, Quality, mb_to_bytes};
use crate::ingest::IngestSettings;
use crate::types::Tier;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

/// Config file looked up in the working directory when `--config` is not given.
pub const DEFAULT_CONFIG_FILE: &str = "media.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("TOML serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Configuration loaded from `media.toml`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MediaConfig {
    /// Per-tier limits and compression budgets.
    pub tiers: TiersConfig,
    pub heif: HeifConfig,
    /// Encode loop bounds shared by both tiers.
    pub compression: CompressionConfig,
    pub storage: StorageConfig,
    /// Parallel processing settings.
    pub processing: ProcessingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TiersConfig {
    pub standard: TierConfig,
    pub premium: TierConfig,
}

impl Default for TiersConfig {
    fn default() -> Self {
        Self {
            standard: TierConfig {
                max_images: 10,
                max_size_mb: 0.6,
                max_long_edge: 1920,
                quality: 90,
            },
            premium: TierConfig {
                max_images: 15,
                max_size_mb: 1.0,
                max_long_edge: 2560,
                quality: 95,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TierConfig {
    pub max_images: usize,
    pub max_size_mb: f64,
    pub max_long_edge: u32,
    pub quality: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HeifConfig {
    pub quality: u32,
}

impl Default for HeifConfig {
    fn default() -> Self {
        Self { quality: 90 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CompressionConfig {
    pub max_iterations: u32,
    pub min_quality: u32,
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self {
            max_iterations: 10,
            min_quality: 50,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StorageConfig {
    pub root: String,
    pub public_base_url: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: "storage".to_string(),
            public_base_url: "http://localhost:8080/listing-images".to_string(),
        }
    }
}

/// Parallel processing settings.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProcessingConfig {
    /// Worker threads for ingestion. Unset means one per core; larger values
    /// are clamped to the core count.
    pub max_processes: Option<usize>,
}

/// Worker count to build the rayon pool with.
///
/// - `None` → use all available cores
/// - `Some(n)` → `min(n, cores)`
pub fn effective_threads(config: &ProcessingConfig) -> usize {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    config.max_processes.map(|n| n.min(cores)).unwrap_or(cores)
}

fn check_quality(key: &str, value: u32) -> Result<(), ConfigError> {
    if !(1..=100).contains(&value) {
        return Err(ConfigError::Validation(format!("{key} must be 1-100")));
    }
    Ok(())
}

impl MediaConfig {
    /// Validate config values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, tier) in [
            ("standard", &self.tiers.standard),
            ("premium", &self.tiers.premium),
        ] {
            check_quality(&format!("tiers.{name}.quality"), tier.quality)?;
            if tier.max_images == 0 {
                return Err(ConfigError::Validation(format!(
                    "tiers.{name}.max_images must be at least 1"
                )));
            }
            if !(tier.max_size_mb.is_finite() && tier.max_size_mb > 0.0) {
                return Err(ConfigError::Validation(format!(
                    "tiers.{name}.max_size_mb must be positive"
                )));
            }
            if tier.max_long_edge == 0 {
                return Err(ConfigError::Validation(format!(
                    "tiers.{name}.max_long_edge must be non-zero"
                )));
            }
            if self.compression.min_quality > tier.quality {
                return Err(ConfigError::Validation(format!(
                    "compression.min_quality must not exceed tiers.{name}.quality"
                )));
            }
        }
        check_quality("heif.quality", self.heif.quality)?;
        check_quality("compression.min_quality", self.compression.min_quality)?;
        if self.compression.max_iterations == 0 {
            return Err(ConfigError::Validation(
                "compression.max_iterations must be at least 1".into(),
            ));
        }
        Ok(())
    }

    pub fn tier(&self, tier: Tier) -> &TierConfig {
        match tier {
            Tier::Standard => &self.tiers.standard,
            Tier::Premium => &self.tiers.premium,
        }
    }

    pub fn max_images(&self, tier: Tier) -> usize {
        self.tier(tier).max_images
    }

    pub fn profile(&self, tier: Tier) -> CompressionProfile {
        let t = self.tier(tier);
        CompressionProfile {
            max_bytes: mb_to_bytes(t.max_size_mb),
            max_long_edge: t.max_long_edge,
            quality: Quality::new(t.quality),
            max_iterations: self.compression.max_iterations,
            min_quality: Quality::new(self.compression.min_quality),
        }
    }

    pub fn ingest_settings(&self, tier: Tier) -> IngestSettings {
        IngestSettings {
            profile: self.profile(tier),
            heif_quality: Quality::new(self.heif.quality),
        }
    }
}

// =============================================================================
// Config loading, merging, and validation
// =============================================================================

/// Stock defaults as a `toml::Value::Table`, the base layer a `media.toml`
/// is merged onto.
pub fn stock_defaults_value() -> Result<toml::Value, ConfigError> {
    Ok(toml::Value::try_from(MediaConfig::default())?)
}

/// Merge `overlay` onto `base`: tables key by key, any other value replaced
/// whole. Keys only present in `base` survive.
pub fn merge_toml(base: toml::Value, overlay: toml::Value) -> toml::Value {
    match (base, overlay) {
        (toml::Value::Table(mut base_table), toml::Value::Table(overlay_table)) => {
            for (key, value) in overlay_table {
                let merged = match base_table.remove(&key) {
                    Some(existing) => merge_toml(existing, value),
                    None => value,
                };
                base_table.insert(key, merged);
            }
            toml::Value::Table(base_table)
        }
        (_, overlay) => overlay,
    }
}

/// Read a config file as a raw TOML value.
///
/// Returns `Ok(None)` if the file does not exist.
pub fn load_raw_config(path: &Path) -> Result<Option<toml::Value>, ConfigError> {
    if !path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(path)?;
    let value: toml::Value = toml::from_str(&content)?;
    Ok(Some(value))
}

/// Merge an optional overlay onto a base value, then deserialize and validate.
pub fn resolve_config(
    base: toml::Value,
    overlay: Option<toml::Value>,
) -> Result<MediaConfig, ConfigError> {
    let merged = match overlay {
        Some(ov) => merge_toml(base, ov),
        None => base,
    };
    let config: MediaConfig = merged.try_into()?;
    config.validate()?;
    Ok(config)
}

/// Load the effective config.
///
/// An explicit `path` must exist. Without one, [`DEFAULT_CONFIG_FILE`] in
/// the working directory is used if present, stock defaults otherwise.
pub fn load_config(path: Option<&Path>) -> Result<MediaConfig, ConfigError> {
    let overlay = match path {
        Some(path) => Some(toml::from_str(&fs::read_to_string(path)?)?),
        None => load_raw_config(Path::new(DEFAULT_CONFIG_FILE))?,
    };
    resolve_config(stock_defaults_value()?, overlay)
}

/// Returns a fully-commented stock `media.toml` with all keys and explanations.
///
/// Used by the `gen-config` CLI command.
pub fn stock_config_toml() -> &'static str {
    r##"# Listing Gallery Configuration
# =============================
# All settings are optional. Remove or comment out any you don't need.
# Values shown below are the defaults.
#
# Unknown keys will cause an error.

# ---------------------------------------------------------------------------
# Tiers
# ---------------------------------------------------------------------------
# Each listing plan caps the number of photos and sets the compression
# budget. Photos are re-encoded to WebP, downscaled so the longest edge fits,
# and retried at lower quality (then smaller size) until they fit the budget.
[tiers.standard]
# Maximum photos per listing.
max_images = 10
# Target size per photo, in MiB.
max_size_mb = 0.6
# Longest edge in pixels. Smaller photos are never upscaled.
max_long_edge = 1920
# Starting encode quality (1 = worst, 100 = best).
quality = 90

# "Featured" listings.
[tiers.premium]
max_images = 15
max_size_mb = 1.0
max_long_edge = 2560
quality = 95

# ---------------------------------------------------------------------------
# HEIC / HEIF
# ---------------------------------------------------------------------------
[heif]
# Camera HEIC photos are converted to JPEG at this quality before
# compression. A photo that fails to convert is kept as-is.
quality = 90

# ---------------------------------------------------------------------------
# Compression loop
# ---------------------------------------------------------------------------
[compression]
# Encode attempts per photo before settling for the smallest result.
max_iterations = 10
# Quality never drops below this; past it, dimensions shrink instead.
# Must not exceed either tier's quality.
min_quality = 50

# ---------------------------------------------------------------------------
# Storage
# ---------------------------------------------------------------------------
[storage]
# Directory holding uploaded objects and per-listing gallery rows.
root = "storage"
# Prefix for durable URLs: <public_base_url>/<owner>/<listing>/<hash>.webp
public_base_url = "http://localhost:8080/listing-images"

# ---------------------------------------------------------------------------
# Processing
# ---------------------------------------------------------------------------
[processing]
# Maximum parallel workers. Omit for auto (= number of CPU cores).
# Values larger than the core count are clamped down.
# max_processes = 4
"##
}
