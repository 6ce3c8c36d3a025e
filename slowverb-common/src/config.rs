//! Bootstrap configuration loading
//!
//! The engine reads a small TOML file at startup. Every key is optional and
//! falls back to a built-in default; a file that exists but does not parse is
//! a `Config` error rather than a silent fallback.
//!
//! # Resolution Priority
//!
//! 1. Command-line argument (highest priority)
//! 2. `SLOWVERB_CONFIG` environment variable
//! 3. `<config_dir>/slowverb/config.toml`
//! 4. Built-in defaults (no file)

use crate::events::{QualityTier, TransportMode};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Environment variable naming an explicit config file
pub const CONFIG_ENV_VAR: &str = "SLOWVERB_CONFIG";

const MIB: u64 = 1024 * 1024;

/// Root of the TOML bootstrap file
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SlowverbConfig {
    pub engine: EngineSection,
    pub limits: LimitsSection,
    pub reverb: ReverbSection,
    pub visualizer: VisualizerSection,
    pub logging: LoggingConfig,
}

/// `[engine]` overrides of the detected capabilities
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EngineSection {
    /// Skip detection and run at this tier
    pub force_tier: Option<QualityTier>,

    /// Skip detection and use this transport
    pub force_transport: Option<TransportMode>,

    /// Requested device buffer size in frames (device default when absent)
    pub output_buffer_frames: Option<u32>,
}

/// `[limits]` per-tier caps
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LimitsSection {
    pub max_file_size_mb: TierFileSizes,
}

/// Per-tier file size caps in MiB
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TierFileSizes {
    pub basic: u64,
    pub medium: u64,
    pub high: u64,
}

impl Default for TierFileSizes {
    fn default() -> Self {
        Self {
            basic: 50,
            medium: 150,
            high: 500,
        }
    }
}

/// `[reverb]` impulse length caps in seconds
///
/// Basic has no entry because it has no reverb at all.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ReverbSection {
    pub max_seconds_high: f64,
    pub max_seconds_medium: f64,
}

impl Default for ReverbSection {
    fn default() -> Self {
        Self {
            max_seconds_high: 4.0,
            max_seconds_medium: 2.0,
        }
    }
}

/// `[visualizer]` settings
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct VisualizerSection {
    /// Bar count override; the tier's own count when absent
    pub bar_count: Option<usize>,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl SlowverbConfig {
    /// Parse a TOML document
    ///
    /// # Errors
    ///
    /// `Error::Config` if the document is malformed or a value has the wrong type.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: SlowverbConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))
    }

    /// Resolve the config path and load it, or return defaults when no file exists
    ///
    /// # Arguments
    ///
    /// * `cli_arg` - Path given on the command line, if any
    ///
    /// # Errors
    ///
    /// An explicit path (CLI or env) that cannot be read is an error; a missing
    /// file at the default location is not.
    pub fn load(cli_arg: Option<&Path>) -> Result<Self> {
        match resolve_config_path(cli_arg, CONFIG_ENV_VAR) {
            Some((path, explicit)) => {
                if !explicit && !path.exists() {
                    debug!("No config file at {}, using defaults", path.display());
                    return Ok(Self::default());
                }
                info!("Loading configuration from {}", path.display());
                Self::from_file(&path)
            }
            None => {
                debug!("No config directory on this platform, using defaults");
                Ok(Self::default())
            }
        }
    }

    fn validate(&self) -> Result<()> {
        if !(self.reverb.max_seconds_high > 0.0 && self.reverb.max_seconds_medium > 0.0) {
            return Err(Error::Config(
                "reverb.max_seconds_* must be positive".to_string(),
            ));
        }
        if matches!(self.visualizer.bar_count, Some(0)) {
            return Err(Error::Config(
                "visualizer.bar_count must be at least 1".to_string(),
            ));
        }
        if matches!(self.engine.output_buffer_frames, Some(0)) {
            return Err(Error::Config(
                "engine.output_buffer_frames must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Byte cap for a file loaded at `tier`
    pub fn max_file_size_bytes(&self, tier: QualityTier) -> u64 {
        let mb = match tier {
            QualityTier::Basic => self.limits.max_file_size_mb.basic,
            QualityTier::Medium => self.limits.max_file_size_mb.medium,
            QualityTier::High => self.limits.max_file_size_mb.high,
        };
        mb.saturating_mul(MIB)
    }

    /// Impulse length cap, `None` at Basic
    pub fn reverb_max_seconds(&self, tier: QualityTier) -> Option<f64> {
        match tier {
            QualityTier::Basic => None,
            QualityTier::Medium => Some(self.reverb.max_seconds_medium),
            QualityTier::High => Some(self.reverb.max_seconds_high),
        }
    }

    /// Visualizer bar count at `tier`
    pub fn bar_count(&self, tier: QualityTier) -> usize {
        self.visualizer.bar_count.unwrap_or_else(|| tier.bar_count())
    }
}

/// Resolve the config file location
///
/// Returns the path and whether it was named explicitly (CLI or env).
pub fn resolve_config_path(
    cli_arg: Option<&Path>,
    env_var_name: &str,
) -> Option<(PathBuf, bool)> {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return Some((path.to_path_buf(), true));
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(env_var_name) {
        if !path.trim().is_empty() {
            return Some((PathBuf::from(path), true));
        }
    }

    // Priority 3: platform config directory
    dirs::config_dir().map(|d| (d.join("slowverb").join("config.toml"), false))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SlowverbConfig::default();
        assert_eq!(config.max_file_size_bytes(QualityTier::Basic), 50 * MIB);
        assert_eq!(config.max_file_size_bytes(QualityTier::Medium), 150 * MIB);
        assert_eq!(config.max_file_size_bytes(QualityTier::High), 500 * MIB);
        assert_eq!(config.reverb_max_seconds(QualityTier::Basic), None);
        assert_eq!(config.reverb_max_seconds(QualityTier::Medium), Some(2.0));
        assert_eq!(config.reverb_max_seconds(QualityTier::High), Some(4.0));
        assert_eq!(config.bar_count(QualityTier::Basic), 16);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_empty_document_is_default() {
        let config = SlowverbConfig::from_toml_str("").unwrap();
        assert_eq!(config, SlowverbConfig::default());
    }

    #[test]
    fn test_partial_document() {
        let config = SlowverbConfig::from_toml_str(
            r#"
            [engine]
            force_tier = "medium"
            force_transport = "mediaElement"

            [limits.max_file_size_mb]
            basic = 20

            [visualizer]
            bar_count = 8
            "#,
        )
        .unwrap();

        assert_eq!(config.engine.force_tier, Some(QualityTier::Medium));
        assert_eq!(config.engine.force_transport, Some(TransportMode::MediaElement));
        assert_eq!(config.max_file_size_bytes(QualityTier::Basic), 20 * MIB);
        // Untouched keys keep their defaults
        assert_eq!(config.max_file_size_bytes(QualityTier::High), 500 * MIB);
        assert_eq!(config.bar_count(QualityTier::High), 8);
    }

    #[test]
    fn test_malformed_document_is_config_error() {
        let err = SlowverbConfig::from_toml_str("[engine\nforce_tier = ").unwrap_err();
        assert!(matches!(err, Error::Config(_)));

        let err = SlowverbConfig::from_toml_str("[engine]\nforce_tier = \"ultra\"").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_validation() {
        assert!(SlowverbConfig::from_toml_str("[visualizer]\nbar_count = 0").is_err());
        assert!(SlowverbConfig::from_toml_str("[reverb]\nmax_seconds_high = 0.0").is_err());
    }

    #[test]
    fn test_cli_path_wins() {
        let (path, explicit) =
            resolve_config_path(Some(Path::new("/tmp/x.toml")), "SLOWVERB_TEST_UNSET_VAR").unwrap();
        assert_eq!(path, PathBuf::from("/tmp/x.toml"));
        assert!(explicit);
    }
}
