//! slowverb-engine runtime configuration
//!
//! Resolves the settings the binary starts with from the command line and the
//! shared TOML file ([`SlowverbConfig`]).

use crate::capability::Capabilities;
use crate::error::Result;
use slowverb_common::config::SlowverbConfig;
use std::path::PathBuf;
use std::sync::Arc;

/// Engine startup configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Shared settings file contents (defaults when no file exists)
    pub settings: Arc<SlowverbConfig>,
    /// Explicit config path from the command line, if any
    pub config_path: Option<PathBuf>,
}

impl Config {
    /// Load settings from `config_path`, the environment, or the default location
    pub fn load(config_path: Option<PathBuf>) -> Result<Self> {
        let settings = SlowverbConfig::load(config_path.as_deref())?;
        Ok(Self {
            settings: Arc::new(settings),
            config_path,
        })
    }

    /// Default `EnvFilter` directive when `RUST_LOG` is not set
    pub fn log_filter(&self) -> String {
        let level = self.settings.logging.level.trim().to_ascii_lowercase();
        format!("slowverb={level},slowverb_engine={level},slowverb_common={level}")
    }

    /// Device buffer size in frames: the config override, else the tier's chunk size
    pub fn output_buffer_frames(&self, capabilities: &Capabilities) -> u32 {
        self.settings
            .engine
            .output_buffer_frames
            .unwrap_or(capabilities.chunk_size)
    }
}
