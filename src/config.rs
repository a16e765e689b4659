//! Configuration loading and serialization.
//!
//! Defines the TOML configuration schema for clawtrap. Every section
//! implements `Default` and uses `#[serde(default)]` so missing fields fall
//! back to sensible values. Config is loaded from
//! `/etc/clawtrap/config.toml` by default.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const DEFAULT_CONFIG_PATH: &str = "/etc/clawtrap/config.toml";

/// Root configuration struct, deserialized from TOML.
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub flags: FlagsConfig,
    #[serde(default)]
    pub tarpit: TarpitConfig,
    #[serde(default)]
    pub decoys: DecoysConfig,
    #[serde(default)]
    pub log: LogConfig,
}

/// Listener bind address and port.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_bind() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    8080
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            port: default_port(),
        }
    }
}

/// Where the indicator corpus lives.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct FlagsConfig {
    #[serde(default = "default_flags_path")]
    pub path: String,
}

fn default_flags_path() -> String {
    "./flags.json".to_string()
}

impl Default for FlagsConfig {
    fn default() -> Self {
        Self { path: default_flags_path() }
    }
}

/// Scanner-stalling stream settings.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct TarpitConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Ceiling on chunks per stream; at one chunk per second this bounds how
    /// long a single scanner connection can be held.
    #[serde(default = "default_max_chunks")]
    pub max_chunks: u32,
}

fn default_true() -> bool {
    true
}
fn default_max_chunks() -> u32 {
    100_000
}

impl Default for TarpitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_chunks: default_max_chunks(),
        }
    }
}

/// Directory of decoy files served verbatim when a request's final path
/// segment matches a file name.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct DecoysConfig {
    #[serde(default = "default_decoys_dir")]
    pub dir: String,
}

fn default_decoys_dir() -> String {
    "./decoys".to_string()
}

impl Default for DecoysConfig {
    fn default() -> Self {
        Self { dir: default_decoys_dir() }
    }
}

/// Log filter applied when RUST_LOG is not set.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LogConfig {
    #[serde(default = "default_log_filter")]
    pub filter: String,
}

fn default_log_filter() -> String {
    "info".to_string()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self { filter: default_log_filter() }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config: {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| "Failed to parse config")?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .with_context(|| "Failed to serialize config")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config: {}", path.display()))?;
        Ok(())
    }
}
