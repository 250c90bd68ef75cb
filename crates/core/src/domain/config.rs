//! Configuration management for eqchain
//!
//! This module provides:
//! - Engine settings and the initial parameter snapshot, stored as TOML
//! - Named parameter presets
//! - The user configuration file under the platform config directory

use crate::domain::audio::ProcessSpec;
use crate::domain::params::ControlParameters;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs;
use tracing::{debug, error, info, instrument, warn};

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Errors that can occur during configuration operations
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialization error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Preset not found: {0}")]
    PresetNotFound(String),
}

/// How the host drives the engine
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Sample rate in Hz
    pub sample_rate: u32,

    /// Largest block handed to `process_block`
    pub max_block_size: u32,

    /// Control ticks per second
    pub control_rate_hz: u32,

    /// Bins in the response curve
    pub response_width: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48000,
            max_block_size: 512,
            control_rate_hz: 60,
            response_width: 512,
        }
    }
}

impl EngineConfig {
    pub const SAMPLE_RATE_RANGE: (u32, u32) = (8000, 384_000);
    pub const MAX_BLOCK_SIZE: u32 = 65536;
    pub const MAX_CONTROL_RATE_HZ: u32 = 1000;
    pub const MAX_RESPONSE_WIDTH: u32 = 8192;

    pub fn validate(&self) -> Result<()> {
        let (min_rate, max_rate) = Self::SAMPLE_RATE_RANGE;
        if !(min_rate..=max_rate).contains(&self.sample_rate) {
            return Err(ConfigError::Invalid(format!(
                "sample_rate {} outside {min_rate}..={max_rate}",
                self.sample_rate
            )));
        }
        if !(1..=Self::MAX_BLOCK_SIZE).contains(&self.max_block_size) {
            return Err(ConfigError::Invalid(format!(
                "max_block_size {} outside 1..={}",
                self.max_block_size,
                Self::MAX_BLOCK_SIZE
            )));
        }
        if !(1..=Self::MAX_CONTROL_RATE_HZ).contains(&self.control_rate_hz) {
            return Err(ConfigError::Invalid(format!(
                "control_rate_hz {} outside 1..={}",
                self.control_rate_hz,
                Self::MAX_CONTROL_RATE_HZ
            )));
        }
        if !(1..=Self::MAX_RESPONSE_WIDTH).contains(&self.response_width) {
            return Err(ConfigError::Invalid(format!(
                "response_width {} outside 1..={}",
                self.response_width,
                Self::MAX_RESPONSE_WIDTH
            )));
        }
        Ok(())
    }

    /// Processing context for `prepare`
    pub fn process_spec(&self) -> Result<ProcessSpec> {
        ProcessSpec::new(f64::from(self.sample_rate), self.max_block_size as usize)
            .map_err(|e| ConfigError::Invalid(e.to_string()))
    }
}

/// Complete eqchain configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EqConfig {
    pub engine: EngineConfig,
    pub parameters: ControlParameters,
}

impl EqConfig {
    /// Load configuration from TOML file
    #[instrument(skip(path))]
    pub async fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading configuration");

        let contents = fs::read_to_string(path).await?;
        let config: Self = toml::from_str(&contents)?;
        config.validate()?;

        debug!("Configuration loaded successfully");
        Ok(config)
    }

    /// Save configuration to TOML file
    #[instrument(skip(self, path))]
    pub async fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        info!(path = %path.display(), "Saving configuration");

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let toml_str = toml::to_string_pretty(self)?;
        fs::write(path, toml_str).await?;

        debug!("Configuration saved successfully");
        Ok(())
    }

    /// Engine settings must be in range and parameters finite
    ///
    /// Out-of-range parameter values are accepted here; the controller clamps
    /// them against the running sample rate.
    pub fn validate(&self) -> Result<()> {
        self.engine.validate()?;
        validate_parameters(&self.parameters)
    }
}

fn validate_parameters(params: &ControlParameters) -> Result<()> {
    let fields = [
        ("peak_freq", params.peak_freq),
        ("peak_gain_db", params.peak_gain_db),
        ("peak_quality", params.peak_quality),
        ("low_cut_freq", params.low_cut_freq),
        ("high_cut_freq", params.high_cut_freq),
    ];
    match fields.iter().find(|(_, value)| !value.is_finite()) {
        Some((name, value)) => Err(ConfigError::Invalid(format!("{name} is {value}"))),
        None => Ok(()),
    }
}

/// Preset manager
///
/// Each preset is a `<name>.toml` file holding one parameter snapshot.
pub struct PresetManager {
    preset_dir: PathBuf,
}

impl PresetManager {
    /// Create a new preset manager
    pub fn new(preset_dir: PathBuf) -> Self {
        Self { preset_dir }
    }

    pub fn preset_dir(&self) -> &Path {
        &self.preset_dir
    }

    fn preset_path(&self, name: &str) -> Result<PathBuf> {
        let valid = !name.is_empty()
            && !name.starts_with('.')
            && name
                .chars()
                .all(|c| c.is_alphanumeric() || matches!(c, '_' | '-' | ' ' | '.'));
        if !valid {
            return Err(ConfigError::Invalid(format!("invalid preset name: {name:?}")));
        }
        Ok(self.preset_dir.join(format!("{}.toml", name)))
    }

    /// List all available presets
    #[instrument(skip(self))]
    pub async fn list_presets(&self) -> Result<Vec<String>> {
        let mut presets = Vec::new();

        if !self.preset_dir.exists() {
            return Ok(presets);
        }

        let mut entries = fs::read_dir(&self.preset_dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().map(|e| e == "toml").unwrap_or(false) {
                if let Some(name_str) = path.file_stem().and_then(|n| n.to_str()) {
                    presets.push(name_str.to_string());
                }
            }
        }

        presets.sort();
        debug!(count = presets.len(), "Listed presets");
        Ok(presets)
    }

    /// Load a preset by name
    #[instrument(skip(self))]
    pub async fn load_preset(&self, name: &str) -> Result<ControlParameters> {
        let path = self.preset_path(name)?;

        if !path.exists() {
            return Err(ConfigError::PresetNotFound(name.to_string()));
        }

        let contents = fs::read_to_string(&path).await?;
        let params: ControlParameters = toml::from_str(&contents)?;
        validate_parameters(&params)?;

        info!(name, "Preset loaded");
        Ok(params)
    }

    /// Save a preset by name, replacing any preset of the same name
    #[instrument(skip(self, params))]
    pub async fn save_preset(&self, name: &str, params: &ControlParameters) -> Result<()> {
        let path = self.preset_path(name)?;
        validate_parameters(params)?;

        fs::create_dir_all(&self.preset_dir).await?;
        fs::write(&path, toml::to_string_pretty(params)?).await?;

        info!(name, path = %path.display(), "Preset saved");
        Ok(())
    }

    /// Delete a preset by name
    #[instrument(skip(self))]
    pub async fn delete_preset(&self, name: &str) -> Result<()> {
        let path = self.preset_path(name)?;

        if !path.exists() {
            return Err(ConfigError::PresetNotFound(name.to_string()));
        }

        fs::remove_file(&path).await?;
        info!(name, "Preset deleted");
        Ok(())
    }

    /// Check if a preset exists
    pub async fn preset_exists(&self, name: &str) -> bool {
        self.preset_path(name).map(|p| p.exists()).unwrap_or(false)
    }
}

/// Manages the main configuration file at `~/.config/eqchain/config.toml`
pub struct ConfigManager {
    config_dir: PathBuf,
    config_path: PathBuf,
}

impl ConfigManager {
    pub fn new(config_dir: PathBuf) -> Self {
        let config_path = config_dir.join("config.toml");

        Self {
            config_dir,
            config_path,
        }
    }

    /// Get the default config directory path
    ///
    /// Returns `~/.config/eqchain` on Linux, the platform equivalent elsewhere
    pub fn default_config_dir() -> Result<PathBuf> {
        dirs::config_dir()
            .map(|p| p.join("eqchain"))
            .ok_or_else(|| ConfigError::Invalid("Could not determine config directory".to_string()))
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    /// Presets live next to the config file
    pub fn preset_dir(&self) -> PathBuf {
        self.config_dir.join("presets")
    }

    /// Load configuration from file
    ///
    /// A missing file yields the default configuration, which is written out
    /// for next time. A corrupt file is copied to `config.toml.corrupt` and
    /// the default is returned.
    #[instrument(skip(self))]
    pub async fn load(&self) -> EqConfig {
        if !self.config_path.exists() {
            info!(
                path = %self.config_path.display(),
                "Config file not found, creating default"
            );

            let config = EqConfig::default();
            if let Err(e) = self.save(&config).await {
                error!(
                    path = %self.config_path.display(),
                    error = %e,
                    "Failed to save default config"
                );
            }
            return config;
        }

        match EqConfig::load_from_file(&self.config_path).await {
            Ok(config) => config,
            Err(e) => {
                warn!(
                    path = %self.config_path.display(),
                    error = %e,
                    "Failed to load config, using default"
                );

                let backup_path = self.config_path.with_extension("toml.corrupt");
                if let Err(copy_err) = fs::copy(&self.config_path, &backup_path).await {
                    error!(
                        path = %backup_path.display(),
                        error = %copy_err,
                        "Failed to backup corrupt config"
                    );
                }

                EqConfig::default()
            }
        }
    }

    /// Save configuration to file
    #[instrument(skip(self, config))]
    pub async fn save(&self, config: &EqConfig) -> Result<()> {
        config.validate()?;
        fs::create_dir_all(&self.config_dir).await?;
        config.save_to_file(&self.config_path).await
    }

    /// Delete the config file
    #[instrument(skip(self))]
    pub async fn clear(&self) -> Result<()> {
        if self.config_path.exists() {
            fs::remove_file(&self.config_path).await?;
            info!(
                path = %self.config_path.display(),
                "Configuration cleared"
            );
        }

        Ok(())
    }

    pub fn exists(&self) -> bool {
        self.config_path.exists()
    }
}
