// SPDX-License-Identifier: CEPL-1.0
//! Startup configuration.
//!
//! Loaded once from `prism.toml` (or an explicit path), validated, then only
//! read. The core consumes `[window]` and `[render]`; the `[technique]` table
//! is passed through untouched apart from its `name`.

use std::{
    fs, io,
    path::{Path, PathBuf},
};

use serde::Deserialize;
use thiserror::Error;
use tracing::info;

pub const DEFAULT_CONFIG_PATH: &str = "prism.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse config {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct WindowConfig {
    pub app_name: String,
    pub width: u32,
    pub height: u32,
}

impl Default for WindowConfig {
    fn default() -> Self {
        WindowConfig {
            app_name: "prism".to_owned(),
            width: 1280,
            height: 720,
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct RenderConfig {
    /// Requested MSAA sample count; clamped to what the adapter supports.
    pub sample_count: u32,
    /// Always present with FIFO regardless of what the surface offers.
    pub force_fifo: bool,
    /// Wait the present queue idle after every present.
    pub present_wait_idle: bool,
    /// Enable the Khronos validation layer when it is installed.
    pub validation: bool,
}

impl Default for RenderConfig {
    fn default() -> Self {
        RenderConfig {
            sample_count: 1,
            force_fifo: false,
            present_wait_idle: false,
            validation: cfg!(debug_assertions),
        }
    }
}

/// Technique selection plus its free-form parameters.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct TechniqueConfig {
    pub name: String,
    #[serde(flatten)]
    pub params: toml::Table,
}

impl Default for TechniqueConfig {
    fn default() -> Self {
        TechniqueConfig {
            name: "clear".to_owned(),
            params: toml::Table::new(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct AppConfig {
    pub window: WindowConfig,
    pub render: RenderConfig,
    pub technique: TechniqueConfig,
}

impl AppConfig {
    /// Loads and validates the config.
    ///
    /// With `None` the default path is tried and a missing file yields the
    /// defaults. An explicit path must exist.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let (path, explicit) = match path {
            Some(p) => (p.to_path_buf(), true),
            None => (PathBuf::from(DEFAULT_CONFIG_PATH), false),
        };

        let text = match fs::read_to_string(&path) {
            Ok(s) => s,
            Err(e) if !explicit && e.kind() == io::ErrorKind::NotFound => {
                info!("no {} found, using defaults", path.display());
                let cfg = AppConfig::default();
                cfg.validate()?;
                return Ok(cfg);
            }
            Err(source) => return Err(ConfigError::Io { path, source }),
        };

        let cfg: AppConfig =
            toml::from_str(&text).map_err(|source| ConfigError::Parse { path: path.clone(), source })?;
        cfg.validate()?;
        info!("config loaded from {}", path.display());
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let w = &self.window;
        if w.app_name.is_empty() {
            return Err(ConfigError::Invalid("window.app_name must not be empty".into()));
        }
        if w.app_name.contains('\0') {
            return Err(ConfigError::Invalid("window.app_name must not contain NUL".into()));
        }
        if w.width == 0 || w.height == 0 {
            return Err(ConfigError::Invalid(format!(
                "window size must be nonzero, got {}x{}",
                w.width, w.height
            )));
        }

        let s = self.render.sample_count;
        if !s.is_power_of_two() || s > 64 {
            return Err(ConfigError::Invalid(format!(
                "render.sample_count must be a power of two in 1..=64, got {s}"
            )));
        }

        if self.technique.name.is_empty() {
            return Err(ConfigError::Invalid("technique.name must not be empty".into()));
        }
        Ok(())
    }
}
