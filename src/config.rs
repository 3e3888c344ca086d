// SPDX-License-Identifier: GPL-3.0-only

//! Runtime configuration.
//!
//! Settings are resolved in this order, later sources winning:
//!
//! 1. built-in defaults
//! 2. `$XDG_CONFIG_HOME/squeekboard/config.json`, if present
//! 3. environment (`SQUEEKBOARD_LAYOUT`, `KEYBOARDS_DIR`,
//!    `SQUEEKBOARD_KEYBOARDSDIR`)
//! 4. command line arguments

use crate::app_settings::{
    APP_NAME, CONFIG_FILE, FALLBACK_LAYOUT, KEYBOARDS_DIR_ENV, KEYBOARDS_DIR_LEGACY_ENV, LAYOUT_ENV,
};
use clap::Parser;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Command line arguments.
#[derive(Parser, Debug, Default, Clone, PartialEq, Eq)]
#[command(author, version, about = "On-screen keyboard for Wayland", long_about = None)]
pub struct Cli {
    /// Layout to load, by name
    #[arg(short, long, env = LAYOUT_ENV)]
    pub layout: Option<String>,

    /// Directory searched for layout files before the built-in ones
    #[arg(short = 'd', long, env = KEYBOARDS_DIR_ENV)]
    pub keyboards_dir: Option<PathBuf>,

    /// Do not claim the D-Bus name; the keyboard then follows the input method only
    #[arg(long)]
    pub no_dbus: bool,

    /// Whether Erase may delete text through the input method
    #[arg(long, value_name = "BOOL")]
    pub delete_surrounding_text: Option<bool>,

    /// Configuration file to use instead of the default one
    #[arg(short, long)]
    pub config: Option<PathBuf>,
}

/// Settings that persist between runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Name of the layout to load.
    pub layout: String,
    /// Directory with user layouts.
    pub keyboards_dir: Option<PathBuf>,
    /// Serve `sm.puri.OSK0` on the session bus.
    pub dbus: bool,
    /// Let Erase delete the character before the cursor through the input
    /// method when the text around the cursor is known.
    pub delete_surrounding_text: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            layout: FALLBACK_LAYOUT.to_string(),
            keyboards_dir: None,
            dbus: true,
            delete_surrounding_text: true,
        }
    }
}

/// Errors reading the configuration file.
#[derive(Debug)]
pub enum ConfigError {
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io { path, source } => {
                write!(f, "cannot read {}: {}", path.display(), source)
            }
            ConfigError::Json { path, source } => {
                write!(f, "invalid configuration in {}: {}", path.display(), source)
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Io { source, .. } => Some(source),
            ConfigError::Json { source, .. } => Some(source),
        }
    }
}

impl Config {
    /// Resolves the configuration from every source.
    pub fn resolve(cli: &Cli) -> Result<Self, ConfigError> {
        let path = cli.config.clone().or_else(|| {
            default_config_path(
                std::env::var_os("XDG_CONFIG_HOME").map(PathBuf::from),
                std::env::var_os("HOME").map(PathBuf::from),
            )
        });
        let file = match path {
            Some(path) => Self::load(&path)?,
            None => None,
        };
        let legacy_dir = std::env::var_os(KEYBOARDS_DIR_LEGACY_ENV).map(PathBuf::from);
        Ok(file.unwrap_or_default().merge(cli, legacy_dir))
    }

    /// Reads a configuration file. A missing file is not an error.
    pub fn load(path: &Path) -> Result<Option<Self>, ConfigError> {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!("No configuration at {}", path.display());
                return Ok(None);
            }
            Err(source) => {
                return Err(ConfigError::Io {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };
        let config = serde_json::from_str(&text).map_err(|source| ConfigError::Json {
            path: path.to_path_buf(),
            source,
        })?;
        tracing::info!("Loaded configuration from {}", path.display());
        Ok(Some(config))
    }

    /// Applies the environment and the command line on top of `self`.
    ///
    /// `cli` already carries `SQUEEKBOARD_LAYOUT` and `KEYBOARDS_DIR`; the
    /// legacy directory variable is only used when neither is set.
    pub fn merge(mut self, cli: &Cli, legacy_keyboards_dir: Option<PathBuf>) -> Self {
        if let Some(layout) = &cli.layout {
            self.layout = layout.clone();
        }
        if let Some(dir) = cli.keyboards_dir.clone().or(legacy_keyboards_dir) {
            self.keyboards_dir = Some(dir);
        }
        if cli.no_dbus {
            self.dbus = false;
        }
        if let Some(delete) = cli.delete_surrounding_text {
            self.delete_surrounding_text = delete;
        }
        self
    }
}

fn default_config_path(xdg_config_home: Option<PathBuf>, home: Option<PathBuf>) -> Option<PathBuf> {
    xdg_config_home
        .filter(|p| p.is_absolute())
        .or_else(|| home.filter(|h| !h.as_os_str().is_empty()).map(|h| h.join(".config")))
        .map(|dir| dir.join(APP_NAME).join(CONFIG_FILE))
}
