// SPDX-License-Identifier: GPL-3.0-only

//! Finding and loading layouts.
//!
//! A layout name is looked up in order:
//!
//! 1. `<keyboards_dir>/<name>.json`, if a directory is configured,
//! 2. the layout built into the binary under that name,
//! 3. the built-in fallback layout.
//!
//! Missing sources are skipped quietly, broken ones with a warning.

use crate::app_settings::{FALLBACK_LAYOUT, KEYBOARDS_DATA_SUBDIR};
use crate::layout::parser::{parse_layout_file, parse_layout_from_string};
use crate::layout::types::{Layout, LayoutError};
use rust_embed::RustEmbed;
use std::env;
use std::fmt;
use std::path::{Path, PathBuf};

/// Layouts compiled into the binary.
#[derive(RustEmbed)]
#[folder = "layouts/"]
struct BuiltinLayouts;

/// Where a layout comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LayoutSource {
    File(PathBuf),
    Builtin(String),
}

impl fmt::Display for LayoutSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LayoutSource::File(path) => write!(f, "file {}", path.display()),
            LayoutSource::Builtin(name) => write!(f, "built-in layout {}", name),
        }
    }
}

impl LayoutSource {
    /// Loads and builds the layout.
    pub fn load(&self) -> Result<Layout, LayoutError> {
        match self {
            LayoutSource::File(path) => parse_layout_file(path),
            LayoutSource::Builtin(name) => builtin_layout(name),
        }
    }
}

/// Sources to try for a layout name, most preferred first.
pub fn layout_sources(name: &str, keyboards_dir: Option<&Path>) -> Vec<LayoutSource> {
    let mut sources = Vec::with_capacity(3);
    // Names are file stems, never paths.
    let is_plain_name = !name.is_empty() && !name.contains(['/', '\\']) && name != "..";
    if let (Some(dir), true) = (keyboards_dir, is_plain_name) {
        sources.push(LayoutSource::File(dir.join(format!("{}.json", name))));
    }
    if is_plain_name {
        sources.push(LayoutSource::Builtin(name.to_string()));
    }
    if name != FALLBACK_LAYOUT {
        sources.push(LayoutSource::Builtin(FALLBACK_LAYOUT.to_string()));
    }
    sources
}

/// Loads a layout by name, falling back through [`layout_sources`].
///
/// Only fails if not even the built-in fallback can be built.
pub fn load_layout(name: &str, keyboards_dir: Option<&Path>) -> Result<Layout, LayoutError> {
    let mut last_error = LayoutError::MissingResource {
        name: name.to_string(),
    };
    for source in layout_sources(name, keyboards_dir) {
        match source.load() {
            Ok(layout) => {
                tracing::info!("Loaded layout from {}", source);
                return Ok(layout);
            }
            Err(e) if e.is_missing() => {
                tracing::debug!("Tried {}, but it's missing: {}", source, e);
                last_error = e;
            }
            Err(e) => {
                tracing::warn!("Failed to load layout from {}: {}, skipping", source, e);
                last_error = e;
            }
        }
    }
    Err(last_error)
}

/// Builds one of the layouts compiled into the binary.
pub fn builtin_layout(name: &str) -> Result<Layout, LayoutError> {
    let file = BuiltinLayouts::get(&format!("{}.json", name)).ok_or_else(|| {
        LayoutError::MissingResource {
            name: name.to_string(),
        }
    })?;
    let json = std::str::from_utf8(&file.data).map_err(|_| LayoutError::MissingResource {
        name: name.to_string(),
    })?;
    parse_layout_from_string(json, name)
}

/// Names of all built-in layouts, sorted.
pub fn builtin_layout_names() -> Vec<String> {
    let mut names: Vec<String> = BuiltinLayouts::iter()
        .filter_map(|file| file.strip_suffix(".json").map(str::to_string))
        .collect();
    names.sort();
    names
}

/// `$XDG_DATA_HOME/squeekboard/keyboards`, or the `~/.local/share`
/// equivalent.
pub fn default_keyboards_dir() -> Option<PathBuf> {
    data_dir(
        env::var_os("XDG_DATA_HOME").map(PathBuf::from),
        env::var_os("HOME").map(PathBuf::from),
    )
    .map(|dir| dir.join(KEYBOARDS_DATA_SUBDIR))
}

fn data_dir(xdg_data_home: Option<PathBuf>, home: Option<PathBuf>) -> Option<PathBuf> {
    xdg_data_home
        .filter(|p| p.is_absolute())
        .or_else(|| {
            home.filter(|h| !h.as_os_str().is_empty())
                .map(|h| h.join(".local/share"))
        })
}
