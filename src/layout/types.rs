// SPDX-License-Identifier: GPL-3.0-only

//! Core data structures of a loaded keyboard layout.
//!
//! A [`Layout`] is an arena: views, rows, buttons and outlines are stored in
//! flat vectors and refer to each other through small integer handles
//! ([`ViewId`], [`RowId`], [`ButtonId`], [`OutlineId`]). Looking up the
//! parent of an item is a table query, there are no back pointers.
//!
//! Layouts are immutable once built. Swapping layouts means replacing the
//! whole `Arc<Layout>`.

use crate::layout::geometry::{Bounds, Outline, Point};
use bitflags::bitflags;
use std::fmt;

/// Handle of a view inside a [`Layout`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ViewId(pub usize);

/// Handle of a row inside a [`Layout`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RowId(pub usize);

/// Handle of a button inside a [`Layout`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ButtonId(pub usize);

/// Handle of an outline inside a [`Layout`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OutlineId(pub usize);

bitflags! {
    /// XKB real modifier mask, as sent in `modifiers` requests.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Modifiers: u32 {
        const SHIFT = 0x01;
        const LOCK = 0x02;
        const CONTROL = 0x04;
        /// Alt
        const MOD1 = 0x08;
        const MOD2 = 0x10;
        const MOD3 = 0x20;
        /// Super
        const MOD4 = 0x40;
        /// AltGr
        const MOD5 = 0x80;
    }
}

impl Modifiers {
    /// Parses a modifier name as used in layout files.
    pub fn from_layout_name(name: &str) -> Option<Self> {
        match name {
            "Shift" => Some(Self::SHIFT),
            "Lock" | "CapsLock" => Some(Self::LOCK),
            "Control" | "Ctrl" => Some(Self::CONTROL),
            "Alt" | "Mod1" => Some(Self::MOD1),
            "Mod2" => Some(Self::MOD2),
            "Mod3" => Some(Self::MOD3),
            "Super" | "Mod4" => Some(Self::MOD4),
            "AltGr" | "Mod5" => Some(Self::MOD5),
            _ => None,
        }
    }

    /// Modifiers that turn a printable key into a shortcut.
    pub fn shortcut_mask() -> Self {
        Self::CONTROL | Self::MOD1 | Self::MOD4
    }
}

/// How a modifier button changes the modifier state on release.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ModifierMode {
    /// Applies to the next non-modifier action, then clears.
    #[default]
    Latch,
    /// Stays active until toggled off.
    Lock,
}

/// What a button does.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Press and release a single keysym.
    Emit(u32),
    /// Type a string.
    Text(String),
    /// Switch to another view.
    SetView(ViewId),
    /// Switch to `lock` unless already there, in which case go to `unlock`.
    LockView { lock: ViewId, unlock: ViewId },
    /// Toggle a sticky modifier.
    Modifier(Modifiers, ModifierMode),
    /// Delete the character before the cursor.
    Erase,
    /// Hide the keyboard until the next request to show it.
    Dismiss,
}

impl Action {
    /// Returns the keysym for `Emit` actions.
    pub fn keysym(&self) -> Option<u32> {
        match self {
            Action::Emit(keysym) => Some(*keysym),
            _ => None,
        }
    }
}

/// What to draw on a button.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Label {
    Text(String),
    Icon(String),
}

/// A single key.
#[derive(Debug, Clone, PartialEq)]
pub struct Button {
    /// Identifier from the layout file, e.g. `a` or `Shift_L`.
    pub name: String,
    pub label: Label,
    pub outline: OutlineId,
    pub action: Action,
    /// Row containing this button.
    pub row: RowId,
    /// Horizontal position of the button origin within its row.
    pub offset: f64,
}

/// A line of buttons, possibly rotated around its origin.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    /// View containing this row.
    pub view: ViewId,
    /// Position of the row origin within its view.
    pub origin: Point,
    /// Rotation in degrees around `origin`.
    pub angle: f64,
    pub buttons: Vec<ButtonId>,
}

/// A keyboard face, e.g. lowercase letters or symbols.
#[derive(Debug, Clone, PartialEq)]
pub struct View {
    pub name: String,
    pub rows: Vec<RowId>,
    pub bounds: Bounds,
}

/// A complete, immutable keyboard layout.
#[derive(Debug, Clone, PartialEq)]
pub struct Layout {
    pub(crate) name: String,
    pub(crate) views: Vec<View>,
    pub(crate) rows: Vec<Row>,
    pub(crate) buttons: Vec<Button>,
    pub(crate) outlines: Vec<Outline>,
    pub(crate) default_view: ViewId,
    /// Views selected by modifier combinations, most specific first.
    pub(crate) modifier_views: Vec<(Modifiers, ViewId)>,
}

/// Errors that can occur while loading a layout.
#[derive(Debug)]
pub enum LayoutError {
    /// The layout file does not exist.
    Missing {
        path: String,
    },
    /// I/O error while reading a layout file.
    Io {
        source: std::io::Error,
        path: String,
    },
    /// Malformed JSON.
    Json {
        source: serde_json::Error,
        path: Option<String>,
        line: usize,
    },
    /// No embedded layout with this name.
    MissingResource {
        name: String,
    },
    /// The layout defines no views.
    NoViews,
    /// A view referenced by name does not exist.
    UnknownView {
        view: String,
        referenced_by: String,
    },
    /// A button uses an outline that is not defined.
    UnknownOutline {
        outline: String,
        button: String,
    },
    /// A keysym name that XKB does not know.
    UnknownKeysym {
        keysym: String,
        button: String,
    },
    /// A modifier name that is not one of the eight XKB real modifiers.
    UnknownModifier {
        modifier: String,
        referenced_by: String,
    },
    /// An outline with a non-positive or non-finite size.
    InvalidOutline {
        outline: String,
    },
}

impl LayoutError {
    /// Converts an I/O error, separating out missing files.
    pub fn from_io(source: std::io::Error, path: impl Into<String>) -> Self {
        let path = path.into();
        match source.kind() {
            std::io::ErrorKind::NotFound => LayoutError::Missing { path },
            _ => LayoutError::Io { source, path },
        }
    }

    /// Wraps a JSON error with an optional source path.
    pub fn json(source: serde_json::Error, path: Option<String>) -> Self {
        let line = source.line();
        LayoutError::Json { source, path, line }
    }

    /// Returns `true` if the error only means "not there".
    pub fn is_missing(&self) -> bool {
        matches!(
            self,
            LayoutError::Missing { .. } | LayoutError::MissingResource { .. }
        )
    }
}

impl fmt::Display for LayoutError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LayoutError::Missing { path } => write!(f, "layout file '{}' not found", path),
            LayoutError::Io { source, path } => {
                write!(f, "I/O error reading layout file '{}': {}", path, source)
            }
            LayoutError::Json { source, path, line } => {
                write!(f, "JSON parsing error")?;
                if let Some(path) = path {
                    write!(f, " in file '{}'", path)?;
                }
                write!(f, " at line {}: {}", line, source)
            }
            LayoutError::MissingResource { name } => {
                write!(f, "no built-in layout named '{}'", name)
            }
            LayoutError::NoViews => write!(f, "layout defines no views"),
            LayoutError::UnknownView {
                view,
                referenced_by,
            } => write!(f, "unknown view '{}' referenced by '{}'", view, referenced_by),
            LayoutError::UnknownOutline { outline, button } => {
                write!(f, "unknown outline '{}' used by button '{}'", outline, button)
            }
            LayoutError::UnknownKeysym { keysym, button } => {
                write!(f, "unknown keysym '{}' on button '{}'", keysym, button)
            }
            LayoutError::UnknownModifier {
                modifier,
                referenced_by,
            } => write!(
                f,
                "unknown modifier '{}' referenced by '{}'",
                modifier, referenced_by
            ),
            LayoutError::InvalidOutline { outline } => {
                write!(f, "outline '{}' has an invalid size", outline)
            }
        }
    }
}

impl std::error::Error for LayoutError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            LayoutError::Io { source, .. } => Some(source),
            LayoutError::Json { source, .. } => Some(source),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_modifier_names() {
        assert_eq!(Modifiers::from_layout_name("Shift"), Some(Modifiers::SHIFT));
        assert_eq!(Modifiers::from_layout_name("Mod1"), Some(Modifiers::MOD1));
        assert_eq!(Modifiers::from_layout_name("Alt"), Some(Modifiers::MOD1));
        assert_eq!(Modifiers::from_layout_name("AltGr"), Some(Modifiers::MOD5));
        assert_eq!(Modifiers::from_layout_name("Hyper"), None);
    }

    #[test]
    fn test_modifier_bits_match_xkb() {
        assert_eq!(Modifiers::SHIFT.bits(), 1);
        assert_eq!(Modifiers::LOCK.bits(), 2);
        assert_eq!(Modifiers::CONTROL.bits(), 4);
        assert_eq!(Modifiers::MOD5.bits(), 0x80);
        assert_eq!(Modifiers::all().bits(), 0xff);
    }

    #[test]
    fn test_layout_error_missing() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err = LayoutError::from_io(io, "/nope/us.json");
        assert!(err.is_missing());
        assert!(err.to_string().contains("/nope/us.json"));

        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        assert!(!LayoutError::from_io(io, "x").is_missing());
    }

    #[test]
    fn test_layout_error_json_line() {
        let source = serde_json::from_str::<serde_json::Value>("{\n\n  oops").unwrap_err();
        let err = LayoutError::json(source, Some("bad.json".into()));
        let message = err.to_string();
        assert!(message.contains("bad.json"));
        assert!(message.contains("line 3"));
    }

    #[test]
    fn test_action_keysym() {
        assert_eq!(Action::Emit(0x61).keysym(), Some(0x61));
        assert_eq!(Action::Erase.keysym(), None);
    }
}
