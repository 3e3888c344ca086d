// SPDX-License-Identifier: GPL-3.0-only

//! Layout parsing logic for loading JSON layout definitions.
//!
//! A layout file describes views as rows of space separated button names.
//! Button behaviour and shape come from the optional `buttons` and the
//! `outlines` tables:
//!
//! ```json
//! {
//!     "name": "us",
//!     "views": {
//!         "base": ["q w e r t y", "Shift_L z x c BackSpace"],
//!         "upper": ["Q W E R T Y", "Shift_L Z X C BackSpace"]
//!     },
//!     "buttons": {
//!         "Shift_L": { "modifier": "Shift", "label": "⇧" },
//!         "BackSpace": { "action": "erase", "outline": "wide" }
//!     },
//!     "outlines": {
//!         "default": { "width": 40, "height": 60 },
//!         "wide": { "width": 60, "height": 60 }
//!     },
//!     "modifier_views": [{ "modifiers": ["Shift"], "view": "upper" }]
//! }
//! ```
//!
//! Buttons without an entry in `buttons` derive their action from the name:
//! a single character types that character, a valid keysym name emits the
//! keysym, anything else is typed as text.

use crate::app_settings::{DEFAULT_OUTLINE, DEFAULT_VIEW};
use crate::layout::geometry::{Bounds, Outline, Point};
use crate::layout::types::{
    Action, Button, ButtonId, Label, Layout, LayoutError, ModifierMode, Modifiers, OutlineId,
    Row, RowId, View, ViewId,
};
use crate::symbol;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;

/// The root element of a layout file.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LayoutDescriptor {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub default_view: Option<String>,
    #[serde(default)]
    pub margins: Margins,
    pub views: BTreeMap<String, Vec<RowDescriptor>>,
    #[serde(default)]
    pub buttons: HashMap<String, ButtonDescriptor>,
    pub outlines: HashMap<String, OutlineDescriptor>,
    #[serde(default)]
    pub modifier_views: Vec<ModifierViewDescriptor>,
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Margins {
    #[serde(default)]
    pub top: f64,
    #[serde(default)]
    pub bottom: f64,
    #[serde(default)]
    pub side: f64,
}

/// A row: either a plain string of button names or a rotated row.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum RowDescriptor {
    Plain(String),
    Rotated {
        buttons: String,
        #[serde(default)]
        angle: f64,
    },
}

impl RowDescriptor {
    fn buttons(&self) -> &str {
        match self {
            RowDescriptor::Plain(buttons) => buttons,
            RowDescriptor::Rotated { buttons, .. } => buttons,
        }
    }

    fn angle(&self) -> f64 {
        match self {
            RowDescriptor::Plain(_) => 0.0,
            RowDescriptor::Rotated { angle, .. } => *angle,
        }
    }
}

/// Everything a layout file can say about one button name.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ButtonDescriptor {
    /// Special action. Conflicts with keysym, text, modifier.
    pub action: Option<ActionDescriptor>,
    /// XKB keysym name to emit.
    pub keysym: Option<String>,
    /// Text to type.
    pub text: Option<String>,
    /// Modifier name (`Shift`, `Control`, `Alt`, ...).
    pub modifier: Option<String>,
    #[serde(default)]
    pub modifier_mode: ModifierModeDescriptor,
    pub label: Option<String>,
    pub icon: Option<String>,
    /// Outline name, `default` if absent.
    pub outline: Option<String>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum ActionDescriptor {
    Erase,
    Dismiss,
    SetView(String),
    Locking {
        lock_view: String,
        unlock_view: String,
    },
}

#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum ModifierModeDescriptor {
    #[default]
    Latch,
    Lock,
}

impl From<ModifierModeDescriptor> for ModifierMode {
    fn from(mode: ModifierModeDescriptor) -> Self {
        match mode {
            ModifierModeDescriptor::Latch => ModifierMode::Latch,
            ModifierModeDescriptor::Lock => ModifierMode::Lock,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OutlineDescriptor {
    pub width: f64,
    pub height: f64,
    /// Optional polygon as `[x, y]` pairs relative to the button origin.
    #[serde(default)]
    pub points: Option<Vec<[f64; 2]>>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ModifierViewDescriptor {
    pub modifiers: Vec<String>,
    pub view: String,
}

/// Parses a keyboard layout from a JSON file.
///
/// A missing file is reported as [`LayoutError::Missing`] so that callers
/// can move on to the next source quietly.
pub fn parse_layout_file(path: &Path) -> Result<Layout, LayoutError> {
    let display = path.display().to_string();
    let json = fs::read_to_string(path).map_err(|e| LayoutError::from_io(e, display.clone()))?;
    let descriptor: LayoutDescriptor =
        serde_json::from_str(&json).map_err(|e| LayoutError::json(e, Some(display)))?;
    let fallback_name = path
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default();
    build_layout(descriptor, &fallback_name)
}

/// Parses a keyboard layout from a JSON string.
///
/// `name` is used when the document does not carry its own name.
pub fn parse_layout_from_string(json: &str, name: &str) -> Result<Layout, LayoutError> {
    let descriptor: LayoutDescriptor =
        serde_json::from_str(json).map_err(|e| LayoutError::json(e, None))?;
    build_layout(descriptor, name)
}

/// Turns a descriptor into a positioned [`Layout`].
pub fn build_layout(descriptor: LayoutDescriptor, fallback_name: &str) -> Result<Layout, LayoutError> {
    if descriptor.views.is_empty() {
        return Err(LayoutError::NoViews);
    }

    let outline_names: BTreeMap<&str, &OutlineDescriptor> = descriptor
        .outlines
        .iter()
        .map(|(name, outline)| (name.as_str(), outline))
        .collect();
    let mut outlines = Vec::with_capacity(outline_names.len());
    let mut outline_ids = HashMap::new();
    for (name, outline) in outline_names {
        let valid = |v: f64| v.is_finite() && v > 0.0;
        if !valid(outline.width) || !valid(outline.height) {
            return Err(LayoutError::InvalidOutline {
                outline: name.to_string(),
            });
        }
        outline_ids.insert(name, OutlineId(outlines.len()));
        outlines.push(Outline {
            width: outline.width,
            height: outline.height,
            polygon: outline
                .points
                .as_ref()
                .map(|points| points.iter().map(|[x, y]| Point::new(*x, *y)).collect()),
        });
    }

    let view_ids: HashMap<&str, ViewId> = descriptor
        .views
        .keys()
        .enumerate()
        .map(|(index, name)| (name.as_str(), ViewId(index)))
        .collect();

    let default_view = match &descriptor.default_view {
        Some(name) => *view_ids.get(name.as_str()).ok_or_else(|| LayoutError::UnknownView {
            view: name.clone(),
            referenced_by: "default_view".into(),
        })?,
        None => view_ids.get(DEFAULT_VIEW).copied().unwrap_or(ViewId(0)),
    };

    // Actions are shared by every instance of a button name.
    let mut actions: HashMap<&str, Action> = HashMap::new();
    for rows in descriptor.views.values() {
        for name in rows.iter().flat_map(|row| row.buttons().split_ascii_whitespace()) {
            if !actions.contains_key(name) {
                let action = create_action(name, descriptor.buttons.get(name), &view_ids)?;
                actions.insert(name, action);
            }
        }
    }

    let margins = descriptor.margins;
    let mut views = Vec::with_capacity(descriptor.views.len());
    let mut rows = Vec::new();
    let mut buttons = Vec::new();

    for (view_index, (view_name, row_descriptors)) in descriptor.views.iter().enumerate() {
        let view_id = ViewId(view_index);
        let mut row_ids = Vec::with_capacity(row_descriptors.len());
        let mut row_sizes = Vec::with_capacity(row_descriptors.len());

        for row_descriptor in row_descriptors {
            let row_id = RowId(rows.len());
            let mut button_ids = Vec::new();
            let mut offset = 0.0;
            let mut height: f64 = 0.0;
            for name in row_descriptor.buttons().split_ascii_whitespace() {
                let meta = descriptor.buttons.get(name);
                let outline_name = meta
                    .and_then(|m| m.outline.as_deref())
                    .unwrap_or(DEFAULT_OUTLINE);
                let outline_id = *outline_ids.get(outline_name).ok_or_else(|| {
                    LayoutError::UnknownOutline {
                        outline: outline_name.to_string(),
                        button: name.to_string(),
                    }
                })?;
                let outline = &outlines[outline_id.0];
                let action = actions
                    .get(name)
                    .cloned()
                    .unwrap_or_else(|| Action::Text(name.to_string()));

                button_ids.push(ButtonId(buttons.len()));
                buttons.push(Button {
                    name: name.to_string(),
                    label: create_label(name, meta),
                    outline: outline_id,
                    action,
                    row: row_id,
                    offset,
                });
                offset += outline.width;
                height = height.max(outline.height);
            }
            row_sizes.push((offset, height));
            rows.push(Row {
                view: view_id,
                origin: Point::default(),
                angle: row_descriptor.angle(),
                buttons: button_ids,
            });
            row_ids.push(row_id);
        }

        // Center rows horizontally and stack them.
        let width = row_sizes.iter().map(|(w, _)| *w).fold(0.0, f64::max);
        let mut y = margins.top;
        for (row_id, (row_width, row_height)) in row_ids.iter().zip(&row_sizes) {
            rows[row_id.0].origin = Point::new(margins.side + (width - row_width) / 2.0, y);
            y += row_height;
        }

        views.push(View {
            name: view_name.clone(),
            rows: row_ids,
            bounds: Bounds {
                x: 0.0,
                y: 0.0,
                width: width + 2.0 * margins.side,
                height: y + margins.bottom,
            },
        });
    }

    let mut modifier_views = Vec::with_capacity(descriptor.modifier_views.len());
    for entry in &descriptor.modifier_views {
        let view = *view_ids.get(entry.view.as_str()).ok_or_else(|| LayoutError::UnknownView {
            view: entry.view.clone(),
            referenced_by: "modifier_views".into(),
        })?;
        let mut mods = Modifiers::empty();
        for name in &entry.modifiers {
            mods |= Modifiers::from_layout_name(name).ok_or_else(|| LayoutError::UnknownModifier {
                modifier: name.clone(),
                referenced_by: "modifier_views".into(),
            })?;
        }
        modifier_views.push((mods, view));
    }
    // Most specific combination wins.
    modifier_views.sort_by_key(|(mods, _)| std::cmp::Reverse(mods.bits().count_ones()));

    let name = descriptor
        .name
        .unwrap_or_else(|| fallback_name.to_string());
    tracing::debug!(
        "Built layout '{}': {} views, {} buttons",
        name,
        views.len(),
        buttons.len()
    );

    Ok(Layout {
        name,
        views,
        rows,
        buttons,
        outlines,
        default_view,
        modifier_views,
    })
}

fn create_action(
    name: &str,
    meta: Option<&ButtonDescriptor>,
    view_ids: &HashMap<&str, ViewId>,
) -> Result<Action, LayoutError> {
    let lookup_view = |view: &str| {
        view_ids
            .get(view)
            .copied()
            .ok_or_else(|| LayoutError::UnknownView {
                view: view.to_string(),
                referenced_by: name.to_string(),
            })
    };

    let Some(meta) = meta else {
        return Ok(derive_action(name));
    };

    let given = [
        meta.action.is_some(),
        meta.modifier.is_some(),
        meta.keysym.is_some(),
        meta.text.is_some(),
    ]
    .iter()
    .filter(|set| **set)
    .count();
    if given > 1 {
        tracing::warn!(
            "Button '{}' sets more than one of action, modifier, keysym, text; using the first",
            name
        );
    }

    if let Some(action) = &meta.action {
        return Ok(match action {
            ActionDescriptor::Erase => Action::Erase,
            ActionDescriptor::Dismiss => Action::Dismiss,
            ActionDescriptor::SetView(view) => Action::SetView(lookup_view(view)?),
            ActionDescriptor::Locking {
                lock_view,
                unlock_view,
            } => Action::LockView {
                lock: lookup_view(lock_view)?,
                unlock: lookup_view(unlock_view)?,
            },
        });
    }
    if let Some(modifier) = &meta.modifier {
        let mods = Modifiers::from_layout_name(modifier).ok_or_else(|| LayoutError::UnknownModifier {
            modifier: modifier.clone(),
            referenced_by: name.to_string(),
        })?;
        return Ok(Action::Modifier(mods, meta.modifier_mode.into()));
    }
    if let Some(keysym) = &meta.keysym {
        return symbol::name_to_keysym(keysym)
            .map(Action::Emit)
            .ok_or_else(|| LayoutError::UnknownKeysym {
                keysym: keysym.clone(),
                button: name.to_string(),
            });
    }
    if let Some(text) = &meta.text {
        return Ok(Action::Text(text.clone()));
    }
    Ok(derive_action(name))
}

/// Action for a button known only by its name.
fn derive_action(name: &str) -> Action {
    let mut chars = name.chars();
    if let (Some(c), None) = (chars.next(), chars.next()) {
        return Action::Emit(symbol::char_to_keysym(c));
    }
    match symbol::name_to_keysym(name) {
        Some(keysym) => Action::Emit(keysym),
        None => Action::Text(name.to_string()),
    }
}

fn create_label(name: &str, meta: Option<&ButtonDescriptor>) -> Label {
    match meta {
        Some(ButtonDescriptor {
            icon: Some(icon), ..
        }) => Label::Icon(icon.clone()),
        Some(ButtonDescriptor {
            label: Some(label), ..
        }) => Label::Text(label.clone()),
        Some(ButtonDescriptor {
            text: Some(text), ..
        }) => Label::Text(text.clone()),
        _ => Label::Text(name.to_string()),
    }
}
