// SPDX-License-Identifier: GPL-3.0-only

//! Keyboard layout model.
//!
//! A layout is a set of named views (letters, uppercase, numbers, ...), each
//! made of rows of buttons. Layouts are loaded from JSON, either from a
//! directory on disk or from the layouts built into the binary, and are
//! immutable afterwards.
//!
//! # Example Usage
//!
//! ```rust,ignore
//! use squeekboard::layout::{load_layout, Point};
//!
//! let layout = load_layout("us", None);
//! let view = layout.default_view();
//! if let Some(button) = layout.hit_test(view, Point::new(12.0, 30.0)) {
//!     println!("hit {}", layout.button(button).name);
//! }
//! ```

pub mod geometry;
pub mod loader;
pub mod parser;
pub mod types;

pub use geometry::{Bounds, Outline, Point};
pub use loader::{LayoutSource, default_keyboards_dir, load_layout};
pub use parser::{parse_layout_file, parse_layout_from_string};
pub use types::{
    Action, Button, ButtonId, Label, Layout, LayoutError, ModifierMode, Modifiers, OutlineId,
    Row, RowId, View, ViewId,
};

use std::collections::BTreeSet;

impl Layout {
    /// Layout name, e.g. `us`.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The view shown after loading.
    pub fn default_view(&self) -> ViewId {
        self.default_view
    }

    pub fn view(&self, id: ViewId) -> &View {
        &self.views[id.0]
    }

    pub fn row(&self, id: RowId) -> &Row {
        &self.rows[id.0]
    }

    pub fn button(&self, id: ButtonId) -> &Button {
        &self.buttons[id.0]
    }

    pub fn outline(&self, id: OutlineId) -> &Outline {
        &self.outlines[id.0]
    }

    /// Returns `true` if the handle belongs to this layout.
    pub fn contains_button(&self, id: ButtonId) -> bool {
        id.0 < self.buttons.len()
    }

    /// All view handles, in a stable order.
    pub fn view_ids(&self) -> impl Iterator<Item = ViewId> + '_ {
        (0..self.views.len()).map(ViewId)
    }

    pub fn view_by_name(&self, name: &str) -> Option<ViewId> {
        self.views.iter().position(|v| v.name == name).map(ViewId)
    }

    /// View containing a button.
    pub fn view_of(&self, id: ButtonId) -> ViewId {
        self.row(self.button(id).row).view
    }

    /// Buttons of a view, row by row.
    pub fn buttons_in_view(&self, view: ViewId) -> impl Iterator<Item = ButtonId> + '_ {
        self.view(view)
            .rows
            .iter()
            .flat_map(move |row| self.row(*row).buttons.iter().copied())
    }

    /// First button named `name` in a view.
    pub fn find_button(&self, view: ViewId, name: &str) -> Option<ButtonId> {
        self.buttons_in_view(view)
            .find(|id| self.button(*id).name == name)
    }

    /// Center of a button in view coordinates.
    pub fn button_center(&self, id: ButtonId) -> Point {
        let button = self.button(id);
        let row = self.row(button.row);
        let local = self.outline(button.outline).bounds().center();
        local
            .offset_by(button.offset, 0.0)
            .rotate(row.angle)
            .offset_by(row.origin.x, row.origin.y)
    }

    /// Finds the button under a point of a view.
    ///
    /// Rows are searched in order. The point is translated into the row's
    /// frame and rotated by the inverse of the row angle before being tested
    /// against each button outline. Overlaps resolve to the first match in
    /// row order, then button order.
    pub fn hit_test(&self, view: ViewId, point: Point) -> Option<ButtonId> {
        for row_id in &self.view(view).rows {
            let row = self.row(*row_id);
            let local = point
                .offset_by(-row.origin.x, -row.origin.y)
                .rotate(-row.angle);
            for button_id in &row.buttons {
                let button = self.button(*button_id);
                let outline = self.outline(button.outline);
                if outline.contains(local.offset_by(-button.offset, 0.0)) {
                    return Some(*button_id);
                }
            }
        }
        None
    }

    /// View selected by a modifier combination.
    ///
    /// The most specific `modifier_views` entry contained in `mods` wins,
    /// falling back to the default view.
    pub fn view_for_modifiers(&self, mods: Modifiers) -> ViewId {
        self.modifier_views
            .iter()
            .find(|(required, _)| !required.is_empty() && mods.contains(*required))
            .map(|(_, view)| *view)
            .unwrap_or(self.default_view)
    }

    /// Returns `true` for views that follow modifier state.
    pub fn is_modifier_view(&self, view: ViewId) -> bool {
        view == self.default_view || self.modifier_views.iter().any(|(_, v)| *v == view)
    }

    /// Every keysym an `Emit` button of this layout can send.
    pub fn emitted_keysyms(&self) -> BTreeSet<u32> {
        self.buttons
            .iter()
            .filter_map(|button| button.action.keysym())
            .collect()
    }
}
