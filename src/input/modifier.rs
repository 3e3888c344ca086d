// SPDX-License-Identifier: GPL-3.0-only

//! Modifier state management for keyboard input.
//!
//! Modifier buttons on a touch keyboard are sticky. They come in two
//! flavours:
//!
//! - **Latched**: applies to the next non-modifier action, then clears
//! - **Locked**: stays active until toggled off again
//!
//! The effective mask sent to the compositor is the union of both sets.
//!
//! # Example
//!
//! ```rust,ignore
//! use squeekboard::input::ModifierState;
//! use squeekboard::layout::{ModifierMode, Modifiers};
//!
//! let mut state = ModifierState::new();
//!
//! // Shift tapped once
//! state.toggle(Modifiers::SHIFT, ModifierMode::Latch);
//! assert_eq!(state.current(), Modifiers::SHIFT);
//!
//! // ... user types a letter ...
//! state.clear_latched();
//! assert!(state.current().is_empty());
//! ```

use crate::layout::{ModifierMode, Modifiers};

/// Latched and locked modifier sets.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ModifierState {
    /// Modifiers that clear after the next non-modifier action
    latched: Modifiers,

    /// Modifiers that persist until toggled off
    locked: Modifiers,
}

impl ModifierState {
    /// Creates a new `ModifierState` with no active modifiers.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Toggles modifier bits the way a modifier button release does.
    ///
    /// * `Latch` flips the bits in the latched set.
    /// * `Lock` flips the bits in the locked set and removes them from the
    ///   latched set.
    ///
    /// # Returns
    ///
    /// `true` if the effective mask changed.
    pub fn toggle(&mut self, modifiers: Modifiers, mode: ModifierMode) -> bool {
        let before = self.current();
        match mode {
            ModifierMode::Latch => self.latched.toggle(modifiers),
            ModifierMode::Lock => {
                self.locked.toggle(modifiers);
                self.latched.remove(modifiers);
            }
        }
        self.current() != before
    }

    /// The effective modifier mask: `locked | latched`.
    #[must_use]
    pub fn current(&self) -> Modifiers {
        self.locked | self.latched
    }

    #[must_use]
    pub fn latched(&self) -> Modifiers {
        self.latched
    }

    #[must_use]
    pub fn locked(&self) -> Modifiers {
        self.locked
    }

    /// Checks whether any of the given bits are latched or locked.
    ///
    /// This is what a modifier button should show as "pressed".
    #[must_use]
    pub fn is_active(&self, modifiers: Modifiers) -> bool {
        self.current().intersects(modifiers)
    }

    /// Clears the latched set.
    ///
    /// # Returns
    ///
    /// `true` if the effective mask changed.
    pub fn clear_latched(&mut self) -> bool {
        let before = self.current();
        self.latched = Modifiers::empty();
        self.current() != before
    }

    /// Clears both sets.
    pub fn clear_all(&mut self) {
        self.latched = Modifiers::empty();
        self.locked = Modifiers::empty();
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
