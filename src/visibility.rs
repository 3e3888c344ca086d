// SPDX-License-Identifier: GPL-3.0-only

//! Visibility coordinator.
//!
//! The keyboard is shown when either the shell (over D-Bus) or the input
//! method asks for it, unless the user dismissed it. A dismissal lasts
//! until one of the two requests rises again.

/// Merged visibility intents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Visibility {
    requested_by_shell: bool,
    requested_by_im: bool,
    dismissed: bool,
}

impl Visibility {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Effective visibility.
    pub fn is_visible(&self) -> bool {
        (self.requested_by_shell || self.requested_by_im) && !self.dismissed
    }

    pub fn requested_by_shell(&self) -> bool {
        self.requested_by_shell
    }

    pub fn requested_by_im(&self) -> bool {
        self.requested_by_im
    }

    pub fn is_dismissed(&self) -> bool {
        self.dismissed
    }

    /// `SetVisible` from the shell. Returns the new visibility if it changed.
    pub fn set_shell_request(&mut self, visible: bool) -> Option<bool> {
        self.update(|v| {
            if visible && !v.requested_by_shell {
                v.dismissed = false;
            }
            v.requested_by_shell = visible;
        })
    }

    /// Input method (de)activation.
    pub fn set_im_request(&mut self, active: bool) -> Option<bool> {
        self.update(|v| {
            if active && !v.requested_by_im {
                v.dismissed = false;
            }
            v.requested_by_im = active;
        })
    }

    /// The user hid the keyboard.
    pub fn dismiss(&mut self) -> Option<bool> {
        self.update(|v| v.dismissed = true)
    }

    fn update(&mut self, change: impl FnOnce(&mut Self)) -> Option<bool> {
        let before = self.is_visible();
        change(self);
        let after = self.is_visible();
        (before != after).then(|| {
            tracing::info!(
                "Keyboard {} (shell: {}, input method: {}, dismissed: {})",
                if after { "shown" } else { "hidden" },
                self.requested_by_shell,
                self.requested_by_im,
                self.dismissed
            );
            after
        })
    }
}
