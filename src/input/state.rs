// SPDX-License-Identifier: GPL-3.0-only

//! Layout state machine.
//!
//! Tracks which buttons are held, the latched and locked modifiers, and
//! the visible view. Button presses and releases go in, [`StateEvent`]s
//! come out.
//!
//! Keys that emit a keysym are sent on press, so that the compositor's key
//! repeat works during a long hold. Everything else (modifiers, view
//! switches, text) applies on release, so sliding off a key cancels it.

use crate::input::modifier::ModifierState;
use crate::layout::{Action, ButtonId, Layout, Modifiers, ViewId};
use crate::symbol;
use std::sync::Arc;

/// Something the submission layer has to send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    KeyDown {
        keysym: u32,
        modifiers: Modifiers,
        time: u32,
    },
    KeyUp {
        keysym: u32,
        modifiers: Modifiers,
        time: u32,
    },
    Text {
        text: String,
        time: u32,
    },
    Erase {
        time: u32,
    },
}

/// Output of the state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StateEvent {
    Submit(Command),
    ViewChanged(ViewId),
    ModifiersChanged(Modifiers),
    PressedChanged,
    Dismiss,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Held {
    button: ButtonId,
    /// Keysym already sent down for this press.
    key_down: Option<u32>,
}

/// Mutable state of the visible keyboard.
#[derive(Debug, Clone)]
pub struct LayoutState {
    layout: Arc<Layout>,
    active_view: ViewId,
    modifiers: ModifierState,
    /// Held buttons, in press order.
    pressed: Vec<Held>,
}

impl LayoutState {
    /// Starts on the layout's default view with no modifiers.
    pub fn new(layout: Arc<Layout>) -> Self {
        let active_view = layout.default_view();
        Self {
            layout,
            active_view,
            modifiers: ModifierState::new(),
            pressed: Vec::new(),
        }
    }

    pub fn layout(&self) -> &Arc<Layout> {
        &self.layout
    }

    pub fn active_view(&self) -> ViewId {
        self.active_view
    }

    pub fn modifiers(&self) -> &ModifierState {
        &self.modifiers
    }

    /// `locked | latched`
    pub fn current_mods(&self) -> Modifiers {
        self.modifiers.current()
    }

    /// Held buttons in press order.
    pub fn pressed(&self) -> impl Iterator<Item = ButtonId> + '_ {
        self.pressed.iter().map(|held| held.button)
    }

    pub fn is_pressed(&self, button: ButtonId) -> bool {
        self.pressed.iter().any(|held| held.button == button)
    }

    /// Whether a button should be drawn as latched/locked.
    pub fn is_button_active(&self, button: ButtonId) -> bool {
        match &self.layout.button(button).action {
            Action::Modifier(bits, _) => self.modifiers.is_active(*bits),
            Action::LockView { lock, .. } => self.active_view == *lock,
            _ => false,
        }
    }

    /// Replaces the layout.
    ///
    /// Held keys must have been released with [`Self::release_all`] first;
    /// anything still held is dropped without a key up.
    pub fn set_layout(&mut self, layout: Arc<Layout>) -> Vec<StateEvent> {
        if !self.pressed.is_empty() {
            tracing::warn!(
                "Swapping layout with {} buttons still held",
                self.pressed.len()
            );
        }
        let mut events = Vec::new();
        let before = self.modifiers.current();
        self.pressed.clear();
        self.modifiers.clear_all();
        self.active_view = layout.default_view();
        self.layout = layout;
        if !before.is_empty() {
            events.push(StateEvent::ModifiersChanged(Modifiers::empty()));
        }
        events.push(StateEvent::ViewChanged(self.active_view));
        events
    }

    /// Switches view. Switching to the current view does nothing.
    pub fn set_view(&mut self, view: ViewId) -> Vec<StateEvent> {
        if view == self.active_view {
            return Vec::new();
        }
        self.active_view = view;
        vec![StateEvent::ViewChanged(view)]
    }

    /// A button went down.
    pub fn depress(&mut self, button: ButtonId, time: u32) -> Vec<StateEvent> {
        if !self.layout.contains_button(button) || self.is_pressed(button) {
            return Vec::new();
        }
        let mut events = vec![StateEvent::PressedChanged];
        let key_down = match self.layout.button(button).action {
            Action::Emit(keysym) if !symbol::is_modifier(keysym) => {
                events.push(StateEvent::Submit(Command::KeyDown {
                    keysym,
                    modifiers: self.current_mods(),
                    time,
                }));
                Some(keysym)
            }
            _ => None,
        };
        self.pressed.push(Held { button, key_down });
        events
    }

    /// A button went up, or was cancelled.
    ///
    /// A cancelled release only balances a key that was already sent down.
    pub fn release(&mut self, button: ButtonId, time: u32, cancelled: bool) -> Vec<StateEvent> {
        let Some(index) = self.pressed.iter().position(|held| held.button == button) else {
            return Vec::new();
        };
        let held = self.pressed.remove(index);
        let mut events = vec![StateEvent::PressedChanged];
        let mods = self.current_mods();

        if let Some(keysym) = held.key_down {
            events.push(StateEvent::Submit(Command::KeyUp {
                keysym,
                modifiers: mods,
                time,
            }));
        }
        if cancelled {
            return events;
        }

        match self.layout.button(button).action.clone() {
            Action::Emit(keysym) => {
                if held.key_down.is_none() {
                    // Modifier keysyms are sent as a tap on release.
                    events.push(StateEvent::Submit(Command::KeyDown {
                        keysym,
                        modifiers: mods,
                        time,
                    }));
                    events.push(StateEvent::Submit(Command::KeyUp {
                        keysym,
                        modifiers: mods,
                        time,
                    }));
                }
                self.clear_latched(&mut events);
            }
            Action::Text(text) => {
                events.push(StateEvent::Submit(Command::Text { text, time }));
                self.clear_latched(&mut events);
            }
            Action::Erase => {
                events.push(StateEvent::Submit(Command::Erase { time }));
                self.clear_latched(&mut events);
            }
            Action::SetView(view) => events.extend(self.set_view(view)),
            Action::LockView { lock, unlock } => {
                let target = if self.active_view == lock { unlock } else { lock };
                events.extend(self.set_view(target));
            }
            Action::Modifier(bits, mode) => {
                if self.modifiers.toggle(bits, mode) {
                    self.modifiers_changed(&mut events);
                }
            }
            Action::Dismiss => events.push(StateEvent::Dismiss),
        }
        events
    }

    /// Releases every held button in press order.
    ///
    /// Keys sent down get their key up, latched modifiers are cleared and
    /// locked ones kept.
    pub fn release_all(&mut self, time: u32) -> Vec<StateEvent> {
        let mut events = Vec::new();
        let mods = self.current_mods();
        for held in self.pressed.drain(..) {
            if let Some(keysym) = held.key_down {
                events.push(StateEvent::Submit(Command::KeyUp {
                    keysym,
                    modifiers: mods,
                    time,
                }));
            }
        }
        if !events.is_empty() {
            events.insert(0, StateEvent::PressedChanged);
        }
        self.clear_latched(&mut events);
        events
    }

    fn clear_latched(&mut self, events: &mut Vec<StateEvent>) {
        if self.modifiers.clear_latched() {
            self.modifiers_changed(events);
        }
    }

    fn modifiers_changed(&mut self, events: &mut Vec<StateEvent>) {
        let mods = self.current_mods();
        events.push(StateEvent::ModifiersChanged(mods));
        if self.layout.is_modifier_view(self.active_view) {
            let view = self.layout.view_for_modifiers(mods);
            events.extend(self.set_view(view));
        }
    }
}
