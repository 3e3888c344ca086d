// SPDX-License-Identifier: GPL-3.0-only

//! Submission of keyboard output to the compositor.
//!
//! Commands from the layout state machine leave the keyboard through one of
//! two channels:
//!
//! - the **virtual keyboard** (`zwp_virtual_keyboard_v1`), which sends key
//!   codes under a keymap synthesized from the layout ([`keymap`],
//!   [`virtual_keyboard`]);
//! - the **input method** (`zwp_input_method_v2`), which commits text to the
//!   focused field directly ([`input_method`]).
//!
//! [`Submission`] decides the route of every command. While a text field
//! is focused, printable characters and text go through the input method;
//! everything else, and everything while no field is focused, goes through
//! the virtual keyboard. A key up always follows the route of its key down.
//!
//! The protocol objects themselves sit behind [`VirtualKeyboardSink`] and
//! [`InputMethodSink`], so the logic runs unchanged against recording sinks
//! in tests.
//!
//! # Example Usage
//!
//! ```rust,ignore
//! use squeekboard::submission::Submission;
//!
//! let mut submission = Submission::new(virtual_keyboard, Some(input_method), true);
//! submission.set_layout(&layout, 0)?;
//! submission.handle_command(command)?;
//! ```

pub mod input_method;
pub mod keymap;
pub mod virtual_keyboard;

pub use input_method::{Applied, ChangeCause, ContentHint, ContentPurpose, InputMethod, SurroundingText};
pub use keymap::{Binding, KeymapError, KeymapSnapshot, KeymapSynthesizer};
pub use virtual_keyboard::VirtualKeyboard;

use crate::input::Command;
use crate::layout::{Layout, Modifiers};
use crate::symbol;
use std::fmt;
use std::fs::File;

/// Requests of `zwp_virtual_keyboard_v1`.
pub trait VirtualKeyboardSink {
    /// Sends an XKB v1 keymap stored in `file`, `size` bytes long.
    fn send_keymap(&mut self, file: &File, size: u32) -> Result<(), SubmitError>;
    /// `state` is 1 for pressed and 0 for released. `key` is an evdev code.
    fn send_key(&mut self, time: u32, key: u32, state: u32);
    fn send_modifiers(&mut self, depressed: u32, latched: u32, locked: u32, group: u32);
}

/// Requests of `zwp_input_method_v2`.
pub trait InputMethodSink {
    fn send_commit_string(&mut self, text: String);
    fn send_delete_surrounding_text(&mut self, before: u32, after: u32);
    fn send_commit(&mut self, serial: u32);
    fn destroy_input_method(&mut self);
}

/// Errors raised while submitting.
#[derive(Debug)]
pub enum SubmitError {
    Keymap(KeymapError),
    Io(std::io::Error),
    /// A key was sent with a binding from another keymap epoch.
    StaleBinding {
        keysym: u32,
        epoch: u64,
        installed: Option<u64>,
    },
}

impl fmt::Display for SubmitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubmitError::Keymap(e) => write!(f, "keymap error: {}", e),
            SubmitError::Io(e) => write!(f, "I/O error: {}", e),
            SubmitError::StaleBinding {
                keysym,
                epoch,
                installed,
            } => write!(
                f,
                "binding of keysym 0x{:x} is from keymap epoch {}, installed is {:?}",
                keysym, epoch, installed
            ),
        }
    }
}

impl std::error::Error for SubmitError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SubmitError::Keymap(e) => Some(e),
            SubmitError::Io(e) => Some(e),
            SubmitError::StaleBinding { .. } => None,
        }
    }
}

impl From<KeymapError> for SubmitError {
    fn from(e: KeymapError) -> Self {
        SubmitError::Keymap(e)
    }
}

impl From<std::io::Error> for SubmitError {
    fn from(e: std::io::Error) -> Self {
        SubmitError::Io(e)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Route {
    Keyboard { code: u32 },
    InputMethod,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct HeldKey {
    keysym: u32,
    route: Route,
}

/// Routes commands to the virtual keyboard or the input method.
#[derive(Debug)]
pub struct Submission<V, I> {
    keymap: KeymapSynthesizer,
    keyboard: VirtualKeyboard<V>,
    input_method: Option<InputMethod<I>>,
    /// Keys sent down and not yet up, in press order.
    held: Vec<HeldKey>,
    /// Last modifier mask asserted through the virtual keyboard.
    modifiers: Modifiers,
    delete_surrounding_text: bool,
}

impl<V: VirtualKeyboardSink, I: InputMethodSink> Submission<V, I> {
    /// Nothing is sent until the first [`Self::set_layout`].
    ///
    /// With `delete_surrounding_text`, Erase removes the character before
    /// the cursor through the input method when the text around the cursor
    /// is known.
    pub fn new(keyboard: V, input_method: Option<I>, delete_surrounding_text: bool) -> Self {
        Self {
            keymap: KeymapSynthesizer::new(),
            keyboard: VirtualKeyboard::new(keyboard),
            input_method: input_method.map(InputMethod::new),
            held: Vec::new(),
            modifiers: Modifiers::empty(),
            delete_surrounding_text,
        }
    }

    pub fn keymap(&self) -> &KeymapSynthesizer {
        &self.keymap
    }

    pub fn virtual_keyboard(&self) -> &VirtualKeyboard<V> {
        &self.keyboard
    }

    pub fn input_method(&self) -> Option<&InputMethod<I>> {
        self.input_method.as_ref()
    }

    /// Whether a text field is focused.
    pub fn is_im_active(&self) -> bool {
        self.input_method.as_ref().is_some_and(InputMethod::is_active)
    }

    /// Number of keys sent down and not released.
    pub fn held_count(&self) -> usize {
        self.held.len()
    }

    /// Switches to a new layout: releases held keys, then rebuilds and
    /// sends the keymap.
    pub fn set_layout(&mut self, layout: &Layout, time: u32) -> Result<(), SubmitError> {
        self.release_all(time)?;
        self.keymap.rebuild(layout.emitted_keysyms());
        self.ensure_installed()
    }

    /// Sends key up for every held virtual keyboard key.
    pub fn release_all(&mut self, time: u32) -> Result<(), SubmitError> {
        let held: Vec<HeldKey> = self.held.drain(..).collect();
        for key in held {
            if let Route::Keyboard { code } = key.route {
                self.key_up(key.keysym, code, self.modifiers, time)?;
            }
        }
        Ok(())
    }

    /// Asserts the modifier mask if it changed.
    pub fn set_modifiers(&mut self, mods: Modifiers) -> Result<(), SubmitError> {
        if mods == self.modifiers {
            return Ok(());
        }
        self.modifiers = mods;
        self.ensure_installed()?;
        self.keyboard.send_modifiers_only(mods);
        Ok(())
    }

    /// Sends one command.
    pub fn handle_command(&mut self, command: Command) -> Result<(), SubmitError> {
        match command {
            Command::KeyDown {
                keysym,
                modifiers,
                time,
            } => self.key_down(keysym, modifiers, time),
            Command::KeyUp {
                keysym,
                modifiers,
                time,
            } => {
                let Some(index) = self.held.iter().position(|key| key.keysym == keysym) else {
                    tracing::debug!("Key up of 0x{:x} that is not held", keysym);
                    return Ok(());
                };
                match self.held.remove(index).route {
                    Route::Keyboard { code } => self.key_up(keysym, code, modifiers, time),
                    Route::InputMethod => Ok(()),
                }
            }
            Command::Text { text, time } => match self.active_input_method() {
                Some(im) => {
                    im.commit_text(text);
                    Ok(())
                }
                None => {
                    for c in text.chars() {
                        self.tap(symbol::char_to_keysym(c), Modifiers::empty(), time)?;
                    }
                    // The taps left the compositor with an empty mask.
                    if !text.is_empty() && !self.modifiers.is_empty() {
                        self.keyboard.send_modifiers_only(self.modifiers);
                    }
                    Ok(())
                }
            },
            Command::Erase { time } => {
                let allow = self.delete_surrounding_text;
                if let Some(im) = self.active_input_method() {
                    if let Some(len) = im.erasable_len().filter(|_| allow) {
                        im.delete_before(len);
                        return Ok(());
                    }
                }
                self.tap(symbol::BACKSPACE, self.modifiers, time)
            }
        }
    }

    pub fn handle_im_activate(&mut self) {
        if let Some(im) = self.input_method.as_mut() {
            im.handle_activate();
        }
    }

    pub fn handle_im_deactivate(&mut self) {
        if let Some(im) = self.input_method.as_mut() {
            im.handle_deactivate();
        }
    }

    pub fn handle_im_surrounding_text(&mut self, text: String, cursor: u32, anchor: u32) {
        if let Some(im) = self.input_method.as_mut() {
            im.handle_surrounding_text(text, cursor, anchor);
        }
    }

    pub fn handle_im_content_type(&mut self, hint: u32, purpose: u32) {
        if let Some(im) = self.input_method.as_mut() {
            im.handle_content_type(hint, purpose);
        }
    }

    pub fn handle_im_text_change_cause(&mut self, cause: u32) {
        if let Some(im) = self.input_method.as_mut() {
            im.handle_text_change_cause(cause);
        }
    }

    pub fn handle_im_done(&mut self) -> Option<Applied> {
        self.input_method.as_mut().map(InputMethod::handle_done)
    }

    /// Drops the input method for good.
    pub fn handle_im_unavailable(&mut self) {
        if let Some(im) = self.input_method.take() {
            im.handle_unavailable();
        }
    }

    fn active_input_method(&mut self) -> Option<&mut InputMethod<I>> {
        self.input_method.as_mut().filter(|im| im.is_active())
    }

    fn key_down(&mut self, keysym: u32, mods: Modifiers, time: u32) -> Result<(), SubmitError> {
        let shortcut = mods.intersects(Modifiers::shortcut_mask());
        if !shortcut && symbol::is_printable(keysym) {
            if let Some(c) = symbol::keysym_to_char(keysym) {
                if let Some(im) = self.active_input_method() {
                    im.commit_text(c.to_string());
                    self.held.push(HeldKey {
                        keysym,
                        route: Route::InputMethod,
                    });
                    return Ok(());
                }
            }
        }
        let binding = self.bind(keysym)?;
        self.keymap.hold(binding.code);
        self.keyboard.send_key(binding, true, mods, time)?;
        self.held.push(HeldKey {
            keysym,
            route: Route::Keyboard { code: binding.code },
        });
        Ok(())
    }

    fn key_up(&mut self, keysym: u32, code: u32, mods: Modifiers, time: u32) -> Result<(), SubmitError> {
        self.keymap.unhold(code);
        self.ensure_installed()?;
        let binding = Binding {
            keysym,
            code,
            epoch: self.keymap.epoch(),
        };
        self.keyboard.send_key(binding, false, mods, time)
    }

    /// Press and release through the virtual keyboard.
    fn tap(&mut self, keysym: u32, mods: Modifiers, time: u32) -> Result<(), SubmitError> {
        let binding = self.bind(keysym)?;
        self.keyboard.send_key(binding, true, mods, time)?;
        self.keyboard.send_key(binding, false, mods, time)
    }

    /// Binds a keysym and makes sure the compositor knows the binding.
    fn bind(&mut self, keysym: u32) -> Result<Binding, SubmitError> {
        let binding = self.keymap.bind(keysym)?;
        self.ensure_installed()?;
        Ok(binding)
    }

    fn ensure_installed(&mut self) -> Result<(), SubmitError> {
        if self.keyboard.installed_epoch() != Some(self.keymap.epoch()) {
            self.keyboard.install_keymap(&self.keymap.snapshot())?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{
        RecordingInputMethod, RecordingKeyboard, Wire, recording_sinks, take, test_layout,
        without_keymaps, WireLog,
    };

    type TestSubmission = Submission<RecordingKeyboard, RecordingInputMethod>;

    fn submission(with_im: bool) -> (TestSubmission, WireLog) {
        let (vk, im, log) = recording_sinks();
        let mut submission = Submission::new(vk, with_im.then_some(im), true);
        submission.set_layout(&test_layout(), 0).unwrap();
        take(&log);
        (submission, log)
    }

    fn activate(submission: &mut TestSubmission) {
        submission.handle_im_activate();
        submission.handle_im_done();
    }

    fn mods(depressed: u32) -> Wire {
        Wire::Modifiers {
            depressed,
            latched: 0,
            locked: 0,
            group: 0,
        }
    }

    fn down(keysym: u32, time: u32) -> Command {
        Command::KeyDown {
            keysym,
            modifiers: Modifiers::empty(),
            time,
        }
    }

    fn up(keysym: u32, time: u32) -> Command {
        Command::KeyUp {
            keysym,
            modifiers: Modifiers::empty(),
            time,
        }
    }

    fn code_of(submission: &TestSubmission, keysym: u32) -> u32 {
        submission
            .keymap()
            .bindings()
            .find(|(_, k)| *k == keysym)
            .map(|(code, _)| code)
            .expect("keysym is bound")
    }

    #[test]
    fn test_set_layout_installs_keymap() {
        let (vk, im, log) = recording_sinks();
        let mut submission = Submission::new(vk, Some(im), true);
        submission.set_layout(&test_layout(), 0).unwrap();

        let wire = take(&log);
        assert_eq!(wire.len(), 1);
        let Wire::Keymap(text) = &wire[0] else {
            panic!("expected a keymap, got {:?}", wire);
        };
        for name in ["a", "A", "space", "Return", "BackSpace", "1"] {
            assert!(text.contains(&format!("[ {} ]", name)), "{} missing", name);
        }
        assert_eq!(
            submission.virtual_keyboard().installed_epoch(),
            Some(submission.keymap().epoch())
        );
    }

    #[test]
    fn test_key_without_im() {
        let (mut submission, log) = submission(true);
        let code = code_of(&submission, 0x61);

        submission.handle_command(down(0x61, 100)).unwrap();
        submission.handle_command(up(0x61, 150)).unwrap();
        assert_eq!(
            take(&log),
            vec![
                mods(0),
                Wire::Key { time: 100, key: code - 8, state: 1 },
                mods(0),
                mods(0),
                Wire::Key { time: 150, key: code - 8, state: 0 },
                mods(0),
            ]
        );
    }

    #[test]
    fn test_printable_goes_to_im() {
        let (mut submission, log) = submission(true);
        activate(&mut submission);

        submission.handle_command(down(0x61, 1)).unwrap();
        submission.handle_command(up(0x61, 2)).unwrap();
        assert_eq!(
            take(&log),
            vec![Wire::CommitString("a".into()), Wire::Commit(1)]
        );
        assert_eq!(submission.held_count(), 0);
    }

    #[test]
    fn test_shortcut_bypasses_im() {
        let (mut submission, log) = submission(true);
        activate(&mut submission);
        let code = code_of(&submission, 0x61);

        submission
            .handle_command(Command::KeyDown {
                keysym: 0x61,
                modifiers: Modifiers::CONTROL,
                time: 1,
            })
            .unwrap();
        assert_eq!(
            take(&log),
            vec![mods(4), Wire::Key { time: 1, key: code - 8, state: 1 }, mods(4)]
        );
    }

    #[test]
    fn test_non_printable_goes_to_keyboard() {
        let (mut submission, log) = submission(true);
        activate(&mut submission);
        let code = code_of(&submission, symbol::RETURN);

        submission.handle_command(down(symbol::RETURN, 1)).unwrap();
        submission.handle_command(up(symbol::RETURN, 2)).unwrap();
        let wire = take(&log);
        assert_eq!(wire.len(), 6);
        assert_eq!(wire[1], Wire::Key { time: 1, key: code - 8, state: 1 });
        assert_eq!(wire[4], Wire::Key { time: 2, key: code - 8, state: 0 });
    }

    /// A key pressed before activation is released on the keyboard
    #[test]
    fn test_key_up_follows_key_down_route() {
        let (mut submission, log) = submission(true);
        submission.handle_command(down(0x61, 1)).unwrap();
        activate(&mut submission);
        submission.handle_command(up(0x61, 2)).unwrap();

        let wire = take(&log);
        assert!(wire.iter().all(|w| !matches!(w, Wire::CommitString(_))));
        assert!(wire.contains(&Wire::Key {
            time: 2,
            key: code_of(&submission, 0x61) - 8,
            state: 0
        }));
    }

    #[test]
    fn test_text_with_im() {
        let (mut submission, log) = submission(true);
        activate(&mut submission);
        submission
            .handle_command(Command::Text {
                text: ".com".into(),
                time: 1,
            })
            .unwrap();
        assert_eq!(
            take(&log),
            vec![Wire::CommitString(".com".into()), Wire::Commit(1)]
        );
    }

    /// Text without an input method types each character
    #[test]
    fn test_text_without_im_binds_on_demand() {
        let (mut submission, log) = submission(false);
        let epoch = submission.keymap().epoch();
        submission
            .handle_command(Command::Text {
                text: "é€".into(),
                time: 5,
            })
            .unwrap();

        let wire = take(&log);
        let keymaps: Vec<&Wire> = wire.iter().filter(|w| matches!(w, Wire::Keymap(_))).collect();
        assert_eq!(keymaps.len(), 2);
        assert_eq!(submission.keymap().epoch(), epoch + 2);

        // Each keymap precedes the key events that use it.
        assert!(matches!(wire[0], Wire::Keymap(_)));
        let keys: Vec<(u32, u32)> = wire
            .iter()
            .filter_map(|w| match w {
                Wire::Key { key, state, .. } => Some((*key, *state)),
                _ => None,
            })
            .collect();
        let e_acute = code_of(&submission, symbol::char_to_keysym('é')) - 8;
        let euro = code_of(&submission, symbol::char_to_keysym('€')) - 8;
        assert_eq!(keys, vec![(e_acute, 1), (e_acute, 0), (euro, 1), (euro, 0)]);
    }

    /// Typed text leaves the locked modifiers asserted
    #[test]
    fn test_text_without_im_restores_modifiers() {
        let (mut submission, log) = submission(false);
        submission.set_modifiers(Modifiers::LOCK).unwrap();
        take(&log);

        submission
            .handle_command(Command::Text {
                text: "ab".into(),
                time: 5,
            })
            .unwrap();
        let wire = without_keymaps(take(&log));
        assert_eq!(wire[0], mods(0));
        assert_eq!(wire.last(), Some(&mods(Modifiers::LOCK.bits())));
        assert_eq!(
            wire.iter().filter(|w| matches!(w, Wire::Key { .. })).count(),
            4
        );

        // Nothing to restore without modifiers.
        submission.set_modifiers(Modifiers::empty()).unwrap();
        take(&log);
        submission
            .handle_command(Command::Text {
                text: "a".into(),
                time: 6,
            })
            .unwrap();
        assert_eq!(without_keymaps(take(&log)).last(), Some(&mods(0)));
    }

    #[test]
    fn test_erase() {
        // Without an active IM, BackSpace goes to the keyboard.
        let (mut submission, log) = submission(true);
        let backspace = code_of(&submission, symbol::BACKSPACE) - 8;
        submission.handle_command(Command::Erase { time: 3 }).unwrap();
        let keys: Vec<Wire> = take(&log)
            .into_iter()
            .filter(|w| matches!(w, Wire::Key { .. }))
            .collect();
        assert_eq!(
            keys,
            vec![
                Wire::Key { time: 3, key: backspace, state: 1 },
                Wire::Key { time: 3, key: backspace, state: 0 },
            ]
        );

        // Active IM with known text deletes the previous character.
        submission.handle_im_activate();
        submission.handle_im_surrounding_text("añ".into(), 3, 3);
        submission.handle_im_done();
        submission.handle_command(Command::Erase { time: 4 }).unwrap();
        assert_eq!(
            take(&log),
            vec![Wire::DeleteSurroundingText { before: 2, after: 0 }, Wire::Commit(1)]
        );

        // Active IM without text falls back to BackSpace.
        submission.handle_im_activate();
        submission.handle_im_done();
        submission.handle_command(Command::Erase { time: 5 }).unwrap();
        assert!(take(&log).contains(&Wire::Key { time: 5, key: backspace, state: 1 }));
    }

    #[test]
    fn test_erase_with_deletion_disabled() {
        let (vk, im, log) = recording_sinks();
        let mut submission = Submission::new(vk, Some(im), false);
        submission.set_layout(&test_layout(), 0).unwrap();
        submission.handle_im_activate();
        submission.handle_im_surrounding_text("ab".into(), 2, 2);
        submission.handle_im_done();
        take(&log);

        submission.handle_command(Command::Erase { time: 1 }).unwrap();
        let wire = take(&log);
        assert!(wire.iter().all(|w| !matches!(w, Wire::DeleteSurroundingText { .. })));
        assert_eq!(wire.len(), 6);
    }

    #[test]
    fn test_set_modifiers_only_on_change() {
        let (mut submission, log) = submission(false);
        submission.set_modifiers(Modifiers::empty()).unwrap();
        assert!(take(&log).is_empty());
        submission.set_modifiers(Modifiers::SHIFT).unwrap();
        submission.set_modifiers(Modifiers::SHIFT).unwrap();
        assert_eq!(take(&log), vec![mods(1)]);
    }

    #[test]
    fn test_release_all_and_layout_swap() {
        let (mut submission, log) = submission(true);
        let a = code_of(&submission, 0x61) - 8;
        submission.handle_command(down(0x61, 1)).unwrap();
        take(&log);

        submission.set_layout(&test_layout(), 9).unwrap();
        let wire = take(&log);
        assert_eq!(
            without_keymaps(wire.clone()),
            vec![mods(0), Wire::Key { time: 9, key: a, state: 0 }, mods(0)]
        );
        assert!(matches!(wire.last(), Some(Wire::Keymap(_))));
        assert_eq!(submission.held_count(), 0);

        // The old key up no longer matches anything.
        submission.handle_command(up(0x61, 10)).unwrap();
        assert!(take(&log).is_empty());
    }

    #[test]
    fn test_unavailable_falls_back_to_keyboard() {
        let (mut submission, log) = submission(true);
        activate(&mut submission);
        submission.handle_im_unavailable();
        assert_eq!(take(&log), vec![Wire::Destroy]);
        assert!(submission.input_method().is_none());
        assert!(!submission.is_im_active());

        submission.handle_command(down(0x61, 1)).unwrap();
        assert!(take(&log).iter().any(|w| matches!(w, Wire::Key { .. })));
    }
}
