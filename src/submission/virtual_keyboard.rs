// SPDX-License-Identifier: GPL-3.0-only

//! Virtual keyboard channel.
//!
//! Wraps a [`VirtualKeyboardSink`] and remembers which keymap epoch the
//! compositor currently has, so that a key is never sent under a keymap
//! that does not contain it.

use super::keymap::{Binding, KeymapSnapshot};
use super::{SubmitError, VirtualKeyboardSink};
use crate::app_settings::MIN_KEYCODE;
use crate::layout::Modifiers;
use std::fs::File;

/// evdev codes are XKB keycodes minus this offset.
const EVDEV_OFFSET: u32 = MIN_KEYCODE - 1;

const KEY_RELEASED: u32 = 0;
const KEY_PRESSED: u32 = 1;

/// Virtual keyboard with keymap bookkeeping.
#[derive(Debug)]
pub struct VirtualKeyboard<V> {
    sink: V,
    installed_epoch: Option<u64>,
    /// Keeps the last keymap's file open until the next one is sent.
    keymap_file: Option<File>,
}

impl<V: VirtualKeyboardSink> VirtualKeyboard<V> {
    pub fn new(sink: V) -> Self {
        Self {
            sink,
            installed_epoch: None,
            keymap_file: None,
        }
    }

    pub fn sink(&self) -> &V {
        &self.sink
    }

    /// Epoch of the keymap the compositor has, if any was sent.
    pub fn installed_epoch(&self) -> Option<u64> {
        self.installed_epoch
    }

    /// Sends a keymap to the compositor.
    pub fn install_keymap(&mut self, snapshot: &KeymapSnapshot) -> Result<(), SubmitError> {
        let (file, size) = snapshot.materialize()?;
        self.sink.send_keymap(&file, size)?;
        // The previous file is closed here, after its replacement went out.
        self.keymap_file = Some(file);
        self.installed_epoch = Some(snapshot.epoch());
        tracing::debug!(
            "Installed keymap epoch {} ({} bytes)",
            snapshot.epoch(),
            size
        );
        Ok(())
    }

    /// Sends one key transition, framed by the modifier mask.
    ///
    /// Refuses bindings issued for a keymap other than the installed one.
    pub fn send_key(
        &mut self,
        binding: Binding,
        down: bool,
        mods: Modifiers,
        time: u32,
    ) -> Result<(), SubmitError> {
        if self.installed_epoch != Some(binding.epoch) {
            return Err(SubmitError::StaleBinding {
                keysym: binding.keysym,
                epoch: binding.epoch,
                installed: self.installed_epoch,
            });
        }
        let state = if down { KEY_PRESSED } else { KEY_RELEASED };
        self.send_modifiers_only(mods);
        self.sink.send_key(time, binding.code - EVDEV_OFFSET, state);
        self.send_modifiers_only(mods);
        Ok(())
    }

    /// Asserts the depressed modifier mask.
    pub fn send_modifiers_only(&mut self, mods: Modifiers) {
        self.sink.send_modifiers(mods.bits(), 0, 0, 0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::submission::keymap::KeymapSynthesizer;
    use crate::testing::{Wire, recording_sinks, take};

    #[test]
    fn test_key_requires_installed_keymap() {
        let (vk, _, log) = recording_sinks();
        let mut keyboard = VirtualKeyboard::new(vk);
        let mut synth = KeymapSynthesizer::new();
        let binding = synth.bind(0x61).unwrap();

        let err = keyboard.send_key(binding, true, Modifiers::empty(), 1).unwrap_err();
        assert!(matches!(err, SubmitError::StaleBinding { installed: None, .. }));
        assert!(take(&log).is_empty());

        keyboard.install_keymap(&synth.snapshot()).unwrap();
        assert_eq!(keyboard.installed_epoch(), Some(synth.epoch()));
        keyboard.send_key(binding, true, Modifiers::SHIFT, 7).unwrap();

        let wire = take(&log);
        let key_line = format!("key <I{}> {{ [ a ] }};", binding.code);
        assert!(matches!(&wire[0], Wire::Keymap(text) if text.contains(&key_line)));
        let framing = Wire::Modifiers {
            depressed: 1,
            latched: 0,
            locked: 0,
            group: 0,
        };
        assert_eq!(
            wire[1..],
            [
                framing.clone(),
                Wire::Key {
                    time: 7,
                    key: binding.code - 8,
                    state: 1
                },
                framing,
            ]
        );
    }

    #[test]
    fn test_stale_binding_refused() {
        let (vk, _, log) = recording_sinks();
        let mut keyboard = VirtualKeyboard::new(vk);
        let mut synth = KeymapSynthesizer::new();
        let old = synth.bind(0x61).unwrap();
        keyboard.install_keymap(&synth.snapshot()).unwrap();
        synth.bind(0x62).unwrap();
        keyboard.install_keymap(&synth.snapshot()).unwrap();
        take(&log);

        assert!(keyboard.send_key(old, false, Modifiers::empty(), 2).is_err());
        assert!(take(&log).is_empty());

        let fresh = synth.lookup(0x61).unwrap();
        keyboard.send_key(fresh, false, Modifiers::empty(), 2).unwrap();
        assert_eq!(take(&log).len(), 3);
    }
}
