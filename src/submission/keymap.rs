// SPDX-License-Identifier: GPL-3.0-only

//! XKB keymap synthesis.
//!
//! The virtual keyboard has no fixed hardware layout. Instead every keysym
//! the keyboard may send gets its own keycode, and a keymap describing
//! exactly those keycodes is generated and handed to the compositor.
//!
//! Keycodes run from [`MIN_KEYCODE`] to [`MAX_KEYCODE`]. A layout binds
//! its keysyms up front; keysyms that only show up at runtime (text typed
//! character by character without an input method) are bound on demand in
//! the spare codes, evicting the least recently used binding that is not
//! currently held down when the table is full.
//!
//! Every change to the bindings bumps the *epoch*. A [`Binding`] is only
//! valid against the keymap of the epoch it was issued in, which keeps a
//! recycled keycode from ever being sent under an outdated keymap.

use crate::app_settings::{MAX_KEYCODE, MIN_KEYCODE, SPARE_KEYCODES};
use crate::symbol;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::fs::File;
use std::io::Write;
use std::path::PathBuf;

/// Number of assignable keycodes.
const KEYCODE_COUNT: usize = (MAX_KEYCODE - MIN_KEYCODE + 1) as usize;

/// Errors that can occur while binding keysyms or writing keymaps.
#[derive(Debug)]
pub enum KeymapError {
    /// The keymap file could not be created or written.
    Io(std::io::Error),
    /// The keymap text does not fit the protocol's size field.
    TooLarge(usize),
    /// Every keycode is bound to a key that is currently held.
    NoFreeKeycode,
    /// The keysym has no XKB name and cannot appear in a keymap.
    UnnamedKeysym(u32),
}

impl fmt::Display for KeymapError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeymapError::Io(e) => write!(f, "failed to write keymap: {}", e),
            KeymapError::TooLarge(size) => write!(f, "keymap of {} bytes is too large", size),
            KeymapError::NoFreeKeycode => write!(f, "no keycode left to bind"),
            KeymapError::UnnamedKeysym(keysym) => {
                write!(f, "keysym 0x{:x} has no name", keysym)
            }
        }
    }
}

impl std::error::Error for KeymapError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            KeymapError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for KeymapError {
    fn from(e: std::io::Error) -> Self {
        KeymapError::Io(e)
    }
}

/// A keysym's keycode, valid for one keymap epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Binding {
    pub keysym: u32,
    pub code: u32,
    pub epoch: u64,
}

#[derive(Debug, Clone)]
struct Slot {
    keysym: u32,
    name: String,
    last_used: u64,
}

/// Generated keymap text for one epoch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeymapSnapshot {
    text: String,
    epoch: u64,
}

impl KeymapSnapshot {
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Writes the keymap, NUL terminated, into an unlinked file.
    ///
    /// The file lives in `XDG_RUNTIME_DIR` when set, so that it is backed by
    /// memory. Returns the file and the size to announce.
    pub fn materialize(&self) -> Result<(File, u32), KeymapError> {
        let dir = std::env::var_os("XDG_RUNTIME_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(std::env::temp_dir);
        let mut file = tempfile::tempfile_in(dir)?;
        let mut bytes = Vec::with_capacity(self.text.len() + 1);
        bytes.extend_from_slice(self.text.as_bytes());
        bytes.push(0);
        let size = u32::try_from(bytes.len()).map_err(|_| KeymapError::TooLarge(bytes.len()))?;
        file.write_all(&bytes)?;
        file.flush()?;
        Ok((file, size))
    }
}

/// Keysym to keycode table and keymap generator.
#[derive(Debug, Clone)]
pub struct KeymapSynthesizer {
    slots: BTreeMap<u32, Slot>,
    codes: HashMap<u32, u32>,
    /// Press counts of keycodes currently down.
    held: HashMap<u32, usize>,
    epoch: u64,
    clock: u64,
}

impl Default for KeymapSynthesizer {
    fn default() -> Self {
        Self::new()
    }
}

impl KeymapSynthesizer {
    /// A table holding only the always-present keysyms.
    pub fn new() -> Self {
        let mut synthesizer = Self {
            slots: BTreeMap::new(),
            codes: HashMap::new(),
            held: HashMap::new(),
            epoch: 0,
            clock: 0,
        };
        synthesizer.rebuild(std::iter::empty());
        synthesizer
    }

    /// Replaces all bindings with the given keysyms.
    ///
    /// Keysyms are assigned in ascending order, so equal inputs produce
    /// equal keymaps. BackSpace and Return are always bound. At most
    /// `KEYCODE_COUNT - SPARE_KEYCODES` keysyms are bound up front; the rest
    /// get bound when first used.
    pub fn rebuild(&mut self, keysyms: impl IntoIterator<Item = u32>) {
        let mut wanted: BTreeSet<u32> = keysyms.into_iter().collect();
        wanted.insert(symbol::BACKSPACE);
        wanted.insert(symbol::RETURN);

        self.slots.clear();
        self.codes.clear();
        self.held.clear();
        self.clock = 0;

        let capacity = KEYCODE_COUNT - SPARE_KEYCODES;
        let mut code = MIN_KEYCODE;
        let mut skipped = 0;
        for keysym in wanted {
            let Some(name) = symbol::keysym_to_name(keysym) else {
                tracing::warn!("Keysym 0x{:x} has no name, leaving it unbound", keysym);
                continue;
            };
            if self.slots.len() >= capacity {
                skipped += 1;
                continue;
            }
            self.slots.insert(
                code,
                Slot {
                    keysym,
                    name,
                    last_used: 0,
                },
            );
            self.codes.insert(keysym, code);
            code += 1;
        }
        if skipped > 0 {
            tracing::info!(
                "Layout uses more keysyms than keycodes, {} will be bound on demand",
                skipped
            );
        }
        self.epoch += 1;
        tracing::debug!(
            "Keymap rebuilt with {} keysyms, epoch {}",
            self.slots.len(),
            self.epoch
        );
    }

    /// Current epoch. Changes whenever the bindings change.
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Number of bound keysyms.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Bound `(code, keysym)` pairs in keycode order.
    pub fn bindings(&self) -> impl Iterator<Item = (u32, u32)> + '_ {
        self.slots.iter().map(|(code, slot)| (*code, slot.keysym))
    }

    /// Returns the binding of a keysym if it is bound, without binding it.
    pub fn lookup(&mut self, keysym: u32) -> Option<Binding> {
        let code = *self.codes.get(&keysym)?;
        self.touch(code);
        Some(Binding {
            keysym,
            code,
            epoch: self.epoch,
        })
    }

    /// Returns the binding of a keysym, binding it first if needed.
    ///
    /// A new binding bumps the epoch, so the keymap has to be sent again
    /// before the returned binding can be used.
    pub fn bind(&mut self, keysym: u32) -> Result<Binding, KeymapError> {
        if let Some(binding) = self.lookup(keysym) {
            return Ok(binding);
        }
        let name = symbol::keysym_to_name(keysym).ok_or(KeymapError::UnnamedKeysym(keysym))?;
        let code = match self.free_code() {
            Some(code) => code,
            None => self.evict()?,
        };
        self.clock += 1;
        self.slots.insert(
            code,
            Slot {
                keysym,
                name,
                last_used: self.clock,
            },
        );
        self.codes.insert(keysym, code);
        self.epoch += 1;
        tracing::debug!(
            "Bound keysym 0x{:x} to keycode {}, epoch {}",
            keysym,
            code,
            self.epoch
        );
        Ok(Binding {
            keysym,
            code,
            epoch: self.epoch,
        })
    }

    /// Marks a keycode as pressed. Held keycodes are never evicted.
    pub fn hold(&mut self, code: u32) {
        *self.held.entry(code).or_default() += 1;
    }

    /// Undoes one [`Self::hold`].
    pub fn unhold(&mut self, code: u32) {
        if let Some(count) = self.held.get_mut(&code) {
            *count -= 1;
            if *count == 0 {
                self.held.remove(&code);
            }
        }
    }

    /// Generates the keymap for the current bindings.
    pub fn snapshot(&self) -> KeymapSnapshot {
        KeymapSnapshot {
            text: self.generate_keymap_string(),
            epoch: self.epoch,
        }
    }

    fn touch(&mut self, code: u32) {
        self.clock += 1;
        if let Some(slot) = self.slots.get_mut(&code) {
            slot.last_used = self.clock;
        }
    }

    fn free_code(&self) -> Option<u32> {
        (MIN_KEYCODE..=MAX_KEYCODE).find(|code| !self.slots.contains_key(code))
    }

    fn evict(&mut self) -> Result<u32, KeymapError> {
        let code = self
            .slots
            .iter()
            .filter(|(code, _)| !self.held.contains_key(code))
            .min_by_key(|(_, slot)| slot.last_used)
            .map(|(code, _)| *code)
            .ok_or(KeymapError::NoFreeKeycode)?;
        if let Some(slot) = self.slots.remove(&code) {
            self.codes.remove(&slot.keysym);
            tracing::debug!("Evicted {} from keycode {}", slot.name, code);
        }
        Ok(code)
    }

    /// Builds the XKB keymap text.
    fn generate_keymap_string(&self) -> String {
        let mut keycodes = String::new();
        let mut symbols = String::new();
        for (code, slot) in &self.slots {
            keycodes.push_str(&format!("\n        <I{}> = {};", code, code));
            symbols.push_str(&format!("\n        key <I{}> {{ [ {} ] }};", code, slot.name));
        }

        format!(
            "xkb_keymap {{

    xkb_keycodes \"squeekboard\" {{
        minimum = {min};
        maximum = {max};{keycodes}

        indicator 1 = \"Caps Lock\";
    }};

    xkb_symbols \"squeekboard\" {{{symbols}
    }};

    xkb_types \"squeekboard\" {{
        virtual_modifiers Squeekboard;

        type \"ONE_LEVEL\" {{
            modifiers= none;
            level_name[Level1]= \"Any\";
        }};
        type \"TWO_LEVEL\" {{
            level_name[Level1]= \"Base\";
        }};
        type \"ALPHABETIC\" {{
            level_name[Level1]= \"Base\";
        }};
        type \"KEYPAD\" {{
            level_name[Level1]= \"Base\";
        }};
        type \"SHIFT+ALT\" {{
            level_name[Level1]= \"Base\";
        }};
    }};

    xkb_compatibility \"squeekboard\" {{
        interpret Any+AnyOf(all) {{
            action= SetMods(modifiers=modMapMods,clearLocks);
        }};
    }};
}};
",
            min = MIN_KEYCODE - 1,
            max = MAX_KEYCODE,
            keycodes = keycodes,
            symbols = symbols,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Seek, SeekFrom};
    use xkbcommon::xkb;

    fn compile(text: &str) -> xkb::Keymap {
        let context = xkb::Context::new(xkb::CONTEXT_NO_FLAGS);
        xkb::Keymap::new_from_string(
            &context,
            text.to_string(),
            xkb::KEYMAP_FORMAT_TEXT_V1,
            xkb::KEYMAP_COMPILE_NO_FLAGS,
        )
        .expect("keymap compiles")
    }

    /// Reads back every (code, keysym) pair the compiled keymap defines.
    fn compiled_bindings(keymap: &xkb::Keymap) -> BTreeSet<(u32, u32)> {
        let mut found = BTreeSet::new();
        for raw in keymap.min_keycode().raw()..=keymap.max_keycode().raw() {
            let code = xkb::Keycode::new(raw);
            for keysym in keymap.key_get_syms_by_level(code, 0, 0) {
                found.insert((raw, keysym.raw()));
            }
        }
        found
    }

    #[test]
    fn test_default_bindings() {
        let mut synth = KeymapSynthesizer::new();
        assert_eq!(synth.len(), 2);
        assert_eq!(synth.lookup(symbol::BACKSPACE).map(|b| b.code), Some(MIN_KEYCODE));
        assert_eq!(synth.lookup(symbol::RETURN).map(|b| b.code), Some(MIN_KEYCODE + 1));
    }

    #[test]
    fn test_snapshot_is_deterministic() {
        let mut first = KeymapSynthesizer::new();
        let mut second = KeymapSynthesizer::new();
        first.rebuild([0x63, 0x61, 0x62]);
        second.rebuild([0x62, 0x63, 0x61, 0x61]);
        assert_eq!(first.snapshot().text(), second.snapshot().text());
    }

    #[test]
    fn test_keymap_header_and_keys() {
        let mut synth = KeymapSynthesizer::new();
        synth.rebuild([0x61]);
        let text = synth.snapshot().text().to_string();
        assert!(text.contains("minimum = 8;"));
        assert!(text.contains("maximum = 255;"));
        assert!(text.contains("<I9> = 9;"));
        assert!(text.contains("key <I9> { [ a ] };"));
        assert!(text.contains("key <I10> { [ BackSpace ] };"));
        assert!(text.contains("key <I11> { [ Return ] };"));
    }

    /// Compiling the keymap yields exactly the bound pairs
    #[test]
    fn test_keymap_round_trip() {
        let mut synth = KeymapSynthesizer::new();
        synth.rebuild([0x61, 0x41, 0x20ac, 0x0101_f600, 0xff51, 0xffe1]);
        synth.bind(symbol::char_to_keysym('ß')).unwrap();

        let keymap = compile(synth.snapshot().text());
        let expected: BTreeSet<(u32, u32)> = synth.bindings().collect();
        assert_eq!(compiled_bindings(&keymap), expected);
    }

    #[test]
    fn test_bind_bumps_epoch_only_when_new() {
        let mut synth = KeymapSynthesizer::new();
        synth.rebuild([0x61]);
        let epoch = synth.epoch();

        let existing = synth.bind(0x61).unwrap();
        assert_eq!(existing.epoch, epoch);
        assert_eq!(synth.epoch(), epoch);

        let new = synth.bind(0xe9).unwrap();
        assert_eq!(synth.epoch(), epoch + 1);
        assert_eq!(new.epoch, epoch + 1);
        assert!(!synth.bindings().any(|(code, _)| code == new.code && code < MIN_KEYCODE));
    }

    #[test]
    fn test_unnamed_keysym_rejected() {
        let mut synth = KeymapSynthesizer::new();
        assert!(matches!(synth.bind(0), Err(KeymapError::UnnamedKeysym(0))));
    }

    #[test]
    fn test_overflow_reserves_spare_codes() {
        let mut synth = KeymapSynthesizer::new();
        let many: Vec<u32> = (0..400).map(|i| symbol::char_to_keysym(char::from_u32(0x4e00 + i).unwrap())).collect();
        synth.rebuild(many.iter().copied());
        assert_eq!(synth.len(), KEYCODE_COUNT - SPARE_KEYCODES);

        // Spare codes take the first few unbound keysyms.
        let unbound: Vec<u32> = many
            .iter()
            .copied()
            .filter(|k| synth.codes.get(k).is_none())
            .collect();
        for keysym in unbound.iter().take(SPARE_KEYCODES) {
            synth.bind(*keysym).unwrap();
        }
        assert_eq!(synth.len(), KEYCODE_COUNT);

        // Further binds evict instead of growing.
        synth.bind(unbound[SPARE_KEYCODES]).unwrap();
        assert_eq!(synth.len(), KEYCODE_COUNT);
        let keymap = compile(synth.snapshot().text());
        assert_eq!(compiled_bindings(&keymap).len(), KEYCODE_COUNT);
    }

    #[test]
    fn test_eviction_prefers_least_recently_used() {
        let mut synth = KeymapSynthesizer::new();
        let many: Vec<u32> = (0..KEYCODE_COUNT as u32)
            .map(|i| symbol::char_to_keysym(char::from_u32(0x4e00 + i).unwrap()))
            .collect();
        synth.rebuild(many.iter().copied());
        // Fill the spare codes.
        let mut next = 0x5e00;
        while synth.len() < KEYCODE_COUNT {
            synth.bind(symbol::char_to_keysym(char::from_u32(next).unwrap())).unwrap();
            next += 1;
        }

        // Touch everything except BackSpace.
        let keysyms: Vec<u32> = synth.bindings().map(|(_, k)| k).collect();
        for keysym in keysyms.iter().filter(|k| **k != symbol::BACKSPACE) {
            synth.lookup(*keysym);
        }
        let victim_code = synth.lookup(symbol::BACKSPACE).unwrap().code;
        // BackSpace is now the most recent; the oldest is the first touched.
        let oldest = keysyms.iter().copied().find(|k| *k != symbol::BACKSPACE).unwrap();
        let oldest_code = synth.codes[&oldest];

        let fresh = synth.bind(symbol::char_to_keysym('Ω')).unwrap();
        assert_eq!(fresh.code, oldest_code);
        assert!(synth.lookup(oldest).is_none());
        assert_eq!(synth.lookup(symbol::BACKSPACE).unwrap().code, victim_code);
    }

    #[test]
    fn test_held_codes_are_not_evicted() {
        let mut synth = KeymapSynthesizer::new();
        let many: Vec<u32> = (0..KEYCODE_COUNT as u32)
            .map(|i| symbol::char_to_keysym(char::from_u32(0x4e00 + i).unwrap()))
            .collect();
        synth.rebuild(many.iter().copied());
        let mut next = 0x5e00;
        while synth.len() < KEYCODE_COUNT {
            synth.bind(symbol::char_to_keysym(char::from_u32(next).unwrap())).unwrap();
            next += 1;
        }
        let codes: Vec<u32> = synth.bindings().map(|(code, _)| code).collect();
        for code in &codes {
            synth.hold(*code);
        }
        assert!(matches!(
            synth.bind(symbol::char_to_keysym('Ω')),
            Err(KeymapError::NoFreeKeycode)
        ));

        synth.unhold(codes[3]);
        let fresh = synth.bind(symbol::char_to_keysym('Ω')).unwrap();
        assert_eq!(fresh.code, codes[3]);
    }

    #[test]
    fn test_materialize() {
        let mut synth = KeymapSynthesizer::new();
        synth.rebuild([0x61]);
        let snapshot = synth.snapshot();
        let (mut file, size) = snapshot.materialize().unwrap();
        assert_eq!(size as usize, snapshot.text().len() + 1);

        file.seek(SeekFrom::Start(0)).unwrap();
        let mut bytes = Vec::new();
        file.read_to_end(&mut bytes).unwrap();
        assert_eq!(bytes.last(), Some(&0));
        assert_eq!(&bytes[..bytes.len() - 1], snapshot.text().as_bytes());
    }
}
