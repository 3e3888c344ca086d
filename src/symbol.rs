// SPDX-License-Identifier: GPL-3.0-only

//! Keysym naming and classification.
//!
//! Keysyms are plain `u32` values throughout the crate. The functions here
//! convert between keysyms, their XKB names (as written into keymap text),
//! and Unicode characters, and classify keysyms into modifiers and
//! printable symbols.
//!
//! Unicode characters without a dedicated XKB name use the `U<HEX>` form,
//! e.g. `U20AC` for the euro sign.

use xkbcommon::xkb;
use xkbcommon::xkb::Keysym;
use xkbcommon::xkb::keysyms::KEY_NoSymbol;

/// Offset of the Unicode keysym block (`0x0100_0000 | codepoint`).
pub const UNICODE_KEYSYM_OFFSET: u32 = 0x0100_0000;

/// Keysym for BackSpace, emitted by `Erase`.
pub const BACKSPACE: u32 = 0xff08;

/// Keysym for Return.
pub const RETURN: u32 = 0xff0d;

/// Resolves an XKB keysym name to its value.
///
/// Accepts canonical names (`Return`, `Shift_L`), single-character latin
/// names (`a`) and the `U<HEX>` form. Unknown names return `None`.
pub fn name_to_keysym(name: &str) -> Option<u32> {
    if name.is_empty() {
        return None;
    }
    let keysym = xkb::keysym_from_name(name, xkb::KEYSYM_NO_FLAGS);
    let no_symbol: Keysym = KEY_NoSymbol.into();
    if keysym == no_symbol {
        None
    } else {
        Some(keysym.raw())
    }
}

/// Returns the canonical XKB name of a keysym.
///
/// Keysyms without a name (including `NoSymbol`) return `None`.
pub fn keysym_to_name(keysym: u32) -> Option<String> {
    if keysym == KEY_NoSymbol {
        return None;
    }
    let name = xkb::keysym_get_name(Keysym::new(keysym));
    if name.is_empty() { None } else { Some(name) }
}

/// Maps a Unicode character to the keysym that produces it.
///
/// Latin-1 and other legacy-mapped characters get their legacy keysym,
/// everything else lands in the Unicode block.
pub fn char_to_keysym(c: char) -> u32 {
    let keysym = xkb::utf32_to_keysym(c as u32).raw();
    if keysym == KEY_NoSymbol {
        UNICODE_KEYSYM_OFFSET | c as u32
    } else {
        keysym
    }
}

/// Returns the character a keysym types, if any.
pub fn keysym_to_char(keysym: u32) -> Option<char> {
    match xkb::keysym_to_utf32(Keysym::new(keysym)) {
        0 => None,
        cp => char::from_u32(cp),
    }
}

/// Returns `true` for keysyms that only change modifier state.
///
/// Covers `Shift_L`..`Hyper_R`, the ISO lock/latch group and
/// `Mode_switch`.
pub fn is_modifier(keysym: u32) -> bool {
    matches!(keysym, 0xffe1..=0xffee | 0xfe01..=0xfe13 | 0xff7e)
}

/// Returns `true` when the keysym types visible text.
///
/// Control characters (Return, Tab, BackSpace, Escape, Delete) are not
/// printable even though XKB gives them a UTF-32 value.
pub fn is_printable(keysym: u32) -> bool {
    if is_modifier(keysym) {
        return false;
    }
    keysym_to_char(keysym).is_some_and(|c| !c.is_control())
}
