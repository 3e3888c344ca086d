// SPDX-License-Identifier: GPL-3.0-only

//! Centralized application settings and constants.

/// Application name, used for config and data directories.
pub const APP_NAME: &str = "squeekboard";

/// D-Bus well-known name claimed by the keyboard.
pub const DBUS_NAME: &str = "sm.puri.OSK0";

/// D-Bus interface name.
pub const DBUS_INTERFACE: &str = "sm.puri.OSK0";

/// D-Bus object path.
pub const DBUS_PATH: &str = "/sm/puri/OSK0";

/// Layout loaded when nothing else can be found.
pub const FALLBACK_LAYOUT: &str = "us";

/// Environment variable naming the layout directory.
pub const KEYBOARDS_DIR_ENV: &str = "KEYBOARDS_DIR";

/// Older spelling of [`KEYBOARDS_DIR_ENV`], still honoured.
pub const KEYBOARDS_DIR_LEGACY_ENV: &str = "SQUEEKBOARD_KEYBOARDSDIR";

/// Environment variable naming the layout to load.
pub const LAYOUT_ENV: &str = "SQUEEKBOARD_LAYOUT";

/// Layout directory below `$XDG_DATA_HOME`.
pub const KEYBOARDS_DATA_SUBDIR: &str = "squeekboard/keyboards";

/// Lowest keycode handed out by the keymap synthesizer.
///
/// Keycode 8 translates to evdev code 0, which compositors discard.
pub const MIN_KEYCODE: u32 = 9;

/// Highest keycode XKB (and Xwayland) accepts.
pub const MAX_KEYCODE: u32 = 255;

/// Keycodes kept free for dynamically bound keysyms.
pub const SPARE_KEYCODES: usize = 4;

/// Identifier of the synthetic pointer used for mouse input.
pub const MOUSE_POINTER_ID: u32 = u32::MAX;

/// Default button outline name.
pub const DEFAULT_OUTLINE: &str = "default";

/// Default view name.
pub const DEFAULT_VIEW: &str = "base";

/// Layout shown for number, digit, phone and PIN fields.
pub const NUMBER_LAYOUT: &str = "number";

/// Layout shown for terminal fields.
pub const TERMINAL_LAYOUT: &str = "terminal";

/// Configuration file name.
pub const CONFIG_FILE: &str = "config.json";
