// SPDX-License-Identifier: GPL-3.0-only

//! Fixtures shared by the unit tests.

use crate::layout::{ButtonId, Layout, Point, parse_layout_from_string};
use crate::submission::{InputMethodSink, SubmitError, VirtualKeyboardSink};
use std::cell::RefCell;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::rc::Rc;
use std::sync::Arc;

/// A small layout with every kind of action.
pub const TEST_LAYOUT: &str = r#"{
    "name": "test",
    "views": {
        "base": [
            "a b c Return",
            "Shift_L caps ctrl BackSpace",
            "show_numbers dotcom hide space"
        ],
        "upper": [
            "A B C Return",
            "Shift_L caps ctrl BackSpace",
            "show_numbers dotcom hide space"
        ],
        "numbers": [
            "1 2 3 Return",
            "show_letters lock_numbers ctrl"
        ]
    },
    "buttons": {
        "Shift_L": { "modifier": "Shift" },
        "caps": { "modifier": "Lock", "modifier_mode": "lock" },
        "ctrl": { "modifier": "Control" },
        "BackSpace": { "action": "erase" },
        "show_numbers": { "action": { "set_view": "numbers" } },
        "show_letters": { "action": { "set_view": "base" } },
        "lock_numbers": { "action": { "locking": { "lock_view": "numbers", "unlock_view": "base" } } },
        "dotcom": { "text": ".com" },
        "hide": { "action": "dismiss" },
        "space": { "keysym": "space" }
    },
    "outlines": { "default": { "width": 10, "height": 10 } },
    "modifier_views": [
        { "modifiers": ["Shift"], "view": "upper" },
        { "modifiers": ["Lock"], "view": "upper" }
    ]
}"#;

pub fn test_layout() -> Arc<Layout> {
    Arc::new(parse_layout_from_string(TEST_LAYOUT, "test").expect("test layout builds"))
}

/// Button by view and name; panics if missing.
pub fn find(layout: &Layout, view: &str, name: &str) -> ButtonId {
    let view = layout.view_by_name(view).expect("view exists");
    layout.find_button(view, name).expect("button exists")
}

pub fn center_of(layout: &Layout, view: &str, name: &str) -> Point {
    layout.button_center(find(layout, view, name))
}

/// Everything sent over the two protocols, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Wire {
    /// Keymap text as read back from the fd.
    Keymap(String),
    Key { time: u32, key: u32, state: u32 },
    Modifiers { depressed: u32, latched: u32, locked: u32, group: u32 },
    CommitString(String),
    DeleteSurroundingText { before: u32, after: u32 },
    Commit(u32),
    Destroy,
}

/// Shared, ordered record of wire traffic.
pub type WireLog = Rc<RefCell<Vec<Wire>>>;

/// Records virtual-keyboard requests.
#[derive(Debug, Clone)]
pub struct RecordingKeyboard {
    pub log: WireLog,
}

impl VirtualKeyboardSink for RecordingKeyboard {
    fn send_keymap(&mut self, file: &File, size: u32) -> Result<(), SubmitError> {
        let mut file = file.try_clone()?;
        file.seek(SeekFrom::Start(0))?;
        let mut bytes = Vec::new();
        file.read_to_end(&mut bytes)?;
        assert_eq!(bytes.len(), size as usize, "keymap size matches the fd");
        assert_eq!(bytes.last(), Some(&0), "keymap is NUL terminated");
        bytes.pop();
        let text = String::from_utf8(bytes).expect("keymap is UTF-8");
        self.log.borrow_mut().push(Wire::Keymap(text));
        Ok(())
    }

    fn send_key(&mut self, time: u32, key: u32, state: u32) {
        self.log.borrow_mut().push(Wire::Key { time, key, state });
    }

    fn send_modifiers(&mut self, depressed: u32, latched: u32, locked: u32, group: u32) {
        self.log.borrow_mut().push(Wire::Modifiers {
            depressed,
            latched,
            locked,
            group,
        });
    }
}

/// Records input-method requests.
#[derive(Debug, Clone)]
pub struct RecordingInputMethod {
    pub log: WireLog,
}

impl InputMethodSink for RecordingInputMethod {
    fn send_commit_string(&mut self, text: String) {
        self.log.borrow_mut().push(Wire::CommitString(text));
    }

    fn send_delete_surrounding_text(&mut self, before: u32, after: u32) {
        self.log
            .borrow_mut()
            .push(Wire::DeleteSurroundingText { before, after });
    }

    fn send_commit(&mut self, serial: u32) {
        self.log.borrow_mut().push(Wire::Commit(serial));
    }

    fn destroy_input_method(&mut self) {
        self.log.borrow_mut().push(Wire::Destroy);
    }
}

/// A keyboard and an input method sharing one log.
pub fn recording_sinks() -> (RecordingKeyboard, RecordingInputMethod, WireLog) {
    let log = WireLog::default();
    (
        RecordingKeyboard { log: log.clone() },
        RecordingInputMethod { log: log.clone() },
        log,
    )
}

/// Drains the log.
pub fn take(log: &WireLog) -> Vec<Wire> {
    log.borrow_mut().drain(..).collect()
}

/// Drops keymap uploads, which are checked separately.
pub fn without_keymaps(wire: Vec<Wire>) -> Vec<Wire> {
    wire.into_iter()
        .filter(|w| !matches!(w, Wire::Keymap(_)))
        .collect()
}
