// SPDX-License-Identifier: GPL-3.0-only

//! Input method channel.
//!
//! Mirrors the double-buffered state of `zwp_input_method_v2`: events
//! update a pending state which becomes current on `done`. Each `done`
//! advances the serial that commits must carry.

use super::InputMethodSink;
use bitflags::bitflags;
use std::num::Wrapping;

bitflags! {
    /// Hints about the text field, as sent by the text input client.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ContentHint: u32 {
        const COMPLETION = 0x1;
        const SPELLCHECK = 0x2;
        const AUTO_CAPITALIZATION = 0x4;
        const LOWERCASE = 0x8;
        const UPPERCASE = 0x10;
        const TITLECASE = 0x20;
        const HIDDEN_TEXT = 0x40;
        const SENSITIVE_DATA = 0x80;
        const LATIN = 0x100;
        const MULTILINE = 0x200;
    }
}

/// Kind of text the focused field expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ContentPurpose {
    #[default]
    Normal,
    Alpha,
    Digits,
    Number,
    Phone,
    Url,
    Email,
    Name,
    Password,
    Pin,
    Date,
    Time,
    Datetime,
    Terminal,
}

impl ContentPurpose {
    /// Decodes the protocol value. Unknown values read as `Normal`.
    pub fn from_raw(raw: u32) -> Self {
        match raw {
            1 => Self::Alpha,
            2 => Self::Digits,
            3 => Self::Number,
            4 => Self::Phone,
            5 => Self::Url,
            6 => Self::Email,
            7 => Self::Name,
            8 => Self::Password,
            9 => Self::Pin,
            10 => Self::Date,
            11 => Self::Time,
            12 => Self::Datetime,
            13 => Self::Terminal,
            _ => Self::Normal,
        }
    }

    /// Whether the field takes only numbers.
    pub fn is_numeric(self) -> bool {
        matches!(self, Self::Digits | Self::Number | Self::Phone | Self::Pin)
    }
}

/// Who changed the text last.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ChangeCause {
    #[default]
    InputMethod,
    Other,
}

impl ChangeCause {
    pub fn from_raw(raw: u32) -> Self {
        match raw {
            0 => Self::InputMethod,
            _ => Self::Other,
        }
    }
}

/// Text around the cursor. Offsets are in bytes.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SurroundingText {
    pub text: String,
    pub cursor: u32,
    pub anchor: u32,
}

impl SurroundingText {
    /// Byte length of the character before the cursor.
    ///
    /// `None` when there is no such character, when text is selected, or
    /// when the cursor does not sit on a character boundary.
    pub fn previous_char_len(&self) -> Option<u32> {
        if self.cursor != self.anchor {
            return None;
        }
        let cursor = usize::try_from(self.cursor).ok()?;
        let before = self.text.get(..cursor)?;
        before.chars().next_back().map(|c| c.len_utf8() as u32)
    }
}

/// One buffer of input method state.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ImState {
    pub active: bool,
    pub surrounding_text: Option<SurroundingText>,
    pub hint: ContentHint,
    pub purpose: ContentPurpose,
    pub change_cause: ChangeCause,
}

/// What a `done` event changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Applied {
    pub activity_changed: bool,
    pub purpose_changed: bool,
}

/// Input method session.
#[derive(Debug)]
pub struct InputMethod<I> {
    sink: I,
    pending: ImState,
    current: ImState,
    serial: Wrapping<u32>,
}

impl<I: InputMethodSink> InputMethod<I> {
    pub fn new(sink: I) -> Self {
        Self {
            sink,
            pending: ImState::default(),
            current: ImState::default(),
            serial: Wrapping(0),
        }
    }

    pub fn sink(&self) -> &I {
        &self.sink
    }

    pub fn is_active(&self) -> bool {
        self.current.active
    }

    /// Number of `done` events received, wrapping.
    pub fn serial(&self) -> u32 {
        self.serial.0
    }

    pub fn current(&self) -> &ImState {
        &self.current
    }

    /// A text field got focus. Resets the pending state.
    pub fn handle_activate(&mut self) {
        self.pending = ImState {
            active: true,
            ..ImState::default()
        };
    }

    pub fn handle_deactivate(&mut self) {
        self.pending.active = false;
    }

    pub fn handle_surrounding_text(&mut self, text: String, cursor: u32, anchor: u32) {
        self.pending.surrounding_text = Some(SurroundingText {
            text,
            cursor,
            anchor,
        });
    }

    pub fn handle_content_type(&mut self, hint: u32, purpose: u32) {
        self.pending.hint = ContentHint::from_bits_truncate(hint);
        self.pending.purpose = ContentPurpose::from_raw(purpose);
    }

    pub fn handle_text_change_cause(&mut self, cause: u32) {
        self.pending.change_cause = ChangeCause::from_raw(cause);
    }

    /// Applies the pending state.
    pub fn handle_done(&mut self) -> Applied {
        self.serial += 1;
        let previous = std::mem::replace(&mut self.current, self.pending.clone());
        tracing::debug!(
            "Input method done: serial {}, active {}, purpose {:?}, hint {:?}, cause {:?}",
            self.serial,
            self.current.active,
            self.current.purpose,
            self.current.hint,
            self.current.change_cause
        );
        Applied {
            activity_changed: previous.active != self.current.active,
            purpose_changed: previous.purpose != self.current.purpose,
        }
    }

    /// The compositor withdrew the input method. Consumes the session.
    pub fn handle_unavailable(mut self) {
        tracing::warn!("Input method unavailable, falling back to the virtual keyboard");
        self.sink.destroy_input_method();
    }

    /// Byte length of the character that Erase should delete, if known.
    pub fn erasable_len(&self) -> Option<u32> {
        self.current
            .surrounding_text
            .as_ref()
            .and_then(SurroundingText::previous_char_len)
    }

    /// Commits a string.
    pub fn commit_text(&mut self, text: String) {
        self.sink.send_commit_string(text);
        self.sink.send_commit(self.serial.0);
    }

    /// Deletes bytes before the cursor.
    pub fn delete_before(&mut self, before: u32) {
        self.sink.send_delete_surrounding_text(before, 0);
        self.sink.send_commit(self.serial.0);
    }
}
