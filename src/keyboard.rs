// SPDX-License-Identifier: GPL-3.0-only

//! The keyboard as a whole.
//!
//! [`Keyboard`] wires the touch tracker, the layout state machine, the
//! submission layer and the visibility coordinator together. Callers feed
//! it pointer events, input method events and visibility requests, and
//! drain [`LayoutEvent`]s to learn what a renderer would need to redraw.

use crate::app_settings::{NUMBER_LAYOUT, TERMINAL_LAYOUT};
use crate::input::{LayoutState, PointerEvent, StateEvent, TouchOutput, TouchTracker};
use crate::layout::{Layout, Modifiers, ViewId, load_layout};
use crate::submission::{
    ContentPurpose, InputMethodSink, SubmitError, Submission, VirtualKeyboardSink,
};
use crate::visibility::Visibility;
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::Arc;

/// Notifications about visible state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LayoutEvent {
    /// A new layout replaced the old one.
    Swapped { name: String },
    ViewChanged(ViewId),
    PressedSetChanged,
    ModifiersChanged(Modifiers),
    VisibilityChanged(bool),
}

/// Keyboard state and its output channels.
#[derive(Debug)]
pub struct Keyboard<V, I> {
    tracker: TouchTracker,
    state: LayoutState,
    submission: Submission<V, I>,
    visibility: Visibility,
    events: VecDeque<LayoutEvent>,
    /// Timestamp of the newest pointer event, used for synthetic releases.
    last_time: u32,
    /// The user's layout, shown unless the text field asks for another.
    configured: Arc<Layout>,
    /// Searched for purpose layouts before the built-in ones.
    keyboards_dir: Option<PathBuf>,
}

/// Layout a text field of this purpose gets instead of the configured one.
pub fn purpose_layout(purpose: ContentPurpose) -> Option<&'static str> {
    match purpose {
        ContentPurpose::Terminal => Some(TERMINAL_LAYOUT),
        purpose if purpose.is_numeric() => Some(NUMBER_LAYOUT),
        _ => None,
    }
}

impl<V: VirtualKeyboardSink, I: InputMethodSink> Keyboard<V, I> {
    /// Creates the keyboard and sends the layout's keymap.
    pub fn new(
        layout: Arc<Layout>,
        keyboard: V,
        input_method: Option<I>,
        delete_surrounding_text: bool,
    ) -> Result<Self, SubmitError> {
        let mut submission = Submission::new(keyboard, input_method, delete_surrounding_text);
        submission.set_layout(&layout, 0)?;
        tracing::info!("Keyboard ready with layout {}", layout.name());
        Ok(Self {
            tracker: TouchTracker::new(),
            state: LayoutState::new(Arc::clone(&layout)),
            submission,
            visibility: Visibility::new(),
            events: VecDeque::new(),
            last_time: 0,
            configured: layout,
            keyboards_dir: None,
        })
    }

    pub fn layout(&self) -> &Arc<Layout> {
        self.state.layout()
    }

    pub fn state(&self) -> &LayoutState {
        &self.state
    }

    pub fn tracker(&self) -> &TouchTracker {
        &self.tracker
    }

    pub fn submission(&self) -> &Submission<V, I> {
        &self.submission
    }

    pub fn visibility(&self) -> &Visibility {
        &self.visibility
    }

    pub fn is_visible(&self) -> bool {
        self.visibility.is_visible()
    }

    /// Timestamp of the newest pointer event.
    pub fn last_time(&self) -> u32 {
        self.last_time
    }

    /// Takes the queued notifications.
    pub fn take_events(&mut self) -> Vec<LayoutEvent> {
        self.events.drain(..).collect()
    }

    /// Handles touch or pointer input on the keyboard surface.
    pub fn handle_pointer(&mut self, event: PointerEvent) -> Result<(), SubmitError> {
        self.last_time = match event {
            PointerEvent::Press { time, .. }
            | PointerEvent::Move { time, .. }
            | PointerEvent::Release { time, .. }
            | PointerEvent::Cancel { time, .. }
            | PointerEvent::LeaveSurface { time } => time,
        };
        let point = match event {
            PointerEvent::Press { point, .. } | PointerEvent::Move { point, .. } => Some(point),
            _ => None,
        };
        let outputs = self
            .tracker
            .handle(self.state.layout(), self.state.active_view(), event);
        for output in outputs {
            let output = match (output, point) {
                // The release before it switched views: press what is under
                // the finger now.
                (TouchOutput::Depress { button, time }, Some(point))
                    if self.state.layout().view_of(button) != self.state.active_view() =>
                {
                    let layout = Arc::clone(self.state.layout());
                    match self.tracker.retarget(&layout, self.state.active_view(), point) {
                        Some(button) => TouchOutput::Depress { button, time },
                        None => continue,
                    }
                }
                (output, _) => output,
            };
            self.apply_touch(output)?;
        }
        Ok(())
    }

    /// The user's layout, as opposed to one picked for the text field.
    pub fn configured_layout(&self) -> &Arc<Layout> {
        &self.configured
    }

    /// Directory searched for purpose layouts.
    pub fn set_keyboards_dir(&mut self, dir: Option<PathBuf>) {
        self.keyboards_dir = dir;
    }

    /// Changes the user's layout. It is shown right away unless the focused
    /// field asks for a special one.
    pub fn set_configured_layout(&mut self, layout: Arc<Layout>) -> Result<(), SubmitError> {
        tracing::info!("Configured layout is now {}", layout.name());
        self.configured = layout;
        self.select_layout_for_purpose()
    }

    /// Replaces the visible layout. Held keys are released first.
    pub fn set_layout(&mut self, layout: Arc<Layout>, time: u32) -> Result<(), SubmitError> {
        tracing::info!("Switching layout to {}", layout.name());
        self.release_all(time)?;
        self.submission.set_layout(&layout, time)?;
        let name = layout.name().to_string();
        let events = self.state.set_layout(layout);
        self.apply_state(events)?;
        self.events.push_back(LayoutEvent::Swapped { name });
        Ok(())
    }

    /// Releases everything: the touch sequence, held buttons, latched
    /// modifiers and keys still down on the virtual keyboard.
    pub fn release_all(&mut self, time: u32) -> Result<(), SubmitError> {
        if let Some(output) = self.tracker.reset(time) {
            self.apply_touch(output)?;
        }
        let events = self.state.release_all(time);
        self.apply_state(events)?;
        self.submission.release_all(time)
    }

    /// `SetVisible` from the shell.
    pub fn set_shell_visible(&mut self, visible: bool) -> Result<(), SubmitError> {
        let change = self.visibility.set_shell_request(visible);
        self.visibility_changed(change)
    }

    /// The user asked to hide the keyboard.
    pub fn dismiss(&mut self) -> Result<(), SubmitError> {
        let change = self.visibility.dismiss();
        self.visibility_changed(change)
    }

    pub fn handle_im_activate(&mut self) {
        self.submission.handle_im_activate();
    }

    pub fn handle_im_deactivate(&mut self) {
        self.submission.handle_im_deactivate();
    }

    pub fn handle_im_surrounding_text(&mut self, text: String, cursor: u32, anchor: u32) {
        self.submission.handle_im_surrounding_text(text, cursor, anchor);
    }

    pub fn handle_im_content_type(&mut self, hint: u32, purpose: u32) {
        self.submission.handle_im_content_type(hint, purpose);
    }

    pub fn handle_im_text_change_cause(&mut self, cause: u32) {
        self.submission.handle_im_text_change_cause(cause);
    }

    /// Applies the input method state sent since the last `done`.
    pub fn handle_im_done(&mut self) -> Result<(), SubmitError> {
        let Some(applied) = self.submission.handle_im_done() else {
            return Ok(());
        };
        let active = self.submission.is_im_active();
        if applied.purpose_changed || applied.activity_changed {
            self.select_layout_for_purpose()?;
        }
        if applied.activity_changed {
            let change = self.visibility.set_im_request(active);
            self.visibility_changed(change)?;
        }
        Ok(())
    }

    /// The input method went away; output falls back to the virtual keyboard.
    pub fn handle_im_unavailable(&mut self) -> Result<(), SubmitError> {
        self.submission.handle_im_unavailable();
        let change = self.visibility.set_im_request(false);
        self.visibility_changed(change)?;
        self.select_layout_for_purpose()
    }

    /// Shows the layout the focused field asks for, or the configured one.
    fn select_layout_for_purpose(&mut self) -> Result<(), SubmitError> {
        let purpose = self
            .submission
            .input_method()
            .filter(|im| im.is_active())
            .map(|im| im.current().purpose)
            .unwrap_or_default();
        let target = match purpose_layout(purpose) {
            Some(name) if self.layout().name() == name => return Ok(()),
            Some(name) => match load_layout(name, self.keyboards_dir.as_deref()) {
                Ok(layout) => Arc::new(layout),
                Err(e) => {
                    tracing::warn!("No layout for {:?} fields: {}", purpose, e);
                    return Ok(());
                }
            },
            None if Arc::ptr_eq(self.layout(), &self.configured) => return Ok(()),
            None => Arc::clone(&self.configured),
        };
        tracing::debug!("Content purpose {:?} selects layout {}", purpose, target.name());
        self.set_layout(target, self.last_time)
    }

    fn visibility_changed(&mut self, change: Option<bool>) -> Result<(), SubmitError> {
        let Some(visible) = change else {
            return Ok(());
        };
        self.events.push_back(LayoutEvent::VisibilityChanged(visible));
        if !visible {
            self.release_all(self.last_time)?;
        }
        Ok(())
    }

    fn apply_touch(&mut self, output: TouchOutput) -> Result<(), SubmitError> {
        let events = match output {
            TouchOutput::Depress { button, time } => self.state.depress(button, time),
            TouchOutput::Release {
                button,
                time,
                cancelled,
            } => self.state.release(button, time, cancelled),
        };
        self.apply_state(events)
    }

    fn apply_state(&mut self, events: Vec<StateEvent>) -> Result<(), SubmitError> {
        for event in events {
            match event {
                StateEvent::Submit(command) => self.submission.handle_command(command)?,
                StateEvent::ViewChanged(view) => {
                    self.events.push_back(LayoutEvent::ViewChanged(view));
                }
                StateEvent::ModifiersChanged(mods) => {
                    self.submission.set_modifiers(mods)?;
                    self.events.push_back(LayoutEvent::ModifiersChanged(mods));
                }
                StateEvent::PressedChanged => {
                    self.events.push_back(LayoutEvent::PressedSetChanged);
                }
                StateEvent::Dismiss => self.dismiss()?,
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::PointerId;
    use crate::layout::Point;
    use crate::testing::{
        RecordingInputMethod, RecordingKeyboard, Wire, WireLog, center_of, recording_sinks, take,
        test_layout,
    };

    type TestKeyboard = Keyboard<RecordingKeyboard, RecordingInputMethod>;

    fn keyboard() -> (TestKeyboard, WireLog) {
        let (vk, im, log) = recording_sinks();
        let keyboard = Keyboard::new(test_layout(), vk, Some(im), true).unwrap();
        take(&log);
        (keyboard, log)
    }

    fn tap(keyboard: &mut TestKeyboard, point: Point, time: u32) {
        let pointer = PointerId(1);
        keyboard
            .handle_pointer(PointerEvent::Press {
                pointer,
                point,
                time,
            })
            .unwrap();
        keyboard
            .handle_pointer(PointerEvent::Release {
                pointer,
                time: time + 1,
            })
            .unwrap();
    }

    #[test]
    fn test_new_sends_keymap() {
        let (vk, im, log) = recording_sinks();
        let keyboard = Keyboard::new(test_layout(), vk, Some(im), true).unwrap();
        assert!(matches!(take(&log).as_slice(), [Wire::Keymap(_)]));
        assert!(!keyboard.is_visible());
    }

    #[test]
    fn test_im_activation_shows_keyboard() {
        let (mut keyboard, _log) = keyboard();
        keyboard.handle_im_activate();
        keyboard.handle_im_done().unwrap();
        assert!(keyboard.is_visible());
        assert_eq!(keyboard.take_events(), vec![LayoutEvent::VisibilityChanged(true)]);

        keyboard.handle_im_deactivate();
        keyboard.handle_im_done().unwrap();
        assert!(!keyboard.is_visible());
    }

    #[test]
    fn test_dismiss_button_hides() {
        let (mut keyboard, _log) = keyboard();
        keyboard.set_shell_visible(true).unwrap();
        let layout = Arc::clone(keyboard.layout());
        tap(&mut keyboard, center_of(&layout, "base", "hide"), 10);
        assert!(!keyboard.is_visible());
        assert!(keyboard.visibility().is_dismissed());
        assert!(
            keyboard
                .take_events()
                .contains(&LayoutEvent::VisibilityChanged(false))
        );
    }

    /// Hiding releases held keys with the last known timestamp
    #[test]
    fn test_hide_releases_with_last_timestamp() {
        let (mut keyboard, log) = keyboard();
        keyboard.set_shell_visible(true).unwrap();
        let layout = Arc::clone(keyboard.layout());
        keyboard
            .handle_pointer(PointerEvent::Press {
                pointer: PointerId(3),
                point: center_of(&layout, "base", "b"),
                time: 42,
            })
            .unwrap();
        take(&log);

        keyboard.set_shell_visible(false).unwrap();
        let wire = take(&log);
        assert!(wire.iter().any(|w| matches!(w, Wire::Key { time: 42, state: 0, .. })));
        assert_eq!(keyboard.tracker().active_sequence(), None);
        assert_eq!(keyboard.state().pressed().count(), 0);
    }

    #[test]
    fn test_purpose_layouts() {
        assert_eq!(purpose_layout(ContentPurpose::Phone), Some("number"));
        assert_eq!(purpose_layout(ContentPurpose::Pin), Some("number"));
        assert_eq!(purpose_layout(ContentPurpose::Terminal), Some("terminal"));
        assert_eq!(purpose_layout(ContentPurpose::Email), None);
        assert_eq!(purpose_layout(ContentPurpose::Normal), None);
    }

    /// Number and terminal fields swap the layout; plain fields and
    /// deactivation bring the configured one back
    #[test]
    fn test_purpose_swaps_layout() {
        let (mut keyboard, log) = keyboard();
        let configured = Arc::clone(keyboard.layout());

        keyboard.handle_im_activate();
        keyboard.handle_im_content_type(0, 4);
        keyboard.handle_im_done().unwrap();
        assert_eq!(keyboard.layout().name(), "number");
        assert!(matches!(take(&log).last(), Some(Wire::Keymap(_))));
        assert!(
            keyboard
                .take_events()
                .contains(&LayoutEvent::Swapped { name: "number".into() })
        );

        keyboard.handle_im_activate();
        keyboard.handle_im_content_type(0, 13);
        keyboard.handle_im_done().unwrap();
        assert_eq!(keyboard.layout().name(), "terminal");

        keyboard.handle_im_activate();
        keyboard.handle_im_content_type(0, 0);
        keyboard.handle_im_done().unwrap();
        assert!(Arc::ptr_eq(keyboard.layout(), &configured));

        keyboard.handle_im_activate();
        keyboard.handle_im_content_type(0, 3);
        keyboard.handle_im_done().unwrap();
        assert_eq!(keyboard.layout().name(), "number");
        keyboard.handle_im_deactivate();
        keyboard.handle_im_done().unwrap();
        assert!(Arc::ptr_eq(keyboard.layout(), &configured));
    }

    /// A held key is released before a purpose layout replaces it
    #[test]
    fn test_purpose_swap_releases_held_key() {
        let (mut keyboard, log) = keyboard();
        let layout = Arc::clone(keyboard.layout());
        keyboard
            .handle_pointer(PointerEvent::Press {
                pointer: PointerId(1),
                point: center_of(&layout, "base", "Return"),
                time: 5,
            })
            .unwrap();
        take(&log);

        keyboard.handle_im_activate();
        keyboard.handle_im_content_type(0, 13);
        keyboard.handle_im_done().unwrap();
        let wire = take(&log);
        assert!(matches!(wire[1], Wire::Key { time: 5, state: 0, .. }));
        assert!(matches!(wire.last(), Some(Wire::Keymap(_))));
        assert_eq!(keyboard.state().pressed().count(), 0);
    }

    #[test]
    fn test_configured_layout_change() {
        let (mut keyboard, _log) = keyboard();
        let us = Arc::new(crate::layout::loader::builtin_layout("us").unwrap());

        keyboard.set_configured_layout(Arc::clone(&us)).unwrap();
        assert!(Arc::ptr_eq(keyboard.layout(), &us));
        assert!(Arc::ptr_eq(keyboard.configured_layout(), &us));

        // A number field keeps its layout; the new one shows afterwards.
        keyboard.handle_im_activate();
        keyboard.handle_im_content_type(0, 4);
        keyboard.handle_im_done().unwrap();
        let test = test_layout();
        keyboard.set_configured_layout(Arc::clone(&test)).unwrap();
        assert_eq!(keyboard.layout().name(), "number");
        keyboard.handle_im_deactivate();
        keyboard.handle_im_done().unwrap();
        assert!(Arc::ptr_eq(keyboard.layout(), &test));
    }

    /// The input method going away restores the configured layout
    #[test]
    fn test_im_unavailable_restores_layout() {
        let (mut keyboard, _log) = keyboard();
        keyboard.handle_im_activate();
        keyboard.handle_im_content_type(0, 13);
        keyboard.handle_im_done().unwrap();
        assert_eq!(keyboard.layout().name(), "terminal");

        keyboard.handle_im_unavailable().unwrap();
        assert_eq!(keyboard.layout().name(), "test");
    }

    #[test]
    fn test_im_unavailable() {
        let (mut keyboard, log) = keyboard();
        keyboard.handle_im_activate();
        keyboard.handle_im_done().unwrap();
        keyboard.handle_im_unavailable().unwrap();
        assert!(!keyboard.is_visible());
        assert_eq!(take(&log), vec![Wire::Destroy]);

        // Later events for the gone session are ignored.
        keyboard.handle_im_activate();
        keyboard.handle_im_done().unwrap();
        assert!(!keyboard.is_visible());
    }
}
