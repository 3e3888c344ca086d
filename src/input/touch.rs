// SPDX-License-Identifier: GPL-3.0-only

//! Touch and pointer tracking.
//!
//! The tracker turns raw pointer streams into presses and releases of
//! layout buttons. Only one sequence is followed at a time: a new press
//! while another finger is down cancels the old sequence and adopts the
//! new one. Sliding a finger from one key to another releases the first
//! and presses the second; sliding off into empty space cancels the press.

use crate::app_settings::MOUSE_POINTER_ID;
use crate::layout::{ButtonId, Layout, Point, ViewId};

/// Identifies a touch sequence or the mouse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PointerId(pub u32);

impl PointerId {
    /// The synthetic id used for mouse input.
    pub const MOUSE: PointerId = PointerId(MOUSE_POINTER_ID);
}

/// Raw input, in view coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PointerEvent {
    Press {
        pointer: PointerId,
        point: Point,
        time: u32,
    },
    Move {
        pointer: PointerId,
        point: Point,
        time: u32,
    },
    Release {
        pointer: PointerId,
        time: u32,
    },
    Cancel {
        pointer: PointerId,
        time: u32,
    },
    /// The pointer left the keyboard surface.
    LeaveSurface { time: u32 },
}

/// Button-level result of a pointer event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TouchOutput {
    Depress {
        button: ButtonId,
        time: u32,
    },
    Release {
        button: ButtonId,
        time: u32,
        /// Released by a cancellation rather than by lifting the finger.
        cancelled: bool,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Sequence {
    pointer: PointerId,
    pressed: Option<ButtonId>,
}

/// Follows at most one touch sequence.
#[derive(Debug, Clone, Default)]
pub struct TouchTracker {
    active: Option<Sequence>,
}

impl TouchTracker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The sequence currently followed, if any.
    pub fn active_sequence(&self) -> Option<PointerId> {
        self.active.map(|s| s.pointer)
    }

    /// The button held by the active sequence, if any.
    pub fn pressed(&self) -> Option<ButtonId> {
        self.active.and_then(|s| s.pressed)
    }

    /// Processes one pointer event against the visible view.
    pub fn handle(&mut self, layout: &Layout, view: ViewId, event: PointerEvent) -> Vec<TouchOutput> {
        let mut out = Vec::with_capacity(2);
        match event {
            PointerEvent::Press {
                pointer,
                point,
                time,
            } => {
                if let Some(previous) = self.active.take() {
                    tracing::debug!(
                        "Press of {:?} while {:?} is active, dropping the old sequence",
                        pointer,
                        previous.pointer
                    );
                    out.extend(cancelled_release(previous, time));
                }
                let pressed = layout.hit_test(view, point);
                self.active = Some(Sequence { pointer, pressed });
                if let Some(button) = pressed {
                    out.push(TouchOutput::Depress { button, time });
                }
            }
            PointerEvent::Move {
                pointer,
                point,
                time,
            } => {
                let Some(sequence) = self.active.as_mut().filter(|s| s.pointer == pointer) else {
                    return out;
                };
                // A press made before a view switch stays put while the
                // finger is still on it.
                if let Some(pressed) = sequence.pressed {
                    if layout.hit_test(layout.view_of(pressed), point) == Some(pressed) {
                        return out;
                    }
                }
                let hit = layout.hit_test(view, point);
                if hit == sequence.pressed {
                    return out;
                }
                match (sequence.pressed, hit) {
                    (Some(old), Some(new)) => {
                        out.push(TouchOutput::Release {
                            button: old,
                            time,
                            cancelled: false,
                        });
                        out.push(TouchOutput::Depress { button: new, time });
                    }
                    (Some(old), None) => out.push(TouchOutput::Release {
                        button: old,
                        time,
                        cancelled: true,
                    }),
                    (None, Some(new)) => out.push(TouchOutput::Depress { button: new, time }),
                    (None, None) => {}
                }
                sequence.pressed = hit;
            }
            PointerEvent::Release { pointer, time } => {
                if let Some(sequence) = self.take_if(pointer) {
                    if let Some(button) = sequence.pressed {
                        out.push(TouchOutput::Release {
                            button,
                            time,
                            cancelled: false,
                        });
                    }
                }
            }
            PointerEvent::Cancel { pointer, time } => {
                if let Some(sequence) = self.take_if(pointer) {
                    out.extend(cancelled_release(sequence, time));
                }
            }
            PointerEvent::LeaveSurface { time } => {
                if let Some(sequence) = self.active.take() {
                    out.extend(cancelled_release(sequence, time));
                }
            }
        }
        out
    }

    /// Re-resolves the active sequence's press against `view`, for a press
    /// reported by [`handle`](Self::handle) but not yet applied when an
    /// earlier output of the same event switched views.
    ///
    /// Returns the button now under `point`.
    pub fn retarget(&mut self, layout: &Layout, view: ViewId, point: Point) -> Option<ButtonId> {
        let sequence = self.active.as_mut()?;
        sequence.pressed = layout.hit_test(view, point);
        sequence.pressed
    }

    /// Drops the active sequence, e.g. because the keyboard was hidden or
    /// the layout swapped.
    pub fn reset(&mut self, time: u32) -> Option<TouchOutput> {
        self.active.take().and_then(|s| cancelled_release(s, time))
    }

    fn take_if(&mut self, pointer: PointerId) -> Option<Sequence> {
        match self.active {
            Some(sequence) if sequence.pointer == pointer => self.active.take(),
            _ => None,
        }
    }
}

fn cancelled_release(sequence: Sequence, time: u32) -> Option<TouchOutput> {
    sequence.pressed.map(|button| TouchOutput::Release {
        button,
        time,
        cancelled: true,
    })
}
