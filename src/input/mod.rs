// SPDX-License-Identifier: GPL-3.0-only

//! Input handling for the on-screen keyboard.
//!
//! This module turns touch and pointer input into keyboard actions:
//!
//! - **Touch tracking**: follow a single touch sequence, hit test buttons,
//!   handle drags between keys and cancellation ([`TouchTracker`])
//! - **Modifier state**: latched and locked modifiers ([`ModifierState`])
//! - **Layout state**: pressed buttons, active view, and the commands a
//!   press or release produces ([`LayoutState`])
//!
//! # Example Usage
//!
//! ```rust,ignore
//! use squeekboard::input::{LayoutState, PointerEvent, PointerId, TouchOutput, TouchTracker};
//!
//! let mut tracker = TouchTracker::new();
//! let mut state = LayoutState::new(layout.clone());
//!
//! let event = PointerEvent::Press { pointer: PointerId(0), point, time: 100 };
//! for output in tracker.handle(&layout, state.active_view(), event) {
//!     let events = match output {
//!         TouchOutput::Depress { button, time } => state.depress(button, time),
//!         TouchOutput::Release { button, time, cancelled } => state.release(button, time, cancelled),
//!     };
//!     // hand `events` to the submission layer
//! }
//! ```

// Sub-modules
pub mod modifier;
pub mod state;
pub mod touch;

// Re-export main types for convenience
pub use modifier::ModifierState;
pub use state::{Command, LayoutState, StateEvent};
pub use touch::{PointerEvent, PointerId, TouchOutput, TouchTracker};
