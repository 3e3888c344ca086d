// SPDX-License-Identifier: GPL-3.0-only

//! Squeekboard - An on-screen keyboard for Wayland
//!
//! This crate provides the core of a touch keyboard: it loads layouts,
//! turns touches into button presses, and submits the result to the
//! focused application.
//!
//! # Architecture
//!
//! Input flows one way:
//!
//! 1. **Touch tracking** (`input::touch`): pointer streams become button
//!    presses and releases.
//!
//! 2. **Layout state** (`input::state`): presses become commands, views
//!    switch, modifiers latch and lock.
//!
//! 3. **Submission** (`submission`): commands reach the compositor through
//!    the input method protocol (committed text) or the virtual keyboard
//!    protocol (key events over a generated keymap).
//!
//! Visibility is decided from the shell's D-Bus requests, the input
//! method's activity and the user's dismissals.
//!
//! # Modules
//!
//! - `app`: Event loop tying Wayland, D-Bus and signals together
//! - `app_settings`: Centralized application constants
//! - `config`: Command line, environment and file configuration
//! - `dbus`: The `sm.puri.OSK0` service
//! - `input`: Touch tracking, modifiers and layout state
//! - `keyboard`: The keyboard as a whole
//! - `layout`: Layout model, parser and loader
//! - `submission`: Keymap synthesis, virtual keyboard and input method
//! - `symbol`: Keysym names and classification
//! - `visibility`: Show/hide arbitration
//! - `wayland`: Compositor connection and protocol bindings

pub mod app;
pub mod app_settings;
pub mod config;
pub mod dbus;
pub mod input;
pub mod keyboard;
pub mod layout;
pub mod submission;
pub mod symbol;
pub mod visibility;
pub mod wayland;

#[cfg(test)]
mod testing;

// ============================================================================
// Integration Tests
// ============================================================================
