// SPDX-License-Identifier: GPL-3.0-only

//! Compositor connection.
//!
//! Binds the globals the keyboard needs, implements the submission sinks
//! on the protocol objects, and routes input method events into the
//! [`Keyboard`].
//!
//! Required globals are `wl_seat` and `zwp_virtual_keyboard_manager_v1`.
//! `zwp_input_method_manager_v2` is optional; without it every key goes
//! through the virtual keyboard.

use crate::keyboard::Keyboard;
use crate::layout::Layout;
use crate::submission::{InputMethodSink, KeymapError, SubmitError, VirtualKeyboardSink};
use std::fmt;
use std::fs::File;
use std::os::fd::AsFd;
use std::sync::Arc;
use wayland_client::globals::{BindError, GlobalError, GlobalListContents, registry_queue_init};
use wayland_client::protocol::{wl_registry, wl_seat::WlSeat};
use wayland_client::{
    ConnectError, Connection, Dispatch, DispatchError, EventQueue, QueueHandle, WEnum,
    delegate_noop,
};
use wayland_protocols_misc::zwp_input_method_v2::client::{
    zwp_input_method_manager_v2::ZwpInputMethodManagerV2,
    zwp_input_method_v2::{self, ZwpInputMethodV2},
};
use wayland_protocols_misc::zwp_virtual_keyboard_v1::client::{
    zwp_virtual_keyboard_manager_v1::ZwpVirtualKeyboardManagerV1,
    zwp_virtual_keyboard_v1::ZwpVirtualKeyboardV1,
};

/// `wl_keyboard.keymap_format.xkb_v1`
const KEYMAP_FORMAT_XKB_V1: u32 = 1;

/// The keyboard as driven by a real compositor.
pub type WaylandKeyboard = Keyboard<ZwpVirtualKeyboardV1, ZwpInputMethodV2>;

/// Errors that prevent the keyboard from starting.
#[derive(Debug)]
pub enum SetupError {
    /// No Wayland display to connect to.
    Connect(ConnectError),
    /// The registry could not be read.
    Registry(GlobalError),
    /// A required global is not advertised.
    MissingGlobal {
        interface: &'static str,
        source: BindError,
    },
    /// The initial roundtrip failed.
    Dispatch(DispatchError),
    /// The first keymap could not be sent.
    Submit(SubmitError),
}

impl fmt::Display for SetupError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SetupError::Connect(e) => write!(f, "cannot connect to the Wayland display: {}", e),
            SetupError::Registry(e) => write!(f, "cannot read the Wayland registry: {}", e),
            SetupError::MissingGlobal { interface, source } => {
                write!(f, "compositor does not provide {}: {}", interface, source)
            }
            SetupError::Dispatch(e) => write!(f, "Wayland roundtrip failed: {}", e),
            SetupError::Submit(e) => write!(f, "cannot set up the virtual keyboard: {}", e),
        }
    }
}

impl std::error::Error for SetupError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SetupError::Connect(e) => Some(e),
            SetupError::Registry(e) => Some(e),
            SetupError::MissingGlobal { source, .. } => Some(source),
            SetupError::Dispatch(e) => Some(e),
            SetupError::Submit(e) => Some(e),
        }
    }
}

impl VirtualKeyboardSink for ZwpVirtualKeyboardV1 {
    fn send_keymap(&mut self, file: &File, size: u32) -> Result<(), SubmitError> {
        self.keymap(KEYMAP_FORMAT_XKB_V1, file.as_fd(), size);
        Ok(())
    }

    fn send_key(&mut self, time: u32, key: u32, state: u32) {
        self.key(time, key, state);
    }

    fn send_modifiers(&mut self, depressed: u32, latched: u32, locked: u32, group: u32) {
        self.modifiers(depressed, latched, locked, group);
    }
}

impl InputMethodSink for ZwpInputMethodV2 {
    fn send_commit_string(&mut self, text: String) {
        self.commit_string(text);
    }

    fn send_delete_surrounding_text(&mut self, before: u32, after: u32) {
        self.delete_surrounding_text(before, after);
    }

    fn send_commit(&mut self, serial: u32) {
        self.commit(serial);
    }

    fn destroy_input_method(&mut self) {
        self.destroy();
    }
}

/// State handed to the event queue.
#[derive(Debug)]
pub struct WaylandState {
    pub keyboard: WaylandKeyboard,
    fatal: Option<SubmitError>,
}

impl WaylandState {
    /// Logs a failed operation. Failures to write a keymap are kept for the
    /// event loop to stop on.
    pub fn report(&mut self, result: Result<(), SubmitError>) {
        let Err(e) = result else {
            return;
        };
        tracing::error!("Submitting failed: {}", e);
        if matches!(
            e,
            SubmitError::Io(_) | SubmitError::Keymap(KeymapError::Io(_) | KeymapError::TooLarge(_))
        ) {
            self.fatal.get_or_insert(e);
        }
    }

    /// Takes an error that should end the program.
    pub fn take_fatal(&mut self) -> Option<SubmitError> {
        self.fatal.take()
    }
}

/// Connection, event queue and keyboard.
pub struct WaylandContext {
    pub connection: Connection,
    pub event_queue: EventQueue<WaylandState>,
    pub state: WaylandState,
}

impl fmt::Debug for WaylandContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WaylandContext")
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl WaylandContext {
    /// Connects to `$WAYLAND_DISPLAY`, binds the globals and sends the
    /// layout's keymap.
    pub fn connect(layout: Arc<Layout>, delete_surrounding_text: bool) -> Result<Self, SetupError> {
        let connection = Connection::connect_to_env().map_err(SetupError::Connect)?;
        let (globals, mut event_queue) =
            registry_queue_init::<WaylandState>(&connection).map_err(SetupError::Registry)?;
        let qh = event_queue.handle();

        let seat: WlSeat = globals
            .bind(&qh, 1..=7, ())
            .map_err(|source| SetupError::MissingGlobal {
                interface: "wl_seat",
                source,
            })?;
        let vk_manager: ZwpVirtualKeyboardManagerV1 =
            globals
                .bind(&qh, 1..=1, ())
                .map_err(|source| SetupError::MissingGlobal {
                    interface: "zwp_virtual_keyboard_manager_v1",
                    source,
                })?;
        let virtual_keyboard = vk_manager.create_virtual_keyboard(&seat, &qh, ());

        let input_method = match globals.bind::<ZwpInputMethodManagerV2, _, _>(&qh, 1..=1, ()) {
            Ok(manager) => Some(manager.get_input_method(&seat, &qh, ())),
            Err(e) => {
                tracing::info!("No input method support ({}), using the virtual keyboard only", e);
                None
            }
        };

        let keyboard = Keyboard::new(layout, virtual_keyboard, input_method, delete_surrounding_text)
            .map_err(SetupError::Submit)?;
        let mut state = WaylandState {
            keyboard,
            fatal: None,
        };
        event_queue
            .roundtrip(&mut state)
            .map_err(SetupError::Dispatch)?;
        tracing::info!("Connected to the compositor");

        Ok(Self {
            connection,
            event_queue,
            state,
        })
    }
}

/// Raw protocol value of an enum argument.
fn raw<T: Into<u32>>(value: WEnum<T>) -> u32 {
    match value {
        WEnum::Value(value) => value.into(),
        WEnum::Unknown(raw) => raw,
    }
}

impl Dispatch<wl_registry::WlRegistry, GlobalListContents> for WaylandState {
    fn event(
        _state: &mut Self,
        _registry: &wl_registry::WlRegistry,
        event: wl_registry::Event,
        _data: &GlobalListContents,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
    ) {
        if let wl_registry::Event::GlobalRemove { name } = event {
            tracing::debug!("Global {} removed", name);
        }
    }
}

impl Dispatch<ZwpInputMethodV2, ()> for WaylandState {
    fn event(
        state: &mut Self,
        _input_method: &ZwpInputMethodV2,
        event: zwp_input_method_v2::Event,
        _data: &(),
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
    ) {
        match event {
            zwp_input_method_v2::Event::Activate => {
                tracing::debug!("Input method: activate");
                state.keyboard.handle_im_activate();
            }
            zwp_input_method_v2::Event::Deactivate => {
                tracing::debug!("Input method: deactivate");
                state.keyboard.handle_im_deactivate();
            }
            zwp_input_method_v2::Event::SurroundingText {
                text,
                cursor,
                anchor,
            } => {
                tracing::debug!(
                    "Input method: surrounding text of {} bytes, cursor {}, anchor {}",
                    text.len(),
                    cursor,
                    anchor
                );
                state.keyboard.handle_im_surrounding_text(text, cursor, anchor);
            }
            zwp_input_method_v2::Event::TextChangeCause { cause } => {
                state.keyboard.handle_im_text_change_cause(raw(cause));
            }
            zwp_input_method_v2::Event::ContentType { hint, purpose } => {
                state.keyboard.handle_im_content_type(raw(hint), raw(purpose));
            }
            zwp_input_method_v2::Event::Done => {
                let result = state.keyboard.handle_im_done();
                state.report(result);
            }
            zwp_input_method_v2::Event::Unavailable => {
                let result = state.keyboard.handle_im_unavailable();
                state.report(result);
            }
            _ => {}
        }
    }
}

delegate_noop!(WaylandState: ignore WlSeat);
delegate_noop!(WaylandState: ZwpVirtualKeyboardManagerV1);
delegate_noop!(WaylandState: ZwpVirtualKeyboardV1);
delegate_noop!(WaylandState: ZwpInputMethodManagerV2);
