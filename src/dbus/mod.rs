// SPDX-License-Identifier: GPL-3.0-only

//! D-Bus interface for the shell.
//!
//! The shell (or anything else on the session bus) decides whether the
//! keyboard should be shown through this service, and watches the
//! resulting visibility.
//!
//! # Interface
//!
//! - Well-known name and interface: `sm.puri.OSK0`
//! - Object path: `/sm/puri/OSK0`
//! - Methods: `SetVisible(visible: b)`
//! - Properties: `Visible` (read only, emits `PropertiesChanged`)
//!
//! Method calls are forwarded to the event loop over a channel; the loop
//! reports the effective visibility back with [`DbusServer::set_visible`].

use crate::app_settings::{DBUS_INTERFACE, DBUS_NAME, DBUS_PATH};
use futures::SinkExt;
use futures::channel::mpsc;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use zbus::interface;

/// Commands that can be sent from D-Bus to the main application.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DbusCommand {
    /// The shell wants the keyboard shown or hidden.
    SetVisible(bool),
}

/// The `sm.puri.OSK0` object.
pub struct Osk0Interface {
    /// Channel sender to send commands to the main application.
    command_tx: mpsc::Sender<DbusCommand>,
    /// Effective visibility, as last reported by the application.
    visible: Arc<AtomicBool>,
}

impl Osk0Interface {
    /// Create a new interface instance with a command sender and shared visibility state.
    pub fn new(command_tx: mpsc::Sender<DbusCommand>, visible: Arc<AtomicBool>) -> Self {
        Self {
            command_tx,
            visible,
        }
    }
}

#[interface(name = "sm.puri.OSK0")]
impl Osk0Interface {
    /// Request the keyboard to be shown or hidden.
    async fn set_visible(&mut self, visible: bool) {
        tracing::debug!("D-Bus: SetVisible({}) called", visible);
        if let Err(e) = self.command_tx.send(DbusCommand::SetVisible(visible)).await {
            tracing::error!("Failed to send SetVisible command: {}", e);
        }
    }

    /// Whether the keyboard is currently shown.
    #[zbus(property)]
    async fn visible(&self) -> bool {
        self.visible.load(Ordering::SeqCst)
    }
}

/// Result type for D-Bus operations.
pub type DbusResult<T> = Result<T, DbusError>;

/// Errors that can occur during D-Bus operations.
#[derive(Debug, Clone)]
pub enum DbusError {
    /// Failed to connect to the session bus.
    ConnectionFailed(String),
    /// Failed to claim the name or register the object.
    RegistrationFailed(String),
    /// Failed to announce a property change.
    NotifyFailed(String),
}

impl std::fmt::Display for DbusError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DbusError::ConnectionFailed(msg) => write!(f, "D-Bus connection failed: {}", msg),
            DbusError::RegistrationFailed(msg) => {
                write!(f, "D-Bus service registration failed: {}", msg)
            }
            DbusError::NotifyFailed(msg) => write!(f, "D-Bus property notification failed: {}", msg),
        }
    }
}

impl std::error::Error for DbusError {}

/// D-Bus server handle for the main application.
pub struct DbusServer {
    /// The D-Bus connection.
    connection: zbus::Connection,
    /// Shared visibility state.
    visible: Arc<AtomicBool>,
}

impl std::fmt::Debug for DbusServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DbusServer")
            .field("visible", &self.visible.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

impl DbusServer {
    /// Claim `sm.puri.OSK0` on the session bus and serve the interface.
    ///
    /// # Arguments
    /// * `command_tx` - Channel sender to forward commands to the main application.
    /// * `visible` - Initial visibility.
    ///
    /// # Returns
    /// A `DbusServer` instance if successful, or an error if registration fails.
    pub async fn start(command_tx: mpsc::Sender<DbusCommand>, visible: bool) -> DbusResult<Self> {
        let visible = Arc::new(AtomicBool::new(visible));
        let interface = Osk0Interface::new(command_tx, Arc::clone(&visible));

        let connection = zbus::connection::Builder::session()
            .map_err(|e| DbusError::ConnectionFailed(e.to_string()))?
            .name(DBUS_NAME)
            .map_err(|e| DbusError::RegistrationFailed(e.to_string()))?
            .serve_at(DBUS_PATH, interface)
            .map_err(|e| DbusError::RegistrationFailed(e.to_string()))?
            .build()
            .await
            .map_err(|e| DbusError::ConnectionFailed(e.to_string()))?;

        tracing::info!(
            "D-Bus service registered: {} ({} at {})",
            DBUS_NAME,
            DBUS_INTERFACE,
            DBUS_PATH
        );

        Ok(Self {
            connection,
            visible,
        })
    }

    /// Get the D-Bus connection.
    pub fn connection(&self) -> &zbus::Connection {
        &self.connection
    }

    /// Last reported visibility.
    pub fn is_visible(&self) -> bool {
        self.visible.load(Ordering::SeqCst)
    }

    /// Update the visibility and notify watchers if it changed.
    pub async fn set_visible(&self, visible: bool) -> DbusResult<()> {
        let old_visible = self.visible.swap(visible, Ordering::SeqCst);
        if old_visible != visible {
            self.notify_visible().await?;
        }
        Ok(())
    }

    async fn notify_visible(&self) -> DbusResult<()> {
        let iface_ref = self
            .connection
            .object_server()
            .interface::<_, Osk0Interface>(DBUS_PATH)
            .await
            .map_err(|e| DbusError::NotifyFailed(e.to_string()))?;

        iface_ref
            .get()
            .await
            .visible_changed(iface_ref.signal_emitter())
            .await
            .map_err(|e| DbusError::NotifyFailed(e.to_string()))?;

        tracing::debug!("D-Bus: Visible property changed");
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
