// SPDX-License-Identifier: GPL-3.0-only

//! Event loop.
//!
//! A single-threaded tokio runtime multiplexes three sources:
//!
//! - the Wayland connection, watched with [`AsyncFd`] and dispatched into
//!   the [`WaylandState`](crate::wayland::WaylandState);
//! - `SetVisible` requests arriving from D-Bus over a channel;
//! - SIGHUP, which re-reads the configuration and applies the layout;
//! - SIGINT and SIGTERM.
//!
//! After every wakeup the keyboard's [`LayoutEvent`]s are drained and the
//! effective visibility is reported back to D-Bus.

use crate::config::{Cli, Config};
use crate::dbus::{DbusCommand, DbusServer};
use crate::keyboard::LayoutEvent;
use crate::layout::{Layout, LayoutError, default_keyboards_dir, load_layout};
use crate::submission::SubmitError;
use crate::wayland::{SetupError, WaylandContext};
use futures::StreamExt;
use futures::channel::mpsc;
use std::fmt;
use std::io::ErrorKind;
use std::os::fd::{AsRawFd, RawFd};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::unix::AsyncFd;
use tokio::signal::unix::{SignalKind, signal};
use wayland_client::DispatchError;
use wayland_client::backend::WaylandError;

/// Capacity of the D-Bus command channel.
const COMMAND_QUEUE: usize = 16;

/// Errors that end the program.
#[derive(Debug)]
pub enum AppError {
    Layout(LayoutError),
    Setup(SetupError),
    Submit(SubmitError),
    Wayland(WaylandError),
    Dispatch(DispatchError),
    Io(std::io::Error),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Layout(e) => write!(f, "no usable layout: {}", e),
            AppError::Setup(e) => write!(f, "{}", e),
            AppError::Submit(e) => write!(f, "{}", e),
            AppError::Wayland(e) => write!(f, "Wayland connection error: {}", e),
            AppError::Dispatch(e) => write!(f, "Wayland dispatch error: {}", e),
            AppError::Io(e) => write!(f, "I/O error: {}", e),
        }
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AppError::Layout(e) => Some(e),
            AppError::Setup(e) => Some(e),
            AppError::Submit(e) => Some(e),
            AppError::Wayland(e) => Some(e),
            AppError::Dispatch(e) => Some(e),
            AppError::Io(e) => Some(e),
        }
    }
}

impl From<SetupError> for AppError {
    fn from(e: SetupError) -> Self {
        AppError::Setup(e)
    }
}

impl From<std::io::Error> for AppError {
    fn from(e: std::io::Error) -> Self {
        AppError::Io(e)
    }
}

impl From<DispatchError> for AppError {
    fn from(e: DispatchError) -> Self {
        AppError::Dispatch(e)
    }
}

/// Why the loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Exit {
    Signal,
    Disconnected,
}

/// The running keyboard.
pub struct App {
    /// Kept to resolve the configuration again on SIGHUP.
    cli: Cli,
    context: WaylandContext,
    dbus: Option<DbusServer>,
    dbus_rx: Option<mpsc::Receiver<DbusCommand>>,
}

impl App {
    /// Loads the layout, connects to the compositor and, unless disabled,
    /// claims the D-Bus name.
    ///
    /// A failure to set up D-Bus is logged; the keyboard then only follows
    /// the input method.
    pub async fn start(cli: Cli, config: &Config) -> Result<Self, AppError> {
        let (layout, keyboards_dir) = configured_layout(config).map_err(AppError::Layout)?;
        let mut context = WaylandContext::connect(layout, config.delete_surrounding_text)?;
        context.state.keyboard.set_keyboards_dir(keyboards_dir);

        let (dbus, dbus_rx) = if config.dbus {
            let (tx, rx) = mpsc::channel(COMMAND_QUEUE);
            match DbusServer::start(tx, context.state.keyboard.is_visible()).await {
                Ok(server) => (Some(server), Some(rx)),
                Err(e) => {
                    tracing::warn!("Continuing without D-Bus: {}", e);
                    (None, None)
                }
            }
        } else {
            tracing::info!("D-Bus disabled");
            (None, None)
        };

        Ok(Self {
            cli,
            context,
            dbus,
            dbus_rx,
        })
    }

    /// Runs until a signal arrives or the compositor goes away.
    pub async fn run(mut self) -> Result<(), AppError> {
        let poll_fd: RawFd = self.context.connection.backend().poll_fd().as_raw_fd();
        let async_fd = AsyncFd::new(poll_fd)?;
        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sighup = signal(SignalKind::hangup())?;

        let exit = loop {
            self.context
                .event_queue
                .dispatch_pending(&mut self.context.state)?;
            if let Some(e) = self.context.state.take_fatal() {
                return Err(AppError::Submit(e));
            }
            self.publish_events().await;

            match self.context.event_queue.flush() {
                Ok(()) => {}
                Err(WaylandError::Io(e)) if e.kind() == ErrorKind::WouldBlock => {}
                Err(WaylandError::Io(e)) => {
                    tracing::info!("Compositor connection closed: {}", e);
                    break Exit::Disconnected;
                }
                Err(e) => return Err(AppError::Wayland(e)),
            }

            let Some(read_guard) = self.context.event_queue.prepare_read() else {
                continue;
            };

            tokio::select! {
                ready = async_fd.readable() => {
                    let mut ready = ready?;
                    match read_guard.read() {
                        Ok(_) => {}
                        Err(WaylandError::Io(e)) if e.kind() == ErrorKind::WouldBlock => {}
                        Err(WaylandError::Io(e)) => {
                            tracing::info!("Compositor connection closed: {}", e);
                            break Exit::Disconnected;
                        }
                        Err(e) => return Err(AppError::Wayland(e)),
                    }
                    ready.clear_ready();
                }
                command = next_command(&mut self.dbus_rx) => {
                    match command {
                        Some(DbusCommand::SetVisible(visible)) => {
                            let result = self.context.state.keyboard.set_shell_visible(visible);
                            self.context.state.report(result);
                        }
                        None => {
                            // The last requested state stays in effect.
                            tracing::warn!("D-Bus command channel closed");
                            self.dbus_rx = None;
                        }
                    }
                }
                _ = sighup.recv() => self.reload(),
                _ = tokio::signal::ctrl_c() => break Exit::Signal,
                _ = sigterm.recv() => break Exit::Signal,
            }
        };

        tracing::info!("Shutting down ({:?})", exit);
        let keyboard = &mut self.context.state.keyboard;
        let result = keyboard.release_all(keyboard.last_time());
        self.context.state.report(result);
        if exit == Exit::Signal {
            if let Err(e) = self.context.event_queue.flush() {
                tracing::debug!("Final flush failed: {}", e);
            }
        }
        Ok(())
    }

    /// Applies the layout of a freshly resolved configuration. Errors keep
    /// the current layout.
    fn reload(&mut self) {
        tracing::info!("Reloading configuration");
        let config = match Config::resolve(&self.cli) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!("Keeping the current layout: {}", e);
                return;
            }
        };
        let (layout, keyboards_dir) = match configured_layout(&config) {
            Ok(loaded) => loaded,
            Err(e) => {
                tracing::warn!("Keeping the current layout: {}", e);
                return;
            }
        };
        let keyboard = &mut self.context.state.keyboard;
        keyboard.set_keyboards_dir(keyboards_dir);
        let result = keyboard.set_configured_layout(layout);
        self.context.state.report(result);
    }

    /// Forwards visibility changes to D-Bus and logs the rest.
    async fn publish_events(&mut self) {
        for event in self.context.state.keyboard.take_events() {
            match event {
                LayoutEvent::VisibilityChanged(visible) => {
                    if let Some(dbus) = &self.dbus {
                        if let Err(e) = dbus.set_visible(visible).await {
                            tracing::warn!("{}", e);
                        }
                    }
                }
                other => tracing::trace!("Layout event: {:?}", other),
            }
        }
    }
}

/// Loads the layout a configuration names, and the directory searched
/// for layouts.
fn configured_layout(config: &Config) -> Result<(Arc<Layout>, Option<PathBuf>), LayoutError> {
    let keyboards_dir = config.keyboards_dir.clone().or_else(default_keyboards_dir);
    let layout = load_layout(&config.layout, keyboards_dir.as_deref())?;
    Ok((Arc::new(layout), keyboards_dir))
}

/// Next D-Bus command, or never when D-Bus is off.
async fn next_command(rx: &mut Option<mpsc::Receiver<DbusCommand>>) -> Option<DbusCommand> {
    match rx {
        Some(rx) => rx.next().await,
        None => std::future::pending().await,
    }
}
