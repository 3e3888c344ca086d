// SPDX-License-Identifier: GPL-3.0-only

//! Squeekboard
//!
//! On-screen keyboard for Wayland compositors. Sends keys through the
//! virtual keyboard protocol and text through the input method protocol,
//! and is shown or hidden by the shell over D-Bus.

use clap::Parser;
use squeekboard::app::App;
use squeekboard::config::{Cli, Config};
use std::process::ExitCode;

/// Exit code for setup and runtime failures.
const EXIT_FAILURE: u8 = 1;
/// Exit code for unusable arguments or configuration.
const EXIT_USAGE: u8 = 2;

fn main() -> ExitCode {
    // Exits with status 2 on invalid arguments.
    let cli = Cli::parse();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("squeekboard=info".parse().unwrap()),
        )
        .init();

    let config = match Config::resolve(&cli) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("{}", e);
            return ExitCode::from(EXIT_USAGE);
        }
    };
    tracing::debug!("Configuration: {:?}", config);

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            tracing::error!("Cannot start the runtime: {}", e);
            return ExitCode::from(EXIT_FAILURE);
        }
    };

    let result = runtime.block_on(async {
        let app = App::start(cli, &config).await?;
        app.run().await
    });
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{}", e);
            ExitCode::from(EXIT_FAILURE)
        }
    }
}
