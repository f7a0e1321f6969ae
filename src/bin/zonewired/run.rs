// Copyright 2022 Matthew Ingwersen.
//
// Licensed under the Apache License, Version 2.0 (the "License"); you
// may not use this file except in compliance with the License. You may
// obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or
// implied. See the License for the specific language governing
// permissions and limitations under the License.

//! Implements the `run` command (i.e., running the server).

use std::fmt::Write;
use std::process;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use env_logger::Env;
use log::{error, info};
use signal_hook::consts::signal::{SIGINT, SIGTERM};
use signal_hook::iterator::Signals;

use zonewire::backend::memory::MemoryBackendFactory;
use zonewire::cache::MemoryPacketCache;
use zonewire::io::Listener;
use zonewire::server::{self, Server};
use zonewire::thread::ThreadGroup;

use crate::args::RunArgs;
use crate::config;
use crate::zones;

/// Runs the server.
pub fn run(args: RunArgs) {
    env_logger::init_from_env(Env::new().default_filter_or("warn"));

    if let Err(e) = try_running(args) {
        let mut message = String::from("Failed to run:");
        for (i, cause) in e.chain().enumerate() {
            write!(message, "\n[{}] {}", i + 1, cause).unwrap();
        }
        message.push_str("\nExiting with failure.");
        error!("{}", message);
        process::exit(1);
    }
    info!("Exiting with success.");
}

fn try_running(run_args: RunArgs) -> Result<()> {
    info!(
        "zonewire daemon v{}.{}.{} starting.",
        env!("CARGO_PKG_VERSION_MAJOR"),
        env!("CARGO_PKG_VERSION_MINOR"),
        env!("CARGO_PKG_VERSION_PATCH"),
    );

    info!(
        "Loading the configuration from {}.",
        run_args.config.display()
    );
    let config =
        config::load_from_path(&run_args.config).context("failed to load the configuration")?;

    // Bind before loading zones, so that a bad address fails fast.
    let listener = Listener::bind(
        &config.listen.local_address,
        &config.listen.local_ipv6,
        config.listen.port,
    )
    .context("failed to bind the TCP listeners")?;

    if config.zones.len() == 1 {
        info!("Beginning to load 1 zone.");
    } else {
        info!("Beginning to load {} zones.", config.zones.len());
    }
    let zones = zones::load(
        config.zones,
        Duration::from_secs(config.tcp.notify_window),
    );

    if run_args.check {
        info!("The configuration is usable; not starting the server.");
        return Ok(());
    }

    let server = Arc::new(Server::new(
        server::Config::from(&config.tcp),
        Arc::new(MemoryBackendFactory::new(Arc::new(zones.store))),
        Arc::new(MemoryPacketCache::new(Duration::from_secs(
            config.tcp.packet_cache_ttl,
        ))),
        Arc::new(zones.keystore),
        Arc::new(zones.notifies),
    ));

    let mut signals = set_up_signal_handling().context("failed to set up signal handling")?;

    info!("Set-up is complete; starting the server.");
    let thread_group = ThreadGroup::new();
    listener
        .start(&server, &thread_group)
        .context("failed to start the TCP listener")?;

    if let Some(signal) = signals.forever().next() {
        let name = match signal {
            SIGINT => "SIGINT",
            _ => "SIGTERM",
        };
        info!("Received {}; shutting down.", name);
    }

    thread_group.shut_down();
    thread_group.await_shutdown();
    log_stats(&server);
    info!("Shutdown complete.");
    Ok(())
}

/// Logs the server's counters.
fn log_stats(server: &Server) {
    let mut message = String::from("Statistics:");
    for (counter, value) in server.stats().snapshot() {
        write!(message, "\n  {}: {}", counter, value).unwrap();
    }
    info!("{}", message);
}

fn set_up_signal_handling() -> Result<Signals> {
    let term_signals = &[SIGINT, SIGTERM];
    let already_terminating = Arc::new(AtomicBool::new(false));

    // This sets up signal handlers to exit immediately if a second
    // termination signal arrives before the process finishes shutting
    // down gracefully.
    for sig in term_signals {
        signal_hook::flag::register_conditional_shutdown(*sig, 1, already_terminating.clone())?;
        signal_hook::flag::register(*sig, already_terminating.clone())?;
    }

    Signals::new(term_signals).map_err(Into::into)
}
