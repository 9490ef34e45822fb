//! Interactive host for a process-backed background runtime.
//!
//! Reads commands and wire envelopes from stdin, prints messages from the
//! background environment to stdout, and logs to stderr.

use std::{env::args, sync::Arc};

use anyhow::Context;
use background_thread::{BackgroundManager, ManagerConfig, Payload, SandboxId};
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    signal,
};
use tracing::{Level, error, info, warn};
use tracing_subscriber::{Layer, layer::SubscriberExt, util::SubscriberInitExt};

use crate::{config::HostConfig, console::ConsoleCommand};

mod config;
mod console;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing()?;

    let host = HostConfig::from_env()?;
    let manager = BackgroundManager::new(host.factory(), ManagerConfig::from_env())
        .context("failed to create background manager")?;
    manager.set_on_message_callback(|message| println!("{message}"));
    manager.set_on_error_callback(|reason| error!(reason, "Background runtime error"));

    start(&manager, &host.console_sandbox, args().nth(1).as_deref());

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = tokio::select! {
            line = lines.next_line() => line.context("failed to read stdin")?,
            () = &mut shutdown => {
                info!("Received shutdown signal");
                break;
            }
        };
        let Some(line) = line else {
            break;
        };

        match ConsoleCommand::parse(&line) {
            Ok(None) => {}
            Ok(Some(ConsoleCommand::Start(entry))) => {
                start(&manager, &host.console_sandbox, entry.as_deref());
            }
            Ok(Some(ConsoleCommand::Stop)) => manager.stop(),
            Ok(Some(ConsoleCommand::Status)) => {
                manager.flush().await;
                println!("{}", manager.state().as_str());
            }
            Ok(Some(ConsoleCommand::Quit)) => break,
            Ok(Some(ConsoleCommand::Send(envelope))) => match envelope.target {
                Some(target) => {
                    if !manager.route_message(envelope.payload.as_str(), target.as_str()) {
                        warn!(sandbox_id = %target, "Message was not delivered");
                    }
                }
                None => manager.post_message(envelope.payload.as_str()),
            },
            Err(err) => warn!("Ignoring console input: {err:#}"),
        }
    }

    manager.stop();
    manager.flush().await;
    Ok(())
}

/// Registers the console sandbox before every start, since stopping clears
/// the registry.
fn start(manager: &BackgroundManager, console: &SandboxId, entry: Option<&str>) {
    let prefix = console.clone();
    manager.register_sandbox(
        console.clone(),
        Arc::new(move |payload: &Payload| {
            println!("[{prefix}] {payload}");
            true
        }),
    );
    manager.start(entry);
}

fn init_tracing() -> anyhow::Result<()> {
    let envfilter = tracing_subscriber::EnvFilter::builder()
        .with_default_directive(Level::INFO.into())
        .from_env()
        .context("failed to read env filter")?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::Layer::default()
                .with_writer(std::io::stderr)
                .with_filter(envfilter),
        )
        .try_init()
        .context("failed to install tracing subscriber")
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            warn!(error = %err, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut terminate) => {
                terminate.recv().await;
            }
            Err(err) => {
                warn!(error = %err, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}
