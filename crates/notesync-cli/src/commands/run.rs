//! Run command handler
//!
//! Keeps the engine polling in the foreground until Ctrl-C, printing every
//! event as it happens.

use anyhow::{bail, Result};
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

use notesync_core::{Config, EnginePhase, SyncError};

use super::{build_engine, explain};
use crate::output::Output;

pub async fn run(config: &Config, output: &Output) -> Result<()> {
    let engine = build_engine(config)?;
    let mut events = engine.subscribe();
    let mut status = engine.subscribe_status();

    match engine.authenticate().await {
        Ok(()) => {}
        // A retry is already scheduled
        Err(e @ SyncError::NetworkUnavailable(_)) => {
            warn!("Remote unreachable at startup: {}", e);
            output.message(&format!("{}; retrying in {:?}", e, engine.interval()));
        }
        Err(e) => return Err(explain(&e)),
    }
    output.message(&format!(
        "Polling every {:?} to {:?}. Press Ctrl-C to stop.",
        config.interval_min(),
        config.interval_max()
    ));

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted, stopping");
                break;
            }
            event = events.recv() => match event {
                Ok(event) => output.print_event(&event),
                Err(RecvError::Lagged(skipped)) => warn!("Skipped {} sync event(s)", skipped),
                Err(RecvError::Closed) => break,
            },
            changed = status.changed() => {
                if changed.is_err() {
                    break;
                }
                // Idle while running means authentication was given up
                if *status.borrow_and_update() == EnginePhase::Idle {
                    while let Ok(event) = events.try_recv() {
                        output.print_event(&event);
                    }
                    engine.stop();
                    bail!("Sync stopped: credentials rejected. Check api_key and project_id.");
                }
            }
        }
    }

    engine.stop();
    output.success("Stopped");
    Ok(())
}
