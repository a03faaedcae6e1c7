//! Sync command handler

use anyhow::Result;

use notesync_core::Config;

use super::{build_engine, explain};
use crate::output::Output;

/// Run one sync pass against the configured GitLab project
pub async fn sync(config: &Config, output: &Output) -> Result<()> {
    let engine = build_engine(config)?;

    if let Some(server) = &config.server_url {
        output.message(&format!("Syncing profile '{}' with {}...", config.profile, server));
    }

    match engine.sync_once().await {
        Ok(report) => {
            output.print_report(&report);
            Ok(())
        }
        Err(e) => Err(explain(&e)),
    }
}
