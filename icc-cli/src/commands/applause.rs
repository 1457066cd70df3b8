//! `icc applause`: record, count and clean up applause.

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use icc_store::{Backend, RedisStore, Timestamp};

/// Applause commands
#[derive(Debug, Args)]
pub struct ApplauseArgs {
    #[command(subcommand)]
    pub command: ApplauseCommand,
}

/// Applause subcommands
#[derive(Debug, Subcommand)]
pub enum ApplauseCommand {
    /// Record applause of a member in a parent
    Record {
        /// Parent ID (e.g. the meeting)
        parent: u64,
        /// Member ID (e.g. the user)
        member: u64,
        /// Unix time in seconds (defaults to now)
        #[arg(long)]
        at: Option<Timestamp>,
    },
    /// Print distinct members per parent since a unix time, as JSON
    Since {
        /// Unix time in seconds, inclusive
        since: Timestamp,
    },
    /// Remove applause older than a unix time
    Cleanup {
        /// Unix time in seconds; entries at exactly this time are kept
        horizon: Timestamp,
    },
}

/// Run the applause command
pub async fn run(backend: &Backend<RedisStore>, args: ApplauseArgs) -> Result<()> {
    match args.command {
        ApplauseCommand::Record { parent, member, at } => {
            let at = at.unwrap_or_else(|| chrono::Utc::now().timestamp());
            backend
                .record_applause(parent, member, at)
                .await
                .context("Failed to record applause")?;
            println!("Recorded applause {parent}-{member} at {at}");
        }
        ApplauseCommand::Since { since } => {
            let counts: BTreeMap<u64, usize> = backend
                .applause_since(since)
                .await
                .context("Failed to count applause")?
                .into_iter()
                .collect();
            println!("{}", serde_json::to_string_pretty(&counts)?);
        }
        ApplauseCommand::Cleanup { horizon } => {
            let removed = backend
                .cleanup_applause_before(horizon)
                .await
                .context("Failed to clean up applause")?;
            println!("Removed {removed} applause entries older than {horizon}");
        }
    }
    Ok(())
}
