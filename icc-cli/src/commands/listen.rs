//! `icc listen`: print notifications published from now on.

use anyhow::{Context, Result};
use clap::Args;
use icc_store::{Backend, RedisStore};
use tracing::debug;

use super::cancel_on_ctrl_c;

/// Arguments for the `listen` command
#[derive(Debug, Args)]
pub struct ListenArgs {
    /// Stop after this many notifications
    #[arg(short = 'n', long)]
    pub count: Option<usize>,
}

/// Run the listen command
pub async fn run(backend: &Backend<RedisStore>, args: ListenArgs) -> Result<()> {
    let cancel = cancel_on_ctrl_c();
    let mut reader = backend
        .reader()
        .await
        .context("Failed to create notification reader")?;

    let mut received = 0;
    while args.count.is_none_or(|count| received < count) {
        match reader.receive(&cancel).await {
            Ok(payload) => {
                received += 1;
                println!("{}", String::from_utf8_lossy(&payload));
            }
            Err(e) if e.is_cancelled() => break,
            Err(e) => return Err(e).context("Failed to receive notification"),
        }
    }

    debug!(received, cursor = %reader.cursor(), "Stopped listening");
    Ok(())
}
