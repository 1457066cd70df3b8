//! Subcommand implementations.

pub mod applause;
pub mod listen;
pub mod publish;
pub mod wait;

use icc_store::CancellationToken;
use tracing::{info, warn};

/// A token that is cancelled on Ctrl-C.
pub fn cancel_on_ctrl_c() -> CancellationToken {
    let token = CancellationToken::new();
    let cancel = token.clone();

    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Interrupted, shutting down"),
            Err(e) => warn!(error = %e, "Failed to listen for Ctrl-C"),
        }
        cancel.cancel();
    });

    token
}
