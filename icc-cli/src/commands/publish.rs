//! `icc publish`: append one notification.

use std::io::Read;

use anyhow::{Context, Result};
use clap::Args;
use icc_store::{Backend, RedisStore};

/// Arguments for the `publish` command
#[derive(Debug, Args)]
pub struct PublishArgs {
    /// Payload to publish (reads from stdin if omitted)
    pub message: Option<String>,
}

/// Run the publish command
pub async fn run(backend: &Backend<RedisStore>, args: PublishArgs) -> Result<()> {
    let payload = match args.message {
        Some(message) => message.into_bytes(),
        None => {
            let mut buf = Vec::new();
            std::io::stdin()
                .read_to_end(&mut buf)
                .context("Failed to read from stdin")?;
            buf
        }
    };

    backend
        .publish(&payload)
        .await
        .context("Failed to publish notification")?;

    println!("Published {} bytes", payload.len());
    Ok(())
}
