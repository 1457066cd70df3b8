//! `icc wait`: block until Redis is reachable.

use anyhow::{Result, bail};
use icc_store::{Backend, RedisStore};
use tracing::info;

use super::cancel_on_ctrl_c;

/// Run the wait command
pub async fn run(backend: &Backend<RedisStore>) -> Result<()> {
    let cancel = cancel_on_ctrl_c();

    if !backend.wait_until_reachable(&cancel).await {
        bail!("Interrupted before {} became reachable", backend.config().url);
    }

    info!(
        url = %backend.config().url,
        open_connections = backend.store().connections().open_connections(),
        "Redis is reachable"
    );
    Ok(())
}
