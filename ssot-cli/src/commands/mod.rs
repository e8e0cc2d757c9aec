pub mod config;
pub mod inventory;
pub mod run;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;

use ssot_core::config::Config;
use ssot_netbox::NetboxClient;
use ssot_sync::{Reconciler, ReconcilerOptions, RemoteClient};

/// `--config` if given, else the per-user default.
pub fn config_path(explicit: Option<&Path>) -> Result<PathBuf> {
    match explicit {
        Some(path) => Ok(path.to_path_buf()),
        None => Ok(ssot_core::config::default_path()?),
    }
}

pub fn load_config(explicit: Option<&Path>) -> Result<(PathBuf, Config)> {
    let path = config_path(explicit)?;
    let config = ssot_core::config::load_at(&path)
        .with_context(|| format!("failed to load config from {}", path.display()))?;
    Ok((path, config))
}

/// Bootstrap a reconciler against the configured backend. Ctrl-C cancels
/// the run: in-flight requests finish, nothing new is submitted.
pub async fn bootstrap(config: &Config, dry_run: bool) -> Result<Arc<Reconciler>> {
    let client = NetboxClient::new(&config.netbox).context("failed to set up the NetBox client")?;
    let remote: Arc<dyn RemoteClient> = Arc::new(client);
    let priority = config.priority()?;
    let options = ReconcilerOptions::from_config(config, dry_run);
    let reconciler = Reconciler::bootstrap(remote, priority, options, cancel_on_ctrl_c())
        .await
        .with_context(|| format!("bootstrap against {} failed", config.netbox.url))?;
    Ok(Arc::new(reconciler))
}

fn cancel_on_ctrl_c() -> CancellationToken {
    let token = CancellationToken::new();
    let cancel = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received, finishing in-flight requests");
            cancel.cancel();
        }
    });
    token
}
