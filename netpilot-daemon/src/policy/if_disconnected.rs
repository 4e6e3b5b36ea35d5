use netpilot_core::daemon::Daemon;
use std::sync::Arc;

/// Autoconnect only when neither interface already has an address.
pub async fn run(daemon: &Arc<Daemon>) -> anyhow::Result<()> {
    if let Some(ip) = check_if_already_connected(daemon).await {
        tracing::info!(%ip, "Policy: already connected, skipping autoconnect");
        return Ok(());
    }
    tracing::info!("Policy: not connected, autoconnecting");
    let outcome = daemon.auto_connect(true).await;
    tracing::info!(?outcome, "Startup autoconnect finished");
    Ok(())
}

async fn check_if_already_connected(daemon: &Daemon) -> Option<String> {
    match daemon.wired.get_ip().await {
        Some(ip) => Some(ip),
        None => daemon.wireless.get_ip().await,
    }
}
