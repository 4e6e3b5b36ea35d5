use netpilot_core::daemon::Daemon;
use std::sync::Arc;

/// On-Start policy: autoconnect as soon as the daemon is up.
pub async fn run(daemon: &Arc<Daemon>) -> anyhow::Result<()> {
    tracing::info!("Policy: on-start, autoconnecting");
    let outcome = daemon.auto_connect(true).await;
    tracing::info!(?outcome, "Startup autoconnect finished");
    Ok(())
}
