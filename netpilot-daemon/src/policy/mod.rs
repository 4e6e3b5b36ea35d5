use netpilot_core::config::StartupPolicy;
use netpilot_core::daemon::Daemon;
use std::sync::Arc;

pub mod if_disconnected;
pub mod on_start;

/// Runs the configured startup policy once, before the daemon settles into
/// monitoring.
pub async fn dispatch(policy: StartupPolicy, daemon: &Arc<Daemon>) -> anyhow::Result<()> {
    match policy {
        StartupPolicy::Autoconnect => on_start::run(daemon).await,
        StartupPolicy::IfDisconnected => if_disconnected::run(daemon).await,
        StartupPolicy::Manual => {
            tracing::info!("Policy: manual, waiting for a client to connect");
            Ok(())
        }
    }
}
