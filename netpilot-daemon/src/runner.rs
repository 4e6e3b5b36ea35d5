use anyhow::Context;
use netpilot_core::{
    backends::{BackendRegistry, BackendSettings},
    config::DaemonConfig,
    daemon::Daemon,
    monitor::Monitor,
    profile::TomlProfileStore,
    web_server,
};
use std::sync::Arc;

/// Opens the profile stores, builds the daemon and runs it until the RPC
/// server stops or the process is interrupted.
pub async fn run(config: DaemonConfig) -> anyhow::Result<()> {
    let wired_path = config.wired_profiles_path();
    let wireless_path = config.wireless_profiles_path();
    let wired_store = TomlProfileStore::open(&wired_path)
        .with_context(|| format!("Failed to open wired profiles at {}", wired_path.display()))?;
    let wireless_store = TomlProfileStore::open(&wireless_path).with_context(|| {
        format!("Failed to open wireless profiles at {}", wireless_path.display())
    })?;

    let registry = BackendRegistry::new(BackendSettings::from(&config));
    let bind_addr = config.bind_addr;
    let startup_policy = config.startup_policy;
    let daemon = Daemon::new(config, registry, Arc::new(wired_store), Arc::new(wireless_store))
        .context("Failed to initialise the daemon")?;
    let daemon = Arc::new(daemon);

    let server = web_server::start_web_server(daemon.clone(), bind_addr);
    let monitor = tokio::spawn(Monitor::new(daemon.clone()).run());

    crate::policy::dispatch(startup_policy, &daemon).await?;

    let result = tokio::select! {
        res = server => res
            .context("RPC server task failed")
            .and_then(|r| r.context("RPC server stopped")),
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Interrupted, shutting down");
            Ok(())
        }
    };
    monitor.abort();
    result
}
