use anyhow::Context;
use clap::Parser;
use netpilot_core::backends::utils::{detect_wired_interface, detect_wireless_interface};
use netpilot_core::config::{DEFAULT_CONFIG_PATH, DaemonConfig, StartupPolicy, load_config};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

mod policy;
mod runner;

const SYS_CLASS_NET: &str = "/sys/class/net";

/// Wired and wireless connection manager daemon.
#[derive(Debug, Parser)]
#[command(name = "netpilotd", version, about)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Address the RPC server listens on.
    #[arg(long)]
    bind: Option<SocketAddr>,

    /// Backend to load at startup (`external` or `ioctl`).
    #[arg(long)]
    backend: Option<String>,

    /// Do not connect anywhere on startup.
    #[arg(long)]
    no_autoconnect: bool,

    /// Log at debug level.
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn apply(&self, config: &mut DaemonConfig) {
        if let Some(bind) = self.bind {
            config.bind_addr = bind;
        }
        if let Some(backend) = &self.backend {
            config.backend = backend.clone();
        }
        if self.no_autoconnect {
            config.startup_policy = StartupPolicy::Manual;
        }
    }
}

fn init_tracing(debug: bool) {
    let level = if debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .init();
}

/// Fills in interface names the config left empty.
fn detect_interfaces(config: &mut DaemonConfig, sys_class_net: &Path) {
    if config.wireless_interface.is_none() {
        config.wireless_interface = detect_wireless_interface(sys_class_net);
    }
    if config.wired_interface.is_none() {
        config.wired_interface = detect_wired_interface(sys_class_net);
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let mut config = load_config(&cli.config)
        .with_context(|| format!("Failed to load config from {}", cli.config.display()))?;
    init_tracing(cli.verbose || config.debug_mode);

    cli.apply(&mut config);
    detect_interfaces(&mut config, Path::new(SYS_CLASS_NET));
    tracing::info!(
        config = %cli.config.display(),
        backend = %config.backend,
        wired = ?config.wired_interface,
        wireless = ?config.wireless_interface,
        "Starting netpilotd"
    );

    runner::run(config).await
}
