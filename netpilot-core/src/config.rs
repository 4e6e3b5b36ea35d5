//! Daemon configuration.
//!
//! The file is TOML with four tables (`[daemon]`, `[dns]`, `[scripts]`,
//! `[thresholds]`). Every key is optional. The file is first read into the
//! `*Toml` mirror structs and then validated into [`DaemonConfig`].

use crate::backends::utils::is_valid_ipv4;
use crate::profile::DnsSettings;
use crate::types::SignalDisplay;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_CONFIG_PATH: &str = "/etc/netpilot/netpilot.toml";

const MAX_DNS_SERVERS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DhcpClientChoice {
    #[default]
    Auto,
    Dhclient,
    Dhcpcd,
    Pump,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LinkDetectTool {
    #[default]
    Auto,
    Ethtool,
    MiiTool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlushTool {
    #[default]
    Auto,
    Ip,
    Route,
}

/// How a wired profile is picked when a cable is detected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WiredConnectMode {
    /// Connect with the profile flagged `default`.
    #[default]
    Default,
    /// Ask a front-end to let the user pick.
    Chooser,
    /// Reuse whichever profile was used last.
    LastUsed,
}

/// What the daemon does right after it starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StartupPolicy {
    #[default]
    Autoconnect,
    IfDisconnected,
    Manual,
}

/// Timing and retry limits used across the engine, the monitor and the
/// backends.
#[derive(Debug, Clone, PartialEq)]
pub struct Thresholds {
    pub signal_loss_polls: u32,
    pub reconnect_max_tries: u32,
    pub reconnect_window: Duration,
    pub auth_disconnected_limit: u32,
    pub auth_extension: Duration,
    pub auth_timeout: Duration,
    pub auth_poll_interval: Duration,
    pub verify_ap_attempts: u32,
    pub verify_ap_interval: Duration,
    pub interface_up_attempts: u32,
    pub interface_up_interval: Duration,
    pub rescan_interval: Duration,
    pub monitor_interval: Duration,
    pub wired_autoconnect_poll: Duration,
    pub link_detect_settle: Duration,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            signal_loss_polls: 4,
            reconnect_max_tries: 2,
            reconnect_window: Duration::from_secs(30),
            auth_disconnected_limit: 3,
            auth_extension: Duration::from_secs(5),
            auth_timeout: Duration::from_secs(35),
            auth_poll_interval: Duration::from_secs(1),
            verify_ap_attempts: 10,
            verify_ap_interval: Duration::from_secs(1),
            interface_up_attempts: 5,
            interface_up_interval: Duration::from_secs(2),
            rescan_interval: Duration::from_secs(120),
            monitor_interval: Duration::from_secs(2),
            wired_autoconnect_poll: Duration::from_secs(3),
            link_detect_settle: Duration::from_secs(2),
        }
    }
}

#[cfg(test)]
impl Thresholds {
    /// Millisecond-scale limits so engine and policy tests finish quickly.
    pub(crate) fn for_tests() -> Self {
        Self {
            auth_extension: Duration::from_millis(40),
            auth_timeout: Duration::from_millis(200),
            auth_poll_interval: Duration::from_millis(5),
            verify_ap_interval: Duration::from_millis(2),
            interface_up_interval: Duration::from_millis(2),
            monitor_interval: Duration::from_millis(10),
            wired_autoconnect_poll: Duration::from_millis(5),
            link_detect_settle: Duration::from_millis(1),
            ..Self::default()
        }
    }
}

/// Global resolver override applied when a profile selects `DnsMode::Global`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GlobalDns {
    pub enabled: bool,
    pub settings: DnsSettings,
}

/// Scripts run around every connect and disconnect unless a profile names
/// its own.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GlobalScripts {
    pub pre_connect: Option<String>,
    pub post_connect: Option<String>,
    pub pre_disconnect: Option<String>,
    pub post_disconnect: Option<String>,
}

/// Validated runtime configuration.
#[derive(Debug, Clone)]
pub struct DaemonConfig {
    pub backend: String,
    /// `None` means detect from `/sys/class/net`.
    pub wired_interface: Option<String>,
    pub wireless_interface: Option<String>,
    pub wpa_driver: String,
    pub auto_reconnect: bool,
    pub wired_connect_mode: WiredConnectMode,
    pub signal_display: SignalDisplay,
    pub dhcp_client: DhcpClientChoice,
    pub link_detect_tool: LinkDetectTool,
    pub flush_tool: FlushTool,
    pub verify_ap: bool,
    pub hostname: Option<String>,
    pub debug_mode: bool,
    pub startup_policy: StartupPolicy,
    pub bind_addr: SocketAddr,
    pub profiles_dir: PathBuf,
    pub networks_dir: PathBuf,
    pub templates_dir: PathBuf,
    pub resolv_conf: PathBuf,
    pub dns: GlobalDns,
    pub scripts: GlobalScripts,
    pub thresholds: Thresholds,
}

impl DaemonConfig {
    /// The configuration an empty file produces.
    pub fn defaults() -> Result<Self> {
        DaemonConfig::try_from(DaemonConfigToml::default())
    }

    pub fn wired_profiles_path(&self) -> PathBuf {
        self.profiles_dir.join("wired-settings.toml")
    }

    pub fn wireless_profiles_path(&self) -> PathBuf {
        self.profiles_dir.join("wireless-settings.toml")
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct DaemonConfigToml {
    daemon: DaemonSectionToml,
    dns: DnsSectionToml,
    scripts: GlobalScripts,
    thresholds: ThresholdsToml,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct DaemonSectionToml {
    backend: String,
    wired_interface: Option<String>,
    wireless_interface: Option<String>,
    wpa_driver: String,
    auto_reconnect: bool,
    wired_connect_mode: WiredConnectMode,
    signal_display: SignalDisplay,
    dhcp_client: DhcpClientChoice,
    link_detect_tool: LinkDetectTool,
    flush_tool: FlushTool,
    verify_ap: bool,
    hostname: Option<String>,
    debug_mode: bool,
    startup_policy: StartupPolicy,
    bind_addr: String,
    profiles_dir: PathBuf,
    networks_dir: PathBuf,
    templates_dir: PathBuf,
    resolv_conf: PathBuf,
}

impl Default for DaemonSectionToml {
    fn default() -> Self {
        Self {
            backend: "external".to_string(),
            wired_interface: None,
            wireless_interface: None,
            wpa_driver: "wext".to_string(),
            auto_reconnect: true,
            wired_connect_mode: WiredConnectMode::default(),
            signal_display: SignalDisplay::default(),
            dhcp_client: DhcpClientChoice::default(),
            link_detect_tool: LinkDetectTool::default(),
            flush_tool: FlushTool::default(),
            verify_ap: true,
            hostname: None,
            debug_mode: false,
            startup_policy: StartupPolicy::default(),
            bind_addr: "127.0.0.1:8741".to_string(),
            profiles_dir: PathBuf::from("/etc/netpilot"),
            networks_dir: PathBuf::from("/var/lib/netpilot/networks"),
            templates_dir: PathBuf::from("/etc/netpilot/templates"),
            resolv_conf: PathBuf::from("/etc/resolv.conf"),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct DnsSectionToml {
    use_global: bool,
    servers: Vec<String>,
    domain: Option<String>,
    search_domain: Option<String>,
}

// Durations are written as (fractional) seconds.
#[derive(Debug, Deserialize)]
#[serde(default)]
struct ThresholdsToml {
    signal_loss_polls: u32,
    reconnect_max_tries: u32,
    reconnect_window_secs: f64,
    auth_disconnected_limit: u32,
    auth_extension_secs: f64,
    auth_timeout_secs: f64,
    auth_poll_interval_secs: f64,
    verify_ap_attempts: u32,
    verify_ap_interval_secs: f64,
    interface_up_attempts: u32,
    interface_up_interval_secs: f64,
    rescan_interval_secs: f64,
    monitor_interval_secs: f64,
    wired_autoconnect_poll_secs: f64,
    link_detect_settle_secs: f64,
}

impl Default for ThresholdsToml {
    fn default() -> Self {
        let t = Thresholds::default();
        Self {
            signal_loss_polls: t.signal_loss_polls,
            reconnect_max_tries: t.reconnect_max_tries,
            reconnect_window_secs: t.reconnect_window.as_secs_f64(),
            auth_disconnected_limit: t.auth_disconnected_limit,
            auth_extension_secs: t.auth_extension.as_secs_f64(),
            auth_timeout_secs: t.auth_timeout.as_secs_f64(),
            auth_poll_interval_secs: t.auth_poll_interval.as_secs_f64(),
            verify_ap_attempts: t.verify_ap_attempts,
            verify_ap_interval_secs: t.verify_ap_interval.as_secs_f64(),
            interface_up_attempts: t.interface_up_attempts,
            interface_up_interval_secs: t.interface_up_interval.as_secs_f64(),
            rescan_interval_secs: t.rescan_interval.as_secs_f64(),
            monitor_interval_secs: t.monitor_interval.as_secs_f64(),
            wired_autoconnect_poll_secs: t.wired_autoconnect_poll.as_secs_f64(),
            link_detect_settle_secs: t.link_detect_settle.as_secs_f64(),
        }
    }
}

fn secs(field: &str, value: f64) -> Result<Duration> {
    Duration::try_from_secs_f64(value)
        .map_err(|e| Error::Config(format!("thresholds.{field}_secs = {value}: {e}")))
}

/// Like [`secs`], but a poll period must also be non-zero.
fn interval_secs(field: &str, value: f64) -> Result<Duration> {
    let period = secs(field, value)?;
    if period.is_zero() {
        return Err(Error::Config(format!("thresholds.{field}_secs must be greater than zero")));
    }
    Ok(period)
}

fn count(field: &str, value: u32) -> Result<u32> {
    if value == 0 {
        return Err(Error::Config(format!("thresholds.{field} must be at least 1")));
    }
    Ok(value)
}

impl TryFrom<ThresholdsToml> for Thresholds {
    type Error = Error;

    fn try_from(t: ThresholdsToml) -> Result<Self> {
        Ok(Thresholds {
            signal_loss_polls: count("signal_loss_polls", t.signal_loss_polls)?,
            reconnect_max_tries: count("reconnect_max_tries", t.reconnect_max_tries)?,
            reconnect_window: secs("reconnect_window", t.reconnect_window_secs)?,
            auth_disconnected_limit: count("auth_disconnected_limit", t.auth_disconnected_limit)?,
            auth_extension: secs("auth_extension", t.auth_extension_secs)?,
            auth_timeout: secs("auth_timeout", t.auth_timeout_secs)?,
            auth_poll_interval: interval_secs("auth_poll_interval", t.auth_poll_interval_secs)?,
            verify_ap_attempts: count("verify_ap_attempts", t.verify_ap_attempts)?,
            verify_ap_interval: interval_secs("verify_ap_interval", t.verify_ap_interval_secs)?,
            interface_up_attempts: count("interface_up_attempts", t.interface_up_attempts)?,
            interface_up_interval: interval_secs("interface_up_interval", t.interface_up_interval_secs)?,
            rescan_interval: interval_secs("rescan_interval", t.rescan_interval_secs)?,
            monitor_interval: interval_secs("monitor_interval", t.monitor_interval_secs)?,
            wired_autoconnect_poll: interval_secs("wired_autoconnect_poll", t.wired_autoconnect_poll_secs)?,
            link_detect_settle: secs("link_detect_settle", t.link_detect_settle_secs)?,
        })
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

impl TryFrom<DaemonConfigToml> for DaemonConfig {
    type Error = Error;

    fn try_from(t: DaemonConfigToml) -> Result<Self> {
        let d = t.daemon;

        let bind_addr = SocketAddr::from_str(&d.bind_addr)
            .map_err(|e| Error::Config(format!("invalid bind_addr '{}': {e}", d.bind_addr)))?;

        if t.dns.servers.len() > MAX_DNS_SERVERS {
            return Err(Error::Config(format!(
                "at most {MAX_DNS_SERVERS} global DNS servers are supported, got {}",
                t.dns.servers.len()
            )));
        }
        if let Some(bad) = t.dns.servers.iter().find(|s| !is_valid_ipv4(s)) {
            return Err(Error::Config(format!("invalid global DNS server '{bad}'")));
        }

        let wpa_driver = if d.wpa_driver.trim().is_empty() {
            "wext".to_string()
        } else {
            d.wpa_driver
        };

        Ok(DaemonConfig {
            backend: d.backend,
            wired_interface: non_empty(d.wired_interface),
            wireless_interface: non_empty(d.wireless_interface),
            wpa_driver,
            auto_reconnect: d.auto_reconnect,
            wired_connect_mode: d.wired_connect_mode,
            signal_display: d.signal_display,
            dhcp_client: d.dhcp_client,
            link_detect_tool: d.link_detect_tool,
            flush_tool: d.flush_tool,
            verify_ap: d.verify_ap,
            hostname: non_empty(d.hostname),
            debug_mode: d.debug_mode,
            startup_policy: d.startup_policy,
            bind_addr,
            profiles_dir: d.profiles_dir,
            networks_dir: d.networks_dir,
            templates_dir: d.templates_dir,
            resolv_conf: d.resolv_conf,
            dns: GlobalDns {
                enabled: t.dns.use_global,
                settings: DnsSettings {
                    servers: t.dns.servers,
                    domain: non_empty(t.dns.domain),
                    search_domain: non_empty(t.dns.search_domain),
                },
            },
            scripts: GlobalScripts {
                pre_connect: non_empty(t.scripts.pre_connect),
                post_connect: non_empty(t.scripts.post_connect),
                pre_disconnect: non_empty(t.scripts.pre_disconnect),
                post_disconnect: non_empty(t.scripts.post_disconnect),
            },
            thresholds: Thresholds::try_from(t.thresholds)?,
        })
    }
}

pub fn config_from_toml_str(s: &str) -> Result<DaemonConfig> {
    let parsed: DaemonConfigToml = toml::from_str(s)?;
    DaemonConfig::try_from(parsed)
}

/// Loads the config file. A missing file yields the defaults.
pub fn load_config(path: &Path) -> Result<DaemonConfig> {
    match std::fs::read_to_string(path) {
        Ok(text) => config_from_toml_str(&text),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::info!(path = %path.display(), "No config file found, using defaults");
            DaemonConfig::defaults()
        }
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_gives_defaults() {
        let config = config_from_toml_str("").unwrap();
        assert_eq!(config.backend, "external");
        assert_eq!(config.wpa_driver, "wext");
        assert!(config.auto_reconnect);
        assert!(config.verify_ap);
        assert_eq!(config.wired_connect_mode, WiredConnectMode::Default);
        assert_eq!(config.startup_policy, StartupPolicy::Autoconnect);
        assert_eq!(config.thresholds, Thresholds::default());
        assert_eq!(config.thresholds.auth_timeout, Duration::from_secs(35));
        assert_eq!(config.thresholds.signal_loss_polls, 4);
        assert_eq!(config.wired_interface, None);
    }

    #[test]
    fn test_full_file() {
        let toml = r#"
            [daemon]
            backend = "ioctl"
            wireless_interface = "wlp3s0"
            wired_interface = ""
            dhcp_client = "dhcpcd"
            link_detect_tool = "mii-tool"
            flush_tool = "route"
            wired_connect_mode = "last_used"
            signal_display = "dbm"
            startup_policy = "if_disconnected"
            bind_addr = "0.0.0.0:9000"
            hostname = "kiosk"

            [dns]
            use_global = true
            servers = ["1.1.1.1", "9.9.9.9"]
            search_domain = "lan"

            [scripts]
            pre_connect = "/etc/netpilot/pre.sh"

            [thresholds]
            auth_timeout_secs = 0.25
            signal_loss_polls = 6
        "#;
        let config = config_from_toml_str(toml).unwrap();
        assert_eq!(config.backend, "ioctl");
        assert_eq!(config.wireless_interface.as_deref(), Some("wlp3s0"));
        assert_eq!(config.wired_interface, None);
        assert_eq!(config.dhcp_client, DhcpClientChoice::Dhcpcd);
        assert_eq!(config.link_detect_tool, LinkDetectTool::MiiTool);
        assert_eq!(config.flush_tool, FlushTool::Route);
        assert_eq!(config.wired_connect_mode, WiredConnectMode::LastUsed);
        assert_eq!(config.signal_display, SignalDisplay::Dbm);
        assert_eq!(config.startup_policy, StartupPolicy::IfDisconnected);
        assert_eq!(config.bind_addr.port(), 9000);
        assert!(config.dns.enabled);
        assert_eq!(config.dns.settings.servers.len(), 2);
        assert_eq!(config.dns.settings.search_domain.as_deref(), Some("lan"));
        assert_eq!(config.scripts.pre_connect.as_deref(), Some("/etc/netpilot/pre.sh"));
        assert_eq!(config.thresholds.auth_timeout, Duration::from_millis(250));
        assert_eq!(config.thresholds.signal_loss_polls, 6);
        assert_eq!(config.thresholds.monitor_interval, Duration::from_secs(2));
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        assert!(matches!(
            config_from_toml_str("[daemon]\nbind_addr = \"nope\""),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            config_from_toml_str("[dns]\nservers = [\"1.1.1.1\", \"2.2.2.2\", \"3.3.3.3\", \"4.4.4.4\"]"),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            config_from_toml_str("[dns]\nservers = [\"300.1.1.1\"]"),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            config_from_toml_str("[thresholds]\nauth_timeout_secs = -1.0"),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            config_from_toml_str("[daemon]\ndhcp_client = \"udhcpc\""),
            Err(Error::TomlDe(_))
        ));
    }

    #[test]
    fn test_zero_intervals_and_counts_are_rejected() {
        for key in [
            "auth_poll_interval_secs",
            "verify_ap_interval_secs",
            "interface_up_interval_secs",
            "rescan_interval_secs",
            "monitor_interval_secs",
            "wired_autoconnect_poll_secs",
        ] {
            let toml = format!("[thresholds]\n{key} = 0.0\n");
            assert!(
                matches!(config_from_toml_str(&toml), Err(Error::Config(_))),
                "{key} = 0.0 was accepted"
            );
        }
        for key in [
            "signal_loss_polls",
            "reconnect_max_tries",
            "auth_disconnected_limit",
            "verify_ap_attempts",
            "interface_up_attempts",
        ] {
            let toml = format!("[thresholds]\n{key} = 0\n");
            assert!(
                matches!(config_from_toml_str(&toml), Err(Error::Config(_))),
                "{key} = 0 was accepted"
            );
        }

        // Sub-second intervals and a zero settle delay stay valid.
        let config =
            config_from_toml_str("[thresholds]\nmonitor_interval_secs = 0.5\nlink_detect_settle_secs = 0.0\n")
                .unwrap();
        assert_eq!(config.thresholds.monitor_interval, Duration::from_millis(500));
        assert_eq!(config.thresholds.link_detect_settle, Duration::ZERO);
    }

    #[test]
    fn test_load_config_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.backend, "external");
    }

    #[test]
    fn test_load_config_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("netpilot.toml");
        std::fs::write(&path, "[daemon]\nprofiles_dir = \"/tmp/np\"\n").unwrap();
        let config = load_config(&path).unwrap();
        assert_eq!(
            config.wired_profiles_path(),
            PathBuf::from("/tmp/np/wired-settings.toml")
        );
    }
}
