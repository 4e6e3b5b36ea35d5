// Backend: external
// Drives interfaces by shelling out to the classic userland tools
// (ifconfig, iwconfig, iwlist, wpa_supplicant, a DHCP client, ...) and
// parsing their text output.

use super::BackendSettings;
use super::dhcp::{DhcpClient, KNOWN_DHCP_BINARIES, read_outcome};
use super::templates;
use super::utils::{
    find_program, run_checked, run_output, run_text, validated_ipv4, write_resolv_conf,
};
use crate::config::{FlushTool, LinkDetectTool};
use crate::parsing;
use crate::profile::{DnsSettings, NetworkProfile};
use crate::traits::{Backend, Interface, WiredInterface, WirelessInterface};
use crate::types::{AccessPoint, DhcpOutcome, Medium};
use crate::{Error, Result};
use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::process::{Child, Command};
use tokio::sync::Mutex;

pub const NAME: &str = "external";

#[derive(Debug)]
pub struct ExternalBackend {
    settings: Arc<BackendSettings>,
}

impl ExternalBackend {
    pub fn new(settings: Arc<BackendSettings>) -> Self {
        Self { settings }
    }
}

impl Backend for ExternalBackend {
    fn name(&self) -> &'static str {
        NAME
    }

    fn description(&self) -> &'static str {
        "Calls ifconfig, iwconfig and friends and parses their output. Slower \
         than the ioctl backend but needs nothing beyond the standard tools."
    }

    fn update_interval(&self) -> Duration {
        Duration::from_secs(5)
    }

    fn wired(&self, iface: &str) -> Arc<dyn WiredInterface> {
        Arc::new(ExternalInterface::new(iface, Medium::Wired, self.settings.clone()))
    }

    fn wireless(&self, iface: &str) -> Arc<dyn WirelessInterface> {
        Arc::new(ExternalInterface::new(iface, Medium::Wireless, self.settings.clone()))
    }
}

/// One network interface driven through external programs.
#[derive(Debug)]
pub struct ExternalInterface {
    name: String,
    medium: Medium,
    settings: Arc<BackendSettings>,
    dhcp: Option<(DhcpClient, PathBuf)>,
    flush_tool: FlushTool,
    link_tool: Option<LinkDetectTool>,
    // The running DHCP client, kept so a cancel can kill it mid-lease.
    dhcp_child: Arc<Mutex<Option<Child>>>,
}

fn resolve_flush_tool(choice: FlushTool, ip_available: bool) -> FlushTool {
    match choice {
        FlushTool::Auto if ip_available => FlushTool::Ip,
        FlushTool::Auto => FlushTool::Route,
        other => other,
    }
}

fn resolve_link_tool(
    choice: LinkDetectTool,
    ethtool_available: bool,
    mii_tool_available: bool,
) -> Option<LinkDetectTool> {
    match choice {
        LinkDetectTool::Auto if ethtool_available => Some(LinkDetectTool::Ethtool),
        LinkDetectTool::Auto if mii_tool_available => Some(LinkDetectTool::MiiTool),
        LinkDetectTool::Auto => None,
        other => Some(other),
    }
}

impl ExternalInterface {
    pub fn new(name: &str, medium: Medium, settings: Arc<BackendSettings>) -> Self {
        let flush_tool = resolve_flush_tool(settings.flush_tool, find_program("ip").is_some());
        let link_tool = match medium {
            Medium::Wired => {
                let tool = resolve_link_tool(
                    settings.link_detect_tool,
                    find_program("ethtool").is_some(),
                    find_program("mii-tool").is_some(),
                );
                if tool.is_none() {
                    tracing::warn!(iface = name, "Neither ethtool nor mii-tool found, cable detection disabled");
                }
                tool
            }
            Medium::Wireless => None,
        };
        let dhcp = DhcpClient::resolve(settings.dhcp_client);
        tracing::debug!(
            iface = name,
            %medium,
            dhcp = ?dhcp.as_ref().map(|(c, _)| c.binary()),
            ?flush_tool,
            ?link_tool,
            "Created external interface"
        );
        Self {
            name: name.to_string(),
            medium,
            settings,
            dhcp,
            flush_tool,
            link_tool,
            dhcp_child: Arc::new(Mutex::new(None)),
        }
    }

    fn flush_command(&self) -> (&'static str, Vec<String>) {
        match self.flush_tool {
            FlushTool::Route => ("route", vec!["del".into(), "dev".into(), self.name.clone()]),
            _ => (
                "ip",
                vec!["route".into(), "flush".into(), "dev".into(), self.name.clone()],
            ),
        }
    }

    /// One echo request whose deadline (whole seconds, at least 1) stays
    /// within a single verification interval.
    fn ping_command(&self, gateway: &str) -> (&'static str, Vec<String>) {
        let deadline = self.settings.verify_ap_interval.as_secs().max(1);
        (
            "ping",
            vec![
                "-q".into(),
                "-w".into(),
                deadline.to_string(),
                "-c".into(),
                "1".into(),
                gateway.to_string(),
            ],
        )
    }

    fn default_route_command(&self, gateway: &str) -> (&'static str, Vec<String>) {
        match self.flush_tool {
            FlushTool::Route => (
                "route",
                vec![
                    "add".into(),
                    "default".into(),
                    "gw".into(),
                    gateway.into(),
                    "dev".into(),
                    self.name.clone(),
                ],
            ),
            _ => (
                "ip",
                vec![
                    "route".into(),
                    "replace".into(),
                    "default".into(),
                    "via".into(),
                    gateway.into(),
                    "dev".into(),
                    self.name.clone(),
                ],
            ),
        }
    }

    async fn ifconfig(&self) -> Option<String> {
        match run_text("ifconfig", [&self.name]).await {
            Ok(out) => Some(out),
            Err(e) => {
                tracing::debug!(iface = %self.name, error = %e, "ifconfig failed");
                None
            }
        }
    }

    async fn iwconfig(&self) -> Option<String> {
        match run_text("iwconfig", [&self.name]).await {
            Ok(out) => Some(out),
            Err(e) => {
                tracing::debug!(iface = %self.name, error = %e, "iwconfig failed");
                None
            }
        }
    }

    async fn settle(&self) {
        tokio::time::sleep(self.settings.link_detect_settle).await;
    }

    async fn ethtool_link(&self) -> bool {
        if !self.is_up().await {
            if let Err(e) = self.up().await {
                tracing::debug!(iface = %self.name, error = %e, "Could not bring interface up for link check");
            }
            self.settle().await;
        }
        run_text("ethtool", [&self.name])
            .await
            .is_ok_and(|out| parsing::ethtool_link_detected(&out))
    }

    async fn mii_tool_link(&self) -> bool {
        let Ok(mut out) = run_text("mii-tool", [&self.name]).await else {
            return false;
        };
        if parsing::mii_tool_invalid_argument(&out) {
            // mii-tool cannot query a down interface.
            if let Err(e) = self.up().await {
                tracing::debug!(iface = %self.name, error = %e, "Could not bring interface up for link check");
            }
            self.settle().await;
            match run_text("mii-tool", [&self.name]).await {
                Ok(retry) => out = retry,
                Err(_) => return false,
            }
        }
        parsing::mii_tool_link_ok(&out)
    }
}

#[async_trait]
impl Interface for ExternalInterface {
    fn name(&self) -> &str {
        &self.name
    }

    async fn up(&self) -> Result<()> {
        run_checked("ifconfig", [self.name.as_str(), "up"]).await
    }

    async fn down(&self) -> Result<()> {
        run_checked("ifconfig", [self.name.as_str(), "down"]).await
    }

    async fn is_up(&self) -> bool {
        self.ifconfig()
            .await
            .is_some_and(|out| parsing::parse_is_up(&out))
    }

    async fn set_address(
        &self,
        ip: Option<&str>,
        netmask: Option<&str>,
        broadcast: Option<&str>,
    ) -> Result<()> {
        let ip = validated_ipv4("ip", ip)?;
        let netmask = validated_ipv4("netmask", netmask)?;
        let broadcast = validated_ipv4("broadcast", broadcast)?;
        if ip.is_none() && netmask.is_none() && broadcast.is_none() {
            return Ok(());
        }

        let mut args = vec![self.name.as_str()];
        if let Some(ip) = ip {
            args.push(ip);
        }
        if let Some(netmask) = netmask {
            args.extend(["netmask", netmask]);
        }
        if let Some(broadcast) = broadcast {
            args.extend(["broadcast", broadcast]);
        }
        run_checked("ifconfig", args).await
    }

    async fn get_ip(&self) -> Option<String> {
        self.ifconfig().await.and_then(|out| parsing::parse_ip(&out))
    }

    async fn start_dhcp(&self, hostname: Option<&str>) -> Result<DhcpOutcome> {
        let Some((client, path)) = &self.dhcp else {
            return Err(Error::CommandFailed("no DHCP client is installed".into()));
        };
        tracing::info!(iface = %self.name, client = client.binary(), "Starting DHCP");

        let mut child = Command::new(path)
            .args(client.start_args(&self.name, hostname))
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;
        let (Some(stdout), Some(stderr)) = (child.stdout.take(), child.stderr.take()) else {
            let _ = child.kill().await;
            return Err(Error::CommandFailed("DHCP client output unavailable".into()));
        };
        *self.dhcp_child.lock().await = Some(child);

        let outcome = read_outcome(*client, stdout, stderr).await;
        tracing::info!(iface = %self.name, outcome = ?outcome, "DHCP finished");

        // Clients daemonise once bound; reap the foreground process.
        if let Some(mut child) = self.dhcp_child.lock().await.take() {
            tokio::spawn(async move {
                let _ = child.wait().await;
            });
        }
        Ok(outcome)
    }

    async fn release_dhcp(&self) -> Result<()> {
        if let Some((client, path)) = &self.dhcp {
            let path = path.to_string_lossy();
            match run_output(&path, client.release_args(&self.name)).await {
                Ok(out) if !out.status.success() => {
                    tracing::debug!(iface = %self.name, status = %out.status, "DHCP release reported failure");
                }
                Ok(_) => {}
                Err(e) => tracing::debug!(iface = %self.name, error = %e, "DHCP release failed"),
            }
        }
        Ok(())
    }

    async fn stop_dhcp(&self) -> Result<()> {
        if let Some(mut child) = self.dhcp_child.lock().await.take() {
            let _ = child.kill().await;
        }
        let _ = run_output("killall", KNOWN_DHCP_BINARIES).await;
        Ok(())
    }

    async fn flush_routes(&self) -> Result<()> {
        let (program, args) = self.flush_command();
        let output = run_output(program, &args).await?;
        if !output.status.success() {
            tracing::debug!(iface = %self.name, program, "Route flush reported failure");
        }
        Ok(())
    }

    async fn set_default_route(&self, gateway: &str) -> Result<()> {
        let Some(gateway) = validated_ipv4("gateway", Some(gateway))? else {
            return Err(Error::InvalidAddress("empty gateway".into()));
        };
        let (program, args) = self.default_route_command(gateway);
        run_checked(program, &args).await
    }

    async fn set_dns(&self, dns: &DnsSettings) -> Result<()> {
        write_resolv_conf(&self.settings.resolv_conf, dns).await
    }

    async fn authenticate(&self, profile: &NetworkProfile) -> Result<()> {
        let config = templates::generate(
            &self.settings.templates_dir,
            &self.settings.networks_dir,
            profile,
            self.medium,
        )
        .await?;
        let driver = match self.medium {
            Medium::Wired => "wired",
            Medium::Wireless => self.settings.wpa_driver.as_str(),
        };
        tracing::info!(iface = %self.name, config = %config.display(), driver, "Starting wpa_supplicant");
        let config = config.to_string_lossy();
        run_checked(
            "wpa_supplicant",
            ["-B", "-i", self.name.as_str(), "-c", &*config, "-D", driver],
        )
        .await
    }

    async fn stop_wpa(&self) -> Result<()> {
        let _ = run_output("wpa_cli", ["-i", self.name.as_str(), "terminate"]).await;
        Ok(())
    }

    async fn wpa_state(&self) -> Option<String> {
        run_text("wpa_cli", ["-i", self.name.as_str(), "status"])
            .await
            .ok()
            .and_then(|out| parsing::parse_wpa_state(&out))
    }

    async fn force_supplicant_scan(&self) -> Result<()> {
        run_checked("wpa_cli", ["-i", self.name.as_str(), "scan"]).await
    }

    async fn check_gateway(&self, gateway: &str) -> bool {
        let (program, args) = self.ping_command(gateway);
        run_output(program, args)
            .await
            .is_ok_and(|out| out.status.success())
    }
}

#[async_trait]
impl WiredInterface for ExternalInterface {
    async fn plugged_in(&self) -> bool {
        match self.link_tool {
            Some(LinkDetectTool::MiiTool) => self.mii_tool_link().await,
            Some(_) => self.ethtool_link().await,
            None => false,
        }
    }
}

#[async_trait]
impl WirelessInterface for ExternalInterface {
    async fn set_essid(&self, essid: &str) -> Result<()> {
        run_checked("iwconfig", [self.name.as_str(), "essid", essid]).await
    }

    async fn set_mode(&self, mode: &str) -> Result<()> {
        let mode = mode.trim().to_lowercase();
        let mode = if mode == "master" { "managed" } else { mode.as_str() };
        run_checked("iwconfig", [self.name.as_str(), "mode", mode]).await
    }

    async fn set_channel(&self, channel: &str) -> Result<()> {
        if channel.is_empty() || !channel.chars().all(|c| c.is_ascii_digit()) {
            return Err(Error::InvalidArgument(format!("channel '{channel}'")));
        }
        run_checked("iwconfig", [self.name.as_str(), "channel", channel]).await
    }

    async fn set_key(&self, key: &str) -> Result<()> {
        run_checked("iwconfig", [self.name.as_str(), "key", key]).await
    }

    async fn associate(&self, essid: &str, channel: Option<u8>, bssid: Option<&str>) -> Result<()> {
        let mut args = vec![self.name.clone(), "essid".into(), essid.to_string()];
        if let Some(channel) = channel {
            args.extend(["channel".into(), channel.to_string()]);
        }
        if let Some(bssid) = bssid.filter(|b| !b.is_empty()) {
            args.extend(["ap".into(), bssid.to_string()]);
        }
        run_checked("iwconfig", &args).await
    }

    async fn generate_psk(&self, essid: &str, key: &str) -> Option<String> {
        if key.is_empty() {
            return None;
        }
        // Passed as argv, so shell metacharacters in the key need no escaping.
        let psk = run_text("wpa_passphrase", [essid, key])
            .await
            .ok()
            .and_then(|out| parsing::parse_psk(&out));
        match psk {
            Some(psk) => Some(psk),
            None => {
                tracing::warn!(iface = %self.name, essid, "wpa_passphrase gave no PSK, using the raw key");
                Some(key.to_string())
            }
        }
    }

    async fn get_networks(&self) -> Result<Vec<AccessPoint>> {
        let output = run_output("iwlist", [self.name.as_str(), "scan"]).await?;
        if !output.status.success() {
            let error_msg = String::from_utf8_lossy(&output.stderr);
            return Err(Error::CommandFailed(format!(
                "iwlist scan failed: {}",
                error_msg.trim()
            )));
        }
        let stdout = String::from_utf8_lossy(&output.stdout);
        let networks = parsing::parse_scan_output(&stdout);
        tracing::debug!(iface = %self.name, count = networks.len(), "Parsed scan results");
        Ok(networks)
    }

    async fn signal_strength(&self) -> Option<i32> {
        self.iwconfig().await.and_then(|out| parsing::parse_quality(&out))
    }

    async fn dbm_strength(&self) -> Option<i32> {
        self.iwconfig().await.and_then(|out| parsing::parse_dbm(&out))
    }

    async fn current_network(&self) -> Option<String> {
        self.iwconfig()
            .await
            .and_then(|out| parsing::parse_current_essid(&out))
    }

    async fn bssid(&self) -> Option<String> {
        self.iwconfig()
            .await
            .and_then(|out| parsing::parse_access_point(&out))
    }

    async fn killswitch_enabled(&self) -> bool {
        self.iwconfig()
            .await
            .is_some_and(|out| parsing::parse_killswitch(&out))
    }

    async fn switch_rfkill(&self) -> Result<bool> {
        let blocked = self.killswitch_enabled().await;
        let action = if blocked { "unblock" } else { "block" };
        run_checked("rfkill", [action, "wifi"]).await?;
        tracing::info!(iface = %self.name, action, "Toggled wireless kill switch");
        Ok(!blocked)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(flush_tool: FlushTool) -> Arc<BackendSettings> {
        let config = crate::config::config_from_toml_str("").unwrap();
        let mut settings = BackendSettings::from(&config);
        settings.flush_tool = flush_tool;
        Arc::new(settings)
    }

    #[test]
    fn test_tool_resolution() {
        assert_eq!(resolve_flush_tool(FlushTool::Auto, true), FlushTool::Ip);
        assert_eq!(resolve_flush_tool(FlushTool::Auto, false), FlushTool::Route);
        assert_eq!(resolve_flush_tool(FlushTool::Route, true), FlushTool::Route);

        assert_eq!(
            resolve_link_tool(LinkDetectTool::Auto, false, true),
            Some(LinkDetectTool::MiiTool)
        );
        assert_eq!(
            resolve_link_tool(LinkDetectTool::Auto, true, true),
            Some(LinkDetectTool::Ethtool)
        );
        assert_eq!(resolve_link_tool(LinkDetectTool::Auto, false, false), None);
    }

    #[test]
    fn test_route_commands() {
        let iface = ExternalInterface::new("eth0", Medium::Wired, settings(FlushTool::Route));
        assert_eq!(
            iface.flush_command(),
            ("route", vec!["del".to_string(), "dev".into(), "eth0".into()])
        );
        let (program, args) = iface.default_route_command("10.0.0.1");
        assert_eq!(program, "route");
        assert_eq!(args.join(" "), "add default gw 10.0.0.1 dev eth0");

        let iface = ExternalInterface::new("eth0", Medium::Wired, settings(FlushTool::Ip));
        assert_eq!(iface.flush_command().1.join(" "), "route flush dev eth0");
        assert_eq!(
            iface.default_route_command("10.0.0.1").1.join(" "),
            "route replace default via 10.0.0.1 dev eth0"
        );
    }

    #[test]
    fn test_gateway_ping_fits_verify_interval() {
        let iface = ExternalInterface::new("wlan0", Medium::Wireless, settings(FlushTool::Ip));
        let (program, args) = iface.ping_command("192.168.1.1");
        assert_eq!(program, "ping");
        assert_eq!(args.join(" "), "-q -w 1 -c 1 192.168.1.1");

        let mut slow = BackendSettings::from(&crate::config::config_from_toml_str("").unwrap());
        slow.verify_ap_interval = Duration::from_secs(4);
        let iface = ExternalInterface::new("wlan0", Medium::Wireless, Arc::new(slow));
        assert_eq!(iface.ping_command("10.0.0.1").1[2], "4");
    }

    #[tokio::test]
    async fn test_invalid_input_rejected_before_running_anything() {
        let iface = ExternalInterface::new("wlan0", Medium::Wireless, settings(FlushTool::Ip));
        assert!(matches!(
            iface.set_address(Some("10.0.0.5"), Some("255.255.255.300"), None).await,
            Err(Error::InvalidAddress(_))
        ));
        assert!(matches!(
            iface.set_default_route("gateway").await,
            Err(Error::InvalidAddress(_))
        ));
        assert!(matches!(
            iface.set_channel("6a").await,
            Err(Error::InvalidArgument(_))
        ));
        // Nothing to set is a no-op, not a command.
        assert!(iface.set_address(None, Some(""), None).await.is_ok());
    }
}
