// Backend: ioctl
// Answers the frequently polled queries (link state, address, signal,
// current network) with direct socket ioctls and hands everything else,
// including any ioctl that fails, to the external backend.

mod sys;

use super::BackendSettings;
use super::external::ExternalInterface;
use crate::profile::{DnsSettings, NetworkProfile};
use crate::traits::{Backend, Interface, WiredInterface, WirelessInterface};
use crate::types::{AccessPoint, DhcpOutcome, Medium};
use crate::Result;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use sys::IoctlSocket;

pub const NAME: &str = "ioctl";

#[derive(Debug)]
pub struct IoctlBackend {
    settings: Arc<BackendSettings>,
}

impl IoctlBackend {
    pub fn new(settings: Arc<BackendSettings>) -> Self {
        Self { settings }
    }
}

impl Backend for IoctlBackend {
    fn name(&self) -> &'static str {
        NAME
    }

    fn description(&self) -> &'static str {
        "Queries interfaces with ioctl calls where possible and falls back to \
         external programs for everything else. Lighter on CPU than the \
         external backend."
    }

    fn update_interval(&self) -> Duration {
        Duration::from_secs(3)
    }

    fn wired(&self, iface: &str) -> Arc<dyn WiredInterface> {
        Arc::new(IoctlInterface::new(iface, Medium::Wired, self.settings.clone()))
    }

    fn wireless(&self, iface: &str) -> Arc<dyn WirelessInterface> {
        Arc::new(IoctlInterface::new(iface, Medium::Wireless, self.settings.clone()))
    }
}

#[derive(Debug)]
pub struct IoctlInterface {
    fallback: ExternalInterface,
    socket: Option<IoctlSocket>,
}

impl IoctlInterface {
    pub fn new(name: &str, medium: Medium, settings: Arc<BackendSettings>) -> Self {
        let socket = match IoctlSocket::open() {
            Ok(socket) => Some(socket),
            Err(e) => {
                tracing::warn!(iface = name, error = %e, "Cannot open ioctl socket, using external tools only");
                None
            }
        };
        Self {
            fallback: ExternalInterface::new(name, medium, settings),
            socket,
        }
    }

    /// Runs `op` against the socket, logging and returning `None` on failure
    /// so the caller can fall back.
    fn try_ioctl<T>(
        &self,
        what: &'static str,
        op: impl FnOnce(&IoctlSocket, &str) -> std::io::Result<T>,
    ) -> Option<T> {
        let socket = self.socket.as_ref()?;
        match op(socket, self.fallback.name()) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::debug!(iface = self.fallback.name(), what, error = %e, "ioctl failed, falling back");
                None
            }
        }
    }
}

#[async_trait]
impl Interface for IoctlInterface {
    fn name(&self) -> &str {
        self.fallback.name()
    }

    async fn up(&self) -> Result<()> {
        match self.try_ioctl("SIOCSIFFLAGS", |s, i| s.set_up(i, true)) {
            Some(()) => Ok(()),
            None => self.fallback.up().await,
        }
    }

    async fn down(&self) -> Result<()> {
        match self.try_ioctl("SIOCSIFFLAGS", |s, i| s.set_up(i, false)) {
            Some(()) => Ok(()),
            None => self.fallback.down().await,
        }
    }

    async fn is_up(&self) -> bool {
        match self.try_ioctl("SIOCGIFFLAGS", |s, i| s.is_up(i)) {
            Some(up) => up,
            None => self.fallback.is_up().await,
        }
    }

    async fn set_address(
        &self,
        ip: Option<&str>,
        netmask: Option<&str>,
        broadcast: Option<&str>,
    ) -> Result<()> {
        self.fallback.set_address(ip, netmask, broadcast).await
    }

    async fn get_ip(&self) -> Option<String> {
        match self.try_ioctl("SIOCGIFADDR", |s, i| s.ipv4(i)) {
            Some(ip) => Some(ip.to_string()),
            None => self.fallback.get_ip().await,
        }
    }

    async fn start_dhcp(&self, hostname: Option<&str>) -> Result<DhcpOutcome> {
        self.fallback.start_dhcp(hostname).await
    }

    async fn release_dhcp(&self) -> Result<()> {
        self.fallback.release_dhcp().await
    }

    async fn stop_dhcp(&self) -> Result<()> {
        self.fallback.stop_dhcp().await
    }

    async fn flush_routes(&self) -> Result<()> {
        self.fallback.flush_routes().await
    }

    async fn set_default_route(&self, gateway: &str) -> Result<()> {
        self.fallback.set_default_route(gateway).await
    }

    async fn set_dns(&self, dns: &DnsSettings) -> Result<()> {
        self.fallback.set_dns(dns).await
    }

    async fn authenticate(&self, profile: &NetworkProfile) -> Result<()> {
        self.fallback.authenticate(profile).await
    }

    async fn stop_wpa(&self) -> Result<()> {
        self.fallback.stop_wpa().await
    }

    async fn wpa_state(&self) -> Option<String> {
        self.fallback.wpa_state().await
    }

    async fn force_supplicant_scan(&self) -> Result<()> {
        self.fallback.force_supplicant_scan().await
    }

    async fn check_gateway(&self, gateway: &str) -> bool {
        self.fallback.check_gateway(gateway).await
    }
}

#[async_trait]
impl WiredInterface for IoctlInterface {
    async fn plugged_in(&self) -> bool {
        // The link bit is only meaningful once the interface is up.
        if !self.is_up().await {
            if let Err(e) = self.up().await {
                tracing::debug!(iface = self.name(), error = %e, "Could not bring interface up for link check");
            }
        }
        let link = self
            .try_ioctl("SIOCETHTOOL", |s, i| s.ethtool_link(i))
            .or_else(|| self.try_ioctl("SIOCGMIIREG", |s, i| s.mii_link(i)));
        match link {
            Some(link) => link,
            None => self.fallback.plugged_in().await,
        }
    }
}

#[async_trait]
impl WirelessInterface for IoctlInterface {
    async fn set_essid(&self, essid: &str) -> Result<()> {
        self.fallback.set_essid(essid).await
    }

    async fn set_mode(&self, mode: &str) -> Result<()> {
        self.fallback.set_mode(mode).await
    }

    async fn set_channel(&self, channel: &str) -> Result<()> {
        self.fallback.set_channel(channel).await
    }

    async fn set_key(&self, key: &str) -> Result<()> {
        self.fallback.set_key(key).await
    }

    async fn associate(&self, essid: &str, channel: Option<u8>, bssid: Option<&str>) -> Result<()> {
        self.fallback.associate(essid, channel, bssid).await
    }

    async fn generate_psk(&self, essid: &str, key: &str) -> Option<String> {
        self.fallback.generate_psk(essid, key).await
    }

    async fn get_networks(&self) -> Result<Vec<AccessPoint>> {
        self.fallback.get_networks().await
    }

    async fn signal_strength(&self) -> Option<i32> {
        let quality = self.try_ioctl("SIOCGIWSTATS", |s, i| s.iw_stats(i));
        match quality {
            Some((quality, _)) => {
                let max = self
                    .try_ioctl("SIOCGIWRANGE", |s, i| s.iw_max_quality(i))
                    .unwrap_or(0);
                Some(sys::quality_percent(quality, max))
            }
            None => self.fallback.signal_strength().await,
        }
    }

    async fn dbm_strength(&self) -> Option<i32> {
        match self.try_ioctl("SIOCGIWSTATS", |s, i| s.iw_stats(i)) {
            Some((_, level)) => Some(sys::level_to_dbm(level)),
            None => self.fallback.dbm_strength().await,
        }
    }

    async fn current_network(&self) -> Option<String> {
        match self.try_ioctl("SIOCGIWESSID", |s, i| s.iw_essid(i)) {
            Some(essid) if !essid.is_empty() => Some(essid),
            Some(_) => None,
            None => self.fallback.current_network().await,
        }
    }

    async fn bssid(&self) -> Option<String> {
        match self.try_ioctl("SIOCGIWAP", |s, i| s.iw_ap(i)) {
            Some(mac) => Some(sys::format_mac(&mac)),
            None => self.fallback.bssid().await,
        }
    }

    async fn killswitch_enabled(&self) -> bool {
        self.fallback.killswitch_enabled().await
    }

    async fn switch_rfkill(&self) -> Result<bool> {
        self.fallback.switch_rfkill().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> Arc<BackendSettings> {
        let config = crate::config::config_from_toml_str("").unwrap();
        Arc::new(BackendSettings::from(&config))
    }

    #[tokio::test]
    async fn test_missing_interface_reads_as_unknown() {
        let iface = IoctlInterface::new("np-missing0", Medium::Wireless, settings());
        assert_eq!(iface.name(), "np-missing0");
        assert_eq!(iface.get_ip().await, None);
        assert_eq!(iface.current_network().await, None);
        assert!(!iface.is_up().await);
    }

    #[tokio::test]
    async fn test_validation_still_applies_through_fallback() {
        let iface = IoctlInterface::new("np-missing0", Medium::Wired, settings());
        assert!(matches!(
            iface.set_address(Some("1.2.3"), None, None).await,
            Err(crate::Error::InvalidAddress(_))
        ));
    }
}
