use crate::Result;
use crate::backends::utils::validated_ipv4;
use crate::profile::{DnsSettings, NetworkProfile};
use crate::traits::{Backend, Interface, WiredInterface, WirelessInterface};
use crate::types::{AccessPoint, DhcpOutcome, Encryption, EncryptionMethod};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

pub const NAME: &str = "mock";

/// Scriptable state behind one mock interface.
///
/// Every trait call is appended to `calls` so tests can assert on the exact
/// sequence of operations a pipeline performed.
#[derive(Debug, Clone)]
pub struct MockState {
    pub calls: Vec<String>,
    pub up: bool,
    pub ip: Option<String>,
    pub plugged: bool,
    pub dhcp_outcome: DhcpOutcome,
    pub dhcp_delay: Duration,
    pub dhcp_ip: Option<String>,
    /// Successive answers to `wpa_state`. The last entry repeats forever.
    pub wpa_states: VecDeque<String>,
    pub gateway_reachable: bool,
    pub networks: Vec<AccessPoint>,
    pub signal: Option<i32>,
    pub dbm: Option<i32>,
    pub current_network: Option<String>,
    pub bssid: Option<String>,
    pub killswitch: bool,
    pub last_profile: Option<NetworkProfile>,
    pub last_dns: Option<DnsSettings>,
}

impl Default for MockState {
    fn default() -> Self {
        Self {
            calls: Vec::new(),
            up: false,
            ip: None,
            plugged: false,
            dhcp_outcome: DhcpOutcome::Success,
            dhcp_delay: Duration::ZERO,
            dhcp_ip: Some("192.168.1.50".into()),
            wpa_states: VecDeque::from(["COMPLETED".to_string()]),
            gateway_reachable: true,
            networks: Vec::new(),
            signal: Some(70),
            dbm: Some(-60),
            current_network: None,
            bssid: None,
            killswitch: false,
            last_profile: None,
            last_dns: None,
        }
    }
}

/// Shared handle to a [`MockState`]; clones observe the same state.
#[derive(Debug, Clone, Default)]
pub struct MockHandle(Arc<Mutex<MockState>>);

impl MockHandle {
    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.0.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn with<R>(&self, f: impl FnOnce(&mut MockState) -> R) -> R {
        f(&mut self.lock())
    }

    pub fn calls(&self) -> Vec<String> {
        self.lock().calls.clone()
    }

    /// Whether any recorded call starts with `prefix`.
    pub fn called(&self, prefix: &str) -> bool {
        self.lock().calls.iter().any(|c| c.starts_with(prefix))
    }

    pub fn clear_calls(&self) {
        self.lock().calls.clear();
    }

    fn record(&self, call: impl Into<String>) {
        self.lock().calls.push(call.into());
    }
}

fn demo_networks() -> Vec<AccessPoint> {
    let ap = |essid: &str, bssid: &str, channel: u8, quality: i32, method: EncryptionMethod| {
        AccessPoint {
            essid: essid.to_string(),
            hidden: false,
            bssid: bssid.to_string(),
            channel: Some(channel),
            mode: "Master".to_string(),
            encryption: Encryption {
                enabled: method != EncryptionMethod::None,
                method,
            },
            quality: Some(quality),
            strength: Some(quality / 2 - 100),
            bitrates: vec!["54 Mb/s".to_string()],
        }
    };
    vec![
        ap("MyHomeWiFi", "02:00:00:00:00:01", 6, 95, EncryptionMethod::Wpa2),
        ap("CafeGuest", "02:00:00:00:00:02", 11, 78, EncryptionMethod::None),
        ap("Neighbor", "02:00:00:00:00:03", 1, 55, EncryptionMethod::Wpa),
    ]
}

/// In-memory backend with no hardware access.
#[derive(Debug)]
pub struct MockBackend {
    wired: MockHandle,
    wireless: MockHandle,
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MockBackend {
    pub fn new() -> Self {
        let wireless = MockHandle::default();
        wireless.with(|s| s.networks = demo_networks());
        Self {
            wired: MockHandle::default(),
            wireless,
        }
    }

    pub fn wired_state(&self) -> MockHandle {
        self.wired.clone()
    }

    pub fn wireless_state(&self) -> MockHandle {
        self.wireless.clone()
    }
}

impl Backend for MockBackend {
    fn name(&self) -> &'static str {
        NAME
    }

    fn description(&self) -> &'static str {
        "Simulated interfaces for development and tests."
    }

    fn update_interval(&self) -> Duration {
        Duration::from_secs(1)
    }

    fn wired(&self, iface: &str) -> Arc<dyn WiredInterface> {
        Arc::new(MockInterface::new(iface, self.wired.clone()))
    }

    fn wireless(&self, iface: &str) -> Arc<dyn WirelessInterface> {
        Arc::new(MockInterface::new(iface, self.wireless.clone()))
    }
}

#[derive(Debug)]
pub struct MockInterface {
    name: String,
    state: MockHandle,
}

impl MockInterface {
    pub fn new(name: &str, state: MockHandle) -> Self {
        Self {
            name: name.to_string(),
            state,
        }
    }
}

#[async_trait]
impl Interface for MockInterface {
    fn name(&self) -> &str {
        &self.name
    }

    async fn up(&self) -> Result<()> {
        self.state.record("up");
        self.state.with(|s| s.up = true);
        Ok(())
    }

    async fn down(&self) -> Result<()> {
        self.state.record("down");
        self.state.with(|s| s.up = false);
        Ok(())
    }

    async fn is_up(&self) -> bool {
        self.state.with(|s| s.up)
    }

    async fn set_address(
        &self,
        ip: Option<&str>,
        netmask: Option<&str>,
        broadcast: Option<&str>,
    ) -> Result<()> {
        let ip = validated_ipv4("ip", ip)?;
        validated_ipv4("netmask", netmask)?;
        let broadcast = validated_ipv4("broadcast", broadcast)?;
        if let Some(ip) = ip {
            self.state.record(format!("set_address {ip}"));
            self.state.with(|s| {
                s.ip = (ip != "0.0.0.0").then(|| ip.to_string());
            });
        }
        if let Some(broadcast) = broadcast {
            self.state.record(format!("set_broadcast {broadcast}"));
        }
        Ok(())
    }

    async fn get_ip(&self) -> Option<String> {
        self.state.with(|s| s.ip.clone())
    }

    async fn start_dhcp(&self, _hostname: Option<&str>) -> Result<DhcpOutcome> {
        self.state.record("start_dhcp");
        let delay = self.state.with(|s| s.dhcp_delay);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        Ok(self.state.with(|s| {
            if s.dhcp_outcome == DhcpOutcome::Success {
                s.ip = s.dhcp_ip.clone();
            }
            s.dhcp_outcome
        }))
    }

    async fn release_dhcp(&self) -> Result<()> {
        self.state.record("release_dhcp");
        Ok(())
    }

    async fn stop_dhcp(&self) -> Result<()> {
        self.state.record("stop_dhcp");
        Ok(())
    }

    async fn flush_routes(&self) -> Result<()> {
        self.state.record("flush_routes");
        Ok(())
    }

    async fn set_default_route(&self, gateway: &str) -> Result<()> {
        validated_ipv4("gateway", Some(gateway))?;
        self.state.record(format!("set_default_route {gateway}"));
        Ok(())
    }

    async fn set_dns(&self, dns: &DnsSettings) -> Result<()> {
        self.state.record("set_dns");
        self.state.with(|s| s.last_dns = Some(dns.clone()));
        Ok(())
    }

    async fn authenticate(&self, profile: &NetworkProfile) -> Result<()> {
        self.state.record("authenticate");
        self.state.with(|s| s.last_profile = Some(profile.clone()));
        Ok(())
    }

    async fn stop_wpa(&self) -> Result<()> {
        self.state.record("stop_wpa");
        Ok(())
    }

    async fn wpa_state(&self) -> Option<String> {
        self.state.with(|s| {
            if s.wpa_states.len() > 1 {
                s.wpa_states.pop_front()
            } else {
                s.wpa_states.front().cloned()
            }
        })
    }

    async fn force_supplicant_scan(&self) -> Result<()> {
        self.state.record("force_supplicant_scan");
        Ok(())
    }

    async fn check_gateway(&self, gateway: &str) -> bool {
        self.state.record(format!("check_gateway {gateway}"));
        self.state.with(|s| s.gateway_reachable)
    }
}

#[async_trait]
impl WiredInterface for MockInterface {
    async fn plugged_in(&self) -> bool {
        self.state.with(|s| s.plugged)
    }
}

#[async_trait]
impl WirelessInterface for MockInterface {
    async fn set_essid(&self, essid: &str) -> Result<()> {
        self.state.record(format!("set_essid {essid}"));
        Ok(())
    }

    async fn set_mode(&self, mode: &str) -> Result<()> {
        self.state.record(format!("set_mode {mode}"));
        Ok(())
    }

    async fn set_channel(&self, channel: &str) -> Result<()> {
        self.state.record(format!("set_channel {channel}"));
        Ok(())
    }

    async fn set_key(&self, _key: &str) -> Result<()> {
        self.state.record("set_key");
        Ok(())
    }

    async fn associate(&self, essid: &str, channel: Option<u8>, bssid: Option<&str>) -> Result<()> {
        self.state.record(format!("associate {essid}"));
        if let Some(channel) = channel {
            self.state.record(format!("set_channel {channel}"));
        }
        self.state.with(|s| {
            s.current_network = Some(essid.to_string());
            s.bssid = bssid.map(str::to_string);
        });
        Ok(())
    }

    async fn generate_psk(&self, essid: &str, key: &str) -> Option<String> {
        self.state.record("generate_psk");
        Some(format!("{:x}{:x}", essid.len(), key.len()).repeat(8))
    }

    async fn get_networks(&self) -> Result<Vec<AccessPoint>> {
        self.state.record("get_networks");
        Ok(self.state.with(|s| s.networks.clone()))
    }

    async fn signal_strength(&self) -> Option<i32> {
        self.state.with(|s| s.signal)
    }

    async fn dbm_strength(&self) -> Option<i32> {
        self.state.with(|s| s.dbm)
    }

    async fn current_network(&self) -> Option<String> {
        self.state.with(|s| s.current_network.clone())
    }

    async fn bssid(&self) -> Option<String> {
        self.state.with(|s| s.bssid.clone())
    }

    async fn killswitch_enabled(&self) -> bool {
        self.state.with(|s| s.killswitch)
    }

    async fn switch_rfkill(&self) -> Result<bool> {
        self.state.record("switch_rfkill");
        Ok(self.state.with(|s| {
            s.killswitch = !s.killswitch;
            s.killswitch
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_up_down_are_idempotent() {
        let backend = MockBackend::new();
        let iface = backend.wired("eth0");
        iface.up().await.unwrap();
        iface.up().await.unwrap();
        assert!(iface.is_up().await);
        iface.down().await.unwrap();
        iface.down().await.unwrap();
        assert!(!iface.is_up().await);
        assert_eq!(backend.wired_state().calls(), vec!["up", "up", "down", "down"]);
    }

    #[tokio::test]
    async fn test_interfaces_share_state_per_medium() {
        let backend = MockBackend::new();
        let a = backend.wireless("wlan0");
        let b = backend.wireless("wlan0");
        a.associate("home", Some(6), Some("02:00:00:00:00:01")).await.unwrap();
        assert_eq!(b.current_network().await.as_deref(), Some("home"));
        assert!(backend.wired_state().calls().is_empty());
    }

    #[tokio::test]
    async fn test_wpa_states_repeat_last() {
        let backend = MockBackend::new();
        backend.wireless_state().with(|s| {
            s.wpa_states = VecDeque::from(["SCANNING".to_string(), "COMPLETED".to_string()]);
        });
        let iface = backend.wireless("wlan0");
        assert_eq!(iface.wpa_state().await.as_deref(), Some("SCANNING"));
        assert_eq!(iface.wpa_state().await.as_deref(), Some("COMPLETED"));
        assert_eq!(iface.wpa_state().await.as_deref(), Some("COMPLETED"));
    }

    #[tokio::test]
    async fn test_dhcp_assigns_address_and_zero_clears_it() {
        let backend = MockBackend::new();
        let iface = backend.wired("eth0");
        assert_eq!(iface.start_dhcp(None).await.unwrap(), DhcpOutcome::Success);
        assert_eq!(iface.get_ip().await.as_deref(), Some("192.168.1.50"));
        iface.set_address(Some("0.0.0.0"), None, None).await.unwrap();
        assert_eq!(iface.get_ip().await, None);
        assert!(iface.set_address(Some("bogus"), None, None).await.is_err());
    }
}
