use crate::Result;
use crate::profile::{DnsSettings, NetworkProfile};
use crate::types::{AccessPoint, DhcpOutcome};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

// Capabilities every backend must offer. Controllers and the connection
// engine only ever see these traits, never a concrete backend type.

/// Operations shared by wired and wireless interfaces.
///
/// Query methods that read OS state return `Option`/`bool` rather than
/// `Result`: a failed read is reported as "unknown" and never aborts the
/// caller.
#[async_trait]
pub trait Interface: Send + Sync {
    /// Kernel name of the interface, e.g. `wlan0`.
    fn name(&self) -> &str;

    async fn up(&self) -> Result<()>;

    async fn down(&self) -> Result<()>;

    async fn is_up(&self) -> bool;

    /// Sets any of address, netmask and broadcast. Empty values are skipped.
    ///
    /// Every supplied value is validated as dotted-quad IPv4 before anything
    /// runs, so a bad field never leaves the interface half-configured.
    async fn set_address(
        &self,
        ip: Option<&str>,
        netmask: Option<&str>,
        broadcast: Option<&str>,
    ) -> Result<()>;

    async fn get_ip(&self) -> Option<String>;

    /// Runs the DHCP client to completion and classifies its output.
    async fn start_dhcp(&self, hostname: Option<&str>) -> Result<DhcpOutcome>;

    async fn release_dhcp(&self) -> Result<()>;

    /// Kills the DHCP client started by `start_dhcp`, plus any stray clients.
    async fn stop_dhcp(&self) -> Result<()>;

    async fn flush_routes(&self) -> Result<()>;

    async fn set_default_route(&self, gateway: &str) -> Result<()>;

    async fn set_dns(&self, dns: &DnsSettings) -> Result<()>;

    /// Writes the supplicant config for `profile` and starts the supplicant.
    async fn authenticate(&self, profile: &NetworkProfile) -> Result<()>;

    async fn stop_wpa(&self) -> Result<()>;

    /// Current supplicant state (`COMPLETED`, `SCANNING`, ...), if any.
    async fn wpa_state(&self) -> Option<String>;

    async fn force_supplicant_scan(&self) -> Result<()>;

    /// One ping to the gateway.
    async fn check_gateway(&self, gateway: &str) -> bool;
}

#[async_trait]
pub trait WiredInterface: Interface {
    /// Whether a cable is connected.
    async fn plugged_in(&self) -> bool;
}

#[async_trait]
pub trait WirelessInterface: Interface {
    async fn set_essid(&self, essid: &str) -> Result<()>;

    /// `master` is accepted and treated as `managed`.
    async fn set_mode(&self, mode: &str) -> Result<()>;

    async fn set_channel(&self, channel: &str) -> Result<()>;

    async fn set_key(&self, key: &str) -> Result<()>;

    async fn associate(&self, essid: &str, channel: Option<u8>, bssid: Option<&str>) -> Result<()>;

    /// Derives the hex PSK for a passphrase.
    async fn generate_psk(&self, essid: &str, key: &str) -> Option<String>;

    /// Raw scan, deduplicated but unsorted.
    async fn get_networks(&self) -> Result<Vec<AccessPoint>>;

    /// Link quality as a percentage.
    async fn signal_strength(&self) -> Option<i32>;

    async fn dbm_strength(&self) -> Option<i32>;

    async fn current_network(&self) -> Option<String>;

    async fn bssid(&self) -> Option<String>;

    async fn killswitch_enabled(&self) -> bool;

    /// Toggles the radio kill switch and returns the new "blocked" state.
    async fn switch_rfkill(&self) -> Result<bool>;
}

/// A family of interface implementations.
pub trait Backend: Send + Sync {
    fn name(&self) -> &'static str;

    fn description(&self) -> &'static str;

    /// How often the monitor should poll interfaces from this backend.
    fn update_interval(&self) -> Duration;

    fn wired(&self, iface: &str) -> Arc<dyn WiredInterface>;

    fn wireless(&self, iface: &str) -> Arc<dyn WirelessInterface>;
}
