use serde::{Deserialize, Serialize};
use std::fmt;

/// Essid reported by scanners for networks that conceal their name.
pub const HIDDEN_ESSID: &str = "<hidden>";

/// Signal value used when a scan record carries no readable signal at all.
pub const SIGNAL_UNKNOWN: i32 = 101;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EncryptionMethod {
    #[serde(rename = "WEP")]
    Wep,
    #[serde(rename = "WPA")]
    Wpa,
    #[serde(rename = "WPA2")]
    Wpa2,
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Encryption {
    pub enabled: bool,
    pub method: EncryptionMethod,
}

impl Encryption {
    pub const NONE: Encryption = Encryption {
        enabled: false,
        method: EncryptionMethod::None,
    };
}

/// One access point found during a wireless scan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccessPoint {
    pub essid: String,
    pub hidden: bool,
    pub bssid: String,
    pub channel: Option<u8>,
    pub mode: String,
    pub encryption: Encryption,
    /// Normalised link quality, 0 to 100.
    pub quality: Option<i32>,
    /// Raw received power in dBm.
    pub strength: Option<i32>,
    pub bitrates: Vec<String>,
}

impl AccessPoint {
    /// The value used for ordering and display: quality when known, else dBm.
    pub fn signal(&self) -> i32 {
        self.quality.or(self.strength).unwrap_or(SIGNAL_UNKNOWN)
    }
}

/// Which kind of link a controller or attempt is responsible for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Medium {
    Wired,
    Wireless,
}

impl fmt::Display for Medium {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Medium::Wired => f.write_str("wired"),
            Medium::Wireless => f.write_str("wireless"),
        }
    }
}

/// The pipeline step an attempt is currently executing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectStatus {
    InterfaceDown,
    ResettingIpAddress,
    RemovingOldConnection,
    FlushingRoutingTable,
    ConfiguringInterface,
    InterfaceUp,
    GeneratingPsk,
    GeneratingWpaConfig,
    Associate,
    ValidatingAuthentication,
    SettingBroadcastAddress,
    SettingStaticIp,
    RunningDhcp,
    SettingStaticDns,
    VerifyingAssociation,
    Done,
}

impl ConnectStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectStatus::InterfaceDown => "interface_down",
            ConnectStatus::ResettingIpAddress => "resetting_ip_address",
            ConnectStatus::RemovingOldConnection => "removing_old_connection",
            ConnectStatus::FlushingRoutingTable => "flushing_routing_table",
            ConnectStatus::ConfiguringInterface => "configuring_interface",
            ConnectStatus::InterfaceUp => "interface_up",
            ConnectStatus::GeneratingPsk => "generating_psk",
            ConnectStatus::GeneratingWpaConfig => "generating_wpa_config",
            ConnectStatus::Associate => "associate",
            ConnectStatus::ValidatingAuthentication => "validating_authentication",
            ConnectStatus::SettingBroadcastAddress => "setting_broadcast_address",
            ConnectStatus::SettingStaticIp => "setting_static_ip",
            ConnectStatus::RunningDhcp => "running_dhcp",
            ConnectStatus::SettingStaticDns => "setting_static_dns",
            ConnectStatus::VerifyingAssociation => "verifying_association",
            ConnectStatus::Done => "done",
        }
    }
}

impl fmt::Display for ConnectStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal outcome of a connection attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectResult {
    Success,
    DhcpFailed,
    NoDhcpOffers,
    AssociationFailed,
    BadPass,
    Aborted,
}

impl ConnectResult {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectResult::Success => "success",
            ConnectResult::DhcpFailed => "dhcp_failed",
            ConnectResult::NoDhcpOffers => "no_dhcp_offers",
            ConnectResult::AssociationFailed => "association_failed",
            ConnectResult::BadPass => "bad_pass",
            ConnectResult::Aborted => "aborted",
        }
    }
}

impl fmt::Display for ConnectResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a DHCP client run produced, decided from the client's own output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DhcpOutcome {
    Success,
    DhcpFailed,
    NoDhcpOffers,
}

impl DhcpOutcome {
    /// The attempt result a failed DHCP run terminates with.
    pub fn failure(&self) -> Option<ConnectResult> {
        match self {
            DhcpOutcome::Success => None,
            DhcpOutcome::DhcpFailed => Some(ConnectResult::DhcpFailed),
            DhcpOutcome::NoDhcpOffers => Some(ConnectResult::NoDhcpOffers),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    NotConnected,
    Connecting,
    Wired,
    Wireless,
    Suspended,
}

/// How the current wireless signal is read and reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalDisplay {
    #[default]
    Percent,
    Dbm,
}

/// A handle into one specific scan result.
///
/// The generation pins the handle to the snapshot it was read from, so a
/// rescan between listing and connecting is detected instead of silently
/// connecting to whatever now sits at `index`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkId {
    pub generation: u64,
    pub index: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_names_match_serde() {
        let json = serde_json::to_string(&ConnectStatus::ValidatingAuthentication).unwrap();
        assert_eq!(json, "\"validating_authentication\"");
        assert_eq!(
            ConnectStatus::ValidatingAuthentication.as_str(),
            "validating_authentication"
        );

        let json = serde_json::to_string(&ConnectResult::NoDhcpOffers).unwrap();
        assert_eq!(json, "\"no_dhcp_offers\"");
    }

    #[test]
    fn test_dhcp_outcome_failure_mapping() {
        assert_eq!(DhcpOutcome::Success.failure(), None);
        assert_eq!(
            DhcpOutcome::DhcpFailed.failure(),
            Some(ConnectResult::DhcpFailed)
        );
        assert_eq!(
            DhcpOutcome::NoDhcpOffers.failure(),
            Some(ConnectResult::NoDhcpOffers)
        );
    }
}
