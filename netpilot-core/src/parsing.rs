//! Parsers for the text output of the wireless and network tools.
//!
//! Everything here is pure string processing so it can be tested against
//! captured output without touching the host.

use crate::types::{AccessPoint, Encryption, EncryptionMethod, HIDDEN_ESSID, SIGNAL_UNKNOWN};
use once_cell::sync::Lazy;
use regex::Regex;

fn compile(pattern: &str) -> Regex {
    // Only ever called with the literal patterns below.
    Regex::new(pattern).unwrap_or_else(|e| panic!("invalid built-in pattern {pattern}: {e}"))
}

static ESSID: Lazy<Regex> = Lazy::new(|| compile(r#"(?is)ESSID:"(.*?)"\n"#));
static CURRENT_ESSID: Lazy<Regex> = Lazy::new(|| compile(r#"(?is)ESSID:"(.*?)""#));
static AP_MAC: Lazy<Regex> = Lazy::new(|| compile(r"(?is)Address: (.*?)\n"));
static ACCESS_POINT: Lazy<Regex> =
    Lazy::new(|| compile(r"(?i)Access Point:\s*((?:[0-9A-F]{2}:){5}[0-9A-F]{2})"));
static CHANNEL: Lazy<Regex> = Lazy::new(|| compile(r"(?is)Channel:? ?(\d\d?)"));
static QUALITY: Lazy<Regex> = Lazy::new(|| compile(r"(?is)Quality:?=? ?(\d+)\s*/?\s*(\d*)"));
static SIGNAL_LEVEL: Lazy<Regex> = Lazy::new(|| compile(r"(?is)Signal level:?=? ?(\d\d*)"));
static SIGNAL_DBM: Lazy<Regex> = Lazy::new(|| compile(r"(?is)Signal level:?=? ?(-\d\d*)"));
static MODE: Lazy<Regex> = Lazy::new(|| compile(r"(?is)Mode:(.*?)\n"));
static FREQUENCY: Lazy<Regex> = Lazy::new(|| compile(r"(?is)Frequency:(.*?)\n"));
static ENCRYPTION_KEY: Lazy<Regex> = Lazy::new(|| compile(r"(?is)Encryption key:(.*?)\n"));
static WPA1: Lazy<Regex> = Lazy::new(|| compile(r"(?i)WPA Version 1"));
static WPA_IE: Lazy<Regex> = Lazy::new(|| compile(r"(?i)wpa_ie"));
static WPA2: Lazy<Regex> = Lazy::new(|| compile(r"(?i)WPA2"));
static WPA_STATE: Lazy<Regex> = Lazy::new(|| compile(r"(?is)wpa_state=(.*?)\n"));
static RADIO_OFF: Lazy<Regex> = Lazy::new(|| compile(r"(?i)radio off"));
static IP: Lazy<Regex> =
    Lazy::new(|| compile(r"inet (?:[Aa]d?dr[^.\d]*:)?\s*(\d{1,3}(?:\.\d{1,3}){3})"));
static IS_UP: Lazy<Regex> = Lazy::new(|| compile(r"(?:<|,|\s)UP(?:\s|,|>)"));
static PSK: Lazy<Regex> = Lazy::new(|| compile(r"(?s)network=\{.*?\spsk=(.*?)\n\}"));
static LINK_DETECTED: Lazy<Regex> = Lazy::new(|| compile(r"(?i)Link detected: yes"));
static INVALID_ARGUMENT: Lazy<Regex> = Lazy::new(|| compile(r"(?i)Invalid argument"));
static LINK_OK: Lazy<Regex> = Lazy::new(|| compile(r"(?i)link ok"));

fn capture<'a>(re: &Regex, text: &'a str) -> Option<&'a str> {
    re.captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
}

/// Maps a 2.4 GHz centre frequency such as `2.437 GHz` to its channel.
pub fn freq_to_channel(freq: &str) -> Option<u8> {
    let channel = match freq.trim() {
        "2.412 GHz" => 1,
        "2.417 GHz" => 2,
        "2.422 GHz" => 3,
        "2.427 GHz" => 4,
        "2.432 GHz" => 5,
        "2.437 GHz" => 6,
        "2.442 GHz" => 7,
        "2.447 GHz" => 8,
        "2.452 GHz" => 9,
        "2.457 GHz" => 10,
        "2.462 GHz" => 11,
        "2.467 GHz" => 12,
        "2.472 GHz" => 13,
        "2.484 GHz" => 14,
        other => {
            tracing::debug!(freq = other, "No channel for frequency");
            return None;
        }
    };
    Some(channel)
}

/// Link quality as a percentage: `q/max` scaled, a bare `q`, or a positive
/// signal level.
pub fn parse_quality(block: &str) -> Option<i32> {
    if let Some(caps) = QUALITY.captures(block) {
        let q: i32 = caps.get(1)?.as_str().parse().ok()?;
        let max: i32 = caps
            .get(2)
            .and_then(|m| m.as_str().parse().ok())
            .unwrap_or(0);
        if max <= 0 {
            return Some(q);
        }
        // Out-of-range figures fall through to the dBm reading.
        if let Some(scaled) = q.checked_mul(100) {
            return Some(scaled / max);
        }
        tracing::debug!(quality = q, max, "Link quality out of range");
        return None;
    }
    capture(&SIGNAL_LEVEL, block).and_then(|s| s.parse().ok())
}

/// Received power in dBm, only when reported as a negative level.
pub fn parse_dbm(block: &str) -> Option<i32> {
    capture(&SIGNAL_DBM, block).and_then(|s| s.parse().ok())
}

/// Single signal figure for a block: quality when available, then dBm, then
/// [`SIGNAL_UNKNOWN`].
pub fn parse_signal(block: &str) -> i32 {
    parse_quality(block)
        .or_else(|| parse_dbm(block))
        .unwrap_or(SIGNAL_UNKNOWN)
}

fn parse_encryption(cell: &str) -> Encryption {
    let key = capture(&ENCRYPTION_KEY, cell).map(str::trim);
    if key != Some("on") {
        return Encryption::NONE;
    }
    let method = if WPA2.is_match(cell) {
        EncryptionMethod::Wpa2
    } else if WPA1.is_match(cell) || WPA_IE.is_match(cell) {
        EncryptionMethod::Wpa
    } else {
        EncryptionMethod::Wep
    };
    Encryption {
        enabled: true,
        method,
    }
}

fn parse_bitrates(cell: &str) -> Vec<String> {
    cell.lines()
        .filter_map(|line| line.split_once("Bit Rates:").map(|(_, rates)| rates))
        .flat_map(|rates| rates.split(';'))
        .map(str::trim)
        .filter(|r| !r.is_empty())
        .map(str::to_string)
        .collect()
}

/// Parses one `Cell` block of `iwlist scan` output.
///
/// Returns `None` when the block lacks an essid or a bssid.
pub fn parse_cell(cell: &str) -> Option<AccessPoint> {
    let raw_essid = capture(&ESSID, cell)?;
    let bssid = capture(&AP_MAC, cell)?.trim();
    if bssid.is_empty() {
        return None;
    }

    let hidden = raw_essid.is_empty() || raw_essid == HIDDEN_ESSID;
    let essid = if hidden { HIDDEN_ESSID } else { raw_essid };

    let channel = capture(&CHANNEL, cell)
        .and_then(|c| c.parse().ok())
        .or_else(|| capture(&FREQUENCY, cell).and_then(freq_to_channel));

    Some(AccessPoint {
        essid: essid.to_string(),
        hidden,
        bssid: bssid.to_string(),
        channel,
        mode: capture(&MODE, cell).map(str::trim).unwrap_or_default().to_string(),
        encryption: parse_encryption(cell),
        quality: parse_quality(cell),
        strength: parse_dbm(cell),
        bitrates: parse_bitrates(cell),
    })
}

/// Parses full `iwlist <iface> scan` output, dropping unusable cells.
pub fn parse_scan_output(raw: &str) -> Vec<AccessPoint> {
    raw.split("   Cell ")
        .filter(|cell| cell.contains("ESSID:"))
        .filter_map(|cell| {
            let ap = parse_cell(cell);
            if ap.is_none() {
                tracing::debug!("Dropping unparsable scan cell");
            }
            ap
        })
        .collect()
}

pub fn parse_wpa_state(output: &str) -> Option<String> {
    capture(&WPA_STATE, output).map(|s| s.trim().to_string())
}

pub fn parse_ip(output: &str) -> Option<String> {
    capture(&IP, output).map(str::to_string)
}

pub fn parse_is_up(output: &str) -> bool {
    IS_UP.is_match(output)
}

pub fn parse_current_essid(iwconfig: &str) -> Option<String> {
    capture(&CURRENT_ESSID, iwconfig)
        .filter(|e| !e.is_empty())
        .map(str::to_string)
}

pub fn parse_access_point(iwconfig: &str) -> Option<String> {
    capture(&ACCESS_POINT, iwconfig).map(str::to_string)
}

pub fn parse_killswitch(iwconfig: &str) -> bool {
    RADIO_OFF.is_match(iwconfig)
}

pub fn parse_psk(wpa_passphrase: &str) -> Option<String> {
    capture(&PSK, wpa_passphrase).map(|s| s.trim().to_string())
}

pub fn ethtool_link_detected(output: &str) -> bool {
    LINK_DETECTED.is_match(output)
}

pub fn mii_tool_invalid_argument(output: &str) -> bool {
    INVALID_ARGUMENT.is_match(output)
}

pub fn mii_tool_link_ok(output: &str) -> bool {
    LINK_OK.is_match(output)
}
