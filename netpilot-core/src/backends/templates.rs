//! Supplicant configuration templates.
//!
//! A template is a `wpa_supplicant.conf` fragment with `$_NAME` placeholders.
//! Files in the templates directory override the built-in set; a file may
//! carry descriptive header lines separated from the body by a `-----` line.

use crate::profile::NetworkProfile;
use crate::types::Medium;
use crate::{Error, Result};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;

const HEADER_SEPARATOR: &str = "-----";

const WPA: &str = "ap_scan=1
network={
\tssid=\"$_ESSID\"
\tscan_ssid=$_SCAN
\tproto=WPA RSN
\tkey_mgmt=WPA-PSK
\tpairwise=CCMP TKIP
\tgroup=CCMP TKIP
\tpsk=$_PSK
}
";

const WPA_PSK_HEX: &str = "ap_scan=1
network={
\tssid=\"$_ESSID\"
\tscan_ssid=$_SCAN
\tproto=WPA RSN
\tkey_mgmt=WPA-PSK
\tpsk=$_KEY
}
";

const WEP_HEX: &str = "ap_scan=1
network={
\tssid=\"$_ESSID\"
\tscan_ssid=$_SCAN
\tkey_mgmt=NONE
\twep_key0=$_KEY
\twep_tx_keyidx=0
}
";

const WEP_PASSPHRASE: &str = "ap_scan=1
network={
\tssid=\"$_ESSID\"
\tscan_ssid=$_SCAN
\tkey_mgmt=NONE
\twep_key0=\"$_KEY\"
\twep_tx_keyidx=0
}
";

const PEAP: &str = "ap_scan=1
network={
\tssid=\"$_ESSID\"
\tscan_ssid=$_SCAN
\tkey_mgmt=WPA-EAP
\teap=PEAP
\tidentity=\"$_IDENTITY\"
\tpassword=\"$_PASSWORD\"
\tphase2=\"auth=MSCHAPV2\"
}
";

const WIRED_8021X: &str = "ap_scan=0
network={
\tkey_mgmt=IEEE8021X
\teap=PEAP
\tidentity=\"$_IDENTITY\"
\tpassword=\"$_PASSWORD\"
\tphase2=\"auth=MSCHAPV2\"
}
";

/// Template used for encrypted wired profiles.
pub const WIRED_TEMPLATE: &str = "wired-8021x";

pub fn builtin(name: &str) -> Option<&'static str> {
    match name {
        "wpa" => Some(WPA),
        "wpa-psk-hex" => Some(WPA_PSK_HEX),
        "wep-hex" => Some(WEP_HEX),
        "wep-passphrase" => Some(WEP_PASSPHRASE),
        "peap" => Some(PEAP),
        WIRED_TEMPLATE => Some(WIRED_8021X),
        _ => None,
    }
}

pub const BUILTIN_NAMES: &[&str] = &[
    "wpa",
    "wpa-psk-hex",
    "wep-hex",
    "wep-passphrase",
    "peap",
    WIRED_TEMPLATE,
];

fn strip_header(text: &str) -> &str {
    match text.split_once(&format!("\n{HEADER_SEPARATOR}\n")) {
        Some((_, body)) => body,
        None => text,
    }
}

/// Loads a template, preferring an override file in `templates_dir`.
pub async fn load(templates_dir: &Path, name: &str) -> Result<String> {
    if name.contains('/') || name.starts_with('.') {
        return Err(Error::InvalidArgument(format!("bad template name '{name}'")));
    }
    let path = templates_dir.join(name);
    match tokio::fs::read_to_string(&path).await {
        Ok(text) => {
            tracing::debug!(template = name, path = %path.display(), "Using template override");
            return Ok(strip_header(&text).to_string());
        }
        Err(e) if e.kind() != std::io::ErrorKind::NotFound => {
            tracing::warn!(path = %path.display(), error = %e, "Unreadable template override, using built-in");
        }
        Err(_) => {}
    }
    builtin(name)
        .map(str::to_string)
        .ok_or_else(|| Error::InvalidArgument(format!("unknown encryption template '{name}'")))
}

/// Substitutes placeholders from `profile`.
///
/// A placeholder used by the template whose value is missing is an error
/// rather than a silently broken config.
pub fn render(name: &str, template: &str, profile: &NetworkProfile) -> Result<String> {
    let scan = if profile.hidden { "1" } else { "0" };
    let values: [(&str, Option<&str>); 7] = [
        ("$_ESSID", profile.essid.as_deref()),
        ("$_BSSID", profile.bssid.as_deref()),
        ("$_SCAN", Some(scan)),
        ("$_PSK", profile.psk.as_deref()),
        ("$_KEY", profile.key.as_deref()),
        ("$_IDENTITY", profile.identity.as_deref()),
        ("$_PASSWORD", profile.password.as_deref()),
    ];

    let mut out = template.to_string();
    for (placeholder, value) in values {
        if !out.contains(placeholder) {
            continue;
        }
        match value.filter(|v| !v.is_empty()) {
            Some(v) => out = out.replace(placeholder, v),
            None => {
                return Err(Error::InvalidArgument(format!(
                    "template '{name}' needs a value for {placeholder}"
                )));
            }
        }
    }
    Ok(out)
}

/// File name of the generated config: the bssid without colons for
/// wireless, the profile name for wired.
pub fn config_file_name(profile: &NetworkProfile, medium: Medium) -> Result<String> {
    let name = match medium {
        Medium::Wireless => profile
            .bssid
            .as_deref()
            .unwrap_or(&profile.name)
            .replace(':', "")
            .to_lowercase(),
        Medium::Wired => profile.name.clone(),
    };
    if name.is_empty() || name.contains('/') || name.starts_with('.') {
        return Err(Error::InvalidArgument(format!(
            "cannot derive a config file name for profile '{}'",
            profile.name
        )));
    }
    Ok(name)
}

/// Writes a generated config readable only by root.
pub async fn write_config(networks_dir: &Path, file_name: &str, contents: &str) -> Result<PathBuf> {
    use std::os::unix::fs::PermissionsExt;

    tokio::fs::create_dir_all(networks_dir).await?;
    let path = networks_dir.join(file_name);
    let mut file = tokio::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(&path)
        .await?;
    // `mode` only applies on creation; tighten a pre-existing file too.
    tokio::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o600)).await?;
    file.write_all(contents.as_bytes()).await?;
    file.flush().await?;
    Ok(path)
}

/// Loads, renders and writes the supplicant config for `profile`.
pub async fn generate(
    templates_dir: &Path,
    networks_dir: &Path,
    profile: &NetworkProfile,
    medium: Medium,
) -> Result<PathBuf> {
    let name = match medium {
        Medium::Wired => WIRED_TEMPLATE,
        Medium::Wireless => profile
            .enctype
            .as_deref()
            .ok_or_else(|| Error::InvalidArgument("profile has no encryption type".into()))?,
    };
    let template = load(templates_dir, name).await?;
    let rendered = render(name, &template, profile)?;
    write_config(networks_dir, &config_file_name(profile, medium)?, &rendered).await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wpa_profile() -> NetworkProfile {
        NetworkProfile {
            name: "00:11:22:AA:BB:CC".into(),
            essid: Some("home".into()),
            bssid: Some("00:11:22:AA:BB:CC".into()),
            enctype: Some("wpa".into()),
            key: Some("hunter22".into()),
            psk: Some("abcdef0123".into()),
            ..Default::default()
        }
    }

    #[test]
    fn test_render_wpa() {
        let out = render("wpa", WPA, &wpa_profile()).unwrap();
        assert!(out.contains("ssid=\"home\""));
        assert!(out.contains("psk=abcdef0123"));
        assert!(out.contains("scan_ssid=0"));
        assert!(!out.contains("$_"));
    }

    #[test]
    fn test_render_hidden_sets_scan_ssid() {
        let mut profile = wpa_profile();
        profile.hidden = true;
        let out = render("wpa", WPA, &profile).unwrap();
        assert!(out.contains("scan_ssid=1"));
    }

    #[test]
    fn test_render_missing_value_fails() {
        let mut profile = wpa_profile();
        profile.psk = None;
        assert!(matches!(
            render("wpa", WPA, &profile),
            Err(Error::InvalidArgument(msg)) if msg.contains("$_PSK")
        ));
    }

    #[test]
    fn test_config_file_name() {
        let profile = wpa_profile();
        assert_eq!(
            config_file_name(&profile, Medium::Wireless).unwrap(),
            "001122aabbcc"
        );
        let wired = NetworkProfile {
            name: "office".into(),
            ..Default::default()
        };
        assert_eq!(config_file_name(&wired, Medium::Wired).unwrap(), "office");
        let bad = NetworkProfile {
            name: "../etc".into(),
            ..Default::default()
        };
        assert!(config_file_name(&bad, Medium::Wired).is_err());
    }

    #[tokio::test]
    async fn test_override_and_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let templates = tempfile::tempdir().unwrap();
        let networks = tempfile::tempdir().unwrap();
        std::fs::write(
            templates.path().join("wpa"),
            "name = Custom WPA\nrequire key *Key\n-----\nnetwork={\n\tssid=\"$_ESSID\"\n\tpsk=\"$_KEY\"\n}\n",
        )
        .unwrap();

        let path = generate(templates.path(), networks.path(), &wpa_profile(), Medium::Wireless)
            .await
            .unwrap();
        assert_eq!(path, networks.path().join("001122aabbcc"));

        let written = std::fs::read_to_string(&path).unwrap();
        assert_eq!(written, "network={\n\tssid=\"home\"\n\tpsk=\"hunter22\"\n}\n");
        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[tokio::test]
    async fn test_unknown_template() {
        let templates = tempfile::tempdir().unwrap();
        assert!(load(templates.path(), "wpa3-sae").await.is_err());
        assert!(load(templates.path(), "../../etc/passwd").await.is_err());
        assert!(load(templates.path(), "peap").await.is_ok());
    }
}
