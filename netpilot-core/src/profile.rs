//! Persisted per-network settings.
//!
//! Profiles live in a sectioned key/value store. Wireless sections are keyed
//! by bssid (plus an optional `essid:<name>` section for settings shared by
//! every AP with that name); wired sections are keyed by a user-chosen name.

use crate::types::AccessPoint;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Name of the wired profile created when the wired store is empty.
pub const DEFAULT_WIRED_PROFILE: &str = "wired-default";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ProfileValue {
    Bool(bool),
    Int(i64),
    Str(String),
}

impl ProfileValue {
    /// Empty strings and the literal `None` are stored nulls.
    fn is_null(&self) -> bool {
        matches!(self, ProfileValue::Str(s) if s.is_empty() || s == "None")
    }

    pub fn as_string(&self) -> String {
        match self {
            ProfileValue::Bool(b) => b.to_string(),
            ProfileValue::Int(i) => i.to_string(),
            ProfileValue::Str(s) => s.clone(),
        }
    }

    pub fn as_bool(&self) -> bool {
        match self {
            ProfileValue::Bool(b) => *b,
            ProfileValue::Int(i) => *i != 0,
            ProfileValue::Str(s) => matches!(s.to_ascii_lowercase().as_str(), "true" | "1" | "yes"),
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            ProfileValue::Bool(b) => Some(i64::from(*b)),
            ProfileValue::Int(i) => Some(*i),
            ProfileValue::Str(s) => s.trim().parse().ok(),
        }
    }
}

impl From<&str> for ProfileValue {
    fn from(s: &str) -> Self {
        ProfileValue::Str(s.to_string())
    }
}

impl From<String> for ProfileValue {
    fn from(s: String) -> Self {
        ProfileValue::Str(s)
    }
}

impl From<bool> for ProfileValue {
    fn from(b: bool) -> Self {
        ProfileValue::Bool(b)
    }
}

impl From<i64> for ProfileValue {
    fn from(i: i64) -> Self {
        ProfileValue::Int(i)
    }
}

pub type Section = BTreeMap<String, ProfileValue>;

/// Sectioned key/value persistence used for network profiles.
pub trait ProfileStore: Send + Sync {
    /// Returns the value, or `None` when missing or stored as null.
    fn get(&self, section: &str, key: &str) -> Option<ProfileValue>;

    /// Sets a value, creating the section if needed. `None` removes the key.
    fn set(&self, section: &str, key: &str, value: Option<ProfileValue>);

    fn save(&self) -> Result<()>;

    fn sections(&self) -> Vec<String>;

    fn has_section(&self, section: &str) -> bool;

    fn remove_section(&self, section: &str);

    fn section(&self, section: &str) -> Option<Section>;

    fn replace_section(&self, section: &str, values: Section);

    /// Reads a value, writing `default` back first if the key is missing.
    fn get_or_insert(&self, section: &str, key: &str, default: ProfileValue) -> ProfileValue {
        match self.get(section, key) {
            Some(v) => v,
            None => {
                self.set(section, key, Some(default.clone()));
                default
            }
        }
    }

    /// Saves, downgrading a failure to a warning so a broken disk never takes
    /// the daemon down after startup.
    fn save_or_warn(&self) {
        if let Err(e) = self.save() {
            tracing::warn!(error = %e, "Failed to persist profiles, keeping in-memory state");
        }
    }
}

/// Profile store backed by a TOML file where every table is a section.
#[derive(Debug)]
pub struct TomlProfileStore {
    path: Option<PathBuf>,
    data: Mutex<BTreeMap<String, Section>>,
}

impl TomlProfileStore {
    /// Opens (or creates) the store file.
    ///
    /// Failing to create the file is an error, since the daemon cannot run
    /// without somewhere to keep profiles. A file that exists but does not
    /// parse is logged and treated as empty.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let data = if path.exists() {
            let text = std::fs::read_to_string(&path)?;
            match toml::from_str::<BTreeMap<String, Section>>(&text) {
                Ok(data) => data,
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Profile store is unreadable, starting empty");
                    BTreeMap::new()
                }
            }
        } else {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(&path, b"")?;
            tracing::info!(path = %path.display(), "Created profile store");
            BTreeMap::new()
        };
        restrict_permissions(&path);

        Ok(Self {
            path: Some(path),
            data: Mutex::new(data),
        })
    }

    /// A store that never touches disk.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            data: Mutex::new(BTreeMap::new()),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, Section>> {
        // A panic while holding the lock cannot leave the map half-written,
        // so the poisoned data is still usable.
        self.data.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn restrict_permissions(path: &Path) {
    use std::os::unix::fs::PermissionsExt;
    if let Err(e) = std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600)) {
        tracing::warn!(path = %path.display(), error = %e, "Could not restrict profile store permissions");
    }
}

impl ProfileStore for TomlProfileStore {
    fn get(&self, section: &str, key: &str) -> Option<ProfileValue> {
        self.lock()
            .get(section)
            .and_then(|s| s.get(key))
            .filter(|v| !v.is_null())
            .cloned()
    }

    fn set(&self, section: &str, key: &str, value: Option<ProfileValue>) {
        let mut data = self.lock();
        let entry = data.entry(section.to_string()).or_default();
        match value.filter(|v| !v.is_null()) {
            Some(v) => {
                entry.insert(key.to_string(), v);
            }
            None => {
                entry.remove(key);
            }
        }
    }

    fn save(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let text = toml::to_string(&*self.lock())?;
        std::fs::write(path, text)?;
        Ok(())
    }

    fn sections(&self) -> Vec<String> {
        self.lock().keys().cloned().collect()
    }

    fn has_section(&self, section: &str) -> bool {
        self.lock().contains_key(section)
    }

    fn remove_section(&self, section: &str) {
        self.lock().remove(section);
    }

    fn section(&self, section: &str) -> Option<Section> {
        self.lock().get(section).cloned()
    }

    fn replace_section(&self, section: &str, values: Section) {
        let values = values.into_iter().filter(|(_, v)| !v.is_null()).collect();
        self.lock().insert(section.to_string(), values);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DnsMode {
    #[default]
    None,
    Static,
    Global,
}

/// Resolver settings handed to `Interface::set_dns`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DnsSettings {
    pub servers: Vec<String>,
    pub domain: Option<String>,
    pub search_domain: Option<String>,
}

impl DnsSettings {
    pub fn is_empty(&self) -> bool {
        self.servers.is_empty()
    }
}

/// Settings for one wired or wireless network.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkProfile {
    /// Section name: the bssid for wireless, the profile name for wired.
    pub name: String,

    pub essid: Option<String>,
    pub bssid: Option<String>,
    pub channel: Option<u8>,
    pub mode: Option<String>,
    pub hidden: bool,

    pub ip: Option<String>,
    pub netmask: Option<String>,
    pub gateway: Option<String>,
    pub broadcast: Option<String>,

    pub dns_mode: DnsMode,
    pub dns1: Option<String>,
    pub dns2: Option<String>,
    pub dns3: Option<String>,
    pub dns_domain: Option<String>,
    pub search_domain: Option<String>,

    pub before_script: Option<String>,
    pub after_script: Option<String>,
    pub disconnect_script: Option<String>,

    /// Encryption template name; `None` for an open network.
    pub enctype: Option<String>,
    pub key: Option<String>,
    pub identity: Option<String>,
    pub password: Option<String>,
    /// Derived PSK for the current attempt. Never persisted or serialised.
    #[serde(skip)]
    pub psk: Option<String>,

    pub automatic: bool,
    pub never_connect: bool,
    pub use_settings_globally: bool,
    pub default: bool,
    pub last_used: bool,
}

fn opt_str(section: &Section, key: &str) -> Option<String> {
    section
        .get(key)
        .filter(|v| !v.is_null())
        .map(ProfileValue::as_string)
}

fn flag(section: &Section, key: &str) -> bool {
    section.get(key).is_some_and(ProfileValue::as_bool)
}

fn put(section: &mut Section, key: &str, value: &Option<String>) {
    if let Some(v) = value.as_deref().filter(|v| !v.is_empty()) {
        section.insert(key.to_string(), ProfileValue::from(v));
    }
}

impl NetworkProfile {
    /// A fresh, unsaved profile describing a scanned access point.
    pub fn from_access_point(ap: &AccessPoint) -> Self {
        Self {
            name: ap.bssid.clone(),
            essid: Some(ap.essid.clone()),
            bssid: Some(ap.bssid.clone()),
            channel: ap.channel,
            mode: Some(ap.mode.clone()),
            hidden: ap.hidden,
            ..Default::default()
        }
    }

    pub fn from_section(name: &str, section: &Section) -> Self {
        let dns_mode = if flag(section, "use_global_dns") {
            DnsMode::Global
        } else if flag(section, "use_static_dns") {
            DnsMode::Static
        } else {
            DnsMode::None
        };

        Self {
            name: name.to_string(),
            essid: opt_str(section, "essid"),
            bssid: opt_str(section, "bssid"),
            channel: section
                .get("channel")
                .and_then(ProfileValue::as_int)
                .and_then(|c| u8::try_from(c).ok()),
            mode: opt_str(section, "mode"),
            hidden: flag(section, "hidden"),
            ip: opt_str(section, "ip"),
            netmask: opt_str(section, "netmask"),
            gateway: opt_str(section, "gateway"),
            broadcast: opt_str(section, "broadcast"),
            dns_mode,
            dns1: opt_str(section, "dns1"),
            dns2: opt_str(section, "dns2"),
            dns3: opt_str(section, "dns3"),
            dns_domain: opt_str(section, "dns_domain"),
            search_domain: opt_str(section, "search_domain"),
            before_script: opt_str(section, "beforescript"),
            after_script: opt_str(section, "afterscript"),
            disconnect_script: opt_str(section, "disconnectscript"),
            enctype: opt_str(section, "enctype"),
            key: opt_str(section, "key"),
            identity: opt_str(section, "identity"),
            password: opt_str(section, "password"),
            psk: None,
            automatic: flag(section, "automatic"),
            never_connect: flag(section, "never"),
            use_settings_globally: flag(section, "use_settings_globally"),
            default: flag(section, "default"),
            last_used: flag(section, "lastused"),
        }
    }

    pub fn to_section(&self) -> Section {
        let mut s = Section::new();
        put(&mut s, "essid", &self.essid);
        put(&mut s, "bssid", &self.bssid);
        if let Some(channel) = self.channel {
            s.insert("channel".into(), ProfileValue::Int(i64::from(channel)));
        }
        put(&mut s, "mode", &self.mode);
        put(&mut s, "ip", &self.ip);
        put(&mut s, "netmask", &self.netmask);
        put(&mut s, "gateway", &self.gateway);
        put(&mut s, "broadcast", &self.broadcast);
        put(&mut s, "dns1", &self.dns1);
        put(&mut s, "dns2", &self.dns2);
        put(&mut s, "dns3", &self.dns3);
        put(&mut s, "dns_domain", &self.dns_domain);
        put(&mut s, "search_domain", &self.search_domain);
        put(&mut s, "beforescript", &self.before_script);
        put(&mut s, "afterscript", &self.after_script);
        put(&mut s, "disconnectscript", &self.disconnect_script);
        put(&mut s, "enctype", &self.enctype);
        put(&mut s, "key", &self.key);
        put(&mut s, "identity", &self.identity);
        put(&mut s, "password", &self.password);

        let flags = [
            ("hidden", self.hidden),
            ("use_global_dns", self.dns_mode == DnsMode::Global),
            ("use_static_dns", self.dns_mode == DnsMode::Static),
            ("automatic", self.automatic),
            ("never", self.never_connect),
            ("use_settings_globally", self.use_settings_globally),
            ("default", self.default),
            ("lastused", self.last_used),
        ];
        for (key, value) in flags {
            s.insert(key.to_string(), ProfileValue::Bool(value));
        }
        s
    }

    pub fn is_static(&self) -> bool {
        self.ip.as_deref().is_some_and(|ip| !ip.is_empty())
    }

    pub fn is_encrypted(&self) -> bool {
        self.enctype.as_deref().is_some_and(|e| !e.is_empty())
    }

    /// Statically configured resolvers, if any were entered.
    pub fn static_dns(&self) -> DnsSettings {
        DnsSettings {
            servers: [&self.dns1, &self.dns2, &self.dns3]
                .into_iter()
                .flatten()
                .filter(|s| !s.is_empty())
                .cloned()
                .collect(),
            domain: self.dns_domain.clone(),
            search_domain: self.search_domain.clone(),
        }
    }

    /// Copies the script paths of `stored` over this profile. Scripts run as
    /// root, so they can only be changed by editing the store directly.
    pub fn keep_scripts_from(&mut self, stored: Option<&NetworkProfile>) {
        self.before_script = stored.and_then(|p| p.before_script.clone());
        self.after_script = stored.and_then(|p| p.after_script.clone());
        self.disconnect_script = stored.and_then(|p| p.disconnect_script.clone());
    }
}

fn essid_section(essid: &str) -> String {
    format!("essid:{essid}")
}

/// Loads the saved profile for a scanned AP, preferring a global essid
/// section when one is marked for use.
pub fn read_wireless_profile(store: &dyn ProfileStore, ap: &AccessPoint) -> Option<NetworkProfile> {
    let essid_key = essid_section(&ap.essid);
    let section_name = if store
        .get(&essid_key, "use_settings_globally")
        .is_some_and(|v| v.as_bool())
    {
        essid_key
    } else if store.has_section(&ap.bssid) {
        ap.bssid.clone()
    } else {
        return None;
    };

    let section = store.section(&section_name)?;
    let mut profile = NetworkProfile::from_section(&ap.bssid, &section);

    // Scan data wins for everything the AP reports about itself, except the
    // name of a hidden network, which only the stored profile knows.
    if !ap.hidden || profile.essid.is_none() {
        profile.essid = Some(ap.essid.clone());
    }
    profile.hidden = ap.hidden;
    profile.bssid = Some(ap.bssid.clone());
    profile.channel = ap.channel.or(profile.channel);
    profile.mode = Some(ap.mode.clone());
    Some(profile)
}

pub fn save_wireless_profile(store: &dyn ProfileStore, profile: &NetworkProfile) -> Result<()> {
    let bssid = profile
        .bssid
        .clone()
        .unwrap_or_else(|| profile.name.clone());
    if bssid.is_empty() {
        return Err(Error::InvalidArgument("wireless profile has no bssid".into()));
    }
    let section = profile.to_section();
    store.replace_section(&bssid, section.clone());
    if profile.use_settings_globally {
        if let Some(essid) = profile.essid.as_deref() {
            store.replace_section(&essid_section(essid), section);
        }
    }
    store.save()
}

pub fn list_wired_profiles(store: &dyn ProfileStore) -> Vec<String> {
    store.sections()
}

/// Creates an empty wired profile. Returns `false` if the name is taken.
pub fn create_wired_profile(store: &dyn ProfileStore, name: &str, default: bool) -> Result<bool> {
    if name.trim().is_empty() {
        return Err(Error::InvalidArgument("wired profile name is empty".into()));
    }
    if store.has_section(name) {
        return Ok(false);
    }
    if default {
        unset_flag(store, "default");
    }
    let profile = NetworkProfile {
        name: name.to_string(),
        default,
        ..Default::default()
    };
    store.replace_section(name, profile.to_section());
    store.save()?;
    Ok(true)
}

pub fn delete_wired_profile(store: &dyn ProfileStore, name: &str) -> Result<()> {
    store.remove_section(name);
    store.save()
}

pub fn read_wired_profile(store: &dyn ProfileStore, name: &str) -> Result<NetworkProfile> {
    store
        .section(name)
        .map(|s| NetworkProfile::from_section(name, &s))
        .ok_or_else(|| Error::ProfileNotFound(name.to_string()))
}

pub fn save_wired_profile(store: &dyn ProfileStore, profile: &NetworkProfile) -> Result<()> {
    if profile.name.trim().is_empty() {
        return Err(Error::InvalidArgument("wired profile name is empty".into()));
    }
    if profile.default {
        unset_flag(store, "default");
    }
    if profile.last_used {
        unset_flag(store, "lastused");
    }
    store.replace_section(&profile.name, profile.to_section());
    store.save()
}

fn flagged(store: &dyn ProfileStore, key: &str) -> Option<String> {
    store
        .sections()
        .into_iter()
        .find(|s| store.get(s, key).is_some_and(|v| v.as_bool()))
}

fn unset_flag(store: &dyn ProfileStore, key: &str) {
    for section in store.sections() {
        if store.get(&section, key).is_some_and(|v| v.as_bool()) {
            store.set(&section, key, Some(ProfileValue::Bool(false)));
        }
    }
}

pub fn default_wired_profile(store: &dyn ProfileStore) -> Option<String> {
    flagged(store, "default")
}

pub fn last_used_wired_profile(store: &dyn ProfileStore) -> Option<String> {
    flagged(store, "lastused")
}

pub fn set_default_wired_profile(store: &dyn ProfileStore, name: &str) -> Result<()> {
    if !store.has_section(name) {
        return Err(Error::ProfileNotFound(name.to_string()));
    }
    unset_flag(store, "default");
    store.set(name, "default", Some(ProfileValue::Bool(true)));
    store.save()
}

pub fn set_last_used_wired_profile(store: &dyn ProfileStore, name: &str) -> Result<()> {
    if !store.has_section(name) {
        return Err(Error::ProfileNotFound(name.to_string()));
    }
    unset_flag(store, "lastused");
    store.set(name, "lastused", Some(ProfileValue::Bool(true)));
    store.save()
}

/// Seeds an empty wired store with a default profile.
pub fn ensure_default_wired_profile(store: &dyn ProfileStore) -> Result<()> {
    if store.sections().is_empty() {
        tracing::info!("Wired store is empty, creating {}", DEFAULT_WIRED_PROFILE);
        create_wired_profile(store, DEFAULT_WIRED_PROFILE, true)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Encryption;

    fn ap(essid: &str, bssid: &str, hidden: bool) -> AccessPoint {
        AccessPoint {
            essid: essid.to_string(),
            hidden,
            bssid: bssid.to_string(),
            channel: Some(6),
            mode: "Master".to_string(),
            encryption: Encryption::NONE,
            quality: Some(70),
            strength: None,
            bitrates: vec![],
        }
    }

    #[test]
    fn test_null_values_read_as_missing() {
        let store = TomlProfileStore::in_memory();
        store.replace_section(
            "home",
            Section::from([
                ("ip".to_string(), ProfileValue::from("None")),
                ("dns1".to_string(), ProfileValue::from("")),
                ("gateway".to_string(), ProfileValue::from("10.0.0.1")),
            ]),
        );
        assert_eq!(store.get("home", "ip"), None);
        assert_eq!(store.get("home", "dns1"), None);
        assert_eq!(store.get("home", "gateway"), Some(ProfileValue::from("10.0.0.1")));
    }

    #[test]
    fn test_get_or_insert_writes_default() {
        let store = TomlProfileStore::in_memory();
        let v = store.get_or_insert("Settings", "auto_reconnect", ProfileValue::Bool(true));
        assert_eq!(v, ProfileValue::Bool(true));
        assert_eq!(store.get("Settings", "auto_reconnect"), Some(ProfileValue::Bool(true)));
    }

    #[test]
    fn test_toml_store_persists_and_reloads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wired-settings.toml");

        let store = TomlProfileStore::open(&path).unwrap();
        let profile = NetworkProfile {
            name: "office".into(),
            ip: Some("192.168.10.5".into()),
            netmask: Some("255.255.255.0".into()),
            gateway: Some("192.168.10.1".into()),
            dns_mode: DnsMode::Static,
            dns1: Some("1.1.1.1".into()),
            ..Default::default()
        };
        save_wired_profile(&store, &profile).unwrap();

        let reopened = TomlProfileStore::open(&path).unwrap();
        let loaded = read_wired_profile(&reopened, "office").unwrap();
        assert_eq!(loaded.ip.as_deref(), Some("192.168.10.5"));
        assert_eq!(loaded.dns_mode, DnsMode::Static);
        assert_eq!(loaded.static_dns().servers, vec!["1.1.1.1".to_string()]);
    }

    #[test]
    fn test_corrupt_store_degrades_to_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wireless-settings.toml");
        std::fs::write(&path, "this is [not toml").unwrap();

        let store = TomlProfileStore::open(&path).unwrap();
        assert!(store.sections().is_empty());
    }

    #[test]
    fn test_default_and_last_used_are_unique() {
        let store = TomlProfileStore::in_memory();
        create_wired_profile(&store, "a", true).unwrap();
        create_wired_profile(&store, "b", false).unwrap();
        assert_eq!(default_wired_profile(&store).as_deref(), Some("a"));

        set_default_wired_profile(&store, "b").unwrap();
        assert_eq!(default_wired_profile(&store).as_deref(), Some("b"));
        assert!(!read_wired_profile(&store, "a").unwrap().default);

        set_last_used_wired_profile(&store, "a").unwrap();
        set_last_used_wired_profile(&store, "b").unwrap();
        let flagged: Vec<_> = store
            .sections()
            .into_iter()
            .filter(|s| read_wired_profile(&store, s).unwrap().last_used)
            .collect();
        assert_eq!(flagged, vec!["b".to_string()]);
    }

    #[test]
    fn test_create_wired_profile_refuses_duplicates() {
        let store = TomlProfileStore::in_memory();
        assert!(create_wired_profile(&store, "lab", false).unwrap());
        assert!(!create_wired_profile(&store, "lab", false).unwrap());
    }

    #[test]
    fn test_ensure_default_wired_profile() {
        let store = TomlProfileStore::in_memory();
        ensure_default_wired_profile(&store).unwrap();
        assert_eq!(default_wired_profile(&store).as_deref(), Some(DEFAULT_WIRED_PROFILE));
    }

    #[test]
    fn test_wireless_profile_prefers_global_essid_section() {
        let store = TomlProfileStore::in_memory();
        let scanned = ap("cafe", "00:11:22:33:44:55", false);

        let mut per_ap = NetworkProfile::from_access_point(&scanned);
        per_ap.automatic = false;
        save_wireless_profile(&store, &per_ap).unwrap();
        assert!(!read_wireless_profile(&store, &scanned).unwrap().automatic);

        let mut global = per_ap.clone();
        global.automatic = true;
        global.use_settings_globally = true;
        save_wireless_profile(&store, &global).unwrap();

        let other_ap = ap("cafe", "66:77:88:99:aa:bb", false);
        let loaded = read_wireless_profile(&store, &other_ap).unwrap();
        assert!(loaded.automatic);
        assert_eq!(loaded.bssid.as_deref(), Some("66:77:88:99:aa:bb"));
    }

    #[test]
    fn test_hidden_network_takes_stored_essid() {
        let store = TomlProfileStore::in_memory();
        let scanned = ap(crate::types::HIDDEN_ESSID, "de:ad:be:ef:00:01", true);
        let mut profile = NetworkProfile::from_access_point(&scanned);
        profile.essid = Some("secret-lab".into());
        save_wireless_profile(&store, &profile).unwrap();

        let loaded = read_wireless_profile(&store, &scanned).unwrap();
        assert_eq!(loaded.essid.as_deref(), Some("secret-lab"));
        assert!(loaded.hidden);
    }

    #[test]
    fn test_keep_scripts_from_ignores_client_values() {
        let stored = NetworkProfile {
            before_script: Some("/etc/netpilot/pre.sh".into()),
            ..Default::default()
        };
        let mut incoming = NetworkProfile {
            before_script: Some("/tmp/evil.sh".into()),
            after_script: Some("/tmp/evil2.sh".into()),
            ..Default::default()
        };
        incoming.keep_scripts_from(Some(&stored));
        assert_eq!(incoming.before_script.as_deref(), Some("/etc/netpilot/pre.sh"));
        assert_eq!(incoming.after_script, None);
    }
}
