//! The daemon object: owns the backends, both controllers, the profile
//! stores, the scan snapshot and the policy flags, and exposes every
//! operation the RPC surface offers.

use crate::backends::BackendRegistry;
use crate::config::{DaemonConfig, WiredConnectMode};
use crate::connect::ConnectAttempt;
use crate::controller::{ControllerSettings, WiredController, WirelessController};
use crate::profile::{self, DnsSettings, NetworkProfile, ProfileStore};
use crate::scan::ScanSnapshot;
use crate::status::{ConnectionStatus, DaemonEvent, EventSender, StatusModel, event_channel};
use crate::traits::Backend;
use crate::types::{ConnectStatus, ConnectionState, Medium, NetworkId, SignalDisplay};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;
use tokio::sync::broadcast;

const DEFAULT_WIRED_INTERFACE: &str = "eth0";
const DEFAULT_WIRELESS_INTERFACE: &str = "wlan0";

/// Behaviour switches a client may change at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeSettings {
    pub auto_reconnect: bool,
    pub signal_display: SignalDisplay,
    pub wired_connect_mode: WiredConnectMode,
}

/// A partial update of [`RuntimeSettings`] plus the chooser flag.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SettingsUpdate {
    pub auto_reconnect: Option<bool>,
    pub signal_display: Option<SignalDisplay>,
    pub wired_connect_mode: Option<WiredConnectMode>,
    pub need_profile_chooser: Option<bool>,
}

#[derive(Debug, Default)]
struct Flags {
    forced_disconnect: AtomicBool,
    gui_open: AtomicBool,
    suspended: AtomicBool,
    auto_connecting: AtomicBool,
    need_profile_chooser: AtomicBool,
}

/// Which step each medium's running attempt is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ConnectingInfo {
    pub connecting: bool,
    pub wired: Option<ConnectStatus>,
    pub wireless: Option<ConnectStatus>,
}

/// The backend list with the active one marked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackendInfo {
    pub available: Vec<&'static str>,
    pub current: Option<&'static str>,
    pub update_interval_ms: Option<u64>,
}

pub struct Daemon {
    config: DaemonConfig,
    registry: BackendRegistry,
    backend: RwLock<Option<Arc<dyn Backend>>>,
    pub wired: WiredController,
    pub wireless: WirelessController,
    wired_store: Arc<dyn ProfileStore>,
    wireless_store: Arc<dyn ProfileStore>,
    status: StatusModel,
    snapshot: RwLock<Arc<ScanSnapshot>>,
    generation: AtomicU64,
    flags: Flags,
    hidden_essid: Mutex<Option<String>>,
    runtime: RwLock<RuntimeSettings>,
    events: EventSender,
}

impl std::fmt::Debug for Daemon {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Daemon")
            .field("backend", &self.current_backend())
            .field("wired", &self.wired)
            .field("wireless", &self.wireless)
            .field("flags", &self.flags)
            .finish_non_exhaustive()
    }
}

/// A store write that reached memory but not disk is only worth a warning.
fn keep_in_memory<T>(result: Result<T>, fallback: T) -> Result<T> {
    match result {
        Err(e @ (Error::Io(_) | Error::TomlSer(_) | Error::ProfileStore(_))) => {
            tracing::warn!(error = %e, "Failed to persist profiles, keeping in-memory state");
            Ok(fallback)
        }
        other => other,
    }
}

/// Script paths can only be changed by editing the store on disk; a client
/// that sends different ones is refused.
fn reject_script_changes(new: &NetworkProfile, stored: Option<&NetworkProfile>) -> Result<()> {
    let pairs = [
        ("beforescript", &new.before_script, stored.and_then(|p| p.before_script.as_ref())),
        ("afterscript", &new.after_script, stored.and_then(|p| p.after_script.as_ref())),
        ("disconnectscript", &new.disconnect_script, stored.and_then(|p| p.disconnect_script.as_ref())),
    ];
    for (key, new, old) in pairs {
        let new = new.as_deref().filter(|s| !s.is_empty());
        if new.is_some() && new != old.map(String::as_str) {
            return Err(Error::InvalidArgument(format!(
                "{key} cannot be set remotely"
            )));
        }
    }
    Ok(())
}

impl Daemon {
    /// Builds the daemon and loads the configured backend.
    pub fn new(
        config: DaemonConfig,
        registry: BackendRegistry,
        wired_store: Arc<dyn ProfileStore>,
        wireless_store: Arc<dyn ProfileStore>,
    ) -> Result<Self> {
        profile::ensure_default_wired_profile(wired_store.as_ref())?;

        let events = event_channel();
        let settings = ControllerSettings {
            global_dns: if config.dns.enabled {
                config.dns.settings.clone()
            } else {
                DnsSettings::default()
            },
            scripts: config.scripts.clone(),
            hostname: config.hostname.clone(),
            verify_ap: config.verify_ap,
            thresholds: config.thresholds.clone(),
        };
        let wired_iface = config
            .wired_interface
            .clone()
            .unwrap_or_else(|| DEFAULT_WIRED_INTERFACE.to_string());
        let wireless_iface = config
            .wireless_interface
            .clone()
            .unwrap_or_else(|| DEFAULT_WIRELESS_INTERFACE.to_string());

        let daemon = Self {
            registry,
            backend: RwLock::new(None),
            wired: WiredController::new(Medium::Wired, wired_iface, settings.clone(), events.clone()),
            wireless: WirelessController::new(Medium::Wireless, wireless_iface, settings, events.clone()),
            wired_store,
            wireless_store,
            status: StatusModel::new(events.clone()),
            snapshot: RwLock::new(Arc::new(ScanSnapshot::default())),
            generation: AtomicU64::new(0),
            flags: Flags::default(),
            hidden_essid: Mutex::new(None),
            runtime: RwLock::new(RuntimeSettings {
                auto_reconnect: config.auto_reconnect,
                signal_display: config.signal_display,
                wired_connect_mode: config.wired_connect_mode,
            }),
            events,
            config,
        };
        let backend = daemon.config.backend.clone();
        daemon.load_backend(&backend)?;
        Ok(daemon)
    }

    pub fn config(&self) -> &DaemonConfig {
        &self.config
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DaemonEvent> {
        self.events.subscribe()
    }

    pub(crate) fn emit(&self, event: DaemonEvent) {
        // Nobody listening is not an error.
        let _ = self.events.send(event);
    }

    pub fn wired_store(&self) -> &dyn ProfileStore {
        self.wired_store.as_ref()
    }

    pub fn wireless_store(&self) -> &dyn ProfileStore {
        self.wireless_store.as_ref()
    }

    pub fn status(&self) -> &StatusModel {
        &self.status
    }

    // --- Backends ---

    /// Switches to the named backend and rebinds both controllers.
    pub fn load_backend(&self, name: &str) -> Result<()> {
        let backend = self.registry.get(name)?;
        if self.current_backend() == Some(backend.name()) {
            return Ok(());
        }
        tracing::info!(backend = backend.name(), "Loading backend");
        self.wired.bind(Some(backend.wired(self.wired.iface_name())));
        self.wireless.bind(Some(backend.wireless(self.wireless.iface_name())));
        let interval = backend.update_interval();
        *self.backend.write().unwrap_or_else(|p| p.into_inner()) = Some(backend.clone());
        self.emit(DaemonEvent::BackendChanged {
            backend: backend.name().to_string(),
            update_interval_ms: u64::try_from(interval.as_millis()).unwrap_or(u64::MAX),
        });
        Ok(())
    }

    pub fn backend_list(&self) -> Vec<&'static str> {
        self.registry.names()
    }

    pub fn current_backend(&self) -> Option<&'static str> {
        self.backend
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .as_ref()
            .map(|b| b.name())
    }

    pub fn update_interval(&self) -> Option<Duration> {
        self.current_backend()
            .and_then(|name| self.registry.update_interval(name))
    }

    pub fn backend_info(&self) -> BackendInfo {
        BackendInfo {
            available: self.backend_list(),
            current: self.current_backend(),
            update_interval_ms: self
                .update_interval()
                .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX)),
        }
    }

    // --- Scanning ---

    pub fn snapshot(&self) -> Arc<ScanSnapshot> {
        self.snapshot.read().unwrap_or_else(|p| p.into_inner()).clone()
    }

    fn replace_snapshot(&self, snapshot: ScanSnapshot) -> Arc<ScanSnapshot> {
        let snapshot = Arc::new(snapshot);
        *self.snapshot.write().unwrap_or_else(|p| p.into_inner()) = snapshot.clone();
        snapshot
    }

    /// Scans, attaches saved profiles and publishes a new generation.
    pub async fn scan(&self) -> Result<Arc<ScanSnapshot>> {
        self.emit(DaemonEvent::ScanStarted);
        let hidden = self.hidden_essid();
        let aps = match self.wireless.scan(hidden.as_deref()).await {
            Ok(aps) => aps,
            Err(e) => {
                // Keep the old snapshot, but let listeners stop waiting.
                let current = self.snapshot();
                self.emit(DaemonEvent::ScanFinished {
                    generation: current.generation,
                    count: current.len(),
                });
                return Err(e);
            }
        };
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let snapshot = ScanSnapshot::build(generation, aps, self.wireless_store.as_ref());
        tracing::info!(generation, networks = snapshot.len(), "Scan finished");
        let snapshot = self.replace_snapshot(snapshot);
        self.emit(DaemonEvent::ScanFinished {
            generation,
            count: snapshot.len(),
        });
        Ok(snapshot)
    }

    /// Re-reads saved profiles into the current snapshot without rescanning;
    /// network ids stay valid.
    fn refresh_snapshot_profiles(&self) {
        let current = self.snapshot();
        let mut refreshed = (*current).clone();
        for network in &mut refreshed.networks {
            network.profile = profile::read_wireless_profile(self.wireless_store.as_ref(), &network.access_point);
        }
        self.replace_snapshot(refreshed);
    }

    pub fn hidden_essid(&self) -> Option<String> {
        self.hidden_essid.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }

    pub fn set_hidden_essid(&self, essid: Option<String>) {
        *self.hidden_essid.lock().unwrap_or_else(|p| p.into_inner()) =
            essid.filter(|e| !e.trim().is_empty());
    }

    // --- Connecting ---

    /// Connects to a network from the current scan.
    pub fn connect_wireless(&self, id: NetworkId) -> Result<ConnectAttempt> {
        let snapshot = self.snapshot();
        let network = snapshot.get(id)?;
        let profile = network.profile_or_default();
        tracing::info!(essid = %network.access_point.essid, bssid = %network.access_point.bssid, "Connecting to wireless network");
        self.set_forced_disconnect(false);
        self.wireless.connect(profile)
    }

    /// Connects with the named wired profile, or the default one, or the
    /// last used one.
    pub fn connect_wired(&self, name: Option<&str>) -> Result<ConnectAttempt> {
        let store = self.wired_store.as_ref();
        let name = match name {
            Some(name) => name.to_string(),
            None => profile::default_wired_profile(store)
                .or_else(|| profile::last_used_wired_profile(store))
                .ok_or_else(|| Error::ProfileNotFound("no default or last used wired profile".into()))?,
        };
        let wired = profile::read_wired_profile(store, &name)?;
        keep_in_memory(profile::set_last_used_wired_profile(store, &name), ())?;
        tracing::info!(profile = %name, "Connecting to wired network");
        self.set_forced_disconnect(false);
        self.wired.connect(wired)
    }

    /// User-requested disconnect of both media.
    pub async fn disconnect(&self) -> Result<()> {
        self.set_forced_disconnect(true);
        let wireless = self.wireless.disconnect().await;
        let wired = self.wired.disconnect().await;
        wireless.and(wired)
    }

    pub async fn cancel_connect(&self) {
        tracing::info!("Cancelling connection attempts");
        self.wireless.cancel().await;
        self.wired.cancel().await;
        self.set_forced_disconnect(true);
    }

    pub fn check_if_connecting(&self) -> bool {
        self.wired.is_connecting() || self.wireless.is_connecting()
    }

    pub fn connecting_info(&self) -> ConnectingInfo {
        let wired = self.wired.connecting_status();
        let wireless = self.wireless.connecting_status();
        ConnectingInfo {
            connecting: wired.is_some() || wireless.is_some(),
            wired,
            wireless,
        }
    }

    // --- Status ---

    pub fn connection_status(&self) -> ConnectionStatus {
        self.status.get()
    }

    pub fn set_connection_status(&self, state: ConnectionState, info: Vec<String>) {
        self.status.set(state, info);
    }

    // --- Flags ---

    pub fn forced_disconnect(&self) -> bool {
        self.flags.forced_disconnect.load(Ordering::SeqCst)
    }

    pub fn set_forced_disconnect(&self, value: bool) {
        self.flags.forced_disconnect.store(value, Ordering::SeqCst);
    }

    pub fn gui_open(&self) -> bool {
        self.flags.gui_open.load(Ordering::SeqCst)
    }

    pub fn set_gui_open(&self, value: bool) {
        self.flags.gui_open.store(value, Ordering::SeqCst);
    }

    pub fn suspended(&self) -> bool {
        self.flags.suspended.load(Ordering::SeqCst)
    }

    /// Suspending also disconnects everything.
    pub async fn set_suspend(&self, value: bool) -> Result<()> {
        self.flags.suspended.store(value, Ordering::SeqCst);
        if value {
            self.disconnect().await?;
        }
        Ok(())
    }

    pub fn auto_connecting(&self) -> bool {
        self.flags.auto_connecting.load(Ordering::SeqCst)
    }

    pub(crate) fn set_auto_connecting(&self, value: bool) {
        self.flags.auto_connecting.store(value, Ordering::SeqCst);
    }

    pub fn need_profile_chooser(&self) -> bool {
        self.flags.need_profile_chooser.load(Ordering::SeqCst)
    }

    pub fn set_need_profile_chooser(&self, value: bool) {
        self.flags.need_profile_chooser.store(value, Ordering::SeqCst);
    }

    /// Whether the monitor may start a reconnect right now.
    pub fn should_auto_reconnect(&self) -> bool {
        self.runtime_settings().auto_reconnect
            && !self.check_if_connecting()
            && !self.forced_disconnect()
            && !self.auto_connecting()
    }

    // --- Runtime settings ---

    pub fn runtime_settings(&self) -> RuntimeSettings {
        *self.runtime.read().unwrap_or_else(|p| p.into_inner())
    }

    pub fn set_auto_reconnect(&self, value: bool) {
        self.runtime.write().unwrap_or_else(|p| p.into_inner()).auto_reconnect = value;
    }

    pub fn set_signal_display(&self, value: SignalDisplay) {
        self.runtime.write().unwrap_or_else(|p| p.into_inner()).signal_display = value;
    }

    pub fn set_wired_connect_mode(&self, value: WiredConnectMode) {
        self.runtime.write().unwrap_or_else(|p| p.into_inner()).wired_connect_mode = value;
    }

    pub fn apply_settings(&self, update: SettingsUpdate) -> RuntimeSettings {
        if let Some(v) = update.auto_reconnect {
            self.set_auto_reconnect(v);
        }
        if let Some(v) = update.signal_display {
            self.set_signal_display(v);
        }
        if let Some(v) = update.wired_connect_mode {
            self.set_wired_connect_mode(v);
        }
        if let Some(v) = update.need_profile_chooser {
            self.set_need_profile_chooser(v);
        }
        self.runtime_settings()
    }

    // --- Radio ---

    pub async fn killswitch_enabled(&self) -> bool {
        self.wireless.killswitch_enabled().await
    }

    pub async fn switch_rfkill(&self) -> Result<bool> {
        self.wireless.switch_rfkill().await
    }

    // --- Profiles ---

    /// Saves settings for a scanned network, keyed by `bssid`.
    pub fn save_wireless_profile(&self, bssid: &str, mut new: NetworkProfile) -> Result<()> {
        let store = self.wireless_store.as_ref();
        if bssid.trim().is_empty() {
            return Err(Error::InvalidArgument("bssid is empty".into()));
        }
        let stored = store
            .section(bssid)
            .map(|s| NetworkProfile::from_section(bssid, &s));
        reject_script_changes(&new, stored.as_ref())?;
        new.keep_scripts_from(stored.as_ref());
        new.name = bssid.to_string();
        new.bssid = Some(bssid.to_string());
        keep_in_memory(profile::save_wireless_profile(store, &new), ())?;
        self.refresh_snapshot_profiles();
        Ok(())
    }

    pub fn list_wired_profiles(&self) -> Vec<String> {
        profile::list_wired_profiles(self.wired_store.as_ref())
    }

    pub fn read_wired_profile(&self, name: &str) -> Result<NetworkProfile> {
        profile::read_wired_profile(self.wired_store.as_ref(), name)
    }

    /// Returns `false` when a profile with that name already exists.
    pub fn create_wired_profile(&self, name: &str, default: bool) -> Result<bool> {
        keep_in_memory(
            profile::create_wired_profile(self.wired_store.as_ref(), name, default),
            true,
        )
    }

    pub fn delete_wired_profile(&self, name: &str) -> Result<()> {
        let store = self.wired_store.as_ref();
        if !store.has_section(name) {
            return Err(Error::ProfileNotFound(name.to_string()));
        }
        keep_in_memory(profile::delete_wired_profile(store, name), ())
    }

    pub fn save_wired_profile(&self, name: &str, mut new: NetworkProfile) -> Result<()> {
        let store = self.wired_store.as_ref();
        let stored = profile::read_wired_profile(store, name).ok();
        reject_script_changes(&new, stored.as_ref())?;
        new.keep_scripts_from(stored.as_ref());
        new.name = name.to_string();
        keep_in_memory(profile::save_wired_profile(store, &new), ())
    }

    pub fn set_default_wired_profile(&self, name: &str) -> Result<()> {
        keep_in_memory(
            profile::set_default_wired_profile(self.wired_store.as_ref(), name),
            (),
        )
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::backends::BackendSettings;
    use crate::backends::mock::MockBackend;
    use crate::config::{Thresholds, config_from_toml_str};
    use crate::profile::TomlProfileStore;
    use crate::types::ConnectResult;

    /// A daemon on the mock backend with millisecond thresholds.
    pub(crate) fn mock_daemon() -> (Arc<Daemon>, Arc<MockBackend>) {
        let mut config = config_from_toml_str("[daemon]\nbackend = \"mock\"\n").unwrap();
        config.thresholds = Thresholds::for_tests();
        let mut registry = BackendRegistry::new(BackendSettings::from(&config));
        let mock = Arc::new(MockBackend::new());
        registry.register(mock.clone());
        let daemon = Daemon::new(
            config,
            registry,
            Arc::new(TomlProfileStore::in_memory()),
            Arc::new(TomlProfileStore::in_memory()),
        )
        .unwrap();
        (Arc::new(daemon), mock)
    }

    #[tokio::test]
    async fn test_new_daemon_state() {
        let (daemon, _mock) = mock_daemon();
        assert_eq!(daemon.current_backend(), Some("mock"));
        assert_eq!(daemon.update_interval(), Some(Duration::from_secs(1)));
        assert_eq!(daemon.list_wired_profiles(), vec![profile::DEFAULT_WIRED_PROFILE]);
        assert_eq!(daemon.connection_status(), ConnectionStatus::not_connected());
        assert!(daemon.snapshot().is_empty());
    }

    #[tokio::test]
    async fn test_scan_bumps_generation_and_emits() {
        let (daemon, _mock) = mock_daemon();
        let mut rx = daemon.subscribe();
        let first = daemon.scan().await.unwrap();
        let second = daemon.scan().await.unwrap();
        assert_eq!(first.generation + 1, second.generation);
        assert_eq!(second.len(), 3);
        assert_eq!(second.networks[0].access_point.essid, "MyHomeWiFi");

        assert_eq!(rx.recv().await.unwrap(), DaemonEvent::ScanStarted);
        assert_eq!(
            rx.recv().await.unwrap(),
            DaemonEvent::ScanFinished {
                generation: first.generation,
                count: 3
            }
        );
    }

    #[tokio::test]
    async fn test_stale_network_id_has_no_side_effects() {
        let (daemon, mock) = mock_daemon();
        let old = daemon.scan().await.unwrap();
        daemon.scan().await.unwrap();
        daemon.set_forced_disconnect(true);
        mock.wireless_state().clear_calls();

        let stale = old.networks[0].id;
        assert!(matches!(
            daemon.connect_wireless(stale),
            Err(Error::StaleScan { held, current }) if held + 1 == current
        ));
        assert!(daemon.forced_disconnect());
        assert!(daemon.wireless.attempt().is_none());
        assert!(mock.wireless_state().calls().is_empty());
    }

    #[tokio::test]
    async fn test_connect_wireless_clears_forced_disconnect() {
        let (daemon, _mock) = mock_daemon();
        let snapshot = daemon.scan().await.unwrap();
        daemon.set_forced_disconnect(true);
        let attempt = daemon.connect_wireless(snapshot.networks[1].id).unwrap();
        assert!(!daemon.forced_disconnect());
        assert_eq!(attempt.target(), "CafeGuest");
        assert_eq!(attempt.wait().await, ConnectResult::Success);
    }

    #[tokio::test]
    async fn test_connect_wired_marks_last_used() {
        let (daemon, mock) = mock_daemon();
        daemon.create_wired_profile("office", false).unwrap();
        let attempt = daemon.connect_wired(Some("office")).unwrap();
        assert_eq!(attempt.wait().await, ConnectResult::Success);
        assert_eq!(
            profile::last_used_wired_profile(daemon.wired_store()).as_deref(),
            Some("office")
        );
        assert!(mock.wired_state().called("start_dhcp"));

        // Without a name the default profile is used.
        let attempt = daemon.connect_wired(None).unwrap();
        assert_eq!(attempt.target(), profile::DEFAULT_WIRED_PROFILE);
        assert!(matches!(
            daemon.connect_wired(Some("missing")),
            Err(Error::ProfileNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_disconnect_and_suspend_set_flags() {
        let (daemon, mock) = mock_daemon();
        daemon.set_suspend(true).await.unwrap();
        assert!(daemon.suspended());
        assert!(daemon.forced_disconnect());
        assert!(mock.wired_state().called("flush_routes"));
        assert!(mock.wireless_state().called("flush_routes"));

        daemon.set_suspend(false).await.unwrap();
        assert!(!daemon.suspended());
    }

    #[tokio::test]
    async fn test_cancel_connect_forces_disconnect() {
        let (daemon, mock) = mock_daemon();
        mock.wired_state()
            .with(|s| s.dhcp_delay = Duration::from_millis(100));
        let attempt = daemon.connect_wired(None).unwrap();
        daemon.cancel_connect().await;
        assert_eq!(attempt.wait().await, ConnectResult::Aborted);
        assert!(daemon.forced_disconnect());
        assert!(!daemon.check_if_connecting());
    }

    #[tokio::test]
    async fn test_unknown_backend_keeps_current() {
        let (daemon, _mock) = mock_daemon();
        let mut rx = daemon.subscribe();
        assert!(matches!(daemon.load_backend("nm"), Err(Error::UnknownBackend(_))));
        assert_eq!(daemon.current_backend(), Some("mock"));

        daemon.load_backend("ioctl").unwrap();
        assert_eq!(daemon.current_backend(), Some("ioctl"));
        assert_eq!(
            rx.recv().await.unwrap(),
            DaemonEvent::BackendChanged {
                backend: "ioctl".into(),
                update_interval_ms: 3000
            }
        );
    }

    #[tokio::test]
    async fn test_wireless_profile_scripts_rejected() {
        let (daemon, _mock) = mock_daemon();
        let snapshot = daemon.scan().await.unwrap();
        let network = &snapshot.networks[0];
        let bssid = network.access_point.bssid.clone();

        let mut profile = network.profile_or_default();
        profile.automatic = true;
        daemon.save_wireless_profile(&bssid, profile.clone()).unwrap();
        let refreshed = daemon.snapshot();
        assert_eq!(refreshed.generation, snapshot.generation);
        assert!(refreshed.networks[0].profile.as_ref().is_some_and(|p| p.automatic));

        profile.before_script = Some("/tmp/evil".into());
        assert!(matches!(
            daemon.save_wireless_profile(&bssid, profile),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[tokio::test]
    async fn test_wired_profile_crud() {
        let (daemon, _mock) = mock_daemon();
        assert!(daemon.create_wired_profile("lab", true).unwrap());
        assert!(!daemon.create_wired_profile("lab", false).unwrap());
        assert_eq!(
            profile::default_wired_profile(daemon.wired_store()).as_deref(),
            Some("lab")
        );

        let mut lab = daemon.read_wired_profile("lab").unwrap();
        lab.ip = Some("10.1.0.2".into());
        daemon.save_wired_profile("lab", lab).unwrap();
        assert_eq!(daemon.read_wired_profile("lab").unwrap().ip.as_deref(), Some("10.1.0.2"));

        daemon.set_default_wired_profile(profile::DEFAULT_WIRED_PROFILE).unwrap();
        daemon.delete_wired_profile("lab").unwrap();
        assert!(matches!(daemon.delete_wired_profile("lab"), Err(Error::ProfileNotFound(_))));
    }

    #[tokio::test]
    async fn test_rfkill_toggles() {
        let (daemon, mock) = mock_daemon();
        assert!(!daemon.killswitch_enabled().await);
        assert!(daemon.switch_rfkill().await.unwrap());
        assert!(daemon.killswitch_enabled().await);
        assert!(mock.wireless_state().called("switch_rfkill"));
    }

    #[test]
    fn test_hidden_essid_blank_clears() {
        let (daemon, _mock) = mock_daemon();
        daemon.set_hidden_essid(Some("lab".into()));
        assert_eq!(daemon.hidden_essid().as_deref(), Some("lab"));
        daemon.set_hidden_essid(Some("  ".into()));
        assert_eq!(daemon.hidden_essid(), None);
    }

    #[test]
    fn test_settings_update_is_partial() {
        let (daemon, _mock) = mock_daemon();
        let before = daemon.runtime_settings();
        let after = daemon.apply_settings(SettingsUpdate {
            signal_display: Some(SignalDisplay::Dbm),
            need_profile_chooser: Some(true),
            ..Default::default()
        });
        assert_eq!(after.signal_display, SignalDisplay::Dbm);
        assert_eq!(after.auto_reconnect, before.auto_reconnect);
        assert!(daemon.need_profile_chooser());
    }
}
