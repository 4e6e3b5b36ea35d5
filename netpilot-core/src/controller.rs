//! Per-medium controllers: the only place that starts, tracks and cancels
//! connection attempts for an interface.

use crate::backends::utils::execute_script;
use crate::config::{GlobalScripts, Thresholds};
use crate::connect::{ConnectAttempt, ConnectContext, Link, build_plan, run};
use crate::profile::{DnsSettings, NetworkProfile};
use crate::scan;
use crate::status::{DaemonEvent, EventSender};
use crate::traits::{Interface, WiredInterface, WirelessInterface};
use crate::types::{AccessPoint, ConnectStatus, Medium, SignalDisplay};
use crate::{Error, Result};
use std::sync::{Arc, Mutex, RwLock};

/// Connection settings shared by every attempt a controller starts.
#[derive(Debug, Clone, Default)]
pub struct ControllerSettings {
    /// Resolvers for profiles that select global DNS.
    pub global_dns: DnsSettings,
    pub scripts: GlobalScripts,
    pub hostname: Option<String>,
    pub verify_ap: bool,
    pub thresholds: Thresholds,
}

/// Drives one interface of one medium.
pub struct Controller<I: ?Sized> {
    medium: Medium,
    iface_name: String,
    iface: RwLock<Option<Arc<I>>>,
    settings: RwLock<ControllerSettings>,
    attempt: Mutex<Option<ConnectAttempt>>,
    /// Profile of the latest attempt; its disconnect script is used later.
    profile: Mutex<Option<NetworkProfile>>,
    events: EventSender,
}

pub type WiredController = Controller<dyn WiredInterface>;
pub type WirelessController = Controller<dyn WirelessInterface>;

impl<I: ?Sized> std::fmt::Debug for Controller<I> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Controller")
            .field("medium", &self.medium)
            .field("iface_name", &self.iface_name)
            .finish_non_exhaustive()
    }
}

fn first_script<'a>(profile: Option<&'a String>, global: Option<&'a String>) -> Option<String> {
    profile
        .filter(|s| !s.is_empty())
        .or(global.filter(|s| !s.is_empty()))
        .cloned()
}

impl<I> Controller<I>
where
    I: Interface + ?Sized + 'static,
    Arc<I>: Into<Link>,
{
    pub fn new(
        medium: Medium,
        iface_name: impl Into<String>,
        settings: ControllerSettings,
        events: EventSender,
    ) -> Self {
        Self {
            medium,
            iface_name: iface_name.into(),
            iface: RwLock::new(None),
            settings: RwLock::new(settings),
            attempt: Mutex::new(None),
            profile: Mutex::new(None),
            events,
        }
    }

    pub fn medium(&self) -> Medium {
        self.medium
    }

    pub fn iface_name(&self) -> &str {
        &self.iface_name
    }

    /// Binds the interface instance built by the current backend.
    pub fn bind(&self, iface: Option<Arc<I>>) {
        *self.iface.write().unwrap_or_else(|p| p.into_inner()) = iface;
    }

    pub fn iface(&self) -> Option<Arc<I>> {
        self.iface.read().unwrap_or_else(|p| p.into_inner()).clone()
    }

    fn require_iface(&self) -> Result<Arc<I>> {
        self.iface().ok_or(Error::NoBackend(match self.medium {
            Medium::Wired => "wired",
            Medium::Wireless => "wireless",
        }))
    }

    pub fn settings(&self) -> ControllerSettings {
        self.settings.read().unwrap_or_else(|p| p.into_inner()).clone()
    }

    pub fn update_settings(&self, f: impl FnOnce(&mut ControllerSettings)) {
        f(&mut self.settings.write().unwrap_or_else(|p| p.into_inner()));
    }

    /// The most recent attempt, finished or not.
    pub fn attempt(&self) -> Option<ConnectAttempt> {
        self.attempt.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }

    /// Profile of the most recent attempt.
    pub fn profile(&self) -> Option<NetworkProfile> {
        self.profile.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }

    pub fn is_connecting(&self) -> bool {
        self.attempt().is_some_and(|a| a.is_running())
    }

    /// Step the running attempt is on, if one is running.
    pub fn connecting_status(&self) -> Option<ConnectStatus> {
        self.attempt()
            .filter(ConnectAttempt::is_running)
            .map(|a| a.status())
    }

    /// Starts an attempt on its own task and makes it the current one.
    ///
    /// A previous attempt is not cancelled here; callers that need that do
    /// it explicitly.
    pub fn connect(&self, profile: NetworkProfile) -> Result<ConnectAttempt> {
        let iface = self.require_iface()?;
        let settings = self.settings();
        let link: Link = iface.into();
        let target = match self.medium {
            Medium::Wireless => profile.essid.clone().unwrap_or_else(|| profile.name.clone()),
            Medium::Wired => profile.name.clone(),
        };

        *self.profile.lock().unwrap_or_else(|p| p.into_inner()) = Some(profile.clone());
        let ctx = ConnectContext {
            pre_script: first_script(profile.before_script.as_ref(), settings.scripts.pre_connect.as_ref()),
            post_script: first_script(profile.after_script.as_ref(), settings.scripts.post_connect.as_ref()),
            link: link.clone(),
            profile,
            global_dns: settings.global_dns,
            hostname: settings.hostname,
            verify_ap: settings.verify_ap,
            thresholds: settings.thresholds,
        };
        let plan = build_plan(&ctx);
        let attempt = ConnectAttempt::new(&link, target);
        tracing::info!(medium = %self.medium, iface = %self.iface_name, network = attempt.target(), steps = plan.len(), "Starting connection attempt");

        let task_attempt = attempt.clone();
        let events = self.events.clone();
        let medium = self.medium;
        tokio::spawn(async move {
            let result = run(&task_attempt, ctx, &plan).await;
            let _ = events.send(DaemonEvent::ConnectFinished {
                medium,
                result,
                status: task_attempt.status(),
            });
        });

        *self.attempt.lock().unwrap_or_else(|p| p.into_inner()) = Some(attempt.clone());
        Ok(attempt)
    }

    /// Cancels the current attempt, if it is still running.
    pub async fn cancel(&self) {
        if let Some(attempt) = self.attempt() {
            attempt.cancel().await;
        }
    }

    /// Tears the link down. The last profile's disconnect script takes
    /// precedence over the global pre-disconnect script.
    pub async fn disconnect(&self) -> Result<()> {
        let iface = self.require_iface()?;
        let scripts = self.settings().scripts;
        let profile = self.profile();
        let name = iface.name().to_string();
        tracing::info!(medium = %self.medium, iface = %name, "Disconnecting");

        let pre = first_script(
            profile.as_ref().and_then(|p| p.disconnect_script.as_ref()),
            scripts.pre_disconnect.as_ref(),
        );
        if let Some(script) = pre {
            execute_script(&script, &name).await;
        }
        if let Err(e) = iface.release_dhcp().await {
            tracing::debug!(iface = %name, error = %e, "No DHCP lease to release");
        }
        iface.set_address(Some("0.0.0.0"), None, None).await?;
        iface.flush_routes().await?;
        iface.down().await?;
        iface.up().await?;
        if let Some(script) = scripts.post_disconnect.as_deref().filter(|s| !s.is_empty()) {
            execute_script(script, &name).await;
        }
        Ok(())
    }

    pub async fn get_ip(&self) -> Option<String> {
        match self.iface() {
            Some(iface) => iface.get_ip().await,
            None => None,
        }
    }
}

impl WiredController {
    pub async fn plugged_in(&self) -> bool {
        match self.iface() {
            Some(iface) => iface.plugged_in().await,
            None => false,
        }
    }
}

impl WirelessController {
    pub async fn scan(&self, hidden_essid: Option<&str>) -> Result<Vec<AccessPoint>> {
        let iface = self.require_iface()?;
        scan::scan(iface.as_ref(), hidden_essid).await
    }

    /// Current signal per `display`: a percentage or dBm.
    pub async fn signal(&self, display: SignalDisplay) -> Option<i32> {
        let iface = self.iface()?;
        match display {
            SignalDisplay::Percent => iface.signal_strength().await,
            SignalDisplay::Dbm => iface.dbm_strength().await,
        }
    }

    pub async fn current_network(&self) -> Option<String> {
        self.iface()?.current_network().await
    }

    pub async fn bssid(&self) -> Option<String> {
        self.iface()?.bssid().await
    }

    pub async fn killswitch_enabled(&self) -> bool {
        match self.iface() {
            Some(iface) => iface.killswitch_enabled().await,
            None => false,
        }
    }

    pub async fn switch_rfkill(&self) -> Result<bool> {
        self.require_iface()?.switch_rfkill().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::mock::MockBackend;
    use crate::status::event_channel;
    use crate::traits::Backend;
    use crate::types::ConnectResult;

    fn settings() -> ControllerSettings {
        ControllerSettings {
            thresholds: Thresholds::for_tests(),
            verify_ap: true,
            ..Default::default()
        }
    }

    fn profile() -> NetworkProfile {
        NetworkProfile {
            name: "02:00:00:00:00:01".into(),
            essid: Some("home".into()),
            bssid: Some("02:00:00:00:00:01".into()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_connect_without_interface_fails() {
        let controller = WirelessController::new(Medium::Wireless, "wlan0", settings(), event_channel());
        assert!(matches!(
            controller.connect(profile()),
            Err(Error::NoBackend("wireless"))
        ));
        assert!(controller.attempt().is_none());
        assert!(!controller.is_connecting());
    }

    #[tokio::test]
    async fn test_connect_broadcasts_result() {
        let backend = MockBackend::new();
        let events = event_channel();
        let mut rx = events.subscribe();
        let controller = WirelessController::new(Medium::Wireless, "wlan0", settings(), events);
        controller.bind(Some(backend.wireless("wlan0")));

        let attempt = controller.connect(profile()).unwrap();
        assert_eq!(attempt.target(), "home");
        assert_eq!(attempt.wait().await, ConnectResult::Success);

        let event = rx.recv().await.unwrap();
        assert_eq!(
            event,
            DaemonEvent::ConnectFinished {
                medium: Medium::Wireless,
                result: ConnectResult::Success,
                status: ConnectStatus::Done,
            }
        );
        assert!(!controller.is_connecting());
        assert_eq!(controller.connecting_status(), None);
        assert_eq!(controller.get_ip().await.as_deref(), Some("192.168.1.50"));
    }

    #[tokio::test]
    async fn test_profile_script_overrides_global() {
        assert_eq!(
            first_script(Some(&"/a".to_string()), Some(&"/b".to_string())).as_deref(),
            Some("/a")
        );
        assert_eq!(
            first_script(Some(&String::new()), Some(&"/b".to_string())).as_deref(),
            Some("/b")
        );
        assert_eq!(first_script(None, None), None);
    }

    #[tokio::test]
    async fn test_disconnect_sequence() {
        let backend = MockBackend::new();
        let controller = WiredController::new(Medium::Wired, "eth0", settings(), event_channel());
        controller.bind(Some(backend.wired("eth0")));

        controller.disconnect().await.unwrap();
        assert_eq!(
            backend.wired_state().calls(),
            vec!["release_dhcp", "set_address 0.0.0.0", "flush_routes", "down", "up"]
        );
    }

    #[tokio::test]
    async fn test_signal_display_modes() {
        let backend = MockBackend::new();
        let controller = WirelessController::new(Medium::Wireless, "wlan0", settings(), event_channel());
        assert_eq!(controller.signal(SignalDisplay::Percent).await, None);
        controller.bind(Some(backend.wireless("wlan0")));
        assert_eq!(controller.signal(SignalDisplay::Percent).await, Some(70));
        assert_eq!(controller.signal(SignalDisplay::Dbm).await, Some(-60));
    }
}
