//! Picks a network to connect to without user input: wired first when a
//! cable is present, then the best automatic wireless network.

use crate::config::WiredConnectMode;
use crate::daemon::Daemon;
use crate::profile;
use crate::status::DaemonEvent;
use serde::Serialize;
use std::sync::Arc;

/// What an autoconnect pass decided.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "network", rename_all = "snake_case")]
pub enum AutoConnectOutcome {
    /// A connect is in progress or a front-end is open.
    Suppressed,
    /// Started a wired attempt with this profile.
    Wired(String),
    /// Started a wireless attempt to this essid.
    Wireless(String),
    /// Asked a front-end to pick a wired profile.
    ChooserRequested,
    NoCandidate,
}

impl Daemon {
    /// Runs one autoconnect pass. With `fresh` the wireless scan is redone
    /// first; otherwise the current snapshot is used.
    pub async fn auto_connect(self: &Arc<Self>, fresh: bool) -> AutoConnectOutcome {
        if self.check_if_connecting() || self.gui_open() {
            tracing::debug!("Autoconnect suppressed");
            return AutoConnectOutcome::Suppressed;
        }
        if fresh {
            if let Err(e) = self.scan().await {
                tracing::warn!(error = %e, "Rescan before autoconnect failed");
            }
        }

        if self.wired.iface().is_some() && self.wired.plugged_in().await {
            if let Some(outcome) = self.wired_autoconnect() {
                return outcome;
            }
        }
        self.wireless_autoconnect()
    }

    /// Picks a wired profile per the configured mode. `None` means no profile
    /// fits and wireless should be tried instead.
    fn wired_autoconnect(self: &Arc<Self>) -> Option<AutoConnectOutcome> {
        let store = self.wired_store();
        let mode = self.runtime_settings().wired_connect_mode;
        let name = match mode {
            WiredConnectMode::Chooser if !self.need_profile_chooser() => {
                tracing::info!("Wired link detected, asking for a profile");
                self.set_need_profile_chooser(true);
                self.emit(DaemonEvent::LaunchChooser);
                return Some(AutoConnectOutcome::ChooserRequested);
            }
            // A chooser is already pending; fall back to the last profile.
            WiredConnectMode::Chooser | WiredConnectMode::LastUsed => {
                profile::last_used_wired_profile(store).or_else(|| profile::default_wired_profile(store))
            }
            WiredConnectMode::Default => profile::default_wired_profile(store),
        };
        let Some(name) = name else {
            tracing::info!(mode = ?mode, "No wired profile to autoconnect with, trying wireless");
            return None;
        };

        match self.connect_wired(Some(&name)) {
            Ok(_) => {
                self.set_auto_connecting(true);
                self.spawn_wired_watcher();
                Some(AutoConnectOutcome::Wired(name))
            }
            Err(e) => {
                tracing::warn!(profile = %name, error = %e, "Wired autoconnect failed, trying wireless");
                None
            }
        }
    }

    /// Waits for the wired attempt and falls back to wireless if it did not
    /// end with an address.
    fn spawn_wired_watcher(self: &Arc<Self>) {
        let daemon = self.clone();
        let poll = self.config().thresholds.wired_autoconnect_poll;
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(poll).await;
                if !daemon.wired.is_connecting() {
                    break;
                }
            }
            if daemon.wired.get_ip().await.is_none() && !daemon.wireless.is_connecting() {
                tracing::info!("Wired autoconnect got no address, trying wireless");
                daemon.wireless_autoconnect();
            }
            daemon.set_auto_connecting(false);
        });
    }

    /// Connects to the strongest network whose saved profile allows it.
    pub fn wireless_autoconnect(&self) -> AutoConnectOutcome {
        if self.wireless.iface().is_none() {
            return AutoConnectOutcome::NoCandidate;
        }
        let snapshot = self.snapshot();
        let candidate = snapshot.networks.iter().find(|n| {
            n.profile
                .as_ref()
                .is_some_and(|p| p.automatic && !p.never_connect)
        });
        let Some(network) = candidate else {
            tracing::debug!(networks = snapshot.len(), "No automatic wireless network in range");
            return AutoConnectOutcome::NoCandidate;
        };
        let essid = network.access_point.essid.clone();
        match self.connect_wireless(network.id) {
            Ok(_) => {
                tracing::info!(essid = %essid, "Autoconnecting to wireless network");
                AutoConnectOutcome::Wireless(essid)
            }
            Err(e) => {
                tracing::warn!(essid = %essid, error = %e, "Wireless autoconnect failed");
                AutoConnectOutcome::NoCandidate
            }
        }
    }
}
