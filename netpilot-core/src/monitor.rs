//! Periodic link monitor: keeps the connection status current, notices a
//! lost wireless link and triggers reconnects and background rescans.

use crate::autoconnect::AutoConnectOutcome;
use crate::daemon::Daemon;
use crate::status::ConnectionStatus;
use crate::types::{ConnectionState, Medium};
use std::sync::Arc;
use tokio::time::{Instant, MissedTickBehavior};

/// Bssid and essid of the wireless network last seen connected.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct SeenNetwork {
    bssid: Option<String>,
    essid: Option<String>,
}

pub struct Monitor {
    daemon: Arc<Daemon>,
    last_state: ConnectionState,
    last_signal: Option<i32>,
    last_network: SeenNetwork,
    zero_signal_polls: u32,
    reconnect_tries: u32,
    last_reconnect: Option<Instant>,
    last_rescan: Instant,
}

impl std::fmt::Debug for Monitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Monitor")
            .field("last_state", &self.last_state)
            .field("zero_signal_polls", &self.zero_signal_polls)
            .field("reconnect_tries", &self.reconnect_tries)
            .finish_non_exhaustive()
    }
}

impl Monitor {
    pub fn new(daemon: Arc<Daemon>) -> Self {
        Self {
            daemon,
            last_state: ConnectionState::NotConnected,
            last_signal: None,
            last_network: SeenNetwork::default(),
            zero_signal_polls: 0,
            reconnect_tries: 0,
            last_reconnect: None,
            last_rescan: Instant::now(),
        }
    }

    /// Polls forever at the configured interval.
    pub async fn run(mut self) {
        let period = self.daemon.config().thresholds.monitor_interval;
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tracing::info!(?period, "Connection monitor started");
        loop {
            let now = interval.tick().await;
            self.tick(now).await;
        }
    }

    /// One monitoring pass. Returns the state it settled on.
    pub async fn tick(&mut self, now: Instant) -> ConnectionState {
        let state = self.update_state(now).await;
        self.maybe_rescan(now).await;
        state
    }

    async fn update_state(&mut self, now: Instant) -> ConnectionState {
        let daemon = self.daemon.clone();

        if daemon.suspended() {
            return self.settle(ConnectionStatus::suspended(), false);
        }

        if let Some(ip) = daemon.wired.get_ip().await {
            if daemon.wired.plugged_in().await {
                self.reconnect_tries = 0;
                return self.settle(ConnectionStatus::wired(&ip), false);
            }
        }

        if let Some(ip) = daemon.wireless.get_ip().await {
            if let Some((status, signal_changed)) = self.check_wireless(&ip).await {
                self.reconnect_tries = 0;
                return self.settle(status, signal_changed);
            }
        }

        if let Some(status) = self.connecting_status() {
            return self.settle(status, false);
        }

        let previous = self.last_state;
        self.settle(ConnectionStatus::not_connected(), false);
        self.reconnect(previous, now).await;
        ConnectionState::NotConnected
    }

    /// Reads the wireless link. `None` means the link counts as lost.
    async fn check_wireless(&mut self, ip: &str) -> Option<(ConnectionStatus, bool)> {
        let daemon = self.daemon.clone();
        let display = daemon.runtime_settings().signal_display;
        let signal = daemon.wireless.signal(display).await.unwrap_or(0);

        if signal == 0 {
            self.zero_signal_polls += 1;
            let limit = daemon.config().thresholds.signal_loss_polls;
            if self.zero_signal_polls >= limit {
                self.zero_signal_polls = 0;
                // The link is only torn down when a reconnect will follow.
                if !daemon.should_auto_reconnect() {
                    tracing::warn!("Wireless signal lost, auto reconnect is off");
                    return None;
                }
                tracing::warn!(polls = limit, "Wireless signal lost, disconnecting");
                if let Err(e) = daemon.wireless.disconnect().await {
                    tracing::warn!(error = %e, "Disconnect after signal loss failed");
                }
                return None;
            }
        } else {
            self.zero_signal_polls = 0;
        }

        let network = SeenNetwork {
            bssid: daemon.wireless.bssid().await,
            essid: daemon.wireless.current_network().await,
        };
        let changed = self.last_signal != Some(signal) || self.last_network != network;
        let index = daemon
            .snapshot()
            .find(network.bssid.as_deref(), network.essid.as_deref())
            .map(|n| n.id.index);
        let status = ConnectionStatus::wireless(
            ip,
            network.essid.as_deref().unwrap_or_default(),
            signal,
            index,
        );
        self.last_signal = Some(signal);
        self.last_network = network;
        Some((status, changed))
    }

    fn connecting_status(&self) -> Option<ConnectionStatus> {
        let daemon = &self.daemon;
        if daemon.wireless.is_connecting() {
            let target = daemon.wireless.attempt().map(|a| a.target().to_string());
            return Some(ConnectionStatus::connecting(Medium::Wireless, target.as_deref()));
        }
        if daemon.wired.is_connecting() {
            return Some(ConnectionStatus::connecting(Medium::Wired, None));
        }
        None
    }

    fn settle(&mut self, status: ConnectionStatus, signal_changed: bool) -> ConnectionState {
        let state = status.state;
        self.daemon.status().update(status, signal_changed);
        self.last_state = state;
        state
    }

    /// Tries to get back online after the link went away.
    async fn reconnect(&mut self, previous: ConnectionState, now: Instant) -> Option<AutoConnectOutcome> {
        let daemon = self.daemon.clone();
        let thresholds = &daemon.config().thresholds;
        let throttled = self.reconnect_tries > thresholds.reconnect_max_tries
            && self
                .last_reconnect
                .is_some_and(|t| now.saturating_duration_since(t) < thresholds.reconnect_window);
        if throttled {
            tracing::debug!(tries = self.reconnect_tries, "Reconnect throttled");
            return None;
        }
        if !daemon.should_auto_reconnect() {
            return None;
        }
        self.reconnect_tries += 1;
        self.last_reconnect = Some(now);

        if previous == ConnectionState::Wireless {
            let snapshot = daemon.snapshot();
            let last = snapshot.find(self.last_network.bssid.as_deref(), self.last_network.essid.as_deref());
            if let Some(network) = last {
                let essid = network.access_point.essid.clone();
                tracing::info!(essid = %essid, tries = self.reconnect_tries, "Reconnecting to last wireless network");
                match daemon.connect_wireless(network.id) {
                    Ok(_) => return Some(AutoConnectOutcome::Wireless(essid)),
                    Err(e) => tracing::warn!(error = %e, "Reconnect to last network failed"),
                }
            }
        }
        tracing::info!(tries = self.reconnect_tries, "Connection lost, running autoconnect");
        Some(daemon.auto_connect(true).await)
    }

    async fn maybe_rescan(&mut self, now: Instant) {
        let daemon = &self.daemon;
        let due = now.saturating_duration_since(self.last_rescan) >= daemon.config().thresholds.rescan_interval;
        if !due || daemon.suspended() || daemon.check_if_connecting() {
            return;
        }
        self.last_rescan = now;
        if let Err(e) = daemon.scan().await {
            tracing::warn!(error = %e, "Background rescan failed");
        }
    }
}
