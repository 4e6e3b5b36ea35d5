//! The daemon-wide connection status and the event stream front-ends
//! subscribe to.

use crate::types::{ConnectResult, ConnectStatus, ConnectionState, Medium};
use serde::{Deserialize, Serialize};
use std::sync::{Mutex, MutexGuard};
use tokio::sync::broadcast;

const EVENT_CAPACITY: usize = 64;

/// Notifications broadcast to every subscriber.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum DaemonEvent {
    StatusChanged(ConnectionStatus),
    BackendChanged {
        backend: String,
        update_interval_ms: u64,
    },
    ScanStarted,
    ScanFinished {
        generation: u64,
        count: usize,
    },
    ConnectFinished {
        medium: Medium,
        result: ConnectResult,
        status: ConnectStatus,
    },
    /// Asks a front-end to let the user pick a wired profile.
    LaunchChooser,
}

pub type EventSender = broadcast::Sender<DaemonEvent>;

pub fn event_channel() -> EventSender {
    broadcast::channel(EVENT_CAPACITY).0
}

/// A connection state with its state-specific details.
///
/// `info` is `[""]` when not connected or suspended, `["wired"]` or
/// `["wireless", essid]` while connecting, `[ip]` on a wired link and
/// `[ip, essid, signal, index]` on a wireless link, where `index` is the
/// network's position in the current scan or `-1`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionStatus {
    pub state: ConnectionState,
    pub info: Vec<String>,
}

impl ConnectionStatus {
    pub fn not_connected() -> Self {
        Self {
            state: ConnectionState::NotConnected,
            info: vec![String::new()],
        }
    }

    pub fn suspended() -> Self {
        Self {
            state: ConnectionState::Suspended,
            info: vec![String::new()],
        }
    }

    pub fn connecting(medium: Medium, essid: Option<&str>) -> Self {
        let info = match medium {
            Medium::Wired => vec!["wired".to_string()],
            Medium::Wireless => vec!["wireless".to_string(), essid.unwrap_or_default().to_string()],
        };
        Self {
            state: ConnectionState::Connecting,
            info,
        }
    }

    pub fn wired(ip: &str) -> Self {
        Self {
            state: ConnectionState::Wired,
            info: vec![ip.to_string()],
        }
    }

    pub fn wireless(ip: &str, essid: &str, signal: i32, index: Option<usize>) -> Self {
        let index = index.map_or_else(|| "-1".to_string(), |i| i.to_string());
        Self {
            state: ConnectionState::Wireless,
            info: vec![ip.to_string(), essid.to_string(), signal.to_string(), index],
        }
    }
}

/// Shared status cell. Writers are the monitor and the explicit status RPC;
/// the last write wins.
#[derive(Debug)]
pub struct StatusModel {
    current: Mutex<ConnectionStatus>,
    events: EventSender,
}

impl StatusModel {
    pub fn new(events: EventSender) -> Self {
        Self {
            current: Mutex::new(ConnectionStatus::not_connected()),
            events,
        }
    }

    fn lock(&self) -> MutexGuard<'_, ConnectionStatus> {
        self.current
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn get(&self) -> ConnectionStatus {
        self.lock().clone()
    }

    pub fn state(&self) -> ConnectionState {
        self.lock().state
    }

    /// Stores `status` and emits `StatusChanged` if the state changed, or if
    /// the link is wireless and `signal_changed` is set. Returns whether an
    /// event was emitted.
    pub fn update(&self, status: ConnectionStatus, signal_changed: bool) -> bool {
        let emit = {
            let mut current = self.lock();
            let emit = current.state != status.state
                || (status.state == ConnectionState::Wireless && signal_changed);
            *current = status.clone();
            emit
        };
        if emit {
            tracing::debug!(state = ?status.state, info = ?status.info, "Connection status changed");
            // No subscribers is fine.
            let _ = self.events.send(DaemonEvent::StatusChanged(status));
        }
        emit
    }

    /// Explicit overwrite from a client. A wireless status counts as changed
    /// when its details differ.
    pub fn set(&self, state: ConnectionState, info: Vec<String>) -> bool {
        let details_changed = self.lock().info != info;
        self.update(ConnectionStatus { state, info }, details_changed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_info_shapes() {
        assert_eq!(ConnectionStatus::not_connected().info, vec![""]);
        assert_eq!(ConnectionStatus::suspended().info, vec![""]);
        assert_eq!(ConnectionStatus::connecting(Medium::Wired, None).info, vec!["wired"]);
        assert_eq!(
            ConnectionStatus::connecting(Medium::Wireless, Some("home")).info,
            vec!["wireless", "home"]
        );
        assert_eq!(
            ConnectionStatus::wireless("10.0.0.5", "home", 70, None).info,
            vec!["10.0.0.5", "home", "70", "-1"]
        );
        assert_eq!(
            ConnectionStatus::wireless("10.0.0.5", "home", -60, Some(2)).info,
            vec!["10.0.0.5", "home", "-60", "2"]
        );
    }

    #[test]
    fn test_events_only_on_change() {
        let events = event_channel();
        let mut rx = events.subscribe();
        let model = StatusModel::new(events);

        assert!(!model.update(ConnectionStatus::not_connected(), false));
        assert!(model.update(ConnectionStatus::wired("10.0.0.5"), false));
        assert!(!model.update(ConnectionStatus::wired("10.0.0.6"), true));
        assert!(model.update(ConnectionStatus::wireless("10.0.0.7", "home", 70, None), false));
        assert!(!model.update(ConnectionStatus::wireless("10.0.0.7", "home", 70, None), false));
        assert!(model.update(ConnectionStatus::wireless("10.0.0.7", "home", 40, None), true));

        let mut states = Vec::new();
        while let Ok(DaemonEvent::StatusChanged(status)) = rx.try_recv() {
            states.push(status.state);
        }
        assert_eq!(
            states,
            vec![
                ConnectionState::Wired,
                ConnectionState::Wireless,
                ConnectionState::Wireless
            ]
        );
        assert_eq!(model.get().info[0], "10.0.0.7");
    }

    #[test]
    fn test_event_serialization() {
        let json = serde_json::to_value(DaemonEvent::ConnectFinished {
            medium: Medium::Wireless,
            result: ConnectResult::BadPass,
            status: ConnectStatus::ValidatingAuthentication,
        })
        .unwrap();
        assert_eq!(json["event"], "connect_finished");
        assert_eq!(json["result"], "bad_pass");
        assert_eq!(json["status"], "validating_authentication");
    }
}
