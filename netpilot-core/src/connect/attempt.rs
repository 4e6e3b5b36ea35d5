use crate::traits::{Interface, WiredInterface, WirelessInterface};
use crate::types::{ConnectResult, ConnectStatus, Medium};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::watch;

/// The interface an attempt drives, typed by medium.
#[derive(Clone)]
pub enum Link {
    Wired(Arc<dyn WiredInterface>),
    Wireless(Arc<dyn WirelessInterface>),
}

impl Link {
    pub fn medium(&self) -> Medium {
        match self {
            Link::Wired(_) => Medium::Wired,
            Link::Wireless(_) => Medium::Wireless,
        }
    }

    pub fn iface(&self) -> Arc<dyn Interface> {
        match self {
            Link::Wired(iface) => iface.clone(),
            Link::Wireless(iface) => iface.clone(),
        }
    }
}

impl From<Arc<dyn WiredInterface>> for Link {
    fn from(iface: Arc<dyn WiredInterface>) -> Self {
        Link::Wired(iface)
    }
}

impl From<Arc<dyn WirelessInterface>> for Link {
    fn from(iface: Arc<dyn WirelessInterface>) -> Self {
        Link::Wireless(iface)
    }
}

impl std::fmt::Debug for Link {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Link")
            .field(&self.medium())
            .field(&self.iface().name())
            .finish()
    }
}

#[derive(Debug)]
struct AttemptState {
    status: ConnectStatus,
    cancel_requested: bool,
    abort_reason: Option<ConnectResult>,
    result: Option<ConnectResult>,
    is_running: bool,
}

struct AttemptInner {
    medium: Medium,
    target: String,
    iface: Arc<dyn Interface>,
    state: Mutex<AttemptState>,
    done: watch::Sender<Option<ConnectResult>>,
}

/// Shared handle to one connection attempt.
///
/// Clones refer to the same attempt. The state lock is only ever taken for
/// short synchronous sections and is never held across an `.await`.
#[derive(Clone)]
pub struct ConnectAttempt {
    inner: Arc<AttemptInner>,
}

impl std::fmt::Debug for ConnectAttempt {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectAttempt")
            .field("medium", &self.inner.medium)
            .field("target", &self.inner.target)
            .field("state", &*self.state())
            .finish()
    }
}

impl ConnectAttempt {
    /// A new attempt, marked running. `target` is the essid or wired
    /// profile name, used for status reporting.
    pub fn new(link: &Link, target: impl Into<String>) -> Self {
        let (done, _) = watch::channel(None);
        Self {
            inner: Arc::new(AttemptInner {
                medium: link.medium(),
                target: target.into(),
                iface: link.iface(),
                state: Mutex::new(AttemptState {
                    status: ConnectStatus::InterfaceDown,
                    cancel_requested: false,
                    abort_reason: None,
                    result: None,
                    is_running: true,
                }),
                done,
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, AttemptState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn medium(&self) -> Medium {
        self.inner.medium
    }

    pub fn target(&self) -> &str {
        &self.inner.target
    }

    pub fn status(&self) -> ConnectStatus {
        self.state().status
    }

    pub fn result(&self) -> Option<ConnectResult> {
        self.state().result
    }

    pub fn is_running(&self) -> bool {
        self.state().is_running
    }

    pub fn cancel_requested(&self) -> bool {
        self.state().cancel_requested
    }

    pub(crate) fn set_status(&self, status: ConnectStatus) {
        self.state().status = status;
    }

    /// Records why the running step failed and asks the runner to stop at
    /// its next checkpoint. A cancel that came first keeps its `aborted`.
    pub(crate) fn fail(&self, reason: ConnectResult) {
        let mut state = self.state();
        if !state.cancel_requested {
            state.abort_reason = Some(reason);
            state.cancel_requested = true;
        }
    }

    /// Ends the attempt if a stop was requested. Returns the final result
    /// in that case so the runner can bail out with `?`.
    pub(crate) fn checkpoint(&self) -> Result<(), ConnectResult> {
        let reason = {
            let state = self.state();
            if !state.cancel_requested {
                return Ok(());
            }
            state.abort_reason.unwrap_or(ConnectResult::Aborted)
        };
        self.finish(reason);
        Err(self.result().unwrap_or(reason))
    }

    /// Writes the terminal result. Only the first call has any effect; it
    /// returns whether this call was the one that completed the attempt.
    pub(crate) fn finish(&self, result: ConnectResult) -> bool {
        {
            let mut state = self.state();
            if state.result.is_some() {
                return false;
            }
            state.result = Some(result);
            state.is_running = false;
        }
        self.inner.done.send_replace(Some(result));
        true
    }

    /// Requests cancellation and tears down whatever the attempt may have
    /// left running. Has no effect once the attempt has finished.
    pub async fn cancel(&self) {
        {
            let mut state = self.state();
            if !state.is_running {
                return;
            }
            state.cancel_requested = true;
        }
        let iface = &self.inner.iface;
        tracing::info!(medium = %self.inner.medium, iface = iface.name(), "Cancelling connection attempt");
        if let Err(e) = iface.release_dhcp().await {
            tracing::warn!(iface = iface.name(), error = %e, "Could not release DHCP lease");
        }
        if let Err(e) = iface.stop_dhcp().await {
            tracing::warn!(iface = iface.name(), error = %e, "Could not stop DHCP client");
        }
        if let Err(e) = iface.stop_wpa().await {
            tracing::warn!(iface = iface.name(), error = %e, "Could not stop wpa_supplicant");
        }
    }

    /// Waits until the attempt has a result.
    pub async fn wait(&self) -> ConnectResult {
        let mut rx = self.inner.done.subscribe();
        let finished = match rx.wait_for(Option::is_some).await {
            Ok(result) => *result,
            Err(_) => None,
        };
        finished
            .or_else(|| self.result())
            .unwrap_or(ConnectResult::Aborted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::mock::MockBackend;
    use crate::traits::Backend;

    fn attempt() -> (MockBackend, ConnectAttempt) {
        let backend = MockBackend::new();
        let link = Link::Wireless(backend.wireless("wlan0"));
        let attempt = ConnectAttempt::new(&link, "home");
        (backend, attempt)
    }

    #[tokio::test]
    async fn test_result_is_write_once() {
        let (backend, attempt) = attempt();
        assert!(attempt.is_running());
        assert!(attempt.finish(ConnectResult::Success));
        assert!(!attempt.finish(ConnectResult::BadPass));
        assert_eq!(attempt.result(), Some(ConnectResult::Success));

        // Cancelling a finished attempt changes nothing and touches no helper.
        attempt.cancel().await;
        assert_eq!(attempt.result(), Some(ConnectResult::Success));
        assert!(!attempt.cancel_requested());
        assert!(backend.wireless_state().calls().is_empty());
        assert_eq!(attempt.wait().await, ConnectResult::Success);
    }

    #[tokio::test]
    async fn test_cancel_wins_over_later_failure() {
        let (backend, attempt) = attempt();
        attempt.cancel().await;
        attempt.fail(ConnectResult::DhcpFailed);
        assert_eq!(attempt.checkpoint(), Err(ConnectResult::Aborted));
        assert!(!attempt.is_running());
        assert_eq!(
            backend.wireless_state().calls(),
            vec!["release_dhcp", "stop_dhcp", "stop_wpa"]
        );
    }

    #[tokio::test]
    async fn test_failure_reason_recorded_at_checkpoint() {
        let (_backend, attempt) = attempt();
        assert_eq!(attempt.checkpoint(), Ok(()));
        attempt.fail(ConnectResult::BadPass);
        attempt.fail(ConnectResult::DhcpFailed);
        assert_eq!(attempt.checkpoint(), Err(ConnectResult::BadPass));
        assert_eq!(attempt.wait().await, ConnectResult::BadPass);
    }

    #[tokio::test]
    async fn test_wait_wakes_on_finish() {
        let (_backend, attempt) = attempt();
        let waiter = {
            let attempt = attempt.clone();
            tokio::spawn(async move { attempt.wait().await })
        };
        tokio::task::yield_now().await;
        attempt.finish(ConnectResult::NoDhcpOffers);
        assert_eq!(waiter.await.unwrap(), ConnectResult::NoDhcpOffers);
    }
}
