//! Interface backends and the registry that selects between them.

pub mod dhcp;
pub mod external;
pub mod ioctl;
pub mod templates;
pub mod utils;

#[cfg(any(test, feature = "backend_mock"))]
pub mod mock;

use crate::config::{DaemonConfig, DhcpClientChoice, FlushTool, LinkDetectTool};
use crate::traits::Backend;
use crate::{Error, Result};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// The subset of the daemon config that interface implementations need.
#[derive(Debug, Clone)]
pub struct BackendSettings {
    pub wpa_driver: String,
    pub dhcp_client: DhcpClientChoice,
    pub link_detect_tool: LinkDetectTool,
    pub flush_tool: FlushTool,
    pub networks_dir: PathBuf,
    pub templates_dir: PathBuf,
    pub resolv_conf: PathBuf,
    pub link_detect_settle: Duration,
    /// Upper bound for one gateway reachability check.
    pub verify_ap_interval: Duration,
}

impl From<&DaemonConfig> for BackendSettings {
    fn from(config: &DaemonConfig) -> Self {
        Self {
            wpa_driver: config.wpa_driver.clone(),
            dhcp_client: config.dhcp_client,
            link_detect_tool: config.link_detect_tool,
            flush_tool: config.flush_tool,
            networks_dir: config.networks_dir.clone(),
            templates_dir: config.templates_dir.clone(),
            resolv_conf: config.resolv_conf.clone(),
            link_detect_settle: config.thresholds.link_detect_settle,
            verify_ap_interval: config.thresholds.verify_ap_interval,
        }
    }
}

/// Named backends available to the daemon.
#[derive(Default)]
pub struct BackendRegistry {
    backends: BTreeMap<&'static str, Arc<dyn Backend>>,
}

impl std::fmt::Debug for BackendRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendRegistry")
            .field("backends", &self.names())
            .finish()
    }
}

impl BackendRegistry {
    /// Registry holding every backend compiled into this build.
    pub fn new(settings: BackendSettings) -> Self {
        let settings = Arc::new(settings);
        let mut registry = Self::default();
        registry.register(Arc::new(external::ExternalBackend::new(settings.clone())));
        registry.register(Arc::new(ioctl::IoctlBackend::new(settings)));
        #[cfg(any(test, feature = "backend_mock"))]
        registry.register(Arc::new(mock::MockBackend::new()));
        registry
    }

    /// Adds or replaces a backend under its own name.
    pub fn register(&mut self, backend: Arc<dyn Backend>) {
        self.backends.insert(backend.name(), backend);
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.backends.keys().copied().collect()
    }

    pub fn get(&self, name: &str) -> Result<Arc<dyn Backend>> {
        self.backends
            .get(name)
            .cloned()
            .ok_or_else(|| Error::UnknownBackend(name.to_string()))
    }

    pub fn update_interval(&self, name: &str) -> Option<Duration> {
        self.backends.get(name).map(|b| b.update_interval())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> BackendSettings {
        BackendSettings::from(&crate::config::config_from_toml_str("").unwrap())
    }

    #[test]
    fn test_registry_lists_backends_and_intervals() {
        let registry = BackendRegistry::new(settings());
        assert_eq!(registry.names(), vec!["external", "ioctl", "mock"]);
        assert_eq!(registry.update_interval("external"), Some(Duration::from_secs(5)));
        assert_eq!(registry.update_interval("ioctl"), Some(Duration::from_secs(3)));
        assert_eq!(registry.update_interval("mock"), Some(Duration::from_secs(1)));
        assert_eq!(registry.update_interval("nm"), None);
    }

    #[test]
    fn test_unknown_backend() {
        let registry = BackendRegistry::new(settings());
        assert!(matches!(registry.get("nm"), Err(Error::UnknownBackend(n)) if n == "nm"));
        let backend = registry.get("ioctl").unwrap();
        assert_eq!(backend.wireless("wlan0").name(), "wlan0");
    }
}
