pub mod analysis;
pub mod cache;
pub mod convert;
pub mod sanitize;
pub mod storage;
pub mod sync;
pub mod wordpress;

use std::collections::BTreeMap;

use storage::StorageService;
use sync::SyncService;
use wordpress::{RemoteHealth, WordPressService};

/// Live facts the per-service statuses are derived from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HealthSnapshot {
    pub remote: RemoteHealth,
    pub storage_ok: bool,
    pub sync_running: bool,
    pub sync_enabled: bool,
}

#[derive(Debug, Clone, Default)]
pub struct AppServices {
    wordpress: WordPressService,
    storage: StorageService,
    sync: SyncService,
}

impl AppServices {
    pub fn health_report(&self, snapshot: &HealthSnapshot) -> BTreeMap<String, String> {
        let mut report = BTreeMap::new();
        report.insert(
            self.wordpress.name().to_string(),
            self.wordpress.status(snapshot.remote).to_string(),
        );
        report.insert(
            self.storage.name().to_string(),
            self.storage.status(snapshot.storage_ok).to_string(),
        );
        report.insert(
            self.sync.name().to_string(),
            self.sync
                .status(snapshot.sync_running, snapshot.sync_enabled)
                .to_string(),
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn health_report_lists_every_service() {
        let report = AppServices::default().health_report(&HealthSnapshot::default());
        assert_eq!(
            report.keys().map(String::as_str).collect::<Vec<_>>(),
            vec!["storage", "sync", "wordpress"]
        );
        assert_eq!(report["wordpress"], "unknown");
        assert_eq!(report["storage"], "unavailable");
        assert_eq!(report["sync"], "disabled");
    }

    #[test]
    fn health_report_reflects_the_snapshot() {
        let report = AppServices::default().health_report(&HealthSnapshot {
            remote: RemoteHealth::RateLimited,
            storage_ok: true,
            sync_running: true,
            sync_enabled: true,
        });
        assert_eq!(report["wordpress"], "rate_limited");
        assert_eq!(report["storage"], "ready");
        assert_eq!(report["sync"], "running");
    }
}
