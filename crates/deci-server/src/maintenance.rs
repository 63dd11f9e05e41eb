//! Background maintenance: signing key rotation and expired-record cleanup.

use std::sync::Arc;
use std::time::Duration;

use deci_auth::{AuthorizationService, TokenIssuer};
use time::OffsetDateTime;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, info, warn};

/// How often the key schedule is checked.
pub const KEY_CHECK_INTERVAL: Duration = Duration::from_secs(60);

/// Periodic jobs that keep the engine's keys and stores tidy.
pub struct Maintenance {
    authorization: Arc<AuthorizationService>,
    issuer: Arc<TokenIssuer>,
    key_check_interval: Duration,
    cleanup_interval: Duration,
}

impl Maintenance {
    pub fn new(
        authorization: Arc<AuthorizationService>,
        issuer: Arc<TokenIssuer>,
        cleanup_interval: Duration,
    ) -> Self {
        Self {
            authorization,
            issuer,
            key_check_interval: KEY_CHECK_INTERVAL,
            cleanup_interval,
        }
    }

    pub fn with_key_check_interval(mut self, every: Duration) -> Self {
        self.key_check_interval = every;
        self
    }

    /// Rotates the signing key when due and drops keys past their grace period.
    pub fn check_keys(&self, now: OffsetDateTime) {
        let keys = self.issuer.keys();
        match keys.rotate_if_due(now) {
            Ok(Some(key)) => debug!(kid = %key.kid, "Scheduled key rotation completed"),
            Ok(None) => {}
            Err(e) => warn!(error = %e, "Scheduled key rotation failed"),
        }
        let pruned = keys.prune(now);
        if !pruned.is_empty() {
            debug!(count = pruned.len(), "Retired signing keys pruned");
        }
    }

    /// Expires stale requests and deletes expired codes and refresh tokens.
    pub async fn cleanup(&self, now: OffsetDateTime) {
        match self.authorization.cleanup(now).await {
            Ok(report) => {
                if report.expired_requests + report.purged_requests + report.deleted_codes > 0 {
                    info!(
                        expired_requests = report.expired_requests,
                        purged_requests = report.purged_requests,
                        deleted_codes = report.deleted_codes,
                        "Cleaned up authorization state"
                    );
                }
            }
            Err(e) => warn!(error = %e, "Authorization state cleanup failed"),
        }
        match self.issuer.cleanup_expired(now).await {
            Ok(deleted) if deleted > 0 => {
                info!(deleted, "Cleaned up expired refresh tokens");
            }
            Ok(_) => {}
            Err(e) => warn!(error = %e, "Refresh token cleanup failed"),
        }
    }

    /// Runs both jobs in a background task until `true` is sent on the
    /// returned channel or the sender is dropped.
    pub fn start(self) -> (watch::Sender<bool>, JoinHandle<()>) {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

        let handle = tokio::spawn(async move {
            info!(
                key_check_interval = ?self.key_check_interval,
                cleanup_interval = ?self.cleanup_interval,
                "Maintenance started"
            );

            let mut key_ticker = interval(self.key_check_interval);
            let mut cleanup_ticker = interval(self.cleanup_interval);
            key_ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            cleanup_ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = key_ticker.tick() => self.check_keys(OffsetDateTime::now_utc()),
                    _ = cleanup_ticker.tick() => self.cleanup(OffsetDateTime::now_utc()).await,
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            info!("Maintenance shutting down");
                            break;
                        }
                    }
                }
            }
        });

        (shutdown_tx, handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::server::Services;

    fn services() -> Services {
        let mut cfg = AppConfig::default();
        cfg.login.shared_secret = "secret".to_string();
        Services::from_config(&cfg, OffsetDateTime::now_utc()).unwrap()
    }

    #[tokio::test]
    async fn check_keys_rotates_once_due() {
        let services = services();
        let maintenance = services.maintenance();
        let keys = services.issuer.keys().clone();
        let before = keys.active_key().unwrap().kid;

        maintenance.check_keys(OffsetDateTime::now_utc());
        assert_eq!(keys.active_key().unwrap().kid, before);

        let tomorrow = OffsetDateTime::now_utc() + time::Duration::days(1);
        maintenance.check_keys(tomorrow);
        assert_ne!(keys.active_key().unwrap().kid, before);
    }

    #[tokio::test]
    async fn start_stops_on_shutdown() {
        let maintenance = services()
            .maintenance()
            .with_key_check_interval(Duration::from_millis(10));
        let (shutdown_tx, handle) = maintenance.start();
        tokio::time::sleep(Duration::from_millis(30)).await;
        shutdown_tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
