//! Background task returning the stock of expired reservations.
//!
//! Record expiry only ages reservations out; it never restores stock. The
//! sweeper finds reservations still active past their `expires_at` and
//! releases them through the [`ReleaseCoordinator`], so abandoned orders give
//! their units back. Committed reservations are sold and left alone.
//!
//! Settled records are purged only once they have been expired for the
//! release result lifetime, so a late release still finds them.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use inventory_store::{
    InventoryStore, OrderId, ReservationQuery, ReservationRecord, StoreError,
};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::release::{ReleaseCoordinator, ReleaseRequest};
use crate::request::LineItemInput;

pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60);
pub const DEFAULT_SWEEP_BATCH: usize = 500;

/// What one sweep did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Expired active reservations found.
    pub expired: usize,
    /// Reservations actually released.
    pub released: usize,
    /// Orders whose release reported a warning.
    pub orders_with_warnings: usize,
    /// Expired records purged from the store.
    pub purged: usize,
}

pub struct ExpirySweeper<S: InventoryStore> {
    store: S,
    release: ReleaseCoordinator<S>,
    interval: Duration,
    batch_size: usize,
    retention: chrono::Duration,
}

impl<S> ExpirySweeper<S>
where
    S: InventoryStore + Clone,
{
    pub fn new(store: S, release: ReleaseCoordinator<S>) -> Self {
        Self {
            store,
            retention: release.settings().release_idempotency_ttl,
            release,
            interval: DEFAULT_SWEEP_INTERVAL,
            batch_size: DEFAULT_SWEEP_BATCH,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Releases one batch of active reservations expired at `now`, then
    /// purges records expired before the retention window.
    #[tracing::instrument(skip(self))]
    pub async fn sweep_once(&self, now: DateTime<Utc>) -> Result<SweepReport, StoreError> {
        let expired = self
            .store
            .query_reservations(ReservationQuery::expired_active(now).limit(self.batch_size))
            .await?;

        let mut report = SweepReport {
            expired: expired.len(),
            ..Default::default()
        };

        for (order_id, records) in group_by_order(expired) {
            let items = records
                .iter()
                .map(|r| LineItemInput::new(r.product_id.clone(), i64::from(r.quantity)))
                .collect();
            let result = self
                .release
                .release(ReleaseRequest {
                    items,
                    ..ReleaseRequest::for_order(order_id.clone())
                })
                .await;

            if result.has_warnings() {
                report.orders_with_warnings += 1;
                tracing::warn!(
                    %order_id,
                    warning = ?result.warning,
                    error = ?result.error,
                    "expired reservations released with warnings"
                );
            }
            report.released += result.released_items.len();
            metrics::counter!("reservations_expired_total")
                .increment(result.released_items.len() as u64);
        }

        report.purged = self.store.purge_expired(now - self.retention).await?;

        if report.expired > 0 || report.purged > 0 {
            tracing::info!(
                expired = report.expired,
                released = report.released,
                purged = report.purged,
                "expiry sweep finished"
            );
        }
        Ok(report)
    }

    /// Runs the sweeper until `shutdown` flips to true or its sender drops.
    pub fn spawn(self, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()>
    where
        S: 'static,
    {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            tracing::info!(interval_secs = self.interval.as_secs(), "expiry sweeper started");

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(e) = self.sweep_once(Utc::now()).await {
                            tracing::error!(error = %e, "expiry sweep failed");
                        }
                    }
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                }
            }

            tracing::info!("expiry sweeper stopped");
        })
    }
}

fn group_by_order(records: Vec<ReservationRecord>) -> BTreeMap<OrderId, Vec<ReservationRecord>> {
    let mut grouped: BTreeMap<OrderId, Vec<ReservationRecord>> = BTreeMap::new();
    for record in records {
        grouped.entry(record.order_id.clone()).or_default().push(record);
    }
    grouped
}
