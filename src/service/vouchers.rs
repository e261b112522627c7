use std::sync::Arc;
use std::time::Instant;

use futures::future::join_all;
use tracing::{debug, info, warn};

use crate::backend::Backend;
use crate::calendar::{CalendarDate, Clock};
use crate::engine::{self, EngineError, WindowCheck};
use crate::model::*;
use crate::notify::{NotifyHub, Topic, ViewUpdate};
use crate::observability::{CONVERGE_DURATION_SECONDS, STATUS_UPDATES_TOTAL};
use crate::view::{Snapshot, SnapshotCell};

/// What one convergence run did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConvergeOutcome {
    /// Sequence of the snapshot this run tried to publish.
    pub seq: u64,
    /// False when a newer read had already been published.
    pub published: bool,
    pub changes: Vec<StatusChange>,
    pub failed: Vec<EntityId>,
    pub out_of_window: usize,
    pub conflicts: usize,
}

impl ConvergeOutcome {
    pub fn applied(&self) -> usize {
        self.changes.len() - self.failed.len()
    }
}

pub struct VoucherService {
    backend: Arc<dyn Backend>,
    clock: Arc<dyn Clock>,
    view: SnapshotCell<Vec<Voucher>>,
    notify: Arc<NotifyHub>,
}

impl VoucherService {
    pub fn new(backend: Arc<dyn Backend>, clock: Arc<dyn Clock>, notify: Arc<NotifyHub>) -> Self {
        Self {
            backend,
            clock,
            view: SnapshotCell::default(),
            notify,
        }
    }

    pub fn today(&self) -> CalendarDate {
        self.clock.today()
    }

    /// Last published voucher list, sorted by id.
    pub fn latest(&self) -> Snapshot<Vec<Voucher>> {
        self.view.latest()
    }

    /// One fetch → resolve → persist → refetch → publish run.
    ///
    /// Only the initial fetch can fail the run. Individual status writes that
    /// fail are logged and reported in the outcome; the refetch still happens
    /// so the published view matches what the backend holds.
    pub async fn converge(&self) -> Result<ConvergeOutcome, EngineError> {
        let started = Instant::now();
        let seq = self.view.begin_cycle();
        let vouchers = self.backend.fetch_all_vouchers().await?;
        let today = self.today();
        let resolution = engine::resolve(&vouchers, today);

        for (winner, loser) in &resolution.conflicts {
            debug!("voucher {winner} overlaps {loser}; {winner} keeps priority");
        }

        let mut outcome = ConvergeOutcome {
            seq,
            published: false,
            changes: resolution.changes,
            failed: Vec::new(),
            out_of_window: resolution.out_of_window,
            conflicts: resolution.conflicts.len(),
        };

        let (final_seq, snapshot) = if outcome.changes.is_empty() {
            (seq, vouchers)
        } else {
            let writes = outcome
                .changes
                .iter()
                .map(|c| self.backend.update_voucher_status(&c.id, c.desired));
            let results = join_all(writes).await;
            for (change, result) in outcome.changes.iter().zip(results) {
                match result {
                    Ok(()) => {
                        metrics::counter!(STATUS_UPDATES_TOTAL, "status" => "ok").increment(1);
                        debug!("voucher {} -> {}", change.id, change.desired);
                    }
                    Err(e) => {
                        metrics::counter!(STATUS_UPDATES_TOTAL, "status" => "error").increment(1);
                        warn!("voucher {} -> {} failed: {e}", change.id, change.desired);
                        outcome.failed.push(change.id.clone());
                    }
                }
            }
            let refetch_seq = self.view.begin_cycle();
            match self.backend.fetch_all_vouchers().await {
                Ok(fresh) => (refetch_seq, fresh),
                Err(e) => {
                    warn!("re-read after status updates failed: {e}");
                    metrics::histogram!(CONVERGE_DURATION_SECONDS).record(started.elapsed().as_secs_f64());
                    return Ok(outcome);
                }
            }
        };

        outcome.seq = final_seq;
        outcome.published = self.publish(final_seq, snapshot, outcome.applied());
        metrics::histogram!(CONVERGE_DURATION_SECONDS).record(started.elapsed().as_secs_f64());
        if !outcome.changes.is_empty() {
            info!(
                "converged vouchers on {today}: {} disabled, {} failed",
                outcome.applied(),
                outcome.failed.len()
            );
        }
        Ok(outcome)
    }

    fn publish(&self, seq: u64, mut vouchers: Vec<Voucher>, changes: usize) -> bool {
        vouchers.sort_by(|a, b| a.id.cmp(&b.id));
        let count = vouchers.len();
        if !self.view.publish(seq, vouchers) {
            debug!("dropped stale voucher snapshot {seq}");
            return false;
        }
        self.notify.send(ViewUpdate {
            topic: Topic::Vouchers,
            seq,
            count,
            changes,
        });
        true
    }

    /// Operator toggle. Enabling a voucher whose window does not cover today
    /// is refused, since the next run would switch it straight back off. A
    /// convergence run follows so an enable that collides with another voucher
    /// is settled immediately.
    pub async fn set_status(
        &self,
        id: &EntityId,
        status: VoucherStatus,
    ) -> Result<ConvergeOutcome, EngineError> {
        let vouchers = self.backend.fetch_all_vouchers().await?;
        let voucher = vouchers
            .iter()
            .find(|v| &v.id == id)
            .ok_or_else(|| EngineError::NotFound(id.clone()))?;
        if status.is_enabled() && !engine::in_window(&voucher.interval, self.today()) {
            return Err(EngineError::OutsideWindow {
                id: id.clone(),
                interval: voucher.interval,
            });
        }
        self.backend.update_voucher_status(id, status).await?;
        info!("voucher {} set to {status} by operator", voucher.code);
        self.converge().await
    }

    /// Why the voucher is (or would be) switched off today, from the last
    /// published list.
    pub fn explain(&self, id: &EntityId) -> Result<WindowCheck, EngineError> {
        let snapshot = self.latest();
        let voucher = snapshot
            .data
            .iter()
            .find(|v| &v.id == id)
            .ok_or_else(|| EngineError::NotFound(id.clone()))?;
        Ok(engine::explain(voucher, self.today()))
    }
}
