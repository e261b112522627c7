use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc::{self, error::TryRecvError};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::limits::TRIGGER_QUEUE_CAPACITY;
use crate::observability::{trigger_label, CONVERGE_RUNS_TOTAL, TRIGGERS_COALESCED_TOTAL};
use crate::service::{ConvergeOutcome, VoucherService};

/// Why a convergence run was requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    Timer,
    FocusRegained,
    Navigation,
    Manual,
}

/// Drives [`VoucherService::converge`] from independent triggers.
///
/// Every producer sends into one bounded channel; a single consumer drains
/// it. Whatever is already queued when the consumer wakes is folded into one
/// run, so bursts never stack runs on top of each other.
pub struct Scheduler;

impl Scheduler {
    /// Mount: start the timer and the consumer. The first timer tick fires
    /// immediately.
    pub fn spawn(service: Arc<VoucherService>, period: Duration) -> SchedulerHandle {
        Self::spawn_with_observer(service, period, None)
    }

    /// Like [`spawn`](Self::spawn), reporting every finished run on `observer`.
    pub fn spawn_with_observer(
        service: Arc<VoucherService>,
        period: Duration,
        observer: Option<mpsc::UnboundedSender<RunReport>>,
    ) -> SchedulerHandle {
        let (tx, rx) = mpsc::channel(TRIGGER_QUEUE_CAPACITY);
        let (stop_tx, stop_rx) = oneshot::channel();
        let timer = tokio::spawn(run_timer(tx.clone(), period));
        let consumer = tokio::spawn(run_consumer(service, rx, stop_rx, observer));
        info!("voucher scheduler mounted, period {period:?}");
        SchedulerHandle {
            tx,
            stop: Some(stop_tx),
            timer,
            consumer,
        }
    }
}

/// One finished run and the triggers it answered.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub triggers: Vec<Trigger>,
    pub outcome: Option<ConvergeOutcome>,
}

pub struct SchedulerHandle {
    tx: mpsc::Sender<Trigger>,
    stop: Option<oneshot::Sender<()>>,
    timer: JoinHandle<()>,
    consumer: JoinHandle<()>,
}

impl SchedulerHandle {
    /// Request a run. When the queue is full a run is already pending, so the
    /// trigger is dropped.
    pub fn notify(&self, trigger: Trigger) {
        match self.tx.try_send(trigger) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                metrics::counter!(TRIGGERS_COALESCED_TOTAL).increment(1);
                debug!("trigger {trigger:?} dropped, queue full");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!("trigger {trigger:?} after unmount");
            }
        }
    }

    /// Unmount: stop the timer, let an in-flight run finish, then stop the
    /// consumer.
    pub async fn shutdown(mut self) {
        self.timer.abort();
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        drop(self.tx);
        if let Err(e) = self.consumer.await {
            if !e.is_cancelled() {
                warn!("scheduler consumer ended abnormally: {e}");
            }
        }
        info!("voucher scheduler unmounted");
    }
}

async fn run_timer(tx: mpsc::Sender<Trigger>, period: Duration) {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        interval.tick().await;
        // A full queue already holds a pending run.
        if let Err(mpsc::error::TrySendError::Closed(_)) = tx.try_send(Trigger::Timer) {
            return;
        }
    }
}

async fn run_consumer(
    service: Arc<VoucherService>,
    mut rx: mpsc::Receiver<Trigger>,
    mut stop: oneshot::Receiver<()>,
    observer: Option<mpsc::UnboundedSender<RunReport>>,
) {
    loop {
        let first = tokio::select! {
            biased;
            _ = &mut stop => return,
            next = rx.recv() => match next {
                Some(trigger) => trigger,
                None => return,
            },
        };

        let mut triggers = vec![first];
        loop {
            match rx.try_recv() {
                Ok(trigger) => triggers.push(trigger),
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }
        if triggers.len() > 1 {
            metrics::counter!(TRIGGERS_COALESCED_TOTAL).increment(triggers.len() as u64 - 1);
        }
        for trigger in &triggers {
            metrics::counter!(CONVERGE_RUNS_TOTAL, "trigger" => trigger_label(*trigger)).increment(1);
        }

        let outcome = match service.converge().await {
            Ok(outcome) => Some(outcome),
            Err(e) => {
                warn!("voucher convergence failed ({:?}): {e}", e.kind());
                None
            }
        };
        if let Some(observer) = &observer {
            let _ = observer.send(RunReport { triggers, outcome });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{Backend, BackendResult};
    use crate::calendar::{CalendarDate, ManualClock};
    use crate::model::*;
    use crate::notify::NotifyHub;
    use async_trait::async_trait;
    use chrono::NaiveDate;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    fn d(day: u32) -> CalendarDate {
        NaiveDate::from_ymd_opt(2024, 1, day).unwrap()
    }

    /// Voucher-only backend that counts fetches.
    struct CountingBackend {
        vouchers: Mutex<Vec<Voucher>>,
        fetches: AtomicUsize,
    }

    #[async_trait]
    impl Backend for CountingBackend {
        async fn fetch_all_price_lists(&self) -> BackendResult<Vec<PriceList>> {
            Ok(Vec::new())
        }
        async fn fetch_all_vouchers(&self) -> BackendResult<Vec<Voucher>> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            Ok(self.vouchers.lock().unwrap().clone())
        }
        async fn update_price_list_interval(&self, _: &EntityId, _: CalendarDate) -> BackendResult<()> {
            Ok(())
        }
        async fn create_price_list(&self, _: PriceListDraft) -> BackendResult<PriceList> {
            unreachable!()
        }
        async fn delete_price_list(&self, _: &EntityId) -> BackendResult<()> {
            Ok(())
        }
        async fn update_voucher_status(&self, id: &EntityId, status: VoucherStatus) -> BackendResult<()> {
            for v in self.vouchers.lock().unwrap().iter_mut().filter(|v| &v.id == id) {
                v.status = status;
            }
            Ok(())
        }
    }

    fn setup(vouchers: Vec<Voucher>) -> (Arc<CountingBackend>, Arc<VoucherService>) {
        let backend = Arc::new(CountingBackend {
            vouchers: Mutex::new(vouchers),
            fetches: AtomicUsize::new(0),
        });
        let clock = Arc::new(ManualClock::new(d(15)));
        let service = Arc::new(VoucherService::new(
            backend.clone(),
            clock,
            Arc::new(NotifyHub::new()),
        ));
        (backend, service)
    }

    fn voucher(id: &str, start: u32, end: u32) -> Voucher {
        Voucher {
            id: id.into(),
            code: id.to_uppercase(),
            name: id.into(),
            interval: Interval::new(d(start), d(end)),
            status: VoucherStatus::Enabled,
            lines: Vec::new(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn timer_fires_on_mount_and_every_period() {
        let (backend, service) = setup(vec![voucher("v1", 1, 31)]);
        let (obs_tx, mut obs_rx) = mpsc::unbounded_channel();
        let handle = Scheduler::spawn_with_observer(service, Duration::from_secs(60), Some(obs_tx));

        let first = obs_rx.recv().await.unwrap();
        assert_eq!(first.triggers, vec![Trigger::Timer]);

        tokio::time::advance(Duration::from_secs(60)).await;
        let second = obs_rx.recv().await.unwrap();
        assert_eq!(second.triggers, vec![Trigger::Timer]);
        assert_eq!(backend.fetches.load(Ordering::SeqCst), 2);

        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn burst_is_coalesced_into_one_run() {
        let (backend, service) = setup(vec![voucher("v1", 1, 31)]);
        let (obs_tx, mut obs_rx) = mpsc::unbounded_channel();
        let handle = Scheduler::spawn_with_observer(service, Duration::from_secs(3600), Some(obs_tx));
        obs_rx.recv().await.unwrap();

        handle.notify(Trigger::FocusRegained);
        handle.notify(Trigger::Navigation);
        handle.notify(Trigger::Manual);

        let report = obs_rx.recv().await.unwrap();
        assert_eq!(
            report.triggers,
            vec![Trigger::FocusRegained, Trigger::Navigation, Trigger::Manual]
        );
        assert_eq!(backend.fetches.load(Ordering::SeqCst), 2);
        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn runs_disable_out_of_window_and_losers() {
        let (backend, service) = setup(vec![
            voucher("a", 1, 31),
            voucher("b", 10, 31),
            voucher("old", 1, 5),
        ]);
        let (obs_tx, mut obs_rx) = mpsc::unbounded_channel();
        let handle = Scheduler::spawn_with_observer(service.clone(), Duration::from_secs(60), Some(obs_tx));

        let report = obs_rx.recv().await.unwrap();
        let outcome = report.outcome.unwrap();
        assert_eq!(outcome.applied(), 2);
        assert!(outcome.published);

        let enabled: Vec<_> = backend
            .vouchers
            .lock()
            .unwrap()
            .iter()
            .filter(|v| v.status.is_enabled())
            .map(|v| v.id.to_string())
            .collect();
        assert_eq!(enabled, vec!["b"]);

        tokio::time::advance(Duration::from_secs(60)).await;
        let idle = obs_rx.recv().await.unwrap().outcome.unwrap();
        assert!(idle.changes.is_empty());
        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_stops_runs() {
        let (backend, service) = setup(Vec::new());
        let (obs_tx, mut obs_rx) = mpsc::unbounded_channel();
        let handle = Scheduler::spawn_with_observer(service, Duration::from_secs(60), Some(obs_tx));
        obs_rx.recv().await.unwrap();
        handle.shutdown().await;

        tokio::time::advance(Duration::from_secs(600)).await;
        assert!(obs_rx.recv().await.is_none());
        assert_eq!(backend.fetches.load(Ordering::SeqCst), 1);
    }
}
