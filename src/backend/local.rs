use std::io;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};
use ulid::{Generator, Ulid};

use crate::calendar::CalendarDate;
use crate::engine::{check_placement, validate_voucher};
use crate::engine::pricing::validate_interval;
use crate::journal::Journal;
use crate::limits::*;
use crate::model::*;

use super::{Backend, BackendError, BackendResult};

// ── Group-commit journal channel ───────────────────────────

enum JournalCommand {
    Append {
        event: Event,
        response: oneshot::Sender<io::Result<()>>,
    },
    Compact {
        snapshot: Vec<Event>,
        response: oneshot::Sender<io::Result<()>>,
    },
    AppendsSinceCompact {
        response: oneshot::Sender<u64>,
    },
}

type PendingAppend = (Event, oneshot::Sender<io::Result<()>>);

/// Owns the journal. Each wake-up takes every append already queued, writes
/// them as one batch with a single fsync, then answers all senders. A control
/// command ends the batch window and runs after the batch is committed.
async fn journal_writer_loop(mut journal: Journal, mut rx: mpsc::Receiver<JournalCommand>) {
    let mut pending: Vec<PendingAppend> = Vec::new();
    while let Some(first) = rx.recv().await {
        let mut control = None;
        match first {
            JournalCommand::Append { event, response } => pending.push((event, response)),
            other => control = Some(other),
        }
        while control.is_none() {
            match rx.try_recv() {
                Ok(JournalCommand::Append { event, response }) => pending.push((event, response)),
                Ok(other) => control = Some(other),
                Err(_) => break,
            }
        }
        if !pending.is_empty() {
            commit_batch(&mut journal, &mut pending);
        }
        if let Some(cmd) = control {
            handle_control(&mut journal, cmd);
        }
    }
}

fn commit_batch(journal: &mut Journal, pending: &mut Vec<PendingAppend>) {
    metrics::histogram!(crate::observability::JOURNAL_FLUSH_BATCH_SIZE).record(pending.len() as f64);
    let started = std::time::Instant::now();
    let appended = pending
        .iter()
        .try_for_each(|(event, _)| journal.append_buffered(event));
    // Flush even after a failed append so half-written bytes don't ride along
    // with the next batch.
    let flushed = journal.flush_sync();
    let result = appended.and(flushed);
    metrics::histogram!(crate::observability::JOURNAL_FLUSH_DURATION_SECONDS)
        .record(started.elapsed().as_secs_f64());

    for (_, tx) in pending.drain(..) {
        let reply = match &result {
            Ok(()) => Ok(()),
            Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
        };
        let _ = tx.send(reply);
    }
}

fn handle_control(journal: &mut Journal, cmd: JournalCommand) {
    match cmd {
        JournalCommand::Compact { snapshot, response } => {
            let _ = response.send(journal.compact(&snapshot));
        }
        JournalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(journal.appends_since_compact());
        }
        JournalCommand::Append { event, response } => {
            let mut single = vec![(event, response)];
            commit_batch(journal, &mut single);
        }
    }
}

/// In-process backend: DashMap state, journaled mutations, replay on open.
///
/// Price list writes go through the same placement rule the client uses, so
/// an overlapping write is refused here as a conflict.
pub struct LocalStore {
    price_lists: DashMap<EntityId, PriceList>,
    vouchers: DashMap<EntityId, Voucher>,
    journal_tx: mpsc::Sender<JournalCommand>,
    ids: Mutex<Generator>,
    /// Serializes price list writes so check-then-insert is atomic.
    timeline_lock: tokio::sync::Mutex<()>,
    /// Serializes voucher writes so journal order matches apply order.
    voucher_lock: tokio::sync::Mutex<()>,
}

impl LocalStore {
    /// Replay the journal at `path` and start its writer task. Must be called
    /// inside a tokio runtime.
    pub fn open(path: &Path) -> io::Result<Self> {
        let events = Journal::replay(path)?;
        let journal = Journal::open(path)?;
        let (journal_tx, journal_rx) = mpsc::channel(JOURNAL_QUEUE_CAPACITY);
        tokio::spawn(journal_writer_loop(journal, journal_rx));

        let store = Self {
            price_lists: DashMap::new(),
            vouchers: DashMap::new(),
            journal_tx,
            ids: Mutex::new(Generator::new()),
            timeline_lock: tokio::sync::Mutex::new(()),
            voucher_lock: tokio::sync::Mutex::new(()),
        };
        for event in &events {
            store.apply(event);
        }
        info!(
            "local store opened: {} price lists, {} vouchers, {} journal records",
            store.price_lists.len(),
            store.vouchers.len(),
            events.len()
        );
        Ok(store)
    }

    /// Fresh id that sorts after every id minted earlier by this store.
    pub fn mint_id(&self) -> EntityId {
        let next = match self.ids.lock() {
            Ok(mut generator) => generator.generate().unwrap_or_else(|_| Ulid::new()),
            Err(_) => Ulid::new(),
        };
        EntityId::new(next.to_string())
    }

    fn apply(&self, event: &Event) {
        match event {
            Event::PriceListCreated { list } => {
                self.price_lists.insert(list.id.clone(), list.clone());
            }
            Event::PriceListEndChanged { id, end } => {
                if let Some(mut list) = self.price_lists.get_mut(id) {
                    list.interval.end = *end;
                }
            }
            Event::PriceListDeleted { id } => {
                self.price_lists.remove(id);
            }
            Event::VoucherCreated { voucher } => {
                self.vouchers.insert(voucher.id.clone(), voucher.clone());
            }
            Event::VoucherStatusChanged { id, status } => {
                if let Some(mut voucher) = self.vouchers.get_mut(id) {
                    voucher.status = *status;
                }
            }
            Event::VoucherDeleted { id } => {
                self.vouchers.remove(id);
            }
        }
    }

    async fn journal_append(&self, event: &Event) -> BackendResult<()> {
        let (tx, rx) = oneshot::channel();
        self.journal_tx
            .send(JournalCommand::Append {
                event: event.clone(),
                response: tx,
            })
            .await
            .map_err(|_| BackendError::Journal("journal writer shut down".into()))?;
        rx.await
            .map_err(|_| BackendError::Journal("journal writer dropped response".into()))?
            .map_err(|e| BackendError::Journal(e.to_string()))
    }

    /// Journal first, then make the change visible. Callers hold the lock
    /// guarding the entity kind across the whole call.
    async fn persist_and_apply(&self, event: Event) -> BackendResult<()> {
        self.journal_append(&event).await?;
        self.apply(&event);
        Ok(())
    }

    fn price_list_snapshot(&self) -> Vec<PriceList> {
        let mut lists: Vec<PriceList> = self.price_lists.iter().map(|e| e.value().clone()).collect();
        lists.sort_by(|a, b| (a.interval.start, &a.id).cmp(&(b.interval.start, &b.id)));
        lists
    }

    /// Seed a voucher with a caller-chosen id.
    pub async fn insert_voucher(&self, voucher: Voucher) -> BackendResult<()> {
        let _vouchers = self.voucher_lock.lock().await;
        if self.vouchers.len() >= MAX_ENTITIES {
            return Err(BackendError::LimitExceeded("too many vouchers"));
        }
        if self.vouchers.contains_key(&voucher.id) {
            return Err(BackendError::Conflict(format!("voucher {} already exists", voucher.id)));
        }
        validate_voucher(&voucher).map_err(|e| BackendError::Invalid(e.to_string()))?;
        self.persist_and_apply(Event::VoucherCreated { voucher }).await
    }

    /// Create a voucher with a minted id. New vouchers start disabled; only an
    /// operator turns them on.
    pub async fn create_voucher(
        &self,
        code: String,
        name: String,
        interval: Interval,
        lines: Vec<PromotionLine>,
    ) -> BackendResult<Voucher> {
        let voucher = Voucher {
            id: self.mint_id(),
            code,
            name,
            interval,
            status: VoucherStatus::Disabled,
            lines,
        };
        self.insert_voucher(voucher.clone()).await?;
        Ok(voucher)
    }

    /// Delete a voucher together with all of its promotion lines.
    pub async fn delete_voucher(&self, id: &EntityId) -> BackendResult<()> {
        let _vouchers = self.voucher_lock.lock().await;
        if !self.vouchers.contains_key(id) {
            return Err(BackendError::NotFound(id.clone()));
        }
        self.persist_and_apply(Event::VoucherDeleted { id: id.clone() }).await
    }

    /// Rewrite the journal as the minimal event set for the current state.
    pub async fn compact(&self) -> BackendResult<()> {
        let _timeline = self.timeline_lock.lock().await;
        let _vouchers = self.voucher_lock.lock().await;
        let mut snapshot: Vec<Event> = self
            .price_list_snapshot()
            .into_iter()
            .map(|list| Event::PriceListCreated { list })
            .collect();
        let mut vouchers: Vec<Voucher> = self.vouchers.iter().map(|e| e.value().clone()).collect();
        vouchers.sort_by(|a, b| a.id.cmp(&b.id));
        snapshot.extend(vouchers.into_iter().map(|voucher| Event::VoucherCreated { voucher }));

        let (tx, rx) = oneshot::channel();
        self.journal_tx
            .send(JournalCommand::Compact { snapshot, response: tx })
            .await
            .map_err(|_| BackendError::Journal("journal writer shut down".into()))?;
        rx.await
            .map_err(|_| BackendError::Journal("journal writer dropped response".into()))?
            .map_err(|e| BackendError::Journal(e.to_string()))
    }

    pub async fn appends_since_compact(&self) -> u64 {
        let (tx, rx) = oneshot::channel();
        if self
            .journal_tx
            .send(JournalCommand::AppendsSinceCompact { response: tx })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }
}

#[async_trait]
impl Backend for LocalStore {
    async fn fetch_all_price_lists(&self) -> BackendResult<Vec<PriceList>> {
        Ok(self.price_list_snapshot())
    }

    async fn fetch_all_vouchers(&self) -> BackendResult<Vec<Voucher>> {
        let mut vouchers: Vec<Voucher> = self.vouchers.iter().map(|e| e.value().clone()).collect();
        vouchers.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(vouchers)
    }

    async fn update_price_list_interval(&self, id: &EntityId, new_end: CalendarDate) -> BackendResult<()> {
        let _timeline = self.timeline_lock.lock().await;
        let current = self
            .price_lists
            .get(id)
            .map(|e| e.value().interval)
            .ok_or_else(|| BackendError::NotFound(id.clone()))?;
        let updated = Interval::checked(current.start, new_end).ok_or_else(|| {
            BackendError::Invalid(format!("end {new_end} is before start {}", current.start))
        })?;
        check_placement(&updated, &self.price_list_snapshot(), Some(id))
            .map_err(|e| BackendError::Conflict(e.to_string()))?;
        self.persist_and_apply(Event::PriceListEndChanged {
            id: id.clone(),
            end: new_end,
        })
        .await
    }

    async fn create_price_list(&self, draft: PriceListDraft) -> BackendResult<PriceList> {
        let _timeline = self.timeline_lock.lock().await;
        if self.price_lists.len() >= MAX_ENTITIES {
            return Err(BackendError::LimitExceeded("too many price lists"));
        }
        validate_interval(&draft.interval).map_err(|e| BackendError::Invalid(e.to_string()))?;
        check_placement(&draft.interval, &self.price_list_snapshot(), None)
            .map_err(|e| BackendError::Conflict(e.to_string()))?;

        let list = PriceList {
            id: self.mint_id(),
            code: draft.code,
            name: draft.name,
            interval: draft.interval,
            lines: draft.lines,
        };
        self.persist_and_apply(Event::PriceListCreated { list: list.clone() }).await?;
        debug!("created price list {} {}", list.id, list.interval);
        Ok(list)
    }

    async fn delete_price_list(&self, id: &EntityId) -> BackendResult<()> {
        let _timeline = self.timeline_lock.lock().await;
        if !self.price_lists.contains_key(id) {
            return Err(BackendError::NotFound(id.clone()));
        }
        self.persist_and_apply(Event::PriceListDeleted { id: id.clone() }).await
    }

    async fn update_voucher_status(&self, id: &EntityId, status: VoucherStatus) -> BackendResult<()> {
        let _vouchers = self.voucher_lock.lock().await;
        if !self.vouchers.contains_key(id) {
            return Err(BackendError::NotFound(id.clone()));
        }
        self.persist_and_apply(Event::VoucherStatusChanged {
            id: id.clone(),
            status,
        })
        .await
    }
}

/// Background task that compacts the journal once it has grown past
/// `threshold` appends.
pub async fn run_compactor(store: Arc<LocalStore>, threshold: u64) {
    let mut interval = tokio::time::interval(Duration::from_secs(30));
    loop {
        interval.tick().await;
        let appends = store.appends_since_compact().await;
        if appends < threshold {
            continue;
        }
        match store.compact().await {
            Ok(()) => info!("compacted journal after {appends} appends"),
            Err(e) => warn!("journal compaction failed: {e}"),
        }
    }
}
