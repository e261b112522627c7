use std::sync::Arc;

use tracing::{info, warn};

use crate::backend::Backend;
use crate::calendar::{CalendarDate, Clock};
use crate::engine::{self, EngineError, ErrorKind};
use crate::model::*;
use crate::notify::{NotifyHub, Topic, ViewUpdate};
use crate::observability::{result_label, PRICE_LIST_GAPS, PRICE_LIST_WRITES_TOTAL};
use crate::view::{Snapshot, SnapshotCell};

pub struct PriceListService {
    backend: Arc<dyn Backend>,
    clock: Arc<dyn Clock>,
    view: SnapshotCell<Vec<PriceList>>,
    notify: Arc<NotifyHub>,
}

impl PriceListService {
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

    /// Last published list, sorted by start.
    pub fn latest(&self) -> Snapshot<Vec<PriceList>> {
        self.view.latest()
    }

    /// Fetch the canonical list and publish it.
    pub async fn refresh(&self) -> Result<Vec<PriceList>, EngineError> {
        let seq = self.view.begin_cycle();
        let mut lists = self.backend.fetch_all_price_lists().await?;
        lists.sort_by(|a, b| (a.interval.start, &a.id).cmp(&(b.interval.start, &b.id)));
        if self.view.publish(seq, lists.clone()) {
            self.notify.send(ViewUpdate {
                topic: Topic::PriceLists,
                seq,
                count: lists.len(),
                changes: 0,
            });
        }
        Ok(lists)
    }

    pub async fn status_of(&self, id: &EntityId) -> Result<PriceListStatus, EngineError> {
        let lists = self.refresh().await?;
        let list = find(&lists, id)?;
        Ok(engine::derive_status(&list.interval, self.today()))
    }

    /// A backend conflict means our view was stale. Re-read and re-run the
    /// check: if the fresh timeline makes the request illegal, that is the
    /// answer; otherwise the conflict stands.
    async fn reconcile<F>(&self, err: EngineError, recheck: F) -> EngineError
    where
        F: FnOnce(&[PriceList], CalendarDate) -> Result<(), EngineError>,
    {
        if err.kind() != ErrorKind::Conflict {
            return err;
        }
        match self.refresh().await {
            Ok(lists) => match recheck(&lists, self.today()) {
                Err(validation) => validation,
                Ok(()) => err,
            },
            Err(refresh_err) => {
                warn!("re-read after conflict failed: {refresh_err}");
                err
            }
        }
    }

    pub async fn create(&self, draft: PriceListDraft) -> Result<PriceList, EngineError> {
        let lists = self.refresh().await?;
        engine::validate_draft(&draft, &lists, self.today())?;

        let result = self.backend.create_price_list(draft.clone()).await;
        metrics::counter!(PRICE_LIST_WRITES_TOTAL, "op" => "create", "status" => result_label(&result))
            .increment(1);
        match result {
            Ok(created) => {
                info!("created price list {} {}", created.code, created.interval);
                self.refresh().await?;
                Ok(created)
            }
            Err(e) => Err(self
                .reconcile(e.into(), |fresh, today| engine::validate_draft(&draft, fresh, today))
                .await),
        }
    }

    /// Extend or shrink a list by moving its end date.
    pub async fn update_end(&self, id: &EntityId, new_end: CalendarDate) -> Result<Interval, EngineError> {
        let lists = self.refresh().await?;
        let list = find(&lists, id)?.clone();
        let updated = engine::validate_end_change(&list, new_end, &lists, self.today())?;

        let result = self.backend.update_price_list_interval(id, new_end).await;
        metrics::counter!(PRICE_LIST_WRITES_TOTAL, "op" => "update_end", "status" => result_label(&result))
            .increment(1);
        match result {
            Ok(()) => {
                info!("price list {} now {}", list.code, updated);
                self.refresh().await?;
                Ok(updated)
            }
            Err(e) => Err(self
                .reconcile(e.into(), |fresh, today| {
                    let current = find(fresh, id)?;
                    engine::validate_end_change(current, new_end, fresh, today).map(|_| ())
                })
                .await),
        }
    }

    /// Copy a list's lines onto a new interval. The source is left alone.
    pub async fn duplicate(
        &self,
        source: &EntityId,
        interval: Interval,
        code: Option<String>,
    ) -> Result<PriceList, EngineError> {
        let lists = self.refresh().await?;
        let plan = engine::plan_duplicate(find(&lists, source)?, interval, code, &lists, self.today())?;
        self.create(plan.draft).await
    }

    /// Shrink `source` to end on `old_end` and create its successor covering
    /// `[new_start, new_end]`.
    ///
    /// The shrink is written first. If the successor cannot be created the
    /// original end is restored before the error is returned.
    pub async fn split_version(
        &self,
        source: &EntityId,
        old_end: CalendarDate,
        new_start: CalendarDate,
        new_end: CalendarDate,
        code: Option<String>,
    ) -> Result<PriceList, EngineError> {
        let lists = self.refresh().await?;
        let plan = engine::plan_split(
            find(&lists, source)?,
            old_end,
            new_start,
            new_end,
            code,
            &lists,
            self.today(),
        )?;
        if plan.leaves_gap {
            warn!(
                "split of {} leaves a gap between {} and {}",
                plan.source, plan.shortened.end, plan.successor.interval.start
            );
        }

        let shrink = self.backend.update_price_list_interval(&plan.source, old_end).await;
        metrics::counter!(PRICE_LIST_WRITES_TOTAL, "op" => "split_shrink", "status" => result_label(&shrink))
            .increment(1);
        if let Err(e) = shrink {
            return Err(self
                .reconcile(e.into(), |fresh, today| {
                    let current = find(fresh, source)?;
                    engine::plan_split(current, old_end, new_start, new_end, None, fresh, today).map(|_| ())
                })
                .await);
        }

        let created = self.backend.create_price_list(plan.successor.clone()).await;
        metrics::counter!(PRICE_LIST_WRITES_TOTAL, "op" => "split_create", "status" => result_label(&created))
            .increment(1);
        match created {
            Ok(successor) => {
                info!(
                    "split {} at {}: successor {} {}",
                    plan.source, old_end, successor.code, successor.interval
                );
                self.refresh().await?;
                Ok(successor)
            }
            Err(e) => {
                warn!("successor for {} failed ({e}); restoring end {}", plan.source, plan.original_end);
                if let Err(restore) = self
                    .backend
                    .update_price_list_interval(&plan.source, plan.original_end)
                    .await
                {
                    warn!("could not restore {} to end {}: {restore}", plan.source, plan.original_end);
                }
                if let Err(refresh_err) = self.refresh().await {
                    warn!("re-read after failed split failed: {refresh_err}");
                }
                Err(e.into())
            }
        }
    }

    /// Delete a list that has not started yet. Active and expired lists are
    /// part of the history and stay.
    pub async fn delete(&self, id: &EntityId) -> Result<(), EngineError> {
        let lists = self.refresh().await?;
        let list = find(&lists, id)?;
        if engine::derive_status(&list.interval, self.today()) != PriceListStatus::Scheduled {
            return Err(EngineError::AlreadyStarted(id.clone()));
        }
        let result = self.backend.delete_price_list(id).await;
        metrics::counter!(PRICE_LIST_WRITES_TOTAL, "op" => "delete", "status" => result_label(&result))
            .increment(1);
        result?;
        info!("deleted price list {}", list.code);
        self.refresh().await?;
        Ok(())
    }

    /// Ask the backend for gaps in the timeline and log each one.
    pub async fn gap_report(&self) -> Result<GapReport, EngineError> {
        let report = self.backend.detect_time_gaps().await?;
        metrics::gauge!(PRICE_LIST_GAPS).set(report.gaps.len() as f64);
        for gap in &report.gaps {
            warn!("price list timeline has no coverage for {gap}");
        }
        Ok(report)
    }

    // ── Date picker support, from the last published list ──

    pub fn suggest_start(&self) -> CalendarDate {
        engine::suggest_start(&self.latest().data, self.today())
    }

    pub fn must_start_today(&self) -> bool {
        engine::must_start_today(&self.latest().data, self.today())
    }

    pub fn blocked_ranges(&self, editing: Option<&EntityId>) -> Vec<Interval> {
        engine::blocked_ranges(&self.latest().data, self.today(), editing)
    }

    pub fn is_date_disabled(&self, date: CalendarDate, editing: Option<&EntityId>) -> bool {
        engine::is_date_disabled(date, self.today(), &self.latest().data, editing)
    }
}

fn find<'a>(lists: &'a [PriceList], id: &EntityId) -> Result<&'a PriceList, EngineError> {
    lists
        .iter()
        .find(|l| &l.id == id)
        .ok_or_else(|| EngineError::NotFound(id.clone()))
}
