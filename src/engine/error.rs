use thiserror::Error;

use crate::backend::BackendError;
use crate::calendar::CalendarDate;
use crate::model::{EntityId, Interval};

/// How a caller should react to an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Rejected before any write; show it to the operator.
    Validation,
    /// The backend disagreed with our view of the timeline; re-read and re-derive.
    Conflict,
    /// I/O failure; the next trigger retries.
    Transient,
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("invalid interval: end {end} is before start {start}")]
    InvalidInterval {
        start: CalendarDate,
        end: CalendarDate,
    },
    #[error("{date} is in the past (today is {today})")]
    InPast {
        date: CalendarDate,
        today: CalendarDate,
    },
    #[error("no price list is active; the next one must start today ({today}), not {requested}")]
    MustStartToday {
        today: CalendarDate,
        requested: CalendarDate,
    },
    #[error("interval {candidate} overlaps price list {with}")]
    Overlap { candidate: Interval, with: EntityId },
    #[error("price list {0} has expired and can no longer be changed")]
    Expired(EntityId),
    #[error("price list {0} has already started; only scheduled lists can be deleted")]
    AlreadyStarted(EntityId),
    #[error("split of {id}: new end {old_end} must fall before the current end {end}")]
    SplitDoesNotShorten {
        id: EntityId,
        old_end: CalendarDate,
        end: CalendarDate,
    },
    #[error("split of {id}: successor must start after {old_end}, got {new_start}")]
    SuccessorBeforeEnd {
        id: EntityId,
        old_end: CalendarDate,
        new_start: CalendarDate,
    },
    #[error("not found: {0}")]
    NotFound(EntityId),
    #[error("line {0}: exclusive-with-group policy needs a group tag")]
    MissingExclusionGroup(EntityId),
    #[error("lines {a} and {b} are both eligible on {day}: {reason}")]
    StackingConflict {
        a: EntityId,
        b: EntityId,
        day: CalendarDate,
        reason: &'static str,
    },
    #[error("line {line} interval {interval} lies outside its voucher")]
    LineOutsideVoucher { line: EntityId, interval: Interval },
    #[error("voucher {id} cannot be enabled outside its window {interval}")]
    OutsideWindow { id: EntityId, interval: Interval },
    #[error("limit exceeded: {0}")]
    LimitExceeded(&'static str),
    #[error("conflicting write: {0}")]
    Conflict(String),
    #[error(transparent)]
    Backend(BackendError),
}

impl EngineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::Conflict(_) => ErrorKind::Conflict,
            EngineError::Backend(e) => e.kind(),
            _ => ErrorKind::Validation,
        }
    }
}

impl From<BackendError> for EngineError {
    fn from(err: BackendError) -> Self {
        match err {
            BackendError::Conflict(msg) => EngineError::Conflict(msg),
            BackendError::NotFound(id) => EngineError::NotFound(id),
            other => EngineError::Backend(other),
        }
    }
}
