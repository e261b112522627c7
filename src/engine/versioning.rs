use crate::calendar::{next_day, CalendarDate};
use crate::model::*;

use super::pricing::{
    check_placement, derive_status, validate_draft, validate_draft_limits, validate_interval,
};
use super::EngineError;

/// A validated copy of an existing price list onto a new interval.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DuplicatePlan {
    pub source: EntityId,
    pub draft: PriceListDraft,
}

/// A validated split: shrink the source, then create its successor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitPlan {
    pub source: EntityId,
    pub original_end: CalendarDate,
    pub shortened: Interval,
    pub successor: PriceListDraft,
    /// True when the successor does not start the day after the new source end.
    pub leaves_gap: bool,
}

fn derived_code(source: &PriceList, start: CalendarDate) -> String {
    format!("{}-{}", source.code, start.format("%Y%m%d"))
}

pub fn plan_duplicate(
    source: &PriceList,
    interval: Interval,
    code: Option<String>,
    existing: &[PriceList],
    today: CalendarDate,
) -> Result<DuplicatePlan, EngineError> {
    let draft = PriceListDraft {
        code: code.unwrap_or_else(|| derived_code(source, interval.start)),
        name: source.name.clone(),
        interval,
        lines: source.lines.clone(),
    };
    validate_draft(&draft, existing, today)?;
    Ok(DuplicatePlan {
        source: source.id.clone(),
        draft,
    })
}

pub fn plan_split(
    source: &PriceList,
    old_end: CalendarDate,
    new_start: CalendarDate,
    new_end: CalendarDate,
    code: Option<String>,
    existing: &[PriceList],
    today: CalendarDate,
) -> Result<SplitPlan, EngineError> {
    if derive_status(&source.interval, today) == PriceListStatus::Expired {
        return Err(EngineError::Expired(source.id.clone()));
    }
    if old_end < today {
        return Err(EngineError::InPast { date: old_end, today });
    }
    if old_end >= source.interval.end {
        return Err(EngineError::SplitDoesNotShorten {
            id: source.id.clone(),
            old_end,
            end: source.interval.end,
        });
    }
    let shortened = Interval::checked(source.interval.start, old_end).ok_or(
        EngineError::InvalidInterval {
            start: source.interval.start,
            end: old_end,
        },
    )?;
    if new_start <= old_end {
        return Err(EngineError::SuccessorBeforeEnd {
            id: source.id.clone(),
            old_end,
            new_start,
        });
    }
    let successor_interval = Interval::checked(new_start, new_end).ok_or(
        EngineError::InvalidInterval {
            start: new_start,
            end: new_end,
        },
    )?;
    validate_interval(&successor_interval)?;

    check_placement(&shortened, existing, Some(&source.id))?;
    check_placement(&successor_interval, existing, Some(&source.id))?;

    let successor = PriceListDraft {
        code: code.unwrap_or_else(|| derived_code(source, new_start)),
        name: source.name.clone(),
        interval: successor_interval,
        lines: source.lines.clone(),
    };
    validate_draft_limits(&successor)?;

    Ok(SplitPlan {
        source: source.id.clone(),
        original_end: source.interval.end,
        shortened,
        successor,
        leaves_gap: new_start > next_day(old_end),
    })
}
