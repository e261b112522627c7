use crate::calendar::{next_day, CalendarDate};
use crate::limits::*;
use crate::model::*;

use super::gaps::merge_covered;
use super::EngineError;

/// Status of a price list interval on `today`. Both ends are inclusive.
pub fn derive_status(interval: &Interval, today: CalendarDate) -> PriceListStatus {
    if today < interval.start {
        PriceListStatus::Scheduled
    } else if today > interval.end {
        PriceListStatus::Expired
    } else {
        PriceListStatus::Active
    }
}

pub fn has_active(existing: &[PriceList], today: CalendarDate) -> bool {
    existing
        .iter()
        .any(|l| derive_status(&l.interval, today) == PriceListStatus::Active)
}

/// First existing list (other than `ignore_id`) whose interval overlaps `candidate`.
pub fn first_overlap<'a>(
    candidate: &Interval,
    existing: &'a [PriceList],
    ignore_id: Option<&EntityId>,
) -> Option<&'a PriceList> {
    existing
        .iter()
        .filter(|l| Some(&l.id) != ignore_id)
        .find(|l| l.interval.overlaps(candidate))
}

pub fn is_placement_legal(
    candidate: &Interval,
    existing: &[PriceList],
    ignore_id: Option<&EntityId>,
) -> bool {
    first_overlap(candidate, existing, ignore_id).is_none()
}

/// Placement check in `Result` form, shared by the services and the local store.
pub fn check_placement(
    candidate: &Interval,
    existing: &[PriceList],
    ignore_id: Option<&EntityId>,
) -> Result<(), EngineError> {
    match first_overlap(candidate, existing, ignore_id) {
        Some(other) => Err(EngineError::Overlap {
            candidate: *candidate,
            with: other.id.clone(),
        }),
        None => Ok(()),
    }
}

/// With no active list the next creation must start today so the timeline
/// never gains a leading gap.
pub fn must_start_today(existing: &[PriceList], today: CalendarDate) -> bool {
    !has_active(existing, today)
}

/// Default start date for a new list: today when nothing is active, otherwise
/// the first day on or after today that no list occupies.
pub fn suggest_start(existing: &[PriceList], today: CalendarDate) -> CalendarDate {
    if must_start_today(existing, today) {
        return today;
    }
    let mut candidate = today;
    for occupied in blocked_ranges(existing, today, None) {
        if occupied.contains_day(candidate) {
            candidate = next_day(occupied.end);
        } else if occupied.start > candidate {
            break;
        }
    }
    candidate
}

/// Occupied day ranges that still matter for a date picker: merged, sorted,
/// and ending on or after today.
pub fn blocked_ranges(
    existing: &[PriceList],
    today: CalendarDate,
    ignore_id: Option<&EntityId>,
) -> Vec<Interval> {
    let intervals: Vec<Interval> = existing
        .iter()
        .filter(|l| Some(&l.id) != ignore_id)
        .map(|l| l.interval)
        .filter(|i| i.end >= today)
        .collect();
    merge_covered(&intervals)
}

/// Whether a date picker must grey out `date`: past days and days inside an
/// existing interval (boundaries included).
pub fn is_date_disabled(
    date: CalendarDate,
    today: CalendarDate,
    existing: &[PriceList],
    ignore_id: Option<&EntityId>,
) -> bool {
    date < today
        || existing
            .iter()
            .filter(|l| Some(&l.id) != ignore_id)
            .any(|l| l.interval.contains_day(date))
}

pub fn validate_interval(interval: &Interval) -> Result<(), EngineError> {
    if !interval.is_well_formed() {
        return Err(EngineError::InvalidInterval {
            start: interval.start,
            end: interval.end,
        });
    }
    if interval.len_days() > MAX_INTERVAL_DAYS {
        return Err(EngineError::LimitExceeded("interval too wide"));
    }
    Ok(())
}

/// Full pre-write check for a new price list interval.
pub fn validate_new(
    candidate: &Interval,
    existing: &[PriceList],
    today: CalendarDate,
) -> Result<(), EngineError> {
    validate_interval(candidate)?;
    if candidate.start < today {
        return Err(EngineError::InPast {
            date: candidate.start,
            today,
        });
    }
    if must_start_today(existing, today) && candidate.start != today {
        return Err(EngineError::MustStartToday {
            today,
            requested: candidate.start,
        });
    }
    check_placement(candidate, existing, None)
}

/// Code, name and line-count caps for anything about to become a price list.
pub fn validate_draft_limits(draft: &PriceListDraft) -> Result<(), EngineError> {
    if draft.code.is_empty() || draft.code.len() > MAX_CODE_LEN {
        return Err(EngineError::LimitExceeded("price list code length"));
    }
    if draft.name.len() > MAX_NAME_LEN {
        return Err(EngineError::LimitExceeded("price list name too long"));
    }
    if draft.lines.len() > MAX_LINES_PER_ENTITY {
        return Err(EngineError::LimitExceeded("too many price lines"));
    }
    Ok(())
}

pub fn validate_draft(
    draft: &PriceListDraft,
    existing: &[PriceList],
    today: CalendarDate,
) -> Result<(), EngineError> {
    validate_draft_limits(draft)?;
    validate_new(&draft.interval, existing, today)
}

/// Check an end-date edit (extend or shrink) and return the resulting interval.
pub fn validate_end_change(
    list: &PriceList,
    new_end: CalendarDate,
    existing: &[PriceList],
    today: CalendarDate,
) -> Result<Interval, EngineError> {
    if derive_status(&list.interval, today) == PriceListStatus::Expired {
        return Err(EngineError::Expired(list.id.clone()));
    }
    let Some(updated) = Interval::checked(list.interval.start, new_end) else {
        return Err(EngineError::InvalidInterval {
            start: list.interval.start,
            end: new_end,
        });
    };
    validate_interval(&updated)?;
    if new_end < today {
        return Err(EngineError::InPast {
            date: new_end,
            today,
        });
    }
    check_placement(&updated, existing, Some(&list.id))?;
    Ok(updated)
}
