use crate::calendar::CalendarDate;
use crate::limits::*;
use crate::model::*;

use super::pricing::validate_interval;
use super::EngineError;

fn percent_of(offer: &Offer) -> Option<u8> {
    match offer {
        Offer::Item(o) => match o.reward {
            ItemReward::PercentOff(p) => Some(p),
            ItemReward::Free => None,
        },
        Offer::Amount(_) => None,
        Offer::Percent(o) => Some(o.percent),
        Offer::Voucher(c) => Some(c.percent),
    }
}

/// Lines that could apply on `day`: enabled, in their own interval, with stock left.
pub fn eligible_lines(voucher: &Voucher, day: CalendarDate) -> Vec<&PromotionLine> {
    voucher
        .lines
        .iter()
        .filter(|l| l.status.is_enabled() && l.interval.contains_day(day) && l.offer.has_stock())
        .collect()
}

/// Why two lines may not both be eligible, if they clash.
fn stacking_clash(a: &StackingPolicy, b: &StackingPolicy) -> Option<&'static str> {
    match (a, b) {
        (StackingPolicy::Exclusive, _) | (_, StackingPolicy::Exclusive) => {
            Some("an exclusive line cannot share days with another line")
        }
        (
            StackingPolicy::ExclusiveWithGroup { group: ga },
            StackingPolicy::ExclusiveWithGroup { group: gb },
        ) if ga == gb => Some("lines share an exclusion group"),
        _ => None,
    }
}

/// Structural checks for a voucher and its promotion lines.
pub fn validate_voucher(voucher: &Voucher) -> Result<(), EngineError> {
    if voucher.code.is_empty() || voucher.code.len() > MAX_CODE_LEN {
        return Err(EngineError::LimitExceeded("voucher code length"));
    }
    if voucher.name.len() > MAX_NAME_LEN {
        return Err(EngineError::LimitExceeded("voucher name too long"));
    }
    if voucher.lines.len() > MAX_LINES_PER_ENTITY {
        return Err(EngineError::LimitExceeded("too many promotion lines"));
    }
    validate_interval(&voucher.interval)?;

    for line in &voucher.lines {
        validate_interval(&line.interval)?;
        if !voucher.interval.contains_interval(&line.interval) {
            return Err(EngineError::LineOutsideVoucher {
                line: line.id.clone(),
                interval: line.interval,
            });
        }
        if let StackingPolicy::ExclusiveWithGroup { group } = &line.rule.stacking
            && group.trim().is_empty()
        {
            return Err(EngineError::MissingExclusionGroup(line.id.clone()));
        }
        if percent_of(&line.offer).is_some_and(|p| p > MAX_PERCENT) {
            return Err(EngineError::LimitExceeded("percent above 100"));
        }
    }

    check_stacking(&voucher.lines)
}

/// Pairwise stacking check over enabled lines with overlapping intervals.
pub fn check_stacking(lines: &[PromotionLine]) -> Result<(), EngineError> {
    let enabled: Vec<&PromotionLine> = lines.iter().filter(|l| l.status.is_enabled()).collect();
    for (i, a) in enabled.iter().enumerate() {
        for b in &enabled[i + 1..] {
            if !a.interval.overlaps(&b.interval) {
                continue;
            }
            if let Some(reason) = stacking_clash(&a.rule.stacking, &b.rule.stacking) {
                return Err(EngineError::StackingConflict {
                    a: a.id.clone(),
                    b: b.id.clone(),
                    day: a.interval.start.max(b.interval.start),
                    reason,
                });
            }
        }
    }
    Ok(())
}
