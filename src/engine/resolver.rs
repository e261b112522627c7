use std::collections::BTreeMap;

use crate::calendar::CalendarDate;
use crate::model::*;

/// Result of one resolver pass over a voucher snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Resolution {
    /// Only entries whose desired status differs from the stored one, sorted by id.
    pub changes: Vec<StatusChange>,
    /// Vouchers forced off because today is outside their window.
    pub out_of_window: usize,
    /// `(winner, loser)` for every overlapping pair of enabled, in-window vouchers.
    pub conflicts: Vec<(EntityId, EntityId)>,
}

impl Resolution {
    pub fn is_converged(&self) -> bool {
        self.changes.is_empty()
    }
}

/// Phase A window test. Exclusive on both ends: a voucher's first and last day
/// count as outside its own window.
pub fn in_window(interval: &Interval, today: CalendarDate) -> bool {
    today > interval.start && today < interval.end
}

/// Why a voucher would or would not be forced off today.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowCheck {
    pub in_window: bool,
    /// Stored status is enabled but the window says otherwise.
    pub forced_off: bool,
}

pub fn explain(voucher: &Voucher, today: CalendarDate) -> WindowCheck {
    let in_window = in_window(&voucher.interval, today);
    WindowCheck {
        in_window,
        forced_off: !in_window && voucher.status.is_enabled(),
    }
}

/// One convergence step: snapshot in, diffs out.
///
/// Phase A disables everything outside its window and leaves in-window
/// vouchers at their stored (operator-chosen) status. Phase B looks at every
/// unordered pair of in-window enabled vouchers whose intervals overlap; the
/// greater id wins and the other is disabled. Pairs are judged independently,
/// not by transitive closure: a pass only promises progress, and the next
/// tick re-derives from whatever the backend actually accepted.
pub fn resolve(vouchers: &[Voucher], today: CalendarDate) -> Resolution {
    let mut forced: BTreeMap<&EntityId, VoucherStatus> = BTreeMap::new();
    let mut resolution = Resolution::default();

    // Phase A
    let mut participants: Vec<&Voucher> = Vec::new();
    for v in vouchers {
        if in_window(&v.interval, today) {
            if v.status.is_enabled() {
                participants.push(v);
            }
        } else {
            forced.insert(&v.id, VoucherStatus::Disabled);
            if v.status.is_enabled() {
                resolution.out_of_window += 1;
            }
        }
    }

    // Phase B
    participants.sort_by(|a, b| a.id.cmp(&b.id));
    for (i, a) in participants.iter().enumerate() {
        for b in &participants[i + 1..] {
            if !a.interval.overlaps(&b.interval) {
                continue;
            }
            // Sorted ascending, so `b` has the greater id.
            resolution.conflicts.push((b.id.clone(), a.id.clone()));
            forced.entry(&a.id).or_insert(VoucherStatus::Disabled);
        }
    }

    let mut ordered: Vec<&Voucher> = vouchers.iter().collect();
    ordered.sort_by(|a, b| a.id.cmp(&b.id));
    ordered.dedup_by(|a, b| a.id == b.id);
    for v in ordered {
        let desired = forced.get(&v.id).copied().unwrap_or(v.status);
        if desired != v.status {
            resolution.changes.push(StatusChange {
                id: v.id.clone(),
                desired,
            });
        }
    }
    resolution
}

/// Apply changes to a local copy, as the backend would.
pub fn apply_changes(vouchers: &mut [Voucher], changes: &[StatusChange]) {
    for change in changes {
        for v in vouchers.iter_mut().filter(|v| v.id == change.id) {
            v.status = change.desired;
        }
    }
}
