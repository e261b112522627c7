use std::fmt;

use serde::{Deserialize, Serialize};

use crate::calendar::{self, CalendarDate};

/// Opaque entity identifier. Ordering is lexicographic; the greater id is the
/// newer entity.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(String);

impl EntityId {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EntityId {
    fn from(raw: &str) -> Self {
        Self(raw.to_string())
    }
}

impl From<String> for EntityId {
    fn from(raw: String) -> Self {
        Self(raw)
    }
}

/// Closed interval `[start, end]` of calendar days.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Interval {
    #[serde(deserialize_with = "calendar::deserialize_day")]
    pub start: CalendarDate,
    #[serde(deserialize_with = "calendar::deserialize_day")]
    pub end: CalendarDate,
}

impl Interval {
    pub fn new(start: CalendarDate, end: CalendarDate) -> Self {
        debug_assert!(start <= end, "Interval start must not be after end");
        Self { start, end }
    }

    /// `None` when `end` is before `start`.
    pub fn checked(start: CalendarDate, end: CalendarDate) -> Option<Self> {
        (start <= end).then_some(Self { start, end })
    }

    /// Deserialized intervals skip the constructor, so callers re-check.
    pub fn is_well_formed(&self) -> bool {
        self.start <= self.end
    }

    /// Number of days covered, both ends included.
    pub fn len_days(&self) -> i64 {
        calendar::days_between(self.start, self.end) + 1
    }

    /// Inclusive on both ends: touching boundaries overlap.
    pub fn overlaps(&self, other: &Interval) -> bool {
        self.start <= other.end && other.start <= self.end
    }

    pub fn contains_day(&self, day: CalendarDate) -> bool {
        self.start <= day && day <= self.end
    }

    pub fn contains_interval(&self, other: &Interval) -> bool {
        self.start <= other.start && other.end <= self.end
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.start, self.end)
    }
}

// ── Price lists ─────────────────────────────────────────────────

/// Derived from the interval and today; never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriceListStatus {
    Scheduled,
    Active,
    Expired,
}

/// What a price line prices.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemRef {
    Product { code: String },
    Combo { code: String },
    Seat { seat_type: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceLine {
    pub id: EntityId,
    pub item: ItemRef,
    /// Price in minor currency units.
    pub price_minor: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceList {
    pub id: EntityId,
    pub code: String,
    pub name: String,
    pub interval: Interval,
    pub lines: Vec<PriceLine>,
}

/// Everything needed to create a price list; the backend assigns the id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceListDraft {
    pub code: String,
    pub name: String,
    pub interval: Interval,
    pub lines: Vec<PriceLine>,
}

// ── Vouchers ────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VoucherStatus {
    Enabled,
    Disabled,
}

impl VoucherStatus {
    pub fn is_enabled(self) -> bool {
        matches!(self, VoucherStatus::Enabled)
    }
}

impl fmt::Display for VoucherStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VoucherStatus::Enabled => f.write_str("enabled"),
            VoucherStatus::Disabled => f.write_str("disabled"),
        }
    }
}

/// How a promotion line combines with the other lines of the same order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StackingPolicy {
    /// Applies alongside any other line.
    Stackable,
    /// Never applies alongside another line.
    Exclusive,
    /// Never applies alongside another line of the same group.
    ExclusiveWithGroup { group: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineRule {
    pub stacking: StackingPolicy,
}

/// Redemption budget of a line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Budget {
    pub total: u32,
    pub used: u32,
}

impl Budget {
    pub fn remaining(&self) -> u32 {
        self.total.saturating_sub(self.used)
    }

    pub fn is_exhausted(&self) -> bool {
        self.remaining() == 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemReward {
    Free,
    PercentOff(u8),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemOffer {
    pub buy_item: String,
    pub buy_qty: u32,
    pub get_item: String,
    pub get_qty: u32,
    pub reward: ItemReward,
    pub budget: Budget,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AmountOffer {
    pub min_order_minor: u64,
    pub discount_minor: u64,
    pub budget: Budget,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PercentTarget {
    Combo { code: String },
    SeatType { seat_type: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PercentOffer {
    pub target: PercentTarget,
    pub percent: u8,
    pub budget: Budget,
}

/// Coupon a member redeems with loyalty points.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PointsCoupon {
    pub points_cost: u32,
    pub remaining: u32,
    pub percent: u8,
    pub max_discount_minor: u64,
}

/// The four promotion types, each carrying only its own payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Offer {
    Item(ItemOffer),
    Amount(AmountOffer),
    Percent(PercentOffer),
    Voucher(PointsCoupon),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PromotionType {
    Item,
    Amount,
    Percent,
    Voucher,
}

impl Offer {
    pub fn promotion_type(&self) -> PromotionType {
        match self {
            Offer::Item(_) => PromotionType::Item,
            Offer::Amount(_) => PromotionType::Amount,
            Offer::Percent(_) => PromotionType::Percent,
            Offer::Voucher(_) => PromotionType::Voucher,
        }
    }

    /// Whether the line can still be redeemed at all.
    pub fn has_stock(&self) -> bool {
        match self {
            Offer::Item(o) => !o.budget.is_exhausted(),
            Offer::Amount(o) => !o.budget.is_exhausted(),
            Offer::Percent(o) => !o.budget.is_exhausted(),
            Offer::Voucher(c) => c.remaining > 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromotionLine {
    pub id: EntityId,
    pub interval: Interval,
    pub status: VoucherStatus,
    pub rule: LineRule,
    pub offer: Offer,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Voucher {
    pub id: EntityId,
    pub code: String,
    pub name: String,
    pub interval: Interval,
    pub status: VoucherStatus,
    pub lines: Vec<PromotionLine>,
}

// ── Engine outputs ──────────────────────────────────────────────

/// One resolver decision: move `id` to `desired`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusChange {
    pub id: EntityId,
    pub desired: VoucherStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct GapReport {
    pub has_gap: bool,
    pub gaps: Vec<Interval>,
}

/// Journal record format of the local store. Flat, one variant per mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    PriceListCreated { list: PriceList },
    PriceListEndChanged { id: EntityId, end: CalendarDate },
    PriceListDeleted { id: EntityId },
    VoucherCreated { voucher: Voucher },
    VoucherStatusChanged { id: EntityId, status: VoucherStatus },
    VoucherDeleted { id: EntityId },
}
