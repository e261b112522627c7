//! Pure timeline rules: gap detection, price list placement and status,
//! versioning plans, promotion line stacking, and the voucher resolver.
//! Nothing in here performs I/O; the services feed it snapshots.

mod error;
pub mod gaps;
pub mod lines;
pub mod pricing;
pub mod resolver;
pub mod versioning;

pub use error::{EngineError, ErrorKind};
pub use gaps::{find_gaps, merge_covered};
pub use lines::{check_stacking, eligible_lines, validate_voucher};
pub use pricing::{
    blocked_ranges, check_placement, derive_status, is_date_disabled, is_placement_legal,
    must_start_today, suggest_start, validate_draft, validate_draft_limits, validate_end_change,
    validate_new,
};
pub use resolver::{explain, in_window, resolve, Resolution, WindowCheck};
pub use versioning::{plan_duplicate, plan_split, DuplicatePlan, SplitPlan};
