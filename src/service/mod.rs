//! Read → derive → write → re-read cycles on top of a [`Backend`].
//!
//! The engine decides, the backend stores. Every write is preceded by a fresh
//! read and followed by one, and the re-read list is what gets published.

mod price_lists;
mod vouchers;


pub use price_lists::PriceListService;
pub use vouchers::{ConvergeOutcome, VoucherService};
