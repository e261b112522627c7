//! The console backend as seen by the engine: full-list reads plus the few
//! writes the timeline operations need.

mod http;
mod local;

pub use http::HttpBackend;
pub use local::{run_compactor, LocalStore};

use async_trait::async_trait;
use thiserror::Error;

use crate::calendar::CalendarDate;
use crate::engine::ErrorKind;
use crate::model::*;

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("not found: {0}")]
    NotFound(EntityId),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("invalid request: {0}")]
    Invalid(String),
    #[error("rejected by backend ({status}): {body}")]
    Rejected { status: u16, body: String },
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("journal error: {0}")]
    Journal(String),
    #[error("limit exceeded: {0}")]
    LimitExceeded(&'static str),
}

impl BackendError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            BackendError::Conflict(_) => ErrorKind::Conflict,
            BackendError::NotFound(_)
            | BackendError::Invalid(_)
            | BackendError::LimitExceeded(_) => ErrorKind::Validation,
            BackendError::Rejected { status, .. } if (400..500).contains(status) => {
                ErrorKind::Validation
            }
            BackendError::Rejected { .. }
            | BackendError::Transport(_)
            | BackendError::Journal(_) => ErrorKind::Transient,
        }
    }
}

pub type BackendResult<T> = Result<T, BackendError>;

#[async_trait]
pub trait Backend: Send + Sync {
    async fn fetch_all_price_lists(&self) -> BackendResult<Vec<PriceList>>;

    async fn fetch_all_vouchers(&self) -> BackendResult<Vec<Voucher>>;

    async fn update_price_list_interval(&self, id: &EntityId, new_end: CalendarDate) -> BackendResult<()>;

    async fn create_price_list(&self, draft: PriceListDraft) -> BackendResult<PriceList>;

    async fn delete_price_list(&self, id: &EntityId) -> BackendResult<()>;

    async fn update_voucher_status(&self, id: &EntityId, status: VoucherStatus) -> BackendResult<()>;

    /// Gap report for the price list timeline. Computed locally unless the
    /// backend knows better.
    async fn detect_time_gaps(&self) -> BackendResult<GapReport> {
        let lists = self.fetch_all_price_lists().await?;
        Ok(GapReport::from_price_lists(&lists))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_kinds() {
        assert_eq!(BackendError::Conflict("x".into()).kind(), ErrorKind::Conflict);
        assert_eq!(
            BackendError::Rejected { status: 422, body: String::new() }.kind(),
            ErrorKind::Validation
        );
        assert_eq!(
            BackendError::Rejected { status: 503, body: String::new() }.kind(),
            ErrorKind::Transient
        );
        assert_eq!(BackendError::Journal("io".into()).kind(), ErrorKind::Transient);
    }
}
