use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::calendar::CalendarDate;
use crate::model::*;

use super::{Backend, BackendError, BackendResult};

#[derive(Serialize, Deserialize)]
struct EndChange {
    end: CalendarDate,
}

#[derive(Serialize, Deserialize)]
struct StatusUpdate {
    status: VoucherStatus,
}

/// REST client for the console backend.
#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: Client,
    base: Url,
    token: Option<String>,
}

impl HttpBackend {
    pub fn new(base_url: &str, token: Option<String>, timeout: Duration) -> BackendResult<Self> {
        let base = Url::parse(base_url.trim_end_matches('/'))
            .map_err(|e| BackendError::Invalid(format!("base url {base_url}: {e}")))?;
        if base.cannot_be_a_base() {
            return Err(BackendError::Invalid(format!("base url {base_url} cannot take a path")));
        }
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client, base, token })
    }

    pub fn base_url(&self) -> &str {
        self.base.as_str()
    }

    /// Base url plus `segments`, each percent-encoded as one path segment.
    fn endpoint(&self, segments: &[&str]) -> BackendResult<Url> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| BackendError::Invalid(format!("base url {} cannot take a path", self.base)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn send(&self, req: RequestBuilder) -> BackendResult<Response> {
        let req = match &self.token {
            Some(token) => req.bearer_auth(token),
            None => req,
        };
        let response = req.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        debug!("backend answered {status}: {body}");
        Err(match status {
            StatusCode::CONFLICT => BackendError::Conflict(body),
            StatusCode::NOT_FOUND => BackendError::NotFound(EntityId::new(body)),
            _ => BackendError::Rejected {
                status: status.as_u16(),
                body,
            },
        })
    }

    async fn get_json<T: DeserializeOwned>(&self, segments: &[&str]) -> BackendResult<T> {
        let response = self.send(self.client.get(self.endpoint(segments)?)).await?;
        Ok(response.json().await?)
    }
}

#[async_trait]
impl Backend for HttpBackend {
    async fn fetch_all_price_lists(&self) -> BackendResult<Vec<PriceList>> {
        self.get_json(&["price-lists"]).await
    }

    async fn fetch_all_vouchers(&self) -> BackendResult<Vec<Voucher>> {
        self.get_json(&["vouchers"]).await
    }

    async fn update_price_list_interval(&self, id: &EntityId, new_end: CalendarDate) -> BackendResult<()> {
        let req = self
            .client
            .put(self.endpoint(&["price-lists", id.as_str(), "end"])?)
            .json(&EndChange { end: new_end });
        self.send(req).await.map(|_| ())
    }

    async fn create_price_list(&self, draft: PriceListDraft) -> BackendResult<PriceList> {
        let req = self.client.post(self.endpoint(&["price-lists"])?).json(&draft);
        Ok(self.send(req).await?.json().await?)
    }

    async fn delete_price_list(&self, id: &EntityId) -> BackendResult<()> {
        let req = self.client.delete(self.endpoint(&["price-lists", id.as_str()])?);
        self.send(req).await.map(|_| ())
    }

    async fn update_voucher_status(&self, id: &EntityId, status: VoucherStatus) -> BackendResult<()> {
        let req = self
            .client
            .put(self.endpoint(&["vouchers", id.as_str(), "status"])?)
            .json(&StatusUpdate { status });
        self.send(req).await.map(|_| ())
    }

    async fn detect_time_gaps(&self) -> BackendResult<GapReport> {
        self.get_json(&["price-lists", "gaps"]).await
    }
}
