use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};
use serde_json::Value;
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, instrument, warn};

use crate::config::Config;

pub mod model;

pub use model::{
    RemoteAddress, RemoteCustomer, RemoteItem, RemoteOrder, RemoteOrderSummary, RemoteSchedule,
    StrOrInt,
};

const ORDERS_PATH: &str = "api/partner/v1/orders";

/// Failure talking to the partner API.
#[derive(Debug, Error)]
pub enum PartnerError {
    #[error("invalid request: {0}")]
    Request(String),
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("HTTP {status}")]
    Status { status: u16, body: String },
    #[error("invalid JSON: {0}")]
    InvalidJson(String),
}

/// Capabilities the reconciler consumes from the delivery platform.
#[async_trait]
pub trait PartnerApi: Send + Sync {
    async fn list_orders(&self) -> Result<Vec<RemoteOrderSummary>, PartnerError>;

    async fn get_order(&self, order_id: &str) -> Result<RemoteOrder, PartnerError>;
}

#[derive(Clone)]
pub struct PartnerClient {
    http: Client,
    base_url: Url,
    api_key: String,
}

impl fmt::Debug for PartnerClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PartnerClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl PartnerClient {
    pub fn new(base_url: &str, api_key: String, timeout: Duration) -> Result<Self> {
        // A trailing slash keeps any path prefix when joining endpoint paths.
        let normalized = if base_url.ends_with('/') {
            base_url.to_string()
        } else {
            format!("{base_url}/")
        };
        let base_url = Url::parse(&normalized).context("invalid partner base URL")?;
        let http = Client::builder()
            .user_agent("pedidos-sync/0.1")
            .timeout(timeout)
            .build()
            .context("failed to build partner HTTP client")?;
        Ok(Self {
            http,
            base_url,
            api_key,
        })
    }

    pub fn from_config(cfg: &Config) -> Result<Self> {
        Self::new(
            &cfg.partner.base_url,
            cfg.partner.api_key.clone(),
            cfg.partner_timeout(),
        )
    }

    fn orders_url(&self, order_id: Option<&str>) -> Result<Url> {
        let mut url = self
            .base_url
            .join(ORDERS_PATH)
            .context("invalid partner base URL")?;
        if let Some(id) = order_id {
            url.path_segments_mut()
                .map_err(|_| anyhow!("partner base URL cannot carry a path"))?
                .push(id);
        }
        Ok(url)
    }

    pub fn build_request(&self, order_id: Option<&str>) -> Result<reqwest::Request> {
        let url = self.orders_url(order_id)?;
        self.http
            .get(url)
            .header("X-API-KEY", &self.api_key)
            .header("Content-Type", "application/json")
            .build()
            .context("failed to build partner request")
    }

    async fn fetch_json(&self, order_id: Option<&str>) -> Result<Value, PartnerError> {
        let request = self
            .build_request(order_id)
            .map_err(|err| PartnerError::Request(format!("{err:#}")))?;
        debug!(url = %request.url(), "partner request");

        let res = self.http.execute(request).await?;
        let status = res.status();
        if status != StatusCode::OK {
            let body = res.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), body = %body, "partner API error");
            return Err(PartnerError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let body = res.text().await?;
        serde_json::from_str(&body).map_err(|err| PartnerError::InvalidJson(err.to_string()))
    }

    /// Raw detail payload, used by diagnostics that print what the partner sent.
    #[instrument(skip(self))]
    pub async fn get_order_raw(&self, order_id: &str) -> Result<Value, PartnerError> {
        let value = self.fetch_json(Some(order_id)).await?;
        if !value.is_object() {
            return Err(PartnerError::InvalidJson("expected an order object".into()));
        }
        Ok(value)
    }
}

#[async_trait]
impl PartnerApi for PartnerClient {
    #[instrument(skip_all)]
    async fn list_orders(&self) -> Result<Vec<RemoteOrderSummary>, PartnerError> {
        let value = self.fetch_json(None).await?;
        if !value.is_array() {
            return Err(PartnerError::InvalidJson("expected an array of orders".into()));
        }
        serde_json::from_value(value).map_err(|err| PartnerError::InvalidJson(err.to_string()))
    }

    #[instrument(skip(self))]
    async fn get_order(&self, order_id: &str) -> Result<RemoteOrder, PartnerError> {
        let value = self.get_order_raw(order_id).await?;
        serde_json::from_value(value).map_err(|err| PartnerError::InvalidJson(err.to_string()))
    }
}
