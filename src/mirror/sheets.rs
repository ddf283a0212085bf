//! HTTP client for a spreadsheet values API (Google Sheets v4 shape).
//!
//! Every event is a read-modify-write of the territory's two-row block.
//! Transient failures are retried with exponential backoff, and the HTTP
//! client is rebuilt after connection-level errors.

use crate::core::TerritoryId;
use crate::mirror::slots::{SlotBlock, block_range};
use crate::mirror::{MirrorError, MirrorSink};
use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::{Client, RequestBuilder, Response, Url};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, warn};

pub const DEFAULT_ENDPOINT: &str = "https://sheets.googleapis.com/v4/spreadsheets";
pub const DEFAULT_SHEET: &str = "Sheet1";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            base_delay: Duration::from_millis(250),
        }
    }
}

impl RetryPolicy {
    fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(2u32.saturating_pow(attempt))
    }
}

#[derive(Debug, Clone)]
pub struct SheetsConfig {
    pub endpoint: String,
    pub spreadsheet_id: String,
    pub sheet_name: String,
    pub access_token: Option<String>,
    pub request_timeout: Duration,
    pub retry: RetryPolicy,
}

impl SheetsConfig {
    pub fn new(spreadsheet_id: impl Into<String>) -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            spreadsheet_id: spreadsheet_id.into(),
            sheet_name: DEFAULT_SHEET.to_string(),
            access_token: None,
            request_timeout: Duration::from_secs(10),
            retry: RetryPolicy::default(),
        }
    }

    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn sheet_name(mut self, sheet_name: impl Into<String>) -> Self {
        self.sheet_name = sheet_name.into();
        self
    }

    pub fn access_token(mut self, token: impl Into<String>) -> Self {
        self.access_token = Some(token.into());
        self
    }

    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

#[derive(Debug, Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<String>>,
}

#[derive(Debug, Serialize)]
struct ValueRangeUpdate<'a> {
    range: &'a str,
    #[serde(rename = "majorDimension")]
    major_dimension: &'static str,
    values: Vec<Vec<String>>,
}

pub struct SheetsMirror {
    config: SheetsConfig,
    client: RwLock<Client>,
}

impl SheetsMirror {
    pub fn new(config: SheetsConfig) -> Result<Self, MirrorError> {
        let client = build_client(&config)?;
        Ok(Self {
            config,
            client: RwLock::new(client),
        })
    }

    fn values_url(&self, range: &str) -> Result<Url, MirrorError> {
        let mut url = Url::parse(&self.config.endpoint)
            .map_err(|e| MirrorError::Transport(format!("invalid mirror endpoint: {}", e)))?;
        url.path_segments_mut()
            .map_err(|_| MirrorError::Transport("mirror endpoint cannot be a base URL".into()))?
            .pop_if_empty()
            .push(&self.config.spreadsheet_id)
            .push("values")
            .push(range);
        Ok(url)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.config.access_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn read_block(&self, range: &str) -> Result<SlotBlock, MirrorError> {
        let url = self.values_url(range)?;
        let response = self
            .send_with_retry(|client| self.authorize(client.get(url.clone())))
            .await?;
        let body: ValueRange = response
            .json()
            .await
            .map_err(|e| MirrorError::Decode(e.to_string()))?;
        Ok(SlotBlock::from_rows(&body.values))
    }

    async fn write_block(&self, range: &str, block: &SlotBlock) -> Result<(), MirrorError> {
        let url = self.values_url(range)?;
        let body = ValueRangeUpdate {
            range,
            major_dimension: "ROWS",
            values: block.to_rows(),
        };
        self.send_with_retry(|client| {
            self.authorize(
                client
                    .put(url.clone())
                    .query(&[("valueInputOption", "RAW")])
                    .json(&body),
            )
        })
        .await?;
        Ok(())
    }

    async fn modify_block<F>(&self, territory_id: TerritoryId, apply: F) -> Result<(), MirrorError>
    where
        F: FnOnce(&mut SlotBlock),
    {
        let range = block_range(&self.config.sheet_name, territory_id)?;
        let mut block = self.read_block(&range).await?;
        apply(&mut block);
        self.write_block(&range, &block).await?;
        debug!(territory_id = %territory_id, range = %range, "mirror block updated");
        Ok(())
    }

    async fn send_with_retry<F>(&self, build: F) -> Result<Response, MirrorError>
    where
        F: Fn(&Client) -> RequestBuilder,
    {
        let policy = self.config.retry;
        let mut attempt = 0;

        loop {
            let client = self.client.read().await.clone();
            let outcome = build(&client).send().await;

            let error = match outcome {
                Ok(response) if response.status().is_success() => return Ok(response),
                Ok(response) => {
                    let status = response.status();
                    let message = response.text().await.unwrap_or_default();
                    let error = MirrorError::Status {
                        status: status.as_u16(),
                        message,
                    };
                    if !(status.is_server_error() || status.as_u16() == 429) {
                        return Err(error);
                    }
                    error
                }
                Err(err) => {
                    if err.is_connect() || err.is_timeout() {
                        self.reconnect().await;
                    }
                    MirrorError::Transport(err.to_string())
                }
            };

            attempt += 1;
            if attempt >= policy.attempts {
                return Err(error);
            }
            let delay = policy.delay_for(attempt - 1);
            warn!(attempt, delay_ms = delay.as_millis() as u64, error = %error, "mirror request failed, retrying");
            tokio::time::sleep(delay).await;
        }
    }

    async fn reconnect(&self) {
        match build_client(&self.config) {
            Ok(client) => *self.client.write().await = client,
            Err(err) => warn!(error = %err, "mirror client rebuild failed"),
        }
    }
}

fn build_client(config: &SheetsConfig) -> Result<Client, MirrorError> {
    Client::builder()
        .timeout(config.request_timeout)
        .build()
        .map_err(|e| MirrorError::Transport(e.to_string()))
}

#[async_trait]
impl MirrorSink for SheetsMirror {
    async fn notify_assigned(
        &self,
        territory_id: TerritoryId,
        assignee: &str,
        date_taken: NaiveDate,
        date_due: NaiveDate,
    ) -> Result<(), MirrorError> {
        self.modify_block(territory_id, |block| {
            block.record_assignment(assignee, date_taken, date_due)
        })
        .await
    }

    async fn notify_returned(
        &self,
        territory_id: TerritoryId,
        date_returned: NaiveDate,
    ) -> Result<(), MirrorError> {
        self.modify_block(territory_id, |block| block.record_return(date_returned))
            .await
    }

    async fn clear_record(&self, territory_id: TerritoryId) -> Result<(), MirrorError> {
        self.modify_block(territory_id, SlotBlock::clear).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn values_url_escapes_the_range() {
        let mirror = SheetsMirror::new(
            SheetsConfig::new("sheet-123").endpoint("http://127.0.0.1:9/v4/spreadsheets/"),
        )
        .unwrap();
        let url = mirror.values_url("Sheet 1!C6:L7").unwrap();
        assert_eq!(
            url.as_str(),
            "http://127.0.0.1:9/v4/spreadsheets/sheet-123/values/Sheet%201!C6:L7"
        );
    }

    #[test]
    fn retry_delay_grows_exponentially() {
        let policy = RetryPolicy {
            attempts: 4,
            base_delay: Duration::from_millis(100),
        };
        assert_eq!(policy.delay_for(0), Duration::from_millis(100));
        assert_eq!(policy.delay_for(2), Duration::from_millis(400));
    }

    #[tokio::test]
    async fn unreachable_endpoint_surfaces_transport_error() {
        let mirror = SheetsMirror::new(
            SheetsConfig::new("sheet-123")
                .endpoint("http://127.0.0.1:9/v4/spreadsheets")
                .retry(RetryPolicy {
                    attempts: 2,
                    base_delay: Duration::from_millis(1),
                }),
        )
        .unwrap();

        let err = mirror
            .clear_record(TerritoryId::new(1).unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, MirrorError::Transport(_)));
    }
}
