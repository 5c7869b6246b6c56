use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use thiserror::Error;
use tracing::info;

use crate::config::SinkConfig;
use crate::report::ReportEntry;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportTable {
    Full,
    Critical,
}

impl ReportTable {
    pub fn as_str(self) -> &'static str {
        match self {
            ReportTable::Full => "full_report_logs",
            ReportTable::Critical => "critical_report_logs",
        }
    }
}

impl std::fmt::Display for ReportTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("insert into {table} failed with status {status}: {body}")]
    Rejected {
        table: ReportTable,
        status: u16,
        body: String,
    },
    #[error("sink health check failed with status {status}: {body}")]
    Unhealthy { status: u16, body: String },
    #[error("sink unreachable: {0}")]
    Unreachable(String),
    #[error("sink client error: {0}")]
    Client(String),
}

#[async_trait]
pub trait ReportSink: Send + Sync {
    async fn insert(&self, table: ReportTable, rows: &[ReportEntry]) -> Result<(), SinkError>;
    async fn ping(&self) -> Result<(), SinkError>;
}

/// Writes report rows through a PostgREST endpoint (the Supabase REST API).
#[derive(Debug, Clone)]
pub struct PostgrestSink {
    client: Client,
    base_url: String,
    api_key: String,
}

impl PostgrestSink {
    pub fn new(config: &SinkConfig, timeout: Duration) -> Result<Self, SinkError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| SinkError::Client(err.to_string()))?;
        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        })
    }

    pub fn table_url(&self, table: ReportTable) -> String {
        format!("{}/rest/v1/{}", self.base_url, table.as_str())
    }

    fn authorized(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        request
            .header("apikey", &self.api_key)
            .bearer_auth(&self.api_key)
    }
}

#[async_trait]
impl ReportSink for PostgrestSink {
    async fn insert(&self, table: ReportTable, rows: &[ReportEntry]) -> Result<(), SinkError> {
        if rows.is_empty() {
            return Ok(());
        }

        info!(%table, rows = rows.len(), "inserting report rows");
        let response = self
            .authorized(self.client.post(self.table_url(table)))
            .header("Prefer", "return=minimal")
            .json(rows)
            .send()
            .await
            .map_err(|err| SinkError::Unreachable(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SinkError::Rejected {
                table,
                status: status.as_u16(),
                body,
            });
        }

        info!(%table, rows = rows.len(), "report rows inserted");
        Ok(())
    }

    async fn ping(&self) -> Result<(), SinkError> {
        let response = self
            .authorized(self.client.get(self.table_url(ReportTable::Full)))
            .query(&[("select", "id"), ("limit", "1")])
            .send()
            .await
            .map_err(|err| SinkError::Unreachable(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SinkError::Unhealthy {
                status: status.as_u16(),
                body,
            });
        }
        Ok(())
    }
}
