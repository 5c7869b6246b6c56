use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::config::ServerConfig;

/// PRTG status filter value for sensors in the "Down" state.
const STATUS_DOWN: &str = "5";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SensorRecord {
    pub device: String,
    pub last_up: String,
}

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("timeout")]
    Timeout,
    #[error("connection failed: {0}")]
    Connection(String),
    #[error("server returned status {0}")]
    Status(u16),
    #[error("http error: {0}")]
    Http(String),
    #[error("invalid response: {0}")]
    Decode(String),
    #[error("invalid server address {address}: {reason}")]
    Address { address: String, reason: String },
}

impl From<reqwest::Error> for SourceError {
    fn from(err: reqwest::Error) -> Self {
        // Strip the URL: it carries the credentials as query parameters.
        let err = err.without_url();
        if err.is_timeout() {
            SourceError::Timeout
        } else if err.is_connect() {
            SourceError::Connection(err.to_string())
        } else if err.is_decode() {
            SourceError::Decode(err.to_string())
        } else if let Some(status) = err.status() {
            SourceError::Status(status.as_u16())
        } else {
            SourceError::Http(err.to_string())
        }
    }
}

#[async_trait]
pub trait SensorSource: Send + Sync {
    async fn fetch_down_sensors(&self, server: &ServerConfig) -> Result<Vec<SensorRecord>, SourceError>;
}

#[derive(Debug, Deserialize)]
struct TableResponse {
    #[serde(default)]
    sensors: Vec<TableSensor>,
}

#[derive(Debug, Deserialize)]
struct TableSensor {
    device: Option<String>,
    lastup: Option<String>,
}

impl From<TableSensor> for SensorRecord {
    fn from(raw: TableSensor) -> Self {
        Self {
            device: raw.device.unwrap_or_else(|| "Unknown Device".to_string()),
            last_up: raw.lastup.unwrap_or_else(|| "Unknown".to_string()),
        }
    }
}

/// Queries the PRTG table API over HTTPS without certificate verification.
#[derive(Debug, Clone)]
pub struct PrtgSource {
    client: Client,
    scheme: &'static str,
}

impl PrtgSource {
    pub fn new(timeout: Duration) -> Result<Self, SourceError> {
        let client = Client::builder()
            .danger_accept_invalid_certs(true)
            .timeout(timeout)
            .build()
            .map_err(|err| SourceError::Http(err.to_string()))?;
        Ok(Self {
            client,
            scheme: "https",
        })
    }

    #[cfg(test)]
    fn over_plain_http(mut self) -> Self {
        self.scheme = "http";
        self
    }

    pub fn query_url(&self, server: &ServerConfig) -> Result<Url, SourceError> {
        let base = format!("{}://{}/api/table.json", self.scheme, server.address);
        Url::parse_with_params(
            &base,
            [
                ("content", "sensors"),
                ("columns", "device,lastup"),
                ("filter_status", STATUS_DOWN),
                ("username", server.credentials.username.as_str()),
                ("password", server.credentials.password.as_str()),
            ],
        )
        .map_err(|err| SourceError::Address {
            address: server.address.clone(),
            reason: err.to_string(),
        })
    }

    pub fn decode(body: &[u8]) -> Result<Vec<SensorRecord>, SourceError> {
        let table: TableResponse =
            serde_json::from_slice(body).map_err(|err| SourceError::Decode(err.to_string()))?;
        Ok(table.sensors.into_iter().map(SensorRecord::from).collect())
    }
}

#[async_trait]
impl SensorSource for PrtgSource {
    async fn fetch_down_sensors(&self, server: &ServerConfig) -> Result<Vec<SensorRecord>, SourceError> {
        let url = self.query_url(server)?;
        info!(server = %server.address, group = %server.group, "fetching down sensors");

        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(SourceError::Status(status.as_u16()));
        }

        let body = response.bytes().await?;
        let sensors = Self::decode(&body)?;
        info!(server = %server.address, sensors = sensors.len(), "retrieved down sensors");
        Ok(sensors)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use axum::extract::{RawQuery, State};
    use axum::http::StatusCode;
    use axum::routing::get;
    use axum::Router;

    use super::*;
    use crate::config::Credentials;

    fn source() -> PrtgSource {
        PrtgSource::new(Duration::from_secs(5)).expect("source")
    }

    /// Serves `body` with `status` on an ephemeral port and records each query string.
    async fn serve_table(status: StatusCode, body: &'static str) -> (String, Arc<Mutex<Vec<String>>>) {
        let queries = Arc::new(Mutex::new(Vec::new()));
        let app = Router::new()
            .route(
                "/api/table.json",
                get(
                    move |State(seen): State<Arc<Mutex<Vec<String>>>>, RawQuery(query): RawQuery| async move {
                        seen.lock().expect("query lock").push(query.unwrap_or_default());
                        (status, body)
                    },
                ),
            )
            .with_state(queries.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let address = listener.local_addr().expect("local addr").to_string();
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        (address, queries)
    }

    fn server(address: &str) -> ServerConfig {
        ServerConfig {
            address: address.to_string(),
            credentials: Credentials {
                username: "api user".to_string(),
                password: "p&ss".to_string(),
            },
            group: "Group 1".to_string(),
        }
    }

    #[test]
    fn query_url_requests_down_sensors_with_encoded_credentials() {
        let url = source().query_url(&server("10.1.2.3:8443")).expect("url");

        assert_eq!(url.scheme(), "https");
        assert_eq!(url.host_str(), Some("10.1.2.3"));
        assert_eq!(url.port(), Some(8443));
        assert_eq!(url.path(), "/api/table.json");

        let pairs: Vec<(String, String)> = url
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        assert!(pairs.contains(&("content".into(), "sensors".into())));
        assert!(pairs.contains(&("columns".into(), "device,lastup".into())));
        assert!(pairs.contains(&("filter_status".into(), "5".into())));
        assert!(pairs.contains(&("username".into(), "api user".into())));
        assert!(pairs.contains(&("password".into(), "p&ss".into())));
    }

    #[test]
    fn query_url_rejects_garbage_address() {
        let err = source().query_url(&server("bad host/::")).unwrap_err();
        assert!(matches!(err, SourceError::Address { .. }));
    }

    #[test]
    fn decode_fills_missing_fields() {
        let body = br#"{"prtg-version":"23.1","treesize":2,"sensors":[
            {"device":"core-sw-01","lastup":"3/4/2024 2:30:00 PM [10 d ago]"},
            {"lastup":""},
            {"device":"edge-rtr"}
        ]}"#;

        let sensors = PrtgSource::decode(body).expect("decode");

        assert_eq!(sensors.len(), 3);
        assert_eq!(sensors[0].device, "core-sw-01");
        assert_eq!(sensors[1].device, "Unknown Device");
        assert_eq!(sensors[1].last_up, "");
        assert_eq!(sensors[2].last_up, "Unknown");
    }

    #[test]
    fn decode_without_sensor_list_is_empty() {
        let sensors = PrtgSource::decode(br#"{"treesize":0}"#).expect("decode");
        assert!(sensors.is_empty());
    }

    #[test]
    fn decode_rejects_non_json() {
        let err = PrtgSource::decode(b"<html>login</html>").unwrap_err();
        assert!(matches!(err, SourceError::Decode(_)));
    }

    #[tokio::test]
    async fn fetch_decodes_down_sensors_from_table_api() {
        // Arrange
        let (address, queries) = serve_table(
            StatusCode::OK,
            r#"{"sensors":[{"device":"olt-1","lastup":"3/4/2024 2:30:00 PM [10 d ago]"}]}"#,
        )
        .await;
        let source = source().over_plain_http();

        // Act
        let sensors = source.fetch_down_sensors(&server(&address)).await.expect("fetch");

        // Assert
        assert_eq!(sensors, vec![SensorRecord {
            device: "olt-1".to_string(),
            last_up: "3/4/2024 2:30:00 PM [10 d ago]".to_string(),
        }]);
        let queries = queries.lock().expect("query lock");
        assert_eq!(queries.len(), 1);
        assert!(queries[0].contains("filter_status=5"));
        assert!(queries[0].contains("content=sensors"));
    }

    #[tokio::test]
    async fn fetch_maps_error_status() {
        let (unauthorized, _) = serve_table(StatusCode::UNAUTHORIZED, "login failed").await;
        let (broken, _) = serve_table(StatusCode::INTERNAL_SERVER_ERROR, "boom").await;
        let source = source().over_plain_http();

        let err = source.fetch_down_sensors(&server(&unauthorized)).await.unwrap_err();
        assert!(matches!(err, SourceError::Status(401)));

        let err = source.fetch_down_sensors(&server(&broken)).await.unwrap_err();
        assert!(matches!(err, SourceError::Status(500)));
    }
}
