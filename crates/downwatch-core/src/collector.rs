use std::time::{Duration, Instant};

use tokio::time::timeout;
use tracing::{info, warn};

use crate::config::ServerConfig;
use crate::source::{SensorRecord, SensorSource, SourceError};

/// Down sensors reported by one server, tagged with the server's group.
#[derive(Debug, Clone)]
pub struct ServerSensors {
    pub group: String,
    pub address: String,
    pub sensors: Vec<SensorRecord>,
    pub error: Option<String>,
}

pub struct Collector<S: SensorSource> {
    source: S,
    servers: Vec<ServerConfig>,
    query_timeout: Duration,
}

impl<S: SensorSource> Collector<S> {
    pub fn new(source: S, servers: Vec<ServerConfig>, query_timeout: Duration) -> Self {
        Self {
            source,
            servers,
            query_timeout,
        }
    }

    pub fn servers(&self) -> &[ServerConfig] {
        &self.servers
    }

    /// Polls every server in configured order, one at a time.
    ///
    /// A failing or slow server contributes an empty sensor list; the walk always
    /// covers all servers and makes a single attempt per server.
    pub async fn collect(&self) -> Vec<ServerSensors> {
        let mut out = Vec::with_capacity(self.servers.len());

        for server in &self.servers {
            let started = Instant::now();
            let result = match timeout(self.query_timeout, self.source.fetch_down_sensors(server)).await {
                Ok(result) => result,
                Err(_) => Err(SourceError::Timeout),
            };

            match result {
                Ok(sensors) => {
                    info!(server=%server.address, group=%server.group, sensors=sensors.len(), rtt_ms=%started.elapsed().as_millis(), "collected");
                    out.push(ServerSensors {
                        group: server.group.clone(),
                        address: server.address.clone(),
                        sensors,
                        error: None,
                    });
                }
                Err(err) => {
                    warn!(server=%server.address, group=%server.group, error=%err, "query failed, treating as no sensors");
                    out.push(ServerSensors {
                        group: server.group.clone(),
                        address: server.address.clone(),
                        sensors: Vec::new(),
                        error: Some(err.to_string()),
                    });
                }
            }
        }

        out
    }
}
