use std::time::Duration;

use thiserror::Error;

/// Number of `PRTG_IP_{n}` slots scanned when loading servers from the environment.
pub const MAX_SERVER_SLOTS: usize = 21;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("no monitoring servers configured (set PRTG_IP_1..PRTG_IP_21)")]
    NoServers,
    #[error("missing credentials for server {address}: set PRTG_USER/PRTG_PASS or PRTG_USER_{slot}/PRTG_PASS_{slot}")]
    MissingCredentials { address: String, slot: usize },
    #[error("missing required setting {0}")]
    Missing(&'static str),
    #[error("invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub address: String,
    pub credentials: Credentials,
    pub group: String,
}

#[derive(Clone, PartialEq, Eq)]
pub struct SinkConfig {
    pub url: String,
    pub api_key: String,
}

impl std::fmt::Debug for SinkConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SinkConfig")
            .field("url", &self.url)
            .field("api_key", &"<redacted>")
            .finish()
    }
}

impl SinkConfig {
    pub fn from_env(required: bool) -> Result<Option<Self>, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok(), required)
    }

    /// Reads `SUPABASE_URL`/`SUPABASE_KEY`. Returns `None` when the sink is not
    /// required; a missing value is an error when it is.
    pub fn from_lookup<F>(lookup: F, required: bool) -> Result<Option<Self>, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if !required {
            return Ok(None);
        }

        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let url = get("SUPABASE_URL").ok_or(ConfigError::Missing("SUPABASE_URL"))?;
        let api_key = get("SUPABASE_KEY").ok_or(ConfigError::Missing("SUPABASE_KEY"))?;

        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(ConfigError::Invalid {
                key: "SUPABASE_URL",
                reason: format!("expected an http(s) URL, got {url}"),
            });
        }

        Ok(Some(Self {
            url: url.trim_end_matches('/').to_string(),
            api_key,
        }))
    }
}

#[derive(Debug, Clone)]
pub struct ReportConfig {
    pub servers: Vec<ServerConfig>,
    pub query_timeout: Duration,
    pub critical_max_days: i64,
    pub sink: Option<SinkConfig>,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            servers: Vec::new(),
            query_timeout: Duration::from_secs(30),
            critical_max_days: 15,
            sink: None,
        }
    }
}

impl ReportConfig {
    /// Loads servers and sink settings from the process environment.
    pub fn from_env(require_sink: bool) -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok(), require_sink)
    }

    /// Loads configuration through `lookup`, which maps a variable name to its value.
    ///
    /// Slots `PRTG_IP_1..=PRTG_IP_21` are scanned; gaps are allowed and the group label
    /// defaults to `Group {slot}`. Per-slot `PRTG_USER_{n}`/`PRTG_PASS_{n}`/`PRTG_GROUP_{n}`
    /// override the shared values.
    pub fn from_lookup<F>(lookup: F, require_sink: bool) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let shared_user = get("PRTG_USER");
        let shared_pass = get("PRTG_PASS");

        let mut servers = Vec::new();
        for slot in 1..=MAX_SERVER_SLOTS {
            let Some(address) = get(&format!("PRTG_IP_{slot}")) else {
                continue;
            };

            let username = get(&format!("PRTG_USER_{slot}")).or_else(|| shared_user.clone());
            let password = get(&format!("PRTG_PASS_{slot}")).or_else(|| shared_pass.clone());
            let (Some(username), Some(password)) = (username, password) else {
                return Err(ConfigError::MissingCredentials { address, slot });
            };

            let group = get(&format!("PRTG_GROUP_{slot}")).unwrap_or_else(|| format!("Group {slot}"));
            if group.contains([',', '\n', '\r']) {
                return Err(ConfigError::Invalid {
                    key: "PRTG_GROUP_n",
                    reason: format!("slot {slot}: group label must not contain commas or line breaks"),
                });
            }

            servers.push(ServerConfig {
                address,
                credentials: Credentials { username, password },
                group,
            });
        }

        if servers.is_empty() {
            return Err(ConfigError::NoServers);
        }

        let sink = SinkConfig::from_lookup(&lookup, require_sink)?;

        Ok(Self {
            servers,
            sink,
            ..Self::default()
        })
    }
}
