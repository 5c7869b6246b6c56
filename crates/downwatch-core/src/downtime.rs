use std::sync::LazyLock;

use chrono::NaiveDateTime;
use regex::Regex;
use tracing::debug;

/// Day count reported when a last-up timestamp cannot be read.
pub const UNKNOWN_DOWNTIME_DAYS: i64 = 999;
pub const UNKNOWN_LABEL: &str = "Unknown";
pub const INVALID_LAST_UP: &str = "Invalid";

const LAST_UP_FORMAT: &str = "%m/%d/%Y %I:%M:%S %p";

static LAST_UP_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d{1,2}/\d{1,2}/\d{4} \d{1,2}:\d{2}:\d{2} [APM]+)")
        .expect("last-up pattern compiles")
});

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DowntimeResult {
    pub last_up: Option<NaiveDateTime>,
    pub label: String,
    pub days: i64,
}

impl DowntimeResult {
    pub fn unknown() -> Self {
        Self {
            last_up: None,
            label: UNKNOWN_LABEL.to_string(),
            days: UNKNOWN_DOWNTIME_DAYS,
        }
    }

    pub fn is_known(&self) -> bool {
        self.last_up.is_some()
    }

    /// Last-up instant as written to reports, `Invalid` when it was not parsed.
    pub fn formatted_last_up(&self) -> String {
        self.last_up
            .map(|ts| ts.format(LAST_UP_FORMAT).to_string())
            .unwrap_or_else(|| INVALID_LAST_UP.to_string())
    }
}

/// Extracts a `M/D/YYYY H:MM:SS AM|PM` timestamp from `raw` and measures how long ago it was.
///
/// Anything that does not yield a valid instant degrades to [`DowntimeResult::unknown`].
/// Instants after `now` count as zero downtime.
pub fn calculate_downtime(raw: &str, now: NaiveDateTime) -> DowntimeResult {
    let Some(found) = LAST_UP_PATTERN.find(raw) else {
        debug!(raw, "no last-up timestamp found");
        return DowntimeResult::unknown();
    };

    let last_up = match NaiveDateTime::parse_from_str(found.as_str(), LAST_UP_FORMAT) {
        Ok(ts) => ts,
        Err(err) => {
            debug!(raw, %err, "unparseable last-up timestamp");
            return DowntimeResult::unknown();
        }
    };

    let secs = (now - last_up).num_seconds().max(0);
    let days = secs / 86_400;
    let hours = (secs % 86_400) / 3_600;
    let minutes = (secs % 3_600) / 60;

    DowntimeResult {
        last_up: Some(last_up),
        label: format!("{days} d {hours} h {minutes} m"),
        days,
    }
}
