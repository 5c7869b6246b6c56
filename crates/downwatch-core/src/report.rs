use std::fmt::Write as _;
use std::sync::LazyLock;

use chrono::NaiveDateTime;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::collector::ServerSensors;
use crate::downtime::{calculate_downtime, INVALID_LAST_UP, UNKNOWN_DOWNTIME_DAYS, UNKNOWN_LABEL};

pub const FULL_REPORT_HEADER: &str = "Group,Device,LastUp,Downtime";

static DAYS_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+)\s*d").expect("days pattern compiles"));

/// One device row, shared by both reports and the persistence sink.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportEntry {
    #[serde(rename = "group_name")]
    pub group: String,
    pub device: String,
    pub last_up: String,
    pub downtime: String,
    pub downtime_days: i64,
}

impl ReportEntry {
    /// True when the downtime label carries no usable duration.
    pub fn is_unresolved(&self) -> bool {
        self.downtime.contains(INVALID_LAST_UP) || self.downtime.contains(UNKNOWN_LABEL)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CriticalGroup {
    pub group: String,
    pub entries: Vec<ReportEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportStats {
    pub total_devices: usize,
    pub critical_devices: usize,
    pub unresolved_devices: usize,
    pub average_downtime_days: f64,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ReportParseError {
    #[error("missing header line")]
    MissingHeader,
    #[error("unexpected header {0:?}")]
    BadHeader(String),
    #[error("line {line}: expected at least 4 columns")]
    ShortRow { line: usize },
}

/// Builds the full report: servers in collection order, sensors in source order.
pub fn build_full_report(collected: &[ServerSensors], now: NaiveDateTime) -> Vec<ReportEntry> {
    collected
        .iter()
        .flat_map(|server| {
            server.sensors.iter().map(move |sensor| {
                let downtime = calculate_downtime(&sensor.last_up, now);
                ReportEntry {
                    group: server.group.clone(),
                    device: sensor.device.clone(),
                    last_up: downtime.formatted_last_up(),
                    downtime: downtime.label,
                    downtime_days: downtime.days,
                }
            })
        })
        .collect()
}

/// Keeps resolved entries down for at most `max_days`, grouped by first appearance.
pub fn critical_groups(entries: &[ReportEntry], max_days: i64) -> Vec<CriticalGroup> {
    let mut groups: Vec<CriticalGroup> = Vec::new();

    for entry in entries {
        if entry.is_unresolved() || entry.downtime_days > max_days {
            continue;
        }
        match groups.iter_mut().find(|g| g.group == entry.group) {
            Some(group) => group.entries.push(entry.clone()),
            None => groups.push(CriticalGroup {
                group: entry.group.clone(),
                entries: vec![entry.clone()],
            }),
        }
    }

    groups
}

pub fn flatten(groups: &[CriticalGroup]) -> Vec<ReportEntry> {
    groups.iter().flat_map(|g| g.entries.iter().cloned()).collect()
}

pub fn stats(full: &[ReportEntry], critical: &[CriticalGroup]) -> ReportStats {
    let resolved: Vec<i64> = full
        .iter()
        .filter(|e| !e.is_unresolved())
        .map(|e| e.downtime_days)
        .collect();
    let average = if resolved.is_empty() {
        0.0
    } else {
        let mean = resolved.iter().sum::<i64>() as f64 / resolved.len() as f64;
        (mean * 10.0).round() / 10.0
    };

    ReportStats {
        total_devices: full.len(),
        critical_devices: critical.iter().map(|g| g.entries.len()).sum(),
        unresolved_devices: full.len() - resolved.len(),
        average_downtime_days: average,
    }
}

/// Renders one line per entry. Line breaks inside a field become spaces, and a comma in
/// the group becomes `;` since the group is read back as the first column.
pub fn render_full(entries: &[ReportEntry]) -> String {
    let mut out = String::from(FULL_REPORT_HEADER);
    out.push('\n');
    for e in entries {
        let group = single_line(&e.group).replace(',', ";");
        let _ = writeln!(
            out,
            "{},{},{},{}",
            group,
            single_line(&e.device),
            single_line(&e.last_up),
            single_line(&e.downtime)
        );
    }
    out
}

fn single_line(field: &str) -> String {
    field.replace(['\r', '\n'], " ")
}

pub fn render_critical(groups: &[CriticalGroup]) -> String {
    let mut out = String::new();
    for group in groups {
        let _ = writeln!(out, "\n{}:", group.group);
        let _ = writeln!(out, "{}", "-".repeat(group.group.chars().count() + 1));
        for (idx, e) in group.entries.iter().enumerate() {
            let _ = writeln!(out, "{}. {} = {} ago", idx + 1, e.device, e.downtime);
        }
    }
    out
}

/// Reads back a rendered full report.
///
/// The first column is the group and the last two are LastUp and Downtime; anything in
/// between is the device name, which may itself contain commas. Day counts come from the
/// leading `N d` of the downtime column; rows without one get the unknown sentinel.
pub fn parse_full(text: &str) -> Result<Vec<ReportEntry>, ReportParseError> {
    let mut lines = text.lines().enumerate();

    let header = loop {
        match lines.next() {
            Some((_, line)) if line.trim().is_empty() => continue,
            Some((_, line)) => break line.trim(),
            None => return Err(ReportParseError::MissingHeader),
        }
    };
    if header != FULL_REPORT_HEADER {
        return Err(ReportParseError::BadHeader(header.to_string()));
    }

    let mut entries = Vec::new();
    for (idx, line) in lines {
        if line.trim().is_empty() {
            continue;
        }
        let short = || ReportParseError::ShortRow { line: idx + 1 };

        let (group, rest) = line.split_once(',').ok_or_else(short)?;
        let mut tail = rest.rsplitn(3, ',');
        let downtime = tail.next().ok_or_else(short)?;
        let last_up = tail.next().ok_or_else(short)?;
        let device = tail.next().ok_or_else(short)?;

        entries.push(ReportEntry {
            group: group.to_string(),
            device: device.to_string(),
            last_up: last_up.to_string(),
            downtime: downtime.to_string(),
            downtime_days: downtime_days_from_label(downtime),
        });
    }

    Ok(entries)
}

pub fn downtime_days_from_label(label: &str) -> i64 {
    DAYS_PATTERN
        .captures(label)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
        .unwrap_or(UNKNOWN_DOWNTIME_DAYS)
}
