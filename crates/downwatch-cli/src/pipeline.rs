use std::sync::Arc;

use chrono::{DateTime, Local, NaiveDateTime, Utc};
use downwatch_core::report::{self, CriticalGroup, ReportEntry, ReportStats};
use downwatch_core::{Collector, ReportSink, ReportTable, SensorSource, SinkError};
use serde::Serialize;
use thiserror::Error;
use tracing::{error, info};

use crate::exporter::ReportFiles;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Sink(#[from] SinkError),
    #[error("report export failed: {0:#}")]
    Export(anyhow::Error),
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub full: Vec<ReportEntry>,
    pub critical: Vec<CriticalGroup>,
    pub stats: ReportStats,
    pub failed_servers: Vec<String>,
    pub finished_at: DateTime<Utc>,
}

pub struct Pipeline<S: SensorSource> {
    collector: Collector<S>,
    sink: Option<Arc<dyn ReportSink>>,
    files: Option<ReportFiles>,
    critical_max_days: i64,
}

impl<S: SensorSource> Pipeline<S> {
    pub fn new(
        collector: Collector<S>,
        sink: Option<Arc<dyn ReportSink>>,
        files: Option<ReportFiles>,
        critical_max_days: i64,
    ) -> Self {
        Self {
            collector,
            sink,
            files,
            critical_max_days,
        }
    }

    pub fn server_count(&self) -> usize {
        self.collector.servers().len()
    }

    pub fn sink(&self) -> Option<&Arc<dyn ReportSink>> {
        self.sink.as_ref()
    }

    /// Runs against the host's local wall clock, the zone PRTG reports last-up times in.
    pub async fn run(&self) -> Result<RunReport, PipelineError> {
        self.run_at(Local::now().naive_local()).await
    }

    pub async fn run_at(&self, now: NaiveDateTime) -> Result<RunReport, PipelineError> {
        info!("starting report run");
        let collected = self.collector.collect().await;
        let failed_servers = collected
            .iter()
            .filter(|s| s.error.is_some())
            .map(|s| s.address.clone())
            .collect::<Vec<_>>();

        let full = report::build_full_report(&collected, now);
        if let Some(files) = &self.files {
            let path = files.write_full(&full).map_err(PipelineError::Export)?;
            info!(path=%path.display(), rows=full.len(), "full report written");
        }
        self.persist(ReportTable::Full, &full).await?;

        let critical = report::critical_groups(&full, self.critical_max_days);
        if let Some(files) = &self.files {
            let path = files.write_critical(&critical).map_err(PipelineError::Export)?;
            info!(path=%path.display(), groups=critical.len(), "critical report written");
        }
        self.persist(ReportTable::Critical, &report::flatten(&critical)).await?;

        let stats = report::stats(&full, &critical);
        info!(
            full = stats.total_devices,
            critical = stats.critical_devices,
            failed_servers = failed_servers.len(),
            "report run finished"
        );

        Ok(RunReport {
            full,
            critical,
            stats,
            failed_servers,
            finished_at: Utc::now(),
        })
    }

    async fn persist(&self, table: ReportTable, rows: &[ReportEntry]) -> Result<(), PipelineError> {
        persist_rows(self.sink.as_deref(), table, rows).await
    }
}

/// Re-derives the critical report from a stored full report, without polling.
pub async fn critical_from_full(
    full: &[ReportEntry],
    critical_max_days: i64,
    files: Option<&ReportFiles>,
    sink: Option<&dyn ReportSink>,
) -> Result<Vec<CriticalGroup>, PipelineError> {
    let critical = report::critical_groups(full, critical_max_days);
    if let Some(files) = files {
        files.write_critical(&critical).map_err(PipelineError::Export)?;
    }
    persist_rows(sink, ReportTable::Critical, &report::flatten(&critical)).await?;
    Ok(critical)
}

async fn persist_rows(
    sink: Option<&dyn ReportSink>,
    table: ReportTable,
    rows: &[ReportEntry],
) -> Result<(), PipelineError> {
    let Some(sink) = sink else {
        return Ok(());
    };
    sink.insert(table, rows).await.map_err(|err| {
        error!(%table, error=%err, "persisting report rows failed");
        PipelineError::from(err)
    })
}
