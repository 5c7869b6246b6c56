use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use downwatch_core::report;
use downwatch_core::{Collector, PostgrestSink, PrtgSource, ReportConfig, ReportSink, SinkConfig};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod exporter;
mod pipeline;
mod server;
#[cfg(test)]
mod server_tests;

use exporter::ReportFiles;
use pipeline::{Pipeline, RunReport};
use server::AppState;

#[derive(Debug, Parser)]
#[command(name = "downwatchd")]
#[command(about = "Downtime reports for sensors that PRTG servers list as down")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    #[arg(long, default_value = ".")]
    output_dir: String,

    /// Skip writing the text reports.
    #[arg(long)]
    no_export: bool,

    /// Skip the database sink; SUPABASE_URL/SUPABASE_KEY are then not required.
    #[arg(long)]
    no_sink: bool,

    #[arg(long, default_value_t = 30, value_parser = clap::value_parser!(u64).range(1..))]
    query_timeout_secs: u64,

    #[arg(long, default_value_t = 15, value_parser = clap::value_parser!(i64).range(0..))]
    critical_max_days: i64,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Serve the HTTP trigger.
    Serve {
        #[arg(long, default_value = "0.0.0.0:5000")]
        bind: String,
    },
    /// Run the report pipeline once and print a summary.
    Run {
        #[arg(long, value_enum, default_value = "human")]
        format: OutputFormat,
    },
    /// Rebuild the critical report from a stored full report.
    Critical {
        #[arg(long)]
        from: PathBuf,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormat {
    Human,
    Json,
}

#[tokio::main]
async fn main() -> Result<()> {
    let dotenv = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();

    if let Err(err) = dotenv {
        if !err.not_found() {
            warn!(error=%err, "ignoring unreadable .env file");
        }
    }

    let cli = Cli::parse();
    let query_timeout = Duration::from_secs(cli.query_timeout_secs);
    let files = (!cli.no_export).then(|| ReportFiles::new(&cli.output_dir));

    match cli.command {
        Command::Serve { ref bind } => {
            let pipeline = build_pipeline(&cli, query_timeout, files)?;
            info!(servers = pipeline.server_count(), sink = pipeline.sink().is_some(), "configured");

            let router = server::build_router(AppState::new(pipeline));
            let listener = tokio::net::TcpListener::bind(bind)
                .await
                .with_context(|| format!("binding {bind}"))?;
            info!(%bind, "listening");

            axum::serve(listener, router)
                .with_graceful_shutdown(async {
                    let _ = tokio::signal::ctrl_c().await;
                    warn!("received ctrl-c, stopping");
                })
                .await?;
        }
        Command::Run { format } => {
            let pipeline = build_pipeline(&cli, query_timeout, files)?;
            let report = pipeline.run().await?;
            print_run(&report, format)?;
        }
        Command::Critical { ref from } => {
            let sink = open_sink(SinkConfig::from_env(!cli.no_sink)?, query_timeout)?;
            let full = exporter::read_full_report(from)?;
            let groups =
                pipeline::critical_from_full(&full, cli.critical_max_days, files.as_ref(), sink.as_deref())
                    .await?;
            print!("{}", report::render_critical(&groups));
        }
    }

    Ok(())
}

fn build_pipeline(cli: &Cli, query_timeout: Duration, files: Option<ReportFiles>) -> Result<Pipeline<PrtgSource>> {
    let config = ReportConfig {
        query_timeout,
        critical_max_days: cli.critical_max_days,
        ..ReportConfig::from_env(!cli.no_sink)?
    };

    let source = PrtgSource::new(config.query_timeout)?;
    let sink = open_sink(config.sink.clone(), config.query_timeout)?;
    let collector = Collector::new(source, config.servers, config.query_timeout);

    Ok(Pipeline::new(collector, sink, files, config.critical_max_days))
}

fn open_sink(config: Option<SinkConfig>, timeout: Duration) -> Result<Option<Arc<dyn ReportSink>>> {
    let Some(config) = config else {
        return Ok(None);
    };
    let sink = PostgrestSink::new(&config, timeout)?;
    Ok(Some(Arc::new(sink)))
}

fn print_run(report: &RunReport, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(report)?);
        }
        OutputFormat::Human => {
            println!("=== Downtime Report ===");
            println!("Finished:   {}", report.finished_at.to_rfc3339());
            println!("Devices:    {}", report.stats.total_devices);
            println!("Critical:   {}", report.stats.critical_devices);
            println!("Unresolved: {}", report.stats.unresolved_devices);
            println!("Avg days:   {:.1}", report.stats.average_downtime_days);
            if !report.failed_servers.is_empty() {
                println!("Failed:     {}", report.failed_servers.join(", "));
            }
            print!("{}", report::render_critical(&report.critical));
        }
    }

    Ok(())
}
