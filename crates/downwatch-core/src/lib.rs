pub mod collector;
pub mod config;
pub mod downtime;
pub mod report;
pub mod sink;
pub mod source;

pub use collector::{Collector, ServerSensors};
pub use config::{ConfigError, Credentials, ReportConfig, ServerConfig, SinkConfig};
pub use downtime::{calculate_downtime, DowntimeResult, UNKNOWN_DOWNTIME_DAYS};
pub use report::{CriticalGroup, ReportEntry, ReportParseError, ReportStats};
pub use sink::{PostgrestSink, ReportSink, ReportTable, SinkError};
pub use source::{PrtgSource, SensorRecord, SensorSource, SourceError};
