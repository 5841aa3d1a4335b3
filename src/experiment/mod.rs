//! Experiment driver: replicas, aggregation, sweeps and reports.

pub mod report;
pub mod runner;
pub mod summary;

pub use report::{generate_json_report, generate_text_report, print_summary, ExperimentReport, ReportMetadata};
pub use runner::{build_replica, run_replicas, sweep, ReplicaBatch};
pub use summary::{summarize, ClassificationResult, ExperimentSummary, MeanStd};
