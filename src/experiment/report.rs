//! Report generation for experiment results.
//!
//! Generates both JSON and human-readable text reports.

use std::fs;
use std::path::Path;

use chrono::Utc;
use color_eyre::eyre::{Context, Result};
use serde::Serialize;

use super::summary::{ExperimentSummary, MeanStd};
use crate::config::{AdversaryConfig, ExperimentConfig};
use crate::sim::ReplicaOutcome;

/// Everything written for one `run` or `sweep`
#[derive(Debug, Clone, Serialize)]
pub struct ExperimentReport {
    pub metadata: ReportMetadata,
    pub config: ExperimentConfig,
    pub summaries: Vec<ExperimentSummary>,
    /// Per-replica outcomes; only kept for a single run
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub replicas: Vec<ReplicaOutcome>,
}

/// Report metadata
#[derive(Debug, Clone, Serialize)]
pub struct ReportMetadata {
    pub generated_at: String,
    pub config_path: String,
    pub scenario: String,
    pub adversary: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strategy: Option<String>,
    pub base_seed: u64,
    pub replicas: usize,
}

impl ReportMetadata {
    pub fn new(config: &ExperimentConfig, config_path: &Path) -> Self {
        let strategy = match &config.adversary {
            AdversaryConfig::Disclosure { strategy, .. } => Some(strategy.name().to_string()),
            AdversaryConfig::Intersection { .. } => None,
        };
        Self {
            generated_at: Utc::now().to_rfc3339(),
            config_path: config_path.display().to_string(),
            scenario: config.scenario.name().to_string(),
            adversary: config.adversary.name().to_string(),
            strategy,
            base_seed: config.general.seed,
            replicas: config.general.replicas,
        }
    }
}

/// Generate JSON report
pub fn generate_json_report(report: &ExperimentReport, output_path: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(report).context("Failed to serialize report to JSON")?;

    fs::write(output_path, json)
        .with_context(|| format!("Failed to write JSON report to {}", output_path.display()))?;

    log::info!("JSON report written to {}", output_path.display());
    Ok(())
}

fn mean_std(value: Option<MeanStd>) -> String {
    match value {
        Some(m) => format!("{:.3} (std {:.3})", m.mean, m.std_dev),
        None => "n/a".to_string(),
    }
}

fn summary_lines(summary: &ExperimentSummary, lines: &mut Vec<String>) {
    lines.push(format!(
        "Servers: {} ({} target{})",
        summary.num_servers,
        summary.num_target_servers,
        if summary.num_target_servers == 1 { "" } else { "s" }
    ));
    lines.push(format!(
        "Replicas: {} completed, {} unfinished, {} failed (of {})",
        summary.completed, summary.unfinished, summary.failed, summary.replicas
    ));
    lines.push(String::new());

    lines.push("Time to Deanonymize:".to_string());
    lines.push(format!("  {}", mean_std(summary.time_to_deanonymize)));
    lines.push("Rounds Collected:".to_string());
    lines.push(format!("  {}", mean_std(summary.num_rounds)));
    lines.push(String::new());

    lines.push(format!(
        "Target Set Accuracy: {:.1}%",
        summary.target_server_set_accuracy * 100.0
    ));
    lines.push(format!(
        "  P(target identified as non-target): {}",
        mean_std(summary.prob_target_identified_as_non_target)
    ));
    lines.push(format!(
        "  P(non-target identified as target): {}",
        mean_std(summary.prob_non_target_identified_as_target)
    ));
    lines.push(String::new());

    if !summary.signal_strength_for_target_servers.is_empty() {
        lines.push("Signal Strength:".to_string());
        lines.push(format!(
            "  Target servers:     {}",
            mean_std(MeanStd::of(&summary.signal_strength_for_target_servers))
        ));
        lines.push(format!(
            "  Non-target servers: {}",
            mean_std(MeanStd::of(&summary.signal_strength_for_non_target_servers))
        ));
        lines.push(String::new());
    }
}

/// Generate human-readable text report
pub fn generate_text_report(report: &ExperimentReport, output_path: &Path) -> Result<()> {
    let mut lines: Vec<String> = Vec::new();

    // Header
    lines.push("=".repeat(80));
    lines.push("                      DISCLOSURE ATTACK SIMULATION REPORT".to_string());
    lines.push("=".repeat(80));
    lines.push(String::new());

    // Metadata
    lines.push(format!("Generated: {}", report.metadata.generated_at));
    lines.push(format!("Configuration: {}", report.metadata.config_path));
    lines.push(format!("Scenario: {}", report.metadata.scenario));
    match &report.metadata.strategy {
        Some(strategy) => lines.push(format!("Adversary: {} ({})", report.metadata.adversary, strategy)),
        None => lines.push(format!("Adversary: {}", report.metadata.adversary)),
    }
    lines.push(format!(
        "Replicas: {} (base seed {})",
        report.metadata.replicas, report.metadata.base_seed
    ));
    lines.push(String::new());

    for summary in &report.summaries {
        lines.push("=".repeat(80));
        lines.push(format!("                          NUM_SERVERS = {}", summary.num_servers));
        lines.push("=".repeat(80));
        lines.push(String::new());
        summary_lines(summary, &mut lines);
    }

    if report.summaries.len() > 1 {
        lines.push("=".repeat(80));
        lines.push("                               SWEEP".to_string());
        lines.push("=".repeat(80));
        lines.push(String::new());
        lines.push(format!(
            "{:>12} {:>14} {:>10} {:>10}",
            "num_servers", "E[time]", "E[rounds]", "accuracy"
        ));
        for summary in &report.summaries {
            lines.push(format!(
                "{:>12} {:>14.3} {:>10.1} {:>9.1}%",
                summary.num_servers,
                summary.time_to_deanonymize.map_or(f64::NAN, |m| m.mean),
                summary.num_rounds.map_or(f64::NAN, |m| m.mean),
                summary.target_server_set_accuracy * 100.0
            ));
        }
        lines.push(String::new());
    }

    // Footer
    lines.push("=".repeat(80));

    let content = lines.join("\n");
    fs::write(output_path, content)
        .with_context(|| format!("Failed to write text report to {}", output_path.display()))?;

    log::info!("Text report written to {}", output_path.display());
    Ok(())
}

/// Print a summary to stdout
pub fn print_summary(report: &ExperimentReport) {
    println!("\n=== DISCLOSURE ATTACK SUMMARY ===\n");
    println!("Scenario: {}", report.metadata.scenario);
    println!("Adversary: {}", report.metadata.adversary);
    if let Some(ref strategy) = report.metadata.strategy {
        println!("Strategy: {}", strategy);
    }

    for summary in &report.summaries {
        println!("\nServers: {}", summary.num_servers);
        println!(
            "  Completed: {}/{} ({} failed)",
            summary.completed, summary.replicas, summary.failed
        );
        println!("  Time to deanonymize: {}", mean_std(summary.time_to_deanonymize));
        println!("  Rounds: {}", mean_std(summary.num_rounds));
        println!("  Accuracy: {:.1}%", summary.target_server_set_accuracy * 100.0);
    }

    println!();
}
