//! Pure formatting functions for UI output.
//!
//! `format_*` functions build the text; `display_*` functions print it.
//! Styling goes through `console`, which drops colors when the stream is not
//! a terminal.

use std::time::Duration;

use console::style;

use crate::boundary::BoundaryWarning;
use crate::pipeline::{StageReport, StageStatus};

/// Format and print an error message in red.
pub fn display_error(message: &str) {
    eprintln!("{} {}", style("ERROR:").red().bold(), message);
}

/// Format and print a success message with green checkmark.
pub fn display_success(message: &str) {
    println!("{} {}", style("✓").green(), message);
}

/// Format and print a status message with yellow arrow.
pub fn display_status(message: &str) {
    println!("{} {}", style("→").yellow(), message);
}

/// Display a boundary warning to the user.
pub fn display_boundary_warning(warning: &BoundaryWarning) {
    eprintln!("{} {}", style("⚠ WARNING:").yellow(), warning);
}

fn format_duration(duration: Duration) -> String {
    let millis = duration.as_millis();
    if millis < 1000 {
        format!("{}ms", millis)
    } else {
        format!("{:.1}s", duration.as_secs_f64())
    }
}

/// One summary line for a stage: marker, padded name, status and timing.
pub fn format_stage_line(report: &StageReport) -> String {
    let marker = match report.status {
        StageStatus::Succeeded => style("✓").green(),
        StageStatus::Failed => style("✗").red(),
        StageStatus::Skipped => style("-").dim(),
    };
    let mut line = format!("{} {:<10} {}", marker, report.name, report.status);
    if report.status != StageStatus::Skipped {
        line.push_str(&format!(" in {}", format_duration(report.duration)));
    }
    if let Some(error) = &report.error {
        let first = error.lines().next().unwrap_or_default();
        line.push_str(&format!(": {}", first));
    }
    line
}

/// Print the per-stage summary table.
pub fn display_stage_summary(stages: &[StageReport]) {
    println!("\n{}", style("Release pipeline").bold());
    for stage in stages {
        println!("  {}", format_stage_line(stage));
    }
}

/// Display the proposed tag change (or initial tag).
///
/// Shows either:
/// - If updating: "From: old_tag -> To: new_tag"
/// - If initial: "Initial Tag: new_tag"
pub fn display_proposed_tag(old_tag: Option<&str>, new_tag: &str) {
    match old_tag {
        Some(old) => {
            println!("\n{}", style("Proposed Tag Change:").bold());
            println!("  From: {}", style(old).red());
            println!("  To:   {}", style(new_tag).green());
        }
        None => {
            println!("\n{}", style("Initial Tag:").bold());
            println!("  New tag: {}", style(new_tag).green());
        }
    }
}

/// Print the stage graph, one stage per line with its dependencies.
pub fn display_stage_graph(graph: &[(String, Vec<String>)]) {
    println!("{}", style("Stages:").bold());
    for (name, needs) in graph {
        if needs.is_empty() {
            println!("  - {}", name);
        } else {
            println!("  - {} (needs: {})", name, needs.join(", "));
        }
    }
}
