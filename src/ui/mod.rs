//! User interface module - run summaries for the operator.
//!
//! - `formatter` - Pure formatting functions
//! - This module - composite views over a whole run

pub mod formatter;

pub use formatter::{
    display_boundary_warning, display_error, display_proposed_tag, display_stage_graph,
    display_stage_summary, display_status, display_success, format_stage_line,
};

use crate::pipeline::PipelineReport;
use crate::stages::{PUBLISH, VERSION};

/// Print the stage table, the proposed tag and every warning raised.
pub fn display_report(report: &PipelineReport) {
    display_stage_summary(&report.stages);

    if let Some(tag) = report.output(VERSION, "tag") {
        display_proposed_tag(report.output(VERSION, "previous_tag"), tag);
    }

    for warning in report.warnings() {
        display_boundary_warning(warning);
    }

    match report.output(PUBLISH, "released") {
        Some("true") => display_success(&format!(
            "Released {}",
            report.output(PUBLISH, "tag").unwrap_or_default()
        )),
        Some(_) if report.output(PUBLISH, "dry_run").is_some() => {
            display_status("Dry run: nothing was published")
        }
        Some(_) => display_status("No new commits since the last release; nothing published"),
        None => {}
    }

    for failure in report.failures() {
        display_error(failure.error.as_deref().unwrap_or("failed"));
    }
}
