//! The four release stages and the default graph wiring them together.
//!
//! ```text
//! test ─────┐
//! coverage ─┼─> publish
//! version ──┘
//! ```

pub mod coverage;
pub mod publish;
pub mod version;

pub use coverage::{CoverageStage, CoverageUploader, HttpUploader};
pub use publish::PublishStage;
pub use test::TestStage;
pub use version::VersionStage;

use crate::error::{ReleaseError, Result};
use crate::pipeline::{run_command, CommandOutput, CommandSpec, Pipeline};

pub const TEST: &str = "test";
pub const COVERAGE: &str = "coverage";
pub const VERSION: &str = "version";
pub const PUBLISH: &str = "publish";

/// Lines of tool output kept in a failure message
const FAILURE_TAIL_LINES: usize = 20;

/// The stock release graph: three independent gates, then publish.
pub fn default_pipeline() -> Result<Pipeline> {
    Ok(Pipeline::new()
        .with_stage(TestStage)
        .with_stage(CoverageStage::new(HttpUploader::new()?))
        .with_stage(VersionStage)
        .with_stage(PublishStage))
}

/// Run `spec` and turn spawn errors, timeouts and non-zero exits into a
/// failure attributed to `stage`.
pub(crate) async fn run_checked(stage: &str, spec: &CommandSpec) -> Result<CommandOutput> {
    let output = run_command(spec)
        .await
        .map_err(|e| ReleaseError::stage(stage, e.to_string()))?;
    check_exit(stage, spec, output)
}

/// A non-zero exit becomes a failure of `stage` carrying the output tail.
pub(crate) fn check_exit(
    stage: &str,
    spec: &CommandSpec,
    output: CommandOutput,
) -> Result<CommandOutput> {
    if !output.success() {
        return Err(ReleaseError::stage(
            stage,
            format!(
                "`{}` exited with code {}\n{}",
                spec.display(),
                output.exit_code,
                output.tail(FAILURE_TAIL_LINES)
            ),
        ));
    }

    Ok(output)
}
