use std::fmt;

/// Non-fatal conditions met while computing or publishing a release.
/// These are reported to the operator but do not fail the run on their own.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BoundaryWarning {
    /// No new commits since the latest tag
    NoNewCommits {
        latest_tag: String,
        current_commit_hash: String,
    },
    /// Tag shares the release prefix but cannot be parsed as a release version
    UnparsableTag { tag: String, reason: String },
    /// History was shallow and had to be fetched in full
    ShallowHistory { remote: String },
    /// Coverage ran but its report was not uploaded
    CoverageUploadSkipped { reason: String },
    /// Publish stopped after some irreversible step already happened
    PartialRelease {
        tag: String,
        completed: Vec<String>,
        failed_step: String,
    },
}

impl fmt::Display for BoundaryWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BoundaryWarning::NoNewCommits {
                latest_tag,
                current_commit_hash,
            } => {
                let short_hash = if current_commit_hash.len() > 7 {
                    &current_commit_hash[..7]
                } else {
                    current_commit_hash.as_str()
                };
                write!(
                    f,
                    "No new commits since tag '{}' (current: {})",
                    latest_tag, short_hash
                )
            }
            BoundaryWarning::UnparsableTag { tag, reason } => {
                write!(f, "Cannot parse tag '{}': {}", tag, reason)
            }
            BoundaryWarning::ShallowHistory { remote } => {
                write!(
                    f,
                    "Repository was a shallow clone; fetched full history from '{}'",
                    remote
                )
            }
            BoundaryWarning::CoverageUploadSkipped { reason } => {
                write!(f, "Coverage report not uploaded: {}", reason)
            }
            BoundaryWarning::PartialRelease {
                tag,
                completed,
                failed_step,
            } => {
                write!(
                    f,
                    "Release {} is incomplete: {} succeeded but {} failed; reconcile manually",
                    tag,
                    completed.join(", "),
                    failed_step
                )
            }
        }
    }
}
