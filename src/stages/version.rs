use std::sync::Arc;

use async_trait::async_trait;
use git2::Oid;

use super::VERSION;
use crate::analyzer::{NextVersion, VersionAnalyzer};
use crate::boundary::BoundaryWarning;
use crate::config::Config;
use crate::error::{ReleaseError, Result};
use crate::git::{Git2Repository, Repository};
use crate::pipeline::{Stage, StageContext, StageOutput, StageResult};

/// Computes the next version from full history at the captured commit
#[derive(Debug, Clone, Copy, Default)]
pub struct VersionStage;

/// Deepen a shallow clone, then run the analyzer at `commit`.
pub fn compute<R: Repository>(repo: &R, config: &Config, commit: Oid) -> Result<NextVersion> {
    let mut warnings = Vec::new();
    if repo.is_shallow()? {
        tracing::info!(remote = %config.trunk.remote, "shallow clone, fetching full history");
        repo.unshallow(&config.trunk.remote)?;
        warnings.push(BoundaryWarning::ShallowHistory {
            remote: config.trunk.remote.clone(),
        });
    }

    let analyzer = VersionAnalyzer::new(config.commits.markers()?, &config.tag)?;
    let mut next = analyzer.next_version(repo, commit)?;
    warnings.append(&mut next.warnings);
    next.warnings = warnings;
    Ok(next)
}

/// Stage outputs consumed by publish
pub fn to_output(next: &NextVersion) -> StageOutput {
    let mut output = StageOutput::new()
        .with("version", &next.next)
        .with("tag", &next.tag)
        .with("bump", next.bump.as_deref().unwrap_or("initial"))
        .with("commit_count", next.commit_count);
    if let Some(previous) = &next.previous_tag {
        output = output.with("previous_tag", previous);
    }
    output.warnings = next.warnings.clone();
    output
}

#[async_trait]
impl Stage for VersionStage {
    fn name(&self) -> &str {
        VERSION
    }

    async fn run(&self, ctx: &StageContext) -> StageResult {
        let run = Arc::clone(&ctx.run);
        let next = tokio::task::spawn_blocking(move || {
            let repo = Git2Repository::open(&run.workspace)?;
            compute(&repo, &run.config, run.commit)
        })
        .await
        .map_err(|e| ReleaseError::stage(VERSION, format!("task aborted: {}", e)))??;

        tracing::info!(
            version = %next.next,
            tag = %next.tag,
            previous = next.previous_tag.as_deref().unwrap_or("none"),
            commits = next.commit_count,
            "computed next version"
        );
        Ok(to_output(&next))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::git::MockRepository;

    #[test]
    fn test_shallow_history_is_deepened() {
        let mut repo = MockRepository::new();
        let base = repo.commit("feat: first");
        repo.add_tag("v1.0.0", base);
        let head = repo.commit("fix: later");
        repo.set_shallow(true);

        let next = compute(&repo, &Config::default(), head).unwrap();

        assert!(!repo.is_shallow().unwrap());
        assert_eq!(next.next, "1.0.1");
        assert_eq!(
            next.warnings,
            vec![BoundaryWarning::ShallowHistory {
                remote: "origin".to_string()
            }]
        );
    }

    #[test]
    fn test_outputs_for_release() {
        let mut repo = MockRepository::new();
        let base = repo.commit("initial");
        repo.add_tag("v1.3.2", base);
        repo.commit("feat: search");
        let head = repo.commit("fix: typo");

        let output = to_output(&compute(&repo, &Config::default(), head).unwrap());

        assert_eq!(output.get("version"), Some("1.4.0"));
        assert_eq!(output.get("tag"), Some("v1.4.0"));
        assert_eq!(output.get("bump"), Some("minor"));
        assert_eq!(output.get("commit_count"), Some("2"));
        assert_eq!(output.get("previous_tag"), Some("v1.3.2"));
    }

    #[test]
    fn test_outputs_without_previous_tag() {
        let mut repo = MockRepository::new();
        repo.commit("initial");
        let head = repo.commit("feat!: everything");

        let output = to_output(&compute(&repo, &Config::default(), head).unwrap());

        assert_eq!(output.get("version"), Some("0.1.0"));
        assert_eq!(output.get("bump"), Some("initial"));
        assert_eq!(output.get("previous_tag"), None);
    }
}
