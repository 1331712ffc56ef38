//! Stamp, publish, tag, push.
//!
//! The only stage with irreversible effects. Once the registry has accepted
//! the package nothing is rolled back: a later tag failure is reported as a
//! [`BoundaryWarning::PartialRelease`] alongside the stage failure.

use std::sync::Arc;

use async_trait::async_trait;
use git2::Oid;

use super::{run_checked, COVERAGE, PUBLISH, TEST, VERSION};
use crate::boundary::BoundaryWarning;
use crate::domain::{Secret, Version};
use crate::error::{ReleaseError, Result};
use crate::git::{Git2Repository, PushCredentials, Repository};
use crate::manifest::Manifest;
use crate::pipeline::{CommandSpec, Stage, StageContext, StageFailure, StageOutput, StageResult};

const STEP_PUBLISH: &str = "registry publish";
const STEP_TAG: &str = "tag creation";
const STEP_PUSH: &str = "tag push";

/// Publishes the package and tags the built commit
#[derive(Debug, Clone, Copy, Default)]
pub struct PublishStage;

/// Fail if `tag` already names a commit.
pub fn ensure_tag_free<R: Repository>(repo: &R, tag: &str) -> Result<()> {
    let taken = repo
        .tags_by_commit(tag)?
        .values()
        .flatten()
        .any(|name| name == tag);
    if taken {
        return Err(ReleaseError::tag(format!("Tag '{}' already exists", tag)));
    }
    Ok(())
}

/// Create the annotated tag at `commit` and push it.
///
/// Called after the registry publish, so every failure carries a
/// `PartialRelease` warning describing what already happened.
pub fn tag_release<R: Repository>(
    repo: &R,
    remote: &str,
    tag: &str,
    commit: Oid,
    message: &str,
    credentials: Option<&PushCredentials>,
) -> std::result::Result<(), StageFailure> {
    let partial = |completed: &[&str], failed_step: &str, error: ReleaseError| {
        StageFailure::from(error).with_warning(BoundaryWarning::PartialRelease {
            tag: tag.to_string(),
            completed: completed.iter().map(|s| s.to_string()).collect(),
            failed_step: failed_step.to_string(),
        })
    };

    repo.create_annotated_tag(tag, commit, message)
        .map_err(|e| partial(&[STEP_PUBLISH], STEP_TAG, e))?;
    tracing::info!(tag, commit = %commit, "created tag");

    repo.push_tag(remote, tag, credentials)
        .map_err(|e| partial(&[STEP_PUBLISH, STEP_TAG], STEP_PUSH, e))?;
    tracing::info!(tag, remote, "pushed tag");

    Ok(())
}

#[async_trait]
impl Stage for PublishStage {
    fn name(&self) -> &str {
        PUBLISH
    }

    fn needs(&self) -> Vec<String> {
        vec![TEST.to_string(), COVERAGE.to_string(), VERSION.to_string()]
    }

    async fn run(&self, ctx: &StageContext) -> StageResult {
        let version = Version::parse(ctx.require(VERSION, "version")?)?;
        let tag = ctx.require(VERSION, "tag")?.to_string();
        let commit_count: usize = ctx
            .require(VERSION, "commit_count")?
            .parse()
            .map_err(|e| ReleaseError::stage(VERSION, format!("invalid commit_count: {}", e)))?;
        let previous_tag = ctx.input(VERSION, "previous_tag");

        let output = StageOutput::new()
            .with("version", version)
            .with("tag", &tag);

        if let (0, Some(previous)) = (commit_count, previous_tag) {
            tracing::info!(previous, "nothing new since last release, not publishing");
            return Ok(output.with("released", false));
        }

        let run = Arc::clone(&ctx.run);
        let config = &run.config;

        {
            let run = Arc::clone(&run);
            let tag = tag.clone();
            tokio::task::spawn_blocking(move || {
                let repo = Git2Repository::open(&run.workspace)?;
                ensure_tag_free(&repo, &tag)
            })
            .await
            .map_err(|e| ReleaseError::stage(PUBLISH, format!("task aborted: {}", e)))??;
        }

        let mut manifest = Manifest::load(run.workspace.join(&config.publish.manifest))?;
        let replaced = manifest.stamp(&config.publish.placeholder, &version)?;
        tracing::debug!(path = %manifest.path().display(), replaced, "stamped manifest");

        let mut spec = CommandSpec::from_argv(&config.publish.command)?.cwd(&run.workspace);

        if run.dry_run {
            tracing::info!(
                manifest = %manifest.path().display(),
                command = %spec.display(),
                tag = %tag,
                remote = %config.trunk.remote,
                "dry run, skipping stamp, publish, tag and push"
            );
            return Ok(output.with("released", false).with("dry_run", true));
        }

        manifest.write()?;

        match Secret::from_env(&config.publish.token_env) {
            Some(token) => spec = spec.secret(config.publish.token_env.clone(), token),
            None => tracing::warn!(
                var = %config.publish.token_env,
                "registry token not set, relying on ambient credentials"
            ),
        }
        tracing::info!(command = %spec.display(), version = %version, "publishing");
        run_checked(PUBLISH, &spec).await?;

        let credentials = Secret::from_env(&config.publish.push_token_env).map(|token| {
            PushCredentials {
                username: config.publish.push_username.clone(),
                token,
            }
        });
        let message = config.tag.annotation(&tag, &version);

        let tag_run = Arc::clone(&run);
        let tag_name = tag.clone();
        tokio::task::spawn_blocking(move || {
            let repo = Git2Repository::open(&tag_run.workspace).map_err(|e| {
                StageFailure::from(e).with_warning(BoundaryWarning::PartialRelease {
                    tag: tag_name.clone(),
                    completed: vec![STEP_PUBLISH.to_string()],
                    failed_step: STEP_TAG.to_string(),
                })
            })?;
            tag_release(
                &repo,
                &tag_run.config.trunk.remote,
                &tag_name,
                tag_run.commit,
                &message,
                credentials.as_ref(),
            )
        })
        .await
        .map_err(|e| {
            StageFailure::from(ReleaseError::stage(PUBLISH, format!("task aborted: {}", e)))
                .with_warning(BoundaryWarning::PartialRelease {
                    tag: tag.clone(),
                    completed: vec![STEP_PUBLISH.to_string()],
                    failed_step: STEP_TAG.to_string(),
                })
        })??;

        Ok(output.with("released", true))
    }
}
