//! Containerized coverage measurement and report upload.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use git2::Oid;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use reqwest::Url;

use super::{check_exit, COVERAGE};
use crate::boundary::BoundaryWarning;
use crate::config::CoverageConfig;
use crate::domain::Secret;
use crate::error::{ReleaseError, Result};
use crate::pipeline::{run_command, CommandSpec, Stage, StageContext, StageOutput, StageResult};

/// Mount point of the workspace inside the coverage container
const CONTAINER_VOLUME: &str = "/volume";

/// Mount point of the scratch directory receiving the report and build output
const CONTAINER_OUTPUT: &str = "/coverage";

const UPLOAD_TIMEOUT: Duration = Duration::from_secs(120);

const KILL_TIMEOUT_SECS: u64 = 30;

/// Sends a coverage report to an aggregation service
#[async_trait]
pub trait CoverageUploader: Send + Sync {
    async fn upload(&self, url: &str, token: &Secret, commit: Oid, report: Vec<u8>) -> Result<()>;
}

/// Uploads over HTTP; any transport error or non-2xx status is an error
#[derive(Debug, Clone)]
pub struct HttpUploader {
    client: reqwest::Client,
}

impl HttpUploader {
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("release-gate/", env!("CARGO_PKG_VERSION")))
            .timeout(UPLOAD_TIMEOUT)
            .build()?;
        Ok(HttpUploader { client })
    }
}

#[async_trait]
impl CoverageUploader for HttpUploader {
    async fn upload(&self, url: &str, token: &Secret, commit: Oid, report: Vec<u8>) -> Result<()> {
        let mut url = Url::parse(url)
            .map_err(|e| ReleaseError::upload(format!("invalid upload url '{}': {}", url, e)))?;
        url.query_pairs_mut().append_pair("commit", &commit.to_string());

        let response = self
            .client
            .post(url)
            .header(AUTHORIZATION, format!("token {}", token.expose()))
            .header(CONTENT_TYPE, "application/xml")
            .body(report)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ReleaseError::upload(format!(
                "service responded {}: {}",
                status,
                body.trim()
            )));
        }
        Ok(())
    }
}

/// Runs the coverage tool in a throwaway container, then uploads its report
#[derive(Clone)]
pub struct CoverageStage {
    uploader: Arc<dyn CoverageUploader>,
}

impl CoverageStage {
    pub fn new(uploader: impl CoverageUploader + 'static) -> Self {
        CoverageStage {
            uploader: Arc::new(uploader),
        }
    }

    /// Container name for a run at `commit`, unique per process
    pub fn container_name(commit: Oid) -> String {
        let commit = commit.to_string();
        format!("release-gate-cov-{}-{}", &commit[..12], std::process::id())
    }

    /// `<engine> run --rm --name <name> ... <image> <command...>`.
    ///
    /// `workspace` is mounted at `/volume` and `output` at `/coverage`. The
    /// report and the cargo target directory both go under `output`.
    pub fn container_command(
        config: &CoverageConfig,
        workspace: &Path,
        output: &Path,
        name: &str,
    ) -> Vec<String> {
        let mut argv = vec![
            config.engine.clone(),
            "run".to_string(),
            "--rm".to_string(),
            "--name".to_string(),
            name.to_string(),
            "--security-opt".to_string(),
            "seccomp=unconfined".to_string(),
            "-v".to_string(),
            format!("{}:{}", workspace.display(), CONTAINER_VOLUME),
            "-v".to_string(),
            format!("{}:{}", output.display(), CONTAINER_OUTPUT),
            "-e".to_string(),
            format!("CARGO_TARGET_DIR={}/target", CONTAINER_OUTPUT),
            "-w".to_string(),
            CONTAINER_VOLUME.to_string(),
            config.image.clone(),
        ];
        argv.extend(config.command.iter().cloned());
        argv
    }

    /// Kill a container left running after its client was stopped.
    async fn kill_container(engine: &str, name: &str) {
        let argv = vec![engine.to_string(), "kill".to_string(), name.to_string()];
        let result = match CommandSpec::from_argv(&argv) {
            Ok(spec) => run_command(&spec.timeout_secs(KILL_TIMEOUT_SECS)).await,
            Err(e) => Err(e),
        };
        match result {
            Ok(output) if output.success() => tracing::info!(container = name, "killed container"),
            Ok(output) => {
                tracing::warn!(container = name, stderr = %output.tail(5), "container kill failed")
            }
            Err(e) => tracing::warn!(container = name, error = %e, "container kill failed"),
        }
    }

    /// Upload the report at `report_path`, applying the configured failure policy.
    pub async fn upload_report(
        &self,
        ctx: &StageContext,
        report_path: &Path,
        mut output: StageOutput,
    ) -> StageResult {
        let config = &ctx.run.config.coverage;

        let report = tokio::fs::read(report_path).await.map_err(|e| {
            ReleaseError::stage(
                COVERAGE,
                format!("cannot read report {}: {}", report_path.display(), e),
            )
        })?;
        output = output.with("report", report_path.display());

        let Some(url) = config.upload_url.as_deref() else {
            return Ok(output.warn(BoundaryWarning::CoverageUploadSkipped {
                reason: "no upload_url configured".to_string(),
            }));
        };

        if ctx.run.dry_run {
            tracing::info!(url, bytes = report.len(), "dry run, not uploading coverage report");
            return Ok(output.warn(BoundaryWarning::CoverageUploadSkipped {
                reason: "dry run".to_string(),
            }));
        }

        let result = match Secret::from_env(&config.token_env) {
            Some(token) => self.uploader.upload(url, &token, ctx.run.commit, report).await,
            None => Err(ReleaseError::upload(format!(
                "{} is not set",
                config.token_env
            ))),
        };

        match result {
            Ok(()) => {
                tracing::info!(url, "coverage report uploaded");
                Ok(output.with("uploaded", true))
            }
            Err(e) if config.fail_on_upload_error => {
                Err(ReleaseError::stage(COVERAGE, e.to_string()).into())
            }
            Err(e) => {
                tracing::warn!(error = %e, "coverage upload failed, continuing");
                Ok(output.with("uploaded", false).warn(
                    BoundaryWarning::CoverageUploadSkipped {
                        reason: e.to_string(),
                    },
                ))
            }
        }
    }
}

#[async_trait]
impl Stage for CoverageStage {
    fn name(&self) -> &str {
        COVERAGE
    }

    async fn run(&self, ctx: &StageContext) -> StageResult {
        let config = &ctx.run.config.coverage;
        let scratch = tempfile::Builder::new()
            .prefix("release-gate-coverage-")
            .tempdir()
            .map_err(|e| {
                ReleaseError::stage(COVERAGE, format!("cannot create output directory: {}", e))
            })?;
        let name = Self::container_name(ctx.run.commit);
        let argv = Self::container_command(config, &ctx.run.workspace, scratch.path(), &name);
        let spec = CommandSpec::from_argv(&argv)?
            .cwd(scratch.path())
            .timeout_secs(config.timeout_secs);

        tracing::info!(
            image = %config.image,
            container = %name,
            timeout_secs = config.timeout_secs,
            "measuring coverage"
        );
        let measured = match run_command(&spec).await {
            Ok(output) => check_exit(COVERAGE, &spec, output)?,
            Err(e) if e.is_timeout() => {
                Self::kill_container(&config.engine, &name).await;
                return Err(ReleaseError::stage(COVERAGE, e.to_string()).into());
            }
            Err(e) => return Err(ReleaseError::stage(COVERAGE, e.to_string()).into()),
        };

        let output = StageOutput::new().with("duration_ms", measured.duration.as_millis());
        self.upload_report(ctx, &scratch.path().join(&config.report), output)
            .await
    }
}
