//! Stage graph and scheduler
//!
//! A [Pipeline] is a set of [Stage]s with declared dependencies. Running it
//! starts every stage whose dependencies have succeeded, concurrently, and
//! never starts a stage downstream of a failure.
//!
//! - [stage]: the stage contract and the values passed between stages
//! - [runner]: external command execution used by the concrete stages

pub mod runner;
pub mod stage;

pub use runner::{run_command, CommandOutput, CommandSpec};
pub use stage::{RunContext, Stage, StageContext, StageFailure, StageOutput, StageResult};

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::task::JoinSet;
use tracing::Instrument;

use crate::boundary::BoundaryWarning;
use crate::error::{ReleaseError, Result};

/// Outcome of one stage in one run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageStatus {
    Succeeded,
    Failed,
    /// Never started because a dependency did not succeed
    Skipped,
}

impl fmt::Display for StageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StageStatus::Succeeded => "succeeded",
            StageStatus::Failed => "failed",
            StageStatus::Skipped => "skipped",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone)]
pub struct StageReport {
    pub name: String,
    pub status: StageStatus,
    pub duration: Duration,
    pub outputs: BTreeMap<String, String>,
    pub warnings: Vec<BoundaryWarning>,
    /// Failure message, or the dependency that caused a skip
    pub error: Option<String>,
}

impl StageReport {
    fn skipped(name: &str, blocked_by: &str) -> Self {
        StageReport {
            name: name.to_string(),
            status: StageStatus::Skipped,
            duration: Duration::ZERO,
            outputs: BTreeMap::new(),
            warnings: Vec::new(),
            error: Some(format!("dependency '{}' did not succeed", blocked_by)),
        }
    }
}

/// Per-stage outcomes in declaration order
#[derive(Debug, Clone, Default)]
pub struct PipelineReport {
    pub stages: Vec<StageReport>,
}

impl PipelineReport {
    /// True iff every stage succeeded
    pub fn succeeded(&self) -> bool {
        self.stages
            .iter()
            .all(|s| s.status == StageStatus::Succeeded)
    }

    pub fn stage(&self, name: &str) -> Option<&StageReport> {
        self.stages.iter().find(|s| s.name == name)
    }

    pub fn status(&self, name: &str) -> Option<StageStatus> {
        self.stage(name).map(|s| s.status)
    }

    pub fn output(&self, stage: &str, key: &str) -> Option<&str> {
        self.stage(stage)
            .and_then(|s| s.outputs.get(key))
            .map(|v| v.as_str())
    }

    pub fn warnings(&self) -> impl Iterator<Item = &BoundaryWarning> {
        self.stages.iter().flat_map(|s| s.warnings.iter())
    }

    pub fn failures(&self) -> impl Iterator<Item = &StageReport> {
        self.stages
            .iter()
            .filter(|s| s.status == StageStatus::Failed)
    }
}

/// A validated-on-run graph of stages
#[derive(Default, Clone)]
pub struct Pipeline {
    stages: Vec<Arc<dyn Stage>>,
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.stages.iter().map(|s| s.name()))
            .finish()
    }
}

impl Pipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_stage(mut self, stage: impl Stage + 'static) -> Self {
        self.stages.push(Arc::new(stage));
        self
    }

    /// `(name, needs)` for every stage, in declaration order
    pub fn graph(&self) -> Vec<(String, Vec<String>)> {
        self.stages
            .iter()
            .map(|s| (s.name().to_string(), s.needs()))
            .collect()
    }

    /// Reject duplicate names, unknown dependencies and cycles.
    pub fn validate(&self) -> Result<()> {
        let mut names = HashSet::new();
        for stage in &self.stages {
            if !names.insert(stage.name().to_string()) {
                return Err(ReleaseError::config(format!(
                    "duplicate stage '{}'",
                    stage.name()
                )));
            }
        }

        for stage in &self.stages {
            for need in stage.needs() {
                if !names.contains(&need) {
                    return Err(ReleaseError::config(format!(
                        "stage '{}' needs unknown stage '{}'",
                        stage.name(),
                        need
                    )));
                }
            }
        }

        self.topological_order().map(|_| ())
    }

    /// Stage names ordered so every stage follows its dependencies.
    pub fn topological_order(&self) -> Result<Vec<String>> {
        let graph: HashMap<String, Vec<String>> = self.graph().into_iter().collect();
        let mut order = Vec::with_capacity(graph.len());
        let mut remaining: Vec<String> = self.stages.iter().map(|s| s.name().to_string()).collect();

        while !remaining.is_empty() {
            let (ready, blocked): (Vec<String>, Vec<String>) =
                remaining.into_iter().partition(|name| {
                    graph[name]
                        .iter()
                        .all(|need| order.contains(need) || !graph.contains_key(need))
                });
            if ready.is_empty() {
                return Err(ReleaseError::config(format!(
                    "dependency cycle between stages: {}",
                    blocked.join(", ")
                )));
            }
            order.extend(ready);
            remaining = blocked;
        }

        Ok(order)
    }

    /// Run every stage at most once.
    ///
    /// Errors only when the graph itself is invalid; stage failures are
    /// recorded in the report.
    pub async fn run(&self, run: RunContext) -> Result<PipelineReport> {
        self.validate()?;

        let run = Arc::new(run);
        let needs: Vec<Vec<String>> = self.stages.iter().map(|s| s.needs()).collect();
        let index_of: HashMap<&str, usize> = self
            .stages
            .iter()
            .enumerate()
            .map(|(i, s)| (s.name(), i))
            .collect();

        let mut reports: Vec<Option<StageReport>> = vec![None; self.stages.len()];
        let mut outputs: HashMap<String, StageOutput> = HashMap::new();
        let mut pending: Vec<usize> = (0..self.stages.len()).collect();
        let mut running = JoinSet::new();

        loop {
            // Skips cascade, so repeat until nothing new is blocked.
            loop {
                let blocked: Vec<(usize, String)> = pending
                    .iter()
                    .filter_map(|&i| {
                        needs[i]
                            .iter()
                            .find(|need| {
                                matches!(
                                    reports[index_of[need.as_str()]].as_ref().map(|r| r.status),
                                    Some(StageStatus::Failed | StageStatus::Skipped)
                                )
                            })
                            .map(|need| (i, need.clone()))
                    })
                    .collect();
                if blocked.is_empty() {
                    break;
                }
                for (i, need) in blocked {
                    let name = self.stages[i].name();
                    tracing::warn!(stage = name, blocked_by = %need, "skipping stage");
                    reports[i] = Some(StageReport::skipped(name, &need));
                    pending.retain(|&p| p != i);
                }
            }

            let ready: Vec<usize> = pending
                .iter()
                .copied()
                .filter(|&i| {
                    needs[i].iter().all(|need| {
                        reports[index_of[need.as_str()]].as_ref().map(|r| r.status)
                            == Some(StageStatus::Succeeded)
                    })
                })
                .collect();

            for i in ready {
                pending.retain(|&p| p != i);
                let stage = Arc::clone(&self.stages[i]);
                let ctx = needs[i].iter().fold(StageContext::new(Arc::clone(&run)), |ctx, need| {
                    match outputs.get(need) {
                        Some(output) => ctx.with_input(need.clone(), output.clone()),
                        None => ctx,
                    }
                });
                let name = stage.name().to_string();
                let span = tracing::info_span!("stage", name = %name);

                running.spawn(async move {
                    let started = Instant::now();
                    tracing::info!(stage = %name, "starting stage");
                    let task = tokio::spawn(async move { stage.run(&ctx).await }.instrument(span));
                    let result = match task.await {
                        Ok(result) => result,
                        Err(e) => Err(ReleaseError::stage(&name, format!("task aborted: {}", e)).into()),
                    };
                    (i, result, started.elapsed())
                });
            }

            let Some(joined) = running.join_next().await else {
                break;
            };
            let (i, result, duration) =
                joined.map_err(|e| ReleaseError::stage("pipeline", e.to_string()))?;
            let name = self.stages[i].name().to_string();

            let report = match result {
                Ok(output) => {
                    tracing::info!(stage = %name, duration_ms = duration.as_millis() as u64, "stage succeeded");
                    for warning in &output.warnings {
                        tracing::warn!(stage = %name, "{}", warning);
                    }
                    let report = StageReport {
                        name: name.clone(),
                        status: StageStatus::Succeeded,
                        duration,
                        outputs: output.values.clone(),
                        warnings: output.warnings.clone(),
                        error: None,
                    };
                    outputs.insert(name, output);
                    report
                }
                Err(failure) => {
                    tracing::error!(stage = %name, error = %failure.error, "stage failed");
                    for warning in &failure.warnings {
                        tracing::warn!(stage = %name, "{}", warning);
                    }
                    StageReport {
                        name,
                        status: StageStatus::Failed,
                        duration,
                        outputs: BTreeMap::new(),
                        warnings: failure.warnings,
                        error: Some(failure.error.to_string()),
                    }
                }
            };
            reports[i] = Some(report);
        }

        Ok(PipelineReport {
            stages: reports.into_iter().flatten().collect(),
        })
    }
}
