//! Stage contract and the data flowing between stages.

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use git2::Oid;

use crate::boundary::BoundaryWarning;
use crate::config::Config;
use crate::error::{ReleaseError, Result};

/// Immutable facts about one run, shared by every stage
#[derive(Debug, Clone)]
pub struct RunContext {
    /// Root of the package checkout
    pub workspace: PathBuf,
    pub config: Config,
    /// The commit being built; the release tag is created here
    pub commit: Oid,
    /// Report side effects instead of performing them
    pub dry_run: bool,
}

/// Typed key/value outputs a stage hands to its dependents
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StageOutput {
    pub values: BTreeMap<String, String>,
    pub warnings: Vec<BoundaryWarning>,
}

impl StageOutput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.values.insert(key.into(), value.to_string());
        self
    }

    pub fn warn(mut self, warning: BoundaryWarning) -> Self {
        self.warnings.push(warning);
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(|v| v.as_str())
    }
}

/// Why a stage failed, plus any warnings gathered before it did
#[derive(Debug)]
pub struct StageFailure {
    pub error: ReleaseError,
    pub warnings: Vec<BoundaryWarning>,
}

impl StageFailure {
    pub fn with_warning(mut self, warning: BoundaryWarning) -> Self {
        self.warnings.push(warning);
        self
    }
}

impl From<ReleaseError> for StageFailure {
    fn from(error: ReleaseError) -> Self {
        StageFailure {
            error,
            warnings: Vec::new(),
        }
    }
}

pub type StageResult = std::result::Result<StageOutput, StageFailure>;

/// What a stage sees when it runs: the run context and the outputs of the
/// stages it declared in [`Stage::needs`]
#[derive(Debug, Clone)]
pub struct StageContext {
    pub run: Arc<RunContext>,
    pub inputs: HashMap<String, StageOutput>,
}

impl StageContext {
    pub fn new(run: Arc<RunContext>) -> Self {
        StageContext {
            run,
            inputs: HashMap::new(),
        }
    }

    pub fn with_input(mut self, stage: impl Into<String>, output: StageOutput) -> Self {
        self.inputs.insert(stage.into(), output);
        self
    }

    pub fn input(&self, stage: &str, key: &str) -> Option<&str> {
        self.inputs.get(stage).and_then(|o| o.get(key))
    }

    /// Like [`input`](Self::input) but missing values are an error.
    pub fn require(&self, stage: &str, key: &str) -> Result<&str> {
        self.input(stage, key).ok_or_else(|| {
            ReleaseError::stage(stage, format!("did not provide output '{}'", key))
        })
    }
}

/// One node of the release graph.
///
/// Implementations must be cheap to share: the scheduler holds them in an
/// `Arc` and runs each on its own task.
#[async_trait]
pub trait Stage: Send + Sync {
    fn name(&self) -> &str;

    /// Names of the stages that must succeed before this one starts
    fn needs(&self) -> Vec<String> {
        Vec::new()
    }

    async fn run(&self, ctx: &StageContext) -> StageResult;
}
