use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::domain::{CommitMarkers, TagPattern, Version};
use crate::error::{ReleaseError, Result};

/// File name looked up in the workspace and the user config directory.
pub const CONFIG_FILE_NAME: &str = "release-gate.toml";

/// Represents the complete configuration for release-gate.
///
/// Every section has defaults, so an empty file (or no file) describes the
/// stock pipeline for a Cargo package released from `main`.
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub trunk: TrunkConfig,

    #[serde(default)]
    pub tag: TagConfig,

    #[serde(default)]
    pub commits: CommitsConfig,

    #[serde(default)]
    pub test: TestConfig,

    #[serde(default)]
    pub coverage: CoverageConfig,

    #[serde(default)]
    pub publish: PublishConfig,
}

fn default_branch() -> String {
    "main".to_string()
}

fn default_remote() -> String {
    "origin".to_string()
}

/// Which pushes start a release and where tags go.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct TrunkConfig {
    #[serde(default = "default_branch")]
    pub branch: String,

    #[serde(default = "default_remote")]
    pub remote: String,
}

impl Default for TrunkConfig {
    fn default() -> Self {
        TrunkConfig {
            branch: default_branch(),
            remote: default_remote(),
        }
    }
}

fn default_tag_prefix() -> String {
    "v".to_string()
}

fn default_initial_version() -> String {
    "0.1.0".to_string()
}

fn default_tag_message() -> String {
    "Release {tag}".to_string()
}

/// Tag naming and the baseline used before the first release.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct TagConfig {
    #[serde(default = "default_tag_prefix")]
    pub prefix: String,

    /// Version released when no matching tag exists yet
    #[serde(default = "default_initial_version")]
    pub initial_version: String,

    /// Annotation message; `{tag}` and `{version}` are substituted
    #[serde(default = "default_tag_message")]
    pub message: String,
}

impl TagConfig {
    pub fn pattern(&self) -> TagPattern {
        TagPattern::new(self.prefix.clone())
    }

    pub fn initial(&self) -> Result<Version> {
        Version::parse(&self.initial_version)
    }

    pub fn annotation(&self, tag: &str, version: &Version) -> String {
        self.message
            .replace("{tag}", tag)
            .replace("{version}", &version.to_string())
    }
}

impl Default for TagConfig {
    fn default() -> Self {
        TagConfig {
            prefix: default_tag_prefix(),
            initial_version: default_initial_version(),
            message: default_tag_message(),
        }
    }
}

/// Returns the default breaking-change marker.
fn default_breaking_pattern() -> String {
    r"breaking[ -]change|^[a-z]+(\([^)]*\))?!:".to_string()
}

/// Returns the default feature marker.
fn default_feature_pattern() -> String {
    "^feat".to_string()
}

/// Commit-message markers used to pick the bump class.
///
/// Patterns are regular expressions compiled case-insensitive and multi-line,
/// so `^` anchors at the start of any subject or body line.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct CommitsConfig {
    #[serde(default = "default_breaking_pattern")]
    pub breaking_pattern: String,

    #[serde(default = "default_feature_pattern")]
    pub feature_pattern: String,
}

impl CommitsConfig {
    pub fn markers(&self) -> Result<CommitMarkers> {
        CommitMarkers::new(&self.breaking_pattern, &self.feature_pattern)
    }
}

impl Default for CommitsConfig {
    fn default() -> Self {
        CommitsConfig {
            breaking_pattern: default_breaking_pattern(),
            feature_pattern: default_feature_pattern(),
        }
    }
}

fn default_test_command() -> Vec<String> {
    vec![
        "cargo".to_string(),
        "test".to_string(),
        "--all-features".to_string(),
    ]
}

/// Test stage command.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct TestConfig {
    #[serde(default = "default_test_command")]
    pub command: Vec<String>,

    /// Wall-clock limit in seconds; 0 disables it
    #[serde(default)]
    pub timeout_secs: u64,
}

impl Default for TestConfig {
    fn default() -> Self {
        TestConfig {
            command: default_test_command(),
            timeout_secs: 0,
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_container_engine() -> String {
    "docker".to_string()
}

fn default_coverage_image() -> String {
    "xd009642/tarpaulin:latest".to_string()
}

fn default_coverage_command() -> Vec<String> {
    vec![
        "cargo".to_string(),
        "tarpaulin".to_string(),
        "--all-features".to_string(),
        "--out".to_string(),
        "Xml".to_string(),
        "--output-dir".to_string(),
        "/coverage".to_string(),
    ]
}

fn default_coverage_timeout() -> u64 {
    600
}

fn default_coverage_report() -> PathBuf {
    PathBuf::from("cobertura.xml")
}

fn default_coverage_token_env() -> String {
    "CODECOV_TOKEN".to_string()
}

/// Containerized coverage run and report upload.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct CoverageConfig {
    #[serde(default = "default_container_engine")]
    pub engine: String,

    #[serde(default = "default_coverage_image")]
    pub image: String,

    /// Command run inside the container. The workspace is mounted at `/volume`
    /// and a scratch output directory at `/coverage`.
    #[serde(default = "default_coverage_command")]
    pub command: Vec<String>,

    #[serde(default = "default_coverage_timeout")]
    pub timeout_secs: u64,

    /// Report path relative to the scratch output directory
    #[serde(default = "default_coverage_report")]
    pub report: PathBuf,

    /// Ingestion endpoint; no upload happens when unset
    #[serde(default)]
    pub upload_url: Option<String>,

    #[serde(default = "default_coverage_token_env")]
    pub token_env: String,

    #[serde(default = "default_true")]
    pub fail_on_upload_error: bool,
}

impl Default for CoverageConfig {
    fn default() -> Self {
        CoverageConfig {
            engine: default_container_engine(),
            image: default_coverage_image(),
            command: default_coverage_command(),
            timeout_secs: default_coverage_timeout(),
            report: default_coverage_report(),
            upload_url: None,
            token_env: default_coverage_token_env(),
            fail_on_upload_error: true,
        }
    }
}

fn default_manifest() -> PathBuf {
    PathBuf::from("Cargo.toml")
}

fn default_placeholder() -> String {
    "0.0.0-placeholder-version".to_string()
}

fn default_publish_command() -> Vec<String> {
    vec![
        "cargo".to_string(),
        "publish".to_string(),
        "--allow-dirty".to_string(),
    ]
}

fn default_registry_token_env() -> String {
    "CARGO_REGISTRY_TOKEN".to_string()
}

fn default_push_token_env() -> String {
    "GIT_PUSH_TOKEN".to_string()
}

fn default_push_username() -> String {
    "x-access-token".to_string()
}

/// Manifest stamping, registry publish and tag push.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct PublishConfig {
    /// Manifest path relative to the workspace
    #[serde(default = "default_manifest")]
    pub manifest: PathBuf,

    #[serde(default = "default_placeholder")]
    pub placeholder: String,

    #[serde(default = "default_publish_command")]
    pub command: Vec<String>,

    /// Variable holding the registry token; also the name it is passed under
    #[serde(default = "default_registry_token_env")]
    pub token_env: String,

    #[serde(default = "default_push_token_env")]
    pub push_token_env: String,

    #[serde(default = "default_push_username")]
    pub push_username: String,
}

impl Default for PublishConfig {
    fn default() -> Self {
        PublishConfig {
            manifest: default_manifest(),
            placeholder: default_placeholder(),
            command: default_publish_command(),
            token_env: default_registry_token_env(),
            push_token_env: default_push_token_env(),
            push_username: default_push_username(),
        }
    }
}

impl Config {
    /// Check the values serde cannot: marker regexes, the initial version
    /// and command vectors.
    pub fn validate(&self) -> Result<()> {
        self.commits.markers()?;
        self.tag.initial()?;

        if self.trunk.branch.trim().is_empty() {
            return Err(ReleaseError::config("trunk.branch must not be empty"));
        }

        let commands = [
            ("test.command", &self.test.command),
            ("coverage.command", &self.coverage.command),
            ("publish.command", &self.publish.command),
        ];
        for (name, command) in commands {
            if command.is_empty() {
                return Err(ReleaseError::config(format!("{} must not be empty", name)));
            }
        }

        if self.publish.placeholder.is_empty() {
            return Err(ReleaseError::config("publish.placeholder must not be empty"));
        }

        Ok(())
    }

    /// Parse and validate a configuration document.
    pub fn from_toml(text: &str) -> Result<Self> {
        let config: Config = toml::from_str(text)
            .map_err(|e| ReleaseError::config(format!("Invalid configuration: {}", e)))?;
        config.validate()?;
        Ok(config)
    }
}

/// Loads configuration from file or returns defaults.
///
/// Attempts to load configuration in the following order:
/// 1. Custom path provided as parameter
/// 2. `release-gate.toml` in the workspace
/// 3. `release-gate.toml` in the user config directory
/// 4. Default configuration if no file found
///
/// # Returns
/// * `Ok(Config)` - Loaded or default configuration
/// * `Err` - If a file exists but cannot be read, parsed or validated
pub fn load_config(config_path: Option<&Path>, workspace: &Path) -> Result<Config> {
    let path = match config_path {
        Some(path) => Some(path.to_path_buf()),
        None => find_config(workspace),
    };

    match path {
        Some(path) => {
            tracing::debug!(path = %path.display(), "loading configuration");
            let text = fs::read_to_string(&path).map_err(|e| {
                ReleaseError::config(format!("Cannot read {}: {}", path.display(), e))
            })?;
            Config::from_toml(&text)
        }
        None => {
            tracing::debug!("no configuration file found, using defaults");
            Ok(Config::default())
        }
    }
}

fn find_config(workspace: &Path) -> Option<PathBuf> {
    let local = workspace.join(CONFIG_FILE_NAME);
    if local.exists() {
        return Some(local);
    }

    dirs::config_dir()
        .map(|dir| dir.join(CONFIG_FILE_NAME))
        .filter(|path| path.exists())
}
