// tests/integration_test.rs
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use git2::{Oid, Repository, Signature};
use tempfile::TempDir;

use release_gate::config::Config;
use release_gate::pipeline::{RunContext, StageStatus};
use release_gate::stages::{self, PUBLISH, VERSION};

const MANIFEST: &str = r#"[package]
name = "demo"
version = "0.0.0-placeholder-version"
edition = "2021"

[dependencies]
"#;

struct Fixture {
    work: TempDir,
    origin: TempDir,
    repo: Repository,
}

impl Fixture {
    /// A package repo with a bare `origin`, a `v1.3.2` tag and one feature commit on top
    fn new() -> Self {
        let work = TempDir::new().unwrap();
        let origin = TempDir::new().unwrap();
        Repository::init_bare(origin.path()).unwrap();

        let repo = Repository::init(work.path()).unwrap();
        repo.remote("origin", origin.path().to_str().unwrap())
            .unwrap();

        let fixture = Fixture { work, origin, repo };
        let base = fixture.commit("Cargo.toml", MANIFEST, "initial import");
        {
            let base_obj = fixture.repo.find_object(base, None).unwrap();
            fixture
                .repo
                .tag_lightweight("v1.3.2", &base_obj, false)
                .unwrap();
        }
        fixture.commit("src/lib.rs", "pub fn search() {}\n", "feat: add search");
        fixture
    }

    fn path(&self) -> PathBuf {
        self.work.path().canonicalize().unwrap()
    }

    fn commit(&self, file: &str, content: &str, message: &str) -> Oid {
        let full = self.work.path().join(file);
        if let Some(parent) = full.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(&full, content).unwrap();

        let mut index = self.repo.index().unwrap();
        index.add_path(Path::new(file)).unwrap();
        index.write().unwrap();
        let tree = self.repo.find_tree(index.write_tree().unwrap()).unwrap();

        let sig = Signature::now("Test User", "test@example.com").unwrap();
        let parents = match self.repo.head() {
            Ok(head) => vec![head.peel_to_commit().unwrap()],
            Err(_) => Vec::new(),
        };
        let parent_refs: Vec<&git2::Commit> = parents.iter().collect();
        self.repo
            .commit(Some("HEAD"), &sig, &sig, message, &tree, &parent_refs)
            .unwrap()
    }

    fn head(&self) -> Oid {
        self.repo.head().unwrap().peel_to_commit().unwrap().id()
    }

    fn manifest(&self) -> String {
        fs::read_to_string(self.work.path().join("Cargo.toml")).unwrap()
    }

    fn origin_tag(&self, name: &str) -> Option<Oid> {
        let origin = Repository::open_bare(self.origin.path()).unwrap();
        let reference = origin.find_reference(&format!("refs/tags/{}", name)).ok()?;
        let id = reference.peel_to_commit().unwrap().id();
        Some(id)
    }

    /// Config that replaces docker, cargo and the registry with shell commands
    fn config(&self) -> Config {
        let engine = self.work.path().join("fake-engine");
        fs::write(
            &engine,
            "#!/bin/sh\necho '<coverage line-rate=\"1\"/>' > cobertura.xml\n",
        )
        .unwrap();
        make_executable(&engine);

        let mut config = Config::default();
        config.test.command = vec!["true".to_string()];
        config.coverage.engine = engine.display().to_string();
        config.publish.command = argv(&["sh", "-c", "touch published"]);
        config
    }

    fn context(&self, config: Config, dry_run: bool) -> RunContext {
        RunContext {
            workspace: self.path(),
            config,
            commit: self.head(),
            dry_run,
        }
    }

    fn published(&self) -> bool {
        self.work.path().join("published").exists()
    }
}

fn argv(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

#[cfg(unix)]
fn make_executable(path: &Path) {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o755)).unwrap();
}

#[cfg(not(unix))]
fn make_executable(_path: &Path) {}

#[tokio::test]
async fn test_release_tags_built_commit_and_pushes() {
    let fixture = Fixture::new();
    let head = fixture.head();

    let report = stages::default_pipeline()
        .unwrap()
        .run(fixture.context(fixture.config(), false))
        .await
        .unwrap();

    assert!(report.succeeded(), "{:?}", report);
    assert_eq!(report.output(VERSION, "version"), Some("1.4.0"));
    assert_eq!(report.output(PUBLISH, "released"), Some("true"));
    assert!(fixture.published());
    assert_eq!(fixture.manifest(), MANIFEST.replace("0.0.0-placeholder-version", "1.4.0"));
    assert_eq!(fixture.origin_tag("v1.4.0"), Some(head));

    let tag = fixture.repo.revparse_single("v1.4.0").unwrap();
    let tag = tag.as_tag().expect("release tag should be annotated");
    assert_eq!(tag.message().map(str::trim), Some("Release v1.4.0"));
}

#[tokio::test]
async fn test_failing_tests_block_publish() {
    let fixture = Fixture::new();
    let mut config = fixture.config();
    config.test.command = vec!["false".to_string()];

    let report = stages::default_pipeline()
        .unwrap()
        .run(fixture.context(config, false))
        .await
        .unwrap();

    assert!(!report.succeeded());
    assert_eq!(report.status(stages::TEST), Some(StageStatus::Failed));
    assert_eq!(report.status(PUBLISH), Some(StageStatus::Skipped));
    assert!(!fixture.published());
    assert_eq!(fixture.manifest(), MANIFEST);
    assert!(fixture.repo.revparse_single("v1.4.0").is_err());
    assert_eq!(fixture.origin_tag("v1.4.0"), None);
}

#[tokio::test]
async fn test_failing_coverage_blocks_publish() {
    let fixture = Fixture::new();
    let mut config = fixture.config();
    config.coverage.engine = "false".to_string();

    let report = stages::default_pipeline()
        .unwrap()
        .run(fixture.context(config, false))
        .await
        .unwrap();

    assert_eq!(report.status(stages::COVERAGE), Some(StageStatus::Failed));
    assert_eq!(report.status(PUBLISH), Some(StageStatus::Skipped));
    assert!(!fixture.published());
    assert_eq!(fixture.origin_tag("v1.4.0"), None);
}

#[tokio::test]
async fn test_coverage_report_stays_out_of_published_tree() {
    let fixture = Fixture::new();
    let mut config = fixture.config();
    config.publish.command = argv(&[
        "sh",
        "-c",
        "if [ -e cobertura.xml ]; then echo 'found cobertura.xml' >&2; exit 9; fi; touch published",
    ]);

    let report = stages::default_pipeline()
        .unwrap()
        .run(fixture.context(config, false))
        .await
        .unwrap();

    assert!(report.succeeded(), "{:?}", report);
    assert!(fixture.published());
    assert!(!fixture.work.path().join("cobertura.xml").exists());
}

#[tokio::test]
async fn test_dry_run_has_no_side_effects() {
    let fixture = Fixture::new();

    let report = stages::default_pipeline()
        .unwrap()
        .run(fixture.context(fixture.config(), true))
        .await
        .unwrap();

    assert!(report.succeeded());
    assert_eq!(report.output(PUBLISH, "dry_run"), Some("true"));
    assert_eq!(report.output(PUBLISH, "tag"), Some("v1.4.0"));
    assert!(!fixture.published());
    assert_eq!(fixture.manifest(), MANIFEST);
    assert!(fixture.repo.revparse_single("v1.4.0").is_err());
}

#[tokio::test]
async fn test_no_new_commits_publishes_nothing() {
    let fixture = Fixture::new();
    let head_obj = fixture.repo.find_object(fixture.head(), None).unwrap();
    fixture
        .repo
        .tag_lightweight("v1.4.0", &head_obj, false)
        .unwrap();

    let report = stages::default_pipeline()
        .unwrap()
        .run(fixture.context(fixture.config(), false))
        .await
        .unwrap();

    assert!(report.succeeded());
    assert_eq!(report.output(VERSION, "commit_count"), Some("0"));
    assert_eq!(report.output(PUBLISH, "released"), Some("false"));
    assert!(!fixture.published());
    assert_eq!(fixture.manifest(), MANIFEST);
}

#[tokio::test]
async fn test_breaking_change_bumps_major() {
    let fixture = Fixture::new();
    fixture.commit(
        "src/lib.rs",
        "pub fn search(q: &str) {}\n",
        "refactor: change search signature\n\nBREAKING CHANGE: search takes a query",
    );

    let report = stages::default_pipeline()
        .unwrap()
        .run(fixture.context(fixture.config(), false))
        .await
        .unwrap();

    assert!(report.succeeded(), "{:?}", report);
    assert_eq!(report.output(VERSION, "bump"), Some("major"));
    assert_eq!(fixture.origin_tag("v2.0.0"), Some(fixture.head()));
}

#[tokio::test]
async fn test_missing_remote_reports_partial_release() {
    let fixture = Fixture::new();
    let mut config = fixture.config();
    config.trunk.remote = "nowhere".to_string();

    let report = stages::default_pipeline()
        .unwrap()
        .run(fixture.context(config, false))
        .await
        .unwrap();

    assert_eq!(report.status(PUBLISH), Some(StageStatus::Failed));
    assert!(fixture.published());
    let warnings: Vec<String> = report.warnings().map(|w| w.to_string()).collect();
    assert!(
        warnings.iter().any(|w| w.contains("v1.4.0 is incomplete")),
        "{:?}",
        warnings
    );
}

#[test]
fn test_release_gate_help() {
    let output = Command::new(env!("CARGO_BIN_EXE_release-gate"))
        .arg("--help")
        .output()
        .expect("Failed to execute command");

    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout).unwrap();
    assert!(stdout.contains("release-gate"));
    assert!(stdout.contains("next-version"));
}

#[test]
fn test_next_version_writes_output_file() {
    let fixture = Fixture::new();
    let outputs = fixture.work.path().join("outputs.txt");

    let output = Command::new(env!("CARGO_BIN_EXE_release-gate"))
        .args(["--workspace"])
        .arg(fixture.path())
        .args(["next-version", "--output-file"])
        .arg(&outputs)
        .output()
        .expect("Failed to execute command");

    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    assert_eq!(String::from_utf8(output.stdout).unwrap().trim(), "1.4.0");

    let written = fs::read_to_string(&outputs).unwrap();
    assert!(written.contains("version=1.4.0\n"));
    assert!(written.contains("tag=v1.4.0\n"));
    assert!(written.contains("previous_tag=v1.3.2\n"));
}

#[test]
fn test_run_ignores_non_trunk_ref() {
    let fixture = Fixture::new();

    let output = Command::new(env!("CARGO_BIN_EXE_release-gate"))
        .arg("--workspace")
        .arg(fixture.path())
        .args(["run", "--ref", "refs/heads/feature/x"])
        .output()
        .expect("Failed to execute command");

    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("nothing to release"));
    assert!(!fixture.published());
}

#[test]
fn test_stamp_command() {
    let fixture = Fixture::new();

    let output = Command::new(env!("CARGO_BIN_EXE_release-gate"))
        .arg("--workspace")
        .arg(fixture.path())
        .args(["stamp", "--version", "1.4.0"])
        .output()
        .expect("Failed to execute command");

    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    assert_eq!(fixture.manifest(), MANIFEST.replace("0.0.0-placeholder-version", "1.4.0"));
}
