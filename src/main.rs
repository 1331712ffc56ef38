use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::Level;

use release_gate::config::{self, Config};
use release_gate::domain::{Trigger, Version};
use release_gate::git::{Git2Repository, Repository};
use release_gate::manifest::Manifest;
use release_gate::pipeline::RunContext;
use release_gate::stages::{self, version};
use release_gate::telemetry::{self, LogFormat};
use release_gate::ui;

#[derive(Parser)]
#[command(
    name = "release-gate",
    version,
    about = "Test, measure coverage, compute the next semantic version, then publish and tag"
)]
struct Args {
    #[arg(short, long, global = true, help = "Custom configuration file path")]
    config: Option<PathBuf>,

    #[arg(
        short,
        long,
        global = true,
        default_value = ".",
        help = "Package checkout to release"
    )]
    workspace: PathBuf,

    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text, help = "Log output format")]
    log_format: LogFormat,

    #[arg(short, long, global = true, help = "Enable debug logging")]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the full release pipeline for the current commit
    Run {
        #[arg(
            long = "ref",
            env = "RELEASE_GATE_REF",
            help = "Pushed ref, e.g. refs/heads/main; defaults to the checked-out branch"
        )]
        git_ref: Option<String>,

        #[arg(long, help = "Run verification but perform no upload, publish, tag or push")]
        dry_run: bool,
    },
    /// Compute the next version without running anything else
    NextVersion {
        #[arg(long, help = "Append key=value lines for downstream steps to this file")]
        output_file: Option<PathBuf>,

        #[arg(long, help = "Print the result as JSON")]
        json: bool,
    },
    /// Replace the manifest placeholder with a version
    Stamp {
        #[arg(long, help = "Version to write, e.g. 1.4.0")]
        version: String,
    },
    /// Show the stage graph
    Stages,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let level = if args.verbose { Level::DEBUG } else { Level::INFO };
    telemetry::init_tracing(args.log_format, level);

    let workspace = args
        .workspace
        .canonicalize()
        .with_context(|| format!("Workspace {} not found", args.workspace.display()))?;

    let config = match config::load_config(args.config.as_deref(), &workspace) {
        Ok(cfg) => cfg,
        Err(e) => {
            ui::display_error(&format!("Error loading config: {}", e));
            std::process::exit(1);
        }
    };

    match args.command {
        Command::Run { git_ref, dry_run } => run(&workspace, config, git_ref, dry_run).await,
        Command::NextVersion { output_file, json } => {
            next_version(&workspace, &config, output_file.as_deref(), json)
        }
        Command::Stamp { version } => stamp(&workspace, &config, &version),
        Command::Stages => {
            ui::display_stage_graph(&stages::default_pipeline()?.graph());
            Ok(())
        }
    }
}

async fn run(workspace: &Path, config: Config, git_ref: Option<String>, dry_run: bool) -> Result<()> {
    let repo = Git2Repository::open(workspace)?;

    let trigger = match git_ref {
        Some(git_ref) => Trigger::new(git_ref),
        None => match repo.current_branch()? {
            Some(branch) => Trigger::new(format!("refs/heads/{}", branch)),
            None => {
                ui::display_error("Detached HEAD: pass --ref to say which branch was pushed");
                std::process::exit(1);
            }
        },
    };

    if !trigger.is_trunk_push(&config.trunk.branch) {
        ui::display_status(&format!(
            "{} is not a push to '{}'; nothing to release",
            trigger.git_ref, config.trunk.branch
        ));
        return Ok(());
    }

    let commit = repo.head_commit()?;
    tracing::info!(commit = %commit, git_ref = %trigger.git_ref, dry_run, "starting release");

    let pipeline = stages::default_pipeline()?;
    let report = pipeline
        .run(RunContext {
            workspace: workspace.to_path_buf(),
            config,
            commit,
            dry_run,
        })
        .await?;

    ui::display_report(&report);

    if !report.succeeded() {
        std::process::exit(1);
    }
    Ok(())
}

fn next_version(
    workspace: &Path,
    config: &Config,
    output_file: Option<&Path>,
    json: bool,
) -> Result<()> {
    let repo = Git2Repository::open(workspace)?;
    let head = repo.head_commit()?;
    let next = version::compute(&repo, config, head)?;

    for warning in &next.warnings {
        ui::display_boundary_warning(warning);
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&next)?);
    } else {
        println!("{}", next.next);
    }

    if let Some(path) = output_file {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("Cannot open {}", path.display()))?;
        for (key, value) in &version::to_output(&next).values {
            writeln!(file, "{}={}", key, value)?;
        }
    }

    Ok(())
}

fn stamp(workspace: &Path, config: &Config, version: &str) -> Result<()> {
    let version = Version::parse(version)?;
    let mut manifest = Manifest::load(workspace.join(&config.publish.manifest))?;
    let replaced = manifest.stamp(&config.publish.placeholder, &version)?;
    manifest.write()?;

    ui::display_success(&format!(
        "Stamped {} with {} ({} occurrence{})",
        manifest.path().display(),
        version,
        replaced,
        if replaced == 1 { "" } else { "s" }
    ));
    Ok(())
}
