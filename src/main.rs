//! GitFlow - Command-line front end for the GitFlow git engine
//!
//! Run with `gitflow --help` for usage.

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand, ValueEnum};
use color_eyre::eyre::Result;
use serde::Serialize;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use gitflow::{
    APP_NAME, VERSION,
    config::Config,
    conflict::{ConflictResolutionEngine, ConflictedFile, ContinueOutcome, SectionChoice, Side},
    git::{Git, RepoPaths},
};

#[derive(Parser)]
#[command(name = APP_NAME)]
#[command(version = VERSION)]
#[command(about = "Inspect git history and resolve merge conflicts")]
#[command(long_about = None)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    /// Run as if started in this directory
    #[arg(short = 'C', value_name = "PATH", global = true)]
    repo: Option<PathBuf>,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the reflog of a reference
    Reflog {
        /// Reference (default: HEAD)
        #[arg(default_value = "HEAD")]
        reference: String,

        /// Number of entries (default: `reflog_limit` from config)
        #[arg(short = 'n', long)]
        limit: Option<usize>,
    },

    /// List local and remote-tracking branches
    Branches {
        /// Only show remote-tracking branches
        #[arg(short, long)]
        remote: bool,
    },

    /// Show commit history
    Log {
        /// Revision (default: HEAD)
        #[arg(default_value = "HEAD")]
        revision: String,

        #[arg(short = 'n', long, default_value_t = 20)]
        limit: usize,
    },

    /// Inspect and resolve an in-progress merge, rebase, cherry-pick or revert
    Conflicts {
        #[command(subcommand)]
        action: ConflictAction,
    },

    /// Run git with the configured executable, timeout and environment
    Exec {
        /// Arguments passed to git
        #[arg(trailing_var_arg = true, allow_hyphen_values = true, required = true)]
        args: Vec<String>,
    },

    /// Show configuration
    Config {
        /// Initialize config file with defaults
        #[arg(long)]
        init: bool,
    },
}

#[derive(Subcommand)]
enum ConflictAction {
    /// Show the operation in progress and its conflicted files
    Status,

    /// Show the conflict sections of a file
    Show { path: String },

    /// Show the ours/base/theirs versions of a file
    Versions { path: String },

    /// Resolve one open section of a file
    Resolve {
        path: String,

        /// Section index
        section: usize,

        choice: ChoiceArg,

        /// Replacement text for `manual`
        #[arg(long, required_if_eq("choice", "manual"))]
        text: Option<String>,

        /// Stage the file once no markers remain
        #[arg(long)]
        stage: bool,
    },

    /// Take one side's whole version of a file and stage it
    Take { path: String, side: SideArg },

    /// Finalize the operation
    Continue,

    /// Abandon the operation
    Abort,

    /// Skip the current commit (not available for merges)
    Skip,
}

#[derive(Clone, Copy, ValueEnum)]
enum ChoiceArg {
    Ours,
    Theirs,
    Both,
    Manual,
}

#[derive(Clone, Copy, ValueEnum)]
enum SideArg {
    Ours,
    Theirs,
}

impl From<SideArg> for Side {
    fn from(side: SideArg) -> Self {
        match side {
            SideArg::Ours => Side::Ours,
            SideArg::Theirs => Side::Theirs,
        }
    }
}

fn setup_logging(debug: bool, log_file: Option<&Path>) -> Result<()> {
    let filter = if debug {
        EnvFilter::new("debug")
    } else {
        // Use info level for our crate, warn for dependencies
        EnvFilter::new("info")
            .add_directive("gix=warn".parse()?)
            .add_directive("tokio=warn".parse()?)
    };

    if let Some(path) = log_file {
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)?;

        tracing_subscriber::registry()
            .with(fmt::layer().with_writer(file).with_target(false))
            .with(filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
            .with(filter)
            .init();
    }

    Ok(())
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_file(file: &ConflictedFile) {
    let status = if file.resolved { "resolved" } else { "unresolved" };
    println!("  {} [{}] {}", file.path, file.conflict_type, status);
}

#[tokio::main]
async fn main() -> Result<()> {
    // Install color-eyre error hooks
    color_eyre::install()?;

    let cli = Cli::parse();

    // Load configuration
    let config = Config::load().unwrap_or_else(|e| {
        eprintln!("Warning: Failed to load config, using defaults: {}", e);
        Config::default()
    });

    setup_logging(cli.debug || config.debug, config.log_file.as_deref())?;

    let start_dir = match cli.repo.clone() {
        Some(path) => path,
        None => std::env::current_dir()?,
    };

    match cli.command {
        Commands::Reflog { reference, limit } => {
            let git = open_git(&config, &start_dir)?;
            let entries = git
                .reflog(&reference, limit.unwrap_or(config.reflog_limit))
                .await?;

            if cli.json {
                return print_json(&entries);
            }
            for entry in entries {
                println!(
                    "{} {} {}: {} ({}, {})",
                    entry.short_hash,
                    entry.selector,
                    entry.raw_action,
                    entry.message,
                    entry.author_name,
                    entry.date.format("%Y-%m-%d %H:%M")
                );
            }
        }

        Commands::Branches { remote } => {
            let git = open_git(&config, &start_dir)?;
            let branches: Vec<_> = git
                .branches()
                .await?
                .into_iter()
                .filter(|b| !remote || b.is_remote)
                .collect();

            if cli.json {
                return print_json(&branches);
            }
            for branch in branches {
                let marker = if branch.is_current { "*" } else { " " };
                let short_tip: String = branch.tip.chars().take(7).collect();
                let tracking = match (&branch.upstream, branch.upstream_gone) {
                    (Some(upstream), true) => format!(" [{}: gone]", upstream),
                    (Some(upstream), false) if branch.ahead > 0 || branch.behind > 0 => {
                        format!(" [{}: +{} -{}]", upstream, branch.ahead, branch.behind)
                    }
                    (Some(upstream), false) => format!(" [{}]", upstream),
                    (None, _) => String::new(),
                };
                println!("{} {} {}{}", marker, branch.name, short_tip, tracking);
            }
        }

        Commands::Log { revision, limit } => {
            let git = open_git(&config, &start_dir)?;
            let commits = git.log(&revision, limit).await?;

            if cli.json {
                return print_json(&commits);
            }
            for commit in commits {
                println!(
                    "{} {} ({}, {})",
                    commit.short_hash,
                    commit.subject,
                    commit.author_name,
                    commit.date.format("%Y-%m-%d")
                );
            }
        }

        Commands::Conflicts { action } => {
            let mut engine = ConflictResolutionEngine::open(&start_dir, &config)?;
            engine.detect_state().await?;
            run_conflict_action(&mut engine, action, cli.json).await?;
        }

        Commands::Exec { args } => {
            let git = open_git(&config, &start_dir)?;
            let args: Vec<&str> = args.iter().map(String::as_str).collect();
            let result = git.run(&args).await?;

            if cli.json {
                print_json(&result)?;
            } else {
                print!("{}", result.stdout);
                eprint!("{}", result.stderr);
            }
            if !result.succeeded() {
                std::process::exit(result.exit_code);
            }
        }

        Commands::Config { init } => {
            if init {
                config.save()?;
                println!(
                    "Configuration initialized at {:?}",
                    Config::config_file_path()?
                );
            } else {
                println!("Configuration:");
                println!("{}", toml::to_string_pretty(&config)?);
                println!("\nConfig file: {:?}", Config::config_file_path()?);
            }
        }
    }

    Ok(())
}

fn open_git(config: &Config, start_dir: &Path) -> Result<Git> {
    let paths = RepoPaths::discover(start_dir)?;
    info!("Using repository {}", paths.repo_name());
    Ok(Git::from_config(config, paths.workdir()))
}

async fn run_conflict_action(
    engine: &mut ConflictResolutionEngine,
    action: ConflictAction,
    json: bool,
) -> Result<()> {
    match action {
        ConflictAction::Status => {
            let state = engine.merge_state();
            if json {
                return print_json(state);
            }
            match state.kind {
                None => println!("No operation in progress"),
                Some(kind) => {
                    println!(
                        "{} of {} into {} ({})",
                        kind,
                        state.incoming.as_deref().unwrap_or("?"),
                        state.current_branch.as_deref().unwrap_or("detached HEAD"),
                        engine.state()
                    );
                    println!(
                        "{} resolved, {} unresolved",
                        state.resolved_count(),
                        state.unresolved_count()
                    );
                    state.files.iter().for_each(print_file);
                }
            }
        }

        ConflictAction::Show { path } => {
            let file = engine.load_file(&path).await?;
            if json {
                return print_json(file);
            }
            print_file(file);
            if let Some(error) = &file.load_error {
                println!("  cannot scan: {}", error);
            }
            for (index, section) in file.sections.iter().enumerate() {
                println!("--- section {} (lines {}-{})", index, section.start_line, section.end_line);
                println!("ours:\n{}", section.ours);
                if let Some(base) = &section.base {
                    println!("base:\n{}", base);
                }
                println!("theirs:\n{}", section.theirs);
            }
        }

        ConflictAction::Versions { path } => {
            let versions = engine.load_file_versions(&path).await?;
            if json {
                return print_json(versions);
            }
            for (label, blob) in [
                ("ours", &versions.ours),
                ("base", &versions.base),
                ("theirs", &versions.theirs),
            ] {
                match blob {
                    Some(bytes) => println!("=== {}\n{}", label, String::from_utf8_lossy(bytes)),
                    None => println!("=== {} (absent)", label),
                }
            }
        }

        ConflictAction::Resolve {
            path,
            section,
            choice,
            text,
            stage,
        } => {
            engine.load_file(&path).await?;
            let choice = match choice {
                ChoiceArg::Ours => SectionChoice::Ours,
                ChoiceArg::Theirs => SectionChoice::Theirs,
                ChoiceArg::Both => SectionChoice::Both,
                ChoiceArg::Manual => SectionChoice::Manual(text.unwrap_or_default()),
            };

            let open = engine.resolve_section(&path, section, choice)?.unresolved_sections();
            engine.write_working_copy(&path).await?;

            if open > 0 {
                println!("{} section(s) left in {}", open, path);
            } else if stage {
                let state = engine.save_resolution(&path).await?;
                println!("Staged {} ({})", path, state);
            } else {
                println!("No conflicts left in {}; rerun with --stage or use `git add`", path);
            }
        }

        ConflictAction::Take { path, side } => {
            engine.resolve_file(&path, side.into()).await?;
            let state = engine.save_resolution(&path).await?;
            println!("Staged {} ({})", path, state);
        }

        ConflictAction::Continue => match engine.continue_operation().await? {
            ContinueOutcome::Completed => println!("Operation completed"),
            ContinueOutcome::NewConflicts(count) => {
                println!("Stopped with {} new conflicted file(s)", count);
                engine.merge_state().files.iter().for_each(print_file);
            }
        },

        ConflictAction::Abort => {
            engine.abort_operation().await?;
            println!("Operation aborted");
        }

        ConflictAction::Skip => {
            let state = engine.skip_operation().await?;
            if !state.in_progress {
                println!("Operation completed");
            } else if state.unresolved_count() > 0 {
                println!("Stopped with {} conflicted file(s)", state.unresolved_count());
                state.files.iter().for_each(print_file);
            } else {
                println!("Commit skipped");
            }
        }
    }

    Ok(())
}
