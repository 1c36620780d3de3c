//! Multi-pass LaTeX build driver.
//!
//! Runs the compiler and bibliography processor in the order needed to
//! resolve citations (`texpass run build`), or any single pass on its own.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use texpass::core::state::{TaskRecord, TaskState};
use texpass::core::task::{Action, Task};
use texpass::execute::{ExecuteError, Session, TaskObserver};
use texpass::exit_codes;
use texpass::io::config::CONFIG_FILE_NAME;
use texpass::io::init::{InitOptions, init_project};
use texpass::io::process::SystemProcessRunner;
use texpass::logging;
use texpass::protocol::load_project;
use tracing::info;

#[derive(Parser)]
#[command(
    name = "texpass",
    version,
    about = "Multi-pass LaTeX + BibTeX build driver"
)]
struct Cli {
    /// Project root; configured directories are resolved against it.
    #[arg(long, global = true, default_value = ".")]
    root: PathBuf,

    /// Config file (defaults to `<root>/texpass.toml`).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Raise log verbosity (`-v` info, `-vv` debug). `RUST_LOG` takes precedence.
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Write a default `texpass.toml` under the project root.
    Init {
        /// Overwrite an existing config.
        #[arg(short, long)]
        force: bool,
    },
    /// List every task with its description.
    Tasks {
        /// Print as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Print the resolved execution order of a target without running it.
    Plan {
        target: String,
        /// Print as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Run one or more targets, in the given order.
    Run {
        #[arg(required = true)]
        targets: Vec<String>,
    },
}

fn main() {
    let cli = Cli::parse();
    logging::init(cli.verbose);
    if let Err(err) = run(cli) {
        eprintln!("{:#}", err);
        std::process::exit(exit_code_for(&err));
    }
}

fn run(cli: Cli) -> Result<()> {
    let root = fs::canonicalize(&cli.root)
        .with_context(|| format!("resolve project root {}", cli.root.display()))?;
    let config_path = cli
        .config
        .unwrap_or_else(|| root.join(CONFIG_FILE_NAME));
    match cli.command {
        Command::Init { force } => cmd_init(&config_path, force),
        Command::Tasks { json } => cmd_tasks(&root, &config_path, json),
        Command::Plan { target, json } => cmd_plan(&root, &config_path, &target, json),
        Command::Run { targets } => cmd_run(&root, &config_path, &targets),
    }
}

fn cmd_init(config_path: &Path, force: bool) -> Result<()> {
    let path = init_project(config_path, &InitOptions { force })?;
    println!("{}", path.display());
    Ok(())
}

fn cmd_tasks(root: &Path, config_path: &Path, json: bool) -> Result<()> {
    let (_, graph) = load_project(root, config_path)?;
    let tasks: Vec<&Task> = graph.tasks().collect();
    if json {
        return print_json(&tasks);
    }
    for task in tasks {
        if task.description.is_empty() {
            println!("{}", task.name);
        } else {
            println!("{} - {}", task.name, task.description);
        }
    }
    Ok(())
}

fn cmd_plan(root: &Path, config_path: &Path, target: &str, json: bool) -> Result<()> {
    let (_, graph) = load_project(root, config_path)?;
    let plan = graph.resolve(target)?;
    if json {
        return print_json(&plan);
    }
    for task in plan {
        match &task.action {
            Action::Process(spec) => println!("{}: {}", task.name, spec.command_line()),
            Action::Lifecycle => println!("{}", task.name),
        }
    }
    Ok(())
}

fn cmd_run(root: &Path, config_path: &Path, targets: &[String]) -> Result<()> {
    let (_, graph) = load_project(root, config_path)?;
    // Reject unknown targets before any tool runs.
    for target in targets {
        graph.resolve(target)?;
    }

    let mut session = Session::with_observer(&graph, SystemProcessRunner, ConsoleObserver);
    for target in targets {
        match session.execute(target) {
            Ok(report) => {
                info!(
                    target = %report.target,
                    ignored_exits = report.ignored_exits().count(),
                    "target finished"
                );
            }
            Err(err) => {
                eprintln!("\nBUILD FAILED");
                return Err(err.into());
            }
        }
    }
    eprintln!("\nBUILD SUCCESSFUL");
    Ok(())
}

/// Prints Gradle-style task framing around the tools' own output.
struct ConsoleObserver;

impl TaskObserver for ConsoleObserver {
    fn task_started(&mut self, task: &Task) {
        eprintln!("> Task :{}", task.name);
    }

    fn task_finished(&mut self, task: &Task, record: &TaskRecord) {
        match record.state {
            TaskState::Failed => eprintln!("> Task :{} FAILED", task.name),
            TaskState::UpToDate => eprintln!("> Task :{} UP-TO-DATE", task.name),
            _ => {}
        }
    }
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    let payload = serde_json::to_string_pretty(value).context("serialize json")?;
    println!("{payload}");
    Ok(())
}

fn exit_code_for(err: &anyhow::Error) -> i32 {
    let task_failed = err.chain().any(|cause| {
        matches!(
            cause.downcast_ref::<ExecuteError>(),
            Some(ExecuteError::TaskFailed { .. })
        )
    });
    if task_failed {
        exit_codes::TASK_FAILED
    } else {
        exit_codes::INVALID
    }
}
