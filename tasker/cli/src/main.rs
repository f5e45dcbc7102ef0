//! Tasker CLI - manage named shell tasks and run them.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};
use tasker_lib::{
    EngineConfig, ExecutionLog, JsonFileStore, LogError, StoreError, Task, TaskBook, TaskEngine,
    TaskEvent, TaskKind, TaskStore, default_log_path, default_store_path, join_aggregate,
    split_aggregate,
};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use tracing_subscriber::{filter::EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Manage named shell commands and run them.
///
/// A command containing `&&` is an aggregate: its parts run one after
/// another and stop at the first failure. A part of the form `pause [SECS]`
/// sleeps instead of running a process.
///
/// Examples:
///   tasker add build "cargo build && pause 2 && cargo test"
///   tasker run build lint
///   tasker batch build deploy --pause
#[derive(Debug, Parser)]
#[command(name = "tasker")]
#[command(version)]
#[command(about = "Manage named shell commands and run them")]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short = 'v', action = clap::ArgAction::Count, global = true)]
    log_verbosity: u8,

    /// Task file [default: ~/.tasker/tasks.json]
    #[arg(long, value_name = "PATH", global = true)]
    store: Option<PathBuf>,

    /// Execution log file [default: ~/.tasker/execution.log]
    #[arg(long, value_name = "PATH", global = true)]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// List tasks in display order
    List {
        /// Only tasks marked frequent
        #[arg(long)]
        frequent: bool,

        /// Only tasks whose name contains TERM (case-insensitive)
        #[arg(long, value_name = "TERM")]
        filter: Option<String>,
    },

    /// Show a task's command and its sub-commands
    Show {
        #[arg(value_name = "NAME")]
        name: String,
    },

    /// Add a task
    Add {
        #[arg(value_name = "NAME")]
        name: String,

        /// Shell command; join sub-commands with `&&`
        #[arg(value_name = "COMMAND")]
        command: String,
    },

    /// Create a task that runs existing tasks in order
    Aggregate {
        #[arg(value_name = "NAME")]
        name: String,

        /// Tasks whose commands are joined with `&&`
        #[arg(value_name = "TASK", required = true, num_args = 1..)]
        tasks: Vec<String>,
    },

    /// Replace a task's command
    Edit {
        #[arg(value_name = "NAME")]
        name: String,

        #[arg(value_name = "COMMAND")]
        command: String,
    },

    /// Delete tasks
    Remove {
        #[arg(value_name = "NAME", required = true, num_args = 1..)]
        names: Vec<String>,
    },

    /// Move a task one place up or down
    Move {
        #[arg(value_name = "NAME")]
        name: String,

        #[arg(value_enum)]
        direction: Direction,
    },

    /// Mark a task as frequently used
    Frequent {
        #[arg(value_name = "NAME")]
        name: String,

        /// Clear the mark instead
        #[arg(long)]
        unset: bool,
    },

    /// Run tasks concurrently and wait for them
    Run {
        #[arg(value_name = "NAME", required = true, num_args = 1..)]
        names: Vec<String>,
    },

    /// Run tasks one after another and wait for them
    Batch {
        #[arg(value_name = "NAME", required = true, num_args = 1..)]
        names: Vec<String>,

        /// Sleep between tasks
        #[arg(long)]
        pause: bool,
    },

    /// Replace every task with the contents of a task file
    Import {
        #[arg(value_name = "PATH")]
        path: PathBuf,
    },

    /// Write every task to a task file
    Export {
        #[arg(value_name = "PATH")]
        path: PathBuf,
    },

    /// Show the end of the execution log
    Log {
        /// Number of lines to show
        #[arg(short = 'n', long, default_value_t = 20)]
        lines: usize,

        /// Empty the log instead
        #[arg(long)]
        clear: bool,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Direction {
    Up,
    Down,
}

#[derive(Debug, Error)]
enum CliError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("execution log error: {0}")]
    Log(#[from] LogError),

    #[error("event printer stopped unexpectedly: {0}")]
    Printer(#[from] tokio::task::JoinError),
}

/// Initialize tracing subscriber based on verbosity
fn init_tracing(verbose: u8) {
    let base_filter = match std::env::var("RUST_LOG") {
        Ok(filter) => filter,
        Err(_) => match verbose {
            0 => "warn".to_string(),
            1 => "warn,tasker_lib=info,tasker=info".to_string(),
            2 => "info,tasker_lib=debug,tasker=debug".to_string(),
            _ => "debug,tasker_lib=trace,tasker=trace".to_string(),
        },
    };

    let filter = EnvFilter::try_new(&base_filter).unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_target(true)
                .with_level(true)
                .with_file(verbose >= 3)
                .with_line_number(verbose >= 3)
                .with_writer(std::io::stderr)
                .compact(),
        )
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.log_verbosity);

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode, CliError> {
    let store = JsonFileStore::new(cli.store.unwrap_or_else(default_store_path));
    let log_path = cli.log_file.unwrap_or_else(default_log_path);
    debug!(store = %store.path().display(), log = %log_path.display(), "paths resolved");

    match cli.command {
        Commands::List { frequent, filter } => {
            let book = store.load_all()?;
            print_list(&book, frequent, filter.as_deref());
        }
        Commands::Show { name } => {
            let task = store
                .get(&name)?
                .ok_or_else(|| StoreError::NotFound(name.clone()))?;
            print_task(&task);
        }
        Commands::Add { name, command } => {
            add_task(&store, Task::new(name.as_str(), command))?;
            println!("added task '{name}'");
        }
        Commands::Aggregate { name, tasks } => {
            let command = store.modify(|book| {
                let command = aggregate_command(book, &tasks)?;
                if !book.insert(Task::new(name.as_str(), command.as_str())) {
                    return Err(StoreError::Duplicate(name.clone()));
                }
                Ok(command)
            })?;
            println!("added task '{name}': {command}");
        }
        Commands::Edit { name, command } => {
            store.modify(|book| {
                let frequent = book
                    .get(&name)
                    .map(|t| t.frequent)
                    .ok_or_else(|| StoreError::NotFound(name.clone()))?;
                book.update(Task {
                    name: name.clone(),
                    command,
                    frequent,
                });
                Ok(())
            })?;
            println!("updated task '{name}'");
        }
        Commands::Remove { names } => {
            store.modify(|book| {
                for name in &names {
                    book.remove(name)
                        .ok_or_else(|| StoreError::NotFound(name.clone()))?;
                }
                Ok(())
            })?;
            for name in &names {
                println!("removed task '{name}'");
            }
        }
        Commands::Move { name, direction } => {
            let moved = store.modify(|book| {
                if !book.contains(&name) {
                    return Err(StoreError::NotFound(name.clone()));
                }
                Ok(match direction {
                    Direction::Up => book.move_up(&name),
                    Direction::Down => book.move_down(&name),
                })
            })?;
            match (moved, direction) {
                (true, _) => println!("moved task '{name}'"),
                (false, Direction::Up) => println!("task '{name}' is already first"),
                (false, Direction::Down) => println!("task '{name}' is already last"),
            }
        }
        Commands::Frequent { name, unset } => {
            store.modify(|book| {
                if book.set_frequent(&name, !unset) {
                    Ok(())
                } else {
                    Err(StoreError::NotFound(name.clone()))
                }
            })?;
            if unset {
                println!("task '{name}' is no longer frequent");
            } else {
                println!("task '{name}' marked frequent");
            }
        }
        Commands::Run { names } => {
            let log = ExecutionLog::open(log_path)?;
            return run_tasks(store, log, |engine| {
                names.iter().map(|name| engine.run_one(name)).collect()
            })
            .await;
        }
        Commands::Batch { names, pause } => {
            let log = ExecutionLog::open(log_path)?;
            return run_tasks(store, log, |engine| {
                engine.run_batch(names.as_slice(), pause).into_iter().collect()
            })
            .await;
        }
        Commands::Import { path } => {
            let count = store.import_from(&path)?;
            println!("imported {count} task(s) from {}", path.display());
        }
        Commands::Export { path } => {
            let count = store.export_to(&path)?;
            println!("exported {count} task(s) to {}", path.display());
        }
        Commands::Log { lines, clear } => {
            let log = ExecutionLog::open(log_path)?;
            if clear {
                log.clear()?;
                println!("cleared {}", log.path().display());
            } else {
                for line in log.recent(lines)? {
                    println!("{line}");
                }
            }
        }
    }

    Ok(ExitCode::SUCCESS)
}

fn add_task(store: &JsonFileStore, task: Task) -> Result<(), StoreError> {
    store.modify(|book| {
        let name = task.name.clone();
        if book.insert(task) {
            Ok(())
        } else {
            Err(StoreError::Duplicate(name))
        }
    })
}

/// Joins the commands of `names`, in the given order.
fn aggregate_command(book: &TaskBook, names: &[String]) -> Result<String, StoreError> {
    let commands = names
        .iter()
        .map(|name| {
            book.get(name)
                .map(|t| t.command.as_str())
                .ok_or_else(|| StoreError::NotFound(name.clone()))
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(join_aggregate(commands))
}

fn print_list(book: &TaskBook, frequent_only: bool, filter: Option<&str>) {
    let mut tasks = match filter {
        Some(term) => book.search(term),
        None => book.iter().collect(),
    };
    if frequent_only {
        tasks.retain(|t| t.frequent);
    }

    if tasks.is_empty() {
        println!("no tasks");
        return;
    }
    for task in tasks {
        let marker = if task.frequent { '*' } else { ' ' };
        println!("{marker} {} ({})", task.name, task.kind());
    }
}

fn print_task(task: &Task) {
    println!("name:     {}", task.name);
    println!("command:  {}", task.command);
    println!("kind:     {}", task.kind());
    println!("frequent: {}", task.frequent);
    if task.kind() == TaskKind::Aggregate {
        for (i, sub) in split_aggregate(&task.command).iter().enumerate() {
            println!("  {}. {sub}", i + 1);
        }
    }
}

/// Builds an engine, starts work with `start`, and streams events until
/// every started handle finishes.
///
/// Exits with failure if any task ended `Failed`.
async fn run_tasks<F>(store: JsonFileStore, log: ExecutionLog, start: F) -> Result<ExitCode, CliError>
where
    F: FnOnce(&TaskEngine) -> Vec<JoinHandle<()>>,
{
    let (tx, rx) = mpsc::unbounded_channel();
    let printer = tokio::spawn(print_events(rx, log));

    let engine = TaskEngine::new(Arc::new(store), Arc::new(tx), EngineConfig::default());
    let workers_failed = join_workers(start(&engine)).await;
    // Dropping the engine drops the last sender and ends the printer.
    drop(engine);

    let any_failed = printer.await?;
    Ok(if any_failed || workers_failed {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}

/// Waits for every worker. Returns true if any of them panicked.
async fn join_workers(handles: Vec<JoinHandle<()>>) -> bool {
    let mut failed = false;
    for handle in handles {
        if let Err(e) = handle.await {
            warn!(error = %e, "task worker panicked");
            eprintln!("error: task worker stopped: {e}");
            failed = true;
        }
    }
    failed
}

/// Prints events until the channel closes. Returns true if a task failed.
async fn print_events(mut rx: mpsc::UnboundedReceiver<TaskEvent>, log: ExecutionLog) -> bool {
    let mut any_failed = false;
    while let Some(event) = rx.recv().await {
        match event {
            TaskEvent::StatusChanged { name, status } => {
                any_failed |= status.is_failed();
                println!("[{name}] {status}");
            }
            TaskEvent::Log { line } => {
                println!("{line}");
                append_log(&log, &line);
            }
        }
    }
    any_failed
}

fn append_log(log: &ExecutionLog, line: &str) {
    if let Err(e) = log.append(line) {
        warn!(path = %log.path().display(), error = %e, "failed to append to execution log");
    }
}
