//! acms - autonomous code-modification pipeline
//!
//! CLI entry point for launching and managing execution runs.

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use clap::Parser;
use eyre::{Context, Result};
use tracing::info;

use acms::cli::{Cli, Command};
use acms::config::Config;
use acms::daemon::{DaemonManager, RunSupervisor};
use acms::domain::{Filter, IndexValue, Run, Task, Workstream};
use acms::executor::Executor;
use acms::guardrails::PatternRegistry;
use acms::orchestrator::{Orchestrator, OrchestratorConfig};
use acms::paths::PathRegistry;
use acms::resilience::ResilientAdapter;
use acms::router::{RoundRobinCounter, Router, RouterConfig};
use acms::tools::ToolProfile;
use statestore::Store;

fn setup_logging() -> Result<()> {
    let log_dir = dirs::data_local_dir().unwrap_or_else(|| PathBuf::from(".")).join("acms").join("logs");

    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    info!("Logging initialized");
    Ok(())
}

/// Path registry rooted at `root`, falling back to built-in defaults when
/// `index_file` doesn't exist yet (a fresh checkout with no `.acms/` setup).
fn load_path_registry(index_file: &PathBuf, root: impl Into<PathBuf>) -> PathRegistry {
    match PathRegistry::load(index_file, root) {
        Ok(registry) => registry,
        Err(_) => {
            let mut templates = HashMap::new();
            templates.insert("acms.runs.root".to_string(), ".acms_runs/{run_id}".to_string());
            templates.insert("acms.runs.ledger".to_string(), ".acms_runs/{run_id}/run.ledger.jsonl".to_string());
            templates.insert("acms.runs.status".to_string(), ".acms_runs/{run_id}/run_status.json".to_string());
            PathRegistry::from_templates(templates, PathBuf::new())
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    setup_logging().context("Failed to setup logging")?;

    let cli = Cli::parse();
    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;

    match cli.command {
        None => {
            println!("acms v{}", env!("CARGO_PKG_VERSION"));
            println!("  Executor: max_concurrent_tasks={}", config.executor.max_concurrent_tasks);
            println!("  Resilience: failure_threshold={}", config.resilience.failure_threshold);
            println!("  Daemon: max_concurrent_runs={}", config.daemon.max_concurrent_runs);
        }
        Some(Command::Start { foreground }) => cmd_start(&config, foreground).await?,
        Some(Command::Stop) => cmd_stop()?,
        Some(Command::Status { detailed, format: _ }) => cmd_status(detailed)?,
        Some(Command::Logs { follow, lines }) => cmd_logs(follow, lines)?,
        Some(Command::Run { repo_root, run_id }) => cmd_run(&config, &repo_root, run_id).await?,
        Some(Command::RunDaemon) => cmd_run_daemon(&config).await?,
        Some(Command::Metrics { run_id, format: _ }) => cmd_metrics(&config, run_id.as_deref())?,
    }

    Ok(())
}

async fn cmd_start(config: &Config, foreground: bool) -> Result<()> {
    let manager = DaemonManager::new();
    if foreground {
        info!("running supervisor in foreground");
        manager.register_self()?;
        return cmd_run_daemon(config).await;
    }
    let pid = manager.start()?;
    println!("Daemon started with PID {pid}");
    Ok(())
}

fn cmd_stop() -> Result<()> {
    DaemonManager::new().stop()?;
    println!("Daemon stopped");
    Ok(())
}

fn cmd_status(detailed: bool) -> Result<()> {
    let status = DaemonManager::new().status();
    println!("Running: {}", status.running);
    if let Some(pid) = status.pid {
        println!("PID: {pid}");
    }
    if detailed {
        println!("PID file: {}", status.pid_file.display());
    }
    Ok(())
}

fn cmd_logs(follow: bool, lines: usize) -> Result<()> {
    let log_path = dirs::data_local_dir().unwrap_or_else(|| PathBuf::from(".")).join("acms").join("logs").join("acms.log");
    if !log_path.exists() {
        println!("No log file at {}", log_path.display());
        return Ok(());
    }
    let content = fs::read_to_string(&log_path)?;
    let tail: Vec<&str> = content.lines().rev().take(lines).collect();
    for line in tail.into_iter().rev() {
        println!("{line}");
    }
    if follow {
        println!("(--follow is not yet supported outside the daemon's own log stream)");
    }
    Ok(())
}

/// Drives one run to completion. With no `--run-id`, creates a fresh `Run`
/// record and returns immediately: task planning (gap analysis + planning)
/// is an external component that populates workstreams and tasks for the
/// run before this command is invoked again with `--run-id`.
async fn cmd_run(config: &Config, repo_root: &str, run_id: Option<String>) -> Result<()> {
    let store = Store::open(&config.store.data_dir).context("failed to open state store")?;

    let mut run = match run_id {
        Some(id) => store.get::<Run>(&id).context("run not found")?,
        None => {
            let run = Run::new(repo_root, serde_json::json!({}));
            store.create(&run).context("failed to persist new run")?;
            println!("Created run {} (phase={:?}). Plan tasks, then re-run with --run-id {}", run.id, run.phase, run.id);
            return Ok(());
        }
    };

    let workstreams: Vec<Workstream> = store.list(&[Filter::eq("run_id", IndexValue::String(run.id.clone()))])?;
    let mut tasks: HashMap<String, Task> = HashMap::new();
    for ws in &workstreams {
        let ws_tasks: Vec<Task> = store.list(&[Filter::eq("workstream_id", IndexValue::String(ws.id.clone()))])?;
        for task in ws_tasks {
            tasks.insert(task.id.clone(), task);
        }
    }
    if tasks.is_empty() {
        println!("Run {} has no tasks to execute", run.id);
        return Ok(());
    }

    let patterns = PatternRegistry::load(&config.patterns.index_file).context("failed to load pattern registry")?;

    let profiles: HashMap<String, ToolProfile> = if config.tools.profiles_file.exists() {
        let text = fs::read_to_string(&config.tools.profiles_file)?;
        serde_yaml::from_str(&text).context("failed to parse tool profiles")?
    } else {
        HashMap::new()
    };

    let router_config: RouterConfig = if config.router.rules_file.exists() {
        let text = fs::read_to_string(&config.router.rules_file)?;
        serde_yaml::from_str(&text).context("failed to parse router rules")?
    } else {
        RouterConfig::default()
    };
    let mut router = Router::new(router_config, RoundRobinCounter::load(RoundRobinCounter::default_path()));

    let adapter = ResilientAdapter::new(config.resilience.retry_policy(), config.resilience.failure_threshold, config.resilience.recovery_timeout());

    let registry = load_path_registry(&config.paths.index_file, repo_root);
    let mut vars = HashMap::new();
    vars.insert("run_id".to_string(), run.id.clone());
    let ledger_path = registry.resolve("acms.runs.ledger", &vars).unwrap_or_else(|_| PathBuf::from(".acms_runs").join(&run.id).join("run.ledger.jsonl"));
    let run_status_path =
        registry.resolve("acms.runs.status", &vars).unwrap_or_else(|_| PathBuf::from(".acms_runs").join(&run.id).join("run_status.json"));

    let executor = Executor::new(&store, &patterns, &adapter, &profiles, &mut router, &ledger_path, config.executor.to_executor_config());
    let orchestrator = Orchestrator::new(&store, &ledger_path, &run_status_path, OrchestratorConfig { max_concurrent_tasks: config.executor.max_concurrent_tasks });

    let cancel = AtomicBool::new(false);
    let status = orchestrator.run(&mut run, tasks, &executor, repo_root, &cancel).await?;

    println!("Run {} finished: {:?} ({} tasks executed, {} failed)", run.id, status.final_status, status.metrics.tasks_executed, status.metrics.tasks_failed);
    Ok(())
}

/// Internal entry point spawned by `DaemonManager::start`: registers the PID,
/// then polls the state store for non-terminal runs until a shutdown signal
/// arrives.
async fn cmd_run_daemon(config: &Config) -> Result<()> {
    let manager = DaemonManager::new();
    manager.register_self()?;

    let store = Store::open(&config.store.data_dir).context("failed to open state store")?;
    let lock_dir = dirs::runtime_dir().or_else(dirs::data_local_dir).unwrap_or_else(|| PathBuf::from("/tmp")).join("acms").join("run_locks");

    let mut supervisor = RunSupervisor::new(
        store,
        lock_dir,
        std::time::Duration::from_millis(config.daemon.poll_interval_ms),
        config.daemon.max_concurrent_runs,
    )?;

    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_signal = Arc::clone(&shutdown);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("received shutdown signal");
            shutdown_signal.store(true, Ordering::SeqCst);
        }
    });

    supervisor.run(&shutdown).await?;
    Ok(())
}

fn cmd_metrics(config: &Config, run_id: Option<&str>) -> Result<()> {
    let store = Store::open(&config.store.data_dir).context("failed to open state store")?;
    match run_id {
        Some(id) => {
            let run = store.get::<Run>(id)?;
            println!("run={} phase={:?} tasks_executed={} tasks_failed={}", run.id, run.phase, run.metrics.tasks_executed, run.metrics.tasks_failed);
        }
        None => {
            let runs: Vec<Run> = store.list(&[])?;
            println!("{} runs in store", runs.len());
            for run in runs {
                println!("  {} phase={:?}", run.id, run.phase);
            }
        }
    }
    Ok(())
}
