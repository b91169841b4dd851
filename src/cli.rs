use crate::{
    batch::BatchMode,
    config::Config,
    db::SqliteStatusStore,
    events::{EventSink, LogEvent},
    loader::HttpReportSource,
    session::{Session, SessionParts},
    surface::{bridge::BridgeSurface, AutomationSurface, QueueSource},
    util::ensure_dir,
};
use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Receiver;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

#[derive(Parser, Debug)]
#[command(name = "assay-batch")]
#[command(about = "Batch assay-weight submission (report loading + status reconciliation + per-lot portal automation)")]
pub struct Args {
    #[command(subcommand)]
    pub cmd: Command,

    /// Path to config TOML. If omitted, uses ./assay-batch.toml if present.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Override log level (trace/debug/info/warn/error).
    #[arg(long)]
    pub log_level: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Ping the automation bridge and print its diagnostics.
    Doctor {},
    /// Load a report and print its reconciled job rows.
    Jobs {
        #[arg(long)]
        report_id: String,
    },
    /// Load a report and run a batch over the selected jobs.
    Run {
        #[arg(long)]
        report_id: String,
        /// initial, cornet or all.
        #[arg(long, default_value = "all")]
        mode: String,
        /// Run exactly these jobs instead of the auto-selected ones.
        #[arg(long = "job")]
        jobs: Vec<String>,
        /// Seconds between jobs; overrides global.job_delay_seconds.
        #[arg(long)]
        delay: Option<u64>,
    },
    /// Watch the portal queue for newly ready jobs. Press Enter to stop.
    Monitor {
        #[arg(long)]
        report_id: String,
        #[arg(long)]
        max_cycles: Option<u64>,
    },
}

pub fn dispatch(args: Args) -> Result<()> {
    let cfg_path = resolve_config_path(args.config.as_deref())?;
    let mut cfg = Config::load(&cfg_path)?;
    let log_path = resolve_log_path(&cfg);
    let _guard = init_logging(&args, &cfg, log_path.as_deref())?;
    info!("config={}", cfg_path.display());

    match args.cmd {
        Command::Doctor {} => doctor(&cfg),
        Command::Jobs { report_id } => jobs(cfg, report_id),
        Command::Run {
            report_id,
            mode,
            jobs,
            delay,
        } => {
            if let Some(delay) = delay {
                cfg.global.job_delay_seconds = delay;
            }
            let mode: BatchMode = mode.parse()?;
            run(cfg, report_id, mode, jobs)
        }
        Command::Monitor {
            report_id,
            max_cycles,
        } => monitor(cfg, report_id, max_cycles),
    }
}

fn resolve_config_path(user: Option<&Path>) -> Result<PathBuf> {
    if let Some(p) = user {
        return Ok(p.to_path_buf());
    }
    let default = PathBuf::from("assay-batch.toml");
    if default.exists() {
        Ok(default)
    } else {
        Ok(PathBuf::from("assay-batch.example.toml"))
    }
}

fn resolve_log_path(cfg: &Config) -> Option<PathBuf> {
    if !cfg.logging.write_to_file || cfg.logging.file_path.is_empty() {
        return None;
    }
    Some(PathBuf::from(&cfg.logging.file_path))
}

fn init_logging(args: &Args, cfg: &Config, file_path: Option<&Path>) -> Result<Option<WorkerGuard>> {
    let level = args
        .log_level
        .as_deref()
        .unwrap_or(cfg.logging.level.as_str());

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let stdout_layer = if cfg.logging.json {
        tracing_subscriber::fmt::layer()
            .json()
            .with_target(true)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_target(true)
            .boxed()
    };

    let (file_layer, guard) = if let Some(path) = file_path {
        let parent = path.parent().unwrap_or_else(|| Path::new("."));
        ensure_dir(parent)?;
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("open log file: {}", path.display()))?;
        let (non_blocking, guard) = tracing_appender::non_blocking(file);
        let layer = tracing_subscriber::fmt::layer()
            .with_writer(non_blocking)
            .with_ansi(false)
            .with_target(true)
            .boxed();
        (Some(layer), Some(guard))
    } else {
        (None, None)
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stdout_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| anyhow!("failed to init logging: {e}"))?;

    Ok(guard)
}

fn doctor(cfg: &Config) -> Result<()> {
    let bridge = BridgeSurface::spawn(&cfg.surface)?;
    let diag = bridge.doctor()?;
    println!("{}", serde_json::to_string_pretty(&diag)?);
    Ok(())
}

fn build_session(cfg: Config, events: EventSink) -> Result<Session> {
    let reports = HttpReportSource::new(&cfg.api)?;
    let store = SqliteStatusStore::new(&cfg.database)?;
    let (surface, queue) = match BridgeSurface::spawn(&cfg.surface) {
        Ok(bridge) => {
            let bridge = Arc::new(bridge);
            let surface: Arc<dyn AutomationSurface> = bridge.clone();
            let queue: Arc<dyn QueueSource> = bridge;
            (Some(surface), Some(queue))
        }
        Err(err) => {
            warn!("automation bridge unavailable: {err}");
            (None, None)
        }
    };
    let parts = SessionParts {
        reports: Box::new(reports),
        store: Box::new(store),
        surface,
        queue,
    };
    Ok(Session::new(cfg, parts, events)?)
}

fn on_worker<T, F>(events: Receiver<LogEvent>, work: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    let handle = std::thread::Builder::new()
        .name("assay-batch-worker".into())
        .spawn(work)
        .with_context(|| "spawning worker thread")?;
    // Ends once the worker drops every sender.
    for event in events {
        event.log();
    }
    handle
        .join()
        .map_err(|_| anyhow!("worker thread panicked"))?
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn jobs(cfg: Config, report_id: String) -> Result<()> {
    let (events, rx) = EventSink::channel();
    let rows = on_worker(rx, move || {
        let mut session = build_session(cfg, events)?;
        let rows = session
            .load_report(&report_id)
            .with_context(|| format!("loading report {report_id}"))?
            .to_vec();
        Ok(rows)
    })?;
    print_json(&rows)
}

fn run(cfg: Config, report_id: String, mode: BatchMode, only: Vec<String>) -> Result<()> {
    let print_summary = cfg.global.print_summary;
    let (events, rx) = EventSink::channel();
    let result = on_worker(rx, move || {
        let mut session = build_session(cfg, events)?;
        session
            .load_report(&report_id)
            .with_context(|| format!("loading report {report_id}"))?;
        if !only.is_empty() {
            session.select_only(&only)?;
        }
        let result = session.run_batch(mode, None, &mut |outcome, label| {
            info!(job = %outcome.job_no, "status: {label}");
        })?;
        Ok(result)
    })?;

    if print_summary {
        print_json(&serde_json::json!({
            "mode": result.mode,
            "success_count": result.success_count,
            "failure_count": result.failure_count,
            "skipped_count": result.skipped_count,
        }))?;
    } else {
        print_json(&result)?;
    }
    if result.failure_count > 0 {
        return Err(anyhow!("{} of {} jobs failed", result.failure_count, result.jobs.len()));
    }
    Ok(())
}

fn monitor(cfg: Config, report_id: String, max_cycles: Option<u64>) -> Result<()> {
    let cancel = Arc::new(AtomicBool::new(false));
    {
        let cancel = cancel.clone();
        std::thread::spawn(move || {
            // Enter, EOF or a read error all stop the monitor.
            let mut line = String::new();
            let _ = std::io::stdin().lock().read_line(&mut line);
            cancel.store(true, Ordering::SeqCst);
        });
    }

    let (events, rx) = EventSink::channel();
    let summary = on_worker(rx, move || {
        let mut session = build_session(cfg, events)?;
        session
            .load_report(&report_id)
            .with_context(|| format!("loading report {report_id}"))?;
        Ok(session.monitor(&cancel, max_cycles)?)
    })?;
    print_json(&summary)
}
