//! parcel-consult terminal front-end
//!
//! `consult` runs one batch and streams result lines to stdout; the job can be
//! steered from stdin with `p` (pause), `r` (resume), `c` (cancel) and `q` (quit).

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use parcel_consult_lib::domain::parcel::output_header_line;
use parcel_consult_lib::domain::NoticeKind;
use parcel_consult_lib::infrastructure::logging::log_system_info;
use parcel_consult_lib::infrastructure::{init_logging_with_config, AppConfig, ConfigManager, CookieStore};
use parcel_consult_lib::{
    ConsultWorker, ControllerEvent, ControllerRuntime, JobController, JobState, RuntimeHandle, SigefFetcher,
    WorkerHandle,
};

#[derive(Parser, Debug)]
#[command(name = "parcel-consult", version)]
#[command(about = "Batch consultation of rural parcel codes")]
struct Args {
    #[command(subcommand)]
    cmd: Command,

    /// Path to config JSON. Defaults to the user config directory.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Override log level (trace/debug/info/warn/error).
    #[arg(long, global = true)]
    log_level: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Look up every parcel code listed in a file (one per line)
    Consult {
        #[arg(long)]
        input: PathBuf,
        /// Write the header and all result lines here when the job ends
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Manage the stored site cookies
    Cookies {
        #[command(subcommand)]
        cmd: CookiesCommand,
    },
}

#[derive(Subcommand, Debug)]
enum CookiesCommand {
    /// Save cookie JSON pasted as an argument
    SaveText { json: String },
    /// Import a cookie JSON file exported from the browser
    Import { path: PathBuf },
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    if let Err(err) = run(args).await {
        error!("{:#}", err);
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<()> {
    let manager = match &args.config {
        Some(path) => ConfigManager::with_path(path),
        None => ConfigManager::new()?,
    };
    let mut config = manager.initialize_on_first_run().await?;
    if let Some(level) = &args.log_level {
        config.logging.level.clone_from(level);
    }
    init_logging_with_config(&config.logging)?;
    log_system_info();

    let cookies = cookie_store(&config)?;

    match args.cmd {
        Command::Consult { input, output } => consult(&config, cookies, &input, output.as_deref()).await,
        Command::Cookies { cmd } => {
            let path = match cmd {
                CookiesCommand::SaveText { json } => cookies.save_text(&json).await?,
                CookiesCommand::Import { path } => cookies.import_file(&path).await?,
            };
            println!("{}", path.display());
            Ok(())
        }
    }
}

fn cookie_store(config: &AppConfig) -> Result<CookieStore> {
    Ok(match &config.consult.cookies_path {
        Some(path) => CookieStore::new(path),
        None => CookieStore::in_dir(ConfigManager::get_app_data_dir()?),
    })
}

async fn consult(config: &AppConfig, cookies: CookieStore, input: &Path, output: Option<&Path>) -> Result<()> {
    let text = tokio::fs::read_to_string(input)
        .await
        .with_context(|| format!("Failed to read parcel codes from {}", input.display()))?;

    let shutdown = CancellationToken::new();
    let (command_tx, command_rx) = mpsc::channel(config.runtime.engine_command_capacity.max(1));
    let (event_tx, event_rx) = mpsc::channel(config.runtime.engine_event_capacity.max(1));

    let fetcher = SigefFetcher::new(&config.consult, cookies)?;
    let worker = ConsultWorker::new(fetcher, Duration::from_millis(config.consult.request_delay_ms), event_tx);
    let worker_task = tokio::spawn(worker.run(command_rx, shutdown.clone()));

    let controller = JobController::new(WorkerHandle::new(command_tx), config.runtime.observer_capacity);
    let (runtime, handle) =
        ControllerRuntime::new(controller, event_rx, config.runtime.request_capacity, shutdown.clone());
    let runtime_task = tokio::spawn(runtime.run());

    let events = handle.subscribe();
    handle.submit(text).await?;
    info!("🚀 consultation started for {} parcel codes", handle.snapshot().total_count);
    eprintln!("commands: p = pause, r = resume, c = cancel, q = quit");

    drive(&handle, events).await;

    let snapshot = handle.snapshot();
    if let Some(path) = output {
        let mut content = output_header_line();
        content.push('\n');
        content.push_str(&snapshot.output_text());
        tokio::fs::write(path, content)
            .await
            .with_context(|| format!("Failed to write results to {}", path.display()))?;
        info!("💾 {} result lines written to {}", snapshot.output.len(), path.display());
    }
    eprintln!(
        "finished: {} ({}/{} loaded)",
        snapshot.state, snapshot.loaded_count, snapshot.total_count
    );

    handle.shutdown();
    if let Err(e) = runtime_task.await {
        warn!("controller runtime task ended abnormally: {}", e);
    }
    if let Err(e) = worker_task.await {
        warn!("consult worker task ended abnormally: {}", e);
    }
    Ok(())
}

/// Interactive input is read on a dedicated thread so a pending read never holds the runtime open
fn spawn_stdin_reader() -> mpsc::UnboundedReceiver<String> {
    let (tx, rx) = mpsc::unbounded_channel();
    std::thread::spawn(move || {
        for line in std::io::stdin().lines() {
            let Ok(line) = line else { break };
            if tx.send(line).is_err() {
                break;
            }
        }
    });
    rx
}

/// Print results as they arrive and forward stdin keys until the job ends
async fn drive(handle: &RuntimeHandle, mut events: broadcast::Receiver<ControllerEvent>) {
    let mut stdin = spawn_stdin_reader();
    let mut stdin_open = true;

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(ControllerEvent::RecordAppended { line, .. }) => println!("{line}"),
                Ok(ControllerEvent::Notice(notice)) => {
                    eprintln!("{}: {}", notice.title, notice.message);
                    if notice.kind == NoticeKind::JobFailure {
                        eprintln!("type r to retry from the failed code or c to cancel");
                    }
                }
                Ok(ControllerEvent::StateChanged { to: JobState::Completed | JobState::Idle | JobState::Cancelled, .. }) => break,
                Ok(ControllerEvent::StateChanged { to, .. }) => eprintln!("state: {to}"),
                Ok(ControllerEvent::StaleEventDiscarded { .. }) => {}
                Err(broadcast::error::RecvError::Lagged(skipped)) => warn!("observer lagged, {} events skipped", skipped),
                Err(broadcast::error::RecvError::Closed) => break,
            },
            line = stdin.recv(), if stdin_open => {
                let Some(line) = line else {
                    stdin_open = false;
                    continue;
                };
                let key = line.trim().to_lowercase();
                let result = match key.as_str() {
                    "p" => handle.pause().await,
                    "r" => handle.resume().await,
                    "c" => handle.cancel().await,
                    "q" => {
                        let _ = handle.cancel().await;
                        break;
                    }
                    "" => Ok(()),
                    other => {
                        eprintln!("unknown command: {other}");
                        Ok(())
                    }
                };
                if let Err(e) = result {
                    eprintln!("{e}");
                }
            }
            _ = tokio::signal::ctrl_c() => {
                warn!("🛑 interrupted, cancelling the job");
                let _ = handle.cancel().await;
                break;
            }
        }
    }
}
