//! TaskBreaker - adaptive task decomposition
//!
//! CLI entry point: classify, break down, stream and manage saved tasks.

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use eyre::{Context, Result, bail, eyre};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};
use uuid::Uuid;

use taskbreaker::cli::{self, Cli, Command, OutputFormat};
use taskbreaker::config::Config;
use taskbreaker::events::{EventBus, NotifyEvent};
use taskbreaker::llm::create_client_or_offline;
use taskbreaker::pipeline::{BreakdownRequest, Pipeline, Step, StreamEvent};
use taskbreaker::prompts::PromptLoader;
use taskbreaker::store::{JsonlTaskStore, Task, TaskStore, format_path, parse_path};

fn setup_logging(log_level: Option<&str>, verbose: bool) -> Result<()> {
    let log_dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("taskbreaker")
        .join("logs");

    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    let level = match (verbose, log_level.map(str::to_uppercase)) {
        (true, _) => tracing::Level::DEBUG,
        (false, None) => tracing::Level::INFO,
        (false, Some(s)) => match s.as_str() {
            "TRACE" => tracing::Level::TRACE,
            "DEBUG" => tracing::Level::DEBUG,
            "INFO" => tracing::Level::INFO,
            "WARN" | "WARNING" => tracing::Level::WARN,
            "ERROR" => tracing::Level::ERROR,
            _ => {
                eprintln!("Warning: Unknown log-level '{}', defaulting to INFO", s);
                tracing::Level::INFO
            }
        },
    };

    let log_file = fs::File::create(log_dir.join("taskbreaker.log")).context("Failed to create log file")?;

    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_ansi(false)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    info!("Logging initialized (level: {:?})", level);
    Ok(())
}

/// Everything a command needs, built once from config
struct App {
    pipeline: Pipeline,
    store: JsonlTaskStore,
    bus: EventBus,
}

impl App {
    fn new(config: Config) -> Result<Self> {
        let cwd = std::env::current_dir().context("Failed to read current directory")?;
        let llm = create_client_or_offline(&config.llm).context("Failed to create LLM client")?;
        let prompts = Arc::new(PromptLoader::new(cwd));
        Ok(Self {
            pipeline: Pipeline::new(llm, prompts, config.pipeline),
            store: JsonlTaskStore::new(config.storage.store_dir),
            bus: EventBus::with_default_capacity(),
        })
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.log_level.as_deref(), cli.verbose).context("Failed to setup logging")?;

    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;
    info!(provider = %config.llm.provider, model = %config.llm.model, "main: config loaded");

    let app = App::new(config)?;
    let notifications = app.bus.subscribe();

    debug!(command = ?cli.command, "main: dispatching command");
    let result = match cli.command {
        Command::Classify {
            title,
            description,
            format,
        } => cmd_classify(&app, &title, description.as_deref(), format).await,
        Command::Breakdown {
            title,
            description,
            existing,
            mode,
            save,
            format,
        } => {
            let mut req = BreakdownRequest::new(title).with_description(description);
            req.existing_steps = existing;
            if let Some(mode) = mode {
                req = req.with_mode(mode);
            }
            cmd_breakdown(&app, req, save, format).await
        }
        Command::Stream { title, description } => {
            cmd_stream(&app, BreakdownRequest::new(title).with_description(description)).await
        }
        Command::Refine { task, step, format } => cmd_refine(&app, &task, &step, format).await,
        Command::Approve { id } => cmd_approve(&app, &id).await,
        Command::Show { id, format } => cmd_show(&app, &id, format).await,
    };

    log_notifications(notifications);
    result
}

/// Drain whatever the command emitted into the log
fn log_notifications(mut rx: broadcast::Receiver<NotifyEvent>) {
    while let Ok(event) = rx.try_recv() {
        match serde_json::to_string(&event) {
            Ok(json) => info!(event_type = event.event_type(), %json, "notification"),
            Err(e) => warn!(error = %e, "log_notifications: failed to serialize event"),
        }
    }
}

fn parse_task_id(id: &str) -> Result<Uuid> {
    Uuid::parse_str(id.trim()).context(format!("Invalid task id '{}'", id))
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn cmd_classify(app: &App, title: &str, description: Option<&str>, format: OutputFormat) -> Result<()> {
    debug!(%title, "cmd_classify: called");
    let estimate = app.pipeline.classify(title, description).await;
    match format {
        OutputFormat::Json => print_json(&estimate),
        OutputFormat::Text => {
            print!("{}", cli::render_estimate(&estimate));
            Ok(())
        }
    }
}

async fn cmd_breakdown(app: &App, req: BreakdownRequest, save: bool, format: OutputFormat) -> Result<()> {
    debug!(title = %req.title, save, "cmd_breakdown: called");
    let breakdown = app.pipeline.breakdown(req).await;

    let saved = if save {
        let task = Task::from_breakdown(&breakdown);
        app.store.save(&task).await.context("Failed to save task")?;
        app.bus.emitter_for(task.id.to_string()).breakdown_ready(
            &task.title,
            task.steps.len(),
            task.total_minutes(),
            task.fallback,
        );
        Some(task.id)
    } else {
        None
    };

    match format {
        OutputFormat::Json => match saved {
            Some(id) => print_json(&serde_json::json!({ "taskId": id, "breakdown": breakdown })),
            None => print_json(&breakdown),
        },
        OutputFormat::Text => {
            print!("{}", cli::render_breakdown(&breakdown));
            if let Some(id) = saved {
                println!("Saved draft task {}", id);
            }
            Ok(())
        }
    }
}

async fn cmd_stream(app: &App, req: BreakdownRequest) -> Result<()> {
    debug!(title = %req.title, "cmd_stream: called");
    let (tx, mut rx) = mpsc::channel::<StreamEvent>(64);

    let printer = async {
        let mut failure = None;
        while let Some(event) = rx.recv().await {
            if let StreamEvent::Error(f) = &event {
                failure = Some(f.code.clone());
            }
            match serde_json::to_string(&event) {
                Ok(line) => println!("{}", line),
                Err(e) => warn!(error = %e, "cmd_stream: failed to serialize event"),
            }
        }
        failure
    };

    let ((), failure) = tokio::join!(app.pipeline.stream_decompose(req, tx), printer);
    match failure {
        Some(code) => Err(eyre!("stream ended with error: {}", code)),
        None => Ok(()),
    }
}

async fn cmd_refine(app: &App, task_id: &str, step_path: &str, format: OutputFormat) -> Result<()> {
    debug!(%task_id, %step_path, "cmd_refine: called");
    let id = parse_task_id(task_id)?;
    let Some(path) = parse_path(step_path) else {
        bail!("Invalid step path '{}'; use positions like 2 or 2.1", step_path);
    };

    let mut task = app.store.load(id).await?;
    let step: Step = task
        .step_at(&path)
        .cloned()
        .ok_or_else(|| eyre!("Task {} has no step {}", id, format_path(&path)))?;

    let children = app.pipeline.refine_deferred(&step, &task.title).await;
    if children.is_empty() {
        println!(
            "Step {} ({}, {} min) was not split further.",
            format_path(&path),
            step.title,
            step.estimated_minutes
        );
        return Ok(());
    }

    let count = children.len();
    let task = app.store.replace_children(id, &path, children).await?;
    app.bus.emitter_for(id.to_string()).step_refined(&path, count);
    info!(%id, path = %format_path(&path), count, "cmd_refine: step refined");

    match format {
        OutputFormat::Json => print_json(&task),
        OutputFormat::Text => {
            print!("{}", cli::render_task(&task));
            Ok(())
        }
    }
}

async fn cmd_approve(app: &App, task_id: &str) -> Result<()> {
    debug!(%task_id, "cmd_approve: called");
    let id = parse_task_id(task_id)?;
    let task = app.store.approve(id).await?;
    app.bus
        .emitter_for(id.to_string())
        .breakdown_approved(task.steps.len());
    println!("Approved {} ({} steps)", task.title, task.steps.len());
    Ok(())
}

async fn cmd_show(app: &App, task_id: &str, format: OutputFormat) -> Result<()> {
    debug!(%task_id, "cmd_show: called");
    let id = parse_task_id(task_id)?;
    let task = app.store.load(id).await?;
    match format {
        OutputFormat::Json => print_json(&task),
        OutputFormat::Text => {
            print!("{}", cli::render_task(&task));
            Ok(())
        }
    }
}
