//! CLI command definitions and terminal rendering

use std::fmt::Write;
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use colored::Colorize;
use tracing::debug;

use crate::config::RefinementMode;
use crate::pipeline::{Breakdown, ComplexityEstimate, Step};
use crate::store::{Task, format_path};

/// TaskBreaker - adaptive task decomposition
#[derive(Parser)]
#[command(
    name = "tb",
    about = "Break a task into time-boxed, startable steps",
    version = env!("CARGO_PKG_VERSION"),
)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true, help = "Path to config file")]
    pub config: Option<PathBuf>,

    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[arg(short = 'l', long = "log-level", global = true)]
    pub log_level: Option<String>,

    /// Shorthand for --log-level DEBUG
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Estimate the size and duration of a task
    Classify {
        title: String,

        #[arg(short, long)]
        description: Option<String>,

        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },

    /// Break a task into steps
    Breakdown {
        title: String,

        #[arg(short, long)]
        description: Option<String>,

        /// Steps the user already has; these are not generated again
        #[arg(short, long = "existing", value_name = "STEP")]
        existing: Vec<String>,

        /// Refine composite steps now (eager) or on demand (deferred)
        #[arg(short, long)]
        mode: Option<RefinementMode>,

        /// Save the result as a draft task
        #[arg(short, long)]
        save: bool,

        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },

    /// Break a task into steps, printing stream events as JSON lines
    Stream {
        title: String,

        #[arg(short, long)]
        description: Option<String>,
    },

    /// Split one step of a saved task into smaller steps
    Refine {
        /// Task ID
        #[arg(short, long)]
        task: String,

        /// Step path such as 2 or 2.1
        #[arg(short, long)]
        step: String,

        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },

    /// Activate every draft step of a saved task
    Approve {
        /// Task ID
        id: String,
    },

    /// Show a saved task
    Show {
        /// Task ID
        id: String,

        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        debug!(%s, "OutputFormat::from_str: called");
        match s.to_lowercase().as_str() {
            "text" | "plain" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            _ => Err(format!("Unknown format: {}. Use: text or json", s)),
        }
    }
}

pub fn render_estimate(estimate: &ComplexityEstimate) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{} {} ({} minutes, in {})",
        "Size:".bold(),
        estimate.size.to_string().yellow().bold(),
        estimate.total_minutes,
        estimate.time_scale
    );
    let rule = estimate.rule_size.map(|s| s.to_string()).unwrap_or_else(|| "-".to_string());
    let _ = writeln!(out, "  rule: {}  model: {}", rule, estimate.model_size);
    if !estimate.reasoning.is_empty() {
        let _ = writeln!(out, "  {}", estimate.reasoning.dimmed());
    }
    out
}

/// Indented step tree, children numbered by their path
pub fn render_steps(steps: &[Step]) -> String {
    let mut out = String::new();
    write_steps(&mut out, steps, &[]);
    out
}

fn write_steps(out: &mut String, steps: &[Step], parent: &[u32]) {
    for step in steps {
        let mut path = parent.to_vec();
        path.push(step.order);
        let indent = "  ".repeat(path.len());

        let mut line = format!(
            "{}{} {} ({} min, {})",
            indent,
            format!("{}.", format_path(&path)).cyan(),
            step.title,
            step.estimated_minutes,
            step.step_type
        );
        if let Some(tag) = &step.strategy_tag {
            line.push_str(&format!(" [{}]", tag.magenta()));
        }
        if step.is_composite && step.children.is_empty() {
            line.push_str(&format!(" {}", "+".yellow()));
        }
        let _ = writeln!(out, "{}", line);
        write_steps(out, &step.children, &path);
    }
}

pub fn render_breakdown(breakdown: &Breakdown) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{}  [{} · {} min · {}]",
        breakdown.title.bold(),
        breakdown.complexity.size.to_string().yellow(),
        breakdown.final_minutes,
        breakdown.language
    );
    if breakdown.fallback {
        let _ = writeln!(out, "{}", "Model unavailable; showing a starter template.".dimmed());
    }
    if let Some(v) = &breakdown.verification
        && !v.is_valid
    {
        let _ = writeln!(out, "{}", "Verifier corrected the first draft.".dimmed());
    }
    if breakdown.was_normalized {
        let _ = writeln!(
            out,
            "{}",
            format!(
                "Durations rescaled from {} to {} minutes.",
                breakdown.original_minutes, breakdown.final_minutes
            )
            .dimmed()
        );
    }
    out.push_str(&render_steps(&breakdown.steps));
    out
}

pub fn render_task(task: &Task) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{}  {}", task.title.bold(), task.id.to_string().dimmed());
    let _ = writeln!(
        out,
        "  status: {}  total: {} min in {} steps  created: {}",
        format!("{:?}", task.status).to_lowercase().green(),
        task.total_minutes(),
        task.steps.iter().map(Step::node_count).sum::<usize>(),
        task.created_at.format("%Y-%m-%d %H:%M")
    );
    out.push_str(&render_steps(&task.steps));
    out
}
