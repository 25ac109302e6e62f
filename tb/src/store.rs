//! Task store collaborator
//!
//! The pipeline never persists anything itself. Callers save an accepted
//! breakdown as a draft task, approve it later, and attach children produced
//! by deferred refinement.
//!
//! The JSONL store appends one full record per write. On read the last record
//! for an id wins, so an update is just another append.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::pipeline::{Breakdown, ComplexityEstimate, Language, Step, StepStatus};

const TASKS_FILE: &str = "tasks.jsonl";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Task not found: {0}")]
    NotFound(Uuid),

    #[error("Task {task_id} has no step at path {path}")]
    StepNotFound { task_id: Uuid, path: String },

    #[error("Store I/O error: {0}")]
    Io(String),
}

impl From<eyre::Report> for StoreError {
    fn from(report: eyre::Report) -> Self {
        StoreError::Io(format!("{report:#}"))
    }
}

/// A saved breakdown
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: Uuid,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub language: Language,
    pub status: StepStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub steps: Vec<Step>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub complexity: Option<ComplexityEstimate>,
    #[serde(default)]
    pub fallback: bool,
}

impl Task {
    /// New draft task from an accepted breakdown
    pub fn from_breakdown(breakdown: &Breakdown) -> Self {
        let now = Utc::now();
        let task = Self {
            id: Uuid::now_v7(),
            title: breakdown.title.clone(),
            description: breakdown.description.clone(),
            language: breakdown.language,
            status: StepStatus::Draft,
            created_at: now,
            updated_at: now,
            steps: breakdown.steps.clone(),
            complexity: Some(breakdown.complexity.clone()),
            fallback: breakdown.fallback,
        };
        debug!(id = %task.id, title = %task.title, "Task::from_breakdown: called");
        task
    }

    pub fn total_minutes(&self) -> u32 {
        crate::pipeline::step::total_minutes(&self.steps)
    }

    /// Mark the task and every step active
    pub fn approve(&mut self) {
        self.status = StepStatus::Active;
        for step in &mut self.steps {
            step.approve();
        }
        self.updated_at = Utc::now();
    }

    pub fn step_at(&mut self, path: &[u32]) -> Option<&mut Step> {
        Step::find_path_mut(&mut self.steps, path)
    }
}

/// Render a 1-based order path as `2.1`
pub fn format_path(path: &[u32]) -> String {
    path.iter().map(u32::to_string).collect::<Vec<_>>().join(".")
}

/// Parse `2.1` (or `2/1`) into a 1-based order path
pub fn parse_path(s: &str) -> Option<Vec<u32>> {
    let path: Option<Vec<u32>> = s
        .split(['.', '/'])
        .map(|part| part.trim().parse::<u32>().ok().filter(|n| *n > 0))
        .collect();
    path.filter(|p| !p.is_empty())
}

#[async_trait]
pub trait TaskStore: Send + Sync {
    async fn save(&self, task: &Task) -> Result<(), StoreError>;

    async fn load(&self, id: Uuid) -> Result<Task, StoreError>;

    /// Move every step of the task from draft to active
    async fn approve(&self, id: Uuid) -> Result<Task, StoreError>;

    /// Attach `children` under the step at `path`, replacing any existing ones
    async fn replace_children(&self, id: Uuid, path: &[u32], children: Vec<Step>) -> Result<Task, StoreError>;
}

pub struct JsonlTaskStore {
    dir: PathBuf,
}

impl JsonlTaskStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        debug!(?dir, "JsonlTaskStore::new: called");
        Self { dir }
    }

    fn tasks_file(&self) -> PathBuf {
        self.dir.join(TASKS_FILE)
    }

    async fn append(&self, task: &Task) -> Result<()> {
        fs::create_dir_all(&self.dir)
            .await
            .context(format!("Failed to create store dir {}", self.dir.display()))?;

        let path = self.tasks_file();
        let line = serde_json::to_string(task).context("Failed to serialize task")? + "\n";
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .context(format!("Failed to open {}", path.display()))?;
        file.write_all(line.as_bytes())
            .await
            .context(format!("Failed to write {}", path.display()))?;
        file.flush().await?;
        Ok(())
    }

    /// Latest record per id
    async fn read_all(&self) -> Result<HashMap<Uuid, Task>> {
        let path = self.tasks_file();
        if !fs::try_exists(&path).await.unwrap_or(false) {
            debug!(?path, "read_all: no tasks file yet");
            return Ok(HashMap::new());
        }
        let content = fs::read_to_string(&path)
            .await
            .context(format!("Failed to read {}", path.display()))?;
        Ok(latest_records(&content, &path))
    }
}

fn latest_records(content: &str, path: &Path) -> HashMap<Uuid, Task> {
    let mut tasks = HashMap::new();
    for (lineno, line) in content.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<Task>(line) {
            Ok(task) => {
                tasks.insert(task.id, task);
            }
            Err(e) => warn!(?path, line = lineno + 1, error = %e, "latest_records: skipping bad record"),
        }
    }
    tasks
}

#[async_trait]
impl TaskStore for JsonlTaskStore {
    async fn save(&self, task: &Task) -> Result<(), StoreError> {
        debug!(id = %task.id, "JsonlTaskStore::save: called");
        self.append(task).await?;
        info!(id = %task.id, steps = task.steps.len(), "save: task written");
        Ok(())
    }

    async fn load(&self, id: Uuid) -> Result<Task, StoreError> {
        debug!(%id, "JsonlTaskStore::load: called");
        self.read_all().await?.remove(&id).ok_or(StoreError::NotFound(id))
    }

    async fn approve(&self, id: Uuid) -> Result<Task, StoreError> {
        debug!(%id, "JsonlTaskStore::approve: called");
        let mut task = self.load(id).await?;
        task.approve();
        self.save(&task).await?;
        Ok(task)
    }

    async fn replace_children(&self, id: Uuid, path: &[u32], children: Vec<Step>) -> Result<Task, StoreError> {
        debug!(%id, path = %format_path(path), count = children.len(), "JsonlTaskStore::replace_children: called");
        let mut task = self.load(id).await?;
        let step = task.step_at(path).ok_or_else(|| StoreError::StepNotFound {
            task_id: id,
            path: format_path(path),
        })?;
        step.children = children;
        task.updated_at = Utc::now();
        self.save(&task).await?;
        Ok(task)
    }
}
