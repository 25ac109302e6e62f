//! Step tree types and the single boundary where model output becomes a Step

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Steps longer than this many minutes are composite and eligible for refinement
pub const ATOMIC_MINUTES: u32 = 10;

/// Duration assumed when the model omits one
pub const DEFAULT_STEP_MINUTES: u32 = 5;

/// Longest duration accepted for a single step from the model: one week
pub const MAX_STEP_MINUTES: u32 = 7 * 24 * 60;

/// Kind of effort a step takes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepType {
    Physical,
    #[default]
    Mental,
    Creative,
}

impl StepType {
    /// Lenient parse; anything unrecognized is mental work
    pub fn parse_lenient(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "physical" | "action" | "body" => StepType::Physical,
            "creative" | "create" => StepType::Creative,
            _ => StepType::Mental,
        }
    }
}

impl std::fmt::Display for StepType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StepType::Physical => write!(f, "physical"),
            StepType::Mental => write!(f, "mental"),
            StepType::Creative => write!(f, "creative"),
        }
    }
}

/// Approval state of a step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    #[default]
    Draft,
    Active,
}

/// One node of the step tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Step {
    pub title: String,

    /// 1-based position among siblings
    pub order: u32,

    pub estimated_minutes: u32,

    pub step_type: StepType,

    #[serde(default)]
    pub status: StepStatus,

    /// True iff `estimated_minutes > ATOMIC_MINUTES` when the duration was last set
    pub is_composite: bool,

    /// 0 for top-level steps
    #[serde(default)]
    pub depth: u32,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<Step>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strategy_tag: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interaction_type: Option<String>,
}

impl Step {
    /// Create a draft step; minutes are floored at 1
    pub fn new(title: impl Into<String>, order: u32, minutes: u32, step_type: StepType, depth: u32) -> Self {
        let estimated_minutes = minutes.max(1);
        Self {
            title: title.into(),
            order,
            estimated_minutes,
            step_type,
            status: StepStatus::Draft,
            is_composite: estimated_minutes > ATOMIC_MINUTES,
            depth,
            children: Vec::new(),
            strategy_tag: None,
            interaction_type: None,
        }
    }

    /// Assign a duration and recompute compositeness
    pub fn set_minutes(&mut self, minutes: u32) {
        self.estimated_minutes = minutes.max(1);
        self.is_composite = self.estimated_minutes > ATOMIC_MINUTES;
    }

    /// Mark this step and all descendants active
    pub fn approve(&mut self) {
        self.status = StepStatus::Active;
        for child in &mut self.children {
            child.approve();
        }
    }

    /// Deepest depth in this subtree
    pub fn max_depth(&self) -> u32 {
        self.children
            .iter()
            .map(Step::max_depth)
            .max()
            .unwrap_or(self.depth)
            .max(self.depth)
    }

    /// Number of nodes in this subtree, including self
    pub fn node_count(&self) -> usize {
        1 + self.children.iter().map(Step::node_count).sum::<usize>()
    }

    /// Walk a 1-based order path (e.g. `[2, 1]`) down the tree
    pub fn find_path_mut<'a>(steps: &'a mut [Step], path: &[u32]) -> Option<&'a mut Step> {
        let (first, rest) = path.split_first()?;
        let step = steps.iter_mut().find(|s| s.order == *first)?;
        if rest.is_empty() {
            Some(step)
        } else {
            Step::find_path_mut(&mut step.children, rest)
        }
    }
}

/// Sum of the top-level durations in a slice, saturating at `u32::MAX`
pub fn total_minutes(steps: &[Step]) -> u32 {
    steps.iter().fold(0u32, |acc, s| acc.saturating_add(s.estimated_minutes))
}

/// Step as the model sends it: field names vary by prompt and provider
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawStep {
    #[serde(default, alias = "name", alias = "task", alias = "step")]
    pub title: Option<String>,

    #[serde(default, alias = "step_number", alias = "stepNumber", alias = "index")]
    pub order: Option<serde_json::Value>,

    #[serde(
        default,
        alias = "estimatedMinutes",
        alias = "duration",
        alias = "minutes",
        alias = "duration_minutes",
        alias = "durationMinutes",
        alias = "estimated_duration"
    )]
    pub estimated_minutes: Option<serde_json::Value>,

    #[serde(default, alias = "stepType", alias = "type", alias = "kind")]
    pub step_type: Option<String>,

    #[serde(default, alias = "strategyTag", alias = "strategy")]
    pub strategy_tag: Option<String>,

    #[serde(default, alias = "interactionType", alias = "interaction")]
    pub interaction_type: Option<String>,
}

impl RawStep {
    /// Convert into a canonical draft Step at `depth`
    ///
    /// Returns None when the title is missing or blank. `position` is the
    /// 1-based fallback order when the model gives none.
    pub fn into_step(self, position: u32, depth: u32) -> Option<Step> {
        let title = self.title.map(|t| t.trim().to_string()).filter(|t| !t.is_empty())?;
        let minutes = self
            .estimated_minutes
            .as_ref()
            .and_then(coerce_minutes)
            .map(|m| m.min(MAX_STEP_MINUTES))
            .unwrap_or(DEFAULT_STEP_MINUTES);
        debug!(%title, minutes, depth, "RawStep::into_step: called");

        let mut step = Step::new(
            title,
            position,
            minutes,
            self.step_type.as_deref().map(StepType::parse_lenient).unwrap_or_default(),
            depth,
        );
        step.strategy_tag = self.strategy_tag.filter(|s| !s.trim().is_empty());
        step.interaction_type = self.interaction_type.filter(|s| !s.trim().is_empty());
        Some(step)
    }
}

/// Accept 12, 12.6, "12" or "12 min"
fn coerce_minutes(value: &serde_json::Value) -> Option<u32> {
    match value {
        serde_json::Value::Number(n) => n
            .as_u64()
            .map(|v| v.min(u32::MAX as u64) as u32)
            .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f.round() as u32)),
        serde_json::Value::String(s) => {
            let digits: String = s.trim().chars().take_while(|c| c.is_ascii_digit()).collect();
            digits.parse::<u64>().ok().map(|v| v.min(u32::MAX as u64) as u32)
        }
        _ => None,
    }
}

/// Convert raw model steps into canonical siblings, renumbering orders 1..n
pub fn from_raw(raw: Vec<RawStep>, depth: u32) -> Vec<Step> {
    raw.into_iter()
        .filter_map(|r| r.into_step(0, depth))
        .enumerate()
        .map(|(i, mut s)| {
            s.order = i as u32 + 1;
            s
        })
        .collect()
}
