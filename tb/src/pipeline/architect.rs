//! Decomposition generator
//!
//! Turns a task plus its complexity estimate into an ordered, unnormalized list
//! of draft steps. One model call per top-level breakdown.

use std::collections::HashSet;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info};

use super::complexity::{ComplexityEstimate, keyword_matches};
use super::error::PipelineError;
use super::json;
use super::language::Language;
use super::step::{Step, StepType, from_raw};
use crate::llm::{CompletionRequest, LlmClient, TokenUsage};
use crate::prompts::PromptLoader;

const ENGLISH_STUDY_WORDS: &[&str] = &[
    "study", "learn", "exam", "test prep", "quiz", "homework", "lecture", "chapter", "flashcard", "memorize",
    "memorise", "revise for", "revision", "practice problems", "textbook", "course",
];

const KOREAN_STUDY_WORDS: &[&str] = &[
    "공부", "복습", "예습", "시험", "학습", "암기", "강의", "단원", "문제 풀이", "수업",
];

/// True when the task reads like studying, in either language
pub fn is_learning_task(title: &str, description: Option<&str>) -> bool {
    let text = match description {
        Some(d) => format!("{} {}", title, d),
        None => title.to_string(),
    }
    .to_lowercase();

    let english = ENGLISH_STUDY_WORDS
        .iter()
        .any(|w| keyword_matches(&text, w, Language::English));
    let korean = KOREAN_STUDY_WORDS
        .iter()
        .any(|w| keyword_matches(&text, w, Language::Korean));
    english || korean
}

/// Everything the generator needs for one call
#[derive(Debug, Clone)]
pub struct DecomposeRequest<'a> {
    pub title: &'a str,
    pub description: Option<&'a str>,
    pub existing_steps: &'a [String],
    pub estimate: &'a ComplexityEstimate,
    pub language: Language,
    pub learning_mode: bool,
}

/// Unnormalized steps from one generator call
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Draft {
    pub steps: Vec<Step>,
    pub usage: TokenUsage,
    pub cost_usd: f64,
    pub model: String,
    pub learning_mode: bool,
    /// True when the steps came from the fixed template instead of the model
    pub fallback: bool,
}

impl Draft {
    /// Fixed five-step template used whenever generation fails
    pub fn fallback(language: Language, learning_mode: bool) -> Self {
        let plan: [(&str, u32, StepType); 5] = match language {
            Language::English => [
                ("Write down the very first action", 2, StepType::Mental),
                ("Do the first small piece", 10, StepType::Physical),
                ("Work through the main part", 15, StepType::Mental),
                ("Check what you have so far", 5, StepType::Mental),
                ("Finish up and note the next action", 3, StepType::Mental),
            ],
            Language::Korean => [
                ("가장 첫 행동 한 가지 적기", 2, StepType::Mental),
                ("첫 번째 작은 부분 해내기", 10, StepType::Physical),
                ("핵심 부분 진행하기", 15, StepType::Mental),
                ("지금까지 한 것 점검하기", 5, StepType::Mental),
                ("마무리하고 다음 행동 적어두기", 3, StepType::Mental),
            ],
        };

        let steps = plan
            .iter()
            .enumerate()
            .map(|(i, (title, minutes, kind))| Step::new(*title, i as u32 + 1, *minutes, *kind, 0))
            .collect();

        Self {
            steps,
            usage: TokenUsage::default(),
            cost_usd: 0.0,
            model: String::new(),
            learning_mode,
            fallback: true,
        }
    }
}

#[derive(Serialize)]
struct ArchitectContext<'a> {
    title: &'a str,
    description: Option<&'a str>,
    existing_steps: &'a [String],
    size: String,
    total_minutes: u32,
    time_scale: String,
    korean: bool,
}

/// The decomposition generator
pub struct Architect {
    llm: Arc<dyn LlmClient>,
    prompts: Arc<PromptLoader>,
    max_tokens: u32,
    temperature: f32,
}

impl Architect {
    pub fn new(llm: Arc<dyn LlmClient>, prompts: Arc<PromptLoader>, max_tokens: u32, temperature: f32) -> Self {
        Self {
            llm,
            prompts,
            max_tokens,
            temperature,
        }
    }

    /// Render the prompt pair for a request, picking the learning strategy when flagged
    pub fn build_request(&self, req: &DecomposeRequest<'_>) -> Result<CompletionRequest, PipelineError> {
        debug!(title = %req.title, learning = req.learning_mode, "build_request: called");
        let ctx = ArchitectContext {
            title: req.title,
            description: req.description,
            existing_steps: req.existing_steps,
            size: req.estimate.size.to_string(),
            total_minutes: req.estimate.total_minutes,
            time_scale: req.estimate.time_scale.to_string(),
            korean: req.language == Language::Korean,
        };

        let system_template = if req.learning_mode {
            "architect-learning-system"
        } else {
            "architect-system"
        };
        let system = self.prompts.render(system_template, &ctx).map_err(PipelineError::template)?;
        let user = self.prompts.render("architect-user", &ctx).map_err(PipelineError::template)?;

        Ok(CompletionRequest::new(system, user, self.max_tokens).with_temperature(self.temperature))
    }

    /// Generate draft steps; errors are left to the caller's fallback
    pub async fn decompose(&self, req: &DecomposeRequest<'_>) -> Result<Draft, PipelineError> {
        debug!(title = %req.title, size = %req.estimate.size, "decompose: called");
        let request = self.build_request(req)?;
        let response = self.llm.complete(request).await?;

        let content = response
            .content
            .ok_or_else(|| PipelineError::MalformedResponse("empty decomposition response".to_string()))?;
        let steps = parse_draft(&content, req.existing_steps)?;

        let cost_usd = response.usage.cost_usd(&response.model);
        info!(
            step_count = steps.len(),
            input_tokens = response.usage.input_tokens,
            output_tokens = response.usage.output_tokens,
            cost_usd,
            "decompose: generated"
        );

        Ok(Draft {
            steps,
            usage: response.usage,
            cost_usd,
            model: response.model,
            learning_mode: req.learning_mode,
            fallback: false,
        })
    }
}

/// Parse model text into top-level steps, dropping titles that already exist
///
/// Zero usable steps is a malformed response.
pub fn parse_draft(content: &str, existing_steps: &[String]) -> Result<Vec<Step>, PipelineError> {
    let raw = json::parse_steps(content)?;
    let steps = drop_existing(from_raw(raw, 0), existing_steps);
    if steps.is_empty() {
        return Err(PipelineError::MalformedResponse("no usable steps".to_string()));
    }
    Ok(steps)
}

/// Remove steps whose title (trimmed, case-insensitive) is already present, renumbering the rest
pub fn drop_existing(steps: Vec<Step>, existing_steps: &[String]) -> Vec<Step> {
    if existing_steps.is_empty() {
        return steps;
    }
    let seen: HashSet<String> = existing_steps.iter().map(|t| t.trim().to_lowercase()).collect();
    steps
        .into_iter()
        .filter(|s| {
            let keep = !seen.contains(&s.title.trim().to_lowercase());
            if !keep {
                debug!(title = %s.title, "drop_existing: duplicate dropped");
            }
            keep
        })
        .enumerate()
        .map(|(i, mut s)| {
            s.order = i as u32 + 1;
            s
        })
        .collect()
}
