//! Adaptive task decomposition pipeline
//!
//! text -> classify -> decompose -> verify (L/XL) -> normalize -> refine (eager)
//! or flag composite steps for later (deferred). Every stage has a total
//! fallback; only the stream assembler reports a terminal error.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};

pub mod architect;
pub mod complexity;
mod error;
pub mod json;
pub mod language;
pub mod normalize;
pub mod refiner;
pub mod step;
pub mod stream;
pub mod verifier;

pub use architect::{Architect, DecomposeRequest, Draft};
pub use complexity::{ComplexityClassifier, ComplexityEstimate, Size, TimeScale};
pub use error::PipelineError;
pub use language::Language;
pub use normalize::{Normalized, normalize};
pub use refiner::Refiner;
pub use step::{ATOMIC_MINUTES, MAX_STEP_MINUTES, Step, StepStatus, StepType};
pub use stream::{StepScanner, StreamEvent, StreamFailure};
pub use verifier::{Verification, Verifier, needs_verification};

use crate::config::{PipelineConfig, RefinementMode};
use crate::llm::{LlmClient, TokenUsage};
use crate::prompts::PromptLoader;

/// Input to a top-level breakdown
#[derive(Debug, Clone, Default)]
pub struct BreakdownRequest {
    pub title: String,
    pub description: Option<String>,
    /// Titles already on the task; the generator will not repeat them
    pub existing_steps: Vec<String>,
    /// Overrides the configured refinement mode
    pub mode: Option<RefinementMode>,
}

impl BreakdownRequest {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }

    pub fn with_description(mut self, description: Option<String>) -> Self {
        self.description = description.filter(|d| !d.trim().is_empty());
        self
    }

    pub fn with_mode(mut self, mode: RefinementMode) -> Self {
        self.mode = Some(mode);
        self
    }
}

/// Processed output of one breakdown
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Breakdown {
    pub title: String,
    pub description: Option<String>,
    pub language: Language,
    pub learning_mode: bool,
    pub complexity: ComplexityEstimate,
    pub steps: Vec<Step>,
    pub mode: RefinementMode,
    /// None when the size did not call for verification
    pub verification: Option<Verification>,
    pub was_normalized: bool,
    pub original_minutes: u32,
    pub final_minutes: u32,
    pub usage: TokenUsage,
    pub cost_usd: f64,
    /// True when the fixed template stood in for the generator
    pub fallback: bool,
}

/// The pipeline; owns stage components, borrows the model client
pub struct Pipeline {
    llm: Arc<dyn LlmClient>,
    classifier: ComplexityClassifier,
    architect: Architect,
    verifier: Verifier,
    refiner: Refiner,
    config: PipelineConfig,
}

impl Pipeline {
    pub fn new(llm: Arc<dyn LlmClient>, prompts: Arc<PromptLoader>, config: PipelineConfig) -> Self {
        debug!(refinement = %config.refinement, "Pipeline::new: called");
        Self {
            classifier: ComplexityClassifier::new(
                llm.clone(),
                prompts.clone(),
                config.classifier_model.clone(),
                config.overhead_factor,
            ),
            architect: Architect::new(
                llm.clone(),
                prompts.clone(),
                config.architect_max_tokens,
                config.temperature,
            ),
            verifier: Verifier::new(llm.clone(), prompts.clone(), config.verifier_model.clone()),
            refiner: Refiner::new(
                llm.clone(),
                prompts,
                config.refiner_model.clone(),
                config.tolerance,
                config.temperature,
            ),
            llm,
            config,
        }
    }

    pub async fn classify(&self, title: &str, description: Option<&str>) -> ComplexityEstimate {
        self.classifier.classify(title, description).await
    }

    /// Generate draft steps, falling back to the fixed template on any failure
    pub async fn decompose(
        &self,
        title: &str,
        description: Option<&str>,
        existing_steps: &[String],
        estimate: &ComplexityEstimate,
        language: Language,
        learning_mode: bool,
    ) -> Draft {
        let req = DecomposeRequest {
            title,
            description,
            existing_steps,
            estimate,
            language,
            learning_mode,
        };
        match self.architect.decompose(&req).await {
            Ok(draft) => draft,
            Err(e) => {
                warn!(%title, error = %e, "decompose: using fallback template");
                Draft::fallback(language, learning_mode)
            }
        }
    }

    pub async fn verify(
        &self,
        title: &str,
        description: Option<&str>,
        steps: &[Step],
        estimate: &ComplexityEstimate,
    ) -> Verification {
        self.verifier.verify(title, description, steps, estimate).await
    }

    /// Normalize with the configured tolerance
    pub fn normalize(&self, steps: Vec<Step>, target_minutes: u32) -> Normalized {
        normalize(steps, target_minutes, self.config.tolerance)
    }

    pub async fn refine(
        &self,
        step_title: &str,
        minutes: u32,
        parent_title: &str,
        depth: u32,
        max_depth: u32,
    ) -> Vec<Step> {
        self.refiner.refine(step_title, minutes, parent_title, depth, max_depth).await
    }

    /// Caller-triggered refinement of one step under the deferred depth cap
    pub async fn refine_deferred(&self, step: &Step, task_title: &str) -> Vec<Step> {
        debug!(title = %step.title, depth = step.depth, "refine_deferred: called");
        self.refine(
            &step.title,
            step.estimated_minutes,
            task_title,
            step.depth,
            self.config.max_depth(RefinementMode::Deferred),
        )
        .await
    }

    /// Run the full non-streaming breakdown
    pub async fn breakdown(&self, req: BreakdownRequest) -> Breakdown {
        let title = req.title.as_str();
        let description = req.description.as_deref();
        debug!(%title, "breakdown: called");

        let language = Language::detect_task(title, description);
        let learning_mode = architect::is_learning_task(title, description);
        let estimate = self.classify(title, description).await;
        let draft = self
            .decompose(title, description, &req.existing_steps, &estimate, language, learning_mode)
            .await;

        self.finish(&req, language, estimate, draft).await
    }

    /// Verify, normalize, and (eagerly) refine a draft
    async fn finish(
        &self,
        req: &BreakdownRequest,
        language: Language,
        estimate: ComplexityEstimate,
        draft: Draft,
    ) -> Breakdown {
        let title = req.title.as_str();
        let description = req.description.as_deref();
        let mode = req.mode.unwrap_or(self.config.refinement);

        let (steps, verification) = if needs_verification(estimate.size) {
            let verification = self.verify(title, description, &draft.steps, &estimate).await;
            (verification.clone().apply(draft.steps), Some(verification))
        } else {
            (draft.steps, None)
        };

        let normalized = self.normalize(steps, estimate.total_minutes);
        let steps = match mode {
            RefinementMode::Eager => {
                self.refiner
                    .refine_all(normalized.steps, title, self.config.max_depth(RefinementMode::Eager))
                    .await
            }
            RefinementMode::Deferred => normalized.steps,
        };

        info!(
            %title,
            size = %estimate.size,
            steps = steps.len(),
            depth = steps.iter().map(Step::max_depth).max().unwrap_or(0),
            %mode,
            fallback = draft.fallback,
            "finish: breakdown ready"
        );
        Breakdown {
            title: req.title.clone(),
            description: req.description.clone(),
            language,
            learning_mode: draft.learning_mode,
            complexity: estimate,
            steps,
            mode,
            verification,
            was_normalized: normalized.was_normalized,
            original_minutes: normalized.original_sum,
            final_minutes: normalized.final_sum,
            usage: draft.usage,
            cost_usd: draft.cost_usd,
            fallback: draft.fallback,
        }
    }
}
