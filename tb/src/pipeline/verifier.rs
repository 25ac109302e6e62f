//! Chain-of-verification for large tasks
//!
//! A second model pass audits an L/XL breakdown against its estimate and may
//! hand back corrected steps. Any failure counts as a pass.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::complexity::{ComplexityEstimate, Size};
use super::error::PipelineError;
use super::json;
use super::step::{ATOMIC_MINUTES, Step, from_raw, total_minutes};
use crate::llm::{CompletionRequest, LlmClient};
use crate::prompts::PromptLoader;

/// Only large tasks are worth a second opinion
pub fn needs_verification(size: Size) -> bool {
    matches!(size, Size::L | Size::XL)
}

/// Verdict on a breakdown
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Verification {
    pub is_valid: bool,
    pub issues: Vec<String>,
    pub corrected_steps: Option<Vec<Step>>,
    /// The check could not run; treated as passed
    pub inconclusive: bool,
}

impl Verification {
    pub fn passed() -> Self {
        Self {
            is_valid: true,
            issues: Vec::new(),
            corrected_steps: None,
            inconclusive: false,
        }
    }

    pub fn inconclusive(reason: impl Into<String>) -> Self {
        Self {
            is_valid: true,
            issues: vec![reason.into()],
            corrected_steps: None,
            inconclusive: true,
        }
    }

    /// Steps to carry forward: corrections replace the candidates wholesale
    pub fn apply(self, steps: Vec<Step>) -> Vec<Step> {
        match self.corrected_steps {
            Some(corrected) if !self.is_valid && !corrected.is_empty() => {
                info!(count = corrected.len(), "apply: using corrected steps");
                corrected
            }
            _ => steps,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawVerification {
    #[serde(alias = "is_valid", alias = "valid")]
    #[serde(rename = "isValid")]
    is_valid: bool,
    #[serde(default)]
    issues: Vec<String>,
    #[serde(default, rename = "correctedSteps", alias = "corrected_steps")]
    corrected_steps: Option<serde_json::Value>,
}

#[derive(Serialize)]
struct VerifyContext<'a> {
    title: &'a str,
    description: Option<&'a str>,
    size: String,
    time_scale: String,
    expected_minutes: u32,
    actual_minutes: u32,
    step_count: usize,
    composite_count: usize,
    steps: &'a [Step],
}

pub struct Verifier {
    llm: Arc<dyn LlmClient>,
    prompts: Arc<PromptLoader>,
    model: Option<String>,
}

impl Verifier {
    pub fn new(llm: Arc<dyn LlmClient>, prompts: Arc<PromptLoader>, model: Option<String>) -> Self {
        Self { llm, prompts, model }
    }

    /// Audit `steps`; fails open
    pub async fn verify(
        &self,
        title: &str,
        description: Option<&str>,
        steps: &[Step],
        estimate: &ComplexityEstimate,
    ) -> Verification {
        debug!(%title, size = %estimate.size, count = steps.len(), "verify: called");
        match self.try_verify(title, description, steps, estimate).await {
            Ok(v) => {
                info!(is_valid = v.is_valid, issues = v.issues.len(), "verify: done");
                v
            }
            Err(e) => {
                warn!(error = %e, "verify: inconclusive, passing breakdown through");
                Verification::inconclusive(e.to_string())
            }
        }
    }

    async fn try_verify(
        &self,
        title: &str,
        description: Option<&str>,
        steps: &[Step],
        estimate: &ComplexityEstimate,
    ) -> Result<Verification, PipelineError> {
        let ctx = VerifyContext {
            title,
            description,
            size: estimate.size.to_string(),
            time_scale: estimate.time_scale.to_string(),
            expected_minutes: estimate.total_minutes,
            actual_minutes: total_minutes(steps),
            step_count: steps.len(),
            composite_count: steps.iter().filter(|s| s.estimated_minutes > ATOMIC_MINUTES).count(),
            steps,
        };
        let system = self.prompts.render("verify-system", &ctx).map_err(PipelineError::template)?;
        let user = self.prompts.render("verify-user", &ctx).map_err(PipelineError::template)?;

        let request = CompletionRequest::new(system, user, 2048)
            .with_model(self.model.clone())
            .with_temperature(0.0)
            .json();
        let response = self.llm.complete(request).await?;
        let content = response
            .content
            .ok_or_else(|| PipelineError::MalformedResponse("empty verification response".to_string()))?;

        let raw: RawVerification = json::parse(&content)?;
        let corrected_steps = match raw.corrected_steps {
            Some(value) if !value.is_null() => {
                let steps = from_raw(json::steps_from_value(value)?, 0);
                if steps.is_empty() { None } else { Some(steps) }
            }
            _ => None,
        };
        debug!(is_valid = raw.is_valid, corrected = corrected_steps.is_some(), "try_verify: parsed");

        Ok(Verification {
            is_valid: raw.is_valid,
            issues: raw.issues,
            corrected_steps,
            inconclusive: false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::LlmError;
    use crate::llm::client::mock::MockLlmClient;
    use crate::pipeline::complexity::ModelVerdict;
    use crate::pipeline::step::StepType;

    fn estimate(size: Size) -> ComplexityEstimate {
        ComplexityEstimate::from_parts(Some(size), ModelVerdict::fallback(), 1.5)
    }

    fn verifier(mock: Arc<MockLlmClient>) -> Verifier {
        Verifier::new(mock, Arc::new(PromptLoader::embedded_only()), None)
    }

    fn candidate() -> Vec<Step> {
        vec![
            Step::new("Gather materials", 1, 30, StepType::Physical, 0),
            Step::new("Assemble frame", 2, 20, StepType::Physical, 0),
        ]
    }

    #[test]
    fn test_needs_verification() {
        assert!(!needs_verification(Size::S));
        assert!(!needs_verification(Size::M));
        assert!(needs_verification(Size::L));
        assert!(needs_verification(Size::XL));
    }

    #[tokio::test]
    async fn test_valid_breakdown() {
        let mock = Arc::new(MockLlmClient::with_texts(&[r#"{"isValid": true, "issues": []}"#]));
        let v = verifier(mock.clone()).verify("Build shelf", None, &candidate(), &estimate(Size::L)).await;

        assert!(v.is_valid);
        assert!(!v.inconclusive);
        assert_eq!(v.clone().apply(candidate()), candidate());

        let sent = &mock.requests()[0].user_prompt;
        assert!(sent.contains("Actual total: 50 minutes across 2 steps, 2 of them"));
        assert!(sent.contains("expected total: 180 minutes"));
    }

    #[tokio::test]
    async fn test_corrected_steps_replace_candidates() {
        let mock = Arc::new(MockLlmClient::with_texts(&[r#"```json
{"isValid": false, "issues": ["total far too low", "step 1 is preparation"],
 "correctedSteps": [
   {"title": "Lay out all parts on the floor", "estimatedMinutes": 15, "stepType": "physical"},
   {"title": "Screw the side panels", "estimatedMinutes": 60, "stepType": "physical"},
   {"title": "Attach shelves", "estimatedMinutes": 90, "stepType": "physical"}
 ]}
```"#]));
        let v = verifier(mock).verify("Build shelf", None, &candidate(), &estimate(Size::L)).await;

        assert!(!v.is_valid);
        assert_eq!(v.issues.len(), 2);
        let out = v.apply(candidate());
        assert_eq!(out.len(), 3);
        assert_eq!(out[2].title, "Attach shelves");
        assert!(out[2].is_composite);
    }

    #[tokio::test]
    async fn test_invalid_without_corrections_keeps_candidates() {
        let mock = Arc::new(MockLlmClient::with_texts(&[r#"{"isValid": false, "issues": ["vague"]}"#]));
        let v = verifier(mock).verify("x", None, &candidate(), &estimate(Size::XL)).await;
        assert!(!v.is_valid);
        assert_eq!(v.apply(candidate()), candidate());
    }

    #[tokio::test]
    async fn test_failure_is_inconclusive_pass() {
        let mock = Arc::new(MockLlmClient::new(vec![
            Err(LlmError::Timeout(std::time::Duration::from_secs(30))),
            Ok("not json at all".to_string()),
        ]));
        let verifier = verifier(mock);

        let v = verifier.verify("x", None, &candidate(), &estimate(Size::L)).await;
        assert!(v.is_valid && v.inconclusive);

        let v = verifier.verify("x", None, &candidate(), &estimate(Size::L)).await;
        assert!(v.is_valid && v.inconclusive);
        assert_eq!(v.apply(candidate()), candidate());
    }
}
