//! Recursive refinement ("deep dive")
//!
//! Splits a composite step into exactly three children and recurses into any
//! child still over the atomicity threshold, bounded by an explicit depth cap.

use std::sync::Arc;

use futures::FutureExt;
use futures::future::{BoxFuture, join_all};
use serde::Serialize;
use tracing::{debug, info, warn};

use super::error::PipelineError;
use super::json;
use super::language::Language;
use super::normalize::normalize;
use super::step::{ATOMIC_MINUTES, Step, from_raw};
use crate::llm::{CompletionRequest, LlmClient};
use crate::prompts::PromptLoader;

/// Children produced per refinement
pub const REFINE_FANOUT: usize = 3;

/// Why a refinement produced no children
#[derive(Debug)]
pub enum RefineStop {
    /// Step is already small enough
    Atomic,
    /// Depth cap reached
    Exhausted,
    Failed(PipelineError),
}

impl From<PipelineError> for RefineStop {
    fn from(err: PipelineError) -> Self {
        RefineStop::Failed(err)
    }
}

#[derive(Serialize)]
struct RefineContext<'a> {
    title: &'a str,
    duration: u32,
    parent_title: &'a str,
    korean: bool,
}

pub struct Refiner {
    llm: Arc<dyn LlmClient>,
    prompts: Arc<PromptLoader>,
    model: Option<String>,
    tolerance: f64,
    temperature: f32,
}

impl Refiner {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        prompts: Arc<PromptLoader>,
        model: Option<String>,
        tolerance: f64,
        temperature: f32,
    ) -> Self {
        Self {
            llm,
            prompts,
            model,
            tolerance,
            temperature,
        }
    }

    /// Children for a step at `depth`: exactly three at `depth + 1`, or none
    ///
    /// Children over the threshold are refined in turn until `max_depth`.
    pub fn refine<'a>(
        &'a self,
        title: &'a str,
        minutes: u32,
        parent_title: &'a str,
        depth: u32,
        max_depth: u32,
    ) -> BoxFuture<'a, Vec<Step>> {
        async move {
            debug!(%title, minutes, depth, max_depth, "refine: called");
            match self.try_refine(title, minutes, parent_title, depth, max_depth).await {
                Ok(children) => children,
                Err(RefineStop::Atomic) => {
                    debug!(%title, "refine: atomic");
                    Vec::new()
                }
                Err(RefineStop::Exhausted) => {
                    debug!(%title, depth, "refine: depth cap reached");
                    Vec::new()
                }
                Err(RefineStop::Failed(e)) => {
                    warn!(%title, error = %e, "refine: failed, leaving step unexpanded");
                    Vec::new()
                }
            }
        }
        .boxed()
    }

    async fn try_refine(
        &self,
        title: &str,
        minutes: u32,
        parent_title: &str,
        depth: u32,
        max_depth: u32,
    ) -> Result<Vec<Step>, RefineStop> {
        if minutes <= ATOMIC_MINUTES {
            return Err(RefineStop::Atomic);
        }
        if depth + 1 > max_depth {
            return Err(RefineStop::Exhausted);
        }

        let mut children = self.generate(title, minutes, parent_title, depth + 1).await?;
        if children.len() < REFINE_FANOUT {
            return Err(PipelineError::MalformedResponse(format!(
                "expected {} children, got {}",
                REFINE_FANOUT,
                children.len()
            ))
            .into());
        }
        children.truncate(REFINE_FANOUT);

        let mut children = normalize(children, minutes, self.tolerance).steps;
        for child in children.iter_mut() {
            if child.is_composite {
                child.children = self
                    .refine(&child.title, child.estimated_minutes, parent_title, child.depth, max_depth)
                    .await;
            }
        }
        info!(%title, depth, "refine: expanded into {} children", children.len());
        Ok(children)
    }

    async fn generate(
        &self,
        title: &str,
        minutes: u32,
        parent_title: &str,
        child_depth: u32,
    ) -> Result<Vec<Step>, PipelineError> {
        let ctx = RefineContext {
            title,
            duration: minutes,
            parent_title,
            korean: Language::detect_task(title, Some(parent_title)) == Language::Korean,
        };
        let system = self.prompts.render("refine-system", &ctx).map_err(PipelineError::template)?;
        let user = self.prompts.render("refine-user", &ctx).map_err(PipelineError::template)?;

        let request = CompletionRequest::new(system, user, 1024)
            .with_model(self.model.clone())
            .with_temperature(self.temperature);
        let response = self.llm.complete(request).await?;
        let content = response
            .content
            .ok_or_else(|| PipelineError::MalformedResponse("empty refinement response".to_string()))?;

        Ok(from_raw(json::parse_steps(&content)?, child_depth))
    }

    /// Refine every composite step in `steps` concurrently, keeping positions
    pub async fn refine_all(&self, mut steps: Vec<Step>, task_title: &str, max_depth: u32) -> Vec<Step> {
        debug!(count = steps.len(), max_depth, "refine_all: called");
        let results = join_all(
            steps
                .iter()
                .map(|s| self.refine(&s.title, s.estimated_minutes, task_title, s.depth, max_depth)),
        )
        .await;

        for (step, children) in steps.iter_mut().zip(results) {
            step.children = children;
        }
        steps
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::client::mock::MockLlmClient;
    use crate::llm::{CompletionRequest, LlmError};
    use proptest::prelude::*;

    const THREE: &str = r#"[{"title": "Open the file", "estimatedMinutes": 1},
                            {"title": "Write section one", "estimatedMinutes": 20},
                            {"title": "Write section two", "estimatedMinutes": 20}]"#;

    fn refiner(mock: Arc<MockLlmClient>) -> Refiner {
        Refiner::new(mock, Arc::new(PromptLoader::embedded_only()), None, 0.15, 0.4)
    }

    fn step_title(req: &CompletionRequest) -> String {
        req.user_prompt
            .lines()
            .find_map(|l| l.strip_prefix("Step to split: "))
            .unwrap_or_default()
            .to_string()
    }

    #[tokio::test]
    async fn test_atomic_step_not_refined() {
        let mock = Arc::new(MockLlmClient::with_texts(&[THREE]));
        let children = refiner(mock.clone()).refine("Reply to Sam", 10, "Inbox", 0, 3).await;
        assert!(children.is_empty());
        assert_eq!(mock.call_count(), 0);
    }

    #[tokio::test]
    async fn test_depth_cap_stops_before_calling() {
        let mock = Arc::new(MockLlmClient::with_texts(&[THREE]));
        let children = refiner(mock.clone()).refine("Write report", 45, "Report", 1, 1).await;
        assert!(children.is_empty());
        assert_eq!(mock.call_count(), 0);
    }

    #[tokio::test]
    async fn test_forty_five_minutes_depth_one() {
        let mock = Arc::new(MockLlmClient::with_texts(&[THREE]));
        let children = refiner(mock.clone()).refine("Write report", 45, "Quarterly report", 0, 1).await;

        assert_eq!(children.len(), 3);
        assert!(children.iter().all(|c| c.depth == 1));
        assert!(children.iter().all(|c| c.children.is_empty()));
        // 41 -> 45: within tolerance, left as generated
        let sum: u32 = children.iter().map(|c| c.estimated_minutes).sum();
        assert!((sum as i64 - 45).abs() as f64 / 45.0 <= 0.15);
        assert_eq!(mock.call_count(), 1);
    }

    #[tokio::test]
    async fn test_children_normalized_to_parent() {
        let mock = Arc::new(MockLlmClient::with_texts(&[
            r#"[{"title": "a", "minutes": 2}, {"title": "b", "minutes": 4}, {"title": "c", "minutes": 6}]"#,
        ]));
        let children = refiner(mock).refine("Big step", 60, "Task", 0, 1).await;
        assert_eq!(
            children.iter().map(|c| c.estimated_minutes).collect::<Vec<_>>(),
            vec![10, 20, 30]
        );
        assert!(!children[0].is_composite);
        assert!(children[2].is_composite);
    }

    #[tokio::test]
    async fn test_fewer_than_three_is_empty() {
        let mock = Arc::new(MockLlmClient::with_texts(&[r#"[{"title": "a"}, {"title": "b"}]"#]));
        assert!(refiner(mock).refine("Big step", 60, "Task", 0, 3).await.is_empty());
    }

    #[tokio::test]
    async fn test_more_than_three_truncated() {
        let mock = Arc::new(MockLlmClient::with_texts(&[
            r#"[{"title": "a", "minutes": 5}, {"title": "b", "minutes": 5}, {"title": "c", "minutes": 5}, {"title": "d", "minutes": 5}]"#,
        ]));
        let children = refiner(mock).refine("Step", 15, "Task", 0, 1).await;
        assert_eq!(children.len(), 3);
        assert_eq!(children[2].title, "c");
    }

    #[tokio::test]
    async fn test_failure_is_empty() {
        let mock = Arc::new(MockLlmClient::new(vec![Err(LlmError::Unavailable("down".to_string()))]));
        assert!(refiner(mock).refine("Step", 60, "Task", 0, 3).await.is_empty());
    }

    #[tokio::test]
    async fn test_recurses_into_composite_children() {
        let mock = Arc::new(MockLlmClient::with_handler(|_| Ok(THREE.to_string())));
        let children = refiner(mock.clone()).refine("Write report", 90, "Report", 0, 2).await;

        assert_eq!(children.len(), 3);
        // The two 20-ish minute children are composite and get their own three
        let expanded: Vec<_> = children.iter().filter(|c| !c.children.is_empty()).collect();
        assert_eq!(expanded.len(), 2);
        for c in expanded {
            assert_eq!(c.children.len(), 3);
            assert!(c.children.iter().all(|g| g.depth == 2 && g.children.is_empty()));
        }
        assert_eq!(mock.call_count(), 3);
    }

    #[tokio::test]
    async fn test_refine_all_keeps_positions() {
        let mock = Arc::new(MockLlmClient::with_handler(|req| {
            let title = step_title(req);
            Ok(format!(
                r#"[{{"title": "{t} 1", "minutes": 1}}, {{"title": "{t} 2", "minutes": 5}}, {{"title": "{t} 3", "minutes": 5}}]"#,
                t = title.split(" (").next().unwrap_or_default()
            ))
        }));
        let steps = vec![
            Step::new("First", 1, 30, crate::pipeline::step::StepType::Mental, 0),
            Step::new("Quick", 2, 5, crate::pipeline::step::StepType::Mental, 0),
            Step::new("Third", 3, 20, crate::pipeline::step::StepType::Mental, 0),
        ];

        let out = refiner(mock.clone()).refine_all(steps, "Task", 1).await;
        assert_eq!(out[0].children[0].title, "First 1");
        assert!(out[1].children.is_empty());
        assert_eq!(out[2].children[2].title, "Third 3");
        assert_eq!(mock.call_count(), 2);
    }

    fn max_depth_of(steps: &[Step]) -> u32 {
        steps.iter().map(Step::max_depth).max().unwrap_or(0)
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(24))]

        #[test]
        fn prop_recursion_bounded(minutes in 1u32..600, max_depth in 0u32..4) {
            let rt = tokio::runtime::Runtime::new().unwrap();
            let mock = Arc::new(MockLlmClient::with_handler(|_| {
                Ok(r#"[{"title": "a", "minutes": 40}, {"title": "b", "minutes": 40}, {"title": "c", "minutes": 40}]"#.to_string())
            }));
            let children = rt.block_on(refiner(mock).refine("Step", minutes, "Task", 0, max_depth));

            if minutes <= ATOMIC_MINUTES || max_depth == 0 {
                prop_assert!(children.is_empty());
            } else {
                prop_assert_eq!(children.len(), 3);
                prop_assert!(children.iter().all(|c| c.depth == 1));
            }
            prop_assert!(max_depth_of(&children) <= max_depth);

            fn check(steps: &[Step]) -> bool {
                steps.iter().all(|s| {
                    (s.children.is_empty() || (s.is_composite && s.children.len() == 3))
                        && s.children.iter().all(|c| c.depth == s.depth + 1)
                        && check(&s.children)
                })
            }
            prop_assert!(check(&children));
        }
    }
}
