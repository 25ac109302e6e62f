//! Complexity classification
//!
//! Two independent opinions on how big a task is: a deterministic keyword
//! matcher and a fast model call. They are merged pessimistically, so the
//! larger size always wins.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::error::PipelineError;
use super::json;
use super::language::Language;
use crate::llm::{CompletionRequest, LlmClient};
use crate::prompts::PromptLoader;

/// Reasoning recorded when the model path could not produce a verdict
pub const FALLBACK_REASONING: &str = "Classifier unavailable; assuming a medium task.";

/// Coarse task size, ordered S < M < L < XL
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Size {
    S,
    M,
    L,
    XL,
}

impl Size {
    pub const ALL: [Size; 4] = [Size::S, Size::M, Size::L, Size::XL];

    /// Midpoint of the size's duration band, before overhead
    pub fn midpoint_minutes(&self) -> u32 {
        match self {
            Size::S => 10,
            Size::M => 30,
            Size::L => 120,
            Size::XL => 300,
        }
    }

    pub fn time_scale(&self) -> TimeScale {
        match self {
            Size::S | Size::M => TimeScale::Minutes,
            Size::L | Size::XL => TimeScale::Hours,
        }
    }

    /// Accepts "S", "small", "x-large" and similar spellings
    pub fn parse_lenient(s: &str) -> Option<Size> {
        match s.trim().to_lowercase().replace(['-', '_', ' '], "").as_str() {
            "s" | "small" => Some(Size::S),
            "m" | "medium" => Some(Size::M),
            "l" | "large" => Some(Size::L),
            "xl" | "xlarge" | "extralarge" => Some(Size::XL),
            _ => None,
        }
    }
}

impl std::fmt::Display for Size {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Size::S => "S",
            Size::M => "M",
            Size::L => "L",
            Size::XL => "XL",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeScale {
    Minutes,
    Hours,
}

impl std::fmt::Display for TimeScale {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TimeScale::Minutes => write!(f, "minutes"),
            TimeScale::Hours => write!(f, "hours"),
        }
    }
}

/// Merged size estimate for one task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComplexityEstimate {
    pub size: Size,
    pub total_minutes: u32,
    pub time_scale: TimeScale,
    /// None when no keyword matched
    pub rule_size: Option<Size>,
    pub model_size: Size,
    pub reasoning: String,
    pub implied_duration_minutes: Option<u32>,
}

impl ComplexityEstimate {
    /// Build an estimate from both opinions
    pub fn from_parts(rule_size: Option<Size>, verdict: ModelVerdict, overhead_factor: f64) -> Self {
        let size = merge(rule_size, verdict.size);
        Self {
            size,
            total_minutes: estimate_minutes(size, overhead_factor),
            time_scale: size.time_scale(),
            rule_size,
            model_size: verdict.size,
            reasoning: verdict.reasoning,
            implied_duration_minutes: verdict.implied_duration_minutes,
        }
    }
}

/// What the classifier model said (or the fallback)
#[derive(Debug, Clone, PartialEq)]
pub struct ModelVerdict {
    pub size: Size,
    pub reasoning: String,
    pub implied_duration_minutes: Option<u32>,
}

impl ModelVerdict {
    pub fn fallback() -> Self {
        Self {
            size: Size::M,
            reasoning: FALLBACK_REASONING.to_string(),
            implied_duration_minutes: None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawVerdict {
    size: String,
    #[serde(default)]
    reasoning: String,
    #[serde(default, alias = "impliedDurationMinutes")]
    implied_duration_minutes: Option<f64>,
}

/// Pessimistic merge: the larger size wins, a missing rule counts as S
pub fn merge(rule: Option<Size>, model: Size) -> Size {
    rule.unwrap_or(Size::S).max(model)
}

/// Size midpoint times the overhead factor, rounded to the nearest minute
pub fn estimate_minutes(size: Size, overhead_factor: f64) -> u32 {
    (size.midpoint_minutes() as f64 * overhead_factor).round().max(1.0) as u32
}

type KeywordTable = &'static [(Size, &'static [&'static str])];

const ENGLISH_KEYWORDS: KeywordTable = &[
    (
        Size::S,
        &[
            "email", "call", "text", "reply", "send", "pay", "book", "buy", "order", "message", "remind", "sign",
            "water the", "take out",
        ],
    ),
    (
        Size::M,
        &[
            "clean", "cook", "laundry", "grocer", "tidy", "organize", "organise", "fix", "update", "draft", "review",
            "practice", "homework",
        ],
    ),
    (
        Size::L,
        &[
            "research", "plan", "report", "presentation", "essay", "assemble", "install", "taxes", "budget",
            "interview", "deep clean", "declutter", "study for",
        ],
    ),
    (
        Size::XL,
        &[
            "build", "website", "thesis", "dissertation", "renovat", "move house", "moving out", "launch",
            "portfolio", "novel", "wedding", "migrate",
        ],
    ),
];

const KOREAN_KEYWORDS: KeywordTable = &[
    (Size::S, &["전화", "문자", "이메일", "메일", "답장", "송금", "예약", "결제", "보내기"]),
    (Size::M, &["청소", "빨래", "장보기", "요리", "정리", "복습", "숙제", "연습"]),
    (Size::L, &["보고서", "발표", "리포트", "조사", "연구", "계획", "시험 공부", "에세이", "과제"]),
    (Size::XL, &["웹사이트", "홈페이지", "개발", "논문", "이사", "리모델링", "창업", "포트폴리오"]),
];

fn keyword_table(language: Language) -> KeywordTable {
    match language {
        Language::English => ENGLISH_KEYWORDS,
        Language::Korean => KOREAN_KEYWORDS,
    }
}

/// English keywords must start a word; Korean ones match anywhere
pub(crate) fn keyword_matches(text: &str, keyword: &str, language: Language) -> bool {
    match language {
        Language::Korean => text.contains(keyword),
        Language::English => text.match_indices(keyword).any(|(idx, _)| {
            text[..idx]
                .chars()
                .next_back()
                .is_none_or(|prev| !prev.is_alphanumeric())
        }),
    }
}

/// Largest size whose keyword set matches, if any
pub fn rule_size(title: &str, description: Option<&str>, language: Language) -> Option<Size> {
    let text = match description {
        Some(d) => format!("{} {}", title, d),
        None => title.to_string(),
    }
    .to_lowercase();

    let matched = keyword_table(language)
        .iter()
        .filter(|(_, keywords)| keywords.iter().any(|k| keyword_matches(&text, k, language)))
        .map(|(size, _)| *size)
        .max();
    debug!(?matched, %language, "rule_size: matched");
    matched
}

/// Classifier combining the keyword rule and the model
pub struct ComplexityClassifier {
    llm: Arc<dyn LlmClient>,
    prompts: Arc<PromptLoader>,
    model: Option<String>,
    overhead_factor: f64,
}

impl ComplexityClassifier {
    pub fn new(llm: Arc<dyn LlmClient>, prompts: Arc<PromptLoader>, model: Option<String>, overhead_factor: f64) -> Self {
        Self {
            llm,
            prompts,
            model,
            overhead_factor,
        }
    }

    /// Estimate size and total duration; never fails
    pub async fn classify(&self, title: &str, description: Option<&str>) -> ComplexityEstimate {
        debug!(%title, has_description = description.is_some(), "classify: called");
        let language = Language::detect_task(title, description);
        let rule = rule_size(title, description, language);

        let verdict = match self.ask_model(title, description).await {
            Ok(v) => v,
            Err(e) => {
                warn!(error = %e, "classify: model path failed, assuming M");
                ModelVerdict::fallback()
            }
        };

        let estimate = ComplexityEstimate::from_parts(rule, verdict, self.overhead_factor);
        info!(
            size = %estimate.size,
            rule = ?estimate.rule_size,
            model = %estimate.model_size,
            total_minutes = estimate.total_minutes,
            "classify: estimated"
        );
        estimate
    }

    async fn ask_model(&self, title: &str, description: Option<&str>) -> Result<ModelVerdict, PipelineError> {
        let ctx = serde_json::json!({"title": title, "description": description});
        let system = self.prompts.render("classify-system", &ctx).map_err(PipelineError::template)?;
        let user = self.prompts.render("classify-user", &ctx).map_err(PipelineError::template)?;

        let request = CompletionRequest::new(system, user, 256)
            .with_model(self.model.clone())
            .with_temperature(0.0)
            .json();
        let response = self.llm.complete(request).await?;
        let content = response
            .content
            .ok_or_else(|| PipelineError::MalformedResponse("empty classifier response".to_string()))?;

        let raw: RawVerdict = json::parse(&content)?;
        let size = Size::parse_lenient(&raw.size)
            .ok_or_else(|| PipelineError::MalformedResponse(format!("unknown size '{}'", raw.size)))?;
        debug!(%size, "ask_model: parsed verdict");

        Ok(ModelVerdict {
            size,
            reasoning: raw.reasoning,
            implied_duration_minutes: raw
                .implied_duration_minutes
                .filter(|m| m.is_finite() && *m >= 0.0)
                .map(|m| m.round() as u32),
        })
    }
}
