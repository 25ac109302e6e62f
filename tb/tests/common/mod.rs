//! Scripted completion client shared by the integration tests

#![allow(dead_code)]

use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::mpsc;

use taskbreaker::llm::{CompletionRequest, CompletionResponse, LlmClient, LlmError, StreamChunk, TokenUsage};

/// Which stage a request came from, judged by its system prompt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Classify,
    Architect,
    Verify,
    Refine,
}

impl Stage {
    pub fn of(request: &CompletionRequest) -> Self {
        let sys = &request.system_prompt;
        if sys.contains("estimate how big") {
            Stage::Classify
        } else if sys.contains("audit a task breakdown") {
            Stage::Verify
        } else if sys.contains("split one step") {
            Stage::Refine
        } else {
            Stage::Architect
        }
    }
}

type Reply = Box<dyn Fn(Stage, &CompletionRequest) -> Result<String, LlmError> + Send + Sync>;

pub struct ScriptedClient {
    reply: Reply,
    requests: Mutex<Vec<(Stage, CompletionRequest)>>,
    calls: AtomicUsize,
}

impl ScriptedClient {
    pub fn new<F>(reply: F) -> Self
    where
        F: Fn(Stage, &CompletionRequest) -> Result<String, LlmError> + Send + Sync + 'static,
    {
        Self {
            reply: Box::new(reply),
            requests: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
        }
    }

    /// Fixed reply per stage
    pub fn routed(classify: &str, architect: &str, verify: &str, refine: &str) -> Self {
        let (classify, architect, verify, refine) =
            (classify.to_string(), architect.to_string(), verify.to_string(), refine.to_string());
        Self::new(move |stage, _| {
            Ok(match stage {
                Stage::Classify => classify.clone(),
                Stage::Architect => architect.clone(),
                Stage::Verify => verify.clone(),
                Stage::Refine => refine.clone(),
            })
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn requests_for(&self, stage: Stage) -> Vec<CompletionRequest> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|(s, _)| *s == stage)
            .map(|(_, r)| r.clone())
            .collect()
    }

    fn answer(&self, request: &CompletionRequest) -> Result<CompletionResponse, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let stage = Stage::of(request);
        self.requests.lock().unwrap().push((stage, request.clone()));
        let text = (self.reply)(stage, request)?;
        let mut response = CompletionResponse::text(text, "claude-sonnet-4-20250514");
        response.usage = TokenUsage {
            input_tokens: 1_000,
            output_tokens: 500,
        };
        Ok(response)
    }
}

#[async_trait]
impl LlmClient for ScriptedClient {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        self.answer(&request)
    }

    async fn stream(
        &self,
        request: CompletionRequest,
        chunk_tx: mpsc::Sender<StreamChunk>,
    ) -> Result<CompletionResponse, LlmError> {
        let response = self.answer(&request)?;
        let text = response.content.clone().unwrap_or_default();
        let chars: Vec<char> = text.chars().collect();
        for piece in chars.chunks(11) {
            let _ = chunk_tx.send(StreamChunk::TextDelta(piece.iter().collect())).await;
        }
        Ok(response)
    }
}

pub const THREE_CHILDREN: &str = r#"[
  {"title": "Open the first box", "estimatedMinutes": 5, "stepType": "physical"},
  {"title": "Lay out the parts", "estimatedMinutes": 5, "stepType": "physical"},
  {"title": "Screw in the legs", "estimatedMinutes": 5, "stepType": "physical"}
]"#;
