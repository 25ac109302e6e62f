//! Stream assembly
//!
//! Forwards model text as it arrives, announces each step object as soon as its
//! closing brace lands, and runs the full post-processing once the stream ends.

use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::architect::{DecomposeRequest, Draft, drop_existing, is_learning_task};
use super::error::PipelineError;
use super::json;
use super::language::Language;
use super::step::{RawStep, Step, from_raw};
use super::{Breakdown, BreakdownRequest, Pipeline};
use crate::llm::{FailureKind, StreamChunk, TokenUsage};

/// Characters per synthetic delta when replaying the canned breakdown
const REPLAY_CHUNK_CHARS: usize = 24;

/// Event delivered to a streaming consumer
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "payload", rename_all = "lowercase")]
pub enum StreamEvent {
    /// Raw model text, in arrival order
    Chunk(String),
    /// A step object that just closed in the buffer
    Subtask(Step),
    /// The fully processed breakdown; always last on success
    Complete(Box<Breakdown>),
    /// Terminal failure; no `complete` follows
    Error(StreamFailure),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StreamFailure {
    pub code: String,
    pub message: String,
}

impl From<&PipelineError> for StreamFailure {
    fn from(err: &PipelineError) -> Self {
        Self {
            code: err.code().to_string(),
            message: err.to_string(),
        }
    }
}

/// Brace scanner that spots complete step objects in a growing JSON buffer
///
/// Tracks string and escape state so braces inside titles are ignored. Only
/// objects that are direct elements of the outermost array count as steps, so a
/// `{"title": ..., "steps": [...]}` wrapper or a nested object is never announced.
#[derive(Debug, Default)]
pub struct StepScanner {
    buffer: String,
    scanned: usize,
    /// Open containers as (`[` or `{`, byte offset)
    open: Vec<(char, usize)>,
    in_string: bool,
    escaped: bool,
    emitted: u32,
}

impl StepScanner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a delta and return steps whose objects closed inside it
    pub fn push(&mut self, delta: &str) -> Vec<Step> {
        self.buffer.push_str(delta);
        let mut found = Vec::new();

        let start = self.scanned;
        for (offset, c) in self.buffer[start..].char_indices() {
            let idx = start + offset;
            if self.in_string {
                if self.escaped {
                    self.escaped = false;
                } else if c == '\\' {
                    self.escaped = true;
                } else if c == '"' {
                    self.in_string = false;
                }
                continue;
            }
            match c {
                '"' => self.in_string = true,
                '[' | '{' => self.open.push((c, idx)),
                ']' => {
                    if let Some(('[', _)) = self.open.last() {
                        self.open.pop();
                    }
                }
                '}' => {
                    let Some(('{', open)) = self.open.last().copied() else {
                        continue;
                    };
                    self.open.pop();
                    if self.in_step_array()
                        && let Ok(raw) = serde_json::from_str::<RawStep>(&self.buffer[open..=idx])
                        && let Some(step) = raw.into_step(self.emitted + 1, 0)
                    {
                        self.emitted += 1;
                        debug!(title = %step.title, order = step.order, "StepScanner::push: step closed");
                        found.push(step);
                    }
                }
                _ => {}
            }
        }
        self.scanned = self.buffer.len();
        found
    }

    /// True when the innermost open container is the first array opened
    fn in_step_array(&self) -> bool {
        matches!(self.open.last(), Some(('[', _))) && self.open.iter().filter(|(c, _)| *c == '[').count() == 1
    }

    pub fn buffer(&self) -> &str {
        &self.buffer
    }

    /// Number of steps announced so far
    pub fn emitted(&self) -> u32 {
        self.emitted
    }
}

/// Canned breakdown replayed when the model cannot be reached
pub fn canned_json(language: Language) -> String {
    let steps = Draft::fallback(language, false).steps;
    serde_json::to_string(&steps).unwrap_or_else(|_| "[]".to_string())
}

fn split_chars(text: &str, size: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    chars.chunks(size.max(1)).map(|c| c.iter().collect()).collect()
}

/// Send one event; false once the consumer has gone away
async fn emit(tx: &mpsc::Sender<StreamEvent>, event: StreamEvent) -> bool {
    tx.send(event).await.is_ok()
}

/// Feed one delta through the scanner and forward the resulting events
async fn forward_delta(scanner: &mut StepScanner, events: &mpsc::Sender<StreamEvent>, delta: String) -> bool {
    let steps = scanner.push(&delta);
    if !emit(events, StreamEvent::Chunk(delta)).await {
        return false;
    }
    for step in steps {
        if !emit(events, StreamEvent::Subtask(step)).await {
            return false;
        }
    }
    true
}

impl Pipeline {
    /// Stream a decomposition as `chunk`/`subtask` events ending in `complete` or `error`
    ///
    /// Dropping the receiver cancels the remaining work.
    pub async fn stream_decompose(&self, req: BreakdownRequest, events: mpsc::Sender<StreamEvent>) {
        let title = req.title.as_str();
        let description = req.description.as_deref();
        debug!(%title, "stream_decompose: called");

        let language = Language::detect_task(title, description);
        let learning_mode = is_learning_task(title, description);
        let estimate = self.classify(title, description).await;

        let decompose = DecomposeRequest {
            title,
            description,
            existing_steps: &req.existing_steps,
            estimate: &estimate,
            language,
            learning_mode,
        };
        let request = match self.architect.build_request(&decompose) {
            Ok(r) => r,
            Err(e) => {
                warn!(error = %e, "stream_decompose: could not build request");
                let _ = emit(&events, StreamEvent::Error(StreamFailure::from(&e))).await;
                return;
            }
        };

        let (chunk_tx, mut chunk_rx) = mpsc::channel::<StreamChunk>(64);
        let producer = self.llm.stream(request, chunk_tx);
        let consumer = async {
            let mut scanner = StepScanner::new();
            let mut saw_delta = false;
            let mut open = true;
            while let Some(chunk) = chunk_rx.recv().await {
                if let StreamChunk::TextDelta(delta) = chunk {
                    saw_delta = true;
                    // Keep draining after the consumer leaves so the producer never blocks
                    if open {
                        open = forward_delta(&mut scanner, &events, delta).await;
                    }
                }
            }
            (scanner, saw_delta, open)
        };
        let (result, (mut scanner, saw_delta, open)) = tokio::join!(producer, consumer);
        if !open {
            debug!("stream_decompose: receiver dropped");
            return;
        }

        let (usage, model) = match result {
            Ok(response) => (response.usage, response.model),
            Err(e) if e.kind() == FailureKind::Unavailable && !saw_delta => {
                warn!(error = %e, "stream_decompose: model unavailable, replaying canned breakdown");
                for delta in split_chars(&canned_json(language), REPLAY_CHUNK_CHARS) {
                    if !forward_delta(&mut scanner, &events, delta).await {
                        return;
                    }
                }
                (TokenUsage::default(), String::new())
            }
            Err(e) => {
                let err = PipelineError::from(e);
                warn!(error = %err, "stream_decompose: stream failed");
                let _ = emit(&events, StreamEvent::Error(StreamFailure::from(&err))).await;
                return;
            }
        };

        let steps = match json::parse_steps(scanner.buffer()) {
            Ok(raw) => drop_existing(from_raw(raw, 0), &req.existing_steps),
            Err(e) => {
                let err = PipelineError::from(e);
                warn!(error = %err, announced = scanner.emitted(), "stream_decompose: final buffer unparseable");
                let _ = emit(&events, StreamEvent::Error(StreamFailure::from(&err))).await;
                return;
            }
        };
        if steps.is_empty() {
            let err = PipelineError::MalformedResponse("no usable steps".to_string());
            let _ = emit(&events, StreamEvent::Error(StreamFailure::from(&err))).await;
            return;
        }

        let cost_usd = usage.cost_usd(&model);
        let draft = Draft {
            steps,
            usage,
            cost_usd,
            model,
            learning_mode,
            fallback: !saw_delta,
        };
        if events.is_closed() {
            return;
        }

        let breakdown = self.finish(&req, language, estimate, draft).await;
        info!(steps = breakdown.steps.len(), "stream_decompose: complete");
        let _ = emit(&events, StreamEvent::Complete(Box::new(breakdown))).await;
    }
}
