//! TaskBreaker - adaptive task decomposition
//!
//! Turns a free-form task ("clean the kitchen", "복습: 미적분 3단원") into an
//! ordered tree of small, time-boxed steps. A complexity estimate drives every
//! later stage: how many minutes the steps must add up to, whether a second
//! model pass audits the draft, and which steps are worth splitting further.
//!
//! # Modules
//!
//! - [`llm`] - completion client trait with Anthropic, OpenAI and offline backends
//! - [`prompts`] - handlebars prompt templates with on-disk overrides
//! - [`pipeline`] - classifier, architect, verifier, normalizer, refiner, stream assembler
//! - [`store`] - task persistence for accepted breakdowns
//! - [`events`] - notifications emitted by callers
//! - [`config`] - configuration types and loading
//! - [`cli`] - command-line interface

pub mod cli;
pub mod config;
pub mod events;
pub mod llm;
pub mod pipeline;
pub mod prompts;
pub mod store;

pub use config::{Config, RefinementMode};
pub use pipeline::{Breakdown, BreakdownRequest, Pipeline};
