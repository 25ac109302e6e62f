//! Prompt templates for every pipeline stage

pub mod embedded;
mod loader;

pub use loader::PromptLoader;
