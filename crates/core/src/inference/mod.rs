//! Purpose-routed model inference over the shared credential pool.

mod client;
mod engine;

pub use client::{GeminiClient, InferenceError, InferenceService};
pub use engine::{extract_json_payload, EngineError, InferenceEngine};
