//! Analysis provider clients.
//!
//! The engine only depends on [`LlmClient`]: requests can fail, time out,
//! or come back as malformed JSON, and every one of those is turned into a
//! failed task result by the task runner.

mod anthropic;
mod client;
mod config;
mod ollama;

pub use anthropic::AnthropicClient;
pub use client::{
    extract_json, CompletionRequest, CompletionResponse, LlmClient, LlmError, LlmUsage,
};
pub use config::{create_llm_client, LlmConfig, LlmProvider};
pub use ollama::OllamaClient;
