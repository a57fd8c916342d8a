// src/ai/mod.rs

pub mod client;
pub mod generate;
pub mod grading;
pub mod parse;
pub mod prompts;

pub use client::{AiClient, AiError, ChatTurn, CompletionBackend, CompletionRequest};
