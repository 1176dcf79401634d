// SPDX-License-Identifier: MIT

//! Model module - defines LLM model trait and implementations
//!
//! This module provides the core Model trait and shared types.
//! Model implementations are in their own submodules:
//! - [anthropic] - Anthropic's Claude API
//! - [openai] - OpenAI's ChatGPT API
//!
//! The workflow never talks to a [`Model`] directly. It goes through a
//! [`TextGenerator`], a single prompt-in, text-out call.

pub mod anthropic;
pub mod openai;

use crate::adk::error::ModelError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Configuration for model generation
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct GenerationConfig {
    pub temperature: Option<f32>,
    pub max_output_tokens: Option<u32>,
    pub top_p: Option<f32>,
}

/// A message in the conversation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Content {
    pub role: String,
    pub parts: Vec<Part>,
}

impl Content {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            parts: vec![Part::Text(text.into())],
        }
    }

    pub fn model(text: impl Into<String>) -> Self {
        Self {
            role: "model".to_string(),
            parts: vec![Part::Text(text.into())],
        }
    }

    /// Concatenated text parts, thinking excluded
    pub fn text(&self) -> String {
        self.parts
            .iter()
            .filter_map(|p| match p {
                Part::Text(t) => Some(t.as_str()),
                Part::Thinking(_) => None,
            })
            .collect::<Vec<_>>()
            .join("")
    }
}

/// Parts of a message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Part {
    /// Regular text output from the model
    Text(String),
    /// Thinking/reasoning content from thinking models
    Thinking(String),
}

/// Core trait for LLM model implementations
#[async_trait]
pub trait Model: Send + Sync {
    /// Provider label used in logs and errors
    fn provider(&self) -> &str;

    async fn generate_content(
        &self,
        history: &[Content],
        config: Option<&GenerationConfig>,
    ) -> Result<Content, ModelError>;
}

/// Single-shot text generation: one prompt in, raw text out
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String, ModelError>;
}

/// Adapts a [`Model`] into a [`TextGenerator`]
pub struct ModelGenerator {
    model: Arc<dyn Model>,
    config: GenerationConfig,
}

impl ModelGenerator {
    pub fn new(model: Arc<dyn Model>, config: GenerationConfig) -> Self {
        Self { model, config }
    }
}

#[async_trait]
impl TextGenerator for ModelGenerator {
    async fn generate(&self, prompt: &str) -> Result<String, ModelError> {
        let history = [Content::user(prompt)];
        let response = self
            .model
            .generate_content(&history, Some(&self.config))
            .await?;

        let text = response.text();
        if text.trim().is_empty() {
            return Err(ModelError::InvalidResponse(format!(
                "{} returned no text",
                self.model.provider()
            )));
        }
        Ok(text)
    }
}

/// Generator used when no model is configured; every call fails
pub struct UnavailableGenerator {
    reason: String,
}

impl UnavailableGenerator {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl TextGenerator for UnavailableGenerator {
    async fn generate(&self, _prompt: &str) -> Result<String, ModelError> {
        Err(ModelError::Unavailable(self.reason.clone()))
    }
}

/// Supported model providers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Anthropic,
    OpenAI,
}

impl Provider {
    /// Infer the provider from a model name prefix
    pub fn infer(model_name: &str) -> Self {
        if model_name.starts_with("gpt") || model_name.starts_with("o1") {
            Provider::OpenAI
        } else {
            Provider::Anthropic
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "anthropic" | "claude" => Some(Provider::Anthropic),
            "openai" | "gpt" => Some(Provider::OpenAI),
            _ => None,
        }
    }
}

/// Build a model for the given provider, reading credentials from the environment
pub fn create_model(provider: Provider, model_name: String) -> Result<Arc<dyn Model>, ModelError> {
    let model: Arc<dyn Model> = match provider {
        Provider::Anthropic => Arc::new(anthropic::AnthropicModel::new(model_name)?),
        Provider::OpenAI => Arc::new(openai::OpenAIModel::new(model_name)?),
    };
    Ok(model)
}
