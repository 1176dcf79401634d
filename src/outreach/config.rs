// SPDX-License-Identifier: MIT

//! Runtime settings
//!
//! Defaults, then an optional YAML file, then environment variables.
//! API keys are never part of the settings; the collaborator
//! constructors read them from the environment.

use crate::adk::error::OutreachError;
use crate::adk::model::{
    create_model, GenerationConfig, ModelGenerator, Provider, TextGenerator, UnavailableGenerator,
};
use crate::outreach::crm::SqliteCrm;
use crate::outreach::research::{BraveSearchProvider, ResearchProvider, StaticCatalog};
use crate::outreach::workflow::Collaborators;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

/// Where company facts come from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ResearchBackend {
    #[default]
    Static,
    Brave,
}

impl FromStr for ResearchBackend {
    type Err = OutreachError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "static" => Ok(ResearchBackend::Static),
            "brave" => Ok(ResearchBackend::Brave),
            other => Err(OutreachError::config(format!(
                "unknown research backend '{}' (expected static or brave)",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// SQLite database file
    pub database: PathBuf,
    pub sender_name: String,
    pub closing: String,
    /// Inferred from `model` when absent
    pub model_provider: Option<Provider>,
    pub model: String,
    pub temperature: f32,
    pub max_output_tokens: u32,
    pub research_backend: ResearchBackend,
    /// Extra YAML catalog for the static backend
    pub catalog: Option<PathBuf>,
    pub research_timeout_secs: u64,
    pub generation_timeout_secs: u64,
    pub port: u16,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            database: PathBuf::from("crm.db"),
            sender_name: "Wasiu Ibrahim".to_string(),
            closing: "Best regards,".to_string(),
            model_provider: None,
            model: "claude-3-haiku-20240307".to_string(),
            temperature: 0.7,
            max_output_tokens: 1024,
            research_backend: ResearchBackend::Static,
            catalog: None,
            research_timeout_secs: 10,
            generation_timeout_secs: 60,
            port: 8000,
        }
    }
}

impl Settings {
    /// Load settings from an optional YAML file plus the process environment
    pub fn load(path: Option<&Path>) -> Result<Self, OutreachError> {
        let mut settings = match path {
            Some(path) => Self::from_yaml(&std::fs::read_to_string(path)?)?,
            None => Self::default(),
        };
        settings.apply_env(|key| std::env::var(key).ok())?;
        Ok(settings)
    }

    pub fn from_yaml(content: &str) -> Result<Self, OutreachError> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(content)?)
    }

    /// Apply overrides from `lookup` (the environment in production)
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), OutreachError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = var("OUTREACH_DATABASE") {
            self.database = PathBuf::from(v);
        }
        if let Some(v) = var("OUTREACH_SENDER_NAME") {
            self.sender_name = v;
        }
        if let Some(v) = var("OUTREACH_CLOSING") {
            self.closing = v;
        }
        if let Some(v) = var("MODEL_PROVIDER") {
            self.model_provider = Some(Provider::parse(&v).ok_or_else(|| {
                OutreachError::config(format!("unknown MODEL_PROVIDER '{}'", v))
            })?);
        }
        if let Some(v) = var("OUTREACH_MODEL") {
            self.model = v;
        }
        if let Some(v) = var("OUTREACH_RESEARCH_BACKEND") {
            self.research_backend = v.parse()?;
        }
        if let Some(v) = var("OUTREACH_CATALOG") {
            self.catalog = Some(PathBuf::from(v));
        }
        if let Some(v) = var("OUTREACH_RESEARCH_TIMEOUT_SECS") {
            self.research_timeout_secs = parse_number("OUTREACH_RESEARCH_TIMEOUT_SECS", &v)?;
        }
        if let Some(v) = var("OUTREACH_GENERATION_TIMEOUT_SECS") {
            self.generation_timeout_secs = parse_number("OUTREACH_GENERATION_TIMEOUT_SECS", &v)?;
        }
        if let Some(v) = var("OUTREACH_PORT") {
            self.port = parse_number("OUTREACH_PORT", &v)?;
        }
        Ok(())
    }

    pub fn provider(&self) -> Provider {
        self.model_provider
            .unwrap_or_else(|| Provider::infer(&self.model))
    }

    pub fn research_timeout(&self) -> Duration {
        Duration::from_secs(self.research_timeout_secs)
    }

    pub fn generation_timeout(&self) -> Duration {
        Duration::from_secs(self.generation_timeout_secs)
    }

    /// The configured generator, or one that always fails when no model
    /// can be built (typically a missing API key)
    pub fn generator(&self) -> Arc<dyn TextGenerator> {
        let provider = self.provider();
        match create_model(provider, self.model.clone()) {
            Ok(model) => {
                log::info!("Using provider {:?} with model {}", provider, self.model);
                Arc::new(ModelGenerator::new(
                    model,
                    GenerationConfig {
                        temperature: Some(self.temperature),
                        max_output_tokens: Some(self.max_output_tokens),
                        top_p: None,
                    },
                ))
            }
            Err(e) => {
                log::warn!("Generation disabled, drafts will use the canned template: {}", e);
                Arc::new(UnavailableGenerator::new(e.to_string()))
            }
        }
    }

    pub fn research_provider(&self) -> Result<Arc<dyn ResearchProvider>, OutreachError> {
        match self.research_backend {
            ResearchBackend::Static => {
                let catalog = match &self.catalog {
                    Some(path) => StaticCatalog::load(path)?,
                    None => StaticCatalog::new(),
                };
                log::info!("Static research catalog with {} entries", catalog.len());
                Ok(Arc::new(catalog))
            }
            ResearchBackend::Brave => {
                let provider = BraveSearchProvider::new()
                    .map_err(|e| OutreachError::config(e.to_string()))?;
                Ok(Arc::new(provider))
            }
        }
    }

    pub fn open_crm(&self) -> Result<Arc<SqliteCrm>, OutreachError> {
        Ok(Arc::new(SqliteCrm::open(&self.database)?))
    }

    /// Wire every collaborator a run needs around an open CRM
    pub fn collaborators(&self, crm: Arc<SqliteCrm>) -> Result<Collaborators, OutreachError> {
        Ok(Collaborators::new(
            self.research_provider()?,
            self.generator(),
            crm.clone(),
            crm,
            self.sender_name.clone(),
        )
        .with_closing(self.closing.clone())
        .with_timeouts(self.research_timeout(), self.generation_timeout()))
    }
}

fn parse_number<T: FromStr>(key: &str, value: &str) -> Result<T, OutreachError> {
    value
        .trim()
        .parse()
        .map_err(|_| OutreachError::config(format!("{} must be a number, got '{}'", key, value)))
}
