// SPDX-License-Identifier: MIT

//! Static company catalog
//!
//! Built-in entries cover a couple of well-known companies. A YAML file
//! mapping identifiers to facts can extend or override them:
//!
//! ```yaml
//! acme.io:
//!   company_name: Acme
//!   industry: Logistics
//!   description: Acme moves things.
//!   highlights: [Same-day delivery]
//!   recent_news: Opened a new hub
//! ```

use super::{CompanyFacts, ResearchProvider};
use crate::adk::error::{OutreachError, ResearchError};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

static BUILTIN: Lazy<HashMap<String, CompanyFacts>> = Lazy::new(|| {
    let mut table = HashMap::new();
    table.insert(
        "openai.com".to_string(),
        CompanyFacts {
            company_name: "OpenAI".to_string(),
            industry: "Artificial Intelligence".to_string(),
            description: "OpenAI is an AI research and deployment company focused on ensuring artificial general intelligence benefits all of humanity.".to_string(),
            highlights: vec![
                "Pioneer in large language models".to_string(),
                "ChatGPT reached 100M users in 2 months".to_string(),
                "Partnership with Microsoft".to_string(),
            ],
            recent_news: "Leading advancements in AI with GPT-4 and ChatGPT".to_string(),
            extra: products(&["ChatGPT", "GPT-4", "DALL-E", "Whisper"]),
        },
    );
    table.insert(
        "stripe.com".to_string(),
        CompanyFacts {
            company_name: "Stripe".to_string(),
            industry: "Financial Technology".to_string(),
            description: "Stripe is a technology company that builds economic infrastructure for the internet.".to_string(),
            highlights: vec![
                "Processes billions in payments annually".to_string(),
                "Used by millions of businesses".to_string(),
                "Valued at $50B+".to_string(),
            ],
            recent_news: "Expanding global payment solutions".to_string(),
            extra: products(&["Payment Processing", "Stripe Connect", "Stripe Atlas"]),
        },
    );
    table
});

fn products(names: &[&str]) -> Map<String, Value> {
    let mut extra = Map::new();
    extra.insert("products".to_string(), json!(names));
    extra
}

/// Research backed by a fixed table; unknown identifiers get synthesized facts
#[derive(Debug, Clone)]
pub struct StaticCatalog {
    entries: HashMap<String, CompanyFacts>,
}

impl StaticCatalog {
    /// Catalog with only the built-in entries
    pub fn new() -> Self {
        Self {
            entries: BUILTIN.clone(),
        }
    }

    /// Built-in entries extended by a YAML catalog file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, OutreachError> {
        let content = fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(content: &str) -> Result<Self, OutreachError> {
        let extra: HashMap<String, CompanyFacts> = serde_yaml::from_str(content)?;
        let mut catalog = Self::new();
        for (identifier, facts) in extra {
            catalog.insert(&identifier, facts);
        }
        Ok(catalog)
    }

    pub fn insert(&mut self, identifier: &str, facts: CompanyFacts) {
        let key = super::normalize_identifier(identifier).unwrap_or_else(|| identifier.to_string());
        self.entries.insert(key, facts);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for StaticCatalog {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ResearchProvider for StaticCatalog {
    fn name(&self) -> &str {
        "static_catalog"
    }

    async fn lookup(&self, identifier: &str) -> Result<CompanyFacts, ResearchError> {
        match self.entries.get(identifier) {
            Some(facts) => Ok(facts.clone()),
            None => {
                log::debug!("{} not in catalog, synthesizing facts", identifier);
                Ok(CompanyFacts::synthesized(identifier))
            }
        }
    }
}
