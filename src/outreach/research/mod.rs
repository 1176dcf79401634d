// SPDX-License-Identifier: MIT

//! Company research
//!
//! A [`ResearchProvider`] turns a company identifier (a domain) into
//! [`CompanyFacts`]. Two backends exist:
//! - [`StaticCatalog`] - built-in table plus an optional YAML catalog
//! - [`BraveSearchProvider`] - live web search

mod catalog;
mod search;

pub use catalog::StaticCatalog;
pub use search::BraveSearchProvider;

use crate::adk::error::ResearchError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Domain suffixes stripped when synthesizing a company name, longest first
const KNOWN_SUFFIXES: &[&str] = &[
    ".co.uk", ".com.au", ".co.in", ".com", ".io", ".ai", ".co", ".net", ".org", ".dev", ".app",
    ".tech", ".xyz", ".inc", ".us", ".uk", ".de", ".eu",
];

/// Facts gathered about a company
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompanyFacts {
    pub company_name: String,
    #[serde(default)]
    pub industry: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, alias = "key_highlights")]
    pub highlights: Vec<String>,
    #[serde(default)]
    pub recent_news: String,
    /// Anything else the backend knows (products, headcount, ...)
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl CompanyFacts {
    /// Fallback facts for an identifier nobody knows anything about
    pub fn synthesized(identifier: &str) -> Self {
        let company_name = synthesize_company_name(identifier);
        let mut extra = Map::new();
        extra.insert(
            "products".to_string(),
            Value::Array(vec![Value::String(
                "Product information not available".to_string(),
            )]),
        );

        Self {
            description: format!(
                "{} is a company operating in the technology sector.",
                company_name
            ),
            company_name,
            industry: "Technology".to_string(),
            highlights: vec![
                format!("Domain: {}", identifier),
                "Further research recommended".to_string(),
            ],
            recent_news: "Limited information available".to_string(),
            extra,
        }
    }
}

/// Looks up facts about a company by identifier
#[async_trait]
pub trait ResearchProvider: Send + Sync {
    /// Backend label used in logs
    fn name(&self) -> &str;

    async fn lookup(&self, identifier: &str) -> Result<CompanyFacts, ResearchError>;
}

/// Normalize user input into a bare lowercase domain.
///
/// Accepts `acme.io`, `https://www.Acme.io/about` and similar. Returns
/// `None` when nothing usable remains.
pub fn normalize_identifier(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    let host = if trimmed.contains("://") {
        url::Url::parse(trimmed)
            .ok()
            .and_then(|u| u.host_str().map(str::to_string))?
    } else {
        trimmed
            .split(['/', '?', '#'])
            .next()
            .unwrap_or_default()
            .to_string()
    };

    let host = host.to_ascii_lowercase();
    let host = host.strip_prefix("www.").unwrap_or(&host);
    let host = host.trim_end_matches('.');

    if host.is_empty() {
        None
    } else {
        Some(host.to_string())
    }
}

/// Derive a display name from a domain: `acme.io` -> `Acme`,
/// `blue-sky.co.uk` -> `Blue Sky`.
pub fn synthesize_company_name(identifier: &str) -> String {
    let mut stem = identifier.trim().to_ascii_lowercase();
    if let Some(rest) = stem.strip_prefix("www.") {
        stem = rest.to_string();
    }

    loop {
        let stripped = KNOWN_SUFFIXES
            .iter()
            .find(|suffix| stem.len() > suffix.len() && stem.ends_with(*suffix))
            .map(|suffix| stem[..stem.len() - suffix.len()].to_string());
        match stripped {
            Some(s) => stem = s,
            None => break,
        }
    }

    let words: Vec<String> = stem
        .split(['.', '-', '_'])
        .filter(|w| !w.is_empty())
        .map(title_case)
        .collect();

    if words.is_empty() {
        identifier.trim().to_string()
    } else {
        words.join(" ")
    }
}

fn title_case(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
