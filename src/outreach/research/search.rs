// SPDX-License-Identifier: MIT

use super::{synthesize_company_name, CompanyFacts, ResearchProvider};
use crate::adk::error::ResearchError;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::env;

const BRAVE_ENDPOINT: &str = "https://api.search.brave.com/res/v1/web/search";
const RESULT_COUNT: u32 = 8;
const MAX_HIGHLIGHTS: usize = 3;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    pub title: String,
    pub url: String,
    #[serde(default)]
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub age: Option<String>,
}

/// Research backed by the Brave web search API
pub struct BraveSearchProvider {
    client: Client,
    api_key: String,
}

impl BraveSearchProvider {
    pub fn new() -> Result<Self, ResearchError> {
        let api_key = env::var("BRAVE_API_KEY")
            .map_err(|_| ResearchError::ApiKeyMissing("brave".to_string()))?;
        Ok(Self {
            client: Client::new(),
            api_key,
        })
    }

    /// Fold search results into facts. Missing pieces fall back to the
    /// synthesized defaults.
    fn facts_from_results(identifier: &str, results: &[SearchResult]) -> CompanyFacts {
        let mut facts = CompanyFacts::synthesized(identifier);
        if results.is_empty() {
            return facts;
        }

        let company_name = synthesize_company_name(identifier);
        if let Some(top) = results.iter().find(|r| !r.description.is_empty()) {
            facts.description = strip_markup(&top.description);
        }

        facts.highlights = results
            .iter()
            .take(MAX_HIGHLIGHTS)
            .map(|r| strip_markup(&r.title))
            .collect();

        if let Some(news) = results.iter().find(|r| r.age.is_some()) {
            facts.recent_news = strip_markup(&news.title);
        }

        let mut extra = Map::new();
        extra.insert(
            "sources".to_string(),
            Value::Array(
                results
                    .iter()
                    .map(|r| Value::String(r.url.clone()))
                    .collect(),
            ),
        );
        facts.extra = extra;
        facts.company_name = company_name;
        facts
    }
}

/// Brave wraps matched terms in `<strong>` tags
fn strip_markup(text: &str) -> String {
    text.replace("<strong>", "").replace("</strong>", "")
}

#[async_trait]
impl ResearchProvider for BraveSearchProvider {
    fn name(&self) -> &str {
        "brave_search"
    }

    async fn lookup(&self, identifier: &str) -> Result<CompanyFacts, ResearchError> {
        let query = format!("{} company about products services", identifier);

        let mut url = reqwest::Url::parse(BRAVE_ENDPOINT)?;
        url.query_pairs_mut()
            .append_pair("q", &query)
            .append_pair("count", &RESULT_COUNT.to_string());

        let resp = self
            .client
            .get(url)
            .header("Accept", "application/json")
            .header("X-Subscription-Token", &self.api_key)
            .send()
            .await?;

        if !resp.status().is_success() {
            let text = resp.text().await?;
            return Err(ResearchError::Api(text));
        }

        let body: Value = resp.json().await?;

        let results_json = body
            .get("web")
            .and_then(|w| w.get("results"))
            .cloned()
            .unwrap_or(Value::Array(vec![]));

        let results: Vec<SearchResult> = serde_json::from_value(results_json)
            .map_err(|e| ResearchError::InvalidResponse(e.to_string()))?;

        log::debug!("Brave returned {} results for {}", results.len(), identifier);
        Ok(Self::facts_from_results(identifier, &results))
    }
}
