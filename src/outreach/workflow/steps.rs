// SPDX-License-Identifier: MIT

//! Step executors
//!
//! Each step takes the state by value, performs one collaborator call and
//! hands the state back with the next routing key. Research and drafting
//! absorb collaborator failures into fallbacks; storage failures are
//! returned as a [`StepFailure`].

use super::prompt::build_prompt;
use super::state::{LeadRecord, SendResult, StepKey, WorkflowState};
use crate::adk::error::{ErrorKind, StorageError};
use crate::adk::model::TextGenerator;
use crate::outreach::contract::{enforce, ContentContract, EnforcedDraft};
use crate::outreach::crm::{LeadFields, LeadStore, Outbox, UpsertOutcome};
use crate::outreach::research::{CompanyFacts, ResearchProvider};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// A step's result: the updated state and where to go next
#[derive(Debug)]
pub struct StepOutcome {
    pub state: WorkflowState,
    pub next: StepKey,
    pub summary: String,
}

impl StepOutcome {
    pub fn new(state: WorkflowState, next: StepKey, summary: impl Into<String>) -> Self {
        Self {
            state,
            next,
            summary: summary.into(),
        }
    }
}

/// Fatal step error. The engine attaches the step key.
#[derive(Debug, Clone, PartialEq)]
pub struct StepFailure {
    pub kind: ErrorKind,
    pub message: String,
}

impl StepFailure {
    pub fn storage(err: &StorageError) -> Self {
        Self {
            kind: ErrorKind::StorageFailure,
            message: err.to_string(),
        }
    }

    /// A prerequisite field was not produced, so this step was routed to
    /// out of order
    pub fn missing(field: &str) -> Self {
        Self {
            kind: ErrorKind::RoutingFault,
            message: format!("{} not set when step ran", field),
        }
    }
}

/// One unit of the workflow
#[async_trait]
pub trait Step: Send + Sync {
    fn key(&self) -> StepKey;

    async fn execute(&self, state: WorkflowState) -> Result<StepOutcome, StepFailure>;
}

/// Gathers company facts. Never fails.
pub struct ResearchStep {
    provider: Arc<dyn ResearchProvider>,
    timeout: Duration,
}

impl ResearchStep {
    pub fn new(provider: Arc<dyn ResearchProvider>, timeout: Duration) -> Self {
        Self { provider, timeout }
    }
}

#[async_trait]
impl Step for ResearchStep {
    fn key(&self) -> StepKey {
        StepKey::Research
    }

    async fn execute(&self, mut state: WorkflowState) -> Result<StepOutcome, StepFailure> {
        let identifier = state.company_identifier.clone();
        let lookup = tokio::time::timeout(self.timeout, self.provider.lookup(&identifier)).await;

        let (mut facts, summary) = match lookup {
            Ok(Ok(facts)) => {
                let summary = format!("{} facts from {}", facts.company_name, self.provider.name());
                (facts, summary)
            }
            Ok(Err(e)) => {
                log::warn!(
                    "[{}] Research via {} failed, using synthesized facts: {}",
                    state.run_id,
                    self.provider.name(),
                    e
                );
                (
                    CompanyFacts::synthesized(&identifier),
                    format!("synthesized facts ({})", ErrorKind::CollaboratorError),
                )
            }
            Err(_) => {
                log::warn!(
                    "[{}] Research via {} timed out after {:?}, using synthesized facts",
                    state.run_id,
                    self.provider.name(),
                    self.timeout
                );
                (
                    CompanyFacts::synthesized(&identifier),
                    format!("synthesized facts ({})", ErrorKind::CollaboratorTimeout),
                )
            }
        };

        if facts.company_name.trim().is_empty() {
            facts.company_name = crate::outreach::research::synthesize_company_name(&identifier);
        }

        state.research_facts = Some(facts);
        Ok(StepOutcome::new(state, StepKey::UpsertLead, summary))
    }
}

/// Creates or updates the lead for the identifier
pub struct UpsertLeadStep {
    leads: Arc<dyn LeadStore>,
}

impl UpsertLeadStep {
    pub fn new(leads: Arc<dyn LeadStore>) -> Self {
        Self { leads }
    }
}

fn non_empty(value: &str) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

#[async_trait]
impl Step for UpsertLeadStep {
    fn key(&self) -> StepKey {
        StepKey::UpsertLead
    }

    async fn execute(&self, mut state: WorkflowState) -> Result<StepOutcome, StepFailure> {
        let facts = state
            .research_facts
            .as_ref()
            .ok_or_else(|| StepFailure::missing("research_facts"))?;

        let fields = LeadFields {
            company_name: facts.company_name.clone(),
            industry: non_empty(&facts.industry),
            description: non_empty(&facts.description),
            research_summary: serde_json::to_string(facts).ok(),
        };

        let (lead, outcome) = self
            .leads
            .upsert(&state.company_identifier, fields)
            .await
            .map_err(|e| StepFailure::storage(&e))?;

        let summary = match outcome {
            UpsertOutcome::Created => format!("created lead {}", lead.id),
            UpsertOutcome::Updated => format!("updated lead {}", lead.id),
        };

        state.lead_record = Some(LeadRecord::from(&lead));
        Ok(StepOutcome::new(state, StepKey::DraftMessage, summary))
    }
}

/// Generates the email and holds it to the content contract. Never fails
/// once its prerequisite is present.
pub struct DraftMessageStep {
    generator: Arc<dyn TextGenerator>,
    timeout: Duration,
    sender_name: String,
    closing: String,
}

impl DraftMessageStep {
    pub fn new(
        generator: Arc<dyn TextGenerator>,
        timeout: Duration,
        sender_name: impl Into<String>,
        closing: impl Into<String>,
    ) -> Self {
        Self {
            generator,
            timeout,
            sender_name: sender_name.into(),
            closing: closing.into(),
        }
    }
}

#[async_trait]
impl Step for DraftMessageStep {
    fn key(&self) -> StepKey {
        StepKey::DraftMessage
    }

    async fn execute(&self, mut state: WorkflowState) -> Result<StepOutcome, StepFailure> {
        let facts = state
            .research_facts
            .as_ref()
            .ok_or_else(|| StepFailure::missing("research_facts"))?;

        let contract = ContentContract::new(&facts.company_name, &self.sender_name, &self.closing);
        let prompt = build_prompt(facts, &contract);

        let enforced =
            match tokio::time::timeout(self.timeout, self.generator.generate(&prompt)).await {
                Ok(Ok(raw)) => enforce(&raw, facts, &contract),
                Ok(Err(e)) => {
                    log::warn!(
                        "[{}] Generation failed, using canned draft: {}",
                        state.run_id,
                        e
                    );
                    EnforcedDraft::canned(
                        facts,
                        &contract,
                        ErrorKind::CollaboratorError,
                        e.to_string(),
                    )
                }
                Err(_) => {
                    log::warn!(
                        "[{}] Generation timed out after {:?}, using canned draft",
                        state.run_id,
                        self.timeout
                    );
                    EnforcedDraft::canned(
                        facts,
                        &contract,
                        ErrorKind::CollaboratorTimeout,
                        format!("no response within {:?}", self.timeout),
                    )
                }
            };

        let summary = if enforced.origin.is_canned() {
            format!("canned draft: {}", enforced.draft.subject)
        } else {
            format!("generated draft: {}", enforced.draft.subject)
        };

        state.draft = Some(enforced.draft);
        state.draft_origin = Some(enforced.origin);
        Ok(StepOutcome::new(state, StepKey::RecordSend, summary))
    }
}

/// Writes the send record. Terminal.
pub struct RecordSendStep {
    outbox: Arc<dyn Outbox>,
}

impl RecordSendStep {
    pub fn new(outbox: Arc<dyn Outbox>) -> Self {
        Self { outbox }
    }
}

#[async_trait]
impl Step for RecordSendStep {
    fn key(&self) -> StepKey {
        StepKey::RecordSend
    }

    async fn execute(&self, mut state: WorkflowState) -> Result<StepOutcome, StepFailure> {
        let lead_id = state
            .lead_record
            .as_ref()
            .map(|lead| lead.id)
            .ok_or_else(|| StepFailure::missing("lead_record"))?;
        let draft = state
            .draft
            .as_ref()
            .ok_or_else(|| StepFailure::missing("draft"))?;

        let email = self
            .outbox
            .record(lead_id, &draft.subject, &draft.body)
            .await
            .map_err(|e| StepFailure::storage(&e))?;

        let sent_at = email.sent_at.unwrap_or(email.created_at);
        state.send_result = Some(SendResult {
            id: email.id,
            sent_at,
        });
        Ok(StepOutcome::new(
            state,
            StepKey::End,
            format!("recorded email {} for lead {}", email.id, lead_id),
        ))
    }
}
