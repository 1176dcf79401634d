// SPDX-License-Identifier: MIT

//! Per-run workflow state

use crate::outreach::contract::{DraftOrigin, EmailDraft};
use crate::outreach::crm::Lead;
use crate::outreach::research::CompanyFacts;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Routing key: which step runs next
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKey {
    Research,
    UpsertLead,
    DraftMessage,
    RecordSend,
    End,
}

impl StepKey {
    pub fn as_str(self) -> &'static str {
        match self {
            StepKey::Research => "research",
            StepKey::UpsertLead => "upsert_lead",
            StepKey::DraftMessage => "draft_message",
            StepKey::RecordSend => "record_send",
            StepKey::End => "end",
        }
    }
}

impl std::fmt::Display for StepKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The lead as seen by the workflow
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeadRecord {
    pub id: i64,
    pub company_identifier: String,
    pub name: String,
    pub industry: Option<String>,
    pub description: Option<String>,
    pub research_summary: Option<String>,
}

impl From<&Lead> for LeadRecord {
    fn from(lead: &Lead) -> Self {
        Self {
            id: lead.id,
            company_identifier: lead.company_domain.clone(),
            name: lead.company_name.clone(),
            industry: lead.industry.clone(),
            description: lead.description.clone(),
            research_summary: lead.research_summary.clone(),
        }
    }
}

/// Outbox entry written by the final step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SendResult {
    pub id: i64,
    pub sent_at: DateTime<Utc>,
}

/// One completed step, in execution order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptEvent {
    pub step: StepKey,
    pub next: StepKey,
    pub summary: String,
    pub at: DateTime<Utc>,
}

/// State threaded through the steps of one run.
///
/// Each `Option` is `None` until the step that produces it has run.
#[derive(Debug, Clone, Serialize)]
pub struct WorkflowState {
    pub run_id: Uuid,
    pub company_identifier: String,
    pub research_facts: Option<CompanyFacts>,
    pub lead_record: Option<LeadRecord>,
    pub draft: Option<EmailDraft>,
    pub draft_origin: Option<DraftOrigin>,
    pub send_result: Option<SendResult>,
    pub next_step: StepKey,
    pub transcript: Vec<TranscriptEvent>,
}

impl WorkflowState {
    pub fn new(company_identifier: impl Into<String>) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            company_identifier: company_identifier.into(),
            research_facts: None,
            lead_record: None,
            draft: None,
            draft_origin: None,
            send_result: None,
            next_step: StepKey::Research,
            transcript: Vec::new(),
        }
    }

    /// Append a transcript event and move the routing cursor
    pub fn record(&mut self, step: StepKey, next: StepKey, summary: impl Into<String>) {
        self.transcript.push(TranscriptEvent {
            step,
            next,
            summary: summary.into(),
            at: Utc::now(),
        });
        self.next_step = next;
    }

    pub fn is_finished(&self) -> bool {
        self.next_step == StepKey::End
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_key_names() {
        assert_eq!(StepKey::UpsertLead.to_string(), "upsert_lead");
        assert_eq!(
            serde_json::to_string(&StepKey::DraftMessage).unwrap(),
            "\"draft_message\""
        );
    }

    #[test]
    fn test_new_state_starts_at_research() {
        let state = WorkflowState::new("acme.io");
        assert_eq!(state.next_step, StepKey::Research);
        assert!(state.research_facts.is_none());
        assert!(state.transcript.is_empty());
        assert!(!state.is_finished());
    }

    #[test]
    fn test_record_appends_in_order() {
        let mut state = WorkflowState::new("acme.io");
        state.record(StepKey::Research, StepKey::UpsertLead, "facts");
        state.record(StepKey::UpsertLead, StepKey::DraftMessage, "lead");

        let steps: Vec<StepKey> = state.transcript.iter().map(|e| e.step).collect();
        assert_eq!(steps, vec![StepKey::Research, StepKey::UpsertLead]);
        assert_eq!(state.next_step, StepKey::DraftMessage);
        assert!(state.transcript[0].at <= state.transcript[1].at);
    }

    #[test]
    fn test_distinct_run_ids() {
        assert_ne!(
            WorkflowState::new("a.io").run_id,
            WorkflowState::new("a.io").run_id
        );
    }
}
