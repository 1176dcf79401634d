// SPDX-License-Identifier: MIT

//! Workflow engine
//!
//! Sequencing and routing only. The engine looks up the executor for the
//! current routing key, runs it, checks the returned key against the
//! transition table and appends a transcript event. No business logic
//! lives here.

use super::state::{LeadRecord, SendResult, StepKey, TranscriptEvent, WorkflowState};
use super::steps::{DraftMessageStep, RecordSendStep, ResearchStep, Step, UpsertLeadStep};
use crate::adk::error::{EngineError, ErrorKind};
use crate::adk::model::TextGenerator;
use crate::outreach::contract::{DraftOrigin, EmailDraft};
use crate::outreach::crm::{LeadStore, Outbox};
use crate::outreach::research::{normalize_identifier, CompanyFacts, ResearchProvider};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use uuid::Uuid;

pub const DEFAULT_RESEARCH_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_GENERATION_TIMEOUT: Duration = Duration::from_secs(60);

/// Safety limit on steps per run
const MAX_STEPS: usize = 16;

/// Allowed successor of each step
fn successor(step: StepKey) -> Option<StepKey> {
    match step {
        StepKey::Research => Some(StepKey::UpsertLead),
        StepKey::UpsertLead => Some(StepKey::DraftMessage),
        StepKey::DraftMessage => Some(StepKey::RecordSend),
        StepKey::RecordSend => Some(StepKey::End),
        StepKey::End => None,
    }
}

/// External services a run depends on
#[derive(Clone)]
pub struct Collaborators {
    pub research: Arc<dyn ResearchProvider>,
    pub generator: Arc<dyn TextGenerator>,
    pub leads: Arc<dyn LeadStore>,
    pub outbox: Arc<dyn Outbox>,
    pub sender_name: String,
    pub closing: String,
    pub research_timeout: Duration,
    pub generation_timeout: Duration,
}

impl Collaborators {
    pub fn new(
        research: Arc<dyn ResearchProvider>,
        generator: Arc<dyn TextGenerator>,
        leads: Arc<dyn LeadStore>,
        outbox: Arc<dyn Outbox>,
        sender_name: impl Into<String>,
    ) -> Self {
        Self {
            research,
            generator,
            leads,
            outbox,
            sender_name: sender_name.into(),
            closing: "Best regards,".to_string(),
            research_timeout: DEFAULT_RESEARCH_TIMEOUT,
            generation_timeout: DEFAULT_GENERATION_TIMEOUT,
        }
    }

    pub fn with_closing(mut self, closing: impl Into<String>) -> Self {
        self.closing = closing.into();
        self
    }

    pub fn with_timeouts(mut self, research: Duration, generation: Duration) -> Self {
        self.research_timeout = research;
        self.generation_timeout = generation;
        self
    }
}

/// Projection of a finished run returned to callers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalResult {
    pub run_id: Uuid,
    pub company_identifier: String,
    pub research_facts: CompanyFacts,
    pub lead_record: LeadRecord,
    pub draft: EmailDraft,
    pub draft_origin: DraftOrigin,
    pub send_result: SendResult,
    pub status: String,
}

impl FinalResult {
    pub const COMPLETED: &'static str = "completed";

    /// Project a finished state. A missing field means a step was skipped.
    pub fn from_state(state: WorkflowState) -> Result<Self, EngineError> {
        let missing = |field: &str| {
            EngineError::routing(
                StepKey::End,
                format!("run reached end without {}", field),
            )
        };

        Ok(Self {
            run_id: state.run_id,
            research_facts: state.research_facts.ok_or_else(|| missing("research_facts"))?,
            lead_record: state.lead_record.ok_or_else(|| missing("lead_record"))?,
            draft: state.draft.ok_or_else(|| missing("draft"))?,
            draft_origin: state.draft_origin.ok_or_else(|| missing("draft_origin"))?,
            send_result: state.send_result.ok_or_else(|| missing("send_result"))?,
            company_identifier: state.company_identifier,
            status: Self::COMPLETED.to_string(),
        })
    }
}

/// Progress events emitted by [`Engine::run_stream`]
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum WorkflowEvent {
    Started {
        run_id: Uuid,
        company_identifier: String,
    },
    StepCompleted(TranscriptEvent),
    Completed(Box<FinalResult>),
    Failed(EngineError),
}

impl WorkflowEvent {
    /// SSE event name
    pub fn name(&self) -> &'static str {
        match self {
            WorkflowEvent::Started { .. } => "started",
            WorkflowEvent::StepCompleted(_) => "step_completed",
            WorkflowEvent::Completed(_) => "completed",
            WorkflowEvent::Failed(_) => "failed",
        }
    }
}

/// Runs the outreach workflow
pub struct Engine {
    steps: HashMap<StepKey, Arc<dyn Step>>,
}

impl Engine {
    /// Wire the four standard steps
    pub fn new(collaborators: Collaborators) -> Self {
        let Collaborators {
            research,
            generator,
            leads,
            outbox,
            sender_name,
            closing,
            research_timeout,
            generation_timeout,
        } = collaborators;

        Self::from_steps(vec![
            Arc::new(ResearchStep::new(research, research_timeout)),
            Arc::new(UpsertLeadStep::new(leads)),
            Arc::new(DraftMessageStep::new(
                generator,
                generation_timeout,
                sender_name,
                closing,
            )),
            Arc::new(RecordSendStep::new(outbox)),
        ])
    }

    /// Build from arbitrary executors, keyed by [`Step::key`]
    pub fn from_steps(steps: Vec<Arc<dyn Step>>) -> Self {
        let steps = steps.into_iter().map(|s| (s.key(), s)).collect();
        Self { steps }
    }

    /// Run to completion and project the result
    pub async fn run(&self, company_identifier: &str) -> Result<FinalResult, EngineError> {
        let state = self.drive(company_identifier, None).await?;
        FinalResult::from_state(state)
    }

    /// Run to completion and return the full state, transcript included
    pub async fn execute(&self, company_identifier: &str) -> Result<WorkflowState, EngineError> {
        self.drive(company_identifier, None).await
    }

    /// Run while reporting progress on `events`.
    ///
    /// Closes with exactly one `Completed` or `Failed` event. A dropped
    /// receiver does not stop the run.
    pub async fn run_stream(
        &self,
        company_identifier: &str,
        events: mpsc::Sender<WorkflowEvent>,
    ) -> Result<FinalResult, EngineError> {
        let result = match self.drive(company_identifier, Some(&events)).await {
            Ok(state) => FinalResult::from_state(state),
            Err(e) => Err(e),
        };

        let last = match &result {
            Ok(final_result) => WorkflowEvent::Completed(Box::new(final_result.clone())),
            Err(e) => WorkflowEvent::Failed(e.clone()),
        };
        let _ = events.send(last).await;

        result
    }

    async fn drive(
        &self,
        company_identifier: &str,
        events: Option<&mpsc::Sender<WorkflowEvent>>,
    ) -> Result<WorkflowState, EngineError> {
        let identifier = normalize_identifier(company_identifier).ok_or_else(|| {
            let err = EngineError::invalid_input(format!(
                "company identifier {:?} is empty",
                company_identifier
            ));
            log::error!("{}", err);
            err
        })?;
        let mut state = WorkflowState::new(identifier);

        log::info!(
            "[{}] Starting outreach run for {}",
            state.run_id,
            state.company_identifier
        );
        emit(
            events,
            WorkflowEvent::Started {
                run_id: state.run_id,
                company_identifier: state.company_identifier.clone(),
            },
        )
        .await;

        let mut executed = 0;
        while !state.is_finished() {
            executed += 1;
            let current = state.next_step;
            if executed > MAX_STEPS {
                return Err(self.fail(
                    &state,
                    EngineError::routing(current, format!("run exceeded {} steps", MAX_STEPS)),
                ));
            }

            let step = match self.steps.get(&current) {
                Some(step) => step.clone(),
                None => {
                    return Err(self.fail(
                        &state,
                        EngineError::routing(current, "no executor registered"),
                    ))
                }
            };

            log::info!("[{}] Step {} starting", state.run_id, current);
            let run_id = state.run_id;
            let outcome = match step.execute(state).await {
                Ok(outcome) => outcome,
                Err(failure) => {
                    let err = EngineError::new(current, failure.kind, failure.message);
                    log::error!("[{}] {}", run_id, err);
                    return Err(err);
                }
            };

            let mut state_after = outcome.state;
            if successor(current) != Some(outcome.next) {
                return Err(self.fail(
                    &state_after,
                    EngineError::routing(
                        current,
                        format!("undefined transition {} -> {}", current, outcome.next),
                    ),
                ));
            }

            state_after.record(current, outcome.next, outcome.summary);
            log::info!(
                "[{}] Step {} finished -> {}",
                state_after.run_id,
                current,
                outcome.next
            );
            if let Some(event) = state_after.transcript.last() {
                emit(events, WorkflowEvent::StepCompleted(event.clone())).await;
            }
            state = state_after;
        }

        log::info!("[{}] Outreach run completed", state.run_id);
        Ok(state)
    }

    fn fail(&self, state: &WorkflowState, err: EngineError) -> EngineError {
        debug_assert!(err.kind == ErrorKind::RoutingFault);
        log::error!("[{}] {}", state.run_id, err);
        err
    }
}

async fn emit(events: Option<&mpsc::Sender<WorkflowEvent>>, event: WorkflowEvent) {
    if let Some(tx) = events {
        if tx.send(event).await.is_err() {
            log::debug!("Workflow event receiver dropped");
        }
    }
}
