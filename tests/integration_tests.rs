//! Integration tests for the outreach workflow
//!
//! These tests drive the engine end to end with an in-memory CRM and mock
//! collaborators.

use async_trait::async_trait;
use outreach_rs::adk::error::{ErrorKind, ModelError, StorageError};
use outreach_rs::adk::model::{
    Content, GenerationConfig, Model, ModelGenerator, TextGenerator, UnavailableGenerator,
};
use outreach_rs::outreach::contract::{validate, ContentContract, DraftOrigin, EmailDraft};
use outreach_rs::outreach::crm::{
    Lead, LeadFields, LeadStore, Outbox, SentEmail, SqliteCrm, UpsertOutcome,
};
use outreach_rs::outreach::research::StaticCatalog;
use outreach_rs::outreach::server::{self, AppState};
use outreach_rs::outreach::workflow::{Collaborators, Engine, StepKey, WorkflowEvent};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

const SENDER: &str = "Jordan Lee";
const SIGN_OFF: &str = "Best regards,\n\nJordan Lee";

// ============================================================================
// Mock Components
// ============================================================================

/// Mock model that returns a fixed text and counts calls
struct MockModel {
    text: String,
    calls: AtomicUsize,
}

impl MockModel {
    fn new(text: &str) -> Self {
        Self {
            text: text.to_string(),
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl Model for MockModel {
    fn provider(&self) -> &str {
        "mock"
    }

    async fn generate_content(
        &self,
        _history: &[Content],
        _config: Option<&GenerationConfig>,
    ) -> Result<Content, ModelError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(Content::model(self.text.clone()))
    }
}

fn model_generator(model: Arc<MockModel>) -> Arc<dyn TextGenerator> {
    Arc::new(ModelGenerator::new(model, GenerationConfig::default()))
}

/// Lead store whose every call fails
struct BrokenLeadStore;

#[async_trait]
impl LeadStore for BrokenLeadStore {
    async fn upsert(
        &self,
        _company_domain: &str,
        _fields: LeadFields,
    ) -> Result<(Lead, UpsertOutcome), StorageError> {
        Err(StorageError::LockPoisoned)
    }

    async fn get(&self, id: i64) -> Result<Lead, StorageError> {
        Err(StorageError::not_found("lead", id))
    }

    async fn delete(&self, id: i64) -> Result<(), StorageError> {
        Err(StorageError::not_found("lead", id))
    }

    async fn list(&self, _skip: u32, _limit: u32) -> Result<Vec<Lead>, StorageError> {
        Err(StorageError::LockPoisoned)
    }
}

/// Outbox that refuses to record
struct BrokenOutbox;

#[async_trait]
impl Outbox for BrokenOutbox {
    async fn record(
        &self,
        _lead_id: i64,
        _subject: &str,
        _body: &str,
    ) -> Result<SentEmail, StorageError> {
        Err(StorageError::LockPoisoned)
    }

    async fn list(&self, _skip: u32, _limit: u32) -> Result<Vec<SentEmail>, StorageError> {
        Ok(vec![])
    }

    async fn list_for_lead(&self, _lead_id: i64) -> Result<Vec<SentEmail>, StorageError> {
        Ok(vec![])
    }
}

fn crm() -> Arc<SqliteCrm> {
    Arc::new(SqliteCrm::open_in_memory().unwrap())
}

fn engine_with(crm: Arc<SqliteCrm>, generator: Arc<dyn TextGenerator>) -> Engine {
    Engine::new(Collaborators::new(
        Arc::new(StaticCatalog::new()),
        generator,
        crm.clone(),
        crm,
        SENDER,
    ))
}

fn offline_engine(crm: Arc<SqliteCrm>) -> Engine {
    engine_with(crm, Arc::new(UnavailableGenerator::new("no API key")))
}

// ============================================================================
// End-to-end Tests
// ============================================================================

#[tokio::test]
async fn test_acme_end_to_end_with_unreachable_generator() {
    let crm = crm();
    let engine = offline_engine(crm.clone());

    let result = engine.run("acme.io").await.unwrap();

    assert_eq!(result.status, "completed");
    assert_eq!(result.company_identifier, "acme.io");
    assert_eq!(result.research_facts.company_name, "Acme");
    assert_eq!(result.lead_record.name, "Acme");
    assert!(result.draft.body.starts_with("Hi Acme,"));
    assert!(result.draft.body.ends_with(SIGN_OFF));
    assert!(matches!(
        result.draft_origin,
        DraftOrigin::Canned {
            reason: ErrorKind::CollaboratorError,
            ..
        }
    ));

    let emails = crm.list_for_lead(result.lead_record.id).await.unwrap();
    assert_eq!(emails.len(), 1);
    assert_eq!(emails[0].id, result.send_result.id);
    assert!(emails[0].sent_at.is_some());
}

#[tokio::test]
async fn test_rerun_updates_existing_lead() {
    let crm = crm();
    let engine = offline_engine(crm.clone());

    let first = engine.run("acme.io").await.unwrap();
    let second = engine.run("https://www.acme.io").await.unwrap();

    assert_eq!(first.lead_record.id, second.lead_record.id);
    assert_ne!(first.send_result.id, second.send_result.id);

    let leads = LeadStore::list(crm.as_ref(), 0, 10).await.unwrap();
    assert_eq!(leads.len(), 1);
    assert!(leads[0].updated_at >= leads[0].created_at);

    let emails = crm.list_for_lead(first.lead_record.id).await.unwrap();
    assert_eq!(emails.len(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_runs_create_one_lead() {
    let crm = crm();
    let engine = Arc::new(offline_engine(crm.clone()));

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let engine = engine.clone();
            tokio::spawn(async move { engine.run("acme.io").await })
        })
        .collect();

    let mut ids = Vec::new();
    for handle in handles {
        ids.push(handle.await.unwrap().unwrap().lead_record.id);
    }
    ids.dedup();
    assert_eq!(ids.len(), 1);

    let leads = LeadStore::list(crm.as_ref(), 0, 100).await.unwrap();
    assert_eq!(leads.len(), 1);
    assert_eq!(Outbox::list(crm.as_ref(), 0, 100).await.unwrap().len(), 8);
}

#[tokio::test]
async fn test_blank_identifier_writes_nothing() {
    let crm = crm();
    let engine = offline_engine(crm.clone());

    let err = engine.run("   ").await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::InvalidInput);

    assert!(LeadStore::list(crm.as_ref(), 0, 10).await.unwrap().is_empty());
    assert!(Outbox::list(crm.as_ref(), 0, 10).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_known_company_uses_catalog_facts() {
    let result = offline_engine(crm()).run("stripe.com").await.unwrap();
    assert_eq!(result.research_facts.company_name, "Stripe");
    assert_eq!(
        result.lead_record.industry.as_deref(),
        Some("Financial Technology")
    );
    assert!(result.draft.body.starts_with("Hi Stripe,"));
}

// ============================================================================
// Generation and Contract Tests
// ============================================================================

#[tokio::test]
async fn test_fenced_generation_is_repaired() {
    let draft = json!({
        "subject": "\"Operational Efficiency\" for Acme",
        "body": "Hi Acme,\n\nYour growth is impressive!\n\nLet us talk.\n\nRegards,"
    });
    let raw = format!("Here you go:\n```json\n{}\n```", draft);
    let model = Arc::new(MockModel::new(&raw));

    let result = engine_with(crm(), model_generator(model.clone()))
        .run("acme.io")
        .await
        .unwrap();

    assert_eq!(model.calls.load(Ordering::SeqCst), 1);
    assert_eq!(result.draft_origin, DraftOrigin::Generated);
    assert_eq!(result.draft.subject, "Operational Efficiency for Acme");
    assert_eq!(
        result.draft.body,
        "Hi Acme,\n\nYour growth is impressive.\n\nLet us talk.\n\nBest regards,\n\nJordan Lee"
    );
}

#[tokio::test]
async fn test_unparsable_generation_falls_back() {
    let model = Arc::new(MockModel::new("Sure! I'd love to write that email."));
    let result = engine_with(crm(), model_generator(model))
        .run("acme.io")
        .await
        .unwrap();

    assert_eq!(result.status, "completed");
    assert!(matches!(
        result.draft_origin,
        DraftOrigin::Canned {
            reason: ErrorKind::ParseFailure,
            ..
        }
    ));
    let contract = ContentContract::new("Acme", SENDER, "Best regards,");
    assert!(validate(&result.draft, &contract).is_empty());
}

#[tokio::test]
async fn test_foreign_sender_falls_back_to_canned() {
    let draft = EmailDraft {
        subject: "Acme and automation".to_string(),
        body: "Hi Acme,\n\nA short note.\n\nBest regards,\n\nSam Smith".to_string(),
    };
    let model = Arc::new(MockModel::new(&serde_json::to_string(&draft).unwrap()));
    let result = engine_with(crm(), model_generator(model))
        .run("acme.io")
        .await
        .unwrap();

    assert!(result.draft_origin.is_canned());
    assert!(!result.draft.body.contains("Sam Smith"));
    assert!(result.draft.body.ends_with(SIGN_OFF));
}

#[tokio::test]
async fn test_draft_never_contains_banned_characters() {
    let draft = json!({
        "subject": "\u{201C}Acme\u{201D} \u{00AB}now\u{00BB}",
        "body": "\"Hello\"!! We \u{201E}love\u{201F} Acme!"
    });
    let model = Arc::new(MockModel::new(&draft.to_string()));
    let result = engine_with(crm(), model_generator(model))
        .run("acme.io")
        .await
        .unwrap();

    let banned = ['"', '\u{201C}', '\u{201D}', '\u{201E}', '\u{201F}', '\u{00AB}', '\u{00BB}', '!'];
    assert!(!result.draft.body.chars().any(|c| banned.contains(&c)));
    assert!(!result.draft.subject.chars().any(|c| banned.contains(&c)));
    assert!(result.draft.body.starts_with("Hi Acme,"));
}

// ============================================================================
// Failure Tests
// ============================================================================

#[tokio::test]
async fn test_lead_store_failure_is_fatal() {
    let crm = crm();
    let engine = Engine::new(Collaborators::new(
        Arc::new(StaticCatalog::new()),
        Arc::new(UnavailableGenerator::new("offline")),
        Arc::new(BrokenLeadStore),
        crm.clone(),
        SENDER,
    ));

    let err = engine.run("acme.io").await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::StorageFailure);
    assert_eq!(err.step, StepKey::UpsertLead);
    assert!(Outbox::list(crm.as_ref(), 0, 10).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_outbox_failure_is_fatal() {
    let crm = crm();
    let engine = Engine::new(Collaborators::new(
        Arc::new(StaticCatalog::new()),
        Arc::new(UnavailableGenerator::new("offline")),
        crm.clone(),
        Arc::new(BrokenOutbox),
        SENDER,
    ));

    let err = engine.run("acme.io").await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::StorageFailure);
    assert_eq!(err.step, StepKey::RecordSend);

    let json = serde_json::to_value(&err).unwrap();
    assert_eq!(json["kind"], "STORAGE_FAILURE");
    assert_eq!(json["step"], "record_send");
}

// ============================================================================
// Streaming Tests
// ============================================================================

#[tokio::test]
async fn test_run_stream_event_order() {
    let engine = offline_engine(crm());
    let (tx, mut rx) = mpsc::channel(32);

    let result = engine.run_stream("acme.io", tx).await.unwrap();

    let mut events = Vec::new();
    while let Some(event) = rx.recv().await {
        events.push(event);
    }

    let names: Vec<&str> = events.iter().map(|e| e.name()).collect();
    assert_eq!(
        names,
        vec![
            "started",
            "step_completed",
            "step_completed",
            "step_completed",
            "step_completed",
            "completed"
        ]
    );

    let steps: Vec<StepKey> = events
        .iter()
        .filter_map(|e| match e {
            WorkflowEvent::StepCompleted(t) => Some(t.step),
            _ => None,
        })
        .collect();
    assert_eq!(
        steps,
        vec![
            StepKey::Research,
            StepKey::UpsertLead,
            StepKey::DraftMessage,
            StepKey::RecordSend
        ]
    );

    match events.last() {
        Some(WorkflowEvent::Completed(done)) => assert_eq!(**done, result),
        other => panic!("unexpected last event: {:?}", other),
    }
}

#[tokio::test]
async fn test_execute_returns_transcript() {
    let state = offline_engine(crm()).execute("acme.io").await.unwrap();
    assert_eq!(state.transcript.len(), 4);
    assert_eq!(state.transcript[3].next, StepKey::End);
    assert!(state.transcript[1].summary.starts_with("created lead"));
}

// ============================================================================
// HTTP Tests
// ============================================================================

async fn spawn_server() -> String {
    let crm = crm();
    let state = AppState {
        engine: Arc::new(offline_engine(crm.clone())),
        leads: crm.clone(),
        outbox: crm,
    };
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(server::serve_on(listener, state));
    format!("http://{}", addr)
}

#[tokio::test]
async fn test_http_research_and_lead_lookup() {
    let base = spawn_server().await;
    let client = reqwest::Client::new();

    let health: Value = client
        .get(format!("{}/api/health", base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health["status"], "ok");

    let response = client
        .post(format!("{}/api/research", base))
        .json(&json!({ "company_domain": "acme.io" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let result: Value = response.json().await.unwrap();
    assert_eq!(result["status"], "completed");
    let lead_id = result["lead_record"]["id"].as_i64().unwrap();

    let lead: Value = client
        .get(format!("{}/api/leads/{}", base, lead_id))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(lead["company_domain"], "acme.io");

    let emails: Vec<Value> = client
        .get(format!("{}/api/leads/{}/emails", base, lead_id))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(emails.len(), 1);
    assert_eq!(emails[0]["status"], "sent");

    let deleted = client
        .delete(format!("{}/api/leads/{}", base, lead_id))
        .send()
        .await
        .unwrap();
    assert_eq!(deleted.status(), 200);

    let all_emails: Vec<Value> = client
        .get(format!("{}/api/emails?limit=10", base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(all_emails.len(), 1);
}

#[tokio::test]
async fn test_http_error_statuses() {
    let base = spawn_server().await;
    let client = reqwest::Client::new();

    let missing = client
        .get(format!("{}/api/leads/999", base))
        .send()
        .await
        .unwrap();
    assert_eq!(missing.status(), 404);

    let blank = client
        .post(format!("{}/api/research", base))
        .json(&json!({ "company_domain": "  " }))
        .send()
        .await
        .unwrap();
    assert_eq!(blank.status(), 400);
}
