// SPDX-License-Identifier: MIT

//! CRM persistence
//!
//! This module provides:
//! - `LeadStore` - idempotent create-or-update of leads keyed by company domain
//! - `Outbox` - append-only record of sent emails
//! - `SqliteCrm` - both, backed by a single SQLite connection

mod sqlite;

pub use sqlite::SqliteCrm;

use crate::adk::error::StorageError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A persisted lead
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lead {
    pub id: i64,
    pub company_domain: String,
    pub company_name: String,
    pub industry: Option<String>,
    pub description: Option<String>,
    pub research_summary: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Mutable lead fields written on every upsert
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LeadFields {
    pub company_name: String,
    pub industry: Option<String>,
    pub description: Option<String>,
    pub research_summary: Option<String>,
}

/// Whether an upsert inserted a new row or touched an existing one
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpsertOutcome {
    Created,
    Updated,
}

/// Delivery status of an outbox entry. Recording is the send, so every
/// stored row is `sent`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmailStatus {
    Sent,
}

impl EmailStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            EmailStatus::Sent => "sent",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "sent" => Some(EmailStatus::Sent),
            _ => None,
        }
    }
}

/// A persisted outbox entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SentEmail {
    pub id: i64,
    pub lead_id: i64,
    pub subject: String,
    pub body: String,
    pub status: EmailStatus,
    pub created_at: DateTime<Utc>,
    pub sent_at: Option<DateTime<Utc>>,
}

/// Lead persistence keyed on company domain
#[async_trait]
pub trait LeadStore: Send + Sync {
    /// Insert the lead, or overwrite its mutable fields if the domain is
    /// already known. Atomic: concurrent calls for one domain yield one row.
    async fn upsert(
        &self,
        company_domain: &str,
        fields: LeadFields,
    ) -> Result<(Lead, UpsertOutcome), StorageError>;

    async fn get(&self, id: i64) -> Result<Lead, StorageError>;

    /// Remove a lead. Its email history stays in the outbox.
    async fn delete(&self, id: i64) -> Result<(), StorageError>;

    /// Leads, newest first
    async fn list(&self, skip: u32, limit: u32) -> Result<Vec<Lead>, StorageError>;
}

/// Bookkeeping sink for sent email. Nothing is delivered over the network.
#[async_trait]
pub trait Outbox: Send + Sync {
    async fn record(
        &self,
        lead_id: i64,
        subject: &str,
        body: &str,
    ) -> Result<SentEmail, StorageError>;

    /// Emails, newest first
    async fn list(&self, skip: u32, limit: u32) -> Result<Vec<SentEmail>, StorageError>;

    async fn list_for_lead(&self, lead_id: i64) -> Result<Vec<SentEmail>, StorageError>;
}
