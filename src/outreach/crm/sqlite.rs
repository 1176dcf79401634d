// SPDX-License-Identifier: MIT

//! SQLite-backed lead store and outbox
//!
//! One connection behind a mutex serializes every write, and each upsert
//! runs its lookup and write inside a single `IMMEDIATE` transaction. The
//! `UNIQUE(company_domain)` constraint backs this up when another process
//! shares the database file. All rusqlite calls run on the blocking pool
//! via `spawn_blocking`, so waiting on the lock or a busy database never
//! stalls an async worker.

use super::{EmailStatus, Lead, LeadFields, LeadStore, Outbox, SentEmail, UpsertOutcome};
use crate::adk::error::StorageError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Row, TransactionBehavior};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS leads (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    company_domain TEXT NOT NULL UNIQUE,
    company_name TEXT NOT NULL,
    industry TEXT,
    description TEXT,
    research_summary TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS emails (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    lead_id INTEGER NOT NULL,
    subject TEXT NOT NULL,
    body TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'sent',
    created_at TEXT NOT NULL,
    sent_at TEXT
);
CREATE INDEX IF NOT EXISTS idx_emails_lead_id ON emails (lead_id);
";

const LEAD_COLUMNS: &str = "id, company_domain, company_name, industry, description, \
                            research_summary, created_at, updated_at";
const EMAIL_COLUMNS: &str = "id, lead_id, subject, body, status, created_at, sent_at";

/// Lead store and outbox sharing one SQLite connection
#[derive(Debug, Clone)]
pub struct SqliteCrm {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteCrm {
    /// Open (and create if needed) a database file
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(Duration::from_secs(5))?;
        Self::with_connection(conn)
    }

    /// Fresh private in-memory database
    pub fn open_in_memory() -> Result<Self, StorageError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, StorageError> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StorageError> {
        self.conn.lock().map_err(|_| StorageError::LockPoisoned)
    }

    fn upsert_blocking(
        &self,
        company_domain: &str,
        fields: &LeadFields,
    ) -> Result<(Lead, UpsertOutcome), StorageError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let now = Utc::now();

        let outcome = match find_lead_id(&tx, company_domain)? {
            Some(id) => {
                update_lead(&tx, id, fields, now)?;
                (id, UpsertOutcome::Updated)
            }
            None => match insert_lead(&tx, company_domain, fields, now) {
                Ok(id) => (id, UpsertOutcome::Created),
                Err(e) if is_unique_violation(&e) => {
                    log::warn!(
                        "Insert for {} hit the uniqueness constraint, retrying as update",
                        company_domain
                    );
                    let id = find_lead_id(&tx, company_domain)?.ok_or(StorageError::Sqlite(e))?;
                    update_lead(&tx, id, fields, now)?;
                    (id, UpsertOutcome::Updated)
                }
                Err(e) => return Err(e.into()),
            },
        };

        let lead = tx.query_row(
            &format!("SELECT {} FROM leads WHERE id = ?1", LEAD_COLUMNS),
            params![outcome.0],
            lead_from_row,
        )?;
        tx.commit()?;

        Ok((lead, outcome.1))
    }

    fn get_blocking(&self, id: i64) -> Result<Lead, StorageError> {
        let conn = self.lock()?;
        conn.query_row(
            &format!("SELECT {} FROM leads WHERE id = ?1", LEAD_COLUMNS),
            params![id],
            lead_from_row,
        )
        .optional()?
        .ok_or_else(|| StorageError::not_found("lead", id))
    }

    fn delete_blocking(&self, id: i64) -> Result<(), StorageError> {
        let conn = self.lock()?;
        let removed = conn.execute("DELETE FROM leads WHERE id = ?1", params![id])?;
        if removed == 0 {
            return Err(StorageError::not_found("lead", id));
        }
        Ok(())
    }

    fn list_leads_blocking(&self, skip: u32, limit: u32) -> Result<Vec<Lead>, StorageError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM leads ORDER BY created_at DESC, id DESC LIMIT ?1 OFFSET ?2",
            LEAD_COLUMNS
        ))?;
        let leads = stmt
            .query_map(params![limit, skip], lead_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(leads)
    }

    fn record_blocking(
        &self,
        lead_id: i64,
        subject: &str,
        body: &str,
    ) -> Result<SentEmail, StorageError> {
        let conn = self.lock()?;
        let now = Utc::now();
        conn.execute(
            "INSERT INTO emails (lead_id, subject, body, status, created_at, sent_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![lead_id, subject, body, EmailStatus::Sent, now, now],
        )?;

        Ok(SentEmail {
            id: conn.last_insert_rowid(),
            lead_id,
            subject: subject.to_string(),
            body: body.to_string(),
            status: EmailStatus::Sent,
            created_at: now,
            sent_at: Some(now),
        })
    }

    fn list_emails_blocking(
        &self,
        lead_id: Option<i64>,
        skip: u32,
        limit: u32,
    ) -> Result<Vec<SentEmail>, StorageError> {
        let conn = self.lock()?;
        let emails = match lead_id {
            Some(lead_id) => {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {} FROM emails WHERE lead_id = ?1 \
                     ORDER BY created_at DESC, id DESC LIMIT ?2 OFFSET ?3",
                    EMAIL_COLUMNS
                ))?;
                let rows = stmt.query_map(params![lead_id, limit, skip], email_from_row)?;
                rows.collect::<Result<Vec<_>, _>>()?
            }
            None => {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {} FROM emails ORDER BY created_at DESC, id DESC LIMIT ?1 OFFSET ?2",
                    EMAIL_COLUMNS
                ))?;
                let rows = stmt.query_map(params![limit, skip], email_from_row)?;
                rows.collect::<Result<Vec<_>, _>>()?
            }
        };
        Ok(emails)
    }
}

fn find_lead_id(conn: &Connection, company_domain: &str) -> rusqlite::Result<Option<i64>> {
    conn.query_row(
        "SELECT id FROM leads WHERE company_domain = ?1",
        params![company_domain],
        |row| row.get(0),
    )
    .optional()
}

fn insert_lead(
    conn: &Connection,
    company_domain: &str,
    fields: &LeadFields,
    now: DateTime<Utc>,
) -> rusqlite::Result<i64> {
    conn.execute(
        "INSERT INTO leads (company_domain, company_name, industry, description, \
         research_summary, created_at, updated_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
        params![
            company_domain,
            fields.company_name,
            fields.industry,
            fields.description,
            fields.research_summary,
            now
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

fn update_lead(
    conn: &Connection,
    id: i64,
    fields: &LeadFields,
    now: DateTime<Utc>,
) -> rusqlite::Result<()> {
    conn.execute(
        "UPDATE leads SET company_name = ?1, industry = ?2, description = ?3, \
         research_summary = ?4, updated_at = ?5 WHERE id = ?6",
        params![
            fields.company_name,
            fields.industry,
            fields.description,
            fields.research_summary,
            now,
            id
        ],
    )?;
    Ok(())
}

fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _) if e.code == ErrorCode::ConstraintViolation
    )
}

fn lead_from_row(row: &Row<'_>) -> rusqlite::Result<Lead> {
    Ok(Lead {
        id: row.get(0)?,
        company_domain: row.get(1)?,
        company_name: row.get(2)?,
        industry: row.get(3)?,
        description: row.get(4)?,
        research_summary: row.get(5)?,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
    })
}

fn email_from_row(row: &Row<'_>) -> rusqlite::Result<SentEmail> {
    Ok(SentEmail {
        id: row.get(0)?,
        lead_id: row.get(1)?,
        subject: row.get(2)?,
        body: row.get(3)?,
        status: row.get(4)?,
        created_at: row.get(5)?,
        sent_at: row.get(6)?,
    })
}

impl ToSql for EmailStatus {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for EmailStatus {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let s = value.as_str()?;
        EmailStatus::parse(s)
            .ok_or_else(|| FromSqlError::Other(format!("unknown email status: {}", s).into()))
    }
}

impl SqliteCrm {
    /// Run blocking database work off the async worker threads.
    ///
    /// The closure runs to commit or rollback even if the caller is
    /// cancelled, so a dropped run never leaves a transaction half done.
    async fn blocking<T, F>(&self, work: F) -> Result<T, StorageError>
    where
        T: Send + 'static,
        F: FnOnce(&SqliteCrm) -> Result<T, StorageError> + Send + 'static,
    {
        let crm = self.clone();
        tokio::task::spawn_blocking(move || work(&crm)).await?
    }
}

#[async_trait]
impl LeadStore for SqliteCrm {
    async fn upsert(
        &self,
        company_domain: &str,
        fields: LeadFields,
    ) -> Result<(Lead, UpsertOutcome), StorageError> {
        let company_domain = company_domain.to_string();
        self.blocking(move |crm| crm.upsert_blocking(&company_domain, &fields))
            .await
    }

    async fn get(&self, id: i64) -> Result<Lead, StorageError> {
        self.blocking(move |crm| crm.get_blocking(id)).await
    }

    async fn delete(&self, id: i64) -> Result<(), StorageError> {
        self.blocking(move |crm| crm.delete_blocking(id)).await
    }

    async fn list(&self, skip: u32, limit: u32) -> Result<Vec<Lead>, StorageError> {
        self.blocking(move |crm| crm.list_leads_blocking(skip, limit))
            .await
    }
}

#[async_trait]
impl Outbox for SqliteCrm {
    async fn record(
        &self,
        lead_id: i64,
        subject: &str,
        body: &str,
    ) -> Result<SentEmail, StorageError> {
        let subject = subject.to_string();
        let body = body.to_string();
        self.blocking(move |crm| crm.record_blocking(lead_id, &subject, &body))
            .await
    }

    async fn list(&self, skip: u32, limit: u32) -> Result<Vec<SentEmail>, StorageError> {
        self.blocking(move |crm| crm.list_emails_blocking(None, skip, limit))
            .await
    }

    async fn list_for_lead(&self, lead_id: i64) -> Result<Vec<SentEmail>, StorageError> {
        self.blocking(move |crm| crm.list_emails_blocking(Some(lead_id), 0, u32::MAX))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields(name: &str, industry: &str) -> LeadFields {
        LeadFields {
            company_name: name.to_string(),
            industry: Some(industry.to_string()),
            description: Some(format!("{} does things", name)),
            research_summary: Some("{}".to_string()),
        }
    }

    #[tokio::test]
    async fn test_upsert_inserts_then_updates() {
        let crm = SqliteCrm::open_in_memory().unwrap();

        let (first, outcome) = crm
            .upsert("acme.io", fields("Acme", "Technology"))
            .await
            .unwrap();
        assert_eq!(outcome, UpsertOutcome::Created);
        assert_eq!(first.company_domain, "acme.io");

        let (second, outcome) = crm
            .upsert("acme.io", fields("Acme Corp", "Logistics"))
            .await
            .unwrap();
        assert_eq!(outcome, UpsertOutcome::Updated);
        assert_eq!(second.id, first.id);
        assert_eq!(second.company_name, "Acme Corp");
        assert_eq!(second.industry.as_deref(), Some("Logistics"));
        assert_eq!(second.created_at, first.created_at);
        assert!(second.updated_at >= first.updated_at);

        assert_eq!(LeadStore::list(&crm, 0, 100).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_distinct_domains_get_distinct_ids() {
        let crm = SqliteCrm::open_in_memory().unwrap();
        let (a, _) = crm.upsert("a.com", fields("A", "x")).await.unwrap();
        let (b, _) = crm.upsert("b.com", fields("B", "y")).await.unwrap();
        assert_ne!(a.id, b.id);

        let leads = LeadStore::list(&crm, 0, 10).await.unwrap();
        assert_eq!(leads.len(), 2);
        assert_eq!(leads[0].id, b.id, "newest first");

        let page = LeadStore::list(&crm, 1, 10).await.unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].id, a.id);
    }

    #[tokio::test]
    async fn test_get_and_delete() {
        let crm = SqliteCrm::open_in_memory().unwrap();
        let (lead, _) = crm.upsert("acme.io", fields("Acme", "x")).await.unwrap();

        assert_eq!(crm.get(lead.id).await.unwrap(), lead);

        crm.delete(lead.id).await.unwrap();
        assert!(crm.get(lead.id).await.unwrap_err().is_not_found());
        assert!(crm.delete(lead.id).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_deleted_ids_are_not_reused() {
        let crm = SqliteCrm::open_in_memory().unwrap();
        let (first, _) = crm.upsert("acme.io", fields("Acme", "x")).await.unwrap();
        crm.delete(first.id).await.unwrap();

        let (again, outcome) = crm.upsert("acme.io", fields("Acme", "x")).await.unwrap();
        assert_eq!(outcome, UpsertOutcome::Created);
        assert!(again.id > first.id);
    }

    #[tokio::test]
    async fn test_outbox_records_sent_email() {
        let crm = SqliteCrm::open_in_memory().unwrap();
        let (lead, _) = crm.upsert("acme.io", fields("Acme", "x")).await.unwrap();

        let sent = crm.record(lead.id, "Subject", "Body").await.unwrap();
        assert_eq!(sent.status, EmailStatus::Sent);
        assert_eq!(sent.sent_at, Some(sent.created_at));

        let for_lead = crm.list_for_lead(lead.id).await.unwrap();
        assert_eq!(for_lead.len(), 1);
        assert_eq!(for_lead[0].id, sent.id);
        assert_eq!(for_lead[0].status, EmailStatus::Sent);

        assert!(crm.list_for_lead(lead.id + 1).await.unwrap().is_empty());
        assert_eq!(Outbox::list(&crm, 0, 10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_delete_keeps_email_history() {
        let crm = SqliteCrm::open_in_memory().unwrap();
        let (lead, _) = crm.upsert("acme.io", fields("Acme", "x")).await.unwrap();
        crm.record(lead.id, "Subject", "Body").await.unwrap();

        crm.delete(lead.id).await.unwrap();
        assert_eq!(crm.list_for_lead(lead.id).await.unwrap().len(), 1);
    }

    #[test]
    fn test_unique_constraint_is_enforced() {
        let crm = SqliteCrm::open_in_memory().unwrap();
        let conn = crm.lock().unwrap();
        let now = Utc::now();
        insert_lead(&conn, "acme.io", &fields("Acme", "x"), now).unwrap();

        let err = insert_lead(&conn, "acme.io", &fields("Acme", "x"), now).unwrap_err();
        assert!(is_unique_violation(&err));
    }

    #[test]
    fn test_file_database_persists_across_opens() {
        let dir = std::env::temp_dir().join(format!("outreach-crm-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("crm.db");

        let id = {
            let crm = SqliteCrm::open(&path).unwrap();
            crm.upsert_blocking("acme.io", &fields("Acme", "x")).unwrap().0.id
        };

        let reopened = SqliteCrm::open(&path).unwrap();
        let (lead, outcome) = reopened
            .upsert_blocking("acme.io", &fields("Acme", "y"))
            .unwrap();
        assert_eq!(outcome, UpsertOutcome::Updated);
        assert_eq!(lead.id, id);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_held_lock_does_not_stall_the_runtime() {
        let crm = SqliteCrm::open_in_memory().unwrap();
        let conn = crm.conn.clone();
        let guard = conn.lock().unwrap();

        let handles: Vec<_> = (0..4)
            .map(|i| {
                let crm = crm.clone();
                tokio::spawn(async move {
                    crm.upsert(&format!("company{}.io", i), fields("Co", "x"))
                        .await
                })
            })
            .collect();

        // Workers must stay free to run other tasks while the upserts wait
        let (tx, rx) = std::sync::mpsc::channel();
        tokio::spawn(async move {
            let _ = tx.send(());
        });
        let ran = rx.recv_timeout(Duration::from_secs(2));

        drop(guard);
        assert!(ran.is_ok());
        for handle in handles {
            handle.await.unwrap().unwrap();
        }
        assert_eq!(LeadStore::list(&crm, 0, 10).await.unwrap().len(), 4);
    }
}
