// SPDX-License-Identifier: MIT

//! Content contract for generated outreach email
//!
//! A generated draft must:
//! 1. open with `Hi <company>,`
//! 2. close with `<closing>\n\n<sender>`
//! 3. carry no quotation marks or exclamation marks in the body
//! 4. mention the company in a subject free of quotation marks
//!
//! Length (140 to 180 words) is advisory and only logged.
//!
//! [`enforce`] is total: whatever the generator returned, the result is a
//! draft that satisfies 1 to 4, either repaired from the generated text or
//! built from the canned template.

mod parse;
mod repair;

pub use parse::{parse_draft, ParseFailure};
pub use repair::{
    canned_draft, ensure_greeting, ensure_sign_off, is_quote, strip_banned, strip_quotes,
    QUOTE_CHARS,
};

use crate::adk::error::ErrorKind;
use crate::outreach::research::CompanyFacts;
use serde::{Deserialize, Serialize};
use std::ops::RangeInclusive;
use thiserror::Error;

/// Advisory body length in words
pub const WORD_TARGET: RangeInclusive<usize> = 140..=180;

/// Subject and body of an outreach email
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailDraft {
    pub subject: String,
    pub body: String,
}

/// The fixed structural rules a draft is held to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentContract {
    pub company_name: String,
    pub sender_name: String,
    pub closing: String,
}

impl ContentContract {
    /// Banned characters are removed from every part up front, so the
    /// greeting and sign-off can never violate the body rules.
    pub fn new(
        company_name: impl AsRef<str>,
        sender_name: impl AsRef<str>,
        closing: impl AsRef<str>,
    ) -> Self {
        let clean = |s: &str| {
            s.chars()
                .filter(|c| !is_quote(*c) && *c != '!')
                .collect::<String>()
                .split_whitespace()
                .collect::<Vec<_>>()
                .join(" ")
        };

        let company_name = match clean(company_name.as_ref()) {
            name if name.is_empty() => "there".to_string(),
            name => name,
        };

        Self {
            company_name,
            sender_name: clean(sender_name.as_ref()),
            closing: clean(closing.as_ref()),
        }
    }

    pub fn greeting(&self) -> String {
        format!("Hi {},", self.company_name)
    }

    pub fn sign_off(&self) -> String {
        format!("{}\n\n{}", self.closing, self.sender_name)
    }
}

/// Which draft field a violation concerns
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Field {
    Subject,
    Body,
}

impl std::fmt::Display for Field {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Field::Subject => f.write_str("subject"),
            Field::Body => f.write_str("body"),
        }
    }
}

/// A broken structural rule
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "violation", rename_all = "snake_case")]
pub enum Violation {
    #[error("body does not open with the greeting")]
    MissingGreeting,

    #[error("body does not end with the sign-off")]
    MissingSignOff,

    #[error("{field} contains banned character {ch:?}")]
    BannedCharacter { field: Field, ch: char },

    #[error("subject does not mention the company")]
    SubjectMissingCompany,

    #[error("draft is signed by {found} instead of the configured sender")]
    ForeignSender { found: String },
}

/// Check the hard rules (1 to 4). An empty list means the draft complies.
pub fn validate(draft: &EmailDraft, contract: &ContentContract) -> Vec<Violation> {
    let mut violations = Vec::new();

    if !draft.body.starts_with(&contract.greeting()) {
        violations.push(Violation::MissingGreeting);
    }
    if !draft.body.ends_with(&contract.sign_off()) {
        violations.push(Violation::MissingSignOff);
    }
    if let Some(ch) = draft.body.chars().find(|c| is_quote(*c) || *c == '!') {
        violations.push(Violation::BannedCharacter {
            field: Field::Body,
            ch,
        });
    }
    if let Some(ch) = draft.subject.chars().find(|c| is_quote(*c)) {
        violations.push(Violation::BannedCharacter {
            field: Field::Subject,
            ch,
        });
    }
    if !draft.subject.contains(&contract.company_name) {
        violations.push(Violation::SubjectMissingCompany);
    }

    violations
}

pub fn word_count(body: &str) -> usize {
    body.split_whitespace().count()
}

/// Log when the body misses the advisory length. Returns the word count.
pub fn check_length(body: &str) -> usize {
    let words = word_count(body);
    if !WORD_TARGET.contains(&words) {
        log::warn!(
            "Draft body is {} words, outside the {}-{} word target",
            words,
            WORD_TARGET.start(),
            WORD_TARGET.end()
        );
    }
    words
}

/// Run the repair pipeline and re-validate.
///
/// Always applied, even to drafts that already comply; a compliant draft
/// comes back unchanged.
pub fn repair(draft: &EmailDraft, contract: &ContentContract) -> Result<EmailDraft, Violation> {
    let subject = strip_quotes(&draft.subject).trim().to_string();

    let body = strip_banned(&draft.body);
    let body = ensure_greeting(body.trim(), contract);
    let body = ensure_sign_off(&body, contract)?;

    let repaired = EmailDraft { subject, body };
    match validate(&repaired, contract).into_iter().next() {
        Some(violation) => Err(violation),
        None => Ok(repaired),
    }
}

/// Where the final draft came from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "origin", rename_all = "snake_case")]
pub enum DraftOrigin {
    /// Generated text, parsed and repaired
    Generated,
    /// Canned template, with the reason the generated path was abandoned
    Canned { reason: ErrorKind, detail: String },
}

impl DraftOrigin {
    pub fn is_canned(&self) -> bool {
        matches!(self, DraftOrigin::Canned { .. })
    }
}

/// A draft that satisfies the contract, plus its provenance
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnforcedDraft {
    pub draft: EmailDraft,
    pub origin: DraftOrigin,
}

impl EnforcedDraft {
    /// Canned template substitute for a failed generation path
    pub fn canned(
        facts: &CompanyFacts,
        contract: &ContentContract,
        reason: ErrorKind,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            draft: canned_draft(facts, contract),
            origin: DraftOrigin::Canned {
                reason,
                detail: detail.into(),
            },
        }
    }
}

/// Turn raw generated text into a compliant draft. Never fails.
pub fn enforce(raw: &str, facts: &CompanyFacts, contract: &ContentContract) -> EnforcedDraft {
    let parsed = match parse_draft(raw) {
        Ok(draft) => draft,
        Err(e) => {
            log::warn!("Generated draft unparsable, using canned template: {}", e);
            return EnforcedDraft::canned(facts, contract, ErrorKind::ParseFailure, e.to_string());
        }
    };

    match repair(&parsed, contract) {
        Ok(draft) => {
            check_length(&draft.body);
            EnforcedDraft {
                draft,
                origin: DraftOrigin::Generated,
            }
        }
        Err(violation) => {
            log::warn!(
                "Generated draft not repairable ({}), using canned template",
                violation
            );
            EnforcedDraft::canned(
                facts,
                contract,
                ErrorKind::ParseFailure,
                violation.to_string(),
            )
        }
    }
}
