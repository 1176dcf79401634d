// SPDX-License-Identifier: MIT

//! Research-to-send outreach workflow engine
//!
//! - [`adk`] - reusable plumbing: errors and LLM model clients
//! - [`outreach`] - company research, CRM persistence, the content
//!   contract for generated email and the workflow engine

pub mod adk;
pub mod outreach;
