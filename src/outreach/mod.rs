// SPDX-License-Identifier: MIT

//! The outreach application
//!
//! This module provides:
//! - `config` - settings from YAML and the environment
//! - `research` - company facts providers
//! - `crm` - lead store and outbox
//! - `contract` - validation and repair of generated drafts
//! - `workflow` - the step executors and engine
//! - `server` - HTTP API

pub mod config;
pub mod contract;
pub mod crm;
pub mod research;
pub mod server;
pub mod workflow;

pub use config::Settings;
pub use workflow::{Collaborators, Engine, FinalResult};
