// SPDX-License-Identifier: MIT

//! Outreach workflow
//!
//! Research -> UpsertLead -> DraftMessage -> RecordSend -> End
//!
//! This module provides:
//! - `WorkflowState` - typed per-run state and transcript
//! - `Step` - one executor per routing key
//! - `Engine` - sequencing, routing and the final projection

pub mod engine;
pub mod prompt;
pub mod state;
pub mod steps;

pub use engine::{Collaborators, Engine, FinalResult, WorkflowEvent};
pub use prompt::build_prompt;
pub use state::{LeadRecord, SendResult, StepKey, TranscriptEvent, WorkflowState};
pub use steps::{
    DraftMessageStep, RecordSendStep, ResearchStep, Step, StepFailure, StepOutcome,
    UpsertLeadStep,
};
