//! Multi-stage generation pipeline: describe, derive, render, persist.
//!
//! The orchestrator composes the extractor and sanitizer from
//! `sparkit-core`, the generation collaborators from `sparkit-providers`,
//! the upload chain from `sparkit-storage` and the task ledger into one
//! request-scoped workflow.

pub mod config;
pub mod error;
pub mod fanout;
pub mod ledger;
pub mod orchestrator;
pub mod response;
pub mod workflow;

pub use config::PipelineConfig;
pub use error::{ErrorClass, PipelineError};
pub use ledger::{LedgerError, LedgerOutcome, PgTaskLedger, TaskLedger};
pub use orchestrator::{Collaborators, Orchestrator};
pub use response::BatchResponse;
pub use workflow::Workflow;
