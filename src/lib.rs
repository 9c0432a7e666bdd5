//! kbflow - Workflow-aware hybrid retrieval
//!
//! Turns a single semantic/keyword search primitive into specialised
//! retrieval workflows (root-cause analysis, trade studies, exploration and
//! planning), fuses dense and keyword rankings with reciprocal rank fusion,
//! and tracks project lifecycle and decision provenance in SQLite.

pub mod cli;
pub mod config;
pub mod error;
pub mod project;
pub mod retrieval;
pub mod storage;
pub mod strategies;
pub mod tools;
pub mod workflow;

pub use error::{ErrorCode, KbError, Result};
