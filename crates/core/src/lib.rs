//! Shipyard domain core.
//!
//! Pure types and functions shared by the store, the API server, and the
//! code-generation client. Nothing in this crate performs I/O.

pub mod aggregation;
pub mod auto_fix;
pub mod build_job;
pub mod error;
pub mod generation;
pub mod job_events;
pub mod report;
pub mod source_fixer;
pub mod types;
