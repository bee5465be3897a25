//! Job and generation registries.
//!
//! [`JobStore`] is the seam between the coordination logic and storage. The
//! in-process implementation, [`InMemoryJobStore`], keeps the job table and the
//! dispatch queue behind one lock; a shared transactional store can implement
//! the same trait for multi-process deployments.

pub mod generation_tracker;
pub mod job_store;
pub mod memory;

pub use generation_tracker::GenerationTracker;
pub use job_store::{AutoFixClaim, JobStore, StoreError, StoreResult};
pub use memory::InMemoryJobStore;
