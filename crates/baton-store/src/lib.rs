//! Baton Store: persistence for workflow instances and step executions
//!
//! # Key Concepts
//!
//! - **InstanceStore**: the single trait the engine talks to. Reads are
//!   plain lookups; writes bundle every row they touch.
//! - **SubmissionCommit**: a whole submission as one atomic unit, guarded
//!   by a compare-and-set on the instance's current step.
//! - **InMemoryStore**: HashMap-backed store for development and tests.
//! - **PostgresStore**: JSONB-backed store behind the `postgres` feature,
//!   using row locks to serialize submissions per instance.

#![deny(unsafe_code)]

mod memory;
#[cfg(feature = "postgres")]
mod postgres;
mod traits;

pub use memory::InMemoryStore;
#[cfg(feature = "postgres")]
pub use postgres::PostgresStore;
pub use traits::{
    InstanceFilter, InstancePage, InstanceRecord, InstanceStore, NextStepActivation,
    PendingExecution, PendingStepSeed, QueryWindow, SubmissionCommit, SubmissionOutcome,
};
