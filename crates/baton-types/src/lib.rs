//! Core Domain Types for Baton
//!
//! Baton routes multi-step approval and intake processes: a workflow
//! definition is a single linear chain of steps, instantiated once per
//! submitter and advanced one step at a time by whoever is authorized
//! for the current step.
//!
//! # Key Concepts
//!
//! - **WorkflowDefinition**: An externally authored, immutable chain of
//!   steps linked by `next_step` pointers. The step nothing points to is
//!   the entry step; a step without a `next_step` terminates the chain.
//! - **WorkflowInstance**: One running execution of a definition,
//!   tracking the current step, the initiator, and lifecycle status.
//! - **StepExecution**: The record of one step's assignment and, once
//!   submitted, its captured data. Unique per (instance, step) pair.
//! - **Template reference**: A `{{stepId.fieldName}}` string (or a
//!   reserved identity token) resolved against instance and step history
//!   by the engine at authorization and presentation time.
//!
//! # Design Principles
//!
//! 1. Definitions are read-only at runtime; instances carry denormalized
//!    copies of anything they must survive without.
//! 2. The current step is the only step eligible for submission.
//! 3. Completed execution rows are immutable history.

#![deny(unsafe_code)]

mod definition;
mod errors;
mod execution;
mod instance;

pub use definition::*;
pub use errors::*;
pub use execution::*;
pub use instance::*;
