//! Workflow Execution Engine for Baton
//!
//! The engine advances linear workflow instances one submission at a
//! time. It composes a definition catalog (`baton-catalog`), the
//! [`TemplateResolver`] for `{{stepId.fieldName}}` references, and an
//! instance store (`baton-store`).
//!
//! # Key Principle
//!
//! **The store is the only arbiter of progression.** The engine's own
//! checks are advisory; every accepted submission is handed to the
//! store as one atomic commit that re-validates the current step, so
//! concurrent submitters resolve to exactly one winner.
//!
//! # Example
//!
//! ```rust,no_run
//! use baton_catalog::WorkflowCatalog;
//! use baton_engine::WorkflowEngine;
//! use baton_store::InMemoryStore;
//! use baton_types::{StepId, WorkflowId};
//! use std::sync::Arc;
//!
//! # async fn demo() -> baton_types::WorkflowResult<()> {
//! let catalog = Arc::new(WorkflowCatalog::load("config/workflows.json")?);
//! let engine = WorkflowEngine::new(catalog, Arc::new(InMemoryStore::new()));
//!
//! // Start an instance; the initiator then submits the entry step
//! let instance = engine
//!     .start(&WorkflowId::new("equipment-request"), "alice@example.com", "ext-1")
//!     .await?;
//! let outcome = engine
//!     .submit(
//!         &instance.id,
//!         &StepId::new("request"),
//!         "alice@example.com",
//!         Default::default(),
//!     )
//!     .await?;
//! println!("now at {:?}", outcome.instance.current_step_id);
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]

mod engine;
mod resolver;
mod views;

pub use engine::{WorkflowEngine, DEFAULT_PAGE_LIMIT, MAX_PAGE_LIMIT};
pub use resolver::{TemplateResolver, INITIATOR_EMAIL_FIELD, INITIATOR_NAME_FIELD};
pub use views::{InstanceDetail, InstanceListing, PendingStep, StepAccess};
