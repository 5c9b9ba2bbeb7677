//! Workflow Definition Provider for Baton
//!
//! Loads a JSON catalog of workflow definitions, caches it in memory, and
//! serves lookups to the engine. The catalog is read-only at runtime:
//! it is constructed once at startup (constructor injection, no lazy
//! globals) and only an explicit [`WorkflowCatalog::reload`] picks up
//! file edits.
//!
//! Loading also runs a data-quality pass over every chain
//! ([`CatalogDiagnostic`]): broken or ambiguous chains are logged as
//! warnings, never load failures, because the runtime contract keeps the
//! permissive first-listed entry-step fallback.

#![deny(unsafe_code)]

mod catalog;
mod diagnostics;

pub use catalog::WorkflowCatalog;
pub use diagnostics::{validate_document, CatalogDiagnostic};
