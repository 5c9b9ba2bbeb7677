//! The workflow catalog: loads, caches, and serves definitions
//!
//! Definitions are immutable once loaded. The catalog is constructed once
//! at startup and handed to the engine; `reload` re-reads the backing file
//! on operator demand. There is no implicit lazy loading.

use crate::diagnostics::{validate_document, CatalogDiagnostic};
use baton_types::{
    CatalogDocument, StepDefinition, StepId, WorkflowDefinition, WorkflowError, WorkflowId,
    WorkflowResult,
};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

/// Process-scoped, read-mostly provider of workflow definitions
#[derive(Debug)]
pub struct WorkflowCatalog {
    /// Backing file; None for synthetic catalogs built in tests
    path: Option<PathBuf>,
    document: RwLock<Arc<CatalogDocument>>,
}

impl WorkflowCatalog {
    /// Load the catalog from a JSON file. Fails if the file is absent or
    /// does not parse; a broken chain inside a parseable document is a
    /// warning, not a failure.
    pub fn load(path: impl Into<PathBuf>) -> WorkflowResult<Self> {
        let path = path.into();
        let document = read_document(&path)?;
        log_diagnostics(&document);

        tracing::info!(
            path = %path.display(),
            workflows = document.workflows.len(),
            "workflow catalog loaded"
        );

        Ok(Self {
            path: Some(path),
            document: RwLock::new(Arc::new(document)),
        })
    }

    /// Build a catalog from an already-parsed document (synthetic
    /// catalogs for tests, or callers with their own config source)
    pub fn from_document(document: CatalogDocument) -> Self {
        Self {
            path: None,
            document: RwLock::new(Arc::new(document)),
        }
    }

    /// Re-read the backing file and swap the cached document. Concurrent
    /// readers see either the old or the new catalog, never a torn state.
    /// Returns the number of workflows now served.
    pub fn reload(&self) -> WorkflowResult<usize> {
        let path = self.path.as_ref().ok_or_else(|| {
            WorkflowError::Configuration("catalog has no backing file to reload".to_string())
        })?;

        let document = read_document(path)?;
        log_diagnostics(&document);
        let count = document.workflows.len();

        let mut guard = self
            .document
            .write()
            .map_err(|_| WorkflowError::Store("catalog cache lock poisoned".to_string()))?;
        *guard = Arc::new(document);

        tracing::info!(path = %path.display(), workflows = count, "workflow catalog reloaded");
        Ok(count)
    }

    /// The current document snapshot
    pub fn snapshot(&self) -> WorkflowResult<Arc<CatalogDocument>> {
        let guard = self
            .document
            .read()
            .map_err(|_| WorkflowError::Store("catalog cache lock poisoned".to_string()))?;
        Ok(Arc::clone(&guard))
    }

    /// All definitions, in document order
    pub fn definitions(&self) -> WorkflowResult<Vec<WorkflowDefinition>> {
        Ok(self.snapshot()?.workflows.clone())
    }

    /// Look up a definition, tolerating absence
    pub fn find(&self, workflow_id: &WorkflowId) -> WorkflowResult<Option<WorkflowDefinition>> {
        Ok(self.snapshot()?.find(workflow_id).cloned())
    }

    /// Look up a definition that must exist
    pub fn definition(&self, workflow_id: &WorkflowId) -> WorkflowResult<WorkflowDefinition> {
        self.find(workflow_id)?
            .ok_or_else(|| WorkflowError::DefinitionNotFound(workflow_id.clone()))
    }

    /// Look up a step within a definition
    pub fn step(
        &self,
        workflow_id: &WorkflowId,
        step_id: &StepId,
    ) -> WorkflowResult<StepDefinition> {
        let definition = self.definition(workflow_id)?;
        definition
            .step(step_id)
            .cloned()
            .ok_or_else(|| WorkflowError::StepNotFound {
                workflow: workflow_id.clone(),
                step: step_id.clone(),
            })
    }

    /// The step a fresh instance of this workflow starts at
    pub fn entry_step(&self, workflow_id: &WorkflowId) -> WorkflowResult<StepDefinition> {
        let definition = self.definition(workflow_id)?;
        definition
            .entry_step()
            .cloned()
            .ok_or_else(|| WorkflowError::NoEntryStep(workflow_id.clone()))
    }

    /// Data-quality diagnostics for the current document
    pub fn validate(&self) -> WorkflowResult<Vec<CatalogDiagnostic>> {
        Ok(validate_document(&*self.snapshot()?))
    }

    /// Number of workflows currently served
    pub fn count(&self) -> WorkflowResult<usize> {
        Ok(self.snapshot()?.workflows.len())
    }
}

fn read_document(path: &Path) -> WorkflowResult<CatalogDocument> {
    let raw = std::fs::read_to_string(path).map_err(|e| {
        WorkflowError::Configuration(format!(
            "cannot read workflow catalog {}: {}",
            path.display(),
            e
        ))
    })?;

    serde_json::from_str(&raw).map_err(|e| {
        WorkflowError::Configuration(format!(
            "workflow catalog {} is not valid JSON: {}",
            path.display(),
            e
        ))
    })
}

fn log_diagnostics(document: &CatalogDocument) {
    for diagnostic in validate_document(document) {
        tracing::warn!(diagnostic = %diagnostic, "workflow catalog data-quality issue");
    }
}
