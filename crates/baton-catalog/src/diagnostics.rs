//! Data-quality checks over a catalog document
//!
//! A malformed chain never fails the load: instances keep the permissive
//! first-listed entry fallback at runtime. These diagnostics give operators
//! the signal at load time instead.

use baton_types::{CatalogDocument, StepId, WorkflowDefinition, WorkflowId};
use std::collections::HashSet;

/// One defect found in a catalog document
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CatalogDiagnostic {
    /// Another workflow already uses this id; lookups only ever see the
    /// first occurrence.
    DuplicateWorkflowId { workflow: WorkflowId },
    /// Every step is referenced as a next step (or there are no steps),
    /// so instances of this workflow cannot start.
    NoEntryStep { workflow: WorkflowId },
    /// More than one step has no incoming reference; instances silently
    /// start at the first listed candidate.
    MultipleEntrySteps {
        workflow: WorkflowId,
        candidates: Vec<StepId>,
    },
    /// A `next_step` pointer references a step id that does not exist.
    DanglingNextStep {
        workflow: WorkflowId,
        step: StepId,
        next_step: StepId,
    },
    /// Two steps share an id; lookups only ever see the first.
    DuplicateStepId { workflow: WorkflowId, step: StepId },
    /// The step cannot be reached by following `next_step` pointers from
    /// the entry step.
    UnreachableStep { workflow: WorkflowId, step: StepId },
}

impl std::fmt::Display for CatalogDiagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DuplicateWorkflowId { workflow } => {
                write!(f, "duplicate workflow id '{}'", workflow)
            }
            Self::NoEntryStep { workflow } => {
                write!(f, "workflow '{}' has no entry step", workflow)
            }
            Self::MultipleEntrySteps {
                workflow,
                candidates,
            } => {
                let ids: Vec<&str> = candidates.iter().map(|c| c.as_str()).collect();
                write!(
                    f,
                    "workflow '{}' has {} entry-step candidates ({}); instances start at '{}'",
                    workflow,
                    candidates.len(),
                    ids.join(", "),
                    ids.first().unwrap_or(&"?"),
                )
            }
            Self::DanglingNextStep {
                workflow,
                step,
                next_step,
            } => write!(
                f,
                "workflow '{}': step '{}' points at unknown next step '{}'",
                workflow, step, next_step
            ),
            Self::DuplicateStepId { workflow, step } => {
                write!(f, "workflow '{}': duplicate step id '{}'", workflow, step)
            }
            Self::UnreachableStep { workflow, step } => write!(
                f,
                "workflow '{}': step '{}' is unreachable from the entry step",
                workflow, step
            ),
        }
    }
}

/// Inspect every workflow chain in the document
pub fn validate_document(document: &CatalogDocument) -> Vec<CatalogDiagnostic> {
    let mut diagnostics = Vec::new();

    let mut seen_workflows = HashSet::new();
    for workflow in &document.workflows {
        if !seen_workflows.insert(workflow.id.clone()) {
            diagnostics.push(CatalogDiagnostic::DuplicateWorkflowId {
                workflow: workflow.id.clone(),
            });
        }
        validate_chain(workflow, &mut diagnostics);
    }

    diagnostics
}

fn validate_chain(workflow: &WorkflowDefinition, diagnostics: &mut Vec<CatalogDiagnostic>) {
    let mut seen_steps = HashSet::new();
    for step in &workflow.steps {
        if !seen_steps.insert(step.id.clone()) {
            diagnostics.push(CatalogDiagnostic::DuplicateStepId {
                workflow: workflow.id.clone(),
                step: step.id.clone(),
            });
        }

        if let Some(next) = &step.next_step {
            if workflow.step(next).is_none() {
                diagnostics.push(CatalogDiagnostic::DanglingNextStep {
                    workflow: workflow.id.clone(),
                    step: step.id.clone(),
                    next_step: next.clone(),
                });
            }
        }
    }

    let candidates = workflow.entry_candidates();
    match candidates.len() {
        0 => {
            diagnostics.push(CatalogDiagnostic::NoEntryStep {
                workflow: workflow.id.clone(),
            });
            // reachability is meaningless without an entry step
            return;
        }
        1 => {}
        _ => diagnostics.push(CatalogDiagnostic::MultipleEntrySteps {
            workflow: workflow.id.clone(),
            candidates: candidates.iter().map(|s| s.id.clone()).collect(),
        }),
    }

    // Walk the chain from the runtime entry step; anything off that path
    // will never become current.
    let mut reachable = HashSet::new();
    let mut cursor = candidates.first().map(|s| s.id.clone());
    while let Some(id) = cursor {
        if !reachable.insert(id.clone()) {
            break;
        }
        cursor = workflow.step(&id).and_then(|s| s.next_step.clone());
    }

    for step in &workflow.steps {
        if !reachable.contains(&step.id) {
            diagnostics.push(CatalogDiagnostic::UnreachableStep {
                workflow: workflow.id.clone(),
                step: step.id.clone(),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use baton_types::StepDefinition;

    fn step(id: &str, next: Option<&str>) -> StepDefinition {
        StepDefinition {
            id: StepId::new(id),
            name: id.to_uppercase(),
            next_step: next.map(StepId::new),
            assigned_to: None,
            form: None,
        }
    }

    fn document(workflows: Vec<(&str, Vec<StepDefinition>)>) -> CatalogDocument {
        CatalogDocument {
            workflows: workflows
                .into_iter()
                .map(|(id, steps)| WorkflowDefinition {
                    id: WorkflowId::new(id),
                    name: id.to_uppercase(),
                    steps,
                })
                .collect(),
        }
    }

    #[test]
    fn test_clean_chain_has_no_diagnostics() {
        let doc = document(vec![(
            "onboard",
            vec![step("s1", Some("s2")), step("s2", None)],
        )]);
        assert!(validate_document(&doc).is_empty());
    }

    #[test]
    fn test_no_entry_step() {
        let doc = document(vec![("loop", vec![step("a", Some("b")), step("b", Some("a"))])]);
        let diags = validate_document(&doc);
        assert!(diags.contains(&CatalogDiagnostic::NoEntryStep {
            workflow: WorkflowId::new("loop"),
        }));
    }

    #[test]
    fn test_empty_workflow_has_no_entry_step() {
        let doc = document(vec![("empty", vec![])]);
        let diags = validate_document(&doc);
        assert_eq!(
            diags,
            vec![CatalogDiagnostic::NoEntryStep {
                workflow: WorkflowId::new("empty"),
            }]
        );
    }

    #[test]
    fn test_multiple_entry_candidates() {
        let doc = document(vec![("forked", vec![step("x", None), step("y", None)])]);
        let diags = validate_document(&doc);
        assert!(diags.iter().any(|d| matches!(
            d,
            CatalogDiagnostic::MultipleEntrySteps { candidates, .. } if candidates.len() == 2
        )));
        // the second candidate is off the runtime path
        assert!(diags.contains(&CatalogDiagnostic::UnreachableStep {
            workflow: WorkflowId::new("forked"),
            step: StepId::new("y"),
        }));
    }

    #[test]
    fn test_dangling_next_step() {
        let doc = document(vec![("broken", vec![step("s1", Some("ghost"))])]);
        let diags = validate_document(&doc);
        assert!(diags.contains(&CatalogDiagnostic::DanglingNextStep {
            workflow: WorkflowId::new("broken"),
            step: StepId::new("s1"),
            next_step: StepId::new("ghost"),
        }));
    }

    #[test]
    fn test_duplicate_step_id() {
        let doc = document(vec![("dup", vec![step("s1", Some("s2")), step("s1", Some("s2")), step("s2", None)])]);
        let diags = validate_document(&doc);
        assert!(diags.contains(&CatalogDiagnostic::DuplicateStepId {
            workflow: WorkflowId::new("dup"),
            step: StepId::new("s1"),
        }));
    }

    #[test]
    fn test_duplicate_workflow_id() {
        let doc = document(vec![
            ("wf", vec![step("s1", None)]),
            ("wf", vec![step("s1", None)]),
        ]);
        let diags = validate_document(&doc);
        assert!(diags.contains(&CatalogDiagnostic::DuplicateWorkflowId {
            workflow: WorkflowId::new("wf"),
        }));
    }

    #[test]
    fn test_diagnostic_messages() {
        let diag = CatalogDiagnostic::DanglingNextStep {
            workflow: WorkflowId::new("wf"),
            step: StepId::new("s1"),
            next_step: StepId::new("ghost"),
        };
        assert_eq!(
            diag.to_string(),
            "workflow 'wf': step 's1' points at unknown next step 'ghost'"
        );
    }
}
