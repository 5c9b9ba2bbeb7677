//! Workflow Engine: the main entry point for running workflow instances
//!
//! The engine coordinates the catalog, the template resolver, and the
//! instance store. It:
//! 1. Starts instances positioned at a definition's entry step
//! 2. Checks who may act on a step, resolving assignee templates
//! 3. Accepts step submissions and advances the chain
//! 4. Assembles read models for listings and work queues
//!
//! The engine itself keeps no state between calls. Every submission is
//! handed to the store as a single atomic commit guarded by the step
//! the engine saw as current, so two racing submitters cannot both
//! advance the same instance.

use crate::resolver::TemplateResolver;
use crate::views::{InstanceDetail, InstanceListing, PendingStep, StepAccess};
use baton_catalog::WorkflowCatalog;
use baton_store::{
    InstanceFilter, InstanceStore, NextStepActivation, PendingStepSeed, QueryWindow,
    SubmissionCommit, SubmissionOutcome,
};
use baton_types::{
    InstanceId, StepData, StepDefinition, StepExecution, StepId, WorkflowDefinition,
    WorkflowError, WorkflowId, WorkflowInstance, WorkflowResult,
};
use std::sync::Arc;

/// Page size used when the caller does not ask for one
pub const DEFAULT_PAGE_LIMIT: usize = 100;
/// Hard cap on the page size a caller may ask for
pub const MAX_PAGE_LIMIT: usize = 500;

/// Runs workflow instances against a catalog of definitions
#[derive(Clone)]
pub struct WorkflowEngine {
    catalog: Arc<WorkflowCatalog>,
    store: Arc<dyn InstanceStore>,
    resolver: TemplateResolver,
}

impl WorkflowEngine {
    pub fn new(catalog: Arc<WorkflowCatalog>, store: Arc<dyn InstanceStore>) -> Self {
        let resolver = TemplateResolver::new(store.clone());
        Self {
            catalog,
            store,
            resolver,
        }
    }

    // ── Definitions ──────────────────────────────────────────────────

    /// All workflow definitions currently served
    pub fn definitions(&self) -> WorkflowResult<Vec<WorkflowDefinition>> {
        self.catalog.definitions()
    }

    /// One workflow definition by id
    pub fn definition(&self, workflow_id: &WorkflowId) -> WorkflowResult<WorkflowDefinition> {
        self.catalog.definition(workflow_id)
    }

    /// Re-read the catalog from its backing file. Running instances are
    /// not touched; they pick up the new definition on their next step.
    pub fn reload_definitions(&self) -> WorkflowResult<usize> {
        let count = self.catalog.reload()?;
        tracing::info!(workflows = count, "Reloaded workflow definitions");
        Ok(count)
    }

    // ── Lifecycle ────────────────────────────────────────────────────

    /// Start a new instance of a workflow, positioned at its entry step.
    ///
    /// No execution row is created for the entry step; the initiator is
    /// implicitly allowed to act on it and the row appears when they
    /// submit it.
    pub async fn start(
        &self,
        workflow_id: &WorkflowId,
        initiator_email: &str,
        initiator_external_id: &str,
    ) -> WorkflowResult<WorkflowInstance> {
        let definition = self.catalog.definition(workflow_id)?;
        let entry = definition
            .entry_step()
            .ok_or_else(|| WorkflowError::NoEntryStep(workflow_id.clone()))?;

        let instance = WorkflowInstance::start(
            definition.id.clone(),
            &definition.name,
            entry.id.clone(),
            initiator_email,
            initiator_external_id,
        );
        self.store.create_instance(instance.clone()).await?;

        tracing::info!(
            instance_id = %instance.id,
            workflow_id = %definition.id,
            entry_step = %instance.current_step_id.as_ref().map(|s| s.as_str()).unwrap_or("none"),
            "Started workflow instance"
        );
        Ok(instance)
    }

    /// Accept a submission for the instance's current step and advance
    /// the chain.
    ///
    /// Checks run in a fixed order: the instance must exist and be
    /// live, the submitted step must be current, the step must exist in
    /// the definition, and the actor must be authorized. The store then
    /// re-validates the current step under its own lock, so a stale
    /// read here surfaces as a conflict rather than a double advance.
    pub async fn submit(
        &self,
        instance_id: &InstanceId,
        step_id: &StepId,
        actor_email: &str,
        step_data: StepData,
    ) -> WorkflowResult<SubmissionOutcome> {
        let instance = self.instance(instance_id).await?;
        if instance.is_terminal() {
            return Err(WorkflowError::AlreadyTerminal(instance.id));
        }
        if !instance.is_current(step_id) {
            return Err(WorkflowError::StepNotCurrent {
                submitted: step_id.clone(),
                current: current_step_label(&instance),
            });
        }

        let definition = self.catalog.definition(&instance.workflow_id)?;
        let step = definition
            .step(step_id)
            .cloned()
            .ok_or_else(|| WorkflowError::StepNotFound {
                workflow: instance.workflow_id.clone(),
                step: step_id.clone(),
            })?;

        if !self.is_authorized(&step, &instance, actor_email).await? {
            return Err(WorkflowError::Unauthorized {
                step: step_id.clone(),
                actor: actor_email.to_string(),
            });
        }

        let next = self
            .next_activation(&definition, &step, &instance, step_id, &step_data)
            .await?;

        let outcome = self
            .store
            .commit_submission(SubmissionCommit {
                instance_id: instance.id,
                expected_current_step: step_id.clone(),
                step_name: step.name.clone(),
                actor_email: actor_email.to_string(),
                step_data,
                next,
            })
            .await?;

        tracing::info!(
            instance_id = %outcome.instance.id,
            step_id = %step_id,
            status = %outcome.instance.status,
            "Step submitted"
        );
        Ok(outcome)
    }

    /// Cancel a live instance. Its pending step rows are retired so
    /// they drop out of work queues.
    pub async fn cancel(&self, instance_id: &InstanceId) -> WorkflowResult<WorkflowInstance> {
        let instance = self.store.cancel_instance(instance_id).await?;
        tracing::info!(instance_id = %instance.id, "Cancelled workflow instance");
        Ok(instance)
    }

    // ── Access Checks ────────────────────────────────────────────────

    /// Check that `actor_email` may act on a step of an instance and, if
    /// so, return the step definition with form defaults resolved for
    /// this instance.
    ///
    /// The check does not require the step to be current; callers may
    /// inspect any step of the definition they are authorized for.
    pub async fn validate_step_access(
        &self,
        instance_id: &InstanceId,
        step_id: &StepId,
        actor_email: &str,
    ) -> WorkflowResult<StepAccess> {
        let instance = self.instance(instance_id).await?;
        let mut step = self.catalog.step(&instance.workflow_id, step_id)?;

        if !self.is_authorized(&step, &instance, actor_email).await? {
            return Err(WorkflowError::Unauthorized {
                step: step_id.clone(),
                actor: actor_email.to_string(),
            });
        }

        if let Some(form) = step.form.as_mut() {
            for field in form.fields.iter_mut() {
                if let Some(value) = field.value.take() {
                    field.value = Some(self.resolver.resolve(&value, &instance).await?);
                }
            }
        }

        Ok(StepAccess { step, instance })
    }

    /// Whether `actor_email` may act on `step` for this instance.
    ///
    /// A step without an assignee rule is open to anyone. The rule is
    /// resolved against completed steps only and compared to the actor
    /// case-insensitively.
    async fn is_authorized(
        &self,
        step: &StepDefinition,
        instance: &WorkflowInstance,
        actor_email: &str,
    ) -> WorkflowResult<bool> {
        let Some(rule) = step.assignee() else {
            return Ok(true);
        };
        let resolved = self.resolver.resolve_assignee(rule, instance, None).await?;
        Ok(resolved.eq_ignore_ascii_case(actor_email))
    }

    /// Work out what an accepted submission activates next.
    ///
    /// A pending row is seeded only when the next step both exists in
    /// the definition and carries an assignee rule; otherwise the
    /// instance pointer advances without one. The just-submitted data
    /// is passed to assignee resolution as an overlay, since the commit
    /// has not landed yet.
    async fn next_activation(
        &self,
        definition: &WorkflowDefinition,
        step: &StepDefinition,
        instance: &WorkflowInstance,
        submitted_step: &StepId,
        submitted_data: &StepData,
    ) -> WorkflowResult<Option<NextStepActivation>> {
        let Some(next_id) = step.next_step.as_ref() else {
            return Ok(None);
        };

        let pending = match definition.step(next_id) {
            Some(next_step) => match next_step.assignee() {
                Some(rule) => {
                    let assigned = self
                        .resolver
                        .resolve_assignee(rule, instance, Some((submitted_step, submitted_data)))
                        .await?;
                    Some(PendingStepSeed {
                        step_name: next_step.name.clone(),
                        assigned_to_email: Some(assigned),
                    })
                }
                None => None,
            },
            // Dangling next_step pointer: the pointer still advances,
            // there is just no row until the definition is fixed
            None => None,
        };

        Ok(Some(NextStepActivation {
            step_id: next_id.clone(),
            pending,
        }))
    }

    // ── Read Models ──────────────────────────────────────────────────

    /// One instance, bare
    pub async fn instance(&self, id: &InstanceId) -> WorkflowResult<WorkflowInstance> {
        self.store
            .get_instance(id)
            .await?
            .ok_or_else(|| WorkflowError::InstanceNotFound(*id))
    }

    /// One instance with its execution history and display metadata
    pub async fn instance_detail(&self, id: &InstanceId) -> WorkflowResult<InstanceDetail> {
        let instance = self.instance(id).await?;
        let executions = self.store.list_executions(id).await?;
        Ok(self.with_display_meta(instance, executions))
    }

    /// Page through instances matching `filter`, newest first.
    ///
    /// A missing limit falls back to the default; anything above the
    /// cap is clamped to it. An explicit zero yields an empty page,
    /// which still reports the total match count.
    pub async fn list_instances(
        &self,
        filter: &InstanceFilter,
        limit: Option<usize>,
        offset: usize,
    ) -> WorkflowResult<InstanceListing> {
        let limit = limit.unwrap_or(DEFAULT_PAGE_LIMIT).min(MAX_PAGE_LIMIT);
        let page = self
            .store
            .list_instances(filter, QueryWindow { limit, offset })
            .await?;
        let items = page
            .items
            .into_iter()
            .map(|record| self.with_display_meta(record.instance, record.executions))
            .collect();
        Ok(InstanceListing {
            items,
            total_count: page.total_count,
            limit,
            offset,
        })
    }

    /// All steps currently waiting on `email`, oldest first
    pub async fn pending_for_user(&self, email: &str) -> WorkflowResult<Vec<PendingStep>> {
        let rows = self.store.pending_for_assignee(email).await?;
        Ok(rows
            .into_iter()
            .map(|row| {
                let workflow_name = match self.catalog.find(&row.instance.workflow_id) {
                    Ok(Some(definition)) => definition.name,
                    _ => row.instance.workflow_name.clone(),
                };
                PendingStep {
                    instance: row.instance,
                    execution: row.execution,
                    workflow_name,
                }
            })
            .collect())
    }

    fn with_display_meta(
        &self,
        instance: WorkflowInstance,
        executions: Vec<StepExecution>,
    ) -> InstanceDetail {
        let (workflow_name, steps_count) = match self.catalog.find(&instance.workflow_id) {
            Ok(Some(definition)) => (definition.name.clone(), definition.step_count()),
            // Definition gone from the catalog: fall back to what the
            // instance recorded at start
            _ => (instance.workflow_name.clone(), executions.len()),
        };
        InstanceDetail {
            instance,
            executions,
            workflow_name,
            steps_count,
        }
    }
}

fn current_step_label(instance: &WorkflowInstance) -> String {
    instance
        .current_step_id
        .as_ref()
        .map(|id| id.as_str().to_string())
        .unwrap_or_else(|| "none".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use baton_store::InMemoryStore;
    use baton_types::{CatalogDocument, ExecutionStatus, InstanceStatus};
    use serde_json::{json, Value};

    fn make_catalog() -> Arc<WorkflowCatalog> {
        let document: CatalogDocument = serde_json::from_value(json!({
            "workflows": [{
                "id": "equipment-request",
                "name": "Equipment Request",
                "steps": [
                    {
                        "id": "request",
                        "name": "Request",
                        "next_step": "approval",
                        "form": {"fields": [
                            {"id": "item", "label": "Item", "type": "text", "required": true},
                            {"id": "manager", "label": "Manager", "type": "email", "required": true},
                            {"id": "requester", "label": "Requester", "type": "email",
                             "value": "{{request.user_email}}", "readonly": true}
                        ]}
                    },
                    {
                        "id": "approval",
                        "name": "Approval",
                        "next_step": "fulfillment",
                        "assignedTo": "{{request.manager}}",
                        "form": {"fields": [
                            {"id": "decision", "label": "Decision", "type": "select",
                             "options": ["approve", "reject"], "required": true}
                        ]}
                    },
                    {
                        "id": "fulfillment",
                        "name": "Fulfillment",
                        "assignedTo": "it@example.com"
                    }
                ]
            }]
        }))
        .expect("catalog document");
        Arc::new(WorkflowCatalog::from_document(document))
    }

    fn make_engine() -> WorkflowEngine {
        WorkflowEngine::new(make_catalog(), Arc::new(InMemoryStore::new()))
    }

    fn data(pairs: &[(&str, Value)]) -> StepData {
        pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.clone()))
            .collect()
    }

    const WF: &str = "equipment-request";
    const ALICE: &str = "alice@example.com";
    const BOB: &str = "bob@example.com";

    async fn started(engine: &WorkflowEngine) -> WorkflowInstance {
        engine
            .start(&WorkflowId::new(WF), ALICE, "ext-alice")
            .await
            .expect("start")
    }

    /// Submit the entry step so `approval` becomes current, assigned to
    /// Bob via the `{{request.manager}}` template
    async fn submitted_request(engine: &WorkflowEngine) -> WorkflowInstance {
        let instance = started(engine).await;
        engine
            .submit(
                &instance.id,
                &StepId::new("request"),
                ALICE,
                data(&[("item", json!("laptop")), ("manager", json!(BOB))]),
            )
            .await
            .expect("submit request");
        instance
    }

    #[tokio::test]
    async fn test_start_positions_instance_at_entry_step() {
        let engine = make_engine();
        let instance = started(&engine).await;

        assert_eq!(instance.status, InstanceStatus::Started);
        assert!(instance.is_current(&StepId::new("request")));

        // The entry step has no execution row until it is submitted
        let detail = engine.instance_detail(&instance.id).await.expect("detail");
        assert!(detail.executions.is_empty());
        assert!(detail.current_step_row().is_none());
        assert_eq!(detail.workflow_name, "Equipment Request");
        assert_eq!(detail.steps_count, 3);
    }

    #[tokio::test]
    async fn test_start_unknown_workflow() {
        let engine = make_engine();
        let err = engine
            .start(&WorkflowId::new("nope"), ALICE, "ext-alice")
            .await
            .expect_err("should fail");
        assert!(matches!(err, WorkflowError::DefinitionNotFound(_)));
    }

    #[tokio::test]
    async fn test_submit_advances_and_assigns_next_step() {
        let engine = make_engine();
        let instance = submitted_request(&engine).await;

        let detail = engine.instance_detail(&instance.id).await.expect("detail");
        assert_eq!(detail.instance.status, InstanceStatus::InProgress);
        assert!(detail.instance.is_current(&StepId::new("approval")));
        assert_eq!(detail.executions.len(), 2);

        let request = &detail.executions[0];
        assert_eq!(request.status, ExecutionStatus::Completed);
        assert_eq!(request.executed_by_email.as_deref(), Some(ALICE));

        let approval = detail.current_step_row().expect("pending row");
        assert_eq!(approval.status, ExecutionStatus::Pending);
        assert_eq!(approval.assigned_to_email.as_deref(), Some(BOB));
    }

    #[tokio::test]
    async fn test_submit_wrong_step_is_conflict() {
        let engine = make_engine();
        let instance = started(&engine).await;

        let err = engine
            .submit(&instance.id, &StepId::new("approval"), BOB, data(&[]))
            .await
            .expect_err("should conflict");
        assert!(matches!(err, WorkflowError::StepNotCurrent { .. }));
    }

    #[tokio::test]
    async fn test_submit_unauthorized_actor() {
        let engine = make_engine();
        let instance = submitted_request(&engine).await;

        let err = engine
            .submit(
                &instance.id,
                &StepId::new("approval"),
                "mallory@example.com",
                data(&[("decision", json!("approve"))]),
            )
            .await
            .expect_err("should be rejected");
        assert!(matches!(err, WorkflowError::Unauthorized { .. }));
    }

    #[tokio::test]
    async fn test_assignee_comparison_is_case_insensitive() {
        let engine = make_engine();
        let instance = submitted_request(&engine).await;

        engine
            .submit(
                &instance.id,
                &StepId::new("approval"),
                "Bob@Example.COM",
                data(&[("decision", json!("approve"))]),
            )
            .await
            .expect("case variant should pass");
    }

    #[tokio::test]
    async fn test_final_submission_completes_instance() {
        let engine = make_engine();
        let instance = submitted_request(&engine).await;

        engine
            .submit(
                &instance.id,
                &StepId::new("approval"),
                BOB,
                data(&[("decision", json!("approve"))]),
            )
            .await
            .expect("approve");
        let outcome = engine
            .submit(
                &instance.id,
                &StepId::new("fulfillment"),
                "it@example.com",
                data(&[]),
            )
            .await
            .expect("fulfill");

        assert_eq!(outcome.instance.status, InstanceStatus::Completed);
        assert!(outcome.instance.current_step_id.is_none());
        assert!(outcome.instance.completed_at.is_some());

        let err = engine
            .submit(&instance.id, &StepId::new("fulfillment"), "it@example.com", data(&[]))
            .await
            .expect_err("terminal instance");
        assert!(matches!(err, WorkflowError::AlreadyTerminal(_)));
    }

    #[tokio::test]
    async fn test_validate_step_access_resolves_form_defaults() {
        let engine = make_engine();
        let instance = started(&engine).await;

        let access = engine
            .validate_step_access(&instance.id, &StepId::new("request"), ALICE)
            .await
            .expect("access");

        let form = access.step.form.expect("form");
        let requester = form
            .fields
            .iter()
            .find(|f| f.id == "requester")
            .expect("requester field");
        assert_eq!(requester.value, Some(json!(ALICE)));

        // Fields without template defaults are untouched
        let item = form.fields.iter().find(|f| f.id == "item").expect("item");
        assert!(item.value.is_none());
    }

    #[tokio::test]
    async fn test_validate_step_access_denies_non_assignee() {
        let engine = make_engine();
        let instance = submitted_request(&engine).await;

        let err = engine
            .validate_step_access(&instance.id, &StepId::new("approval"), "mallory@example.com")
            .await
            .expect_err("should be denied");
        assert!(matches!(err, WorkflowError::Unauthorized { .. }));

        engine
            .validate_step_access(&instance.id, &StepId::new("approval"), BOB)
            .await
            .expect("assignee may look");
    }

    #[tokio::test]
    async fn test_validate_step_access_unknown_step() {
        let engine = make_engine();
        let instance = started(&engine).await;

        let err = engine
            .validate_step_access(&instance.id, &StepId::new("nope"), ALICE)
            .await
            .expect_err("unknown step");
        assert!(matches!(err, WorkflowError::StepNotFound { .. }));
    }

    #[tokio::test]
    async fn test_cancel_retires_pending_work() {
        let engine = make_engine();
        let instance = submitted_request(&engine).await;

        let cancelled = engine.cancel(&instance.id).await.expect("cancel");
        assert_eq!(cancelled.status, InstanceStatus::Cancelled);

        // Bob's queue no longer shows the approval
        let pending = engine.pending_for_user(BOB).await.expect("pending");
        assert!(pending.is_empty());

        let detail = engine.instance_detail(&instance.id).await.expect("detail");
        let approval = detail
            .executions
            .iter()
            .find(|row| row.step_id == StepId::new("approval"))
            .expect("approval row");
        assert_eq!(approval.status, ExecutionStatus::Skipped);
    }

    #[tokio::test]
    async fn test_pending_queue_carries_workflow_name() {
        let engine = make_engine();
        submitted_request(&engine).await;

        let pending = engine.pending_for_user(BOB).await.expect("pending");
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].workflow_name, "Equipment Request");
        assert_eq!(pending[0].execution.step_id, StepId::new("approval"));
    }

    #[tokio::test]
    async fn test_list_limit_clamping() {
        let engine = make_engine();
        started(&engine).await;

        let listing = engine
            .list_instances(&InstanceFilter::default(), Some(9000), 0)
            .await
            .expect("list");
        assert_eq!(listing.limit, MAX_PAGE_LIMIT);

        let listing = engine
            .list_instances(&InstanceFilter::default(), None, 0)
            .await
            .expect("list");
        assert_eq!(listing.limit, DEFAULT_PAGE_LIMIT);
        assert_eq!(listing.total_count, 1);
        assert!(!listing.has_more());

        // An explicit zero is honored, not defaulted
        let listing = engine
            .list_instances(&InstanceFilter::default(), Some(0), 0)
            .await
            .expect("list");
        assert!(listing.items.is_empty());
        assert_eq!(listing.total_count, 1);
        assert!(listing.has_more());
    }
}
