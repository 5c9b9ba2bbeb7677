//! In-memory store for development and testing

use crate::traits::*;
use async_trait::async_trait;
use baton_types::{
    ExecutionId, InstanceId, StepExecution, StepId, WorkflowError, WorkflowInstance, WorkflowResult,
};
use std::collections::HashMap;
use std::sync::{
    atomic::{AtomicI64, Ordering},
    Arc,
};
use tokio::sync::RwLock;

type ExecutionKey = (InstanceId, StepId);

/// In-memory store for development and testing.
///
/// Lock order is instances before executions wherever both are held.
#[derive(Debug)]
pub struct InMemoryStore {
    instances: Arc<RwLock<HashMap<InstanceId, WorkflowInstance>>>,
    executions: Arc<RwLock<HashMap<ExecutionKey, StepExecution>>>,
    execution_sequence: Arc<AtomicI64>,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    /// Create a new in-memory store
    pub fn new() -> Self {
        Self {
            instances: Arc::new(RwLock::new(HashMap::new())),
            executions: Arc::new(RwLock::new(HashMap::new())),
            execution_sequence: Arc::new(AtomicI64::new(0)),
        }
    }

    fn next_execution_id(&self) -> ExecutionId {
        ExecutionId::new(self.execution_sequence.fetch_add(1, Ordering::SeqCst) + 1)
    }
}

fn sorted_executions(
    executions: &HashMap<ExecutionKey, StepExecution>,
    instance_id: &InstanceId,
) -> Vec<StepExecution> {
    let mut rows: Vec<StepExecution> = executions
        .values()
        .filter(|e| e.instance_id == *instance_id)
        .cloned()
        .collect();
    rows.sort_by_key(|e| (e.created_at, e.id.as_i64()));
    rows
}

fn matches_filter(
    instance: &WorkflowInstance,
    filter: &InstanceFilter,
    executions: &HashMap<ExecutionKey, StepExecution>,
) -> bool {
    if let Some(status) = filter.status {
        if instance.status != status {
            return false;
        }
    }
    if let Some(ref initiated_by) = filter.initiated_by {
        if &instance.initiated_by_email != initiated_by {
            return false;
        }
    }
    if let Some(after) = filter.created_after {
        if instance.created_at < after {
            return false;
        }
    }
    if let Some(before) = filter.created_before {
        if instance.created_at > before {
            return false;
        }
    }
    if let Some(ref assignee) = filter.assigned_to {
        let current_row = instance
            .current_step_id
            .as_ref()
            .and_then(|step_id| executions.get(&(instance.id, step_id.clone())));
        match current_row {
            Some(row)
                if row.is_pending()
                    && row.assigned_to_email.as_deref() == Some(assignee.as_str()) => {}
            _ => return false,
        }
    }
    true
}

#[async_trait]
impl InstanceStore for InMemoryStore {
    async fn create_instance(&self, instance: WorkflowInstance) -> WorkflowResult<()> {
        let mut instances = self.instances.write().await;
        instances.insert(instance.id, instance);
        Ok(())
    }

    async fn get_instance(&self, id: &InstanceId) -> WorkflowResult<Option<WorkflowInstance>> {
        let instances = self.instances.read().await;
        Ok(instances.get(id).cloned())
    }

    async fn list_instances(
        &self,
        filter: &InstanceFilter,
        window: QueryWindow,
    ) -> WorkflowResult<InstancePage> {
        let instances = self.instances.read().await;
        let executions = self.executions.read().await;

        let mut matched: Vec<&WorkflowInstance> = instances
            .values()
            .filter(|i| matches_filter(i, filter, &executions))
            .collect();

        // newest first; the id breaks creation-time ties deterministically
        matched.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| a.id.as_uuid().cmp(b.id.as_uuid()))
        });

        let total_count = matched.len();
        let items = matched
            .into_iter()
            .skip(window.offset)
            .take(window.limit)
            .map(|instance| InstanceRecord {
                instance: instance.clone(),
                executions: sorted_executions(&executions, &instance.id),
            })
            .collect();

        Ok(InstancePage { items, total_count })
    }

    async fn get_execution(
        &self,
        instance_id: &InstanceId,
        step_id: &StepId,
    ) -> WorkflowResult<Option<StepExecution>> {
        let executions = self.executions.read().await;
        Ok(executions.get(&(*instance_id, step_id.clone())).cloned())
    }

    async fn list_executions(&self, instance_id: &InstanceId) -> WorkflowResult<Vec<StepExecution>> {
        let executions = self.executions.read().await;
        Ok(sorted_executions(&executions, instance_id))
    }

    async fn pending_for_assignee(&self, email: &str) -> WorkflowResult<Vec<PendingExecution>> {
        let instances = self.instances.read().await;
        let executions = self.executions.read().await;

        let mut rows: Vec<&StepExecution> = executions
            .values()
            .filter(|e| e.is_pending() && e.assigned_to_email.as_deref() == Some(email))
            .collect();
        rows.sort_by_key(|e| (e.created_at, e.id.as_i64()));

        Ok(rows
            .into_iter()
            .filter_map(|execution| {
                instances
                    .get(&execution.instance_id)
                    .map(|instance| PendingExecution {
                        instance: instance.clone(),
                        execution: execution.clone(),
                    })
            })
            .collect())
    }

    async fn commit_submission(
        &self,
        commit: SubmissionCommit,
    ) -> WorkflowResult<SubmissionOutcome> {
        let mut instances = self.instances.write().await;
        let mut executions = self.executions.write().await;

        let instance = instances
            .get_mut(&commit.instance_id)
            .ok_or(WorkflowError::InstanceNotFound(commit.instance_id))?;

        if instance.is_terminal() {
            return Err(WorkflowError::AlreadyTerminal(instance.id));
        }
        if instance.current_step_id.as_ref() != Some(&commit.expected_current_step) {
            return Err(WorkflowError::StepNotCurrent {
                submitted: commit.expected_current_step,
                current: instance
                    .current_step_id
                    .as_ref()
                    .map(|s| s.to_string())
                    .unwrap_or_else(|| "none".to_string()),
            });
        }

        // Complete the pending row in place; create one on the fly if the
        // step was never pre-activated.
        let key = (commit.instance_id, commit.expected_current_step.clone());
        let execution = match executions.get_mut(&key) {
            Some(row) => {
                row.complete_with(commit.step_data, commit.actor_email);
                row.clone()
            }
            None => {
                let mut row = StepExecution::completed(
                    commit.instance_id,
                    commit.expected_current_step,
                    commit.step_name,
                    commit.actor_email,
                    commit.step_data,
                );
                row.id = self.next_execution_id();
                executions.insert(key, row.clone());
                row
            }
        };

        match commit.next {
            Some(activation) => {
                instance.advance_to(activation.step_id.clone());
                if let Some(seed) = activation.pending {
                    let next_key = (commit.instance_id, activation.step_id.clone());
                    // revisiting a step keeps its existing row
                    executions.entry(next_key).or_insert_with(|| {
                        let mut row = StepExecution::pending(
                            commit.instance_id,
                            activation.step_id,
                            seed.step_name,
                            seed.assigned_to_email,
                        );
                        row.id = self.next_execution_id();
                        row
                    });
                }
            }
            None => instance.complete(),
        }

        Ok(SubmissionOutcome {
            execution,
            instance: instance.clone(),
        })
    }

    async fn cancel_instance(&self, id: &InstanceId) -> WorkflowResult<WorkflowInstance> {
        let mut instances = self.instances.write().await;
        let mut executions = self.executions.write().await;

        let instance = instances
            .get_mut(id)
            .ok_or(WorkflowError::InstanceNotFound(*id))?;
        if instance.is_terminal() {
            return Err(WorkflowError::AlreadyTerminal(*id));
        }

        instance.cancel();
        for row in executions
            .values_mut()
            .filter(|e| e.instance_id == *id && e.is_pending())
        {
            row.skip();
        }

        Ok(instance.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use baton_types::{ExecutionStatus, InstanceStatus, StepData, WorkflowId};
    use serde_json::json;

    fn make_instance(initiator: &str) -> WorkflowInstance {
        WorkflowInstance::start(
            WorkflowId::new("onboard"),
            "Onboarding",
            StepId::new("request"),
            initiator,
            "ext1",
        )
    }

    fn data(pairs: &[(&str, serde_json::Value)]) -> StepData {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    fn request_commit(instance_id: InstanceId) -> SubmissionCommit {
        SubmissionCommit {
            instance_id,
            expected_current_step: StepId::new("request"),
            step_name: "Request".to_string(),
            actor_email: "a@x.com".to_string(),
            step_data: data(&[("manager_email", json!("m@x.com"))]),
            next: Some(NextStepActivation {
                step_id: StepId::new("approval"),
                pending: Some(PendingStepSeed {
                    step_name: "Approval".to_string(),
                    assigned_to_email: Some("m@x.com".to_string()),
                }),
            }),
        }
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let store = InMemoryStore::new();
        let instance = make_instance("a@x.com");
        let instance_id = instance.id;

        store.create_instance(instance).await.unwrap();

        let found = store.get_instance(&instance_id).await.unwrap().unwrap();
        assert_eq!(found.id, instance_id);
        assert_eq!(found.status, InstanceStatus::Started);

        // the entry step has no execution row until it is submitted
        assert!(store
            .get_execution(&instance_id, &StepId::new("request"))
            .await
            .unwrap()
            .is_none());
        assert!(store.list_executions(&instance_id).await.unwrap().is_empty());

        assert!(store
            .get_instance(&InstanceId::generate())
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_commit_completes_and_advances() {
        let store = InMemoryStore::new();
        let instance = make_instance("a@x.com");
        let instance_id = instance.id;
        store.create_instance(instance).await.unwrap();

        let outcome = store
            .commit_submission(request_commit(instance_id))
            .await
            .unwrap();

        // the entry step had no pending row, so one is created completed
        assert_eq!(outcome.execution.id.as_i64(), 1);
        assert!(outcome.execution.is_completed());
        assert_eq!(
            outcome.execution.assigned_to_email.as_deref(),
            Some("a@x.com")
        );
        assert_eq!(
            outcome.execution.executed_by_email.as_deref(),
            Some("a@x.com")
        );

        assert_eq!(outcome.instance.status, InstanceStatus::InProgress);
        assert!(outcome.instance.is_current(&StepId::new("approval")));

        let next_row = store
            .get_execution(&instance_id, &StepId::new("approval"))
            .await
            .unwrap()
            .unwrap();
        assert!(next_row.is_pending());
        assert_eq!(next_row.assigned_to_email.as_deref(), Some("m@x.com"));
        assert_eq!(next_row.id.as_i64(), 2);

        let rows = store.list_executions(&instance_id).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].step_id, StepId::new("request"));
        assert_eq!(rows[1].step_id, StepId::new("approval"));
    }

    #[tokio::test]
    async fn test_commit_fills_pending_row_in_place() {
        let store = InMemoryStore::new();
        let instance = make_instance("a@x.com");
        let instance_id = instance.id;
        store.create_instance(instance).await.unwrap();
        store
            .commit_submission(request_commit(instance_id))
            .await
            .unwrap();

        let outcome = store
            .commit_submission(SubmissionCommit {
                instance_id,
                expected_current_step: StepId::new("approval"),
                step_name: "Approval".to_string(),
                actor_email: "m@x.com".to_string(),
                step_data: data(&[("decision", json!("approve"))]),
                next: None,
            })
            .await
            .unwrap();

        // the pending row was filled in place, keeping its id and assignee
        assert_eq!(outcome.execution.id.as_i64(), 2);
        assert!(outcome.execution.is_completed());
        assert_eq!(
            outcome.execution.assigned_to_email.as_deref(),
            Some("m@x.com")
        );
        assert_eq!(outcome.execution.step_data["decision"], json!("approve"));
    }

    #[tokio::test]
    async fn test_commit_rejects_stale_current_step() {
        let store = InMemoryStore::new();
        let instance = make_instance("a@x.com");
        let instance_id = instance.id;
        store.create_instance(instance).await.unwrap();
        store
            .commit_submission(request_commit(instance_id))
            .await
            .unwrap();

        // current step is now "approval"; replaying the first commit loses
        let err = store
            .commit_submission(request_commit(instance_id))
            .await
            .unwrap_err();
        assert!(err.is_conflict());
        match err {
            WorkflowError::StepNotCurrent { current, .. } => assert_eq!(current, "approval"),
            other => panic!("unexpected error: {other}"),
        }

        // the failed replay touched nothing
        let instance = store.get_instance(&instance_id).await.unwrap().unwrap();
        assert!(instance.is_current(&StepId::new("approval")));
        assert_eq!(instance.status, InstanceStatus::InProgress);
        let rows = store.list_executions(&instance_id).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].status, ExecutionStatus::Completed);
        assert_eq!(rows[1].status, ExecutionStatus::Pending);
    }

    #[tokio::test]
    async fn test_commit_unknown_instance() {
        let store = InMemoryStore::new();
        let err = store
            .commit_submission(request_commit(InstanceId::generate()))
            .await
            .unwrap_err();
        assert!(matches!(err, WorkflowError::InstanceNotFound(_)));
    }

    #[tokio::test]
    async fn test_commit_final_step_completes_instance() {
        let store = InMemoryStore::new();
        let instance = make_instance("a@x.com");
        let instance_id = instance.id;
        store.create_instance(instance).await.unwrap();

        let mut commit = request_commit(instance_id);
        commit.next = None;
        let outcome = store.commit_submission(commit).await.unwrap();

        assert_eq!(outcome.instance.status, InstanceStatus::Completed);
        assert!(outcome.instance.current_step_id.is_none());
        assert!(outcome.instance.completed_at.is_some());

        // a completed instance accepts no further submissions
        let err = store
            .commit_submission(request_commit(instance_id))
            .await
            .unwrap_err();
        assert!(err.is_conflict());
    }

    #[tokio::test]
    async fn test_commit_advance_without_pending_seed() {
        let store = InMemoryStore::new();
        let instance = make_instance("a@x.com");
        let instance_id = instance.id;
        store.create_instance(instance).await.unwrap();

        let mut commit = request_commit(instance_id);
        commit.next = Some(NextStepActivation {
            step_id: StepId::new("review"),
            pending: None,
        });
        let outcome = store.commit_submission(commit).await.unwrap();

        assert!(outcome.instance.is_current(&StepId::new("review")));
        assert!(store
            .get_execution(&instance_id, &StepId::new("review"))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_cancel_skips_pending_rows() {
        let store = InMemoryStore::new();
        let instance = make_instance("a@x.com");
        let instance_id = instance.id;
        store.create_instance(instance).await.unwrap();
        store
            .commit_submission(request_commit(instance_id))
            .await
            .unwrap();

        let cancelled = store.cancel_instance(&instance_id).await.unwrap();
        assert_eq!(cancelled.status, InstanceStatus::Cancelled);
        assert!(cancelled.current_step_id.is_none());

        // the approval step was pending; cancellation retires it
        let row = store
            .get_execution(&instance_id, &StepId::new("approval"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(row.status, ExecutionStatus::Skipped);
        assert!(store.pending_for_assignee("m@x.com").await.unwrap().is_empty());

        // the completed request row is untouched history
        let row = store
            .get_execution(&instance_id, &StepId::new("request"))
            .await
            .unwrap()
            .unwrap();
        assert!(row.is_completed());

        let err = store.cancel_instance(&instance_id).await.unwrap_err();
        assert!(matches!(err, WorkflowError::AlreadyTerminal(_)));
    }

    #[tokio::test]
    async fn test_pending_for_assignee_exact_match() {
        let store = InMemoryStore::new();
        let instance = make_instance("a@x.com");
        let instance_id = instance.id;
        store.create_instance(instance).await.unwrap();
        store
            .commit_submission(request_commit(instance_id))
            .await
            .unwrap();

        let pending = store.pending_for_assignee("m@x.com").await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].execution.step_id, StepId::new("approval"));
        assert_eq!(pending[0].instance.id, instance_id);

        // matching is case-sensitive and exact
        assert!(store.pending_for_assignee("M@X.com").await.unwrap().is_empty());
        assert!(store.pending_for_assignee("a@x.com").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_list_instances_filters_and_pages() {
        let store = InMemoryStore::new();
        for initiator in ["a@x.com", "a@x.com", "b@x.com"] {
            store.create_instance(make_instance(initiator)).await.unwrap();
        }

        let filter = InstanceFilter {
            initiated_by: Some("a@x.com".to_string()),
            ..Default::default()
        };
        let page = store
            .list_instances(&filter, QueryWindow::default())
            .await
            .unwrap();
        assert_eq!(page.total_count, 2);
        assert_eq!(page.items.len(), 2);
        assert!(page.items[0].executions.is_empty());

        let window = QueryWindow {
            limit: 1,
            offset: 1,
        };
        let page = store
            .list_instances(&InstanceFilter::default(), window)
            .await
            .unwrap();
        assert_eq!(page.total_count, 3);
        assert_eq!(page.items.len(), 1);

        // an offset past the end yields an empty page, not an error
        let window = QueryWindow {
            limit: 10,
            offset: 10,
        };
        let page = store
            .list_instances(&InstanceFilter::default(), window)
            .await
            .unwrap();
        assert_eq!(page.total_count, 3);
        assert!(page.items.is_empty());
    }

    #[tokio::test]
    async fn test_list_instances_by_current_assignee() {
        let store = InMemoryStore::new();

        // first instance advanced to the approval step assigned to m@x.com
        let instance = make_instance("a@x.com");
        let advanced_id = instance.id;
        store.create_instance(instance).await.unwrap();
        store
            .commit_submission(request_commit(advanced_id))
            .await
            .unwrap();

        // second instance still sits at its entry step, which has no row
        store.create_instance(make_instance("b@x.com")).await.unwrap();

        let filter = InstanceFilter {
            assigned_to: Some("m@x.com".to_string()),
            ..Default::default()
        };
        let page = store
            .list_instances(&filter, QueryWindow::default())
            .await
            .unwrap();
        assert_eq!(page.total_count, 1);
        assert_eq!(page.items[0].instance.id, advanced_id);

        let filter = InstanceFilter {
            status: Some(InstanceStatus::Started),
            ..Default::default()
        };
        let page = store
            .list_instances(&filter, QueryWindow::default())
            .await
            .unwrap();
        assert_eq!(page.total_count, 1);
        assert_eq!(page.items[0].instance.initiated_by_email, "b@x.com");
    }
}
