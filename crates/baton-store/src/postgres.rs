//! PostgreSQL store implementation
//!
//! Instances are kept as a JSONB document with the filterable columns
//! extracted; step executions are plain columns because the store owns
//! their BIGSERIAL ids. Submissions and cancellations run inside a
//! transaction that locks the instance row, so the compare-and-set on
//! the current step holds across concurrent writers.

use crate::traits::*;
use async_trait::async_trait;
use baton_types::{
    ExecutionId, InstanceId, StepExecution, StepId, WorkflowError, WorkflowInstance, WorkflowResult,
};
use serde_json::Value;
use sqlx::{postgres::PgPoolOptions, PgPool, Row};
use std::time::Duration;
use uuid::Uuid;

/// PostgreSQL-backed instance store
#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Connect to PostgreSQL and initialize schema
    pub async fn new(
        url: &str,
        max_connections: u32,
        connect_timeout_secs: u64,
    ) -> WorkflowResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(connect_timeout_secs))
            .connect(url)
            .await
            .map_err(|e| WorkflowError::Store(format!("connection error: {}", e)))?;

        let store = Self { pool };
        store.initialize_schema().await?;
        Ok(store)
    }

    async fn initialize_schema(&self) -> WorkflowResult<()> {
        let statements = [
            r#"
            CREATE TABLE IF NOT EXISTS workflow_instances (
                id UUID PRIMARY KEY,
                workflow_id TEXT NOT NULL,
                status TEXT NOT NULL,
                current_step_id TEXT,
                initiated_by_email TEXT NOT NULL,
                data JSONB NOT NULL,
                created_at TIMESTAMPTZ NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL
            );
            "#,
            r#"CREATE INDEX IF NOT EXISTS workflow_instances_created_at ON workflow_instances(created_at DESC);"#,
            r#"CREATE INDEX IF NOT EXISTS workflow_instances_initiated_by ON workflow_instances(initiated_by_email);"#,
            r#"
            CREATE TABLE IF NOT EXISTS step_executions (
                id BIGSERIAL PRIMARY KEY,
                instance_id UUID NOT NULL,
                step_id TEXT NOT NULL,
                step_name TEXT NOT NULL,
                status TEXT NOT NULL,
                assigned_to_email TEXT,
                executed_by_email TEXT,
                step_data JSONB NOT NULL,
                started_at TIMESTAMPTZ,
                completed_at TIMESTAMPTZ,
                created_at TIMESTAMPTZ NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL
            );
            "#,
            r#"CREATE UNIQUE INDEX IF NOT EXISTS step_executions_instance_step ON step_executions(instance_id, step_id);"#,
            r#"CREATE INDEX IF NOT EXISTS step_executions_assignee ON step_executions(assigned_to_email, status);"#,
        ];

        for stmt in statements {
            sqlx::query(stmt)
                .execute(&self.pool)
                .await
                .map_err(|e| WorkflowError::Store(e.to_string()))?;
        }

        Ok(())
    }

    fn to_json<T: serde::Serialize>(value: &T) -> WorkflowResult<Value> {
        serde_json::to_value(value)
            .map_err(|e| WorkflowError::Store(format!("json serialize error: {}", e)))
    }

    fn from_json<T: serde::de::DeserializeOwned>(value: Value) -> WorkflowResult<T> {
        serde_json::from_value(value)
            .map_err(|e| WorkflowError::Store(format!("json deserialize error: {}", e)))
    }

    fn instance_from_row(row: &sqlx::postgres::PgRow) -> WorkflowResult<WorkflowInstance> {
        let data: Value = row
            .try_get("data")
            .map_err(|e| WorkflowError::Store(e.to_string()))?;
        Self::from_json(data)
    }

    fn execution_from_row(row: &sqlx::postgres::PgRow) -> WorkflowResult<StepExecution> {
        let status: String = row
            .try_get("status")
            .map_err(|e| WorkflowError::Store(e.to_string()))?;
        let step_data: Value = row
            .try_get("step_data")
            .map_err(|e| WorkflowError::Store(e.to_string()))?;

        Ok(StepExecution {
            id: ExecutionId::new(
                row.try_get("id")
                    .map_err(|e| WorkflowError::Store(e.to_string()))?,
            ),
            instance_id: InstanceId::from_uuid(
                row.try_get("instance_id")
                    .map_err(|e| WorkflowError::Store(e.to_string()))?,
            ),
            step_id: StepId::new(
                row.try_get::<String, _>("step_id")
                    .map_err(|e| WorkflowError::Store(e.to_string()))?,
            ),
            step_name: row
                .try_get("step_name")
                .map_err(|e| WorkflowError::Store(e.to_string()))?,
            status: status.parse().map_err(WorkflowError::Store)?,
            assigned_to_email: row
                .try_get("assigned_to_email")
                .map_err(|e| WorkflowError::Store(e.to_string()))?,
            executed_by_email: row
                .try_get("executed_by_email")
                .map_err(|e| WorkflowError::Store(e.to_string()))?,
            step_data: Self::from_json(step_data)?,
            started_at: row
                .try_get("started_at")
                .map_err(|e| WorkflowError::Store(e.to_string()))?,
            completed_at: row
                .try_get("completed_at")
                .map_err(|e| WorkflowError::Store(e.to_string()))?,
            created_at: row
                .try_get("created_at")
                .map_err(|e| WorkflowError::Store(e.to_string()))?,
            updated_at: row
                .try_get("updated_at")
                .map_err(|e| WorkflowError::Store(e.to_string()))?,
        })
    }

    /// Write an instance row, replacing any previous version
    async fn write_instance<'e, E>(executor: E, instance: &WorkflowInstance) -> WorkflowResult<()>
    where
        E: sqlx::PgExecutor<'e>,
    {
        let data = Self::to_json(instance)?;

        sqlx::query(
            r#"
            INSERT INTO workflow_instances
                (id, workflow_id, status, current_step_id, initiated_by_email, data, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (id)
            DO UPDATE SET
                status = EXCLUDED.status,
                current_step_id = EXCLUDED.current_step_id,
                data = EXCLUDED.data,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(instance.id.as_uuid())
        .bind(instance.workflow_id.as_str())
        .bind(instance.status.as_str())
        .bind(instance.current_step_id.as_ref().map(|s| s.as_str()))
        .bind(&instance.initiated_by_email)
        .bind(data)
        .bind(instance.created_at)
        .bind(instance.updated_at)
        .execute(executor)
        .await
        .map_err(|e| WorkflowError::Store(e.to_string()))?;

        Ok(())
    }

    /// Insert an execution row, returning the assigned id
    async fn insert_execution<'e, E>(executor: E, row: &StepExecution) -> WorkflowResult<i64>
    where
        E: sqlx::PgExecutor<'e>,
    {
        let step_data = Value::Object(row.step_data.clone());

        let inserted = sqlx::query(
            r#"
            INSERT INTO step_executions
                (instance_id, step_id, step_name, status, assigned_to_email, executed_by_email,
                 step_data, started_at, completed_at, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            ON CONFLICT (instance_id, step_id)
            DO UPDATE SET
                status = EXCLUDED.status,
                executed_by_email = EXCLUDED.executed_by_email,
                step_data = EXCLUDED.step_data,
                completed_at = EXCLUDED.completed_at,
                updated_at = EXCLUDED.updated_at
            RETURNING id
            "#,
        )
        .bind(row.instance_id.as_uuid())
        .bind(row.step_id.as_str())
        .bind(&row.step_name)
        .bind(row.status.as_str())
        .bind(&row.assigned_to_email)
        .bind(&row.executed_by_email)
        .bind(step_data)
        .bind(row.started_at)
        .bind(row.completed_at)
        .bind(row.created_at)
        .bind(row.updated_at)
        .fetch_one(executor)
        .await
        .map_err(|e| WorkflowError::Store(e.to_string()))?;

        inserted
            .try_get("id")
            .map_err(|e| WorkflowError::Store(e.to_string()))
    }

    /// Lock an instance row for the rest of the transaction
    async fn lock_instance(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        id: &InstanceId,
    ) -> WorkflowResult<Option<WorkflowInstance>> {
        let row = sqlx::query("SELECT data FROM workflow_instances WHERE id = $1 FOR UPDATE")
            .bind(id.as_uuid())
            .fetch_optional(&mut **tx)
            .await
            .map_err(|e| WorkflowError::Store(e.to_string()))?;

        match row {
            Some(record) => Ok(Some(Self::instance_from_row(&record)?)),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl InstanceStore for PostgresStore {
    async fn create_instance(&self, instance: WorkflowInstance) -> WorkflowResult<()> {
        Self::write_instance(&self.pool, &instance).await
    }

    async fn get_instance(&self, id: &InstanceId) -> WorkflowResult<Option<WorkflowInstance>> {
        let row = sqlx::query("SELECT data FROM workflow_instances WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| WorkflowError::Store(e.to_string()))?;

        match row {
            Some(record) => Ok(Some(Self::instance_from_row(&record)?)),
            None => Ok(None),
        }
    }

    async fn list_instances(
        &self,
        filter: &InstanceFilter,
        window: QueryWindow,
    ) -> WorkflowResult<InstancePage> {
        let status = filter.status.map(|s| s.as_str().to_string());
        let conditions = r#"
            ($1::text IS NULL OR status = $1)
            AND ($2::text IS NULL OR initiated_by_email = $2)
            AND ($3::timestamptz IS NULL OR created_at >= $3)
            AND ($4::timestamptz IS NULL OR created_at <= $4)
            AND ($5::text IS NULL OR EXISTS (
                SELECT 1 FROM step_executions se
                WHERE se.instance_id = workflow_instances.id
                  AND se.step_id = workflow_instances.current_step_id
                  AND se.status = 'pending'
                  AND se.assigned_to_email = $5
            ))
        "#;

        let count_row = sqlx::query(&format!(
            "SELECT COUNT(*) AS total FROM workflow_instances WHERE {}",
            conditions
        ))
        .bind(&status)
        .bind(&filter.initiated_by)
        .bind(filter.created_after)
        .bind(filter.created_before)
        .bind(&filter.assigned_to)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| WorkflowError::Store(e.to_string()))?;
        let total: i64 = count_row
            .try_get("total")
            .map_err(|e| WorkflowError::Store(e.to_string()))?;

        let rows = sqlx::query(&format!(
            r#"
            SELECT data FROM workflow_instances
            WHERE {}
            ORDER BY created_at DESC, id ASC
            LIMIT $6 OFFSET $7
            "#,
            conditions
        ))
        .bind(&status)
        .bind(&filter.initiated_by)
        .bind(filter.created_after)
        .bind(filter.created_before)
        .bind(&filter.assigned_to)
        .bind(window.limit as i64)
        .bind(window.offset as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| WorkflowError::Store(e.to_string()))?;

        let instances = rows
            .iter()
            .map(Self::instance_from_row)
            .collect::<WorkflowResult<Vec<WorkflowInstance>>>()?;

        // one query for the execution history of the whole page
        let page_ids: Vec<Uuid> = instances.iter().map(|i| *i.id.as_uuid()).collect();
        let execution_rows = sqlx::query(
            r#"
            SELECT id, instance_id, step_id, step_name, status, assigned_to_email,
                   executed_by_email, step_data, started_at, completed_at, created_at, updated_at
            FROM step_executions
            WHERE instance_id = ANY($1)
            ORDER BY created_at ASC, id ASC
            "#,
        )
        .bind(&page_ids)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| WorkflowError::Store(e.to_string()))?;

        let mut by_instance: std::collections::HashMap<InstanceId, Vec<StepExecution>> =
            std::collections::HashMap::new();
        for row in &execution_rows {
            let execution = Self::execution_from_row(row)?;
            by_instance
                .entry(execution.instance_id)
                .or_default()
                .push(execution);
        }

        let items = instances
            .into_iter()
            .map(|instance| {
                let executions = by_instance.remove(&instance.id).unwrap_or_default();
                InstanceRecord {
                    instance,
                    executions,
                }
            })
            .collect();

        Ok(InstancePage {
            items,
            total_count: total as usize,
        })
    }

    async fn get_execution(
        &self,
        instance_id: &InstanceId,
        step_id: &StepId,
    ) -> WorkflowResult<Option<StepExecution>> {
        let row = sqlx::query(
            r#"
            SELECT id, instance_id, step_id, step_name, status, assigned_to_email,
                   executed_by_email, step_data, started_at, completed_at, created_at, updated_at
            FROM step_executions
            WHERE instance_id = $1 AND step_id = $2
            "#,
        )
        .bind(instance_id.as_uuid())
        .bind(step_id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| WorkflowError::Store(e.to_string()))?;

        match row {
            Some(record) => Ok(Some(Self::execution_from_row(&record)?)),
            None => Ok(None),
        }
    }

    async fn list_executions(&self, instance_id: &InstanceId) -> WorkflowResult<Vec<StepExecution>> {
        let rows = sqlx::query(
            r#"
            SELECT id, instance_id, step_id, step_name, status, assigned_to_email,
                   executed_by_email, step_data, started_at, completed_at, created_at, updated_at
            FROM step_executions
            WHERE instance_id = $1
            ORDER BY created_at ASC, id ASC
            "#,
        )
        .bind(instance_id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| WorkflowError::Store(e.to_string()))?;

        rows.iter().map(Self::execution_from_row).collect()
    }

    async fn pending_for_assignee(&self, email: &str) -> WorkflowResult<Vec<PendingExecution>> {
        let rows = sqlx::query(
            r#"
            SELECT e.id, e.instance_id, e.step_id, e.step_name, e.status, e.assigned_to_email,
                   e.executed_by_email, e.step_data, e.started_at, e.completed_at, e.created_at,
                   e.updated_at, i.data
            FROM step_executions e
            JOIN workflow_instances i ON i.id = e.instance_id
            WHERE e.status = 'pending' AND e.assigned_to_email = $1
            ORDER BY e.created_at ASC, e.id ASC
            "#,
        )
        .bind(email)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| WorkflowError::Store(e.to_string()))?;

        rows.iter()
            .map(|row| {
                Ok(PendingExecution {
                    instance: Self::instance_from_row(row)?,
                    execution: Self::execution_from_row(row)?,
                })
            })
            .collect()
    }

    async fn commit_submission(
        &self,
        commit: SubmissionCommit,
    ) -> WorkflowResult<SubmissionOutcome> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| WorkflowError::Store(e.to_string()))?;

        let mut instance = Self::lock_instance(&mut tx, &commit.instance_id)
            .await?
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
        let existing = sqlx::query(
            r#"
            SELECT id, instance_id, step_id, step_name, status, assigned_to_email,
                   executed_by_email, step_data, started_at, completed_at, created_at, updated_at
            FROM step_executions
            WHERE instance_id = $1 AND step_id = $2
            "#,
        )
        .bind(commit.instance_id.as_uuid())
        .bind(commit.expected_current_step.as_str())
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| WorkflowError::Store(e.to_string()))?;

        let mut execution = match existing {
            Some(record) => {
                let mut row = Self::execution_from_row(&record)?;
                row.complete_with(commit.step_data, commit.actor_email);
                row
            }
            None => StepExecution::completed(
                commit.instance_id,
                commit.expected_current_step.clone(),
                commit.step_name,
                commit.actor_email,
                commit.step_data,
            ),
        };
        let id = Self::insert_execution(&mut *tx, &execution).await?;
        execution.id = ExecutionId::new(id);

        match commit.next {
            Some(activation) => {
                instance.advance_to(activation.step_id.clone());
                if let Some(seed) = activation.pending {
                    let pending = StepExecution::pending(
                        commit.instance_id,
                        activation.step_id,
                        seed.step_name,
                        seed.assigned_to_email,
                    );
                    let step_data = Value::Object(pending.step_data.clone());
                    // revisiting a step keeps its existing row
                    sqlx::query(
                        r#"
                        INSERT INTO step_executions
                            (instance_id, step_id, step_name, status, assigned_to_email,
                             executed_by_email, step_data, started_at, completed_at,
                             created_at, updated_at)
                        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
                        ON CONFLICT (instance_id, step_id) DO NOTHING
                        "#,
                    )
                    .bind(pending.instance_id.as_uuid())
                    .bind(pending.step_id.as_str())
                    .bind(&pending.step_name)
                    .bind(pending.status.as_str())
                    .bind(&pending.assigned_to_email)
                    .bind(&pending.executed_by_email)
                    .bind(step_data)
                    .bind(pending.started_at)
                    .bind(pending.completed_at)
                    .bind(pending.created_at)
                    .bind(pending.updated_at)
                    .execute(&mut *tx)
                    .await
                    .map_err(|e| WorkflowError::Store(e.to_string()))?;
                }
            }
            None => instance.complete(),
        }

        Self::write_instance(&mut *tx, &instance).await?;
        tx.commit()
            .await
            .map_err(|e| WorkflowError::Store(e.to_string()))?;

        Ok(SubmissionOutcome {
            execution,
            instance,
        })
    }

    async fn cancel_instance(&self, id: &InstanceId) -> WorkflowResult<WorkflowInstance> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| WorkflowError::Store(e.to_string()))?;

        let mut instance = Self::lock_instance(&mut tx, id)
            .await?
            .ok_or(WorkflowError::InstanceNotFound(*id))?;
        if instance.is_terminal() {
            return Err(WorkflowError::AlreadyTerminal(*id));
        }

        instance.cancel();
        Self::write_instance(&mut *tx, &instance).await?;

        sqlx::query(
            r#"
            UPDATE step_executions
            SET status = 'skipped', updated_at = $2
            WHERE instance_id = $1 AND status = 'pending'
            "#,
        )
        .bind(id.as_uuid())
        .bind(instance.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| WorkflowError::Store(e.to_string()))?;

        tx.commit()
            .await
            .map_err(|e| WorkflowError::Store(e.to_string()))?;
        Ok(instance)
    }
}
