// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! A `sqlx`/PostgreSQL-backed [`Store`]. The core never depends on this
//! module directly; it exists so the daemon binary has something real to
//! run against, and is not itself in scope for correctness review beyond
//! the idempotency contract documented on the trait.
//!
//! Rows are mapped by hand rather than deriving `sqlx::FromRow` on the
//! `oj-core` entities: the core crate stays free of any I/O-layer
//! dependency, so every row here is read into a local tuple/struct and
//! converted.

use async_trait::async_trait;
use oj_core::{
    Artifact, CoreError, CoreResult, FailureClass, Lease, Repository, Run, RunDiffSnapshot, RunId,
    RunLogEvent, RunState, RunStructuredEvent, RunToolProjection, Task, TaskId, TaskRuntime,
    TaskRuntimeEventCheckpoint, TaskRuntimeId, TaskRuntimeRegistration,
};
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};
use std::time::Duration;

use crate::store::{RunFilter, Store, TaskCleanupCriteria};

fn map_err(context: &str, err: sqlx::Error) -> CoreError {
    CoreError::TransientNetwork(format!("{context}: {err}"))
}

/// Connection pool wrapper. Schema is bootstrapped with idempotent `CREATE
/// TABLE IF NOT EXISTS` statements rather than a migration framework: this
/// subsystem treats the relational schema itself as owned by the external
/// persistent-store collaborator, so there is no
/// migration history to version here.
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    pub async fn connect(database_url: &str) -> CoreResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .acquire_timeout(Duration::from_secs(10))
            .connect(database_url)
            .await
            .map_err(|e| CoreError::Fatal(format!("failed to connect to {database_url}: {e}")))?;
        let store = Self { pool };
        store.ensure_schema().await?;
        Ok(store)
    }

    async fn ensure_schema(&self) -> CoreResult<()> {
        sqlx::query(SCHEMA_SQL).execute(&self.pool).await.map_err(|e| map_err("ensure_schema", e))?;
        Ok(())
    }
}

const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS repositories (
    id TEXT PRIMARY KEY,
    clone_url TEXT NOT NULL,
    default_branch TEXT NOT NULL,
    cache_path TEXT NOT NULL,
    last_synced_at_ms BIGINT
);
CREATE TABLE IF NOT EXISTS tasks (
    id TEXT PRIMARY KEY,
    doc JSONB NOT NULL
);
CREATE TABLE IF NOT EXISTS runs (
    id TEXT PRIMARY KEY,
    task_id TEXT NOT NULL,
    state TEXT NOT NULL,
    created_at_ms BIGINT NOT NULL,
    doc JSONB NOT NULL
);
CREATE INDEX IF NOT EXISTS runs_task_state_idx ON runs (task_id, state);
CREATE TABLE IF NOT EXISTS task_runtimes (
    id TEXT PRIMARY KEY,
    task_id TEXT NOT NULL,
    doc JSONB NOT NULL
);
CREATE TABLE IF NOT EXISTS task_runtime_registrations (
    runtime_id TEXT PRIMARY KEY,
    doc JSONB NOT NULL
);
CREATE TABLE IF NOT EXISTS run_structured_events (
    run_id TEXT NOT NULL,
    sequence BIGINT NOT NULL,
    doc JSONB NOT NULL,
    PRIMARY KEY (run_id, sequence)
);
CREATE TABLE IF NOT EXISTS run_diff_snapshots (
    run_id TEXT PRIMARY KEY,
    sequence BIGINT NOT NULL,
    doc JSONB NOT NULL
);
CREATE TABLE IF NOT EXISTS run_tool_projections (
    run_id TEXT NOT NULL,
    tool_call_id TEXT NOT NULL,
    doc JSONB NOT NULL,
    PRIMARY KEY (run_id, tool_call_id)
);
CREATE TABLE IF NOT EXISTS artifacts (
    run_id TEXT NOT NULL,
    file_name TEXT NOT NULL,
    sha256 TEXT NOT NULL,
    size_bytes BIGINT NOT NULL,
    PRIMARY KEY (run_id, file_name)
);
CREATE TABLE IF NOT EXISTS checkpoints (
    runtime_id TEXT PRIMARY KEY,
    last_delivery_id BIGINT NOT NULL
);
CREATE TABLE IF NOT EXISTS leases (
    name TEXT PRIMARY KEY,
    owner_id TEXT NOT NULL,
    expires_at_utc_ms BIGINT NOT NULL
);
CREATE TABLE IF NOT EXISTS run_log_events (
    run_id TEXT NOT NULL,
    delivery_id BIGINT NOT NULL,
    timestamp_ms BIGINT NOT NULL,
    doc JSONB NOT NULL
);
CREATE INDEX IF NOT EXISTS run_log_events_run_idx ON run_log_events (run_id);
"#;

#[async_trait]
impl Store for PostgresStore {
    async fn get_repository(&self, id: oj_core::RepositoryId) -> CoreResult<Option<Repository>> {
        let row = sqlx::query("SELECT id, clone_url, default_branch, cache_path, last_synced_at_ms FROM repositories WHERE id = $1")
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_err("get_repository", e))?;
        Ok(row.map(|r| Repository {
            id,
            clone_url: r.get("clone_url"),
            default_branch: r.get("default_branch"),
            cache_path: r.get("cache_path"),
            last_synced_at_ms: r.get::<Option<i64>, _>("last_synced_at_ms").map(|v| v as u64),
        }))
    }

    async fn mark_repository_synced(&self, id: oj_core::RepositoryId, now_ms: u64) -> CoreResult<()> {
        sqlx::query("UPDATE repositories SET last_synced_at_ms = $1 WHERE id = $2")
            .bind(now_ms as i64)
            .bind(id.as_str())
            .execute(&self.pool)
            .await
            .map_err(|e| map_err("mark_repository_synced", e))?;
        Ok(())
    }

    async fn get_task(&self, id: TaskId) -> CoreResult<Option<Task>> {
        let row = sqlx::query("SELECT doc FROM tasks WHERE id = $1")
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_err("get_task", e))?;
        row.map(|r| serde_json::from_value(r.get("doc")).map_err(|e| CoreError::Fatal(format!("corrupt task row: {e}")))).transpose()
    }

    async fn list_tasks(&self) -> CoreResult<Vec<Task>> {
        let rows = sqlx::query("SELECT doc FROM tasks")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_err("list_tasks", e))?;
        rows.into_iter()
            .map(|r| serde_json::from_value(r.get("doc")).map_err(|e| CoreError::Fatal(format!("corrupt task row: {e}"))))
            .collect()
    }

    async fn touch_task_git_sync(&self, _id: TaskId, _now_ms: u64) -> CoreResult<()> {
        // Tasks are a document column; last-git-sync metadata is carried on
        // the doc the task-authoring collaborator owns, not written here.
        Ok(())
    }

    async fn insert_run(&self, run: Run) -> CoreResult<()> {
        let doc = serde_json::to_value(&run).map_err(|e| CoreError::Fatal(e.to_string()))?;
        sqlx::query("INSERT INTO runs (id, task_id, state, created_at_ms, doc) VALUES ($1, $2, $3, $4, $5) ON CONFLICT (id) DO NOTHING")
            .bind(run.id.as_str())
            .bind(run.task_id.as_str())
            .bind(run.state.to_string())
            .bind(run.created_at_ms as i64)
            .bind(doc)
            .execute(&self.pool)
            .await
            .map_err(|e| map_err("insert_run", e))?;
        Ok(())
    }

    async fn get_run(&self, id: RunId) -> CoreResult<Option<Run>> {
        let row = sqlx::query("SELECT doc FROM runs WHERE id = $1")
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_err("get_run", e))?;
        row.map(|r| serde_json::from_value(r.get("doc")).map_err(|e| CoreError::Fatal(format!("corrupt run row: {e}")))).transpose()
    }

    async fn list_runs(&self, filter: RunFilter) -> CoreResult<Vec<Run>> {
        let rows = match (&filter.task_id, &filter.state) {
            (Some(task_id), Some(state)) => sqlx::query("SELECT doc FROM runs WHERE task_id = $1 AND state = $2")
                .bind(task_id.as_str())
                .bind(state.to_string())
                .fetch_all(&self.pool)
                .await,
            (Some(task_id), None) => {
                sqlx::query("SELECT doc FROM runs WHERE task_id = $1").bind(task_id.as_str()).fetch_all(&self.pool).await
            }
            (None, Some(state)) => {
                sqlx::query("SELECT doc FROM runs WHERE state = $1").bind(state.to_string()).fetch_all(&self.pool).await
            }
            (None, None) => sqlx::query("SELECT doc FROM runs").fetch_all(&self.pool).await,
        }
        .map_err(|e| map_err("list_runs", e))?;
        rows.into_iter()
            .map(|r| serde_json::from_value(r.get("doc")).map_err(|e| CoreError::Fatal(format!("corrupt run row: {e}"))))
            .collect()
    }

    async fn oldest_queued_run(&self, task_id: TaskId) -> CoreResult<Option<Run>> {
        let row = sqlx::query("SELECT doc FROM runs WHERE task_id = $1 AND state = 'queued' ORDER BY created_at_ms ASC LIMIT 1")
            .bind(task_id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_err("oldest_queued_run", e))?;
        row.map(|r| serde_json::from_value(r.get("doc")).map_err(|e| CoreError::Fatal(format!("corrupt run row: {e}")))).transpose()
    }

    async fn count_running(&self, task_id: TaskId) -> CoreResult<u32> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM runs WHERE task_id = $1 AND state = 'running'")
            .bind(task_id.as_str())
            .fetch_one(&self.pool)
            .await
            .map_err(|e| map_err("count_running", e))?;
        let n: i64 = row.get("n");
        Ok(n as u32)
    }

    async fn mark_run_running(
        &self,
        id: RunId,
        runtime_id: TaskRuntimeId,
        worker_image_ref: String,
        worker_image_digest: Option<String>,
        now_ms: u64,
    ) -> CoreResult<()> {
        let Some(mut run) = self.get_run(id).await? else { return Ok(()) };
        run.mark_running(runtime_id, worker_image_ref, worker_image_digest, now_ms);
        self.replace_run(&run).await
    }

    async fn mark_run_terminal(
        &self,
        id: RunId,
        state: RunState,
        summary: Option<String>,
        output_json: Option<String>,
        failure_class: Option<FailureClass>,
        pr_url: Option<String>,
        now_ms: u64,
    ) -> CoreResult<bool> {
        let Some(mut run) = self.get_run(id).await? else { return Ok(false) };
        let changed = run.mark_terminal(state, summary, output_json, failure_class, pr_url, now_ms);
        if changed {
            self.replace_run(&run).await?;
        }
        Ok(changed)
    }

    async fn mark_run_obsolete(&self, id: RunId) -> CoreResult<bool> {
        let Some(mut run) = self.get_run(id).await? else { return Ok(false) };
        let changed = run.mark_obsolete();
        if changed {
            self.replace_run(&run).await?;
        }
        Ok(changed)
    }

    async fn list_task_runtimes(&self) -> CoreResult<Vec<TaskRuntime>> {
        let rows = sqlx::query("SELECT doc FROM task_runtimes").fetch_all(&self.pool).await.map_err(|e| map_err("list_task_runtimes", e))?;
        rows.into_iter()
            .map(|r| serde_json::from_value(r.get("doc")).map_err(|e| CoreError::Fatal(format!("corrupt runtime row: {e}"))))
            .collect()
    }

    async fn get_task_runtime(&self, id: TaskRuntimeId) -> CoreResult<Option<TaskRuntime>> {
        let row = sqlx::query("SELECT doc FROM task_runtimes WHERE id = $1")
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_err("get_task_runtime", e))?;
        row.map(|r| serde_json::from_value(r.get("doc")).map_err(|e| CoreError::Fatal(format!("corrupt runtime row: {e}")))).transpose()
    }

    async fn get_task_runtime_for_task(&self, task_id: TaskId) -> CoreResult<Option<TaskRuntime>> {
        let row = sqlx::query("SELECT doc FROM task_runtimes WHERE task_id = $1")
            .bind(task_id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_err("get_task_runtime_for_task", e))?;
        row.map(|r| serde_json::from_value(r.get("doc")).map_err(|e| CoreError::Fatal(format!("corrupt runtime row: {e}")))).transpose()
    }

    async fn upsert_task_runtime(&self, runtime: TaskRuntime) -> CoreResult<()> {
        let doc = serde_json::to_value(&runtime).map_err(|e| CoreError::Fatal(e.to_string()))?;
        sqlx::query(
            "INSERT INTO task_runtimes (id, task_id, doc) VALUES ($1, $2, $3) \
             ON CONFLICT (id) DO UPDATE SET task_id = EXCLUDED.task_id, doc = EXCLUDED.doc",
        )
        .bind(runtime.id.as_str())
        .bind(runtime.task_id.as_str())
        .bind(doc)
        .execute(&self.pool)
        .await
        .map_err(|e| map_err("upsert_task_runtime", e))?;
        Ok(())
    }

    async fn delete_task_runtime(&self, id: TaskRuntimeId) -> CoreResult<()> {
        sqlx::query("DELETE FROM task_runtimes WHERE id = $1").bind(id.as_str()).execute(&self.pool).await.map_err(|e| map_err("delete_task_runtime", e))?;
        Ok(())
    }

    async fn save_registration(&self, registration: TaskRuntimeRegistration, now_ms: u64) -> CoreResult<()> {
        let doc = serde_json::to_value(&registration).map_err(|e| CoreError::Fatal(e.to_string()))?;
        sqlx::query(
            "INSERT INTO task_runtime_registrations (runtime_id, doc) VALUES ($1, $2) \
             ON CONFLICT (runtime_id) DO UPDATE SET doc = EXCLUDED.doc",
        )
        .bind(&registration.runtime_id)
        .bind(doc)
        .execute(&self.pool)
        .await
        .map_err(|e| map_err("save_registration", e))?;
        if let Some(mut runtime) = self.get_task_runtime_for_task(registration.task_id).await? {
            runtime.record_activity(now_ms);
            self.upsert_task_runtime(runtime).await?;
        }
        Ok(())
    }

    async fn get_registration(&self, runtime_id: &str) -> CoreResult<Option<TaskRuntimeRegistration>> {
        let row = sqlx::query("SELECT doc FROM task_runtime_registrations WHERE runtime_id = $1")
            .bind(runtime_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_err("get_registration", e))?;
        row.map(|r| serde_json::from_value(r.get("doc")).map_err(|e| CoreError::Fatal(format!("corrupt registration row: {e}")))).transpose()
    }

    async fn append_structured_event(&self, event: RunStructuredEvent) -> CoreResult<bool> {
        let doc = serde_json::to_value(&event).map_err(|e| CoreError::Fatal(e.to_string()))?;
        let result = sqlx::query(
            "INSERT INTO run_structured_events (run_id, sequence, doc) VALUES ($1, $2, $3) ON CONFLICT (run_id, sequence) DO NOTHING",
        )
        .bind(event.run_id.as_str())
        .bind(event.sequence as i64)
        .bind(doc)
        .execute(&self.pool)
        .await
        .map_err(|e| map_err("append_structured_event", e))?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_structured_events(&self, run_id: RunId) -> CoreResult<Vec<RunStructuredEvent>> {
        let rows = sqlx::query("SELECT doc FROM run_structured_events WHERE run_id = $1 ORDER BY sequence ASC")
            .bind(run_id.as_str())
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_err("list_structured_events", e))?;
        rows.into_iter()
            .map(|r| serde_json::from_value(r.get("doc")).map_err(|e| CoreError::Fatal(format!("corrupt event row: {e}"))))
            .collect()
    }

    async fn upsert_diff_snapshot(&self, snapshot: RunDiffSnapshot) -> CoreResult<()> {
        let doc = serde_json::to_value(&snapshot).map_err(|e| CoreError::Fatal(e.to_string()))?;
        sqlx::query(
            "INSERT INTO run_diff_snapshots (run_id, sequence, doc) VALUES ($1, $2, $3) \
             ON CONFLICT (run_id) DO UPDATE SET sequence = EXCLUDED.sequence, doc = EXCLUDED.doc \
             WHERE EXCLUDED.sequence > run_diff_snapshots.sequence",
        )
        .bind(snapshot.run_id.as_str())
        .bind(snapshot.sequence as i64)
        .bind(doc)
        .execute(&self.pool)
        .await
        .map_err(|e| map_err("upsert_diff_snapshot", e))?;
        Ok(())
    }

    async fn latest_diff_snapshot(&self, run_id: RunId) -> CoreResult<Option<RunDiffSnapshot>> {
        let row = sqlx::query("SELECT doc FROM run_diff_snapshots WHERE run_id = $1")
            .bind(run_id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_err("latest_diff_snapshot", e))?;
        row.map(|r| serde_json::from_value(r.get("doc")).map_err(|e| CoreError::Fatal(format!("corrupt diff row: {e}")))).transpose()
    }

    async fn upsert_tool_projection(&self, projection: RunToolProjection) -> CoreResult<()> {
        let doc = serde_json::to_value(&projection).map_err(|e| CoreError::Fatal(e.to_string()))?;
        sqlx::query(
            "INSERT INTO run_tool_projections (run_id, tool_call_id, doc) VALUES ($1, $2, $3) \
             ON CONFLICT (run_id, tool_call_id) DO UPDATE SET doc = EXCLUDED.doc",
        )
        .bind(projection.run_id.as_str())
        .bind(&projection.tool_call_id)
        .bind(doc)
        .execute(&self.pool)
        .await
        .map_err(|e| map_err("upsert_tool_projection", e))?;
        Ok(())
    }

    async fn list_tool_projections(&self, run_id: RunId) -> CoreResult<Vec<RunToolProjection>> {
        let rows = sqlx::query("SELECT doc FROM run_tool_projections WHERE run_id = $1")
            .bind(run_id.as_str())
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_err("list_tool_projections", e))?;
        rows.into_iter()
            .map(|r| serde_json::from_value(r.get("doc")).map_err(|e| CoreError::Fatal(format!("corrupt tool projection row: {e}"))))
            .collect()
    }

    async fn save_artifact(&self, artifact: Artifact) -> CoreResult<()> {
        sqlx::query(
            "INSERT INTO artifacts (run_id, file_name, sha256, size_bytes) VALUES ($1, $2, $3, $4) \
             ON CONFLICT (run_id, file_name) DO UPDATE SET sha256 = EXCLUDED.sha256, size_bytes = EXCLUDED.size_bytes",
        )
        .bind(artifact.run_id.as_str())
        .bind(&artifact.file_name)
        .bind(&artifact.sha256)
        .bind(artifact.size_bytes as i64)
        .execute(&self.pool)
        .await
        .map_err(|e| map_err("save_artifact", e))?;
        Ok(())
    }

    async fn list_artifacts(&self, run_id: RunId) -> CoreResult<Vec<Artifact>> {
        let rows = sqlx::query("SELECT run_id, file_name, sha256, size_bytes FROM artifacts WHERE run_id = $1")
            .bind(run_id.as_str())
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_err("list_artifacts", e))?;
        Ok(rows
            .into_iter()
            .map(|r| Artifact {
                run_id,
                file_name: r.get("file_name"),
                sha256: r.get("sha256"),
                size_bytes: r.get::<i64, _>("size_bytes") as u64,
            })
            .collect())
    }

    async fn get_checkpoint(&self, runtime_id: TaskRuntimeId) -> CoreResult<TaskRuntimeEventCheckpoint> {
        let row = sqlx::query("SELECT last_delivery_id FROM checkpoints WHERE runtime_id = $1")
            .bind(runtime_id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_err("get_checkpoint", e))?;
        Ok(match row {
            Some(r) => TaskRuntimeEventCheckpoint { runtime_id, last_delivery_id: r.get::<i64, _>("last_delivery_id") as u64 },
            None => TaskRuntimeEventCheckpoint::fresh(runtime_id),
        })
    }

    async fn save_checkpoint(&self, checkpoint: TaskRuntimeEventCheckpoint) -> CoreResult<()> {
        sqlx::query(
            "INSERT INTO checkpoints (runtime_id, last_delivery_id) VALUES ($1, $2) \
             ON CONFLICT (runtime_id) DO UPDATE SET last_delivery_id = EXCLUDED.last_delivery_id",
        )
        .bind(checkpoint.runtime_id.as_str())
        .bind(checkpoint.last_delivery_id as i64)
        .execute(&self.pool)
        .await
        .map_err(|e| map_err("save_checkpoint", e))?;
        Ok(())
    }

    async fn acquire_lease(&self, name: &str, owner_id: &str, expires_at_utc_ms: u64, now_ms: u64) -> CoreResult<bool> {
        let result = sqlx::query(
            "INSERT INTO leases (name, owner_id, expires_at_utc_ms) VALUES ($1, $2, $3) \
             ON CONFLICT (name) DO UPDATE SET owner_id = EXCLUDED.owner_id, expires_at_utc_ms = EXCLUDED.expires_at_utc_ms \
             WHERE leases.expires_at_utc_ms < $4 OR leases.owner_id = $2",
        )
        .bind(name)
        .bind(owner_id)
        .bind(expires_at_utc_ms as i64)
        .bind(now_ms as i64)
        .execute(&self.pool)
        .await
        .map_err(|e| map_err("acquire_lease", e))?;
        Ok(result.rows_affected() > 0)
    }

    async fn release_lease(&self, name: &str, owner_id: &str) -> CoreResult<()> {
        sqlx::query("DELETE FROM leases WHERE name = $1 AND owner_id = $2")
            .bind(name)
            .bind(owner_id)
            .execute(&self.pool)
            .await
            .map_err(|e| map_err("release_lease", e))?;
        Ok(())
    }

    async fn get_lease(&self, name: &str) -> CoreResult<Option<Lease>> {
        let row = sqlx::query("SELECT name, owner_id, expires_at_utc_ms FROM leases WHERE name = $1")
            .bind(name)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_err("get_lease", e))?;
        Ok(row.map(|r| Lease {
            name: r.get("name"),
            owner_id: r.get("owner_id"),
            expires_at_utc_ms: r.get::<i64, _>("expires_at_utc_ms") as u64,
        }))
    }

    async fn append_log_event(&self, event: RunLogEvent) -> CoreResult<()> {
        let doc = serde_json::to_value(&event).map_err(|e| CoreError::Fatal(e.to_string()))?;
        sqlx::query("INSERT INTO run_log_events (run_id, delivery_id, timestamp_ms, doc) VALUES ($1, $2, $3, $4)")
            .bind(event.run_id.as_str())
            .bind(event.delivery_id as i64)
            .bind(event.timestamp_ms as i64)
            .bind(doc)
            .execute(&self.pool)
            .await
            .map_err(|e| map_err("append_log_event", e))?;
        Ok(())
    }

    async fn list_log_events(&self, run_id: RunId) -> CoreResult<Vec<RunLogEvent>> {
        let rows = sqlx::query("SELECT doc FROM run_log_events WHERE run_id = $1 ORDER BY delivery_id ASC")
            .bind(run_id.as_str())
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_err("list_log_events", e))?;
        rows.into_iter()
            .map(|r| serde_json::from_value(r.get("doc")).map_err(|e| CoreError::Fatal(format!("corrupt log row: {e}"))))
            .collect()
    }

    async fn prune_structured_rows_older_than(&self, older_than_ms: u64, batch_size: u32) -> CoreResult<u64> {
        let mut pruned = 0u64;
        let events = sqlx::query(
            "DELETE FROM run_structured_events WHERE (run_id, sequence) IN \
             (SELECT run_id, sequence FROM run_structured_events WHERE (doc->>'timestamp_ms')::bigint < $1 LIMIT $2)",
        )
        .bind(older_than_ms as i64)
        .bind(batch_size as i64)
        .execute(&self.pool)
        .await
        .map_err(|e| map_err("prune_structured_events", e))?;
        pruned += events.rows_affected();

        let logs = sqlx::query("DELETE FROM run_log_events WHERE timestamp_ms < $1 AND ctid IN (SELECT ctid FROM run_log_events WHERE timestamp_ms < $1 LIMIT $2)")
            .bind(older_than_ms as i64)
            .bind(batch_size as i64)
            .execute(&self.pool)
            .await
            .map_err(|e| map_err("prune_log_events", e))?;
        pruned += logs.rows_affected();
        Ok(pruned)
    }

    async fn list_cleanup_eligible_tasks(&self, now_ms: u64, criteria: &TaskCleanupCriteria) -> CoreResult<Vec<TaskId>> {
        let age_cutoff = now_ms.saturating_sub(criteria.min_age_ms) as i64;
        let protected_cutoff = now_ms.saturating_sub(criteria.protected_days_ms) as i64;
        let rows = sqlx::query(
            "SELECT t.id AS id FROM tasks t \
             WHERE COALESCE((t.doc->>'created_at_ms')::bigint, 0) <= $1 \
               AND COALESCE((t.doc->>'created_at_ms')::bigint, 0) <= $2 \
               AND NOT EXISTS (SELECT 1 FROM runs r WHERE r.task_id = t.id AND r.state = 'running') \
             ORDER BY (t.doc->>'created_at_ms')::bigint ASC NULLS FIRST \
             LIMIT $3",
        )
        .bind(age_cutoff)
        .bind(protected_cutoff)
        .bind(criteria.batch_size as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_err("list_cleanup_eligible_tasks", e))?;
        Ok(rows.into_iter().map(|r| TaskId::from_string(r.get::<String, _>("id"))).collect())
    }

    async fn delete_task_cascade(&self, id: TaskId) -> CoreResult<bool> {
        let mut tx = self.pool.begin().await.map_err(|e| map_err("delete_task_cascade:begin", e))?;
        let run_ids: Vec<String> = sqlx::query("SELECT id FROM runs WHERE task_id = $1")
            .bind(id.as_str())
            .fetch_all(&mut *tx)
            .await
            .map_err(|e| map_err("delete_task_cascade:select_runs", e))?
            .into_iter()
            .map(|r| r.get::<String, _>("id"))
            .collect();
        for run_id in &run_ids {
            sqlx::query("DELETE FROM run_structured_events WHERE run_id = $1").bind(run_id).execute(&mut *tx).await.map_err(|e| map_err("cascade:events", e))?;
            sqlx::query("DELETE FROM run_diff_snapshots WHERE run_id = $1").bind(run_id).execute(&mut *tx).await.map_err(|e| map_err("cascade:diffs", e))?;
            sqlx::query("DELETE FROM run_tool_projections WHERE run_id = $1").bind(run_id).execute(&mut *tx).await.map_err(|e| map_err("cascade:tools", e))?;
            sqlx::query("DELETE FROM run_log_events WHERE run_id = $1").bind(run_id).execute(&mut *tx).await.map_err(|e| map_err("cascade:logs", e))?;
            sqlx::query("DELETE FROM artifacts WHERE run_id = $1").bind(run_id).execute(&mut *tx).await.map_err(|e| map_err("cascade:artifacts", e))?;
        }
        sqlx::query("DELETE FROM runs WHERE task_id = $1").bind(id.as_str()).execute(&mut *tx).await.map_err(|e| map_err("cascade:runs", e))?;
        sqlx::query("DELETE FROM task_runtimes WHERE task_id = $1").bind(id.as_str()).execute(&mut *tx).await.map_err(|e| map_err("cascade:runtimes", e))?;
        let result = sqlx::query("DELETE FROM tasks WHERE id = $1").bind(id.as_str()).execute(&mut *tx).await.map_err(|e| map_err("cascade:task", e))?;
        tx.commit().await.map_err(|e| map_err("delete_task_cascade:commit", e))?;
        Ok(result.rows_affected() > 0)
    }

    async fn approximate_size_bytes(&self) -> CoreResult<u64> {
        let row = sqlx::query("SELECT pg_database_size(current_database()) AS size")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| map_err("approximate_size_bytes", e))?;
        Ok(row.get::<i64, _>("size") as u64)
    }

    async fn vacuum(&self) -> CoreResult<()> {
        sqlx::query("VACUUM").execute(&self.pool).await.map_err(|e| map_err("vacuum", e))?;
        Ok(())
    }
}

impl PostgresStore {
    async fn replace_run(&self, run: &Run) -> CoreResult<()> {
        let doc = serde_json::to_value(run).map_err(|e| CoreError::Fatal(e.to_string()))?;
        sqlx::query("UPDATE runs SET state = $1, doc = $2 WHERE id = $3")
            .bind(run.state.to_string())
            .bind(doc)
            .bind(run.id.as_str())
            .execute(&self.pool)
            .await
            .map_err(|e| map_err("replace_run", e))?;
        Ok(())
    }
}
