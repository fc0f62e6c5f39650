//! Database repository for the catalog and per-student state.
//!
//! Writes run inside a transaction so that the state read, the transition and the revision
//! bump are applied together. Writers are serialized through one lock per repository: SQLite
//! fails a deferred transaction that tries to upgrade its read snapshot while another writer
//! holds the database, and the busy timeout does not cover that case.

use std::borrow::Cow;
use std::sync::Arc;

use chrono::Utc;
use sqlx::{Row, SqlitePool};
use tokio::sync::Mutex;

use crate::errors::AppError;
use crate::models::{Action, Catalog, SharedState, StudentState};
use crate::transitions;

/// Database repository for all data operations.
#[derive(Clone)]
pub struct Repository {
    pool: SqlitePool,
    write_lock: Arc<Mutex<()>>,
}

impl Repository {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Get the current revision ID.
    pub async fn get_revision_id(&self) -> Result<i64, AppError> {
        let row = sqlx::query("SELECT revision_id FROM meta WHERE id = 1")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.get("revision_id"))
    }

    // ==================== CATALOG ====================

    /// The stored catalog, empty if none was ever loaded.
    pub async fn get_catalog(&self) -> Result<Catalog, AppError> {
        let row = sqlx::query("SELECT payload FROM catalog WHERE id = 1")
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => {
                let payload: String = row.get("payload");
                Ok(serde_json::from_str(&payload)?)
            }
            None => Ok(Catalog::default()),
        }
    }

    /// Replace the catalog wholesale. Student states are left untouched.
    pub async fn replace_catalog(&self, catalog: &Catalog) -> Result<i64, AppError> {
        let payload = serde_json::to_string(catalog)?;
        let now = Utc::now().to_rfc3339();

        let _guard = self.write_lock.lock().await;
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO catalog (id, payload, updated_at) VALUES (1, ?, ?) \
             ON CONFLICT(id) DO UPDATE SET payload = excluded.payload, updated_at = excluded.updated_at",
        )
        .bind(&payload)
        .bind(&now)
        .execute(&mut *tx)
        .await?;

        let revision_id = bump_revision(&mut tx, &now).await?;
        tx.commit().await?;

        tracing::info!(
            classes = catalog.classes.len(),
            measures = catalog.measures.len(),
            revision_id,
            "Catalog replaced"
        );

        Ok(revision_id)
    }

    // ==================== STUDENT STATE ====================

    /// Every stored student state, keyed by student id.
    pub async fn get_shared_state(&self) -> Result<SharedState, AppError> {
        let rows = sqlx::query("SELECT student_id, state_json FROM student_states")
            .fetch_all(&self.pool)
            .await?;

        let mut shared = SharedState::new();
        for row in rows {
            let student_id: String = row.get("student_id");
            let state_json: String = row.get("state_json");
            match serde_json::from_str::<StudentState>(&state_json) {
                Ok(state) => {
                    shared.insert(student_id, state);
                }
                Err(e) => {
                    tracing::warn!("Skipping unreadable state for {}: {}", student_id, e);
                }
            }
        }
        Ok(shared)
    }

    /// Get one student's state, if anything was ever recorded for them.
    pub async fn get_student_state(
        &self,
        student_id: &str,
    ) -> Result<Option<StudentState>, AppError> {
        let row = sqlx::query("SELECT state_json FROM student_states WHERE student_id = ?")
            .bind(student_id)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => {
                let state_json: String = row.get("state_json");
                Ok(Some(serde_json::from_str(&state_json)?))
            }
            None => Ok(None),
        }
    }

    /// Apply a write action to the targeted student's stored state.
    ///
    /// Returns the resulting state and the revision after the write. An action that changes
    /// nothing (unknown measure, identical save) leaves the revision alone.
    pub async fn apply_action(&self, action: &Action) -> Result<(StudentState, i64), AppError> {
        let student_id = action.student_id();
        let _guard = self.write_lock.lock().await;
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query("SELECT state_json FROM student_states WHERE student_id = ?")
            .bind(student_id)
            .fetch_optional(&mut *tx)
            .await?;
        let current = match row {
            Some(row) => {
                let state_json: String = row.get("state_json");
                serde_json::from_str(&state_json)?
            }
            None => StudentState::empty(student_id),
        };

        let changed = match transitions::apply(&current, action, Utc::now, || {
            uuid::Uuid::new_v4().to_string()
        }) {
            Cow::Borrowed(_) => None,
            Cow::Owned(state) => Some(state),
        };

        let Some(state) = changed else {
            let row = sqlx::query("SELECT revision_id FROM meta WHERE id = 1")
                .fetch_one(&mut *tx)
                .await?;
            tx.rollback().await?;
            tracing::debug!(action = action.name(), student_id, "Action was a no-op");
            return Ok((current, row.get("revision_id")));
        };

        let state_json = serde_json::to_string(&state)?;
        let now = Utc::now().to_rfc3339();
        upsert_state(&mut tx, student_id, &state_json, &now).await?;
        let revision_id = bump_revision(&mut tx, &now).await?;
        tx.commit().await?;

        tracing::info!(action = action.name(), student_id, revision_id, "Action applied");

        Ok((state, revision_id))
    }
}

/// Increment the revision inside `tx` and return the new value.
async fn bump_revision(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    now: &str,
) -> Result<i64, AppError> {
    let row = sqlx::query(
        "UPDATE meta SET revision_id = revision_id + 1, generated_at = ? WHERE id = 1 \
         RETURNING revision_id",
    )
    .bind(now)
    .fetch_one(&mut **tx)
    .await?;
    Ok(row.get("revision_id"))
}

async fn upsert_state(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    student_id: &str,
    state_json: &str,
    now: &str,
) -> Result<(), AppError> {
    sqlx::query(
        "INSERT INTO student_states (student_id, state_json, updated_at) VALUES (?, ?, ?) \
         ON CONFLICT(student_id) DO UPDATE SET state_json = excluded.state_json, updated_at = excluded.updated_at",
    )
    .bind(student_id)
    .bind(state_json)
    .bind(now)
    .execute(&mut **tx)
    .await?;
    Ok(())
}
