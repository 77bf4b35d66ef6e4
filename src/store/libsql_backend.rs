//! libSQL backend — async `Database` trait implementation.
//!
//! Supports local file and in-memory databases. `libsql::Connection` is
//! `Send + Sync` and safe for concurrent async use, so one connection is
//! reused for all operations.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::{Connection, Database as LibSqlDatabase, params};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::DatabaseError;
use crate::store::migrations;
use crate::store::traits::{Database, FlashMessage, SessionRecord};
use crate::tasks::model::{AttemptState, TaskAttempt};
use crate::users::model::{User, UserProfile};

/// libSQL database backend.
pub struct LibSqlBackend {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
}

impl LibSqlBackend {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Pool(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Pool(format!("Failed to open libSQL database: {e}")))?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;

        migrations::run_migrations(&conn).await?;
        info!(path = %path.display(), "Database opened");
        Ok(Self {
            db: Arc::new(db),
            conn,
        })
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                DatabaseError::Pool(format!("Failed to create in-memory database: {e}"))
            })?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;

        migrations::run_migrations(&conn).await?;
        Ok(Self {
            db: Arc::new(db),
            conn,
        })
    }

    /// Get the connection.
    fn conn(&self) -> &Connection {
        &self.conn
    }
}

// ── Helper functions ────────────────────────────────────────────────

/// Parse an RFC 3339 or SQLite datetime string into DateTime<Utc>.
fn parse_datetime(s: &str) -> DateTime<Utc> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return dt.with_timezone(&Utc);
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
        return ndt.and_utc();
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return ndt.and_utc();
    }
    DateTime::<Utc>::MIN_UTC
}

/// Parse a stored uuid column, tolerating nothing: these are always written
/// by us, so a bad value is a real query bug.
fn parse_uuid(s: &str, context: &str) -> Result<Uuid, DatabaseError> {
    Uuid::parse_str(s).map_err(|e| DatabaseError::Query(format!("{context}: bad uuid: {e}")))
}

/// Convert `Option<String>` to a libsql Value (NULL when absent).
fn opt_text_owned(s: Option<String>) -> libsql::Value {
    match s {
        Some(s) => libsql::Value::Text(s),
        None => libsql::Value::Null,
    }
}

/// Map a libsql error, surfacing UNIQUE/constraint failures as their own
/// variant so callers can tell a duplicate apart from a broken query.
fn map_write_err(context: &str, e: libsql::Error) -> DatabaseError {
    let text = e.to_string();
    if text.contains("UNIQUE constraint failed") || text.contains("constraint failed") {
        DatabaseError::Constraint(format!("{context}: {text}"))
    } else {
        DatabaseError::Query(format!("{context}: {text}"))
    }
}

fn row_to_user(row: &libsql::Row) -> Result<User, DatabaseError> {
    let id: String = row
        .get(0)
        .map_err(|e| DatabaseError::Query(format!("user row: {e}")))?;
    let email: String = row
        .get(1)
        .map_err(|e| DatabaseError::Query(format!("user row: {e}")))?;
    let created: String = row
        .get(2)
        .map_err(|e| DatabaseError::Query(format!("user row: {e}")))?;
    Ok(User {
        id: parse_uuid(&id, "user row")?,
        email,
        created_at: parse_datetime(&created),
    })
}

fn row_to_profile(row: &libsql::Row) -> Result<UserProfile, DatabaseError> {
    let user_id: String = row
        .get(0)
        .map_err(|e| DatabaseError::Query(format!("profile row: {e}")))?;
    let name: String = row
        .get(1)
        .map_err(|e| DatabaseError::Query(format!("profile row: {e}")))?;
    let username: String = row
        .get(2)
        .map_err(|e| DatabaseError::Query(format!("profile row: {e}")))?;
    let created: String = row
        .get(3)
        .map_err(|e| DatabaseError::Query(format!("profile row: {e}")))?;
    let updated: String = row
        .get(4)
        .map_err(|e| DatabaseError::Query(format!("profile row: {e}")))?;
    Ok(UserProfile {
        user_id: parse_uuid(&user_id, "profile row")?,
        name,
        username,
        created_at: parse_datetime(&created),
        updated_at: parse_datetime(&updated),
    })
}

fn row_to_attempt(row: &libsql::Row) -> Result<TaskAttempt, DatabaseError> {
    let id: String = row
        .get(0)
        .map_err(|e| DatabaseError::Query(format!("attempt row: {e}")))?;
    let user_id: String = row
        .get(1)
        .map_err(|e| DatabaseError::Query(format!("attempt row: {e}")))?;
    let task_name: String = row
        .get(2)
        .map_err(|e| DatabaseError::Query(format!("attempt row: {e}")))?;
    let state: String = row
        .get(3)
        .map_err(|e| DatabaseError::Query(format!("attempt row: {e}")))?;
    let created: String = row
        .get(4)
        .map_err(|e| DatabaseError::Query(format!("attempt row: {e}")))?;
    Ok(TaskAttempt {
        id: parse_uuid(&id, "attempt row")?,
        user_id: parse_uuid(&user_id, "attempt row")?,
        task_name,
        state: AttemptState::from_str_lossy(&state),
        created_at: parse_datetime(&created),
    })
}

#[async_trait]
impl Database for LibSqlBackend {
    // ── Users ───────────────────────────────────────────────────────

    async fn insert_user(&self, user: &User) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                "INSERT INTO users (id, email, created_at) VALUES (?1, ?2, ?3)",
                params![
                    user.id.to_string(),
                    user.email.clone(),
                    user.created_at.to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| map_write_err("insert_user", e))?;
        debug!(user_id = %user.id, "User inserted");
        Ok(())
    }

    async fn get_user(&self, id: Uuid) -> Result<Option<User>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT id, email, created_at FROM users WHERE id = ?1",
                params![id.to_string()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_user: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_user(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("get_user: {e}"))),
        }
    }

    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT id, email, created_at FROM users WHERE email = ?1",
                params![email],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_user_by_email: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_user(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("get_user_by_email: {e}"))),
        }
    }

    // ── Profiles ────────────────────────────────────────────────────

    async fn insert_profile(&self, profile: &UserProfile) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                "INSERT INTO profiles (user_id, name, username, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    profile.user_id.to_string(),
                    profile.name.clone(),
                    profile.username.clone(),
                    profile.created_at.to_rfc3339(),
                    profile.updated_at.to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| map_write_err("insert_profile", e))?;
        debug!(user_id = %profile.user_id, "Profile inserted");
        Ok(())
    }

    async fn get_profile(&self, user_id: Uuid) -> Result<Option<UserProfile>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT user_id, name, username, created_at, updated_at
                 FROM profiles WHERE user_id = ?1",
                params![user_id.to_string()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_profile: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_profile(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("get_profile: {e}"))),
        }
    }

    async fn update_profile(&self, profile: &UserProfile) -> Result<(), DatabaseError> {
        let affected = self
            .conn()
            .execute(
                "UPDATE profiles SET name = ?1, username = ?2, updated_at = ?3
                 WHERE user_id = ?4",
                params![
                    profile.name.clone(),
                    profile.username.clone(),
                    Utc::now().to_rfc3339(),
                    profile.user_id.to_string(),
                ],
            )
            .await
            .map_err(|e| map_write_err("update_profile", e))?;

        if affected == 0 {
            return Err(DatabaseError::NotFound {
                entity: "profile".to_string(),
                id: profile.user_id.to_string(),
            });
        }
        Ok(())
    }

    async fn count_profiles(&self) -> Result<u64, DatabaseError> {
        let mut rows = self
            .conn()
            .query("SELECT COUNT(*) FROM profiles", ())
            .await
            .map_err(|e| DatabaseError::Query(format!("count_profiles: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let n: i64 = row
                    .get(0)
                    .map_err(|e| DatabaseError::Query(format!("count_profiles: {e}")))?;
                Ok(n as u64)
            }
            Ok(None) => Ok(0),
            Err(e) => Err(DatabaseError::Query(format!("count_profiles: {e}"))),
        }
    }

    // ── Task attempts ───────────────────────────────────────────────

    async fn insert_attempt(&self, attempt: &TaskAttempt) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                "INSERT INTO task_attempts (id, user_id, task_name, state, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    attempt.id.to_string(),
                    attempt.user_id.to_string(),
                    attempt.task_name.clone(),
                    attempt.state.as_str(),
                    attempt.created_at.to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| map_write_err("insert_attempt", e))?;
        Ok(())
    }

    async fn list_attempts(
        &self,
        user_id: Uuid,
        state: AttemptState,
    ) -> Result<Vec<TaskAttempt>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT id, user_id, task_name, state, created_at FROM task_attempts
                 WHERE user_id = ?1 AND state = ?2 ORDER BY created_at DESC",
                params![user_id.to_string(), state.as_str()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("list_attempts: {e}")))?;

        let mut attempts = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("list_attempts: {e}")))?
        {
            attempts.push(row_to_attempt(&row)?);
        }
        Ok(attempts)
    }

    // ── Sessions ────────────────────────────────────────────────────

    async fn insert_session(&self, session: &SessionRecord) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                "INSERT INTO sessions (token, user_id, flash, created_at)
                 VALUES (?1, ?2, '[]', ?3)",
                params![
                    session.token.clone(),
                    opt_text_owned(session.user_id.map(|id| id.to_string())),
                    session.created_at.to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| map_write_err("insert_session", e))?;
        Ok(())
    }

    async fn get_session(&self, token: &str) -> Result<Option<SessionRecord>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT token, user_id, created_at FROM sessions WHERE token = ?1",
                params![token],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_session: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let token: String = row
                    .get(0)
                    .map_err(|e| DatabaseError::Query(format!("session row: {e}")))?;
                // NULL user_id means an anonymous session.
                let user_id: Option<String> = row.get(1).ok();
                let created: String = row
                    .get(2)
                    .map_err(|e| DatabaseError::Query(format!("session row: {e}")))?;
                let user_id = match user_id {
                    Some(s) => Some(parse_uuid(&s, "session row")?),
                    None => None,
                };
                Ok(Some(SessionRecord {
                    token,
                    user_id,
                    created_at: parse_datetime(&created),
                }))
            }
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("get_session: {e}"))),
        }
    }

    async fn delete_session(&self, token: &str) -> Result<(), DatabaseError> {
        self.conn()
            .execute("DELETE FROM sessions WHERE token = ?1", params![token])
            .await
            .map_err(|e| DatabaseError::Query(format!("delete_session: {e}")))?;
        Ok(())
    }

    async fn push_flash(&self, token: &str, flash: &FlashMessage) -> Result<(), DatabaseError> {
        let mut queue = self.read_flash(token).await?;
        queue.push(flash.clone());
        self.write_flash(token, &queue).await
    }

    async fn take_flash(&self, token: &str) -> Result<Vec<FlashMessage>, DatabaseError> {
        let queue = self.read_flash(token).await?;
        if !queue.is_empty() {
            self.write_flash(token, &[]).await?;
        }
        Ok(queue)
    }
}

impl LibSqlBackend {
    /// Read a session's flash queue without clearing it.
    async fn read_flash(&self, token: &str) -> Result<Vec<FlashMessage>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT flash FROM sessions WHERE token = ?1",
                params![token],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("take_flash: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let raw: String = row
                    .get(0)
                    .map_err(|e| DatabaseError::Query(format!("take_flash: {e}")))?;
                serde_json::from_str(&raw)
                    .map_err(|e| DatabaseError::Serialization(format!("flash queue: {e}")))
            }
            Ok(None) => Ok(Vec::new()),
            Err(e) => Err(DatabaseError::Query(format!("take_flash: {e}"))),
        }
    }

    /// Overwrite a session's flash queue.
    async fn write_flash(
        &self,
        token: &str,
        queue: &[FlashMessage],
    ) -> Result<(), DatabaseError> {
        let raw = serde_json::to_string(queue)
            .map_err(|e| DatabaseError::Serialization(format!("flash queue: {e}")))?;
        self.conn()
            .execute(
                "UPDATE sessions SET flash = ?1 WHERE token = ?2",
                params![raw, token],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("write_flash: {e}")))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn backend() -> LibSqlBackend {
        LibSqlBackend::new_memory().await.unwrap()
    }

    #[tokio::test]
    async fn find_or_create_user_is_idempotent() {
        let db = backend().await;
        let a = db.find_or_create_user("v@example.org").await.unwrap();
        let b = db.find_or_create_user("v@example.org").await.unwrap();
        assert_eq!(a.id, b.id);
    }

    #[tokio::test]
    async fn duplicate_profile_hits_unique_constraint() {
        let db = backend().await;
        let user = db.find_or_create_user("v@example.org").await.unwrap();
        db.insert_profile(&UserProfile::new(user.id, "Vol", "vol"))
            .await
            .unwrap();

        let err = db
            .insert_profile(&UserProfile::new(user.id, "Vol Again", "vol2"))
            .await
            .unwrap_err();
        assert!(matches!(err, DatabaseError::Constraint(_)), "{err:?}");
        assert_eq!(db.count_profiles().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn update_profile_changes_row_in_place() {
        let db = backend().await;
        let user = db.find_or_create_user("v@example.org").await.unwrap();
        db.insert_profile(&UserProfile::new(user.id, "Old Name", "vol"))
            .await
            .unwrap();

        let mut profile = db.get_profile(user.id).await.unwrap().unwrap();
        profile.name = "New Name".to_string();
        db.update_profile(&profile).await.unwrap();

        let reloaded = db.get_profile(user.id).await.unwrap().unwrap();
        assert_eq!(reloaded.name, "New Name");
        assert_eq!(db.count_profiles().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn update_missing_profile_is_not_found() {
        let db = backend().await;
        let ghost = UserProfile::new(Uuid::new_v4(), "Nobody", "ghost");
        let err = db.update_profile(&ghost).await.unwrap_err();
        assert!(matches!(err, DatabaseError::NotFound { .. }), "{err:?}");
    }

    #[tokio::test]
    async fn list_attempts_filters_by_user_and_state() {
        let db = backend().await;
        let a = db.find_or_create_user("a@example.org").await.unwrap();
        let b = db.find_or_create_user("b@example.org").await.unwrap();

        db.insert_attempt(&TaskAttempt::new(a.id, "Triage bugs"))
            .await
            .unwrap();
        db.insert_attempt(&TaskAttempt::new(a.id, "Write docs"))
            .await
            .unwrap();
        let mut done = TaskAttempt::new(a.id, "Old task");
        done.state = AttemptState::Finished;
        db.insert_attempt(&done).await.unwrap();
        db.insert_attempt(&TaskAttempt::new(b.id, "Other user's task"))
            .await
            .unwrap();

        let started = db.list_attempts(a.id, AttemptState::Started).await.unwrap();
        assert_eq!(started.len(), 2);
        assert!(started.iter().all(|t| t.user_id == a.id));
        assert!(started.iter().all(|t| t.state == AttemptState::Started));
    }

    #[tokio::test]
    async fn flash_queue_drains_once() {
        let db = backend().await;
        let session = SessionRecord {
            token: "tok".to_string(),
            user_id: None,
            created_at: Utc::now(),
        };
        db.insert_session(&session).await.unwrap();
        db.push_flash("tok", &FlashMessage::error("first"))
            .await
            .unwrap();
        db.push_flash("tok", &FlashMessage::error("second"))
            .await
            .unwrap();

        let drained = db.take_flash("tok").await.unwrap();
        assert_eq!(drained.len(), 2);
        assert_eq!(drained[0].message, "first");

        assert!(db.take_flash("tok").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn delete_session_is_idempotent() {
        let db = backend().await;
        let session = SessionRecord {
            token: "gone".to_string(),
            user_id: None,
            created_at: Utc::now(),
        };
        db.insert_session(&session).await.unwrap();
        db.delete_session("gone").await.unwrap();
        db.delete_session("gone").await.unwrap();
        assert!(db.get_session("gone").await.unwrap().is_none());
    }
}
