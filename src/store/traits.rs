//! Backend-agnostic `Database` trait — single async interface for all
//! persistence used by the account views.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::DatabaseError;
use crate::tasks::model::{AttemptState, TaskAttempt};
use crate::users::model::{User, UserProfile};

/// A queued flash message, displayed once on the next rendered page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlashMessage {
    /// Severity tag the templates use for styling ("error", "info").
    pub level: String,
    /// Message text.
    pub message: String,
}

impl FlashMessage {
    /// An error-level flash.
    pub fn error(message: &str) -> Self {
        Self {
            level: "error".to_string(),
            message: message.to_string(),
        }
    }
}

/// A persisted session row.
#[derive(Debug, Clone)]
pub struct SessionRecord {
    /// Opaque token carried in the cookie.
    pub token: String,
    /// Authenticated user, if any. Anonymous sessions exist solely to carry
    /// flash messages across the login redirect.
    pub user_id: Option<Uuid>,
    /// When the session was created.
    pub created_at: DateTime<Utc>,
}

/// Backend-agnostic database trait covering users, profiles, sessions, and
/// task attempts.
#[async_trait]
pub trait Database: Send + Sync {
    // ── Users ───────────────────────────────────────────────────────

    /// Insert a new user.
    async fn insert_user(&self, user: &User) -> Result<(), DatabaseError>;

    /// Get a user by ID.
    async fn get_user(&self, id: Uuid) -> Result<Option<User>, DatabaseError>;

    /// Get a user by verified email.
    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>, DatabaseError>;

    /// Find the user for a verified email, creating one on first sight.
    async fn find_or_create_user(&self, email: &str) -> Result<User, DatabaseError> {
        if let Some(user) = self.get_user_by_email(email).await? {
            return Ok(user);
        }
        let user = User::new(email);
        self.insert_user(&user).await?;
        Ok(user)
    }

    // ── Profiles ────────────────────────────────────────────────────

    /// Insert a new profile. Fails with `DatabaseError::Constraint` if the
    /// user already has one or the username is taken.
    async fn insert_profile(&self, profile: &UserProfile) -> Result<(), DatabaseError>;

    /// Get the profile owned by `user_id`.
    async fn get_profile(&self, user_id: Uuid) -> Result<Option<UserProfile>, DatabaseError>;

    /// Whether `user_id` already has a profile.
    async fn profile_exists(&self, user_id: Uuid) -> Result<bool, DatabaseError> {
        Ok(self.get_profile(user_id).await?.is_some())
    }

    /// Update the profile owned by `profile.user_id` in place.
    async fn update_profile(&self, profile: &UserProfile) -> Result<(), DatabaseError>;

    /// Total number of profile rows. The views never need this; tests use
    /// it to assert the create guard held.
    async fn count_profiles(&self) -> Result<u64, DatabaseError>;

    // ── Task attempts ───────────────────────────────────────────────

    /// Insert a task attempt. The attempt workflow lives outside this
    /// service; this exists for seeding and tests.
    async fn insert_attempt(&self, attempt: &TaskAttempt) -> Result<(), DatabaseError>;

    /// List a user's attempts in the given state, newest first.
    async fn list_attempts(
        &self,
        user_id: Uuid,
        state: AttemptState,
    ) -> Result<Vec<TaskAttempt>, DatabaseError>;

    // ── Sessions ────────────────────────────────────────────────────

    /// Insert a new session row.
    async fn insert_session(&self, session: &SessionRecord) -> Result<(), DatabaseError>;

    /// Look up a session by token.
    async fn get_session(&self, token: &str) -> Result<Option<SessionRecord>, DatabaseError>;

    /// Delete a session by token. Deleting a missing token is not an error.
    async fn delete_session(&self, token: &str) -> Result<(), DatabaseError>;

    /// Append a flash message to a session's queue.
    async fn push_flash(&self, token: &str, flash: &FlashMessage) -> Result<(), DatabaseError>;

    /// Drain a session's flash queue, returning the queued messages and
    /// leaving it empty.
    async fn take_flash(&self, token: &str) -> Result<Vec<FlashMessage>, DatabaseError>;
}
