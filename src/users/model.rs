//! User and profile data models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// An authenticated account, provisioned on first successful identity
/// verification. Carries no credentials; the verifier owns those.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    /// Unique ID.
    pub id: Uuid,
    /// Verified email address (unique).
    pub email: String,
    /// When the account was created.
    pub created_at: DateTime<Utc>,
}

impl User {
    /// Create a new user for a freshly verified email.
    pub fn new(email: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            email: email.to_string(),
            created_at: Utc::now(),
        }
    }
}

/// Per-user profile record. Exactly one per user; the `profiles.user_id`
/// UNIQUE constraint enforces the 1:1 relation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProfile {
    /// Owning user.
    pub user_id: Uuid,
    /// Display name shown on the profile page.
    pub name: String,
    /// Unique handle used in public task listings.
    pub username: String,
    /// When the profile was created.
    pub created_at: DateTime<Utc>,
    /// When the profile was last updated.
    pub updated_at: DateTime<Utc>,
}

impl UserProfile {
    /// Create a new profile owned by `user_id`.
    pub fn new(user_id: Uuid, name: &str, username: &str) -> Self {
        let now = Utc::now();
        Self {
            user_id,
            name: name.to_string(),
            username: username.to_string(),
            created_at: now,
            updated_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_user_has_fresh_id() {
        let a = User::new("a@example.org");
        let b = User::new("a@example.org");
        assert_ne!(a.id, b.id);
        assert_eq!(a.email, "a@example.org");
    }

    #[test]
    fn new_profile_is_owned() {
        let user = User::new("v@example.org");
        let profile = UserProfile::new(user.id, "Vol Unteer", "vol");
        assert_eq!(profile.user_id, user.id);
        assert_eq!(profile.created_at, profile.updated_at);
    }
}
