//! Task attempt data model.
//!
//! Attempts are written by the task workflow, which lives outside this
//! service. The profile pages only ever read them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle state of a task attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptState {
    Started,
    Finished,
    Abandoned,
    Closed,
}

impl AttemptState {
    /// DB string for this state.
    pub fn as_str(&self) -> &'static str {
        match self {
            AttemptState::Started => "started",
            AttemptState::Finished => "finished",
            AttemptState::Abandoned => "abandoned",
            AttemptState::Closed => "closed",
        }
    }

    /// Parse a state string from the DB. Unknown values map to `Closed`
    /// rather than failing the whole page.
    pub fn from_str_lossy(s: &str) -> Self {
        match s {
            "started" => AttemptState::Started,
            "finished" => AttemptState::Finished,
            "abandoned" => AttemptState::Abandoned,
            _ => AttemptState::Closed,
        }
    }
}

/// A user's engagement with a single task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskAttempt {
    /// Unique ID.
    pub id: Uuid,
    /// User making the attempt.
    pub user_id: Uuid,
    /// Name of the task being attempted.
    pub task_name: String,
    /// Lifecycle state.
    pub state: AttemptState,
    /// When the attempt was started.
    pub created_at: DateTime<Utc>,
}

impl TaskAttempt {
    /// Create a new in-progress attempt.
    pub fn new(user_id: Uuid, task_name: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            task_name: task_name.to_string(),
            state: AttemptState::Started,
            created_at: Utc::now(),
        }
    }
}
