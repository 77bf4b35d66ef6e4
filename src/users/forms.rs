//! Profile form binding and validation.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;
use serde::Deserialize;

/// Usernames: 1-30 chars of ascii letters, digits, underscore or hyphen.
static USERNAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_-]{1,30}$").expect("valid username regex"));

const NAME_MAX_LEN: usize = 255;

/// Submitted profile fields, as posted by the edit template.
#[derive(Debug, Clone, Deserialize)]
pub struct ProfileForm {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub username: String,
}

impl ProfileForm {
    /// Validate the submitted fields. Returns a field → message map; an
    /// empty map means the form is valid. Messages are written for direct
    /// display in the edit template.
    pub fn validate(&self) -> BTreeMap<&'static str, String> {
        let mut errors = BTreeMap::new();

        let name = self.name.trim();
        if name.is_empty() {
            errors.insert("name", "This field is required.".to_string());
        } else if name.len() > NAME_MAX_LEN {
            errors.insert(
                "name",
                format!("Ensure this value has at most {NAME_MAX_LEN} characters."),
            );
        }

        if self.username.is_empty() {
            errors.insert("username", "This field is required.".to_string());
        } else if !USERNAME_RE.is_match(&self.username) {
            errors.insert(
                "username",
                "Usernames may only contain letters, numbers, hyphens and underscores."
                    .to_string(),
            );
        }

        errors
    }

    /// Trimmed display name.
    pub fn name(&self) -> &str {
        self.name.trim()
    }
}
