//! Cookie-token sessions and the request guards built on them.
//!
//! A session is an opaque random token in a cookie mapped to a `sessions`
//! row. Anonymous sessions exist so a flash message queued during a failed
//! sign-in survives the redirect back to the login page. Signing in rotates
//! the token.

use std::sync::Arc;

use axum::extract::FromRequestParts;
use axum::http::header::COOKIE;
use axum::http::request::Parts;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Redirect, Response};
use chrono::Utc;
use rand::Rng;
use rand::distributions::Alphanumeric;
use tracing::debug;
use uuid::Uuid;

use crate::error::DatabaseError;
use crate::state::AppState;
use crate::store::{Database, FlashMessage, SessionRecord};
use crate::users::model::{User, UserProfile};

/// Name of the session cookie.
pub const SESSION_COOKIE: &str = "handraise_session";

const TOKEN_LEN: usize = 40;

/// Generate a fresh opaque session token.
fn new_token() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(TOKEN_LEN)
        .map(char::from)
        .collect()
}

/// Extract the session token from the request's Cookie header, if any.
pub fn session_token(headers: &HeaderMap) -> Option<String> {
    let raw = headers.get(COOKIE)?.to_str().ok()?;
    raw.split(';').find_map(|pair| {
        pair.trim()
            .strip_prefix(SESSION_COOKIE)?
            .strip_prefix('=')
            .map(str::to_string)
    })
}

/// Set-Cookie value installing `token`.
pub fn session_cookie(token: &str) -> String {
    format!("{SESSION_COOKIE}={token}; Path=/; HttpOnly; SameSite=Lax")
}

/// Set-Cookie value clearing the session cookie.
pub fn clear_cookie() -> String {
    format!("{SESSION_COOKIE}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0")
}

/// Look up the session row for the request, ignoring stale tokens whose row
/// is gone.
pub async fn current_session(
    db: &Arc<dyn Database>,
    headers: &HeaderMap,
) -> Result<Option<SessionRecord>, DatabaseError> {
    match session_token(headers) {
        Some(token) => db.get_session(&token).await,
        None => Ok(None),
    }
}

/// Find the request's session, creating an anonymous one when the request
/// carries no valid token. Returns the session plus a Set-Cookie value when
/// a new cookie must be installed.
pub async fn ensure_session(
    db: &Arc<dyn Database>,
    headers: &HeaderMap,
) -> Result<(SessionRecord, Option<String>), DatabaseError> {
    if let Some(session) = current_session(db, headers).await? {
        return Ok((session, None));
    }
    let session = SessionRecord {
        token: new_token(),
        user_id: None,
        created_at: Utc::now(),
    };
    db.insert_session(&session).await?;
    let cookie = session_cookie(&session.token);
    Ok((session, Some(cookie)))
}

/// Start an authenticated session for `user_id`, rotating any existing
/// token. Returns the Set-Cookie value for the response.
pub async fn login(
    db: &Arc<dyn Database>,
    headers: &HeaderMap,
    user_id: Uuid,
) -> Result<String, DatabaseError> {
    if let Some(old) = session_token(headers) {
        db.delete_session(&old).await?;
    }
    let session = SessionRecord {
        token: new_token(),
        user_id: Some(user_id),
        created_at: Utc::now(),
    };
    db.insert_session(&session).await?;
    debug!(%user_id, "Session started");
    Ok(session_cookie(&session.token))
}

/// Destroy the request's session, if any. Returns the clearing Set-Cookie
/// value.
pub async fn logout(
    db: &Arc<dyn Database>,
    headers: &HeaderMap,
) -> Result<String, DatabaseError> {
    if let Some(token) = session_token(headers) {
        db.delete_session(&token).await?;
    }
    Ok(clear_cookie())
}

/// Queue a flash message on the request's session, creating an anonymous
/// session if needed. Returns a Set-Cookie value when one was created.
pub async fn queue_flash(
    db: &Arc<dyn Database>,
    headers: &HeaderMap,
    flash: FlashMessage,
) -> Result<Option<String>, DatabaseError> {
    let (session, cookie) = ensure_session(db, headers).await?;
    db.push_flash(&session.token, &flash).await?;
    Ok(cookie)
}

/// Drain the request's flash queue for display on this render.
pub async fn drain_flash(
    db: &Arc<dyn Database>,
    headers: &HeaderMap,
) -> Result<Vec<FlashMessage>, DatabaseError> {
    match session_token(headers) {
        Some(token) => db.take_flash(&token).await,
        None => Ok(Vec::new()),
    }
}

// ── Request guards ──────────────────────────────────────────────────

/// Guard: the request carries an authenticated session. Rejection is a
/// redirect to the login page.
pub struct CurrentUser(pub User);

impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = Response;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let session = current_session(&state.db, &parts.headers)
            .await
            .map_err(internal_error)?;

        let user_id = session
            .and_then(|s| s.user_id)
            .ok_or_else(|| Redirect::to("/login").into_response())?;

        let user = state
            .db
            .get_user(user_id)
            .await
            .map_err(internal_error)?
            .ok_or_else(|| Redirect::to("/login").into_response())?;

        Ok(CurrentUser(user))
    }
}

/// Guard: authenticated AND has a completed profile. Runs before any view
/// logic, for every method. Rejections: `/login` when unauthenticated,
/// `/profile/new` when the profile is missing.
pub struct ProfileRequired {
    pub user: User,
    pub profile: UserProfile,
}

impl FromRequestParts<AppState> for ProfileRequired {
    type Rejection = Response;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let CurrentUser(user) = CurrentUser::from_request_parts(parts, state).await?;

        let profile = state
            .db
            .get_profile(user.id)
            .await
            .map_err(internal_error)?
            .ok_or_else(|| Redirect::to("/profile/new").into_response())?;

        Ok(ProfileRequired { user, profile })
    }
}

fn internal_error(e: DatabaseError) -> Response {
    tracing::error!(error = %e, "session guard failed");
    (StatusCode::INTERNAL_SERVER_ERROR, "internal server error").into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn token_is_long_and_distinct() {
        let a = new_token();
        let b = new_token();
        assert_eq!(a.len(), TOKEN_LEN);
        assert_ne!(a, b);
    }

    #[test]
    fn cookie_round_trip() {
        let mut headers = HeaderMap::new();
        headers.insert(
            COOKIE,
            HeaderValue::from_str(&format!("other=1; {}", session_cookie("abc123"))).unwrap(),
        );
        assert_eq!(session_token(&headers).as_deref(), Some("abc123"));
    }

    #[test]
    fn missing_cookie_is_none() {
        assert!(session_token(&HeaderMap::new()).is_none());
    }

    #[test]
    fn clear_cookie_expires_immediately() {
        assert!(clear_cookie().contains("Max-Age=0"));
    }
}
