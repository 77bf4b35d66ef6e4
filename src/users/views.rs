//! Account views — login page, identity-verification callback, and the
//! profile create/update/detail pages.
//!
//! Guard order matches the original site: authentication first, then the
//! profile-existence checks, then form handling. Invalid form submissions
//! re-render the edit template with field errors rather than failing the
//! request.

use std::collections::BTreeMap;

use axum::Form;
use axum::Router;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::http::header::SET_COOKIE;
use axum::response::{IntoResponse, Redirect, Response};
use axum::routing::{get, post};
use serde::Deserialize;
use tera::Context;
use tracing::{info, warn};

use crate::auth::session::{self, CurrentUser, ProfileRequired};
use crate::error::{DatabaseError, Error, Result};
use crate::pages;
use crate::state::AppState;
use crate::store::FlashMessage;
use crate::tasks::model::AttemptState;
use crate::users::forms::ProfileForm;
use crate::users::model::UserProfile;

/// One-size-fits-all sign-in failure text, per the original site: network
/// trouble and a bad assertion read the same to the user.
const LOGIN_FAILED_MESSAGE: &str = "There was a problem signing you in. Please try again.";

/// Build the account routes.
pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/login", get(login_page))
        .route("/verify", post(verify))
        .route("/logout", post(logout))
        .route("/profile/new", get(create_profile_page).post(create_profile_submit))
        .route("/profile/edit", get(update_profile_page).post(update_profile_submit))
        .route("/profile", get(profile_detail))
        .with_state(state)
}

// ── Login / verify / logout ─────────────────────────────────────────

/// GET /login — render the login page, draining any queued flash messages.
async fn login_page(State(state): State<AppState>, headers: HeaderMap) -> Result<Response> {
    let messages = session::drain_flash(&state.db, &headers).await?;

    let mut ctx = Context::new();
    ctx.insert("messages", &messages);
    Ok(pages::render(&state.templates, "users/login.html", &ctx)?.into_response())
}

#[derive(Debug, Deserialize)]
struct VerifyForm {
    #[serde(default)]
    assertion: String,
}

/// POST /verify — check the browser's assertion with the remote verifier.
///
/// Success finds or creates the account, rotates the session, and redirects
/// into the profile pages. Failure queues exactly one error flash and sends
/// the user back to the login page.
async fn verify(
    State(state): State<AppState>,
    headers: HeaderMap,
    Form(form): Form<VerifyForm>,
) -> Result<Response> {
    match state.verifier.verify(&form.assertion).await {
        Ok(identity) => {
            let user = state.db.find_or_create_user(&identity.email).await?;
            let cookie = session::login(&state.db, &headers, user.id).await?;
            info!(user_id = %user.id, "Signed in");
            Ok(([(SET_COOKIE, cookie)], Redirect::to("/profile")).into_response())
        }
        Err(e) => {
            warn!(error = %e, "Identity verification failed");
            let flash = FlashMessage::error(LOGIN_FAILED_MESSAGE);
            let cookie = session::queue_flash(&state.db, &headers, flash).await?;
            let redirect = Redirect::to("/login");
            Ok(match cookie {
                Some(cookie) => ([(SET_COOKIE, cookie)], redirect).into_response(),
                None => redirect.into_response(),
            })
        }
    }
}

/// POST /logout — destroy the session.
async fn logout(State(state): State<AppState>, headers: HeaderMap) -> Result<Response> {
    let cookie = session::logout(&state.db, &headers).await?;
    Ok(([(SET_COOKIE, cookie)], Redirect::to("/login")).into_response())
}

// ── Profile create ──────────────────────────────────────────────────

/// GET /profile/new — render an empty profile form, unless the user already
/// has a profile, in which case the existence guard redirects to detail.
async fn create_profile_page(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> Result<Response> {
    if state.db.profile_exists(user.id).await? {
        return Ok(Redirect::to("/profile").into_response());
    }

    let form = ProfileForm {
        name: String::new(),
        username: String::new(),
    };
    render_edit(&state, &form, &BTreeMap::new(), true)
}

/// POST /profile/new — create the requester's profile.
///
/// The existence guard runs before the form is looked at; a duplicate
/// submission redirects to detail instead of creating a second row. The
/// `profiles.user_id` UNIQUE constraint backs the guard up if two requests
/// race past it.
async fn create_profile_submit(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Form(form): Form<ProfileForm>,
) -> Result<Response> {
    if state.db.profile_exists(user.id).await? {
        return Ok(Redirect::to("/profile").into_response());
    }

    let errors = form.validate();
    if !errors.is_empty() {
        return render_edit(&state, &form, &errors, true);
    }

    let profile = UserProfile::new(user.id, form.name(), &form.username);
    match state.db.insert_profile(&profile).await {
        Ok(()) => {
            info!(user_id = %user.id, "Profile created");
            Ok(Redirect::to("/profile").into_response())
        }
        Err(DatabaseError::Constraint(detail)) if detail.contains("username") => {
            let mut errors = BTreeMap::new();
            errors.insert("username", "This username is already taken.".to_string());
            render_edit(&state, &form, &errors, true)
        }
        // Lost a create race: a profile now exists, fall back to the guard's
        // redirect.
        Err(DatabaseError::Constraint(_)) => Ok(Redirect::to("/profile").into_response()),
        Err(e) => Err(Error::Database(e)),
    }
}

// ── Profile update ──────────────────────────────────────────────────

/// GET /profile/edit — render the form bound to the requester's own
/// profile. The guard has already rejected anyone without one.
async fn update_profile_page(
    State(state): State<AppState>,
    guard: ProfileRequired,
) -> Result<Response> {
    let form = ProfileForm {
        name: guard.profile.name.clone(),
        username: guard.profile.username.clone(),
    };
    render_edit(&state, &form, &BTreeMap::new(), false)
}

/// POST /profile/edit — update the requester's profile in place. There is
/// no id-based lookup: the target is always the session user's own row.
async fn update_profile_submit(
    State(state): State<AppState>,
    guard: ProfileRequired,
    Form(form): Form<ProfileForm>,
) -> Result<Response> {
    let errors = form.validate();
    if !errors.is_empty() {
        return render_edit(&state, &form, &errors, false);
    }

    let mut profile = guard.profile;
    profile.name = form.name().to_string();
    profile.username = form.username.clone();

    match state.db.update_profile(&profile).await {
        Ok(()) => Ok(Redirect::to("/profile").into_response()),
        Err(DatabaseError::Constraint(detail)) if detail.contains("username") => {
            let mut errors = BTreeMap::new();
            errors.insert("username", "This username is already taken.".to_string());
            render_edit(&state, &form, &errors, false)
        }
        Err(e) => Err(Error::Database(e)),
    }
}

// ── Profile detail ──────────────────────────────────────────────────

/// GET /profile — the requester's profile plus their in-progress attempts.
async fn profile_detail(
    State(state): State<AppState>,
    headers: HeaderMap,
    guard: ProfileRequired,
) -> Result<Response> {
    let attempts = state
        .db
        .list_attempts(guard.user.id, AttemptState::Started)
        .await?;
    let messages = session::drain_flash(&state.db, &headers).await?;

    let mut ctx = Context::new();
    ctx.insert("messages", &messages);
    ctx.insert("profile", &guard.profile);
    ctx.insert("attempts_in_progress", &attempts);
    Ok(pages::render(&state.templates, "users/profile/detail.html", &ctx)?.into_response())
}

// ── Helpers ─────────────────────────────────────────────────────────

/// Render the shared edit template with the given form values and field
/// errors. Always a 200: validation failure is recovered locally, not an
/// error response.
fn render_edit(
    state: &AppState,
    form: &ProfileForm,
    errors: &BTreeMap<&'static str, String>,
    creating: bool,
) -> Result<Response> {
    let mut ctx = Context::new();
    ctx.insert("messages", &Vec::<FlashMessage>::new());
    ctx.insert(
        "form",
        &serde_json::json!({ "name": form.name, "username": form.username }),
    );
    ctx.insert("errors", errors);
    ctx.insert("creating", &creating);
    Ok(pages::render(&state.templates, "users/profile/edit.html", &ctx)?.into_response())
}
