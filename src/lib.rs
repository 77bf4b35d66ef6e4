//! Handraise — user accounts for a volunteer-task site.

pub mod auth;
pub mod config;
pub mod error;
pub mod pages;
pub mod state;
pub mod store;
pub mod tasks;
pub mod users;

use axum::Router;
use axum::response::Redirect;
use axum::routing::get;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Build the full application router.
pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/", get(|| async { Redirect::to("/profile") }))
        .merge(users::views::routes(state))
        .layer(TraceLayer::new_for_http())
}
