//! Users — accounts, profiles, and the account views.

pub mod forms;
pub mod model;
pub mod views;

pub use model::{User, UserProfile};
