//! Storydesk: projects, storylines and stories with follow-up tracking
//! against a shared stakeholder registry.

pub mod dates;
pub mod db;
pub mod error;
mod migrations;
pub mod resolve;
pub mod services;
pub mod state;
pub mod types;
pub mod util;

pub use error::{ErrorPayload, ServiceError};
pub use state::AppState;
