//! MediConnect HTTP API

/// Bearer-token extractor
pub mod auth;

/// Environment configuration
pub mod config;

/// Error responses
pub mod error;

/// Router and handlers
pub mod routes;

/// Shared handler state
pub mod state;

/// Presigned prescription uploads
pub mod uploads;

pub use config::Config;
pub use routes::router;
pub use state::AppState;
