//! HTTP server for the task-manager assistant

pub mod http;
pub mod state;

pub use http::create_router;
pub use state::AppState;
