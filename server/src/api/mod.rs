//! HTTP surface: router, error mapping, route handlers

pub mod middleware;
pub mod routes;
pub mod server;
pub mod types;

pub use server::{ApiServer, AppState};
pub use types::ApiError;
