pub mod auth;
pub mod chat;
pub mod errors;
pub mod middleware;
pub mod packages;
pub mod protocol;
pub mod reader;
pub mod reports;
pub mod rest;
pub mod state;
pub mod ws_handler;

// Re-exported for the binary that builds the router.
pub use middleware::require_auth;
pub use ws_handler::packages_ws_handler;
