pub mod auth;
pub mod bins;
pub mod middleware;
pub mod rest;
pub mod state;
pub mod users;

// Re-export what the binary needs to build the server.
pub use middleware::require_auth;
pub use rest::{router, ApiDoc};
pub use state::AppState;
