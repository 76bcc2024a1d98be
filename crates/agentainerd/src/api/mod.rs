//! API surface — HTTP endpoints over the lifecycle manager and request store.

pub mod auth;
pub mod error;
pub mod handlers;
pub mod response;
pub mod routes;

pub use error::ApiError;
pub use response::ApiResponse;
pub use routes::router;
