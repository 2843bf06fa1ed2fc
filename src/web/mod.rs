//! HTTP surface for Storehouse.
//!
//! A thin axum layer over [`crate::storage`]: handlers parse the request,
//! call one storage operation, and map the result onto the JSON envelope.

pub mod dto;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod router;
pub mod server;

pub use error::{ApiError, ErrorCode};
pub use handlers::AppState;
pub use router::create_router;
pub use server::WebServer;
