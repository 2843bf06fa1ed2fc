//! Middleware and extractors for the HTTP API.

pub mod client;
pub mod cors;
pub mod security;

pub use client::ClientId;
pub use cors::create_cors_layer;
pub use security::security_headers;
