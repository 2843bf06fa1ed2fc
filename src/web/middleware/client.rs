//! Client identification for upload quotas.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    async_trait,
    extract::{ConnectInfo, FromRequestParts},
    http::request::Parts,
};

use crate::web::handlers::AppState;

/// Identifier an upload quota is charged to.
///
/// The socket peer address by default. With `trust_proxy_headers` enabled,
/// the first `X-Forwarded-For` hop or `X-Real-IP` take precedence. Falls
/// back to `unknown`, so clients without any of these share one quota.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientId(pub String);

#[async_trait]
impl FromRequestParts<Arc<AppState>> for ClientId {
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        Ok(ClientId(client_id(parts, state.trust_proxy_headers)))
    }
}

fn client_id(parts: &Parts, trust_proxy_headers: bool) -> String {
    if trust_proxy_headers {
        if let Some(ip) = forwarded_ip(parts) {
            return ip;
        }
    }

    if let Some(ConnectInfo(addr)) = parts.extensions.get::<ConnectInfo<SocketAddr>>() {
        return addr.ip().to_string();
    }

    "unknown".to_string()
}

fn forwarded_ip(parts: &Parts) -> Option<String> {
    let forwarded = parts
        .headers
        .get("X-Forwarded-For")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty());

    let real_ip = || {
        parts
            .headers
            .get("X-Real-IP")
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    };

    forwarded.or_else(real_ip).map(str::to_string)
}
