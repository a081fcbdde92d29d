//! API key authentication for the stream management routes.
//!
//! When `security.api_key` is unset every request passes. Otherwise the key
//! must arrive as `Authorization: Bearer <key>` or `X-API-Key: <key>`.

use axum::extract::State;
use axum::http::{HeaderMap, Request, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::context::AppContext;
use crate::error::ApiResponse;

/// Pull the presented key out of the request headers.
pub fn presented_key(headers: &HeaderMap) -> Option<&str> {
    if let Some(token) = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
    {
        return Some(token.trim());
    }
    headers
        .get("x-api-key")
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
}

/// Constant-time comparison so the key cannot be probed byte by byte.
fn keys_match(expected: &str, presented: &str) -> bool {
    let (a, b) = (expected.as_bytes(), presented.as_bytes());
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

pub async fn auth_middleware(
    State(ctx): State<AppContext>,
    request: Request<axum::body::Body>,
    next: Next,
) -> Response {
    let Some(expected) = ctx.config.security.api_key.as_deref() else {
        return next.run(request).await;
    };

    let rejection = match presented_key(request.headers()) {
        Some(key) if keys_match(expected, key) => None,
        Some(_) => Some("Invalid API key"),
        None => Some("API key required"),
    };

    match rejection {
        None => next.run(request).await,
        Some(message) => {
            tracing::warn!(path = %request.uri().path(), "Rejected request: {message}");
            unauthorized(message)
        }
    }
}

fn unauthorized(message: &str) -> Response {
    ApiResponse::failure(StatusCode::UNAUTHORIZED, "AUTHENTICATION_ERROR", message).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn bearer_header() {
        let mut headers = HeaderMap::new();
        headers.insert("authorization", HeaderValue::from_static("Bearer abc"));
        assert_eq!(presented_key(&headers), Some("abc"));
    }

    #[test]
    fn x_api_key_header() {
        let mut headers = HeaderMap::new();
        headers.insert("x-api-key", HeaderValue::from_static("abc"));
        assert_eq!(presented_key(&headers), Some("abc"));
    }

    #[test]
    fn other_schemes_ignored() {
        let mut headers = HeaderMap::new();
        headers.insert("authorization", HeaderValue::from_static("Basic abc"));
        assert_eq!(presented_key(&headers), None);
    }

    #[test]
    fn comparison() {
        assert!(keys_match("secret", "secret"));
        assert!(!keys_match("secret", "secreT"));
        assert!(!keys_match("secret", "secret2"));
    }
}
