//! Cross-origin request handling for the gateway.
//!
//! Browser clients call the gateway directly, so every route shares one
//! [`CorsPolicy`]. Preflight `OPTIONS` requests are answered here and never
//! reach a handler.

use crate::config::CorsSettings;
use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, HeaderValue, Method, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use tracing::debug;

const ALLOWED_METHODS: &str = "GET, POST, OPTIONS";

/// Origin policy applied to every route.
#[derive(Debug, Clone)]
pub struct CorsPolicy {
    allowed_origins: Arc<[String]>,
    allow_credentials: bool,
    max_age_seconds: u32,
}

impl CorsPolicy {
    pub fn new(settings: &CorsSettings) -> Self {
        Self {
            allowed_origins: settings.allowed_origins.clone().into(),
            allow_credentials: settings.allow_credentials,
            max_age_seconds: settings.max_age_seconds,
        }
    }

    /// Check if the given origin is allowed.
    pub fn matches_origin(&self, origin: &str) -> bool {
        self.allowed_origins.iter().any(|allowed| {
            if allowed == "*" || allowed == origin {
                return true;
            }
            // "*.example.com" matches any subdomain
            match allowed.strip_prefix('*') {
                Some(suffix) if suffix.starts_with('.') => origin.ends_with(suffix),
                _ => false,
            }
        })
    }

    /// Value for `Access-Control-Allow-Origin`.
    ///
    /// Browsers reject a literal `*` alongside credentials, so the request
    /// origin is echoed back whenever credentials are enabled.
    fn allow_origin_value(&self, origin: &str) -> HeaderValue {
        let wildcard = self.allowed_origins.iter().any(|o| o == "*");
        if wildcard && !self.allow_credentials {
            return HeaderValue::from_static("*");
        }
        HeaderValue::from_str(origin).unwrap_or_else(|_| HeaderValue::from_static("null"))
    }

    fn apply(&self, headers: &mut HeaderMap, origin: &str) {
        headers.insert(
            header::ACCESS_CONTROL_ALLOW_ORIGIN,
            self.allow_origin_value(origin),
        );
        if self.allow_credentials {
            headers.insert(
                header::ACCESS_CONTROL_ALLOW_CREDENTIALS,
                HeaderValue::from_static("true"),
            );
        }
        headers.insert(header::VARY, HeaderValue::from_static("Origin"));
    }
}

/// CORS middleware for the gateway router.
pub async fn cors_middleware(
    State(policy): State<CorsPolicy>,
    request: Request,
    next: Next,
) -> Response {
    let origin = match request
        .headers()
        .get(header::ORIGIN)
        .and_then(|v| v.to_str().ok())
    {
        Some(o) => o.to_string(),
        // Not a CORS request
        None => return next.run(request).await,
    };

    if request.method() == Method::OPTIONS {
        return handle_preflight(&policy, &origin, request.headers());
    }

    let mut response = next.run(request).await;
    if policy.matches_origin(&origin) {
        policy.apply(response.headers_mut(), &origin);
    }
    response
}

fn handle_preflight(policy: &CorsPolicy, origin: &str, headers: &HeaderMap) -> Response {
    if headers.get(header::ACCESS_CONTROL_REQUEST_METHOD).is_none() {
        return (
            StatusCode::BAD_REQUEST,
            "Missing Access-Control-Request-Method",
        )
            .into_response();
    }

    if !policy.matches_origin(origin) {
        debug!(origin = %origin, "Origin not allowed by CORS policy");
        return (StatusCode::FORBIDDEN, "Origin not allowed").into_response();
    }

    let mut response = StatusCode::OK.into_response();
    let out = response.headers_mut();
    policy.apply(out, origin);
    out.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static(ALLOWED_METHODS),
    );
    out.insert(
        header::ACCESS_CONTROL_MAX_AGE,
        HeaderValue::from(policy.max_age_seconds),
    );

    // All request headers are accepted.
    let allow_headers = headers
        .get(header::ACCESS_CONTROL_REQUEST_HEADERS)
        .cloned()
        .unwrap_or_else(|| HeaderValue::from_static("*"));
    out.insert(header::ACCESS_CONTROL_ALLOW_HEADERS, allow_headers);

    response
}
