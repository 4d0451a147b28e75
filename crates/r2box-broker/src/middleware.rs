//! Request-id tagging, redacted request logging, and the loopback-only
//! CORS allow-list. Layer order
//! in the router is request-id → CORS → logging → route handler → error
//! mapper (the error mapper lives in [`crate::error`]).

use std::time::Instant;

use axum::extract::Request;
use axum::http::{HeaderMap, HeaderValue};
use axum::middleware::Next;
use axum::response::Response;
use r2box_core::domain::newtypes::RequestId;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing::{error, info, warn};

/// Header names that are never logged verbatim.
const REDACTED_HEADERS: &[&str] = &["authorization", "cookie", "set-cookie", "x-api-key"];

/// Query parameter name fragments that trigger redaction of the whole
/// `name=value` pair, matched case-insensitively.
const REDACTED_QUERY_FRAGMENTS: &[&str] = &["token", "key", "secret", "password", "credential"];

const REDACTED: &str = "[redacted]";

/// Inserts a fresh [`RequestId`] into the request's extensions so every
/// handler and the error mapper can read the same id back out.
pub async fn request_id(mut req: Request, next: Next) -> Response {
    let request_id = RequestId::new();
    req.extensions_mut().insert(request_id);
    let mut response = next.run(req).await;
    response.extensions_mut().insert(request_id);
    response
}

/// One `info!`/`warn!`/`error!` pair per request: a start line and a
/// finish line carrying status and elapsed time. Header/query redaction
/// happens before anything is formatted into the log line, never after.
pub async fn logging(req: Request, next: Next) -> Response {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let query = redact_query(req.uri().query().unwrap_or(""));
    let request_id = req.extensions().get::<RequestId>().copied();
    let redacted_headers = redact_headers(req.headers());

    let started = Instant::now();
    info!(
        request_id = ?request_id,
        method = %method,
        path = %path,
        query = %query,
        headers = ?redacted_headers,
        "request started"
    );

    let response = next.run(req).await;

    let status = response.status().as_u16();
    let elapsed_ms = started.elapsed().as_millis();

    if status >= 500 {
        error!(request_id = ?request_id, method = %method, path = %path, status, elapsed_ms, "request finished");
    } else if status >= 400 {
        warn!(request_id = ?request_id, method = %method, path = %path, status, elapsed_ms, "request finished");
    } else {
        info!(request_id = ?request_id, method = %method, path = %path, status, elapsed_ms, "request finished");
    }

    response
}

fn redact_headers(headers: &HeaderMap) -> Vec<(String, String)> {
    headers
        .iter()
        .map(|(name, value)| {
            let name_lower = name.as_str().to_ascii_lowercase();
            let shown = if REDACTED_HEADERS.contains(&name_lower.as_str()) {
                REDACTED.to_string()
            } else {
                value_as_str(value)
            };
            (name_lower, shown)
        })
        .collect()
}

fn value_as_str(value: &HeaderValue) -> String {
    value.to_str().unwrap_or("<non-utf8>").to_string()
}

/// Redacts any `name=value` pair in a query string whose name contains
/// one of [`REDACTED_QUERY_FRAGMENTS`], case-insensitively.
fn redact_query(query: &str) -> String {
    if query.is_empty() {
        return String::new();
    }

    query
        .split('&')
        .map(|pair| {
            let mut parts = pair.splitn(2, '=');
            let name = parts.next().unwrap_or("");
            let name_lower = name.to_ascii_lowercase();
            if REDACTED_QUERY_FRAGMENTS
                .iter()
                .any(|fragment| name_lower.contains(fragment))
            {
                format!("{name}={REDACTED}")
            } else {
                pair.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join("&")
}

/// Builds the CORS layer from a comma-separated origin list, dropping any
/// origin that is not a `http://localhost:*` / `http://127.0.0.1:*`
/// loopback pattern regardless of what the operator configured.
pub fn cors_layer(configured_origins: &[String]) -> CorsLayer {
    let mut origins: Vec<HeaderValue> = Vec::new();
    for origin in configured_origins {
        if is_loopback_origin(origin) {
            if let Ok(value) = HeaderValue::from_str(origin) {
                origins.push(value);
            }
        } else {
            warn!(origin = %origin, "dropping non-loopback CORS origin from configuration");
        }
    }

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods(tower_http::cors::Any)
        .allow_headers(tower_http::cors::Any)
        .max_age(std::time::Duration::from_secs(24 * 60 * 60))
}

fn is_loopback_origin(origin: &str) -> bool {
    origin.starts_with("http://localhost:") || origin.starts_with("http://127.0.0.1:")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redacts_authorization_and_cookie_headers() {
        let mut headers = HeaderMap::new();
        headers.insert("authorization", HeaderValue::from_static("Bearer abc123"));
        headers.insert("cookie", HeaderValue::from_static("session=xyz"));
        headers.insert("accept", HeaderValue::from_static("application/json"));

        let redacted = redact_headers(&headers);
        let map: std::collections::HashMap<_, _> = redacted.into_iter().collect();
        assert_eq!(map["authorization"], REDACTED);
        assert_eq!(map["cookie"], REDACTED);
        assert_eq!(map["accept"], "application/json");
    }

    #[test]
    fn redacts_query_params_matching_secret_fragments() {
        let query = "prefix=a&accessKeySecret=topsecret&apiToken=xyz&maxKeys=10";
        let redacted = redact_query(query);
        assert!(redacted.contains("prefix=a"));
        assert!(redacted.contains("maxKeys=10"));
        assert!(redacted.contains(&format!("accessKeySecret={REDACTED}")));
        assert!(redacted.contains(&format!("apiToken={REDACTED}")));
    }

    #[test]
    fn empty_query_redacts_to_empty() {
        assert_eq!(redact_query(""), "");
    }

    #[test]
    fn loopback_origin_detection() {
        assert!(is_loopback_origin("http://localhost:3000"));
        assert!(is_loopback_origin("http://127.0.0.1:8080"));
        assert!(!is_loopback_origin("https://evil.example.com"));
        assert!(!is_loopback_origin("http://10.0.0.5:3000"));
    }
}
