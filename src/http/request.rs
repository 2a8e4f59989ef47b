//! Request-side helpers.
//!
//! # Responsibilities
//! - Accept or mint the per-request trace id (`x-trace-id`)
//! - Run each request inside a span carrying that id
//! - Snapshot request metadata for logs and error reports
//!
//! # Design Decisions
//! - The id is assigned as early as possible so every log line of the
//!   request carries it
//! - Credentials in headers are redacted before they reach any report

use std::collections::BTreeMap;
use std::convert::Infallible;
use std::net::SocketAddr;

use axum::extract::{ConnectInfo, FromRequestParts, MatchedPath, OriginalUri, RawPathParams, Request};
use axum::http::header::{AUTHORIZATION, CONTENT_LENGTH, COOKIE, PROXY_AUTHORIZATION, USER_AGENT};
use axum::http::request::Parts;
use axum::http::{HeaderName, HeaderValue};
use axum::middleware::Next;
use axum::response::Response;
use serde::Serialize;
use tower_http::request_id::{MakeRequestId, RequestId};
use tracing::Instrument;

use crate::trace::TraceId;

/// Header carrying the trace id in both directions.
pub const X_TRACE_ID: HeaderName = HeaderName::from_static("x-trace-id");

const REDACTED: &str = "[redacted]";

/// Mints trace ids for `tower_http`'s request-id layers.
#[derive(Debug, Clone, Copy, Default)]
pub struct MakeTraceId;

impl MakeRequestId for MakeTraceId {
    fn make_request_id<B>(&mut self, _request: &axum::http::Request<B>) -> Option<RequestId> {
        HeaderValue::from_str(TraceId::new().as_str())
            .ok()
            .map(RequestId::new)
    }
}

/// Store the request's `TraceId` in its extensions and run the rest of the
/// stack inside a `request` span.
///
/// Uses the incoming `x-trace-id` header when present, otherwise a fresh id.
pub async fn trace_id_middleware(mut req: Request, next: Next) -> Response {
    let trace_id = req
        .headers()
        .get(&X_TRACE_ID)
        .and_then(|value| value.to_str().ok())
        .filter(|value| !value.is_empty())
        .map(TraceId::from_string)
        .unwrap_or_default();

    let span = tracing::info_span!(
        "request",
        trace_id = %trace_id,
        method = %req.method(),
        uri = %req.uri(),
    );
    req.extensions_mut().insert(trace_id);

    next.run(req).instrument(span).await
}

/// Request metadata attached to error logs and reports.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RequestInfo {
    pub url: String,
    pub method: String,
    /// Matched route pattern, e.g. `/users/{id}`.
    pub route: String,
    pub params: BTreeMap<String, String>,
    pub query: BTreeMap<String, String>,
    pub headers: BTreeMap<String, String>,
    pub user_agent: String,
    pub ip: String,
    /// Declared body size; 0 when unknown.
    pub body_size: u64,
}

impl RequestInfo {
    /// Everything except path parameters, which need the async extractor.
    pub fn from_parts(parts: &Parts) -> Self {
        let url = parts
            .extensions
            .get::<OriginalUri>()
            .map(|uri| uri.0.to_string())
            .unwrap_or_else(|| parts.uri.to_string());

        let route = parts
            .extensions
            .get::<MatchedPath>()
            .map(|path| path.as_str().to_string())
            .unwrap_or_default();

        let query = parts
            .uri
            .query()
            .map(|q| url::form_urlencoded::parse(q.as_bytes()).into_owned().collect())
            .unwrap_or_default();

        let headers = parts
            .headers
            .iter()
            .map(|(name, value)| {
                let value = if is_sensitive(name) {
                    REDACTED.to_string()
                } else {
                    String::from_utf8_lossy(value.as_bytes()).into_owned()
                };
                (name.as_str().to_string(), value)
            })
            .collect();

        let user_agent = parts
            .headers
            .get(USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();

        let ip = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|info| info.0.ip().to_string())
            .unwrap_or_default();

        let body_size = parts
            .headers
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok())
            .unwrap_or(0);

        Self {
            url,
            method: parts.method.to_string(),
            route,
            params: BTreeMap::new(),
            query,
            headers,
            user_agent,
            ip,
            body_size,
        }
    }

    /// Report context with the fields Sentry shows under "request".
    pub fn to_context(&self) -> sentry::protocol::Context {
        let mut map = sentry::protocol::Map::new();
        map.insert("url".into(), self.url.clone().into());
        map.insert("method".into(), self.method.clone().into());
        map.insert("headers".into(), serde_json::json!(self.headers));
        map.insert("user_agent".into(), self.user_agent.clone().into());
        map.insert("ip".into(), self.ip.clone().into());
        map.insert("body_size".into(), self.body_size.into());
        map.insert("query".into(), serde_json::json!(self.query));
        sentry::protocol::Context::Other(map)
    }
}

impl<S> FromRequestParts<S> for RequestInfo
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let mut info = Self::from_parts(parts);
        if let Ok(params) = RawPathParams::from_request_parts(parts, state).await {
            info.params = params
                .iter()
                .map(|(key, value)| (key.to_string(), value.to_string()))
                .collect();
        }
        Ok(info)
    }
}

fn is_sensitive(name: &HeaderName) -> bool {
    name == AUTHORIZATION || name == COOKIE || name == PROXY_AUTHORIZATION
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;

    fn parts(req: axum::http::Request<Body>) -> Parts {
        req.into_parts().0
    }

    #[test]
    fn test_request_info_basics() {
        let req = axum::http::Request::builder()
            .method("POST")
            .uri("/users?page=2&q=a%20b")
            .header(USER_AGENT, "curl/8")
            .header(AUTHORIZATION, "Bearer secret")
            .header(CONTENT_LENGTH, "12")
            .body(Body::empty())
            .unwrap();

        let info = RequestInfo::from_parts(&parts(req));
        assert_eq!(info.url, "/users?page=2&q=a%20b");
        assert_eq!(info.method, "POST");
        assert_eq!(info.query.get("page").map(String::as_str), Some("2"));
        assert_eq!(info.query.get("q").map(String::as_str), Some("a b"));
        assert_eq!(info.user_agent, "curl/8");
        assert_eq!(info.headers.get("authorization").map(String::as_str), Some(REDACTED));
        assert_eq!(info.body_size, 12);
        assert!(info.route.is_empty());
    }

    #[test]
    fn test_make_trace_id() {
        let req = axum::http::Request::new(());
        let id = MakeTraceId.make_request_id(&req).unwrap();
        let text = id.header_value().to_str().unwrap();
        assert!(uuid::Uuid::parse_str(text).is_ok());
    }
}
