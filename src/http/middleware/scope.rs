//! Per-request report enrichment.

use axum::extract::{MatchedPath, Request};
use axum::middleware::Next;
use axum::response::Response;
use sentry::protocol::User;
use sentry::Scope;

use crate::trace::{self, TraceId};

/// Authenticated user of a request. Insert it into request extensions in a
/// layer that runs before [`enhance_report_scope`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportUser {
    pub id: String,
}

/// Tags every report made for this request carries.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReportScope {
    pub endpoint: String,
    pub method: String,
    pub user_id: Option<String>,
}

impl ReportScope {
    pub fn apply(&self, scope: &mut Scope) {
        scope.set_tag("endpoint", &self.endpoint);
        scope.set_tag("method", &self.method);
        if let Some(id) = &self.user_id {
            scope.set_user(Some(User {
                id: Some(id.clone()),
                ..Default::default()
            }));
        }
    }
}

/// Build the scope for an error report of one request.
pub(crate) fn request_scope(report_scope: Option<&ReportScope>, trace_id: Option<&TraceId>) -> Scope {
    let mut scope = Scope::default();
    if let Some(report_scope) = report_scope {
        report_scope.apply(&mut scope);
    }
    if let Some(trace_id) = trace_id {
        scope.set_tag(trace::trace_key().as_str(), trace_id);
    }
    scope
}

/// Record endpoint, method and user of the request for later reports.
pub async fn enhance_report_scope(mut req: Request, next: Next) -> Response {
    let endpoint = req
        .extensions()
        .get::<MatchedPath>()
        .map(|path| path.as_str().to_string())
        .unwrap_or_else(|| req.uri().path().to_string());

    let user_id = req
        .extensions()
        .get::<ReportUser>()
        .map(|user| user.id.clone())
        .filter(|id| !id.is_empty());

    let scope = ReportScope {
        endpoint,
        method: req.method().to_string(),
        user_id,
    };
    req.extensions_mut().insert(scope);

    next.run(req).await
}
