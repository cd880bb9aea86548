pub mod caam;
pub mod dcg;
pub mod gitsync;
pub mod healthz;

use at_core::correlation::CorrelationContext;
use axum::http::HeaderMap;

/// Build a request-scoped correlation context, propagating an inbound
/// `X-Correlation-Id` header if present (SPEC_FULL.md §4.A).
pub(crate) fn correlation_from_headers(headers: &HeaderMap) -> CorrelationContext {
    match headers.get("x-correlation-id").and_then(|v| v.to_str().ok()) {
        Some(id) => CorrelationContext::new(id.to_string(), None),
        None => CorrelationContext::synthesize(),
    }
}
