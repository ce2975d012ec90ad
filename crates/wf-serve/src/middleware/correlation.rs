use axum::body::Body;
use axum::http::{HeaderMap, HeaderName, HeaderValue, Request};
use axum::middleware::Next;
use axum::response::Response;
use tracing::Instrument;
use ulid::Ulid;

/// Id carried by every event a request writes, so job events and API responses can be
/// matched up in logs.
#[derive(Clone, Debug)]
pub struct CorrelationId(pub String);

const HEADER_NAME: &str = "x-correlation-id";
const GENERATED_PREFIX: &str = "corr_";

/// Reuses a non-blank `x-correlation-id` from the caller or mints one.
pub fn resolve_correlation_id(headers: &HeaderMap) -> String {
    headers
        .get(HEADER_NAME)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| format!("{GENERATED_PREFIX}{}", Ulid::new()))
}

pub async fn correlation_middleware(mut request: Request<Body>, next: Next) -> Response {
    let id = resolve_correlation_id(request.headers());
    let span = tracing::info_span!(
        "api_request",
        correlation_id = %id,
        method = %request.method(),
        path = %request.uri().path(),
    );

    request.extensions_mut().insert(CorrelationId(id.clone()));
    let mut response = next.run(request).instrument(span).await;
    if let Ok(value) = HeaderValue::from_str(&id) {
        response
            .headers_mut()
            .insert(HeaderName::from_static(HEADER_NAME), value);
    }
    response
}
