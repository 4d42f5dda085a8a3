use axum::{
    body::Body,
    http::{HeaderName, HeaderValue, Request, StatusCode},
    middleware::Next,
    response::Response,
};
use tower_http::{
    classify::ServerErrorsFailureClass,
    cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer},
    trace::{DefaultOnFailure, OnFailure},
};
use tracing::warn;

/// Failure handling for the trace layer. 502 responses are logged at `WARN`
/// instead of `ERROR`; the upstream failure behind them is already logged.
#[derive(Clone, Copy)]
pub(crate) struct LevelAdjustingOnFailure;

impl OnFailure<ServerErrorsFailureClass> for LevelAdjustingOnFailure {
    fn on_failure(
        &mut self,
        failure_classification: ServerErrorsFailureClass,
        latency: core::time::Duration,
        span: &tracing::Span,
    ) {
        use ServerErrorsFailureClass as S;

        match failure_classification {
            S::StatusCode(StatusCode::BAD_GATEWAY) => {
                tracing::warn!(classification = %S::StatusCode(StatusCode::BAD_GATEWAY), latency = %format!("{} ms", latency.as_millis()), "response failed (downgraded)");
            }
            value => {
                DefaultOnFailure::default().on_failure(value, latency, span);
            }
        }
    }
}

/// Credentialed CORS for the configured browser origins.
///
/// Methods and headers mirror the preflight request. Origins that are not valid
/// header values are skipped.
pub(crate) fn cors_layer(origins: &[String]) -> CorsLayer {
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| {
            HeaderValue::from_str(origin)
                .inspect_err(|_| warn!(origin, "Ignoring invalid CORS origin"))
                .ok()
        })
        .collect();
    CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed))
        .allow_credentials(true)
        .allow_methods(AllowMethods::mirror_request())
        .allow_headers(AllowHeaders::mirror_request())
}

/// Middleware to set security headers on all responses.
///
/// Only JSON is served, so nothing may be framed, sniffed or referred.
pub(crate) async fn secure_headers_middleware(req: Request<Body>, next: Next) -> Response {
    let mut response = next.run(req).await;
    let headers = response.headers_mut();
    headers.insert(
        HeaderName::from_static("x-content-type-options"),
        HeaderValue::from_static("nosniff"),
    );
    headers.insert(
        HeaderName::from_static("x-frame-options"),
        HeaderValue::from_static("DENY"),
    );
    headers.insert(
        HeaderName::from_static("referrer-policy"),
        HeaderValue::from_static("no-referrer"),
    );
    response
}
