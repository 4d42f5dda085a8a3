use axum::{
    Router,
    body::Body,
    extract::DefaultBodyLimit,
    http::{Request, StatusCode, header::AUTHORIZATION},
    middleware as ax_middleware,
    response::IntoResponse as _,
    routing::{self, IntoMakeService},
};
use tower::ServiceBuilder;
use tower_http::{
    ServiceBuilderExt as _, request_id::MakeRequestUuid, timeout::TimeoutLayer, trace::TraceLayer,
};

use crate::{
    app::AppState,
    http::{
        ApiError, access, chat, login, search,
        server::middleware::{LevelAdjustingOnFailure, cors_layer, secure_headers_middleware},
        upload,
    },
};

/// Creates the application router by merging the route groups.
///
/// Authentication is enforced per handler through the [`crate::app::User`] extractor,
/// so `/signup` and `/login` are the only routes usable without a token.
pub(crate) fn create_app_router() -> Router<AppState> {
    Router::new()
        .merge(login::routes())
        .merge(access::routes())
        .merge(upload::routes())
        .merge(search::routes())
        .merge(chat::routes())
}

/// Router with state and the middleware stack applied, as a service.
pub(crate) fn routed_app(app_state: AppState) -> Router<()> {
    let server = &app_state.config.server;
    let ingest = &app_state.config.ingest;

    #[expect(clippy::absolute_paths, reason = "I dont want conditional imports")]
    let middleware_stack = ServiceBuilder::new()
        .sensitive_headers([AUTHORIZATION])
        .set_x_request_id(MakeRequestUuid)
        .propagate_x_request_id()
        .layer(TraceLayer::new_for_http().on_failure(LevelAdjustingOnFailure))
        .layer(cors_layer(&server.cors_origins))
        .layer(cfg_if_expr!(
            #[cfg(any(feature = "compression-br", feature = "compression-gzip"))]
            tower_http::compression::CompressionLayer::new(),
            #[cfg(not)]
            tower::layer::util::Identity::new(),
        ))
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            server.request_timeout(),
        ))
        .layer(ax_middleware::from_fn(secure_headers_middleware));

    let body_limit = ingest.max_upload_bytes;

    create_app_router()
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(app_state)
        .fallback(routing::any(|req: Request<Body>| async move {
            tracing::warn!(method = %req.method(), uri = %req.uri(), "Unhandled request");
            ApiError::NotFound("Not Found".to_string()).into_response()
        }))
        .layer(middleware_stack)
}

pub(crate) fn create_app(app_state: AppState) -> IntoMakeService<Router<()>> {
    routed_app(app_state).into_make_service()
}
