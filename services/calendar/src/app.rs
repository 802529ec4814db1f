//! Calendar HTTP application wiring.
//!
//! # Purpose
//! Builds the Axum router, configures middleware, and defines the shared
//! application state injected into handlers.
use crate::api;
use crate::api::openapi::ApiDoc;
use crate::ledger::Calendar;
use crate::observability;
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_opentelemetry::OpenTelemetrySpanExt;
use utoipa::OpenApi;

#[derive(Clone)]
pub struct AppState {
    pub calendar: Calendar,
}

pub fn build_router(state: AppState) -> Router {
    let trace_layer =
        TraceLayer::new_for_http().make_span_with(|request: &axum::http::Request<_>| {
            let parent = observability::trace_context_from_headers(request.headers());
            let span = tracing::info_span!(
                "http.request",
                method = %request.method(),
                uri = %request.uri(),
                version = ?request.version()
            );
            span.set_parent(parent);
            span
        });

    Router::new()
        .route(
            "/system/health",
            axum::routing::get(api::system::system_health),
        )
        .route("/clients", axum::routing::get(api::clients::list_clients))
        .route(
            "/clients/change-deposit",
            axum::routing::put(api::clients::change_deposit),
        )
        .route(
            "/clients/archive",
            axum::routing::put(api::clients::archive_client),
        )
        .route("/events", axum::routing::get(api::events::list_events))
        .route(
            "/events/create-event",
            axum::routing::post(api::events::create_event),
        )
        .route(
            "/events/update",
            axum::routing::post(api::events::update_event),
        )
        .route("/events/:date", axum::routing::get(api::events::get_week))
        .merge(utoipa_swagger_ui::SwaggerUi::new("/docs").url("/openapi.json", ApiDoc::openapi()))
        .layer(trace_layer)
        .layer(CorsLayer::permissive())
        .with_state(state)
}
