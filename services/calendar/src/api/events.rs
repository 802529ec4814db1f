//! Event API handlers.
//!
//! # Purpose
//! Event listing, the week view (which materializes repeating events for the
//! requested week), and the create/update commands.
//!
//! # Key invariants and assumptions
//! - Every returned event embeds its client.
//! - Create and update answer 201 with a `Location` of
//!   `<request path>/<id>` and the stored event as body.
use crate::api::error::{ApiError, api_internal_message, api_ledger, api_not_found};
use crate::api::types::{EventView, WeekResponse, event_views};
use crate::app::AppState;
use crate::ledger::LedgerError;
use crate::model::{Event, EventDraft, EventPatch};
use axum::Json;
use axum::extract::{Path, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use chrono::NaiveDate;

async fn hydrate(state: &AppState, events: Vec<Event>) -> Result<Vec<EventView>, ApiError> {
    let clients = state
        .calendar
        .list_all_clients()
        .await
        .map_err(|err| api_ledger("failed to load clients", err))?;
    event_views(events, clients).ok_or_else(|| {
        tracing::error!("event references a client missing from the store");
        api_internal_message("event client missing")
    })
}

async fn hydrate_one(state: &AppState, event: Event) -> Result<EventView, ApiError> {
    let client = state
        .calendar
        .store()
        .find_client_by_id(event.client_id)
        .await
        .map_err(|err| api_ledger("failed to load client", LedgerError::Store(err)))?
        .ok_or_else(|| api_internal_message("event client missing"))?;
    Ok(EventView::new(event, client))
}

fn created(base: &str, view: EventView) -> Response {
    let location = format!("{base}/{}", view.id);
    (StatusCode::CREATED, [(header::LOCATION, location)], Json(view)).into_response()
}

#[utoipa::path(
    get,
    path = "/events",
    tag = "events",
    responses(
        (status = 200, description = "Every stored event", body = [EventView]),
        (status = 204, description = "No events")
    )
)]
pub(crate) async fn list_events(State(state): State<AppState>) -> Result<Response, ApiError> {
    let events = state
        .calendar
        .list_all_events()
        .await
        .map_err(|err| api_ledger("failed to list events", err))?;
    if events.is_empty() {
        return Ok(StatusCode::NO_CONTENT.into_response());
    }
    Ok(Json(hydrate(&state, events).await?).into_response())
}

#[utoipa::path(
    get,
    path = "/events/{date}",
    tag = "events",
    params(
        ("date" = String, Path, description = "Any day of the week, YYYY-MM-DD")
    ),
    responses(
        (status = 200, description = "Events of the ISO week with income figures", body = WeekResponse)
    )
)]
pub(crate) async fn get_week(
    Path(date): Path<NaiveDate>,
    State(state): State<AppState>,
) -> Result<Json<WeekResponse>, ApiError> {
    let view = state
        .calendar
        .get_week(date)
        .await
        .map_err(|err| api_ledger("failed to load week", err))?;
    let events = hydrate(&state, view.events.clone()).await?;
    tracing::info!(%date, events = events.len(), "week view served");
    Ok(Json(WeekResponse::new(view, events)))
}

#[utoipa::path(
    post,
    path = "/events/create-event",
    tag = "events",
    request_body = EventDraft,
    responses(
        (status = 201, description = "Event created", body = EventView),
        (status = 400, description = "Missing or invalid field", body = crate::api::types::ErrorResponse),
        (status = 404, description = "Series root not found", body = crate::api::types::ErrorResponse)
    )
)]
pub(crate) async fn create_event(
    State(state): State<AppState>,
    Json(draft): Json<EventDraft>,
) -> Result<Response, ApiError> {
    let event = state
        .calendar
        .create_event(draft)
        .await
        .map_err(|err| api_ledger("failed to create event", err))?;
    let view = hydrate_one(&state, event).await?;
    Ok(created("/events/create-event", view))
}

#[utoipa::path(
    post,
    path = "/events/update",
    tag = "events",
    request_body = EventPatch,
    responses(
        (status = 201, description = "Event updated", body = EventView),
        (status = 404, description = "No event id supplied", body = crate::api::types::ErrorResponse),
        (status = 500, description = "Event id unknown", body = crate::api::types::ErrorResponse)
    )
)]
pub(crate) async fn update_event(
    State(state): State<AppState>,
    Json(patch): Json<EventPatch>,
) -> Result<Response, ApiError> {
    let Some(event) = state
        .calendar
        .update_event(patch)
        .await
        .map_err(|err| api_ledger("failed to update event", err))?
    else {
        return Err(api_not_found("event id missing"));
    };
    let view = hydrate_one(&state, event).await?;
    Ok(created("/events/update", view))
}
