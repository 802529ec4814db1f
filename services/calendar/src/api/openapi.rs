//! OpenAPI schema aggregation for the calendar API.
use crate::api::{
    clients, events, system,
    types::{ClientsResponse, ErrorResponse, EventView, HealthStatus, WeekResponse},
};
use crate::model::{Client, ClientRef, ClientStatus, EventDraft, EventPatch, EventStatus};
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "calendar",
        version = "v1",
        description = "Tutoring calendar HTTP API"
    ),
    paths(
        system::system_health,
        clients::list_clients,
        clients::change_deposit,
        clients::archive_client,
        events::list_events,
        events::get_week,
        events::create_event,
        events::update_event
    ),
    components(schemas(
        HealthStatus,
        ErrorResponse,
        Client,
        ClientRef,
        ClientStatus,
        ClientsResponse,
        EventStatus,
        EventDraft,
        EventPatch,
        EventView,
        WeekResponse
    )),
    tags(
        (name = "system", description = "Health endpoints"),
        (name = "clients", description = "Clients and balances"),
        (name = "events", description = "Appointments, weekly views and income")
    )
)]
pub struct ApiDoc;
