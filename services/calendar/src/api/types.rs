//! HTTP API request/response types.
//!
//! # Purpose
//! Wire shapes for the calendar REST API and its OpenAPI document. JSON field
//! names are camelCase; money travels as decimal strings.
use crate::ledger::{ClientSummary, WeekView};
use crate::model::{Client, ClientId, Event, EventId, EventStatus};
use chrono::{NaiveDate, NaiveTime};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use utoipa::ToSchema;

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    pub code: String,
    pub message: String,
    pub request_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone)]
pub struct HealthStatus {
    pub status: String,
    pub backend: String,
    pub durable: bool,
}

/// Active clients with the balance split.
#[derive(Debug, Serialize, Deserialize, ToSchema, Clone)]
#[serde(rename_all = "camelCase")]
pub struct ClientsResponse {
    pub clients: Vec<Client>,
    #[schema(value_type = String)]
    pub not_paid: Decimal,
    #[schema(value_type = String)]
    pub paid_forward: Decimal,
}

impl From<ClientSummary> for ClientsResponse {
    fn from(summary: ClientSummary) -> Self {
        Self {
            clients: summary.clients,
            not_paid: summary.not_paid,
            paid_forward: summary.paid_forward,
        }
    }
}

/// An event with its client embedded, as the calendar UI renders it.
#[derive(Debug, Serialize, Deserialize, ToSchema, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EventView {
    pub id: EventId,
    pub client: Client,
    #[schema(value_type = String)]
    pub price: Decimal,
    #[schema(value_type = String)]
    pub date: NaiveDate,
    #[schema(value_type = String)]
    pub start_time: NaiveTime,
    #[schema(value_type = String)]
    pub finish_time: NaiveTime,
    pub repeatable: bool,
    pub event_status: EventStatus,
    /// Own id for a series root, the root's id for an occurrence.
    pub original_id: EventId,
}

impl EventView {
    pub fn new(event: Event, client: Client) -> Self {
        Self {
            id: event.id,
            original_id: event.original_id(),
            client,
            price: event.price,
            date: event.date,
            start_time: event.start_time,
            finish_time: event.finish_time,
            repeatable: event.repeatable,
            event_status: event.status,
        }
    }
}

/// Embeds clients into events. `None` when an event names a client that is
/// not in `clients`.
pub fn event_views(events: Vec<Event>, clients: Vec<Client>) -> Option<Vec<EventView>> {
    let by_id: HashMap<ClientId, Client> = clients
        .into_iter()
        .map(|client| (client.id, client))
        .collect();
    events
        .into_iter()
        .map(|event| {
            let client = by_id.get(&event.client_id)?.clone();
            Some(EventView::new(event, client))
        })
        .collect()
}

/// One week of events and the income figures around it.
#[derive(Debug, Serialize, Deserialize, ToSchema, Clone)]
#[serde(rename_all = "camelCase")]
pub struct WeekResponse {
    pub events: Vec<EventView>,
    #[schema(value_type = String)]
    pub current_week_income: Decimal,
    #[schema(value_type = String)]
    pub expected_week_income: Decimal,
    #[schema(value_type = String)]
    pub current_month_income: Decimal,
    #[schema(value_type = String)]
    pub expected_month_income: Decimal,
}

impl WeekResponse {
    pub fn new(view: WeekView, events: Vec<EventView>) -> Self {
        Self {
            events,
            current_week_income: view.current_week_income,
            expected_week_income: view.expected_week_income,
            current_month_income: view.current_month_income,
            expected_month_income: view.expected_month_income,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct DepositParams {
    pub client_id: ClientId,
    pub new_deposit_amount: Decimal,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct ArchiveParams {
    pub client_id: ClientId,
}
