//! Client API handlers.
//!
//! # Purpose
//! Lists active clients with the owed/prepaid split and applies the two
//! client commands. Missing clients answer 404; successful commands answer
//! 204 with no body.
use crate::api::error::{ApiError, api_ledger, api_not_found};
use crate::api::types::{ArchiveParams, ClientsResponse, DepositParams};
use crate::app::AppState;
use axum::Json;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

#[utoipa::path(
    get,
    path = "/clients",
    tag = "clients",
    responses(
        (status = 200, description = "Active clients and balance totals", body = ClientsResponse),
        (status = 204, description = "No active clients")
    )
)]
pub(crate) async fn list_clients(State(state): State<AppState>) -> Result<Response, ApiError> {
    let summary = state
        .calendar
        .client_summary()
        .await
        .map_err(|err| api_ledger("failed to list clients", err))?;
    if summary.clients.is_empty() {
        return Ok(StatusCode::NO_CONTENT.into_response());
    }
    tracing::debug!(clients = summary.clients.len(), "listing active clients");
    Ok(Json(ClientsResponse::from(summary)).into_response())
}

#[utoipa::path(
    put,
    path = "/clients/change-deposit",
    tag = "clients",
    params(
        ("clientId" = i64, Query, description = "Client identifier"),
        ("newDepositAmount" = String, Query, description = "New balance, decimal")
    ),
    responses(
        (status = 204, description = "Deposit replaced"),
        (status = 400, description = "Amount has more than two decimal places", body = crate::api::types::ErrorResponse),
        (status = 404, description = "Client not found", body = crate::api::types::ErrorResponse)
    )
)]
pub(crate) async fn change_deposit(
    Query(params): Query<DepositParams>,
    State(state): State<AppState>,
) -> Result<StatusCode, ApiError> {
    let updated = state
        .calendar
        .set_client_deposit(params.client_id, params.new_deposit_amount)
        .await
        .map_err(|err| api_ledger("failed to change deposit", err))?;
    if !updated {
        return Err(api_not_found("client not found"));
    }
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    put,
    path = "/clients/archive",
    tag = "clients",
    params(
        ("clientId" = i64, Query, description = "Client identifier")
    ),
    responses(
        (status = 204, description = "Client archived and its series stopped"),
        (status = 404, description = "Client not found", body = crate::api::types::ErrorResponse)
    )
)]
pub(crate) async fn archive_client(
    Query(params): Query<ArchiveParams>,
    State(state): State<AppState>,
) -> Result<StatusCode, ApiError> {
    let archived = state
        .calendar
        .archive_client(params.client_id)
        .await
        .map_err(|err| api_ledger("failed to archive client", err))?;
    if !archived {
        return Err(api_not_found("client not found"));
    }
    Ok(StatusCode::NO_CONTENT)
}
