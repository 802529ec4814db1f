//! Client records and lifecycle status.
//!
//! # Purpose
//! Defines the client record, its signed running balance (`deposit`) and the
//! ACTIVE -> ARCHIVED lifecycle.
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub type ClientId = i64;

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClientStatus {
    Active,
    Archived,
}

impl ClientStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ClientStatus::Active => "ACTIVE",
            ClientStatus::Archived => "ARCHIVED",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "ACTIVE" => Some(ClientStatus::Active),
            "ARCHIVED" => Some(ClientStatus::Archived),
            _ => None,
        }
    }
}

/// A client with a signed running balance.
///
/// Negative `deposit` means the client owes money; positive means credit paid
/// forward. The balance is only changed by an explicit deposit command or by
/// finalization charging a finished event.
#[derive(Debug, Serialize, Deserialize, ToSchema, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Client {
    pub id: ClientId,
    pub full_name: String,
    #[schema(value_type = String)]
    pub deposit: Decimal,
    #[serde(rename = "clientStatus")]
    pub status: ClientStatus,
}

impl Client {
    pub fn is_active(&self) -> bool {
        self.status == ClientStatus::Active
    }
}

/// Client fields before the store assigns an id.
#[derive(Debug, Clone, PartialEq)]
pub struct NewClient {
    pub full_name: String,
    pub deposit: Decimal,
    pub status: ClientStatus,
}

impl NewClient {
    /// A fresh client: zero balance, ACTIVE.
    pub fn named(full_name: impl Into<String>) -> Self {
        Self {
            full_name: full_name.into(),
            deposit: Decimal::ZERO,
            status: ClientStatus::Active,
        }
    }
}

/// Client reference carried by event commands; resolved by full name.
#[derive(Debug, Serialize, Deserialize, ToSchema, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ClientRef {
    pub full_name: Option<String>,
}
