//! Event (appointment) records, series identity and command payloads.
//!
//! # Purpose
//! Defines the stored event, the root/occurrence distinction of a weekly
//! series, and the create/update payloads accepted at the boundary.
//!
//! # Key invariants
//! - A root carries `EventOrigin::Root`; its wire `originalId` is its own id.
//! - An occurrence carries the id of the root it was projected from.
//! - `Finished` is terminal and only set by finalization.
use crate::model::client::{ClientId, ClientRef};
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub type EventId = i64;

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventStatus {
    Created,
    Finished,
    Updated,
}

impl EventStatus {
    /// Created and Updated events are still waiting to be charged.
    pub fn is_open(self) -> bool {
        matches!(self, EventStatus::Created | EventStatus::Updated)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            EventStatus::Created => "CREATED",
            EventStatus::Finished => "FINISHED",
            EventStatus::Updated => "UPDATED",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "CREATED" => Some(EventStatus::Created),
            "FINISHED" => Some(EventStatus::Finished),
            "UPDATED" => Some(EventStatus::Updated),
            _ => None,
        }
    }
}

/// Position of an event within a weekly series.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventOrigin {
    /// Stand-alone event or the definition of a weekly series.
    Root,
    /// Concrete instance projected from the root with this id.
    Occurrence { root_id: EventId },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub id: EventId,
    pub client_id: ClientId,
    pub price: Decimal,
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub finish_time: NaiveTime,
    pub repeatable: bool,
    pub status: EventStatus,
    pub origin: EventOrigin,
}

impl Event {
    pub fn is_root(&self) -> bool {
        matches!(self.origin, EventOrigin::Root)
    }

    pub fn root_id(&self) -> Option<EventId> {
        match self.origin {
            EventOrigin::Root => None,
            EventOrigin::Occurrence { root_id } => Some(root_id),
        }
    }

    /// Series id as exposed on the wire: own id for roots, root id otherwise.
    pub fn original_id(&self) -> EventId {
        self.root_id().unwrap_or(self.id)
    }

    pub fn finishes_at(&self) -> NaiveDateTime {
        self.date.and_time(self.finish_time)
    }
}

/// Event fields before the store assigns an id.
///
/// `root_id == None` creates a root.
#[derive(Debug, Clone, PartialEq)]
pub struct NewEvent {
    pub client_id: ClientId,
    pub price: Decimal,
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub finish_time: NaiveTime,
    pub repeatable: bool,
    pub status: EventStatus,
    pub root_id: Option<EventId>,
}

/// Create-event payload. Mandatory fields are optional here so that missing
/// values surface as validation errors instead of body rejections.
#[derive(Debug, Serialize, Deserialize, ToSchema, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct EventDraft {
    pub client: Option<ClientRef>,
    #[schema(value_type = Option<String>)]
    pub price: Option<Decimal>,
    #[schema(value_type = Option<String>)]
    pub date: Option<NaiveDate>,
    #[schema(value_type = Option<String>)]
    pub start_time: Option<NaiveTime>,
    #[schema(value_type = Option<String>)]
    pub finish_time: Option<NaiveTime>,
    #[serde(default)]
    pub repeatable: bool,
    pub original_id: Option<EventId>,
}

/// Partial update payload. Absent fields keep their stored value.
#[derive(Debug, Serialize, Deserialize, ToSchema, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct EventPatch {
    pub id: Option<EventId>,
    pub client: Option<ClientRef>,
    #[schema(value_type = Option<String>)]
    pub price: Option<Decimal>,
    #[schema(value_type = Option<String>)]
    pub date: Option<NaiveDate>,
    #[schema(value_type = Option<String>)]
    pub start_time: Option<NaiveTime>,
    #[schema(value_type = Option<String>)]
    pub finish_time: Option<NaiveTime>,
    pub repeatable: Option<bool>,
}
