use crate::model::{Client, ClientId, DateWindow, Event, EventId, NewClient, NewEvent};
use async_trait::async_trait;
use chrono::NaiveDate;
use std::sync::Arc;
use thiserror::Error;

pub mod memory;
pub mod postgres;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error(transparent)]
    Unexpected(#[from] anyhow::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

pub type SharedStore = Arc<dyn LedgerStore>;

/// Outcome of a conditional occurrence insert.
#[derive(Debug, Clone, PartialEq)]
pub enum OccurrenceInsert {
    Created(Event),
    Existing(Event),
}

impl OccurrenceInsert {
    pub fn event(&self) -> &Event {
        match self {
            OccurrenceInsert::Created(event) | OccurrenceInsert::Existing(event) => event,
        }
    }

    pub fn was_created(&self) -> bool {
        matches!(self, OccurrenceInsert::Created(_))
    }
}

#[async_trait]
pub trait LedgerStore: Send + Sync {
    async fn find_client_by_id(&self, id: ClientId) -> StoreResult<Option<Client>>;
    async fn find_client_by_name(&self, full_name: &str) -> StoreResult<Option<Client>>;
    /// Inserts a client; `Conflict` when the full name is already taken.
    async fn create_client(&self, client: NewClient) -> StoreResult<Client>;
    /// Overwrites an existing client; `NotFound` when the id is unknown.
    async fn save_client(&self, client: &Client) -> StoreResult<Client>;
    async fn all_clients(&self) -> StoreResult<Vec<Client>>;
    async fn client_exists(&self, id: ClientId) -> StoreResult<bool>;

    async fn find_event_by_id(&self, id: EventId) -> StoreResult<Option<Event>>;
    async fn create_event(&self, event: NewEvent) -> StoreResult<Event>;
    async fn save_event(&self, event: &Event) -> StoreResult<Event>;
    async fn all_events(&self) -> StoreResult<Vec<Event>>;
    async fn events_by_client(&self, client_id: ClientId) -> StoreResult<Vec<Event>>;
    /// Events with `from <= date <= to`, ordered by date then start time.
    async fn events_in_date_range(&self, from: NaiveDate, to: NaiveDate)
    -> StoreResult<Vec<Event>>;
    async fn root_events(&self) -> StoreResult<Vec<Event>>;
    async fn find_occurrence(
        &self,
        root_id: EventId,
        week: DateWindow,
    ) -> StoreResult<Option<Event>>;
    /// Inserts `event` as an occurrence unless one for the same root already
    /// falls inside `week`. Check and insert are atomic per backend.
    async fn insert_occurrence_if_absent(
        &self,
        event: NewEvent,
        week: DateWindow,
    ) -> StoreResult<OccurrenceInsert>;

    async fn health_check(&self) -> StoreResult<()>;
    fn is_durable(&self) -> bool;
    fn backend_name(&self) -> &'static str;
}

/// Orders events the way every listing returns them.
pub(crate) fn sort_events(events: &mut [Event]) {
    events.sort_by(|a, b| {
        a.date
            .cmp(&b.date)
            .then(a.start_time.cmp(&b.start_time))
            .then(a.id.cmp(&b.id))
    });
}
