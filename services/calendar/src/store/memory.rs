//! In-memory implementation of the ledger store.
//!
//! # Purpose
//! Implements `LedgerStore` entirely in memory using `BTreeMap`s guarded by
//! `tokio::sync::RwLock`. Used for local development, tests, and deployments
//! where losing state on restart is acceptable.
//!
//! # Durability and consistency
//! - **Not durable**: all state is lost on process restart.
//! - Mutations take the write lock of the map they touch, so each single-record
//!   write is atomic within the process.
//! - `insert_occurrence_if_absent` checks and inserts under one write lock,
//!   which makes occurrence creation get-or-create per (root, week).
//!
//! # Metrics
//! Keeps `calendar_clients_total` in step with the Postgres backend.
use super::{LedgerStore, OccurrenceInsert, StoreError, StoreResult, sort_events};
use crate::model::{Client, ClientId, DateWindow, Event, EventId, EventOrigin, NewClient, NewEvent};
use crate::observability::CLIENTS_TOTAL;
use anyhow::anyhow;
use async_trait::async_trait;
use chrono::NaiveDate;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use tokio::sync::RwLock;

/// In-memory ledger store.
///
/// Ids are handed out from per-entity counters starting at 1, mirroring a
/// `BIGSERIAL` column.
pub struct InMemoryStore {
    clients: Arc<RwLock<BTreeMap<ClientId, Client>>>,
    events: Arc<RwLock<BTreeMap<EventId, Event>>>,
    next_client_id: AtomicI64,
    next_event_id: AtomicI64,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            clients: Arc::new(RwLock::new(BTreeMap::new())),
            events: Arc::new(RwLock::new(BTreeMap::new())),
            next_client_id: AtomicI64::new(1),
            next_event_id: AtomicI64::new(1),
        }
    }

    fn materialize(&self, event: NewEvent) -> Event {
        let id = self.next_event_id.fetch_add(1, Ordering::SeqCst);
        let origin = match event.root_id {
            Some(root_id) => EventOrigin::Occurrence { root_id },
            None => EventOrigin::Root,
        };
        Event {
            id,
            client_id: event.client_id,
            price: event.price,
            date: event.date,
            start_time: event.start_time,
            finish_time: event.finish_time,
            repeatable: event.repeatable,
            status: event.status,
            origin,
        }
    }

    async fn ensure_client(&self, client_id: ClientId) -> StoreResult<()> {
        if self.clients.read().await.contains_key(&client_id) {
            Ok(())
        } else {
            Err(StoreError::NotFound(format!("client {client_id}")))
        }
    }
}

/// The occurrence of `root_id` already placed inside `week`, skipping `exclude`.
fn occurrence_in<'a>(
    events: &'a BTreeMap<EventId, Event>,
    root_id: EventId,
    week: DateWindow,
    exclude: Option<EventId>,
) -> Option<&'a Event> {
    events.values().find(|event| {
        Some(event.id) != exclude
            && event.root_id() == Some(root_id)
            && week.contains(event.date)
    })
}

#[async_trait]
impl LedgerStore for InMemoryStore {
    async fn find_client_by_id(&self, id: ClientId) -> StoreResult<Option<Client>> {
        Ok(self.clients.read().await.get(&id).cloned())
    }

    async fn find_client_by_name(&self, full_name: &str) -> StoreResult<Option<Client>> {
        Ok(self
            .clients
            .read()
            .await
            .values()
            .find(|client| client.full_name == full_name)
            .cloned())
    }

    async fn create_client(&self, client: NewClient) -> StoreResult<Client> {
        let mut clients = self.clients.write().await;
        if clients
            .values()
            .any(|existing| existing.full_name == client.full_name)
        {
            return Err(StoreError::Conflict("client name exists".into()));
        }
        let id = self.next_client_id.fetch_add(1, Ordering::SeqCst);
        let client = Client {
            id,
            full_name: client.full_name,
            deposit: client.deposit,
            status: client.status,
        };
        clients.insert(id, client.clone());
        metrics::gauge!(CLIENTS_TOTAL).set(clients.len() as f64);
        Ok(client)
    }

    async fn save_client(&self, client: &Client) -> StoreResult<Client> {
        let mut clients = self.clients.write().await;
        if clients
            .values()
            .any(|existing| existing.id != client.id && existing.full_name == client.full_name)
        {
            return Err(StoreError::Conflict("client name exists".into()));
        }
        match clients.get_mut(&client.id) {
            Some(stored) => {
                *stored = client.clone();
                Ok(client.clone())
            }
            None => Err(StoreError::NotFound(format!("client {}", client.id))),
        }
    }

    async fn all_clients(&self) -> StoreResult<Vec<Client>> {
        Ok(self.clients.read().await.values().cloned().collect())
    }

    async fn client_exists(&self, id: ClientId) -> StoreResult<bool> {
        Ok(self.clients.read().await.contains_key(&id))
    }

    async fn find_event_by_id(&self, id: EventId) -> StoreResult<Option<Event>> {
        Ok(self.events.read().await.get(&id).cloned())
    }

    async fn create_event(&self, event: NewEvent) -> StoreResult<Event> {
        self.ensure_client(event.client_id).await?;
        let mut events = self.events.write().await;
        if let Some(root_id) = event.root_id {
            let week = DateWindow::week_of(event.date);
            if occurrence_in(&events, root_id, week, None).is_some() {
                return Err(StoreError::Conflict(format!(
                    "occurrence of {root_id} exists in week of {}",
                    week.start
                )));
            }
        }
        let event = self.materialize(event);
        events.insert(event.id, event.clone());
        Ok(event)
    }

    async fn save_event(&self, event: &Event) -> StoreResult<Event> {
        self.ensure_client(event.client_id).await?;
        let mut events = self.events.write().await;
        if !events.contains_key(&event.id) {
            return Err(StoreError::NotFound(format!("event {}", event.id)));
        }
        if let Some(root_id) = event.root_id() {
            let week = DateWindow::week_of(event.date);
            if occurrence_in(&events, root_id, week, Some(event.id)).is_some() {
                return Err(StoreError::Conflict(format!(
                    "occurrence of {root_id} exists in week of {}",
                    week.start
                )));
            }
        }
        events.insert(event.id, event.clone());
        Ok(event.clone())
    }

    async fn all_events(&self) -> StoreResult<Vec<Event>> {
        let mut events: Vec<Event> = self.events.read().await.values().cloned().collect();
        sort_events(&mut events);
        Ok(events)
    }

    async fn events_by_client(&self, client_id: ClientId) -> StoreResult<Vec<Event>> {
        let mut events: Vec<Event> = self
            .events
            .read()
            .await
            .values()
            .filter(|event| event.client_id == client_id)
            .cloned()
            .collect();
        sort_events(&mut events);
        Ok(events)
    }

    async fn events_in_date_range(
        &self,
        from: NaiveDate,
        to: NaiveDate,
    ) -> StoreResult<Vec<Event>> {
        let mut events: Vec<Event> = self
            .events
            .read()
            .await
            .values()
            .filter(|event| from <= event.date && event.date <= to)
            .cloned()
            .collect();
        sort_events(&mut events);
        Ok(events)
    }

    async fn root_events(&self) -> StoreResult<Vec<Event>> {
        let mut events: Vec<Event> = self
            .events
            .read()
            .await
            .values()
            .filter(|event| event.is_root())
            .cloned()
            .collect();
        sort_events(&mut events);
        Ok(events)
    }

    async fn find_occurrence(
        &self,
        root_id: EventId,
        week: DateWindow,
    ) -> StoreResult<Option<Event>> {
        let events = self.events.read().await;
        Ok(occurrence_in(&events, root_id, week, None).cloned())
    }

    async fn insert_occurrence_if_absent(
        &self,
        event: NewEvent,
        week: DateWindow,
    ) -> StoreResult<OccurrenceInsert> {
        let Some(root_id) = event.root_id else {
            return Err(StoreError::Unexpected(anyhow!(
                "occurrence insert without a root id"
            )));
        };
        if !week.contains(event.date) {
            return Err(StoreError::Unexpected(anyhow!(
                "occurrence date {} outside week {}..{}",
                event.date,
                week.start,
                week.end
            )));
        }
        self.ensure_client(event.client_id).await?;
        // Check and insert under the same write guard.
        let mut events = self.events.write().await;
        if let Some(existing) = occurrence_in(&events, root_id, week, None) {
            return Ok(OccurrenceInsert::Existing(existing.clone()));
        }
        let event = self.materialize(event);
        events.insert(event.id, event.clone());
        Ok(OccurrenceInsert::Created(event))
    }

    async fn health_check(&self) -> StoreResult<()> {
        Ok(())
    }

    fn is_durable(&self) -> bool {
        false
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ClientStatus, EventStatus};
    use chrono::NaiveTime;
    use rust_decimal::Decimal;

    fn day(value: &str) -> NaiveDate {
        value.parse().expect("date")
    }

    fn new_event(client_id: ClientId, date: &str, root_id: Option<EventId>) -> NewEvent {
        NewEvent {
            client_id,
            price: Decimal::new(200, 0),
            date: day(date),
            start_time: NaiveTime::from_hms_opt(13, 0, 0).unwrap(),
            finish_time: NaiveTime::from_hms_opt(14, 0, 0).unwrap(),
            repeatable: root_id.is_none(),
            status: EventStatus::Created,
            root_id,
        }
    }

    #[tokio::test]
    async fn client_name_conflict_and_missing_save() {
        let store = InMemoryStore::new();
        let client = store
            .create_client(NewClient::named("Ada Lovelace"))
            .await
            .expect("client");
        assert_eq!(client.id, 1);

        let err = store
            .create_client(NewClient::named("Ada Lovelace"))
            .await
            .expect_err("conflict");
        assert!(matches!(err, StoreError::Conflict(_)));

        let found = store
            .find_client_by_name("Ada Lovelace")
            .await
            .expect("lookup")
            .expect("present");
        assert_eq!(found, client);
        assert!(
            store
                .find_client_by_name("ada lovelace")
                .await
                .expect("lookup")
                .is_none()
        );

        let ghost = Client {
            id: 99,
            full_name: "Ghost".into(),
            deposit: Decimal::ZERO,
            status: ClientStatus::Active,
        };
        let err = store.save_client(&ghost).await.expect_err("missing");
        assert!(matches!(err, StoreError::NotFound(_)));
        assert_eq!(store.all_clients().await.expect("clients").len(), 1);
        assert!(!store.client_exists(99).await.expect("exists"));
    }

    #[tokio::test]
    async fn save_client_overwrites_balance() {
        let store = InMemoryStore::new();
        let mut client = store
            .create_client(NewClient::named("Grace Hopper"))
            .await
            .expect("client");
        client.deposit = Decimal::new(-150, 0);
        client.status = ClientStatus::Archived;
        store.save_client(&client).await.expect("save");
        let stored = store
            .find_client_by_id(client.id)
            .await
            .expect("lookup")
            .expect("present");
        assert_eq!(stored.deposit, Decimal::new(-150, 0));
        assert_eq!(stored.status, ClientStatus::Archived);
    }

    #[tokio::test]
    async fn events_require_existing_client() {
        let store = InMemoryStore::new();
        let err = store
            .create_event(new_event(42, "2023-10-01", None))
            .await
            .expect_err("missing client");
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn range_and_root_queries() {
        let store = InMemoryStore::new();
        let client = store
            .create_client(NewClient::named("Ada Lovelace"))
            .await
            .expect("client");
        let root = store
            .create_event(new_event(client.id, "2023-10-01", None))
            .await
            .expect("root");
        assert!(root.is_root());
        let occurrence = store
            .create_event(new_event(client.id, "2023-10-22", Some(root.id)))
            .await
            .expect("occurrence");
        assert_eq!(occurrence.root_id(), Some(root.id));

        let roots = store.root_events().await.expect("roots");
        assert_eq!(roots, vec![root.clone()]);

        let week = store
            .events_in_date_range(day("2023-10-16"), day("2023-10-22"))
            .await
            .expect("range");
        assert_eq!(week, vec![occurrence.clone()]);

        let found = store
            .find_occurrence(root.id, DateWindow::week_of(day("2023-10-19")))
            .await
            .expect("find");
        assert_eq!(found, Some(occurrence));
        assert!(
            store
                .find_occurrence(root.id, DateWindow::week_of(day("2023-10-26")))
                .await
                .expect("find")
                .is_none()
        );
        assert_eq!(
            store.events_by_client(client.id).await.expect("by client").len(),
            2
        );
    }

    #[tokio::test]
    async fn insert_occurrence_is_get_or_create() {
        let store = InMemoryStore::new();
        let client = store
            .create_client(NewClient::named("Ada Lovelace"))
            .await
            .expect("client");
        let root = store
            .create_event(new_event(client.id, "2023-10-01", None))
            .await
            .expect("root");
        let week = DateWindow::week_of(day("2023-10-19"));

        let first = store
            .insert_occurrence_if_absent(new_event(client.id, "2023-10-22", Some(root.id)), week)
            .await
            .expect("insert");
        assert!(first.was_created());

        let second = store
            .insert_occurrence_if_absent(new_event(client.id, "2023-10-22", Some(root.id)), week)
            .await
            .expect("insert");
        assert!(!second.was_created());
        assert_eq!(second.event(), first.event());
        assert_eq!(store.all_events().await.expect("events").len(), 2);

        let err = store
            .insert_occurrence_if_absent(new_event(client.id, "2023-10-29", Some(root.id)), week)
            .await
            .expect_err("outside week");
        assert!(matches!(err, StoreError::Unexpected(_)));
    }

    #[tokio::test]
    async fn saving_occurrence_into_occupied_week_conflicts() {
        let store = InMemoryStore::new();
        let client = store
            .create_client(NewClient::named("Ada Lovelace"))
            .await
            .expect("client");
        let root = store
            .create_event(new_event(client.id, "2023-10-01", None))
            .await
            .expect("root");
        store
            .create_event(new_event(client.id, "2023-10-22", Some(root.id)))
            .await
            .expect("occurrence");
        let mut other = store
            .create_event(new_event(client.id, "2023-10-29", Some(root.id)))
            .await
            .expect("occurrence");

        other.date = day("2023-10-20");
        let err = store.save_event(&other).await.expect_err("conflict");
        assert!(matches!(err, StoreError::Conflict(_)));

        other.date = day("2023-10-30");
        store.save_event(&other).await.expect("move within free week");
    }

    #[tokio::test]
    async fn backend_health_and_identity() {
        let store = InMemoryStore::new();
        store.health_check().await.expect("health");
        assert!(!store.is_durable());
        assert_eq!(store.backend_name(), "memory");
    }
}
