//! Closes out past appointments and charges them to client balances.
//!
//! # Key invariants
//! - Only `Created` and `Updated` events whose end lies strictly before `now`
//!   are finalized, so an event is charged at most once.
//! - The event is persisted as `Finished` before the client balance. Each
//!   charge is applied to a freshly read client, so archive or deposit changes
//!   made during the scan survive it.
//! - A failed balance write leaves the charge pending; the next successful
//!   write for that client in the same pass carries it.
//! - A failure on one event or client is logged and counted; the scan goes on.
use super::LedgerResult;
use crate::model::{ClientId, Event, EventStatus};
use crate::observability::{EVENTS_FINALIZED, FINALIZATION_FAILURES};
use crate::store::{SharedStore, StoreError, StoreResult};
use chrono::NaiveDateTime;
use rust_decimal::Decimal;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FinalizationReport {
    pub clients_scanned: usize,
    pub events_finalized: usize,
    pub failures: usize,
}

#[derive(Clone)]
pub struct FinalizationJob {
    store: SharedStore,
}

/// Whether `event` is open and its scheduled end has passed.
pub fn is_due(event: &Event, now: NaiveDateTime) -> bool {
    event.status.is_open() && event.finishes_at() < now
}

impl FinalizationJob {
    pub fn new(store: SharedStore) -> Self {
        Self { store }
    }

    /// One pass over every client, archived ones included.
    ///
    /// Fails only when the client list itself cannot be loaded.
    pub async fn run(&self, now: NaiveDateTime) -> LedgerResult<FinalizationReport> {
        let clients = self.store.all_clients().await?;
        let mut report = FinalizationReport::default();
        for client in clients {
            report.clients_scanned += 1;
            let events = match self.store.events_by_client(client.id).await {
                Ok(events) => events,
                Err(err) => {
                    tracing::warn!(client_id = client.id, error = %err, "failed to load client events");
                    metrics::counter!(FINALIZATION_FAILURES).increment(1);
                    report.failures += 1;
                    continue;
                }
            };
            let mut pending = Decimal::ZERO;
            for event in events.into_iter().filter(|event| is_due(event, now)) {
                let event_id = event.id;
                match self.finalize(client.id, event, &mut pending).await {
                    Ok(()) => {
                        metrics::counter!(EVENTS_FINALIZED).increment(1);
                        report.events_finalized += 1;
                    }
                    Err(err) => {
                        tracing::warn!(
                            client_id = client.id,
                            event_id,
                            error = %err,
                            "failed to finalize event"
                        );
                        metrics::counter!(FINALIZATION_FAILURES).increment(1);
                        report.failures += 1;
                    }
                }
            }
        }
        tracing::info!(
            clients_scanned = report.clients_scanned,
            events_finalized = report.events_finalized,
            failures = report.failures,
            "finalization pass complete"
        );
        Ok(report)
    }

    /// `pending` holds charges of this client whose balance write failed.
    async fn finalize(
        &self,
        client_id: ClientId,
        mut event: Event,
        pending: &mut Decimal,
    ) -> StoreResult<()> {
        event.status = EventStatus::Finished;
        self.store.save_event(&event).await?;
        *pending += event.price;
        let mut client = self
            .store
            .find_client_by_id(client_id)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("client {client_id}")))?;
        client.deposit -= *pending;
        let saved = self.store.save_client(&client).await?;
        *pending = Decimal::ZERO;
        tracing::debug!(
            client_id,
            event_id = event.id,
            price = %event.price,
            deposit = %saved.deposit,
            "event finalized"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::test_support::{at, day, hour};
    use crate::model::{Client, ClientStatus, DateWindow, EventId, EventOrigin, NewClient, NewEvent};
    use crate::store::memory::InMemoryStore;
    use crate::store::{LedgerStore, OccurrenceInsert, StoreError};
    use async_trait::async_trait;
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;
    use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    async fn client(store: &SharedStore, name: &str) -> Client {
        store
            .create_client(NewClient::named(name))
            .await
            .expect("client")
    }

    async fn event(store: &SharedStore, client_id: ClientId, date: &str, price: Decimal) -> Event {
        store
            .create_event(NewEvent {
                client_id,
                price,
                date: day(date),
                start_time: hour(13),
                finish_time: hour(14),
                repeatable: false,
                status: EventStatus::Created,
                root_id: None,
            })
            .await
            .expect("event")
    }

    async fn deposit(store: &SharedStore, id: ClientId) -> Decimal {
        store
            .find_client_by_id(id)
            .await
            .expect("lookup")
            .expect("present")
            .deposit
    }

    async fn status(store: &SharedStore, id: EventId) -> EventStatus {
        store
            .find_event_by_id(id)
            .await
            .expect("lookup")
            .expect("present")
            .status
    }

    #[tokio::test]
    async fn past_event_is_charged_once() {
        let store: SharedStore = Arc::new(InMemoryStore::new());
        let ada = client(&store, "Ada").await;
        let past = event(&store, ada.id, "2023-10-02", dec!(200)).await;
        let job = FinalizationJob::new(store.clone());

        let report = job.run(at("2023-10-02", 15)).await.expect("run");
        assert_eq!(
            report,
            FinalizationReport {
                clients_scanned: 1,
                events_finalized: 1,
                failures: 0
            }
        );
        assert_eq!(status(&store, past.id).await, EventStatus::Finished);
        assert_eq!(deposit(&store, ada.id).await, dec!(-200));

        let again = job.run(at("2023-10-03", 15)).await.expect("rerun");
        assert_eq!(again.events_finalized, 0);
        assert_eq!(deposit(&store, ada.id).await, dec!(-200));
    }

    #[tokio::test]
    async fn future_and_unfinished_events_are_untouched() {
        let store: SharedStore = Arc::new(InMemoryStore::new());
        let ada = client(&store, "Ada").await;
        let running = event(&store, ada.id, "2023-10-02", dec!(200)).await;
        let tomorrow = event(&store, ada.id, "2023-10-03", dec!(100)).await;
        let job = FinalizationJob::new(store.clone());

        // Ends at 14:00 sharp, which is not strictly before now.
        let report = job.run(at("2023-10-02", 14)).await.expect("run");
        assert_eq!(report.events_finalized, 0);
        assert_eq!(status(&store, running.id).await, EventStatus::Created);
        assert_eq!(status(&store, tomorrow.id).await, EventStatus::Created);
        assert_eq!(deposit(&store, ada.id).await, Decimal::ZERO);
    }

    #[tokio::test]
    async fn updated_events_and_archived_clients_are_charged() {
        let store: SharedStore = Arc::new(InMemoryStore::new());
        let mut ada = client(&store, "Ada").await;
        ada.deposit = dec!(500);
        ada.status = ClientStatus::Archived;
        store.save_client(&ada).await.expect("archive");
        let mut edited = event(&store, ada.id, "2023-10-02", dec!(120)).await;
        edited.status = EventStatus::Updated;
        store.save_event(&edited).await.expect("update");
        event(&store, ada.id, "2023-10-04", dec!(80)).await;

        let report = FinalizationJob::new(store.clone())
            .run(at("2023-10-05", 0))
            .await
            .expect("run");
        assert_eq!(report.events_finalized, 2);
        assert_eq!(status(&store, edited.id).await, EventStatus::Finished);
        assert_eq!(deposit(&store, ada.id).await, dec!(300));
    }

    #[test]
    fn finished_events_are_never_due() {
        let mut event = Event {
            id: 1,
            client_id: 1,
            price: dec!(200),
            date: day("2023-10-02"),
            start_time: hour(13),
            finish_time: hour(14),
            repeatable: false,
            status: EventStatus::Finished,
            origin: EventOrigin::Root,
        };
        assert!(!is_due(&event, at("2024-01-01", 0)));
        event.status = EventStatus::Created;
        assert!(is_due(&event, at("2024-01-01", 0)));
        assert!(!is_due(&event, at("2023-10-02", 13)));
    }

    /// Delegates to memory, refusing to save one event and a number of client
    /// writes. `interleaved` is written when the scan loads a client's events,
    /// standing in for a command that lands mid-pass.
    struct FlakyStore {
        inner: InMemoryStore,
        broken_event: AtomicI64,
        failing_client_saves: AtomicUsize,
        interleaved: Mutex<Option<Client>>,
    }

    impl FlakyStore {
        fn new() -> Self {
            Self {
                inner: InMemoryStore::new(),
                broken_event: AtomicI64::new(-1),
                failing_client_saves: AtomicUsize::new(0),
                interleaved: Mutex::new(None),
            }
        }
    }

    #[async_trait]
    impl LedgerStore for FlakyStore {
        async fn find_client_by_id(&self, id: ClientId) -> StoreResult<Option<Client>> {
            self.inner.find_client_by_id(id).await
        }
        async fn find_client_by_name(&self, full_name: &str) -> StoreResult<Option<Client>> {
            self.inner.find_client_by_name(full_name).await
        }
        async fn create_client(&self, client: NewClient) -> StoreResult<Client> {
            self.inner.create_client(client).await
        }
        async fn save_client(&self, client: &Client) -> StoreResult<Client> {
            let failing = self
                .failing_client_saves
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1));
            if failing.is_ok() {
                return Err(StoreError::Unexpected(anyhow::anyhow!("connection reset")));
            }
            self.inner.save_client(client).await
        }
        async fn all_clients(&self) -> StoreResult<Vec<Client>> {
            self.inner.all_clients().await
        }
        async fn client_exists(&self, id: ClientId) -> StoreResult<bool> {
            self.inner.client_exists(id).await
        }
        async fn find_event_by_id(&self, id: EventId) -> StoreResult<Option<Event>> {
            self.inner.find_event_by_id(id).await
        }
        async fn create_event(&self, event: NewEvent) -> StoreResult<Event> {
            self.inner.create_event(event).await
        }
        async fn save_event(&self, event: &Event) -> StoreResult<Event> {
            if event.id == self.broken_event.load(Ordering::SeqCst) {
                return Err(StoreError::Unexpected(anyhow::anyhow!("disk full")));
            }
            self.inner.save_event(event).await
        }
        async fn all_events(&self) -> StoreResult<Vec<Event>> {
            self.inner.all_events().await
        }
        async fn events_by_client(&self, client_id: ClientId) -> StoreResult<Vec<Event>> {
            let interleaved = self.interleaved.lock().expect("lock").take();
            if let Some(client) = interleaved {
                self.inner.save_client(&client).await?;
            }
            self.inner.events_by_client(client_id).await
        }
        async fn events_in_date_range(
            &self,
            from: NaiveDate,
            to: NaiveDate,
        ) -> StoreResult<Vec<Event>> {
            self.inner.events_in_date_range(from, to).await
        }
        async fn root_events(&self) -> StoreResult<Vec<Event>> {
            self.inner.root_events().await
        }
        async fn find_occurrence(
            &self,
            root_id: EventId,
            week: DateWindow,
        ) -> StoreResult<Option<Event>> {
            self.inner.find_occurrence(root_id, week).await
        }
        async fn insert_occurrence_if_absent(
            &self,
            event: NewEvent,
            week: DateWindow,
        ) -> StoreResult<OccurrenceInsert> {
            self.inner.insert_occurrence_if_absent(event, week).await
        }
        async fn health_check(&self) -> StoreResult<()> {
            self.inner.health_check().await
        }
        fn is_durable(&self) -> bool {
            false
        }
        fn backend_name(&self) -> &'static str {
            "flaky"
        }
    }

    #[tokio::test]
    async fn one_failing_event_does_not_stop_the_scan() {
        let flaky = Arc::new(FlakyStore::new());
        let store: SharedStore = flaky.clone();
        let ada = client(&store, "Ada").await;
        let grace = client(&store, "Grace").await;
        let broken = event(&store, ada.id, "2023-10-02", dec!(200)).await;
        let fine = event(&store, ada.id, "2023-10-03", dec!(50)).await;
        let other = event(&store, grace.id, "2023-10-02", dec!(70)).await;
        flaky.broken_event.store(broken.id, Ordering::SeqCst);

        let report = FinalizationJob::new(store.clone())
            .run(at("2023-10-10", 0))
            .await
            .expect("run");
        assert_eq!(
            report,
            FinalizationReport {
                clients_scanned: 2,
                events_finalized: 2,
                failures: 1
            }
        );
        assert_eq!(status(&store, broken.id).await, EventStatus::Created);
        assert_eq!(status(&store, fine.id).await, EventStatus::Finished);
        assert_eq!(status(&store, other.id).await, EventStatus::Finished);
        assert_eq!(deposit(&store, ada.id).await, dec!(-50));
        assert_eq!(deposit(&store, grace.id).await, dec!(-70));
    }

    #[tokio::test]
    async fn changes_made_during_the_scan_are_kept() {
        let flaky = Arc::new(FlakyStore::new());
        let store: SharedStore = flaky.clone();
        let ada = client(&store, "Ada").await;
        event(&store, ada.id, "2023-10-02", dec!(200)).await;
        let mut archived = ada.clone();
        archived.status = ClientStatus::Archived;
        archived.deposit = dec!(1000);
        *flaky.interleaved.lock().expect("lock") = Some(archived);

        let report = FinalizationJob::new(store.clone())
            .run(at("2023-10-10", 0))
            .await
            .expect("run");
        assert_eq!(report.events_finalized, 1);
        let stored = store
            .find_client_by_id(ada.id)
            .await
            .expect("lookup")
            .expect("present");
        assert_eq!(stored.status, ClientStatus::Archived);
        assert_eq!(stored.deposit, dec!(800));
    }

    #[tokio::test]
    async fn failed_balance_write_is_carried_by_the_next_charge() {
        let flaky = Arc::new(FlakyStore::new());
        let store: SharedStore = flaky.clone();
        let ada = client(&store, "Ada").await;
        let first = event(&store, ada.id, "2023-10-02", dec!(200)).await;
        let second = event(&store, ada.id, "2023-10-03", dec!(50)).await;
        flaky.failing_client_saves.store(1, Ordering::SeqCst);

        let report = FinalizationJob::new(store.clone())
            .run(at("2023-10-10", 0))
            .await
            .expect("run");
        assert_eq!(report.events_finalized, 1);
        assert_eq!(report.failures, 1);
        assert_eq!(status(&store, first.id).await, EventStatus::Finished);
        assert_eq!(status(&store, second.id).await, EventStatus::Finished);
        assert_eq!(deposit(&store, ada.id).await, dec!(-250));
    }
}
