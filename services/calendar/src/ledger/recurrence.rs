//! Lazy weekly materialization of repeating events.
//!
//! # Purpose
//! A repeating root is stored once. The first read of a later week creates
//! the concrete occurrence for that week; later reads find it and do nothing.
//!
//! # Key invariants
//! - A root only projects into weeks that start after its own date, so it is
//!   never copied into its own week or an earlier one.
//! - An occurrence lands on the root's weekday.
//! - At most one occurrence per (root, week). The store's conditional insert
//!   guarantees it across processes; a keyed async mutex serializes callers
//!   inside this process so concurrent reads of one week do not race.
use super::LedgerResult;
use crate::model::{DateWindow, Event, EventId, EventStatus, NewEvent};
use crate::observability::OCCURRENCES_MATERIALIZED;
use crate::store::SharedStore;
use chrono::{Datelike, NaiveDate};
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

pub struct RecurrenceEngine {
    store: SharedStore,
    locks: DashMap<(EventId, NaiveDate), Arc<Mutex<()>>>,
}

/// The date `root` projects to inside `week`, or `None` when it must not be
/// materialized there.
pub fn projected_date(root: &Event, week: DateWindow) -> Option<NaiveDate> {
    if !root.is_root() || !root.repeatable || root.date >= week.start {
        return None;
    }
    week.day_on(root.date.weekday())
}

fn occurrence_of(root: &Event, date: NaiveDate) -> NewEvent {
    NewEvent {
        client_id: root.client_id,
        price: root.price,
        date,
        start_time: root.start_time,
        finish_time: root.finish_time,
        repeatable: false,
        status: EventStatus::Created,
        root_id: Some(root.id),
    }
}

impl RecurrenceEngine {
    pub fn new(store: SharedStore) -> Self {
        Self {
            store,
            locks: DashMap::new(),
        }
    }

    /// Creates any missing occurrences for the ISO week containing `target`
    /// and returns every event dated inside that week.
    pub async fn ensure_week_materialized(&self, target: NaiveDate) -> LedgerResult<Vec<Event>> {
        let week = DateWindow::week_of(target);
        let mut created = 0usize;
        for root in self.store.root_events().await? {
            let Some(date) = projected_date(&root, week) else {
                continue;
            };
            if self.materialize(&root, date, week).await? {
                created += 1;
            }
        }
        if created > 0 {
            tracing::info!(week_start = %week.start, created, "occurrences materialized");
        }
        Ok(self.store.events_in_date_range(week.start, week.end).await?)
    }

    async fn materialize(&self, root: &Event, date: NaiveDate, week: DateWindow) -> LedgerResult<bool> {
        let key = (root.id, week.start);
        let lock = self
            .locks
            .entry(key)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let result = {
            let _guard = lock.lock().await;
            self.get_or_create(root, date, week).await
        };
        drop(lock);
        self.locks
            .remove_if(&key, |_, lock| Arc::strong_count(lock) == 1);
        result
    }

    async fn get_or_create(&self, root: &Event, date: NaiveDate, week: DateWindow) -> LedgerResult<bool> {
        if self.store.find_occurrence(root.id, week).await?.is_some() {
            return Ok(false);
        }
        let outcome = self
            .store
            .insert_occurrence_if_absent(occurrence_of(root, date), week)
            .await?;
        if outcome.was_created() {
            metrics::counter!(OCCURRENCES_MATERIALIZED).increment(1);
            tracing::debug!(
                root_id = root.id,
                event_id = outcome.event().id,
                %date,
                "occurrence created"
            );
        }
        Ok(outcome.was_created())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::test_support::{day, hour};
    use crate::model::{EventOrigin, NewClient};
    use crate::store::memory::InMemoryStore;
    use rust_decimal_macros::dec;

    async fn seeded(roots: &[(&str, bool)]) -> (SharedStore, Vec<Event>) {
        let store: SharedStore = Arc::new(InMemoryStore::new());
        let client = store
            .create_client(NewClient::named("Artem Denysiuk"))
            .await
            .expect("client");
        let mut created = Vec::new();
        for (date, repeatable) in roots {
            created.push(
                store
                    .create_event(NewEvent {
                        client_id: client.id,
                        price: dec!(200),
                        date: day(date),
                        start_time: hour(13),
                        finish_time: hour(14),
                        repeatable: *repeatable,
                        status: EventStatus::Created,
                        root_id: None,
                    })
                    .await
                    .expect("root"),
            );
        }
        (store, created)
    }

    fn occurrences(events: &[Event]) -> Vec<&Event> {
        events.iter().filter(|event| !event.is_root()).collect()
    }

    #[tokio::test]
    async fn projects_root_onto_same_weekday_once() {
        let (store, roots) = seeded(&[("2023-10-01", true)]).await;
        let engine = RecurrenceEngine::new(store.clone());

        let first = engine
            .ensure_week_materialized(day("2023-10-19"))
            .await
            .expect("week");
        assert_eq!(first.len(), 1);
        let occurrence = &first[0];
        assert_eq!(occurrence.date, day("2023-10-22"));
        assert_eq!(occurrence.origin, EventOrigin::Occurrence { root_id: roots[0].id });
        assert_eq!(occurrence.status, EventStatus::Created);
        assert!(!occurrence.repeatable);
        assert_eq!(occurrence.price, dec!(200));
        assert_eq!(occurrence.start_time, hour(13));

        let second = engine
            .ensure_week_materialized(day("2023-10-19"))
            .await
            .expect("week");
        assert_eq!(second, first);
        assert_eq!(store.all_events().await.expect("events").len(), 2);
    }

    #[tokio::test]
    async fn preserves_weekday_for_every_day_of_week() {
        let dates = [
            ("2023-09-25", true),
            ("2023-09-26", true),
            ("2023-09-27", true),
            ("2023-09-28", true),
            ("2023-09-29", true),
            ("2023-09-30", true),
            ("2023-10-01", true),
        ];
        let (store, roots) = seeded(&dates).await;
        let engine = RecurrenceEngine::new(store);
        let events = engine
            .ensure_week_materialized(day("2023-11-08"))
            .await
            .expect("week");
        let week = DateWindow::week_of(day("2023-11-08"));
        assert_eq!(events.len(), 7);
        for occurrence in &events {
            let root = roots
                .iter()
                .find(|root| Some(root.id) == occurrence.root_id())
                .expect("root");
            assert_eq!(occurrence.date.weekday(), root.date.weekday());
            assert!(week.contains(occurrence.date));
        }
    }

    #[tokio::test]
    async fn never_projects_into_own_or_earlier_week() {
        // Monday and Wednesday of the queried week, then a later week.
        let (store, _) = seeded(&[
            ("2023-10-16", true),
            ("2023-10-18", true),
            ("2023-10-25", true),
        ])
        .await;
        let engine = RecurrenceEngine::new(store.clone());
        let events = engine
            .ensure_week_materialized(day("2023-10-19"))
            .await
            .expect("week");
        assert!(occurrences(&events).is_empty());
        assert_eq!(events.len(), 2);
        assert_eq!(store.all_events().await.expect("events").len(), 3);
    }

    #[tokio::test]
    async fn skips_non_repeating_roots_and_occurrences() {
        let (store, roots) = seeded(&[("2023-10-01", false), ("2023-10-03", true)]).await;
        let engine = RecurrenceEngine::new(store.clone());
        engine
            .ensure_week_materialized(day("2023-10-10"))
            .await
            .expect("week");
        let events = engine
            .ensure_week_materialized(day("2023-10-17"))
            .await
            .expect("week");
        let projected = occurrences(&events);
        assert_eq!(projected.len(), 1);
        assert_eq!(projected[0].root_id(), Some(roots[1].id));
        // One occurrence per visited week, all from the repeating root.
        assert_eq!(store.all_events().await.expect("events").len(), 4);
    }

    #[tokio::test]
    async fn week_edges_still_materialize() {
        let (store, _) = seeded(&[("2023-10-04", true)]).await;
        let engine = RecurrenceEngine::new(store);
        let sunday = engine
            .ensure_week_materialized(day("2023-10-22"))
            .await
            .expect("sunday target");
        assert_eq!(occurrences(&sunday).len(), 1);
        let monday = engine
            .ensure_week_materialized(day("2023-10-23"))
            .await
            .expect("monday target");
        assert_eq!(monday[0].date, day("2023-10-25"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_reads_create_one_occurrence_per_root() {
        let (store, roots) = seeded(&[("2023-10-01", true), ("2023-10-03", true)]).await;
        let engine = Arc::new(RecurrenceEngine::new(store.clone()));
        // A second engine over the same store stands in for another process.
        let other = Arc::new(RecurrenceEngine::new(store.clone()));
        let mut handles = Vec::new();
        for i in 0..16 {
            let engine = if i % 2 == 0 { engine.clone() } else { other.clone() };
            handles.push(tokio::spawn(async move {
                engine.ensure_week_materialized(day("2023-10-19")).await
            }));
        }
        for handle in handles {
            let events = handle.await.expect("join").expect("week");
            assert_eq!(events.len(), 2);
        }
        let all = store.all_events().await.expect("events");
        for root in &roots {
            let count = all
                .iter()
                .filter(|event| event.root_id() == Some(root.id))
                .count();
            assert_eq!(count, 1);
        }
        assert!(engine.locks.is_empty());
    }

    #[test]
    fn projected_date_rules() {
        let week = DateWindow::week_of(day("2023-10-19"));
        let root = Event {
            id: 1,
            client_id: 1,
            price: dec!(200),
            date: day("2023-10-01"),
            start_time: hour(13),
            finish_time: hour(14),
            repeatable: true,
            status: EventStatus::Created,
            origin: EventOrigin::Root,
        };
        assert_eq!(projected_date(&root, week), Some(day("2023-10-22")));

        let mut finished = root.clone();
        finished.status = EventStatus::Finished;
        assert_eq!(projected_date(&finished, week), Some(day("2023-10-22")));

        let mut occurrence = root.clone();
        occurrence.origin = EventOrigin::Occurrence { root_id: 9 };
        assert_eq!(projected_date(&occurrence, week), None);

        let mut single = root.clone();
        single.repeatable = false;
        assert_eq!(projected_date(&single, week), None);

        let mut sunday_before = root;
        sunday_before.date = day("2023-10-15");
        assert_eq!(projected_date(&sunday_before, week), Some(day("2023-10-22")));
    }
}
