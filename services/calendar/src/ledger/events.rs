//! Create and update commands for events.
use super::{ClientLedger, LedgerError, LedgerResult, check_money_scale};
use crate::model::{ClientRef, DateWindow, Event, EventDraft, EventPatch, EventStatus, NewEvent};
use crate::store::{SharedStore, StoreError};
use chrono::{NaiveDate, NaiveTime};
use rust_decimal::Decimal;

#[derive(Clone)]
pub struct EventCommands {
    store: SharedStore,
    clients: ClientLedger,
}

fn required<T>(value: Option<T>, field: &str) -> LedgerResult<T> {
    value.ok_or_else(|| LedgerError::Validation(format!("{field} is required")))
}

fn client_name(client: Option<&ClientRef>) -> Option<&str> {
    client
        .and_then(|client| client.full_name.as_deref())
        .map(str::trim)
        .filter(|name| !name.is_empty())
}

fn check_price(price: Decimal) -> LedgerResult<()> {
    if price < Decimal::ZERO {
        return Err(LedgerError::Validation("price must not be negative".into()));
    }
    check_money_scale(price, "price")
}

fn check_times(start: NaiveTime, finish: NaiveTime) -> LedgerResult<()> {
    if finish <= start {
        return Err(LedgerError::Validation(
            "finishTime must be after startTime".into(),
        ));
    }
    Ok(())
}

fn check_date(date: NaiveDate) -> LedgerResult<()> {
    if DateWindow::checked_week_of(date).is_none() {
        return Err(LedgerError::Validation(format!("date {date} is out of range")));
    }
    Ok(())
}

/// Occurrence week clashes surface as a rejected request, not a store fault.
fn week_taken(err: StoreError) -> LedgerError {
    match err {
        StoreError::Conflict(reason) => LedgerError::Validation(reason),
        StoreError::NotFound(what) => LedgerError::NotFound(what),
        other => LedgerError::Store(other),
    }
}

impl EventCommands {
    pub fn new(store: SharedStore, clients: ClientLedger) -> Self {
        Self { store, clients }
    }

    /// Validates `draft` and persists it. Without a positive `original_id`
    /// the event becomes a root; with one it joins that root's series.
    pub async fn create_event(&self, draft: EventDraft) -> LedgerResult<Event> {
        let name = required(client_name(draft.client.as_ref()), "client.fullName")?.to_string();
        let price = required(draft.price, "price")?;
        let date = required(draft.date, "date")?;
        let start_time = required(draft.start_time, "startTime")?;
        let finish_time = required(draft.finish_time, "finishTime")?;
        check_price(price)?;
        check_date(date)?;
        check_times(start_time, finish_time)?;

        let root_id = match draft.original_id {
            Some(id) if id > 0 => {
                let root = self
                    .store
                    .find_event_by_id(id)
                    .await?
                    .ok_or_else(|| LedgerError::NotFound(format!("event {id}")))?;
                Some(root.original_id())
            }
            _ => None,
        };

        let client = self.clients.get_or_create_by_name(&name).await?;
        let event = self
            .store
            .create_event(NewEvent {
                client_id: client.id,
                price,
                date,
                start_time,
                finish_time,
                repeatable: draft.repeatable,
                status: EventStatus::Created,
                root_id,
            })
            .await
            .map_err(week_taken)?;
        tracing::info!(
            event_id = event.id,
            client_id = client.id,
            %date,
            repeatable = event.repeatable,
            "event created"
        );
        Ok(event)
    }

    /// Applies the present fields of `patch`. `Ok(None)` when it has no id;
    /// [`LedgerError::EventVanished`] when the id is unknown.
    pub async fn update_event(&self, patch: EventPatch) -> LedgerResult<Option<Event>> {
        let Some(id) = patch.id else {
            return Ok(None);
        };
        let mut event = self
            .store
            .find_event_by_id(id)
            .await?
            .ok_or(LedgerError::EventVanished(id))?;

        if let Some(name) = client_name(patch.client.as_ref()) {
            event.client_id = self.clients.get_or_create_by_name(name).await?.id;
        }
        if let Some(price) = patch.price {
            check_price(price)?;
            event.price = price;
        }
        if let Some(date) = patch.date {
            check_date(date)?;
            event.date = date;
        }
        if let Some(start_time) = patch.start_time {
            event.start_time = start_time;
        }
        if let Some(finish_time) = patch.finish_time {
            event.finish_time = finish_time;
        }
        if let Some(repeatable) = patch.repeatable {
            event.repeatable = repeatable;
        }
        check_times(event.start_time, event.finish_time)?;
        if event.status != EventStatus::Finished {
            event.status = EventStatus::Updated;
        }

        let saved = self.store.save_event(&event).await.map_err(|err| match err {
            StoreError::NotFound(_) => LedgerError::EventVanished(id),
            other => week_taken(other),
        })?;
        tracing::info!(event_id = id, status = saved.status.as_str(), "event updated");
        Ok(Some(saved))
    }
}
