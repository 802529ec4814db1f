//! Realized vs. projected income over week and month windows.
//!
//! "Current" income counts events dated strictly before today, "expected"
//! counts every event in the window. Both sum prices regardless of status.
use super::LedgerResult;
use crate::model::{DateWindow, Event};
use crate::store::SharedStore;
use chrono::NaiveDate;
use rust_decimal::Decimal;

/// Price sum of the events dated strictly before `today`.
pub fn realized_sum(events: &[Event], today: NaiveDate) -> Decimal {
    events
        .iter()
        .filter(|event| event.date < today)
        .map(|event| event.price)
        .sum()
}

/// Price sum of every event.
pub fn total_sum(events: &[Event]) -> Decimal {
    events.iter().map(|event| event.price).sum()
}

/// `events` are the events of one materialized week.
pub fn current_income_for_week(events: &[Event], today: NaiveDate) -> Decimal {
    realized_sum(events, today)
}

pub fn expected_income_for_week(events: &[Event]) -> Decimal {
    total_sum(events)
}

/// Month figures read straight from the store. Occurrences of weeks nobody
/// has viewed yet do not exist and are not counted.
#[derive(Clone)]
pub struct IncomeCalculator {
    store: SharedStore,
}

impl IncomeCalculator {
    pub fn new(store: SharedStore) -> Self {
        Self { store }
    }

    async fn month_events(&self, date: NaiveDate) -> LedgerResult<Vec<Event>> {
        let month = DateWindow::month_of(date);
        Ok(self
            .store
            .events_in_date_range(month.start, month.end)
            .await?)
    }

    pub async fn current_income_for_month(
        &self,
        date: NaiveDate,
        today: NaiveDate,
    ) -> LedgerResult<Decimal> {
        let events = self.month_events(date).await?;
        Ok(realized_sum(&events, today))
    }

    pub async fn expected_income_for_month(&self, date: NaiveDate) -> LedgerResult<Decimal> {
        let events = self.month_events(date).await?;
        Ok(total_sum(&events))
    }
}
