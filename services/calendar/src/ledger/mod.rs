//! Ledger engine: recurrence materialization, finalization, income and client
//! balance rules, exposed through the [`Calendar`] facade.
//!
//! # Key invariants
//! - Occurrences are created lazily, at most once per (root, week).
//! - A client's deposit only moves through [`ClientLedger::set_deposit`] or a
//!   finalization charge.
//! - `Finished` is reached only through [`FinalizationJob`].
pub mod clients;
pub mod events;
pub mod finalization;
pub mod income;
pub mod recurrence;

use crate::model::{Client, ClientId, DateWindow, Event, EventDraft, EventId, EventPatch};
use crate::store::{SharedStore, StoreError};
use chrono::{NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;
use std::sync::Arc;
use thiserror::Error;

pub use clients::{ClientLedger, sum_negative_deposits, sum_positive_deposits};
pub use events::EventCommands;
pub use finalization::{FinalizationJob, FinalizationReport};
pub use income::IncomeCalculator;
pub use recurrence::RecurrenceEngine;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("{0} not found")]
    NotFound(String),
    #[error("validation failed: {0}")]
    Validation(String),
    /// An update named an event id the store does not know.
    #[error("event not found")]
    EventVanished(EventId),
    #[error(transparent)]
    Store(#[from] StoreError),
}

pub type LedgerResult<T> = Result<T, LedgerError>;

/// Fractional digits kept for prices and deposits by every store.
pub const MONEY_SCALE: u32 = 2;

fn check_money_scale(amount: Decimal, field: &str) -> LedgerResult<()> {
    if amount.normalize().scale() > MONEY_SCALE {
        return Err(LedgerError::Validation(format!(
            "{field} must have at most {MONEY_SCALE} decimal places"
        )));
    }
    Ok(())
}

/// Events of one ISO week together with week and month income figures.
#[derive(Debug, Clone, PartialEq)]
pub struct WeekView {
    pub week: DateWindow,
    pub events: Vec<Event>,
    pub current_week_income: Decimal,
    pub expected_week_income: Decimal,
    pub current_month_income: Decimal,
    pub expected_month_income: Decimal,
}

/// Active clients with the aggregate balance split.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientSummary {
    pub clients: Vec<Client>,
    /// Sum of negative balances (owed to the tutor), itself negative or zero.
    pub not_paid: Decimal,
    /// Sum of positive balances (prepaid credit).
    pub paid_forward: Decimal,
}

/// Boundary operations over a shared store.
#[derive(Clone)]
pub struct Calendar {
    store: SharedStore,
    clients: ClientLedger,
    events: EventCommands,
    recurrence: Arc<RecurrenceEngine>,
    income: IncomeCalculator,
    finalization: FinalizationJob,
}

impl Calendar {
    pub fn new(store: SharedStore) -> Self {
        let clients = ClientLedger::new(store.clone());
        Self {
            events: EventCommands::new(store.clone(), clients.clone()),
            recurrence: Arc::new(RecurrenceEngine::new(store.clone())),
            income: IncomeCalculator::new(store.clone()),
            finalization: FinalizationJob::new(store.clone()),
            clients,
            store,
        }
    }

    pub fn store(&self) -> &SharedStore {
        &self.store
    }

    pub fn finalization(&self) -> &FinalizationJob {
        &self.finalization
    }

    pub async fn client_summary(&self) -> LedgerResult<ClientSummary> {
        let clients = self.clients.list_active_clients().await?;
        Ok(ClientSummary {
            not_paid: sum_negative_deposits(&clients),
            paid_forward: sum_positive_deposits(&clients),
            clients,
        })
    }

    /// `Ok(false)` when the client does not exist.
    pub async fn set_client_deposit(&self, id: ClientId, amount: Decimal) -> LedgerResult<bool> {
        declined_when_missing(self.clients.set_deposit(id, amount).await)
    }

    /// `Ok(false)` when the client does not exist.
    pub async fn archive_client(&self, id: ClientId) -> LedgerResult<bool> {
        declined_when_missing(self.clients.archive(id).await)
    }

    pub async fn list_all_events(&self) -> LedgerResult<Vec<Event>> {
        Ok(self.store.all_events().await?)
    }

    pub async fn list_all_clients(&self) -> LedgerResult<Vec<Client>> {
        Ok(self.store.all_clients().await?)
    }

    /// Week view for the ISO week containing `date`, relative to local time.
    pub async fn get_week(&self, date: NaiveDate) -> LedgerResult<WeekView> {
        self.get_week_at(date, chrono::Local::now().naive_local()).await
    }

    pub async fn get_week_at(
        &self,
        date: NaiveDate,
        now: NaiveDateTime,
    ) -> LedgerResult<WeekView> {
        let week = DateWindow::checked_week_of(date)
            .ok_or_else(|| LedgerError::Validation(format!("week of {date} is out of range")))?;
        let today = now.date();
        let events = self.recurrence.ensure_week_materialized(date).await?;
        let current_week_income = income::current_income_for_week(&events, today);
        let expected_week_income = income::expected_income_for_week(&events);
        let current_month_income = self.income.current_income_for_month(date, today).await?;
        let expected_month_income = self.income.expected_income_for_month(date).await?;
        tracing::debug!(
            week_start = %week.start,
            events = events.len(),
            %current_week_income,
            %expected_week_income,
            %current_month_income,
            %expected_month_income,
            "week view computed"
        );
        Ok(WeekView {
            week,
            events,
            current_week_income,
            expected_week_income,
            current_month_income,
            expected_month_income,
        })
    }

    pub async fn create_event(&self, draft: EventDraft) -> LedgerResult<Event> {
        self.events.create_event(draft).await
    }

    /// `Ok(None)` when the patch carries no id.
    pub async fn update_event(&self, patch: EventPatch) -> LedgerResult<Option<Event>> {
        self.events.update_event(patch).await
    }
}

fn declined_when_missing(result: LedgerResult<Client>) -> LedgerResult<bool> {
    match result {
        Ok(_) => Ok(true),
        Err(LedgerError::NotFound(_)) => Ok(false),
        Err(err) => Err(err),
    }
}
