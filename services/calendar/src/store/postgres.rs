//! Postgres-backed implementation of the ledger store.
//!
//! # What this module is
//! Implements `LedgerStore` on Postgres via `sqlx`, as the durable backend for
//! clients and events.
//!
//! # Key invariants
//! - `events.root_id IS NULL` marks a root; occurrences reference their root.
//! - `events.week_start` always holds the Monday of the ISO week of `date`. It
//!   is computed here on every insert and update, never by callers.
//! - A partial unique index on `(root_id, week_start)` makes "one occurrence per
//!   root per week" a database guarantee; occurrence inserts use
//!   `ON CONFLICT DO NOTHING` and fall back to reading the existing row.
//!
//! # Security model / threat assumptions
//! - Database URLs may contain credentials; avoid logging them.
//! - All statements are static SQL with bound parameters.
//!
//! # Operational notes
//! - Migrations are executed at startup via `sqlx::migrate!("./migrations")` so
//!   handlers can assume the schema exists.
//! - Pool sizing and acquire timeouts come from `PostgresConfig`.
use super::{LedgerStore, OccurrenceInsert, StoreError, StoreResult};
use crate::config::PostgresConfig;
use crate::observability::CLIENTS_TOTAL;
use crate::model::{
    Client, ClientId, ClientStatus, DateWindow, Event, EventId, EventOrigin, EventStatus,
    NewClient, NewEvent,
};
use anyhow::anyhow;
use async_trait::async_trait;
use chrono::{NaiveDate, NaiveTime};
use rust_decimal::Decimal;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::{FromRow, PgPool};
use std::str::FromStr;
use std::time::Duration;

const CLIENT_COLUMNS: &str = "id, full_name, deposit, status";
const EVENT_COLUMNS: &str =
    "id, client_id, price, date, start_time, finish_time, repeatable, status, root_id";

/// Durable ledger store backed by Postgres.
///
/// # Errors
/// Connection and query failures surface as [`StoreError`]: unique violations
/// map to `Conflict`, missing rows and broken foreign keys to `NotFound`.
///
/// # Example
/// ```rust,no_run
/// use calendar::config::PostgresConfig;
/// use calendar::store::postgres::PostgresStore;
///
/// async fn open(pg: PostgresConfig) {
///     let _ = PostgresStore::connect(&pg).await;
/// }
/// ```
pub struct PostgresStore {
    pool: PgPool,
}

/// Row shape for the `clients` table.
#[derive(Debug, Clone, FromRow)]
struct DbClient {
    id: i64,
    full_name: String,
    deposit: Decimal,
    status: String,
}

/// Row shape for the `events` table (without the derived `week_start`).
#[derive(Debug, Clone, FromRow)]
struct DbEvent {
    id: i64,
    client_id: i64,
    price: Decimal,
    date: NaiveDate,
    start_time: NaiveTime,
    finish_time: NaiveTime,
    repeatable: bool,
    status: String,
    root_id: Option<i64>,
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        if matches!(err, sqlx::Error::RowNotFound) {
            return StoreError::NotFound("row".into());
        }
        if is_unique_violation(&err) {
            return StoreError::Conflict(err.to_string());
        }
        if is_foreign_key_violation(&err) {
            return StoreError::NotFound(err.to_string());
        }
        StoreError::Unexpected(err.into())
    }
}

impl From<sqlx::migrate::MigrateError> for StoreError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        StoreError::Unexpected(err.into())
    }
}

impl PostgresStore {
    /// Connect to Postgres and apply embedded migrations.
    ///
    /// # Errors
    /// - Connection, migration, or pool setup failures.
    /// - `connect_timeout_ms` elapsing before the first connection is made.
    pub async fn connect(pg: &PostgresConfig) -> StoreResult<Self> {
        let connect_options = PgConnectOptions::from_str(&pg.url)?;
        let connect = PgPoolOptions::new()
            .max_connections(pg.max_connections)
            .acquire_timeout(Duration::from_millis(pg.acquire_timeout_ms))
            .connect_with(connect_options);
        let pool = tokio::time::timeout(Duration::from_millis(pg.connect_timeout_ms), connect)
            .await
            .map_err(|_| StoreError::Unexpected(anyhow!("postgres connect timed out")))??;

        sqlx::migrate!("./migrations").run(&pool).await?;
        let store = Self { pool };
        store.refresh_counts().await?;
        Ok(store)
    }

    /// Wrap an existing pool. The schema must already be migrated.
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn refresh_counts(&self) -> StoreResult<()> {
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM clients")
            .fetch_one(&self.pool)
            .await?;
        metrics::gauge!(CLIENTS_TOTAL).set(total as f64);
        Ok(())
    }

    async fn fetch_events(&self, sql: &str) -> StoreResult<Vec<Event>> {
        sqlx::query_as::<_, DbEvent>(sql)
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(event_from_db)
            .collect()
    }
}

#[async_trait]
impl LedgerStore for PostgresStore {
    async fn find_client_by_id(&self, id: ClientId) -> StoreResult<Option<Client>> {
        let row = sqlx::query_as::<_, DbClient>(&format!(
            "SELECT {CLIENT_COLUMNS} FROM clients WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(client_from_db).transpose()
    }

    async fn find_client_by_name(&self, full_name: &str) -> StoreResult<Option<Client>> {
        let row = sqlx::query_as::<_, DbClient>(&format!(
            "SELECT {CLIENT_COLUMNS} FROM clients WHERE full_name = $1"
        ))
        .bind(full_name)
        .fetch_optional(&self.pool)
        .await?;
        row.map(client_from_db).transpose()
    }

    async fn create_client(&self, client: NewClient) -> StoreResult<Client> {
        let row = sqlx::query_as::<_, DbClient>(&format!(
            "INSERT INTO clients (full_name, deposit, status) VALUES ($1, $2, $3) \
             RETURNING {CLIENT_COLUMNS}"
        ))
        .bind(&client.full_name)
        .bind(client.deposit)
        .bind(client.status.as_str())
        .fetch_one(&self.pool)
        .await;
        let row = match row {
            Ok(row) => row,
            Err(err) if is_unique_violation(&err) => {
                return Err(StoreError::Conflict("client name exists".into()));
            }
            Err(err) => return Err(err.into()),
        };
        self.refresh_counts().await?;
        client_from_db(row)
    }

    async fn save_client(&self, client: &Client) -> StoreResult<Client> {
        let row = sqlx::query_as::<_, DbClient>(&format!(
            "UPDATE clients SET full_name = $2, deposit = $3, status = $4 WHERE id = $1 \
             RETURNING {CLIENT_COLUMNS}"
        ))
        .bind(client.id)
        .bind(&client.full_name)
        .bind(client.deposit)
        .bind(client.status.as_str())
        .fetch_optional(&self.pool)
        .await?;
        match row {
            Some(row) => client_from_db(row),
            None => Err(StoreError::NotFound(format!("client {}", client.id))),
        }
    }

    async fn all_clients(&self) -> StoreResult<Vec<Client>> {
        sqlx::query_as::<_, DbClient>(&format!(
            "SELECT {CLIENT_COLUMNS} FROM clients ORDER BY id"
        ))
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(client_from_db)
        .collect()
    }

    async fn client_exists(&self, id: ClientId) -> StoreResult<bool> {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM clients WHERE id = $1)")
                .bind(id)
                .fetch_one(&self.pool)
                .await?;
        Ok(exists)
    }

    async fn find_event_by_id(&self, id: EventId) -> StoreResult<Option<Event>> {
        let row = sqlx::query_as::<_, DbEvent>(&format!(
            "SELECT {EVENT_COLUMNS} FROM events WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(event_from_db).transpose()
    }

    async fn create_event(&self, event: NewEvent) -> StoreResult<Event> {
        let row = sqlx::query_as::<_, DbEvent>(&format!(
            "INSERT INTO events \
             (client_id, price, date, start_time, finish_time, repeatable, status, root_id, week_start) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) \
             RETURNING {EVENT_COLUMNS}"
        ))
        .bind(event.client_id)
        .bind(event.price)
        .bind(event.date)
        .bind(event.start_time)
        .bind(event.finish_time)
        .bind(event.repeatable)
        .bind(event.status.as_str())
        .bind(event.root_id)
        .bind(week_start(event.date))
        .fetch_one(&self.pool)
        .await?;
        event_from_db(row)
    }

    async fn save_event(&self, event: &Event) -> StoreResult<Event> {
        let row = sqlx::query_as::<_, DbEvent>(&format!(
            "UPDATE events SET client_id = $2, price = $3, date = $4, start_time = $5, \
             finish_time = $6, repeatable = $7, status = $8, root_id = $9, week_start = $10 \
             WHERE id = $1 RETURNING {EVENT_COLUMNS}"
        ))
        .bind(event.id)
        .bind(event.client_id)
        .bind(event.price)
        .bind(event.date)
        .bind(event.start_time)
        .bind(event.finish_time)
        .bind(event.repeatable)
        .bind(event.status.as_str())
        .bind(event.root_id())
        .bind(week_start(event.date))
        .fetch_optional(&self.pool)
        .await?;
        match row {
            Some(row) => event_from_db(row),
            None => Err(StoreError::NotFound(format!("event {}", event.id))),
        }
    }

    async fn all_events(&self) -> StoreResult<Vec<Event>> {
        self.fetch_events(&format!(
            "SELECT {EVENT_COLUMNS} FROM events ORDER BY date, start_time, id"
        ))
        .await
    }

    async fn events_by_client(&self, client_id: ClientId) -> StoreResult<Vec<Event>> {
        sqlx::query_as::<_, DbEvent>(&format!(
            "SELECT {EVENT_COLUMNS} FROM events WHERE client_id = $1 \
             ORDER BY date, start_time, id"
        ))
        .bind(client_id)
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(event_from_db)
        .collect()
    }

    async fn events_in_date_range(
        &self,
        from: NaiveDate,
        to: NaiveDate,
    ) -> StoreResult<Vec<Event>> {
        sqlx::query_as::<_, DbEvent>(&format!(
            "SELECT {EVENT_COLUMNS} FROM events WHERE date BETWEEN $1 AND $2 \
             ORDER BY date, start_time, id"
        ))
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(event_from_db)
        .collect()
    }

    async fn root_events(&self) -> StoreResult<Vec<Event>> {
        self.fetch_events(&format!(
            "SELECT {EVENT_COLUMNS} FROM events WHERE root_id IS NULL \
             ORDER BY date, start_time, id"
        ))
        .await
    }

    async fn find_occurrence(
        &self,
        root_id: EventId,
        week: DateWindow,
    ) -> StoreResult<Option<Event>> {
        let row = sqlx::query_as::<_, DbEvent>(&format!(
            "SELECT {EVENT_COLUMNS} FROM events \
             WHERE root_id = $1 AND date BETWEEN $2 AND $3 ORDER BY id LIMIT 1"
        ))
        .bind(root_id)
        .bind(week.start)
        .bind(week.end)
        .fetch_optional(&self.pool)
        .await?;
        row.map(event_from_db).transpose()
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
        let inserted = sqlx::query_as::<_, DbEvent>(&format!(
            "INSERT INTO events \
             (client_id, price, date, start_time, finish_time, repeatable, status, root_id, week_start) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) \
             ON CONFLICT (root_id, week_start) WHERE root_id IS NOT NULL DO NOTHING \
             RETURNING {EVENT_COLUMNS}"
        ))
        .bind(event.client_id)
        .bind(event.price)
        .bind(event.date)
        .bind(event.start_time)
        .bind(event.finish_time)
        .bind(event.repeatable)
        .bind(event.status.as_str())
        .bind(root_id)
        .bind(week.start)
        .fetch_optional(&self.pool)
        .await?;
        if let Some(row) = inserted {
            return Ok(OccurrenceInsert::Created(event_from_db(row)?));
        }
        // Lost the race: the conflicting row is committed and visible now.
        match self.find_occurrence(root_id, week).await? {
            Some(existing) => Ok(OccurrenceInsert::Existing(existing)),
            None => Err(StoreError::Unexpected(anyhow!(
                "occurrence of {root_id} conflicted but was not found"
            ))),
        }
    }

    async fn health_check(&self) -> StoreResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    fn is_durable(&self) -> bool {
        true
    }

    fn backend_name(&self) -> &'static str {
        "postgres"
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    database_code(err).as_deref() == Some("23505")
}

fn is_foreign_key_violation(err: &sqlx::Error) -> bool {
    database_code(err).as_deref() == Some("23503")
}

fn database_code(err: &sqlx::Error) -> Option<String> {
    if let sqlx::Error::Database(db_err) = err {
        return db_err.code().map(|code| code.into_owned());
    }
    None
}

fn week_start(date: NaiveDate) -> NaiveDate {
    DateWindow::week_of(date).start
}

fn client_from_db(row: DbClient) -> StoreResult<Client> {
    Ok(Client {
        id: row.id,
        full_name: row.full_name,
        deposit: row.deposit,
        status: parse_client_status(&row.status)?,
    })
}

fn event_from_db(row: DbEvent) -> StoreResult<Event> {
    let origin = match row.root_id {
        Some(root_id) => EventOrigin::Occurrence { root_id },
        None => EventOrigin::Root,
    };
    Ok(Event {
        id: row.id,
        client_id: row.client_id,
        price: row.price,
        date: row.date,
        start_time: row.start_time,
        finish_time: row.finish_time,
        repeatable: row.repeatable,
        status: parse_event_status(&row.status)?,
        origin,
    })
}

fn parse_client_status(value: &str) -> StoreResult<ClientStatus> {
    ClientStatus::parse(value)
        .ok_or_else(|| StoreError::Unexpected(anyhow!("unknown client status: {value}")))
}

fn parse_event_status(value: &str) -> StoreResult<EventStatus> {
    EventStatus::parse(value)
        .ok_or_else(|| StoreError::Unexpected(anyhow!("unknown event status: {value}")))
}
