//! Client balance and lifecycle rules.
use super::{LedgerError, LedgerResult, check_money_scale};
use crate::model::{Client, ClientId, ClientStatus, NewClient};
use crate::store::{SharedStore, StoreError};
use rust_decimal::Decimal;

#[derive(Clone)]
pub struct ClientLedger {
    store: SharedStore,
}

impl ClientLedger {
    pub fn new(store: SharedStore) -> Self {
        Self { store }
    }

    async fn require(&self, id: ClientId) -> LedgerResult<Client> {
        self.store
            .find_client_by_id(id)
            .await?
            .ok_or_else(|| LedgerError::NotFound(format!("client {id}")))
    }

    async fn persist(&self, client: &Client) -> LedgerResult<Client> {
        match self.store.save_client(client).await {
            Ok(saved) => Ok(saved),
            Err(StoreError::NotFound(what)) => Err(LedgerError::NotFound(what)),
            Err(err) => Err(err.into()),
        }
    }

    /// Overwrites the client's balance with `amount`.
    pub async fn set_deposit(&self, id: ClientId, amount: Decimal) -> LedgerResult<Client> {
        check_money_scale(amount, "deposit")?;
        let mut client = self.require(id).await?;
        let previous = client.deposit;
        client.deposit = amount;
        let saved = self.persist(&client).await?;
        tracing::info!(client_id = id, %previous, deposit = %amount, "client deposit set");
        Ok(saved)
    }

    /// Marks the client archived and stops every series it owns from
    /// projecting further occurrences.
    pub async fn archive(&self, id: ClientId) -> LedgerResult<Client> {
        let mut client = self.require(id).await?;
        client.status = ClientStatus::Archived;
        let saved = self.persist(&client).await?;

        let mut disabled = 0usize;
        for mut event in self.store.events_by_client(id).await? {
            if !event.repeatable {
                continue;
            }
            event.repeatable = false;
            self.store.save_event(&event).await?;
            disabled += 1;
        }
        tracing::info!(client_id = id, disabled, "client archived");
        Ok(saved)
    }

    /// Exact-name lookup, creating an ACTIVE zero-balance client when absent.
    pub async fn get_or_create_by_name(&self, full_name: &str) -> LedgerResult<Client> {
        if let Some(client) = self.store.find_client_by_name(full_name).await? {
            return Ok(client);
        }
        match self.store.create_client(NewClient::named(full_name)).await {
            Ok(client) => {
                tracing::info!(client_id = client.id, "client created");
                Ok(client)
            }
            // A concurrent request created the same name first.
            Err(StoreError::Conflict(reason)) => self
                .store
                .find_client_by_name(full_name)
                .await?
                .ok_or(LedgerError::Store(StoreError::Conflict(reason))),
            Err(err) => Err(err.into()),
        }
    }

    /// ACTIVE clients ordered by full name.
    pub async fn list_active_clients(&self) -> LedgerResult<Vec<Client>> {
        let mut clients: Vec<Client> = self
            .store
            .all_clients()
            .await?
            .into_iter()
            .filter(Client::is_active)
            .collect();
        clients.sort_by(|a, b| a.full_name.cmp(&b.full_name));
        Ok(clients)
    }
}

/// "Not paid": the sum of negative balances.
pub fn sum_negative_deposits(clients: &[Client]) -> Decimal {
    clients
        .iter()
        .map(|client| client.deposit)
        .filter(|deposit| *deposit < Decimal::ZERO)
        .sum()
}

/// "Paid forward": the sum of positive balances.
pub fn sum_positive_deposits(clients: &[Client]) -> Decimal {
    clients
        .iter()
        .map(|client| client.deposit)
        .filter(|deposit| *deposit > Decimal::ZERO)
        .sum()
}
