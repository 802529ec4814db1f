//! Tutoring calendar HTTP service entry point.
//!
//! # Purpose
//! Wires configuration, storage and the ledger, then serves the HTTP API and
//! the metrics endpoint while the finalization job runs on its hourly timer.
use anyhow::Context;
use calendar::app::{AppState, build_router};
use calendar::config::{CalendarConfig, StorageBackend};
use calendar::ledger::Calendar;
use calendar::observability;
use calendar::scheduler::spawn_finalization_task;
use calendar::store::SharedStore;
use calendar::store::memory::InMemoryStore;
use calendar::store::postgres::PostgresStore;
use std::future::Future;
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = CalendarConfig::from_env_or_yaml().context("calendar config")?;
    run_with_shutdown(config, async {
        let _ = tokio::signal::ctrl_c().await;
    })
    .await
}

async fn run_with_shutdown<F>(config: CalendarConfig, shutdown: F) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let metrics_handle = observability::init_observability("calendar")?;
    let state = build_state(&config).await?;
    let metrics_task = tokio::spawn(observability::serve_metrics(
        metrics_handle,
        config.metrics_bind,
    ));
    let finalization_task = config.finalization.enabled.then(|| {
        tracing::info!(
            minute = config.finalization.minute,
            "finalization job scheduled hourly"
        );
        spawn_finalization_task(
            state.calendar.finalization().clone(),
            config.finalization.minute,
        )
    });

    let app = build_router(state.clone());
    let addr = config.bind_addr;
    tracing::info!(
        %addr,
        backend = state.calendar.store().backend_name(),
        "calendar listening"
    );
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tokio::pin!(shutdown);
    tokio::select! {
        result = axum::serve(listener, app.into_make_service()) => {
            result?;
        }
        _ = &mut shutdown => {}
    }

    metrics_task.abort();
    if let Some(task) = &finalization_task {
        task.abort();
    }
    let _ = metrics_task.await;
    if let Some(task) = finalization_task {
        let _ = task.await;
    }
    Ok(())
}

async fn build_state(config: &CalendarConfig) -> anyhow::Result<AppState> {
    let store: SharedStore = match config.storage {
        StorageBackend::Memory => Arc::new(InMemoryStore::new()),
        StorageBackend::Postgres => {
            let pg = config
                .postgres
                .as_ref()
                .context("postgres configuration missing")?;
            Arc::new(PostgresStore::connect(pg).await?)
        }
    };
    Ok(AppState {
        calendar: Calendar::new(store),
    })
}
