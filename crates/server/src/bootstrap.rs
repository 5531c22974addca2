use std::{sync::Arc, time::Duration};

use scrapbook_core::config::{AppConfig, StorageBackend, StorageConfig};
use scrapbook_db::{
    connect_with_settings, migrations, InMemoryScrapStore, ScrapStore, SqlScrapStore,
};
use scrapbook_flock::{
    client::{FlockApiError, FlockClient},
    events::scrapbook_dispatcher,
    message::MessageRenderer,
    token::EventTokenVerifier,
};
use thiserror::Error;
use tracing::info;

use crate::{
    routes::AppState,
    templates::{self, TemplateError},
};

pub struct Application {
    pub config: AppConfig,
    pub state: AppState,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
    #[error(transparent)]
    Templates(#[from] TemplateError),
    #[error("flock api client could not be built: {0}")]
    FlockClient(#[from] FlockApiError),
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );

    let store = open_store(&config.storage).await?;
    let templates = Arc::new(templates::load(config.templates.dir.as_deref())?);

    let client = FlockClient::new(
        config.flock.api_base_url.clone(),
        Duration::from_secs(config.flock.request_timeout_secs),
    )?;
    let renderer = MessageRenderer::new(Arc::clone(&templates), config.widget_url());
    let dispatcher = scrapbook_dispatcher(Arc::clone(&store), Arc::new(client), renderer);
    let verifier =
        EventTokenVerifier::new(config.flock.app_id.clone(), config.flock.app_secret.clone());

    info!(
        event_name = "system.bootstrap.ready",
        correlation_id = "bootstrap",
        store_backend = store.backend_name(),
        widget_url = %config.widget_url(),
        handler_count = dispatcher.handler_count(),
        "application bootstrap complete"
    );

    let state = AppState {
        store,
        dispatcher: Arc::new(dispatcher),
        verifier: Arc::new(verifier),
        templates,
    };
    Ok(Application { config, state })
}

async fn open_store(storage: &StorageConfig) -> Result<Arc<dyn ScrapStore>, BootstrapError> {
    match storage.backend {
        StorageBackend::Memory => {
            info!(
                event_name = "system.bootstrap.store_selected",
                correlation_id = "bootstrap",
                store_backend = "memory",
                "scraps are kept in memory and lost on restart"
            );
            Ok(Arc::new(InMemoryScrapStore::new()))
        }
        StorageBackend::Sqlite => {
            let pool = connect_with_settings(
                &storage.database_url,
                storage.max_connections,
                storage.timeout_secs,
            )
            .await
            .map_err(BootstrapError::DatabaseConnect)?;
            info!(
                event_name = "system.bootstrap.database_connected",
                correlation_id = "bootstrap",
                "database connection established"
            );

            migrations::run_pending(&pool).await.map_err(BootstrapError::Migration)?;
            info!(
                event_name = "system.bootstrap.migrations_applied",
                correlation_id = "bootstrap",
                "database migrations applied"
            );

            Ok(Arc::new(SqlScrapStore::new(pool)))
        }
    }
}
