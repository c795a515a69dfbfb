//! MedGate server: process entry point.
//!
//! Wires the access mediator to the in-memory stores and waits for a
//! shutdown signal. Transport layers attach to the mediator from here.

use medgate_access::config::ENV_ENCRYPTION_KEY;
use medgate_access::{AccessConfig, AccessMediator};
use medgate_db::repository::{
    InMemoryAuditLogRepository, InMemoryConsentRepository, InMemoryRecordStore,
};
use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "medgate_server=info,medgate_access=info,medgate_db=warn";

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER)),
        )
        .json()
        .init();

    tracing::info!("Starting MedGate server...");

    let config = match AccessConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, var = ENV_ENCRYPTION_KEY, "Failed to load configuration");
            std::process::exit(1);
        }
    };

    let mediator = match AccessMediator::new(
        &config,
        InMemoryConsentRepository::new(),
        InMemoryAuditLogRepository::new(),
        InMemoryRecordStore::new(),
    ) {
        Ok(mediator) => mediator,
        Err(e) => {
            tracing::error!(error = %e, "Refusing to start without a valid field encryption key");
            std::process::exit(1);
        }
    };

    tracing::info!(
        entity_types = ?mediator.schema().entity_types().collect::<Vec<_>>(),
        consent_requirements = ?config.consent_requirements,
        "Access mediator ready"
    );

    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
    }

    match mediator.audit().verify_integrity().await {
        Ok(()) => tracing::info!("Audit chain verified"),
        Err(e) => tracing::error!(error = %e, "Audit chain verification failed"),
    }

    tracing::info!("MedGate server stopped.");
}
