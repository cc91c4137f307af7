//! Courtside Back binary entrypoint wiring the REST API, the lobby expiry
//! sweeper, and the storage supervisor.

use std::{env, net::SocketAddr, sync::Arc};

use anyhow::Context;
use axum::Router;
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod config;
mod dao;
mod dto;
mod error;
mod routes;
mod services;
mod state;

use config::AppConfig;
use dao::lobby_store::Backends;
use state::{AppState, SharedState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = AppConfig::load();
    let app_state = AppState::new(config);

    start_storage(app_state.clone()).await?;
    tokio::spawn(services::expiry::run_sweeper(app_state.clone()));

    // Build the HTTP router once the shared state is ready.
    let app = build_router(app_state);

    let port = env::var("PORT")
        .or_else(|_| env::var("SERVER_PORT"))
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(8080);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!(%addr, "starting server");

    let listener = TcpListener::bind(addr).await.context("binding server")?;
    let service = app.into_make_service();
    axum::serve(listener, service)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving axum")?;

    Ok(())
}

/// Start the storage backend named by `COURTSIDE_BACK_STORE`. The default is
/// `mongo` when that backend is compiled in and `memory` otherwise.
///
/// The MongoDB backend runs under the storage supervisor, which keeps the
/// application in degraded mode until a connection is established. The memory
/// backend is for local development: it is installed immediately and seeded
/// with one facility so lobbies can be created right away.
async fn start_storage(state: SharedState) -> anyhow::Result<()> {
    #[cfg(feature = "mongo-store")]
    const DEFAULT_STORE: &str = "mongo";
    #[cfg(not(feature = "mongo-store"))]
    const DEFAULT_STORE: &str = "memory";

    let backend = env::var("COURTSIDE_BACK_STORE").unwrap_or_else(|_| DEFAULT_STORE.into());

    match backend.as_str() {
        #[cfg(feature = "mongo-store")]
        "mongo" => {
            use dao::lobby_store::mongodb::{MongoConfig, MongoLobbyStore};

            tokio::spawn(services::storage_supervisor::run(state, || async {
                let config = MongoConfig::from_env().await?;
                let store = Arc::new(MongoLobbyStore::connect(config).await?);
                Ok(Backends {
                    lobbies: store.clone(),
                    facilities: store,
                })
            }));
        }
        "memory" => {
            use dao::lobby_store::{FacilityCatalog, memory::MemoryStore};
            use dao::models::{FacilityEntity, PriceEntity};
            use uuid::Uuid;

            let store = Arc::new(MemoryStore::new());
            let facility = FacilityEntity {
                id: Uuid::new_v4(),
                name: "Demo facility".to_owned(),
                hourly_price: PriceEntity {
                    amount_minor: 2_500,
                    currency: "EUR".to_owned(),
                },
            };
            let facility_id = facility.id;
            store
                .upsert_facility(facility)
                .await
                .context("seeding the demo facility")?;
            state
                .install_backends(Backends {
                    lobbies: store.clone(),
                    facilities: store,
                })
                .await;
            info!(%facility_id, "memory store ready with a demo facility");
        }
        #[cfg(feature = "mongo-store")]
        other => anyhow::bail!("unknown storage backend `{other}` (expected `mongo` or `memory`)"),
        #[cfg(not(feature = "mongo-store"))]
        other => anyhow::bail!("unknown storage backend `{other}` (expected `memory`)"),
    }

    Ok(())
}

/// Build the top-level router and attach cross-cutting middleware layers.
fn build_router(state: SharedState) -> Router<()> {
    routes::router(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

/// Configure tracing subscribers so logs include spans by default.
fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,tower_http=debug".into());
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Wait for Ctrl+C or SIGTERM and shut the server down gracefully.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let mut term = signal(SignalKind::terminate()).expect("install SIGTERM handler");
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {},
            _ = term.recv() => {},
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
