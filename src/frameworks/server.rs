// Framework bootstrap for the zone server runtime.

use crate::domain::content::ZoneCatalog;
use crate::domain::tuning::enemy::EnemyTuning;
use crate::domain::tuning::progression::ProgressionTuning;
use crate::frameworks::config;
use crate::interface_adapters::clients::ledger::LedgerClient;
use crate::interface_adapters::net::{list_rooms_handler, ws_handler};
use crate::interface_adapters::state::AppState;
use crate::use_cases::{RoomRegistry, RoomSettings, SessionFactory, SessionSettings};

use axum::{Router, routing::get};
use std::net::SocketAddr;
use std::{io::Result, sync::Arc};

fn init_runtime() {
    let _ = dotenvy::dotenv();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let json = matches!(std::env::var("LOG_FORMAT").as_deref(), Ok("json"));
    if json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .json()
            .with_current_span(true)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .compact()
            .init();
    }

    std::panic::set_hook(Box::new(|info| {
        let backtrace = std::backtrace::Backtrace::capture();
        tracing::error!(%info, ?backtrace, "panic");
    }));
}

pub async fn run(listener: tokio::net::TcpListener) -> Result<()> {
    let address = listener.local_addr()?;
    let state = build_state().await?;
    let app = Router::new()
        .route("/ws", get(ws_handler))
        .route("/rooms", get(list_rooms_handler))
        .with_state(state);

    tracing::info!(%address, "listening");

    // Serve app and report errors rather than panicking
    axum::serve(listener, app).await.inspect_err(|e| {
        tracing::error!(error = %e, "server error");
    })
}

pub async fn run_with_config() -> Result<()> {
    init_runtime();

    let address = SocketAddr::from(([127, 0, 0, 1], config::http_port()));

    let listener = tokio::net::TcpListener::bind(address)
        .await
        .inspect_err(|e| {
            tracing::error!(%address, error = %e, "failed to bind");
        })?;

    run(listener).await
}

async fn build_state() -> Result<Arc<AppState>> {
    let ledger_base_url = config::ledger_service_url();
    let ledger_timeout = config::ledger_timeout();
    let ledger_client = LedgerClient::new(ledger_base_url.clone(), ledger_timeout)
        .map_err(|e| std::io::Error::other(format!("failed to initialize ledger client: {e}")))?;
    tracing::debug!(
        ledger_base_url = %ledger_base_url,
        ledger_timeout_ms = ledger_timeout.as_millis(),
        "ledger client configured"
    );
    let ledger: Arc<dyn crate::domain::ports::Ledger> = Arc::new(ledger_client);

    // Rooms are created lazily on the first join, so the registry starts
    // empty; it owns every zone session spawned afterwards.
    let factory = SessionFactory::with_builtin(
        SessionSettings {
            event_channel_capacity: config::EVENT_CHANNEL_CAPACITY,
            update_broadcast_capacity: config::UPDATE_BROADCAST_CAPACITY,
            frame_broadcast_capacity: config::FRAME_BROADCAST_CAPACITY,
            tick_interval: config::TICK_INTERVAL,
        },
        EnemyTuning::default(),
        ledger.clone(),
    );
    let room_registry = Arc::new(RoomRegistry::new(
        RoomSettings {
            party_ceiling: config::PARTY_CEILING,
            frame_broadcast_capacity: config::FRAME_BROADCAST_CAPACITY,
        },
        ZoneCatalog::builtin(),
        factory,
    ));

    Ok(Arc::new(AppState {
        room_registry,
        ledger,
        progression: ProgressionTuning::default(),
    }))
}
