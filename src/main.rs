mod chain;
mod commitment;
mod config;
mod deposit_matcher;
mod distribution;
mod error;
mod field;
mod hash;
mod lifecycle;
mod merkle;
mod persistence;
mod proof;
mod routes;
mod scheduler;
mod store;
mod types;
mod venue;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::http::{header, HeaderValue};
use axum::Router;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::chain::MockChain;
use crate::config::RelayConfig;
use crate::deposit_matcher::DepositMatcher;
use crate::lifecycle::BatchLifecycle;
use crate::proof::MockProver;
use crate::routes::AppState;
use crate::scheduler::Scheduler;
use crate::store::BatchStore;
use crate::venue::MockVenue;

type State = AppState<MockVenue, MockProver, MockChain>;

const SNAPSHOT_PATH_ENV: &str = "RELAY_SNAPSHOT_PATH";
const DEFAULT_SNAPSHOT_PATH: &str = "relay-snapshot.json";

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "privy_relay=info,tower_http=info".into()),
        )
        .init();

    let config = match RelayConfig::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("[privy-relay] configuration error: {e}");
            std::process::exit(1);
        }
    };

    if config.allowed_origins.is_empty() {
        if cfg!(debug_assertions) {
            warn!("RELAY_ALLOWED_ORIGINS not set — using permissive CORS (dev mode only)");
        } else {
            eprintln!("[privy-relay] FATAL: RELAY_ALLOWED_ORIGINS must be set in production builds");
            std::process::exit(1);
        }
    }

    info!(
        host = %config.host,
        port = config.port,
        max_batch_size = config.max_batch_size,
        batch_timeout_secs = config.batch_timeout_secs,
        origins = config.allowed_origins.len(),
        "starting privy-relay"
    );

    let snapshot_path =
        std::env::var(SNAPSHOT_PATH_ENV).unwrap_or_else(|_| DEFAULT_SNAPSHOT_PATH.to_string());

    let store = Arc::new(BatchStore::new());
    if let Err(e) = persistence::load(&store, &snapshot_path) {
        warn!(path = %snapshot_path, error = %e, "failed to load snapshot, starting fresh");
    }

    let venue = Arc::new(MockVenue::default());
    let prover = Arc::new(MockProver);
    let chain = Arc::new(MockChain::new("RelayCustodyAccount111111111111111111111"));

    let lifecycle = Arc::new(BatchLifecycle::new(
        store.clone(),
        config.clone(),
        venue,
        prover,
        chain.clone(),
    ));

    let deposit_matcher = Arc::new(DepositMatcher::new(lifecycle.clone(), chain, config.clone()));
    let scheduler = Arc::new(Scheduler::new(lifecycle.clone(), config.clone(), snapshot_path.clone()));

    deposit_matcher.clone().spawn();
    scheduler.clone().spawn();

    let cors = if config.allowed_origins.is_empty() {
        CorsLayer::permissive()
    } else {
        let origins: Vec<_> = config
            .allowed_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        CorsLayer::new()
            .allow_origin(AllowOrigin::list(origins))
            .allow_methods([axum::http::Method::GET, axum::http::Method::POST])
            .allow_headers([header::CONTENT_TYPE])
    };

    let state = Arc::new(AppState {
        lifecycle,
        deposit_matcher,
        scheduler,
        config: config.clone(),
    });

    let app: Router = Router::new()
        .route("/health", axum::routing::get(routes::health))
        .route("/status", axum::routing::get(routes::status::<MockVenue, MockProver, MockChain>))
        .route("/deposit-address", axum::routing::get(routes::deposit_address::<MockVenue, MockProver, MockChain>))
        .route("/order", axum::routing::post(routes::submit_order::<MockVenue, MockProver, MockChain>))
        .route("/order/encrypted", axum::routing::post(routes::submit_encrypted::<MockVenue, MockProver, MockChain>))
        .route("/order/{id}", axum::routing::get(routes::get_order::<MockVenue, MockProver, MockChain>))
        .route("/order/{id}/activate", axum::routing::post(routes::activate_order::<MockVenue, MockProver, MockChain>))
        .route("/batch/{id}", axum::routing::get(routes::get_batch::<MockVenue, MockProver, MockChain>))
        .route("/batches", axum::routing::get(routes::list_batches::<MockVenue, MockProver, MockChain>))
        .route("/batches/ready", axum::routing::get(routes::list_ready_batches::<MockVenue, MockProver, MockChain>))
        .route("/batch/{id}/execute", axum::routing::post(routes::execute_batch::<MockVenue, MockProver, MockChain>))
        .route("/execute-ready", axum::routing::post(routes::execute_ready::<MockVenue, MockProver, MockChain>))
        .route("/batch/{id}/proof", axum::routing::get(routes::get_proof::<MockVenue, MockProver, MockChain>))
        .route("/deposits/unmatched", axum::routing::get(routes::list_unmatched::<MockVenue, MockProver, MockChain>))
        .route("/deposits/match", axum::routing::post(routes::match_deposit::<MockVenue, MockProver, MockChain>))
        .route("/deposits/refund", axum::routing::post(routes::refund_deposit::<MockVenue, MockProver, MockChain>))
        .layer(RequestBodyLimitLayer::new(100 * 1024))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .layer(SetResponseHeaderLayer::overriding(
            header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::X_FRAME_OPTIONS,
            HeaderValue::from_static("DENY"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            "Referrer-Policy".parse::<header::HeaderName>().unwrap(),
            HeaderValue::from_static("no-referrer"),
        ))
        .with_state(state.clone());

    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .expect("invalid listen address");

    info!(addr = %addr, "privy-relay listening");

    let listener = tokio::net::TcpListener::bind(addr).await.expect("failed to bind");

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal(state, snapshot_path))
        .await
        .expect("server error");

    info!("privy-relay shut down");
}

async fn shutdown_signal(state: Arc<State>, snapshot_path: String) {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to listen for ctrl+c");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to listen for SIGTERM")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received SIGINT, shutting down"),
        _ = terminate => info!("received SIGTERM, shutting down"),
    }

    if let Err(e) = persistence::save(state.lifecycle.store(), &snapshot_path) {
        warn!(path = %snapshot_path, error = %e, "failed to persist snapshot on shutdown");
    }
}
