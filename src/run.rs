//! Server startup.

use agentpay_axum::facilitator_client::FacilitatorClient;
use agentpay_axum::gate::SettlementGate;
use agentpay_types::util::MoneyAmount;
use axum::Router;
use axum::http::Method;
use dotenvy::dotenv;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors;

use crate::config::Config;
use crate::endpoints::EndpointCatalog;
use crate::handlers::{self, AppState};
use crate::rapidapi::RapidApiClient;
use crate::util::{SigDown, Telemetry};

/// Price of every paid route.
pub const ROUTE_PRICE: &str = "$0.0001";

/// Initializes the agentpay server.
///
/// - Loads `.env` variables.
/// - Initializes logging, and OpenTelemetry export when configured.
/// - Validates configuration and builds the facilitator client.
/// - Serves the paid routes until SIGTERM/SIGINT.
pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();

    let telemetry = Telemetry::new()
        .with_name(env!("CARGO_PKG_NAME"))
        .with_version(env!("CARGO_PKG_VERSION"))
        .register();

    let config = Config::load()?;

    let mut facilitator = FacilitatorClient::try_from(config.facilitator_url())?.with_auth(
        config.secret_key(),
        config.server_wallet(),
        config.facilitator_auth().clone(),
    )?;
    if let Some(timeout) = config.facilitator_timeout() {
        facilitator = facilitator.with_timeout(timeout);
    }
    tracing::info!(
        facilitator = %facilitator.base_url(),
        auth = config.facilitator_auth().kind(),
        server_wallet = %config.server_wallet(),
        "Facilitator configured"
    );

    let provider = match config.rapidapi_key() {
        Some(key) => Some(RapidApiClient::new(config.rapidapi_url().clone(), key)),
        None => {
            tracing::warn!("RAPIDAPI_KEY is not set, /api/twitter is disabled");
            None
        }
    };

    let state = Arc::new(AppState {
        gate: SettlementGate::new(
            facilitator,
            config.server_wallet(),
            config.public_url().clone(),
            MoneyAmount::parse(ROUTE_PRICE)?,
        ),
        provider,
        endpoints: EndpointCatalog::new(config.api_routes_dir()),
    });

    let http_endpoints = Router::new()
        .merge(handlers::routes().with_state(state))
        .layer(telemetry.http_tracing())
        .layer(
            cors::CorsLayer::new()
                .allow_origin(cors::Any)
                .allow_methods([Method::GET, Method::POST])
                .allow_headers(cors::Any),
        );

    let addr = SocketAddr::new(config.host(), config.port());
    tracing::info!("Starting server at http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .inspect_err(|e| tracing::error!("Failed to bind to {}: {}", addr, e))?;

    let sig_down = SigDown::try_new()?;
    axum::serve(listener, http_endpoints)
        .with_graceful_shutdown(async move { sig_down.recv().await })
        .await?;

    Ok(())
}
