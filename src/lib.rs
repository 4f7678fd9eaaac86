//! Pay-per-request API gate.
//!
//! HTTP routes that answer only after an x402 payment in USDC on Monad has been
//! settled through a remote facilitator. The settlement gate itself lives in
//! `agentpay-axum`; this crate holds the routes, their data provider and the
//! server plumbing.
//!
//! # Modules
//!
//! - [`config`] - CLI/environment configuration, validated at startup.
//! - [`endpoints`] - Discovery of the paid routes for `/api/endpoints`.
//! - [`handlers`] - The HTTP routes.
//! - [`rapidapi`] - Client for the Twitter profile provider.
//! - [`run`] - Server startup.
//! - [`util`] - Telemetry and signal handling.

pub mod config;
pub mod endpoints;
pub mod handlers;
pub mod rapidapi;
pub mod run;
pub mod util;
