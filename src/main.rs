//! agentpay HTTP entrypoint.
//!
//! Serves pay-per-request API routes. Each paid request carries an x402 payment
//! token in `X-PAYMENT`, which is settled in USDC on Monad through a remote
//! facilitator before the route answers.
//!
//! Endpoints:
//! - `GET /api/premium?network={dev|main}` – Paid greeting with the settlement receipt
//! - `POST /api/twitter` – Paid Twitter profile lookup
//! - `GET /api/endpoints` – List of paid routes
//!
//! Environment:
//! - `.env` values loaded at startup
//! - `HOST`, `PORT` control binding address
//! - `SECRET_KEY`, `SERVER_WALLET` and one facilitator credential are required
//! - `OTEL_*` variables enable trace and metric export

use std::process;

use agentpay::run::run;

#[tokio::main]
async fn main() {
    let result = run().await;
    if let Err(e) = result {
        println!("{e}");
        process::exit(1)
    }
}
