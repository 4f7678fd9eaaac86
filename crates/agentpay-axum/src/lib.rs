//! Server side of agentpay payments.
//!
//! - [`facilitator_client::FacilitatorClient`] talks to the remote settlement service
//!   over HTTP and implements [`Settler`](agentpay_types::settlement::Settler).
//! - [`gate::SettlementGate`] reads the payment header of an inbound request,
//!   settles it through any `Settler`, and turns every non-success into the
//!   right HTTP response.
//!
//! ## Quickstart
//!
//! ```rust,no_run
//! use agentpay_axum::facilitator_client::{FacilitatorAuth, FacilitatorClient};
//! use agentpay_axum::gate::SettlementGate;
//! use agentpay_types::util::MoneyAmount;
//!
//! let wallet = "0x0000000000000000000000000000000000000001".parse().unwrap();
//! let facilitator = FacilitatorClient::try_from("https://facilitator.example/x402/")
//!     .unwrap()
//!     .with_auth("secret", wallet, FacilitatorAuth::WalletAccessToken("token".into()))
//!     .unwrap();
//! let gate = SettlementGate::new(
//!     facilitator,
//!     wallet,
//!     "http://localhost:3000".parse().unwrap(),
//!     MoneyAmount::parse("$0.0001").unwrap(),
//! );
//! ```

pub mod facilitator_client;
pub mod gate;

pub use facilitator_client::FacilitatorClient;
pub use gate::{GateRejection, SettlementGate};
