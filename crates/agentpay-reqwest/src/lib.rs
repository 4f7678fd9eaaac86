//! Client side of agentpay payments.
//!
//! - [`X402Payments`] is a `reqwest_middleware` middleware that answers a `402`
//!   by having the wallet sign one of the offered payment requirements and
//!   retrying with the `X-PAYMENT` header.
//! - [`PaymentFlow`] runs a user-facing query against a paid route and tracks it
//!   through [`PaymentState`].
//!
//! ## Quickstart
//!
//! ```rust,ignore
//! use agentpay_reqwest::{PaymentFlow, QueryTarget};
//! use agentpay_types::network::NetworkMode;
//!
//! let mut flow = PaymentFlow::new("http://localhost:3000".parse()?).with_client_id(client_id);
//! let state = flow
//!     .submit(&wallet, &QueryTarget::Premium { network: NetworkMode::Dev })
//!     .await?;
//! ```

mod builder;
pub mod flow;
pub mod middleware;
pub mod state;
pub mod wallet;

pub use builder::*;
pub use flow::{PaymentFlow, QueryTarget};
pub use middleware::{X402Payments, X402PaymentsError};
pub use state::{PaymentEvent, PaymentFailure, PaymentState};
pub use wallet::{ConnectError, PaymentSigner, SignerError, WalletConnector};
