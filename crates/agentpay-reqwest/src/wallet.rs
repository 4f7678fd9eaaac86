//! The buyer's wallet, as seen by the paying client.
//!
//! Key management and EIP-712 signing live in the wallet. This crate only needs
//! a [`WalletConnector`] to reach it, and the [`PaymentSigner`] it hands out to
//! turn [`PaymentRequirements`] into a signed [`PaymentPayload`].

use agentpay_types::proto::{PaymentPayload, PaymentRequirements};
use alloy_primitives::Address;
use std::error::Error;
use std::sync::Arc;

/// Errors a wallet reports while authorizing a payment.
#[derive(Debug, thiserror::Error)]
pub enum SignerError {
    /// The wallet owner declined to sign.
    #[error("Payment was rejected by the wallet: {0}")]
    Rejected(String),
    /// The wallet can not pay on the requested network.
    #[error("Wallet does not support network {0}")]
    UnsupportedNetwork(String),
    #[error("Failed to sign payment payload")]
    Signing(#[source] Box<dyn Error + Send + Sync>),
}

/// A connected wallet able to authorize x402 payments.
#[async_trait::async_trait]
pub trait PaymentSigner: Send + Sync {
    /// Address the payment is sent from.
    fn address(&self) -> Address;

    /// Signs a payment satisfying `requirements`.
    async fn sign_payment(
        &self,
        requirements: &PaymentRequirements,
    ) -> Result<PaymentPayload, SignerError>;
}

/// Errors while opening a session with the wallet.
#[derive(Debug, thiserror::Error)]
pub enum ConnectError {
    /// The wallet owner refused the connection.
    #[error("Wallet connection was rejected: {0}")]
    Rejected(String),
    #[error("Failed to connect wallet: {0}")]
    Connect(#[source] Box<dyn Error + Send + Sync>),
}

/// The user's wallet before a query starts.
#[async_trait::async_trait]
pub trait WalletConnector: Send + Sync {
    /// A wallet account is selected.
    fn is_connected(&self) -> bool;

    /// Opens a signing session with the selected account.
    async fn connect(&self) -> Result<Arc<dyn PaymentSigner>, ConnectError>;
}
