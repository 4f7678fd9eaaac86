//! Client flow for querying a paid route.
//!
//! [`PaymentFlow`] drives one [`PaymentState`] machine: it refuses to start without
//! a connected wallet, connects to it, sends the query through a paying client
//! built around the wallet's signer, and records the outcome. Failures never
//! escape as errors; they end up in [`PaymentState::Error`] with the message a
//! user should see.

use agentpay_types::network::NetworkMode;
use http::StatusCode;
use reqwest_middleware as rqm;
use serde::Serialize;
use serde_json::{Value, json};
use url::Url;

use crate::builder::ReqwestWithPayments;
use crate::middleware::X402Payments;
use crate::state::{PaymentEvent, PaymentFailure, PaymentState, TransitionError};
use crate::wallet::WalletConnector;

/// Message recorded when a query is submitted without a wallet.
pub const WALLET_NOT_CONNECTED: &str =
    "Please connect your wallet first using the Connect Wallet button in the header";

/// Header carrying the public client id.
pub const CLIENT_ID_HEADER: &str = "x-client-id";

/// A paid route and its parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryTarget {
    /// `GET /api/premium?network=...`
    Premium { network: NetworkMode },
    /// `POST /api/twitter` with `{network, username}`.
    Twitter {
        network: NetworkMode,
        username: String,
    },
}

#[derive(Debug, Serialize)]
struct TwitterQuery<'a> {
    network: NetworkMode,
    username: &'a str,
}

impl QueryTarget {
    pub fn network(&self) -> NetworkMode {
        match self {
            QueryTarget::Premium { network } | QueryTarget::Twitter { network, .. } => *network,
        }
    }

    fn path(&self) -> &'static str {
        match self {
            QueryTarget::Premium { .. } => "/api/premium",
            QueryTarget::Twitter { .. } => "/api/twitter",
        }
    }

    fn url(&self, origin: &Url) -> Url {
        let mut url = origin.clone();
        url.set_path(self.path());
        url.set_query(None);
        if let QueryTarget::Premium { network } = self {
            url.query_pairs_mut().append_pair("network", network.as_str());
        }
        url
    }
}

#[derive(Debug, thiserror::Error)]
pub enum FlowError {
    #[error(transparent)]
    Transition(#[from] TransitionError),
}

/// Runs paid queries against one origin.
#[derive(Debug)]
pub struct PaymentFlow {
    origin: Url,
    client_id: Option<String>,
    state: PaymentState,
    trail: Vec<&'static str>,
}

impl PaymentFlow {
    pub fn new(origin: Url) -> Self {
        Self {
            origin,
            client_id: None,
            state: PaymentState::Idle,
            trail: Vec::new(),
        }
    }

    /// Sends `client_id` as `x-client-id` with every query.
    pub fn with_client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = Some(client_id.into());
        self
    }

    pub fn state(&self) -> &PaymentState {
        &self.state
    }

    /// Names of the states entered by the last [`PaymentFlow::submit`].
    pub fn trail(&self) -> &[&'static str] {
        &self.trail
    }

    /// Returns a finished flow to `Idle`.
    pub fn reset(&mut self) -> Result<&PaymentState, FlowError> {
        self.apply(PaymentEvent::Reset)
    }

    fn apply(&mut self, event: PaymentEvent) -> Result<&PaymentState, FlowError> {
        let next = self.state.transition(event)?;
        #[cfg(feature = "telemetry")]
        tracing::debug!(from = self.state.name(), to = next.name(), "Payment state changed");
        self.trail.push(next.name());
        self.state = next;
        Ok(&self.state)
    }

    /// Runs one paid query with `wallet`, or fails at once when it is not connected.
    ///
    /// Only an out-of-order call is an `Err`; every query outcome is a state.
    pub async fn submit(
        &mut self,
        wallet: &dyn WalletConnector,
        target: &QueryTarget,
    ) -> Result<&PaymentState, FlowError> {
        self.trail.clear();
        if !wallet.is_connected() {
            #[cfg(feature = "telemetry")]
            tracing::warn!("Query submitted without a connected wallet");
            return self.apply(PaymentEvent::PreconditionFailed {
                message: WALLET_NOT_CONNECTED.to_string(),
            });
        }
        self.apply(PaymentEvent::Submit)?;

        let signer = match wallet.connect().await {
            Ok(signer) => signer,
            Err(err) => {
                #[cfg(feature = "telemetry")]
                tracing::error!(error = %err, "Wallet connection failed");
                return self.apply(PaymentEvent::Failed(PaymentFailure::precondition(
                    err.to_string(),
                )));
            }
        };
        self.apply(PaymentEvent::Connected)?;

        let payments = X402Payments::with_shared_signer(signer).prefer(target.network());
        let http = reqwest::Client::new().with_payments(payments);

        let event = match self.send(&http, target).await {
            Ok((status, body)) => outcome_event(status, body),
            Err(err) => {
                #[cfg(feature = "telemetry")]
                tracing::error!(error = %err, "Paid query failed");
                PaymentEvent::Failed(request_failed(&err))
            }
        };
        self.apply(event)
    }

    async fn send(
        &self,
        http: &rqm::ClientWithMiddleware,
        target: &QueryTarget,
    ) -> Result<(StatusCode, Value), rqm::Error> {
        let url = target.url(&self.origin);
        let mut request = match target {
            QueryTarget::Premium { .. } => http.get(url),
            QueryTarget::Twitter { network, username } => http.post(url).json(&TwitterQuery {
                network: *network,
                username,
            }),
        };
        if let Some(client_id) = &self.client_id {
            request = request.header(CLIENT_ID_HEADER, client_id);
        }
        let response = request.send().await?;
        let status = response.status();
        let bytes = response.bytes().await?;
        // Error pages and empty bodies still need a status-derived message.
        let body = serde_json::from_slice(&bytes).unwrap_or_else(|_| json!({}));
        Ok((status, body))
    }
}

/// Maps a finished HTTP exchange onto the state machine.
///
/// Success needs both a 2xx status and a body without an `error` field.
pub fn outcome_event(status: StatusCode, body: Value) -> PaymentEvent {
    if status.is_success() && body.get("error").is_none() {
        return PaymentEvent::Completed { response: body };
    }
    let message = ["errorMessage", "error"]
        .iter()
        .find_map(|field| body.get(field).and_then(Value::as_str))
        .map(str::to_string)
        .unwrap_or_else(|| format!("Query failed with status {}", status.as_u16()));
    let retryable = body.get("retryable").and_then(Value::as_bool) == Some(true)
        || status == StatusCode::REQUEST_TIMEOUT;
    let fund_wallet_link = body
        .get("fundWalletLink")
        .and_then(Value::as_str)
        .map(str::to_string);
    PaymentEvent::Failed(PaymentFailure {
        message,
        retryable,
        response: Some(body),
        fund_wallet_link,
    })
}

fn request_failed(err: &rqm::Error) -> PaymentFailure {
    let message = err.to_string();
    PaymentFailure {
        response: Some(json!({ "error": "request_failed", "errorMessage": message })),
        message,
        retryable: false,
        fund_wallet_link: None,
    }
}
