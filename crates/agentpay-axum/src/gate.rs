//! Settlement gate for paid routes.
//!
//! A handler builds a [`SettlementRequest`] from its inbound request with
//! [`SettlementGate::request`], then awaits [`SettlementGate::settle`]. On success
//! it gets the facilitator receipt and produces its own success body. Every other
//! outcome is a [`GateRejection`], which is already a complete HTTP response:
//!
//! - a failure that looks like a timeout becomes `408` with `retryable: true`;
//! - a facilitator refusal is relayed as-is (status, body and headers);
//! - anything else becomes `500 {error: "server error", errorMessage}`.

use agentpay_types::network::NetworkMode;
use agentpay_types::proto::{PAYMENT_HEADER_NAME, ServerErrorResponse, TimeoutResponse};
use agentpay_types::settlement::{SettlementRequest, SettlementResult, Settler, WaitUntil};
use agentpay_types::timeout::SettlementFault;
use agentpay_types::util::MoneyAmount;
use alloy_primitives::Address;
use axum_core::body::Body;
use axum_core::response::{IntoResponse, Response};
use http::header::CONTENT_TYPE;
use http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode, Uri};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use url::Url;

/// Settles payments for the routes it guards. Cheap to share behind an `Arc`.
#[derive(Debug, Clone)]
pub struct SettlementGate<S> {
    settler: S,
    pay_to: Address,
    public_url: Url,
    price: MoneyAmount,
}

impl<S> SettlementGate<S> {
    pub fn new(settler: S, pay_to: Address, public_url: Url, price: MoneyAmount) -> Self {
        Self {
            settler,
            pay_to,
            public_url,
            price,
        }
    }

    pub fn settler(&self) -> &S {
        &self.settler
    }

    pub fn pay_to(&self) -> Address {
        self.pay_to
    }

    pub fn price(&self) -> &MoneyAmount {
        &self.price
    }

    /// Public URL of the resource at `uri`: the configured base with the request path.
    pub fn resource_url(&self, uri: &Uri) -> String {
        let mut url = self.public_url.clone();
        url.set_path(uri.path());
        url.set_query(None);
        url.to_string()
    }

    /// Describes the settlement of one inbound request.
    pub fn request(
        &self,
        method: &Method,
        uri: &Uri,
        headers: &HeaderMap,
        network: NetworkMode,
        wait_until: WaitUntil,
    ) -> SettlementRequest {
        let payment_token = headers
            .get(PAYMENT_HEADER_NAME)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        SettlementRequest {
            resource_url: self.resource_url(uri),
            method: method.to_string(),
            payment_token,
            network,
            price: self.price.clone(),
            pay_to: self.pay_to,
            wait_until,
        }
    }
}

impl<S: Settler> SettlementGate<S> {
    /// Settles `request`, returning the facilitator receipt.
    pub async fn settle(&self, request: &SettlementRequest) -> Result<Value, GateRejection> {
        #[cfg(feature = "telemetry")]
        tracing::info!(
            payment_token = request.payment_token.is_some(),
            network = %request.network,
            chain = %request.network.chain_id(),
            resource = %request.resource_url,
            "Settling payment"
        );

        match self.settler.settle_payment(request).await {
            Ok(SettlementResult::Settled { receipt }) => {
                #[cfg(feature = "telemetry")]
                tracing::info!(receipt = %receipt, "Payment settled");
                Ok(receipt)
            }
            Ok(SettlementResult::Unsettled {
                status,
                body,
                headers,
            }) => Err(GateRejection::from_unsettled(status, body, headers)),
            Err(err) => {
                #[cfg(feature = "telemetry")]
                tracing::error!(error = %err, "Settlement failed");
                Err(GateRejection::from_error_text(&err.to_string()))
            }
        }
    }
}

/// A settlement outcome that ends the request.
#[derive(Debug, Clone, PartialEq)]
pub enum GateRejection {
    /// `408`, the client should retry.
    Timeout { accepts: Option<Value> },
    /// The facilitator's own answer, relayed verbatim.
    Relay {
        status: u16,
        body: Value,
        headers: BTreeMap<String, String>,
    },
    /// `500` for failures that are not timeouts.
    ServerError { message: String },
}

impl GateRejection {
    /// Classifies a non-settled facilitator answer.
    pub fn from_unsettled(status: u16, body: Value, headers: BTreeMap<String, String>) -> Self {
        match SettlementFault::classify_body(&body) {
            SettlementFault::TimedOut => {
                #[cfg(feature = "telemetry")]
                tracing::warn!(status, "Payment settlement timed out");
                GateRejection::Timeout {
                    accepts: body.get("accepts").cloned(),
                }
            }
            SettlementFault::Rejected => {
                #[cfg(feature = "telemetry")]
                tracing::info!(status, body = %body, "Payment not settled");
                GateRejection::Relay {
                    status,
                    body,
                    headers,
                }
            }
        }
    }

    /// Classifies an unexpected failure by its message.
    pub fn from_error_text(message: &str) -> Self {
        match SettlementFault::classify(message) {
            SettlementFault::TimedOut => GateRejection::Timeout { accepts: None },
            SettlementFault::Rejected => GateRejection::ServerError {
                message: message.to_string(),
            },
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            GateRejection::Timeout { .. } => StatusCode::REQUEST_TIMEOUT,
            GateRejection::Relay { status, .. } => {
                StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_GATEWAY)
            }
            GateRejection::ServerError { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for GateRejection {
    fn into_response(self) -> Response {
        let status = self.status();
        match self {
            GateRejection::Timeout { accepts } => {
                json_response(status, &TimeoutResponse::new(accepts), BTreeMap::new())
            }
            GateRejection::Relay { body, headers, .. } => json_response(status, &body, headers),
            GateRejection::ServerError { message } => json_response(
                status,
                &ServerErrorResponse::new(message),
                BTreeMap::new(),
            ),
        }
    }
}

/// A JSON response; `extra_headers` that are not valid HTTP headers are skipped.
fn json_response<T: Serialize>(
    status: StatusCode,
    body: &T,
    extra_headers: BTreeMap<String, String>,
) -> Response {
    let bytes = match serde_json::to_vec(body) {
        Ok(bytes) => bytes,
        Err(_) => return StatusCode::INTERNAL_SERVER_ERROR.into_response(),
    };
    let mut response = Response::new(Body::from(bytes));
    *response.status_mut() = status;
    let headers = response.headers_mut();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    for (name, value) in extra_headers {
        if let (Ok(name), Ok(value)) = (
            HeaderName::try_from(name.as_str()),
            HeaderValue::try_from(value.as_str()),
        ) {
            headers.insert(name, value);
        }
    }
    response
}
