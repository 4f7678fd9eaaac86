//! Wire format types.
//!
//! Two families live here. The x402 v1 structures ([`PaymentRequirements`],
//! [`PaymentRequired`], [`PaymentPayload`]) are what the payer and the facilitator
//! exchange. The response envelopes ([`PaidResponse`], [`TimeoutResponse`], ...)
//! are the JSON bodies the gate's own routes return to clients.

use alloy_primitives::Address;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::network::NetworkMode;
use crate::util::{MoneyAmount, MoneyAmountParseError};

/// Name of the request header carrying the payment token.
pub const PAYMENT_HEADER_NAME: &str = "X-PAYMENT";

/// The x402 protocol version spoken with the facilitator.
pub const X402_VERSION: u8 = 1;

/// How long a signed payment authorization stays valid.
pub const DEFAULT_MAX_TIMEOUT_SECONDS: u64 = 300;

/// Payment terms set by the seller, one entry of a 402 `accepts` list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequirements {
    pub scheme: String,
    pub network: String,
    /// Atomic token amount, as a decimal string.
    pub max_amount_required: String,
    pub resource: String,
    pub description: String,
    pub mime_type: String,
    pub pay_to: Address,
    pub max_timeout_seconds: u64,
    pub asset: Address,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra: Option<Value>,
}

impl PaymentRequirements {
    /// Builds `exact`-scheme requirements paying `price` in USDC on the mode's chain.
    pub fn exact_usdc(
        network: NetworkMode,
        price: &MoneyAmount,
        pay_to: Address,
        resource: impl Into<String>,
    ) -> Result<Self, MoneyAmountParseError> {
        let usdc = network.usdc();
        let amount = price.as_token_amount(usdc.decimals)?;
        Ok(Self {
            scheme: "exact".to_string(),
            network: network.network_name().to_string(),
            max_amount_required: amount.to_string(),
            resource: resource.into(),
            description: String::new(),
            mime_type: "application/json".to_string(),
            pay_to,
            max_timeout_seconds: DEFAULT_MAX_TIMEOUT_SECONDS,
            asset: usdc.address,
            extra: Some(serde_json::json!({
                "name": usdc.eip712_name,
                "version": usdc.eip712_version,
            })),
        })
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// The required amount as an integer, if the string is well-formed.
    pub fn amount(&self) -> Option<u128> {
        self.max_amount_required.parse().ok()
    }
}

/// Body of an HTTP 402 Payment Required response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequired {
    pub x402_version: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(default)]
    pub accepts: Vec<PaymentRequirements>,
}

/// Signed payment authorization from the buyer, as carried (base64 JSON) in `X-PAYMENT`.
///
/// The scheme-specific `payload` is opaque here: signing and verifying it belongs
/// to the wallet and the facilitator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentPayload {
    pub x402_version: u8,
    pub scheme: String,
    pub network: String,
    pub payload: Value,
}

/// `200` body of a paid route.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaidResponse {
    pub message: String,
    /// The settlement receipt.
    pub tx: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// `408` body emitted when settlement failed in a way worth retrying.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeoutResponse {
    pub error: String,
    pub error_message: String,
    pub retryable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accepts: Option<Value>,
}

impl TimeoutResponse {
    pub const ERROR: &'static str = "Payment settlement timeout";
    pub const MESSAGE: &'static str = "The payment settlement request timed out. This may be due to network issues or facilitator delays. Please try again in a few moments.";

    pub fn new(accepts: Option<Value>) -> Self {
        Self {
            error: Self::ERROR.to_string(),
            error_message: Self::MESSAGE.to_string(),
            retryable: true,
            accepts,
        }
    }
}

/// `500` body for unexpected failures.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerErrorResponse {
    pub error: String,
    pub error_message: String,
}

impl ServerErrorResponse {
    pub fn new(error_message: impl Into<String>) -> Self {
        Self {
            error: "server error".to_string(),
            error_message: error_message.into(),
        }
    }
}

/// Body for downstream data-provider failures.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderErrorResponse {
    pub error: String,
    pub details: String,
}

/// Plain `{error}` body for rejected requests.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Body of `GET /api/endpoints`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EndpointsResponse {
    pub endpoints: Vec<String>,
}
