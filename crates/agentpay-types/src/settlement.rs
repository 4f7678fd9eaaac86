//! The settlement seam.
//!
//! The gate never settles anything itself. It describes what it wants paid in a
//! [`SettlementRequest`] and hands it to a [`Settler`], which talks to whatever
//! facilitator performs the transfer and reports a [`SettlementResult`].

use alloy_primitives::Address;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt::{Debug, Display};
use std::sync::Arc;

use crate::network::NetworkMode;
use crate::proto::PaymentRequirements;
use crate::util::{MoneyAmount, MoneyAmountParseError};

/// How far the facilitator should follow the transfer before answering.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum WaitUntil {
    /// Return as soon as the transaction is submitted.
    #[serde(rename = "sent")]
    Submitted,
    /// Return once the transaction is confirmed on-chain.
    #[default]
    #[serde(rename = "confirmed")]
    Confirmed,
}

/// Everything needed to settle one inbound request. Built fresh per request.
#[derive(Debug, Clone, PartialEq)]
pub struct SettlementRequest {
    /// The resource being paid for.
    pub resource_url: String,
    /// HTTP method of the inbound request.
    pub method: String,
    /// Raw `X-PAYMENT` header value, if the client sent one.
    pub payment_token: Option<String>,
    pub network: NetworkMode,
    pub price: MoneyAmount,
    pub pay_to: Address,
    pub wait_until: WaitUntil,
}

impl SettlementRequest {
    /// The x402 requirements this request advertises to payers.
    pub fn requirements(&self) -> Result<PaymentRequirements, MoneyAmountParseError> {
        PaymentRequirements::exact_usdc(
            self.network,
            &self.price,
            self.pay_to,
            self.resource_url.clone(),
        )
        .map(|r| r.with_description(format!("{} {}", self.method, self.resource_url)))
    }
}

/// Outcome of a settlement attempt that reached a verdict.
#[derive(Debug, Clone, PartialEq)]
pub enum SettlementResult {
    /// The payment went through. `receipt` is the facilitator's settle response.
    Settled { receipt: Value },
    /// The payment was not settled; the facilitator's answer is relayed as-is.
    Unsettled {
        status: u16,
        body: Value,
        headers: BTreeMap<String, String>,
    },
}

impl SettlementResult {
    pub fn unsettled(status: u16, body: Value) -> Self {
        SettlementResult::Unsettled {
            status,
            body,
            headers: BTreeMap::new(),
        }
    }
}

/// Anything that can settle a payment for the gate.
///
/// An `Err` means the attempt did not reach a verdict at all (transport failure,
/// malformed answer); a refused payment is an `Ok(SettlementResult::Unsettled)`.
pub trait Settler {
    type Error: Debug + Display + Send;

    fn settle_payment(
        &self,
        request: &SettlementRequest,
    ) -> impl Future<Output = Result<SettlementResult, Self::Error>> + Send;
}

impl<T: Settler + Sync + Send> Settler for Arc<T> {
    type Error = T::Error;

    fn settle_payment(
        &self,
        request: &SettlementRequest,
    ) -> impl Future<Output = Result<SettlementResult, Self::Error>> + Send {
        self.as_ref().settle_payment(request)
    }
}
