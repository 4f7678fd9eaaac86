//! Middleware for handling HTTP 402 Payment Required responses.
//!
//! [`X402Payments`] implements `reqwest_middleware::Middleware`. When a request comes
//! back `402`, it reads the `accepts` list, picks the requirement it prefers, checks
//! it against the configured spending caps, has the wallet sign it, and retries the
//! request once with the base64-encoded payload in `X-PAYMENT`.

use agentpay_types::network::NetworkMode;
use agentpay_types::proto::{
    PAYMENT_HEADER_NAME, PaymentPayload, PaymentRequired, PaymentRequirements,
};
use agentpay_types::util::Base64Bytes;
use alloy_primitives::Address;
use http::{Extensions, HeaderValue, StatusCode};
use reqwest::{Request, Response};
use reqwest_middleware as rqm;
use std::collections::HashMap;
use std::sync::Arc;

#[cfg(feature = "telemetry")]
use tracing::instrument;

use crate::wallet::{PaymentSigner, SignerError};

/// Errors that can occur while constructing or applying an x402 payment.
#[derive(Debug, thiserror::Error)]
pub enum X402PaymentsError {
    /// The server asked for an amount that is not an integer token amount.
    #[error("Invalid amount required: {0}")]
    InvalidAmount(String),
    /// Triggered when the selected payment amount exceeds the configured maximum for that token.
    #[error("Payment amount {requested} exceeds maximum allowed {allowed} for token {asset}")]
    PaymentAmountTooLarge {
        requested: u128,
        allowed: u128,
        asset: Address,
    },
    /// The original request could not be cloned for retrying with a payment header.
    #[error("Request object is not cloneable. Are you passing a streaming body?")]
    RequestNotCloneable,
    /// None of the server's accepted payment methods can be paid by this client.
    #[error("No matching payment method found. Accepted: {accepts:?}. Preferred: {prefer:?}")]
    NoSuitablePaymentMethod {
        accepts: Vec<PaymentRequirements>,
        prefer: Vec<String>,
    },
    #[error(transparent)]
    Signer(#[from] SignerError),
    #[error("Failed to encode payment payload to json")]
    JsonEncodeError(#[source] serde_json::Error),
    #[error("Failed to encode payment payload to HTTP header")]
    HeaderValueEncodeError(#[source] http::header::InvalidHeaderValue),
}

impl From<X402PaymentsError> for rqm::Error {
    fn from(error: X402PaymentsError) -> Self {
        rqm::Error::Middleware(error.into())
    }
}

/// Middleware that retries `402` responses with a signed payment attached.
#[derive(Clone)]
pub struct X402Payments {
    signer: Arc<dyn PaymentSigner>,
    max_token_amount: HashMap<Address, u128>,
    prefer: Vec<String>,
}

impl X402Payments {
    /// Create a new middleware instance paying with `signer`.
    pub fn with_signer<S: PaymentSigner + 'static>(signer: S) -> Self {
        Self::with_shared_signer(Arc::new(signer))
    }

    pub fn with_shared_signer(signer: Arc<dyn PaymentSigner>) -> Self {
        Self {
            signer,
            max_token_amount: HashMap::new(),
            prefer: Vec::new(),
        }
    }

    /// Set a max atomic amount allowed for a given token.
    pub fn max(&self, asset: Address, amount: u128) -> Self {
        let mut this = self.clone();
        this.max_token_amount.insert(asset, amount);
        this
    }

    /// Rank requirements on `network` ahead of the others.
    pub fn prefer(&self, network: NetworkMode) -> Self {
        let mut this = self.clone();
        this.prefer.push(network.network_name().to_string());
        this
    }

    /// Selects the `exact` requirement on the most preferred network.
    pub fn select_payment_requirements(
        &self,
        accepts: &[PaymentRequirements],
    ) -> Result<PaymentRequirements, X402PaymentsError> {
        let mut candidates: Vec<&PaymentRequirements> =
            accepts.iter().filter(|req| req.scheme == "exact").collect();
        candidates.sort_by_key(|req| {
            self.prefer
                .iter()
                .position(|network| network == &req.network)
                .unwrap_or(usize::MAX)
        });

        #[cfg(feature = "telemetry")]
        for (i, req) in candidates.iter().enumerate() {
            tracing::debug!(
                index = i,
                asset = %req.asset,
                network = %req.network,
                "Ranked candidate payment requirement"
            );
        }

        candidates
            .first()
            .map(|req| (*req).clone())
            .ok_or_else(|| X402PaymentsError::NoSuitablePaymentMethod {
                accepts: accepts.to_vec(),
                prefer: self.prefer.clone(),
            })
    }

    /// Checks the selected requirement against the cap for its token, if any.
    pub fn assert_max_amount(
        &self,
        selected: &PaymentRequirements,
    ) -> Result<(), X402PaymentsError> {
        let Some(allowed) = self.max_token_amount.get(&selected.asset) else {
            return Ok(());
        };
        let requested = selected
            .amount()
            .ok_or_else(|| X402PaymentsError::InvalidAmount(selected.max_amount_required.clone()))?;
        if requested > *allowed {
            return Err(X402PaymentsError::PaymentAmountTooLarge {
                requested,
                allowed: *allowed,
                asset: selected.asset,
            });
        }
        Ok(())
    }

    /// Encodes the `PaymentPayload` into a base64 string suitable for an `X-PAYMENT` header.
    pub fn encode_payment_header(
        payload: &PaymentPayload,
    ) -> Result<HeaderValue, X402PaymentsError> {
        let json = serde_json::to_vec(payload).map_err(X402PaymentsError::JsonEncodeError)?;
        let b64 = Base64Bytes::encode(json);
        HeaderValue::from_bytes(b64.as_ref()).map_err(X402PaymentsError::HeaderValueEncodeError)
    }

    /// Builds the payment header by selecting a requirement, enforcing max,
    /// signing the payload, and base64-encoding it.
    #[cfg_attr(
        feature = "telemetry",
        instrument(name = "agentpay.build_payment_header", skip_all, err)
    )]
    pub async fn build_payment_header(
        &self,
        accepts: &[PaymentRequirements],
    ) -> Result<HeaderValue, X402PaymentsError> {
        let selected = self.select_payment_requirements(accepts)?;
        #[cfg(feature = "telemetry")]
        tracing::debug!(?selected, "Selected payment requirement");
        self.assert_max_amount(&selected)?;
        let payment_payload = self.signer.sign_payment(&selected).await?;
        Self::encode_payment_header(&payment_payload)
    }
}

#[async_trait::async_trait]
impl rqm::Middleware for X402Payments {
    /// Intercepts the response. If it's a 402, it constructs a payment and retries the request.
    #[cfg_attr(
        feature = "telemetry",
        instrument(
            name = "agentpay.handle",
            skip(self, req, extensions, next),
            fields(method = %req.method(), url = %req.url())
        )
    )]
    async fn handle(
        &self,
        req: Request,
        extensions: &mut Extensions,
        next: rqm::Next<'_>,
    ) -> rqm::Result<Response> {
        let retry_req = req.try_clone();

        let res = next.clone().run(req, extensions).await?;

        if res.status() != StatusCode::PAYMENT_REQUIRED {
            return Ok(res);
        }

        #[cfg(feature = "telemetry")]
        tracing::debug!(payer = %self.signer.address(), "Received 402 Payment Required");

        let payment_required = res.json::<PaymentRequired>().await?;

        let retry_req = async {
            let payment_header = self
                .build_payment_header(&payment_required.accepts)
                .await?;
            let mut req = retry_req.ok_or(X402PaymentsError::RequestNotCloneable)?;
            req.headers_mut().insert(PAYMENT_HEADER_NAME, payment_header);
            Ok::<Request, X402PaymentsError>(req)
        }
        .await
        .map_err(Into::<rqm::Error>::into)?;
        next.run(retry_req, extensions).await
    }
}
