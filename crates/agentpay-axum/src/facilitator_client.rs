//! A [`Settler`] that settles payments through a _remote_ facilitator over HTTP.
//!
//! [`FacilitatorClient`] owns the x402 side of settlement: it derives the payment
//! requirements of a [`SettlementRequest`], answers `402` when no usable payment
//! token was presented, and otherwise posts the token to the facilitator's
//! `/settle` endpoint with the server's credentials.
//!
//! ## Example
//!
//! ```rust
//! use agentpay_axum::facilitator_client::FacilitatorClient;
//!
//! let facilitator = FacilitatorClient::try_from("https://facilitator.example/x402").unwrap();
//! assert_eq!(facilitator.settle_url().as_str(), "https://facilitator.example/x402/settle");
//! ```
//!
//! ## Error Handling
//!
//! Only failures that prevent a verdict are errors: URL construction, transport
//! failures, timeouts, unreadable answers. A payment the facilitator refuses is
//! an `Ok(SettlementResult::Unsettled)` carrying the refusal.

use agentpay_types::proto::{PAYMENT_HEADER_NAME, PaymentRequirements, X402_VERSION};
use agentpay_types::settlement::{SettlementRequest, SettlementResult, Settler, WaitUntil};
use agentpay_types::util::{Base64Bytes, MoneyAmountParseError};
use alloy_primitives::Address;
use http::header::InvalidHeaderValue;
use http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use reqwest::Client;
use serde::Serialize;
use serde_json::{Value, json};
use std::fmt::Display;
use std::time::Duration;
use url::Url;

#[cfg(feature = "telemetry")]
use tracing::{Span, instrument};

/// Default base URL of the hosted facilitator.
pub const DEFAULT_FACILITATOR_URL: &str = "https://api.thirdweb.com/v1/payments/x402/";

/// How the facilitator authenticates the server wallet that submits transfers.
///
/// Exactly one method is used; configuration picks vault, then wallet token, then AWS KMS.
#[derive(Clone, PartialEq, Eq)]
pub enum FacilitatorAuth {
    VaultAccessToken(String),
    WalletAccessToken(String),
    AwsKms {
        key_id: String,
        region: String,
        access_key_id: Option<String>,
        secret_access_key: Option<String>,
    },
}

impl FacilitatorAuth {
    pub const DEFAULT_AWS_REGION: &'static str = "us-east-1";

    fn header_pairs(&self) -> Vec<(&'static str, &str)> {
        match self {
            FacilitatorAuth::VaultAccessToken(token) => vec![("x-vault-access-token", token)],
            FacilitatorAuth::WalletAccessToken(token) => vec![("x-wallet-access-token", token)],
            FacilitatorAuth::AwsKms {
                key_id,
                region,
                access_key_id,
                secret_access_key,
            } => {
                let mut pairs = vec![
                    ("x-aws-kms-key-id", key_id.as_str()),
                    ("x-aws-kms-region", region.as_str()),
                ];
                if let Some(access_key_id) = access_key_id {
                    pairs.push(("x-aws-access-key-id", access_key_id));
                }
                if let Some(secret_access_key) = secret_access_key {
                    pairs.push(("x-aws-secret-access-key", secret_access_key));
                }
                pairs
            }
        }
    }

    /// Short name for logs; never includes the credential itself.
    pub fn kind(&self) -> &'static str {
        match self {
            FacilitatorAuth::VaultAccessToken(_) => "vault",
            FacilitatorAuth::WalletAccessToken(_) => "wallet",
            FacilitatorAuth::AwsKms { .. } => "aws-kms",
        }
    }
}

impl std::fmt::Debug for FacilitatorAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "FacilitatorAuth({})", self.kind())
    }
}

/// Body of `POST /settle`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SettleRequestWire<'a> {
    x402_version: u8,
    payment_payload: Value,
    payment_requirements: &'a PaymentRequirements,
    wait_until: WaitUntil,
}

/// A client for settling payments with a remote facilitator.
#[derive(Clone, Debug)]
pub struct FacilitatorClient {
    /// Base URL of the facilitator (e.g. `https://facilitator.example/`)
    base_url: Url,
    /// Full URL to `POST /settle` requests
    settle_url: Url,
    /// Shared Reqwest HTTP client
    client: Client,
    /// Credentials and custom headers sent with each request
    headers: HeaderMap,
    /// Optional request timeout
    timeout: Option<Duration>,
}

/// Errors that prevent the facilitator from reaching a verdict.
#[derive(Debug, thiserror::Error)]
pub enum FacilitatorClientError {
    #[error("URL parse error: {context}: {source}")]
    UrlParse {
        context: &'static str,
        #[source]
        source: url::ParseError,
    },
    #[error("Invalid value for header {name}: {source}")]
    InvalidHeader {
        name: &'static str,
        #[source]
        source: InvalidHeaderValue,
    },
    #[error("Route price can not be paid in the settlement token: {0}")]
    Price(#[source] MoneyAmountParseError),
    #[error("Settlement request timeout: {context}: {source}")]
    Timeout {
        context: &'static str,
        #[source]
        source: reqwest::Error,
    },
    /// The peer dropped the connection mid-exchange.
    #[error("Settlement connection reset (ECONNRESET): {context}: {source}")]
    ConnectionReset {
        context: &'static str,
        #[source]
        source: reqwest::Error,
    },
    #[error("HTTP error: {context}: {source}")]
    Http {
        context: &'static str,
        #[source]
        source: reqwest::Error,
    },
    #[error("Failed to read response body as text: {context}: {source}")]
    ResponseBodyRead {
        context: &'static str,
        #[source]
        source: reqwest::Error,
    },
    #[error("Failed to deserialize JSON: {context}: {source}")]
    JsonDeserialization {
        context: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

impl FacilitatorClientError {
    fn from_transport(context: &'static str, source: reqwest::Error) -> Self {
        if source.is_timeout() {
            FacilitatorClientError::Timeout { context, source }
        } else if is_connection_reset(&source) {
            FacilitatorClientError::ConnectionReset { context, source }
        } else {
            FacilitatorClientError::Http { context, source }
        }
    }

    fn from_body_read(context: &'static str, source: reqwest::Error) -> Self {
        match Self::from_transport(context, source) {
            FacilitatorClientError::Http { context, source } => {
                FacilitatorClientError::ResponseBodyRead { context, source }
            }
            other => other,
        }
    }
}

/// Whether a reset, an abort or an early close of the connection caused `err`.
fn is_connection_reset(err: &reqwest::Error) -> bool {
    let mut cause = Some(err as &(dyn std::error::Error + 'static));
    while let Some(e) = cause {
        if let Some(io) = e.downcast_ref::<std::io::Error>()
            && matches!(
                io.kind(),
                std::io::ErrorKind::ConnectionReset | std::io::ErrorKind::ConnectionAborted
            )
        {
            return true;
        }
        // hyper's incomplete-message error carries no io source.
        if e.to_string().contains("connection closed before message completed") {
            return true;
        }
        cause = e.source();
    }
    false
}

impl Settler for FacilitatorClient {
    type Error = FacilitatorClientError;

    async fn settle_payment(
        &self,
        request: &SettlementRequest,
    ) -> Result<SettlementResult, FacilitatorClientError> {
        FacilitatorClient::settle(self, request).await
    }
}

impl FacilitatorClient {
    /// Returns the base URL used by this client.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Returns the computed `./settle` URL relative to [`FacilitatorClient::base_url`].
    pub fn settle_url(&self) -> &Url {
        &self.settle_url
    }

    /// Returns the headers sent with every request.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Returns the configured timeout, if any.
    pub fn timeout(&self) -> &Option<Duration> {
        &self.timeout
    }

    /// Constructs a new [`FacilitatorClient`] from a base URL.
    pub fn try_new(base_url: Url) -> Result<Self, FacilitatorClientError> {
        let settle_url =
            base_url
                .join("./settle")
                .map_err(|e| FacilitatorClientError::UrlParse {
                    context: "Failed to construct ./settle URL",
                    source: e,
                })?;
        Ok(Self {
            client: Client::new(),
            base_url,
            settle_url,
            headers: HeaderMap::new(),
            timeout: None,
        })
    }

    /// Attaches custom headers to all future requests.
    pub fn with_headers(&self, headers: HeaderMap) -> Self {
        let mut this = self.clone();
        this.headers.extend(headers);
        this
    }

    /// Sets a timeout for all future requests.
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        let mut this = self.clone();
        this.timeout = Some(timeout);
        this
    }

    /// Authenticates all future requests as `server_wallet`, using `secret_key`
    /// and the given wallet credentials.
    pub fn with_auth(
        &self,
        secret_key: &str,
        server_wallet: Address,
        auth: FacilitatorAuth,
    ) -> Result<Self, FacilitatorClientError> {
        let wallet = server_wallet.to_checksum(None);
        let mut pairs = vec![
            ("x-secret-key", secret_key),
            ("x-server-wallet-address", wallet.as_str()),
        ];
        pairs.extend(auth.header_pairs());

        let mut headers = HeaderMap::new();
        for (name, value) in pairs {
            let value = HeaderValue::from_str(value)
                .map_err(|source| FacilitatorClientError::InvalidHeader { name, source })?;
            headers.insert(HeaderName::from_static(name), value);
        }
        Ok(self.with_headers(headers))
    }

    /// Settles `request` with the facilitator.
    ///
    /// Answers `402` without any HTTP call when the request has no payment token,
    /// or when the token is not base64-encoded JSON.
    #[cfg_attr(
        feature = "telemetry",
        instrument(
            name = "agentpay.facilitator_client.settle",
            skip_all,
            fields(
                network = %request.network,
                resource = %request.resource_url,
                otel.status_code,
                error.message
            ),
        )
    )]
    pub async fn settle(
        &self,
        request: &SettlementRequest,
    ) -> Result<SettlementResult, FacilitatorClientError> {
        let requirements = request
            .requirements()
            .map_err(FacilitatorClientError::Price)?;

        let Some(token) = request.payment_token.as_deref() else {
            return Ok(payment_required(
                &requirements,
                &format!("{PAYMENT_HEADER_NAME} header is required"),
                None,
            ));
        };
        let Some(payment_payload) = Base64Bytes::from(token).decode_json::<Value>() else {
            return Ok(payment_required(
                &requirements,
                "Invalid or malformed payment header",
                None,
            ));
        };

        let body = SettleRequestWire {
            x402_version: X402_VERSION,
            payment_payload,
            payment_requirements: &requirements,
            wait_until: request.wait_until,
        };
        let result = self
            .post_json(&self.settle_url, "POST /settle", &body)
            .await
            .and_then(|(status, text)| settle_verdict(status, &text, &requirements));

        record_result_on_span(&result);

        result
    }

    /// Generic POST helper that handles JSON serialization, header and timeout
    /// application, and error mapping. Returns the status and raw body text.
    ///
    /// `context` is a human-readable identifier used in error messages (e.g. `"POST /settle"`).
    async fn post_json<T>(
        &self,
        url: &Url,
        context: &'static str,
        payload: &T,
    ) -> Result<(StatusCode, String), FacilitatorClientError>
    where
        T: Serialize + ?Sized,
    {
        let mut req = self.client.post(url.clone()).json(payload);
        for (key, value) in self.headers.iter() {
            req = req.header(key, value);
        }
        if let Some(timeout) = self.timeout {
            req = req.timeout(timeout);
        }
        let http_response = req
            .send()
            .await
            .map_err(|e| FacilitatorClientError::from_transport(context, e))?;
        let status = http_response.status();
        let text = http_response
            .text()
            .await
            .map_err(|e| FacilitatorClientError::from_body_read(context, e))?;
        Ok((status, text))
    }
}

/// Turns the facilitator's `/settle` answer into a [`SettlementResult`].
fn settle_verdict(
    status: StatusCode,
    text: &str,
    requirements: &PaymentRequirements,
) -> Result<SettlementResult, FacilitatorClientError> {
    if status != StatusCode::OK {
        let message = format!("Facilitator responded with {}: {}", status.as_u16(), text);
        return Ok(payment_required(requirements, "settlement_failed", Some(message)));
    }
    let receipt: Value =
        serde_json::from_str(text).map_err(|e| FacilitatorClientError::JsonDeserialization {
            context: "POST /settle",
            source: e,
        })?;
    if receipt.get("success").and_then(Value::as_bool) == Some(true) {
        return Ok(SettlementResult::Settled { receipt });
    }
    let reason = receipt
        .get("errorReason")
        .and_then(Value::as_str)
        .unwrap_or("settlement_failed")
        .to_string();
    let message = receipt
        .get("errorMessage")
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| format!("Settlement was not successful: {reason}"));
    Ok(payment_required(requirements, &reason, Some(message)))
}

/// A `402` outcome advertising `requirements`.
fn payment_required(
    requirements: &PaymentRequirements,
    error: &str,
    error_message: Option<String>,
) -> SettlementResult {
    let mut body = json!({
        "x402Version": X402_VERSION,
        "error": error,
        "accepts": [requirements],
    });
    if let Some(error_message) = error_message {
        body["errorMessage"] = Value::String(error_message);
    }
    SettlementResult::unsettled(StatusCode::PAYMENT_REQUIRED.as_u16(), body)
}

/// Converts a string URL into a `FacilitatorClient`, parsing the URL and calling `try_new`.
impl TryFrom<&str> for FacilitatorClient {
    type Error = FacilitatorClientError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        // Normalize: strip trailing slashes and add a single trailing slash
        let mut normalized = value.trim_end_matches('/').to_string();
        normalized.push('/');
        let url = Url::parse(&normalized).map_err(|e| FacilitatorClientError::UrlParse {
            context: "Failed to parse base url",
            source: e,
        })?;
        FacilitatorClient::try_new(url)
    }
}

impl TryFrom<String> for FacilitatorClient {
    type Error = FacilitatorClientError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        FacilitatorClient::try_from(value.as_str())
    }
}

/// Records the outcome of a settlement on the current span.
#[cfg(feature = "telemetry")]
fn record_result_on_span<E: Display>(result: &Result<SettlementResult, E>) {
    let span = Span::current();
    match result {
        Ok(SettlementResult::Settled { .. }) => {
            span.record("otel.status_code", "OK");
        }
        Ok(SettlementResult::Unsettled { status, .. }) => {
            span.record("otel.status_code", "ERROR");
            span.record("error.message", tracing::field::display(status));
        }
        Err(err) => {
            span.record("otel.status_code", "ERROR");
            span.record("error.message", tracing::field::display(err));
            tracing::event!(tracing::Level::ERROR, error = %err, "Request to facilitator failed");
        }
    }
}

/// Noop if telemetry feature is off.
#[cfg(not(feature = "telemetry"))]
fn record_result_on_span<E: Display>(_result: &Result<SettlementResult, E>) {}

#[cfg(test)]
mod tests {
    use super::*;
    use agentpay_types::network::NetworkMode;
    use agentpay_types::timeout::SettlementFault;
    use agentpay_types::util::MoneyAmount;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const WALLET: Address = Address::repeat_byte(0x11);

    fn token() -> String {
        let payload = json!({
            "x402Version": 1,
            "scheme": "exact",
            "network": "monad-testnet",
            "payload": { "signature": "0xdead" }
        });
        Base64Bytes::encode(serde_json::to_vec(&payload).unwrap()).to_string()
    }

    fn request(payment_token: Option<String>) -> SettlementRequest {
        SettlementRequest {
            resource_url: "http://localhost:3000/api/premium".into(),
            method: "GET".into(),
            payment_token,
            network: NetworkMode::Dev,
            price: MoneyAmount::parse("$0.0001").unwrap(),
            pay_to: WALLET,
            wait_until: WaitUntil::Submitted,
        }
    }

    fn client(server: &MockServer) -> FacilitatorClient {
        FacilitatorClient::try_from(server.uri())
            .unwrap()
            .with_auth(
                "test-secret",
                WALLET,
                FacilitatorAuth::VaultAccessToken("vault-token".into()),
            )
            .unwrap()
    }

    #[test]
    fn test_settle_url_is_relative_to_base() {
        let client = FacilitatorClient::try_from("https://facilitator.example/x402///").unwrap();
        assert_eq!(client.base_url().as_str(), "https://facilitator.example/x402/");
        assert_eq!(client.settle_url().as_str(), "https://facilitator.example/x402/settle");
    }

    #[test]
    fn test_aws_kms_headers() {
        let client = FacilitatorClient::try_from(DEFAULT_FACILITATOR_URL)
            .unwrap()
            .with_auth(
                "secret",
                WALLET,
                FacilitatorAuth::AwsKms {
                    key_id: "kms-key".into(),
                    region: FacilitatorAuth::DEFAULT_AWS_REGION.into(),
                    access_key_id: Some("AKIA".into()),
                    secret_access_key: None,
                },
            )
            .unwrap();
        let headers = client.headers();
        assert_eq!(headers["x-secret-key"], "secret");
        assert_eq!(headers["x-aws-kms-key-id"], "kms-key");
        assert_eq!(headers["x-aws-kms-region"], "us-east-1");
        assert_eq!(headers["x-aws-access-key-id"], "AKIA");
        assert!(headers.get("x-aws-secret-access-key").is_none());
    }

    #[test]
    fn test_auth_rejects_invalid_header_values() {
        let result = FacilitatorClient::try_from(DEFAULT_FACILITATOR_URL)
            .unwrap()
            .with_auth("bad\nsecret", WALLET, FacilitatorAuth::WalletAccessToken("t".into()));
        assert!(matches!(
            result,
            Err(FacilitatorClientError::InvalidHeader { name: "x-secret-key", .. })
        ));
    }

    #[tokio::test]
    async fn test_missing_token_answers_402_without_calling_facilitator() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let result = client(&server).settle(&request(None)).await.unwrap();
        let SettlementResult::Unsettled { status, body, .. } = result else {
            panic!("expected unsettled result");
        };
        assert_eq!(status, 402);
        assert_eq!(body["error"], "X-PAYMENT header is required");
        assert_eq!(body["accepts"][0]["maxAmountRequired"], "100");
        assert_eq!(body["accepts"][0]["network"], "monad-testnet");
    }

    #[tokio::test]
    async fn test_malformed_token_answers_402() {
        let server = MockServer::start().await;
        let result = client(&server)
            .settle(&request(Some("%%%".into())))
            .await
            .unwrap();
        assert!(matches!(result, SettlementResult::Unsettled { status: 402, .. }));
    }

    #[tokio::test]
    async fn test_successful_settlement_returns_receipt() {
        let server = MockServer::start().await;
        let receipt = json!({
            "success": true,
            "payer": "0x2222222222222222222222222222222222222222",
            "transaction": "0xabc",
            "network": "monad-testnet"
        });
        Mock::given(method("POST"))
            .and(path("/settle"))
            .and(header("x-secret-key", "test-secret"))
            .and(header("x-vault-access-token", "vault-token"))
            .and(body_partial_json(json!({
                "x402Version": 1,
                "waitUntil": "sent",
                "paymentPayload": { "scheme": "exact" },
                "paymentRequirements": { "maxAmountRequired": "100" }
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(&receipt))
            .expect(1)
            .mount(&server)
            .await;

        let result = client(&server).settle(&request(Some(token()))).await.unwrap();
        assert_eq!(result, SettlementResult::Settled { receipt });
    }

    #[tokio::test]
    async fn test_refused_settlement_is_unsettled() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/settle"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": false,
                "errorReason": "insufficient_funds",
                "network": "monad-testnet"
            })))
            .mount(&server)
            .await;

        let result = client(&server).settle(&request(Some(token()))).await.unwrap();
        let SettlementResult::Unsettled { status, body, .. } = result else {
            panic!("expected unsettled result");
        };
        assert_eq!(status, 402);
        assert_eq!(body["error"], "insufficient_funds");
        assert_eq!(SettlementFault::classify_body(&body), SettlementFault::Rejected);
    }

    #[tokio::test]
    async fn test_gateway_timeout_status_is_classified_as_timeout() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/settle"))
            .respond_with(ResponseTemplate::new(524).set_body_string("origin did not answer"))
            .mount(&server)
            .await;

        let result = client(&server).settle(&request(Some(token()))).await.unwrap();
        let SettlementResult::Unsettled { body, .. } = result else {
            panic!("expected unsettled result");
        };
        assert_eq!(
            body["errorMessage"],
            "Facilitator responded with 524: origin did not answer"
        );
        assert_eq!(SettlementFault::classify_body(&body), SettlementFault::TimedOut);
    }

    #[tokio::test]
    async fn test_slow_facilitator_is_a_timeout_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/settle"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "success": true }))
                    .set_delay(Duration::from_millis(500)),
            )
            .mount(&server)
            .await;

        let err = client(&server)
            .with_timeout(Duration::from_millis(50))
            .settle(&request(Some(token())))
            .await
            .unwrap_err();
        assert!(matches!(err, FacilitatorClientError::Timeout { .. }));
        assert_eq!(
            SettlementFault::classify(&err.to_string()),
            SettlementFault::TimedOut
        );
    }

    /// Accepts one connection, reads the request and answers with a TCP reset.
    async fn resetting_peer() -> String {
        use tokio::io::AsyncReadExt;

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut received = Vec::new();
            let mut buf = [0u8; 4096];
            while !String::from_utf8_lossy(&received).contains("waitUntil") {
                match stream.read(&mut buf).await {
                    Ok(0) | Err(_) => break,
                    Ok(n) => received.extend_from_slice(&buf[..n]),
                }
            }
            #[allow(deprecated)]
            stream.set_linger(Some(Duration::ZERO)).unwrap();
            drop(stream);
        });
        format!("http://{addr}")
    }

    #[tokio::test]
    async fn test_connection_reset_is_retryable() {
        let client = FacilitatorClient::try_from(resetting_peer().await)
            .unwrap()
            .with_auth(
                "test-secret",
                WALLET,
                FacilitatorAuth::VaultAccessToken("vault-token".into()),
            )
            .unwrap();

        let err = client.settle(&request(Some(token()))).await.unwrap_err();
        assert!(
            matches!(err, FacilitatorClientError::ConnectionReset { .. }),
            "{err:?}"
        );
        assert_eq!(
            SettlementFault::classify(&err.to_string()),
            SettlementFault::TimedOut
        );
        let rejection = crate::gate::GateRejection::from_error_text(&err.to_string());
        assert_eq!(rejection.status(), StatusCode::REQUEST_TIMEOUT);
    }

    #[tokio::test]
    async fn test_garbage_answer_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/settle"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
            .mount(&server)
            .await;

        let err = client(&server)
            .settle(&request(Some(token())))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            FacilitatorClientError::JsonDeserialization { .. }
        ));
    }
}
