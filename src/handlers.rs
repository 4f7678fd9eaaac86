//! HTTP endpoints of the agentpay server.
//!
//! - `GET /api/premium?network={dev|main}`: paid, answers `{message, tx}`.
//! - `POST /api/twitter` with `{network?, username}`: paid, answers
//!   `{message, tx, data}` with the profile from the social-data provider.
//! - `GET /api/endpoints`: lists the paid routes.
//!
//! Settlement outcomes other than success are produced by the [`SettlementGate`].

use agentpay_axum::gate::{GateRejection, SettlementGate};
use agentpay_types::network::NetworkMode;
use agentpay_types::proto::{EndpointsResponse, ErrorResponse, PAYMENT_HEADER_NAME, PaidResponse};
use agentpay_types::settlement::{Settler, WaitUntil};
use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::{HeaderMap, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::instrument;

use crate::endpoints::EndpointCatalog;
use crate::rapidapi::RapidApiClient;

pub const PAID_MESSAGE: &str = "Paid! Monad is blazing fast ⚡";

/// Everything the handlers share, built once at startup.
pub struct AppState<S> {
    pub gate: SettlementGate<S>,
    /// `None` disables `/api/twitter`.
    pub provider: Option<RapidApiClient>,
    pub endpoints: EndpointCatalog,
}

pub fn routes<S>() -> Router<Arc<AppState<S>>>
where
    S: Settler + Send + Sync + 'static,
{
    Router::new()
        .route("/api/premium", get(get_premium::<S>))
        .route("/api/twitter", post(post_twitter::<S>))
        .route("/api/endpoints", get(get_endpoints::<S>))
}

#[derive(Debug, Deserialize)]
pub struct NetworkQuery {
    network: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TwitterQuery {
    /// Any JSON value; only the string `"main"` selects mainnet.
    #[serde(default)]
    network: Option<Value>,
    #[serde(default)]
    username: Option<String>,
}

/// `GET /api/premium`: settles the payment, waiting for confirmation.
#[instrument(skip_all)]
pub async fn get_premium<S>(
    State(state): State<Arc<AppState<S>>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    Query(query): Query<NetworkQuery>,
) -> Response
where
    S: Settler + Send + Sync + 'static,
{
    let network = NetworkMode::from_param(query.network.as_deref());
    tracing::info!(
        payment_token = headers.contains_key(PAYMENT_HEADER_NAME),
        %network,
        "Premium request"
    );

    let request = state
        .gate
        .request(&method, &uri, &headers, network, WaitUntil::Confirmed);
    match state.gate.settle(&request).await {
        Ok(tx) => paid(tx, None),
        Err(rejection) => rejection.into_response(),
    }
}

/// `POST /api/twitter`: validates the username, settles without waiting for
/// confirmation, then fetches the profile.
#[instrument(skip_all)]
pub async fn post_twitter<S>(
    State(state): State<Arc<AppState<S>>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response
where
    S: Settler + Send + Sync + 'static,
{
    let Some(provider) = state.provider.as_ref() else {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ErrorResponse {
                error: "Twitter data provider is not configured".to_string(),
            }),
        )
            .into_response();
    };

    let query: TwitterQuery = match serde_json::from_slice(&body) {
        Ok(query) => query,
        Err(err) => {
            tracing::error!(error = %err, "Unreadable request body");
            return GateRejection::from_error_text(&err.to_string()).into_response();
        }
    };
    let username = match query.username {
        Some(username) if !username.is_empty() => username,
        _ => {
            return (
                StatusCode::BAD_REQUEST,
                Json(ErrorResponse {
                    error: "Username parameter is required in request body".to_string(),
                }),
            )
                .into_response();
        }
    };
    let network = NetworkMode::from_param(query.network.as_ref().and_then(Value::as_str));
    tracing::info!(
        payment_token = headers.contains_key(PAYMENT_HEADER_NAME),
        %network,
        %username,
        "Twitter request"
    );

    let request = state
        .gate
        .request(&method, &uri, &headers, network, WaitUntil::Submitted);
    let tx = match state.gate.settle(&request).await {
        Ok(tx) => tx,
        Err(rejection) => return rejection.into_response(),
    };

    match provider.user(&username).await {
        Ok(data) => paid(tx, Some(data)),
        Err(err) => err.into_response(),
    }
}

/// `GET /api/endpoints`
#[instrument(skip_all)]
pub async fn get_endpoints<S>(State(state): State<Arc<AppState<S>>>) -> impl IntoResponse
where
    S: Settler + Send + Sync + 'static,
{
    Json(EndpointsResponse {
        endpoints: state.endpoints.list().await,
    })
}

fn paid(tx: Value, data: Option<Value>) -> Response {
    let body = PaidResponse {
        message: PAID_MESSAGE.to_string(),
        tx,
        data,
    };
    (StatusCode::OK, Json(body)).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentpay_types::settlement::{SettlementRequest, SettlementResult};
    use agentpay_types::util::MoneyAmount;
    use alloy_primitives::Address;
    use axum::body::Body;
    use axum::http::Request;
    use serde_json::json;
    use std::sync::Mutex;
    use tower::ServiceExt;
    use wiremock::matchers::{method as http_method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    /// Settles with a canned outcome and records every request.
    struct StubSettler {
        outcome: Result<SettlementResult, String>,
        calls: Mutex<Vec<SettlementRequest>>,
    }

    impl Settler for StubSettler {
        type Error = String;

        async fn settle_payment(
            &self,
            request: &SettlementRequest,
        ) -> Result<SettlementResult, String> {
            self.calls.lock().unwrap().push(request.clone());
            self.outcome.clone()
        }
    }

    fn settled() -> Result<SettlementResult, String> {
        Ok(SettlementResult::Settled {
            receipt: json!({ "success": true, "transaction": "0xabc" }),
        })
    }

    fn state(
        outcome: Result<SettlementResult, String>,
        provider: Option<RapidApiClient>,
    ) -> Arc<AppState<StubSettler>> {
        let settler = StubSettler {
            outcome,
            calls: Mutex::new(Vec::new()),
        };
        Arc::new(AppState {
            gate: SettlementGate::new(
                settler,
                Address::repeat_byte(0x42),
                "http://localhost:3000".parse().unwrap(),
                MoneyAmount::parse("$0.0001").unwrap(),
            ),
            provider,
            endpoints: EndpointCatalog::new(
                std::env::temp_dir().join(format!("agentpay-no-routes-{}", std::process::id())),
            ),
        })
    }

    fn calls(state: &AppState<StubSettler>) -> Vec<SettlementRequest> {
        state.gate.settler().calls.lock().unwrap().clone()
    }

    async fn send(
        state: Arc<AppState<StubSettler>>,
        request: Request<Body>,
    ) -> (StatusCode, Value) {
        let response = routes().with_state(state).oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    fn premium(query: &str) -> Request<Body> {
        Request::get(format!("/api/premium{query}"))
            .header("x-payment", "dG9rZW4=")
            .body(Body::empty())
            .unwrap()
    }

    fn twitter(body: Value) -> Request<Body> {
        Request::post("/api/twitter")
            .header("x-payment", "dG9rZW4=")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn provider(response: ResponseTemplate) -> (MockServer, RapidApiClient) {
        let server = MockServer::start().await;
        Mock::given(http_method("GET"))
            .and(path("/user"))
            .respond_with(response)
            .mount(&server)
            .await;
        let client = RapidApiClient::new(server.uri().parse().unwrap(), "key");
        (server, client)
    }

    #[tokio::test]
    async fn test_premium_success_has_message_and_tx() {
        let state = state(settled(), None);
        let (status, body) = send(state.clone(), premium("?network=main")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], PAID_MESSAGE);
        assert_eq!(body["tx"]["transaction"], "0xabc");
        assert!(body.get("error").is_none());

        let calls = calls(&state);
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].network, NetworkMode::Main);
        assert_eq!(calls[0].wait_until, WaitUntil::Confirmed);
        assert_eq!(calls[0].resource_url, "http://localhost:3000/api/premium");
        assert_eq!(calls[0].payment_token.as_deref(), Some("dG9rZW4="));
    }

    #[tokio::test]
    async fn test_premium_defaults_to_dev() {
        let state = state(settled(), None);
        send(state.clone(), premium("?network=other")).await;
        assert_eq!(calls(&state)[0].network, NetworkMode::Dev);
    }

    #[tokio::test]
    async fn test_premium_timeout_is_408() {
        let accepts = json!([{ "scheme": "exact", "maxTimeoutSeconds": 300 }]);
        let state = state(
            Ok(SettlementResult::unsettled(
                500,
                json!({ "errorMessage": "A timeout occurred", "accepts": accepts }),
            )),
            None,
        );
        let (status, body) = send(state, premium("")).await;
        assert_eq!(status, StatusCode::REQUEST_TIMEOUT);
        assert_eq!(body["retryable"], true);
        assert_eq!(body["error"], "Payment settlement timeout");
        assert_eq!(body["accepts"], accepts);
    }

    #[tokio::test]
    async fn test_premium_refusal_is_relayed() {
        let refusal = json!({
            "x402Version": 1,
            "error": "X-PAYMENT header is required",
            "accepts": [{ "scheme": "exact", "maxTimeoutSeconds": 300 }]
        });
        let state = state(Ok(SettlementResult::unsettled(402, refusal.clone())), None);
        let (status, body) = send(state, premium("")).await;
        assert_eq!(status, StatusCode::PAYMENT_REQUIRED);
        assert_eq!(body, refusal);
    }

    #[tokio::test]
    async fn test_twitter_without_username_never_settles() {
        let (_server, client) = provider(ResponseTemplate::new(200)).await;
        for body in [json!({}), json!({ "username": "" }), json!({ "network": "main" })] {
            let state = state(settled(), Some(client.clone()));
            let (status, response) = send(state.clone(), twitter(body)).await;
            assert_eq!(status, StatusCode::BAD_REQUEST);
            assert_eq!(
                response,
                json!({ "error": "Username parameter is required in request body" })
            );
            assert!(calls(&state).is_empty());
        }
    }

    #[tokio::test]
    async fn test_twitter_success_folds_profile() {
        let profile = json!({ "result": { "name": "Monad" } });
        let (_server, client) =
            provider(ResponseTemplate::new(200).set_body_json(&profile)).await;
        let state = state(settled(), Some(client));
        let (status, body) = send(
            state.clone(),
            twitter(json!({ "network": "main", "username": "monad" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], PAID_MESSAGE);
        assert_eq!(body["data"], profile);

        let calls = calls(&state);
        assert_eq!(calls[0].wait_until, WaitUntil::Submitted);
        assert_eq!(calls[0].method, "POST");
    }

    #[tokio::test]
    async fn test_twitter_non_string_network_defaults_to_dev() {
        let (_server, client) =
            provider(ResponseTemplate::new(200).set_body_json(json!({}))).await;
        for network in [json!(true), json!(143), json!(["main"]), json!(null)] {
            let state = state(settled(), Some(client.clone()));
            let (status, _) = send(
                state.clone(),
                twitter(json!({ "network": network, "username": "monad" })),
            )
            .await;
            assert_eq!(status, StatusCode::OK);
            assert_eq!(calls(&state)[0].network, NetworkMode::Dev);
        }
    }

    #[tokio::test]
    async fn test_settler_timeout_skips_provider() {
        let server = MockServer::start().await;
        Mock::given(http_method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .expect(0)
            .mount(&server)
            .await;
        let client = RapidApiClient::new(server.uri().parse().unwrap(), "key");
        let state = state(
            Err("request to facilitator failed: connect ETIMEDOUT".to_string()),
            Some(client),
        );
        let (status, body) = send(state, twitter(json!({ "username": "monad" }))).await;
        assert_eq!(status, StatusCode::REQUEST_TIMEOUT);
        assert_eq!(body["retryable"], true);
    }

    #[tokio::test]
    async fn test_provider_failure_keeps_its_status() {
        let (_server, client) =
            provider(ResponseTemplate::new(429).set_body_string("rate limited")).await;
        let state = state(settled(), Some(client));
        let (status, body) = send(state, twitter(json!({ "username": "monad" }))).await;
        assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(
            body,
            json!({ "error": "Failed to fetch Twitter user data", "details": "rate limited" })
        );
    }

    #[tokio::test]
    async fn test_unparseable_twitter_body_is_500() {
        let (_server, client) = provider(ResponseTemplate::new(200)).await;
        let state = state(settled(), Some(client));
        let request = Request::post("/api/twitter")
            .body(Body::from("{not json"))
            .unwrap();
        let (status, body) = send(state.clone(), request).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "server error");
        assert!(calls(&state).is_empty());
    }

    #[tokio::test]
    async fn test_twitter_disabled_without_provider() {
        let state = state(settled(), None);
        let (status, _) = send(state.clone(), twitter(json!({ "username": "monad" }))).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert!(calls(&state).is_empty());
    }

    #[tokio::test]
    async fn test_endpoints_fallback() {
        let state = state(settled(), None);
        let request = Request::get("/api/endpoints").body(Body::empty()).unwrap();
        let (status, body) = send(state, request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "endpoints": ["/api/premium", "/api/twitter"] }));
    }
}
