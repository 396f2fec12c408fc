//! Operator HTTP surface: health, readiness, status, circuit control and
//! Prometheus metrics.

use alloy_primitives::Address;
use axum::{
	extract::{Query, Request, State},
	http::{header, StatusCode},
	middleware::{self, Next},
	response::{IntoResponse, Response},
	routing::{get, post},
	Json, Router,
};
use fulfiller_chains::{ChainClient, ChainInterface};
use fulfiller_core::breaker::CircuitBreaker;
use fulfiller_types::{token_address, TokenType};
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;

/// Shared state for the operator endpoints.
#[derive(Clone)]
pub struct AppState {
	pub chains: Arc<HashMap<u64, Arc<ChainClient>>>,
	pub breakers: Arc<HashMap<u64, CircuitBreaker>>,
	pub fulfiller_address: Address,
	pub metrics_api_key: Option<String>,
}

/// Builds the operator router.
pub fn router(state: AppState) -> Router {
	let metrics_route = Router::new()
		.route("/metrics", get(handle_metrics))
		.layer(middleware::from_fn_with_state(
			state.clone(),
			metrics_auth_middleware,
		));

	Router::new()
		.route("/health", get(handle_health))
		.route("/ready", get(handle_ready))
		.route("/status", get(handle_status))
		.route("/circuit/reset", post(handle_circuit_reset))
		.merge(metrics_route)
		.with_state(state)
}

/// Serves the operator surface until the shutdown flag flips.
pub async fn serve(
	port: u16,
	state: AppState,
	mut shutdown: watch::Receiver<bool>,
) -> Result<(), std::io::Error> {
	let listener = TcpListener::bind(("0.0.0.0", port)).await?;
	tracing::info!(port, "Starting health and metrics server");
	axum::serve(listener, router(state))
		.with_graceful_shutdown(async move {
			let _ = shutdown.changed().await;
		})
		.await
}

async fn handle_health() -> &'static str {
	"OK"
}

async fn handle_ready(State(state): State<AppState>) -> Response {
	for chain_id in state.breakers.keys() {
		if !state.chains.contains_key(chain_id) {
			return (
				StatusCode::SERVICE_UNAVAILABLE,
				format!("Chain {chain_id} client not connected"),
			)
				.into_response();
		}
	}
	(StatusCode::OK, "Ready").into_response()
}

async fn handle_status(State(state): State<AppState>) -> Json<Value> {
	let mut status = Map::new();
	for (chain_id, client) in state.chains.iter() {
		let circuit = match state.breakers.get(chain_id) {
			Some(breaker) if breaker.is_open() => "open",
			_ => "closed",
		};

		let mut chain_status = Map::new();
		chain_status.insert("rpc_url".into(), json!(client.rpc_url()));
		chain_status.insert(
			"intent_address".into(),
			json!(client.intent_address().to_string()),
		);
		chain_status.insert("connected".into(), json!(true));
		chain_status.insert("circuit".into(), json!(circuit));

		if let Ok(block) = client.latest_block_number().await {
			chain_status.insert("latest_block".into(), json!(block));
		}

		let mut balances = Map::new();
		for token in [TokenType::Usdc, TokenType::Usdt] {
			let Some(address) = token_address(*chain_id, token) else {
				continue;
			};
			if let Ok(balance) = client
				.erc20_balance(address, state.fulfiller_address)
				.await
			{
				let symbol = client
					.erc20_symbol(address)
					.await
					.unwrap_or_else(|_| token.as_str().to_string());
				balances.insert(symbol, json!(balance.to_string()));
			}
		}
		if !balances.is_empty() {
			chain_status.insert("token_balances".into(), Value::Object(balances));
		}

		status.insert(format!("chain_{chain_id}"), Value::Object(chain_status));
	}
	Json(Value::Object(status))
}

async fn handle_circuit_reset(
	State(state): State<AppState>,
	Query(params): Query<HashMap<String, String>>,
) -> Response {
	let Some(raw) = params.get("chain") else {
		return (StatusCode::BAD_REQUEST, "Missing chain parameter").into_response();
	};
	let Ok(chain_id) = raw.parse::<u64>() else {
		return (StatusCode::BAD_REQUEST, "Invalid chain ID").into_response();
	};
	let Some(breaker) = state.breakers.get(&chain_id) else {
		return (
			StatusCode::NOT_FOUND,
			format!("No circuit breaker for chain {chain_id}"),
		)
			.into_response();
	};

	breaker.reset();
	tracing::info!(chain_id, "Circuit breaker manually reset");
	(
		StatusCode::OK,
		format!("Circuit breaker for chain {chain_id} reset"),
	)
		.into_response()
}

async fn handle_metrics() -> Response {
	match fulfiller_monitoring::gather() {
		Ok(body) => (
			StatusCode::OK,
			[(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
			body,
		)
			.into_response(),
		Err(e) => {
			tracing::error!(error = %e, "Failed to encode metrics");
			(StatusCode::INTERNAL_SERVER_ERROR, "encoding failure").into_response()
		},
	}
}

/// Bearer-token check for `/metrics`, skipped when no key is configured.
async fn metrics_auth_middleware(
	State(state): State<AppState>,
	request: Request,
	next: Next,
) -> Response {
	let Some(expected) = state.metrics_api_key.as_deref() else {
		return next.run(request).await;
	};

	let header_value = request
		.headers()
		.get(header::AUTHORIZATION)
		.and_then(|v| v.to_str().ok());
	let Some(header_value) = header_value else {
		return (StatusCode::UNAUTHORIZED, "Missing Authorization header").into_response();
	};
	let Some(token) = header_value.strip_prefix("Bearer ") else {
		return (
			StatusCode::UNAUTHORIZED,
			"Invalid Authorization header format",
		)
			.into_response();
	};
	if token != expected {
		return (StatusCode::UNAUTHORIZED, "Invalid API key").into_response();
	}
	next.run(request).await
}

#[cfg(test)]
mod tests {
	use super::*;
	use alloy_primitives::U256;
	use axum::body::Body;
	use axum::http::Request as HttpRequest;
	use fulfiller_config::{ChainSettings, CircuitBreakerSettings};
	use std::time::Duration;
	use tower::ServiceExt;

	fn breaker_settings() -> CircuitBreakerSettings {
		CircuitBreakerSettings {
			enabled: true,
			threshold: 1,
			window: Duration::from_secs(300),
			reset_timeout: Duration::from_secs(900),
		}
	}

	fn test_state() -> AppState {
		let settings = ChainSettings {
			chain_id: 137,
			name: "Polygon".into(),
			rpc_url: "http://127.0.0.1:9".into(),
			intent_address: "0x4017717c550E4B6E61048D412a718D6A8078d264"
				.parse()
				.unwrap(),
			min_fee: U256::from(100_000u64),
			gas_multiplier: 1.1,
		};
		let key = "11".repeat(32);
		let client = ChainClient::connect(&settings, U256::from(1_000_000_000u64), &key).unwrap();
		client.stop_fee_updates();

		let mut chains = HashMap::new();
		chains.insert(137u64, client);
		let mut breakers = HashMap::new();
		breakers.insert(137u64, CircuitBreaker::new(&breaker_settings()));

		AppState {
			chains: Arc::new(chains),
			breakers: Arc::new(breakers),
			fulfiller_address: Address::ZERO,
			metrics_api_key: None,
		}
	}

	async fn body_string(response: Response) -> String {
		let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
			.await
			.unwrap();
		String::from_utf8(bytes.to_vec()).unwrap()
	}

	#[tokio::test]
	async fn test_health_returns_ok() {
		let response = router(test_state())
			.oneshot(
				HttpRequest::builder()
					.uri("/health")
					.body(Body::empty())
					.unwrap(),
			)
			.await
			.unwrap();
		assert_eq!(response.status(), StatusCode::OK);
		assert_eq!(body_string(response).await, "OK");
	}

	#[tokio::test]
	async fn test_ready_when_all_chains_connected() {
		let response = router(test_state())
			.oneshot(
				HttpRequest::builder()
					.uri("/ready")
					.body(Body::empty())
					.unwrap(),
			)
			.await
			.unwrap();
		assert_eq!(response.status(), StatusCode::OK);
		assert_eq!(body_string(response).await, "Ready");
	}

	#[tokio::test]
	async fn test_status_reports_chain_and_circuit() {
		let state = test_state();
		state.breakers.get(&137).unwrap().record_failure();

		let response = router(state)
			.oneshot(
				HttpRequest::builder()
					.uri("/status")
					.body(Body::empty())
					.unwrap(),
			)
			.await
			.unwrap();
		assert_eq!(response.status(), StatusCode::OK);

		let body: Value = serde_json::from_str(&body_string(response).await).unwrap();
		let chain = &body["chain_137"];
		assert_eq!(chain["connected"], json!(true));
		assert_eq!(chain["circuit"], json!("open"));
		assert_eq!(chain["rpc_url"], json!("http://127.0.0.1:9"));
		// The RPC is unreachable, so best-effort fields are omitted.
		assert!(chain.get("latest_block").is_none());
	}

	#[tokio::test]
	async fn test_circuit_reset_closes_breaker() {
		let state = test_state();
		state.breakers.get(&137).unwrap().record_failure();
		assert!(state.breakers.get(&137).unwrap().is_open());

		let response = router(state.clone())
			.oneshot(
				HttpRequest::builder()
					.method("POST")
					.uri("/circuit/reset?chain=137")
					.body(Body::empty())
					.unwrap(),
			)
			.await
			.unwrap();
		assert_eq!(response.status(), StatusCode::OK);
		assert!(!state.breakers.get(&137).unwrap().is_open());
	}

	#[tokio::test]
	async fn test_circuit_reset_validates_input() {
		let app = router(test_state());

		let missing = app
			.clone()
			.oneshot(
				HttpRequest::builder()
					.method("POST")
					.uri("/circuit/reset")
					.body(Body::empty())
					.unwrap(),
			)
			.await
			.unwrap();
		assert_eq!(missing.status(), StatusCode::BAD_REQUEST);

		let invalid = app
			.clone()
			.oneshot(
				HttpRequest::builder()
					.method("POST")
					.uri("/circuit/reset?chain=polygon")
					.body(Body::empty())
					.unwrap(),
			)
			.await
			.unwrap();
		assert_eq!(invalid.status(), StatusCode::BAD_REQUEST);

		let unknown = app
			.clone()
			.oneshot(
				HttpRequest::builder()
					.method("POST")
					.uri("/circuit/reset?chain=31337")
					.body(Body::empty())
					.unwrap(),
			)
			.await
			.unwrap();
		assert_eq!(unknown.status(), StatusCode::NOT_FOUND);

		let wrong_method = app
			.oneshot(
				HttpRequest::builder()
					.uri("/circuit/reset?chain=137")
					.body(Body::empty())
					.unwrap(),
			)
			.await
			.unwrap();
		assert_eq!(wrong_method.status(), StatusCode::METHOD_NOT_ALLOWED);
	}

	#[tokio::test]
	async fn test_metrics_open_without_key() {
		let response = router(test_state())
			.oneshot(
				HttpRequest::builder()
					.uri("/metrics")
					.body(Body::empty())
					.unwrap(),
			)
			.await
			.unwrap();
		assert_eq!(response.status(), StatusCode::OK);
	}

	#[tokio::test]
	async fn test_metrics_auth_enforced() {
		let mut state = test_state();
		state.metrics_api_key = Some("sekrit".into());
		let app = router(state);

		let unauthorized = app
			.clone()
			.oneshot(
				HttpRequest::builder()
					.uri("/metrics")
					.body(Body::empty())
					.unwrap(),
			)
			.await
			.unwrap();
		assert_eq!(unauthorized.status(), StatusCode::UNAUTHORIZED);

		let wrong_scheme = app
			.clone()
			.oneshot(
				HttpRequest::builder()
					.uri("/metrics")
					.header("Authorization", "Basic sekrit")
					.body(Body::empty())
					.unwrap(),
			)
			.await
			.unwrap();
		assert_eq!(wrong_scheme.status(), StatusCode::UNAUTHORIZED);

		let wrong_key = app
			.clone()
			.oneshot(
				HttpRequest::builder()
					.uri("/metrics")
					.header("Authorization", "Bearer nope")
					.body(Body::empty())
					.unwrap(),
			)
			.await
			.unwrap();
		assert_eq!(wrong_key.status(), StatusCode::UNAUTHORIZED);

		let authorized = app
			.oneshot(
				HttpRequest::builder()
					.uri("/metrics")
					.header("Authorization", "Bearer sekrit")
					.body(Body::empty())
					.unwrap(),
			)
			.await
			.unwrap();
		assert_eq!(authorized.status(), StatusCode::OK);
	}
}
