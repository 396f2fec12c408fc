//! Client for the upstream intents API.
//!
//! The API has grown several response envelopes over time, so the parser
//! accepts a bare intent array, an object keyed by `intents`, `data` or
//! `results`, a paginated envelope whose `total_count` of zero means "no
//! pending intents", and as a last resort scans top-level object fields for
//! the first array that parses as intents.

use fulfiller_types::Intent;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

const FETCH_TIMEOUT: Duration = Duration::from_secs(10);
const IDLE_POOL_SIZE: usize = 100;
const IDLE_POOL_TIMEOUT: Duration = Duration::from_secs(90);
const BODY_PREVIEW_LEN: usize = 512;

/// Errors raised while fetching pending intents.
#[derive(Debug, Error)]
pub enum ApiError {
	#[error("failed to fetch pending intents: {0}")]
	Network(String),
	#[error("unexpected status code: {status}, body: {body}")]
	Protocol { status: u16, body: String },
}

/// HTTP client for the intents API.
pub struct ApiClient {
	http: reqwest::Client,
	endpoint: String,
}

/// Paginated envelope; every field is optional so the same struct also
/// matches the keyed-array shapes.
#[derive(Debug, Default, Deserialize)]
struct ApiEnvelope {
	#[serde(default)]
	intents: Vec<Intent>,
	#[serde(default)]
	data: Vec<Intent>,
	#[serde(default)]
	results: Vec<Intent>,
	#[serde(default)]
	page: Option<u64>,
	#[serde(default)]
	total_pages: Option<u64>,
	#[serde(default)]
	total_count: Option<u64>,
}

impl ApiClient {
	/// Builds a client with connection reuse and a 10 s request timeout.
	pub fn new(endpoint: &str) -> Result<Self, ApiError> {
		let http = reqwest::Client::builder()
			.timeout(FETCH_TIMEOUT)
			.pool_max_idle_per_host(IDLE_POOL_SIZE)
			.pool_idle_timeout(IDLE_POOL_TIMEOUT)
			.build()
			.map_err(|e| ApiError::Network(format!("failed to build HTTP client: {e}")))?;
		Ok(Self {
			http,
			endpoint: endpoint.trim_end_matches('/').to_string(),
		})
	}

	/// Fetches the current pending intents.
	pub async fn fetch_pending(&self) -> Result<Vec<Intent>, ApiError> {
		let url = format!("{}/api/v1/intents?status=pending", self.endpoint);
		let response = self
			.http
			.get(&url)
			.send()
			.await
			.map_err(|e| ApiError::Network(e.to_string()))?;

		let status = response.status();
		let body = response
			.text()
			.await
			.map_err(|e| ApiError::Network(format!("failed to read response body: {e}")))?;

		if !status.is_success() {
			return Err(ApiError::Protocol {
				status: status.as_u16(),
				body: preview(&body),
			});
		}

		Ok(parse_intents_body(&body))
	}
}

/// Parses an API response body into intents, tolerating the known envelope
/// shapes. A body that matches none of them yields an empty list, not an
/// error.
pub(crate) fn parse_intents_body(body: &str) -> Vec<Intent> {
	// Bare array.
	if let Ok(intents) = serde_json::from_str::<Vec<Intent>>(body) {
		return intents;
	}

	// Keyed or paginated envelope.
	if let Ok(envelope) = serde_json::from_str::<ApiEnvelope>(body) {
		if !envelope.intents.is_empty() {
			return envelope.intents;
		}
		if !envelope.data.is_empty() {
			return envelope.data;
		}
		if !envelope.results.is_empty() {
			return envelope.results;
		}
		if envelope.total_count == Some(0) {
			tracing::debug!(
				page = envelope.page,
				total_pages = envelope.total_pages,
				"No pending intents found"
			);
			return Vec::new();
		}
	}

	// Unknown shape: scan top-level fields for the first array that parses
	// as intents.
	if let Ok(serde_json::Value::Object(fields)) = serde_json::from_str(body) {
		for (key, value) in fields {
			if value.is_array() {
				if let Ok(intents) = serde_json::from_value::<Vec<Intent>>(value) {
					if !intents.is_empty() {
						tracing::debug!(field = %key, "Found intents in unexpected field");
						return intents;
					}
				}
			}
		}
	}

	tracing::debug!("No pending intents found in API response");
	Vec::new()
}

fn preview(body: &str) -> String {
	if body.len() <= BODY_PREVIEW_LEN {
		body.to_string()
	} else {
		let cut = body
			.char_indices()
			.take_while(|(i, _)| *i < BODY_PREVIEW_LEN)
			.last()
			.map(|(i, c)| i + c.len_utf8())
			.unwrap_or(0);
		format!("{}...", &body[..cut])
	}
}
