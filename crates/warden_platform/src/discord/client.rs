#![forbid(unsafe_code)]

use std::time::Duration;

use reqwest::StatusCode;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};
use url::Url;

use super::DiscordConfig;
use crate::GatewayError;

/// Longest rate-limit wait absorbed inline; anything longer is surfaced as `RateLimited`.
const MAX_INLINE_RETRY_DELAY: Duration = Duration::from_secs(5);
const SERVER_ERROR_RETRY_DELAY: Duration = Duration::from_millis(250);

fn retry_delay_from_headers(headers: &HeaderMap) -> Option<Duration> {
	let raw = headers
		.get("x-ratelimit-reset-after")
		.or_else(|| headers.get(RETRY_AFTER))?
		.to_str()
		.ok()?;
	let secs: f64 = raw.trim().parse().ok()?;
	if !secs.is_finite() || secs < 0.0 {
		return None;
	}
	Duration::try_from_secs_f64(secs).ok()
}

fn transport(label: &'static str, err: reqwest::Error) -> GatewayError {
	GatewayError::Transport(format!("{label}: {err}"))
}

/// Thin authenticated REST client for the Discord HTTP API.
#[derive(Debug, Clone)]
pub(crate) struct RestClient {
	http: reqwest::Client,
	base: Url,
	authorization: String,
}

impl RestClient {
	pub(crate) fn new(cfg: &DiscordConfig) -> Result<Self, GatewayError> {
		let http = reqwest::Client::builder()
			.user_agent(cfg.user_agent.clone())
			.build()
			.map_err(|e| transport("build reqwest client", e))?;

		// A trailing slash keeps the version segment when joining relative paths.
		let mut base = cfg.api_base.trim().to_string();
		if !base.ends_with('/') {
			base.push('/');
		}
		let base = Url::parse(&base).map_err(|e| GatewayError::Transport(format!("invalid discord api base {base}: {e}")))?;

		Ok(Self {
			http,
			base,
			authorization: format!("Bot {}", cfg.token.expose().trim()),
		})
	}

	pub(crate) fn url(&self, path: &str) -> Result<Url, GatewayError> {
		self.base
			.join(path.trim_start_matches('/'))
			.map_err(|e| GatewayError::Transport(format!("join discord url {path}: {e}")))
	}

	async fn execute(&self, req: reqwest::RequestBuilder, label: &'static str) -> Result<reqwest::Response, GatewayError> {
		let req = req.header("Authorization", &self.authorization);
		let retry_builder = req.try_clone();
		let mut resp = req.send().await.map_err(|e| transport(label, e))?;
		let status = resp.status();

		let retry_delay = if status == StatusCode::TOO_MANY_REQUESTS {
			retry_delay_from_headers(resp.headers()).filter(|d| *d <= MAX_INLINE_RETRY_DELAY)
		} else if status.is_server_error() {
			Some(SERVER_ERROR_RETRY_DELAY)
		} else {
			None
		};

		if let (Some(delay), Some(retry)) = (retry_delay, retry_builder) {
			if status.is_server_error() {
				warn!(label, %status, "discord server error; retrying once");
			} else {
				debug!(label, delay_ms = delay.as_millis() as u64, "discord rate limited; retrying once");
			}
			tokio::time::sleep(delay).await;
			resp = retry.send().await.map_err(|e| transport(label, e))?;
		}

		classify(resp, label).await
	}

	pub(crate) async fn get_json<T: DeserializeOwned>(&self, url: Url, label: &'static str) -> Result<T, GatewayError> {
		let resp = self.execute(self.http.get(url), label).await?;
		decode(resp, label).await
	}

	pub(crate) async fn post_json<B: Serialize, T: DeserializeOwned>(
		&self,
		url: Url,
		body: &B,
		label: &'static str,
	) -> Result<T, GatewayError> {
		let resp = self.execute(self.http.post(url).json(body), label).await?;
		decode(resp, label).await
	}

	pub(crate) async fn post_empty<B: Serialize>(&self, url: Url, body: &B, label: &'static str) -> Result<(), GatewayError> {
		self.execute(self.http.post(url).json(body), label).await.map(|_| ())
	}

	pub(crate) async fn delete(&self, url: Url, label: &'static str) -> Result<(), GatewayError> {
		self.execute(self.http.delete(url), label).await.map(|_| ())
	}
}

async fn classify(resp: reqwest::Response, label: &'static str) -> Result<reqwest::Response, GatewayError> {
	let status = resp.status();
	if status.is_success() {
		return Ok(resp);
	}

	let retry_after = retry_delay_from_headers(resp.headers());
	let body = resp.text().await.unwrap_or_default();
	debug!(label, %status, body = %body, "discord request failed");

	Err(match status {
		StatusCode::NOT_FOUND => GatewayError::NotFound,
		StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => GatewayError::Forbidden(format!("{label}: {body}")),
		StatusCode::TOO_MANY_REQUESTS => GatewayError::RateLimited { retry_after },
		other => GatewayError::Http {
			status: other.as_u16(),
			body,
		},
	})
}

async fn decode<T: DeserializeOwned>(resp: reqwest::Response, label: &'static str) -> Result<T, GatewayError> {
	let body = resp.text().await.map_err(|e| transport(label, e))?;
	serde_json::from_str(&body).map_err(|e| GatewayError::Decode(format!("{label}: {e}")))
}
