//! Shared reqwest transport for token endpoints and provider API calls.
//!
//! [`HttpClient`] never follows redirects: token endpoints must answer directly, and provider
//! APIs that redirect are treated as misconfigured rather than silently chased.

// std
use std::{ops::Deref, time::Duration as StdDuration};
// crates.io
use oauth2::{AsyncHttpClient, HttpClientError, HttpRequest, HttpResponse};
use reqwest::redirect::Policy;
// self
use crate::{_prelude::*, config::OAuthSpec, error::ConfigError};

/// Timeout applied to token endpoint requests when the spec does not set one.
pub const DEFAULT_TOKEN_TIMEOUT: StdDuration = StdDuration::from_secs(30);

/// Thin wrapper around [`ReqwestClient`] so shared HTTP behavior lives in one place.
#[derive(Clone, Debug)]
pub struct HttpClient(pub ReqwestClient);
impl HttpClient {
	/// Builds a client that never follows redirects, with an optional request timeout.
	pub fn new(timeout: Option<StdDuration>) -> Result<Self, ConfigError> {
		let mut builder = ReqwestClient::builder().redirect(Policy::none());

		if let Some(timeout) = timeout {
			builder = builder.timeout(timeout);
		}

		Ok(Self(builder.build()?))
	}

	/// Builds the token endpoint client for `spec`, honoring `http_timeout_secs`.
	pub fn for_oauth(spec: &OAuthSpec) -> Result<Self, ConfigError> {
		Self::new(Some(
			spec.http_timeout_secs.map(StdDuration::from_secs).unwrap_or(DEFAULT_TOKEN_TIMEOUT),
		))
	}

	/// Wraps an existing reqwest [`ReqwestClient`].
	///
	/// Configure the client with [`Policy::none`]; redirects are never expected.
	pub fn with_client(client: ReqwestClient) -> Self {
		Self(client)
	}
}
impl AsRef<ReqwestClient> for HttpClient {
	fn as_ref(&self) -> &ReqwestClient {
		&self.0
	}
}
impl Deref for HttpClient {
	type Target = ReqwestClient;

	fn deref(&self) -> &Self::Target {
		&self.0
	}
}
impl<'c> AsyncHttpClient<'c> for HttpClient {
	type Error = HttpClientError<ReqwestError>;
	type Future =
		Pin<Box<dyn Future<Output = Result<HttpResponse, Self::Error>> + 'c + Send + Sync>>;

	fn call(&'c self, request: HttpRequest) -> Self::Future {
		let client = self.0.clone();

		Box::pin(async move {
			let response =
				client.execute(request.try_into().map_err(Box::new)?).await.map_err(Box::new)?;
			let status = response.status();
			let headers = response.headers().to_owned();
			let mut response_new =
				HttpResponse::new(response.bytes().await.map_err(Box::new)?.to_vec());

			*response_new.status_mut() = status;
			*response_new.headers_mut() = headers;

			Ok(response_new)
		})
	}
}

#[cfg(test)]
mod tests {
	// crates.io
	use httpmock::prelude::*;
	// self
	use super::*;

	#[tokio::test]
	async fn redirects_are_not_followed() {
		let server = MockServer::start_async().await;
		let target = server
			.mock_async(|when, then| {
				when.method(GET).path("/target");
				then.status(200);
			})
			.await;
		let redirect = server
			.mock_async(|when, then| {
				when.method(GET).path("/start");
				then.status(302).header("location", server.url("/target"));
			})
			.await;
		let client = HttpClient::new(None).expect("Client should build.");
		let response =
			client.get(server.url("/start")).send().await.expect("Request should complete.");

		assert_eq!(response.status().as_u16(), 302);
		redirect.assert_async().await;
		target.assert_calls_async(0).await;
	}

	#[tokio::test]
	async fn oauth_adapter_preserves_status_and_body() {
		let server = MockServer::start_async().await;
		let mock = server
			.mock_async(|when, then| {
				when.method(POST).path("/token");
				then.status(400).header("content-type", "application/json").body("{\"error\":\"x\"}");
			})
			.await;
		let client = HttpClient::new(Some(StdDuration::from_secs(5))).expect("Client should build.");
		let request = oauth2::http::Request::builder()
			.method("POST")
			.uri(server.url("/token"))
			.body(Vec::new())
			.expect("Request should build.");
		let response = client.call(request).await.expect("Call should succeed.");

		mock.assert_async().await;
		assert_eq!(response.status().as_u16(), 400);
		assert_eq!(response.body().as_slice(), b"{\"error\":\"x\"}");
	}
}
