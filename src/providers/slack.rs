//! Slack workspace integration.

// self
use crate::{
	_prelude::*,
	auth::CredentialPayload,
	config::AuthKind,
	http::HttpClient,
	operation::{
		ClientDescriptor, ConfigMap, OperationDescriptor, OperationKind, OperationResult,
		PayloadOptions, decode_config, health_operation, operation_failure, require_bearer,
		send_json,
	},
	provider::{Builder, BuilderFn, OAuthProvider, ensure_auth_kind},
	providers::{api_http, join_path, shared},
};

/// Provider type served by [`builder`].
pub const SLACK: &str = "slack";
/// Default Web API root.
pub const SLACK_API: &str = "https://slack.com/api";
/// Name of the pooled Web API client.
pub const SLACK_WEB_CLIENT: &str = "slack.web";
/// Message delivery operation.
pub const MESSAGE_SEND: &str = "message.send";

/// Authenticated Slack Web API client.
#[derive(Clone, Debug)]
pub struct SlackClient {
	http: HttpClient,
	base: Url,
	token: String,
}
impl SlackClient {
	/// Creates a client for `base` authenticated with `token`.
	pub fn new(http: HttpClient, base: Url, token: impl Into<String>) -> Self {
		Self { http, base, token: token.into() }
	}

	/// Calls a Web API method.
	///
	/// Slack reports failures as `{"ok": false, "error": ...}` with a 200 status; those are
	/// surfaced as operation failures carrying the Slack error code.
	pub async fn call(
		&self,
		method: &str,
		body: &Value,
		include_payload: bool,
	) -> Result<(Value, ConfigMap)> {
		let request =
			self.http.post(join_path(&self.base, method)).bearer_auth(&self.token).json(body);
		let (response, mut details) = send_json(request, include_payload).await?;

		if response.get("ok").and_then(Value::as_bool) == Some(true) {
			return Ok((response, details));
		}

		let error = response.get("error").and_then(Value::as_str).unwrap_or("unknown_error").to_owned();

		details.insert("error".into(), error.clone().into());

		Err(operation_failure(format!("Slack {method} failed: {error}"), error, details))
	}
}

#[derive(Debug, Deserialize)]
struct MessageConfig {
	channel: String,
	text: String,
	#[serde(default)]
	thread_ts: Option<String>,
	#[serde(default)]
	include_payloads: bool,
}

/// Builder for the `slack` provider.
pub fn builder() -> Arc<dyn Builder> {
	Arc::new(BuilderFn::new(SLACK, |spec| {
		ensure_auth_kind(spec, &[AuthKind::OAuth2])?;

		let base = spec.api_base_url_or(SLACK_API)?;
		let provider = OAuthProvider::new(spec)?
			.with_clients(vec![web_client(base, api_http()?)])
			.with_operations(vec![health(), message_send()]);

		Ok(shared(provider))
	}))
}

fn web_client(base: Url, http: HttpClient) -> ClientDescriptor {
	ClientDescriptor::new(
		SLACK_WEB_CLIENT,
		"Slack Web API client authenticated with the bot token.",
		move |credential: CredentialPayload, _config| {
			let client = require_bearer(&credential)
				.map(|token| SlackClient::new(http.clone(), base.clone(), token));

			async move { Ok(client?) }
		},
	)
}

fn health() -> OperationDescriptor {
	health_operation("Call auth.test with the bot token.", |input| async move {
		let options = decode_config::<PayloadOptions>(&input.config)?;
		let client = input.require_client::<SlackClient>()?;
		let (body, mut details) =
			client.call("auth.test", &Value::Object(Map::new()), options.include_payloads).await?;
		let team = body.get("team").and_then(Value::as_str).unwrap_or_default().to_owned();

		for key in ["team", "team_id", "user_id"] {
			if let Some(value) = body.get(key) {
				details.insert(key.into(), value.clone());
			}
		}

		Ok(OperationResult::ok(format!("Slack workspace {team} is reachable")).with_details(details))
	})
	.with_client(SLACK_WEB_CLIENT)
}

fn message_send() -> OperationDescriptor {
	OperationDescriptor::new(
		MESSAGE_SEND,
		OperationKind::MessageSend,
		"Post a message with chat.postMessage.",
		|input| async move {
			let config = decode_config::<MessageConfig>(&input.config)?;
			let client = input.require_client::<SlackClient>()?;
			let mut body = serde_json::json!({ "channel": config.channel, "text": config.text });

			if let Some(thread_ts) = &config.thread_ts {
				body["thread_ts"] = thread_ts.clone().into();
			}

			let (response, mut details) =
				client.call("chat.postMessage", &body, config.include_payloads).await?;

			if let Some(ts) = response.get("ts") {
				details.insert("ts".into(), ts.clone());
			}

			details.insert("channel".into(), config.channel.clone().into());

			Ok(OperationResult::ok(format!("Message sent to {}", config.channel)).with_details(details))
		},
	)
	.with_client(SLACK_WEB_CLIENT)
	.with_config_schema(serde_json::json!({
		"type": "object",
		"required": ["channel", "text"],
		"properties": {
			"channel": { "type": "string", "minLength": 1 },
			"text": { "type": "string", "minLength": 1 },
			"thread_ts": { "type": "string" },
			"include_payloads": { "type": "boolean" }
		},
		"additionalProperties": false
	}))
}

#[cfg(test)]
mod tests {
	// crates.io
	use httpmock::prelude::*;
	// self
	use super::*;
	use crate::{_preludet::*, operation::OperationStatus};

	fn client(server: &MockServer) -> SlackClient {
		SlackClient::new(
			HttpClient::new(None).expect("Client should build."),
			Url::parse(&server.url("/api")).expect("Mock URL should parse."),
			"xoxb-1",
		)
	}

	#[tokio::test]
	async fn call_surfaces_slack_error_codes() {
		let server = MockServer::start_async().await;
		let _mock = server
			.mock_async(|when, then| {
				when.method(POST).path("/api/chat.postMessage");
				then.status(200).json_body(serde_json::json!({ "ok": false, "error": "channel_not_found" }));
			})
			.await;
		let err = client(&server)
			.call("chat.postMessage", &serde_json::json!({ "channel": "C1" }), false)
			.await
			.expect_err("Call should fail.");
		let result = err.operation_result().expect("Failure should carry a result.");

		assert_eq!(result.status, OperationStatus::Failed);
		assert_eq!(result.details["error"], "channel_not_found");
	}

	#[tokio::test]
	async fn message_send_posts_channel_and_text() {
		let server = MockServer::start_async().await;
		let mock = server
			.mock_async(|when, then| {
				when.method(POST)
					.path("/api/chat.postMessage")
					.header("authorization", "Bearer xoxb-1")
					.json_body(serde_json::json!({ "channel": "C1", "text": "hello" }));
				then.status(200).json_body(serde_json::json!({ "ok": true, "ts": "1.2" }));
			})
			.await;
		let mut config = ConfigMap::new();

		config.insert("channel".into(), "C1".into());
		config.insert("text".into(), "hello".into());

		let client: crate::operation::ClientHandle = Arc::new(client(&server));
		let result = message_send()
			.invoke(
				crate::operation::OperationInput::new(oauth_payload(SLACK, "xoxb-1"), config)
					.with_client(client),
			)
			.await
			.expect("Message should be sent.");

		mock.assert_async().await;
		assert_eq!(result.details["ts"], "1.2");
		assert_eq!(result.summary, "Message sent to C1");
	}

	#[tokio::test]
	async fn message_send_requires_channel_and_text() {
		let mut config = ConfigMap::new();

		config.insert("channel".into(), "C1".into());

		let err = message_send()
			.invoke(crate::operation::OperationInput::new(oauth_payload(SLACK, "t"), config))
			.await
			.expect_err("Config should be rejected.");

		assert!(matches!(
			err,
			Error::Operation(crate::error::OperationError::InvalidConfig { ref path, .. }) if path == "$.text"
		));
	}
}
