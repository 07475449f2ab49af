use crate::config::Config;
use crate::notifier::Notifier;
use anyhow::{Context, Result, anyhow, bail};
use reqwest::blocking::Client;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use serde::Deserialize;
use std::time::Duration;
use tracing::info;

#[derive(Debug, Deserialize)]
struct PostMessageResponse {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
}

pub struct SlackNotifier {
    client: Client,
    endpoint: String,
}

impl SlackNotifier {
    pub fn new(config: &Config) -> Result<Self> {
        let token = config
            .slack_oauth_token
            .as_deref()
            .filter(|token| !token.trim().is_empty())
            .context("SLACK_OAUTH_TOKEN is not set")?;

        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {token}"))
                .context("Failed to build Authorization header")?,
        );

        let client = Client::builder()
            .timeout(Duration::from_secs(config.http_timeout_seconds.max(5)))
            .default_headers(headers)
            .build()
            .context("Failed to create Slack HTTP client")?;

        Ok(Self {
            client,
            endpoint: format!(
                "{}/chat.postMessage",
                config.slack_api_base_url.trim_end_matches('/')
            ),
        })
    }
}

impl Notifier for SlackNotifier {
    fn send_message(&self, channel: &str, text: &str) -> Result<()> {
        let response = self
            .client
            .post(&self.endpoint)
            .form(&[("channel", channel), ("text", text)])
            .send()
            .context("Slack chat.postMessage request failed")?;

        let status = response.status();
        let body = response
            .text()
            .context("Failed to read Slack response body")?;

        if !status.is_success() {
            bail!("Slack API error {status}: {body}");
        }

        check_post_message(&body)?;
        info!(channel, "sent a message to #{channel}");

        Ok(())
    }
}

/// Slack answers 200 even for rejected posts; the verdict is in `ok`.
fn check_post_message(body: &str) -> Result<()> {
    let parsed: PostMessageResponse = serde_json::from_str(body)
        .with_context(|| format!("Failed to parse Slack response: {body}"))?;

    if parsed.ok {
        Ok(())
    } else {
        Err(anyhow!(
            "Slack rejected message: {}",
            parsed.error.unwrap_or_else(|| "unknown_error".to_string())
        ))
    }
}
