//! Outbound messaging client
//!
//! The orchestration core only knows the [`Messenger`] trait; this module
//! also provides the real implementation, a thin reqwest client for the
//! provider's bot API.

use async_trait::async_trait;
use eyre::{Context, Result, eyre};
use reqwest::Client;
use serde_json::json;
use std::time::Duration;
use tracing::debug;

use crate::bot::InlineKeyboard;
use crate::config::ChatConfig;

/// Outbound messaging contract consumed by event handlers
///
/// Failures are logged by callers and never retried by the core; a missed
/// reminder surfaces again on a later poll, a missed reply stays missed.
#[async_trait]
pub trait Messenger: Send + Sync {
    /// Send a plain text message to a chat
    async fn send_message(&self, chat_id: i64, text: &str) -> Result<()>;

    /// Send a text message with an inline keyboard attached
    async fn send_message_with_keyboard(&self, chat_id: i64, text: &str, keyboard: &InlineKeyboard) -> Result<()>;
}

/// Bot-API implementation of [`Messenger`]
#[derive(Debug)]
pub struct BotApi {
    http: Client,
    base_url: String,
    token: String,
}

impl BotApi {
    /// Create a client from configuration
    ///
    /// Reads the bot token from the environment variable named in config.
    pub fn from_config(config: &ChatConfig) -> Result<Self> {
        let token = std::env::var(&config.token_env)
            .map_err(|_| eyre!("bot token not found; set the {} environment variable", config.token_env))?;

        let http = Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()
            .context("failed to build HTTP client")?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            token,
        })
    }

    async fn call(&self, method: &str, body: serde_json::Value) -> Result<()> {
        let url = format!("{}/bot{}/{}", self.base_url, self.token, method);
        debug!(method, "BotApi: sending request");

        let response = self
            .http
            .post(&url)
            .json(&body)
            .send()
            .await
            .context("bot API request failed")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(eyre!("bot API returned {status}: {body}"));
        }
        Ok(())
    }
}

#[async_trait]
impl Messenger for BotApi {
    async fn send_message(&self, chat_id: i64, text: &str) -> Result<()> {
        self.call(
            "sendMessage",
            json!({
                "chat_id": chat_id,
                "text": text,
            }),
        )
        .await
    }

    async fn send_message_with_keyboard(&self, chat_id: i64, text: &str, keyboard: &InlineKeyboard) -> Result<()> {
        self.call(
            "sendMessage",
            json!({
                "chat_id": chat_id,
                "text": text,
                "reply_markup": keyboard,
            }),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_config_requires_token_env() {
        let config = ChatConfig {
            token_env: "NUDGEBOT_TEST_TOKEN_UNSET_12345".to_string(),
            ..Default::default()
        };
        let err = BotApi::from_config(&config).unwrap_err();
        assert!(err.to_string().contains("NUDGEBOT_TEST_TOKEN_UNSET_12345"));
    }
}
