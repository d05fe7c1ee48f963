//! Telegram notification channel.

use async_trait::async_trait;
use serde_json::json;

use crate::error_handling::NotifyError;

use super::Notifier;

/// Sends Markdown messages through the Telegram bot API.
pub struct TelegramNotifier {
    token: String,
    chat_id: i64,
    client: reqwest::Client,
}

impl TelegramNotifier {
    pub fn new(token: String, chat_id: i64) -> Self {
        TelegramNotifier {
            token,
            chat_id,
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn notify(&self, message: &str) -> Result<(), NotifyError> {
        let url = format!("https://api.telegram.org/bot{}/sendMessage", self.token);
        let response = self
            .client
            .post(&url)
            .json(&json!({
                "chat_id": self.chat_id,
                "text": message,
                "parse_mode": "Markdown",
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(NotifyError::Status(response.status().as_u16()));
        }
        Ok(())
    }
}
