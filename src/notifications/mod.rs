//! Notification delivery for newly discovered services.
//!
//! Delivery is fire-and-forget: the worker logs failures and moves on.

pub mod telegram;

use async_trait::async_trait;

use crate::config::NOTIFY_BANNER_LIMIT;
use crate::error_handling::NotifyError;
use crate::models::{Service, ServiceDetails};

pub use telegram::TelegramNotifier;

/// A notification channel.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, message: &str) -> Result<(), NotifyError>;
}

/// Formats the new-service notification: identity fields plus at most one
/// protocol-specific detail (HTTP/HTTPS status or SSH banner).
pub fn format_service_message(svc: &Service) -> String {
    let mut message = format!(
        "🚀 *New Service Discovered*\n\n*IP:* `{}`\n*Port:* `{}`\n*Protocol:* `{}`\n*TLS:* `{}`\n*Transport:* `{}`",
        svc.ip, svc.port, svc.protocol, svc.tls, svc.transport
    );

    match &svc.details {
        ServiceDetails::Http(info) | ServiceDetails::Https(info) => {
            message.push_str(&format!("\n*Status:* `{}`", info.status));
        }
        ServiceDetails::Ssh(info) if !info.banner.is_empty() => {
            let banner = info.banner.trim();
            let banner = if banner.len() > NOTIFY_BANNER_LIMIT {
                let mut truncated: String =
                    banner.chars().take(NOTIFY_BANNER_LIMIT).collect();
                truncated.push_str("...");
                truncated
            } else {
                banner.to_string()
            };
            message.push_str(&format!("\n*Banner:* `{banner}`"));
        }
        _ => {}
    }

    message
}
