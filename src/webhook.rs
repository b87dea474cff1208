//! Webhook notifications for intercepted messages.
//!
//! Each message is POSTed synchronously on the plugin's delivery thread, so
//! a slow endpoint delays delivery to the host by up to the configured
//! timeout. Failures never reach the host: they are logged and dropped.

use std::fmt;

use log::{debug, warn};
use ureq::Agent;

use crate::config::WebhookConfig;
use crate::error::Result;
use crate::interceptor::{Message, Notifier};

/// Header carrying the printer serial.
pub const DEVICE_ID_HEADER: &str = "dev_id";

/// Posts every intercepted message to the configured webhook URL.
pub struct WebhookDispatcher {
    url: Option<String>,
    agent: Agent,
}

impl WebhookDispatcher {
    /// Creates a dispatcher for `config`. Without a URL it does nothing.
    #[must_use]
    pub fn new(config: &WebhookConfig) -> Self {
        let agent = Agent::new_with_config(
            Agent::config_builder()
                .timeout_global(Some(config.timeout))
                .build(),
        );

        Self {
            url: config.url.clone().filter(|url| !url.is_empty()),
            agent,
        }
    }

    /// Whether a webhook URL is configured.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.url.is_some()
    }

    /// The configured webhook URL.
    #[must_use]
    pub fn url(&self) -> Option<&str> {
        self.url.as_deref()
    }

    /// Sends `message` to `url`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Webhook`] on connection failures, timeouts and
    /// non-2xx responses.
    ///
    /// [`Error::Webhook`]: crate::error::Error::Webhook
    pub fn post(&self, url: &str, message: &Message<'_>) -> Result<()> {
        let response = self
            .agent
            .post(url)
            .header("Content-Type", "application/json")
            .header(DEVICE_ID_HEADER, message.device_id().as_ref())
            .send(message.payload())?;

        debug!("webhook {url} answered {}", response.status());
        Ok(())
    }
}

impl Notifier for WebhookDispatcher {
    fn notify(&self, message: &Message<'_>) {
        let Some(url) = self.url.as_deref() else {
            debug!("no webhook url");
            return;
        };

        if let Err(e) = self.post(url, message) {
            warn!(
                "webhook notification for {} to {url} failed: {}",
                message.device_id(),
                error_chain(&e)
            );
        }
    }
}

impl fmt::Debug for WebhookDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WebhookDispatcher")
            .field("url", &self.url)
            .finish_non_exhaustive()
    }
}

fn error_chain(err: &dyn std::error::Error) -> String {
    let mut text = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        text.push_str(": ");
        text.push_str(&cause.to_string());
        source = cause.source();
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_disabled_without_url() {
        let dispatcher = WebhookDispatcher::new(&WebhookConfig::default());
        assert!(!dispatcher.is_enabled());
        assert_eq!(dispatcher.url(), None);

        // Nothing to send to, so this returns immediately.
        dispatcher.notify(&Message::new(b"D1", br#"{"x":1}"#));
    }

    #[test]
    fn test_empty_url_is_disabled() {
        let dispatcher = WebhookDispatcher::new(&WebhookConfig {
            url: Some(String::new()),
            timeout: Duration::from_secs(1),
        });
        assert!(!dispatcher.is_enabled());
    }

    #[test]
    fn test_error_chain_includes_sources() {
        let err = crate::error::Error::Io(std::io::Error::other("disk gone"));
        assert_eq!(error_chain(&err), "disk gone");
    }
}
