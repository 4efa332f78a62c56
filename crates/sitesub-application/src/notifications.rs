// SPDX-License-Identifier: GPL-3.0-or-later
use async_trait::async_trait;
use reqwest::{Client, Proxy, Url};
use sitesub_config::{ChannelConfig, NotificationConfig};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, warn};

use crate::collaborators::{CollaboratorError, NotificationMessage, Notifier};

const TELEGRAM_API: &str = "https://api.telegram.org";

pub struct TelegramNotifier {
    client: Client,
    api_base: String,
    token: String,
    chat_id: String,
}

impl TelegramNotifier {
    pub fn new(client: Client, token: impl Into<String>, chat_id: impl Into<String>) -> Self {
        Self::with_api_base(client, TELEGRAM_API, token, chat_id)
    }

    pub fn with_api_base(
        client: Client,
        api_base: impl Into<String>,
        token: impl Into<String>,
        chat_id: impl Into<String>,
    ) -> Self {
        Self {
            client,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            token: token.into(),
            chat_id: chat_id.into(),
        }
    }

    /// The bot token is part of the path; errors built here and in `notify`
    /// never carry the url.
    fn endpoint(&self, method: &str) -> Result<Url, CollaboratorError> {
        Url::parse(&format!("{}/bot{}/{}", self.api_base, self.token, method)).map_err(|err| {
            CollaboratorError::Request(format!("invalid telegram url for {method}: {err}"))
        })
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn notify(&self, message: &NotificationMessage) -> Result<(), CollaboratorError> {
        let text = [message.title.as_str(), message.text.as_str()]
            .into_iter()
            .filter(|line| !line.is_empty())
            .collect::<Vec<_>>()
            .join("\n");

        let request = match message.image.as_deref() {
            Some(photo) => self.client.post(self.endpoint("sendPhoto")?).form(&[
                ("chat_id", self.chat_id.as_str()),
                ("photo", photo),
                ("caption", text.as_str()),
            ]),
            None => self.client.post(self.endpoint("sendMessage")?).form(&[
                ("chat_id", self.chat_id.as_str()),
                ("text", text.as_str()),
            ]),
        };

        let response = request
            .send()
            .await
            .map_err(|e| CollaboratorError::Request(e.without_url().to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .map_err(|e| CollaboratorError::Request(e.without_url().to_string()))?;
            return Err(CollaboratorError::HttpStatus {
                status: status.as_u16(),
                body,
            });
        }
        Ok(())
    }
}

/// Fans a message out to every independently configured channel; succeeds
/// when at least one channel delivered it.
pub struct IndependentNotifier {
    channels: Vec<TelegramNotifier>,
}

impl IndependentNotifier {
    pub fn new(channels: Vec<TelegramNotifier>) -> Self {
        Self { channels }
    }

    pub fn from_config(config: &NotificationConfig) -> Self {
        let channels = config
            .channels
            .iter()
            .filter_map(|channel| build_channel(channel, config.proxy_url.as_deref()))
            .collect();
        Self::new(channels)
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }
}

fn build_channel(channel: &ChannelConfig, proxy_url: Option<&str>) -> Option<TelegramNotifier> {
    if !channel.channel.eq_ignore_ascii_case("telegram") {
        warn!(
            target: "notify",
            channel = %channel.channel,
            "unsupported notification channel, skipped"
        );
        return None;
    }

    let (Some(token), Some(chat_id)) = (channel.token.as_deref(), channel.chat_id.as_deref())
    else {
        warn!(target: "notify", "telegram channel is missing token or chat_id, skipped");
        return None;
    };

    let mut builder = Client::builder().timeout(Duration::from_secs(10));
    if channel.proxy {
        if let Some(url) = proxy_url {
            match Proxy::all(url) {
                Ok(proxy) => builder = builder.proxy(proxy),
                Err(err) => {
                    warn!(target: "notify", error = %err, "invalid proxy url, sending directly")
                }
            }
        }
    }

    match builder.build() {
        Ok(client) => Some(TelegramNotifier::new(client, token, chat_id)),
        Err(err) => {
            error!(target: "notify", error = %err, "failed to build telegram client");
            None
        }
    }
}

#[async_trait]
impl Notifier for IndependentNotifier {
    async fn notify(&self, message: &NotificationMessage) -> Result<(), CollaboratorError> {
        let mut delivered = false;
        for channel in &self.channels {
            match channel.notify(message).await {
                Ok(()) => delivered = true,
                Err(err) => error!(target: "notify", error = %err, "telegram delivery failed"),
            }
        }

        if delivered {
            Ok(())
        } else {
            Err(CollaboratorError::Rejected(
                "no independent channel delivered the message".to_string(),
            ))
        }
    }
}

/// The independent channels when enabled, otherwise the host's default channel.
pub fn select_notifier(
    config: &NotificationConfig,
    host_default: Arc<dyn Notifier>,
) -> Arc<dyn Notifier> {
    if !config.independent {
        return host_default;
    }

    let independent = IndependentNotifier::from_config(config);
    if independent.is_empty() {
        warn!(target: "notify", "independent notifications enabled without a usable channel");
    }
    Arc::new(independent)
}
