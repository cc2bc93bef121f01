use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::models::Embed;

pub const DEFAULT_COLOR: u32 = 0x5865f2;

const MAX_TITLE_CHARS: usize = 256;
const MAX_DESCRIPTION_CHARS: usize = 4096;
const MAX_AUTHOR_CHARS: usize = 256;
const MAX_FOOTER_CHARS: usize = 2048;

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("webhook returned {status}: {body}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },

    #[error("rate limited: retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: f64 },

    #[error("failed to serialize payload: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[async_trait::async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, embeds: &[Embed]) -> Result<(), NotifyError>;

    fn channel_name(&self) -> &str;
}

pub struct DiscordWebhook {
    url: String,
    http: reqwest::Client,
}

impl DiscordWebhook {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            http: reqwest::Client::new(),
        }
    }

    async fn post(&self, body: &str) -> Result<reqwest::Response, NotifyError> {
        let response = self
            .http
            .post(&self.url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body.to_string())
            .send()
            .await?;
        Ok(response)
    }
}

#[async_trait::async_trait]
impl Notifier for DiscordWebhook {
    async fn send(&self, embeds: &[Embed]) -> Result<(), NotifyError> {
        let body = serde_json::to_string(&WebhookBody::from_embeds(embeds))?;

        tracing::debug!(embeds = embeds.len(), "Sending webhook");
        let mut response = self.post(&body).await?;

        if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after_secs = retry_after(response).await;
            tracing::warn!(retry_after_secs, "Webhook rate limited, retrying once");
            tokio::time::sleep(Duration::from_secs_f64(retry_after_secs)).await;

            response = self.post(&body).await?;
            if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
                return Err(NotifyError::RateLimited {
                    retry_after_secs: retry_after(response).await,
                });
            }
        }

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(NotifyError::Status { status, body });
        }

        Ok(())
    }

    fn channel_name(&self) -> &str {
        "discord-webhook"
    }
}

#[derive(Debug, Deserialize)]
struct RateLimitBody {
    retry_after: f64,
}

async fn retry_after(response: reqwest::Response) -> f64 {
    response
        .json::<RateLimitBody>()
        .await
        .map(|body| body.retry_after)
        .unwrap_or(1.0)
        .clamp(0.0, 60.0)
}

#[derive(Debug, Serialize)]
struct WebhookBody<'a> {
    embeds: Vec<WireEmbed<'a>>,
}

#[derive(Debug, Serialize)]
struct WireEmbed<'a> {
    title: String,
    description: String,
    color: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    url: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    author: Option<WireName>,
    #[serde(skip_serializing_if = "Option::is_none")]
    footer: Option<WireText>,
    #[serde(skip_serializing_if = "Option::is_none")]
    timestamp: Option<String>,
}

#[derive(Debug, Serialize)]
struct WireName {
    name: String,
}

#[derive(Debug, Serialize)]
struct WireText {
    text: String,
}

impl<'a> WebhookBody<'a> {
    fn from_embeds(embeds: &'a [Embed]) -> Self {
        Self {
            embeds: embeds.iter().map(WireEmbed::from).collect(),
        }
    }
}

impl<'a> From<&'a Embed> for WireEmbed<'a> {
    fn from(embed: &'a Embed) -> Self {
        Self {
            title: truncate_chars(&embed.title, MAX_TITLE_CHARS),
            description: truncate_chars(&embed.description, MAX_DESCRIPTION_CHARS),
            color: embed.color.unwrap_or(DEFAULT_COLOR),
            url: embed.url.as_deref(),
            author: embed
                .author
                .as_deref()
                .filter(|name| !name.is_empty())
                .map(|name| WireName {
                    name: truncate_chars(name, MAX_AUTHOR_CHARS),
                }),
            footer: embed
                .footer
                .as_deref()
                .filter(|text| !text.is_empty())
                .map(|text| WireText {
                    text: truncate_chars(text, MAX_FOOTER_CHARS),
                }),
            timestamp: embed.timestamp.map(|ts| ts.to_rfc3339()),
        }
    }
}

fn truncate_chars(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let mut truncated: String = text.chars().take(max.saturating_sub(3)).collect();
    truncated.push_str("...");
    truncated
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[test]
    fn wire_embed_uses_default_color_and_skips_empty_fields() {
        let embeds = vec![Embed::new("Tytuł", "Treść")];
        let json = serde_json::to_value(WebhookBody::from_embeds(&embeds)).unwrap();
        let embed = &json["embeds"][0];
        assert_eq!(embed["title"], "Tytuł");
        assert_eq!(embed["color"], DEFAULT_COLOR);
        assert!(embed.get("author").is_none());
        assert!(embed.get("footer").is_none());
        assert!(embed.get("timestamp").is_none());
    }

    #[test]
    fn wire_embed_carries_optional_fields() {
        let embeds = vec![Embed::new("Sprawdzian", "Matematyka")
            .author("Jan Kowalski")
            .footer("Dodano wydarzenie")
            .url("https://synergia.librus.pl/terminarz")
            .color(0x57f287)
            .timestamp(Utc.with_ymd_and_hms(2024, 3, 12, 0, 0, 0).unwrap())];
        let json = serde_json::to_value(WebhookBody::from_embeds(&embeds)).unwrap();
        let embed = &json["embeds"][0];
        assert_eq!(embed["author"]["name"], "Jan Kowalski");
        assert_eq!(embed["footer"]["text"], "Dodano wydarzenie");
        assert_eq!(embed["color"], 0x57f287);
        assert_eq!(embed["timestamp"], "2024-03-12T00:00:00+00:00");
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        let long = "ż".repeat(300);
        let truncated = truncate_chars(&long, MAX_TITLE_CHARS);
        assert_eq!(truncated.chars().count(), MAX_TITLE_CHARS);
        assert!(truncated.ends_with("..."));
        assert_eq!(truncate_chars("krótki", MAX_TITLE_CHARS), "krótki");
    }

    #[test]
    fn channel_name_is_discord_webhook() {
        let webhook = DiscordWebhook::new("https://discord.com/api/webhooks/1/abc");
        assert_eq!(webhook.channel_name(), "discord-webhook");
    }
}
