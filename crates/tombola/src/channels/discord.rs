// Tombola
// Copyright (C) 2025 Throneless Tech

// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.

// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU Affero General Public License for more details.

// You should have received a copy of the GNU Affero General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.

use async_trait::async_trait;
use reqwest::{
    Client, RequestBuilder, Response, StatusCode,
    header::{AUTHORIZATION, HeaderMap, RETRY_AFTER},
};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::debug;
use url::Url;

use super::{MessageHandle, Platform, PlatformError, UserHandle};
use crate::settings::DiscordSettings;

const REACTION_PAGE_SIZE: usize = 100;

#[derive(Debug, Deserialize)]
struct DiscordUser {
    id: String,
    #[serde(default)]
    bot: bool,
}

impl From<DiscordUser> for UserHandle {
    fn from(user: DiscordUser) -> Self {
        UserHandle {
            id: user.id,
            bot: user.bot,
        }
    }
}

#[derive(Debug, Deserialize)]
struct DiscordMessage {
    id: String,
    channel_id: String,
}

impl From<DiscordMessage> for MessageHandle {
    fn from(message: DiscordMessage) -> Self {
        MessageHandle {
            channel_id: message.channel_id,
            message_id: message.id,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RateLimited {
    retry_after: f64,
}

/// Discord REST client covering the calls in [`Platform`].
pub struct DiscordPlatform {
    client: Client,
    api_base: Url,
    token: String,
}

impl DiscordPlatform {
    pub fn new(settings: &DiscordSettings) -> Result<Self, PlatformError> {
        let client = Client::builder()
            .user_agent(concat!(
                "DiscordBot (https://github.com/throneless-tech/tombola, ",
                env!("CARGO_PKG_VERSION"),
                ")"
            ))
            .build()
            .map_err(|err| PlatformError::Failed(err.to_string()))?;
        Ok(Self {
            client,
            api_base: settings.api_base.clone(),
            token: settings.token.clone(),
        })
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, PlatformError> {
        let mut url = self.api_base.clone();
        url.path_segments_mut()
            .map_err(|_| PlatformError::Failed(format!("invalid API base `{}`", self.api_base)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn execute(&self, request: RequestBuilder) -> Result<Response, PlatformError> {
        let response = request
            .header(AUTHORIZATION, format!("Bot {}", self.token))
            .send()
            .await
            .map_err(|err| PlatformError::Failed(err.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let path = response.url().path().to_owned();
        match status {
            StatusCode::TOO_MANY_REQUESTS => {
                let from_header = retry_after_header(response.headers());
                let from_body = response
                    .json::<RateLimited>()
                    .await
                    .ok()
                    .map(|body| body.retry_after);
                let retry_after = from_body
                    .or(from_header)
                    .filter(|secs| secs.is_finite() && *secs >= 0.0)
                    .map(Duration::from_secs_f64);
                debug!(%path, ?retry_after, "discord rate limit");
                Err(PlatformError::Throttled { retry_after })
            }
            StatusCode::NOT_FOUND => Err(PlatformError::NotFound(path)),
            _ => {
                let body = response.text().await.unwrap_or_default();
                Err(PlatformError::Failed(format!("{status} on {path}: {body}")))
            }
        }
    }
}

fn retry_after_header(headers: &HeaderMap) -> Option<f64> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<f64>()
        .ok()
}

fn decode_error(err: reqwest::Error) -> PlatformError {
    PlatformError::Failed(format!("invalid response: {err}"))
}

#[async_trait]
impl Platform for DiscordPlatform {
    async fn current_user(&self) -> Result<UserHandle, PlatformError> {
        let url = self.endpoint(&["users", "@me"])?;
        let user: DiscordUser = self
            .execute(self.client.get(url))
            .await?
            .json()
            .await
            .map_err(decode_error)?;
        Ok(user.into())
    }

    async fn send_message(
        &self,
        channel_id: &str,
        text: &str,
    ) -> Result<MessageHandle, PlatformError> {
        let url = self.endpoint(&["channels", channel_id, "messages"])?;
        let body = json!({
            "content": text,
            "allowed_mentions": { "parse": ["users"] },
        });
        let message: DiscordMessage = self
            .execute(self.client.post(url).json(&body))
            .await?
            .json()
            .await
            .map_err(decode_error)?;
        Ok(message.into())
    }

    async fn fetch_message(
        &self,
        channel_id: &str,
        message_id: &str,
    ) -> Result<MessageHandle, PlatformError> {
        let url = self.endpoint(&["channels", channel_id, "messages", message_id])?;
        let message: DiscordMessage = self
            .execute(self.client.get(url))
            .await?
            .json()
            .await
            .map_err(decode_error)?;
        Ok(message.into())
    }

    async fn add_reaction(&self, message: &MessageHandle, emoji: &str) -> Result<(), PlatformError> {
        let url = self.endpoint(&[
            "channels",
            &message.channel_id,
            "messages",
            &message.message_id,
            "reactions",
            emoji,
            "@me",
        ])?;
        self.execute(self.client.put(url)).await?;
        Ok(())
    }

    async fn reaction_users(
        &self,
        message: &MessageHandle,
        emoji: &str,
    ) -> Result<Vec<UserHandle>, PlatformError> {
        let base = self.endpoint(&[
            "channels",
            &message.channel_id,
            "messages",
            &message.message_id,
            "reactions",
            emoji,
        ])?;

        let mut users = Vec::new();
        let mut after: Option<String> = None;
        loop {
            let mut url = base.clone();
            {
                let mut query = url.query_pairs_mut();
                query.append_pair("limit", &REACTION_PAGE_SIZE.to_string());
                if let Some(after) = &after {
                    query.append_pair("after", after);
                }
            }
            let page: Vec<DiscordUser> = self
                .execute(self.client.get(url))
                .await?
                .json()
                .await
                .map_err(decode_error)?;
            let full = page.len() == REACTION_PAGE_SIZE;
            after = page.last().map(|user| user.id.clone());
            users.extend(page.into_iter().map(UserHandle::from));
            if !full || after.is_none() {
                break;
            }
        }
        Ok(users)
    }
}
