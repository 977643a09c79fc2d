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

pub mod discord;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageHandle {
    pub channel_id: String,
    pub message_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserHandle {
    pub id: String,
    #[serde(default)]
    pub bot: bool,
}

/// Failure of a single outbound platform call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlatformError {
    #[error("throttled by platform")]
    Throttled { retry_after: Option<Duration> },
    #[error("not found: `{0}`")]
    NotFound(String),
    #[error("request failed: `{0}`")]
    Failed(String),
}

/// The slice of the messaging platform the giveaway engine needs.
#[async_trait]
pub trait Platform: Send + Sync {
    /// The account the bot is logged in as.
    async fn current_user(&self) -> Result<UserHandle, PlatformError>;

    async fn send_message(&self, channel_id: &str, text: &str)
    -> Result<MessageHandle, PlatformError>;

    async fn fetch_message(
        &self,
        channel_id: &str,
        message_id: &str,
    ) -> Result<MessageHandle, PlatformError>;

    async fn add_reaction(&self, message: &MessageHandle, emoji: &str) -> Result<(), PlatformError>;

    /// Everyone who reacted to `message` with `emoji`.
    async fn reaction_users(
        &self,
        message: &MessageHandle,
        emoji: &str,
    ) -> Result<Vec<UserHandle>, PlatformError>;
}
