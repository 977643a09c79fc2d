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
use axum::{Router, middleware, routing::any};
use axum_test::{TestServer, TestWebSocket};
use std::{
    collections::{HashMap, HashSet},
    net::SocketAddr,
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
    time::Duration,
};
use tempfile::TempDir;

use crate::{
    api::ApiState,
    channels::{MessageHandle, Platform, PlatformError, UserHandle},
    gate::CallGate,
    giveaway::{manager::GiveawayManager, store::GiveawayStore},
    server::authenticate,
    socket,
};

pub const TEST_AUTH: &str = "test";

/// In-memory stand-in for the messaging platform.
#[derive(Default)]
pub struct MockPlatform {
    next_id: AtomicU64,
    messages: Mutex<HashMap<String, MessageHandle>>,
    sent: Mutex<Vec<(String, String)>>,
    reactions: Mutex<HashMap<String, Vec<UserHandle>>>,
    reactions_added: Mutex<Vec<String>>,
    failing_channels: Mutex<HashSet<String>>,
    throttled_fetches: AtomicBool,
    reaction_delay: Mutex<Option<Duration>>,
}

impl MockPlatform {
    pub const BOT_ID: &'static str = "bot";

    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a message without recording it as sent by the engine.
    pub fn post(&self, channel_id: &str, _text: &str) -> MessageHandle {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let handle = MessageHandle {
            channel_id: channel_id.to_owned(),
            message_id: format!("m{id}"),
        };
        self.messages
            .lock()
            .unwrap()
            .insert(handle.message_id.clone(), handle.clone());
        handle
    }

    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().unwrap().clone()
    }

    pub fn reactions_added(&self) -> Vec<String> {
        self.reactions_added.lock().unwrap().clone()
    }

    pub fn react(&self, message_id: &str, user: UserHandle) {
        self.reactions
            .lock()
            .unwrap()
            .entry(message_id.to_owned())
            .or_default()
            .push(user);
    }

    pub fn delete_message(&self, message_id: &str) {
        self.messages.lock().unwrap().remove(message_id);
    }

    pub fn fail_channel(&self, channel_id: &str) {
        self.failing_channels
            .lock()
            .unwrap()
            .insert(channel_id.to_owned());
    }

    pub fn restore_channel(&self, channel_id: &str) {
        self.failing_channels.lock().unwrap().remove(channel_id);
    }

    /// Makes every `fetch_message` report throttling.
    pub fn throttle_fetches(&self, throttled: bool) {
        self.throttled_fetches.store(throttled, Ordering::SeqCst);
    }

    /// Makes `add_reaction` take `delay` before it completes.
    pub fn slow_reactions(&self, delay: Duration) {
        *self.reaction_delay.lock().unwrap() = Some(delay);
    }

    fn check_channel(&self, channel_id: &str) -> Result<(), PlatformError> {
        if self.failing_channels.lock().unwrap().contains(channel_id) {
            return Err(PlatformError::Failed(format!("channel {channel_id} unavailable")));
        }
        Ok(())
    }
}

#[async_trait]
impl Platform for MockPlatform {
    async fn current_user(&self) -> Result<UserHandle, PlatformError> {
        Ok(UserHandle {
            id: Self::BOT_ID.to_owned(),
            bot: true,
        })
    }

    async fn send_message(
        &self,
        channel_id: &str,
        text: &str,
    ) -> Result<MessageHandle, PlatformError> {
        self.check_channel(channel_id)?;
        let handle = self.post(channel_id, text);
        self.sent
            .lock()
            .unwrap()
            .push((channel_id.to_owned(), text.to_owned()));
        Ok(handle)
    }

    async fn fetch_message(
        &self,
        channel_id: &str,
        message_id: &str,
    ) -> Result<MessageHandle, PlatformError> {
        self.check_channel(channel_id)?;
        if self.throttled_fetches.load(Ordering::SeqCst) {
            return Err(PlatformError::Throttled { retry_after: None });
        }
        self.messages
            .lock()
            .unwrap()
            .get(message_id)
            .cloned()
            .ok_or_else(|| PlatformError::NotFound(message_id.to_owned()))
    }

    async fn add_reaction(&self, message: &MessageHandle, _emoji: &str) -> Result<(), PlatformError> {
        let delay = *self.reaction_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.check_channel(&message.channel_id)?;
        self.reactions_added
            .lock()
            .unwrap()
            .push(message.message_id.clone());
        self.react(
            &message.message_id,
            UserHandle {
                id: Self::BOT_ID.to_owned(),
                bot: true,
            },
        );
        Ok(())
    }

    async fn reaction_users(
        &self,
        message: &MessageHandle,
        _emoji: &str,
    ) -> Result<Vec<UserHandle>, PlatformError> {
        self.check_channel(&message.channel_id)?;
        Ok(self
            .reactions
            .lock()
            .unwrap()
            .get(&message.message_id)
            .cloned()
            .unwrap_or_default())
    }
}

/// Builds engine state over `platform` with a store in a fresh temporary
/// directory. Keep the directory alive for the duration of the test.
pub fn get_test_state(platform: Arc<MockPlatform>) -> (ApiState, TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let store = GiveawayStore::new(dir.path().join("giveaways.json"));
    let state = ApiState {
        manager: GiveawayManager::spawn(store, MockPlatform::BOT_ID.to_owned()),
        platform,
        gate: CallGate::new(5, Duration::from_millis(1)),
        bot_id: MockPlatform::BOT_ID.to_owned(),
        entry_emoji: "🎉".to_owned(),
    };
    (state, dir)
}

pub fn get_test_server(state: ApiState) -> TestServer {
    let app = Router::new()
        .route("/ws", any(socket::handler))
        .route_layer(middleware::from_fn_with_state(
            TEST_AUTH.to_owned(),
            authenticate,
        ))
        .with_state(state);

    TestServer::builder()
        .http_transport()
        .build(app.into_make_service_with_connect_info::<SocketAddr>())
        .unwrap()
}

/// The server is returned too, the socket only lives as long as it does.
pub async fn get_test_socket(state: ApiState) -> (TestServer, TestWebSocket) {
    let server = get_test_server(state);
    let socket = server
        .get_websocket("/ws")
        .authorization(TEST_AUTH)
        .await
        .into_websocket()
        .await;
    (server, socket)
}
