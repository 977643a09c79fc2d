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

use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize)]
pub struct Response<S: Serialize> {
    pub response_type: String,
    pub response: S,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "message_type", content = "data")]
pub enum SocketMessage<S: Serialize> {
    StartGiveaway {
        guild_id: String,
        channel_id: String,
        prize: String,
        duration_minutes: i64,
        winner_count: i64,
    },
    CancelGiveaway {
        id: String,
    },
    RerollGiveaway {
        id: String,
    },
    ListGiveaways {
        guild_id: String,
    },
    ReactionAdded {
        guild_id: String,
        message_id: String,
        user_id: String,
        emoji: String,
        #[serde(default)]
        bot: bool,
    },
    Response(Response<S>),
    Error(Response<S>),
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn reaction_without_bot_flag_defaults_to_human() {
        let msg: SocketMessage<String> = serde_json::from_value(json!({
            "message_type": "ReactionAdded",
            "data": {
                "guild_id": "1",
                "message_id": "2",
                "user_id": "3",
                "emoji": "🎉"
            }
        }))
        .unwrap();
        match msg {
            SocketMessage::ReactionAdded { bot, user_id, .. } => {
                assert!(!bot);
                assert_eq!(user_id, "3");
            }
            _ => panic!("unexpected message"),
        }
    }

    #[test]
    fn start_giveaway_is_tagged_by_message_type() {
        let msg: SocketMessage<String> = SocketMessage::StartGiveaway {
            guild_id: "g".into(),
            channel_id: "c".into(),
            prize: "A mug".into(),
            duration_minutes: 10,
            winner_count: 1,
        };
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["message_type"], "StartGiveaway");
        assert_eq!(value["data"]["prize"], "A mug");
    }
}
