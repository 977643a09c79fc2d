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

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GiveawayStatus {
    Open,
    Ended,
    Cancelled,
}

impl GiveawayStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, GiveawayStatus::Open)
    }
}

impl fmt::Display for GiveawayStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GiveawayStatus::Open => write!(f, "open"),
            GiveawayStatus::Ended => write!(f, "ended"),
            GiveawayStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Read-only view of a giveaway handed to admins.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GiveawaySummary {
    pub id: String,
    pub guild_id: String,
    pub channel_id: String,
    pub message_id: String,
    pub prize: String,
    pub winner_count: u32,
    pub ends_at: DateTime<Utc>,
    pub entries: usize,
    pub status: GiveawayStatus,
    pub winners: Vec<String>,
}

/// Outcome of a draw as reported back to the caller of a reroll.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DrawResult {
    pub id: String,
    pub winners: Vec<String>,
}
