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

use crate::giveaway::selector::mentions;

pub fn entry(prize: &str, winner_count: u32, ends_at: DateTime<Utc>, emoji: &str) -> String {
    format!(
        "🎉 **GIVEAWAY** 🎉\nPrize: **{prize}**\nWinners: {winner_count}\nEnds <t:{ts}:R>\nReact with {emoji} to enter!",
        ts = ends_at.timestamp()
    )
}

pub fn winners(prize: &str, winners: &[String]) -> String {
    format!(
        "🎉 Congratulations {}! You won **{prize}**!",
        mentions(winners)
    )
}

pub fn insufficient(prize: &str, needed: usize, available: usize) -> String {
    format!(
        "Not enough participants entered the giveaway for **{prize}** ({available} entered, {needed} needed)."
    )
}

pub fn entry_message_missing(announcement: &str) -> String {
    format!("The giveaway message could not be found.\n{announcement}")
}

pub fn reroll(prize: &str, winners: &[String]) -> String {
    format!("🔁 New draw for **{prize}**: {}!", mentions(winners))
}

pub fn cancelled(prize: &str) -> String {
    format!("The giveaway for **{prize}** has been cancelled.")
}
