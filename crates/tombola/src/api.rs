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

use chrono::Utc;
use std::sync::Arc;
use tombola_common::{
    error::{Result, TombolaErrorKind},
    giveaway::{DrawResult, GiveawaySummary},
};
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    channels::{Platform, UserHandle},
    gate::CallGate,
    giveaway::{
        manager::{EntryTarget, GiveawayManager},
        record::{self, GiveawayRecord},
    },
    messages,
};

#[derive(Clone)]
pub struct ApiState {
    pub manager: GiveawayManager,
    pub platform: Arc<dyn Platform>,
    pub gate: CallGate,
    pub bot_id: String,
    pub entry_emoji: String,
}

/*
Giveaways
*/

pub async fn start_giveaway(
    guild_id: &str,
    channel_id: &str,
    prize: &str,
    duration_minutes: i64,
    winner_count: i64,
    state: &ApiState,
) -> Result<String> {
    let (duration, winner_count) = record::validate(prize, duration_minutes, winner_count)?;
    let ends_at = Utc::now()
        .checked_add_signed(duration)
        .ok_or_else(|| TombolaErrorKind::Validation("duration is too long".to_owned()))?;

    let text = messages::entry(prize, winner_count, ends_at, &state.entry_emoji);
    let message = state
        .gate
        .call("send_message", || state.platform.send_message(channel_id, &text))
        .await?;

    // Exists before the seed reaction so early reactions are not dropped.
    let record = GiveawayRecord::open(
        Uuid::new_v4().to_string(),
        guild_id.to_owned(),
        channel_id.to_owned(),
        message.message_id.clone(),
        prize.to_owned(),
        winner_count,
        ends_at,
    );
    let summary = state.manager.create(record).await?;
    info!(
        giveaway = %summary.id,
        guild_id,
        channel_id,
        %ends_at,
        "giveaway started"
    );

    // Users can still add the reaction themselves if this fails.
    if let Err(err) = state
        .gate
        .call("add_reaction", || {
            state.platform.add_reaction(&message, &state.entry_emoji)
        })
        .await
    {
        warn!(message_id = %message.message_id, %err, "could not seed entry reaction");
    }
    Ok(summary.id)
}

pub async fn cancel_giveaway(id: &str, state: &ApiState) -> Result<GiveawaySummary> {
    let record = state.manager.cancel(id).await?;
    let text = messages::cancelled(&record.prize);
    if let Err(err) = state
        .gate
        .call("send_message", || {
            state.platform.send_message(&record.channel_id, &text)
        })
        .await
    {
        warn!(giveaway = %id, %err, "could not announce cancellation");
    }
    Ok(record.summary())
}

/// Draws new winners for an ended giveaway and announces them.
///
/// The new draw is saved before the announcement is sent. When the
/// announcement fails the error is returned, but the stored winners are
/// already the new ones; `list_giveaways` shows them.
pub async fn reroll_giveaway(id: &str, state: &ApiState) -> Result<DrawResult> {
    let record = state.manager.reroll(id).await?;
    let text = messages::reroll(&record.prize, record.winners());
    if let Err(err) = state
        .gate
        .call("send_message", || {
            state.platform.send_message(&record.channel_id, &text)
        })
        .await
    {
        warn!(giveaway = %id, winners = ?record.winners(), %err, "rerolled but could not announce");
        return Err(TombolaErrorKind::Platform(format!(
            "winners were redrawn and saved, but the announcement failed: {err}"
        ))
        .into());
    }
    Ok(DrawResult {
        id: record.id.clone(),
        winners: record.winners().to_vec(),
    })
}

pub async fn list_giveaways(guild_id: &str, state: &ApiState) -> Result<Vec<GiveawaySummary>> {
    state.manager.list(guild_id).await
}

/// Handles a reaction-add event. Returns whether it produced a new entry.
pub async fn record_reaction(
    guild_id: &str,
    message_id: &str,
    user: UserHandle,
    emoji: &str,
    state: &ApiState,
) -> Result<bool> {
    if emoji != state.entry_emoji {
        return Ok(false);
    }
    let target = EntryTarget::Message {
        guild_id: guild_id.to_owned(),
        message_id: message_id.to_owned(),
    };
    state.manager.record_entry(target, user).await
}
