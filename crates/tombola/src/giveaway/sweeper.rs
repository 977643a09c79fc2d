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
use std::time::Duration;
use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tombola_common::error::{Result, TombolaErrorKind};
use tracing::{debug, error, info, warn};

use super::{manager::Conclusion, record::GiveawayRecord, selector};
use crate::{api::ApiState, messages};

/// What one sweep cycle did.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SweepReport {
    /// Giveaways moved to `Ended` this cycle.
    pub ended: Vec<String>,
    /// Due giveaways left open because their announcement failed.
    pub deferred: Vec<String>,
}

/// Periodically ends giveaways whose entry window has closed.
pub struct Sweeper {
    state: ApiState,
    every: Duration,
}

impl Sweeper {
    pub fn new(state: ApiState, every: Duration) -> Self {
        Self { state, every }
    }

    /// Sweeps immediately, which catches up on anything that expired while
    /// the process was down, then once per interval until `shutdown`.
    pub async fn run(self, shutdown: CancellationToken) {
        let mut ticker = interval(self.every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    debug!("sweeper stopped");
                    return;
                }
                _ = ticker.tick() => {
                    if let Err(err) = self.sweep(Utc::now()).await {
                        error!(%err, "sweep failed");
                    }
                }
            }
        }
    }

    pub async fn sweep(&self, now: DateTime<Utc>) -> Result<SweepReport> {
        let due = self.state.manager.due(now).await?;
        if due.is_empty() {
            return Ok(SweepReport::default());
        }
        debug!(count = due.len(), "giveaways due");

        let mut report = SweepReport::default();
        let mut conclusions = Vec::with_capacity(due.len());
        for record in &due {
            match self.finish(record).await {
                Ok(conclusion) => conclusions.push(conclusion),
                Err(err) => {
                    warn!(giveaway = %record.id, %err, "could not end giveaway, will retry");
                    report.deferred.push(record.id.clone());
                }
            }
        }

        report.ended = self.state.manager.conclude(conclusions).await?;
        for id in &report.ended {
            info!(giveaway = %id, "giveaway ended");
        }
        Ok(report)
    }

    async fn finish(&self, record: &GiveawayRecord) -> Result<Conclusion> {
        let ApiState {
            platform, gate, ..
        } = &self.state;

        let message = match gate
            .call("fetch_message", || {
                platform.fetch_message(&record.channel_id, &record.message_id)
            })
            .await
        {
            Ok(message) => Some(message),
            Err(err) if err.is_not_found() => {
                warn!(giveaway = %record.id, %err, "entry message deleted");
                None
            }
            Err(err) => return Err(err),
        };

        let mut entries = record.entries().clone();
        let mut backfill = Vec::new();
        if entries.is_empty()
            && let Some(message) = &message
        {
            match gate
                .call("reaction_users", || {
                    platform.reaction_users(message, &self.state.entry_emoji)
                })
                .await
            {
                Ok(users) => {
                    backfill = users
                        .into_iter()
                        .filter(|user| !user.bot && user.id != self.state.bot_id)
                        .map(|user| user.id)
                        .collect();
                    entries.extend(backfill.iter().cloned());
                    debug!(giveaway = %record.id, count = backfill.len(), "entries recovered from reactions");
                }
                Err(err) => warn!(giveaway = %record.id, %err, "could not read reactions"),
            }
        }

        let (winners, text) = match selector::select(&entries, record.winner_count as usize) {
            Ok(winners) => {
                let text = messages::winners(&record.prize, &winners);
                (winners, text)
            }
            Err(err) => match err.inner() {
                TombolaErrorKind::InsufficientParticipants { needed, available } => {
                    (Vec::new(), messages::insufficient(&record.prize, *needed, *available))
                }
                _ => return Err(err),
            },
        };
        let text = match message {
            Some(_) => text,
            None => messages::entry_message_missing(&text),
        };

        match gate
            .call("send_message", || {
                platform.send_message(&record.channel_id, &text)
            })
            .await
        {
            Ok(_) => {}
            // The channel is gone, nobody is left to tell.
            Err(err) if err.is_not_found() => {
                warn!(giveaway = %record.id, %err, "giveaway channel missing, ending silently");
            }
            Err(err) => return Err(err),
        }

        Ok(Conclusion {
            id: record.id.clone(),
            winners,
            backfill,
        })
    }
}
