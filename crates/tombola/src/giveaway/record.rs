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

use chrono::{DateTime, TimeDelta, Utc};
use std::collections::BTreeSet;
use tombola_common::{
    error::{Result, TombolaErrorKind},
    giveaway::{GiveawayStatus, GiveawaySummary},
};

use super::selector;

/// Checks the inputs of a start command before anything is sent to the
/// platform. Returns the entry window length and the winner count.
pub fn validate(prize: &str, duration_minutes: i64, winner_count: i64) -> Result<(TimeDelta, u32)> {
    if prize.trim().is_empty() {
        return Err(TombolaErrorKind::Validation("prize must not be empty".to_owned()).into());
    }
    if duration_minutes <= 0 {
        return Err(TombolaErrorKind::Validation(
            "duration must be a positive number of minutes".to_owned(),
        )
        .into());
    }
    if winner_count <= 0 {
        return Err(
            TombolaErrorKind::Validation("winner count must be at least 1".to_owned()).into(),
        );
    }
    let winner_count = u32::try_from(winner_count)
        .map_err(|_| TombolaErrorKind::Validation("winner count is too large".to_owned()))?;
    let duration = TimeDelta::try_minutes(duration_minutes)
        .ok_or_else(|| TombolaErrorKind::Validation("duration is too long".to_owned()))?;
    Ok((duration, winner_count))
}

/// One giveaway and its entry ledger.
///
/// Status only ever moves forward: `Open` to `Ended` or `Open` to
/// `Cancelled`. A reroll replaces `winners` but leaves the status alone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GiveawayRecord {
    pub id: String,
    pub guild_id: String,
    pub channel_id: String,
    pub message_id: String,
    pub prize: String,
    pub winner_count: u32,
    pub ends_at: DateTime<Utc>,
    entries: BTreeSet<String>,
    status: GiveawayStatus,
    winners: Vec<String>,
}

impl GiveawayRecord {
    pub fn open(
        id: String,
        guild_id: String,
        channel_id: String,
        message_id: String,
        prize: String,
        winner_count: u32,
        ends_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            guild_id,
            channel_id,
            message_id,
            prize,
            winner_count,
            ends_at,
            entries: BTreeSet::new(),
            status: GiveawayStatus::Open,
            winners: Vec::new(),
        }
    }

    /// Rebuilds a record from persisted fields.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn restore(
        id: String,
        guild_id: String,
        channel_id: String,
        message_id: String,
        prize: String,
        winner_count: u32,
        ends_at: DateTime<Utc>,
        entries: BTreeSet<String>,
        status: GiveawayStatus,
        winners: Vec<String>,
    ) -> Self {
        Self {
            id,
            guild_id,
            channel_id,
            message_id,
            prize,
            winner_count,
            ends_at,
            entries,
            status,
            winners,
        }
    }

    pub fn status(&self) -> GiveawayStatus {
        self.status
    }

    pub fn entries(&self) -> &BTreeSet<String> {
        &self.entries
    }

    pub fn winners(&self) -> &[String] {
        &self.winners
    }

    pub fn accepts_entries(&self, now: DateTime<Utc>) -> bool {
        self.status == GiveawayStatus::Open && now < self.ends_at
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.status == GiveawayStatus::Open && self.ends_at <= now
    }

    /// Adds a participant while the entry window is open. Returns `true` only
    /// when the participant was not already entered. Late entries are dropped.
    pub fn admit(&mut self, participant: &str, now: DateTime<Utc>) -> bool {
        if !self.accepts_entries(now) {
            return false;
        }
        self.entries.insert(participant.to_owned())
    }

    /// Seeds the ledger from reactions observed on the entry message. Ignores
    /// the deadline so it can run at draw time, but never touches a closed
    /// record.
    pub fn backfill<I>(&mut self, participants: I) -> usize
    where
        I: IntoIterator<Item = String>,
    {
        if self.status != GiveawayStatus::Open {
            return 0;
        }
        participants
            .into_iter()
            .filter(|p| self.entries.insert(p.clone()))
            .count()
    }

    pub fn end(&mut self, winners: Vec<String>) -> Result<()> {
        self.ensure_status(GiveawayStatus::Open)?;
        self.status = GiveawayStatus::Ended;
        self.winners = winners;
        Ok(())
    }

    pub fn cancel(&mut self) -> Result<()> {
        self.ensure_status(GiveawayStatus::Open)?;
        self.status = GiveawayStatus::Cancelled;
        Ok(())
    }

    /// Draws a fresh set of winners from the same entries. Only an ended
    /// giveaway can be rerolled.
    pub fn reroll(&mut self) -> Result<&[String]> {
        self.ensure_status(GiveawayStatus::Ended)?;
        self.winners = selector::select(&self.entries, self.winner_count as usize)?;
        Ok(&self.winners)
    }

    pub fn summary(&self) -> GiveawaySummary {
        GiveawaySummary {
            id: self.id.clone(),
            guild_id: self.guild_id.clone(),
            channel_id: self.channel_id.clone(),
            message_id: self.message_id.clone(),
            prize: self.prize.clone(),
            winner_count: self.winner_count,
            ends_at: self.ends_at,
            entries: self.entries.len(),
            status: self.status,
            winners: self.winners.clone(),
        }
    }

    fn ensure_status(&self, expected: GiveawayStatus) -> Result<()> {
        if self.status != expected {
            return Err(TombolaErrorKind::InvalidState {
                id: self.id.clone(),
                status: self.status,
            }
            .into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(ends_at: DateTime<Utc>) -> GiveawayRecord {
        GiveawayRecord::open(
            "g1".into(),
            "guild".into(),
            "chan".into(),
            "msg".into(),
            "Sticker pack".into(),
            2,
            ends_at,
        )
    }

    #[test]
    fn it_should_reject_invalid_start_parameters() {
        assert!(validate("", 10, 1).is_err());
        assert!(validate("Mug", 0, 1).is_err());
        assert!(validate("Mug", -5, 1).is_err());
        assert!(validate("Mug", 10, 0).is_err());
        let (duration, count) = validate("Mug", 10, 3).unwrap();
        assert_eq!(duration, TimeDelta::minutes(10));
        assert_eq!(count, 3);
    }

    #[test]
    fn it_should_admit_each_participant_once() {
        let now = Utc::now();
        let mut record = sample(now + TimeDelta::minutes(5));
        assert!(record.admit("alice", now));
        assert!(!record.admit("alice", now));
        assert_eq!(record.entries().len(), 1);
    }

    #[test]
    fn it_should_drop_entries_at_or_after_the_deadline() {
        let now = Utc::now();
        let mut record = sample(now);
        assert!(!record.admit("late", now));
        assert!(!record.admit("later", now + TimeDelta::seconds(1)));
        assert!(record.entries().is_empty());
    }

    #[test]
    fn it_should_never_reopen_a_terminal_record() {
        let now = Utc::now();
        let mut ended = sample(now);
        ended.end(vec![]).unwrap();
        assert!(ended.end(vec![]).is_err());
        assert!(ended.cancel().is_err());
        assert_eq!(ended.status(), GiveawayStatus::Ended);

        let mut cancelled = sample(now + TimeDelta::minutes(1));
        cancelled.cancel().unwrap();
        assert!(cancelled.end(vec![]).is_err());
        assert!(!cancelled.admit("bob", now));
        assert_eq!(cancelled.backfill(vec!["bob".to_owned()]), 0);
        assert_eq!(cancelled.status(), GiveawayStatus::Cancelled);
    }

    #[test]
    fn it_should_only_reroll_ended_giveaways() {
        let now = Utc::now();
        let mut record = sample(now + TimeDelta::minutes(1));
        record.admit("a", now);
        record.admit("b", now);
        record.admit("c", now);
        assert!(record.reroll().is_err());

        record.end(vec!["a".into(), "b".into()]).unwrap();
        for _ in 0..20 {
            let winners = record.reroll().unwrap().to_vec();
            assert_eq!(winners.len(), 2);
            assert!(winners.iter().all(|w| record.entries().contains(w)));
            assert_eq!(record.status(), GiveawayStatus::Ended);
        }
    }

    #[test]
    fn it_should_report_insufficient_participants_on_reroll() {
        let now = Utc::now();
        let mut record = sample(now + TimeDelta::minutes(1));
        record.admit("a", now);
        record.end(vec![]).unwrap();
        let err = record.reroll().unwrap_err();
        assert!(err.is_insufficient_participants());
    }
}
