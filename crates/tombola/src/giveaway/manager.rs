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
use std::collections::BTreeSet;
use tokio::sync::{mpsc, oneshot};
use tombola_common::{
    error::{Result, TombolaErrorKind},
    giveaway::GiveawaySummary,
};
use tracing::{debug, error, info};

use super::{Giveaways, record::GiveawayRecord, store::GiveawayStore};
use crate::channels::UserHandle;

/// Identifies the giveaway an entry is meant for.
#[derive(Debug, Clone)]
pub enum EntryTarget {
    Id(String),
    Message { guild_id: String, message_id: String },
}

/// What the sweeper decided for one due giveaway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conclusion {
    pub id: String,
    pub winners: Vec<String>,
    /// Entrants recovered from reactions when the ledger was empty.
    pub backfill: Vec<String>,
}

enum ManagerRequest {
    Create {
        record: GiveawayRecord,
        reply: oneshot::Sender<GiveawaySummary>,
    },
    RecordEntry {
        target: EntryTarget,
        user: UserHandle,
        now: DateTime<Utc>,
        reply: oneshot::Sender<bool>,
    },
    Get {
        id: String,
        reply: oneshot::Sender<Result<GiveawayRecord>>,
    },
    List {
        guild_id: String,
        reply: oneshot::Sender<Vec<GiveawaySummary>>,
    },
    Cancel {
        id: String,
        reply: oneshot::Sender<Result<GiveawayRecord>>,
    },
    Reroll {
        id: String,
        reply: oneshot::Sender<Result<GiveawayRecord>>,
    },
    Due {
        now: DateTime<Utc>,
        reply: oneshot::Sender<Vec<GiveawayRecord>>,
    },
    Conclude {
        conclusions: Vec<Conclusion>,
        reply: oneshot::Sender<Vec<String>>,
    },
}

/// Handle to the task that owns every giveaway and the store file.
///
/// All reads and writes are queued to that one task, so an entry can never
/// race a status change and two snapshot writes can never interleave.
#[derive(Clone)]
pub struct GiveawayManager {
    inner: mpsc::UnboundedSender<ManagerRequest>,
}

impl GiveawayManager {
    pub fn spawn(store: GiveawayStore, bot_id: String) -> Self {
        let giveaways = store.load_all();
        info!(
            path = %store.path().display(),
            guilds = giveaways.len(),
            "loaded giveaways"
        );
        let (send, recv) = mpsc::unbounded_channel();
        let state = ManagerState {
            store,
            giveaways,
            bot_id,
        };
        tokio::spawn(state.run(recv));
        Self { inner: send }
    }

    async fn request<T>(&self, build: impl FnOnce(oneshot::Sender<T>) -> ManagerRequest) -> Result<T> {
        let (reply, recv) = oneshot::channel();
        self.inner
            .send(build(reply))
            .map_err(|_| TombolaErrorKind::ManagerClosed)?;
        Ok(recv.await?)
    }

    pub async fn create(&self, record: GiveawayRecord) -> Result<GiveawaySummary> {
        self.request(|reply| ManagerRequest::Create { record, reply })
            .await
    }

    pub async fn record_entry(&self, target: EntryTarget, user: UserHandle) -> Result<bool> {
        self.record_entry_at(target, user, Utc::now()).await
    }

    /// Adds `user` to the ledger as of `now`. Returns whether the user was
    /// newly entered; unknown, closed or late giveaways are a silent no-op.
    pub async fn record_entry_at(
        &self,
        target: EntryTarget,
        user: UserHandle,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        self.request(|reply| ManagerRequest::RecordEntry {
            target,
            user,
            now,
            reply,
        })
        .await
    }

    pub async fn get(&self, id: &str) -> Result<GiveawayRecord> {
        let id = id.to_owned();
        self.request(|reply| ManagerRequest::Get { id, reply })
            .await?
    }

    pub async fn participants(&self, id: &str) -> Result<BTreeSet<String>> {
        Ok(self.get(id).await?.entries().clone())
    }

    pub async fn list(&self, guild_id: &str) -> Result<Vec<GiveawaySummary>> {
        let guild_id = guild_id.to_owned();
        self.request(|reply| ManagerRequest::List { guild_id, reply })
            .await
    }

    pub async fn cancel(&self, id: &str) -> Result<GiveawayRecord> {
        let id = id.to_owned();
        self.request(|reply| ManagerRequest::Cancel { id, reply })
            .await?
    }

    pub async fn reroll(&self, id: &str) -> Result<GiveawayRecord> {
        let id = id.to_owned();
        self.request(|reply| ManagerRequest::Reroll { id, reply })
            .await?
    }

    /// Snapshots of every open giveaway whose deadline is at or before `now`.
    pub async fn due(&self, now: DateTime<Utc>) -> Result<Vec<GiveawayRecord>> {
        self.request(|reply| ManagerRequest::Due { now, reply })
            .await
    }

    /// Ends every giveaway in `conclusions` that is still open and persists
    /// once. Returns the ids that actually changed.
    pub async fn conclude(&self, conclusions: Vec<Conclusion>) -> Result<Vec<String>> {
        self.request(|reply| ManagerRequest::Conclude { conclusions, reply })
            .await
    }
}

struct ManagerState {
    store: GiveawayStore,
    giveaways: Giveaways,
    bot_id: String,
}

impl ManagerState {
    async fn run(mut self, mut recv: mpsc::UnboundedReceiver<ManagerRequest>) {
        while let Some(request) = recv.recv().await {
            self.handle(request).await;
        }
        debug!("giveaway manager stopped");
    }

    async fn handle(&mut self, request: ManagerRequest) {
        // A dropped receiver only means the caller went away.
        match request {
            ManagerRequest::Create { record, reply } => {
                let summary = record.summary();
                self.giveaways
                    .entry(record.guild_id.clone())
                    .or_default()
                    .insert(record.id.clone(), record);
                self.persist().await;
                let _ = reply.send(summary);
            }
            ManagerRequest::RecordEntry {
                target,
                user,
                now,
                reply,
            } => {
                let added = self.record_entry(&target, &user, now);
                if added {
                    self.persist().await;
                }
                let _ = reply.send(added);
            }
            ManagerRequest::Get { id, reply } => {
                let _ = reply.send(self.find(&id).cloned());
            }
            ManagerRequest::List { guild_id, reply } => {
                let list = self
                    .giveaways
                    .get(&guild_id)
                    .map(|records| records.values().map(GiveawayRecord::summary).collect())
                    .unwrap_or_default();
                let _ = reply.send(list);
            }
            ManagerRequest::Cancel { id, reply } => {
                let result = self.find_mut(&id).and_then(|record| {
                    record.cancel()?;
                    Ok(record.clone())
                });
                if result.is_ok() {
                    info!(giveaway = %id, "giveaway cancelled");
                    self.persist().await;
                }
                let _ = reply.send(result);
            }
            ManagerRequest::Reroll { id, reply } => {
                let result = self.find_mut(&id).and_then(|record| {
                    record.reroll()?;
                    Ok(record.clone())
                });
                if result.is_ok() {
                    info!(giveaway = %id, "giveaway rerolled");
                    self.persist().await;
                }
                let _ = reply.send(result);
            }
            ManagerRequest::Due { now, reply } => {
                let due = self
                    .giveaways
                    .values()
                    .flat_map(|records| records.values())
                    .filter(|record| record.is_due(now))
                    .cloned()
                    .collect();
                let _ = reply.send(due);
            }
            ManagerRequest::Conclude { conclusions, reply } => {
                let mut changed = Vec::new();
                for conclusion in conclusions {
                    let Ok(record) = self.find_mut(&conclusion.id) else {
                        continue;
                    };
                    record.backfill(conclusion.backfill);
                    match record.end(conclusion.winners) {
                        Ok(()) => changed.push(conclusion.id),
                        Err(err) => debug!(giveaway = %conclusion.id, %err, "skipping conclusion"),
                    }
                }
                if !changed.is_empty() {
                    self.persist().await;
                }
                let _ = reply.send(changed);
            }
        }
    }

    fn record_entry(&mut self, target: &EntryTarget, user: &UserHandle, now: DateTime<Utc>) -> bool {
        if user.bot || user.id == self.bot_id {
            return false;
        }
        let record = match target {
            EntryTarget::Id(id) => self.find_mut(id).ok(),
            EntryTarget::Message {
                guild_id,
                message_id,
            } => self.giveaways.get_mut(guild_id).and_then(|records| {
                records
                    .values_mut()
                    .find(|record| &record.message_id == message_id)
            }),
        };
        match record {
            Some(record) => record.admit(&user.id, now),
            None => false,
        }
    }

    fn find(&self, id: &str) -> Result<&GiveawayRecord> {
        self.giveaways
            .values()
            .find_map(|records| records.get(id))
            .ok_or_else(|| TombolaErrorKind::UnknownGiveaway(id.to_owned()).into())
    }

    fn find_mut(&mut self, id: &str) -> Result<&mut GiveawayRecord> {
        self.giveaways
            .values_mut()
            .find_map(|records| records.get_mut(id))
            .ok_or_else(|| TombolaErrorKind::UnknownGiveaway(id.to_owned()).into())
    }

    /// Writes the snapshot off the runtime threads. Requests wait for it, so
    /// snapshots land in order. Failure keeps the in-memory state
    /// authoritative.
    async fn persist(&self) {
        if let Err(err) = self.store.save(&self.giveaways).await {
            error!(path = %self.store.path().display(), %err, "failed to save giveaways");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;
    use tombola_common::giveaway::GiveawayStatus;

    fn user(id: &str) -> UserHandle {
        UserHandle {
            id: id.to_owned(),
            bot: false,
        }
    }

    fn open_record(id: &str, ends_at: DateTime<Utc>) -> GiveawayRecord {
        GiveawayRecord::open(
            id.into(),
            "guild".into(),
            "chan".into(),
            format!("msg-{id}"),
            "Hoodie".into(),
            2,
            ends_at,
        )
    }

    fn manager(dir: &tempfile::TempDir) -> GiveawayManager {
        GiveawayManager::spawn(
            GiveawayStore::new(dir.path().join("giveaways.json")),
            "bot".to_owned(),
        )
    }

    #[tokio::test]
    async fn it_should_record_entries_idempotently() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager(&dir);
        let now = Utc::now();
        manager
            .create(open_record("g", now + TimeDelta::minutes(5)))
            .await
            .unwrap();

        let target = EntryTarget::Id("g".into());
        assert!(manager.record_entry_at(target.clone(), user("a"), now).await.unwrap());
        assert!(!manager.record_entry_at(target.clone(), user("a"), now).await.unwrap());
        assert_eq!(manager.participants("g").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn it_should_ignore_bots_and_unknown_giveaways() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager(&dir);
        let now = Utc::now();
        manager
            .create(open_record("g", now + TimeDelta::minutes(5)))
            .await
            .unwrap();

        let by_message = EntryTarget::Message {
            guild_id: "guild".into(),
            message_id: "msg-g".into(),
        };
        assert!(!manager.record_entry_at(by_message.clone(), user("bot"), now).await.unwrap());
        let other_bot = UserHandle {
            id: "helper".into(),
            bot: true,
        };
        assert!(!manager.record_entry_at(by_message.clone(), other_bot, now).await.unwrap());
        assert!(manager.record_entry_at(by_message, user("human"), now).await.unwrap());

        let missing = EntryTarget::Id("nope".into());
        assert!(!manager.record_entry_at(missing, user("human"), now).await.unwrap());
        let wrong_guild = EntryTarget::Message {
            guild_id: "elsewhere".into(),
            message_id: "msg-g".into(),
        };
        assert!(!manager.record_entry_at(wrong_guild, user("x"), now).await.unwrap());
        assert_eq!(
            manager.participants("g").await.unwrap(),
            BTreeSet::from(["human".to_owned()])
        );
    }

    #[tokio::test]
    async fn it_should_persist_and_recover_giveaways() {
        let dir = tempfile::tempdir().unwrap();
        let now = Utc::now();
        {
            let manager = manager(&dir);
            manager
                .create(open_record("g", now + TimeDelta::minutes(5)))
                .await
                .unwrap();
            manager
                .record_entry_at(EntryTarget::Id("g".into()), user("a"), now)
                .await
                .unwrap();
        }

        let restarted = manager(&dir);
        let record = restarted.get("g").await.unwrap();
        assert_eq!(record.status(), GiveawayStatus::Open);
        assert!(record.entries().contains("a"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn it_should_persist_a_burst_of_entries_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let now = Utc::now();
        {
            let manager = manager(&dir);
            manager
                .create(open_record("g", now + TimeDelta::minutes(5)))
                .await
                .unwrap();
            let entries: Vec<_> = (0..50)
                .map(|n| {
                    let manager = manager.clone();
                    tokio::spawn(async move {
                        manager
                            .record_entry_at(EntryTarget::Id("g".into()), user(&n.to_string()), now)
                            .await
                            .unwrap()
                    })
                })
                .collect();
            for entry in entries {
                assert!(entry.await.unwrap());
            }
        }

        let restarted = manager(&dir);
        assert_eq!(restarted.participants("g").await.unwrap().len(), 50);
    }

    #[tokio::test]
    async fn it_should_not_conclude_a_cancelled_giveaway() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager(&dir);
        let now = Utc::now();
        manager.create(open_record("g", now)).await.unwrap();
        manager.create(open_record("h", now)).await.unwrap();

        let cancelled = manager.cancel("g").await.unwrap();
        assert_eq!(cancelled.status(), GiveawayStatus::Cancelled);
        assert!(manager.cancel("g").await.is_err());

        let changed = manager
            .conclude(vec![
                Conclusion {
                    id: "g".into(),
                    winners: vec![],
                    backfill: vec![],
                },
                Conclusion {
                    id: "h".into(),
                    winners: vec![],
                    backfill: vec![],
                },
            ])
            .await
            .unwrap();
        assert_eq!(changed, vec!["h".to_owned()]);
        assert_eq!(manager.get("g").await.unwrap().status(), GiveawayStatus::Cancelled);
        assert_eq!(manager.get("h").await.unwrap().status(), GiveawayStatus::Ended);
    }

    #[tokio::test]
    async fn it_should_list_due_giveaways_only() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager(&dir);
        let now = Utc::now();
        manager
            .create(open_record("past", now - TimeDelta::seconds(10)))
            .await
            .unwrap();
        manager.create(open_record("present", now)).await.unwrap();
        manager
            .create(open_record("future", now + TimeDelta::seconds(10)))
            .await
            .unwrap();

        let mut due: Vec<String> = manager
            .due(now)
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.id)
            .collect();
        due.sort();
        assert_eq!(due, vec!["past".to_owned(), "present".to_owned()]);
        assert_eq!(manager.list("guild").await.unwrap().len(), 3);
        assert!(manager.list("other").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn it_should_reject_unknown_ids() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager(&dir);
        assert!(manager.get("missing").await.is_err());
        assert!(manager.reroll("missing").await.is_err());
        assert!(manager.cancel("missing").await.is_err());
    }
}
