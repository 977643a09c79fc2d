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

use chrono::DateTime;
use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeMap,
    fs,
    io::{self, Write},
    path::{Path, PathBuf},
};
use tempfile::NamedTempFile;
use tombola_common::{
    error::{Result, TombolaErrorKind},
    giveaway::GiveawayStatus,
};
use tracing::{debug, error, info, warn};

use super::{Giveaways, record::GiveawayRecord};

/// On-disk shape of a single giveaway. Field names are part of the file
/// format; `cancelled` and `winners` were added later and default when absent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredGiveaway {
    pub channel_id: String,
    pub message_id: String,
    pub prize: String,
    pub ends_at: i64,
    pub winners_count: u32,
    pub entries: Vec<String>,
    pub ended: bool,
    #[serde(default)]
    pub cancelled: bool,
    #[serde(default)]
    pub winners: Vec<String>,
}

pub type StoredGiveaways = BTreeMap<String, BTreeMap<String, StoredGiveaway>>;

impl From<&GiveawayRecord> for StoredGiveaway {
    fn from(record: &GiveawayRecord) -> Self {
        let status = record.status();
        StoredGiveaway {
            channel_id: record.channel_id.clone(),
            message_id: record.message_id.clone(),
            prize: record.prize.clone(),
            ends_at: record.ends_at.timestamp(),
            winners_count: record.winner_count,
            entries: record.entries().iter().cloned().collect(),
            ended: status.is_terminal(),
            cancelled: status == GiveawayStatus::Cancelled,
            winners: record.winners().to_vec(),
        }
    }
}

impl StoredGiveaway {
    fn into_record(self, guild_id: &str, id: &str) -> GiveawayRecord {
        let status = match (self.ended, self.cancelled) {
            (_, true) => GiveawayStatus::Cancelled,
            (true, false) => GiveawayStatus::Ended,
            (false, false) => GiveawayStatus::Open,
        };
        GiveawayRecord::restore(
            id.to_owned(),
            guild_id.to_owned(),
            self.channel_id,
            self.message_id,
            self.prize,
            self.winners_count,
            DateTime::from_timestamp(self.ends_at, 0).unwrap_or_default(),
            self.entries.into_iter().collect(),
            status,
            self.winners,
        )
    }
}

/// Whole-snapshot JSON persistence for every giveaway, keyed by guild and
/// then by giveaway id.
#[derive(Debug, Clone)]
pub struct GiveawayStore {
    path: PathBuf,
}

impl GiveawayStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the store. A missing or unreadable file is treated as empty, and
    /// a file that does not parse is first moved to [`corrupt_path`](Self::corrupt_path).
    pub fn load_all(&self) -> Giveaways {
        let stored = match self.read() {
            Ok(Some(stored)) => stored,
            Ok(None) => {
                info!(path = %self.path.display(), "no giveaway store yet, starting empty");
                return Giveaways::new();
            }
            Err(err) => {
                warn!(path = %self.path.display(), %err, "giveaway store unreadable, starting empty");
                if matches!(err.inner(), TombolaErrorKind::Serde(_)) {
                    self.set_aside();
                }
                return Giveaways::new();
            }
        };

        stored
            .into_iter()
            .map(|(guild_id, giveaways)| {
                let records = giveaways
                    .into_iter()
                    .map(|(id, stored)| {
                        let record = stored.into_record(&guild_id, &id);
                        (id, record)
                    })
                    .collect();
                (guild_id, records)
            })
            .collect()
    }

    /// Replaces the store with `giveaways`. The file is swapped in atomically
    /// so a failed write leaves the previous snapshot intact.
    pub fn save_all(&self, giveaways: &Giveaways) -> Result<()> {
        self.write(&Self::snapshot(giveaways))
    }

    /// Same as [`save_all`](Self::save_all), with the file work on the
    /// blocking pool.
    pub async fn save(&self, giveaways: &Giveaways) -> Result<()> {
        let stored = Self::snapshot(giveaways);
        let store = self.clone();
        tokio::task::spawn_blocking(move || store.write(&stored))
            .await
            .map_err(io::Error::other)?
    }

    /// Path a corrupt store is moved to before starting empty.
    pub fn corrupt_path(&self) -> PathBuf {
        let mut path = self.path.clone().into_os_string();
        path.push(".corrupt");
        PathBuf::from(path)
    }

    fn set_aside(&self) {
        let aside = self.corrupt_path();
        match fs::rename(&self.path, &aside) {
            Ok(()) => warn!(path = %aside.display(), "kept corrupt giveaway store"),
            Err(err) => error!(path = %self.path.display(), %err, "could not move corrupt giveaway store"),
        }
    }

    fn snapshot(giveaways: &Giveaways) -> StoredGiveaways {
        giveaways
            .iter()
            .map(|(guild_id, records)| {
                let records = records
                    .iter()
                    .map(|(id, record)| (id.clone(), StoredGiveaway::from(record)))
                    .collect();
                (guild_id.clone(), records)
            })
            .collect()
    }

    fn write(&self, stored: &StoredGiveaways) -> Result<()> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir)?;

        let mut file = NamedTempFile::new_in(&dir)?;
        serde_json::to_writer_pretty(&mut file, stored)?;
        file.write_all(b"\n")?;
        file.as_file().sync_all()?;
        file.persist(&self.path).map_err(|err| err.error)?;
        debug!(path = %self.path.display(), guilds = stored.len(), "saved giveaway store");
        Ok(())
    }

    fn read(&self) -> Result<Option<StoredGiveaways>> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        if contents.trim().is_empty() {
            return Ok(Some(StoredGiveaways::new()));
        }
        Ok(Some(serde_json::from_str(&contents)?))
    }
}
