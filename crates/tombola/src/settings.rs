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

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use figment_file_provider_adapter::FileAdapter;
use serde::{Deserialize, Serialize};
use std::{
    path::{Path, PathBuf},
    time::Duration,
};
use tombola_common::error::{Result, TombolaErrorKind};
use url::Url;

const ENV_PREFIX: &str = "TOMBOLA_";
const STORE_FILE: &str = "giveaways.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscordSettings {
    /// Bot token
    pub token: String,
    /// REST API root, must end with a slash
    pub api_base: Url,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    /// IP address and port to bind to
    pub bind: String,
    /// API authentication token
    pub auth: String,
    /// Path to the giveaway store
    pub store: PathBuf,
    pub sweep_interval_secs: u64,
    pub entry_emoji: String,
    pub max_attempts: u32,
    pub backoff_base_ms: u64,
    pub discord: DiscordSettings,
}

impl Default for Settings {
    fn default() -> Self {
        let store = ProjectDirs::from("tech", "throneless", "tombola")
            .map(|dirs| dirs.data_dir().join(STORE_FILE))
            .unwrap_or_else(|| PathBuf::from(STORE_FILE));
        Settings {
            bind: "127.0.0.1:3000".to_owned(),
            auth: String::new(),
            store,
            sweep_interval_secs: 30,
            entry_emoji: "🎉".to_owned(),
            max_attempts: 5,
            backoff_base_ms: 1000,
            discord: DiscordSettings {
                token: String::new(),
                api_base: Url::parse("https://discord.com/api/v10/")
                    .expect("Unable to parse Discord API URL"),
            },
        }
    }
}

impl Settings {
    /// Layers defaults, an optional TOML file and `TOMBOLA_*` environment
    /// variables. Any variable may instead name a file with a `_FILE` suffix.
    pub fn figment(config: Option<&Path>) -> Figment {
        let mut figment = Figment::from(Serialized::defaults(Settings::default()));
        if let Some(path) = config {
            figment = figment.merge(Toml::file(path));
        }
        figment.merge(FileAdapter::wrap(Env::prefixed(ENV_PREFIX).split("__")))
    }

    pub fn load(config: Option<&Path>) -> Result<Settings> {
        let settings: Settings = Self::figment(config).extract()?;
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<()> {
        if self.auth.is_empty() {
            return Err(TombolaErrorKind::Validation("`auth` must be set".to_owned()).into());
        }
        if self.discord.token.is_empty() {
            return Err(
                TombolaErrorKind::Validation("`discord.token` must be set".to_owned()).into(),
            );
        }
        if self.sweep_interval_secs == 0 {
            return Err(TombolaErrorKind::Validation(
                "`sweep_interval_secs` must be positive".to_owned(),
            )
            .into());
        }
        if self.entry_emoji.is_empty() {
            return Err(
                TombolaErrorKind::Validation("`entry_emoji` must be set".to_owned()).into(),
            );
        }
        Ok(())
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    pub fn backoff_base(&self) -> Duration {
        Duration::from_millis(self.backoff_base_ms)
    }
}
