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

use figment;
use serde_json::Error as SerdeError;
use std::io;
use thiserror::Error;
use tokio;

use crate::giveaway::GiveawayStatus;

#[derive(Debug, Error, thiserror_ext::Box)]
#[thiserror_ext(newtype(name = TombolaError))]
pub enum TombolaErrorKind {
    #[error("Validation error: `{0}`")]
    Validation(String),
    #[error("No giveaway with id `{0}`")]
    UnknownGiveaway(String),
    #[error("Giveaway `{id}` is {status}")]
    InvalidState { id: String, status: GiveawayStatus },
    #[error("Not enough participants: needed {needed}, got {available}")]
    InsufficientParticipants { needed: usize, available: usize },
    #[error("Not found: `{0}`")]
    NotFound(String),
    #[error("Rate limited on `{operation}` after {attempts} attempts")]
    RateLimited { operation: String, attempts: u32 },
    #[error("Platform error: `{0}`")]
    Platform(String),
    #[error("I/O error: `{0}`")]
    Io(#[from] io::Error),
    #[error("Figment error: `{0}`")]
    Figment(#[from] figment::Error),
    #[error("Channel Receive error: `{0}`")]
    ChannelRecv(#[from] tokio::sync::oneshot::error::RecvError),
    #[error("Giveaway manager has shut down")]
    ManagerClosed,
    #[error("Serialization/deserialization error: `{0}`")]
    Serde(#[from] SerdeError),
    #[error("Websocket close")]
    WebsocketClose,
}

impl TombolaError {
    /// True when the error means the draw could not fill every winner slot.
    pub fn is_insufficient_participants(&self) -> bool {
        matches!(
            self.inner(),
            TombolaErrorKind::InsufficientParticipants { .. }
        )
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self.inner(), TombolaErrorKind::NotFound(_))
    }
}

pub type Result<T> = std::result::Result<T, TombolaError>;
