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

use std::{future::Future, time::Duration};
use tombola_common::error::{Result, TombolaErrorKind};
use tracing::warn;

use crate::channels::PlatformError;

pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(1);

/// Retries throttled platform calls.
///
/// A throttled call waits for the platform's `retry_after` when it gives
/// one, otherwise `base_delay * 2^n` for the n-th retry. Other failures are
/// returned straight away.
#[derive(Debug, Clone)]
pub struct CallGate {
    max_attempts: u32,
    base_delay: Duration,
}

impl Default for CallGate {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ATTEMPTS, DEFAULT_BASE_DELAY)
    }
}

impl CallGate {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    pub fn backoff(&self, retry: u32) -> Duration {
        self.base_delay
            .saturating_mul(1_u32.checked_shl(retry).unwrap_or(u32::MAX))
    }

    pub async fn call<T, F, Fut>(&self, operation: &str, mut f: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = std::result::Result<T, PlatformError>>,
    {
        let mut attempts = 0;
        loop {
            attempts += 1;
            match f().await {
                Ok(value) => return Ok(value),
                Err(PlatformError::Throttled { retry_after }) => {
                    if attempts >= self.max_attempts {
                        return Err(TombolaErrorKind::RateLimited {
                            operation: operation.to_owned(),
                            attempts,
                        }
                        .into());
                    }
                    let delay = retry_after.unwrap_or_else(|| self.backoff(attempts - 1));
                    warn!(
                        operation,
                        attempts,
                        delay_ms = delay.as_millis() as u64,
                        "throttled, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(PlatformError::NotFound(what)) => {
                    return Err(TombolaErrorKind::NotFound(what).into());
                }
                Err(PlatformError::Failed(reason)) => {
                    return Err(TombolaErrorKind::Platform(reason).into());
                }
            }
        }
    }
}
