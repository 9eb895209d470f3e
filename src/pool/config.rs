use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;

use crate::error::DbError;

const DEFAULT_MAX_SIZE: usize = 10;
const DEFAULT_ACQUIRE_TIMEOUT: Duration = Duration::from_secs(30);

/// Sizing and wait limits for a connection [`Pool`](super::Pool).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Upper bound on idle plus leased connections.
    pub max_size: usize,
    /// How long `get()` waits for a free slot before failing with `PoolExhausted`.
    #[serde(rename = "acquire_timeout_ms", with = "duration_ms")]
    pub acquire_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_size: DEFAULT_MAX_SIZE,
            acquire_timeout: DEFAULT_ACQUIRE_TIMEOUT,
        }
    }
}

impl PoolConfig {
    #[must_use]
    pub fn new(max_size: usize) -> Self {
        Self {
            max_size,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_max_size(mut self, max_size: usize) -> Self {
        self.max_size = max_size;
        self
    }

    #[must_use]
    pub fn with_acquire_timeout(mut self, acquire_timeout: Duration) -> Self {
        self.acquire_timeout = acquire_timeout;
        self
    }

    pub(crate) fn acquire_timeout_ms(&self) -> u64 {
        u64::try_from(self.acquire_timeout.as_millis()).unwrap_or(u64::MAX)
    }

    /// # Errors
    /// Returns `DbError::ConfigError` when `max_size` is zero or larger than a tokio
    /// semaphore can count.
    pub fn validate(&self) -> Result<(), DbError> {
        if self.max_size == 0 {
            return Err(DbError::ConfigError(
                "pool max_size must be greater than zero".to_string(),
            ));
        }
        if self.max_size > Semaphore::MAX_PERMITS {
            return Err(DbError::ConfigError(format!(
                "pool max_size {} exceeds the limit of {}",
                self.max_size,
                Semaphore::MAX_PERMITS
            )));
        }
        Ok(())
    }
}

mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(value.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
