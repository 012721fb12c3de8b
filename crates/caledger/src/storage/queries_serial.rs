//! Serial-number allocation.
//!
//! Serials are derived from the wall clock at nanosecond granularity, which
//! is unique under normal clock behavior; collisions (clock steps, two
//! issuances inside one tick) are handled by a bounded, jittered retry loop.
//! The existence check here is advisory: the UNIQUE constraint on
//! `certs.serial` is the authoritative guard, and a lost race shows up as
//! `StoreError::NonUniqueSerial` from `add_certificate`.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use num_bigint::BigUint;
use tracing::debug;

use super::db::{CaDatabase, StoreError};

/// Retry policy for serial allocation.
///
/// The delay should be longer than the system clock's update granularity so a
/// fresh candidate is drawn after each sleep; 1 ms is a safe default on
/// current platforms.
#[derive(Debug, Clone)]
pub struct SerialPolicy {
    /// Attempts before giving up with [`StoreError::SerialExhausted`].
    pub max_attempts: u32,
    /// Base delay between attempts; actual sleep adds uniform jitter in
    /// `[0, retry_delay)`.
    pub retry_delay: Duration,
}

impl Default for SerialPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 100,
            retry_delay: Duration::from_millis(1),
        }
    }
}

impl SerialPolicy {
    /// Jittered sleep for one retry, so allocators that collided once do not
    /// collide again in lockstep.
    fn backoff(&self) -> Duration {
        self.retry_delay + self.retry_delay.mul_f64(rand::random::<f64>())
    }
}

impl CaDatabase {
    /// Allocate a serial number not present in the certificate table.
    ///
    /// Retries on collision per `policy`; any other storage error aborts
    /// immediately. No transaction is held across the retry sleeps.
    pub async fn allocate_serial(&self, policy: &SerialPolicy) -> Result<BigUint, StoreError> {
        self.allocate_serial_with(policy, clock_candidate).await
    }

    /// Allocate a serial drawn from a caller-supplied candidate source.
    ///
    /// [`allocate_serial`](Self::allocate_serial) wires in the wall clock;
    /// this entry point exists for alternative schemes (e.g. random serials)
    /// and for exercising collision handling without touching the real clock.
    pub async fn allocate_serial_with<F>(
        &self,
        policy: &SerialPolicy,
        mut candidates: F,
    ) -> Result<BigUint, StoreError>
    where
        F: FnMut() -> BigUint,
    {
        for attempt in 1..=policy.max_attempts {
            let candidate = candidates();

            if !self.serial_issued(&candidate).await? {
                return Ok(candidate);
            }

            debug!(attempt, serial = %candidate, "Serial collision, retrying");
            tokio::time::sleep(policy.backoff()).await;
        }

        Err(StoreError::SerialExhausted(policy.max_attempts))
    }

    /// Whether a certificate with this serial has ever been recorded.
    pub async fn serial_issued(&self, serial: &BigUint) -> Result<bool, StoreError> {
        let row: Option<(i64,)> = sqlx::query_as("SELECT 1 FROM certs WHERE serial = ?")
            .bind(serial.to_string())
            .fetch_optional(self.pool())
            .await?;

        Ok(row.is_some())
    }
}

/// Serial candidate from the wall clock: nanoseconds since the Unix epoch.
fn clock_candidate() -> BigUint {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();

    BigUint::from(nanos)
}
