//! Row models for the issuance ledger.

use num_bigint::BigUint;
use serde::{Deserialize, Serialize};

/// A device the authority has issued at least one certificate to.
///
/// Rows are created lazily on first issuance and never deleted. `registered`
/// is a 0/1 flag that only ever transitions 0 -> 1, once the external cloud
/// service confirms onboarding.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Device {
    pub id: String,
    pub registered: i64,
}

impl Device {
    pub const fn is_registered(&self) -> bool {
        self.registered != 0
    }
}

/// An issued certificate.
///
/// `serial` holds the decimal rendering of the arbitrary-precision serial
/// number; SQLite's widest integer is i64 and nanosecond-derived serials
/// already crowd that range. `expiry` is a Unix timestamp in seconds.
/// Rows are never deleted; revocation clears the `valid` flag.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Certificate {
    pub id: String,
    pub name: String,
    pub serial: String,
    pub keyid: Vec<u8>,
    pub expiry: i64,
    pub cert: Vec<u8>,
    pub valid: i64,
}

impl Certificate {
    /// Parse the stored serial back to its integer form.
    ///
    /// Returns `None` only if the column holds something other than a decimal
    /// integer, which would mean the row was written outside this crate.
    pub fn serial_number(&self) -> Option<BigUint> {
        self.serial.parse().ok()
    }

    pub const fn is_valid(&self) -> bool {
        self.valid != 0
    }
}
