//! Ledger queries: certificate issuance, validity, and device registration.

use num_bigint::BigUint;
use tracing::debug;

use super::db::{CaDatabase, StoreError};
use super::models::{Certificate, Device};

/// Parameters for recording a newly issued certificate.
pub struct NewCertificate<'a> {
    pub device_id: &'a str,
    pub name: &'a str,
    pub serial: &'a BigUint,
    pub key_id: &'a [u8],
    /// Expiry as a Unix timestamp in seconds.
    pub expiry: i64,
    /// The encoded certificate, opaque to the ledger.
    pub cert: &'a [u8],
}

impl CaDatabase {
    // =========================================================================
    // Issuance
    // =========================================================================

    /// Record an issued certificate, creating the device row if this is the
    /// device's first certificate.
    ///
    /// Runs as a single transaction: either the device bookkeeping and the
    /// certificate row land together, or neither does. A serial collision at
    /// insert time (the UNIQUE constraint is the authoritative guard, the
    /// allocator's pre-check is advisory) surfaces as
    /// [`StoreError::NonUniqueSerial`]; callers re-allocate and retry.
    pub async fn add_certificate(&self, params: &NewCertificate<'_>) -> Result<(), StoreError> {
        let serial = params.serial.to_string();

        let mut tx = self.pool().begin().await?;

        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM devices WHERE id = ?")
            .bind(params.device_id)
            .fetch_one(&mut *tx)
            .await?;

        if count == 0 {
            sqlx::query("INSERT INTO devices (id, registered) VALUES (?, 0)")
                .bind(params.device_id)
                .execute(&mut *tx)
                .await?;
        }

        let inserted = sqlx::query(
            "INSERT INTO certs (id, name, serial, keyid, expiry, cert, valid) VALUES (?, ?, ?, ?, ?, ?, 1)",
        )
        .bind(params.device_id)
        .bind(params.name)
        .bind(&serial)
        .bind(params.key_id)
        .bind(params.expiry)
        .bind(params.cert)
        .execute(&mut *tx)
        .await;

        if let Err(e) = inserted {
            // Dropping the transaction rolls back the device insert too.
            return Err(classify_serial_insert(&e, &serial));
        }

        tx.commit().await?;

        debug!(device = params.device_id, serial = %serial, "Certificate recorded");
        Ok(())
    }

    // =========================================================================
    // Validity
    // =========================================================================

    /// Check whether the certificate with the given serial is valid.
    ///
    /// Returns [`StoreError::UnknownSerial`] when no certificate has the
    /// serial, so callers can tell "never issued" apart from "revoked"
    /// (`Ok(false)`).
    pub async fn is_valid(&self, serial: &BigUint) -> Result<bool, StoreError> {
        let row: Option<(i64,)> = sqlx::query_as("SELECT valid FROM certs WHERE serial = ?")
            .bind(serial.to_string())
            .fetch_optional(self.pool())
            .await?;

        row.map(|(valid,)| valid != 0)
            .ok_or_else(|| StoreError::UnknownSerial(serial.to_string()))
    }

    /// Look up a certificate record by its serial number.
    pub async fn get_certificate_by_serial(
        &self,
        serial: &BigUint,
    ) -> Result<Option<Certificate>, StoreError> {
        let cert = sqlx::query_as::<_, Certificate>("SELECT * FROM certs WHERE serial = ?")
            .bind(serial.to_string())
            .fetch_optional(self.pool())
            .await?;

        Ok(cert)
    }

    /// Mark the certificate with the given serial invalid.
    ///
    /// Returns whether a row matched. The row itself is kept; serials are
    /// never reused, revoked or not.
    pub async fn revoke_serial(&self, serial: &BigUint) -> Result<bool, StoreError> {
        let result = sqlx::query("UPDATE certs SET valid = 0 WHERE serial = ?")
            .bind(serial.to_string())
            .execute(self.pool())
            .await?;

        Ok(result.rows_affected() > 0)
    }

    // =========================================================================
    // Device registration
    // =========================================================================

    /// Get a device row by ID.
    pub async fn get_device(&self, id: &str) -> Result<Option<Device>, StoreError> {
        let device = sqlx::query_as::<_, Device>("SELECT * FROM devices WHERE id = ?")
            .bind(id)
            .fetch_optional(self.pool())
            .await?;

        Ok(device)
    }

    /// All certificates issued to a device, newest expiry first.
    pub async fn device_certificates(&self, id: &str) -> Result<Vec<Certificate>, StoreError> {
        let certs = sqlx::query_as::<_, Certificate>(
            "SELECT * FROM certs WHERE id = ? ORDER BY expiry DESC",
        )
        .bind(id)
        .fetch_all(self.pool())
        .await?;

        Ok(certs)
    }

    /// Devices holding at least one certificate that have not yet been
    /// registered with the cloud service.
    ///
    /// Deliberately an inner join: this ledger only creates device rows at
    /// issuance, so a device without certificates cannot originate here, and
    /// the registration service acts on issued certificates.
    pub async fn unregistered_devices(&self) -> Result<Vec<String>, StoreError> {
        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT DISTINCT devices.id FROM devices
             JOIN certs ON certs.id = devices.id
             WHERE devices.registered = 0
             ORDER BY devices.id",
        )
        .fetch_all(self.pool())
        .await?;

        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    /// Record that the cloud service confirmed registration of a device.
    ///
    /// Idempotent; the flag only ever moves 0 -> 1. Returns whether a device
    /// row matched (`false` for an unknown device).
    pub async fn mark_registered(&self, device_id: &str) -> Result<bool, StoreError> {
        let result = sqlx::query("UPDATE devices SET registered = 1 WHERE id = ?")
            .bind(device_id)
            .execute(self.pool())
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

/// Map an insert failure on the certs table, distinguishing the serial
/// UNIQUE-constraint backstop from other storage errors.
fn classify_serial_insert(e: &sqlx::Error, serial: &str) -> StoreError {
    match e.as_database_error() {
        Some(db) if db.is_unique_violation() => StoreError::NonUniqueSerial(serial.to_owned()),
        _ => StoreError::Query(e.to_string()),
    }
}
