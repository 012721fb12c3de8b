//! SQLite storage for the issuance ledger.
//!
//! Provides persistence for devices, issued certificates, and serial-number
//! allocation state.

mod db;
mod models;
mod queries;
mod queries_serial;


pub use db::{CaDatabase, StoreError, unix_timestamp};
pub use models::*;
pub use queries::NewCertificate;
pub use queries_serial::SerialPolicy;
