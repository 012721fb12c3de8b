//! Issuance ledger for a certificate authority.
//!
//! Persistence layer behind a CA's signing logic:
//! - serial-number allocation, unique for the lifetime of the store
//! - atomic recording of issued certificates together with device bookkeeping
//! - validity lookups keyed by serial number
//! - tracking of which devices still await registration with the cloud service
//!
//! Signing, certificate parsing, and transport are the caller's concern; this
//! crate only owns the ledger.

pub mod storage;

pub use storage::{CaDatabase, Certificate, Device, NewCertificate, SerialPolicy, StoreError};
