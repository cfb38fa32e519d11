//! Schema fingerprinting and drift detection.
//!
//! A fingerprint is a deterministic SHA-256 over a table's ordered column
//! metadata. Capturing fingerprints on both nodes and diffing them detects
//! schema drift before replication artifacts are created:
//! - [`fingerprint`]: hash computation and capture
//! - [`compare`]: full-outer-join diff of two fingerprint maps
//! - [`transport`]: how the remote side's fingerprints are obtained

pub mod compare;
pub mod error;
pub mod fingerprint;
pub mod transport;

pub use compare::{SchemaComparison, TableComparison, TableStatus, compare_fingerprints};
pub use error::{Result, SchemaError};
pub use fingerprint::{capture, capture_live, fingerprint_table};
pub use transport::{DirectTransport, FingerprintTransport};
