//! Consistent snapshot export, verification, and apply.
//!
//! A snapshot is a directory of per-table CSV files plus a JSON manifest,
//! bound to a logical LSN by a replication slot created at export time:
//!
//! ```text
//! <root>/<snapshot_id>/
//!   manifest.json
//!   data/<schema>.<table>.csv[.gz|.lz4|.zst]
//! ```
//!
//! - [`generate`]: parallel export with compression and checksums
//! - [`verify`]: restartable integrity check, reports every mismatch
//! - [`apply`]: replay into a target node, sequences included
//! - [`codec`]: streaming compression writers/readers
//! - [`manifest`]: the manifest file format

pub mod apply;
pub mod codec;
pub mod error;
pub mod generate;
pub mod manifest;
pub mod progress;
pub mod verify;

pub use apply::{ApplyReport, SnapshotApplier};
pub use error::{Result, SnapshotError};
pub use generate::{SnapshotConfig, SnapshotGenerator};
pub use manifest::{Manifest, SequenceEntry, TableEntry};
pub use verify::verify_snapshot;
