//! The snapshot manifest.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use steep_types::{CompressionKind, Lsn, NodeId};
use uuid::Uuid;

use crate::Result;

/// Manifest file name inside a snapshot directory.
pub const MANIFEST_FILE: &str = "manifest.json";
/// Data subdirectory holding per-table files.
pub const DATA_DIR: &str = "data";

/// One exported table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableEntry {
    /// Schema name.
    pub schema: String,
    /// Table name.
    pub name: String,
    /// Rows exported.
    pub row_count: u64,
    /// On-disk (compressed) size in bytes.
    pub size_bytes: u64,
    /// `sha256:<hex>` of the on-disk file.
    pub checksum: String,
    /// Path relative to the snapshot directory, e.g.
    /// `data/public.users.csv.gz`.
    pub file: String,
}

/// One captured sequence value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SequenceEntry {
    /// Schema name.
    pub schema: String,
    /// Sequence name.
    pub name: String,
    /// Last value at export time.
    pub value: i64,
}

/// The snapshot manifest, written once at the end of generation and
/// read-only thereafter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    /// Snapshot id.
    pub snapshot_id: Uuid,
    /// Node the snapshot was exported from.
    pub source_node: NodeId,
    /// Consistent point the export is bound to.
    pub lsn: Lsn,
    /// Export completion time.
    pub created_at: DateTime<Utc>,
    /// Compression applied to table files.
    pub compression: CompressionKind,
    /// Workers used for the export.
    pub parallel_workers: u16,
    /// Sum of on-disk table file sizes.
    pub total_size_bytes: u64,
    /// Exported tables, in catalog order.
    pub tables: Vec<TableEntry>,
    /// Captured sequences.
    pub sequences: Vec<SequenceEntry>,
}

/// Relative data file path for a table under the given compression.
pub fn table_file_name(schema: &str, name: &str, kind: CompressionKind) -> String {
    format!("{DATA_DIR}/{schema}.{name}.csv{}", kind.extension())
}

impl Manifest {
    /// Writes the manifest as pretty JSON, atomically (temp file + rename).
    pub fn write(&self, snapshot_dir: &Path) -> Result<PathBuf> {
        let path = snapshot_dir.join(MANIFEST_FILE);
        let tmp = snapshot_dir.join(format!("{MANIFEST_FILE}.tmp"));
        let json = serde_json::to_string_pretty(self)?;
        fs::write(&tmp, json.as_bytes())?;
        fs::rename(&tmp, &path)?;
        Ok(path)
    }

    /// Loads a manifest from a snapshot directory.
    pub fn load(snapshot_dir: &Path) -> Result<Self> {
        let raw = fs::read_to_string(snapshot_dir.join(MANIFEST_FILE))?;
        Ok(serde_json::from_str(&raw)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Manifest {
        Manifest {
            snapshot_id: Uuid::nil(),
            source_node: NodeId::new("a"),
            lsn: "0/1000".parse().unwrap(),
            created_at: Utc::now(),
            compression: CompressionKind::Gzip,
            parallel_workers: 4,
            total_size_bytes: 1234,
            tables: vec![TableEntry {
                schema: "public".to_string(),
                name: "users".to_string(),
                row_count: 3,
                size_bytes: 1234,
                checksum: "sha256:00".to_string(),
                file: "data/public.users.csv.gz".to_string(),
            }],
            sequences: vec![SequenceEntry {
                schema: "public".to_string(),
                name: "users_id_seq".to_string(),
                value: 3,
            }],
        }
    }

    #[test]
    fn write_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = sample();
        let path = manifest.write(dir.path()).unwrap();
        assert!(path.ends_with(MANIFEST_FILE));

        let loaded = Manifest::load(dir.path()).unwrap();
        assert_eq!(loaded.snapshot_id, manifest.snapshot_id);
        assert_eq!(loaded.lsn, manifest.lsn);
        assert_eq!(loaded.tables.len(), 1);
        assert_eq!(loaded.tables[0].file, "data/public.users.csv.gz");
        assert_eq!(loaded.sequences[0].value, 3);
    }

    #[test]
    fn manifest_json_is_pretty_and_typed() {
        let dir = tempfile::tempdir().unwrap();
        sample().write(dir.path()).unwrap();
        let raw = std::fs::read_to_string(dir.path().join(MANIFEST_FILE)).unwrap();
        assert!(raw.contains('\n'));
        assert!(raw.contains("\"lsn\": \"0/1000\""));
        assert!(raw.contains("\"compression\": \"gzip\""));
    }

    #[test]
    fn table_file_names_follow_layout() {
        assert_eq!(
            table_file_name("public", "users", CompressionKind::Gzip),
            "data/public.users.csv.gz"
        );
        assert_eq!(
            table_file_name("public", "users", CompressionKind::None),
            "data/public.users.csv"
        );
        assert_eq!(
            table_file_name("audit", "log", CompressionKind::Zstd),
            "data/audit.log.csv.zst"
        );
    }

    #[test]
    fn load_rejects_corrupt_manifest() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(MANIFEST_FILE), b"{not json").unwrap();
        assert!(Manifest::load(dir.path()).is_err());
    }
}
