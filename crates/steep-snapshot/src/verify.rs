//! Snapshot verification.

use std::path::Path;

use crate::codec::sha256_file;
use crate::manifest::Manifest;
use crate::{Result, SnapshotError};

/// Verifies every table file against the manifest.
///
/// Returns the full list of problems rather than stopping at the first, so
/// an operator sees the complete damage in one pass. An empty list means
/// the snapshot is intact.
pub fn verify_snapshot(snapshot_dir: &Path) -> Result<Vec<String>> {
    let manifest = Manifest::load(snapshot_dir)?;
    let mut problems = Vec::new();

    for entry in &manifest.tables {
        let path = snapshot_dir.join(&entry.file);
        if !path.exists() {
            problems.push(format!("missing file {}", entry.file));
            continue;
        }
        let actual = sha256_file(&path)?;
        if actual != entry.checksum {
            problems.push(format!(
                "checksum mismatch for {}: expected {}, got {}",
                entry.file, entry.checksum, actual
            ));
        }
    }
    Ok(problems)
}

/// Like [`verify_snapshot`], but treats any problem as an error.
pub fn verify_snapshot_strict(snapshot_dir: &Path) -> Result<Manifest> {
    let problems = verify_snapshot(snapshot_dir)?;
    if !problems.is_empty() {
        return Err(SnapshotError::VerificationFailed(problems));
    }
    Manifest::load(snapshot_dir)
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::io::Write;

    use chrono::Utc;
    use steep_types::{CompressionKind, NodeId};
    use uuid::Uuid;

    use super::*;
    use crate::codec::CompressedWriter;
    use crate::manifest::{DATA_DIR, SequenceEntry, TableEntry, table_file_name};

    fn write_snapshot(dir: &Path, contents: &[u8]) -> Manifest {
        fs::create_dir_all(dir.join(DATA_DIR)).unwrap();
        let file = table_file_name("public", "users", CompressionKind::Gzip);
        let path = dir.join(&file);
        let mut writer = CompressedWriter::create(&path, CompressionKind::Gzip).unwrap();
        writer.write_all(contents).unwrap();
        writer.finish().unwrap();

        let manifest = Manifest {
            snapshot_id: Uuid::new_v4(),
            source_node: NodeId::new("a"),
            lsn: "0/1000".parse().unwrap(),
            created_at: Utc::now(),
            compression: CompressionKind::Gzip,
            parallel_workers: 2,
            total_size_bytes: fs::metadata(&path).unwrap().len(),
            tables: vec![TableEntry {
                schema: "public".to_string(),
                name: "users".to_string(),
                row_count: 2,
                size_bytes: fs::metadata(&path).unwrap().len(),
                checksum: sha256_file(&path).unwrap(),
                file,
            }],
            sequences: vec![SequenceEntry {
                schema: "public".to_string(),
                name: "users_id_seq".to_string(),
                value: 2,
            }],
        };
        manifest.write(dir).unwrap();
        manifest
    }

    #[test]
    fn intact_snapshot_verifies_clean() {
        let dir = tempfile::tempdir().unwrap();
        write_snapshot(dir.path(), b"1,alice\n2,bob\n");
        assert!(verify_snapshot(dir.path()).unwrap().is_empty());
        assert!(verify_snapshot_strict(dir.path()).is_ok());
    }

    #[test]
    fn tampered_file_reports_one_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = write_snapshot(dir.path(), b"1,alice\n2,bob\n");

        // Flip one byte in the data file.
        let path = dir.path().join(&manifest.tables[0].file);
        let mut bytes = fs::read(&path).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xFF;
        fs::write(&path, bytes).unwrap();

        let problems = verify_snapshot(dir.path()).unwrap();
        assert_eq!(problems.len(), 1);
        assert!(
            problems[0].starts_with("checksum mismatch for data/public.users.csv.gz"),
            "unexpected report: {}",
            problems[0]
        );
        assert!(verify_snapshot_strict(dir.path()).is_err());
    }

    #[test]
    fn missing_file_reported_without_aborting() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = write_snapshot(dir.path(), b"1,alice\n");
        fs::remove_file(dir.path().join(&manifest.tables[0].file)).unwrap();

        let problems = verify_snapshot(dir.path()).unwrap();
        assert_eq!(problems.len(), 1);
        assert!(problems[0].starts_with("missing file data/public.users.csv.gz"));
    }
}
