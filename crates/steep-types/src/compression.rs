//! Snapshot compression kinds.

use std::fmt::{self, Display};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::Error;

/// Compression applied to exported snapshot table files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompressionKind {
    /// No compression (plain CSV).
    None,
    /// Gzip via `flate2`.
    #[default]
    Gzip,
    /// LZ4 frame format via `lz4_flex`.
    Lz4,
    /// Zstandard.
    Zstd,
}

impl CompressionKind {
    /// File suffix appended to `<schema>.<table>.csv`, empty for none.
    pub fn extension(self) -> &'static str {
        match self {
            CompressionKind::None => "",
            CompressionKind::Gzip => ".gz",
            CompressionKind::Lz4 => ".lz4",
            CompressionKind::Zstd => ".zst",
        }
    }

    /// Stable string form used in manifests and the catalog.
    pub fn as_str(self) -> &'static str {
        match self {
            CompressionKind::None => "none",
            CompressionKind::Gzip => "gzip",
            CompressionKind::Lz4 => "lz4",
            CompressionKind::Zstd => "zstd",
        }
    }
}

impl Display for CompressionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CompressionKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(CompressionKind::None),
            "gzip" => Ok(CompressionKind::Gzip),
            "lz4" => Ok(CompressionKind::Lz4),
            "zstd" => Ok(CompressionKind::Zstd),
            other => Err(Error::UnknownCompression(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extensions_match_manifest_layout() {
        assert_eq!(CompressionKind::None.extension(), "");
        assert_eq!(CompressionKind::Gzip.extension(), ".gz");
        assert_eq!(CompressionKind::Lz4.extension(), ".lz4");
        assert_eq!(CompressionKind::Zstd.extension(), ".zst");
    }

    #[test]
    fn string_roundtrip() {
        for kind in [
            CompressionKind::None,
            CompressionKind::Gzip,
            CompressionKind::Lz4,
            CompressionKind::Zstd,
        ] {
            let parsed: CompressionKind = kind.as_str().parse().unwrap();
            assert_eq!(parsed, kind);
        }
        assert!("brotli".parse::<CompressionKind>().is_err());
    }
}
