//! Streaming compression codecs for table files.
//!
//! Exports stream COPY output through a [`CompressedWriter`]; apply reads
//! files back through a [`CompressedReader`]. Checksums are always taken
//! over the on-disk (compressed) bytes.

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::Path;

use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use lz4_flex::frame::{FrameDecoder, FrameEncoder};
use sha2::{Digest, Sha256};
use steep_types::CompressionKind;

/// Zstd compression level used for exports.
const ZSTD_LEVEL: i32 = 3;

/// A file writer applying the configured compression.
pub enum CompressedWriter {
    /// Plain file.
    None(BufWriter<File>),
    /// Gzip via `flate2`.
    Gzip(GzEncoder<BufWriter<File>>),
    /// LZ4 frame format.
    Lz4(Box<FrameEncoder<BufWriter<File>>>),
    /// Zstandard.
    Zstd(zstd::stream::write::Encoder<'static, BufWriter<File>>),
}

impl CompressedWriter {
    /// Creates `path` and wraps it in the codec for `kind`.
    pub fn create(path: &Path, kind: CompressionKind) -> io::Result<Self> {
        let file = BufWriter::new(File::create(path)?);
        Ok(match kind {
            CompressionKind::None => CompressedWriter::None(file),
            CompressionKind::Gzip => {
                CompressedWriter::Gzip(GzEncoder::new(file, Compression::default()))
            }
            CompressionKind::Lz4 => CompressedWriter::Lz4(Box::new(FrameEncoder::new(file))),
            CompressionKind::Zstd => {
                CompressedWriter::Zstd(zstd::stream::write::Encoder::new(file, ZSTD_LEVEL)?)
            }
        })
    }

    /// Flushes codec trailers and the underlying file.
    pub fn finish(self) -> io::Result<()> {
        match self {
            CompressedWriter::None(mut w) => w.flush(),
            CompressedWriter::Gzip(enc) => enc.finish()?.flush(),
            CompressedWriter::Lz4(enc) => enc.finish().map_err(io::Error::other)?.flush(),
            CompressedWriter::Zstd(enc) => enc.finish()?.flush(),
        }
    }
}

impl Write for CompressedWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            CompressedWriter::None(w) => w.write(buf),
            CompressedWriter::Gzip(w) => w.write(buf),
            CompressedWriter::Lz4(w) => w.write(buf),
            CompressedWriter::Zstd(w) => w.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            CompressedWriter::None(w) => w.flush(),
            CompressedWriter::Gzip(w) => w.flush(),
            CompressedWriter::Lz4(w) => w.flush(),
            CompressedWriter::Zstd(w) => w.flush(),
        }
    }
}

/// A file reader undoing the codec selected at export time.
pub enum CompressedReader {
    /// Plain file.
    None(BufReader<File>),
    /// Gzip via `flate2`.
    Gzip(GzDecoder<BufReader<File>>),
    /// LZ4 frame format.
    Lz4(Box<FrameDecoder<BufReader<File>>>),
    /// Zstandard.
    Zstd(zstd::stream::read::Decoder<'static, BufReader<File>>),
}

impl CompressedReader {
    /// Opens `path` with the codec for `kind`.
    pub fn open(path: &Path, kind: CompressionKind) -> io::Result<Self> {
        let file = BufReader::new(File::open(path)?);
        Ok(match kind {
            CompressionKind::None => CompressedReader::None(file),
            CompressionKind::Gzip => CompressedReader::Gzip(GzDecoder::new(file)),
            CompressionKind::Lz4 => CompressedReader::Lz4(Box::new(FrameDecoder::new(file))),
            CompressionKind::Zstd => {
                CompressedReader::Zstd(zstd::stream::read::Decoder::with_buffer(file)?)
            }
        })
    }
}

impl Read for CompressedReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            CompressedReader::None(r) => r.read(buf),
            CompressedReader::Gzip(r) => r.read(buf),
            CompressedReader::Lz4(r) => r.read(buf),
            CompressedReader::Zstd(r) => r.read(buf),
        }
    }
}

/// SHA-256 of a file's on-disk bytes, rendered `sha256:<hex>`.
pub fn sha256_file(path: &Path) -> io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; 64 * 1024];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(format!("sha256:{}", hex::encode(hasher.finalize())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    const SAMPLE: &[u8] = b"1,alice\n2,bob\n3,carol\n";

    #[test_case(CompressionKind::None)]
    #[test_case(CompressionKind::Gzip)]
    #[test_case(CompressionKind::Lz4)]
    #[test_case(CompressionKind::Zstd)]
    fn write_read_roundtrip(kind: CompressionKind) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(format!("t.csv{}", kind.extension()));

        let mut writer = CompressedWriter::create(&path, kind).unwrap();
        writer.write_all(SAMPLE).unwrap();
        writer.finish().unwrap();

        let mut reader = CompressedReader::open(&path, kind).unwrap();
        let mut back = Vec::new();
        reader.read_to_end(&mut back).unwrap();
        assert_eq!(back, SAMPLE);
    }

    #[test]
    fn compressed_file_differs_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.csv.gz");
        let mut writer = CompressedWriter::create(&path, CompressionKind::Gzip).unwrap();
        writer.write_all(SAMPLE).unwrap();
        writer.finish().unwrap();

        let raw = std::fs::read(&path).unwrap();
        assert_ne!(raw, SAMPLE);
    }

    #[test]
    fn sha256_file_is_stable_and_content_sensitive() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("f");
        std::fs::write(&path, b"hello").unwrap();

        let first = sha256_file(&path).unwrap();
        assert!(first.starts_with("sha256:"));
        assert_eq!(first, sha256_file(&path).unwrap());

        std::fs::write(&path, b"hellp").unwrap();
        assert_ne!(first, sha256_file(&path).unwrap());
    }
}
