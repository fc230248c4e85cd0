//! Compressed artifact serialization
//!
//! Binary namespace artifacts (the similarity index and the vector store) are
//! bincode payloads compressed with LZ4 or ZSTD and wrapped in a small frame:
//!
//! ```text
//! [magic "TIX1"][codec u8][compressed payload][CRC32 BE over payload]
//! ```
//!
//! The codec byte makes every artifact self-describing, so changing the
//! configured compression never strands previously written files.

use crate::{Error, Result};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

const FRAME_MAGIC: &[u8; 4] = b"TIX1";
const HEADER_LEN: usize = FRAME_MAGIC.len() + 1;
const FOOTER_LEN: usize = 4;

/// Compression algorithm for artifact serialization
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Compression {
    /// LZ4 - Fast compression, good for real-time (default)
    #[default]
    Lz4,
    /// ZSTD - Better ratio, slower
    Zstd,
}

impl Compression {
    /// Get algorithm name as string
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Lz4 => "lz4",
            Self::Zstd => "zstd",
        }
    }

    const fn tag(self) -> u8 {
        match self {
            Self::Lz4 => 1,
            Self::Zstd => 2,
        }
    }

    fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            1 => Some(Self::Lz4),
            2 => Some(Self::Zstd),
            _ => None,
        }
    }

    /// Compress data using this algorithm
    ///
    /// # Errors
    /// Returns error if compression fails (e.g., ZSTD internal error)
    pub fn compress(&self, data: &[u8]) -> Result<Vec<u8>> {
        if data.is_empty() {
            return Ok(Vec::new());
        }
        match self {
            Self::Lz4 => Ok(lz4_flex::compress_prepend_size(data)),
            Self::Zstd => zstd::encode_all(data, 3)
                .map_err(|e| Error::SerializationError(format!("ZSTD compression failed: {e}"))),
        }
    }

    /// Decompress data using this algorithm
    ///
    /// # Errors
    /// Returns error if decompression fails (e.g., corrupted data)
    pub fn decompress(&self, data: &[u8]) -> Result<Vec<u8>> {
        if data.is_empty() {
            return Ok(Vec::new());
        }
        match self {
            Self::Lz4 => lz4_flex::decompress_size_prepended(data)
                .map_err(|e| Error::SerializationError(format!("LZ4 decompression failed: {e}"))),
            Self::Zstd => zstd::decode_all(data)
                .map_err(|e| Error::SerializationError(format!("ZSTD decompression failed: {e}"))),
        }
    }
}

impl std::str::FromStr for Compression {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "lz4" => Ok(Self::Lz4),
            "zstd" => Ok(Self::Zstd),
            other => Err(Error::InvalidConfig(format!("unknown compression: {other}"))),
        }
    }
}

/// Serialize a value into a checksummed, compressed frame
///
/// # Errors
/// Returns error if serialization or compression fails
pub fn encode_frame<T: Serialize>(value: &T, compression: Compression) -> Result<Vec<u8>> {
    let bytes = bincode::serialize(value)
        .map_err(|e| Error::SerializationError(format!("Bincode serialization failed: {e}")))?;
    let payload = compression.compress(&bytes)?;
    let crc = crc32fast::hash(&payload);

    let mut out = Vec::with_capacity(HEADER_LEN + payload.len() + FOOTER_LEN);
    out.extend_from_slice(FRAME_MAGIC);
    out.push(compression.tag());
    out.extend_from_slice(&payload);
    out.extend_from_slice(&crc.to_be_bytes());
    Ok(out)
}

/// Decode a frame written by [`encode_frame`]
///
/// # Errors
/// Returns error if the frame is truncated, the checksum does not match, or
/// decompression/deserialization fails
pub fn decode_frame<T: DeserializeOwned>(data: &[u8]) -> Result<T> {
    let fail = Error::SerializationError;

    if data.len() < HEADER_LEN + FOOTER_LEN {
        return Err(fail(format!("frame truncated ({} bytes)", data.len())));
    }
    if &data[..FRAME_MAGIC.len()] != FRAME_MAGIC {
        return Err(fail("bad magic bytes".to_string()));
    }
    let tag = data[FRAME_MAGIC.len()];
    let compression =
        Compression::from_tag(tag).ok_or_else(|| fail(format!("unknown codec tag {tag}")))?;

    let (body, footer) = data.split_at(data.len() - FOOTER_LEN);
    let payload = &body[HEADER_LEN..];
    let stored = u32::from_be_bytes([footer[0], footer[1], footer[2], footer[3]]);
    let computed = crc32fast::hash(payload);
    if stored != computed {
        return Err(fail(format!(
            "CRC32 mismatch: expected {stored:#010x}, got {computed:#010x}"
        )));
    }

    let bytes = compression.decompress(payload)?;
    bincode::deserialize(&bytes)
        .map_err(|e| fail(format!("Bincode deserialization failed: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Sample {
        ids: Vec<u64>,
        data: Vec<f32>,
    }

    fn sample() -> Sample {
        Sample {
            ids: (1..=64).collect(),
            data: (0..256).map(|i| (i % 7) as f32 * 0.5).collect(),
        }
    }

    #[test]
    fn test_compression_as_str() {
        assert_eq!(Compression::Lz4.as_str(), "lz4");
        assert_eq!(Compression::Zstd.as_str(), "zstd");
    }

    #[test]
    fn test_compression_default() {
        assert_eq!(Compression::default(), Compression::Lz4);
    }

    #[test]
    fn test_compression_from_str() {
        assert_eq!("LZ4".parse::<Compression>().unwrap(), Compression::Lz4);
        assert_eq!("zstd".parse::<Compression>().unwrap(), Compression::Zstd);
        assert!("gzip".parse::<Compression>().is_err());
    }

    #[test]
    fn test_empty_data_compression() {
        let empty: Vec<u8> = vec![];
        assert!(Compression::Lz4.compress(&empty).unwrap().is_empty());
        assert!(Compression::Zstd.decompress(&empty).unwrap().is_empty());
    }

    #[test]
    fn test_lz4_compresses_repeated_data() {
        let data = vec![0u8; 10000];
        let compressed = Compression::Lz4.compress(&data).unwrap();
        assert!(compressed.len() < data.len() / 10);
    }

    #[test]
    fn test_frame_roundtrip_both_codecs() {
        for codec in [Compression::Lz4, Compression::Zstd] {
            let frame = encode_frame(&sample(), codec).unwrap();
            assert_eq!(&frame[..4], FRAME_MAGIC);
            let decoded: Sample = decode_frame(&frame).unwrap();
            assert_eq!(decoded, sample());
        }
    }

    #[test]
    fn test_frame_detects_bit_flip() {
        let mut frame = encode_frame(&sample(), Compression::Lz4).unwrap();
        let mid = frame.len() / 2;
        frame[mid] ^= 0xFF;
        let err = decode_frame::<Sample>(&frame).unwrap_err();
        assert!(err.to_string().contains("CRC32"));
    }

    #[test]
    fn test_frame_rejects_truncated() {
        let err = decode_frame::<Sample>(b"TIX").unwrap_err();
        assert!(err.to_string().contains("truncated"));
    }

    #[test]
    fn test_frame_rejects_bad_magic() {
        let mut frame = encode_frame(&sample(), Compression::Zstd).unwrap();
        frame[0] = b'X';
        let err = decode_frame::<Sample>(&frame).unwrap_err();
        assert!(err.to_string().contains("bad magic bytes"));
    }

    #[test]
    fn test_frame_rejects_unknown_codec() {
        let mut frame = encode_frame(&sample(), Compression::Lz4).unwrap();
        frame[4] = 9;
        assert!(decode_frame::<Sample>(&frame)
            .unwrap_err()
            .to_string()
            .contains("unknown codec"));
    }
}
