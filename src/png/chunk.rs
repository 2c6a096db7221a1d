//! Raw chunk framing: length, 4-byte tag, data and CRC

use std::fmt;

use crc32fast::Hasher;

use crate::utils::read_u32_be;
use crate::{StashError, StashResult};

/// A 4-byte ASCII chunk tag such as `IHDR` or `tEXt`
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChunkTag([u8; 4]);

impl ChunkTag {
    pub const IHDR: ChunkTag = ChunkTag(*b"IHDR");
    pub const PLTE: ChunkTag = ChunkTag(*b"PLTE");
    pub const IDAT: ChunkTag = ChunkTag(*b"IDAT");
    pub const IEND: ChunkTag = ChunkTag(*b"IEND");
    pub const TEXT: ChunkTag = ChunkTag(*b"tEXt");
    pub const ZTXT: ChunkTag = ChunkTag(*b"zTXt");

    /// Build a tag from a string, which must be exactly 4 bytes long.
    pub fn new(tag: &str) -> StashResult<Self> {
        let bytes: [u8; 4] = tag
            .as_bytes()
            .try_into()
            .map_err(|_| StashError::InvalidChunkTag)?;

        Ok(ChunkTag(bytes))
    }

    pub const fn from_bytes(bytes: [u8; 4]) -> Self {
        ChunkTag(bytes)
    }

    pub const fn as_bytes(&self) -> &[u8; 4] {
        &self.0
    }
}

impl fmt::Display for ChunkTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for &byte in &self.0 {
            write!(f, "{}", byte as char)?;
        }

        Ok(())
    }
}

impl fmt::Debug for ChunkTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ChunkTag({self})")
    }
}

/// An owned chunk: tag plus data vector.
///
/// The on-wire length and CRC are derived, so an owned chunk can never carry
/// an inconsistent frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    tag: ChunkTag,
    data: Vec<u8>,
}

impl Chunk {
    pub fn new(tag: ChunkTag, data: Vec<u8>) -> Self {
        Self { tag, data }
    }

    pub fn tag(&self) -> ChunkTag {
        self.tag
    }

    pub fn length(&self) -> usize {
        self.data.len()
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut Vec<u8> {
        &mut self.data
    }

    pub fn set_data(&mut self, data: Vec<u8>) {
        self.data = data;
    }

    /// CRC-32 over `tag || data`
    pub fn crc(&self) -> u32 {
        let mut hasher = Hasher::new();
        hasher.update(self.tag.as_bytes());
        hasher.update(&self.data);
        hasher.finalize()
    }

    /// Serialize to the on-wire frame: length, tag, data, CRC.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(12 + self.data.len());
        bytes.extend_from_slice(&(self.data.len() as u32).to_be_bytes());
        bytes.extend_from_slice(self.tag.as_bytes());
        bytes.extend_from_slice(&self.data);
        bytes.extend_from_slice(&self.crc().to_be_bytes());
        bytes
    }
}

/// A borrowed view of one chunk inside an externally owned buffer.
#[derive(Debug, Clone, Copy)]
pub struct ChunkView<'a> {
    tag: ChunkTag,
    data: &'a [u8],
    crc: u32,
}

impl<'a> ChunkView<'a> {
    /// Parse the chunk starting at `offset` in `bytes`.
    pub fn parse(bytes: &'a [u8], offset: usize) -> StashResult<Self> {
        if offset + 8 > bytes.len() {
            return Err(StashError::OutOfBounds {
                index: offset + 8,
                limit: bytes.len(),
            });
        }

        let length = read_u32_be(bytes, offset) as usize;
        let tag = ChunkTag::from_bytes([
            bytes[offset + 4],
            bytes[offset + 5],
            bytes[offset + 6],
            bytes[offset + 7],
        ]);

        let end = offset + 8 + length + 4;

        if end > bytes.len() {
            return Err(StashError::OutOfBounds {
                index: end,
                limit: bytes.len(),
            });
        }

        Ok(Self {
            tag,
            data: &bytes[offset + 8..offset + 8 + length],
            crc: read_u32_be(bytes, offset + 8 + length),
        })
    }

    pub fn tag(&self) -> ChunkTag {
        self.tag
    }

    pub fn length(&self) -> usize {
        self.data.len()
    }

    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    /// The CRC stored in the frame.
    pub fn crc(&self) -> u32 {
        self.crc
    }

    /// The CRC recomputed over `tag || data`.
    pub fn expected_crc(&self) -> u32 {
        let mut hasher = Hasher::new();
        hasher.update(self.tag.as_bytes());
        hasher.update(self.data);
        hasher.finalize()
    }

    /// Whether the stored CRC matches the recomputed one.
    pub fn validate(&self) -> bool {
        self.crc == self.expected_crc()
    }

    /// Total on-wire size of the chunk, framing included.
    pub fn chunk_size(&self) -> usize {
        12 + self.data.len()
    }

    pub fn to_chunk(&self) -> Chunk {
        Chunk::new(self.tag, self.data.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tag_validation() {
        assert!(ChunkTag::new("IHDR").is_ok());
        assert!(matches!(
            ChunkTag::new("IHD"),
            Err(StashError::InvalidChunkTag)
        ));
        assert!(matches!(
            ChunkTag::new("IHDR2"),
            Err(StashError::InvalidChunkTag)
        ));

        assert_eq!(ChunkTag::new("tEXt").unwrap(), ChunkTag::TEXT);
        assert_eq!(ChunkTag::IEND.to_string(), "IEND");
    }

    #[test]
    fn test_chunk_crc() {
        let chunk = Chunk::new(ChunkTag::IEND, Vec::new());
        assert_eq!(chunk.crc(), 0xAE426082);
    }

    #[test]
    fn test_chunk_serialization_round_trip() {
        let chunk = Chunk::new(ChunkTag::TEXT, b"key\x00dmFsdWU=".to_vec());
        let bytes = chunk.to_bytes();

        assert_eq!(bytes.len(), 12 + chunk.length());
        assert_eq!(&bytes[0..4], &(chunk.length() as u32).to_be_bytes());
        assert_eq!(&bytes[4..8], b"tEXt");

        let view = ChunkView::parse(&bytes, 0).unwrap();
        assert_eq!(view.tag(), ChunkTag::TEXT);
        assert_eq!(view.data(), chunk.data());
        assert_eq!(view.crc(), 0x9930A3C1);
        assert!(view.validate());
        assert_eq!(view.chunk_size(), bytes.len());
        assert_eq!(view.to_chunk(), chunk);
    }

    #[test]
    fn test_view_rejects_corrupt_crc() {
        let chunk = Chunk::new(ChunkTag::IDAT, vec![1, 2, 3, 4]);
        let mut bytes = chunk.to_bytes();
        bytes[9] ^= 0x01;

        let view = ChunkView::parse(&bytes, 0).unwrap();
        assert!(!view.validate());
    }

    #[test]
    fn test_view_bounds() {
        let chunk = Chunk::new(ChunkTag::IDAT, vec![0; 16]);
        let bytes = chunk.to_bytes();

        assert!(matches!(
            ChunkView::parse(&bytes[..10], 0),
            Err(StashError::OutOfBounds { .. })
        ));
        assert!(matches!(
            ChunkView::parse(&bytes[..bytes.len() - 1], 0),
            Err(StashError::OutOfBounds { .. })
        ));
    }
}
