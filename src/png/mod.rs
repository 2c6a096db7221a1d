//! PNG parsing, decoding, editing and reassembly
//!
//! An [`Image`] holds three things: an insertion-ordered chunk map, an
//! optional trailing-data slot for bytes found after `IEND`, and an optional
//! decoded-scanline slot. Saving without ever loading preserves the `IDAT`
//! bytes verbatim, which is what the trailing-data and text payload paths
//! rely on to avoid re-encoding pixels.

pub mod chunk;
pub mod header;
pub mod pixel;
pub mod scanline;
pub mod text;

pub use chunk::{Chunk, ChunkTag, ChunkView};
pub use header::{ColorType, Header, PixelKind};
pub use pixel::{GrayAlpha, Pixel, Rgb, Rgba};
pub use scanline::{FilterType, Scanline};
pub use text::{Text, ZText, KEYWORD_MAX};

use std::path::Path;

use log::debug;

use crate::utils::{self, PNG_SIGNATURE};
use crate::{StashError, StashResult};

/// Emission order for known tags; anything else goes after these in the
/// order it was first seen, and `IEND` always closes the file.
const CANONICAL_ORDER: [[u8; 4]; 22] = [
    *b"IHDR", *b"gAMA", *b"PLTE", *b"IDAT", *b"tRNS", *b"cHRM", *b"iCCP", *b"sBIT", *b"sRGB",
    *b"cICP", *b"tEXt", *b"zTXt", *b"iTXt", *b"bKGD", *b"hIST", *b"pHYs", *b"sPLT", *b"eXIf",
    *b"tIME", *b"acTL", *b"fcTL", *b"fdAT",
];

/// A parsed PNG image
#[derive(Debug, Clone, Default)]
pub struct Image {
    chunk_map: Vec<(ChunkTag, Vec<Chunk>)>,
    trailing_data: Option<Vec<u8>>,
    image_data: Option<Vec<Scanline>>,
}

impl Image {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_bytes(data: &[u8], validate: bool) -> StashResult<Self> {
        let mut image = Self::new();
        image.parse(data, validate)?;

        Ok(image)
    }

    pub fn from_file(path: &Path, validate: bool) -> StashResult<Self> {
        Self::from_bytes(&utils::read_file(path)?, validate)
    }

    fn group(&self, tag: ChunkTag) -> Option<&Vec<Chunk>> {
        self.chunk_map
            .iter()
            .find(|(group_tag, _)| *group_tag == tag)
            .map(|(_, chunks)| chunks)
    }

    fn group_entry(&mut self, tag: ChunkTag) -> &mut Vec<Chunk> {
        let position = self
            .chunk_map
            .iter()
            .position(|(group_tag, _)| *group_tag == tag);

        let position = match position {
            Some(position) => position,
            None => {
                self.chunk_map.push((tag, Vec::new()));
                self.chunk_map.len() - 1
            }
        };

        &mut self.chunk_map[position].1
    }

    pub fn has_chunk(&self, tag: &str) -> bool {
        ChunkTag::new(tag)
            .map(|tag| self.group(tag).is_some_and(|chunks| !chunks.is_empty()))
            .unwrap_or(false)
    }

    /// All chunks with the given tag, in insertion order.
    pub fn get_chunks(&self, tag: &str) -> StashResult<Vec<Chunk>> {
        let parsed = ChunkTag::new(tag)?;

        self.group(parsed)
            .filter(|chunks| !chunks.is_empty())
            .cloned()
            .ok_or_else(|| StashError::ChunkNotFound {
                tag: tag.to_string(),
            })
    }

    /// Append a chunk to its tag group.
    pub fn add_chunk(&mut self, chunk: Chunk) {
        self.group_entry(chunk.tag()).push(chunk);
    }

    /// Replace a tag group wholesale, keeping its first-seen position.
    pub fn set_chunks(&mut self, tag: ChunkTag, chunks: Vec<Chunk>) {
        *self.group_entry(tag) = chunks;
    }

    pub fn has_trailing_data(&self) -> bool {
        self.trailing_data.is_some()
    }

    pub fn get_trailing_data(&self) -> StashResult<&[u8]> {
        self.trailing_data
            .as_deref()
            .ok_or(StashError::NoTrailingData)
    }

    pub fn set_trailing_data(&mut self, data: Vec<u8>) {
        self.trailing_data = Some(data);
    }

    pub fn clear_trailing_data(&mut self) {
        self.trailing_data = None;
    }

    /// Split `data` into the chunk map and the trailing slot.
    ///
    /// CRCs are checked when `validate` is set. Input that ends without an
    /// `IEND` chunk is accepted; `to_file` always emits one.
    pub fn parse(&mut self, data: &[u8], validate: bool) -> StashResult<()> {
        if data.len() < 8 {
            return Err(StashError::InsufficientSize {
                given: data.len(),
                needed: 8,
            });
        }

        if !utils::is_png_signature(data) {
            return Err(StashError::BadSignature);
        }

        self.chunk_map.clear();
        self.trailing_data = None;

        let mut offset = 8;

        while offset < data.len() {
            let view = ChunkView::parse(data, offset)?;

            if validate && !view.validate() {
                return Err(StashError::BadCrc {
                    given: view.crc(),
                    expected: view.expected_crc(),
                });
            }

            debug!("parsed chunk {} ({} bytes)", view.tag(), view.length());

            offset += view.chunk_size();
            let tag = view.tag();
            self.group_entry(tag).push(view.to_chunk());

            if tag == ChunkTag::IEND {
                break;
            }
        }

        if offset < data.len() {
            debug!("captured {} trailing bytes", data.len() - offset);
            self.trailing_data = Some(data[offset..].to_vec());
        }

        Ok(())
    }

    pub fn has_header(&self) -> bool {
        self.has_chunk("IHDR")
    }

    /// The IHDR chunk with typed access. The header is small, so this clones.
    pub fn header(&self) -> StashResult<Header> {
        self.group(ChunkTag::IHDR)
            .and_then(|chunks| chunks.first())
            .map(|chunk| Header::from_chunk(chunk.clone()))
            .ok_or(StashError::NoHeaderChunk)
    }

    /// Replace the IHDR group with the given header.
    pub fn set_header(&mut self, header: Header) {
        self.set_chunks(ChunkTag::IHDR, vec![header.into_chunk()]);
    }

    pub fn width(&self) -> StashResult<u32> {
        self.header()?.width()
    }

    pub fn height(&self) -> StashResult<u32> {
        self.header()?.height()
    }

    pub fn has_image_data(&self) -> bool {
        self.has_chunk("IDAT")
    }

    /// Whether scanlines have been materialized by `decompress`/`load`.
    pub fn is_loaded(&self) -> bool {
        self.image_data.is_some()
    }

    pub fn scanlines(&self) -> StashResult<&[Scanline]> {
        self.image_data.as_deref().ok_or(StashError::NoImageData)
    }

    pub fn scanline(&self, index: usize) -> StashResult<&Scanline> {
        let lines = self.scanlines()?;

        lines.get(index).ok_or(StashError::OutOfBounds {
            index,
            limit: lines.len(),
        })
    }

    pub fn scanline_mut(&mut self, index: usize) -> StashResult<&mut Scanline> {
        let lines = self.image_data.as_mut().ok_or(StashError::NoImageData)?;
        let limit = lines.len();

        lines
            .get_mut(index)
            .ok_or(StashError::OutOfBounds { index, limit })
    }

    /// `decompress` followed by `reconstruct`: afterwards the scanlines hold
    /// raw pixels.
    pub fn load(&mut self) -> StashResult<()> {
        self.decompress()?;
        self.reconstruct()
    }

    /// Concatenate the `IDAT` payloads in order, inflate, and cut the buffer
    /// into typed scanlines.
    pub fn decompress(&mut self) -> StashResult<()> {
        let chunks = self
            .group(ChunkTag::IDAT)
            .filter(|chunks| !chunks.is_empty())
            .ok_or(StashError::NoImageDataChunks)?;

        let mut combined = Vec::new();

        for chunk in chunks {
            combined.extend_from_slice(chunk.data());
        }

        let decompressed = utils::decompress(&combined)?;

        debug!(
            "inflated {} IDAT bytes into {}",
            combined.len(),
            decompressed.len()
        );

        self.image_data = Some(Scanline::from_raw(&self.header()?, &decompressed)?);

        Ok(())
    }

    /// Undo every row's filter, top to bottom. Atomic: on failure the image
    /// keeps its previous scanlines.
    pub fn reconstruct(&mut self) -> StashResult<()> {
        let lines = self.image_data.as_ref().ok_or(StashError::NoImageData)?;
        let mut result = lines.clone();

        for i in 0..result.len() {
            let (before, rest) = result.split_at_mut(i);
            let reconstructed = rest[0].reconstruct(before.last())?;
            rest[0] = reconstructed;
        }

        self.image_data = Some(result);

        Ok(())
    }

    /// Filter every row against the current raw rows, picking the best
    /// filter per row. Atomic: on failure the image keeps its raw scanlines.
    pub fn filter(&mut self) -> StashResult<()> {
        let lines = self.image_data.as_ref().ok_or(StashError::NoImageData)?;
        let mut result = Vec::with_capacity(lines.len());

        for (i, line) in lines.iter().enumerate() {
            let previous = if i == 0 { None } else { Some(&lines[i - 1]) };
            result.push(line.filter(previous)?);
        }

        self.image_data = Some(result);

        Ok(())
    }

    /// Serialize the scanlines (current filter bytes included), deflate, and
    /// replace the `IDAT` group. One chunk when `chunk_size` is `None`,
    /// otherwise a run of chunks each at most `chunk_size` bytes.
    pub fn compress(&mut self, chunk_size: Option<usize>, level: i32) -> StashResult<()> {
        let lines = self.image_data.as_ref().ok_or(StashError::NoImageData)?;
        let mut combined = Vec::new();

        for line in lines {
            combined.extend_from_slice(&line.to_raw());
        }

        let compressed = utils::compress(&combined, level)?;

        debug!(
            "deflated {} scanline bytes into {}",
            combined.len(),
            compressed.len()
        );

        let chunks = match chunk_size {
            None => vec![Chunk::new(ChunkTag::IDAT, compressed)],
            Some(chunk_size) => compressed
                .chunks(chunk_size.max(1))
                .map(|piece| Chunk::new(ChunkTag::IDAT, piece.to_vec()))
                .collect(),
        };

        self.set_chunks(ChunkTag::IDAT, chunks);

        Ok(())
    }

    /// Serialize: signature, chunks in canonical order, `IEND` (synthesized
    /// if absent), then any trailing data.
    pub fn to_file(&self) -> Vec<u8> {
        let mut order: Vec<ChunkTag> = CANONICAL_ORDER
            .iter()
            .map(|tag| ChunkTag::from_bytes(*tag))
            .collect();

        for (tag, _) in &self.chunk_map {
            if *tag != ChunkTag::IEND && !order.contains(tag) {
                order.push(*tag);
            }
        }

        let mut file_data = PNG_SIGNATURE.to_vec();

        for tag in order {
            if let Some(chunks) = self.group(tag) {
                for chunk in chunks {
                    file_data.extend_from_slice(&chunk.to_bytes());
                }
            }
        }

        match self.group(ChunkTag::IEND) {
            Some(chunks) if !chunks.is_empty() => {
                for chunk in chunks {
                    file_data.extend_from_slice(&chunk.to_bytes());
                }
            }
            _ => file_data.extend_from_slice(&Chunk::new(ChunkTag::IEND, Vec::new()).to_bytes()),
        }

        if let Some(trailing) = &self.trailing_data {
            file_data.extend_from_slice(trailing);
        }

        file_data
    }

    pub fn save(&self, path: &Path) -> StashResult<()> {
        utils::write_file(path, &self.to_file())
    }

    pub fn has_text(&self) -> bool {
        self.has_chunk("tEXt")
    }

    /// Append a `tEXt` chunk and return its typed view.
    pub fn add_text(&mut self, keyword: &str, text: &str) -> StashResult<Text> {
        let chunk_text = Text::new(keyword, text)?;
        self.add_chunk(chunk_text.chunk().clone());

        Ok(chunk_text)
    }

    /// All `tEXt` chunks whose keyword matches, in chunk order.
    pub fn get_text(&self, keyword: &str) -> StashResult<Vec<Text>> {
        let mut result = Vec::new();

        for chunk in self.get_chunks("tEXt")? {
            let text = Text::from_chunk(chunk);

            if text.keyword()? == keyword {
                result.push(text);
            }
        }

        Ok(result)
    }

    /// Remove the first structurally equal `tEXt` chunk.
    pub fn remove_text(&mut self, text: &Text) -> StashResult<()> {
        let chunks = self.group_entry(ChunkTag::TEXT);

        match chunks.iter().position(|chunk| chunk == text.chunk()) {
            Some(position) => {
                chunks.remove(position);
                Ok(())
            }
            None => Err(StashError::TextNotFound),
        }
    }

    pub fn has_ztext(&self) -> bool {
        self.has_chunk("zTXt")
    }

    /// Append a `zTXt` chunk and return its typed view.
    pub fn add_ztext(&mut self, keyword: &str, text: &str) -> StashResult<ZText> {
        let chunk_text = ZText::new(keyword, text)?;
        self.add_chunk(chunk_text.chunk().clone());

        Ok(chunk_text)
    }

    /// All `zTXt` chunks whose keyword matches, in chunk order.
    pub fn get_ztext(&self, keyword: &str) -> StashResult<Vec<ZText>> {
        let mut result = Vec::new();

        for chunk in self.get_chunks("zTXt")? {
            let ztext = ZText::from_chunk(chunk);

            if ztext.keyword()? == keyword {
                result.push(ztext);
            }
        }

        Ok(result)
    }

    /// Remove the first structurally equal `zTXt` chunk.
    pub fn remove_ztext(&mut self, ztext: &ZText) -> StashResult<()> {
        let chunks = self.group_entry(ChunkTag::ZTXT);

        match chunks.iter().position(|chunk| chunk == ztext.chunk()) {
            Some(position) => {
                chunks.remove(position);
                Ok(())
            }
            None => Err(StashError::TextNotFound),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Serialize a PNG from parts, with valid CRCs throughout.
    fn build_png(header: &Header, raw_rows: &[u8], extra: &[Chunk], trailing: &[u8]) -> Vec<u8> {
        let mut bytes = PNG_SIGNATURE.to_vec();
        bytes.extend_from_slice(&header.chunk().to_bytes());

        let compressed = utils::compress(raw_rows, -1).unwrap();
        bytes.extend_from_slice(&Chunk::new(ChunkTag::IDAT, compressed).to_bytes());

        for chunk in extra {
            bytes.extend_from_slice(&chunk.to_bytes());
        }

        bytes.extend_from_slice(&Chunk::new(ChunkTag::IEND, Vec::new()).to_bytes());
        bytes.extend_from_slice(trailing);
        bytes
    }

    fn rgb_fixture() -> Vec<u8> {
        // 3x2 RGB8, filter type 0 rows
        let rows = [
            0, 1, 2, 3, 4, 5, 6, 7, 8, 9, // row 0
            0, 9, 8, 7, 6, 5, 4, 3, 2, 1, // row 1
        ];

        build_png(&Header::new(3, 2, 8, 2), &rows, &[], &[])
    }

    #[test]
    fn test_parse_rejects_bad_signature() {
        assert!(matches!(
            Image::from_bytes(&[0u8; 16], true),
            Err(StashError::BadSignature)
        ));
        assert!(matches!(
            Image::from_bytes(&[0x89], true),
            Err(StashError::InsufficientSize { given: 1, needed: 8 })
        ));
    }

    #[test]
    fn test_parse_to_file_identity() {
        let file = rgb_fixture();
        let image = Image::from_bytes(&file, true).unwrap();

        assert!(image.has_header());
        assert!(image.has_image_data());
        assert_eq!(image.width().unwrap(), 3);
        assert_eq!(image.height().unwrap(), 2);
        assert_eq!(image.to_file(), file);
    }

    #[test]
    fn test_parse_to_file_identity_with_unknown_chunk_and_trailing() {
        let extra = Chunk::new(ChunkTag::new("teSt").unwrap(), b"opaque".to_vec());
        let file = build_png(&Header::new(3, 2, 8, 2), &[0u8; 20], &[extra], b"after the end");

        let image = Image::from_bytes(&file, true).unwrap();
        assert!(image.has_chunk("teSt"));
        assert!(image.has_trailing_data());
        assert_eq!(image.get_trailing_data().unwrap(), b"after the end");
        assert_eq!(image.to_file(), file);
    }

    #[test]
    fn test_parse_without_iend_still_saves_one() {
        let file = rgb_fixture();
        // Strip the trailing IEND frame (12 bytes)
        let truncated = &file[..file.len() - 12];

        let image = Image::from_bytes(truncated, true).unwrap();
        assert!(!image.has_chunk("IEND"));
        assert_eq!(image.to_file(), file);
    }

    #[test]
    fn test_crc_validation() {
        let mut file = rgb_fixture();

        // Flip a bit inside the IDAT payload: signature (8) + IHDR frame (25)
        // + IDAT length/tag (8) puts us in the data region.
        file[8 + 25 + 8] ^= 0x40;

        assert!(matches!(
            Image::from_bytes(&file, true),
            Err(StashError::BadCrc { .. })
        ));
        assert!(Image::from_bytes(&file, false).is_ok());
    }

    #[test]
    fn test_load_filter_compress_load_round_trip() {
        let mut image = Image::from_bytes(&rgb_fixture(), true).unwrap();
        image.load().unwrap();

        let first: Vec<Scanline> = image.scanlines().unwrap().to_vec();

        image.filter().unwrap();
        image.compress(Some(8192), -1).unwrap();

        let mut reparsed = Image::from_bytes(&image.to_file(), true).unwrap();
        reparsed.load().unwrap();

        assert_eq!(reparsed.scanlines().unwrap(), &first[..]);
    }

    #[test]
    fn test_split_idat_chunks_decompress_identically() {
        let mut image = Image::from_bytes(&rgb_fixture(), true).unwrap();
        image.load().unwrap();
        let reference: Vec<Scanline> = image.scanlines().unwrap().to_vec();

        image.filter().unwrap();
        image.compress(Some(4), 9).unwrap();
        assert!(image.get_chunks("IDAT").unwrap().len() > 1);

        let mut reparsed = Image::from_bytes(&image.to_file(), true).unwrap();
        reparsed.load().unwrap();
        assert_eq!(reparsed.scanlines().unwrap(), &reference[..]);
    }

    #[test]
    fn test_reconstruct_failure_is_atomic() {
        let mut image = Image::from_bytes(&rgb_fixture(), true).unwrap();
        image.decompress().unwrap();

        // Force a bogus filter byte so reconstruction fails on the second row.
        image.scanline_mut(1).unwrap().set_filter_type(9);
        let before: Vec<Scanline> = image.scanlines().unwrap().to_vec();

        assert!(image.reconstruct().is_err());
        assert_eq!(image.scanlines().unwrap(), &before[..]);
    }

    #[test]
    fn test_decompress_without_idat() {
        let mut image = Image::new();
        image.set_header(Header::new(1, 1, 8, 2));

        assert!(matches!(
            image.decompress(),
            Err(StashError::NoImageDataChunks)
        ));
        assert!(matches!(image.filter(), Err(StashError::NoImageData)));
        assert!(matches!(image.scanline(0), Err(StashError::NoImageData)));
    }

    #[test]
    fn test_trailing_data_slot() {
        let mut image = Image::from_bytes(&rgb_fixture(), true).unwrap();

        assert!(!image.has_trailing_data());
        assert!(matches!(
            image.get_trailing_data(),
            Err(StashError::NoTrailingData)
        ));

        image.set_trailing_data(b"Hello, Facade!".to_vec());
        let reparsed = Image::from_bytes(&image.to_file(), true).unwrap();
        assert_eq!(reparsed.get_trailing_data().unwrap(), b"Hello, Facade!");
    }

    #[test]
    fn test_text_helpers() {
        let mut image = Image::from_bytes(&rgb_fixture(), true).unwrap();

        assert!(!image.has_text());
        assert!(matches!(
            image.get_text("missing"),
            Err(StashError::ChunkNotFound { .. })
        ));

        image.add_text("alpha", "one").unwrap();
        image.add_text("beta", "two").unwrap();
        let third = image.add_text("alpha", "three").unwrap();

        let found = image.get_text("alpha").unwrap();
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].text(), "one");
        assert_eq!(found[1].text(), "three");

        image.remove_text(&third).unwrap();
        assert_eq!(image.get_text("alpha").unwrap().len(), 1);
        assert!(matches!(
            image.remove_text(&third),
            Err(StashError::TextNotFound)
        ));
    }

    #[test]
    fn test_ztext_helpers() {
        let mut image = Image::from_bytes(&rgb_fixture(), true).unwrap();

        let added = image.add_ztext("packed", "payload body").unwrap();
        assert!(image.has_ztext());

        let found = image.get_ztext("packed").unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].text().unwrap(), "payload body");

        image.remove_ztext(&added).unwrap();
        assert!(matches!(
            image.remove_ztext(&added),
            Err(StashError::TextNotFound)
        ));
    }

    #[test]
    fn test_text_survives_save_and_reload() {
        let mut image = Image::from_bytes(&rgb_fixture(), true).unwrap();
        image.add_text("keyword", "c29tZSBkYXRh").unwrap();

        let reparsed = Image::from_bytes(&image.to_file(), true).unwrap();
        let found = reparsed.get_text("keyword").unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].text(), "c29tZSBkYXRh");

        // The emitted chunk body is keyword, separator, then the text.
        assert_eq!(found[0].chunk().data(), b"keyword\x00c29tZSBkYXRh");
    }
}
