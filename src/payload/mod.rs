//! Payload engines layered on top of the PNG codec
//!
//! [`PngPayload`] wraps an [`Image`] and adds the four embedding techniques:
//! trailing data (inherited straight from the image), base64 `tEXt` and
//! `zTXt` payloads, and the steganographic nibble channel. [`IcoPayload`]
//! lifts all of them onto the first PNG entry of an icon file.

use std::ops::{Deref, DerefMut};
use std::path::Path;

use log::debug;

use crate::ico::{EntryType, Icon};
use crate::png::{Image, PixelKind, Text, ZText};
use crate::utils;
use crate::{StashError, StashResult};

/// Magic bytes opening a stego frame
pub const STEGO_MAGIC_HEADER: [u8; 3] = *b"FCD";

/// Magic bytes closing a stego frame
pub const STEGO_MAGIC_FOOTER: [u8; 3] = *b"DCF";

/// Frame bytes surrounding the compressed payload: magic header, u32 size,
/// magic footer.
const STEGO_FRAME_OVERHEAD: usize = 3 + 4 + 3;

/// A PNG image with payload embedding and extraction on top
#[derive(Debug, Clone, Default)]
pub struct PngPayload {
    image: Image,
}

impl Deref for PngPayload {
    type Target = Image;

    fn deref(&self) -> &Image {
        &self.image
    }
}

impl DerefMut for PngPayload {
    fn deref_mut(&mut self) -> &mut Image {
        &mut self.image
    }
}

impl From<Image> for PngPayload {
    fn from(image: Image) -> Self {
        Self { image }
    }
}

impl PngPayload {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_bytes(data: &[u8], validate: bool) -> StashResult<Self> {
        Ok(Self {
            image: Image::from_bytes(data, validate)?,
        })
    }

    pub fn from_file(path: &Path, validate: bool) -> StashResult<Self> {
        Ok(Self {
            image: Image::from_file(path, validate)?,
        })
    }

    pub fn image(&self) -> &Image {
        &self.image
    }

    pub fn into_image(self) -> Image {
        self.image
    }

    /// Store `data` as a `tEXt` chunk holding its base64 encoding.
    pub fn add_text_payload(&mut self, keyword: &str, data: &[u8]) -> StashResult<Text> {
        self.image.add_text(keyword, &utils::base64_encode(data))
    }

    /// All `tEXt` chunks under `keyword`, each verified to carry a base64
    /// body. A single invalid body fails the whole call.
    pub fn get_text_payloads(&self, keyword: &str) -> StashResult<Vec<Text>> {
        let mut result = Vec::new();

        for text in self.image.get_text(keyword)? {
            let body = text.text();

            if !utils::is_base64_string(&body) {
                return Err(StashError::InvalidBase64String(body));
            }

            result.push(text);
        }

        Ok(result)
    }

    /// Decode every `tEXt` payload under `keyword`, in chunk order.
    pub fn extract_text_payloads(&self, keyword: &str) -> StashResult<Vec<Vec<u8>>> {
        self.get_text_payloads(keyword)?
            .iter()
            .map(|text| utils::base64_decode(&text.text()))
            .collect()
    }

    pub fn remove_text_payload(&mut self, payload: &Text) -> StashResult<()> {
        self.image.remove_text(payload)
    }

    /// Store `data` as a `zTXt` chunk holding its base64 encoding.
    pub fn add_ztext_payload(&mut self, keyword: &str, data: &[u8]) -> StashResult<ZText> {
        self.image.add_ztext(keyword, &utils::base64_encode(data))
    }

    /// All `zTXt` chunks under `keyword`, each verified to inflate to a
    /// base64 body.
    pub fn get_ztext_payloads(&self, keyword: &str) -> StashResult<Vec<ZText>> {
        let mut result = Vec::new();

        for ztext in self.image.get_ztext(keyword)? {
            let body = ztext.text()?;

            if !utils::is_base64_string(&body) {
                return Err(StashError::InvalidBase64String(body));
            }

            result.push(ztext);
        }

        Ok(result)
    }

    /// Decode every `zTXt` payload under `keyword`, in chunk order.
    pub fn extract_ztext_payloads(&self, keyword: &str) -> StashResult<Vec<Vec<u8>>> {
        let mut result = Vec::new();

        for ztext in self.get_ztext_payloads(keyword)? {
            result.push(utils::base64_decode(&ztext.text()?)?);
        }

        Ok(result)
    }

    pub fn remove_ztext_payload(&mut self, payload: &ZText) -> StashResult<()> {
        self.image.remove_ztext(payload)
    }

    /// The pixel kind, if it supports the nibble channel.
    fn stego_kind(&self) -> StashResult<PixelKind> {
        let kind = self.image.header()?.pixel_kind()?;

        match kind {
            PixelKind::TrueColor8 | PixelKind::AlphaTrueColor8 => Ok(kind),
            other => Err(StashError::UnsupportedPixelType { kind: other }),
        }
    }

    /// Total bits the nibble channel can hold: 4 bits in each of the three
    /// color channels of every pixel.
    fn stego_capacity(&self) -> StashResult<usize> {
        Ok(self.image.width()? as usize * self.image.height()? as usize * 3 * 4)
    }

    fn read_nibble(&self, width: usize, nibble_index: usize) -> StashResult<u8> {
        let pixel_index = nibble_index / 3;
        let channel = nibble_index % 3;
        let pixel = self
            .image
            .scanline(pixel_index / width)?
            .get_pixel(pixel_index % width)?;

        Ok(pixel.rgb_channel(channel)? & 0x0F)
    }

    fn write_nibble(&mut self, width: usize, nibble_index: usize, value: u8) -> StashResult<()> {
        let pixel_index = nibble_index / 3;
        let channel = nibble_index % 3;
        let x = pixel_index % width;

        let line = self.image.scanline_mut(pixel_index / width)?;
        let mut pixel = line.get_pixel(x)?;
        let high = pixel.rgb_channel(channel)? & 0xF0;
        pixel.set_rgb_channel(channel, high | value)?;

        line.set_pixel(pixel, x)
    }

    /// Collect `size` bytes from the nibble channel starting at `bit_offset`.
    ///
    /// The low nibble of each output byte comes first. `bit_offset` must be a
    /// multiple of 4 and the image must be loaded.
    pub fn read_stego_data(&self, bit_offset: usize, size: usize) -> StashResult<Vec<u8>> {
        if bit_offset % 4 != 0 {
            return Err(StashError::InvalidBitOffset { offset: bit_offset });
        }

        self.stego_kind()?;

        if !self.image.is_loaded() {
            return Err(StashError::NoImageData);
        }

        let have = self.stego_capacity()?;
        let need = bit_offset + size * 8;

        if need > have {
            return Err(StashError::ImageTooSmall { have, need });
        }

        let width = self.image.width()? as usize;
        let mut nibble_index = bit_offset / 4;
        let mut result = Vec::with_capacity(size);

        for _ in 0..size {
            let low = self.read_nibble(width, nibble_index)?;
            let high = self.read_nibble(width, nibble_index + 1)?;
            result.push(low | (high << 4));
            nibble_index += 2;
        }

        Ok(result)
    }

    /// Overwrite the nibble channel with `data`, starting at `bit_offset`.
    ///
    /// Each byte lands low nibble first, one nibble per color channel in
    /// raster order, skipping alpha.
    pub fn write_stego_data(&mut self, bit_offset: usize, data: &[u8]) -> StashResult<()> {
        if bit_offset % 4 != 0 {
            return Err(StashError::InvalidBitOffset { offset: bit_offset });
        }

        self.stego_kind()?;

        if !self.image.is_loaded() {
            return Err(StashError::NoImageData);
        }

        let have = self.stego_capacity()?;
        let need = bit_offset + data.len() * 8;

        if need > have {
            return Err(StashError::ImageTooSmall { have, need });
        }

        let width = self.image.width()? as usize;
        let mut nibble_index = bit_offset / 4;

        for &byte in data {
            self.write_nibble(width, nibble_index, byte & 0x0F)?;
            self.write_nibble(width, nibble_index + 1, byte >> 4)?;
            nibble_index += 2;
        }

        Ok(())
    }

    fn check_stego_payload(&self) -> StashResult<bool> {
        if !self.image.is_loaded() || self.stego_kind().is_err() {
            return Ok(false);
        }

        if self.read_stego_data(0, 3)? != STEGO_MAGIC_HEADER {
            return Ok(false);
        }

        let size_bytes = self.read_stego_data(3 * 8, 4)?;
        let size = u32::from_le_bytes([size_bytes[0], size_bytes[1], size_bytes[2], size_bytes[3]])
            as usize;

        // The claimed frame has to fit the nibble channel before the footer
        // is worth looking at.
        if (STEGO_FRAME_OVERHEAD + size) * 8 > self.stego_capacity()? {
            return Ok(false);
        }

        Ok(self.read_stego_data((7 + size) * 8, 3)? == STEGO_MAGIC_FOOTER)
    }

    /// Whether a loaded image carries a plausible stego frame: magic header,
    /// a size that fits the nibble channel, and the magic footer right after
    /// the claimed payload.
    pub fn has_stego_payload(&self) -> bool {
        self.check_stego_payload().unwrap_or(false)
    }

    /// Frame `data` and weave it into a clone of this image.
    ///
    /// The payload is deflated at level 9, framed, written into the nibble
    /// channel, and the clone is re-filtered and re-compressed so the new
    /// pixel data lands in fresh `IDAT` chunks.
    pub fn create_stego_payload(&self, data: &[u8]) -> StashResult<PngPayload> {
        let compressed = utils::compress(data, 9)?;

        let mut frame = Vec::with_capacity(STEGO_FRAME_OVERHEAD + compressed.len());
        frame.extend_from_slice(&STEGO_MAGIC_HEADER);
        frame.extend_from_slice(&(compressed.len() as u32).to_le_bytes());
        frame.extend_from_slice(&compressed);
        frame.extend_from_slice(&STEGO_MAGIC_FOOTER);

        let mut result = self.clone();

        if !result.is_loaded() {
            result.load()?;
        }

        let have = result.stego_capacity()?;
        let need = frame.len() * 8;

        if need > have {
            return Err(StashError::ImageTooSmall { have, need });
        }

        debug!(
            "weaving a {} byte frame into {} bits of nibble capacity",
            frame.len(),
            have
        );

        result.write_stego_data(0, &frame)?;
        result.filter()?;
        result.compress(Some(8192), -1)?;

        Ok(result)
    }

    /// Read back the framed payload and inflate it.
    pub fn extract_stego_payload(&self) -> StashResult<Vec<u8>> {
        if !self.has_stego_payload() {
            return Err(StashError::NoStegoData);
        }

        let size_bytes = self.read_stego_data(3 * 8, 4)?;
        let size = u32::from_le_bytes([size_bytes[0], size_bytes[1], size_bytes[2], size_bytes[3]])
            as usize;

        utils::decompress(&self.read_stego_data(7 * 8, size)?)
    }
}

/// An icon file whose first PNG entry acts as the payload carrier
#[derive(Debug, Clone)]
pub struct IcoPayload {
    icon: Icon,
    index: usize,
    png: PngPayload,
}

impl Deref for IcoPayload {
    type Target = PngPayload;

    fn deref(&self) -> &PngPayload {
        &self.png
    }
}

impl DerefMut for IcoPayload {
    fn deref_mut(&mut self) -> &mut PngPayload {
        &mut self.png
    }
}

impl IcoPayload {
    pub fn from_bytes(data: &[u8], validate: bool) -> StashResult<Self> {
        let icon = Icon::from_bytes(data)?;

        let mut index = None;

        for i in 0..icon.size() {
            if icon.entry_type(i)? == EntryType::Png {
                index = Some(i);
                break;
            }
        }

        let index = index.ok_or(StashError::NoPngEntry)?;
        let png = PngPayload::from_bytes(icon.get_entry(index)?.data(), validate)?;

        debug!("using icon entry {index} as the PNG payload carrier");

        Ok(Self { icon, index, png })
    }

    pub fn from_file(path: &Path, validate: bool) -> StashResult<Self> {
        Self::from_bytes(&utils::read_file(path)?, validate)
    }

    pub fn icon(&self) -> &Icon {
        &self.icon
    }

    /// Which directory entry carries the nested PNG.
    pub fn entry_index(&self) -> usize {
        self.index
    }

    pub fn png_payload(&self) -> &PngPayload {
        &self.png
    }

    pub fn png_payload_mut(&mut self) -> &mut PngPayload {
        &mut self.png
    }

    /// Replace the nested PNG payload outright.
    pub fn set_png_payload(&mut self, png: PngPayload) {
        self.png = png;
    }

    /// Re-serialize the icon with the current PNG payload written back into
    /// its entry; all entry offsets are recomputed.
    pub fn to_file(&self) -> StashResult<Vec<u8>> {
        let mut icon = self.icon.clone();
        icon.set_entry_data(self.index, self.png.to_file())?;
        icon.to_file()
    }

    pub fn save(&self, path: &Path) -> StashResult<()> {
        utils::write_file(path, &self.to_file()?)
    }
}
