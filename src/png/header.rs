//! Typed accessors over the 13-byte IHDR payload

use crate::png::chunk::{Chunk, ChunkTag};
use crate::utils::{read_u32_be, write_u32_be};
use crate::{StashError, StashResult};

/// PNG color type values as stored in the header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorType {
    Grayscale = 0,
    TrueColor = 2,
    Palette = 3,
    AlphaGrayscale = 4,
    AlphaTrueColor = 6,
}

impl TryFrom<u8> for ColorType {
    type Error = StashError;

    fn try_from(value: u8) -> StashResult<Self> {
        match value {
            0 => Ok(ColorType::Grayscale),
            2 => Ok(ColorType::TrueColor),
            3 => Ok(ColorType::Palette),
            4 => Ok(ColorType::AlphaGrayscale),
            6 => Ok(ColorType::AlphaTrueColor),
            other => Err(StashError::InvalidColorType { color_type: other }),
        }
    }
}

/// The closed set of pixel variants a PNG can carry.
///
/// One variant per legal (color type, bit depth) pair; any other combination
/// is rejected while deriving the kind from the header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelKind {
    Grayscale1,
    Grayscale2,
    Grayscale4,
    Grayscale8,
    Grayscale16,
    TrueColor8,
    TrueColor16,
    Palette1,
    Palette2,
    Palette4,
    Palette8,
    AlphaGrayscale8,
    AlphaGrayscale16,
    AlphaTrueColor8,
    AlphaTrueColor16,
}

impl PixelKind {
    /// All 15 variants in canonical order.
    pub const ALL: [PixelKind; 15] = [
        PixelKind::Grayscale1,
        PixelKind::Grayscale2,
        PixelKind::Grayscale4,
        PixelKind::Grayscale8,
        PixelKind::Grayscale16,
        PixelKind::TrueColor8,
        PixelKind::TrueColor16,
        PixelKind::Palette1,
        PixelKind::Palette2,
        PixelKind::Palette4,
        PixelKind::Palette8,
        PixelKind::AlphaGrayscale8,
        PixelKind::AlphaGrayscale16,
        PixelKind::AlphaTrueColor8,
        PixelKind::AlphaTrueColor16,
    ];

    /// Bits per whole pixel.
    pub fn bits(self) -> usize {
        match self {
            PixelKind::Grayscale1 | PixelKind::Palette1 => 1,
            PixelKind::Grayscale2 | PixelKind::Palette2 => 2,
            PixelKind::Grayscale4 | PixelKind::Palette4 => 4,
            PixelKind::Grayscale8 | PixelKind::Palette8 => 8,
            PixelKind::Grayscale16 | PixelKind::AlphaGrayscale8 => 16,
            PixelKind::TrueColor8 => 24,
            PixelKind::AlphaGrayscale16 | PixelKind::AlphaTrueColor8 => 32,
            PixelKind::TrueColor16 => 48,
            PixelKind::AlphaTrueColor16 => 64,
        }
    }

    /// Bits per single sample (channel).
    pub fn sample_bits(self) -> usize {
        match self {
            PixelKind::Grayscale1 | PixelKind::Palette1 => 1,
            PixelKind::Grayscale2 | PixelKind::Palette2 => 2,
            PixelKind::Grayscale4 | PixelKind::Palette4 => 4,
            PixelKind::Grayscale8
            | PixelKind::Palette8
            | PixelKind::TrueColor8
            | PixelKind::AlphaGrayscale8
            | PixelKind::AlphaTrueColor8 => 8,
            PixelKind::Grayscale16
            | PixelKind::TrueColor16
            | PixelKind::AlphaGrayscale16
            | PixelKind::AlphaTrueColor16 => 16,
        }
    }

    /// Number of channels carried by a pixel of this kind.
    pub fn channels(self) -> usize {
        match self {
            PixelKind::Grayscale1
            | PixelKind::Grayscale2
            | PixelKind::Grayscale4
            | PixelKind::Grayscale8
            | PixelKind::Grayscale16
            | PixelKind::Palette1
            | PixelKind::Palette2
            | PixelKind::Palette4
            | PixelKind::Palette8 => 1,
            PixelKind::AlphaGrayscale8 | PixelKind::AlphaGrayscale16 => 2,
            PixelKind::TrueColor8 | PixelKind::TrueColor16 => 3,
            PixelKind::AlphaTrueColor8 | PixelKind::AlphaTrueColor16 => 4,
        }
    }

    /// How many pixels share one span: `8 / bits` for sub-byte kinds, 1
    /// otherwise.
    pub fn samples_per_span(self) -> usize {
        if self.bits() < 8 {
            8 / self.bits()
        } else {
            1
        }
    }

    /// Raw bytes occupied by one span: a single packed byte for sub-byte
    /// kinds, `bits / 8` otherwise.
    pub fn span_bytes(self) -> usize {
        if self.bits() < 8 {
            1
        } else {
            self.bits() / 8
        }
    }

    /// Largest value a single sample can hold.
    pub fn max_sample(self) -> usize {
        (1usize << self.sample_bits()) - 1
    }

    /// Numeric code of this kind in canonical order.
    pub fn code(self) -> usize {
        Self::ALL
            .iter()
            .position(|kind| *kind == self)
            .expect("kind is a member of ALL")
    }

    /// Inverse of [`PixelKind::code`].
    pub fn from_code(code: usize) -> StashResult<Self> {
        Self::ALL
            .get(code)
            .copied()
            .ok_or(StashError::InvalidPixelType { code })
    }
}

/// The IHDR chunk with typed field access.
///
/// All integer fields are big-endian in the 13-byte payload; accessors fail
/// with `InsufficientSize` when the payload is not exactly 13 bytes, so
/// nonconforming headers can still be carried around and round-tripped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    chunk: Chunk,
}

impl Header {
    pub const LENGTH: usize = 13;

    /// Build a fresh header. Compression, filter and interlace methods are 0.
    pub fn new(width: u32, height: u32, bit_depth: u8, color_type: u8) -> Self {
        let mut data = vec![0u8; Self::LENGTH];
        write_u32_be(&mut data, 0, width);
        write_u32_be(&mut data, 4, height);
        data[8] = bit_depth;
        data[9] = color_type;

        Self {
            chunk: Chunk::new(ChunkTag::IHDR, data),
        }
    }

    pub fn from_chunk(chunk: Chunk) -> Self {
        Self { chunk }
    }

    pub fn chunk(&self) -> &Chunk {
        &self.chunk
    }

    pub fn into_chunk(self) -> Chunk {
        self.chunk
    }

    fn payload(&self) -> StashResult<&[u8]> {
        if self.chunk.length() != Self::LENGTH {
            return Err(StashError::InsufficientSize {
                given: self.chunk.length(),
                needed: Self::LENGTH,
            });
        }

        Ok(self.chunk.data())
    }

    fn payload_mut(&mut self) -> StashResult<&mut Vec<u8>> {
        if self.chunk.length() != Self::LENGTH {
            return Err(StashError::InsufficientSize {
                given: self.chunk.length(),
                needed: Self::LENGTH,
            });
        }

        Ok(self.chunk.data_mut())
    }

    pub fn width(&self) -> StashResult<u32> {
        Ok(read_u32_be(self.payload()?, 0))
    }

    pub fn set_width(&mut self, width: u32) -> StashResult<()> {
        write_u32_be(self.payload_mut()?, 0, width);
        Ok(())
    }

    pub fn height(&self) -> StashResult<u32> {
        Ok(read_u32_be(self.payload()?, 4))
    }

    pub fn set_height(&mut self, height: u32) -> StashResult<()> {
        write_u32_be(self.payload_mut()?, 4, height);
        Ok(())
    }

    pub fn bit_depth(&self) -> StashResult<u8> {
        Ok(self.payload()?[8])
    }

    pub fn set_bit_depth(&mut self, bit_depth: u8) -> StashResult<()> {
        self.payload_mut()?[8] = bit_depth;
        Ok(())
    }

    pub fn color_type(&self) -> StashResult<u8> {
        Ok(self.payload()?[9])
    }

    pub fn set_color_type(&mut self, color_type: u8) -> StashResult<()> {
        self.payload_mut()?[9] = color_type;
        Ok(())
    }

    pub fn compression_method(&self) -> StashResult<u8> {
        Ok(self.payload()?[10])
    }

    pub fn set_compression_method(&mut self, method: u8) -> StashResult<()> {
        self.payload_mut()?[10] = method;
        Ok(())
    }

    pub fn filter_method(&self) -> StashResult<u8> {
        Ok(self.payload()?[11])
    }

    pub fn set_filter_method(&mut self, method: u8) -> StashResult<()> {
        self.payload_mut()?[11] = method;
        Ok(())
    }

    pub fn interlace_method(&self) -> StashResult<u8> {
        Ok(self.payload()?[12])
    }

    pub fn set_interlace_method(&mut self, method: u8) -> StashResult<()> {
        self.payload_mut()?[12] = method;
        Ok(())
    }

    /// Derive the pixel variant from the (color type, bit depth) pair.
    pub fn pixel_kind(&self) -> StashResult<PixelKind> {
        let depth = self.bit_depth()?;
        let color = ColorType::try_from(self.color_type()?)?;

        let kind = match (color, depth) {
            (ColorType::Grayscale, 1) => PixelKind::Grayscale1,
            (ColorType::Grayscale, 2) => PixelKind::Grayscale2,
            (ColorType::Grayscale, 4) => PixelKind::Grayscale4,
            (ColorType::Grayscale, 8) => PixelKind::Grayscale8,
            (ColorType::Grayscale, 16) => PixelKind::Grayscale16,
            (ColorType::TrueColor, 8) => PixelKind::TrueColor8,
            (ColorType::TrueColor, 16) => PixelKind::TrueColor16,
            (ColorType::Palette, 1) => PixelKind::Palette1,
            (ColorType::Palette, 2) => PixelKind::Palette2,
            (ColorType::Palette, 4) => PixelKind::Palette4,
            (ColorType::Palette, 8) => PixelKind::Palette8,
            (ColorType::AlphaGrayscale, 8) => PixelKind::AlphaGrayscale8,
            (ColorType::AlphaGrayscale, 16) => PixelKind::AlphaGrayscale16,
            (ColorType::AlphaTrueColor, 8) => PixelKind::AlphaTrueColor8,
            (ColorType::AlphaTrueColor, 16) => PixelKind::AlphaTrueColor16,
            _ => return Err(StashError::InvalidBitDepth { depth }),
        };

        Ok(kind)
    }

    /// Bits per pixel.
    pub fn pixel_size(&self) -> StashResult<usize> {
        Ok(self.pixel_kind()?.bits())
    }

    /// Exact size of the inflated image data: one filter byte plus the
    /// byte-padded scanline stride, per row.
    pub fn buffer_size(&self) -> StashResult<usize> {
        let width = self.width()? as usize;
        let height = self.height()? as usize;
        let stride_bits = width * self.pixel_size()?;
        let stride_bytes = stride_bits / 8 + usize::from(stride_bits % 8 != 0);

        Ok(height * (1 + stride_bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_round_trip() {
        let mut header = Header::new(640, 480, 8, 2);
        assert_eq!(header.width().unwrap(), 640);
        assert_eq!(header.height().unwrap(), 480);
        assert_eq!(header.bit_depth().unwrap(), 8);
        assert_eq!(header.color_type().unwrap(), 2);
        assert_eq!(header.compression_method().unwrap(), 0);
        assert_eq!(header.filter_method().unwrap(), 0);
        assert_eq!(header.interlace_method().unwrap(), 0);

        header.set_width(32).unwrap();
        header.set_height(16).unwrap();
        assert_eq!(header.width().unwrap(), 32);
        assert_eq!(header.height().unwrap(), 16);
    }

    #[test]
    fn test_short_payload_rejected() {
        let header = Header::from_chunk(Chunk::new(ChunkTag::IHDR, vec![0; 12]));
        assert!(matches!(
            header.width(),
            Err(StashError::InsufficientSize {
                given: 12,
                needed: 13
            })
        ));
    }

    #[test]
    fn test_pixel_kind_table() {
        let cases = [
            (0u8, 1u8, PixelKind::Grayscale1),
            (0, 2, PixelKind::Grayscale2),
            (0, 4, PixelKind::Grayscale4),
            (0, 8, PixelKind::Grayscale8),
            (0, 16, PixelKind::Grayscale16),
            (2, 8, PixelKind::TrueColor8),
            (2, 16, PixelKind::TrueColor16),
            (3, 1, PixelKind::Palette1),
            (3, 2, PixelKind::Palette2),
            (3, 4, PixelKind::Palette4),
            (3, 8, PixelKind::Palette8),
            (4, 8, PixelKind::AlphaGrayscale8),
            (4, 16, PixelKind::AlphaGrayscale16),
            (6, 8, PixelKind::AlphaTrueColor8),
            (6, 16, PixelKind::AlphaTrueColor16),
        ];

        for (color, depth, kind) in cases {
            let header = Header::new(1, 1, depth, color);
            assert_eq!(header.pixel_kind().unwrap(), kind);
        }
    }

    #[test]
    fn test_invalid_combinations() {
        assert!(matches!(
            Header::new(1, 1, 3, 0).pixel_kind(),
            Err(StashError::InvalidBitDepth { depth: 3 })
        ));
        assert!(matches!(
            Header::new(1, 1, 16, 3).pixel_kind(),
            Err(StashError::InvalidBitDepth { depth: 16 })
        ));
        assert!(matches!(
            Header::new(1, 1, 8, 5).pixel_kind(),
            Err(StashError::InvalidColorType { color_type: 5 })
        ));
    }

    #[test]
    fn test_span_geometry() {
        assert_eq!(PixelKind::Grayscale1.samples_per_span(), 8);
        assert_eq!(PixelKind::Grayscale2.samples_per_span(), 4);
        assert_eq!(PixelKind::Palette4.samples_per_span(), 2);
        assert_eq!(PixelKind::TrueColor8.samples_per_span(), 1);

        assert_eq!(PixelKind::Palette2.span_bytes(), 1);
        assert_eq!(PixelKind::TrueColor8.span_bytes(), 3);
        assert_eq!(PixelKind::AlphaTrueColor16.span_bytes(), 8);

        assert_eq!(PixelKind::Grayscale2.max_sample(), 3);
        assert_eq!(PixelKind::Grayscale16.max_sample(), 65535);
    }

    #[test]
    fn test_pixel_kind_codes() {
        for (code, kind) in PixelKind::ALL.iter().enumerate() {
            assert_eq!(kind.code(), code);
            assert_eq!(PixelKind::from_code(code).unwrap(), *kind);
        }

        assert!(matches!(
            PixelKind::from_code(15),
            Err(StashError::InvalidPixelType { code: 15 })
        ));
    }

    #[test]
    fn test_buffer_size() {
        // 3x2 RGB8: stride 9 bytes, one filter byte per row
        assert_eq!(Header::new(3, 2, 8, 2).buffer_size().unwrap(), 20);
        // 5x4 1-bit grayscale: 5 bits round up to 1 byte per row
        assert_eq!(Header::new(5, 4, 1, 0).buffer_size().unwrap(), 8);
        // 4x1 16-bit RGBA: 32 bytes plus the filter byte
        assert_eq!(Header::new(4, 1, 16, 6).buffer_size().unwrap(), 33);
    }
}
