//! Scanline codec: per-row reads, filter application and reconstruction
//!
//! Each row carries a filter-type byte followed by the byte-padded pixel
//! payload. Filtering and reconstruction are byte-wise over the payload with
//! the span width as the left-neighbor distance, so bit-packed kinds filter
//! against the previous packed byte exactly like the PNG specification
//! requires.

use crate::png::header::{Header, PixelKind};
use crate::png::pixel::Pixel;
use crate::{StashError, StashResult};

/// The five per-row filter transforms
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterType {
    None = 0,
    Sub = 1,
    Up = 2,
    Average = 3,
    Paeth = 4,
}

impl TryFrom<u8> for FilterType {
    type Error = StashError;

    fn try_from(value: u8) -> StashResult<Self> {
        match value {
            0 => Ok(FilterType::None),
            1 => Ok(FilterType::Sub),
            2 => Ok(FilterType::Up),
            3 => Ok(FilterType::Average),
            4 => Ok(FilterType::Paeth),
            other => Err(StashError::InvalidFilterType { filter_type: other }),
        }
    }
}

/// Pick the Paeth predictor among left, up and up-left.
///
/// The evaluation order of the three comparisons is fixed by the PNG
/// specification and must not be reordered.
fn paeth_predict(left: u8, prev: u8, prev_left: u8) -> u8 {
    let a = left as i32;
    let b = prev as i32;
    let c = prev_left as i32;
    let p = a + b - c;

    let pa = (p - a).abs();
    let pb = (p - b).abs();
    let pc = (p - c).abs();

    if pa <= pb && pa <= pc {
        left
    } else if pb <= pc {
        prev
    } else {
        prev_left
    }
}

/// One row of pixels plus its leading filter-type byte.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scanline {
    kind: PixelKind,
    filter_type: u8,
    data: Vec<u8>,
}

impl Scanline {
    /// A zeroed scanline wide enough for `width` pixels.
    pub fn new(kind: PixelKind, filter_type: u8, width: usize) -> Self {
        let samples = kind.samples_per_span();
        let spans = width / samples + usize::from(width % samples != 0);

        Self {
            kind,
            filter_type,
            data: vec![0; spans * kind.span_bytes()],
        }
    }

    /// Read one row from the raw inflated buffer starting at `offset`.
    pub fn read_line(
        kind: PixelKind,
        raw: &[u8],
        offset: usize,
        width: usize,
    ) -> StashResult<Self> {
        if offset >= raw.len() {
            return Err(StashError::OutOfBounds {
                index: offset,
                limit: raw.len(),
            });
        }

        let filter_type = raw[offset];
        let bit_width = kind.bits() * width;
        let byte_width = bit_width / 8 + usize::from(bit_width % 8 != 0);

        if offset + 1 + byte_width > raw.len() {
            return Err(StashError::OutOfBounds {
                index: offset + 1 + byte_width,
                limit: raw.len(),
            });
        }

        Ok(Self {
            kind,
            filter_type,
            data: raw[offset + 1..offset + 1 + byte_width].to_vec(),
        })
    }

    /// Cut the whole inflated buffer into `height` rows.
    pub fn from_raw(header: &Header, raw: &[u8]) -> StashResult<Vec<Self>> {
        let kind = header.pixel_kind()?;
        let width = header.width()? as usize;
        let buffer_size = header.buffer_size()?;

        if raw.len() != buffer_size {
            return Err(StashError::PixelMismatch);
        }

        let bit_width = kind.bits() * width;
        let byte_width = bit_width / 8 + usize::from(bit_width % 8 != 0);
        let mut result = Vec::new();

        let mut offset = 0;

        while offset < buffer_size {
            result.push(Self::read_line(kind, raw, offset, width)?);
            offset += byte_width + 1;
        }

        Ok(result)
    }

    pub fn kind(&self) -> PixelKind {
        self.kind
    }

    pub fn filter_type(&self) -> u8 {
        self.filter_type
    }

    pub fn set_filter_type(&mut self, filter_type: u8) {
        self.filter_type = filter_type;
    }

    /// Raw payload bytes, without the filter byte.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Number of spans in the row.
    pub fn pixel_span(&self) -> usize {
        self.data.len() / self.kind.span_bytes()
    }

    /// Number of addressable samples, padding included for packed kinds.
    pub fn pixel_width(&self) -> usize {
        self.pixel_span() * self.kind.samples_per_span()
    }

    pub fn get_pixel(&self, index: usize) -> StashResult<Pixel> {
        if index >= self.pixel_width() {
            return Err(StashError::OutOfBounds {
                index,
                limit: self.pixel_width(),
            });
        }

        let samples = self.kind.samples_per_span();
        let span_bytes = self.kind.span_bytes();
        let start = (index / samples) * span_bytes;

        Pixel::read_from_span(self.kind, &self.data[start..start + span_bytes], index % samples)
    }

    pub fn set_pixel(&mut self, pixel: Pixel, index: usize) -> StashResult<()> {
        if pixel.kind() != self.kind {
            return Err(StashError::PixelMismatch);
        }

        if index >= self.pixel_width() {
            return Err(StashError::OutOfBounds {
                index,
                limit: self.pixel_width(),
            });
        }

        let samples = self.kind.samples_per_span();
        let span_bytes = self.kind.span_bytes();
        let start = (index / samples) * span_bytes;

        pixel.write_to_span(&mut self.data[start..start + span_bytes], index % samples)
    }

    /// Serialize the row: filter byte followed by the payload.
    pub fn to_raw(&self) -> Vec<u8> {
        let mut raw = Vec::with_capacity(1 + self.data.len());
        raw.push(self.filter_type);
        raw.extend_from_slice(&self.data);
        raw
    }

    fn check_previous(&self, previous: Option<&Scanline>) -> StashResult<()> {
        if let Some(previous) = previous {
            if previous.kind != self.kind || previous.data.len() != self.data.len() {
                return Err(StashError::ScanlineMismatch);
            }
        }

        Ok(())
    }

    /// Undo the row's filter against the previous raw row.
    ///
    /// The returned row carries filter type 0. A row that is already raw is
    /// returned unchanged.
    pub fn reconstruct(&self, previous: Option<&Scanline>) -> StashResult<Scanline> {
        if self.filter_type == 0 {
            return Ok(self.clone());
        }

        self.check_previous(previous)?;

        if self.data.is_empty() {
            return Err(StashError::NoPixels);
        }

        let filter = FilterType::try_from(self.filter_type)?;
        let bpp = self.kind.span_bytes();
        let mut result = self.clone();

        for i in 0..result.data.len() {
            let curr = result.data[i];
            let left = if i >= bpp { result.data[i - bpp] } else { 0 };
            let prev = previous.map_or(0, |p| p.data[i]);
            let prev_left = if i >= bpp {
                previous.map_or(0, |p| p.data[i - bpp])
            } else {
                0
            };

            result.data[i] = match filter {
                FilterType::None => curr,
                FilterType::Sub => curr.wrapping_add(left),
                FilterType::Up => curr.wrapping_add(prev),
                FilterType::Average => {
                    curr.wrapping_add(((left as u16 + prev as u16) / 2) as u8)
                }
                FilterType::Paeth => curr.wrapping_add(paeth_predict(left, prev, prev_left)),
            };
        }

        result.filter_type = FilterType::None as u8;

        Ok(result)
    }

    /// Apply one specific filter against the previous raw row.
    pub fn filter_with(&self, filter_type: u8, previous: Option<&Scanline>) -> StashResult<Scanline> {
        if self.filter_type != 0 {
            return Err(StashError::AlreadyFiltered);
        }

        self.check_previous(previous)?;

        if self.data.is_empty() {
            return Err(StashError::NoPixels);
        }

        let filter = FilterType::try_from(filter_type)?;

        if filter == FilterType::None {
            return Ok(self.clone());
        }

        let bpp = self.kind.span_bytes();
        let mut result = self.clone();

        for i in 0..self.data.len() {
            let curr = self.data[i];
            let left = if i >= bpp { self.data[i - bpp] } else { 0 };
            let prev = previous.map_or(0, |p| p.data[i]);
            let prev_left = if i >= bpp {
                previous.map_or(0, |p| p.data[i - bpp])
            } else {
                0
            };

            result.data[i] = match filter {
                FilterType::None => curr,
                FilterType::Sub => curr.wrapping_sub(left),
                FilterType::Up => curr.wrapping_sub(prev),
                FilterType::Average => {
                    curr.wrapping_sub(((left as u16 + prev as u16) / 2) as u8)
                }
                FilterType::Paeth => curr.wrapping_sub(paeth_predict(left, prev, prev_left)),
            };
        }

        result.filter_type = filter_type;

        Ok(result)
    }

    /// Apply the filter whose output minimizes the absolute signed byte sum,
    /// ties going to the lowest filter type.
    pub fn filter(&self, previous: Option<&Scanline>) -> StashResult<Scanline> {
        let mut best: Option<(u64, Scanline)> = None;

        for filter_type in 0..=4u8 {
            let candidate = self.filter_with(filter_type, previous)?;

            let sum: i64 = candidate.data.iter().map(|&byte| (byte as i8) as i64).sum();
            let magnitude = sum.unsigned_abs();

            match &best {
                Some((best_magnitude, _)) if magnitude >= *best_magnitude => {}
                _ => best = Some((magnitude, candidate)),
            }
        }

        Ok(best.map(|(_, scanline)| scanline).expect("five candidates were produced"))
    }
}
