//! # pngstash
//!
//! This library embeds, extracts and detects arbitrary binary payloads in
//! PNG images (and Windows ICO files that carry PNG bitmaps).
//!
//! Four orthogonal payload techniques operate on the decoded PNG structure:
//!
//! * trailing data appended after the terminal `IEND` chunk,
//! * `tEXt` chunks carrying base64-encoded binary,
//! * `zTXt` chunks carrying zlib-compressed base64 text,
//! * steganographic payloads written into the low 4 bits of every RGB color
//!   channel.
//!
//! The core is a self-contained PNG codec: chunks are parsed into an ordered
//! map, `IDAT` data is inflated, cut into scanlines and unfiltered, pixels
//! are edited in place, then re-filtered, deflated and reassembled.

use std::path::PathBuf;

pub mod cli;
pub mod ico;
pub mod payload;
pub mod png;
pub mod utils;

pub use payload::{IcoPayload, PngPayload};

/// Result type alias for all library operations
pub type StashResult<T> = Result<T, StashError>;

/// Error type covering every stage of the PNG/ICO payload pipeline
#[derive(Debug, thiserror::Error)]
pub enum StashError {
    #[error("bad PNG signature")]
    BadSignature,

    #[error("bad CRC: given {given:#010x}, expected {expected:#010x}")]
    BadCrc { given: u32, expected: u32 },

    #[error("out of bounds: index is {index}, but the limit is {limit}")]
    OutOfBounds { index: usize, limit: usize },

    #[error("insufficient size: given {given} bytes, needed at least {needed}")]
    InsufficientSize { given: usize, needed: usize },

    #[error("invalid chunk tag: tags are exactly 4 ASCII bytes")]
    InvalidChunkTag,

    #[error("invalid bit depth: {depth} (valid values are 1, 2, 4, 8 and 16)")]
    InvalidBitDepth { depth: u8 },

    #[error("invalid color type: {color_type}")]
    InvalidColorType { color_type: u8 },

    #[error("invalid pixel type code: {code}")]
    InvalidPixelType { code: usize },

    #[error("invalid filter type: {filter_type}")]
    InvalidFilterType { filter_type: u8 },

    #[error("already filtered: the scanline has a non-zero filter type")]
    AlreadyFiltered,

    #[error("scanline mismatch: the previous scanline has a different shape")]
    ScanlineMismatch,

    #[error("pixel mismatch: the pixel variant does not match the image")]
    PixelMismatch,

    #[error("no pixels in the given scanline")]
    NoPixels,

    #[error("no header chunk (IHDR) found")]
    NoHeaderChunk,

    #[error("no image data chunks (IDAT) found")]
    NoImageDataChunks,

    #[error("no image data: decompress the IDAT chunks first")]
    NoImageData,

    #[error("no keyword present in the text chunk")]
    NoKeyword,

    #[error("keyword too long: text chunk keywords are at most 79 bytes")]
    KeywordTooLong,

    #[error("text not found in the image")]
    TextNotFound,

    #[error("integer overflow: given {given}, but the maximum value is {max}")]
    IntegerOverflow { given: usize, max: usize },

    #[error("zlib error: {0}")]
    Zlib(String),

    #[error("invalid base64 character: {character:?}")]
    InvalidBase64Character { character: char },

    #[error("invalid base64 string: {0:?}")]
    InvalidBase64String(String),

    #[error("unsupported pixel type for this operation: {kind:?}")]
    UnsupportedPixelType { kind: png::PixelKind },

    #[error("image too small: holds {have} bits, payload needs {need}")]
    ImageTooSmall { have: usize, need: usize },

    #[error("no steganographic data found in the image")]
    NoStegoData,

    #[error("invalid bit offset: {offset} is not a multiple of 4")]
    InvalidBitOffset { offset: usize },

    #[error("chunk not found: {tag}")]
    ChunkNotFound { tag: String },

    #[error("no trailing data present")]
    NoTrailingData,

    #[error("invalid icon header")]
    InvalidIconHeader,

    #[error("no icon data: the icon directory is empty")]
    NoIconData,

    #[error("no PNG entry found in the icon directory")]
    NoPngEntry,

    #[error("failed to open file {path:?}: {source}")]
    OpenFile {
        path: PathBuf,
        source: std::io::Error,
    },
}
