//! Report types shared between the library and the command-line front-end

use std::fmt;

/// One payload technique found in a scanned file
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Detection {
    /// Bytes after the terminal IEND chunk
    TrailingData,
    /// A base64 `tEXt` payload under the given keyword
    Text(String),
    /// A base64 `zTXt` payload under the given keyword
    ZText(String),
    /// A steganographic frame in the pixel data
    Stego,
}

impl fmt::Display for Detection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Detection::TrailingData => write!(f, "trailing-data"),
            Detection::Text(keyword) => write!(f, "tEXt:{keyword}"),
            Detection::ZText(keyword) => write!(f, "zTXt:{keyword}"),
            Detection::Stego => write!(f, "stego"),
        }
    }
}
