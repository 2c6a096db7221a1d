//! Typed views over `tEXt` and `zTXt` chunks

use crate::png::chunk::{Chunk, ChunkTag};
use crate::utils;
use crate::{StashError, StashResult};

/// Longest keyword the PNG specification allows
pub const KEYWORD_MAX: usize = 79;

/// A `tEXt` chunk: `keyword`, a null separator, then uncompressed text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Text {
    chunk: Chunk,
}

impl Text {
    pub fn new(keyword: &str, text: &str) -> StashResult<Self> {
        let mut result = Self {
            chunk: Chunk::new(ChunkTag::TEXT, Vec::new()),
        };

        result.set_keyword(keyword, true)?;
        result.set_text(text);

        Ok(result)
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

    fn null_terminator(&self) -> Option<usize> {
        self.chunk.data().iter().position(|&byte| byte == 0)
    }

    fn text_offset(&self) -> usize {
        match self.null_terminator() {
            Some(zero) => zero + 1,
            None => 0,
        }
    }

    pub fn has_keyword(&self) -> bool {
        self.null_terminator().is_some()
    }

    pub fn keyword(&self) -> StashResult<String> {
        let zero = self.null_terminator().ok_or(StashError::NoKeyword)?;

        Ok(String::from_utf8_lossy(&self.chunk.data()[..zero]).into_owned())
    }

    /// Replace the keyword, keeping the text region untouched.
    ///
    /// `validate` enforces the 79-byte limit; pass `false` to round-trip
    /// nonconforming chunks.
    pub fn set_keyword(&mut self, keyword: &str, validate: bool) -> StashResult<()> {
        if validate && keyword.len() > KEYWORD_MAX {
            return Err(StashError::KeywordTooLong);
        }

        let rest = match self.null_terminator() {
            Some(zero) => self.chunk.data()[zero + 1..].to_vec(),
            None => self.chunk.data().to_vec(),
        };

        let mut data = Vec::with_capacity(keyword.len() + 1 + rest.len());
        data.extend_from_slice(keyword.as_bytes());
        data.push(0);
        data.extend_from_slice(&rest);
        self.chunk.set_data(data);

        Ok(())
    }

    pub fn has_text(&self) -> bool {
        let length = self.chunk.length();

        match self.null_terminator() {
            Some(zero) => length > zero + 1,
            None => length > 0,
        }
    }

    /// The text region, empty when absent.
    pub fn text(&self) -> String {
        let offset = self.text_offset().min(self.chunk.length());

        String::from_utf8_lossy(&self.chunk.data()[offset..]).into_owned()
    }

    pub fn set_text(&mut self, text: &str) {
        let offset = self.text_offset().min(self.chunk.length());
        let data = self.chunk.data_mut();
        data.truncate(offset);
        data.extend_from_slice(text.as_bytes());
    }
}

/// A `zTXt` chunk: `keyword`, a null separator, a compression-method byte,
/// then a deflated text stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ZText {
    chunk: Chunk,
}

impl ZText {
    pub fn new(keyword: &str, text: &str) -> StashResult<Self> {
        let mut result = Self {
            chunk: Chunk::new(ChunkTag::ZTXT, Vec::new()),
        };

        result.set_keyword(keyword, true)?;
        result.set_compression_method(0)?;
        result.set_text(text)?;

        Ok(result)
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

    /// A zero byte at position 0 means "no keyword"; it cannot be told apart
    /// from an empty keyword followed by a compression method byte, and the
    /// convention keeps malformed chunks round-tripping byte-identically.
    fn null_terminator(&self) -> Option<usize> {
        match self.chunk.data().iter().position(|&byte| byte == 0) {
            Some(0) | None => None,
            Some(zero) => Some(zero),
        }
    }

    fn text_offset(&self) -> usize {
        match self.null_terminator() {
            Some(zero) => zero + 2,
            None => 1,
        }
    }

    pub fn has_keyword(&self) -> bool {
        self.null_terminator().is_some()
    }

    pub fn keyword(&self) -> StashResult<String> {
        let zero = self.null_terminator().ok_or(StashError::NoKeyword)?;

        Ok(String::from_utf8_lossy(&self.chunk.data()[..zero]).into_owned())
    }

    pub fn set_keyword(&mut self, keyword: &str, validate: bool) -> StashResult<()> {
        if validate && keyword.len() > KEYWORD_MAX {
            return Err(StashError::KeywordTooLong);
        }

        let rest = match self.null_terminator() {
            Some(zero) => self.chunk.data()[zero + 1..].to_vec(),
            None => self.chunk.data().to_vec(),
        };

        let mut data = Vec::with_capacity(keyword.len() + 1 + rest.len());
        data.extend_from_slice(keyword.as_bytes());
        data.push(0);
        data.extend_from_slice(&rest);
        self.chunk.set_data(data);

        Ok(())
    }

    pub fn compression_method(&self) -> StashResult<u8> {
        let zero = self.null_terminator().ok_or(StashError::NoKeyword)?;

        if zero + 1 == self.chunk.length() {
            return Err(StashError::OutOfBounds {
                index: zero + 1,
                limit: self.chunk.length(),
            });
        }

        Ok(self.chunk.data()[zero + 1])
    }

    pub fn set_compression_method(&mut self, method: u8) -> StashResult<()> {
        let zero = self.null_terminator().ok_or(StashError::NoKeyword)?;
        let data = self.chunk.data_mut();

        if zero + 1 == data.len() {
            data.push(method);
        } else {
            data[zero + 1] = method;
        }

        Ok(())
    }

    pub fn has_text(&self) -> bool {
        let length = self.chunk.length();

        match self.null_terminator() {
            Some(zero) => length > zero + 2,
            None => length > 0,
        }
    }

    /// Inflate and return the text region.
    pub fn text(&self) -> StashResult<String> {
        let offset = self.text_offset().min(self.chunk.length());
        let decompressed = utils::decompress(&self.chunk.data()[offset..])?;

        Ok(String::from_utf8_lossy(&decompressed).into_owned())
    }

    /// Deflate `text` (level 9) into the text region.
    pub fn set_text(&mut self, text: &str) -> StashResult<()> {
        let offset = self.text_offset().min(self.chunk.length());
        let keyword_region = match self.null_terminator() {
            Some(zero) => zero + 1,
            None => 0,
        };

        let compressed = utils::compress(text.as_bytes(), 9)?;
        let data = self.chunk.data_mut();
        data.truncate(offset.min(data.len()));

        // A keyword without a method byte yet gets method 0.
        if data.len() == keyword_region {
            data.push(0);
        }

        data.extend_from_slice(&compressed);

        Ok(())
    }
}
