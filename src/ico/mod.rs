//! Windows ICO container support
//!
//! Just enough of the ICONDIR format to locate a PNG-bearing entry, swap its
//! bytes out, and re-serialize the file with recomputed entry offsets. Every
//! bitmap blob is kept opaque.

use std::path::Path;

use crate::utils::{self, read_u16_le, read_u32_le, write_u16_le, write_u32_le};
use crate::{StashError, StashResult};

/// Size of the fixed ICONDIR prefix (reserved, type, count)
const DIR_HEADER_SIZE: usize = 6;

/// Size of one serialized directory entry
const DIR_ENTRY_SIZE: usize = 16;

/// One record of the icon directory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct IconDirEntry {
    pub width: u8,
    pub height: u8,
    pub color_count: u8,
    pub reserved: u8,
    pub planes: u16,
    pub bit_count: u16,
    pub bytes: u32,
    pub offset: u32,
}

/// A directory record together with its bitmap bytes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IconEntry {
    pub header: IconDirEntry,
    pub data: Vec<u8>,
}

impl IconEntry {
    pub fn data(&self) -> &[u8] {
        &self.data
    }
}

/// How an entry's bitmap bytes are encoded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryType {
    Bmp,
    Png,
}

/// A Windows icon file: a directory of bitmap entries
#[derive(Debug, Clone, Default)]
pub struct Icon {
    entries: Vec<IconEntry>,
}

impl Icon {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse an ICONDIR and pull each entry's bytes out of the buffer.
    pub fn from_bytes(data: &[u8]) -> StashResult<Self> {
        if data.len() < DIR_HEADER_SIZE {
            return Err(StashError::InsufficientSize {
                given: data.len(),
                needed: DIR_HEADER_SIZE,
            });
        }

        let reserved = read_u16_le(data, 0);
        let resource_type = read_u16_le(data, 2);
        let count = read_u16_le(data, 4) as usize;

        if reserved != 0 || resource_type != 1 {
            return Err(StashError::InvalidIconHeader);
        }

        let dir_size = DIR_HEADER_SIZE + DIR_ENTRY_SIZE * count;

        if dir_size > data.len() {
            return Err(StashError::OutOfBounds {
                index: dir_size,
                limit: data.len(),
            });
        }

        let mut entries = Vec::with_capacity(count);

        for i in 0..count {
            let base = DIR_HEADER_SIZE + DIR_ENTRY_SIZE * i;

            let header = IconDirEntry {
                width: data[base],
                height: data[base + 1],
                color_count: data[base + 2],
                reserved: data[base + 3],
                planes: read_u16_le(data, base + 4),
                bit_count: read_u16_le(data, base + 6),
                bytes: read_u32_le(data, base + 8),
                offset: read_u32_le(data, base + 12),
            };

            let start = header.offset as usize;
            let end = start + header.bytes as usize;

            if end > data.len() {
                return Err(StashError::OutOfBounds {
                    index: end,
                    limit: data.len(),
                });
            }

            entries.push(IconEntry {
                header,
                data: data[start..end].to_vec(),
            });
        }

        Ok(Self { entries })
    }

    pub fn from_file(path: &Path) -> StashResult<Self> {
        Self::from_bytes(&utils::read_file(path)?)
    }

    /// Number of bitmap entries in the directory.
    pub fn size(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get_entry(&self, index: usize) -> StashResult<&IconEntry> {
        self.entries.get(index).ok_or(StashError::OutOfBounds {
            index,
            limit: self.entries.len(),
        })
    }

    pub fn set_entry(&mut self, index: usize, entry: IconEntry) -> StashResult<()> {
        let limit = self.entries.len();

        match self.entries.get_mut(index) {
            Some(slot) => {
                *slot = entry;
                Ok(())
            }
            None => Err(StashError::OutOfBounds { index, limit }),
        }
    }

    /// Swap out an entry's bitmap bytes; the header's size and offset fields
    /// are recomputed at serialization time.
    pub fn set_entry_data(&mut self, index: usize, data: Vec<u8>) -> StashResult<()> {
        let limit = self.entries.len();

        match self.entries.get_mut(index) {
            Some(slot) => {
                slot.data = data;
                Ok(())
            }
            None => Err(StashError::OutOfBounds { index, limit }),
        }
    }

    pub fn append_entry(&mut self, entry: IconEntry) {
        self.entries.push(entry);
    }

    pub fn remove_entry(&mut self, index: usize) -> StashResult<IconEntry> {
        if index >= self.entries.len() {
            return Err(StashError::OutOfBounds {
                index,
                limit: self.entries.len(),
            });
        }

        Ok(self.entries.remove(index))
    }

    /// Classify an entry: PNG iff its bytes open with the PNG signature.
    pub fn entry_type(&self, index: usize) -> StashResult<EntryType> {
        let entry = self.get_entry(index)?;

        if utils::is_png_signature(&entry.data) {
            Ok(EntryType::Png)
        } else {
            Ok(EntryType::Bmp)
        }
    }

    /// Serialize the directory and entry blobs, recomputing every entry's
    /// size and offset from its current bytes.
    pub fn to_file(&self) -> StashResult<Vec<u8>> {
        if self.entries.is_empty() {
            return Err(StashError::NoIconData);
        }

        let dir_size = DIR_HEADER_SIZE + DIR_ENTRY_SIZE * self.entries.len();
        let blob_size: usize = self.entries.iter().map(|entry| entry.data.len()).sum();

        let mut buffer = vec![0u8; dir_size];
        buffer.reserve(blob_size);
        write_u16_le(&mut buffer, 0, 0);
        write_u16_le(&mut buffer, 2, 1);
        write_u16_le(&mut buffer, 4, self.entries.len() as u16);

        let mut offset = dir_size;

        for (i, entry) in self.entries.iter().enumerate() {
            let base = DIR_HEADER_SIZE + DIR_ENTRY_SIZE * i;

            buffer[base] = entry.header.width;
            buffer[base + 1] = entry.header.height;
            buffer[base + 2] = entry.header.color_count;
            buffer[base + 3] = entry.header.reserved;
            write_u16_le(&mut buffer, base + 4, entry.header.planes);
            write_u16_le(&mut buffer, base + 6, entry.header.bit_count);
            write_u32_le(&mut buffer, base + 8, entry.data.len() as u32);
            write_u32_le(&mut buffer, base + 12, offset as u32);

            offset += entry.data.len();
        }

        for entry in &self.entries {
            buffer.extend_from_slice(&entry.data);
        }

        Ok(buffer)
    }

    pub fn save(&self, path: &Path) -> StashResult<()> {
        utils::write_file(path, &self.to_file()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::PNG_SIGNATURE;

    fn build_icon(blobs: &[&[u8]]) -> Vec<u8> {
        let dir_size = DIR_HEADER_SIZE + DIR_ENTRY_SIZE * blobs.len();
        let mut bytes = vec![0u8; dir_size];
        write_u16_le(&mut bytes, 0, 0);
        write_u16_le(&mut bytes, 2, 1);
        write_u16_le(&mut bytes, 4, blobs.len() as u16);

        let mut offset = dir_size;

        for (i, blob) in blobs.iter().enumerate() {
            let base = DIR_HEADER_SIZE + DIR_ENTRY_SIZE * i;
            bytes[base] = 16;
            bytes[base + 1] = 16;
            write_u16_le(&mut bytes, base + 4, 1);
            write_u16_le(&mut bytes, base + 6, 32);
            write_u32_le(&mut bytes, base + 8, blob.len() as u32);
            write_u32_le(&mut bytes, base + 12, offset as u32);
            offset += blob.len();
        }

        for blob in blobs {
            bytes.extend_from_slice(blob);
        }

        bytes
    }

    #[test]
    fn test_parse_and_round_trip() {
        let mut png_blob = PNG_SIGNATURE.to_vec();
        png_blob.extend_from_slice(b"rest of the image");

        let file = build_icon(&[b"not a png", &png_blob]);
        let icon = Icon::from_bytes(&file).unwrap();

        assert_eq!(icon.size(), 2);
        assert_eq!(icon.entry_type(0).unwrap(), EntryType::Bmp);
        assert_eq!(icon.entry_type(1).unwrap(), EntryType::Png);
        assert_eq!(icon.get_entry(1).unwrap().data(), &png_blob[..]);

        assert_eq!(icon.to_file().unwrap(), file);
    }

    #[test]
    fn test_offsets_recomputed_after_resize() {
        let file = build_icon(&[b"first blob", b"second"]);
        let mut icon = Icon::from_bytes(&file).unwrap();

        icon.set_entry_data(0, b"a much longer first blob than before".to_vec())
            .unwrap();

        let rebuilt = icon.to_file().unwrap();
        let reparsed = Icon::from_bytes(&rebuilt).unwrap();

        assert_eq!(
            reparsed.get_entry(0).unwrap().data(),
            b"a much longer first blob than before"
        );
        assert_eq!(reparsed.get_entry(1).unwrap().data(), b"second");
    }

    #[test]
    fn test_header_validation() {
        assert!(matches!(
            Icon::from_bytes(&[0, 0, 1]),
            Err(StashError::InsufficientSize { .. })
        ));

        let mut file = build_icon(&[b"blob"]);
        file[2] = 2;
        assert!(matches!(
            Icon::from_bytes(&file),
            Err(StashError::InvalidIconHeader)
        ));
    }

    #[test]
    fn test_truncated_directory_and_blob() {
        let file = build_icon(&[b"blob"]);

        // Directory claims one entry but the record is cut off
        assert!(matches!(
            Icon::from_bytes(&file[..10]),
            Err(StashError::OutOfBounds { .. })
        ));

        // Entry data extends past the buffer
        assert!(matches!(
            Icon::from_bytes(&file[..file.len() - 1]),
            Err(StashError::OutOfBounds { .. })
        ));
    }

    #[test]
    fn test_empty_icon_rejected_on_save() {
        assert!(matches!(Icon::new().to_file(), Err(StashError::NoIconData)));
    }

    #[test]
    fn test_entry_editing() {
        let file = build_icon(&[b"one", b"two"]);
        let mut icon = Icon::from_bytes(&file).unwrap();

        let removed = icon.remove_entry(0).unwrap();
        assert_eq!(removed.data(), b"one");
        assert_eq!(icon.size(), 1);

        icon.append_entry(removed);
        assert_eq!(icon.size(), 2);
        assert_eq!(icon.get_entry(1).unwrap().data(), b"one");

        assert!(matches!(
            icon.get_entry(2),
            Err(StashError::OutOfBounds { index: 2, limit: 2 })
        ));
    }
}
