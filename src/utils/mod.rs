//! Utility functions shared by the PNG and ICO payload pipelines

use std::fs;
use std::path::Path;

use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::{DecodeError, Engine as _};
use crc32fast::Hasher;
use flate2::{Compress, Compression, Decompress, FlushCompress, FlushDecompress, Status};

use crate::{StashError, StashResult};

/// The 8-byte signature that opens every PNG file
pub const PNG_SIGNATURE: [u8; 8] = [0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];

/// Staging buffer size for the zlib streams
const ZLIB_CHUNK: usize = 8192;

/// Calculate CRC32 checksum for given data
pub fn calculate_crc32(data: &[u8]) -> u32 {
    let mut hasher = Hasher::new();
    hasher.update(data);
    hasher.finalize()
}

/// Read a big-endian u16 from byte slice
pub fn read_u16_be(bytes: &[u8], offset: usize) -> u16 {
    u16::from_be_bytes(bytes[offset..offset + 2].try_into().expect("slice too short"))
}

/// Write a big-endian u16 to byte slice
pub fn write_u16_be(bytes: &mut [u8], offset: usize, value: u16) {
    bytes[offset..offset + 2].copy_from_slice(&value.to_be_bytes());
}

/// Read a big-endian u32 from byte slice
pub fn read_u32_be(bytes: &[u8], offset: usize) -> u32 {
    u32::from_be_bytes(bytes[offset..offset + 4].try_into().expect("slice too short"))
}

/// Write a big-endian u32 to byte slice
pub fn write_u32_be(bytes: &mut [u8], offset: usize, value: u32) {
    bytes[offset..offset + 4].copy_from_slice(&value.to_be_bytes());
}

/// Read a little-endian u16 from byte slice
pub fn read_u16_le(bytes: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes(bytes[offset..offset + 2].try_into().expect("slice too short"))
}

/// Write a little-endian u16 to byte slice
pub fn write_u16_le(bytes: &mut [u8], offset: usize, value: u16) {
    bytes[offset..offset + 2].copy_from_slice(&value.to_le_bytes());
}

/// Read a little-endian u32 from byte slice
pub fn read_u32_le(bytes: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes(bytes[offset..offset + 4].try_into().expect("slice too short"))
}

/// Write a little-endian u32 to byte slice
pub fn write_u32_le(bytes: &mut [u8], offset: usize, value: u32) {
    bytes[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}

/// Validate PNG signature
pub fn is_png_signature(data: &[u8]) -> bool {
    data.len() >= 8 && data[0..8] == PNG_SIGNATURE
}

/// Deflate `data` with the given compression level.
///
/// `level` is `-1` for the zlib default, or `0..=9`. The stream is driven
/// through an 8 KiB staging buffer until it signals end-of-stream.
pub fn compress(data: &[u8], level: i32) -> StashResult<Vec<u8>> {
    let compression = if level < 0 {
        Compression::default()
    } else {
        Compression::new(level as u32)
    };

    let mut stream = Compress::new(compression, true);
    let mut result = Vec::new();
    let mut chunk = [0u8; ZLIB_CHUNK];

    loop {
        let consumed = stream.total_in() as usize;
        let written = stream.total_out() as usize;

        let status = stream
            .compress(&data[consumed..], &mut chunk, FlushCompress::Finish)
            .map_err(|err| StashError::Zlib(err.to_string()))?;

        let produced = stream.total_out() as usize - written;
        result.extend_from_slice(&chunk[..produced]);

        match status {
            Status::StreamEnd => break,
            Status::Ok => {}
            Status::BufError => return Err(StashError::Zlib("deflate stream stalled".to_string())),
        }
    }

    Ok(result)
}

/// Inflate a zlib stream back into the full decompressed buffer.
pub fn decompress(data: &[u8]) -> StashResult<Vec<u8>> {
    let mut stream = Decompress::new(true);
    let mut result = Vec::new();
    let mut chunk = [0u8; ZLIB_CHUNK];

    loop {
        let consumed = stream.total_in() as usize;
        let written = stream.total_out() as usize;

        let status = stream
            .decompress(&data[consumed..], &mut chunk, FlushDecompress::None)
            .map_err(|err| StashError::Zlib(err.to_string()))?;

        let produced = stream.total_out() as usize - written;
        result.extend_from_slice(&chunk[..produced]);

        match status {
            Status::StreamEnd => break,
            Status::Ok | Status::BufError => {
                // No forward progress means the input ended mid-stream.
                if produced == 0 && stream.total_in() as usize == consumed {
                    return Err(StashError::Zlib("truncated zlib stream".to_string()));
                }
            }
        }
    }

    Ok(result)
}

/// Base64-encode the given data with the standard alphabet and `=` padding.
pub fn base64_encode(data: &[u8]) -> String {
    BASE64_STANDARD.encode(data)
}

/// Base64-decode the given string into a byte vector.
pub fn base64_decode(data: &str) -> StashResult<Vec<u8>> {
    BASE64_STANDARD.decode(data).map_err(|err| match err {
        DecodeError::InvalidByte(_, byte) => StashError::InvalidBase64Character {
            character: byte as char,
        },
        _ => StashError::InvalidBase64String(data.to_string()),
    })
}

/// Determine if the string is base64 data in one linear pass.
///
/// `=` padding is tolerated only as a trailing run of at most two characters;
/// a `=` anywhere before the end of the alphabet region rejects the string.
pub fn is_base64_string(candidate: &str) -> bool {
    if candidate.is_empty() {
        return false;
    }

    let mut padding = 0usize;

    for &byte in candidate.as_bytes() {
        if byte == b'=' {
            padding += 1;

            if padding > 2 {
                return false;
            }
        } else if padding > 0 {
            return false;
        } else if !(byte.is_ascii_alphanumeric() || byte == b'+' || byte == b'/') {
            return false;
        }
    }

    true
}

/// Read a file into a byte vector
pub fn read_file(path: &Path) -> StashResult<Vec<u8>> {
    fs::read(path).map_err(|source| StashError::OpenFile {
        path: path.to_path_buf(),
        source,
    })
}

/// Write a byte buffer to the given path
pub fn write_file(path: &Path, data: &[u8]) -> StashResult<()> {
    fs::write(path, data).map_err(|source| StashError::OpenFile {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crc32_calculation() {
        let data = b"Hello, World!";
        let crc = calculate_crc32(data);
        assert_eq!(crc, 0xEC4AC3D0);
    }

    #[test]
    fn test_u32_be_operations() {
        let mut buf = vec![0u8; 4];
        write_u32_be(&mut buf, 0, 0xDEADBEEF);
        assert_eq!(read_u32_be(&buf, 0), 0xDEADBEEF);
        assert_eq!(buf, [0xDE, 0xAD, 0xBE, 0xEF]);
    }

    #[test]
    fn test_u16_le_operations() {
        let mut buf = vec![0u8; 2];
        write_u16_le(&mut buf, 0, 0xBEEF);
        assert_eq!(read_u16_le(&buf, 0), 0xBEEF);
        assert_eq!(buf, [0xEF, 0xBE]);
    }

    #[test]
    fn test_png_signature_validation() {
        assert!(is_png_signature(&PNG_SIGNATURE));

        let invalid_sig = [0x00, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];
        assert!(!is_png_signature(&invalid_sig));
        assert!(!is_png_signature(&[0x89, 0x50]));
    }

    #[test]
    fn test_compress_round_trip() {
        let data = b"the same bytes, over and over, the same bytes, over and over".repeat(64);

        for level in [-1, 0, 1, 6, 9] {
            let packed = compress(&data, level).unwrap();
            assert_eq!(decompress(&packed).unwrap(), data);
        }
    }

    #[test]
    fn test_decompress_truncated_stream() {
        let packed = compress(b"some payload data", 9).unwrap();
        let result = decompress(&packed[..packed.len() / 2]);
        assert!(matches!(result, Err(StashError::Zlib(_))));
    }

    #[test]
    fn test_base64_round_trip() {
        assert_eq!(base64_encode(b"foobar"), "Zm9vYmFy");
        assert_eq!(base64_decode("Zm9vYmFy").unwrap(), b"foobar");

        let bytes: Vec<u8> = (0u8..=255).collect();
        assert_eq!(base64_decode(&base64_encode(&bytes)).unwrap(), bytes);
    }

    #[test]
    fn test_base64_decode_rejects_garbage() {
        let result = base64_decode("Zm9v!mFy");
        assert!(matches!(
            result,
            Err(StashError::InvalidBase64Character { character: '!' })
        ));
    }

    #[test]
    fn test_is_base64_string() {
        assert!(is_base64_string("Zm9vYmFy"));
        assert!(is_base64_string("SGVsbG8sIEZhY2FkZSE="));
        assert!(is_base64_string("QQ=="));

        assert!(!is_base64_string(""));
        assert!(!is_base64_string("not base64!"));
        assert!(!is_base64_string("Zm9v=YmFy"));
        assert!(!is_base64_string("QQ==="));
        assert!(!is_base64_string("spaces are bad"));
    }

    #[test]
    fn test_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("payload.bin");

        write_file(&path, b"file contents").unwrap();
        assert_eq!(read_file(&path).unwrap(), b"file contents");

        let missing = dir.path().join("missing.bin");
        assert!(matches!(
            read_file(&missing),
            Err(StashError::OpenFile { .. })
        ));
    }
}
