//! Package archive codec
//!
//! Package payloads are shipped as a flat concatenation of files:
//!
//! ```text
//! [HEADER]
//! WKPKG\x00\x00\x01        # Magic + version (8 bytes)
//! num_files: u32           # Number of files (4 bytes, little-endian)
//!
//! [FILE ENTRIES]
//! For each file:
//!   path_len: u16          # Path length (2 bytes)
//!   path: bytes            # Relative path (path_len bytes, UTF-8)
//!   content_len: u32       # Content length (4 bytes)
//!   content: bytes         # File content (content_len bytes)
//! ```
//!
//! Paths are relative to the package's install root and may not escape it.

use std::io;

/// Archive magic number
const ARCHIVE_MAGIC: &[u8; 8] = b"WKPKG\x00\x00\x01";

/// One file inside an archive
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    pub path: String,
    pub content: Vec<u8>,
}

impl ArchiveEntry {
    pub fn new(path: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        Self {
            path: path.into(),
            content: content.into(),
        }
    }
}

/// Encode entries into archive bytes
pub fn encode(entries: &[ArchiveEntry]) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(ARCHIVE_MAGIC);
    out.extend_from_slice(&(entries.len() as u32).to_le_bytes());

    for entry in entries {
        out.extend_from_slice(&(entry.path.len() as u16).to_le_bytes());
        out.extend_from_slice(entry.path.as_bytes());
        out.extend_from_slice(&(entry.content.len() as u32).to_le_bytes());
        out.extend_from_slice(&entry.content);
    }

    out
}

/// Decode archive bytes
pub fn decode(data: &[u8]) -> io::Result<Vec<ArchiveEntry>> {
    if data.len() < 12 {
        return Err(invalid("archive too small"));
    }
    if &data[0..8] != ARCHIVE_MAGIC {
        return Err(invalid("bad archive magic"));
    }

    let num_files = u32::from_le_bytes([data[8], data[9], data[10], data[11]]) as usize;
    let mut entries = Vec::with_capacity(num_files.min(1024));
    let mut offset = 12;

    for _ in 0..num_files {
        let path_len = read_u16(data, &mut offset).ok_or_else(|| invalid("truncated file entry"))?;
        let path_bytes =
            take(data, &mut offset, path_len as usize).ok_or_else(|| invalid("truncated path"))?;
        let path = String::from_utf8(path_bytes.to_vec())
            .map_err(|_| invalid("invalid path UTF-8"))?;
        check_relative(&path)?;

        let content_len =
            read_u32(data, &mut offset).ok_or_else(|| invalid("truncated content length"))?;
        let content = take(data, &mut offset, content_len as usize)
            .ok_or_else(|| invalid("truncated content"))?
            .to_vec();

        entries.push(ArchiveEntry { path, content });
    }

    if offset != data.len() {
        return Err(invalid("trailing bytes after last entry"));
    }

    Ok(entries)
}

fn check_relative(path: &str) -> io::Result<()> {
    if path.is_empty() || path.starts_with('/') || path.split('/').any(|seg| seg == "..") {
        return Err(invalid(&format!("entry path escapes install root: {}", path)));
    }
    Ok(())
}

fn take<'a>(data: &'a [u8], offset: &mut usize, len: usize) -> Option<&'a [u8]> {
    let end = offset.checked_add(len)?;
    let slice = data.get(*offset..end)?;
    *offset = end;
    Some(slice)
}

fn read_u16(data: &[u8], offset: &mut usize) -> Option<u16> {
    let b = take(data, offset, 2)?;
    Some(u16::from_le_bytes([b[0], b[1]]))
}

fn read_u32(data: &[u8], offset: &mut usize) -> Option<u32> {
    let b = take(data, offset, 4)?;
    Some(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
}

fn invalid(msg: &str) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, format!("invalid archive: {}", msg))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_encoded() {
        let entries = vec![
            ArchiveEntry::new("lib/libz.so", b"\x00asm".to_vec()),
            ArchiveEntry::new("include/zlib.h", b"#define Z".to_vec()),
        ];
        assert_eq!(decode(&encode(&entries)).unwrap(), entries);
    }

    #[test]
    fn test_rejects_bad_magic() {
        let err = decode(b"NOTANARCHIVE").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn test_rejects_truncation() {
        let data = encode(&[ArchiveEntry::new("a.txt", b"hello".to_vec())]);
        assert!(decode(&data[..data.len() - 2]).is_err());
    }

    #[test]
    fn test_rejects_escaping_paths() {
        for path in ["/etc/passwd", "../up", "a/../../b"] {
            let data = encode(&[ArchiveEntry::new(path, Vec::new())]);
            assert!(decode(&data).is_err(), "{}", path);
        }
    }
}
