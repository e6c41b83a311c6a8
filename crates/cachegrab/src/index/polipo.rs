//! # Polipo records
//!
//! Polipo stores every cached response as one file: an HTTP status line and
//! header block (with a few `X-Polipo-*` bookkeeping headers), then the
//! body, starting at the offset declared by `X-Polipo-Body-Offset` or right
//! after the blank line when that header is absent.

use std::fs::{File, Metadata};
use std::io::Read;
use std::path::Path;
use std::time::UNIX_EPOCH;

use chrono::DateTime;
use memchr::memmem;
use tracing::trace;

use super::{CacheIndex, CacheObject};
use crate::error::IndexError;

/// Upper bound on the header block we are willing to scan.
const MAX_HEADER_LEN: u64 = 64 * 1024;

const LOCATION: &str = "x-polipo-location";
const BODY_OFFSET: &str = "x-polipo-body-offset";
const POLIPO_DATE: &str = "x-polipo-date";
const LAST_MODIFIED: &str = "last-modified";
const DATE: &str = "date";
const CONTENT_TYPE: &str = "content-type";

/// Reads Polipo disk-cache records.
#[derive(Debug, Clone, Copy, Default)]
pub struct PolipoIndex;

impl PolipoIndex {
    pub fn new() -> Self {
        Self
    }
}

/// Headers of interest collected from one record.
#[derive(Debug, Default)]
struct RecordHeaders<'a> {
    location: Option<&'a str>,
    body_offset: Option<&'a str>,
    content_type: Option<&'a str>,
    last_modified: Option<&'a str>,
    polipo_date: Option<&'a str>,
    date: Option<&'a str>,
}

impl<'a> RecordHeaders<'a> {
    fn parse(block: &'a str) -> Self {
        let mut headers = Self::default();

        // The first line is the status line.
        for line in block.lines().skip(1) {
            let Some(colon_pos) = line.find(':') else {
                trace!("Ignoring header line without colon: '{}'", line);
                continue;
            };

            let name = line[..colon_pos].trim();
            let value = line[colon_pos + 1..].trim();

            let slot = match name.to_ascii_lowercase().as_str() {
                LOCATION => &mut headers.location,
                BODY_OFFSET => &mut headers.body_offset,
                CONTENT_TYPE => &mut headers.content_type,
                LAST_MODIFIED => &mut headers.last_modified,
                POLIPO_DATE => &mut headers.polipo_date,
                DATE => &mut headers.date,
                _ => continue,
            };
            if slot.is_none() {
                *slot = Some(value);
            }
        }

        headers
    }

    /// Best available timestamp for the stored response.
    fn modified_time(&self) -> Option<i64> {
        [self.last_modified, self.polipo_date, self.date]
            .into_iter()
            .flatten()
            .find_map(parse_http_date)
    }
}

fn parse_http_date(value: &str) -> Option<i64> {
    DateTime::parse_from_rfc2822(value)
        .ok()
        .map(|date| date.timestamp())
}

/// Locate the blank line ending the header block.
///
/// Returns the length of the header text and the offset of the first byte
/// after the separator.
fn find_header_end(head: &[u8]) -> Option<(usize, usize)> {
    let crlf = memmem::find(head, b"\r\n\r\n").map(|pos| (pos, pos + 4));
    let lf = memmem::find(head, b"\n\n").map(|pos| (pos, pos + 2));

    match (crlf, lf) {
        (Some(a), Some(b)) => Some(if a.0 <= b.0 { a } else { b }),
        (a, b) => a.or(b),
    }
}

fn file_mtime(metadata: &Metadata) -> Option<i64> {
    let modified = metadata.modified().ok()?;
    let secs = modified.duration_since(UNIX_EPOCH).ok()?.as_secs();
    i64::try_from(secs).ok()
}

impl CacheIndex for PolipoIndex {
    fn read_object(
        &self,
        path: &Path,
        metadata: Option<&Metadata>,
    ) -> Result<Option<CacheObject>, IndexError> {
        let file = File::open(path)?;
        let owned_metadata;
        let metadata = match metadata {
            Some(metadata) => metadata,
            None => {
                owned_metadata = file.metadata()?;
                &owned_metadata
            }
        };

        let mut head = Vec::with_capacity(4096);
        file.take(MAX_HEADER_LEN).read_to_end(&mut head)?;

        if !head.starts_with(b"HTTP/") {
            return Ok(None);
        }

        let (header_len, body_start) = find_header_end(&head).ok_or_else(|| {
            IndexError::Malformed(format!(
                "{}: header block is not terminated",
                path.display()
            ))
        })?;

        let block = String::from_utf8_lossy(&head[..header_len]);
        let headers = RecordHeaders::parse(&block);

        let Some(location) = headers.location else {
            trace!(path = %path.display(), "Record carries no location");
            return Ok(None);
        };

        let body_offset = match headers.body_offset {
            Some(value) => value.parse::<u64>().map_err(|e| {
                IndexError::Malformed(format!("{}: bad body offset '{value}': {e}", path.display()))
            })?,
            None => body_start as u64,
        };

        if body_offset < body_start as u64 {
            return Err(IndexError::Malformed(format!(
                "{}: body offset {body_offset} points inside the header block",
                path.display()
            )));
        }

        let modified_time = headers
            .modified_time()
            .or_else(|| file_mtime(metadata))
            .unwrap_or(0);

        Ok(Some(CacheObject {
            location: location.to_string(),
            storage_path: path.to_path_buf(),
            body_offset,
            size: metadata.len().saturating_sub(body_offset),
            modified_time,
            content_type: headers.content_type.map(str::to_string),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    fn write_record(dir: &TempDir, name: &str, contents: &[u8]) -> std::path::PathBuf {
        let path = dir.path().join(name);
        let mut file = File::create(&path).unwrap();
        file.write_all(contents).unwrap();
        path
    }

    #[test]
    fn reads_record_with_declared_offset() {
        let dir = TempDir::new().unwrap();
        let mut record = b"HTTP/1.1 200 OK\r\n\
Content-Type: image/jpeg\r\n\
Last-Modified: Sun, 06 Nov 1994 08:49:37 GMT\r\n\
X-Polipo-Location: http://img.example.com/pic.jpg\r\n\
X-Polipo-Body-Offset: 256\r\n\r\n"
            .to_vec();
        record.resize(256, b' ');
        record.extend_from_slice(&[7u8; 1000]);
        let path = write_record(&dir, "abc", &record);

        let object = PolipoIndex::new().read_object(&path, None).unwrap().unwrap();
        assert_eq!(object.location, "http://img.example.com/pic.jpg");
        assert_eq!(object.body_offset, 256);
        assert_eq!(object.size, 1000);
        assert_eq!(object.content_type.as_deref(), Some("image/jpeg"));
        assert_eq!(object.modified_time, 784111777);
        assert_eq!(object.storage_path, path);
    }

    #[test]
    fn body_follows_blank_line_without_offset_header() {
        let dir = TempDir::new().unwrap();
        let header = "HTTP/1.0 200 OK\nx-polipo-location: http://h/a.txt\n\n";
        let mut record = header.as_bytes().to_vec();
        record.extend_from_slice(b"hello");
        let path = write_record(&dir, "a", &record);

        let object = PolipoIndex.read_object(&path, None).unwrap().unwrap();
        assert_eq!(object.body_offset, header.len() as u64);
        assert_eq!(object.size, 5);
        assert_eq!(object.content_type, None);
    }

    #[test]
    fn non_records_are_declined() {
        let dir = TempDir::new().unwrap();
        let path = write_record(&dir, "notes.txt", b"just some text\n");
        assert!(PolipoIndex.read_object(&path, None).unwrap().is_none());

        let path = write_record(&dir, "nolocation", b"HTTP/1.1 200 OK\r\nA: b\r\n\r\nbody");
        assert!(PolipoIndex.read_object(&path, None).unwrap().is_none());
    }

    #[test]
    fn malformed_records_are_errors() {
        let dir = TempDir::new().unwrap();
        let path = write_record(&dir, "open", b"HTTP/1.1 200 OK\r\nX-Polipo-Location: http://h/x\r\n");
        assert!(matches!(
            PolipoIndex.read_object(&path, None),
            Err(IndexError::Malformed(_))
        ));

        let path = write_record(
            &dir,
            "inside",
            b"HTTP/1.1 200 OK\r\nX-Polipo-Location: http://h/x\r\nX-Polipo-Body-Offset: 3\r\n\r\n",
        );
        assert!(matches!(
            PolipoIndex.read_object(&path, None),
            Err(IndexError::Malformed(_))
        ));
    }

    #[test]
    fn finds_earliest_separator() {
        assert_eq!(find_header_end(b"a\r\n\r\nb\n\nc"), Some((1, 5)));
        assert_eq!(find_header_end(b"a\n\nb\r\n\r\n"), Some((1, 3)));
        assert_eq!(find_header_end(b"no separator"), None);
    }
}
