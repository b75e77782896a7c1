// Upload sinks for segment and playlist bytes
//
// - FileSink: local cache directory
// - MemorySink: in-memory, bounded (tests and inspection)
// - HttpSink: HTTP PUT to an origin
//
// A sink only stores named blobs. It knows nothing about segments or playlists;
// retries live in the pipeline's upload worker.

pub mod file;
pub mod http;
pub mod memory;

use async_trait::async_trait;
use bytes::Bytes;
use std::io::{Error, ErrorKind, Result};

/// Destination for finalized segments and rendered playlists.
///
/// `put` must be idempotent: the same name may be written again with the same or
/// newer content (the playlist is rewritten after every segment).
#[async_trait]
pub trait HlsSink: Send + Sync {
    /// Short label for logs.
    fn label(&self) -> &str;

    async fn put(&self, name: &str, data: Bytes) -> Result<()>;

    /// Delete segments older than `older_than`. Returns how many were removed.
    ///
    /// Sinks that cannot enumerate their contents keep the default no-op.
    async fn cleanup(&self, _older_than: std::time::Duration) -> Result<usize> {
        Ok(0)
    }
}

/// Reject names that could escape a flat namespace.
pub fn validate_name(name: &str) -> Result<()> {
    if name.is_empty()
        || name.contains('/')
        || name.contains('\\')
        || name.contains("..")
        || name.starts_with('.')
    {
        return Err(Error::new(
            ErrorKind::InvalidInput,
            format!("invalid resource name: {name:?}"),
        ));
    }
    Ok(())
}

/// MIME type for a resource name.
#[must_use]
pub fn content_type(name: &str) -> &'static str {
    if name.ends_with(".m3u8") {
        "application/vnd.apple.mpegurl"
    } else {
        "application/octet-stream"
    }
}

pub use file::FileSink;
pub use http::HttpSink;
pub use memory::MemorySink;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_name() {
        assert!(validate_name("seg_00001.ts").is_ok());
        assert!(validate_name("live.m3u8").is_ok());
        for bad in ["", "../etc/passwd", "a/b.ts", "a\\b.ts", ".hidden", "x..ts"] {
            let err = validate_name(bad).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidInput, "{bad}");
        }
    }

    #[test]
    fn test_content_type() {
        assert_eq!(content_type("live.m3u8"), "application/vnd.apple.mpegurl");
        assert_eq!(content_type("seg_00000.ts"), "application/octet-stream");
    }
}
