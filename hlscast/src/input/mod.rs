// File-backed access-unit sources
//
// Stand-ins for the capture/encode devices: elementary stream files are split into
// access units and timestamped as if an encoder had produced them live.

pub mod adts;
pub mod annexb;

pub use adts::AdtsFileSource;
pub use annexb::AnnexBFileSource;

use bytes::Bytes;
use hlscast_mux::{pipeline::SourceError, MediaKind};
use std::{
    path::Path,
    time::{Duration, Instant},
};

fn read_file(kind: MediaKind, path: &Path) -> Result<Bytes, SourceError> {
    std::fs::read(path)
        .map(Bytes::from)
        .map_err(|e| SourceError::Open {
            kind,
            reason: format!("{}: {e}", path.display()),
        })
}

/// Holds units back until their timestamp is due on the wall clock.
#[derive(Debug, Default)]
struct Pacer {
    started: Option<Instant>,
}

impl Pacer {
    /// Sleep until `pts_us` after the first paced unit. Runs on the producer thread.
    fn wait_until(&mut self, pts_us: i64) {
        let started = *self.started.get_or_insert_with(Instant::now);
        let due = started + Duration::from_micros(pts_us.max(0) as u64);
        let now = Instant::now();
        if due > now {
            std::thread::sleep(due - now);
        }
    }
}
