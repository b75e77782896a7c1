use super::{read_file, Pacer};
use bytes::Bytes;
use hlscast_mux::{
    codec::aac::{self, ADTS_HEADER_SIZE},
    pipeline::{AccessUnitSource, RawUnit, SourceError, SourceEvent},
    MediaKind,
};
use std::path::PathBuf;
use tracing::{debug, info, warn};

const SAMPLES_PER_FRAME: i64 = 1024;

/// Reads an ADTS framed AAC file, one access unit per ADTS frame.
pub struct AdtsFileSource {
    path: PathBuf,
    realtime: bool,
    data: Bytes,
    offset: usize,
    samples: i64,
    last_config: Option<[u8; 2]>,
    pending: Option<RawUnit>,
    pacer: Pacer,
}

/// AudioSpecificConfig equivalent of an ADTS header.
fn audio_specific_config(header: &[u8]) -> [u8; 2] {
    let object_type = (header[2] >> 6) + 1;
    let sampling_index = (header[2] >> 2) & 0x0F;
    let channels = ((header[2] & 0x01) << 2) | (header[3] >> 6);
    [
        (object_type << 3) | (sampling_index >> 1),
        ((sampling_index & 0x01) << 7) | (channels << 3),
    ]
}

impl AdtsFileSource {
    pub fn new(path: impl Into<PathBuf>, realtime: bool) -> Self {
        Self {
            path: path.into(),
            realtime,
            data: Bytes::new(),
            offset: 0,
            samples: 0,
            last_config: None,
            pending: None,
            pacer: Pacer::default(),
        }
    }

    /// Skip to the next ADTS sync word. Returns false at end of file.
    fn resync(&mut self) -> bool {
        let skipped_from = self.offset;
        while self.offset + ADTS_HEADER_SIZE <= self.data.len() {
            if aac::is_adts(&self.data[self.offset..]) {
                if self.offset != skipped_from {
                    warn!(
                        "skipped {} bytes of garbage before ADTS frame",
                        self.offset - skipped_from
                    );
                }
                return true;
            }
            self.offset += 1;
        }
        false
    }
}

impl AccessUnitSource for AdtsFileSource {
    fn kind(&self) -> MediaKind {
        MediaKind::Audio
    }

    fn open(&mut self) -> Result<(), SourceError> {
        self.data = read_file(MediaKind::Audio, &self.path)?;
        if !aac::is_adts(&self.data) {
            return Err(SourceError::Open {
                kind: MediaKind::Audio,
                reason: format!("{}: not an ADTS stream", self.path.display()),
            });
        }
        info!(path = %self.path.display(), bytes = self.data.len(), "audio file opened");
        Ok(())
    }

    fn next_event(&mut self) -> Result<Option<SourceEvent>, SourceError> {
        if let Some(unit) = self.pending.take() {
            return Ok(Some(SourceEvent::Unit(unit)));
        }
        if !self.resync() {
            return Ok(None);
        }

        let header = &self.data[self.offset..self.offset + ADTS_HEADER_SIZE];
        let frame_len = aac::adts_frame_length(header).unwrap_or(0);
        let Some(sample_rate) = aac::sampling_frequency((header[2] >> 2) & 0x0F) else {
            return Err(SourceError::Device {
                kind: MediaKind::Audio,
                reason: format!("reserved sampling frequency index at offset {}", self.offset),
            });
        };
        if frame_len < ADTS_HEADER_SIZE || self.offset + frame_len > self.data.len() {
            debug!(offset = self.offset, frame_len, "truncated ADTS frame at end of file");
            return Ok(None);
        }
        let config = audio_specific_config(header);

        let frame = self.data.slice(self.offset..self.offset + frame_len);
        self.offset += frame_len;
        let pts_us = self.samples * 1_000_000 / i64::from(sample_rate);
        self.samples += SAMPLES_PER_FRAME;
        if self.realtime {
            self.pacer.wait_until(pts_us);
        }

        let unit = RawUnit::new(frame, pts_us, false);
        if self.last_config == Some(config) {
            return Ok(Some(SourceEvent::Unit(unit)));
        }
        self.last_config = Some(config);
        self.pending = Some(unit);
        Ok(Some(SourceEvent::Config(Bytes::copy_from_slice(&config))))
    }

    fn close(&mut self) {
        debug!(samples = self.samples, "audio file closed");
        self.data = Bytes::new();
    }
}
