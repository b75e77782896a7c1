use super::{read_file, Pacer};
use bytes::{Bytes, BytesMut};
use hlscast_mux::{
    codec::{nalu, VideoCodec},
    pipeline::{AccessUnitSource, RawUnit, SourceError, SourceEvent},
    MediaKind,
};
use std::path::PathBuf;
use tracing::{debug, info};

/// Reads an H.264/H.265 Annex-B elementary stream file.
///
/// A new access unit starts at an AUD, at a parameter set following picture data, or at
/// a slice flagged as the first slice of its picture. Parameter sets are reported as
/// configuration events whenever they change and stripped from the units themselves.
pub struct AnnexBFileSource {
    path: PathBuf,
    codec: VideoCodec,
    frame_rate: u32,
    realtime: bool,
    nalus: Vec<Bytes>,
    position: usize,
    frames: i64,
    last_parameter_sets: Vec<Bytes>,
    pending: Option<RawUnit>,
    pacer: Pacer,
}

impl AnnexBFileSource {
    pub fn new(path: impl Into<PathBuf>, codec: VideoCodec, frame_rate: u32, realtime: bool) -> Self {
        Self {
            path: path.into(),
            codec,
            frame_rate: frame_rate.max(1),
            realtime,
            nalus: Vec::new(),
            position: 0,
            frames: 0,
            last_parameter_sets: Vec::new(),
            pending: None,
            pacer: Pacer::default(),
        }
    }

    fn starts_new_unit(&self, nal: &[u8]) -> bool {
        let codec = self.codec;
        codec.is_access_unit_delimiter(nal)
            || codec.parameter_set_rank(nal).is_some()
            || (codec.is_vcl(nal) && codec.is_first_slice(nal))
    }

    fn next_unit(&mut self) -> Option<(RawUnit, Vec<Bytes>)> {
        let mut parameter_sets = Vec::new();
        let mut payload = BytesMut::new();
        let mut has_vcl = false;
        let mut is_keyframe = false;

        while let Some(nal) = self.nalus.get(self.position) {
            if has_vcl && self.starts_new_unit(nal) {
                break;
            }
            self.position += 1;

            if self.codec.is_access_unit_delimiter(nal) {
                continue;
            }
            if self.codec.parameter_set_rank(nal).is_some() {
                parameter_sets.push(nal.clone());
                continue;
            }
            if self.codec.is_vcl(nal) {
                has_vcl = true;
                is_keyframe |= self.codec.is_keyframe(nal);
            }
            nalu::write_annexb(&mut payload, nal);
        }

        if !has_vcl {
            if !payload.is_empty() {
                debug!("dropping {} trailing bytes without picture data", payload.len());
            }
            return None;
        }

        let pts_us = self.frames * 1_000_000 / i64::from(self.frame_rate);
        self.frames += 1;
        Some((RawUnit::new(payload.freeze(), pts_us, is_keyframe), parameter_sets))
    }
}

impl AccessUnitSource for AnnexBFileSource {
    fn kind(&self) -> MediaKind {
        MediaKind::Video
    }

    fn open(&mut self) -> Result<(), SourceError> {
        let data = read_file(MediaKind::Video, &self.path)?;
        self.nalus = nalu::split_annexb(&data)
            .into_iter()
            .map(|nal| data.slice_ref(nal))
            .collect();
        if self.nalus.is_empty() {
            return Err(SourceError::Open {
                kind: MediaKind::Video,
                reason: format!("{}: no Annex-B NAL units found", self.path.display()),
            });
        }
        info!(
            path = %self.path.display(),
            codec = ?self.codec,
            nalus = self.nalus.len(),
            frame_rate = self.frame_rate,
            "video file opened"
        );
        Ok(())
    }

    fn next_event(&mut self) -> Result<Option<SourceEvent>, SourceError> {
        if let Some(unit) = self.pending.take() {
            return Ok(Some(SourceEvent::Unit(unit)));
        }
        let Some((unit, parameter_sets)) = self.next_unit() else {
            return Ok(None);
        };
        if self.realtime {
            self.pacer.wait_until(unit.pts_us);
        }

        if parameter_sets.is_empty() || parameter_sets == self.last_parameter_sets {
            return Ok(Some(SourceEvent::Unit(unit)));
        }
        let mut config = BytesMut::new();
        for set in &parameter_sets {
            nalu::write_annexb(&mut config, set);
        }
        self.last_parameter_sets = parameter_sets;
        self.pending = Some(unit);
        Ok(Some(SourceEvent::Config(config.freeze())))
    }

    fn close(&mut self) {
        debug!(frames = self.frames, "video file closed");
        self.nalus.clear();
    }
}
