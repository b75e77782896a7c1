// Keyframe-aligned segmentation
//
// State machine:
// - Idle: no open segment. Video is dropped until a keyframe arrives; audio waits
//   in a bounded pending queue.
// - Open: every unit is rebased against the run anchor, made monotonic per stream
//   and packetized. A keyframe past the target duration closes the segment and
//   reopens with itself as the first unit.
//
// Each segment starts with PAT, PMT, then the opening keyframe.

pub mod segment;
pub mod timeline;

pub use segment::{segment_name, CloseReason, Segment};
pub use timeline::{StreamClock, Timeline};

use {
    crate::{
        codec::VideoCodec,
        mpegts::{
            define::{epes_stream_id, epid, epsi_stream_type},
            MpegTsError, TsMuxer,
        },
        unit::AccessUnit,
    },
    serde::{Deserialize, Serialize},
    std::collections::VecDeque,
    tracing::{debug, info, trace, warn},
};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmenterConfig {
    /// Segment length to aim for, in seconds.
    pub target_duration_secs: f64,
    /// Hard ceiling as a multiple of the target.
    pub max_duration_factor: f64,
    /// Audio older than the run anchor by more than this is discarded.
    pub audio_preroll_ms: u64,
    /// Audio units held while waiting for the first keyframe.
    pub max_pending_audio: usize,
}

impl Default for SegmenterConfig {
    fn default() -> Self {
        Self {
            target_duration_secs: 3.0,
            max_duration_factor: 4.0,
            audio_preroll_ms: 500,
            max_pending_audio: 512,
        }
    }
}

impl SegmenterConfig {
    fn target_us(&self) -> i64 {
        (self.target_duration_secs * 1_000_000.0) as i64
    }

    fn ceiling_us(&self) -> i64 {
        (self.target_duration_secs * self.max_duration_factor * 1_000_000.0) as i64
    }

    fn preroll_us(&self) -> i64 {
        self.audio_preroll_ms as i64 * 1_000
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SegmenterStats {
    pub segments: u64,
    /// Video dropped while waiting for a keyframe.
    pub dropped_video: u64,
    /// Audio dropped by the pending limit or the preroll window.
    pub dropped_audio: u64,
    pub timestamp_corrections: u64,
}

#[derive(Debug, Clone, Copy)]
struct OpenSegment {
    start_us: i64,
    max_seen_us: i64,
}

pub struct Segmenter {
    config: SegmenterConfig,
    timeline: Timeline,
    muxer: TsMuxer,
    video_clock: StreamClock,
    audio_clock: StreamClock,
    open: Option<OpenSegment>,
    pending_audio: VecDeque<AccessUnit>,
    next_sequence: u64,
    stats: SegmenterStats,
}

impl Segmenter {
    pub fn new(
        config: SegmenterConfig,
        codec: VideoCodec,
        with_audio: bool,
    ) -> Result<Self, MpegTsError> {
        let mut muxer = TsMuxer::new();
        muxer.add_stream(epid::VIDEO, codec.stream_type(), epes_stream_id::PES_SID_VIDEO)?;
        if with_audio {
            muxer.add_stream(
                epid::AUDIO,
                epsi_stream_type::PSI_STREAM_AAC,
                epes_stream_id::PES_SID_AUDIO,
            )?;
        }

        Ok(Self {
            config,
            timeline: Timeline::new(),
            muxer,
            video_clock: StreamClock::new(),
            audio_clock: StreamClock::new(),
            open: None,
            pending_audio: VecDeque::new(),
            next_sequence: 0,
            stats: SegmenterStats::default(),
        })
    }

    #[must_use]
    pub const fn is_open(&self) -> bool {
        self.open.is_some()
    }

    #[must_use]
    pub const fn timeline(&self) -> &Timeline {
        &self.timeline
    }

    #[must_use]
    pub fn pending_audio(&self) -> usize {
        self.pending_audio.len()
    }

    #[must_use]
    pub fn stats(&self) -> SegmenterStats {
        SegmenterStats {
            timestamp_corrections: self.video_clock.corrections()
                + self.audio_clock.corrections(),
            ..self.stats
        }
    }

    /// Rebased span of the open segment.
    #[must_use]
    pub fn open_duration_us(&self) -> Option<i64> {
        self.open.map(|open| open.max_seen_us - open.start_us)
    }

    /// Feed one video unit. Returns the segment it closed, if any.
    pub fn push_video(&mut self, unit: AccessUnit) -> Result<Option<Segment>, MpegTsError> {
        let Some(open) = self.open else {
            if !unit.is_keyframe {
                trace!(pts_us = unit.pts_us, "dropping video before first keyframe");
                self.stats.dropped_video += 1;
                return Ok(None);
            }
            self.timeline.anchor(unit.pts_us);
            let (pts, dts) = self.video_timestamps(&unit);
            self.open_segment(pts)?;
            self.write_video(&unit, pts, dts)?;
            self.flush_pending_audio()?;
            return Ok(None);
        };

        let (pts, dts) = self.video_timestamps(&unit);

        if unit.is_keyframe && open.max_seen_us.max(pts) - open.start_us >= self.config.target_us() {
            let segment = self.finalize(pts, CloseReason::Keyframe);
            self.open_segment(pts)?;
            self.write_video(&unit, pts, dts)?;
            return Ok(Some(segment));
        }

        self.write_video(&unit, pts, dts)?;
        Ok(None)
    }

    /// Feed one audio unit. Audio never opens or closes a segment.
    pub fn push_audio(&mut self, unit: AccessUnit) -> Result<(), MpegTsError> {
        if self.open.is_none() {
            self.pending_audio.push_back(unit);
            if self.pending_audio.len() > self.config.max_pending_audio {
                self.pending_audio.pop_front();
                self.stats.dropped_audio += 1;
                trace!("pending audio full, dropped oldest unit");
            }
            return Ok(());
        }
        self.write_audio(&unit)
    }

    /// Close the open segment if it has run past the hard ceiling.
    pub fn enforce_duration_ceiling(&mut self) -> Result<Option<Segment>, MpegTsError> {
        let Some(open) = self.open else {
            return Ok(None);
        };
        let span = open.max_seen_us - open.start_us;
        if span <= self.config.ceiling_us() {
            return Ok(None);
        }
        warn!(
            span_us = span,
            "no keyframe before duration ceiling, closing segment"
        );
        let segment = self.finalize(open.max_seen_us, CloseReason::DurationCeiling);
        Ok(Some(segment))
    }

    /// Close whatever is open. Used on stop.
    pub fn finish(&mut self) -> Result<Option<Segment>, MpegTsError> {
        let dropped = self.pending_audio.len() as u64;
        if dropped > 0 {
            debug!(dropped, "discarding pending audio at finish");
            self.stats.dropped_audio += dropped;
            self.pending_audio.clear();
        }
        let Some(open) = self.open else {
            return Ok(None);
        };
        Ok(Some(self.finalize(open.max_seen_us, CloseReason::Finish)))
    }

    fn video_timestamps(&mut self, unit: &AccessUnit) -> (i64, i64) {
        let pts = self.timeline.rebase(unit.pts_us);
        let dts = self.timeline.rebase(unit.dts_us);
        self.video_clock.adjust(pts, dts)
    }

    fn open_segment(&mut self, start_us: i64) -> Result<(), MpegTsError> {
        debug!(
            sequence = self.next_sequence,
            start_us, "opening segment"
        );
        self.muxer.write_psi()?;
        self.open = Some(OpenSegment {
            start_us,
            max_seen_us: start_us,
        });
        Ok(())
    }

    fn write_video(&mut self, unit: &AccessUnit, pts: i64, dts: i64) -> Result<(), MpegTsError> {
        self.muxer.write(epid::VIDEO, &unit.payload, pts, dts)?;
        self.observe(pts);
        trace!(pts_us = pts, dts_us = dts, key = unit.is_keyframe, "video written");
        Ok(())
    }

    fn write_audio(&mut self, unit: &AccessUnit) -> Result<(), MpegTsError> {
        if self.open.is_none() {
            return Ok(());
        }
        // judged against the run anchor so audio lagging behind a cut is still kept
        if self.timeline.offset(unit.pts_us) < -self.config.preroll_us() {
            trace!(pts_us = unit.pts_us, "discarding audio before the anchor");
            self.stats.dropped_audio += 1;
            return Ok(());
        }
        let pts = self.timeline.rebase(unit.pts_us);
        let (pts, dts) = self.audio_clock.adjust(pts, pts);
        self.muxer.write(epid::AUDIO, &unit.payload, pts, dts)?;
        self.observe(pts);
        trace!(pts_us = pts, "audio written");
        Ok(())
    }

    fn flush_pending_audio(&mut self) -> Result<(), MpegTsError> {
        while let Some(unit) = self.pending_audio.pop_front() {
            self.write_audio(&unit)?;
        }
        Ok(())
    }

    fn observe(&mut self, ts_us: i64) {
        if let Some(open) = self.open.as_mut() {
            open.max_seen_us = open.max_seen_us.max(ts_us);
        }
    }

    fn finalize(&mut self, end_us: i64, reason: CloseReason) -> Segment {
        let start_us = self.open.take().map_or(end_us, |open| open.start_us);
        let data = self.muxer.take_data().freeze();
        let segment = Segment {
            sequence: self.next_sequence,
            duration: segment::measured_duration(start_us, end_us),
            data,
            start_us,
            reason,
        };
        self.next_sequence += 1;
        self.stats.segments += 1;
        info!(
            name = %segment.name(),
            duration_secs = segment.duration,
            bytes = segment.data.len(),
            ?reason,
            "segment finalized"
        );
        segment
    }
}
