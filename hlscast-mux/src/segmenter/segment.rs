use bytes::Bytes;

/// Shortest duration a finalized segment reports.
pub const MIN_SEGMENT_DURATION_SECS: f64 = 0.1;

/// Why a segment was closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// A keyframe arrived after the target duration was reached.
    Keyframe,
    /// No keyframe arrived before the hard ceiling.
    DurationCeiling,
    /// The pipeline stopped.
    Finish,
}

/// A finalized, immutable run of transport packets.
#[derive(Debug, Clone)]
pub struct Segment {
    pub sequence: u64,
    pub data: Bytes,
    /// Measured duration in seconds.
    pub duration: f64,
    /// Rebased timestamp of the opening keyframe.
    pub start_us: i64,
    pub reason: CloseReason,
}

impl Segment {
    /// `seg_00042.ts`
    #[must_use]
    pub fn name(&self) -> String {
        segment_name(self.sequence)
    }

    #[must_use]
    pub fn packet_count(&self) -> usize {
        self.data.len() / crate::mpegts::define::TS_PACKET_SIZE
    }
}

#[must_use]
pub fn segment_name(sequence: u64) -> String {
    format!("seg_{sequence:05}.ts")
}

/// Seconds between two rebased timestamps, never below the floor.
#[must_use]
pub fn measured_duration(start_us: i64, end_us: i64) -> f64 {
    let secs = (end_us - start_us) as f64 / 1_000_000.0;
    secs.max(MIN_SEGMENT_DURATION_SECS)
}
