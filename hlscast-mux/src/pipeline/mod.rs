// Pipeline coordination
//
// Tasks:
// - one blocking producer per source: next_event -> normalize -> bounded queue
// - one mux task: drains video, then audio, then checks the duration ceiling,
//   then sleeps briefly when idle
// - one upload worker fed through a bounded queue the mux task never waits on
//
// Stopping drains already queued units, closes the open segment, publishes the
// final playlist and flushes pending uploads before sources are released.

pub mod coordinator;
pub mod errors;
pub mod source;
pub mod uploader;

pub use coordinator::{Pipeline, PipelineHandle, PipelineReport};
pub use errors::PipelineError;
pub use source::{AccessUnitSource, RawUnit, SourceError, SourceEvent, VecSource};
pub use uploader::{UploadConfig, UploadStats};

use {
    crate::{codec::VideoCodec, hls::PlaylistConfig, segmenter::SegmenterConfig},
    serde::{Deserialize, Serialize},
};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub codec: VideoCodec,
    /// Used for ADTS headers until the encoder reports an AudioSpecificConfig.
    pub audio_sample_rate: u32,
    pub audio_channels: u8,
    pub video_queue_capacity: usize,
    pub audio_queue_capacity: usize,
    /// Mux loop sleep when neither queue had work.
    pub poll_interval_ms: u64,
    pub segmenter: SegmenterConfig,
    pub playlist: PlaylistConfig,
    pub upload: UploadConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            codec: VideoCodec::default(),
            audio_sample_rate: 48_000,
            audio_channels: 2,
            video_queue_capacity: 64,
            audio_queue_capacity: 256,
            poll_interval_ms: 10,
            segmenter: SegmenterConfig::default(),
            playlist: PlaylistConfig::default(),
            upload: UploadConfig::default(),
        }
    }
}
