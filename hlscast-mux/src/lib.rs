// Live HLS muxing library
//
// Data flow:
// - codec: encoder-native access units -> Annex-B video / ADTS audio
// - segmenter: single timeline, keyframe-aligned segment cuts
// - mpegts: PAT/PMT sections, PES framing, 188-byte transport packets
// - hls: sliding-window media playlist
// - storage: upload / cache sinks for segment and playlist bytes
// - pipeline: producer queues, mux loop and upload worker

pub mod bytesio;
pub mod codec;
pub mod hls;
pub mod mpegts;
pub mod pipeline;
pub mod segmenter;
pub mod storage;
pub mod unit;

pub use unit::{AccessUnit, MediaKind};
