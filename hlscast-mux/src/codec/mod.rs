// Bitstream normalization
//
// Converts encoder-native framing into what the transport stream carries:
// - video: Annex-B start-code delimited NAL units, parameter sets in-band on keyframes
// - audio: ADTS framed AAC
//
// Normalization never fails. Malformed input is truncated at the last valid
// boundary and the problem is logged.

pub mod aac;
pub mod nalu;
pub mod video;

pub use aac::{AudioNormalizer, AudioSpecificConfig};
pub use video::{ParameterSetBundle, VideoCodec, VideoNormalizer};
