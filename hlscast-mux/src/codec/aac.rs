use {
    crate::unit::AccessUnit,
    bytes::{BufMut, Bytes, BytesMut},
};

pub const ADTS_HEADER_SIZE: usize = 7;

/// Largest value the 13-bit ADTS frame length can carry.
pub const ADTS_MAX_FRAME_LENGTH: usize = 0x1FFF;

pub const AAC_OBJECT_TYPE_LC: u8 = 2;

const SAMPLING_FREQUENCIES: [u32; 13] = [
    96000, 88200, 64000, 48000, 44100, 32000, 24000, 22050, 16000, 12000, 11025, 8000, 7350,
];

const DEFAULT_SAMPLING_INDEX: u8 = 3;

/// ADTS sampling frequency index; unknown rates fall back to 48 kHz.
#[must_use]
pub fn sampling_frequency_index(sample_rate: u32) -> u8 {
    SAMPLING_FREQUENCIES
        .iter()
        .position(|&rate| rate == sample_rate)
        .map_or(DEFAULT_SAMPLING_INDEX, |idx| idx as u8)
}

#[must_use]
pub fn sampling_frequency(index: u8) -> Option<u32> {
    SAMPLING_FREQUENCIES.get(usize::from(index)).copied()
}

/// True when `data` already starts with an ADTS sync word (layer bits ignored).
#[must_use]
pub fn is_adts(data: &[u8]) -> bool {
    data.len() >= ADTS_HEADER_SIZE && data[0] == 0xFF && (data[1] & 0xF6) == 0xF0
}

/// Frame length field of an ADTS header (header included).
#[must_use]
pub fn adts_frame_length(header: &[u8]) -> Option<usize> {
    if !is_adts(header) {
        return None;
    }
    Some(
        (usize::from(header[3] & 0x03) << 11)
            | (usize::from(header[4]) << 3)
            | (usize::from(header[5]) >> 5),
    )
}

/// The parts of an MPEG-4 AudioSpecificConfig that ADTS needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioSpecificConfig {
    pub object_type: u8,
    pub sampling_index: u8,
    pub channel_config: u8,
}

impl AudioSpecificConfig {
    #[must_use]
    pub fn new(sample_rate: u32, channels: u8) -> Self {
        Self {
            object_type: AAC_OBJECT_TYPE_LC,
            sampling_index: sampling_frequency_index(sample_rate),
            channel_config: channels.clamp(1, 7),
        }
    }

    /// Parse the leading 2 bytes of an AudioSpecificConfig.
    #[must_use]
    pub fn parse(data: &[u8]) -> Option<Self> {
        let (b0, b1) = (*data.first()?, *data.get(1)?);
        let object_type = b0 >> 3;
        let sampling_index = ((b0 & 0x07) << 1) | (b1 >> 7);
        let channel_config = (b1 >> 3) & 0x0F;
        // escape values (explicit frequency / extended object type) are not carried by ADTS
        if object_type == 0 || object_type > 4 || sampling_index > 12 {
            return None;
        }
        Some(Self {
            object_type,
            sampling_index,
            channel_config,
        })
    }

    #[must_use]
    pub fn sample_rate(&self) -> u32 {
        sampling_frequency(self.sampling_index).unwrap_or(48000)
    }

    /// Frame lengths beyond the 13-bit field are clamped to its maximum.
    pub fn write_adts_header(&self, out: &mut BytesMut, payload_len: usize) {
        let frame_len = (payload_len + ADTS_HEADER_SIZE).min(ADTS_MAX_FRAME_LENGTH);
        let profile = self.object_type.saturating_sub(1) & 0x03;
        let channels = self.channel_config;

        out.put_u8(0xFF);
        // MPEG-4, layer 0, protection absent
        out.put_u8(0xF1);
        out.put_u8((profile << 6) | ((self.sampling_index & 0x0F) << 2) | ((channels >> 2) & 0x01));
        out.put_u8(((channels & 0x03) << 6) | ((frame_len >> 11) as u8 & 0x03));
        out.put_u8((frame_len >> 3) as u8);
        // buffer fullness 0x7FF (VBR)
        out.put_u8((((frame_len & 0x07) as u8) << 5) | 0x1F);
        // buffer fullness low bits, one raw data block
        out.put_u8(0xFC);
    }
}

/// Wraps raw AAC frames in ADTS headers.
pub struct AudioNormalizer {
    config: AudioSpecificConfig,
}

impl AudioNormalizer {
    #[must_use]
    pub fn new(sample_rate: u32, channels: u8) -> Self {
        Self {
            config: AudioSpecificConfig::new(sample_rate, channels),
        }
    }

    #[must_use]
    pub const fn config(&self) -> AudioSpecificConfig {
        self.config
    }

    /// Adopt the AudioSpecificConfig the encoder reported.
    pub fn update_config(&mut self, asc: &[u8]) {
        match AudioSpecificConfig::parse(asc) {
            Some(config) => {
                tracing::info!(
                    "Audio config updated: object type {}, {} Hz, {} channels",
                    config.object_type,
                    config.sample_rate(),
                    config.channel_config
                );
                self.config = config;
            }
            None => tracing::warn!("Ignoring unsupported AudioSpecificConfig {:02x?}", asc),
        }
    }

    pub fn normalize(&self, payload: &[u8]) -> Bytes {
        if is_adts(payload) {
            return Bytes::copy_from_slice(payload);
        }
        if payload.len() + ADTS_HEADER_SIZE > ADTS_MAX_FRAME_LENGTH {
            tracing::warn!(
                "AAC frame of {} bytes exceeds the ADTS length field, passing it through unframed",
                payload.len()
            );
            return Bytes::copy_from_slice(payload);
        }
        let mut out = BytesMut::with_capacity(ADTS_HEADER_SIZE + payload.len());
        self.config.write_adts_header(&mut out, payload.len());
        out.put_slice(payload);
        out.freeze()
    }

    pub fn normalize_unit(&self, payload: &[u8], pts_us: i64) -> AccessUnit {
        AccessUnit::audio(self.normalize(payload), pts_us)
    }
}
