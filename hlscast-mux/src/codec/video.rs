use {
    super::nalu::{self, DEFAULT_NAL_LENGTH_SIZE},
    crate::{mpegts::define::epsi_stream_type, unit::AccessUnit},
    byteorder::{BigEndian, ByteOrder},
    bytes::{Bytes, BytesMut},
    serde::{Deserialize, Serialize},
};

pub mod h264_nal_type {
    pub const IDR: u8 = 5;
    pub const SPS: u8 = 7;
    pub const PPS: u8 = 8;
    pub const AUD: u8 = 9;
}

pub mod h265_nal_type {
    pub const BLA_W_LP: u8 = 16;
    pub const RSV_IRAP_23: u8 = 23;
    pub const VPS: u8 = 32;
    pub const SPS: u8 = 33;
    pub const PPS: u8 = 34;
    pub const AUD: u8 = 35;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VideoCodec {
    H264,
    #[default]
    H265,
}

impl VideoCodec {
    #[must_use]
    pub const fn stream_type(self) -> u8 {
        match self {
            Self::H264 => epsi_stream_type::PSI_STREAM_H264,
            Self::H265 => epsi_stream_type::PSI_STREAM_H265,
        }
    }

    #[must_use]
    pub fn nal_type(self, nalu: &[u8]) -> Option<u8> {
        let first = *nalu.first()?;
        Some(match self {
            Self::H264 => first & 0x1F,
            Self::H265 => (first >> 1) & 0x3F,
        })
    }

    /// Position of a parameter set in the canonical VPS, SPS, PPS order.
    #[must_use]
    pub fn parameter_set_rank(self, nalu: &[u8]) -> Option<u8> {
        match (self, self.nal_type(nalu)?) {
            (Self::H264, h264_nal_type::SPS) | (Self::H265, h265_nal_type::SPS) => Some(1),
            (Self::H264, h264_nal_type::PPS) | (Self::H265, h265_nal_type::PPS) => Some(2),
            (Self::H265, h265_nal_type::VPS) => Some(0),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_access_unit_delimiter(self, nalu: &[u8]) -> bool {
        match self {
            Self::H264 => self.nal_type(nalu) == Some(h264_nal_type::AUD),
            Self::H265 => self.nal_type(nalu) == Some(h265_nal_type::AUD),
        }
    }

    #[must_use]
    pub fn is_vcl(self, nalu: &[u8]) -> bool {
        match (self, self.nal_type(nalu)) {
            (Self::H264, Some(t)) => (1..=5).contains(&t),
            (Self::H265, Some(t)) => t < 32,
            (_, None) => false,
        }
    }

    /// Random access point (IDR for H.264, IRAP for H.265).
    #[must_use]
    pub fn is_keyframe(self, nalu: &[u8]) -> bool {
        match (self, self.nal_type(nalu)) {
            (Self::H264, Some(t)) => t == h264_nal_type::IDR,
            (Self::H265, Some(t)) => (h265_nal_type::BLA_W_LP..=h265_nal_type::RSV_IRAP_23).contains(&t),
            (_, None) => false,
        }
    }

    /// Whether a VCL NAL starts a new picture (first slice of the picture).
    #[must_use]
    pub fn is_first_slice(self, nalu: &[u8]) -> bool {
        let header_len = match self {
            Self::H264 => 1,
            Self::H265 => 2,
        };
        // H.264 first_mb_in_slice == 0 is ue(v) "1"; H.265 first_slice_segment_in_pic_flag
        nalu.get(header_len).is_some_and(|b| b & 0x80 != 0)
    }
}

/// Out-of-band codec configuration, kept in VPS, SPS, PPS order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParameterSetBundle {
    codec: VideoCodec,
    sets: Vec<Bytes>,
}

impl ParameterSetBundle {
    /// Parse encoder configuration given as Annex-B, length-prefixed NAL units or an
    /// `avcC`/`hvcC` decoder configuration record.
    ///
    /// Returns the bundle and, for configuration records, the NAL length size that
    /// subsequent length-prefixed frames use.
    #[must_use]
    pub fn parse(codec: VideoCodec, config: &[u8]) -> Option<(Self, Option<usize>)> {
        let framing = nalu::detect_framing(config, DEFAULT_NAL_LENGTH_SIZE);
        let (nalus, length_size) = if framing == nalu::NaluFraming::AnnexB {
            (nalu::split_annexb(config), None)
        } else if config.first() == Some(&1) {
            let (nalus, length_size) = match codec {
                VideoCodec::H264 => parse_avcc(config)?,
                VideoCodec::H265 => parse_hvcc(config)?,
            };
            (nalus, Some(length_size))
        } else {
            (nalu::split_length_prefixed(config, DEFAULT_NAL_LENGTH_SIZE), None)
        };

        let mut ranked: Vec<(u8, &[u8])> = nalus
            .into_iter()
            .filter_map(|n| codec.parameter_set_rank(n).map(|rank| (rank, n)))
            .collect();
        if ranked.is_empty() {
            return None;
        }
        ranked.sort_by_key(|(rank, _)| *rank);

        let sets = ranked
            .into_iter()
            .map(|(_, n)| Bytes::copy_from_slice(n))
            .collect();
        Some((Self { codec, sets }, length_size))
    }

    #[must_use]
    pub const fn codec(&self) -> VideoCodec {
        self.codec
    }

    #[must_use]
    pub fn sets(&self) -> &[Bytes] {
        &self.sets
    }

    pub fn write_annexb(&self, out: &mut BytesMut) {
        for set in &self.sets {
            nalu::write_annexb(out, set);
        }
    }

    #[must_use]
    pub fn to_annexb(&self) -> Bytes {
        let mut out = BytesMut::new();
        self.write_annexb(&mut out);
        out.freeze()
    }
}

fn read_nalu_list<'a>(data: &'a [u8], pos: &mut usize, count: usize, out: &mut Vec<&'a [u8]>) -> Option<()> {
    for _ in 0..count {
        let len = BigEndian::read_u16(data.get(*pos..*pos + 2)?) as usize;
        *pos += 2;
        out.push(data.get(*pos..*pos + len)?);
        *pos += len;
    }
    Some(())
}

// ISO/IEC 14496-15 AVCDecoderConfigurationRecord
fn parse_avcc(data: &[u8]) -> Option<(Vec<&[u8]>, usize)> {
    let length_size = usize::from(*data.get(4)? & 0x03) + 1;
    let mut nalus = Vec::new();
    let mut pos = 6;
    read_nalu_list(data, &mut pos, usize::from(*data.get(5)? & 0x1F), &mut nalus)?;
    let num_pps = usize::from(*data.get(pos)?);
    pos += 1;
    read_nalu_list(data, &mut pos, num_pps, &mut nalus)?;
    Some((nalus, length_size))
}

// ISO/IEC 14496-15 HEVCDecoderConfigurationRecord
fn parse_hvcc(data: &[u8]) -> Option<(Vec<&[u8]>, usize)> {
    let length_size = usize::from(*data.get(21)? & 0x03) + 1;
    let num_arrays = *data.get(22)?;
    let mut nalus = Vec::new();
    let mut pos = 23;
    for _ in 0..num_arrays {
        // array_completeness | reserved | NAL_unit_type
        pos += 1;
        let count = BigEndian::read_u16(data.get(pos..pos + 2)?) as usize;
        pos += 2;
        read_nalu_list(data, &mut pos, count, &mut nalus)?;
    }
    Some((nalus, length_size))
}

/// Turns encoder video output into Annex-B access units.
pub struct VideoNormalizer {
    codec: VideoCodec,
    bundle: Option<ParameterSetBundle>,
    nal_length_size: usize,
}

impl VideoNormalizer {
    #[must_use]
    pub const fn new(codec: VideoCodec) -> Self {
        Self {
            codec,
            bundle: None,
            nal_length_size: DEFAULT_NAL_LENGTH_SIZE,
        }
    }

    #[must_use]
    pub const fn codec(&self) -> VideoCodec {
        self.codec
    }

    #[must_use]
    pub const fn bundle(&self) -> Option<&ParameterSetBundle> {
        self.bundle.as_ref()
    }

    /// Replace the stored parameter sets with the ones carried by `config`.
    pub fn update_config(&mut self, config: &[u8]) {
        match ParameterSetBundle::parse(self.codec, config) {
            Some((bundle, length_size)) => {
                if let Some(size) = length_size {
                    self.nal_length_size = size;
                }
                tracing::info!(
                    "Video parameter sets updated: {} sets ({} bytes)",
                    bundle.sets().len(),
                    config.len()
                );
                self.bundle = Some(bundle);
            }
            None => {
                tracing::warn!(
                    "Ignoring {} bytes of video configuration without parameter sets",
                    config.len()
                );
            }
        }
    }

    /// Convert one encoded frame to Annex-B, prefixing the parameter sets on keyframes.
    pub fn normalize(&self, payload: &[u8], is_keyframe: bool) -> Bytes {
        let nalus = nalu::split_nalus(payload, self.nal_length_size);
        let mut out = BytesMut::with_capacity(payload.len() + 128);

        if is_keyframe {
            let in_band = nalus
                .iter()
                .any(|n| self.codec.parameter_set_rank(n).is_some());
            match (&self.bundle, in_band) {
                (_, true) => {}
                (Some(bundle), false) => bundle.write_annexb(&mut out),
                (None, false) => {
                    tracing::debug!("Keyframe without parameter sets, passing through");
                }
            }
        }

        for n in nalus {
            nalu::write_annexb(&mut out, n);
        }
        out.freeze()
    }

    /// Normalize into an [`AccessUnit`]; decode time equals presentation time.
    pub fn normalize_unit(&self, payload: &[u8], pts_us: i64, is_keyframe: bool) -> AccessUnit {
        let config = if is_keyframe {
            self.bundle.as_ref().map(ParameterSetBundle::to_annexb)
        } else {
            None
        };
        AccessUnit::video(self.normalize(payload, is_keyframe), pts_us, pts_us, is_keyframe)
            .with_config(config)
    }
}
