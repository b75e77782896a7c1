use bytes::Bytes;

/// Which elementary stream an access unit belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaKind {
    Video,
    Audio,
}

impl std::fmt::Display for MediaKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Video => f.write_str("video"),
            Self::Audio => f.write_str("audio"),
        }
    }
}

/// One normalized encoded frame (video) or block (audio).
///
/// Video payloads are Annex-B with in-band parameter sets on keyframes,
/// audio payloads are ADTS framed.
#[derive(Debug, Clone)]
pub struct AccessUnit {
    pub kind: MediaKind,
    pub payload: Bytes,
    pub pts_us: i64,
    pub dts_us: i64,
    /// Always false for audio.
    pub is_keyframe: bool,
    /// Parameter-set bundle that was in force when this unit was normalized.
    pub config_data: Option<Bytes>,
}

impl AccessUnit {
    #[must_use]
    pub fn video(payload: Bytes, pts_us: i64, dts_us: i64, is_keyframe: bool) -> Self {
        Self {
            kind: MediaKind::Video,
            payload,
            pts_us,
            dts_us,
            is_keyframe,
            config_data: None,
        }
    }

    #[must_use]
    pub fn audio(payload: Bytes, pts_us: i64) -> Self {
        Self {
            kind: MediaKind::Audio,
            payload,
            pts_us,
            dts_us: pts_us,
            is_keyframe: false,
            config_data: None,
        }
    }

    #[must_use]
    pub fn with_config(mut self, config_data: Option<Bytes>) -> Self {
        self.config_data = config_data;
        self
    }
}
