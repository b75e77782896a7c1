use {
    crate::unit::MediaKind,
    bytes::Bytes,
    std::collections::VecDeque,
};

/// One encoded frame as the encoder produced it, before normalization.
#[derive(Debug, Clone)]
pub struct RawUnit {
    pub payload: Bytes,
    pub pts_us: i64,
    pub dts_us: i64,
    pub is_keyframe: bool,
    /// Configuration delivered together with this frame.
    pub config_data: Option<Bytes>,
}

impl RawUnit {
    #[must_use]
    pub fn new(payload: impl Into<Bytes>, pts_us: i64, is_keyframe: bool) -> Self {
        Self {
            payload: payload.into(),
            pts_us,
            dts_us: pts_us,
            is_keyframe,
            config_data: None,
        }
    }

    #[must_use]
    pub fn with_dts(mut self, dts_us: i64) -> Self {
        self.dts_us = dts_us;
        self
    }

    #[must_use]
    pub fn with_config(mut self, config: impl Into<Bytes>) -> Self {
        self.config_data = Some(config.into());
        self
    }
}

#[derive(Debug, Clone)]
pub enum SourceEvent {
    Unit(RawUnit),
    /// Out-of-band elementary stream configuration (parameter sets, AudioSpecificConfig).
    Config(Bytes),
}

#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("failed to open {kind} source: {reason}")]
    Open { kind: MediaKind, reason: String },

    #[error("{kind} source failed: {reason}")]
    Device { kind: MediaKind, reason: String },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// A capture/encode source producing access units for one stream.
///
/// `next_event` may block while waiting on hardware; it is always called from a
/// dedicated blocking thread. `Ok(None)` ends the stream.
pub trait AccessUnitSource: Send + 'static {
    fn kind(&self) -> MediaKind;

    /// Acquire devices / configure the encoder.
    fn open(&mut self) -> Result<(), SourceError>;

    fn next_event(&mut self) -> Result<Option<SourceEvent>, SourceError>;

    /// Release whatever `open` acquired. Called exactly once after a successful open.
    fn close(&mut self);
}

/// Replays a fixed list of events.
pub struct VecSource {
    kind: MediaKind,
    events: VecDeque<SourceEvent>,
    fail_open: bool,
    opened: bool,
}

impl VecSource {
    #[must_use]
    pub fn new(kind: MediaKind, events: impl IntoIterator<Item = SourceEvent>) -> Self {
        Self {
            kind,
            events: events.into_iter().collect(),
            fail_open: false,
            opened: false,
        }
    }

    #[must_use]
    pub fn from_units(kind: MediaKind, units: impl IntoIterator<Item = RawUnit>) -> Self {
        Self::new(kind, units.into_iter().map(SourceEvent::Unit))
    }

    /// Make `open` fail, simulating an unavailable device.
    #[must_use]
    pub fn failing_open(mut self) -> Self {
        self.fail_open = true;
        self
    }

    #[must_use]
    pub fn remaining(&self) -> usize {
        self.events.len()
    }
}

impl AccessUnitSource for VecSource {
    fn kind(&self) -> MediaKind {
        self.kind
    }

    fn open(&mut self) -> Result<(), SourceError> {
        if self.fail_open {
            return Err(SourceError::Open {
                kind: self.kind,
                reason: "device unavailable".to_string(),
            });
        }
        self.opened = true;
        Ok(())
    }

    fn next_event(&mut self) -> Result<Option<SourceEvent>, SourceError> {
        Ok(self.events.pop_front())
    }

    fn close(&mut self) {
        self.opened = false;
    }
}
