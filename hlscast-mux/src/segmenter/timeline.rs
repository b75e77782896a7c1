use tracing::debug;

/// Single run-wide clock anchored at the first video keyframe.
///
/// The anchor is set once and never moved, so timestamps stay continuous across
/// segments for the lifetime of a run.
#[derive(Debug, Default, Clone)]
pub struct Timeline {
    anchor_us: Option<i64>,
}

impl Timeline {
    #[must_use]
    pub const fn new() -> Self {
        Self { anchor_us: None }
    }

    #[must_use]
    pub const fn anchor_us(&self) -> Option<i64> {
        self.anchor_us
    }

    #[must_use]
    pub const fn is_anchored(&self) -> bool {
        self.anchor_us.is_some()
    }

    /// Anchor at `pts_us` unless already anchored. Returns true when this call set it.
    pub fn anchor(&mut self, pts_us: i64) -> bool {
        if self.anchor_us.is_some() {
            return false;
        }
        debug!(anchor_us = pts_us, "timeline anchored");
        self.anchor_us = Some(pts_us);
        true
    }

    /// Offset from the anchor, possibly negative.
    #[must_use]
    pub fn offset(&self, ts_us: i64) -> i64 {
        ts_us - self.anchor_us.unwrap_or(0)
    }

    /// Offset from the anchor clamped at zero.
    #[must_use]
    pub fn rebase(&self, ts_us: i64) -> i64 {
        self.offset(ts_us).max(0)
    }
}

/// Per-stream monotonicity enforcement.
///
/// PTS must strictly increase; a repeated or earlier value is bumped to one
/// microsecond past the previous one. DTS must strictly increase and never exceed
/// PTS.
#[derive(Debug, Default, Clone)]
pub struct StreamClock {
    last_pts_us: Option<i64>,
    last_dts_us: Option<i64>,
    corrections: u64,
}

impl StreamClock {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            last_pts_us: None,
            last_dts_us: None,
            corrections: 0,
        }
    }

    #[must_use]
    pub const fn last_pts_us(&self) -> Option<i64> {
        self.last_pts_us
    }

    /// How many timestamps were bumped so far.
    #[must_use]
    pub const fn corrections(&self) -> u64 {
        self.corrections
    }

    pub fn adjust(&mut self, pts_us: i64, dts_us: i64) -> (i64, i64) {
        let mut pts = pts_us;
        if let Some(last) = self.last_pts_us {
            if pts <= last {
                debug!(pts_us, last_pts_us = last, "non-increasing pts bumped");
                pts = last + 1;
                self.corrections += 1;
            }
        }

        let mut dts = dts_us;
        if let Some(last) = self.last_dts_us {
            if dts <= last {
                dts = last + 1;
            }
        }
        dts = dts.min(pts);

        self.last_pts_us = Some(pts);
        self.last_dts_us = Some(dts);
        (pts, dts)
    }
}
