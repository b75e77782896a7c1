use config::{Config as ConfigBuilder, ConfigError, Environment, File};
use hlscast_mux::{codec::VideoCodec, pipeline::PipelineConfig};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub logging: LoggingConfig,
    pub input: InputConfig,
    pub encoder: EncoderConfig,
    pub output: OutputConfig,
    pub pipeline: PipelineConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String, // "json" or "pretty"
    pub file_path: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
            file_path: None,
        }
    }
}

/// Elementary stream files standing in for the capture devices.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InputConfig {
    pub video: Option<PathBuf>,
    pub audio: Option<PathBuf>,
    /// Pace the files at their own timestamps instead of reading as fast as possible.
    pub realtime: bool,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            video: None,
            audio: None,
            realtime: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Resolution {
    Low,
    Medium,
    #[default]
    High,
}

impl Resolution {
    #[must_use]
    pub const fn dimensions(self) -> (u32, u32) {
        match self {
            Self::Low => (640, 360),
            Self::Medium => (1280, 720),
            Self::High => (1920, 1080),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EncoderConfig {
    pub resolution: Resolution,
    pub video_bitrate_kbps: u32,
    pub frame_rate: u32,
    pub keyframe_interval_secs: f64,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            resolution: Resolution::High,
            video_bitrate_kbps: 4000,
            frame_rate: 30,
            keyframe_interval_secs: 1.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Upload origin, e.g. `https://origin/live/` or `https://origin/upload?file=`.
    pub output_url: Option<String>,
    /// Local directory receiving a copy of every segment and playlist.
    pub cache_dir: Option<PathBuf>,
    pub http_timeout_secs: u64,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            output_url: None,
            cache_dir: None,
            http_timeout_secs: 10,
        }
    }
}

/// Parameters handed to the video encoder.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EncoderParams {
    pub codec: VideoCodec,
    pub width: u32,
    pub height: u32,
    pub bitrate_kbps: u32,
    pub frame_rate: u32,
    pub keyframe_interval_frames: u32,
}

pub const MIN_VIDEO_BITRATE_KBPS: u32 = 100;
pub const MAX_VIDEO_BITRATE_KBPS: u32 = 50_000;

impl Config {
    /// Load configuration from multiple sources with priority:
    /// 1. Environment variables (highest priority)
    /// 2. Config file (if provided)
    /// 3. Defaults (lowest priority)
    pub fn load(config_file: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = ConfigBuilder::builder();

        if let Some(path) = config_file {
            builder = builder.add_source(File::from(path));
        }

        // HLSCAST__ENCODER__FRAME_RATE, HLSCAST__PIPELINE__SEGMENTER__TARGET_DURATION_SECS, ...
        builder = builder.add_source(
            Environment::with_prefix("HLSCAST")
                .separator("__")
                .try_parsing(true),
        );

        builder.build()?.try_deserialize()
    }

    /// Check the whole configuration and report every problem found.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.input.video.is_none() {
            errors.push("input.video is required".to_string());
        }

        let bitrate = self.encoder.video_bitrate_kbps;
        if !(MIN_VIDEO_BITRATE_KBPS..=MAX_VIDEO_BITRATE_KBPS).contains(&bitrate) {
            errors.push(format!(
                "encoder.video_bitrate_kbps must be within {MIN_VIDEO_BITRATE_KBPS}..={MAX_VIDEO_BITRATE_KBPS}, got {bitrate}"
            ));
        }
        if self.encoder.frame_rate == 0 || self.encoder.frame_rate > 120 {
            errors.push(format!(
                "encoder.frame_rate must be within 1..=120, got {}",
                self.encoder.frame_rate
            ));
        }

        let segmenter = &self.pipeline.segmenter;
        if !(segmenter.target_duration_secs > 0.0) {
            errors.push("pipeline.segmenter.target_duration_secs must be positive".to_string());
        }
        if !(segmenter.max_duration_factor >= 1.0) {
            errors.push("pipeline.segmenter.max_duration_factor must be at least 1".to_string());
        }

        let keyframe_interval = self.encoder.keyframe_interval_secs;
        if !(keyframe_interval > 0.0) {
            errors.push("encoder.keyframe_interval_secs must be positive".to_string());
        } else if keyframe_interval > segmenter.target_duration_secs * segmenter.max_duration_factor
        {
            errors.push(format!(
                "encoder.keyframe_interval_secs ({keyframe_interval}) exceeds the segment duration ceiling ({})",
                segmenter.target_duration_secs * segmenter.max_duration_factor
            ));
        }

        if self.pipeline.playlist.window_size == 0 {
            errors.push("pipeline.playlist.window_size must be at least 1".to_string());
        }

        match &self.output.output_url {
            Some(url) if !(url.starts_with("http://") || url.starts_with("https://")) => {
                errors.push(format!("output.output_url must be http or https: {url}"));
            }
            Some(_) => {}
            None if self.output.cache_dir.is_none() => {
                errors.push("one of output.output_url or output.cache_dir is required".to_string());
            }
            None => {}
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    #[must_use]
    pub fn encoder_params(&self) -> EncoderParams {
        let (width, height) = self.encoder.resolution.dimensions();
        let frames = (self.encoder.keyframe_interval_secs * f64::from(self.encoder.frame_rate))
            .round()
            .max(1.0);
        EncoderParams {
            codec: self.pipeline.codec,
            width,
            height,
            bitrate_kbps: self.encoder.video_bitrate_kbps,
            frame_rate: self.encoder.frame_rate,
            keyframe_interval_frames: frames as u32,
        }
    }
}
