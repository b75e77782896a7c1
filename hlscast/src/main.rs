mod config;
mod input;
mod logging;

use anyhow::{Context, Result};
use clap::Parser;
use hlscast_mux::{
    codec::VideoCodec,
    pipeline::{AccessUnitSource, Pipeline},
    storage::{FileSink, HlsSink, HttpSink},
};
use std::{path::PathBuf, sync::Arc, time::Duration};
use tracing::{info, warn};

use crate::config::Config;
use input::{AdtsFileSource, AnnexBFileSource};

#[derive(Parser, Debug)]
#[command(name = "hlscast")]
#[command(about = "Live HLS segmenter", long_about = None)]
struct Args {
    /// Configuration file (yaml, toml or json)
    #[arg(long, env = "HLSCAST_CONFIG")]
    config: Option<PathBuf>,

    /// Annex-B H.264/H.265 elementary stream
    #[arg(long)]
    video: Option<PathBuf>,

    /// ADTS AAC elementary stream
    #[arg(long)]
    audio: Option<PathBuf>,

    /// Video codec of the elementary stream
    #[arg(long, value_parser = parse_codec)]
    codec: Option<VideoCodec>,

    /// Upload origin (http or https)
    #[arg(long)]
    output_url: Option<String>,

    /// Local directory receiving segments and playlists
    #[arg(long)]
    cache_dir: Option<PathBuf>,

    /// Read input files as fast as possible instead of at their frame rate
    #[arg(long)]
    no_realtime: bool,
}

fn parse_codec(value: &str) -> Result<VideoCodec, String> {
    match value.to_ascii_lowercase().as_str() {
        "h265" | "hevc" => Ok(VideoCodec::H265),
        "h264" | "avc" => Ok(VideoCodec::H264),
        other => Err(format!("unsupported codec {other}, expected h265 or h264")),
    }
}

impl Args {
    /// Command line flags take precedence over file and environment settings.
    fn apply(self, config: &mut Config) {
        if let Some(video) = self.video {
            config.input.video = Some(video);
        }
        if let Some(audio) = self.audio {
            config.input.audio = Some(audio);
        }
        if let Some(codec) = self.codec {
            config.pipeline.codec = codec;
        }
        if let Some(url) = self.output_url {
            config.output.output_url = Some(url);
        }
        if let Some(dir) = self.cache_dir {
            config.output.cache_dir = Some(dir);
        }
        if self.no_realtime {
            config.input.realtime = false;
        }
    }
}

async fn build_sinks(config: &Config) -> Result<Vec<Arc<dyn HlsSink>>> {
    let mut sinks: Vec<Arc<dyn HlsSink>> = Vec::new();
    if let Some(dir) = &config.output.cache_dir {
        let sink = FileSink::create(dir)
            .await
            .with_context(|| format!("failed to create cache directory {}", dir.display()))?;
        info!("Caching segments in {}", dir.display());
        sinks.push(Arc::new(sink));
    }
    if let Some(url) = &config.output.output_url {
        let timeout = Duration::from_secs(config.output.http_timeout_secs.max(1));
        sinks.push(Arc::new(HttpSink::with_timeout(url.clone(), timeout)?));
        info!("Uploading segments to {url}");
    }
    Ok(sinks)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = Config::load(args.config.as_deref()).context("failed to load configuration")?;
    args.apply(&mut config);

    if let Err(errors) = config.validate() {
        for e in &errors {
            eprintln!("Config validation error: {e}");
        }
        return Err(anyhow::anyhow!(
            "Configuration validation failed with {} error(s)",
            errors.len()
        ));
    }

    logging::init_logging(&config.logging)?;
    info!("hlscast starting...");

    let params = config.encoder_params();
    info!(
        codec = ?params.codec,
        width = params.width,
        height = params.height,
        bitrate_kbps = params.bitrate_kbps,
        frame_rate = params.frame_rate,
        keyframe_interval_frames = params.keyframe_interval_frames,
        "encoder parameters"
    );

    let video_path = config
        .input
        .video
        .clone()
        .context("no video input configured")?;
    let video: Box<dyn AccessUnitSource> = Box::new(AnnexBFileSource::new(
        video_path,
        params.codec,
        params.frame_rate,
        config.input.realtime,
    ));
    let audio = config.input.audio.clone().map(|path| {
        Box::new(AdtsFileSource::new(path, config.input.realtime)) as Box<dyn AccessUnitSource>
    });

    let sinks = build_sinks(&config).await?;
    let handle = Pipeline::start(config.pipeline.clone(), video, audio, sinks)?;

    let cancel = handle.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received shutdown signal");
            cancel.cancel();
        }
    });

    let report = handle.wait().await?;
    if report.dropped_uploads > 0 || report.uploads.failed > 0 {
        warn!(
            dropped = report.dropped_uploads,
            failed = report.uploads.failed,
            "some uploads did not complete"
        );
    }
    info!(
        segments = report.segments,
        last_sequence = ?report.last_sequence,
        video_units = report.video_units,
        audio_units = report.audio_units,
        dropped_video = report.segmenter.dropped_video,
        dropped_audio = report.segmenter.dropped_audio,
        timestamp_corrections = report.segmenter.timestamp_corrections,
        uploaded = report.uploads.uploaded,
        retries = report.uploads.retries,
        "hlscast stopped"
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_codec() {
        assert_eq!(parse_codec("h265"), Ok(VideoCodec::H265));
        assert_eq!(parse_codec("HEVC"), Ok(VideoCodec::H265));
        assert_eq!(parse_codec("h264"), Ok(VideoCodec::H264));
        assert!(parse_codec("vp9").is_err());
    }

    #[test]
    fn test_flags_override_config() {
        let args = Args::parse_from([
            "hlscast",
            "--video",
            "cam.h264",
            "--codec",
            "h264",
            "--cache-dir",
            "/tmp/hls",
            "--no-realtime",
        ]);
        let mut config = Config::default();
        config.input.audio = Some(PathBuf::from("mic.aac"));
        args.apply(&mut config);

        assert_eq!(config.input.video, Some(PathBuf::from("cam.h264")));
        assert_eq!(config.input.audio, Some(PathBuf::from("mic.aac")));
        assert_eq!(config.pipeline.codec, VideoCodec::H264);
        assert_eq!(config.output.cache_dir, Some(PathBuf::from("/tmp/hls")));
        assert!(!config.input.realtime);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_no_flags_keep_config() {
        let args = Args::parse_from(["hlscast"]);
        let mut config = Config::default();
        config.output.output_url = Some("https://origin/live/".to_string());
        args.apply(&mut config);
        assert_eq!(config.output.output_url.as_deref(), Some("https://origin/live/"));
        assert!(config.input.realtime);
    }
}
