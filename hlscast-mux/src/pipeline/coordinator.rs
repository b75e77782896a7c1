use {
    super::{
        errors::PipelineError,
        source::{AccessUnitSource, RawUnit, SourceError, SourceEvent},
        uploader::{UploadQueue, UploadStats, UploadWorker},
        PipelineConfig,
    },
    crate::{
        codec::{AudioNormalizer, VideoNormalizer},
        hls::PlaylistBuilder,
        segmenter::{Segment, Segmenter, SegmenterStats},
        storage::HlsSink,
        unit::{AccessUnit, MediaKind},
    },
    bytes::Bytes,
    std::{sync::Arc, time::Duration},
    tokio::{
        sync::mpsc::{self, error::TryRecvError},
        task::JoinHandle,
        time,
    },
    tokio_util::sync::CancellationToken,
    tracing::{debug, error, info, warn},
};

/// Summary returned when a pipeline stops.
#[derive(Debug, Clone, Default)]
pub struct PipelineReport {
    pub segments: u64,
    pub last_sequence: Option<u64>,
    pub video_units: u64,
    pub audio_units: u64,
    /// Uploads the mux loop dropped because the upload queue was full.
    pub dropped_uploads: u64,
    pub segmenter: SegmenterStats,
    pub uploads: UploadStats,
    /// Last playlist published.
    pub playlist: String,
}

pub struct Pipeline;

impl Pipeline {
    /// Open the sources and start producing.
    ///
    /// Must be called from within a Tokio runtime. If any source fails to open, the
    /// ones already opened are closed again and the error is returned.
    pub fn start(
        config: PipelineConfig,
        mut video: Box<dyn AccessUnitSource>,
        audio: Option<Box<dyn AccessUnitSource>>,
        sinks: Vec<Arc<dyn HlsSink>>,
    ) -> Result<PipelineHandle, PipelineError> {
        let segmenter = Segmenter::new(config.segmenter.clone(), config.codec, audio.is_some())?;

        video.open()?;
        let audio = match audio {
            Some(mut audio) => {
                if let Err(e) = audio.open() {
                    video.close();
                    return Err(e.into());
                }
                Some(audio)
            }
            None => None,
        };
        info!(
            codec = ?config.codec,
            audio = audio.is_some(),
            sinks = sinks.len(),
            "pipeline starting"
        );

        let cancel = CancellationToken::new();

        let (video_tx, video_rx) = mpsc::channel(config.video_queue_capacity.max(1));
        let video_producer = spawn_producer(
            video,
            Normalizer::Video(VideoNormalizer::new(config.codec)),
            video_tx,
            cancel.clone(),
        );

        let (audio_rx, audio_producer) = match audio {
            Some(audio) => {
                let (audio_tx, audio_rx) = mpsc::channel(config.audio_queue_capacity.max(1));
                let normalizer = Normalizer::Audio(AudioNormalizer::new(
                    config.audio_sample_rate,
                    config.audio_channels,
                ));
                let handle = spawn_producer(audio, normalizer, audio_tx, cancel.clone());
                (Some(audio_rx), Some(handle))
            }
            None => (None, None),
        };

        let (uploads, upload_worker) = UploadWorker::spawn(sinks, config.upload.clone());

        let mux = MuxLoop {
            poll_interval: Duration::from_millis(config.poll_interval_ms.max(1)),
            playlist: PlaylistBuilder::new(config.playlist.clone()),
            segmenter,
            uploads,
            video_rx,
            audio_rx,
            cancel: cancel.clone(),
            report: PipelineReport::default(),
        };

        let supervisor_cancel = cancel.clone();
        let task = tokio::spawn(async move {
            let mut report = mux.run().await;

            supervisor_cancel.cancel();
            let video_result = video_producer.await?;
            let audio_result = match audio_producer {
                Some(handle) => Some(handle.await?),
                None => None,
            };
            report.uploads = upload_worker.await?;

            info!(
                segments = report.segments,
                video_units = report.video_units,
                audio_units = report.audio_units,
                "pipeline stopped"
            );

            video_result?;
            if let Some(audio_result) = audio_result {
                audio_result?;
            }
            Ok::<_, PipelineError>(report)
        });

        Ok(PipelineHandle { cancel, task })
    }
}

pub struct PipelineHandle {
    cancel: CancellationToken,
    task: JoinHandle<Result<PipelineReport, PipelineError>>,
}

impl PipelineHandle {
    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Request a graceful stop and wait for it.
    pub async fn stop(self) -> Result<PipelineReport, PipelineError> {
        self.cancel.cancel();
        self.task.await?
    }

    /// Wait for the pipeline to end on its own (video source exhausted or failed).
    pub async fn wait(self) -> Result<PipelineReport, PipelineError> {
        self.task.await?
    }
}

enum Normalizer {
    Video(VideoNormalizer),
    Audio(AudioNormalizer),
}

impl Normalizer {
    fn update_config(&mut self, config: &[u8]) {
        match self {
            Self::Video(n) => n.update_config(config),
            Self::Audio(n) => n.update_config(config),
        }
    }

    fn normalize(&mut self, raw: RawUnit) -> AccessUnit {
        if let Some(config) = &raw.config_data {
            self.update_config(config);
        }
        match self {
            Self::Video(n) => {
                let mut unit = n.normalize_unit(&raw.payload, raw.pts_us, raw.is_keyframe);
                unit.dts_us = raw.dts_us;
                unit
            }
            Self::Audio(n) => n.normalize_unit(&raw.payload, raw.pts_us),
        }
    }
}

fn spawn_producer(
    mut source: Box<dyn AccessUnitSource>,
    mut normalizer: Normalizer,
    tx: mpsc::Sender<AccessUnit>,
    cancel: CancellationToken,
) -> JoinHandle<Result<u64, SourceError>> {
    tokio::task::spawn_blocking(move || {
        let kind = source.kind();
        let result = produce(source.as_mut(), &mut normalizer, &tx, &cancel);
        source.close();
        match &result {
            Ok(units) => debug!(%kind, units, "producer finished"),
            Err(e) => {
                error!(%kind, "source failed: {e}");
                cancel.cancel();
            }
        }
        result
    })
}

fn produce(
    source: &mut dyn AccessUnitSource,
    normalizer: &mut Normalizer,
    tx: &mpsc::Sender<AccessUnit>,
    cancel: &CancellationToken,
) -> Result<u64, SourceError> {
    let mut units = 0;
    while !cancel.is_cancelled() {
        let Some(event) = source.next_event()? else {
            break;
        };
        match event {
            SourceEvent::Config(config) => normalizer.update_config(&config),
            SourceEvent::Unit(raw) => {
                let unit = normalizer.normalize(raw);
                if tx.blocking_send(unit).is_err() {
                    break;
                }
                units += 1;
            }
        }
    }
    Ok(units)
}

/// The single consumer. Owns the segmenter and the playlist.
struct MuxLoop {
    poll_interval: Duration,
    segmenter: Segmenter,
    playlist: PlaylistBuilder,
    uploads: UploadQueue,
    video_rx: mpsc::Receiver<AccessUnit>,
    audio_rx: Option<mpsc::Receiver<AccessUnit>>,
    cancel: CancellationToken,
    report: PipelineReport,
}

impl MuxLoop {
    async fn run(mut self) -> PipelineReport {
        let mut video_ended = false;
        loop {
            let (video_work, video_done) = self.drain_video();
            let audio_work = self.drain_audio();

            match self.segmenter.enforce_duration_ceiling() {
                Ok(Some(segment)) => self.publish(segment),
                Ok(None) => {}
                Err(e) => error!("failed to close segment: {e}"),
            }

            if video_done && !video_ended {
                info!("video source ended");
                video_ended = true;
            }
            // audio still in flight when video ends belongs to the last segment
            if video_ended && self.audio_rx.is_none() {
                break;
            }
            if self.cancel.is_cancelled() {
                break;
            }
            if !video_work && !audio_work {
                tokio::select! {
                    () = self.cancel.cancelled() => {}
                    () = time::sleep(self.poll_interval) => {}
                }
            }
        }

        self.shutdown().await
    }

    /// Returns (did work, source ended).
    fn drain_video(&mut self) -> (bool, bool) {
        let mut worked = false;
        loop {
            match self.video_rx.try_recv() {
                Ok(unit) => {
                    worked = true;
                    self.on_video(unit);
                }
                Err(TryRecvError::Empty) => return (worked, false),
                Err(TryRecvError::Disconnected) => return (worked, true),
            }
        }
    }

    fn drain_audio(&mut self) -> bool {
        let mut worked = false;
        while let Some(rx) = self.audio_rx.as_mut() {
            match rx.try_recv() {
                Ok(unit) => {
                    worked = true;
                    self.report.audio_units += 1;
                    if let Err(e) = self.segmenter.push_audio(unit) {
                        error!("failed to mux audio unit: {e}");
                    }
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    debug!("audio source ended");
                    self.audio_rx = None;
                }
            }
        }
        worked
    }

    fn on_video(&mut self, unit: AccessUnit) {
        self.report.video_units += 1;
        match self.segmenter.push_video(unit) {
            Ok(Some(segment)) => self.publish(segment),
            Ok(None) => {}
            Err(e) => error!("failed to mux video unit: {e}"),
        }
    }

    fn record(&mut self, segment: &Segment) -> String {
        let name = segment.name();
        self.playlist.add(name.clone(), segment.duration);
        self.report.segments += 1;
        self.report.last_sequence = Some(segment.sequence);
        name
    }

    fn publish(&mut self, segment: Segment) {
        let name = self.record(&segment);
        if !self.uploads.try_enqueue(name, segment.data) {
            self.report.dropped_uploads += 1;
        }
        let playlist = self.playlist.render_current();
        let playlist_name = self.playlist.config().playlist_name.clone();
        if !self.uploads.try_enqueue(playlist_name, Bytes::from(playlist.clone())) {
            self.report.dropped_uploads += 1;
        }
        self.report.playlist = playlist;
    }

    async fn shutdown(mut self) -> PipelineReport {
        let _ = self.drain_video();
        self.drain_audio();

        match self.segmenter.finish() {
            Ok(Some(segment)) => {
                let name = self.record(&segment);
                if !self.uploads.enqueue(name, segment.data).await {
                    warn!("upload worker gone before the last segment");
                }
            }
            Ok(None) => {}
            Err(e) => error!("failed to close last segment: {e}"),
        }

        if self.playlist.config().end_list_on_stop {
            self.playlist.mark_ended();
        }
        let playlist = self.playlist.render_current();
        let playlist_name = self.playlist.config().playlist_name.clone();
        if !self
            .uploads
            .enqueue(playlist_name, Bytes::from(playlist.clone()))
            .await
        {
            warn!("upload worker gone before the final playlist");
        }

        self.report.playlist = playlist;
        self.report.segmenter = self.segmenter.stats();
        self.report
    }
}
