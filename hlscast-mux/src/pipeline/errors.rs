use {super::source::SourceError, crate::mpegts::MpegTsError};

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("source error: {0}")]
    Source(#[from] SourceError),

    #[error("mux error: {0}")]
    Mux(#[from] MpegTsError),

    #[error("pipeline task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}
