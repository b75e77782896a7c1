use crate::bytesio::bytes_errors::BytesWriteError;

#[derive(Debug, thiserror::Error)]
pub enum MpegTsErrorValue {
    #[error("bytes write error: {0}")]
    BytesWriteError(BytesWriteError),

    #[error("section too long: {0} bytes")]
    SectionTooLong(usize),

    #[error("stream count exceeded")]
    StreamCountExceeded,

    #[error("stream not found: pid {0:#06x}")]
    StreamNotFound(u16),
}

#[derive(Debug, thiserror::Error)]
#[error("{value}")]
pub struct MpegTsError {
    pub value: MpegTsErrorValue,
}

impl From<MpegTsErrorValue> for MpegTsError {
    fn from(value: MpegTsErrorValue) -> Self {
        Self { value }
    }
}

impl From<BytesWriteError> for MpegTsError {
    fn from(error: BytesWriteError) -> Self {
        Self {
            value: MpegTsErrorValue::BytesWriteError(error),
        }
    }
}
