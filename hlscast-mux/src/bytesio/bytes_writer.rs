use {
    super::bytes_errors::{BytesWriteError, BytesWriteErrorValue},
    byteorder::{ByteOrder, WriteBytesExt},
    bytes::{buf::Writer, BufMut, BytesMut},
    std::io::Write,
};

/// Growable big/little-endian field writer over a `BytesMut`.
pub struct BytesWriter {
    writer: Writer<BytesMut>,
    max_len: Option<usize>,
}

impl Default for BytesWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl BytesWriter {
    #[must_use]
    pub fn new() -> Self {
        Self {
            writer: BytesMut::new().writer(),
            max_len: None,
        }
    }

    /// Writer that refuses to grow past `max_len` bytes.
    #[must_use]
    pub fn with_limit(max_len: usize) -> Self {
        Self {
            writer: BytesMut::with_capacity(max_len).writer(),
            max_len: Some(max_len),
        }
    }

    fn check(&self, additional: usize) -> Result<(), BytesWriteError> {
        if let Some(max) = self.max_len {
            let current = self.len();
            if current + additional > max {
                return Err(BytesWriteErrorValue::BufferOverflow {
                    current,
                    additional,
                    max,
                }
                .into());
            }
        }
        Ok(())
    }

    pub fn write_u8(&mut self, byte: u8) -> Result<(), BytesWriteError> {
        self.check(1)?;
        self.writer.write_u8(byte)?;
        Ok(())
    }

    pub fn write_u16<T: ByteOrder>(&mut self, value: u16) -> Result<(), BytesWriteError> {
        self.check(2)?;
        self.writer.write_u16::<T>(value)?;
        Ok(())
    }

    pub fn write_u32<T: ByteOrder>(&mut self, value: u32) -> Result<(), BytesWriteError> {
        self.check(4)?;
        self.writer.write_u32::<T>(value)?;
        Ok(())
    }

    pub fn write(&mut self, buf: &[u8]) -> Result<(), BytesWriteError> {
        self.check(buf.len())?;
        self.writer.write_all(buf)?;
        Ok(())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.writer.get_ref().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.writer.get_ref().is_empty()
    }

    #[must_use]
    pub fn get_current_bytes(&self) -> &[u8] {
        &self.writer.get_ref()[..]
    }

    /// Take everything written so far, leaving the writer empty.
    pub fn extract_current_bytes(&mut self) -> BytesMut {
        self.writer.get_mut().split()
    }
}
