use {
    super::{
        crc32,
        define::{epat_pid, epid, MAX_SECTION_LENGTH, PROGRAM_NUMBER},
        errors::{MpegTsError, MpegTsErrorValue},
    },
    crate::bytesio::bytes_writer::BytesWriter,
    byteorder::BigEndian,
    bytes::BytesMut,
};

/// One elementary stream entry of the program map.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PmtStream {
    pub stream_type: u8,
    pub pid: u16,
    /// PES stream_id used when packetizing this stream.
    pub stream_id: u8,
}

#[derive(Debug, Clone)]
pub struct Pmt {
    pub pid: u16,
    pub program_number: u16,
    pub version_number: u8, //5 bits
    pub pcr_pid: u16,       //13 bits
    pub program_info: BytesMut,
    pub streams: Vec<PmtStream>,
}

impl Default for Pmt {
    fn default() -> Self {
        Self::new()
    }
}

impl Pmt {
    #[must_use]
    pub fn new() -> Self {
        Self {
            pid: epid::PMT,
            program_number: PROGRAM_NUMBER,
            version_number: 0,
            pcr_pid: epid::VIDEO,
            program_info: BytesMut::new(),
            streams: Vec::new(),
        }
    }

    #[must_use]
    pub fn stream(&self, pid: u16) -> Option<&PmtStream> {
        self.streams.iter().find(|s| s.pid == pid)
    }
}

pub struct PmtMuxer {
    pub bytes_writer: BytesWriter,
}

impl Default for PmtMuxer {
    fn default() -> Self {
        Self::new()
    }
}

//ITU-T H.222.0 2.4.4.8
impl PmtMuxer {
    #[must_use]
    pub fn new() -> Self {
        Self {
            bytes_writer: BytesWriter::new(),
        }
    }

    pub fn write(&mut self, pmt: &Pmt) -> Result<BytesMut, MpegTsError> {
        let program_info_length = pmt.program_info.len();
        if program_info_length >= 0x400 {
            return Err(MpegTsErrorValue::SectionTooLong(program_info_length).into());
        }

        /*table id*/
        self.bytes_writer.write_u8(epat_pid::PAT_TID_PMS)?;

        let mut tmp_bytes_writer = BytesWriter::new();
        /*program_number*/
        tmp_bytes_writer.write_u16::<BigEndian>(pmt.program_number)?;
        /*reserved '11', version_number, current_next_indicator '1'*/
        tmp_bytes_writer.write_u8(0xC1 | ((pmt.version_number & 0x1F) << 1))?;
        /*section_number*/
        tmp_bytes_writer.write_u8(0x00)?;
        /*last_section_number*/
        tmp_bytes_writer.write_u8(0x00)?;
        /*PCR_PID*/
        tmp_bytes_writer.write_u16::<BigEndian>(0xE000 | (pmt.pcr_pid & 0x1FFF))?;
        /*program_info_length*/
        tmp_bytes_writer.write_u16::<BigEndian>(0xF000 | program_info_length as u16)?;
        tmp_bytes_writer.write(&pmt.program_info[..])?;

        for stream in &pmt.streams {
            /*stream_type*/
            tmp_bytes_writer.write_u8(stream.stream_type)?;
            /*elementary_PID*/
            tmp_bytes_writer.write_u16::<BigEndian>(0xE000 | (stream.pid & 0x1FFF))?;
            /*ES_info_length*/
            tmp_bytes_writer.write_u16::<BigEndian>(0xF000)?;
        }

        /*section_length*/
        let length = tmp_bytes_writer.len() + 4;
        if length > MAX_SECTION_LENGTH {
            let _ = self.bytes_writer.extract_current_bytes();
            return Err(MpegTsErrorValue::SectionTooLong(length).into());
        }
        self.bytes_writer
            .write_u16::<BigEndian>(0xB000 | length as u16)?;

        self.bytes_writer
            .write(&tmp_bytes_writer.extract_current_bytes()[..])?;

        /*crc32*/
        let crc32_value = crc32::gen_crc32(0xffff_ffff, self.bytes_writer.get_current_bytes());
        self.bytes_writer.write_u32::<BigEndian>(crc32_value)?;

        Ok(self.bytes_writer.extract_current_bytes())
    }
}
