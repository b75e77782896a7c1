use {
    super::{
        crc32,
        define::{epat_pid, epid, MAX_SECTION_LENGTH, PROGRAM_NUMBER, TRANSPORT_STREAM_ID},
        errors::{MpegTsError, MpegTsErrorValue},
    },
    crate::bytesio::bytes_writer::BytesWriter,
    byteorder::BigEndian,
    bytes::BytesMut,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PatProgram {
    pub program_number: u16,
    pub pmt_pid: u16,
}

#[derive(Debug, Clone)]
pub struct Pat {
    pub transport_stream_id: u16,
    pub version_number: u8, //5 bits
    pub programs: Vec<PatProgram>,
}

impl Default for Pat {
    fn default() -> Self {
        Self::new()
    }
}

impl Pat {
    /// Single-program table pointing at the PMT.
    #[must_use]
    pub fn new() -> Self {
        Self {
            transport_stream_id: TRANSPORT_STREAM_ID,
            version_number: 0,
            programs: vec![PatProgram {
                program_number: PROGRAM_NUMBER,
                pmt_pid: epid::PMT,
            }],
        }
    }
}

pub struct PatMuxer {
    pub bytes_writer: BytesWriter,
}

impl Default for PatMuxer {
    fn default() -> Self {
        Self::new()
    }
}

//ITU-T H.222.0 2.4.4.3
impl PatMuxer {
    #[must_use]
    pub fn new() -> Self {
        Self {
            bytes_writer: BytesWriter::new(),
        }
    }

    pub fn write(&mut self, pat: &Pat) -> Result<BytesMut, MpegTsError> {
        /*section length: header after length (5) + programs + crc32*/
        let length = 5 + pat.programs.len() * 4 + 4;
        if length > MAX_SECTION_LENGTH {
            return Err(MpegTsErrorValue::SectionTooLong(length).into());
        }

        /*table id*/
        self.bytes_writer.write_u8(epat_pid::PAT_TID_PAS)?;
        /*section_syntax_indicator '1', '0', reserved '11', section length*/
        self.bytes_writer
            .write_u16::<BigEndian>(0xB000 | length as u16)?;
        /*transport_stream_id*/
        self.bytes_writer
            .write_u16::<BigEndian>(pat.transport_stream_id)?;
        /*reserved '11', version_number, current_next_indicator '1'*/
        self.bytes_writer
            .write_u8(0xC1 | ((pat.version_number & 0x1F) << 1))?;
        /*section_number*/
        /*last_section_number*/
        self.bytes_writer.write_u16::<BigEndian>(0x00)?;

        for program in &pat.programs {
            /*program number*/
            self.bytes_writer
                .write_u16::<BigEndian>(program.program_number)?;
            /*reserved '111', PID*/
            self.bytes_writer
                .write_u16::<BigEndian>(0xE000 | (program.pmt_pid & 0x1FFF))?;
        }

        /*crc32*/
        let crc32_value = crc32::gen_crc32(0xffff_ffff, self.bytes_writer.get_current_bytes());
        self.bytes_writer.write_u32::<BigEndian>(crc32_value)?;

        Ok(self.bytes_writer.extract_current_bytes())
    }
}
