use {
    super::{define::epes_stream_id, errors::MpegTsError},
    crate::bytesio::bytes_writer::BytesWriter,
    byteorder::BigEndian,
    bytes::BytesMut,
};

/*PTS_DTS_flags*/
const PTS_ONLY: u8 = 0x80;
const PTS_AND_DTS: u8 = 0xC0;

/*4-bit prefixes in front of each encoded timestamp*/
const MARKER_PTS_ONLY: u8 = 0x2;
const MARKER_PTS_WITH_DTS: u8 = 0x3;
const MARKER_DTS: u8 = 0x1;

/// Header bytes following PES_packet_length, before any timestamp.
const PES_OPTIONAL_HEADER_SIZE: usize = 3;
const TIMESTAMP_SIZE: usize = 5;

/// Encode a 33-bit 90 kHz timestamp as five marker-tagged bytes.
pub fn write_timestamp(
    writer: &mut BytesWriter,
    marker: u8,
    ts: u64,
) -> Result<(), MpegTsError> {
    writer.write_u8((marker << 4) | ((((ts >> 30) & 0x07) as u8) << 1) | 0x01)?;
    writer.write_u8(((ts >> 22) & 0xFF) as u8)?;
    writer.write_u8(((((ts >> 15) & 0x7F) as u8) << 1) | 0x01)?;
    writer.write_u8(((ts >> 7) & 0xFF) as u8)?;
    writer.write_u8((((ts & 0x7F) as u8) << 1) | 0x01)?;
    Ok(())
}

/// Build a PES header for `payload_len` bytes of elementary stream data.
///
/// `pts` and `dts` are already in the 90 kHz domain; DTS is written only when it
/// differs from PTS. Video streams get an unbounded PES_packet_length of 0, other
/// streams get the exact length when it fits in 16 bits.
pub fn write_pes_header(
    stream_id: u8,
    payload_len: usize,
    pts: u64,
    dts: u64,
) -> Result<BytesMut, MpegTsError> {
    let mut writer = BytesWriter::new();
    let with_dts = dts != pts;
    let header_data_length = if with_dts {
        TIMESTAMP_SIZE * 2
    } else {
        TIMESTAMP_SIZE
    };

    /*packet_start_code_prefix*/
    writer.write(&[0x00, 0x00, 0x01])?;
    /*stream_id*/
    writer.write_u8(stream_id)?;

    /*PES_packet_length*/
    let packet_length = PES_OPTIONAL_HEADER_SIZE + header_data_length + payload_len;
    let packet_length = if stream_id == epes_stream_id::PES_SID_VIDEO || packet_length > 0xFFFF
    {
        0
    } else {
        packet_length as u16
    };
    writer.write_u16::<BigEndian>(packet_length)?;

    /*'10', no scrambling, no priority, no alignment, no copyright, original*/
    writer.write_u8(0x80)?;
    /*PTS_DTS_flags, no other optional fields*/
    writer.write_u8(if with_dts { PTS_AND_DTS } else { PTS_ONLY })?;
    /*PES_header_data_length*/
    writer.write_u8(header_data_length as u8)?;

    if with_dts {
        write_timestamp(&mut writer, MARKER_PTS_WITH_DTS, pts)?;
        write_timestamp(&mut writer, MARKER_DTS, dts)?;
    } else {
        write_timestamp(&mut writer, MARKER_PTS_ONLY, pts)?;
    }

    Ok(writer.extract_current_bytes())
}

/// Inverse of [`write_timestamp`], ignoring marker bits.
#[must_use]
pub fn read_timestamp(bytes: &[u8]) -> Option<u64> {
    let b = bytes.get(..TIMESTAMP_SIZE)?;
    Some(
        (u64::from(b[0] >> 1) & 0x07) << 30
            | u64::from(b[1]) << 22
            | u64::from(b[2] >> 1) << 15
            | u64::from(b[3]) << 7
            | u64::from(b[4] >> 1),
    )
}
