pub const TS_PACKET_SIZE: usize = 188;
pub const TS_HEADER_SIZE: usize = 4;
pub const TS_PAYLOAD_SIZE: usize = TS_PACKET_SIZE - TS_HEADER_SIZE;
pub const SYNC_BYTE: u8 = 0x47;
pub const STUFFING_BYTE: u8 = 0xFF;

/// Adaptation field length byte + flags byte + 6 byte PCR.
pub const PCR_ADAPTATION_SIZE: usize = 8;

pub const PROGRAM_NUMBER: u16 = 1;
pub const TRANSPORT_STREAM_ID: u16 = 1;

/// Longest section_length a PSI section may declare.
pub const MAX_SECTION_LENGTH: usize = 1021;

pub mod epid {
    pub const PAT: u16 = 0x0000;
    pub const PMT: u16 = 0x1000;
    pub const VIDEO: u16 = 0x0101;
    pub const AUDIO: u16 = 0x0102;
    pub const NULL: u16 = 0x1FFF;
}

pub mod epat_pid {
    pub const PAT_TID_PAS: u8 = 0x00;
    pub const PAT_TID_PMS: u8 = 0x02;
}

pub mod epsi_stream_type {
    pub const PSI_STREAM_AAC: u8 = 0x0F;
    pub const PSI_STREAM_H264: u8 = 0x1B;
    pub const PSI_STREAM_H265: u8 = 0x24;
}

pub mod epes_stream_id {
    pub const PES_SID_AUDIO: u8 = 0xC0;
    pub const PES_SID_VIDEO: u8 = 0xE0;
}

/// PTS/DTS clock.
pub const CLOCK_90KHZ: i64 = 90_000;

/// PCR = 90 kHz base * 300 + extension.
pub const PCR_SCALE: u64 = 300;

pub const TIMESTAMP_MASK: u64 = 0x1_FFFF_FFFF;

/// Microseconds to the 33-bit 90 kHz timestamp domain.
#[must_use]
pub const fn us_to_90khz(us: i64) -> u64 {
    ((us * CLOCK_90KHZ / 1_000_000) as u64) & TIMESTAMP_MASK
}
