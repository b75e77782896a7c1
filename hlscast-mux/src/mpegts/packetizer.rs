use {
    super::{
        define::{
            PCR_ADAPTATION_SIZE, PCR_SCALE, STUFFING_BYTE, SYNC_BYTE, TIMESTAMP_MASK,
            TS_HEADER_SIZE, TS_PACKET_SIZE, TS_PAYLOAD_SIZE,
        },
        define::us_to_90khz,
        errors::MpegTsError,
        pes,
    },
    crate::bytesio::bytes_writer::BytesWriter,
    bytes::BytesMut,
    std::collections::HashMap,
};

/*adaptation_field_control*/
const AFC_PAYLOAD_ONLY: u8 = 0x01;
const AFC_ADAPTATION_AND_PAYLOAD: u8 = 0x03;

/*adaptation field flags*/
const AF_FLAG_NONE: u8 = 0x00;
const AF_FLAG_PCR: u8 = 0x10;

/// 27 MHz program clock reference split into its 33-bit base and 9-bit extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pcr {
    pub base: u64,
    pub extension: u16,
}

impl Pcr {
    #[must_use]
    pub fn from_us(us: i64) -> Self {
        let ticks = (us.max(0) as u64).wrapping_mul(27);
        Self {
            base: (ticks / PCR_SCALE) & TIMESTAMP_MASK,
            extension: (ticks % PCR_SCALE) as u16,
        }
    }

    #[must_use]
    pub const fn to_27mhz(self) -> u64 {
        self.base * PCR_SCALE + self.extension as u64
    }

    fn to_bytes(self) -> [u8; 6] {
        let base = self.base;
        [
            (base >> 25) as u8,
            (base >> 17) as u8,
            (base >> 9) as u8,
            (base >> 1) as u8,
            (((base & 0x01) as u8) << 7) | 0x7E | ((self.extension >> 8) as u8 & 0x01),
            (self.extension & 0xFF) as u8,
        ]
    }
}

/// Splits sections and PES frames into 188-byte transport packets.
///
/// Continuity counters are kept per PID for the lifetime of the packetizer, so a
/// packetizer reused across segments keeps counting where the previous segment
/// stopped.
pub struct TsPacketizer {
    bytes_writer: BytesWriter,
    continuity_counters: HashMap<u16, u8>,
    packet_count: u64,
}

impl Default for TsPacketizer {
    fn default() -> Self {
        Self::new()
    }
}

impl TsPacketizer {
    #[must_use]
    pub fn new() -> Self {
        Self {
            bytes_writer: BytesWriter::new(),
            continuity_counters: HashMap::new(),
            packet_count: 0,
        }
    }

    /// Packets emitted since creation.
    #[must_use]
    pub const fn packet_count(&self) -> u64 {
        self.packet_count
    }

    /// Counter the next packet on `pid` will carry.
    #[must_use]
    pub fn continuity_counter(&self, pid: u16) -> u8 {
        self.continuity_counters.get(&pid).copied().unwrap_or(0)
    }

    #[must_use]
    pub fn buffered_len(&self) -> usize {
        self.bytes_writer.len()
    }

    /// Take every packet written since the last call.
    pub fn take_data(&mut self) -> BytesMut {
        self.bytes_writer.extract_current_bytes()
    }

    /// Write a PSI section behind a zero pointer_field.
    pub fn write_section(&mut self, pid: u16, section: &[u8]) -> Result<(), MpegTsError> {
        let mut payload = Vec::with_capacity(section.len() + 1);
        /*pointer_field*/
        payload.push(0x00);
        payload.extend_from_slice(section);
        self.write_unit(pid, &payload, None)
    }

    /// Write one access unit as a PES packet.
    ///
    /// When `carries_pcr` is set the first packet gets a PCR sampled from `dts_us`.
    pub fn write_frame(
        &mut self,
        pid: u16,
        stream_id: u8,
        payload: &[u8],
        pts_us: i64,
        dts_us: i64,
        carries_pcr: bool,
    ) -> Result<(), MpegTsError> {
        let header = pes::write_pes_header(
            stream_id,
            payload.len(),
            us_to_90khz(pts_us),
            us_to_90khz(dts_us),
        )?;
        let mut pes_packet = Vec::with_capacity(header.len() + payload.len());
        pes_packet.extend_from_slice(&header);
        pes_packet.extend_from_slice(payload);

        let pcr = carries_pcr.then(|| Pcr::from_us(dts_us));
        self.write_unit(pid, &pes_packet, pcr)
    }

    fn write_unit(&mut self, pid: u16, unit: &[u8], pcr: Option<Pcr>) -> Result<(), MpegTsError> {
        let mut remaining = unit;
        let mut first = true;
        loop {
            let pcr = if first { pcr } else { None };
            let consumed = self.write_packet(pid, first, pcr, remaining)?;
            remaining = &remaining[consumed..];
            first = false;
            if remaining.is_empty() {
                return Ok(());
            }
        }
    }

    /// Emit one packet and return how many payload bytes it consumed.
    fn write_packet(
        &mut self,
        pid: u16,
        payload_unit_start: bool,
        pcr: Option<Pcr>,
        payload: &[u8],
    ) -> Result<usize, MpegTsError> {
        let start_len = self.bytes_writer.len();

        let pcr_size = if pcr.is_some() { PCR_ADAPTATION_SIZE } else { 0 };
        let space = TS_PAYLOAD_SIZE - pcr_size;
        let take = payload.len().min(space);
        let stuffing = space - take;
        /*total adaptation field bytes, length byte included*/
        let adaptation_size = pcr_size + stuffing;

        let continuity_counter = self.continuity_counter(pid);
        self.continuity_counters
            .insert(pid, (continuity_counter + 1) & 0x0F);

        let afc = if adaptation_size > 0 {
            AFC_ADAPTATION_AND_PAYLOAD
        } else {
            AFC_PAYLOAD_ONLY
        };

        /*sync_byte*/
        self.bytes_writer.write_u8(SYNC_BYTE)?;
        /*transport_error_indicator '0', payload_unit_start_indicator, priority '0', PID*/
        self.bytes_writer
            .write_u8((u8::from(payload_unit_start) << 6) | ((pid >> 8) as u8 & 0x1F))?;
        self.bytes_writer.write_u8((pid & 0xFF) as u8)?;
        /*scrambling '00', adaptation_field_control, continuity_counter*/
        self.bytes_writer
            .write_u8((afc << 4) | continuity_counter)?;

        if adaptation_size > 0 {
            /*adaptation_field_length, excluding itself*/
            self.bytes_writer.write_u8((adaptation_size - 1) as u8)?;
            if adaptation_size > 1 {
                match pcr {
                    Some(pcr) => {
                        self.bytes_writer.write_u8(AF_FLAG_PCR)?;
                        self.bytes_writer.write(&pcr.to_bytes())?;
                    }
                    None => self.bytes_writer.write_u8(AF_FLAG_NONE)?,
                }
                let fill = stuffing.min(adaptation_size - 2);
                for _ in 0..fill {
                    self.bytes_writer.write_u8(STUFFING_BYTE)?;
                }
            }
        }

        self.bytes_writer.write(&payload[..take])?;

        debug_assert_eq!(
            self.bytes_writer.len() - start_len,
            TS_PACKET_SIZE,
            "transport packet must be exactly {TS_PACKET_SIZE} bytes"
        );
        debug_assert!(TS_HEADER_SIZE + adaptation_size + take == TS_PACKET_SIZE);

        self.packet_count += 1;
        Ok(take)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mpegts::define::epes_stream_id;

    fn packets(data: &[u8]) -> Vec<&[u8]> {
        assert_eq!(data.len() % TS_PACKET_SIZE, 0);
        data.chunks(TS_PACKET_SIZE).collect()
    }

    fn pid_of(packet: &[u8]) -> u16 {
        (u16::from(packet[1] & 0x1F) << 8) | u16::from(packet[2])
    }

    #[test]
    fn test_pcr_from_us() {
        let pcr = Pcr::from_us(1_000_000);
        assert_eq!(pcr.base, 90_000);
        assert_eq!(pcr.extension, 0);
        assert_eq!(pcr.to_27mhz(), 27_000_000);

        let pcr = Pcr::from_us(1);
        assert_eq!(pcr.base, 0);
        assert_eq!(pcr.extension, 27);
    }

    #[test]
    fn test_pcr_bytes() {
        let pcr = Pcr {
            base: 90_000,
            extension: 0x1FF,
        };
        assert_eq!(pcr.to_bytes(), [0x00, 0x00, 0xAF, 0xC8, 0x7F, 0xFF]);
    }

    #[test]
    fn test_section_single_packet() {
        let mut packetizer = TsPacketizer::new();
        let section = [0xAB; 16];
        packetizer.write_section(0x0000, &section).unwrap();
        let data = packetizer.take_data();
        let packets = packets(&data);
        assert_eq!(packets.len(), 1);
        let p = packets[0];
        assert_eq!(&p[..4], &[0x47, 0x40, 0x00, 0x30]);
        // 184 - 17 payload bytes = 167 adaptation bytes
        assert_eq!(p[4], 166);
        assert_eq!(p[5], AF_FLAG_NONE);
        assert!(p[6..171].iter().all(|&b| b == STUFFING_BYTE));
        assert_eq!(p[171], 0x00);
        assert_eq!(&p[172..], &section);
    }

    #[test]
    fn test_section_spanning_packets() {
        let mut packetizer = TsPacketizer::new();
        let section = vec![0x11; 300];
        packetizer.write_section(0x1000, &section).unwrap();
        let data = packetizer.take_data();
        let packets = packets(&data);
        assert_eq!(packets.len(), 2);
        assert_eq!(packets[0][1] & 0x40, 0x40);
        assert_eq!(packets[1][1] & 0x40, 0x00);
        assert_eq!(packets[0][3], 0x10);
        assert_eq!(packets[1][3], 0x31);
        assert_eq!(pid_of(packets[1]), 0x1000);
    }

    #[test]
    fn test_exact_fit_has_no_adaptation_field() {
        let mut packetizer = TsPacketizer::new();
        packetizer.write_section(0x0000, &[0x22; 183]).unwrap();
        let data = packetizer.take_data();
        assert_eq!(data.len(), TS_PACKET_SIZE);
        assert_eq!(data[3] >> 4, AFC_PAYLOAD_ONLY);
        assert_eq!(data[4], 0x00);
        assert_eq!(data[5], 0x22);
    }

    #[test]
    fn test_one_byte_short_uses_single_byte_adaptation_field() {
        let mut packetizer = TsPacketizer::new();
        packetizer.write_section(0x0000, &[0x22; 182]).unwrap();
        let data = packetizer.take_data();
        assert_eq!(data.len(), TS_PACKET_SIZE);
        assert_eq!(data[3] >> 4, AFC_ADAPTATION_AND_PAYLOAD);
        /*adaptation_field_length 0, then pointer_field*/
        assert_eq!(data[4], 0x00);
        assert_eq!(data[5], 0x00);
        assert_eq!(data[6], 0x22);
    }

    #[test]
    fn test_two_bytes_short_uses_flags_only() {
        let mut packetizer = TsPacketizer::new();
        packetizer.write_section(0x0000, &[0x22; 181]).unwrap();
        let data = packetizer.take_data();
        assert_eq!(data.len(), TS_PACKET_SIZE);
        assert_eq!(data[4], 0x01);
        assert_eq!(data[5], AF_FLAG_NONE);
        assert_eq!(data[6], 0x00);
    }

    #[test]
    fn test_frame_with_pcr() {
        let mut packetizer = TsPacketizer::new();
        let payload = vec![0x55; 1000];
        packetizer
            .write_frame(
                0x0101,
                epes_stream_id::PES_SID_VIDEO,
                &payload,
                1_000_000,
                1_000_000,
                true,
            )
            .unwrap();
        let data = packetizer.take_data();
        let packets = packets(&data);
        // 14 byte PES header + 1000 = 1014; first packet carries 176
        assert_eq!(packets.len(), 6);

        let first = packets[0];
        assert_eq!(&first[..4], &[0x47, 0x41, 0x01, 0x30]);
        assert_eq!(first[4], 7);
        assert_eq!(first[5], AF_FLAG_PCR);
        assert_eq!(&first[6..12], &Pcr::from_us(1_000_000).to_bytes());
        assert_eq!(&first[12..16], &[0x00, 0x00, 0x01, 0xE0]);

        for (i, p) in packets.iter().enumerate().skip(1) {
            assert_eq!(p[1] & 0x40, 0);
            assert_eq!(p[3] & 0x0F, i as u8);
        }
        // 1014 - 176 - 4 * 184 = 102 bytes in the last packet
        let last = packets[5];
        assert_eq!(last[3] >> 4, AFC_ADAPTATION_AND_PAYLOAD);
        assert_eq!(last[4] as usize, 184 - 102 - 1);
        assert_eq!(packetizer.packet_count(), 6);
    }

    #[test]
    fn test_pcr_with_stuffing_in_single_packet() {
        let mut packetizer = TsPacketizer::new();
        packetizer
            .write_frame(0x0101, epes_stream_id::PES_SID_VIDEO, &[0x01; 10], 0, 0, true)
            .unwrap();
        let data = packetizer.take_data();
        assert_eq!(data.len(), TS_PACKET_SIZE);
        // 184 - 24 payload bytes = 160 adaptation bytes
        assert_eq!(data[4], 159);
        assert_eq!(data[5], AF_FLAG_PCR);
        assert!(data[12..164].iter().all(|&b| b == STUFFING_BYTE));
        assert_eq!(&data[164..168], &[0x00, 0x00, 0x01, 0xE0]);
    }

    #[test]
    fn test_continuity_counter_wraps_per_pid() {
        let mut packetizer = TsPacketizer::new();
        for _ in 0..20 {
            packetizer.write_section(0x0000, &[0; 8]).unwrap();
        }
        packetizer.write_section(0x1000, &[0; 8]).unwrap();
        let data = packetizer.take_data();
        let packets = packets(&data);
        for (i, p) in packets[..20].iter().enumerate() {
            assert_eq!(p[3] & 0x0F, (i % 16) as u8);
        }
        assert_eq!(packets[20][3] & 0x0F, 0);
        assert_eq!(packetizer.continuity_counter(0x0000), 4);
        assert_eq!(packetizer.continuity_counter(0x1000), 1);
    }

    #[test]
    fn test_every_size_is_exact() {
        let mut packetizer = TsPacketizer::new();
        for len in 0..600 {
            let payload = vec![0x33; len];
            packetizer
                .write_frame(
                    0x0102,
                    epes_stream_id::PES_SID_AUDIO,
                    &payload,
                    len as i64,
                    len as i64,
                    len % 2 == 0,
                )
                .unwrap();
            let data = packetizer.take_data();
            assert_eq!(data.len() % TS_PACKET_SIZE, 0);
            assert!(data.chunks(TS_PACKET_SIZE).all(|p| p[0] == SYNC_BYTE));
        }
    }
}
