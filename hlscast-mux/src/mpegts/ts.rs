use {
    super::{
        define::epid,
        errors::{MpegTsError, MpegTsErrorValue},
        packetizer::TsPacketizer,
        pat::{Pat, PatMuxer},
        pmt::{Pmt, PmtMuxer, PmtStream},
    },
    bytes::BytesMut,
};

const MAX_STREAMS: usize = 4;

/// Single-program transport stream muxer.
pub struct TsMuxer {
    pat: Pat,
    pmt: Pmt,
    pat_muxer: PatMuxer,
    pmt_muxer: PmtMuxer,
    packetizer: TsPacketizer,
}

impl Default for TsMuxer {
    fn default() -> Self {
        Self::new()
    }
}

impl TsMuxer {
    #[must_use]
    pub fn new() -> Self {
        Self {
            pat: Pat::new(),
            pmt: Pmt::new(),
            pat_muxer: PatMuxer::new(),
            pmt_muxer: PmtMuxer::new(),
            packetizer: TsPacketizer::new(),
        }
    }

    /// Declare an elementary stream in the program map. Re-adding a PID updates it.
    pub fn add_stream(&mut self, pid: u16, stream_type: u8, stream_id: u8) -> Result<(), MpegTsError> {
        let stream = PmtStream {
            stream_type,
            pid,
            stream_id,
        };
        if let Some(existing) = self.pmt.streams.iter_mut().find(|s| s.pid == pid) {
            *existing = stream;
            return Ok(());
        }
        if self.pmt.streams.len() >= MAX_STREAMS {
            return Err(MpegTsErrorValue::StreamCountExceeded.into());
        }
        self.pmt.streams.push(stream);
        Ok(())
    }

    #[must_use]
    pub fn streams(&self) -> &[PmtStream] {
        &self.pmt.streams
    }

    /// Rebuild and emit PAT then PMT.
    pub fn write_psi(&mut self) -> Result<(), MpegTsError> {
        let pat = self.pat_muxer.write(&self.pat)?;
        self.packetizer.write_section(epid::PAT, &pat)?;
        let pmt = self.pmt_muxer.write(&self.pmt)?;
        self.packetizer.write_section(self.pmt.pid, &pmt)?;
        Ok(())
    }

    /// Packetize one access unit of the stream registered on `pid`.
    pub fn write(
        &mut self,
        pid: u16,
        payload: &[u8],
        pts_us: i64,
        dts_us: i64,
    ) -> Result<(), MpegTsError> {
        let stream_id = self
            .pmt
            .stream(pid)
            .map(|s| s.stream_id)
            .ok_or(MpegTsErrorValue::StreamNotFound(pid))?;
        let carries_pcr = pid == self.pmt.pcr_pid;
        self.packetizer
            .write_frame(pid, stream_id, payload, pts_us, dts_us, carries_pcr)
    }

    /// Bytes buffered since the last take.
    #[must_use]
    pub fn buffered_len(&self) -> usize {
        self.packetizer.buffered_len()
    }

    pub fn take_data(&mut self) -> BytesMut {
        self.packetizer.take_data()
    }

    #[must_use]
    pub const fn packet_count(&self) -> u64 {
        self.packetizer.packet_count()
    }

    #[must_use]
    pub fn continuity_counter(&self, pid: u16) -> u8 {
        self.packetizer.continuity_counter(pid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mpegts::define::{epes_stream_id, epsi_stream_type, TS_PACKET_SIZE};

    fn av_muxer() -> TsMuxer {
        let mut muxer = TsMuxer::new();
        muxer
            .add_stream(
                epid::VIDEO,
                epsi_stream_type::PSI_STREAM_H265,
                epes_stream_id::PES_SID_VIDEO,
            )
            .unwrap();
        muxer
            .add_stream(
                epid::AUDIO,
                epsi_stream_type::PSI_STREAM_AAC,
                epes_stream_id::PES_SID_AUDIO,
            )
            .unwrap();
        muxer
    }

    #[test]
    fn test_write_psi_emits_pat_then_pmt() {
        let mut muxer = av_muxer();
        muxer.write_psi().unwrap();
        let data = muxer.take_data();
        assert_eq!(data.len(), 2 * TS_PACKET_SIZE);
        assert_eq!(&data[1..3], &[0x40, 0x00]);
        assert_eq!(&data[TS_PACKET_SIZE + 1..TS_PACKET_SIZE + 3], &[0x50, 0x00]);
        assert!(muxer.take_data().is_empty());
    }

    #[test]
    fn test_write_unknown_pid() {
        let mut muxer = av_muxer();
        let err = muxer.write(0x0200, &[0; 4], 0, 0).unwrap_err();
        assert!(matches!(err.value, MpegTsErrorValue::StreamNotFound(0x0200)));
    }

    #[test]
    fn test_only_video_carries_pcr() {
        let mut muxer = av_muxer();
        muxer.write(epid::VIDEO, &[0; 4], 0, 0).unwrap();
        muxer.write(epid::AUDIO, &[0; 4], 0, 0).unwrap();
        let data = muxer.take_data();
        let (video, audio) = data.split_at(TS_PACKET_SIZE);
        assert_eq!(video[5] & 0x10, 0x10);
        assert_eq!(audio[5] & 0x10, 0x00);
    }

    #[test]
    fn test_add_stream_updates_in_place() {
        let mut muxer = av_muxer();
        muxer
            .add_stream(
                epid::VIDEO,
                epsi_stream_type::PSI_STREAM_H264,
                epes_stream_id::PES_SID_VIDEO,
            )
            .unwrap();
        assert_eq!(muxer.streams().len(), 2);
        assert_eq!(muxer.streams()[0].stream_type, 0x1B);
    }

    #[test]
    fn test_counters_survive_take_data() {
        let mut muxer = av_muxer();
        muxer.write_psi().unwrap();
        let _ = muxer.take_data();
        muxer.write_psi().unwrap();
        let data = muxer.take_data();
        assert_eq!(data[3] & 0x0F, 1);
        assert_eq!(muxer.continuity_counter(epid::PAT), 2);
        assert_eq!(muxer.packet_count(), 4);
    }
}
