#![allow(dead_code)]

use hlscast_mux::{
    codec::{AudioNormalizer, VideoCodec, VideoNormalizer},
    mpegts::crc32::gen_crc32,
    AccessUnit,
};
use std::collections::HashMap;

pub const PACKET: usize = 188;

pub const VPS: [u8; 6] = [0x40, 0x01, 0x0C, 0x01, 0xFF, 0xFF];
pub const SPS: [u8; 6] = [0x42, 0x01, 0x01, 0x01, 0x60, 0x00];
pub const PPS: [u8; 4] = [0x44, 0x01, 0xC1, 0x72];

#[derive(Debug, Clone)]
pub struct Packet<'a> {
    pub pid: u16,
    pub pusi: bool,
    pub cc: u8,
    pub pcr: Option<u64>,
    pub payload: &'a [u8],
}

pub fn parse_packets(data: &[u8]) -> Vec<Packet<'_>> {
    assert_eq!(data.len() % PACKET, 0, "segment is not a whole number of packets");
    data.chunks(PACKET)
        .map(|p| {
            assert_eq!(p[0], 0x47, "lost sync");
            let pid = (u16::from(p[1] & 0x1F) << 8) | u16::from(p[2]);
            let afc = (p[3] >> 4) & 0x03;
            let mut offset = 4;
            let mut pcr = None;
            if afc & 0x02 != 0 {
                let len = p[4] as usize;
                if len > 0 && p[5] & 0x10 != 0 {
                    let b = &p[6..12];
                    let base = (u64::from(b[0]) << 25)
                        | (u64::from(b[1]) << 17)
                        | (u64::from(b[2]) << 9)
                        | (u64::from(b[3]) << 1)
                        | u64::from(b[4] >> 7);
                    let ext = (u64::from(b[4] & 0x01) << 8) | u64::from(b[5]);
                    pcr = Some(base * 300 + ext);
                }
                offset += 1 + len;
            }
            Packet {
                pid,
                pusi: p[1] & 0x40 != 0,
                cc: p[3] & 0x0F,
                pcr,
                payload: &p[offset..],
            }
        })
        .collect()
}

/// A PES packet reassembled from transport packets.
#[derive(Debug, Clone)]
pub struct Pes {
    pub pid: u16,
    pub stream_id: u8,
    pub pts: u64,
    pub dts: Option<u64>,
    pub payload: Vec<u8>,
}

fn read_ts(b: &[u8]) -> u64 {
    (u64::from(b[0] >> 1) & 0x07) << 30
        | u64::from(b[1]) << 22
        | u64::from(b[2] >> 1) << 15
        | u64::from(b[3]) << 7
        | u64::from(b[4] >> 1)
}

fn finish_pes(pid: u16, buf: Vec<u8>) -> Pes {
    assert_eq!(&buf[..3], &[0, 0, 1], "missing PES start code");
    let flags = buf[7];
    let header_len = buf[8] as usize;
    let pts = read_ts(&buf[9..14]);
    let dts = (flags & 0x40 != 0).then(|| read_ts(&buf[14..19]));
    Pes {
        pid,
        stream_id: buf[3],
        pts,
        dts,
        payload: buf[9 + header_len..].to_vec(),
    }
}

/// Reassemble every PES in `data`, in stream order.
pub fn parse_pes(data: &[u8]) -> Vec<Pes> {
    let mut open: HashMap<u16, Vec<u8>> = HashMap::new();
    let mut done: Vec<(usize, Pes)> = Vec::new();
    let mut started: HashMap<u16, usize> = HashMap::new();
    for (index, packet) in parse_packets(data).into_iter().enumerate() {
        if packet.pid == 0x0000 || packet.pid == 0x1000 {
            continue;
        }
        if packet.pusi {
            if let Some(buf) = open.remove(&packet.pid) {
                done.push((started[&packet.pid], finish_pes(packet.pid, buf)));
            }
            started.insert(packet.pid, index);
            open.insert(packet.pid, packet.payload.to_vec());
        } else if let Some(buf) = open.get_mut(&packet.pid) {
            buf.extend_from_slice(packet.payload);
        }
    }
    for (pid, buf) in open {
        done.push((started[&pid], finish_pes(pid, buf)));
    }
    done.sort_by_key(|(index, _)| *index);
    done.into_iter().map(|(_, pes)| pes).collect()
}

/// Section bytes following the pointer field of a single-packet PSI section.
pub fn section(packet: &Packet<'_>) -> Vec<u8> {
    let pointer = packet.payload[0] as usize;
    let body = &packet.payload[1 + pointer..];
    let length = (((u16::from(body[1]) & 0x0F) << 8) | u16::from(body[2])) as usize;
    body[..3 + length].to_vec()
}

pub fn section_crc_ok(section: &[u8]) -> bool {
    let (body, crc) = section.split_at(section.len() - 4);
    gen_crc32(0xffff_ffff, body) == u32::from_be_bytes([crc[0], crc[1], crc[2], crc[3]])
}

pub fn annexb(nalus: &[&[u8]]) -> Vec<u8> {
    let mut out = Vec::new();
    for n in nalus {
        out.extend_from_slice(&[0, 0, 0, 1]);
        out.extend_from_slice(n);
    }
    out
}

pub fn h265_config() -> Vec<u8> {
    annexb(&[&VPS, &SPS, &PPS])
}

/// Length-prefixed H.265 frame as a hardware encoder would emit it.
pub fn h265_frame(key: bool, index: u32) -> Vec<u8> {
    let nal = if key {
        vec![0x26, 0x01, 0xAF, (index & 0xFF) as u8, 0x55, 0x55]
    } else {
        vec![0x02, 0x01, 0xD0, (index & 0xFF) as u8, 0x33]
    };
    let mut out = (nal.len() as u32).to_be_bytes().to_vec();
    out.extend_from_slice(&nal);
    out
}

/// Timeline of normalized units: 30 fps video with a keyframe every `gop` frames
/// and 48 kHz / 1024-sample AAC, merged in presentation order.
pub fn av_units(seconds: i64, gop: i64) -> Vec<AccessUnit> {
    let mut video = VideoNormalizer::new(VideoCodec::H265);
    video.update_config(&h265_config());
    let audio = AudioNormalizer::new(48_000, 2);

    let mut units = Vec::new();
    let frames = seconds * 30;
    for i in 0..frames {
        let pts = i * 1_000_000 / 30;
        units.push(video.normalize_unit(&h265_frame(i % gop == 0, i as u32), pts, i % gop == 0));
    }
    let blocks = seconds * 48_000 / 1024;
    for i in 0..blocks {
        let pts = i * 1024 * 1_000_000 / 48_000;
        units.push(audio.normalize_unit(&[0x21, 0x10, 0x04, (i & 0xFF) as u8], pts));
    }
    units.sort_by_key(|u| u.pts_us);
    units
}
