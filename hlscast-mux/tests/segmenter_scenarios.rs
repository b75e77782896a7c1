mod common;

use common::*;
use hlscast_mux::{
    codec::VideoCodec,
    hls::{PlaylistBuilder, PlaylistConfig},
    mpegts::define::epid,
    segmenter::{Segment, Segmenter, SegmenterConfig},
    MediaKind,
};
use std::collections::HashMap;

const FRAME_SECS: f64 = 1.0 / 30.0;

fn run(units: Vec<hlscast_mux::AccessUnit>) -> Vec<Segment> {
    let mut segmenter =
        Segmenter::new(SegmenterConfig::default(), VideoCodec::H265, true).unwrap();
    let mut segments = Vec::new();
    for unit in units {
        match unit.kind {
            MediaKind::Video => {
                if let Some(segment) = segmenter.push_video(unit).unwrap() {
                    segments.push(segment);
                }
            }
            MediaKind::Audio => segmenter.push_audio(unit).unwrap(),
        }
        if let Some(segment) = segmenter.enforce_duration_ceiling().unwrap() {
            segments.push(segment);
        }
    }
    segments.extend(segmenter.finish().unwrap());
    segments
}

#[test]
fn test_three_second_gop_yields_target_duration_segments() {
    let segments = run(av_units(12, 90));
    assert_eq!(segments.len(), 4);

    for (i, segment) in segments.iter().enumerate() {
        assert_eq!(segment.sequence, i as u64);
        assert_eq!(segment.name(), format!("seg_{i:05}.ts"));
    }
    // the last one is closed by finish, not by a keyframe
    for segment in &segments[..3] {
        assert!(
            segment.duration >= 3.0 && segment.duration <= 3.0 + FRAME_SECS,
            "duration {}",
            segment.duration
        );
    }
}

#[test]
fn test_two_second_gop_cuts_on_first_keyframe_past_target() {
    let segments = run(av_units(12, 60));
    let durations: Vec<f64> = segments.iter().map(|s| s.duration).collect();
    for d in &durations[..durations.len() - 1] {
        assert!(*d >= 3.0, "segment shorter than target: {d}");
        assert!((*d - 4.0).abs() < 1e-6, "keyframe aligned cut expected: {d}");
    }
    let sequences: Vec<u64> = segments.iter().map(|s| s.sequence).collect();
    assert_eq!(sequences, (0..segments.len() as u64).collect::<Vec<_>>());
}

#[test]
fn test_every_packet_is_188_bytes_with_sync() {
    for segment in run(av_units(7, 90)) {
        assert_eq!(segment.data.len() % PACKET, 0);
        for packet in segment.data.chunks(PACKET) {
            assert_eq!(packet.len(), PACKET);
            assert_eq!(packet[0], 0x47);
        }
    }
}

#[test]
fn test_segments_start_with_pat_pmt_keyframe_and_crc_checks() {
    for segment in run(av_units(7, 90)) {
        let packets = parse_packets(&segment.data);
        assert_eq!(packets[0].pid, epid::PAT);
        assert_eq!(packets[1].pid, epid::PMT);
        assert_eq!(packets[2].pid, epid::VIDEO);
        assert!(packets[2].pcr.is_some());

        let pat = section(&packets[0]);
        let pmt = section(&packets[1]);
        assert!(section_crc_ok(&pat));
        assert!(section_crc_ok(&pmt));
        assert_eq!(pat[0], 0x00);
        assert_eq!(pmt[0], 0x02);
    }
}

#[test]
fn test_parameter_sets_present_once_after_keyframe_start_code() {
    let config = h265_config();
    for segment in run(av_units(7, 90)) {
        let pes = parse_pes(&segment.data);
        let first = &pes[0];
        assert_eq!(first.pid, epid::VIDEO);
        assert!(first.payload.starts_with(&config));
        let occurrences = first
            .payload
            .windows(config.len())
            .filter(|w| *w == &config[..])
            .count();
        assert_eq!(occurrences, 1);
    }
}

#[test]
fn test_continuity_counters_across_segments() {
    let segments = run(av_units(10, 90));
    let mut last: HashMap<u16, u8> = HashMap::new();
    for segment in &segments {
        for packet in parse_packets(&segment.data) {
            if let Some(prev) = last.get(&packet.pid) {
                assert_eq!(packet.cc, (prev + 1) % 16, "pid {:#06x}", packet.pid);
            } else {
                assert_eq!(packet.cc, 0);
            }
            last.insert(packet.pid, packet.cc);
        }
    }
    assert!(last.contains_key(&epid::AUDIO));
}

#[test]
fn test_timestamps_strictly_increase_per_stream() {
    let segments = run(av_units(10, 90));
    let mut last_pts: HashMap<u16, u64> = HashMap::new();
    for segment in &segments {
        for pes in parse_pes(&segment.data) {
            if let Some(prev) = last_pts.get(&pes.pid) {
                assert!(pes.pts > *prev, "pid {:#06x}: {} <= {}", pes.pid, pes.pts, prev);
            }
            if let Some(dts) = pes.dts {
                assert!(dts <= pes.pts);
            }
            last_pts.insert(pes.pid, pes.pts);
        }
    }
    assert_eq!(last_pts.len(), 2);
}

#[test]
fn test_audio_only_written_inside_segments() {
    let mut units = av_units(4, 90);
    // drop the first keyframe so the run anchors at 3.0s
    units.retain(|u| !(u.kind == MediaKind::Video && u.pts_us == 0));
    let segments = run(units);
    let first = parse_pes(&segments[0].data);
    assert_eq!(first[0].pid, epid::VIDEO);
    assert_eq!(first[0].pts, 0);
    // audio kept from the 500 ms before the anchor
    let audio: Vec<_> = first.iter().filter(|p| p.pid == epid::AUDIO).collect();
    assert!(!audio.is_empty());
    assert!(audio.len() < 4 * 48_000 / 1024);
}

#[test]
fn test_playlist_tracks_segmenter_output() {
    let mut playlist = PlaylistBuilder::new(PlaylistConfig::default());
    let segments = run(av_units(27, 90));
    assert_eq!(segments.len(), 9);
    for segment in &segments[..8] {
        playlist.add(segment.name(), segment.duration);
    }
    let m3u8 = playlist.render_current();
    assert_eq!(playlist.len(), 6);
    assert!(m3u8.contains("#EXT-X-MEDIA-SEQUENCE:2\n"));
    assert!(m3u8.contains("#EXT-X-TARGETDURATION:3\n"));
    let first = m3u8.lines().find(|l| l.ends_with(".ts")).unwrap();
    assert_eq!(first, segments[2].name());
}
