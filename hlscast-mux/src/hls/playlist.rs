use {
    serde::{Deserialize, Serialize},
    std::{collections::VecDeque, fmt::Write},
};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaylistConfig {
    /// Segments kept in the sliding window.
    pub window_size: usize,
    /// Lower bound for `#EXT-X-TARGETDURATION`, in seconds.
    pub min_target_duration: u64,
    pub independent_segments: bool,
    /// Emit `#EXT-X-PLAYLIST-TYPE:EVENT`.
    pub event_playlist: bool,
    pub playlist_name: String,
    /// Append `#EXT-X-ENDLIST` to the playlist published on stop.
    pub end_list_on_stop: bool,
}

impl Default for PlaylistConfig {
    fn default() -> Self {
        Self {
            window_size: 6,
            min_target_duration: 3,
            independent_segments: true,
            event_playlist: false,
            playlist_name: "live.m3u8".to_string(),
            end_list_on_stop: true,
        }
    }
}

/// Playlist line for one segment.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaylistEntry {
    pub sequence: u64,
    pub name: String,
    pub duration: f64,
}

/// Sliding-window media playlist.
#[derive(Debug, Clone)]
pub struct PlaylistBuilder {
    config: PlaylistConfig,
    entries: VecDeque<PlaylistEntry>,
    total_added: u64,
    ended: bool,
}

impl PlaylistBuilder {
    #[must_use]
    pub fn new(config: PlaylistConfig) -> Self {
        Self {
            entries: VecDeque::with_capacity(config.window_size + 1),
            config,
            total_added: 0,
            ended: false,
        }
    }

    #[must_use]
    pub const fn config(&self) -> &PlaylistConfig {
        &self.config
    }

    pub fn add(&mut self, name: impl Into<String>, duration: f64) {
        self.entries.push_back(PlaylistEntry {
            sequence: self.total_added,
            name: name.into(),
            duration,
        });
        self.total_added += 1;

        while self.entries.len() > self.config.window_size.max(1) {
            self.entries.pop_front();
        }
    }

    #[must_use]
    pub fn entries(&self) -> &VecDeque<PlaylistEntry> {
        &self.entries
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Sequence number of the oldest retained entry.
    #[must_use]
    pub fn media_sequence(&self) -> u64 {
        self.total_added - self.entries.len() as u64
    }

    /// Seconds, rounded up from the longest entry in the window.
    #[must_use]
    pub fn target_duration(&self) -> u64 {
        let longest = self
            .entries
            .iter()
            .map(|e| e.duration)
            .fold(0.0_f64, f64::max);
        (longest.ceil() as u64).max(self.config.min_target_duration)
    }

    pub fn mark_ended(&mut self) {
        self.ended = true;
    }

    #[must_use]
    pub const fn is_ended(&self) -> bool {
        self.ended
    }

    /// Render with the window's own starting sequence.
    #[must_use]
    pub fn render_current(&self) -> String {
        self.render(self.media_sequence())
    }

    #[must_use]
    pub fn render(&self, media_sequence_start: u64) -> String {
        let mut m3u8_content = String::new();

        m3u8_content.push_str("#EXTM3U\n");
        m3u8_content.push_str("#EXT-X-VERSION:3\n");
        if self.config.independent_segments {
            m3u8_content.push_str("#EXT-X-INDEPENDENT-SEGMENTS\n");
        }
        let _ = writeln!(m3u8_content, "#EXT-X-TARGETDURATION:{}", self.target_duration());
        if self.config.event_playlist {
            m3u8_content.push_str("#EXT-X-PLAYLIST-TYPE:EVENT\n");
        }
        let _ = writeln!(m3u8_content, "#EXT-X-MEDIA-SEQUENCE:{media_sequence_start}");

        for entry in &self.entries {
            let _ = writeln!(m3u8_content, "#EXTINF:{:.3},", entry.duration);
            let _ = writeln!(m3u8_content, "{}", entry.name);
        }

        if self.ended {
            m3u8_content.push_str("#EXT-X-ENDLIST\n");
        }

        m3u8_content
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segmenter::segment_name;

    fn builder(window_size: usize) -> PlaylistBuilder {
        PlaylistBuilder::new(PlaylistConfig {
            window_size,
            ..PlaylistConfig::default()
        })
    }

    #[test]
    fn test_render_exact() {
        let mut playlist = builder(6);
        playlist.add("seg_00000.ts", 3.0);
        playlist.add("seg_00001.ts", 3.0333);
        assert_eq!(
            playlist.render_current(),
            "#EXTM3U\n\
             #EXT-X-VERSION:3\n\
             #EXT-X-INDEPENDENT-SEGMENTS\n\
             #EXT-X-TARGETDURATION:4\n\
             #EXT-X-MEDIA-SEQUENCE:0\n\
             #EXTINF:3.000,\n\
             seg_00000.ts\n\
             #EXTINF:3.033,\n\
             seg_00001.ts\n"
        );
    }

    #[test]
    fn test_window_evicts_oldest() {
        let mut playlist = builder(6);
        for seq in 0..8 {
            playlist.add(segment_name(seq), 3.0);
        }
        assert_eq!(playlist.len(), 6);
        assert_eq!(playlist.media_sequence(), 2);

        let m3u8 = playlist.render_current();
        assert!(m3u8.contains("#EXT-X-MEDIA-SEQUENCE:2\n"));
        assert!(!m3u8.contains("seg_00001.ts"));
        let first = m3u8.lines().find(|l| l.ends_with(".ts")).unwrap();
        assert_eq!(first, "seg_00002.ts");
        assert_eq!(m3u8.matches("#EXTINF").count(), 6);
    }

    #[test]
    fn test_target_duration_floor() {
        let mut playlist = builder(6);
        assert_eq!(playlist.target_duration(), 3);
        playlist.add("a.ts", 1.2);
        assert_eq!(playlist.target_duration(), 3);
        playlist.add("b.ts", 5.01);
        assert_eq!(playlist.target_duration(), 6);
    }

    #[test]
    fn test_ended_and_event() {
        let mut playlist = PlaylistBuilder::new(PlaylistConfig {
            event_playlist: true,
            independent_segments: false,
            ..PlaylistConfig::default()
        });
        playlist.add("seg_00000.ts", 2.5);
        playlist.mark_ended();
        let m3u8 = playlist.render_current();
        assert!(m3u8.contains("#EXT-X-PLAYLIST-TYPE:EVENT\n"));
        assert!(!m3u8.contains("INDEPENDENT-SEGMENTS"));
        assert!(m3u8.ends_with("#EXT-X-ENDLIST\n"));
    }

    #[test]
    fn test_render_is_deterministic() {
        let mut playlist = builder(3);
        for seq in 0..5 {
            playlist.add(segment_name(seq), 2.9 + seq as f64 * 0.01);
        }
        assert_eq!(playlist.render(2), playlist.render(2));
        assert_eq!(playlist.render(2), playlist.render_current());
    }

    #[test]
    fn test_empty_playlist() {
        let playlist = builder(6);
        assert!(playlist.is_empty());
        assert_eq!(playlist.media_sequence(), 0);
        assert!(playlist.render_current().contains("#EXT-X-MEDIA-SEQUENCE:0\n"));
    }
}
