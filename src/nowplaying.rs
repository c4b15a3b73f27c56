/*
 *  nowplaying.rs
 *
 *  nowglow - now playing, in lights
 *
 *	This program is free software: you can redistribute it and/or modify
 *	it under the terms of the GNU General Public License as published by
 *	the Free Software Foundation, either version 3 of the License, or
 *	(at your option) any later version.
 *
 *	This program is distributed in the hope that it will be useful,
 *	but WITHOUT ANY WARRANTY; without even the implied warranty of
 *	MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 *	GNU General Public License for more details.
 *
 *	See <http://www.gnu.org/licenses/> to get a copy of the GNU General
 *	Public License.
 *
 */
use std::sync::Arc;

use image::RgbaImage;
use log::debug;

use crate::track::{SourceKind, Track};

/// Merges the per-source latest tracks into one authoritative
/// now-playing view and detects song/album transitions against the
/// identity last presented.
///
/// One instance lives behind an `Arc<tokio::sync::Mutex<_>>`; each
/// source poller writes only its own slot and only the animator calls
/// the change-detection methods. A frame decision (`now_playing` plus
/// `new_song`/`new_album`) must happen under a single lock guard so two
/// logical cycles can't interleave.
#[derive(Default)]
pub struct NowPlaying {
    latest: [Option<Track>; 4],
    last_track_id: String,
    last_album_id: String,
    /// Processed art held for the duration of the current album;
    /// cleared by `new_album()` so stale art never shows under a new
    /// album identity.
    held_art: Option<Arc<RgbaImage>>,
}

impl NowPlaying {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrite a source's latest snapshot wholesale. No field merging.
    pub fn update(&mut self, track: Track) {
        let slot = track.source.slot();
        self.latest[slot] = Some(track);
    }

    /// The source reported nothing playing.
    pub fn clear(&mut self, kind: SourceKind) {
        self.latest[kind.slot()] = None;
    }

    /// Highest-priority source with a live track, or `None` when idle.
    pub fn now_playing(&self) -> Option<&Track> {
        SourceKind::PRIORITY
            .iter()
            .find_map(|kind| self.latest[kind.slot()].as_ref())
    }

    /// True when the current track's identity differs from the last one
    /// presented; updates the presented identity as a side effect. Call
    /// at most once per frame decision, and never while `now_playing()`
    /// is `None` — that is a caller bug, not a runtime condition.
    pub fn new_song(&mut self) -> bool {
        let track_id = self
            .now_playing()
            .expect("new_song() called with nothing playing")
            .track_id
            .clone();
        if track_id == self.last_track_id {
            false
        } else {
            debug!("song transition: {:?} -> {:?}", self.last_track_id, track_id);
            self.last_track_id = track_id;
            true
        }
    }

    /// Album-level counterpart of `new_song()`; also drops the held art
    /// handle on change. Same calling convention.
    pub fn new_album(&mut self) -> bool {
        let album_id = self
            .now_playing()
            .expect("new_album() called with nothing playing")
            .album_id
            .clone();
        if album_id == self.last_album_id {
            false
        } else {
            debug!("album transition: {:?} -> {:?}", self.last_album_id, album_id);
            self.last_album_id = album_id;
            self.held_art = None;
            true
        }
    }

    pub fn held_art(&self) -> Option<Arc<RgbaImage>> {
        self.held_art.clone()
    }

    pub fn hold_art(&mut self, art: Arc<RgbaImage>) {
        self.held_art = Some(art);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    fn track(source: SourceKind, track_id: &str, album_id: &str) -> Track {
        Track {
            source,
            title: format!("title {}", track_id),
            album: format!("album {}", album_id),
            artist: "artist".into(),
            album_id: album_id.into(),
            track_id: track_id.into(),
            art_url: None,
            duration: 180.0,
            progress: 0.0,
            observed_at: Instant::now(),
        }
    }

    fn art() -> Arc<RgbaImage> {
        Arc::new(RgbaImage::new(4, 4))
    }

    #[test]
    fn test_same_track_id_is_not_a_new_song() {
        let mut np = NowPlaying::new();
        np.update(track(SourceKind::MediaServer, "t1", "a1"));
        assert!(np.new_song());
        np.update(track(SourceKind::MediaServer, "t1", "a1"));
        assert!(!np.new_song());
    }

    #[test]
    fn test_new_song_same_album_keeps_art() {
        let mut np = NowPlaying::new();
        np.update(track(SourceKind::MediaServer, "t1", "a1"));
        assert!(np.new_song());
        assert!(np.new_album());
        np.hold_art(art());

        np.update(track(SourceKind::MediaServer, "t2", "a1"));
        assert!(np.new_song());
        assert!(!np.new_album());
        assert!(np.held_art().is_some());
    }

    #[test]
    fn test_new_album_fires_once_and_drops_art() {
        let mut np = NowPlaying::new();
        np.update(track(SourceKind::MediaServer, "t1", "a1"));
        assert!(np.new_album());
        np.hold_art(art());

        np.update(track(SourceKind::MediaServer, "t3", "a2"));
        assert!(np.new_album());
        assert!(np.held_art().is_none());
        // second check in the same state is quiescent
        assert!(!np.new_album());
    }

    #[test]
    fn test_priority_order() {
        let mut np = NowPlaying::new();
        np.update(track(SourceKind::StreamingService, "s1", "sa1"));
        np.update(track(SourceKind::MediaServer, "p1", "pa1"));
        assert_eq!(np.now_playing().unwrap().track_id, "p1");

        np.update(track(SourceKind::NetworkedAmp, "h1", "ha1"));
        assert_eq!(np.now_playing().unwrap().track_id, "h1");

        np.clear(SourceKind::NetworkedAmp);
        assert_eq!(np.now_playing().unwrap().track_id, "p1");
    }

    #[test]
    fn test_priority_fallback_triggers_change_detection() {
        // media server stops reporting; the streaming service track
        // surfaces and its differing identity reads as a transition
        let mut np = NowPlaying::new();
        np.update(track(SourceKind::MediaServer, "p1", "pa1"));
        np.update(track(SourceKind::StreamingService, "s1", "sa1"));
        assert!(np.new_song());
        assert!(np.new_album());

        np.clear(SourceKind::MediaServer);
        assert_eq!(np.now_playing().unwrap().track_id, "s1");
        assert!(np.new_song());
        assert!(np.new_album());
    }

    #[test]
    fn test_idle_when_all_sources_empty() {
        let mut np = NowPlaying::new();
        assert!(np.now_playing().is_none());
        np.update(track(SourceKind::CastDevice, "c1", "ca1"));
        np.clear(SourceKind::CastDevice);
        assert!(np.now_playing().is_none());
    }

    #[test]
    #[should_panic(expected = "nothing playing")]
    fn test_change_detection_on_empty_is_a_contract_violation() {
        let mut np = NowPlaying::new();
        np.new_song();
    }
}
