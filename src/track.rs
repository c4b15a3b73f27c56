/*
 *  track.rs
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
use std::time::{Duration, Instant};

/// Sentinel for unknown duration/progress (live streams, amps that
/// don't report timing).
pub const TIME_UNKNOWN: f64 = -1.0;

/// A track starting out (< 15s elapsed) gets rechecked almost at once
/// to catch skips.
const EARLY_TRACK_SECS: f64 = 15.0;
/// Remaining time beyond this is polled at a bounded cadence rather
/// than waiting for the end.
const STEADY_WINDOW_SECS: f64 = 30.0;
const STEADY_RECHECK: Duration = Duration::from_secs(10);
const UNKNOWN_RECHECK: Duration = Duration::from_secs(5);
const MIN_RECHECK: Duration = Duration::from_secs(1);

/// The four playback backends, in ascending priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceKind {
    StreamingService,
    CastDevice,
    MediaServer,
    NetworkedAmp,
}

impl SourceKind {
    /// Highest priority first. The first kind with a live track wins
    /// the aggregated now-playing view.
    pub const PRIORITY: [SourceKind; 4] = [
        SourceKind::NetworkedAmp,
        SourceKind::MediaServer,
        SourceKind::CastDevice,
        SourceKind::StreamingService,
    ];

    /// Stable slot index into the aggregator's latest table.
    pub fn slot(self) -> usize {
        match self {
            SourceKind::StreamingService => 0,
            SourceKind::CastDevice => 1,
            SourceKind::MediaServer => 2,
            SourceKind::NetworkedAmp => 3,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            SourceKind::StreamingService => "spotify",
            SourceKind::CastDevice => "cast",
            SourceKind::MediaServer => "plex",
            SourceKind::NetworkedAmp => "heos",
        }
    }
}

/// Immutable snapshot of one playing item. Built fresh on every
/// successful poll and replaced wholesale, never mutated; staleness is
/// always computed against `observed_at`.
#[derive(Debug, Clone, PartialEq)]
pub struct Track {
    pub source: SourceKind,
    pub title: String,
    pub album: String,
    pub artist: String,
    /// Identity keys. Server-assigned where the backend has them,
    /// composite title/album/artist otherwise.
    pub album_id: String,
    pub track_id: String,
    /// Remote artwork reference; `None` means use a fallback tile.
    pub art_url: Option<String>,
    /// Seconds, `TIME_UNKNOWN` when the backend doesn't report them.
    pub duration: f64,
    pub progress: f64,
    pub observed_at: Instant,
}

/// Composite album identity for backends without server-side ids.
pub fn composite_album_id(album: &str, artist: &str) -> String {
    format!("{}/{}", album, artist)
}

/// Composite track identity for backends without server-side ids.
pub fn composite_track_id(title: &str, album: &str, artist: &str) -> String {
    format!("{}/{}/{}", title, album, artist)
}

impl Track {
    /// Remaining seconds at `now`, accounting for time elapsed since the
    /// snapshot was taken. `None` when the backend didn't report timing.
    pub fn time_left(&self, now: Instant) -> Option<f64> {
        if self.duration < 0.0 || self.progress < 0.0 {
            return None;
        }
        let elapsed = now.saturating_duration_since(self.observed_at).as_secs_f64();
        Some(self.duration - self.progress - elapsed)
    }

    /// How long until this source should be queried again.
    ///
    /// Early in a track we recheck almost immediately to catch skips;
    /// mid-track we poll at a bounded cadence; near the end we wait for
    /// the expected end; unknown or stale timing gets a conservative
    /// short delay.
    pub fn recheck_delay(&self, now: Instant) -> Duration {
        if self.progress >= 0.0 && self.progress < EARLY_TRACK_SECS {
            return MIN_RECHECK;
        }
        match self.time_left(now) {
            None => UNKNOWN_RECHECK,
            Some(left) if left <= 0.0 => UNKNOWN_RECHECK,
            Some(left) if left > STEADY_WINDOW_SECS => STEADY_RECHECK,
            Some(left) if left >= 1.0 => Duration::from_secs_f64(left),
            Some(_) => MIN_RECHECK,
        }
    }
}
