/*
 *  sources/mod.rs
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
pub mod cast;
pub mod heos;
pub mod plex;
pub mod spotify;

use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Local, Timelike};
use log::{info, warn};
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::time::sleep;

use crate::nowplaying::NowPlaying;
use crate::track::{SourceKind, Track};

/// Idle recheck while a quiet-hours window is active. Backends are
/// rate limited; overnight there is no reason to burn quota.
const QUIET_IDLE: Duration = Duration::from_secs(45 * 60);

/// Backend-facing failures, classified so the poll loop can map them to
/// a cooldown. These never propagate past the poller boundary.
#[derive(Debug, Error)]
pub enum PollError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("protocol error: {0}")]
    Protocol(String),
    #[error("authorization rejected")]
    Unauthorized,
}

impl PollError {
    /// How long the source sits out before retrying.
    pub fn cooldown(&self) -> Duration {
        match self {
            PollError::Unauthorized => Duration::from_secs(300),
            PollError::Http(_) | PollError::Io(_) => Duration::from_secs(60),
            PollError::Protocol(_) => Duration::from_secs(30),
        }
    }

    /// Transient errors keep the last-known track (no flicker to idle
    /// on a blip); a rejected credential means the snapshot can no
    /// longer be trusted.
    pub fn clears_slot(&self) -> bool {
        matches!(self, PollError::Unauthorized)
    }
}

/// One backend adapter. Each implementor derives its own identity and
/// art reference but conforms to the same track shape and recheck
/// contract.
#[async_trait]
pub trait SourcePoller: Send {
    fn kind(&self) -> SourceKind;

    /// Query the backend once. `Ok(None)` means nothing is playing.
    async fn query(&mut self) -> Result<Option<Track>, PollError>;

    /// Recheck delay while the source reports nothing playing.
    fn idle_delay(&self) -> Duration {
        Duration::from_secs(20)
    }

    /// Recheck delay while playing. Overridden where the backend's
    /// self-reported timing can't drive the shared policy.
    fn playing_recheck(&self, track: &Track, now: Instant) -> Duration {
        track.recheck_delay(now)
    }
}

/// Daily window (whole hours, local time) of reduced polling.
/// `start == end` disables the window; `start > end` wraps midnight.
#[derive(Debug, Clone, Copy)]
pub struct QuietHours {
    pub start: u32,
    pub end: u32,
}

impl QuietHours {
    pub fn contains(&self, at: DateTime<Local>) -> bool {
        let h = at.hour();
        if self.start == self.end {
            false
        } else if self.start < self.end {
            h >= self.start && h < self.end
        } else {
            h >= self.start || h < self.end
        }
    }
}

fn idle_delay_at(base: Duration, quiet: Option<QuietHours>, at: DateTime<Local>) -> Duration {
    match quiet {
        Some(q) if q.contains(at) => QUIET_IDLE.max(base),
        _ => base,
    }
}

/// One iteration of the poll contract: query the backend, reconcile the
/// aggregator slot, and compute the next delay. Factored out of the
/// perpetual loop so the semantics are testable.
pub async fn poll_once<P: SourcePoller>(
    poller: &mut P,
    np: &Mutex<NowPlaying>,
    quiet: Option<QuietHours>,
) -> Duration {
    let kind = poller.kind();
    match poller.query().await {
        Ok(Some(track)) => {
            let delay = poller.playing_recheck(&track, Instant::now());
            np.lock().await.update(track);
            delay
        }
        Ok(None) => {
            np.lock().await.clear(kind);
            idle_delay_at(poller.idle_delay(), quiet, Local::now())
        }
        Err(err) => {
            warn!("{}: poll failed: {}", kind.label(), err);
            if err.clears_slot() {
                np.lock().await.clear(kind);
            }
            err.cooldown()
        }
    }
}

/// Perpetual task body for one source. Suspends for the computed delay
/// after every poll so the cooperative scheduler stays fair.
pub async fn drive<P: SourcePoller>(
    mut poller: P,
    np: std::sync::Arc<Mutex<NowPlaying>>,
    quiet: Option<QuietHours>,
) {
    info!("{}: poller started", poller.kind().label());
    loop {
        let delay = poll_once(&mut poller, &np, quiet).await;
        sleep(delay).await;
    }
}
