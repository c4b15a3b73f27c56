/*
 *  sources/heos.rs
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

use async_trait::async_trait;
use serde::Deserialize;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::time::timeout;

use super::{PollError, SourcePoller};
use crate::track::{
    SourceKind, TIME_UNKNOWN, Track, composite_album_id, composite_track_id,
};

/// HEOS CLI port; the protocol is one JSON object per line over a raw
/// TCP socket.
const HEOS_PORT: u16 = 1255;
const IO_BUDGET: Duration = Duration::from_secs(5);

/// Networked-amp poller speaking the HEOS CLI. The amp does not report
/// duration/progress through `get_now_playing_media`, so the poller
/// runs a fixed bounded cadence while playing.
pub struct HeosPoller {
    host: String,
    pid: i64,
}

#[derive(Debug, Deserialize)]
struct HeosEnvelope {
    heos: HeosHeader,
    payload: Option<HeosMedia>,
}

#[derive(Debug, Deserialize)]
struct HeosHeader {
    #[serde(default)]
    result: String,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct HeosMedia {
    #[serde(default)]
    song: String,
    #[serde(default)]
    album: String,
    #[serde(default)]
    artist: String,
    #[serde(default)]
    image_url: String,
    #[serde(default)]
    mid: String,
    #[serde(default)]
    album_id: String,
}

impl HeosPoller {
    pub fn new(host: String, pid: i64) -> Self {
        HeosPoller { host, pid }
    }

    async fn command(&self, cmd: &str) -> Result<String, PollError> {
        let addr = format!("{}:{}", self.host, HEOS_PORT);
        let stream = timeout(IO_BUDGET, TcpStream::connect(&addr))
            .await
            .map_err(|_| PollError::Protocol("connect timed out".into()))??;
        let (read_half, mut write_half) = stream.into_split();

        write_half.write_all(cmd.as_bytes()).await?;
        write_half.write_all(b"\r\n").await?;

        let mut line = String::new();
        let mut reader = BufReader::new(read_half);
        timeout(IO_BUDGET, reader.read_line(&mut line))
            .await
            .map_err(|_| PollError::Protocol("read timed out".into()))??;
        Ok(line)
    }
}

fn parse_play_state(line: &str) -> Result<bool, PollError> {
    let env: HeosEnvelope = serde_json::from_str(line)
        .map_err(|e| PollError::Protocol(format!("bad play_state payload: {}", e)))?;
    if env.heos.result != "success" {
        return Err(PollError::Protocol(format!("heos: {}", env.heos.message)));
    }
    Ok(env.heos.message.split('&').any(|kv| kv == "state=play"))
}

fn parse_now_playing(line: &str) -> Result<Option<Track>, PollError> {
    let env: HeosEnvelope = serde_json::from_str(line)
        .map_err(|e| PollError::Protocol(format!("bad now_playing payload: {}", e)))?;
    if env.heos.result != "success" {
        return Err(PollError::Protocol(format!("heos: {}", env.heos.message)));
    }
    let Some(media) = env.payload else {
        return Ok(None);
    };
    if media.song.is_empty() && media.artist.is_empty() {
        return Ok(None);
    }
    let album_id = if media.album_id.is_empty() {
        composite_album_id(&media.album, &media.artist)
    } else {
        media.album_id.clone()
    };
    let track_id = if media.mid.is_empty() {
        composite_track_id(&media.song, &media.album, &media.artist)
    } else {
        media.mid.clone()
    };
    Ok(Some(Track {
        source: SourceKind::NetworkedAmp,
        title: media.song,
        album: media.album,
        artist: media.artist,
        album_id,
        track_id,
        art_url: if media.image_url.is_empty() { None } else { Some(media.image_url) },
        duration: TIME_UNKNOWN,
        progress: TIME_UNKNOWN,
        observed_at: Instant::now(),
    }))
}

#[async_trait]
impl SourcePoller for HeosPoller {
    fn kind(&self) -> SourceKind {
        SourceKind::NetworkedAmp
    }

    async fn query(&mut self) -> Result<Option<Track>, PollError> {
        let state = self
            .command(&format!("heos://player/get_play_state?pid={}", self.pid))
            .await?;
        if !parse_play_state(&state)? {
            return Ok(None);
        }
        let media = self
            .command(&format!("heos://player/get_now_playing_media?pid={}", self.pid))
            .await?;
        parse_now_playing(&media)
    }

    fn playing_recheck(&self, _track: &Track, _now: Instant) -> Duration {
        // no self-reported timing to schedule against
        Duration::from_secs(10)
    }
}
