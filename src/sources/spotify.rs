/*
 *  sources/spotify.rs
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
use std::path::PathBuf;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::{Client, StatusCode, header};
use serde::Deserialize;

use super::{PollError, SourcePoller};
use crate::track::{SourceKind, Track};

const CURRENTLY_PLAYING_URL: &str = "https://api.spotify.com/v1/me/player/currently-playing";

/// Streaming-service poller against the Spotify playback-state API.
///
/// The bearer token lives in a JSON file maintained by an external
/// refresher; an expired or missing token surfaces as `Unauthorized`
/// and is never refreshed here.
pub struct SpotifyPoller {
    client: Client,
    token_path: PathBuf,
}

#[derive(Debug, Deserialize)]
struct TokenFile {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct PlayingResponse {
    is_playing: bool,
    progress_ms: Option<u64>,
    item: Option<Item>,
}

#[derive(Debug, Deserialize)]
struct Item {
    id: String,
    name: String,
    duration_ms: u64,
    album: Album,
    artists: Vec<Artist>,
}

#[derive(Debug, Deserialize)]
struct Album {
    id: String,
    name: String,
    #[serde(default)]
    images: Vec<ArtImage>,
}

#[derive(Debug, Deserialize)]
struct Artist {
    name: String,
}

#[derive(Debug, Deserialize)]
struct ArtImage {
    url: String,
}

impl SpotifyPoller {
    pub fn new(token_path: PathBuf) -> Result<Self, reqwest::Error> {
        let mut headers = header::HeaderMap::new();
        headers.insert("Accept", header::HeaderValue::from_static("application/json"));
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(2))
            .timeout(Duration::from_secs(5))
            .default_headers(headers)
            .build()?;
        Ok(SpotifyPoller { client, token_path })
    }

    fn bearer_token(&self) -> Result<String, PollError> {
        let raw = std::fs::read_to_string(&self.token_path)
            .map_err(|_| PollError::Unauthorized)?;
        let token: TokenFile =
            serde_json::from_str(&raw).map_err(|_| PollError::Unauthorized)?;
        Ok(token.access_token)
    }
}

fn to_track(meta: PlayingResponse) -> Option<Track> {
    if !meta.is_playing {
        return None;
    }
    let item = meta.item?;
    let artist = item
        .artists
        .iter()
        .map(|a| a.name.as_str())
        .collect::<Vec<_>>()
        .join(", ");
    Some(Track {
        source: SourceKind::StreamingService,
        title: item.name,
        album: item.album.name,
        artist,
        album_id: item.album.id,
        track_id: item.id,
        art_url: item.album.images.first().map(|i| i.url.clone()),
        duration: item.duration_ms as f64 / 1000.0,
        progress: meta.progress_ms.map(|p| p as f64 / 1000.0).unwrap_or(0.0),
        observed_at: Instant::now(),
    })
}

#[async_trait]
impl SourcePoller for SpotifyPoller {
    fn kind(&self) -> SourceKind {
        SourceKind::StreamingService
    }

    async fn query(&mut self) -> Result<Option<Track>, PollError> {
        let token = self.bearer_token()?;
        let resp = self
            .client
            .get(CURRENTLY_PLAYING_URL)
            .bearer_auth(token)
            .send()
            .await?;

        match resp.status() {
            // nothing playing at all (no active device)
            StatusCode::NO_CONTENT => return Ok(None),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                return Err(PollError::Unauthorized);
            }
            StatusCode::TOO_MANY_REQUESTS => {
                return Err(PollError::Protocol("rate limited".into()));
            }
            s if !s.is_success() => {
                return Err(PollError::Protocol(format!("status {}", s)));
            }
            _ => {}
        }

        let meta: PlayingResponse = resp
            .json()
            .await
            .map_err(|e| PollError::Protocol(format!("bad playback payload: {}", e)))?;
        Ok(to_track(meta))
    }

    fn idle_delay(&self) -> Duration {
        // the web API quota is the tightest of the four backends
        Duration::from_secs(30)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(json: &str) -> PlayingResponse {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_playing_payload_maps_to_track() {
        let m = meta(
            r#"{
                "is_playing": true,
                "progress_ms": 12000,
                "item": {
                    "id": "trk9",
                    "name": "Marbles",
                    "duration_ms": 201000,
                    "album": {
                        "id": "alb4",
                        "name": "In Rainbows",
                        "images": [{"url": "https://img/640.jpg"}, {"url": "https://img/300.jpg"}]
                    },
                    "artists": [{"name": "Radiohead"}, {"name": "Someone"}]
                }
            }"#,
        );
        let t = to_track(m).unwrap();
        assert_eq!(t.source, SourceKind::StreamingService);
        assert_eq!(t.track_id, "trk9");
        assert_eq!(t.album_id, "alb4");
        assert_eq!(t.artist, "Radiohead, Someone");
        assert_eq!(t.art_url.as_deref(), Some("https://img/640.jpg"));
        assert!((t.duration - 201.0).abs() < f64::EPSILON);
        assert!((t.progress - 12.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_paused_or_empty_item_is_nothing_playing() {
        let paused = meta(r#"{"is_playing": false, "progress_ms": 0, "item": null}"#);
        assert!(to_track(paused).is_none());
        let empty = meta(r#"{"is_playing": true, "progress_ms": 0, "item": null}"#);
        assert!(to_track(empty).is_none());
    }
}
