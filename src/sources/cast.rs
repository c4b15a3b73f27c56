/*
 *  sources/cast.rs
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
use reqwest::Client;
use serde::Deserialize;

use super::{PollError, SourcePoller};
use crate::track::{
    SourceKind, TIME_UNKNOWN, Track, composite_album_id, composite_track_id,
};

/// Cast-device poller. Reads the media status JSON a cast bridge
/// exposes over HTTP; field names follow the cast media metadata
/// namespace (title/albumName/artist/images/streamType).
///
/// Cast metadata carries no server-side identity, so both ids are
/// composites of the visible strings.
pub struct CastPoller {
    client: Client,
    status_url: String,
}

#[derive(Debug, Deserialize)]
struct CastStatus {
    #[serde(rename = "playerState")]
    player_state: Option<String>,
    media: Option<CastMedia>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CastMedia {
    #[serde(default)]
    title: String,
    #[serde(default)]
    album_name: String,
    #[serde(default)]
    artist: String,
    #[serde(default)]
    subtitle: String,
    #[serde(default)]
    images: Vec<CastImage>,
    #[serde(default)]
    stream_type: String,
    duration: Option<f64>,
    current_time: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct CastImage {
    url: String,
}

impl CastPoller {
    pub fn new(status_url: String) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(2))
            .timeout(Duration::from_secs(5))
            .build()?;
        Ok(CastPoller { client, status_url })
    }
}

fn to_track(status: CastStatus) -> Option<Track> {
    if status.player_state.as_deref() != Some("PLAYING") {
        return None;
    }
    let media = status.media?;
    // some apps only fill subtitle with the performer
    let artist = if media.artist.is_empty() {
        media.subtitle.clone()
    } else {
        media.artist.clone()
    };
    let live = media.stream_type.eq_ignore_ascii_case("LIVE");
    Some(Track {
        source: SourceKind::CastDevice,
        album_id: composite_album_id(&media.album_name, &artist),
        track_id: composite_track_id(&media.title, &media.album_name, &artist),
        title: media.title,
        album: media.album_name,
        artist,
        art_url: media.images.first().map(|i| i.url.clone()),
        duration: if live { TIME_UNKNOWN } else { media.duration.unwrap_or(TIME_UNKNOWN) },
        progress: if live { TIME_UNKNOWN } else { media.current_time.unwrap_or(TIME_UNKNOWN) },
        observed_at: Instant::now(),
    })
}

#[async_trait]
impl SourcePoller for CastPoller {
    fn kind(&self) -> SourceKind {
        SourceKind::CastDevice
    }

    async fn query(&mut self) -> Result<Option<Track>, PollError> {
        let resp = self.client.get(&self.status_url).send().await?;
        if !resp.status().is_success() {
            return Err(PollError::Protocol(format!("status {}", resp.status())));
        }
        let status: CastStatus = resp
            .json()
            .await
            .map_err(|e| PollError::Protocol(format!("bad cast payload: {}", e)))?;
        Ok(to_track(status))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(json: &str) -> CastStatus {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_buffered_stream_maps_timing_and_identity() {
        let s = status(
            r#"{
                "playerState": "PLAYING",
                "media": {
                    "title": "Station to Station",
                    "albumName": "Station to Station",
                    "artist": "David Bowie",
                    "images": [{"url": "http://art/cover.jpg"}],
                    "streamType": "BUFFERED",
                    "duration": 615.0,
                    "currentTime": 33.5
                }
            }"#,
        );
        let t = to_track(s).unwrap();
        assert_eq!(t.track_id, "Station to Station/Station to Station/David Bowie");
        assert_eq!(t.album_id, "Station to Station/David Bowie");
        assert_eq!(t.duration, 615.0);
        assert_eq!(t.progress, 33.5);
    }

    #[test]
    fn test_live_stream_has_unknown_timing() {
        let s = status(
            r#"{
                "playerState": "PLAYING",
                "media": {
                    "title": "WXPN",
                    "subtitle": "World Cafe",
                    "streamType": "LIVE",
                    "duration": 0.0,
                    "currentTime": 9999.0
                }
            }"#,
        );
        let t = to_track(s).unwrap();
        assert_eq!(t.duration, TIME_UNKNOWN);
        assert_eq!(t.progress, TIME_UNKNOWN);
        // subtitle stands in for a missing artist
        assert_eq!(t.artist, "World Cafe");
        assert!(t.art_url.is_none());
    }

    #[test]
    fn test_idle_device_is_nothing_playing() {
        assert!(to_track(status(r#"{"playerState": "IDLE", "media": null}"#)).is_none());
        assert!(to_track(status(r#"{"playerState": null, "media": null}"#)).is_none());
    }
}
