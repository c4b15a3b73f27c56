/*
 *  sources/plex.rs
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
use reqwest::{Client, StatusCode, header};
use serde::Deserialize;

use super::{PollError, SourcePoller};
use crate::track::{SourceKind, TIME_UNKNOWN, Track};

/// Media-server poller against the Plex session list. Picks the first
/// actively playing music session, optionally filtered to one player.
/// Plex assigns stable ratingKeys, so identity is server-side.
pub struct PlexPoller {
    client: Client,
    base_url: String,
    token: String,
    player: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SessionsResponse {
    #[serde(rename = "MediaContainer")]
    container: MediaContainer,
}

#[derive(Debug, Deserialize)]
struct MediaContainer {
    #[serde(rename = "Metadata", default)]
    metadata: Vec<SessionMeta>,
}

#[derive(Debug, Deserialize)]
struct SessionMeta {
    #[serde(rename = "type", default)]
    media_type: String,
    #[serde(rename = "ratingKey", default)]
    rating_key: String,
    #[serde(rename = "parentRatingKey")]
    parent_rating_key: Option<String>,
    #[serde(default)]
    title: String,
    /// album title
    #[serde(rename = "parentTitle", default)]
    parent_title: String,
    /// artist
    #[serde(rename = "grandparentTitle", default)]
    grandparent_title: String,
    thumb: Option<String>,
    /// milliseconds
    duration: Option<u64>,
    #[serde(rename = "viewOffset")]
    view_offset: Option<u64>,
    #[serde(rename = "Player")]
    player: Option<PlayerMeta>,
}

#[derive(Debug, Deserialize)]
struct PlayerMeta {
    #[serde(default)]
    state: String,
    #[serde(default)]
    title: String,
}

impl PlexPoller {
    pub fn new(
        base_url: String,
        token: String,
        player: Option<String>,
    ) -> Result<Self, reqwest::Error> {
        let mut headers = header::HeaderMap::new();
        headers.insert("Accept", header::HeaderValue::from_static("application/json"));
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(2))
            .timeout(Duration::from_secs(5))
            .default_headers(headers)
            .build()?;
        Ok(PlexPoller {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
            player,
        })
    }

    fn art_url(&self, thumb: &str) -> String {
        format!("{}{}?X-Plex-Token={}", self.base_url, thumb, self.token)
    }
}

fn pick_session<'a>(
    sessions: &'a [SessionMeta],
    player_filter: Option<&str>,
) -> Option<&'a SessionMeta> {
    sessions.iter().find(|s| {
        if s.media_type != "track" {
            return false;
        }
        let Some(player) = s.player.as_ref() else {
            return false;
        };
        if player.state != "playing" {
            return false;
        }
        match player_filter {
            Some(name) => player.title.eq_ignore_ascii_case(name),
            None => true,
        }
    })
}

#[async_trait]
impl SourcePoller for PlexPoller {
    fn kind(&self) -> SourceKind {
        SourceKind::MediaServer
    }

    async fn query(&mut self) -> Result<Option<Track>, PollError> {
        let url = format!("{}/status/sessions", self.base_url);
        let resp = self
            .client
            .get(&url)
            .header("X-Plex-Token", &self.token)
            .send()
            .await?;

        match resp.status() {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                return Err(PollError::Unauthorized);
            }
            s if !s.is_success() => {
                return Err(PollError::Protocol(format!("status {}", s)));
            }
            _ => {}
        }

        let sessions: SessionsResponse = resp
            .json()
            .await
            .map_err(|e| PollError::Protocol(format!("bad sessions payload: {}", e)))?;

        let Some(session) = pick_session(&sessions.container.metadata, self.player.as_deref())
        else {
            return Ok(None);
        };

        Ok(Some(Track {
            source: SourceKind::MediaServer,
            title: session.title.clone(),
            album: session.parent_title.clone(),
            artist: session.grandparent_title.clone(),
            album_id: session
                .parent_rating_key
                .clone()
                .unwrap_or_else(|| session.parent_title.clone()),
            track_id: session.rating_key.clone(),
            art_url: session.thumb.as_deref().map(|t| self.art_url(t)),
            duration: session
                .duration
                .map(|d| d as f64 / 1000.0)
                .unwrap_or(TIME_UNKNOWN),
            progress: session
                .view_offset
                .map(|v| v as f64 / 1000.0)
                .unwrap_or(TIME_UNKNOWN),
            observed_at: Instant::now(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sessions(json: &str) -> SessionsResponse {
        serde_json::from_str(json).unwrap()
    }

    const TWO_SESSIONS: &str = r#"{
        "MediaContainer": {
            "Metadata": [
                {
                    "type": "track",
                    "ratingKey": "5501",
                    "parentRatingKey": "5490",
                    "title": "Pyramid Song",
                    "parentTitle": "Amnesiac",
                    "grandparentTitle": "Radiohead",
                    "thumb": "/library/metadata/5490/thumb/1",
                    "duration": 289000,
                    "viewOffset": 45000,
                    "Player": {"state": "playing", "title": "office"}
                },
                {
                    "type": "track",
                    "ratingKey": "7700",
                    "title": "Paused Tune",
                    "parentTitle": "Other",
                    "grandparentTitle": "Band",
                    "duration": 100000,
                    "Player": {"state": "paused", "title": "kitchen"}
                }
            ]
        }
    }"#;

    #[test]
    fn test_picks_first_playing_music_session() {
        let s = sessions(TWO_SESSIONS);
        let picked = pick_session(&s.container.metadata, None).unwrap();
        assert_eq!(picked.rating_key, "5501");
    }

    #[test]
    fn test_player_filter_is_case_insensitive() {
        let s = sessions(TWO_SESSIONS);
        assert!(pick_session(&s.container.metadata, Some("OFFICE")).is_some());
        assert!(pick_session(&s.container.metadata, Some("kitchen")).is_none());
    }

    #[test]
    fn test_empty_container_is_nothing_playing() {
        let s = sessions(r#"{"MediaContainer": {}}"#);
        assert!(pick_session(&s.container.metadata, None).is_none());
    }
}
