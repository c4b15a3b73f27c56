/*
 *  animate.rs
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
use std::time::Duration;

use chrono::Local;
use log::{debug, info};
use tokio::sync::Mutex;
use tokio::task::yield_now;

use crate::artcache::ArtCache;
use crate::canvas::Canvas;
use crate::clockface::{big_clock, small_clock};
use crate::life::LifeTile;
use crate::nowplaying::NowPlaying;
use crate::overlay::{layout_text, track_lines};
use crate::sink::{FrameSink, SinkError};
use crate::track::Track;
use crate::weather::WeatherView;

/// 127-step attack fade, one brightness increment per frame.
const ATTACK_STEPS: u32 = 127;
/// Pixel gap after the scrolled text before the pass ends.
const SCROLL_TAIL: u32 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AnimState {
    Idle,
    Steady,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Transition {
    None,
    Song,
    Album,
}

/// Owns the panel. Pulls one frame decision at a time from the shared
/// now-playing view and turns transitions into animation sequences;
/// every multi-frame sequence sleeps and yields per frame so source
/// pollers keep running underneath it.
pub struct Animator<S: FrameSink> {
    np: Arc<Mutex<NowPlaying>>,
    art: ArtCache,
    weather: Arc<dyn WeatherView>,
    sink: S,
    state: AnimState,
    life: LifeTile,
    /// Per-frame sleep inside sequences; zero collapses animation time
    /// without changing the frame stream.
    frame_sleep: Duration,
    /// Hold after a completed scroll pass.
    scroll_pause: Duration,
    /// Gap between steady/idle frame decisions.
    cadence: Duration,
}

impl<S: FrameSink> Animator<S> {
    pub fn new(
        np: Arc<Mutex<NowPlaying>>,
        art: ArtCache,
        weather: Arc<dyn WeatherView>,
        sink: S,
    ) -> Self {
        let life = LifeTile::new(sink.width(), 32.min(sink.height()));
        Animator {
            np,
            art,
            weather,
            sink,
            state: AnimState::Idle,
            life,
            frame_sleep: Duration::from_millis(10),
            scroll_pause: Duration::from_secs(1),
            cadence: Duration::from_secs(1),
        }
    }

    #[cfg(test)]
    fn immediate(mut self) -> Self {
        self.frame_sleep = Duration::ZERO;
        self.scroll_pause = Duration::ZERO;
        self
    }

    /// Drive the panel forever; only sink failures abort.
    pub async fn run(&mut self) -> Result<(), SinkError> {
        info!(
            "animator up: {}x{} panel",
            self.sink.width(),
            self.sink.height()
        );
        loop {
            self.step().await?;
            tokio::time::sleep(self.cadence).await;
        }
    }

    /// One frame decision: inspect the shared view once, then render
    /// either the idle scene, a transition sequence, or a steady frame.
    pub async fn step(&mut self) -> Result<(), SinkError> {
        let (track, transition) = {
            let mut np = self.np.lock().await;
            match np.now_playing().cloned() {
                None => (None, Transition::None),
                Some(t) => {
                    let song = np.new_song();
                    let album = np.new_album();
                    let transition = if album {
                        Transition::Album
                    } else if song {
                        Transition::Song
                    } else {
                        Transition::None
                    };
                    (Some(t), transition)
                }
            }
        };

        let night = self.weather.is_night();
        let Some(track) = track else {
            self.state = AnimState::Idle;
            let scene = self.idle_scene(night);
            return self.sink.swap(&scene, night);
        };

        // art is held per album; fetch outside the lock
        let held = self.np.lock().await.held_art();
        let art = match held {
            Some(a) => a,
            None => {
                let a = self.art.get_art(&track).await;
                self.np.lock().await.hold_art(a.clone());
                a
            }
        };

        let base = self.playing_scene(&Canvas::from_image(&art));
        let from_idle = self.state == AnimState::Idle;
        if transition == Transition::Album || from_idle {
            debug!(
                "presenting [{}] {} - {}",
                track.source.label(),
                track.artist,
                track.title
            );
            self.attack(&base, night).await?;
            self.present_text(&base, &track, night).await?;
            self.state = AnimState::Steady;
        } else {
            // song changes skip the fade; either way the text decision
            // re-runs, so wide titles keep scrolling cycle after cycle
            self.present_text(&base, &track, night).await?;
        }
        Ok(())
    }

    /// Fade the new scene up from black.
    async fn attack(&mut self, base: &Canvas, night: bool) -> Result<(), SinkError> {
        for i in 0..ATTACK_STEPS {
            let factor = (i * 2) as f32 / 255.0;
            self.sink.swap(&base.brightness(factor), night)?;
            tokio::time::sleep(self.frame_sleep).await;
            yield_now().await;
        }
        Ok(())
    }

    /// Text that fits is pinned; text wider than the panel gets one
    /// full right-to-left pass, a pause, then the parked frame.
    async fn present_text(&mut self, base: &Canvas, track: &Track, night: bool) -> Result<(), SinkError> {
        let text = layout_text(&track_lines(track, true));
        let width = self.sink.width();
        let y = (self.sink.height() - text.height().min(self.sink.height())) as i32;

        if text.width() > width {
            let passes = text.width() + width + SCROLL_TAIL;
            for step in 0..passes {
                let mut frame = base.clone();
                frame.alpha_composite(&text, (width as i32 - step as i32, y));
                self.sink.swap(&frame, night)?;
                tokio::time::sleep(self.frame_sleep).await;
                yield_now().await;
            }
            tokio::time::sleep(self.scroll_pause).await;
        }

        let frame = self.steady_frame(base, track);
        self.sink.swap(&frame, night)
    }

    /// Steady frame: scene with the text parked at the left margin.
    fn steady_frame(&self, base: &Canvas, track: &Track) -> Canvas {
        let text = layout_text(&track_lines(track, true));
        let y = (self.sink.height() - text.height().min(self.sink.height())) as i32;
        let mut frame = base.clone();
        frame.alpha_composite(&text, (0, y));
        frame
    }

    /// Cover art pinned to the left square of the panel; extreme
    /// conditions put the feels-like banner over it.
    fn playing_scene(&self, art: &Canvas) -> Canvas {
        let mut base = Canvas::opaque(self.sink.width(), self.sink.height());
        base.paste(art, (0, 0));
        if self.weather.is_extreme() {
            if let Some(feels) = self.weather.feels_like() {
                let banner = layout_text(&[feels]);
                base.alpha_composite(&banner, (1, 1));
            }
        }
        base
    }

    /// Nothing playing: weather tiles up top, then a clock by day or a
    /// drifting life board with a small clock by night.
    fn idle_scene(&mut self, night: bool) -> Canvas {
        let mut scene = Canvas::opaque(self.sink.width(), self.sink.height());
        let color = self.weather.temp_color();

        scene.alpha_composite(&self.weather.summary_tile(), (0, 0));
        let square = self.sink.height() > 32;
        if square {
            scene.alpha_composite(&self.weather.icon_tile(), (32, 0));
            if night {
                self.life.step();
                let board = self.life.render();
                scene.alpha_composite(&board, (0, (self.sink.height() - board.height()) as i32));
                scene.alpha_composite(&small_clock(&Local::now(), color), (32, 0));
            } else {
                let clock = big_clock(&Local::now(), self.sink.width(), color);
                scene.alpha_composite(&clock, (0, 34));
            }
        } else {
            scene.alpha_composite(&self.weather.icon_tile(), (32, 0));
            scene.alpha_composite(&small_clock(&Local::now(), color), (32, 0));
        }
        scene
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artcache::{ArtCache, ArtError, ArtFetcher};
    use crate::overlay::text_width;
    use crate::sink::mock::MockSink;
    use crate::track::{SourceKind, Track};
    use crate::weather::StaticWeather;
    use async_trait::async_trait;
    use std::time::Instant;

    struct NoFetcher;

    #[async_trait]
    impl ArtFetcher for NoFetcher {
        async fn fetch(&self, _url: &str) -> Result<Vec<u8>, ArtError> {
            Err(ArtError::Status(reqwest::StatusCode::NOT_FOUND))
        }
    }

    fn track(track_id: &str, album_id: &str) -> Track {
        Track {
            source: SourceKind::MediaServer,
            title: "Night".into(),
            album: "Owls".into(),
            artist: "Owl".into(),
            album_id: album_id.into(),
            track_id: track_id.into(),
            art_url: None,
            duration: 180.0,
            progress: 5.0,
            observed_at: Instant::now(),
        }
    }

    fn animator(
        weather: StaticWeather,
    ) -> (Arc<Mutex<NowPlaying>>, Animator<MockSink>) {
        let np = Arc::new(Mutex::new(NowPlaying::new()));
        let dir = tempfile::tempdir().unwrap();
        let art = ArtCache::new(dir.path().into(), 64, Arc::new(NoFetcher));
        let anim = Animator::new(
            np.clone(),
            art,
            Arc::new(weather),
            MockSink::new(64, 64),
        )
        .immediate();
        (np, anim)
    }

    fn expected_sequence_len() -> usize {
        // "Night" fits the panel: attack frames plus the parked frame
        (ATTACK_STEPS + 1) as usize
    }

    #[tokio::test]
    async fn test_new_album_runs_attack_then_pins_text() {
        let (np, mut anim) = animator(StaticWeather::default());
        np.lock().await.update(track("t1", "a1"));

        anim.step().await.unwrap();
        let frames = &anim.sink.frames;
        assert_eq!(frames.len(), expected_sequence_len());

        // fade starts black and ramps up
        assert!(frames[0].0.rgba().iter().step_by(4).all(|&r| r == 0));
        let early: u32 = frames[1].0.rgba().iter().map(|&v| v as u32).sum();
        let late: u32 = frames[126].0.rgba().iter().map(|&v| v as u32).sum();
        assert!(late > early);
    }

    #[tokio::test]
    async fn test_wide_text_gets_a_scroll_pass() {
        let (np, mut anim) = animator(StaticWeather::default());
        let mut t = track("t1", "a1");
        t.title = "An Inordinately Long Song Title".into();
        np.lock().await.update(t.clone());

        anim.step().await.unwrap();
        let text_w = text_width(&t.title) + 2;
        let expected = (ATTACK_STEPS + (text_w + 64 + SCROLL_TAIL) + 1) as usize;
        assert_eq!(anim.sink.frames.len(), expected);
    }

    #[tokio::test]
    async fn test_wide_text_keeps_scrolling_between_cycles() {
        let (np, mut anim) = animator(StaticWeather::default());
        let mut t = track("t1", "a1");
        t.title = "An Inordinately Long Song Title".into();
        np.lock().await.update(t.clone());
        anim.step().await.unwrap();
        let mark = anim.sink.frames.len();

        // unchanged track: the pass re-runs rather than parking the
        // text clipped at the left edge
        np.lock().await.update(t.clone());
        anim.step().await.unwrap();
        let text_w = text_width(&t.title) + 2;
        let pass = (text_w + 64 + SCROLL_TAIL + 1) as usize;
        assert_eq!(anim.sink.frames.len(), mark + pass);
    }

    #[tokio::test]
    async fn test_new_song_same_album_skips_the_fade() {
        let (np, mut anim) = animator(StaticWeather::default());
        np.lock().await.update(track("t1", "a1"));
        anim.step().await.unwrap();
        let mark = anim.sink.frames.len();

        np.lock().await.update(track("t2", "a1"));
        anim.step().await.unwrap();
        // one parked frame with the new text, no 127-step replay
        assert_eq!(anim.sink.frames.len(), mark + 1);
    }

    #[tokio::test]
    async fn test_unchanged_track_renders_one_steady_frame() {
        let (np, mut anim) = animator(StaticWeather::default());
        np.lock().await.update(track("t1", "a1"));

        anim.step().await.unwrap();
        let after_sequence = anim.sink.frames.len();

        np.lock().await.update(track("t1", "a1"));
        anim.step().await.unwrap();
        assert_eq!(anim.sink.frames.len(), after_sequence + 1);
    }

    #[tokio::test]
    async fn test_same_album_reuses_held_art() {
        let (np, mut anim) = animator(StaticWeather::default());
        np.lock().await.update(track("t1", "a1"));
        anim.step().await.unwrap();
        let held = np.lock().await.held_art().unwrap();

        np.lock().await.update(track("t2", "a1"));
        anim.step().await.unwrap();
        let held_again = np.lock().await.held_art().unwrap();
        assert!(Arc::ptr_eq(&held, &held_again));
    }

    #[tokio::test]
    async fn test_idle_scene_when_nothing_plays() {
        let (_np, mut anim) = animator(StaticWeather::default());
        anim.step().await.unwrap();
        assert_eq!(anim.sink.frames.len(), 1);
        assert!(!anim.sink.frames[0].1);
    }

    #[tokio::test]
    async fn test_night_flag_reaches_the_sink() {
        let (_np, mut anim) = animator(StaticWeather {
            night: true,
            ..Default::default()
        });
        anim.step().await.unwrap();
        assert!(anim.sink.frames[0].1);
    }

    #[tokio::test]
    async fn test_stop_returns_to_idle_and_replays_attack_on_resume() {
        let (np, mut anim) = animator(StaticWeather::default());
        np.lock().await.update(track("t1", "a1"));
        anim.step().await.unwrap();

        np.lock().await.clear(SourceKind::MediaServer);
        anim.step().await.unwrap();
        let idle_mark = anim.sink.frames.len();

        // same track again after an idle spell still gets the fade-in
        np.lock().await.update(track("t1", "a1"));
        anim.step().await.unwrap();
        assert_eq!(
            anim.sink.frames.len(),
            idle_mark + expected_sequence_len()
        );
    }

    #[tokio::test]
    async fn test_extreme_weather_banner_lands_on_the_scene() {
        let (np, mut anim) = animator(StaticWeather {
            extreme: Some("steamy 96F".into()),
            ..Default::default()
        });
        np.lock().await.update(track("t1", "a1"));
        anim.step().await.unwrap();

        // banner text lands near the top-left, over the art
        let last = &anim.sink.frames.last().unwrap().0;
        let lit = (0..12)
            .flat_map(|y| (0..last.width()).map(move |x| (x, y)))
            .any(|(x, y)| last.get(x, y) == [192, 192, 192, 255]);
        assert!(lit);
    }
}
