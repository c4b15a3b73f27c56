/*
 *  main.rs
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
use std::sync::Arc;

use anyhow::Context;
use env_logger::Env;
use log::info;
use tokio::signal::unix::{SignalKind, signal};
use tokio::sync::Mutex;

mod animate;
mod artcache;
mod canvas;
mod clockface;
mod config;
mod life;
mod nowplaying;
mod overlay;
mod sink;
mod sources;
mod track;
mod weather;

use animate::Animator;
use artcache::{ArtCache, HttpArtFetcher};
use nowplaying::NowPlaying;
use sink::{FrameSink, FramebufferSink};
use weather::{OwmWeather, StaticWeather, WeatherView};

async fn signal_handler() -> Result<(), Box<dyn std::error::Error>> {
    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sighup = signal(SignalKind::hangup())?;

    tokio::select! {
        _ = sigint.recv() => {
            info!("SIGINT received. Initiating graceful shutdown.");
        }
        _ = sigterm.recv() => {
            info!("SIGTERM received. Initiating graceful shutdown.");
        }
        _ = sighup.recv() => {
            info!("SIGHUP received. Initiating graceful shutdown.");
        }
    }
    Ok(())
}

fn default_cache_dir() -> PathBuf {
    dirs_next::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("nowglow")
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cfg = config::load()?;
    env_logger::Builder::from_env(
        Env::default().default_filter_or(cfg.log_level.as_deref().unwrap_or("info")),
    )
    .init();
    info!("nowglow {} starting", env!("CARGO_PKG_VERSION"));

    let display = cfg.display.clone().unwrap_or_default();
    let width = display.width.unwrap_or(64);
    let height = display.height.unwrap_or(64);
    let fb_path = display
        .framebuffer
        .clone()
        .unwrap_or_else(|| PathBuf::from("/dev/fb1"));
    let gamma = display.gamma.unwrap_or(2.2);
    let sink = FramebufferSink::open(&fb_path, width, height, gamma)
        .with_context(|| format!("opening panel at {}", fb_path.display()))?;

    let np = Arc::new(Mutex::new(NowPlaying::new()));
    let quiet = cfg.quiet_hours();

    if let Some(s) = cfg.spotify.clone() {
        let poller = sources::spotify::SpotifyPoller::new(s.token_path)
            .context("building spotify client")?;
        tokio::spawn(sources::drive(poller, np.clone(), quiet));
    }
    if let Some(c) = cfg.cast.clone() {
        let poller = sources::cast::CastPoller::new(c.status_url)
            .context("building cast client")?;
        tokio::spawn(sources::drive(poller, np.clone(), quiet));
    }
    if let Some(p) = cfg.plex.clone() {
        let poller = sources::plex::PlexPoller::new(p.url, p.token, p.player)
            .context("building plex client")?;
        tokio::spawn(sources::drive(poller, np.clone(), quiet));
    }
    if let Some(h) = cfg.heos.clone() {
        let poller = sources::heos::HeosPoller::new(h.host, h.pid);
        tokio::spawn(sources::drive(poller, np.clone(), quiet));
    }

    let weather: Arc<dyn WeatherView> = match cfg.weather.clone() {
        Some(w) => {
            let owm = Arc::new(
                OwmWeather::new(w.api_key.clone(), w.lat, w.lon, w.units())
                    .context("building weather client")?,
            );
            let task = owm.clone();
            tokio::spawn(async move { task.run().await });
            owm
        }
        None => Arc::new(StaticWeather::default()),
    };

    let cache_dir = cfg.cache_dir.clone().unwrap_or_else(default_cache_dir);
    let art_size = width.min(sink.height());
    let fetcher = Arc::new(HttpArtFetcher::new().context("building art client")?);
    let art = ArtCache::new(cache_dir, art_size, fetcher);

    let mut animator = Animator::new(np, art, weather, sink);

    tokio::select! {
        _ = signal_handler() => {}
        result = animator.run() => {
            result.context("panel failure")?;
        }
    }

    info!("nowglow stopped");
    Ok(())
}
