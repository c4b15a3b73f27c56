/*
 *  artcache.rs
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
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use image::imageops::FilterType;
use image::{Rgba, RgbaImage};
use log::{info, warn};
use mini_moka::sync::Cache;
use thiserror::Error;

use crate::track::Track;

/// Entries older than this are treated as absent and refetched.
const ART_TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60);
/// Covers brighter than this mean (any channel) get compressed so they
/// don't wash out the matrix.
const LUMA_CAP: f32 = 160.0;
/// Fixed desaturation for visual consistency with the idle scenes.
const SATURATION: f32 = 0.85;

#[derive(Debug, Error)]
pub enum ArtError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("unexpected status {0}")]
    Status(reqwest::StatusCode),
    #[error("decode error: {0}")]
    Decode(#[from] image::ImageError),
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

/// Seam between the cache and the network so tests can count fetches.
#[async_trait]
pub trait ArtFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, ArtError>;
}

pub struct HttpArtFetcher {
    client: reqwest::Client,
}

impl HttpArtFetcher {
    pub fn new() -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(2))
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(HttpArtFetcher { client })
    }
}

#[async_trait]
impl ArtFetcher for HttpArtFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, ArtError> {
        let resp = self.client.get(url).send().await?;
        if !resp.status().is_success() {
            return Err(ArtError::Status(resp.status()));
        }
        Ok(resp.bytes().await?.to_vec())
    }
}

/// Content-addressed store of processed cover art: an on-disk layer of
/// processed PNGs (file mtime is the TTL clock) under an in-memory
/// layer. Fetch failures yield a deterministic fallback tile for that
/// call only; failures are never cached.
pub struct ArtCache {
    dir: PathBuf,
    size: u32,
    ttl: Duration,
    mem: Cache<String, Arc<RgbaImage>>,
    fetcher: Arc<dyn ArtFetcher>,
}

impl ArtCache {
    pub fn new(dir: PathBuf, size: u32, fetcher: Arc<dyn ArtFetcher>) -> Self {
        ArtCache {
            dir,
            size,
            ttl: ART_TTL,
            mem: Cache::builder().max_capacity(32).time_to_live(ART_TTL).build(),
            fetcher,
        }
    }

    /// Processed art for this track, or a fallback tile. Never fails;
    /// callers hold the result for the duration of the current album.
    pub async fn get_art(&self, track: &Track) -> Arc<RgbaImage> {
        let key = cache_key(track);

        if let Some(img) = self.mem.get(&key) {
            return img;
        }

        let path = self.dir.join(&key);
        if is_fresh(&path, self.ttl) {
            match image::open(&path) {
                Ok(img) => {
                    let img = Arc::new(img.to_rgba8());
                    self.mem.insert(key, img.clone());
                    return img;
                }
                Err(err) => warn!("art cache: unreadable entry {}: {}", path.display(), err),
            }
        }

        let Some(url) = track.art_url.as_deref() else {
            return fallback_tile(&key, self.size);
        };

        match self.fetch_and_process(url, &path).await {
            Ok(img) => {
                let img = Arc::new(img);
                self.mem.insert(key, img.clone());
                img
            }
            Err(err) => {
                warn!("art cache: fetch of {} failed: {}", url, err);
                fallback_tile(&key, self.size)
            }
        }
    }

    async fn fetch_and_process(&self, url: &str, path: &Path) -> Result<RgbaImage, ArtError> {
        info!("art cache: getting {}", url);
        let bytes = self.fetcher.fetch(url).await?;
        let img = process(image::load_from_memory(&bytes)?, self.size);
        // persist the processed image, not the raw one
        if let Err(err) = std::fs::create_dir_all(&self.dir)
            .and_then(|_| img.save(path).map_err(std::io::Error::other))
        {
            warn!("art cache: could not persist {}: {}", path.display(), err);
        }
        Ok(img)
    }
}

/// Stable filename for a track's art: the remote name where a URL
/// exists, a source-plus-album digest otherwise.
fn cache_key(track: &Track) -> String {
    let stem: String = match track.art_url.as_deref() {
        Some(url) => url
            .rsplit('/')
            .next()
            .unwrap_or(url)
            .chars()
            .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
            .collect(),
        None => String::new(),
    };
    if stem.is_empty() {
        let mut h = DefaultHasher::new();
        track.source.label().hash(&mut h);
        track.album_id.hash(&mut h);
        format!("album-{:016x}.png", h.finish())
    } else {
        format!("album-{}.png", stem)
    }
}

fn is_fresh(path: &Path, ttl: Duration) -> bool {
    let Ok(meta) = std::fs::metadata(path) else {
        return false;
    };
    match meta.modified().ok().and_then(|m| m.elapsed().ok()) {
        Some(age) => age < ttl,
        None => false,
    }
}

/// Center-fit onto a black square, cap luminance, desaturate.
fn process(img: image::DynamicImage, size: u32) -> RgbaImage {
    let resized = img.resize(size, size, FilterType::CatmullRom).to_rgba8();
    let mut out = RgbaImage::from_pixel(size, size, Rgba([0, 0, 0, 255]));
    let ox = ((size - resized.width().min(size)) / 2) as i64;
    let oy = ((size - resized.height().min(size)) / 2) as i64;
    image::imageops::overlay(&mut out, &resized, ox, oy);

    let brightest = channel_means(&out).into_iter().fold(0.0f32, f32::max);
    let scale = if brightest > LUMA_CAP { LUMA_CAP / brightest } else { 1.0 };

    for px in out.pixels_mut() {
        let [r, g, b, a] = px.0;
        let (r, g, b) = (r as f32 * scale, g as f32 * scale, b as f32 * scale);
        let gray = 0.299 * r + 0.587 * g + 0.114 * b;
        let sat = |c: f32| (gray + (c - gray) * SATURATION).clamp(0.0, 255.0) as u8;
        px.0 = [sat(r), sat(g), sat(b), a];
    }
    out
}

fn channel_means(img: &RgbaImage) -> [f32; 3] {
    let mut sums = [0.0f64; 3];
    for px in img.pixels() {
        for c in 0..3 {
            sums[c] += px.0[c] as f64;
        }
    }
    let n = (img.width() * img.height()).max(1) as f64;
    [
        (sums[0] / n) as f32,
        (sums[1] / n) as f32,
        (sums[2] / n) as f32,
    ]
}

/// Dim two-color vertical gradient, picked deterministically per key so
/// the same track always gets the same stand-in.
fn fallback_tile(key: &str, size: u32) -> Arc<RgbaImage> {
    const PALETTE: [((u8, u8, u8), (u8, u8, u8)); 4] = [
        ((24, 16, 64), (8, 48, 96)),
        ((64, 24, 24), (96, 64, 8)),
        ((16, 56, 40), (8, 16, 48)),
        ((56, 16, 56), (16, 40, 72)),
    ];
    let mut h = DefaultHasher::new();
    key.hash(&mut h);
    let (top, bottom) = PALETTE[(h.finish() % PALETTE.len() as u64) as usize];

    let mut img = RgbaImage::new(size, size);
    for y in 0..size {
        let t = y as f32 / size.max(1) as f32;
        let lerp = |a: u8, b: u8| (a as f32 + (b as f32 - a as f32) * t) as u8;
        let row = [lerp(top.0, bottom.0), lerp(top.1, bottom.1), lerp(top.2, bottom.2), 255];
        for x in 0..size {
            img.put_pixel(x, y, Rgba(row));
        }
    }
    Arc::new(img)
}
