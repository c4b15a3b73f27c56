/*
 *  weather.rs
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
use std::sync::RwLock;
use std::time::Duration;

use chrono::Utc;
use embedded_graphics::mono_font::MonoTextStyle;
use embedded_graphics::mono_font::ascii::FONT_6X10;
use embedded_graphics::pixelcolor::Rgb888;
use embedded_graphics::prelude::*;
use embedded_graphics::primitives::{Circle, Line, PrimitiveStyle, Triangle};
use embedded_graphics::text::{Baseline, Text};
use log::{debug, warn};
use reqwest::Client;
use serde::Deserialize;
use thiserror::Error;

use crate::canvas::Canvas;

const OWM_URL: &str = "https://api.openweathermap.org/data/2.5/weather";

/// Feels-like thresholds, Fahrenheit.
pub const STEAMY_F: f64 = 90.0;
pub const ICY_F: f64 = 32.0;

const POLL_DAY: Duration = Duration::from_secs(600);
const POLL_NIGHT: Duration = Duration::from_secs(1800);
const POLL_ERROR: Duration = Duration::from_secs(300);

#[derive(Debug, Error)]
pub enum WeatherError {
    #[error("weather request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("weather api rejected the request: {0}")]
    Api(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Units {
    Imperial,
    Metric,
}

/// Broad condition groups carved out of OpenWeatherMap's condition ids,
/// one icon per group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Conditions {
    Thunder,
    Rain,
    Snow,
    Fog,
    Clear,
    Clouds,
}

impl Conditions {
    fn from_owm(id: u32) -> Self {
        match id {
            200..=299 => Conditions::Thunder,
            300..=599 => Conditions::Rain,
            600..=699 => Conditions::Snow,
            700..=799 => Conditions::Fog,
            800 => Conditions::Clear,
            _ => Conditions::Clouds,
        }
    }
}

/// Point-in-time reading; temperatures held in Fahrenheit and converted
/// on display.
#[derive(Debug, Clone)]
pub struct Reading {
    pub temp_f: f64,
    pub feels_like_f: f64,
    pub conditions: Conditions,
    pub description: String,
    pub sunrise: i64,
    pub sunset: i64,
}

/// What the animator needs from weather: ambient mood for the idle
/// scene and the extreme-conditions override while playing.
pub trait WeatherView: Send + Sync {
    fn is_night(&self) -> bool;
    fn is_extreme(&self) -> bool;
    fn feels_like(&self) -> Option<String>;
    fn temp_color(&self) -> (u8, u8, u8);
    fn summary_tile(&self) -> Canvas;
    fn icon_tile(&self) -> Canvas;
}

#[derive(Debug, Deserialize)]
struct OwmResponse {
    weather: Vec<OwmCondition>,
    main: OwmMain,
    #[serde(default)]
    sys: OwmSys,
}

#[derive(Debug, Deserialize)]
struct OwmCondition {
    id: u32,
    #[serde(default)]
    main: String,
}

#[derive(Debug, Deserialize)]
struct OwmMain {
    temp: f64,
    feels_like: f64,
}

#[derive(Debug, Default, Deserialize)]
struct OwmSys {
    #[serde(default)]
    sunrise: i64,
    #[serde(default)]
    sunset: i64,
}

/// Live weather backed by OpenWeatherMap current conditions. Readings
/// land in a `RwLock` so render paths never await on the network.
pub struct OwmWeather {
    client: Client,
    api_key: String,
    lat: f64,
    lon: f64,
    units: Units,
    reading: RwLock<Option<Reading>>,
}

impl OwmWeather {
    pub fn new(api_key: String, lat: f64, lon: f64, units: Units) -> Result<Self, WeatherError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(2))
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(OwmWeather {
            client,
            api_key,
            lat,
            lon,
            units,
            reading: RwLock::new(None),
        })
    }

    async fn fetch(&self) -> Result<Reading, WeatherError> {
        // always query imperial; display converts
        let resp = self
            .client
            .get(OWM_URL)
            .query(&[
                ("lat", self.lat.to_string()),
                ("lon", self.lon.to_string()),
                ("units", "imperial".to_string()),
                ("appid", self.api_key.clone()),
            ])
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(WeatherError::Api(resp.status().to_string()));
        }
        let body: OwmResponse = resp.json().await?;
        let (id, main) = body
            .weather
            .first()
            .map(|c| (c.id, c.main.clone()))
            .unwrap_or((801, String::from("Clouds")));
        Ok(Reading {
            temp_f: body.main.temp,
            feels_like_f: body.main.feels_like,
            conditions: Conditions::from_owm(id),
            description: main,
            sunrise: body.sys.sunrise,
            sunset: body.sys.sunset,
        })
    }

    /// Refresh loop. Overnight readings barely move so the cadence
    /// relaxes; errors keep the last good reading and retry sooner.
    pub async fn run(&self) {
        loop {
            let delay = match self.fetch().await {
                Ok(reading) => {
                    debug!(
                        "weather: {:.0}F feels {:.0}F {:?}",
                        reading.temp_f, reading.feels_like_f, reading.conditions
                    );
                    let night = is_night_at(&reading, Utc::now().timestamp());
                    *self.reading.write().unwrap() = Some(reading);
                    if night { POLL_NIGHT } else { POLL_DAY }
                }
                Err(e) => {
                    warn!("weather refresh failed: {}", e);
                    POLL_ERROR
                }
            };
            tokio::time::sleep(delay).await;
        }
    }

    fn snapshot(&self) -> Option<Reading> {
        self.reading.read().unwrap().clone()
    }
}

fn is_night_at(reading: &Reading, epoch: i64) -> bool {
    if reading.sunrise == 0 || reading.sunset == 0 {
        return false;
    }
    epoch < reading.sunrise || epoch >= reading.sunset
}

fn format_temp(temp_f: f64, units: Units) -> String {
    match units {
        Units::Imperial => format!("{:.0}F", temp_f),
        Units::Metric => format!("{:.0}C", (temp_f - 32.0) * 5.0 / 9.0),
    }
}

/// Cold-to-hot ramp keyed on air temperature.
fn color_for(temp_f: f64) -> (u8, u8, u8) {
    match temp_f {
        t if t < 15.0 => (60, 80, 200),
        t if t < 32.0 => (70, 130, 200),
        t if t < 50.0 => (60, 160, 160),
        t if t < 68.0 => (70, 170, 90),
        t if t < 82.0 => (190, 160, 50),
        t if t < 95.0 => (210, 110, 40),
        _ => (210, 50, 40),
    }
}

impl WeatherView for OwmWeather {
    fn is_night(&self) -> bool {
        self.snapshot()
            .map(|r| is_night_at(&r, Utc::now().timestamp()))
            .unwrap_or(false)
    }

    fn is_extreme(&self) -> bool {
        self.snapshot()
            .map(|r| r.feels_like_f > STEAMY_F || r.feels_like_f < ICY_F)
            .unwrap_or(false)
    }

    fn feels_like(&self) -> Option<String> {
        let r = self.snapshot()?;
        if r.feels_like_f > STEAMY_F {
            Some(format!("steamy {}", format_temp(r.feels_like_f, self.units)))
        } else if r.feels_like_f < ICY_F {
            Some(format!("icy {}", format_temp(r.feels_like_f, self.units)))
        } else {
            None
        }
    }

    fn temp_color(&self) -> (u8, u8, u8) {
        self.snapshot()
            .map(|r| color_for(r.temp_f))
            .unwrap_or((90, 90, 90))
    }

    fn summary_tile(&self) -> Canvas {
        match self.snapshot() {
            Some(r) => draw_summary(&r, self.units),
            None => Canvas::transparent(32, 32),
        }
    }

    fn icon_tile(&self) -> Canvas {
        match self.snapshot() {
            Some(r) => draw_icon(r.conditions),
            None => Canvas::transparent(32, 32),
        }
    }
}

fn draw_summary(reading: &Reading, units: Units) -> Canvas {
    let mut tile = Canvas::transparent(32, 32);
    let color = color_for(reading.temp_f);
    let temp_style = MonoTextStyle::new(&FONT_6X10, Rgb888::new(color.0, color.1, color.2));
    let desc_style = MonoTextStyle::new(&FONT_6X10, Rgb888::new(150, 150, 150));

    let temp = format_temp(reading.temp_f, units);
    Text::with_baseline(&temp, Point::new(1, 4), temp_style, Baseline::Top)
        .draw(&mut tile)
        .ok();
    let mut desc = reading.description.clone();
    desc.truncate(5);
    Text::with_baseline(&desc, Point::new(1, 18), desc_style, Baseline::Top)
        .draw(&mut tile)
        .ok();
    tile
}

fn draw_icon(conditions: Conditions) -> Canvas {
    let mut tile = Canvas::transparent(32, 32);
    let gray = PrimitiveStyle::with_fill(Rgb888::new(140, 140, 140));
    let cloud = |tile: &mut Canvas| {
        Circle::new(Point::new(4, 8), 12).into_styled(gray).draw(tile).ok();
        Circle::new(Point::new(12, 4), 14).into_styled(gray).draw(tile).ok();
        Circle::new(Point::new(18, 9), 10).into_styled(gray).draw(tile).ok();
    };
    match conditions {
        Conditions::Clear => {
            let sun = PrimitiveStyle::with_fill(Rgb888::new(220, 190, 60));
            Circle::new(Point::new(10, 10), 12).into_styled(sun).draw(&mut tile).ok();
            let ray = PrimitiveStyle::with_stroke(Rgb888::new(220, 190, 60), 1);
            for (a, b) in [
                (Point::new(16, 4), Point::new(16, 7)),
                (Point::new(16, 24), Point::new(16, 27)),
                (Point::new(4, 16), Point::new(7, 16)),
                (Point::new(24, 16), Point::new(27, 16)),
            ] {
                Line::new(a, b).into_styled(ray).draw(&mut tile).ok();
            }
        }
        Conditions::Clouds | Conditions::Fog => {
            cloud(&mut tile);
            if conditions == Conditions::Fog {
                let band = PrimitiveStyle::with_stroke(Rgb888::new(100, 100, 100), 1);
                for y in [22, 25, 28] {
                    Line::new(Point::new(4, y), Point::new(27, y))
                        .into_styled(band)
                        .draw(&mut tile)
                        .ok();
                }
            }
        }
        Conditions::Rain => {
            cloud(&mut tile);
            let drop = PrimitiveStyle::with_stroke(Rgb888::new(80, 120, 220), 1);
            for x in [8, 14, 20] {
                Line::new(Point::new(x, 22), Point::new(x - 2, 28))
                    .into_styled(drop)
                    .draw(&mut tile)
                    .ok();
            }
        }
        Conditions::Snow => {
            cloud(&mut tile);
            for (x, y) in [(8, 23), (14, 26), (20, 23)] {
                tile.fill_rect(x, y, 2, 2, (230, 230, 230));
            }
        }
        Conditions::Thunder => {
            cloud(&mut tile);
            let bolt = PrimitiveStyle::with_fill(Rgb888::new(230, 210, 60));
            Triangle::new(Point::new(16, 18), Point::new(10, 27), Point::new(15, 25))
                .into_styled(bolt)
                .draw(&mut tile)
                .ok();
            Triangle::new(Point::new(15, 22), Point::new(20, 24), Point::new(12, 31))
                .into_styled(bolt)
                .draw(&mut tile)
                .ok();
        }
    }
    tile
}

/// Fixed view for displays that opt out of the weather service; also
/// the workhorse for exercising the animator.
pub struct StaticWeather {
    pub night: bool,
    pub extreme: Option<String>,
    pub color: (u8, u8, u8),
}

impl Default for StaticWeather {
    fn default() -> Self {
        StaticWeather {
            night: false,
            extreme: None,
            color: (90, 90, 90),
        }
    }
}

impl WeatherView for StaticWeather {
    fn is_night(&self) -> bool {
        self.night
    }

    fn is_extreme(&self) -> bool {
        self.extreme.is_some()
    }

    fn feels_like(&self) -> Option<String> {
        self.extreme.clone()
    }

    fn temp_color(&self) -> (u8, u8, u8) {
        self.color
    }

    fn summary_tile(&self) -> Canvas {
        Canvas::transparent(32, 32)
    }

    fn icon_tile(&self) -> Canvas {
        Canvas::transparent(32, 32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reading(feels: f64) -> Reading {
        Reading {
            temp_f: feels,
            feels_like_f: feels,
            conditions: Conditions::Clear,
            description: "Clear".into(),
            sunrise: 1_000,
            sunset: 2_000,
        }
    }

    #[test]
    fn test_condition_grouping() {
        assert_eq!(Conditions::from_owm(211), Conditions::Thunder);
        assert_eq!(Conditions::from_owm(302), Conditions::Rain);
        assert_eq!(Conditions::from_owm(521), Conditions::Rain);
        assert_eq!(Conditions::from_owm(601), Conditions::Snow);
        assert_eq!(Conditions::from_owm(741), Conditions::Fog);
        assert_eq!(Conditions::from_owm(800), Conditions::Clear);
        assert_eq!(Conditions::from_owm(804), Conditions::Clouds);
    }

    #[test]
    fn test_night_window_is_outside_sun_hours() {
        let r = reading(70.0);
        assert!(is_night_at(&r, 500));
        assert!(!is_night_at(&r, 1_500));
        assert!(is_night_at(&r, 2_000));
        // missing sun times never claim night
        let mut bare = reading(70.0);
        bare.sunrise = 0;
        bare.sunset = 0;
        assert!(!is_night_at(&bare, 500));
    }

    #[test]
    fn test_temp_formatting_per_units() {
        assert_eq!(format_temp(92.3, Units::Imperial), "92F");
        assert_eq!(format_temp(32.0, Units::Metric), "0C");
    }

    #[test]
    fn test_summary_and_icon_tiles_are_32x32() {
        let tile = draw_summary(&reading(75.0), Units::Imperial);
        assert_eq!((tile.width(), tile.height()), (32, 32));
        for c in [
            Conditions::Thunder,
            Conditions::Rain,
            Conditions::Snow,
            Conditions::Fog,
            Conditions::Clear,
            Conditions::Clouds,
        ] {
            let icon = draw_icon(c);
            assert_eq!((icon.width(), icon.height()), (32, 32));
            let lit = (0..32)
                .flat_map(|y| (0..32).map(move |x| (x, y)))
                .filter(|&(x, y)| icon.get(x, y)[3] == 255)
                .count();
            assert!(lit > 0, "{:?} icon drew nothing", c);
        }
    }

    #[test]
    fn test_static_view_reports_extremes() {
        let view = StaticWeather {
            extreme: Some("steamy 96F".into()),
            ..Default::default()
        };
        assert!(view.is_extreme());
        assert_eq!(view.feels_like().as_deref(), Some("steamy 96F"));
        assert!(!StaticWeather::default().is_extreme());
    }
}
