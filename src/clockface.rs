/*
 *  clockface.rs
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
use chrono::{DateTime, Local, Timelike};
use embedded_graphics::mono_font::MonoTextStyle;
use embedded_graphics::mono_font::ascii::{FONT_9X18_BOLD, FONT_10X20};
use embedded_graphics::pixelcolor::Rgb888;
use embedded_graphics::prelude::*;
use embedded_graphics::text::{Baseline, Text};

use crate::canvas::Canvas;

/// Push a color toward full value; tiles use the weather's temperature
/// color, the digits a brighter cut of it.
pub fn brighten(rgb: (u8, u8, u8)) -> (u8, u8, u8) {
    let up = |c: u8| ((c as f32 * 1.5).min(255.0)) as u8;
    (up(rgb.0), up(rgb.1), up(rgb.2))
}

fn hour12(now: &DateTime<Local>) -> u32 {
    let (_, h) = now.hour12();
    h
}

/// Full-width clock banner for square displays by day: temperature
/// color field with h:mm over it.
pub fn big_clock(now: &DateTime<Local>, width: u32, color: (u8, u8, u8)) -> Canvas {
    const H: u32 = 30;
    let mut tile = Canvas::transparent(width, H);
    tile.fill_rect(0, 0, width, H, color);

    let text = format!("{}:{:02}", hour12(now), now.minute());
    let t_width = text.chars().count() as u32 * 10;
    let x = (width.saturating_sub(t_width) / 2) as i32;
    let bright = brighten(color);

    let shadow = MonoTextStyle::new(&FONT_10X20, Rgb888::BLACK);
    let face = MonoTextStyle::new(&FONT_10X20, Rgb888::new(bright.0, bright.1, bright.2));
    Text::with_baseline(&text, Point::new(x + 2, 7), shadow, Baseline::Top)
        .draw(&mut tile)
        .ok();
    Text::with_baseline(&text, Point::new(x, 5), face, Baseline::Top)
        .draw(&mut tile)
        .ok();
    tile
}

/// Stacked hour/minute tile overlaid on the idle scene's icon corner.
pub fn small_clock(now: &DateTime<Local>, color: (u8, u8, u8)) -> Canvas {
    let mut tile = Canvas::transparent(32, 32);
    let bright = brighten(color);
    let shadow = MonoTextStyle::new(&FONT_9X18_BOLD, Rgb888::BLACK);
    let face = MonoTextStyle::new(&FONT_9X18_BOLD, Rgb888::new(bright.0, bright.1, bright.2));

    for (row, value) in [(0, hour12(now)), (16, now.minute())] {
        let text = format!("{:02}", value);
        Text::with_baseline(&text, Point::new(8, row + 1), shadow, Baseline::Top)
            .draw(&mut tile)
            .ok();
        Text::with_baseline(&text, Point::new(7, row), face, Baseline::Top)
            .draw(&mut tile)
            .ok();
    }
    tile
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(h: u32, m: u32) -> DateTime<Local> {
        Local.with_ymd_and_hms(2026, 8, 24, h, m, 0).unwrap()
    }

    #[test]
    fn test_brighten_clamps() {
        assert_eq!(brighten((100, 200, 0)), (150, 255, 0));
    }

    #[test]
    fn test_big_clock_paints_the_banner() {
        let tile = big_clock(&at(16, 5), 64, (0, 64, 128));
        assert_eq!((tile.width(), tile.height()), (64, 30));
        // corner pixel is the plain temperature field
        assert_eq!(tile.get(0, 0), [0, 64, 128, 255]);
    }

    #[test]
    fn test_small_clock_is_transparent_outside_digits() {
        let tile = small_clock(&at(9, 41), (128, 32, 32));
        assert_eq!((tile.width(), tile.height()), (32, 32));
        assert_eq!(tile.get(0, 31)[3], 0);
    }
}
