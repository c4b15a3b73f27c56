/*
 *  overlay.rs
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
use embedded_graphics::mono_font::MonoTextStyle;
use embedded_graphics::mono_font::ascii::FONT_6X10;
use embedded_graphics::pixelcolor::Rgb888;
use embedded_graphics::prelude::*;
use embedded_graphics::text::{Baseline, Text};

use crate::canvas::Canvas;
use crate::track::Track;

const CHAR_W: u32 = 6;
const LINE_H: u32 = 10;
const TEXT_GRAY: Rgb888 = Rgb888::new(192, 192, 192);

/// Pixel width of a line in the overlay font.
pub fn text_width(line: &str) -> u32 {
    line.chars().count() as u32 * CHAR_W
}

/// Lines shown over the art. With no art the album gets its own line
/// (there's more empty space to fill).
pub fn track_lines(track: &Track, has_art: bool) -> Vec<String> {
    if has_art {
        vec![track.title.clone(), track.artist.clone()]
    } else {
        vec![track.title.clone(), track.album.clone(), track.artist.clone()]
    }
}

/// Rasterize lines onto a transparent canvas sized to the text, light
/// gray over a one-pixel black drop shadow.
pub fn layout_text(lines: &[String]) -> Canvas {
    let width = lines.iter().map(|l| text_width(l)).max().unwrap_or(0);
    let height = lines.len() as u32 * LINE_H;
    let mut canvas = Canvas::transparent(width + 2, height + 1);

    let shadow = MonoTextStyle::new(&FONT_6X10, Rgb888::BLACK);
    let face = MonoTextStyle::new(&FONT_6X10, TEXT_GRAY);
    for (i, line) in lines.iter().enumerate() {
        let y = (i as u32 * LINE_H) as i32;
        Text::with_baseline(line, Point::new(2, y + 1), shadow, Baseline::Top)
            .draw(&mut canvas)
            .ok();
        Text::with_baseline(line, Point::new(1, y), face, Baseline::Top)
            .draw(&mut canvas)
            .ok();
    }
    canvas
}
