/*
 *  canvas.rs
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
use embedded_graphics::pixelcolor::Rgb888;
use embedded_graphics::prelude::*;
use image::RgbaImage;

/// RGBA frame buffer the animation layer composes into. Implements
/// `DrawTarget` so embedded-graphics text and primitives draw straight
/// onto it; drawn pixels are opaque.
#[derive(Debug, Clone, PartialEq)]
pub struct Canvas {
    width: u32,
    height: u32,
    data: Vec<u8>, // RGBA, row-major
}

impl Canvas {
    /// Opaque black canvas — the base layer for every scene.
    pub fn opaque(width: u32, height: u32) -> Self {
        let mut data = vec![0u8; (width * height * 4) as usize];
        for px in data.chunks_exact_mut(4) {
            px[3] = 255;
        }
        Canvas { width, height, data }
    }

    /// Fully transparent canvas, for overlays.
    pub fn transparent(width: u32, height: u32) -> Self {
        Canvas {
            width,
            height,
            data: vec![0u8; (width * height * 4) as usize],
        }
    }

    pub fn from_image(img: &RgbaImage) -> Self {
        Canvas {
            width: img.width(),
            height: img.height(),
            data: img.as_raw().clone(),
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn rgba(&self) -> &[u8] {
        &self.data
    }

    #[inline]
    fn idx(&self, x: u32, y: u32) -> usize {
        ((y * self.width + x) * 4) as usize
    }

    pub fn put(&mut self, x: u32, y: u32, px: [u8; 4]) {
        if x < self.width && y < self.height {
            let i = self.idx(x, y);
            self.data[i..i + 4].copy_from_slice(&px);
        }
    }

    pub fn get(&self, x: u32, y: u32) -> [u8; 4] {
        let i = self.idx(x, y);
        [self.data[i], self.data[i + 1], self.data[i + 2], self.data[i + 3]]
    }

    /// Opaque copy of `src` at `dest`; source pixels replace destination
    /// pixels outright. Out-of-bounds regions are clipped.
    pub fn paste(&mut self, src: &Canvas, dest: (i32, i32)) {
        self.blit(src, dest, false);
    }

    /// Standard "over" alpha composite of `src` at `dest`.
    pub fn alpha_composite(&mut self, src: &Canvas, dest: (i32, i32)) {
        self.blit(src, dest, true);
    }

    fn blit(&mut self, src: &Canvas, dest: (i32, i32), blend: bool) {
        for sy in 0..src.height {
            let dy = dest.1 + sy as i32;
            if dy < 0 || dy >= self.height as i32 {
                continue;
            }
            for sx in 0..src.width {
                let dx = dest.0 + sx as i32;
                if dx < 0 || dx >= self.width as i32 {
                    continue;
                }
                let s = src.get(sx, sy);
                if !blend {
                    self.put(dx as u32, dy as u32, s);
                    continue;
                }
                let a = s[3] as u32;
                if a == 0 {
                    continue;
                }
                if a == 255 {
                    self.put(dx as u32, dy as u32, s);
                    continue;
                }
                let d = self.get(dx as u32, dy as u32);
                let inv = 255 - a;
                let over = |sc: u8, dc: u8| -> u8 {
                    ((sc as u32 * a + dc as u32 * inv) / 255) as u8
                };
                self.put(
                    dx as u32,
                    dy as u32,
                    [over(s[0], d[0]), over(s[1], d[1]), over(s[2], d[2]), d[3].max(a as u8)],
                );
            }
        }
    }

    /// New canvas with RGB channels scaled by `factor` (clamped).
    /// Alpha is untouched; this is what the attack fade ramps.
    pub fn brightness(&self, factor: f32) -> Canvas {
        let mut out = self.clone();
        for px in out.data.chunks_exact_mut(4) {
            for c in &mut px[..3] {
                *c = ((*c as f32 * factor).round().clamp(0.0, 255.0)) as u8;
            }
        }
        out
    }

    pub fn fill_rect(&mut self, x: i32, y: i32, w: u32, h: u32, rgb: (u8, u8, u8)) {
        for dy in 0..h as i32 {
            for dx in 0..w as i32 {
                let (px, py) = (x + dx, y + dy);
                if px >= 0 && py >= 0 && (px as u32) < self.width && (py as u32) < self.height {
                    self.put(px as u32, py as u32, [rgb.0, rgb.1, rgb.2, 255]);
                }
            }
        }
    }
}

impl OriginDimensions for Canvas {
    fn size(&self) -> Size {
        Size::new(self.width, self.height)
    }
}

impl DrawTarget for Canvas {
    type Color = Rgb888;
    type Error = core::convert::Infallible;

    fn draw_iter<I>(&mut self, pixels: I) -> Result<(), Self::Error>
    where
        I: IntoIterator<Item = Pixel<Self::Color>>,
    {
        for Pixel(pt, color) in pixels {
            if pt.x >= 0 && pt.y >= 0 {
                self.put(pt.x as u32, pt.y as u32, [color.r(), color.g(), color.b(), 255]);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opaque_vs_transparent() {
        let c = Canvas::opaque(4, 4);
        assert_eq!(c.get(0, 0), [0, 0, 0, 255]);
        let t = Canvas::transparent(4, 4);
        assert_eq!(t.get(0, 0), [0, 0, 0, 0]);
    }

    #[test]
    fn test_alpha_composite_over() {
        let mut base = Canvas::opaque(2, 1);
        base.put(0, 0, [100, 100, 100, 255]);
        let mut over = Canvas::transparent(2, 1);
        over.put(0, 0, [200, 0, 0, 128]);
        base.alpha_composite(&over, (0, 0));
        let px = base.get(0, 0);
        // roughly midway between base and overlay red
        assert!(px[0] > 140 && px[0] < 160, "got {:?}", px);
        // transparent overlay pixel leaves the base alone
        assert_eq!(base.get(1, 0), [0, 0, 0, 255]);
    }

    #[test]
    fn test_paste_clips_out_of_bounds() {
        let mut base = Canvas::opaque(4, 4);
        let mut src = Canvas::opaque(4, 4);
        src.fill_rect(0, 0, 4, 4, (9, 9, 9));
        base.paste(&src, (2, 2));
        assert_eq!(base.get(3, 3), [9, 9, 9, 255]);
        assert_eq!(base.get(1, 1), [0, 0, 0, 255]);
    }

    #[test]
    fn test_brightness_scales_and_clamps() {
        let mut c = Canvas::opaque(1, 1);
        c.put(0, 0, [100, 200, 0, 255]);
        let half = c.brightness(0.5);
        assert_eq!(half.get(0, 0), [50, 100, 0, 255]);
        let hot = c.brightness(2.0);
        assert_eq!(hot.get(0, 0), [200, 255, 0, 255]);
    }
}
