/*
 *  life.rs
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
use rand::Rng;

use crate::canvas::Canvas;

/// Reseed when the population drops below this fraction of the board.
const RESEED_FRACTION: f64 = 0.02;

/// Generative tile for the night idle scene: Conway's Life on a torus,
/// survivors drawn dimmer than births so the board shimmers. Reseeds
/// itself when a board dies out or freezes.
pub struct LifeTile {
    width: usize,
    height: usize,
    cells: Vec<bool>,
    ages: Vec<u8>, // 0 dead, 1 newborn, 2 survivor
}

impl LifeTile {
    pub fn new(width: u32, height: u32) -> Self {
        let (width, height) = (width as usize, height as usize);
        let mut tile = LifeTile {
            width,
            height,
            cells: vec![false; width * height],
            ages: vec![0; width * height],
        };
        tile.reseed();
        tile
    }

    fn reseed(&mut self) {
        let mut rng = rand::rng();
        for (cell, age) in self.cells.iter_mut().zip(self.ages.iter_mut()) {
            *cell = rng.random_bool(0.5);
            *age = if *cell { 1 } else { 0 };
        }
    }

    fn neighbors(&self, x: usize, y: usize) -> usize {
        let mut n = 0;
        for dy in [self.height - 1, 0, 1] {
            for dx in [self.width - 1, 0, 1] {
                if dx == 0 && dy == 0 {
                    continue;
                }
                let nx = (x + dx) % self.width;
                let ny = (y + dy) % self.height;
                if self.cells[ny * self.width + nx] {
                    n += 1;
                }
            }
        }
        n
    }

    pub fn population(&self) -> usize {
        self.cells.iter().filter(|c| **c).count()
    }

    /// Advance one generation; reseeds on collapse or stasis.
    pub fn step(&mut self) {
        let mut next = vec![false; self.width * self.height];
        let mut ages = vec![0u8; self.width * self.height];
        for y in 0..self.height {
            for x in 0..self.width {
                let i = y * self.width + x;
                let n = self.neighbors(x, y);
                let alive = self.cells[i];
                if alive && (n == 2 || n == 3) {
                    next[i] = true;
                    ages[i] = 2;
                } else if !alive && n == 3 {
                    next[i] = true;
                    ages[i] = 1;
                }
            }
        }

        let stalled = next == self.cells;
        self.cells = next;
        self.ages = ages;

        let floor = (self.width * self.height) as f64 * RESEED_FRACTION;
        if stalled || (self.population() as f64) < floor {
            self.reseed();
        }
    }

    /// Render into a transparent canvas; dead cells stay transparent so
    /// the tile composes over the idle scene.
    pub fn render(&self) -> Canvas {
        let mut canvas = Canvas::transparent(self.width as u32, self.height as u32);
        for y in 0..self.height {
            for x in 0..self.width {
                match self.ages[y * self.width + x] {
                    1 => canvas.put(x as u32, y as u32, [64, 64, 64, 255]),
                    2 => canvas.put(x as u32, y as u32, [128, 128, 128, 255]),
                    _ => {}
                }
            }
        }
        canvas
    }
}
