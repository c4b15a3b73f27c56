/*
 *  sink.rs
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
use std::fs::OpenOptions;
use std::path::Path;

use log::info;
use memmap2::{MmapMut, MmapOptions};
use thiserror::Error;

use crate::canvas::Canvas;

/// Brightness multiplier applied after dark.
const NIGHT_DIM: f32 = 0.5;

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("framebuffer i/o failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("frame is {got_w}x{got_h}, panel expects {want_w}x{want_h}")]
    Geometry {
        got_w: u32,
        got_h: u32,
        want_w: u32,
        want_h: u32,
    },
}

/// Terminal stage of the pipeline. One call presents one complete
/// frame; the night flag halves panel brightness after dark.
pub trait FrameSink: Send {
    fn width(&self) -> u32;
    fn height(&self) -> u32;
    fn swap(&mut self, frame: &Canvas, night: bool) -> Result<(), SinkError>;
}

/// Memory-mapped RGB framebuffer panel. Gamma correction happens here
/// so every upstream stage works in linear 8-bit color.
pub struct FramebufferSink {
    width: u32,
    height: u32,
    lut: [u8; 256],
    mmap: MmapMut,
}

impl FramebufferSink {
    pub fn open(path: &Path, width: u32, height: u32, gamma: f32) -> Result<Self, SinkError> {
        let size = (width * height * 3) as usize;
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        // ftruncate is for regular files; /dev/fbN rejects it
        if file.metadata()?.is_file() {
            file.set_len(size as u64)?;
        }
        let mmap = unsafe { MmapOptions::new().len(size).map_mut(&file)? };
        info!(
            "panel {}x{} mapped at {} (gamma {:.2})",
            width,
            height,
            path.display(),
            gamma
        );
        Ok(FramebufferSink {
            width,
            height,
            lut: gamma_lut(gamma),
            mmap,
        })
    }
}

/// 256-entry correction table; gamma 1.0 degenerates to identity.
fn gamma_lut(gamma: f32) -> [u8; 256] {
    let mut lut = [0u8; 256];
    for (i, v) in lut.iter_mut().enumerate() {
        let norm = i as f32 / 255.0;
        *v = (norm.powf(gamma) * 255.0 + 0.5) as u8;
    }
    lut
}

impl FrameSink for FramebufferSink {
    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }

    fn swap(&mut self, frame: &Canvas, night: bool) -> Result<(), SinkError> {
        if frame.width() != self.width || frame.height() != self.height {
            return Err(SinkError::Geometry {
                got_w: frame.width(),
                got_h: frame.height(),
                want_w: self.width,
                want_h: self.height,
            });
        }
        let dim = if night { NIGHT_DIM } else { 1.0 };
        for (dst, src) in self.mmap.chunks_exact_mut(3).zip(frame.rgba().chunks_exact(4)) {
            for c in 0..3 {
                let scaled = (src[c] as f32 * dim) as usize;
                dst[c] = self.lut[scaled];
            }
        }
        self.mmap.flush()?;
        Ok(())
    }
}

#[cfg(test)]
pub mod mock {
    use super::*;

    /// Records every presented frame so tests can replay the animation.
    pub struct MockSink {
        width: u32,
        height: u32,
        pub frames: Vec<(Canvas, bool)>,
    }

    impl MockSink {
        pub fn new(width: u32, height: u32) -> Self {
            MockSink {
                width,
                height,
                frames: Vec::new(),
            }
        }
    }

    impl FrameSink for MockSink {
        fn width(&self) -> u32 {
            self.width
        }

        fn height(&self) -> u32 {
            self.height
        }

        fn swap(&mut self, frame: &Canvas, night: bool) -> Result<(), SinkError> {
            if frame.width() != self.width || frame.height() != self.height {
                return Err(SinkError::Geometry {
                    got_w: frame.width(),
                    got_h: frame.height(),
                    want_w: self.width,
                    want_h: self.height,
                });
            }
            self.frames.push((frame.clone(), night));
            Ok(())
        }
    }
}
