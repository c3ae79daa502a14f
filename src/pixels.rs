//! The pixel renderer contract and the renderers that don't need hardware.
//!
//! The animation only ever says "pixel N is now (hue, saturation,
//! brightness)" and "show the frame". How that reaches LEDs (or a log, or a
//! test) is up to the `PixelRenderer` implementation.
//!
//! ## Rust concepts
//! - Traits as the seam between the animation and the output device
//! - Generic code over `R: PixelRenderer` instead of trait objects

use crate::Color;
use crate::hue::Hue;

/// Output device for the ring: an ordered, fixed-size row of pixels.
///
/// Pixels hold their last color until written again, so the animation only
/// writes the pixel it is currently fading.
pub trait PixelRenderer {
    /// Number of pixels on the ring.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Stage one pixel. Nothing is visible until `show()`.
    fn set_pixel(&mut self, index: usize, hue: Hue, saturation: u8, brightness: u8);

    /// Push the staged frame out.
    fn show(&mut self);
}

// ── Frame buffer ─────────────────────────────────────────────────────

/// The last color written to each ring position.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FrameBuffer {
    pixels: Vec<Color>,
}

impl FrameBuffer {
    /// All pixels start dark.
    pub fn new(len: usize) -> Self {
        Self {
            pixels: vec![Color::default(); len],
        }
    }

    pub fn len(&self) -> usize {
        self.pixels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pixels.is_empty()
    }

    /// Write one pixel. Out-of-range writes are dropped and reported.
    pub fn set(&mut self, index: usize, color: Color) -> bool {
        match self.pixels.get_mut(index) {
            Some(slot) => {
                *slot = color;
                true
            }
            None => {
                tracing::warn!(
                    "pixel {} is outside the ring ({} pixels)",
                    index,
                    self.pixels.len()
                );
                false
            }
        }
    }

    pub fn get(&self, index: usize) -> Option<Color> {
        self.pixels.get(index).copied()
    }

    pub fn pixels(&self) -> &[Color] {
        &self.pixels
    }

    /// The whole ring as one hex string per pixel, space separated.
    pub fn to_hex_line(&self) -> String {
        self.pixels
            .iter()
            .map(|c| c.to_hex())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

// ── Headless renderer ────────────────────────────────────────────────

/// Renderer with no LEDs attached: keeps the frame in memory and logs it.
///
/// Used when the binary runs without the `hardware` feature or with
/// `--headless`. Each shown frame is logged at trace level.
#[derive(Debug)]
pub struct HeadlessRenderer {
    buffer: FrameBuffer,
    frames_shown: u64,
}

impl HeadlessRenderer {
    pub fn new(len: usize) -> Self {
        Self {
            buffer: FrameBuffer::new(len),
            frames_shown: 0,
        }
    }

    pub fn buffer(&self) -> &FrameBuffer {
        &self.buffer
    }

    pub fn frames_shown(&self) -> u64 {
        self.frames_shown
    }
}

impl PixelRenderer for HeadlessRenderer {
    fn len(&self) -> usize {
        self.buffer.len()
    }

    fn set_pixel(&mut self, index: usize, hue: Hue, saturation: u8, brightness: u8) {
        self.buffer
            .set(index, Color::from_hsv(hue, saturation, brightness));
    }

    fn show(&mut self) {
        self.frames_shown += 1;
        tracing::trace!("frame {}: {}", self.frames_shown, self.buffer.to_hex_line());
    }
}
