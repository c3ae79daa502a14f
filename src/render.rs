//! Hardware renderer: draws the seconds ring onto an RGB LED matrix panel.
//!
//! The `rpi-led-matrix` C library is not thread-safe, so the renderer must be
//! created on the animation thread and never leave it. Ring positions are
//! laid out on a circle (see `PanelConfig::ring_positions`) and each one is
//! drawn as a small square dot.
//!
//! ## Rust concepts
//! - `Option::take()` to move the canvas out for `swap()` and put the
//!   returned one back
//! - Implementing a crate-local trait (`PixelRenderer`) for a hardware type

use crate::hue::Hue;
use crate::pixels::{FrameBuffer, PixelRenderer};
use crate::{Color, PanelConfig, create_matrix};
use rpi_led_matrix::{LedCanvas, LedColor, LedMatrix};

/// Side length of the square drawn for each ring position.
const DOT_SIZE: i32 = 2;

pub struct MatrixRingRenderer {
    matrix: LedMatrix,
    // `None` only for the instant between `take()` and `swap()` in `show()`.
    canvas: Option<LedCanvas>,
    positions: Vec<(i32, i32)>,
    buffer: FrameBuffer,
}

impl MatrixRingRenderer {
    /// Initialise the matrix and lay out `ring_size` positions on it.
    pub fn new(panel: PanelConfig, ring_size: u16) -> Result<Self, Box<dyn std::error::Error>> {
        let matrix = create_matrix(panel)?;
        let mut canvas = matrix.offscreen_canvas();
        canvas.clear();
        let canvas = matrix.swap(canvas);

        tracing::info!(
            "LED ring of {} pixels on a {}x{} panel",
            ring_size,
            panel.cols,
            panel.rows
        );

        Ok(Self {
            matrix,
            canvas: Some(canvas),
            positions: panel.ring_positions(ring_size),
            buffer: FrameBuffer::new(usize::from(ring_size)),
        })
    }

    fn draw_dot(canvas: &mut LedCanvas, (x, y): (i32, i32), color: Color) {
        let color: LedColor = color.into();
        for dy in 0..DOT_SIZE {
            for dx in 0..DOT_SIZE {
                canvas.set(x + dx - DOT_SIZE / 2, y + dy - DOT_SIZE / 2, &color);
            }
        }
    }
}

impl PixelRenderer for MatrixRingRenderer {
    fn len(&self) -> usize {
        self.buffer.len()
    }

    fn set_pixel(&mut self, index: usize, hue: Hue, saturation: u8, brightness: u8) {
        self.buffer
            .set(index, Color::from_hsv(hue, saturation, brightness));
    }

    /// The offscreen canvas holds a stale frame after each swap, so every
    /// position is redrawn from the frame buffer.
    fn show(&mut self) {
        let Some(mut canvas) = self.canvas.take() else {
            return;
        };

        canvas.clear();
        for (&position, &color) in self.positions.iter().zip(self.buffer.pixels()) {
            Self::draw_dot(&mut canvas, position, color);
        }

        self.canvas = Some(self.matrix.swap(canvas));
    }
}
