//! Seconds ring for a network-connected LED clock.
//!
//! Once a minute the ring sweeps from the previous color to a freshly picked
//! one, lighting one LED after another so the sweep itself shows the seconds.
//! This crate holds the pieces of that animation:
//! - `hue`: picking the next color and blending towards it
//! - `cue`: the "new minute" wake-up between the clock and the ring
//! - `settings`: live saturation/brightness and the config decoder
//! - `animation`: the deadline-paced state machine that drives a cycle
//! - `pixels` / `render`: where the colors end up
//! - `server`: HTTP control surface
//!
//! Shared types (ring layout, panel geometry, color) live here.

pub mod animation;
pub mod cue;
pub mod hue;
pub mod pixels;
#[cfg(feature = "hardware")]
pub mod render;
pub mod server;
pub mod settings;

use crate::cue::CueGate;
#[cfg(feature = "hardware")]
use rpi_led_matrix::{LedMatrix, LedMatrixOptions, LedRuntimeOptions};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use thiserror::Error;

// ── Ring layout ────────────────────────────────────────────────────

/// How a cycle is cut up: pixels, steps per pixel and total length.
///
/// # Rust concept: derive macros
/// `Clone, Copy` make this cheaply copyable, it's a handful of integers.
/// Passing it by value into each thread beats sharing it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RingLayout {
    /// Number of LEDs on the ring
    pub ring_size: u16,
    /// Sub-steps each LED is faded through
    pub steps_per_pixel: u16,
    /// Nominal length of one cycle (one minute on the clock)
    pub cycle: Duration,
    /// Steps skipped on the last LED, so a cycle ends a little early and is
    /// ready before the next cue
    pub last_pixel_skip: u16,
}

pub const DEFAULT_RING_SIZE: u16 = 60;
pub const DEFAULT_STEPS_PER_PIXEL: u16 = 40;
pub const DEFAULT_CYCLE: Duration = Duration::from_secs(60);
pub const DEFAULT_LAST_PIXEL_SKIP: u16 = 2;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LayoutError {
    #[error("ring must have at least one pixel")]
    EmptyRing,
    #[error("each pixel needs at least one step")]
    NoSteps,
    #[error("last pixel skip ({skip}) must be smaller than steps per pixel ({steps})")]
    SkipTooLarge { skip: u16, steps: u16 },
    #[error("cycle of {0:?} is too short for one frame per step")]
    CycleTooShort(Duration),
}

impl RingLayout {
    pub fn new(ring_size: u16, steps_per_pixel: u16, cycle: Duration) -> Self {
        Self {
            ring_size,
            steps_per_pixel,
            cycle,
            last_pixel_skip: DEFAULT_LAST_PIXEL_SKIP,
        }
    }

    pub fn with_last_pixel_skip(mut self, skip: u16) -> Self {
        self.last_pixel_skip = skip;
        self
    }

    /// Check the layout can drive a cycle.
    pub fn validate(&self) -> Result<(), LayoutError> {
        if self.ring_size == 0 {
            return Err(LayoutError::EmptyRing);
        }
        if self.steps_per_pixel == 0 {
            return Err(LayoutError::NoSteps);
        }
        if self.last_pixel_skip >= self.steps_per_pixel {
            return Err(LayoutError::SkipTooLarge {
                skip: self.last_pixel_skip,
                steps: self.steps_per_pixel,
            });
        }
        if self.frame_period().is_zero() {
            return Err(LayoutError::CycleTooShort(self.cycle));
        }
        Ok(())
    }

    /// Step count if every pixel got all its steps.
    pub fn nominal_frames(&self) -> u32 {
        u32::from(self.ring_size) * u32::from(self.steps_per_pixel)
    }

    /// Frames actually rendered per cycle, after the last-pixel skip.
    pub fn frames_per_cycle(&self) -> u32 {
        self.nominal_frames()
            .saturating_sub(u32::from(self.last_pixel_skip))
    }

    /// Time between two frames. The cycle is divided over the nominal frame
    /// count, so the skipped steps become slack at the end of the cycle.
    pub fn frame_period(&self) -> Duration {
        match self.nominal_frames() {
            0 => Duration::ZERO,
            frames => self.cycle / frames,
        }
    }
}

impl Default for RingLayout {
    fn default() -> Self {
        Self::new(DEFAULT_RING_SIZE, DEFAULT_STEPS_PER_PIXEL, DEFAULT_CYCLE)
    }
}

// ── Panel configuration ────────────────────────────────────────────

/// Dimensions of the LED matrix panel the ring is drawn on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PanelConfig {
    pub rows: u32,
    pub cols: u32,
}

impl PanelConfig {
    pub fn new(rows: u32, cols: u32) -> Self {
        Self { rows, cols }
    }

    /// Where each ring position lands on the panel.
    ///
    /// Position 0 sits at twelve o'clock and the ring runs clockwise, like a
    /// second hand. The circle keeps a 2px margin from the panel edge.
    pub fn ring_positions(&self, ring_size: u16) -> Vec<(i32, i32)> {
        let cx = self.cols as f32 / 2.0;
        let cy = self.rows as f32 / 2.0;
        let radius = (self.rows.min(self.cols) as f32 / 2.0 - 2.0).max(0.0);

        (0..ring_size)
            .map(|i| {
                let turn = f32::from(i) / f32::from(ring_size);
                let angle = turn * std::f32::consts::TAU - std::f32::consts::FRAC_PI_2;
                let x = cx + radius * angle.cos();
                let y = cy + radius * angle.sin();
                (x.round() as i32, y.round() as i32)
            })
            .collect()
    }
}

impl Default for PanelConfig {
    fn default() -> Self {
        Self { rows: 64, cols: 64 }
    }
}

// ── Color ──────────────────────────────────────────────────────────

/// Our own color type, decoupled from the hardware crate.
///
/// This lets us test color logic on any machine without `rpi-led-matrix`.
/// At the hardware boundary, we convert via `Into<LedColor>`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    pub fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Convert a 16-bit hue plus 8-bit saturation and value to RGB.
    ///
    /// The wheel is split into six 255-wide ramps (1530 steps around),
    /// then saturation and value are applied with `(x * (1 + k)) >> 8`
    /// so that 255 means "unchanged" and 0 means "none".
    ///
    /// # Rust concept: match with guards
    /// Each arm picks one sector of the wheel; the final `_` arm covers
    /// the single rounding overflow back to pure red.
    pub fn from_hsv(hue: u16, saturation: u8, value: u8) -> Self {
        let hue = (u32::from(hue) * 1530 + 32768) / 65536;

        let (r, g, b) = match hue {
            h if h < 255 => (255, h, 0), // Red → Yellow
            h if h < 510 => (510 - h, 255, 0), // Yellow → Green
            h if h < 765 => (0, 255, h - 510), // Green → Cyan
            h if h < 1020 => (0, 1020 - h, 255), // Cyan → Blue
            h if h < 1275 => (h - 1020, 0, 255), // Blue → Magenta
            h if h < 1530 => (255, 0, 1530 - h), // Magenta → Red
            _ => (255, 0, 0),
        };

        let v1 = 1 + u32::from(value);
        let s1 = 1 + u32::from(saturation);
        let s2 = 255 - u32::from(saturation);
        let scale = |c: u32| (((((c * s1) >> 8) + s2) * v1) >> 8) as u8;

        Self::new(scale(r), scale(g), scale(b))
    }

    pub fn to_hex(self) -> String {
        format!("{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
}

/// Convert our Color to the hardware crate's LedColor at the boundary.
#[cfg(feature = "hardware")]
impl From<Color> for rpi_led_matrix::LedColor {
    fn from(c: Color) -> Self {
        rpi_led_matrix::LedColor {
            red: c.r,
            green: c.g,
            blue: c.b,
        }
    }
}

// ── Matrix initialization ──────────────────────────────────────────

/// Create a matrix configured for our hardware:
/// Pi Zero 2 W + Adafruit Bonnet + configurable panel size.
///
/// # Rust concept: Result and the ? operator
/// This function returns `Result` because matrix initialization can fail
/// (e.g., if not running as root, or if GPIO is unavailable).
#[cfg(feature = "hardware")]
pub fn create_matrix(panel: PanelConfig) -> Result<LedMatrix, Box<dyn std::error::Error>> {
    let mut options = LedMatrixOptions::new();
    options.set_rows(panel.rows);
    options.set_cols(panel.cols);
    options.set_hardware_mapping("adafruit-hat");

    options.set_pwm_bits(8)?;
    options.set_pwm_lsb_nanoseconds(130);

    let mut rt_options = LedRuntimeOptions::new();
    rt_options.set_gpio_slowdown(2); // Pi Zero 2 W requires slowdown=2

    let matrix = LedMatrix::new(Some(options), Some(rt_options))?;

    Ok(matrix)
}

// ── Shutdown ───────────────────────────────────────────────────────

/// Install a Ctrl+C handler that clears `running` and closes the cue gate.
///
/// # Rust concept: Arc and AtomicBool
/// The flag is shared between the handler, the HTTP server and the minute
/// producer. `AtomicBool` is a thread-safe boolean, no mutex needed.
pub fn setup_signal_handler(gate: Arc<CueGate>) -> Result<Arc<AtomicBool>, ctrlc::Error> {
    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone(); // Clone the Arc, not the bool

    ctrlc::set_handler(move || {
        tracing::info!("shutdown requested");
        r.store(false, Ordering::SeqCst);
        gate.close();
    })?;

    Ok(running)
}

/// Check if the process should keep running.
pub fn is_running(running: &AtomicBool) -> bool {
    running.load(Ordering::SeqCst)
}

// ── Tests ──────────────────────────────────────────────────────────
