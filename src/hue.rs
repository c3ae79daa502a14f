//! Hue selection and hue interpolation for the seconds ring.
//!
//! Hues live in a 16-bit circular space (0..=65535 is one trip around the
//! color wheel), so every hue is a plain `u16` and wrapping arithmetic gives
//! us the modulus for free.
//!
//! ## Rust concepts
//! - `wrapping_add` for modular arithmetic without overflow panics
//! - Signed division (`i32 / i32`) truncates toward zero
//! - `rem_euclid` to fold a negative value back into an unsigned range

use rand::Rng;

/// A point on the color wheel, 0..=65535.
pub type Hue = u16;

/// Number of distinct hues (the modulus of the hue space).
pub const HUE_SPACE: i32 = 1 << 16;

/// 0.618033988749895 * 2^16, truncated.
pub const GOLDEN_RATIO_CONJUGATE: Hue = 40503;

// ── Hue Generator ───────────────────────────────────────────────────

/// Produces a well-spread sequence of hues.
///
/// Each call steps the previous hue by the golden-ratio conjugate of the
/// hue space. The additive recurrence never repeats a nearby color twice
/// in a row and needs no history.
/// See <https://martin.ankerl.com/2009/12/09/how-to-create-random-colors-programmatically/>.
#[derive(Clone, Debug)]
pub struct HueGenerator {
    last: Hue,
}

impl HueGenerator {
    /// Start the sequence from a fixed hue. Used by tests and for
    /// reproducible runs.
    pub fn from_seed(seed: Hue) -> Self {
        Self { last: seed }
    }

    /// Start the sequence from a random hue.
    pub fn from_entropy() -> Self {
        let seed = rand::rng().random_range(1..Hue::MAX);
        tracing::debug!("hue generator seeded with {}", seed);
        Self::from_seed(seed)
    }

    /// The most recently produced hue (or the seed, before the first call).
    pub fn last(&self) -> Hue {
        self.last
    }

    /// Advance the sequence and return the new hue.
    pub fn next_hue(&mut self) -> Hue {
        self.last = self.last.wrapping_add(GOLDEN_RATIO_CONJUGATE);
        tracing::debug!("hue is now: {}", self.last);
        self.last
    }
}

// ── Hue Interpolator ────────────────────────────────────────────────

/// Hue `current_step` steps of the way from `previous` to `target`.
///
/// The per-step delta is `(target - previous) / total_steps` using truncating
/// integer division, so the final step lands on `target` only when the
/// distance divides evenly. This is a straight line in hue units, not the
/// shorter arc around the wheel: going from 60000 to 1000 sweeps backwards
/// through every hue in between.
///
/// `total_steps` must be non-zero; callers pass `1..=total_steps` as
/// `current_step`.
pub fn interpolate(previous: Hue, target: Hue, total_steps: u16, current_step: u16) -> Hue {
    debug_assert!(total_steps > 0, "interpolate called with zero steps");

    let per_step = (i32::from(target) - i32::from(previous)) / i32::from(total_steps);
    let hue = i32::from(previous) + per_step * i32::from(current_step);

    hue.rem_euclid(HUE_SPACE) as Hue
}
