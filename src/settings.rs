//! Live ring settings and the control-message decoder that updates them.
//!
//! The animation thread reads saturation and brightness on every frame while
//! the control surface may overwrite them at any moment. Each field is an
//! `AtomicU8`, so neither side ever waits on a lock.
//!
//! Control messages are the clock's JSON config document, e.g.
//! `{"ledRingBrightness": 10, "ledRingSaturation": "242"}`. Each field is
//! validated on its own: a bad value is rejected and the old one kept, and
//! the rest of the message still applies.
//!
//! ## Rust concepts
//! - Atomics (`AtomicU8`) instead of `Mutex` for single-word shared state
//! - `#[serde(rename = ...)]` to map camelCase JSON keys onto Rust fields
//! - `thiserror` for error enums with readable `Display` output

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::atomic::{AtomicU8, Ordering};
use thiserror::Error;

/// Highest accepted saturation or brightness.
pub const LEVEL_MAX: u8 = 254;

pub const DEFAULT_SATURATION: u8 = 242;
pub const DEFAULT_BRIGHTNESS: u8 = 24;

pub const BRIGHTNESS_FIELD: &str = "ledRingBrightness";
pub const SATURATION_FIELD: &str = "ledRingSaturation";

// ── Errors ───────────────────────────────────────────────────────────

/// The message as a whole could not be read. Nothing was changed.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unable to decode control message: {0}")]
    Decode(#[from] serde_json::Error),
}

/// A single field was refused. Its previous value stays in place.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum FieldRejection {
    #[error("'{field}' is not a number: {value}")]
    NotANumber { field: &'static str, value: String },
    #[error("'{field}' must be within 0..={max}, got {value}")]
    OutOfRange {
        field: &'static str,
        value: i64,
        max: u8,
    },
}

// ── Settings ─────────────────────────────────────────────────────────

/// Saturation and brightness as read by the animation, one value each.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, utoipa::ToSchema)]
pub struct RingLevels {
    /// Pixel saturation (0-254)
    pub saturation: u8,
    /// Pixel brightness (0-254)
    pub brightness: u8,
}

/// Process-wide ring settings, shared behind an `Arc`.
///
/// Last write wins. Readers see each field independently, there is no
/// snapshot that ties a saturation to a brightness.
#[derive(Debug)]
pub struct RingSettings {
    saturation: AtomicU8,
    brightness: AtomicU8,
}

impl RingSettings {
    /// Values above `LEVEL_MAX` are clamped.
    pub fn new(saturation: u8, brightness: u8) -> Self {
        Self {
            saturation: AtomicU8::new(saturation.min(LEVEL_MAX)),
            brightness: AtomicU8::new(brightness.min(LEVEL_MAX)),
        }
    }

    // Fields are independent, so Relaxed is enough: no other memory is
    // published through them.

    pub fn saturation(&self) -> u8 {
        self.saturation.load(Ordering::Relaxed)
    }

    pub fn brightness(&self) -> u8 {
        self.brightness.load(Ordering::Relaxed)
    }

    pub fn levels(&self) -> RingLevels {
        RingLevels {
            saturation: self.saturation(),
            brightness: self.brightness(),
        }
    }

    pub fn set_saturation(&self, value: u8) -> Result<(), FieldRejection> {
        store_level(&self.saturation, SATURATION_FIELD, i64::from(value))
    }

    pub fn set_brightness(&self, value: u8) -> Result<(), FieldRejection> {
        store_level(&self.brightness, BRIGHTNESS_FIELD, i64::from(value))
    }

    /// Decode a JSON control message and apply every ring field it carries.
    ///
    /// Missing, `null` and empty fields are left alone. Keys that belong to
    /// other parts of the clock are ignored.
    pub fn apply_control_message(&self, json: &str) -> Result<ConfigReport, ConfigError> {
        tracing::debug!("incoming config message: {}", json);

        let message: ControlMessage = serde_json::from_str(json)
            .inspect_err(|e| tracing::error!("unable to deserialize config message: {}", e))?;

        let mut report = ConfigReport::default();
        apply_field(
            &self.brightness,
            BRIGHTNESS_FIELD,
            message.led_ring_brightness.as_ref(),
            &mut report,
        );
        apply_field(
            &self.saturation,
            SATURATION_FIELD,
            message.led_ring_saturation.as_ref(),
            &mut report,
        );

        Ok(report)
    }
}

impl Default for RingSettings {
    fn default() -> Self {
        Self::new(DEFAULT_SATURATION, DEFAULT_BRIGHTNESS)
    }
}

fn apply_field(
    slot: &AtomicU8,
    field: &'static str,
    raw: Option<&Value>,
    report: &mut ConfigReport,
) {
    let parsed = match parse_level(field, raw) {
        Ok(Some(value)) => value,
        Ok(None) => {
            tracing::warn!("'{}' was missing from the config", field);
            report.missing.push(field);
            return;
        }
        Err(rejection) => {
            tracing::error!("rejected config value: {}", rejection);
            report.rejected.push(rejection);
            return;
        }
    };

    match store_level(slot, field, parsed) {
        Ok(()) => {
            tracing::info!("set '{}' to {}", field, parsed);
            report.applied.push(AppliedField {
                field,
                value: parsed as u8,
            });
        }
        Err(rejection) => {
            tracing::error!("rejected config value: {}", rejection);
            report.rejected.push(rejection);
        }
    }
}

fn store_level(slot: &AtomicU8, field: &'static str, value: i64) -> Result<(), FieldRejection> {
    match u8::try_from(value) {
        Ok(level) if level <= LEVEL_MAX => {
            slot.store(level, Ordering::Relaxed);
            Ok(())
        }
        _ => Err(FieldRejection::OutOfRange {
            field,
            value,
            max: LEVEL_MAX,
        }),
    }
}

// ── Decoding ─────────────────────────────────────────────────────────

/// The parts of the clock's config document the ring cares about.
#[derive(Debug, Default, Deserialize)]
struct ControlMessage {
    #[serde(rename = "ledRingBrightness", default)]
    led_ring_brightness: Option<Value>,
    #[serde(rename = "ledRingSaturation", default)]
    led_ring_saturation: Option<Value>,
}

/// Read a level that may arrive as a JSON number or a numeric string.
/// `Ok(None)` means "no change requested".
fn parse_level(field: &'static str, raw: Option<&Value>) -> Result<Option<i64>, FieldRejection> {
    let not_a_number = |value: &Value| FieldRejection::NotANumber {
        field,
        value: value.to_string(),
    };

    match raw {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => {
            let s = s.trim();
            if s.is_empty() || s == "null" {
                return Ok(None);
            }
            s.parse::<i64>()
                .map(Some)
                .map_err(|_| not_a_number(&Value::String(s.to_string())))
        }
        Some(value @ Value::Number(n)) => {
            n.as_i64().map(Some).ok_or_else(|| not_a_number(value))
        }
        Some(other) => Err(not_a_number(other)),
    }
}

/// Outcome of one control message, field by field.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct ConfigReport {
    pub applied: Vec<AppliedField>,
    pub rejected: Vec<FieldRejection>,
    pub missing: Vec<&'static str>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AppliedField {
    pub field: &'static str,
    pub value: u8,
}

impl ConfigReport {
    pub fn has_rejections(&self) -> bool {
        !self.rejected.is_empty()
    }
}
