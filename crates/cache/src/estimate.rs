//! Memory footprint estimation for cached values
//!
//! Estimates are heuristics, not byte-accurate accounting. Decoded images are
//! sized by their pixel count, media handles by fixed per-kind constants and
//! structured values by the length of their serialized form.

use serde::Serialize;

/// Estimate for a decoded video handle (bytes)
pub const VIDEO_ESTIMATE_BYTES: usize = 2 * 1024 * 1024;

/// Estimate for a decoded audio handle (bytes)
pub const AUDIO_ESTIMATE_BYTES: usize = 512 * 1024;

/// Estimate for a registered font face (bytes)
pub const FONT_ESTIMATE_BYTES: usize = 100 * 1024;

/// Estimate used when nothing is known about a value (bytes)
pub const FALLBACK_ESTIMATE_BYTES: usize = 1024;

/// What is known about a value when estimating its size
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SizeHint {
    /// Decoded RGBA image of the given dimensions
    Image { width: u32, height: u32 },
    /// Video element with buffered data
    Video,
    /// Audio element with buffered data
    Audio,
    /// Registered font face
    Font,
    /// Value whose serialized form is this many bytes long
    Serialized(usize),
    /// Nothing is known
    Unknown,
}

/// Estimate the in-memory size of a value from its size hint
///
/// Images cost `width * height * 4`; a zero-sized image falls back to the
/// generic estimate. Serialized values count two bytes per character.
pub fn estimate_bytes(hint: SizeHint) -> usize {
    match hint {
        SizeHint::Image { width, height } => {
            let pixels = (width as usize).saturating_mul(height as usize);
            if pixels == 0 {
                FALLBACK_ESTIMATE_BYTES
            } else {
                pixels.saturating_mul(4)
            }
        }
        SizeHint::Video => VIDEO_ESTIMATE_BYTES,
        SizeHint::Audio => AUDIO_ESTIMATE_BYTES,
        SizeHint::Font => FONT_ESTIMATE_BYTES,
        SizeHint::Serialized(len) => len.saturating_mul(2),
        SizeHint::Unknown => FALLBACK_ESTIMATE_BYTES,
    }
}

/// Estimate a structured value by serializing it to JSON
///
/// Values that fail to serialize use the fallback estimate.
pub fn estimate_serialized<T: Serialize + ?Sized>(value: &T) -> usize {
    match serde_json::to_string(value) {
        Ok(json) => estimate_bytes(SizeHint::Serialized(json.len())),
        Err(_) => FALLBACK_ESTIMATE_BYTES,
    }
}
