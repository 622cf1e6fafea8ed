//! Input detection, deferred half.
//!
//! The real-time side posts integer `RawEvent`s. This pass runs in the
//! control context: it drops events produced under an older mode, converts
//! counts to volts and does the per-mode float maths.

use bb_ir::config::{CONVERTER_FULL_SCALE, CONVERTER_VOLTS};
use bb_ir::{adc_to_volts, DetectMode, RawEvent, RawPayload};

/// A detected scale note with its derived pitch values.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ScaleNote {
    /// Degree within the note list, 0-based.
    pub index: u8,
    pub octave: i8,
    /// `notes[index] + octave * divs`.
    pub note: f32,
    /// `(notes[index] / divs + octave) * scaling`.
    pub volts: f32,
}

/// What an input handler receives.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum DetectEvent {
    Change { state: bool },
    Stream { volts: f32 },
    /// 1-based window. `rising` is false when the input moved down into it.
    Window { window: u8, rising: bool },
    Scale(ScaleNote),
    Volume { level: f32 },
    Peak,
}

/// Convert `event` under the channel's current `mode` and `generation`.
/// Returns `None` for stale events and for events whose kind does not
/// match the mode.
pub fn dispatch(event: &RawEvent, mode: &DetectMode, generation: u16) -> Option<DetectEvent> {
    if event.generation != generation || event.kind() != mode.kind() {
        return None;
    }
    Some(match (event.payload, mode) {
        (RawPayload::Change { rising }, _) => DetectEvent::Change { state: rising },
        (RawPayload::Stream { raw }, _) => DetectEvent::Stream { volts: adc_to_volts(raw) },
        (RawPayload::Window { index }, _) => DetectEvent::Window { window: index.unsigned_abs(), rising: index > 0 },
        (RawPayload::Scale { index, octave }, DetectMode::Scale { notes, divs, scaling }) => {
            let degree = if notes.is_empty() {
                index as f32
            } else {
                notes.get(index as usize).copied().unwrap_or(0.0)
            };
            let divs = if *divs == 0.0 { 1.0 } else { *divs };
            let octave_f = octave as f32;
            DetectEvent::Scale(ScaleNote {
                index,
                octave,
                note: degree + octave_f * divs,
                volts: (degree / divs + octave_f) * scaling,
            })
        }
        (RawPayload::Scale { .. }, _) => return None,
        (RawPayload::Volume { level }, _) => {
            DetectEvent::Volume { level: level.to_f32() * CONVERTER_VOLTS as f32 / CONVERTER_FULL_SCALE as f32 }
        }
        (RawPayload::Peak, _) => DetectEvent::Peak,
    })
}
