//! Per-output pitch quantizer applied after the slope shaper.

use bb_ir::Q16;
use heapless::Vec as HVec;

/// Longest note list an output scale accepts.
pub const MAX_DIV_LIST: usize = 24;

/// Snaps volts to `scaling * (octave + divlist[note] / modulo)`.
/// Inactive by default (pass-through).
#[derive(Clone, Debug, Default)]
pub struct Quantizer {
    active: bool,
    scaling: Q16,
    offset: Q16,
    /// `scaling * divlist[i] / modulo`, precomputed.
    notes: HVec<Q16, MAX_DIV_LIST>,
}

impl Quantizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a scale. An empty list quantizes to `scaling / modulo` steps.
    /// Entries beyond `MAX_DIV_LIST` are ignored.
    pub fn set_scale(&mut self, divlist: &[f32], modulo: f32, scaling: f32) {
        self.notes.clear();
        let (modulo, scaling) = if divlist.is_empty() {
            let _ = self.notes.push(Q16::ZERO);
            (1.0, scaling / modulo)
        } else {
            for d in divlist.iter().take(MAX_DIV_LIST) {
                let _ = self.notes.push(Q16::from_f32(scaling * d / modulo));
            }
            (modulo, scaling)
        };
        self.scaling = Q16::from_f32(scaling);
        self.offset = Q16::from_f32(0.5 * scaling / modulo);
        self.active = true;
    }

    pub fn unset(&mut self) {
        self.active = false;
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn quantize(&self, volts: Q16) -> Q16 {
        if !self.active || self.notes.is_empty() || self.scaling == Q16::ZERO {
            return volts;
        }
        let norm = (volts + self.offset).div(self.scaling);
        let octave = norm.floor_int();
        let len = self.notes.len() as i64;
        let note = ((norm.fract().0 as i64 * len) >> 16).clamp(0, len - 1) as usize;
        Q16(self.scaling.0.wrapping_mul(octave)) + self.notes[note]
    }

    pub fn quantize_block(&self, block: &mut [Q16]) {
        if !self.active {
            return;
        }
        for v in block.iter_mut() {
            *v = self.quantize(*v);
        }
    }
}
