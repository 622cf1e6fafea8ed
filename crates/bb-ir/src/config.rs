//! Engine-wide constants and converter scaling.

use crate::fixed::Q16;

/// Real-time sample rate in Hz.
pub const SAMPLE_RATE: u32 = 48_000;

/// Samples processed per real-time block.
pub const BLOCK_SIZE: usize = 32;

/// ADC inputs, each with one detector.
pub const INPUT_CHANNELS: usize = 2;

/// DAC outputs, each with one slope and one ASL program.
pub const OUTPUT_CHANNELS: usize = 4;

/// Slots per lock-free queue. Must be a power of two.
pub const QUEUE_CAPACITY: usize = 64;

/// Converter code for +6 V (both ADC and DAC are bipolar 12-bit).
pub const CONVERTER_FULL_SCALE: i32 = 2047;

/// Volts represented by `CONVERTER_FULL_SCALE`.
pub const CONVERTER_VOLTS: i32 = 6;

/// Runtime parameters for the real-time engine.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EngineConfig {
    pub sample_rate: u32,
    pub block_size: usize,
}

impl EngineConfig {
    /// Samples per millisecond in Q16.
    pub fn samples_per_ms(&self) -> Q16 {
        Q16::from_ratio(self.sample_rate as i64, 1000)
    }

    /// Blocks per second as a float (control-side interval maths).
    pub fn block_rate(&self) -> f32 {
        self.sample_rate as f32 / self.block_size.max(1) as f32
    }

    /// Convert a duration in Q16 seconds to whole samples, rounding to nearest.
    /// Negative durations clamp to zero.
    pub fn seconds_to_samples(&self, seconds: Q16) -> i32 {
        if seconds.0 <= 0 {
            return 0;
        }
        let samples = (seconds.0 as i64 * self.sample_rate as i64 + (1 << 15)) >> 16;
        samples.min(i32::MAX as i64) as i32
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self { sample_rate: SAMPLE_RATE, block_size: BLOCK_SIZE }
    }
}

/// Raw ADC counts to volts (deferred, control side).
pub fn adc_to_volts(raw: i16) -> f32 {
    raw as f32 * CONVERTER_VOLTS as f32 / CONVERTER_FULL_SCALE as f32
}

/// Volts to raw ADC counts, truncating toward zero like the converter.
/// Saturates at the `i16` sample range, so no threshold lies beyond it.
pub fn volts_to_adc(volts: f32) -> i32 {
    let counts = volts * CONVERTER_FULL_SCALE as f32 / CONVERTER_VOLTS as f32;
    (counts as i32).clamp(i16::MIN as i32, i16::MAX as i32)
}

/// Q16 volts to a DAC code, clamped to the converter range.
pub fn volts_to_dac(volts: Q16) -> i16 {
    let code = (volts.0 as i64 * CONVERTER_FULL_SCALE as i64) / ((CONVERTER_VOLTS as i64) << 16);
    code.clamp(-(CONVERTER_FULL_SCALE as i64) - 1, CONVERTER_FULL_SCALE as i64) as i16
}

/// DAC code back to Q16 volts.
pub fn dac_to_volts(code: i16) -> Q16 {
    counts_to_volts(code as i32)
}

/// Converter counts (ADC or DAC) to Q16 volts, integer only.
pub fn counts_to_volts(counts: i32) -> Q16 {
    Q16::from_ratio(counts as i64 * CONVERTER_VOLTS as i64, CONVERTER_FULL_SCALE as i64)
}

/// Q16 volts to converter counts, truncating toward zero, unclamped.
pub fn volts_to_counts(volts: Q16) -> i32 {
    ((volts.0 as i64 * CONVERTER_FULL_SCALE as i64) / ((CONVERTER_VOLTS as i64) << 16)) as i32
}
