//! Ramp shapes and their fixed-point lookup tables.
//!
//! Transcendental curves are sampled once into `ShapeLut` at start-up; the
//! real-time path only does a table lookup with linear interpolation.

use core::f64::consts::PI;

use crate::fixed::Q16;

/// Table resolution. Tables hold one extra guard entry so `progress == 1.0`
/// lands exactly on the last point.
pub const LUT_SIZE: usize = 256;

const LUT_LEN: usize = LUT_SIZE + 1;

/// Interpolation curve applied to ramp progress.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Shape {
    #[default]
    Linear,
    Sine,
    Log,
    Expo,
    /// Jump to the destination at completion.
    Now,
    /// Jump to the destination immediately and hold.
    Wait,
    /// Overshoot then settle (ease-out-back).
    Over,
    /// Pull back then rise (ease-in-back).
    Under,
    /// Bounce into the destination.
    Rebound,
}

impl Shape {
    /// Parse a shape name by its first letter, case-insensitive.
    /// Unknown names are linear.
    pub fn from_name(name: &str) -> Shape {
        let mut chars = name.chars().map(|c| c.to_ascii_lowercase());
        match chars.next() {
            Some('s') => Shape::Sine,
            Some('e') => Shape::Expo,
            Some('n') => Shape::Now,
            Some('w') => Shape::Wait,
            Some('o') => Shape::Over,
            Some('u') => Shape::Under,
            Some('r') => Shape::Rebound,
            Some('l') if chars.next() == Some('o') => Shape::Log,
            _ => Shape::Linear,
        }
    }

    fn table_index(self) -> Option<usize> {
        match self {
            Shape::Sine => Some(0),
            Shape::Log => Some(1),
            Shape::Expo => Some(2),
            Shape::Over => Some(3),
            Shape::Under => Some(4),
            Shape::Rebound => Some(5),
            Shape::Linear | Shape::Now | Shape::Wait => None,
        }
    }
}

const TABLE_COUNT: usize = 6;
const TABLE_SHAPES: [Shape; TABLE_COUNT] =
    [Shape::Sine, Shape::Log, Shape::Expo, Shape::Over, Shape::Under, Shape::Rebound];

/// Precomputed Q16 shape tables.
#[derive(Clone)]
pub struct ShapeLut {
    tables: [[Q16; LUT_LEN]; TABLE_COUNT],
}

impl ShapeLut {
    /// Sample every curve. Runs once at init; uses floating point.
    pub fn new() -> Self {
        let mut tables = [[Q16::ZERO; LUT_LEN]; TABLE_COUNT];
        for (table, shape) in tables.iter_mut().zip(TABLE_SHAPES) {
            for (i, entry) in table.iter_mut().enumerate() {
                let t = i as f64 / LUT_SIZE as f64;
                *entry = Q16::from_f32(curve(shape, t) as f32);
            }
            // Pin the endpoints so 0 and 1 map exactly to last and dest.
            table[0] = Q16::ZERO;
            table[LUT_SIZE] = Q16::ONE;
        }
        Self { tables }
    }

    /// Shape `progress` (clamped to `[0, 1]`).
    pub fn eval(&self, shape: Shape, progress: Q16) -> Q16 {
        let p = progress.clamp(Q16::ZERO, Q16::ONE);
        match shape {
            Shape::Linear => p,
            Shape::Now => {
                if p >= Q16::ONE {
                    Q16::ONE
                } else {
                    Q16::ZERO
                }
            }
            Shape::Wait => {
                if p <= Q16::ZERO {
                    Q16::ZERO
                } else {
                    Q16::ONE
                }
            }
            _ => match shape.table_index() {
                Some(ix) => lookup(&self.tables[ix], p),
                None => p,
            },
        }
    }

    /// Map shaped progress onto the segment `last .. last + scale`.
    pub fn apply(&self, shape: Shape, progress: Q16, last: Q16, scale: Q16) -> Q16 {
        last + self.eval(shape, progress).mul(scale)
    }
}

impl Default for ShapeLut {
    fn default() -> Self {
        Self::new()
    }
}

/// Interpolated table read. `p` must be within `[0, ONE]`.
fn lookup(table: &[Q16; LUT_LEN], p: Q16) -> Q16 {
    // 8 index bits, 8 fraction bits out of the 16 fractional bits.
    let pos = p.0 as u32;
    let idx = (pos >> 8) as usize;
    if idx >= LUT_SIZE {
        return table[LUT_SIZE];
    }
    let frac = (pos & 0xFF) as i64;
    let v0 = table[idx].0 as i64;
    let v1 = table[idx + 1].0 as i64;
    Q16((v0 + (((v1 - v0) * frac) >> 8)) as i32)
}

fn curve(shape: Shape, t: f64) -> f64 {
    const BACK: f64 = 1.70158;
    let floor = libm::pow(2.0, -10.0);
    match shape {
        Shape::Sine => -0.5 * (libm::cos(PI * t) - 1.0),
        Shape::Expo => (libm::pow(2.0, 10.0 * (t - 1.0)) - floor) / (1.0 - floor),
        Shape::Log => (1.0 - libm::pow(2.0, -10.0 * t)) / (1.0 - floor),
        Shape::Over => {
            let u = t - 1.0;
            1.0 + (BACK + 1.0) * u * u * u + BACK * u * u
        }
        Shape::Under => (BACK + 1.0) * t * t * t - BACK * t * t,
        Shape::Rebound => rebound(t),
        Shape::Linear | Shape::Now | Shape::Wait => t,
    }
}

fn rebound(t: f64) -> f64 {
    const N: f64 = 7.5625;
    const D: f64 = 2.75;
    if t < 1.0 / D {
        N * t * t
    } else if t < 2.0 / D {
        let u = t - 1.5 / D;
        N * u * u + 0.75
    } else if t < 2.5 / D {
        let u = t - 2.25 / D;
        N * u * u + 0.9375
    } else {
        let u = t - 2.625 / D;
        N * u * u + 0.984375
    }
}
