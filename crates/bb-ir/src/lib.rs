//! Shared data types for the blackbird CV engine.
//!
//! Everything here is plain data used by both execution contexts: fixed-point
//! numbers, ramp shapes, queue event records, detection mode descriptions and
//! the ASL description tree.
//!
//! Designed to be `no_std` compatible with the `alloc` crate.

#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

pub mod asl;
pub mod config;
mod detect_mode;
mod event;
mod fixed;
mod shape;

pub use config::{
    adc_to_volts, counts_to_volts, dac_to_volts, volts_to_adc, volts_to_counts, volts_to_dac, EngineConfig, BLOCK_SIZE, INPUT_CHANNELS,
    OUTPUT_CHANNELS, QUEUE_CAPACITY, SAMPLE_RATE,
};
pub use detect_mode::{DetectMode, Direction, SCALE_HYSTERESIS, SCALE_MAX, WINDOW_MAX};
pub use event::{AslDone, ClockEvent, DetectKind, MetroEvent, RawEvent, RawPayload};
pub use fixed::{Q16, Q16_SHIFT};
pub use shape::{Shape, ShapeLut, LUT_SIZE};
