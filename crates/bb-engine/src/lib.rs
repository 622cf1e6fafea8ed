//! Real-time side of the blackbird CV engine.
//!
//! Everything reachable from [`RtEngine::process_block`] runs in the periodic
//! real-time context: no locks, no allocation, no floating point on the hot
//! path. The control context reaches in only through [`Guarded`] channel
//! state and reads results out of the [`EventBridge`] queues.

#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

pub mod asl;
mod bridge;
mod detect;
mod guard;
mod output;
mod quantize;
mod queue;
mod rt;
mod slope;
mod timers;

pub use bridge::{AslDoneQueue, BridgeStats, ClockQueue, EventBridge, InputQueue, MetroQueue};
pub use detect::{Detector, MIN_HYSTERESIS, PEAK_TIME, VOLUME_TIME};
pub use guard::{Guarded, RtGuard};
pub use output::OutputChannel;
pub use quantize::{Quantizer, MAX_DIV_LIST};
pub use queue::{LockFreeQueue, QueueStats};
pub use rt::{DacOutput, RtEngine, Shared};
pub use slope::{Render, Slope, OVERFLOW_LIMIT};
pub use timers::{ClockBank, MetroBank, TimerError, CLOCK_COUNT, DEFAULT_TEMPO, METRO_COUNT};
