//! Control context for the blackbird CV engine.
//!
//! Drains the real-time event queues, finishes input detection in float,
//! calls script handlers, and hosts the real-time block either on a paced
//! thread or offline.

mod controller;
mod dispatch;
mod dispatcher;
mod error;
mod wav;

use bb_ir::OUTPUT_CHANNELS;

/// One DAC code per output for a single sample.
pub type DacFrame = [i16; OUTPUT_CHANNELS];

pub use controller::{AdcSource, Controller, FrameAssembler, Silence};
pub use dispatch::{dispatch, DetectEvent, ScaleNote};
pub use dispatcher::{DispatchStats, EventDispatcher, Handlers};
pub use error::ControlError;
pub use wav::{frames_to_wav, write_wav};

// Re-export common types so callers don't need bb-ir/bb-engine directly.
pub use bb_engine::asl::{Action, CompileReport};
pub use bb_engine::BridgeStats;
pub use bb_ir::asl::{self, presets, Stage};
pub use bb_ir::{DetectMode, Direction, EngineConfig, Shape};
