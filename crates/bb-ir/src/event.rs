//! Event records that cross from the real-time context to the control context.
//!
//! Every record is `Copy` and fixed-size so it can live in a lock-free queue
//! slot. Timestamps are sample counts since the engine started.

use crate::fixed::Q16;

/// Periodic timer expiry.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MetroEvent {
    pub id: u8,
    pub stage: u32,
    pub timestamp: u64,
}

impl MetroEvent {
    pub fn new(id: u8, stage: u32) -> Self {
        Self { id, stage, timestamp: 0 }
    }
}

/// Coroutine wake-up from the clock scheduler.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ClockEvent {
    pub coro: u8,
    pub timestamp: u64,
}

/// An ASL program on `channel` ran off the end of its root sequence.
/// `timestamp` is the sample time at the end of the block that finished it.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AslDone {
    pub channel: u8,
    pub timestamp: u64,
}

/// Detection mode tag, without parameters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum DetectKind {
    #[default]
    None,
    Change,
    Stream,
    Window,
    Scale,
    Volume,
    Peak,
}

/// Integer result of the real-time detection pass.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RawPayload {
    /// Edge crossed; `rising` is the new state.
    Change { rising: bool },
    /// Periodic sample of the input.
    Stream { raw: i16 },
    /// Entered a new window. 1-based, negated when moving down.
    Window { index: i8 },
    /// Crossed into a new scale degree.
    Scale { index: u8, octave: i8 },
    /// Envelope level in ADC counts.
    Volume { level: Q16 },
    /// Envelope rose through the threshold.
    Peak,
}

impl RawPayload {
    pub fn kind(&self) -> DetectKind {
        match self {
            RawPayload::Change { .. } => DetectKind::Change,
            RawPayload::Stream { .. } => DetectKind::Stream,
            RawPayload::Window { .. } => DetectKind::Window,
            RawPayload::Scale { .. } => DetectKind::Scale,
            RawPayload::Volume { .. } => DetectKind::Volume,
            RawPayload::Peak => DetectKind::Peak,
        }
    }
}

/// A detection event waiting for deferred conversion.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RawEvent {
    pub channel: u8,
    /// Configuration generation the event was produced under.
    pub generation: u16,
    pub payload: RawPayload,
    pub timestamp: u64,
}

impl RawEvent {
    pub fn kind(&self) -> DetectKind {
        self.payload.kind()
    }
}
