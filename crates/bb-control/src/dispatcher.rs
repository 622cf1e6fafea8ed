//! Control-context event loop body.

use std::sync::Arc;

use bb_ir::QUEUE_CAPACITY;

use crate::controller::Controller;
use crate::dispatch::{dispatch, DetectEvent};

/// Script-level callbacks, one per event kind. Every method defaults to
/// doing nothing. Handlers get the controller so they can reconfigure
/// inputs or recompile and retrigger outputs.
pub trait Handlers {
    fn metro(&mut self, _ctl: &mut Controller, _id: u8, _stage: u32) {}

    fn clock(&mut self, _ctl: &mut Controller, _coro: u8) {}

    fn input(&mut self, _ctl: &mut Controller, _channel: usize, _event: DetectEvent) {}

    fn asl_done(&mut self, _ctl: &mut Controller, _channel: usize) {}
}

/// Drains and discards.
impl Handlers for () {}

/// Events handed to handlers, plus input events dropped as stale.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DispatchStats {
    pub metro: u64,
    pub clock: u64,
    pub input: u64,
    pub asl_done: u64,
    pub stale: u64,
}

impl DispatchStats {
    pub fn handled(&self) -> u64 {
        self.metro + self.clock + self.input + self.asl_done
    }
}

/// Drains the four queues into a `Handlers` implementation.
#[derive(Debug, Default)]
pub struct EventDispatcher {
    stats: DispatchStats,
    /// Drop count at the last overload warning.
    reported_drops: u32,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stats(&self) -> DispatchStats {
        self.stats
    }

    /// One pass over Metro, Clock, Input and AslDone, in that order. Each
    /// queue gives up at most one queue's worth of events per pass so a
    /// busy producer cannot starve the others. Returns the events handled.
    pub fn drain(&mut self, ctl: &mut Controller, handlers: &mut impl Handlers) -> usize {
        let shared = Arc::clone(ctl.shared());
        let bridge = &shared.bridge;
        let before = self.stats.handled();

        for _ in 0..QUEUE_CAPACITY {
            let Some(event) = bridge.metro.get() else { break };
            self.stats.metro += 1;
            handlers.metro(ctl, event.id, event.stage);
        }

        for _ in 0..QUEUE_CAPACITY {
            let Some(event) = bridge.clock.get() else { break };
            self.stats.clock += 1;
            handlers.clock(ctl, event.coro);
        }

        for _ in 0..QUEUE_CAPACITY {
            let Some(raw) = bridge.input.get() else { break };
            let channel = raw.channel as usize;
            let detected = ctl.detect_state(channel).and_then(|(mode, generation)| dispatch(&raw, mode, generation));
            match detected {
                Some(event) => {
                    self.stats.input += 1;
                    handlers.input(ctl, channel, event);
                }
                None => self.stats.stale += 1,
            }
        }

        for _ in 0..QUEUE_CAPACITY {
            let Some(done) = bridge.asl_done.get() else { break };
            self.stats.asl_done += 1;
            handlers.asl_done(ctl, done.channel as usize);
        }

        let stats = bridge.stats();
        let dropped = stats.total_dropped();
        if dropped > self.reported_drops {
            log::warn!(
                "event queues overloaded: {} dropped (metro {}, clock {}, input {}, asl {})",
                dropped.saturating_sub(self.reported_drops),
                stats.metro.dropped,
                stats.clock.dropped,
                stats.input.dropped,
                stats.asl_done.dropped,
            );
        }
        self.reported_drops = dropped;

        (self.stats.handled() - before) as usize
    }
}
