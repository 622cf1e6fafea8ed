//! The four queues crossing from the real-time to the control context.

use bb_ir::{AslDone, ClockEvent, MetroEvent, RawEvent, QUEUE_CAPACITY};

use crate::queue::{LockFreeQueue, QueueStats};

pub type MetroQueue = LockFreeQueue<MetroEvent, QUEUE_CAPACITY>;
pub type ClockQueue = LockFreeQueue<ClockEvent, QUEUE_CAPACITY>;
pub type InputQueue = LockFreeQueue<RawEvent, QUEUE_CAPACITY>;
pub type AslDoneQueue = LockFreeQueue<AslDone, QUEUE_CAPACITY>;

/// Real-time producers post here; the dispatcher drains in declaration order.
#[derive(Default)]
pub struct EventBridge {
    pub metro: MetroQueue,
    pub clock: ClockQueue,
    pub input: InputQueue,
    pub asl_done: AslDoneQueue,
}

/// Combined statistics of every queue.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BridgeStats {
    pub metro: QueueStats,
    pub clock: QueueStats,
    pub input: QueueStats,
    pub asl_done: QueueStats,
}

impl BridgeStats {
    pub fn total_dropped(&self) -> u32 {
        [self.clock, self.input, self.asl_done]
            .iter()
            .fold(self.metro.dropped, |total, q| total.saturating_add(q.dropped))
    }
}

impl EventBridge {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stats(&self) -> BridgeStats {
        BridgeStats {
            metro: self.metro.stats(),
            clock: self.clock.stats(),
            input: self.input.stats(),
            asl_done: self.asl_done.stats(),
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.metro.is_healthy()
            && self.clock.is_healthy()
            && self.input.is_healthy()
            && self.asl_done.is_healthy()
    }

    pub fn reset_stats(&self) {
        self.metro.reset_stats();
        self.clock.reset_stats();
        self.input.reset_stats();
        self.asl_done.reset_stats();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stats_cover_every_queue() {
        let bridge = EventBridge::new();
        bridge.metro.post(MetroEvent::new(1, 0));
        bridge.asl_done.post(AslDone { channel: 2, timestamp: 0 });
        let stats = bridge.stats();
        assert_eq!(stats.metro.posted, 1);
        assert_eq!(stats.asl_done.depth, 1);
        assert_eq!(stats.total_dropped(), 0);
        assert!(bridge.is_healthy());
    }

    #[test]
    fn overflow_is_counted_per_queue() {
        let bridge = EventBridge::new();
        for i in 0..QUEUE_CAPACITY as u8 {
            bridge.clock.post(ClockEvent { coro: i, timestamp: 0 });
        }
        let stats = bridge.stats();
        assert_eq!(stats.clock.dropped, 1);
        assert_eq!(stats.total_dropped(), 1);
        assert!(!bridge.is_healthy());
    }

    #[test]
    fn total_dropped_saturates() {
        let full = QueueStats { dropped: u32::MAX, ..QueueStats::default() };
        let stats = BridgeStats { metro: full, input: QueueStats { dropped: 7, ..full }, ..BridgeStats::default() };
        assert_eq!(stats.total_dropped(), u32::MAX);
    }
}
