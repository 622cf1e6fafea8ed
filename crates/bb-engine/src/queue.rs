//! Single-producer single-consumer lock-free queue.
//!
//! The real-time context is the only producer and the control context the
//! only consumer. `post` never blocks: a full queue drops the item and counts
//! the drop.

use core::cell::UnsafeCell;
use core::mem::MaybeUninit;
use core::sync::atomic::{AtomicU32, AtomicUsize, Ordering};

/// Fixed-capacity SPSC ring of `N` slots (`N` a power of two). One slot is
/// kept free to tell full from empty, so at most `N - 1` items are queued.
pub struct LockFreeQueue<T: Copy, const N: usize> {
    slots: [UnsafeCell<MaybeUninit<T>>; N],
    /// Next slot the producer writes.
    write: AtomicUsize,
    /// Next slot the consumer reads.
    read: AtomicUsize,
    posted: AtomicU32,
    processed: AtomicU32,
    dropped: AtomicU32,
}

// SAFETY: a slot is written only by the producer while it is outside
// `read..write`, and read only by the consumer after the release-store of
// `write` that published it. Index ownership keeps the two sides disjoint.
unsafe impl<T: Copy + Send, const N: usize> Sync for LockFreeQueue<T, N> {}
unsafe impl<T: Copy + Send, const N: usize> Send for LockFreeQueue<T, N> {}

/// Counter snapshot for one queue.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct QueueStats {
    pub posted: u32,
    pub processed: u32,
    pub dropped: u32,
    pub depth: usize,
}

impl<T: Copy, const N: usize> LockFreeQueue<T, N> {
    const MASK: usize = {
        assert!(N.is_power_of_two() && N >= 2, "queue size must be a power of two");
        N - 1
    };

    pub fn new() -> Self {
        Self {
            slots: core::array::from_fn(|_| UnsafeCell::new(MaybeUninit::uninit())),
            write: AtomicUsize::new(0),
            read: AtomicUsize::new(0),
            posted: AtomicU32::new(0),
            processed: AtomicU32::new(0),
            dropped: AtomicU32::new(0),
        }
    }

    /// Producer side. Returns `false` and counts a drop when full; the queue
    /// contents are left untouched.
    pub fn post(&self, item: T) -> bool {
        let write = self.write.load(Ordering::Relaxed);
        let next = (write + 1) & Self::MASK;
        if next == self.read.load(Ordering::Acquire) {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            return false;
        }
        // SAFETY: `write` is owned by the producer until published below.
        unsafe { (*self.slots[write].get()).write(item) };
        self.write.store(next, Ordering::Release);
        self.posted.fetch_add(1, Ordering::Relaxed);
        true
    }

    /// Consumer side. `None` when empty.
    pub fn get(&self) -> Option<T> {
        let read = self.read.load(Ordering::Relaxed);
        if read == self.write.load(Ordering::Acquire) {
            return None;
        }
        // SAFETY: the acquire-load above synchronises with the producer's
        // release-store, so the slot at `read` is initialised.
        let item = unsafe { (*self.slots[read].get()).assume_init() };
        self.read.store((read + 1) & Self::MASK, Ordering::Release);
        self.processed.fetch_add(1, Ordering::Relaxed);
        Some(item)
    }

    /// Items currently queued.
    pub fn depth(&self) -> usize {
        let write = self.write.load(Ordering::Acquire);
        let read = self.read.load(Ordering::Acquire);
        write.wrapping_sub(read) & Self::MASK
    }

    pub fn is_empty(&self) -> bool {
        self.depth() == 0
    }

    /// Usable slots.
    pub const fn capacity(&self) -> usize {
        N - 1
    }

    pub fn dropped(&self) -> u32 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Below three quarters full and nothing ever dropped.
    pub fn is_healthy(&self) -> bool {
        self.depth() < N * 3 / 4 && self.dropped() == 0
    }

    pub fn stats(&self) -> QueueStats {
        QueueStats {
            posted: self.posted.load(Ordering::Relaxed),
            processed: self.processed.load(Ordering::Relaxed),
            dropped: self.dropped(),
            depth: self.depth(),
        }
    }

    /// Zero the counters. Queue contents are kept.
    pub fn reset_stats(&self) {
        self.posted.store(0, Ordering::Relaxed);
        self.processed.store(0, Ordering::Relaxed);
        self.dropped.store(0, Ordering::Relaxed);
    }
}

impl<T: Copy, const N: usize> Default for LockFreeQueue<T, N> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn fifo_order() {
        let q: LockFreeQueue<u32, 8> = LockFreeQueue::new();
        for i in 0..5 {
            assert!(q.post(i));
        }
        assert_eq!(q.depth(), 5);
        for i in 0..5 {
            assert_eq!(q.get(), Some(i));
        }
        assert_eq!(q.get(), None);
    }

    #[test]
    fn full_queue_drops_and_keeps_contents() {
        let q: LockFreeQueue<u8, 4> = LockFreeQueue::new();
        assert!(q.post(1));
        assert!(q.post(2));
        assert!(q.post(3));
        assert!(!q.post(4));
        assert_eq!(q.dropped(), 1);
        assert_eq!(q.depth(), 3);
        assert_eq!(q.get(), Some(1));
        assert_eq!(q.get(), Some(2));
        assert_eq!(q.get(), Some(3));
        assert_eq!(q.get(), None);
    }

    #[test]
    fn indices_wrap() {
        let q: LockFreeQueue<u16, 4> = LockFreeQueue::new();
        for round in 0..10u16 {
            assert!(q.post(round));
            assert!(q.post(round + 100));
            assert_eq!(q.get(), Some(round));
            assert_eq!(q.get(), Some(round + 100));
        }
        assert!(q.is_empty());
        let stats = q.stats();
        assert_eq!(stats.posted, 20);
        assert_eq!(stats.processed, 20);
        assert_eq!(stats.dropped, 0);
    }

    #[test]
    fn health_tracks_depth_and_drops() {
        let q: LockFreeQueue<u8, 8> = LockFreeQueue::new();
        assert!(q.is_healthy());
        for i in 0..6 {
            q.post(i);
        }
        assert!(!q.is_healthy());
        while q.get().is_some() {}
        assert!(q.is_healthy());
        for i in 0..10 {
            q.post(i);
        }
        while q.get().is_some() {}
        assert!(!q.is_healthy(), "drops mark the queue unhealthy");
        q.reset_stats();
        assert!(q.is_healthy());
    }

    #[test]
    fn producer_and_consumer_threads() {
        use std::sync::Arc;
        let q: Arc<LockFreeQueue<u32, 64>> = Arc::new(LockFreeQueue::new());
        let producer = {
            let q = Arc::clone(&q);
            std::thread::spawn(move || {
                let mut sent = 0u32;
                while sent < 10_000 {
                    if q.post(sent) {
                        sent += 1;
                    } else {
                        std::thread::yield_now();
                    }
                }
            })
        };
        let mut expected = 0u32;
        while expected < 10_000 {
            match q.get() {
                Some(v) => {
                    assert_eq!(v, expected);
                    expected += 1;
                }
                None => std::thread::yield_now(),
            }
        }
        producer.join().unwrap();
    }

    proptest! {
        #[test]
        fn interleaved_ops_match_model(ops in proptest::collection::vec(any::<Option<u8>>(), 0..200)) {
            let q: LockFreeQueue<u8, 16> = LockFreeQueue::new();
            let mut model = std::collections::VecDeque::new();
            for op in ops {
                match op {
                    Some(v) => {
                        let accepted = q.post(v);
                        prop_assert_eq!(accepted, model.len() < 15);
                        if accepted {
                            model.push_back(v);
                        }
                    }
                    None => prop_assert_eq!(q.get(), model.pop_front()),
                }
                prop_assert_eq!(q.depth(), model.len());
            }
        }
    }
}
