//! Mode-switch guard for per-channel state shared between contexts.
//!
//! The real-time side takes the guard with one compare-exchange and skips the
//! channel for this block if the control side holds it. The control side spins
//! until the real-time side lets go, which is at most one block.

use core::cell::UnsafeCell;
use core::ops::{Deref, DerefMut};
use core::sync::atomic::{AtomicU8, Ordering};

const IDLE: u8 = 0;
const REALTIME: u8 = 1;
const CONTROL: u8 = 2;

pub struct Guarded<T> {
    state: AtomicU8,
    value: UnsafeCell<T>,
}

// SAFETY: `value` is only reached through a guard obtained by moving `state`
// out of IDLE, so at most one context holds a reference at a time.
unsafe impl<T: Send> Sync for Guarded<T> {}

impl<T> Guarded<T> {
    pub const fn new(value: T) -> Self {
        Self { state: AtomicU8::new(IDLE), value: UnsafeCell::new(value) }
    }

    /// Real-time entry. `None` while the control context is reconfiguring.
    pub fn try_realtime(&self) -> Option<RtGuard<'_, T>> {
        self.state
            .compare_exchange(IDLE, REALTIME, Ordering::Acquire, Ordering::Relaxed)
            .ok()
            .map(|_| RtGuard { owner: self })
    }

    /// Control entry. Spins until the real-time side is out, then runs `f`
    /// with exclusive access.
    pub fn configure<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        while self
            .state
            .compare_exchange_weak(IDLE, CONTROL, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            core::hint::spin_loop();
        }
        // SAFETY: state is CONTROL, nobody else can hold a reference.
        let result = f(unsafe { &mut *self.value.get() });
        self.state.store(IDLE, Ordering::Release);
        result
    }

    /// Whether the control side currently holds the guard.
    pub fn is_switching(&self) -> bool {
        self.state.load(Ordering::Acquire) == CONTROL
    }

    pub fn get_mut(&mut self) -> &mut T {
        self.value.get_mut()
    }
}

impl<T: Default> Default for Guarded<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

/// Real-time access, released on drop.
pub struct RtGuard<'a, T> {
    owner: &'a Guarded<T>,
}

impl<T> Deref for RtGuard<'_, T> {
    type Target = T;
    fn deref(&self) -> &T {
        // SAFETY: state is REALTIME for the lifetime of the guard.
        unsafe { &*self.owner.value.get() }
    }
}

impl<T> DerefMut for RtGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        // SAFETY: as above; the guard is not Clone.
        unsafe { &mut *self.owner.value.get() }
    }
}

impl<T> Drop for RtGuard<'_, T> {
    fn drop(&mut self) {
        self.owner.state.store(IDLE, Ordering::Release);
    }
}
