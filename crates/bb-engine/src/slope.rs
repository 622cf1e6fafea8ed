//! Q16.16 ramp generator with sample-accurate completion callbacks.
//!
//! One `Slope` per output. Volts and progress are Q16; time is whole samples.
//! Progress is tracked as an exact fraction `elapsed / duration` with an
//! integer remainder, so long ramps land on their destination without drift.

use bb_ir::{Shape, ShapeLut, Q16};

/// Longest overflow, in samples, that a completed slope carries into the
/// next `toward`.
pub const OVERFLOW_LIMIT: i32 = 1024;

/// Outcome of a render call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Render<C> {
    /// The whole buffer was written.
    Done,
    /// A breakpoint fired after `rendered` samples. The caller runs
    /// `callback` and renders the rest of the buffer.
    Breakpoint { rendered: usize, callback: C },
}

/// Ramp state for one channel. `C` is the completion callback handle.
#[derive(Clone, Debug)]
pub struct Slope<C> {
    dest: Q16,
    last: Q16,
    scale: Q16,
    shape: Shape,
    /// Progress through the ramp, `0..=ONE`.
    here: Q16,
    /// Remainder of `elapsed * ONE / duration`.
    here_rem: i64,
    duration: i32,
    elapsed: i32,
    /// Samples until the breakpoint. Zero or below means static; negative
    /// values count samples since the breakpoint, down to `-OVERFLOW_LIMIT`.
    countdown: i32,
    shaped: Q16,
    callback: Option<C>,
}

impl<C: Copy> Slope<C> {
    pub fn new() -> Self {
        Self {
            dest: Q16::ZERO,
            last: Q16::ZERO,
            scale: Q16::ZERO,
            shape: Shape::Linear,
            here: Q16::ZERO,
            here_rem: 0,
            duration: 0,
            elapsed: 0,
            countdown: -OVERFLOW_LIMIT,
            shaped: Q16::ZERO,
            callback: None,
        }
    }

    /// Back to 0 V, static, no callback pending.
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// Start a ramp from the current output to `dest` over `duration`
    /// samples. A pending callback is replaced.
    ///
    /// With `duration <= 0` the output snaps to `dest` now and `callback`
    /// fires on the next rendered sample, never synchronously.
    pub fn toward(&mut self, dest: Q16, duration: i32, shape: Shape, callback: Option<C>) {
        self.dest = dest;
        self.shape = shape;
        self.callback = callback;

        if duration <= 0 {
            self.last = dest;
            self.shaped = dest;
            self.scale = Q16::ZERO;
            self.here = Q16::ONE;
            self.here_rem = 0;
            self.duration = 0;
            self.elapsed = 0;
            if self.countdown > 0 {
                self.countdown = 0;
            }
            if self.callback.is_some() {
                self.countdown = 1;
            }
            return;
        }

        self.last = self.shaped;
        self.scale = dest - self.last;
        let overflow = if self.countdown < 0 && self.countdown > -OVERFLOW_LIMIT { -self.countdown } else { 0 };
        self.duration = duration;
        self.set_elapsed(overflow.min(duration));
        self.countdown = duration - self.elapsed;
        if self.countdown <= 0 {
            // Overflow swallowed the whole ramp; land on the next sample.
            self.set_elapsed(duration - 1);
            self.countdown = 1;
        }
    }

    fn set_elapsed(&mut self, elapsed: i32) {
        self.elapsed = elapsed;
        let num = elapsed as i64 * Q16::ONE.0 as i64;
        self.here = Q16((num / self.duration as i64) as i32);
        self.here_rem = num % self.duration as i64;
    }

    /// Advance progress by one sample without dividing.
    fn advance(&mut self) {
        if self.elapsed >= self.duration {
            return;
        }
        self.elapsed += 1;
        let d = self.duration as i64;
        let one = Q16::ONE.0 as i64;
        self.here_rem += one % d;
        let mut step = one / d;
        if self.here_rem >= d {
            self.here_rem -= d;
            step += 1;
        }
        self.here = Q16(self.here.0 + step as i32);
    }

    fn output(&mut self, lut: &ShapeLut) -> Q16 {
        self.shaped = lut.apply(self.shape, self.here, self.last, self.scale);
        self.shaped
    }

    /// Fill `out` with shaped volts. Stops early at a breakpoint that has a
    /// callback; the breakpoint sample itself is written as `dest`.
    pub fn render(&mut self, lut: &ShapeLut, out: &mut [Q16]) -> Render<C> {
        let mut i = 0;
        while i < out.len() {
            let remaining = (out.len() - i) as i32;
            if self.countdown <= 0 {
                let v = self.output(lut);
                out[i..].fill(v);
                if self.countdown > -OVERFLOW_LIMIT {
                    self.countdown = (self.countdown - remaining).max(-OVERFLOW_LIMIT);
                }
                return Render::Done;
            }
            if self.countdown > remaining {
                for sample in out[i..].iter_mut() {
                    self.advance();
                    *sample = self.output(lut);
                }
                self.countdown -= remaining;
                return Render::Done;
            }
            // Within reach of the breakpoint: one sample at a time.
            self.advance();
            self.countdown -= 1;
            if self.countdown > 0 {
                out[i] = self.output(lut);
                i += 1;
                continue;
            }
            self.here = Q16::ONE;
            self.elapsed = self.duration;
            self.shaped = self.dest;
            out[i] = self.dest;
            i += 1;
            if let Some(callback) = self.callback.take() {
                return Render::Breakpoint { rendered: i, callback };
            }
        }
        Render::Done
    }

    /// Render the whole buffer, handing each breakpoint callback to
    /// `on_callback`, which may start a new ramp.
    pub fn process(&mut self, lut: &ShapeLut, out: &mut [Q16], mut on_callback: impl FnMut(&mut Self, C)) {
        let mut start = 0;
        while start < out.len() {
            match self.render(lut, &mut out[start..]) {
                Render::Done => return,
                Render::Breakpoint { rendered, callback } => {
                    start += rendered;
                    on_callback(self, callback);
                }
            }
        }
    }

    /// Current shaped output in volts.
    pub fn state(&self) -> Q16 {
        self.shaped
    }

    pub fn dest(&self) -> Q16 {
        self.dest
    }

    /// A ramp is in progress or a callback is due.
    pub fn is_active(&self) -> bool {
        self.countdown > 0
    }

    /// Samples since start of the current ramp, and its length.
    pub fn progress(&self) -> (i32, i32) {
        (self.elapsed, self.duration)
    }
}

impl<C: Copy> Default for Slope<C> {
    fn default() -> Self {
        Self::new()
    }
}
