//! Metro and clock timers, evaluated once per real-time block.
//!
//! Both banks are configured from the control context in seconds or beats and
//! converted there to sample times; the real-time `tick` only compares 64-bit
//! sample counts and posts events.

use core::fmt;

use bb_ir::{ClockEvent, EngineConfig, MetroEvent, Q16, Q16_SHIFT};

use crate::bridge::{ClockQueue, MetroQueue};

pub const METRO_COUNT: usize = 8;
pub const CLOCK_COUNT: usize = 8;

/// Tempo a fresh clock bank runs at.
pub const DEFAULT_TEMPO: f32 = 120.0;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TimerError {
    NoSuchTimer(usize),
}

impl fmt::Display for TimerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimerError::NoSuchTimer(id) => write!(f, "no timer {}", id),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for TimerError {}

/// Whole samples plus a Q16 fraction.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
struct Period {
    whole: u64,
    frac: Q16,
}

impl Period {
    fn from_seconds(seconds: f32, config: &EngineConfig, min: u64) -> Self {
        let samples = libm::fmaxf(seconds, 0.0) * config.sample_rate as f32;
        let whole = samples as u64;
        if whole < min {
            return Period { whole: min, frac: Q16::ZERO };
        }
        Period { whole, frac: Q16::from_f32(samples - whole as f32).fract() }
    }

    /// Next due time after `due`, folding the fraction into `carry`.
    fn step(&self, due: u64, carry: &mut Q16) -> u64 {
        *carry += self.frac;
        let extra = (carry.0 >> Q16_SHIFT) as u64;
        *carry = carry.fract();
        due + self.whole + extra
    }
}

#[derive(Clone, Copy, Debug, Default)]
struct Metro {
    running: bool,
    period: Period,
    carry: Q16,
    next_due: u64,
    stage: u32,
    /// Stop after this many expiries.
    count: Option<u32>,
}

/// Periodic timers posting `(id, stage)`.
#[derive(Clone, Debug)]
pub struct MetroBank {
    config: EngineConfig,
    metros: [Metro; METRO_COUNT],
    now: u64,
}

impl MetroBank {
    pub fn new(config: EngineConfig) -> Self {
        let period = Period::from_seconds(1.0, &config, 1);
        let metro = Metro { period, ..Metro::default() };
        Self { config, metros: [metro; METRO_COUNT], now: 0 }
    }

    fn metro(&mut self, id: usize) -> Result<&mut Metro, TimerError> {
        self.metros.get_mut(id).ok_or(TimerError::NoSuchTimer(id))
    }

    /// Period in seconds, at least one block. A running metro keeps its
    /// next expiry.
    pub fn set_time(&mut self, id: usize, seconds: f32) -> Result<(), TimerError> {
        let period = Period::from_seconds(seconds, &self.config, self.config.block_size as u64);
        self.metro(id)?.period = period;
        Ok(())
    }

    /// Expiries before the metro stops itself. `None` runs forever.
    pub fn set_count(&mut self, id: usize, count: Option<u32>) -> Result<(), TimerError> {
        self.metro(id)?.count = count;
        Ok(())
    }

    /// Start from stage 0, first expiry one period from now.
    pub fn start(&mut self, id: usize) -> Result<(), TimerError> {
        let now = self.now;
        let m = self.metro(id)?;
        m.running = true;
        m.stage = 0;
        m.carry = Q16::ZERO;
        m.next_due = m.period.step(now, &mut m.carry);
        log::debug!("metro {} started, period {} samples", id, m.period.whole);
        Ok(())
    }

    pub fn stop(&mut self, id: usize) -> Result<(), TimerError> {
        self.metro(id)?.running = false;
        Ok(())
    }

    pub fn stop_all(&mut self) {
        for m in self.metros.iter_mut() {
            m.running = false;
        }
    }

    pub fn is_running(&self, id: usize) -> bool {
        self.metros.get(id).is_some_and(|m| m.running)
    }

    /// Stage the next expiry will report.
    pub fn stage(&self, id: usize) -> Option<u32> {
        self.metros.get(id).map(|m| m.stage)
    }

    /// Post every expiry due at or before `now`.
    pub fn tick(&mut self, now: u64, queue: &MetroQueue) {
        self.now = now;
        for (id, m) in self.metros.iter_mut().enumerate() {
            while m.running && m.next_due <= now {
                queue.post(MetroEvent { id: id as u8, stage: m.stage, timestamp: m.next_due });
                m.stage = m.stage.wrapping_add(1);
                m.next_due = m.period.step(m.next_due, &mut m.carry);
                if m.count.is_some_and(|count| m.stage >= count) {
                    m.running = false;
                }
            }
        }
    }
}

/// Coroutine wake-ups on a sample clock and a tempo grid.
#[derive(Clone, Debug)]
pub struct ClockBank {
    config: EngineConfig,
    wake: [Option<u64>; CLOCK_COUNT],
    now: u64,
    samples_per_beat: f64,
    /// Beat position at `anchor`.
    anchor_beat: f64,
    anchor: u64,
}

impl ClockBank {
    pub fn new(config: EngineConfig) -> Self {
        let mut bank = Self {
            config,
            wake: [None; CLOCK_COUNT],
            now: 0,
            samples_per_beat: 0.0,
            anchor_beat: 0.0,
            anchor: 0,
        };
        bank.set_tempo(DEFAULT_TEMPO);
        bank
    }

    fn slot(&mut self, coro: usize) -> Result<&mut Option<u64>, TimerError> {
        self.wake.get_mut(coro).ok_or(TimerError::NoSuchTimer(coro))
    }

    /// Wake `coro` after `seconds`, no sooner than the next block.
    pub fn schedule_sleep(&mut self, coro: usize, seconds: f32) -> Result<(), TimerError> {
        let samples = (libm::fmaxf(seconds, 0.0) * self.config.sample_rate as f32 + 0.5) as u64;
        let at = self.now + samples.max(1);
        *self.slot(coro)? = Some(at);
        Ok(())
    }

    /// Wake `coro` on the next multiple of `beats` on the tempo grid.
    pub fn schedule_sync(&mut self, coro: usize, beats: f32) -> Result<(), TimerError> {
        let at = if beats > 0.0 {
            let beats = beats as f64;
            let target = (libm::floor(self.beats_at(self.now) / beats) + 1.0) * beats;
            self.anchor + libm::ceil((target - self.anchor_beat) * self.samples_per_beat) as u64
        } else {
            self.now + 1
        };
        *self.slot(coro)? = Some(at.max(self.now + 1));
        Ok(())
    }

    pub fn cancel(&mut self, coro: usize) -> Result<(), TimerError> {
        *self.slot(coro)? = None;
        Ok(())
    }

    pub fn cancel_all(&mut self) {
        self.wake = [None; CLOCK_COUNT];
    }

    pub fn is_pending(&self, coro: usize) -> bool {
        matches!(self.wake.get(coro), Some(Some(_)))
    }

    /// Change tempo without moving the current beat position. Pending
    /// wake-ups keep their sample times.
    pub fn set_tempo(&mut self, bpm: f32) {
        let bpm = if bpm > 0.0 { bpm as f64 } else { DEFAULT_TEMPO as f64 };
        self.anchor_beat = self.beats_at(self.now);
        self.anchor = self.now;
        self.samples_per_beat = 60.0 * self.config.sample_rate as f64 / bpm;
    }

    pub fn tempo(&self) -> f32 {
        (60.0 * self.config.sample_rate as f64 / self.samples_per_beat) as f32
    }

    /// Beats elapsed on the tempo grid.
    pub fn beats(&self) -> f64 {
        self.beats_at(self.now)
    }

    fn beats_at(&self, at: u64) -> f64 {
        if self.samples_per_beat <= 0.0 {
            return self.anchor_beat;
        }
        self.anchor_beat + (at.saturating_sub(self.anchor)) as f64 / self.samples_per_beat
    }

    /// Post every wake-up due at or before `now`.
    pub fn tick(&mut self, now: u64, queue: &ClockQueue) {
        self.now = now;
        for (coro, slot) in self.wake.iter_mut().enumerate() {
            if let Some(at) = *slot {
                if at <= now {
                    *slot = None;
                    queue.post(ClockEvent { coro: coro as u8, timestamp: at });
                }
            }
        }
    }
}
