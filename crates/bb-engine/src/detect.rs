//! Input detection, real-time half.
//!
//! `Detector::sample` runs once per input sample in the real-time context and
//! uses integer arithmetic only. It turns raw ADC counts into `RawEvent`s that
//! the control context converts to volts later. Float parameters are turned
//! into integer thresholds once, in `configure`, which the control context
//! calls with the channel guard held.

use bb_ir::{
    counts_to_volts, volts_to_adc, volts_to_counts, DetectKind, DetectMode, Direction, EngineConfig,
    RawEvent, RawPayload, Q16, SCALE_HYSTERESIS, SCALE_MAX, WINDOW_MAX,
};
use heapless::Vec as HVec;

/// Smallest hysteresis used by change and peak detection, in ADC counts.
pub const MIN_HYSTERESIS: i32 = 1;

/// Envelope time constant for volume mode, seconds.
pub const VOLUME_TIME: f32 = 0.018;

/// Envelope time constant for peak mode, seconds.
pub const PEAK_TIME: f32 = 0.18;

/// Block countdown with a fractional carry so non-integer block counts do
/// not drift over long runs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Cadence {
    whole: u32,
    frac: Q16,
    carry: Q16,
    countdown: u32,
}

impl Cadence {
    fn new(interval: f32, block_rate: f32) -> Self {
        let blocks = interval * block_rate;
        // `!(>=)` also catches NaN.
        if !(blocks >= 1.0) {
            return Self { whole: 1, frac: Q16::ZERO, carry: Q16::ZERO, countdown: 1 };
        }
        let whole = blocks as u32;
        let frac = Q16::from_f32(blocks - whole as f32).clamp(Q16::ZERO, Q16(Q16::ONE.0 - 1));
        Self { whole, frac, carry: Q16::ZERO, countdown: whole }
    }

    /// Count one block. True when the interval has elapsed.
    fn tick(&mut self) -> bool {
        self.countdown = self.countdown.saturating_sub(1);
        if self.countdown > 0 {
            return false;
        }
        self.carry += self.frac;
        let extra = if self.carry >= Q16::ONE {
            self.carry -= Q16::ONE;
            1
        } else {
            0
        };
        self.countdown = self.whole + extra;
        true
    }
}

/// Asymmetric one-pole follower on |raw|, in Q16 ADC counts.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Envelope {
    level: Q16,
    attack: Q16,
    release: Q16,
}

impl Envelope {
    fn new(time_constant: f32, sample_rate: u32) -> Self {
        let rate = sample_rate as f32;
        let attack = libm::expf(-1.0 / (time_constant * rate * 0.1));
        let release = libm::expf(-1.0 / (time_constant * rate));
        Self { level: Q16::ZERO, attack: Q16::from_f32(attack), release: Q16::from_f32(release) }
    }

    fn step(&mut self, raw: i16) -> Q16 {
        let x = Q16::from_int(raw.unsigned_abs().min(i16::MAX as u16) as i32);
        let coeff = if x > self.level { self.attack } else { self.release };
        self.level = x + coeff.mul(self.level - x);
        self.level
    }
}

/// Scale-mode constants in Q16 volts plus the current window in counts.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct ScaleState {
    len: i32,
    scaling: Q16,
    offset: Q16,
    win: Q16,
    hyst: Q16,
    lower: i32,
    upper: i32,
}

impl ScaleState {
    fn new(len: usize, divs: f32, scaling: f32) -> Self {
        let len = len.max(1) as i32;
        let scaling_q = Q16::from_f32(scaling);
        let mut state = Self {
            len,
            scaling: scaling_q,
            offset: Q16::from_f32(0.5 * scaling).div(Q16::from_f32(divs)),
            win: Q16(scaling_q.0 / len),
            hyst: Q16::from_f32(SCALE_HYSTERESIS),
            lower: 0,
            upper: 0,
        };
        // Start far below any input so the first sample reports a degree.
        state.set_bounds(0, -10);
        state
    }

    fn set_bounds(&mut self, index: i32, octave: i32) {
        let ideal = Q16(self.scaling.0.wrapping_mul(octave)) + Q16(self.win.0 * index) - self.offset;
        self.lower = volts_to_counts(ideal - self.hyst);
        self.upper = volts_to_counts(ideal + self.hyst + self.win);
    }

    /// Degree and octave for `raw`, then move the window around it.
    fn locate(&mut self, raw: i16) -> (u8, i8) {
        let level = counts_to_volts(raw as i32) + self.offset;
        let norm = level.div(self.scaling);
        let octave = norm.floor_int();
        let phase = norm.fract();
        let index = ((phase.0 as i64 * self.len as i64) >> 16).clamp(0, self.len as i64 - 1) as i32;
        self.set_bounds(index, octave);
        (index as u8, octave.clamp(i8::MIN as i32, i8::MAX as i32) as i8)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
enum Hot {
    None,
    Change { threshold: i32, hysteresis: i32, direction: Direction },
    Stream(Cadence),
    Window { bounds: HVec<i32, WINDOW_MAX>, hysteresis: i32, last: i8 },
    Scale(ScaleState),
    Volume { cadence: Cadence, envelope: Envelope },
    Peak { envelope: Envelope, threshold: Q16, hysteresis: Q16 },
}

/// One input channel's detection state.
#[derive(Clone, Debug)]
pub struct Detector {
    channel: u8,
    generation: u16,
    block_size: u32,
    block_pos: u32,
    hot: Hot,
    last_raw: i16,
    high: bool,
    rises: u32,
    falls: u32,
}

impl Detector {
    pub fn new(channel: u8) -> Self {
        Self {
            channel,
            generation: 0,
            block_size: bb_ir::BLOCK_SIZE as u32,
            block_pos: 0,
            hot: Hot::None,
            last_raw: 0,
            high: false,
            rises: 0,
            falls: 0,
        }
    }

    /// Install `mode`. Returns the new configuration generation; events
    /// produced under earlier generations are stale.
    pub fn configure(&mut self, mode: &DetectMode, config: &EngineConfig) -> u16 {
        self.generation = self.generation.wrapping_add(1);
        self.block_size = config.block_size.max(1) as u32;
        self.block_pos = 0;
        let block_rate = config.block_rate();
        self.hot = match mode {
            DetectMode::None => Hot::None,
            DetectMode::Change { threshold, hysteresis, direction } => {
                let threshold = volts_to_adc(*threshold);
                // Start in whatever state the input is already in.
                self.high = self.last_raw as i32 > threshold;
                Hot::Change {
                    threshold,
                    hysteresis: volts_to_adc(*hysteresis).max(MIN_HYSTERESIS),
                    direction: *direction,
                }
            }
            DetectMode::Stream { interval } => Hot::Stream(Cadence::new(*interval, block_rate)),
            DetectMode::Window { windows, hysteresis } => Hot::Window {
                bounds: windows.iter().map(|w| volts_to_adc(*w)).collect(),
                hysteresis: volts_to_adc(*hysteresis),
                last: 0,
            },
            DetectMode::Scale { notes, divs, scaling } => {
                let len = if notes.is_empty() { (*divs as usize).min(SCALE_MAX) } else { notes.len() };
                Hot::Scale(ScaleState::new(len, *divs, *scaling))
            }
            DetectMode::Volume { interval } => Hot::Volume {
                cadence: Cadence::new(*interval, block_rate),
                envelope: Envelope::new(VOLUME_TIME, config.sample_rate),
            },
            DetectMode::Peak { threshold, hysteresis } => {
                self.high = false;
                Hot::Peak {
                    envelope: Envelope::new(PEAK_TIME, config.sample_rate),
                    threshold: Q16::from_int(volts_to_adc(*threshold)),
                    hysteresis: Q16::from_int(volts_to_adc(*hysteresis).max(MIN_HYSTERESIS)),
                }
            }
        };
        self.generation
    }

    /// Process one raw sample taken at sample time `now`.
    pub fn sample(&mut self, raw: i16, now: u64) -> Option<RawEvent> {
        self.block_pos += 1;
        let boundary = self.block_pos >= self.block_size;
        if boundary {
            self.block_pos = 0;
        }
        let payload = self.step(raw, boundary);
        self.last_raw = raw;
        payload.map(|payload| RawEvent { channel: self.channel, generation: self.generation, payload, timestamp: now })
    }

    fn step(&mut self, raw: i16, boundary: bool) -> Option<RawPayload> {
        let level = raw as i32;
        match &mut self.hot {
            Hot::None => None,
            Hot::Change { threshold, hysteresis, direction } => {
                if self.high {
                    if level < threshold.saturating_sub(*hysteresis) {
                        self.high = false;
                        self.falls += 1;
                        return direction.accepts(false).then_some(RawPayload::Change { rising: false });
                    }
                } else if level > threshold.saturating_add(*hysteresis) {
                    self.high = true;
                    self.rises += 1;
                    return direction.accepts(true).then_some(RawPayload::Change { rising: true });
                }
                None
            }
            Hot::Stream(cadence) => (boundary && cadence.tick()).then_some(RawPayload::Stream { raw }),
            Hot::Window { bounds, hysteresis, last } => {
                let mut ix = 0i32;
                for edge in bounds.iter() {
                    // Hysteresis pushes the edge away from the previous window.
                    let effective = if *last as i32 <= ix + 1 {
                        edge.saturating_add(*hysteresis)
                    } else {
                        edge.saturating_sub(*hysteresis)
                    };
                    if level < effective {
                        break;
                    }
                    ix += 1;
                }
                let ix = ix + 1;
                let prev = *last as i32;
                if ix == prev {
                    return None;
                }
                *last = ix as i8;
                let index = if ix > prev { ix } else { -ix };
                Some(RawPayload::Window { index: index as i8 })
            }
            Hot::Scale(scale) => {
                if level > scale.upper || level < scale.lower {
                    let (index, octave) = scale.locate(raw);
                    Some(RawPayload::Scale { index, octave })
                } else {
                    None
                }
            }
            Hot::Volume { cadence, envelope } => {
                let env = envelope.step(raw);
                (boundary && cadence.tick()).then_some(RawPayload::Volume { level: env })
            }
            Hot::Peak { envelope, threshold, hysteresis } => {
                let env = envelope.step(raw);
                if self.high {
                    if env.0 < threshold.0.saturating_sub(hysteresis.0) {
                        self.high = false;
                    }
                    None
                } else if env.0 > threshold.0.saturating_add(hysteresis.0) {
                    self.high = true;
                    Some(RawPayload::Peak)
                } else {
                    None
                }
            }
        }
    }

    pub fn channel(&self) -> u8 {
        self.channel
    }

    pub fn generation(&self) -> u16 {
        self.generation
    }

    pub fn kind(&self) -> DetectKind {
        match self.hot {
            Hot::None => DetectKind::None,
            Hot::Change { .. } => DetectKind::Change,
            Hot::Stream(_) => DetectKind::Stream,
            Hot::Window { .. } => DetectKind::Window,
            Hot::Scale(_) => DetectKind::Scale,
            Hot::Volume { .. } => DetectKind::Volume,
            Hot::Peak { .. } => DetectKind::Peak,
        }
    }

    pub fn last_raw(&self) -> i16 {
        self.last_raw
    }

    /// Rising and falling edges seen in change mode, whether or not the
    /// direction filter reported them.
    pub fn edge_counts(&self) -> (u32, u32) {
        (self.rises, self.falls)
    }
}
