//! The real-time block.

use alloc::sync::Arc;
use core::sync::atomic::{AtomicU64, Ordering};

use bb_ir::{volts_to_dac, AslDone, EngineConfig, ShapeLut, BLOCK_SIZE, INPUT_CHANNELS, OUTPUT_CHANNELS, Q16};

use crate::bridge::EventBridge;
use crate::detect::Detector;
use crate::guard::Guarded;
use crate::output::OutputChannel;
use crate::timers::{ClockBank, MetroBank};

/// Write-only DAC sink.
pub trait DacOutput {
    fn write(&mut self, channel: usize, code: i16);
}

impl<F: FnMut(usize, i16)> DacOutput for F {
    fn write(&mut self, channel: usize, code: i16) {
        self(channel, code)
    }
}

/// State both contexts reach: queues out, guarded configuration in.
pub struct Shared {
    config: EngineConfig,
    pub bridge: EventBridge,
    pub inputs: [Guarded<Detector>; INPUT_CHANNELS],
    pub outputs: [Guarded<OutputChannel>; OUTPUT_CHANNELS],
    pub metros: Guarded<MetroBank>,
    pub clocks: Guarded<ClockBank>,
    lut: ShapeLut,
    now: AtomicU64,
}

impl Shared {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            bridge: EventBridge::new(),
            inputs: core::array::from_fn(|ch| Guarded::new(Detector::new(ch as u8))),
            outputs: core::array::from_fn(|ch| Guarded::new(OutputChannel::new(ch as u8, config))),
            metros: Guarded::new(MetroBank::new(config)),
            clocks: Guarded::new(ClockBank::new(config)),
            lut: ShapeLut::new(),
            now: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn lut(&self) -> &ShapeLut {
        &self.lut
    }

    /// Samples processed so far.
    pub fn now(&self) -> u64 {
        self.now.load(Ordering::Acquire)
    }
}

/// Runs detection, outputs and timers for each block of input frames.
pub struct RtEngine {
    shared: Arc<Shared>,
    block: usize,
    now: u64,
    scratch: [[Q16; BLOCK_SIZE]; OUTPUT_CHANNELS],
    /// Last volts written per output, repeated while a channel is being
    /// reconfigured.
    held: [Q16; OUTPUT_CHANNELS],
}

impl RtEngine {
    pub fn new(config: EngineConfig) -> Self {
        Self::with_shared(Arc::new(Shared::new(config)))
    }

    pub fn with_shared(shared: Arc<Shared>) -> Self {
        let block = shared.config.block_size.clamp(1, BLOCK_SIZE);
        Self {
            shared,
            block,
            now: 0,
            scratch: [[Q16::ZERO; BLOCK_SIZE]; OUTPUT_CHANNELS],
            held: [Q16::ZERO; OUTPUT_CHANNELS],
        }
    }

    pub fn shared(&self) -> &Arc<Shared> {
        &self.shared
    }

    pub fn now(&self) -> u64 {
        self.now
    }

    /// Process one ADC frame per sample and write one DAC code per output
    /// per sample. Never blocks and never allocates.
    pub fn process_block(&mut self, inputs: &[[i16; INPUT_CHANNELS]], dac: &mut impl DacOutput) {
        #[cfg(feature = "alloc_check")]
        assert_no_alloc::assert_no_alloc(|| self.run(inputs, dac));
        #[cfg(not(feature = "alloc_check"))]
        self.run(inputs, dac);
    }

    fn run(&mut self, inputs: &[[i16; INPUT_CHANNELS]], dac: &mut impl DacOutput) {
        for frames in inputs.chunks(self.block) {
            self.run_chunk(frames, dac);
        }
    }

    fn run_chunk(&mut self, frames: &[[i16; INPUT_CHANNELS]], dac: &mut impl DacOutput) {
        let shared = &*self.shared;
        let n = frames.len();
        let end = self.now + n as u64;

        for (ch, input) in shared.inputs.iter().enumerate() {
            let Some(mut detector) = input.try_realtime() else {
                continue;
            };
            for (i, frame) in frames.iter().enumerate() {
                if let Some(event) = detector.sample(frame[ch], self.now + i as u64) {
                    shared.bridge.input.post(event);
                }
            }
        }

        for (ch, output) in shared.outputs.iter().enumerate() {
            let buf = &mut self.scratch[ch][..n];
            match output.try_realtime() {
                Some(mut out) => {
                    out.render(&shared.lut, buf);
                    if out.take_done() {
                        shared.bridge.asl_done.post(AslDone { channel: ch as u8, timestamp: end });
                    }
                }
                None => buf.fill(self.held[ch]),
            }
            if let Some(&last) = buf.last() {
                self.held[ch] = last;
            }
        }

        for i in 0..n {
            for (ch, buf) in self.scratch.iter().enumerate() {
                dac.write(ch, volts_to_dac(buf[i]));
            }
        }

        self.now += n as u64;
        if let Some(mut metros) = shared.metros.try_realtime() {
            metros.tick(self.now, &shared.bridge.metro);
        }
        if let Some(mut clocks) = shared.clocks.try_realtime() {
            clocks.tick(self.now, &shared.bridge.clock);
        }
        shared.now.store(self.now, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asl::Action;
    use bb_ir::asl::{loop_, presets, to};
    use bb_ir::{DetectMode, Direction, RawPayload};

    struct Frames(Vec<[i16; OUTPUT_CHANNELS]>);

    impl DacOutput for Frames {
        fn write(&mut self, channel: usize, code: i16) {
            if channel == 0 {
                self.0.push([0; OUTPUT_CHANNELS]);
            }
            if let Some(frame) = self.0.last_mut() {
                frame[channel] = code;
            }
        }
    }

    #[test]
    fn block_writes_every_output_every_sample() {
        let mut rt = RtEngine::new(EngineConfig::default());
        let mut frames = Frames(Vec::new());
        rt.process_block(&[[0; INPUT_CHANNELS]; 100], &mut frames);
        assert_eq!(frames.0.len(), 100);
        assert_eq!(rt.now(), 100);
        assert_eq!(rt.shared().now(), 100);
    }

    #[test]
    fn asl_completion_reaches_queue_once() {
        let mut rt = RtEngine::new(EngineConfig::default());
        let shared = rt.shared().clone();
        shared.outputs[2].configure(|out| {
            out.describe(&presets::ar(0.001, 0.001, 5.0, "linear"));
            out.action(Action::Restart);
        });
        let mut frames = Frames(Vec::new());
        rt.process_block(&[[0; INPUT_CHANNELS]; 256], &mut frames);
        // Release lands on sample 95, the last of the third block.
        assert_eq!(shared.bridge.asl_done.get(), Some(AslDone { channel: 2, timestamp: 96 }));
        assert!(shared.bridge.asl_done.get().is_none());
        let peak = frames.0.iter().map(|f| f[2]).max();
        assert_eq!(peak, Some(volts_to_dac(Q16::from_int(5))));
        assert!(frames.0.iter().all(|f| f[0] == 0));
    }

    fn single_sample_engine() -> RtEngine {
        RtEngine::new(EngineConfig { sample_rate: 48_000, block_size: 1 })
    }

    /// Completions posted while running `blocks` one-sample blocks.
    fn completions(rt: &mut RtEngine, blocks: usize) -> Vec<AslDone> {
        let shared = rt.shared().clone();
        let mut done = Vec::new();
        for _ in 0..blocks {
            rt.process_block(&[[0; INPUT_CHANNELS]], &mut |_: usize, _: i16| {});
            while let Some(event) = shared.bridge.asl_done.get() {
                done.push(event);
            }
        }
        done
    }

    #[test]
    fn instant_program_completes_once_with_single_sample_blocks() {
        let mut rt = single_sample_engine();
        let shared = rt.shared().clone();
        shared.outputs[0].configure(|out| {
            out.describe(&[to(1.0, 0.0, "now"), to(0.0, 0.0, "now")]);
            out.action(Action::Restart);
        });
        let done = completions(&mut rt, 20);
        assert_eq!(done, [AslDone { channel: 0, timestamp: 1 }]);
        assert_eq!(shared.bridge.stats().total_dropped(), 0);
    }

    #[test]
    fn instant_loop_never_completes_with_single_sample_blocks() {
        let mut rt = single_sample_engine();
        let shared = rt.shared().clone();
        shared.outputs[1].configure(|out| {
            out.describe(&[loop_(vec![to(1.0, 0.0, "now"), to(0.0, 0.0, "now")])]);
            out.action(Action::Restart);
        });
        assert!(completions(&mut rt, 50).is_empty());
        assert_eq!(rt.now(), 50);
    }

    #[test]
    fn ramp_completion_is_stamped_with_single_sample_blocks() {
        let mut rt = single_sample_engine();
        let shared = rt.shared().clone();
        shared.outputs[3].configure(|out| {
            out.describe(&[to(2.0, 0.0001, "linear")]);
            out.action(Action::Restart);
        });
        // 0.0001 s is 5 samples; the breakpoint is the fifth.
        assert_eq!(completions(&mut rt, 20), [AslDone { channel: 3, timestamp: 5 }]);
    }

    #[test]
    fn input_edges_are_posted() {
        let mut rt = RtEngine::new(EngineConfig::default());
        let shared = rt.shared().clone();
        let config = *shared.config();
        shared.inputs[1].configure(|d| d.configure(&DetectMode::change(1.0, 0.1, Direction::Both), &config));
        let mut block = [[0i16; INPUT_CHANNELS]; 64];
        for frame in block[10..40].iter_mut() {
            frame[1] = 1000;
        }
        rt.process_block(&block, &mut |_: usize, _: i16| {});
        let first = shared.bridge.input.get().map(|e| (e.channel, e.payload, e.timestamp));
        assert_eq!(first, Some((1, RawPayload::Change { rising: true }, 10)));
        let second = shared.bridge.input.get().map(|e| e.payload);
        assert_eq!(second, Some(RawPayload::Change { rising: false }));
        assert!(shared.bridge.input.get().is_none());
    }

    #[test]
    fn metro_fires_from_block_clock() {
        let mut rt = RtEngine::new(EngineConfig::default());
        let shared = rt.shared().clone();
        shared.metros.configure(|m| {
            m.set_time(0, 0.002).unwrap();
            m.start(0).unwrap();
        });
        rt.process_block(&[[0; INPUT_CHANNELS]; 96], &mut |_: usize, _: i16| {});
        let event = shared.bridge.metro.get();
        assert_eq!(event.map(|e| (e.id, e.stage, e.timestamp)), Some((0, 0, 96)));
    }
}
