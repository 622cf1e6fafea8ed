//! Headless controller for the CV engine.
//!
//! Owns the state shared with the real-time block and exposes the
//! scripting surface: input modes, ASL programs, direct slews, scales,
//! dynamics, metros and clocks. The real-time block runs either on a host
//! thread paced against the sample clock or offline, block by block, with
//! the event dispatcher run in between.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use bb_engine::asl::{Action, AslError, CompileReport};
use bb_engine::{BridgeStats, ClockBank, DacOutput, Detector, Guarded, MetroBank, OutputChannel, RtEngine, Shared};
use bb_ir::asl::Stage;
use bb_ir::{adc_to_volts, DetectMode, EngineConfig, Shape, BLOCK_SIZE, INPUT_CHANNELS, OUTPUT_CHANNELS};
use ringbuf::traits::{Consumer, Producer, Split};
use ringbuf::{HeapCons, HeapProd, HeapRb};

use crate::dispatcher::{EventDispatcher, Handlers};
use crate::error::ControlError;
use crate::wav;
use crate::DacFrame;

/// Supplies one raw ADC frame per sample.
pub trait AdcSource {
    fn read(&mut self, sample: u64) -> [i16; INPUT_CHANNELS];
}

impl<F: FnMut(u64) -> [i16; INPUT_CHANNELS]> AdcSource for F {
    fn read(&mut self, sample: u64) -> [i16; INPUT_CHANNELS] {
        self(sample)
    }
}

/// Grounded inputs.
#[derive(Clone, Copy, Debug, Default)]
pub struct Silence;

impl AdcSource for Silence {
    fn read(&mut self, _sample: u64) -> [i16; INPUT_CHANNELS] {
        [0; INPUT_CHANNELS]
    }
}

/// Collects per-channel DAC writes into whole frames.
pub struct FrameAssembler<F: FnMut(DacFrame)> {
    frame: DacFrame,
    sink: F,
}

impl<F: FnMut(DacFrame)> FrameAssembler<F> {
    pub fn new(sink: F) -> Self {
        Self { frame: [0; OUTPUT_CHANNELS], sink }
    }
}

impl<F: FnMut(DacFrame)> DacOutput for FrameAssembler<F> {
    fn write(&mut self, channel: usize, code: i16) {
        if let Some(slot) = self.frame.get_mut(channel) {
            *slot = code;
        }
        if channel == OUTPUT_CHANNELS - 1 {
            (self.sink)(self.frame);
        }
    }
}

struct HostHandle {
    stop_signal: Arc<AtomicBool>,
    thread: Option<JoinHandle<RtEngine>>,
    monitor: HeapCons<DacFrame>,
}

pub struct Controller {
    shared: Arc<Shared>,
    /// Mode and generation each input was last configured with.
    modes: [(DetectMode, u16); INPUT_CHANNELS],
    /// Present whenever the host thread is not running.
    engine: Option<RtEngine>,
    host: Option<HostHandle>,
}

impl Controller {
    pub fn new(config: EngineConfig) -> Self {
        let engine = RtEngine::new(config);
        Self {
            shared: Arc::clone(engine.shared()),
            modes: core::array::from_fn(|_| (DetectMode::None, 0)),
            engine: Some(engine),
            host: None,
        }
    }

    pub fn shared(&self) -> &Arc<Shared> {
        &self.shared
    }

    pub fn config(&self) -> &EngineConfig {
        self.shared.config()
    }

    /// Samples processed by the real-time block so far.
    pub fn now(&self) -> u64 {
        self.shared.now()
    }

    fn input(&self, channel: usize) -> Result<&Guarded<Detector>, ControlError> {
        self.shared.inputs.get(channel).ok_or(ControlError::InvalidChannel(channel))
    }

    fn output(&self, channel: usize) -> Result<&Guarded<OutputChannel>, ControlError> {
        self.shared.outputs.get(channel).ok_or(ControlError::InvalidChannel(channel))
    }

    // --- Inputs ---

    pub fn set_input_mode(&mut self, channel: usize, mode: DetectMode) -> Result<(), ControlError> {
        let config = *self.config();
        let generation = self.input(channel)?.configure(|d| d.configure(&mode, &config));
        log::debug!("input {} -> {:?} (generation {})", channel, mode.kind(), generation);
        self.modes[channel] = (mode, generation);
        Ok(())
    }

    pub fn input_mode(&self, channel: usize) -> Option<&DetectMode> {
        self.modes.get(channel).map(|(mode, _)| mode)
    }

    pub(crate) fn detect_state(&self, channel: usize) -> Option<(&DetectMode, u16)> {
        self.modes.get(channel).map(|(mode, generation)| (mode, *generation))
    }

    /// Last sampled level of an input.
    pub fn input_volts(&self, channel: usize) -> Result<f32, ControlError> {
        let raw = self.input(channel)?.configure(|d| d.last_raw());
        Ok(adc_to_volts(raw))
    }

    // --- Outputs ---

    /// Compile a program onto an output. It starts on the next
    /// `asl_action(Action::Restart)`.
    pub fn asl_describe(&mut self, channel: usize, stages: &[Stage]) -> Result<CompileReport, ControlError> {
        Ok(self.output(channel)?.configure(|out| out.describe(stages)))
    }

    pub fn asl_action(&mut self, channel: usize, action: Action) -> Result<(), ControlError> {
        self.output(channel)?.configure(|out| out.action(action));
        Ok(())
    }

    /// Slew an output directly, abandoning any running program.
    pub fn output_toward(&mut self, channel: usize, volts: f32, seconds: f32, shape: Shape) -> Result<(), ControlError> {
        self.output(channel)?.configure(|out| out.toward(volts, seconds, shape));
        Ok(())
    }

    /// Unquantized output level.
    pub fn output_state(&self, channel: usize) -> Result<f32, ControlError> {
        Ok(self.output(channel)?.configure(|out| out.state()).to_f32())
    }

    pub fn set_output_scale(&mut self, channel: usize, divlist: &[f32], modulo: f32, scaling: f32) -> Result<(), ControlError> {
        self.output(channel)?.configure(|out| out.set_scale(divlist, modulo, scaling));
        Ok(())
    }

    pub fn unset_output_scale(&mut self, channel: usize) -> Result<(), ControlError> {
        self.output(channel)?.configure(|out| out.unset_scale());
        Ok(())
    }

    // --- Dynamics ---

    pub fn def_dynamic(&mut self, channel: usize, init: f32) -> Result<u8, ControlError> {
        Ok(self.output(channel)?.configure(|out| out.asl_mut().def_dynamic(init))?)
    }

    pub fn set_dynamic(&mut self, channel: usize, slot: u8, value: f32) -> Result<(), ControlError> {
        Ok(self.output(channel)?.configure(|out| out.asl_mut().set_dynamic(slot, value))?)
    }

    pub fn get_dynamic(&self, channel: usize, slot: u8) -> Result<f32, ControlError> {
        let value = self.output(channel)?.configure(|out| out.asl().get_dynamic(slot));
        value.ok_or(ControlError::Asl(AslError::NoSuchDynamic(slot)))
    }

    pub fn clear_dynamics(&mut self, channel: usize) -> Result<(), ControlError> {
        self.output(channel)?.configure(|out| out.asl_mut().clear_dynamics());
        Ok(())
    }

    // --- Metros ---

    fn metros<R>(&self, f: impl FnOnce(&mut MetroBank) -> R) -> R {
        self.shared.metros.configure(f)
    }

    pub fn metro_set_time(&mut self, id: usize, seconds: f32) -> Result<(), ControlError> {
        Ok(self.metros(|m| m.set_time(id, seconds))?)
    }

    pub fn metro_set_count(&mut self, id: usize, count: Option<u32>) -> Result<(), ControlError> {
        Ok(self.metros(|m| m.set_count(id, count))?)
    }

    pub fn metro_start(&mut self, id: usize) -> Result<(), ControlError> {
        Ok(self.metros(|m| m.start(id))?)
    }

    pub fn metro_stop(&mut self, id: usize) -> Result<(), ControlError> {
        Ok(self.metros(|m| m.stop(id))?)
    }

    pub fn metro_stop_all(&mut self) {
        self.metros(|m| m.stop_all());
    }

    pub fn metro_is_running(&self, id: usize) -> bool {
        self.metros(|m| m.is_running(id))
    }

    // --- Clocks ---

    fn clocks<R>(&self, f: impl FnOnce(&mut ClockBank) -> R) -> R {
        self.shared.clocks.configure(f)
    }

    pub fn clock_sleep(&mut self, coro: usize, seconds: f32) -> Result<(), ControlError> {
        Ok(self.clocks(|c| c.schedule_sleep(coro, seconds))?)
    }

    pub fn clock_sync(&mut self, coro: usize, beats: f32) -> Result<(), ControlError> {
        Ok(self.clocks(|c| c.schedule_sync(coro, beats))?)
    }

    pub fn clock_cancel(&mut self, coro: usize) -> Result<(), ControlError> {
        Ok(self.clocks(|c| c.cancel(coro))?)
    }

    pub fn clock_cancel_all(&mut self) {
        self.clocks(|c| c.cancel_all());
    }

    pub fn set_tempo(&mut self, bpm: f32) {
        self.clocks(|c| c.set_tempo(bpm));
    }

    pub fn tempo(&self) -> f32 {
        self.clocks(|c| c.tempo())
    }

    pub fn beats(&self) -> f64 {
        self.clocks(|c| c.beats())
    }

    // --- Housekeeping ---

    pub fn bridge_stats(&self) -> BridgeStats {
        self.shared.bridge.stats()
    }

    /// Back to power-on state: timers stopped, inputs off, outputs at 0 V
    /// with no program, scale or dynamics.
    pub fn reset(&mut self) -> Result<(), ControlError> {
        self.metro_stop_all();
        self.clock_cancel_all();
        for channel in 0..INPUT_CHANNELS {
            self.set_input_mode(channel, DetectMode::None)?;
        }
        for output in self.shared.outputs.iter() {
            output.configure(|out| {
                out.asl_mut().clear_dynamics();
                out.describe(&[]);
                out.unset_scale();
                out.reset();
            });
        }
        self.shared.bridge.reset_stats();
        log::info!("engine reset");
        Ok(())
    }

    // --- Host real-time thread ---

    /// Run the real-time block on a thread paced to the sample clock,
    /// reading inputs from `adc`. Output frames are captured for
    /// `monitor_frames`; frames the caller does not collect are dropped.
    pub fn start(&mut self, adc: impl AdcSource + Send + 'static) -> Result<(), ControlError> {
        let engine = self.engine.take().ok_or(ControlError::HostRunning)?;
        let capacity = self.config().sample_rate.max(1) as usize;
        let (producer, monitor) = HeapRb::<DacFrame>::new(capacity).split();

        let stop_signal = Arc::new(AtomicBool::new(false));
        let stop = stop_signal.clone();
        let thread = std::thread::spawn(move || host_thread(engine, adc, producer, stop));

        self.host = Some(HostHandle { stop_signal, thread: Some(thread), monitor });
        log::info!("host thread started");
        Ok(())
    }

    pub fn stop(&mut self) -> Result<(), ControlError> {
        let mut host = self.host.take().ok_or(ControlError::HostStopped)?;
        host.stop_signal.store(true, Ordering::Relaxed);
        let engine = host.thread.take().map(|handle| handle.join());
        self.engine = Some(match engine {
            Some(Ok(engine)) => engine,
            _ => {
                log::error!("host thread panicked, restarting the block clock");
                RtEngine::with_shared(Arc::clone(&self.shared))
            }
        });
        log::info!("host thread stopped at sample {}", self.now());
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.host.is_some()
    }

    /// Move captured output frames into `out`. Returns how many were moved.
    pub fn monitor_frames(&mut self, out: &mut Vec<DacFrame>) -> usize {
        let Some(host) = self.host.as_mut() else {
            return 0;
        };
        let before = out.len();
        while let Some(frame) = host.monitor.try_pop() {
            out.push(frame);
        }
        out.len() - before
    }

    // --- Offline rendering ---

    /// Run `frames` samples through the real-time block, draining events
    /// into `handlers` after every block.
    pub fn run_offline(
        &mut self,
        frames: usize,
        adc: &mut impl AdcSource,
        handlers: &mut impl Handlers,
    ) -> Result<Vec<DacFrame>, ControlError> {
        let mut engine = self.engine.take().ok_or(ControlError::HostRunning)?;
        let block = self.config().block_size.clamp(1, BLOCK_SIZE);
        let mut dispatcher = EventDispatcher::new();
        let mut inputs = [[0i16; INPUT_CHANNELS]; BLOCK_SIZE];
        let mut out = Vec::with_capacity(frames);

        while out.len() < frames {
            let n = block.min(frames - out.len());
            let start = engine.now();
            for (i, frame) in inputs[..n].iter_mut().enumerate() {
                *frame = adc.read(start + i as u64);
            }
            engine.process_block(&inputs[..n], &mut FrameAssembler::new(|frame| out.push(frame)));
            dispatcher.drain(self, handlers);
        }

        self.engine = Some(engine);
        let stats = dispatcher.stats();
        log::debug!("rendered {} frames, {} events handled, {} stale", frames, stats.handled(), stats.stale);
        Ok(out)
    }

    /// Offline render with events drained and discarded.
    pub fn render_frames(&mut self, frames: usize, adc: &mut impl AdcSource) -> Result<Vec<DacFrame>, ControlError> {
        self.run_offline(frames, adc, &mut ())
    }

    pub fn render_to_wav(&mut self, seconds: f32, adc: &mut impl AdcSource) -> Result<Vec<u8>, ControlError> {
        let sample_rate = self.config().sample_rate;
        let frames = (seconds.max(0.0) * sample_rate as f32) as usize;
        let rendered = self.render_frames(frames, adc)?;
        Ok(wav::frames_to_wav(&rendered, sample_rate)?)
    }
}

impl Default for Controller {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

impl Drop for Controller {
    fn drop(&mut self) {
        if self.host.is_some() {
            let _ = self.stop();
        }
    }
}

fn host_thread(
    mut engine: RtEngine,
    mut adc: impl AdcSource,
    mut producer: HeapProd<DacFrame>,
    stop_signal: Arc<AtomicBool>,
) -> RtEngine {
    let config = *engine.shared().config();
    let block = config.block_size.clamp(1, BLOCK_SIZE);
    let period = Duration::from_secs_f64(block as f64 / config.sample_rate.max(1) as f64);
    let mut inputs = [[0i16; INPUT_CHANNELS]; BLOCK_SIZE];
    let mut next = Instant::now();

    while !stop_signal.load(Ordering::Relaxed) {
        let start = engine.now();
        for (i, frame) in inputs[..block].iter_mut().enumerate() {
            *frame = adc.read(start + i as u64);
        }
        engine.process_block(
            &inputs[..block],
            &mut FrameAssembler::new(|frame| {
                let _ = producer.try_push(frame);
            }),
        );

        next += period;
        let now = Instant::now();
        if next > now {
            std::thread::sleep(next - now);
        } else {
            // Fell behind; do not try to catch up in a burst.
            next = now;
        }
    }
    engine
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DetectEvent;
    use bb_ir::asl::presets;
    use bb_ir::{volts_to_adc, volts_to_dac, Direction, Q16};

    #[test]
    fn invalid_channels_are_rejected() {
        let mut ctl = Controller::default();
        assert!(matches!(
            ctl.set_input_mode(INPUT_CHANNELS, DetectMode::None),
            Err(ControlError::InvalidChannel(2))
        ));
        assert!(matches!(ctl.asl_action(OUTPUT_CHANNELS, Action::Restart), Err(ControlError::InvalidChannel(4))));
        assert!(matches!(ctl.metro_start(99), Err(ControlError::Timer(_))));
    }

    #[test]
    fn direct_slew_renders() {
        let mut ctl = Controller::default();
        ctl.output_toward(1, 3.0, 0.0, Shape::Linear).unwrap();
        let frames = ctl.render_frames(64, &mut Silence).unwrap();
        assert_eq!(frames.len(), 64);
        assert!(frames.iter().all(|f| f[1] == volts_to_dac(Q16::from_int(3)) && f[0] == 0));
        assert!((ctl.output_state(1).unwrap() - 3.0).abs() < 1e-4);
    }

    #[test]
    fn asl_done_reaches_handler() {
        struct Done(Vec<usize>);
        impl Handlers for Done {
            fn asl_done(&mut self, _ctl: &mut Controller, channel: usize) {
                self.0.push(channel);
            }
        }

        let mut ctl = Controller::default();
        let report = ctl.asl_describe(3, &presets::ar(0.001, 0.001, 5.0, "linear")).unwrap();
        assert!(report.is_clean());
        ctl.asl_action(3, Action::Restart).unwrap();
        let mut done = Done(Vec::new());
        ctl.run_offline(480, &mut Silence, &mut done).unwrap();
        assert_eq!(done.0, [3]);
    }

    #[test]
    fn handler_can_retrigger_output() {
        struct Retrigger(u32);
        impl Handlers for Retrigger {
            fn asl_done(&mut self, ctl: &mut Controller, channel: usize) {
                self.0 += 1;
                if self.0 < 3 {
                    ctl.asl_action(channel, Action::Restart).unwrap();
                }
            }
        }

        let mut ctl = Controller::default();
        ctl.asl_describe(0, &presets::pulse(0.001, 5.0, 1)).unwrap();
        ctl.asl_action(0, Action::Restart).unwrap();
        let mut handler = Retrigger(0);
        ctl.run_offline(4800, &mut Silence, &mut handler).unwrap();
        assert_eq!(handler.0, 3);
    }

    #[test]
    fn change_events_reach_input_handler() {
        struct Edges(Vec<(usize, bool)>);
        impl Handlers for Edges {
            fn input(&mut self, _ctl: &mut Controller, channel: usize, event: DetectEvent) {
                if let DetectEvent::Change { state } = event {
                    self.0.push((channel, state));
                }
            }
        }

        let mut ctl = Controller::default();
        ctl.set_input_mode(1, DetectMode::change(1.0, 0.1, Direction::Both)).unwrap();
        let high = volts_to_adc(3.0) as i16;
        let mut adc = |sample: u64| if (100..200).contains(&sample) { [0, high] } else { [0, 0] };
        let mut edges = Edges(Vec::new());
        ctl.run_offline(320, &mut adc, &mut edges).unwrap();
        assert_eq!(edges.0, [(1, true), (1, false)]);
        assert!((ctl.input_volts(1).unwrap()).abs() < 1e-4);
    }

    #[test]
    fn reconfigure_drops_pending_events() {
        struct Count(usize);
        impl Handlers for Count {
            fn input(&mut self, _ctl: &mut Controller, _channel: usize, _event: DetectEvent) {
                self.0 += 1;
            }
        }

        let mut ctl = Controller::default();
        ctl.set_input_mode(0, DetectMode::stream(0.001)).unwrap();
        let mut engine = ctl.engine.take().unwrap();
        engine.process_block(&[[0; INPUT_CHANNELS]; 64], &mut |_: usize, _: i16| {});
        ctl.engine = Some(engine);
        assert!(ctl.bridge_stats().input.depth > 0);

        ctl.set_input_mode(0, DetectMode::stream(0.001)).unwrap();
        let mut count = Count(0);
        let mut dispatcher = EventDispatcher::new();
        dispatcher.drain(&mut ctl, &mut count);
        assert_eq!(count.0, 0);
        assert!(dispatcher.stats().stale > 0);
    }

    #[test]
    fn dynamics_through_controller() {
        let mut ctl = Controller::default();
        let slot = ctl.def_dynamic(2, 1.5).unwrap();
        ctl.set_dynamic(2, slot, 2.5).unwrap();
        assert_eq!(ctl.get_dynamic(2, slot).unwrap(), 2.5);
        assert!(matches!(ctl.get_dynamic(2, 9), Err(ControlError::Asl(AslError::NoSuchDynamic(9)))));
        ctl.clear_dynamics(2).unwrap();
        assert!(ctl.get_dynamic(2, slot).is_err());
    }

    #[test]
    fn metro_count_limit_through_dispatch() {
        struct Stages(Vec<u32>);
        impl Handlers for Stages {
            fn metro(&mut self, _ctl: &mut Controller, _id: u8, stage: u32) {
                self.0.push(stage);
            }
        }

        let mut ctl = Controller::default();
        ctl.metro_set_time(5, 0.001).unwrap();
        ctl.metro_set_count(5, Some(3)).unwrap();
        ctl.metro_start(5).unwrap();
        let mut stages = Stages(Vec::new());
        ctl.run_offline(4800, &mut Silence, &mut stages).unwrap();
        assert_eq!(stages.0, [0, 1, 2]);
        assert!(!ctl.metro_is_running(5));
    }

    #[test]
    fn clock_sleep_wakes_once() {
        struct Wakes(Vec<u8>);
        impl Handlers for Wakes {
            fn clock(&mut self, _ctl: &mut Controller, coro: u8) {
                self.0.push(coro);
            }
        }

        let mut ctl = Controller::default();
        ctl.clock_sleep(4, 0.002).unwrap();
        let mut wakes = Wakes(Vec::new());
        ctl.run_offline(960, &mut Silence, &mut wakes).unwrap();
        assert_eq!(wakes.0, [4]);
    }

    #[test]
    fn reset_clears_everything() {
        let mut ctl = Controller::default();
        ctl.set_input_mode(0, DetectMode::peak(1.0, 0.1)).unwrap();
        ctl.output_toward(0, 2.0, 0.0, Shape::Linear).unwrap();
        ctl.metro_start(0).unwrap();
        ctl.reset().unwrap();
        assert_eq!(ctl.input_mode(0), Some(&DetectMode::None));
        assert_eq!(ctl.output_state(0).unwrap(), 0.0);
        assert!(!ctl.metro_is_running(0));
    }

    #[test]
    fn wav_render_has_expected_length() {
        let mut ctl = Controller::default();
        let wav = ctl.render_to_wav(0.01, &mut Silence).unwrap();
        assert_eq!(wav.len(), 44 + 480 * OUTPUT_CHANNELS * 2);
    }

    #[test]
    fn host_thread_runs_and_hands_engine_back() {
        let mut ctl = Controller::default();
        ctl.output_toward(0, 1.0, 0.0, Shape::Linear).unwrap();
        ctl.start(Silence).unwrap();
        assert!(matches!(ctl.start(Silence), Err(ControlError::HostRunning)));
        assert!(matches!(ctl.render_frames(32, &mut Silence), Err(ControlError::HostRunning)));

        let deadline = Instant::now() + Duration::from_secs(5);
        let mut frames = Vec::new();
        while frames.len() < 64 && Instant::now() < deadline {
            ctl.monitor_frames(&mut frames);
            std::thread::sleep(Duration::from_millis(1));
        }
        ctl.stop().unwrap();
        assert!(frames.len() >= 64);
        assert_eq!(frames[63][0], volts_to_dac(Q16::from_int(1)));
        assert!(ctl.now() >= 64);

        assert!(matches!(ctl.stop(), Err(ControlError::HostStopped)));
        assert_eq!(ctl.render_frames(32, &mut Silence).unwrap().len(), 32);
    }
}
