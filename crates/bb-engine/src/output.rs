//! One DAC output: slope, ASL program and quantizer.

use bb_ir::asl::Stage;
use bb_ir::{EngineConfig, Shape, ShapeLut, Q16};

use crate::asl::{Action, Asl, AslDriver, CompileReport, Resume};
use crate::quantize::Quantizer;
use crate::slope::Slope;

/// Output channel state, shared between contexts behind a `Guarded`.
#[derive(Clone, Debug)]
pub struct OutputChannel {
    config: EngineConfig,
    slope: Slope<Resume>,
    asl: Asl,
    quantizer: Quantizer,
    /// The program finished; the real-time side posts the event.
    done: bool,
}

/// Binds an ASL program to its slope.
struct Drive<'a> {
    slope: &'a mut Slope<Resume>,
    done: &'a mut bool,
}

impl AslDriver for Drive<'_> {
    fn toward(&mut self, dest: Q16, samples: i32, shape: Shape, resume: Option<Resume>) {
        self.slope.toward(dest, samples, shape, resume);
    }

    fn yield_tick(&mut self, resume: Resume) {
        let here = self.slope.state();
        self.slope.toward(here, 0, Shape::Linear, Some(resume));
    }

    fn done(&mut self) {
        *self.done = true;
    }
}

impl OutputChannel {
    pub fn new(channel: u8, config: EngineConfig) -> Self {
        Self {
            config,
            slope: Slope::new(),
            asl: Asl::new(channel, config),
            quantizer: Quantizer::new(),
            done: false,
        }
    }

    /// Compile a new program. It stays idle until `action(Restart)`.
    pub fn describe(&mut self, stages: &[Stage]) -> CompileReport {
        self.asl.compile(stages)
    }

    pub fn action(&mut self, action: Action) {
        let Self { slope, asl, done, .. } = self;
        asl.action(action, &mut Drive { slope, done });
    }

    /// Slew directly, outside any program. A running program loses its
    /// pending breakpoint and stops.
    pub fn toward(&mut self, volts: f32, seconds: f32, shape: Shape) {
        let samples = self.config.seconds_to_samples(Q16::from_f32(seconds));
        self.slope.toward(Q16::from_f32(volts), samples, shape, None);
    }

    pub fn set_scale(&mut self, divlist: &[f32], modulo: f32, scaling: f32) {
        self.quantizer.set_scale(divlist, modulo, scaling);
    }

    pub fn unset_scale(&mut self) {
        self.quantizer.unset();
    }

    pub fn asl(&self) -> &Asl {
        &self.asl
    }

    /// Dynamic slot access goes through here.
    pub fn asl_mut(&mut self) -> &mut Asl {
        &mut self.asl
    }

    /// Unquantized slope output.
    pub fn state(&self) -> Q16 {
        self.slope.state()
    }

    pub fn is_active(&self) -> bool {
        self.slope.is_active()
    }

    /// Back to 0 V with no callback pending. The program is kept.
    pub fn reset(&mut self) {
        self.slope.reset();
        self.done = false;
    }

    /// Real-time: render a block of quantized volts, resuming the program
    /// at every breakpoint.
    pub fn render(&mut self, lut: &ShapeLut, out: &mut [Q16]) {
        let Self { slope, asl, quantizer, done, .. } = self;
        slope.process(lut, out, |slope, token| asl.resume(token, &mut Drive { slope, done }));
        quantizer.quantize_block(out);
    }

    /// Clear and return the pending completion.
    pub fn take_done(&mut self) -> bool {
        core::mem::take(&mut self.done)
    }
}
