//! Integration test: configure through the controller → run blocks offline
//! → dispatch events to handlers → verify handler calls and DAC output.

use bb_control::{presets, Action, Controller, DacFrame, DetectEvent, DetectMode, Direction, Handlers, Shape, Silence};
use bb_ir::{volts_to_adc, volts_to_dac, Q16};

#[derive(Default)]
struct Recorder {
    metros: Vec<(u8, u32)>,
    done: Vec<usize>,
}

impl Handlers for Recorder {
    fn metro(&mut self, _ctl: &mut Controller, id: u8, stage: u32) {
        self.metros.push((id, stage));
    }

    fn asl_done(&mut self, _ctl: &mut Controller, channel: usize) {
        self.done.push(channel);
    }
}

fn peak(frames: &[DacFrame], output: usize) -> i16 {
    frames.iter().map(|f| f[output]).max().unwrap_or(0)
}

#[test]
fn metro_stages_reach_handler_in_order() {
    let mut ctl = Controller::default();
    ctl.metro_set_time(3, 0.01).unwrap();
    ctl.metro_start(3).unwrap();

    let mut rec = Recorder::default();
    // 0.01 s = 480 samples: two expiries in 1000 samples.
    ctl.run_offline(1000, &mut Silence, &mut rec).unwrap();
    assert_eq!(rec.metros, [(3, 0), (3, 1)]);
    assert_eq!(ctl.bridge_stats().total_dropped(), 0);
}

#[test]
fn looping_program_never_completes() {
    let mut ctl = Controller::default();
    ctl.asl_describe(0, &presets::lfo(0.01, 5.0, "linear")).unwrap();
    ctl.asl_action(0, Action::Restart).unwrap();

    let mut rec = Recorder::default();
    let frames = ctl.run_offline(48_000, &mut Silence, &mut rec).unwrap();
    assert!(rec.done.is_empty());
    assert_eq!(peak(&frames, 0), volts_to_dac(Q16::from_int(5)));
    assert_eq!(frames.iter().map(|f| f[0]).min(), Some(volts_to_dac(Q16::from_int(-5))));
}

/// Fires an envelope on output 0 for every rising edge on input 0.
struct EdgeTrigger {
    edges: usize,
}

impl Handlers for EdgeTrigger {
    fn input(&mut self, ctl: &mut Controller, channel: usize, event: DetectEvent) {
        if let DetectEvent::Change { state: true } = event {
            self.edges += 1;
            ctl.asl_action(channel, Action::Restart).unwrap();
        }
    }
}

#[test]
fn input_edge_triggers_envelope() {
    let mut ctl = Controller::default();
    ctl.set_input_mode(0, DetectMode::change(1.0, 0.1, Direction::Rising)).unwrap();
    ctl.asl_describe(0, &presets::ar(0.001, 0.004, 5.0, "linear")).unwrap();

    let high = volts_to_adc(5.0) as i16;
    let mut gate = |sample: u64| if (1000..1100).contains(&sample) { [high, 0] } else { [0, 0] };
    let mut trigger = EdgeTrigger { edges: 0 };
    let frames = ctl.run_offline(4800, &mut gate, &mut trigger).unwrap();

    assert_eq!(trigger.edges, 1);
    // Nothing moves before the edge is dispatched.
    assert!(frames[..1000].iter().all(|f| f[0] == 0));
    assert_eq!(peak(&frames, 0), volts_to_dac(Q16::from_int(5)));
    assert_eq!(frames[4799][0], 0);
}

/// Gated envelope held while input 1 is high.
struct Gate;

impl Handlers for Gate {
    fn input(&mut self, ctl: &mut Controller, _channel: usize, event: DetectEvent) {
        if let DetectEvent::Change { state } = event {
            let action = if state { Action::Restart } else { Action::Release };
            ctl.asl_action(2, action).unwrap();
        }
    }
}

#[test]
fn held_envelope_sustains_until_gate_falls() {
    let mut ctl = Controller::default();
    ctl.set_input_mode(1, DetectMode::change(1.0, 0.1, Direction::Both)).unwrap();
    ctl.asl_describe(2, &presets::adsr(0.001, 0.002, 2.0, 0.005, "linear")).unwrap();

    let high = volts_to_adc(5.0) as i16;
    let mut gate = |sample: u64| if (100..2100).contains(&sample) { [0, high] } else { [0, 0] };
    let frames = ctl.run_offline(4800, &mut gate, &mut Gate).unwrap();

    let sustain = volts_to_dac(Q16::from_int(2));
    assert_eq!(peak(&frames, 2), volts_to_dac(Q16::from_int(5)));
    // Sustaining well after attack and decay, before release.
    assert!(frames[1500..2000].iter().all(|f| f[2] == sustain));
    assert_eq!(frames[4799][2], 0);
}

/// Follows the nearest note on input 0 with output 1.
struct Follow(Option<f32>);

impl Handlers for Follow {
    fn input(&mut self, ctl: &mut Controller, _channel: usize, event: DetectEvent) {
        if let DetectEvent::Scale(note) = event {
            self.0 = Some(note.volts);
            ctl.output_toward(1, note.volts, 0.0, Shape::Linear).unwrap();
        }
    }
}

#[test]
fn scale_input_drives_output() {
    let mut ctl = Controller::default();
    ctl.set_input_mode(0, DetectMode::scale(&[], 12.0, 1.0)).unwrap();

    let level = volts_to_adc(7.0 / 12.0) as i16;
    let mut adc = |_: u64| [level, 0];
    let mut follow = Follow(None);
    ctl.run_offline(256, &mut adc, &mut follow).unwrap();

    let volts = follow.0.unwrap();
    assert!((volts - 7.0 / 12.0).abs() < 1e-5);
    assert!((ctl.output_state(1).unwrap() - 7.0 / 12.0).abs() < 1e-3);
}

#[test]
fn wav_export_of_running_program() {
    let mut ctl = Controller::default();
    ctl.asl_describe(3, &presets::lfo(0.1, 4.0, "sine")).unwrap();
    ctl.asl_action(3, Action::Restart).unwrap();
    let wav = ctl.render_to_wav(0.5, &mut Silence).unwrap();
    assert_eq!(&wav[0..4], b"RIFF");
    assert_eq!(wav.len(), 44 + 24_000 * 4 * 2);
    let any_nonzero = wav[44..].chunks(8).any(|frame| frame[6] != 0 || frame[7] != 0);
    assert!(any_nonzero);
}
