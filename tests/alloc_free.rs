//! Allocation-free real-time block tests.
//!
//! These tests verify that `RtEngine::process_block()` does not allocate.
//! They run every detection mode, looping and gated ASL programs, output
//! quantizers, metros and clocks for several seconds of blocks.
//!
//! Just run `cargo test`, no feature flags needed.

use assert_no_alloc::{assert_no_alloc, AllocDisabler};

#[cfg(debug_assertions)]
#[global_allocator]
static A: AllocDisabler = AllocDisabler;

use bb_engine::asl::Action;
use bb_engine::RtEngine;
use bb_ir::asl::{add, dyn_ref, mutable, presets, times, to};
use bb_ir::{volts_to_adc, DetectMode, Direction, EngineConfig, BLOCK_SIZE, INPUT_CHANNELS, SAMPLE_RATE};

/// A slow triangle on input 0 and a square on input 1, in ADC counts.
fn input_block(start: usize) -> [[i16; INPUT_CHANNELS]; BLOCK_SIZE] {
    let mut block = [[0i16; INPUT_CHANNELS]; BLOCK_SIZE];
    let peak = volts_to_adc(5.0);
    for (i, frame) in block.iter_mut().enumerate() {
        let t = (start + i) as i32;
        let phase = t % 9600;
        let tri = if phase < 4800 { phase } else { 9600 - phase };
        frame[0] = (tri * 2 * peak / 4800 - peak) as i16;
        frame[1] = if (t / 2400) % 2 == 0 { peak as i16 } else { -peak as i16 };
    }
    block
}

/// Run `blocks` real-time blocks, draining every queue, aborting on any
/// heap allocation.
fn assert_blocks_alloc_free(rt: &mut RtEngine, blocks: usize, mut between: impl FnMut(usize, &RtEngine)) {
    let shared = rt.shared().clone();
    assert_no_alloc(|| {
        let mut sum = 0i64;
        for b in 0..blocks {
            let inputs = input_block(b * BLOCK_SIZE);
            rt.process_block(&inputs, &mut |_: usize, code: i16| sum += code as i64);
            while shared.bridge.input.get().is_some() {}
            while shared.bridge.metro.get().is_some() {}
            while shared.bridge.clock.get().is_some() {}
            while shared.bridge.asl_done.get().is_some() {}
            between(b, rt);
        }
        std::hint::black_box(sum);
    });
}

fn seconds_of_blocks(seconds: usize) -> usize {
    seconds * SAMPLE_RATE as usize / BLOCK_SIZE
}

#[test]
fn every_detection_mode_alloc_free() {
    let modes = [
        DetectMode::change(1.0, 0.1, Direction::Both),
        DetectMode::stream(0.01),
        DetectMode::window(&[-3.0, -1.0, 1.0, 3.0], 0.1),
        DetectMode::scale(&[0.0, 2.0, 4.0, 5.0, 7.0, 9.0, 11.0], 12.0, 1.0),
        DetectMode::scale(&[], 12.0, 1.0),
        DetectMode::volume(0.005),
        DetectMode::peak(1.0, 0.1),
    ];
    for mode in modes {
        let mut rt = RtEngine::new(EngineConfig::default());
        let shared = rt.shared().clone();
        let config = *shared.config();
        for input in shared.inputs.iter() {
            input.configure(|d| d.configure(&mode, &config));
        }
        assert_blocks_alloc_free(&mut rt, seconds_of_blocks(2), |_, _| {});
    }
}

#[test]
fn looping_outputs_alloc_free() {
    let mut rt = RtEngine::new(EngineConfig::default());
    let shared = rt.shared().clone();
    let programs = [
        presets::lfo(0.01, 5.0, "sine"),
        presets::ramp(0.05, 0.3, 4.0),
        vec![bb_ir::asl::loop_(vec![
            to(add(mutable(0.0), 0.5), 0.002, "expo"),
            to(dyn_ref(0), 0.0, "now"),
        ])],
        vec![times(4, vec![to(3.0, 0.001, "linear"), to(-3.0, 0.001, "log")])],
    ];
    for (output, program) in shared.outputs.iter().zip(programs.iter()) {
        output.configure(|out| {
            out.asl_mut().def_dynamic(-1.0).unwrap();
            out.describe(program);
            out.action(Action::Restart);
        });
    }
    shared.outputs[0].configure(|out| out.set_scale(&[0.0, 3.0, 7.0], 12.0, 1.0));
    assert_blocks_alloc_free(&mut rt, seconds_of_blocks(5), |_, _| {});
}

#[test]
fn control_actions_alloc_free() {
    let mut rt = RtEngine::new(EngineConfig::default());
    let shared = rt.shared().clone();
    shared.outputs[1].configure(|out| {
        out.describe(&presets::adsr(0.005, 0.01, 2.0, 0.02, "linear"));
    });
    shared.metros.configure(|m| {
        m.set_time(2, 0.003).unwrap();
        m.start(2).unwrap();
    });
    shared.clocks.configure(|c| c.set_tempo(240.0));

    assert_blocks_alloc_free(&mut rt, seconds_of_blocks(3), |b, rt| {
        let shared = rt.shared();
        match b % 100 {
            0 => shared.outputs[1].configure(|out| out.action(Action::Restart)),
            40 => shared.outputs[1].configure(|out| out.action(Action::Release)),
            60 => shared.outputs[2].configure(|out| out.toward(1.5, 0.01, bb_ir::Shape::Sine)),
            _ => {}
        }
        if b % 50 == 0 {
            shared.clocks.configure(|c| {
                c.schedule_sync(0, 1.0).unwrap();
                c.schedule_sleep(1, 0.01).unwrap();
            });
        }
    });
}
