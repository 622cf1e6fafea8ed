//! blackbird CLI: run an ASL preset through the engine.
//!
//! Usage:
//!   cargo run --bin bb-cli -- lfo
//!   cargo run --bin bb-cli -- ar --wav output.wav --seconds 4
//!   cargo run --bin bb-cli -- adsr --rate 0.25 --output 2 -v
//!
//! Envelope presets are retriggered by metro 0 every `--rate` seconds.
//! Without `--wav` the engine runs live on the host thread and the output
//! level is printed as it plays.

use bb_control::{presets, Action, CompileReport, ControlError, Controller, Handlers, Silence, Stage};
use log::{LevelFilter, Log, Metadata, Record};
use std::io::Write;
use std::time::{Duration, Instant};
use std::{env, fs};

struct StderrLogger;

impl Log for StderrLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            eprintln!("[{}] {}: {}", record.level(), record.target(), record.args());
        }
    }

    fn flush(&self) {}
}

static LOGGER: StderrLogger = StderrLogger;

/// Retriggers one output on every metro tick. Gated presets open on even
/// stages and release on odd ones.
struct Retrigger {
    output: usize,
    gated: bool,
}

impl Handlers for Retrigger {
    fn metro(&mut self, ctl: &mut Controller, _id: u8, stage: u32) {
        let action = if self.gated && stage % 2 == 1 { Action::Release } else { Action::Restart };
        if let Err(e) = ctl.asl_action(self.output, action) {
            log::warn!("retrigger failed: {}", e);
        }
    }

    fn asl_done(&mut self, _ctl: &mut Controller, channel: usize) {
        log::debug!("output {} done", channel);
    }
}

struct Options {
    preset: String,
    wav: Option<String>,
    seconds: f32,
    rate: f32,
    output: usize,
    verbose: bool,
}

fn parse_args() -> Options {
    let args: Vec<String> = env::args().collect();
    let value = |flag: &str| args.iter().position(|a| a == flag).and_then(|i| args.get(i + 1)).cloned();
    let number = |flag: &str, default: f32| {
        value(flag).map_or(default, |v| {
            v.parse().unwrap_or_else(|_| {
                eprintln!("{} expects a number, got {}", flag, v);
                std::process::exit(1);
            })
        })
    };

    let preset = args.get(1).filter(|a| !a.starts_with('-')).cloned().unwrap_or_else(|| {
        eprintln!("Usage: bb-cli <lfo|ar|pulse|adsr|ramp> [--wav out.wav] [--seconds N] [--rate S] [--output N] [-v]");
        std::process::exit(1);
    });

    Options {
        preset,
        wav: value("--wav"),
        seconds: number("--seconds", 2.0),
        rate: number("--rate", 0.5),
        output: number("--output", 0.0) as usize,
        verbose: args.iter().any(|a| a == "-v"),
    }
}

/// Stages for a preset name, and whether it needs retriggering.
fn preset(name: &str) -> Option<(Vec<Stage>, bool)> {
    Some(match name {
        "lfo" => (presets::lfo(0.5, 5.0, "sine"), false),
        "ramp" => (presets::ramp(0.25, 0.8, 5.0), false),
        "ar" => (presets::ar(0.01, 0.3, 8.0, "log"), true),
        "pulse" => (presets::pulse(0.05, 5.0, 1), true),
        "adsr" => (presets::adsr(0.02, 0.1, 2.0, 0.4, "linear"), true),
        _ => return None,
    })
}

fn main() {
    let opts = parse_args();
    let _ = log::set_logger(&LOGGER);
    log::set_max_level(if opts.verbose { LevelFilter::Debug } else { LevelFilter::Info });

    let Some((stages, retriggered)) = preset(&opts.preset) else {
        eprintln!("Unknown preset: {}", opts.preset);
        std::process::exit(1);
    };

    let mut ctrl = Controller::default();
    let report = prepare(&mut ctrl, &stages, retriggered, &opts).unwrap_or_else(|e| {
        eprintln!("Failed to start {} on output {}: {}", opts.preset, opts.output, e);
        std::process::exit(1);
    });
    println!(
        "Preset:   {} on output {} ({} nodes, {} sequences, {} dynamics)",
        opts.preset, opts.output, report.nodes, report.sequences, report.dynamics
    );
    if !report.is_clean() {
        log::warn!("{} stages skipped", report.skipped);
    }

    let mut handlers = Retrigger { output: opts.output, gated: opts.preset == "adsr" };
    match opts.wav {
        Some(path) => render_to_wav(&mut ctrl, &mut handlers, &path, opts.seconds),
        None => run_live(&mut ctrl, &mut handlers, opts.seconds, opts.output),
    }
}

/// Compile the preset, start the retrigger metro if needed and fire the
/// first run of the program.
fn prepare(ctrl: &mut Controller, stages: &[Stage], retriggered: bool, opts: &Options) -> Result<CompileReport, ControlError> {
    let report = ctrl.asl_describe(opts.output, stages)?;
    if retriggered {
        ctrl.metro_set_time(0, opts.rate)?;
        ctrl.metro_start(0)?;
    }
    ctrl.asl_action(opts.output, Action::Restart)?;
    Ok(report)
}

fn run_live(ctrl: &mut Controller, handlers: &mut Retrigger, seconds: f32, output: usize) {
    if let Err(e) = ctrl.start(Silence) {
        eprintln!("Failed to start host thread: {}", e);
        std::process::exit(1);
    }
    println!("Running for {} s...", seconds);

    let mut dispatcher = bb_control::EventDispatcher::new();
    let mut frames = Vec::new();
    let deadline = Instant::now() + Duration::from_secs_f32(seconds.max(0.0));
    while Instant::now() < deadline {
        dispatcher.drain(ctrl, handlers);
        frames.clear();
        ctrl.monitor_frames(&mut frames);
        if let Ok(volts) = ctrl.output_state(output) {
            print!("\rout {}: {:+6.3} V", output, volts);
            let _ = std::io::stdout().flush();
        }
        std::thread::sleep(Duration::from_millis(10));
    }

    let _ = ctrl.stop();
    let stats = ctrl.bridge_stats();
    println!("\rDone. {} events handled, {} dropped.", dispatcher.stats().handled(), stats.total_dropped());
}

fn render_to_wav(ctrl: &mut Controller, handlers: &mut Retrigger, path: &str, seconds: f32) {
    let sample_rate = ctrl.config().sample_rate;
    println!("Rendering {} s to {} at {} Hz...", seconds, path, sample_rate);

    let frames = (seconds.max(0.0) * sample_rate as f32) as usize;
    let wav = ctrl
        .run_offline(frames, &mut Silence, handlers)
        .and_then(|rendered| Ok(bb_control::frames_to_wav(&rendered, sample_rate)?))
        .unwrap_or_else(|e| {
            eprintln!("Render failed: {}", e);
            std::process::exit(1);
        });
    println!("Rendered {} bytes", wav.len());

    fs::write(path, &wav).unwrap_or_else(|e| {
        eprintln!("Failed to write {}: {}", path, e);
        std::process::exit(1);
    });

    println!("Done.");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options(preset: &str, output: usize) -> Options {
        Options { preset: preset.into(), wav: None, seconds: 0.1, rate: 0.05, output, verbose: false }
    }

    #[test]
    fn prepare_rejects_missing_output() {
        let (stages, retriggered) = preset("ar").unwrap();
        let mut ctrl = Controller::default();
        let result = prepare(&mut ctrl, &stages, retriggered, &options("ar", 7));
        assert!(matches!(result, Err(ControlError::InvalidChannel(7))));
        assert!(!ctrl.metro_is_running(0));
    }

    #[test]
    fn prepare_starts_program_and_metro() {
        let (stages, retriggered) = preset("pulse").unwrap();
        let mut ctrl = Controller::default();
        let report = prepare(&mut ctrl, &stages, retriggered, &options("pulse", 2)).unwrap();
        assert!(report.is_clean());
        assert!(ctrl.metro_is_running(0));
        let frames = ctrl.render_frames(64, &mut Silence).unwrap();
        assert!(frames.iter().any(|f| f[2] != 0));
    }

    #[test]
    fn unknown_preset_is_none() {
        assert!(preset("square").is_none());
    }
}
