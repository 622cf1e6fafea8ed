//! ASL description tree.
//!
//! This is the only input format the ASL compiler understands: a list of
//! stages, each a one-character kind tag with operands, or a nested list that
//! becomes a sub-sequence. Operands are numbers, booleans, shape names or
//! tagged expressions. Builders mirror the scripting-side helpers
//! (`to`, `loop_`, `held`, `lock`, `times`, `dyn_ref`, ...).

use alloc::string::String;
use alloc::vec;
use alloc::vec::Vec;

/// One operand of a stage or expression.
#[derive(Clone, Debug, PartialEq)]
pub enum Operand {
    Num(f32),
    Bool(bool),
    /// Shape name, parsed by first letter.
    Name(String),
    /// Tagged expression: `D` dynamic, `M` mutable, `N` named mutable,
    /// `~ + - * / %` arithmetic, `#` mutate.
    Expr { tag: char, args: Vec<Operand> },
}

impl From<f32> for Operand {
    fn from(v: f32) -> Self {
        Operand::Num(v)
    }
}

impl From<i32> for Operand {
    fn from(v: i32) -> Self {
        Operand::Num(v as f32)
    }
}

impl From<bool> for Operand {
    fn from(v: bool) -> Self {
        Operand::Bool(v)
    }
}

impl From<&str> for Operand {
    fn from(v: &str) -> Self {
        Operand::Name(String::from(v))
    }
}

/// One entry of a stage list.
#[derive(Clone, Debug, PartialEq)]
pub enum Stage {
    /// `T` to, `R` recur, `I` if, `H` held, `W` wait, `U` unheld,
    /// `L` lock, `O` open.
    Step { tag: char, operands: Vec<Operand> },
    /// Sub-sequence.
    Nest(Vec<Stage>),
}

impl Stage {
    fn marker(tag: char) -> Stage {
        Stage::Step { tag, operands: Vec::new() }
    }
}

fn expr(tag: char, args: Vec<Operand>) -> Operand {
    Operand::Expr { tag, args }
}

/// Slew toward `volts` over `seconds` with `shape`.
pub fn to(volts: impl Into<Operand>, seconds: impl Into<Operand>, shape: impl Into<Operand>) -> Stage {
    Stage::Step { tag: 'T', operands: vec![volts.into(), seconds.into(), shape.into()] }
}

/// Restart the enclosing sequence.
pub fn recur() -> Stage {
    Stage::marker('R')
}

/// Leave the enclosing sequence when `predicate <= 0`.
pub fn if_(predicate: impl Into<Operand>) -> Stage {
    Stage::Step { tag: 'I', operands: vec![predicate.into()] }
}

/// Halt until released.
pub fn wait() -> Stage {
    Stage::marker('W')
}

/// Repeat `stages` forever.
pub fn loop_(mut stages: Vec<Stage>) -> Stage {
    stages.push(recur());
    Stage::Nest(stages)
}

/// Run `stages`, then sustain until released.
pub fn held(mut stages: Vec<Stage>) -> Stage {
    stages.insert(0, Stage::marker('H'));
    stages.push(wait());
    stages.push(Stage::marker('U'));
    Stage::Nest(stages)
}

/// Ignore external actions while `stages` run.
pub fn lock(mut stages: Vec<Stage>) -> Stage {
    stages.insert(0, Stage::marker('L'));
    stages.push(Stage::marker('O'));
    Stage::Nest(stages)
}

/// Run `stages` `count` times.
pub fn times(count: u32, mut stages: Vec<Stage>) -> Stage {
    let counter = mutable(count as f32 + 1.0);
    stages.insert(0, if_(mutate(sub(counter, 1.0))));
    stages.push(recur());
    Stage::Nest(stages)
}

/// Reference to dynamic slot `slot`.
pub fn dyn_ref(slot: u8) -> Operand {
    expr('D', vec![Operand::Num(slot as f32)])
}

/// Fresh mutable slot initialised with `init`.
pub fn mutable(init: impl Into<Operand>) -> Operand {
    expr('M', vec![init.into()])
}

/// Mutable view of an existing dynamic slot.
pub fn named(slot: u8) -> Operand {
    expr('N', vec![Operand::Num(slot as f32)])
}

pub fn neg(a: impl Into<Operand>) -> Operand {
    expr('~', vec![a.into()])
}

pub fn add(a: impl Into<Operand>, b: impl Into<Operand>) -> Operand {
    expr('+', vec![a.into(), b.into()])
}

pub fn sub(a: impl Into<Operand>, b: impl Into<Operand>) -> Operand {
    expr('-', vec![a.into(), b.into()])
}

pub fn mul(a: impl Into<Operand>, b: impl Into<Operand>) -> Operand {
    expr('*', vec![a.into(), b.into()])
}

pub fn div(a: impl Into<Operand>, b: impl Into<Operand>) -> Operand {
    expr('/', vec![a.into(), b.into()])
}

pub fn rem(a: impl Into<Operand>, b: impl Into<Operand>) -> Operand {
    expr('%', vec![a.into(), b.into()])
}

/// Write the result of `a` back into the mutable it reads.
pub fn mutate(a: impl Into<Operand>) -> Operand {
    expr('#', vec![a.into()])
}

/// Library gestures.
pub mod presets {
    use super::*;

    /// Triangle-ish oscillation between `-level` and `level`.
    pub fn lfo(time: f32, level: f32, shape: &str) -> Vec<Stage> {
        vec![loop_(vec![
            to(level, time / 2.0, shape),
            to(-level, time / 2.0, shape),
        ])]
    }

    /// Square pulse of `time` seconds. Polarity 0 inverts.
    pub fn pulse(time: f32, level: f32, polarity: i32) -> Vec<Stage> {
        let (on, rest) = match polarity {
            0 => (0.0, level),
            p if p < 0 => (-level, 0.0),
            _ => (level, 0.0),
        };
        vec![to(on, 0.0, "now"), to(on, time, "now"), to(rest, 0.0, "now")]
    }

    /// Attack then release.
    pub fn ar(attack: f32, release: f32, level: f32, shape: &str) -> Vec<Stage> {
        vec![to(level, attack, shape), to(0.0, release, shape)]
    }

    /// Gated envelope: attack and decay while held, release on action.
    pub fn adsr(attack: f32, decay: f32, sustain: f32, release: f32, shape: &str) -> Vec<Stage> {
        vec![
            held(vec![to(5.0, attack, shape), to(sustain, decay, shape)]),
            to(0.0, release, shape),
        ]
    }

    /// Saw to triangle to ramp. `skew` 0..1 moves the peak.
    pub fn ramp(time: f32, skew: f32, level: f32) -> Vec<Stage> {
        let skew = skew.clamp(0.0, 1.0);
        let rise = time * skew;
        let fall = time - rise;
        vec![loop_(vec![to(level, rise, "linear"), to(-level, fall, "linear")])]
    }
}
