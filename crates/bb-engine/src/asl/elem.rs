//! Compiled ASL expressions and their evaluator.
//!
//! Operator operands live in the dynamic slot array, so an `Elem` is always
//! `Copy` and fixed-size. Slots are shared with the control context without
//! synchronisation beyond the channel guard; a value written by one side is
//! seen by the other at the next guarded access.

use bb_ir::{Shape, Q16};

use super::DYN_COUNT;

/// Deepest operator nesting the evaluator follows. Deeper (or cyclic)
/// references resolve to zero.
const MAX_DEPTH: u8 = 16;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Elem {
    Fixed(Q16),
    Shape(Shape),
    Dynamic(u8),
    Mutable(u8),
    Negate(u8),
    Add(u8, u8),
    Sub(u8, u8),
    Mul(u8, u8),
    Div(u8, u8),
    Mod(u8, u8),
    Mutate(u8),
}

impl Default for Elem {
    fn default() -> Self {
        Elem::Fixed(Q16::ZERO)
    }
}

impl Elem {
    /// Numeric value of a resolved elem. Shapes read as zero.
    pub fn value(self) -> Q16 {
        match self {
            Elem::Fixed(q) => q,
            _ => Q16::ZERO,
        }
    }

    /// Shape of a resolved elem. Numbers read as linear.
    pub fn shape(self) -> Shape {
        match self {
            Elem::Shape(s) => s,
            _ => Shape::Linear,
        }
    }
}

struct Resolver<'a> {
    dynamics: &'a mut [Elem; DYN_COUNT],
    /// Mutable slot whose value is being read, awaiting write-back.
    resolving: Option<u8>,
}

impl Resolver<'_> {
    fn slot(&mut self, ix: u8, depth: u8) -> Q16 {
        let e = self.dynamics.get(ix as usize).copied().unwrap_or_default();
        self.eval(e, depth + 1).value()
    }

    fn eval(&mut self, e: Elem, depth: u8) -> Elem {
        if depth > MAX_DEPTH {
            return Elem::default();
        }
        let q = |v: Q16| Elem::Fixed(v);
        match e {
            Elem::Fixed(_) | Elem::Shape(_) => e,
            Elem::Dynamic(ix) => {
                let inner = self.dynamics.get(ix as usize).copied().unwrap_or_default();
                self.eval(inner, depth + 1)
            }
            Elem::Mutable(ix) => {
                self.resolving = Some(ix);
                let inner = self.dynamics.get(ix as usize).copied().unwrap_or_default();
                self.eval(inner, depth + 1)
            }
            Elem::Negate(a) => q(-self.slot(a, depth)),
            Elem::Add(a, b) => q(self.slot(a, depth) + self.slot(b, depth)),
            Elem::Sub(a, b) => q(self.slot(a, depth) - self.slot(b, depth)),
            Elem::Mul(a, b) => q(self.slot(a, depth).mul(self.slot(b, depth))),
            Elem::Div(a, b) => q(self.slot(a, depth).div(self.slot(b, depth))),
            Elem::Mod(a, b) => {
                let val = self.slot(a, depth);
                q(val.rem_floor(self.slot(b, depth)))
            }
            Elem::Mutate(a) => {
                let v = self.slot(a, depth);
                if let Some(ix) = self.resolving.take() {
                    self.write(ix, v);
                }
                q(v)
            }
        }
    }

    fn write(&mut self, ix: u8, v: Q16) {
        if let Some(slot) = self.dynamics.get_mut(ix as usize) {
            *slot = Elem::Fixed(v);
        }
    }
}

/// Evaluate `e` to a `Fixed` or `Shape`. A mutable read anywhere in the
/// tree that no `Mutate` consumed receives the final result.
pub fn resolve(dynamics: &mut [Elem; DYN_COUNT], e: Elem) -> Elem {
    let mut r = Resolver { dynamics, resolving: None };
    let out = r.eval(e, 0);
    if let (Some(ix), Elem::Fixed(v)) = (r.resolving, out) {
        r.write(ix, v);
    }
    out
}
