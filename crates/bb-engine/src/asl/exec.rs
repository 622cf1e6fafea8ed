//! Program execution: stepping, resumption and external actions.

use bb_ir::{Shape, Q16};

use super::elem::resolve;
use super::{Asl, Node};

/// What the interpreter asks of its output.
pub trait AslDriver {
    /// Ramp to `dest` over `samples`. With `resume` set, hand the token back
    /// through [`Asl::resume`] at the breakpoint.
    fn toward(&mut self, dest: Q16, samples: i32, shape: Shape, resume: Option<Resume>);

    /// Hold the current output and hand `resume` back on the next sample.
    fn yield_tick(&mut self, resume: Resume);

    /// The program ran off the end of its root sequence.
    fn done(&mut self);
}

/// Continuation handed to the driver when the program suspends.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Resume {
    generation: u32,
}

/// External requests, numbered as the scripting layer sends them.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Action {
    /// Jump to the release point of a held section.
    Release = 0,
    /// Start from the top.
    Restart = 1,
    /// Lift a lock.
    Unlock = 2,
}

impl Action {
    pub fn from_i32(action: i32) -> Option<Action> {
        match action {
            0 => Some(Action::Release),
            1 => Some(Action::Restart),
            2 => Some(Action::Unlock),
            _ => None,
        }
    }
}

impl Asl {
    /// Apply an external action. While locked, everything except `Unlock`
    /// is ignored; `Release` outside a held section does nothing.
    pub fn action(&mut self, action: Action, driver: &mut impl AslDriver) {
        if self.locked {
            if action == Action::Unlock {
                self.locked = false;
            }
            return;
        }
        match action {
            Action::Restart => self.rewind(),
            Action::Release if self.holding => {
                if self.find_control(false) {
                    self.holding = false;
                } else {
                    self.rewind();
                }
            }
            Action::Release | Action::Unlock => return,
        }
        self.generation = self.generation.wrapping_add(1);
        self.next_action(driver);
    }

    /// Continue after a breakpoint. Tokens from before the latest compile or
    /// action are ignored.
    pub fn resume(&mut self, token: Resume, driver: &mut impl AslDriver) {
        if token.generation != self.generation {
            return;
        }
        self.next_action(driver);
    }

    fn token(&self) -> Resume {
        Resume { generation: self.generation }
    }

    /// Run until the program suspends, waits or finishes.
    fn next_action(&mut self, driver: &mut impl AslDriver) {
        loop {
            let exhausted = match self.advance() {
                None => true,
                Some(Node::Literal { volts, time, shape }) => {
                    let dest = resolve(&mut self.dynamics, volts).value();
                    let seconds = resolve(&mut self.dynamics, time).value();
                    let shape = resolve(&mut self.dynamics, shape).shape();
                    let samples = self.config.seconds_to_samples(seconds);
                    if samples > 0 {
                        self.moved = u8::MAX;
                        driver.toward(dest, samples, shape, Some(self.token()));
                        return;
                    }
                    driver.toward(dest, 0, shape, None);
                    false
                }
                Some(Node::If(predicate)) => resolve(&mut self.dynamics, predicate).value() <= Q16::ZERO,
                Some(Node::Recur) => {
                    let seq = self.current;
                    self.seqs[seq as usize].pc = 0;
                    let bit = 1u8 << seq;
                    if self.moved & bit == 0 {
                        // Nothing moved since the last pass: give up the tick.
                        driver.yield_tick(self.token());
                        return;
                    }
                    self.moved &= !bit;
                    false
                }
                Some(Node::Enter(child)) => {
                    self.current = child;
                    false
                }
                Some(Node::Held) => {
                    self.holding = true;
                    false
                }
                Some(Node::Wait) => return,
                Some(Node::Unheld) => {
                    self.holding = false;
                    false
                }
                Some(Node::Lock) => {
                    self.locked = true;
                    false
                }
                Some(Node::Open) => {
                    self.locked = false;
                    false
                }
            };
            if exhausted && !self.step_up() {
                driver.done();
                return;
            }
        }
    }

    fn advance(&mut self) -> Option<Node> {
        let seq = &mut self.seqs[self.current as usize];
        let ix = *seq.stages.get(seq.pc as usize)?;
        seq.pc += 1;
        debug_assert!((ix as usize) < self.node_count, "stale node {} in generation {}", ix, self.generation);
        self.nodes.get(ix as usize).copied()
    }

    /// Leave the current sequence, rewinding it. False at the root.
    fn step_up(&mut self) -> bool {
        let seq = &mut self.seqs[self.current as usize];
        match seq.parent {
            Some(parent) => {
                seq.pc = 0;
                debug_assert!((parent as usize) < self.seq_count);
                self.current = parent;
                true
            }
            None => false,
        }
    }

    /// Move forward to just past the next `Unheld` or `Wait` marker.
    /// Unless `full_search`, nested sequences are not entered and an `If`
    /// skips the rest of its sequence.
    fn find_control(&mut self, full_search: bool) -> bool {
        loop {
            match self.advance() {
                Some(Node::Unheld | Node::Wait) => return true,
                Some(Node::Enter(child)) if full_search => self.current = child,
                Some(Node::If(_)) if !full_search => {
                    self.step_up();
                }
                Some(_) => {}
                None => {
                    if !self.step_up() {
                        return false;
                    }
                }
            }
        }
    }
}
