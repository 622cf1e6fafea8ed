//! ASL compiler and interpreter.
//!
//! A description tree (`bb_ir::asl::Stage`) is compiled into fixed pools of
//! sequences, nodes and dynamic slots owned by one output channel. Execution
//! walks the pools through parent links, so a suspended program is fully
//! described by the current sequence and every sequence's program counter.
//!
//! The interpreter never touches the ramp itself. It drives an [`AslDriver`],
//! which the real-time engine implements on top of its slope, and resumes
//! when the slope hands back the [`Resume`] token at the breakpoint.

mod compile;
mod elem;
mod exec;

use bb_ir::{EngineConfig, Q16};
use heapless::Vec as HVec;

pub use compile::{AslError, CompileReport};
pub use elem::Elem;
pub use exec::{Action, AslDriver, Resume};

/// Sequences per program, including the root.
pub const SEQ_COUNT: usize = 8;
/// Nodes per program.
pub const NODE_COUNT: usize = 32;
/// Dynamic slots per program, named and auto-allocated.
pub const DYN_COUNT: usize = 16;
/// Stages per sequence.
pub const SEQ_LENGTH: usize = 8;

// `moved` keeps one bit per sequence.
const _: () = assert!(SEQ_COUNT <= u8::BITS as usize);

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
enum Node {
    Literal { volts: Elem, time: Elem, shape: Elem },
    If(Elem),
    Recur,
    Enter(u8),
    Held,
    #[default]
    Wait,
    Unheld,
    Lock,
    Open,
}

#[derive(Clone, Debug, Default)]
struct Sequence {
    stages: HVec<u8, SEQ_LENGTH>,
    pc: u8,
    parent: Option<u8>,
}

/// One output's ASL program and its execution state.
#[derive(Clone, Debug)]
pub struct Asl {
    channel: u8,
    config: EngineConfig,
    seqs: [Sequence; SEQ_COUNT],
    seq_count: usize,
    nodes: [Node; NODE_COUNT],
    node_count: usize,
    dynamics: [Elem; DYN_COUNT],
    dyn_count: usize,
    /// Slots below this index are named and survive a recompile.
    named_count: usize,
    current: u8,
    holding: bool,
    locked: bool,
    /// Bit per sequence, set when a ramp suspended the program since that
    /// sequence last recurred.
    moved: u8,
    /// Advances on every compile and every external action.
    generation: u32,
}

impl Asl {
    pub fn new(channel: u8, config: EngineConfig) -> Self {
        Self {
            channel,
            config,
            seqs: core::array::from_fn(|_| Sequence::default()),
            seq_count: 1,
            nodes: [Node::default(); NODE_COUNT],
            node_count: 0,
            dynamics: [Elem::default(); DYN_COUNT],
            dyn_count: 0,
            named_count: 0,
            current: 0,
            holding: false,
            locked: false,
            moved: 0,
            generation: 0,
        }
    }

    pub fn channel(&self) -> u8 {
        self.channel
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }

    pub fn is_holding(&self) -> bool {
        self.holding
    }

    pub fn is_locked(&self) -> bool {
        self.locked
    }

    /// Allocate a named slot holding `init`. Named slots must be defined
    /// before `compile`; they keep their indices across recompiles until
    /// `clear_dynamics`. Fails while the current program holds
    /// auto-allocated slots, since those are released on recompile.
    pub fn def_dynamic(&mut self, init: f32) -> Result<u8, AslError> {
        if self.dyn_count > self.named_count {
            return Err(AslError::CompiledSlotsInUse);
        }
        let slot = self.alloc_dyn(Elem::Fixed(Q16::from_f32(init)))?;
        self.named_count = self.dyn_count;
        Ok(slot)
    }

    /// Overwrite a slot with a constant. The running program sees the new
    /// value the next time it resolves an expression reading the slot.
    pub fn set_dynamic(&mut self, slot: u8, value: f32) -> Result<(), AslError> {
        if slot as usize >= self.dyn_count {
            return Err(AslError::NoSuchDynamic(slot));
        }
        self.dynamics[slot as usize] = Elem::Fixed(Q16::from_f32(value));
        Ok(())
    }

    /// Current value of a slot, evaluated without side effects.
    pub fn get_dynamic(&self, slot: u8) -> Option<f32> {
        if slot as usize >= self.dyn_count {
            return None;
        }
        let mut scratch = self.dynamics;
        Some(elem::resolve(&mut scratch, Elem::Dynamic(slot)).value().to_f32())
    }

    /// Forget every slot, named ones included.
    pub fn clear_dynamics(&mut self) {
        self.dynamics = [Elem::default(); DYN_COUNT];
        self.dyn_count = 0;
        self.named_count = 0;
    }

    /// Slots in use, named ones included.
    pub fn dynamics_used(&self) -> usize {
        self.dyn_count
    }

    fn alloc_dyn(&mut self, init: Elem) -> Result<u8, AslError> {
        if self.dyn_count >= DYN_COUNT {
            return Err(AslError::NoDynamics);
        }
        let slot = self.dyn_count;
        self.dynamics[slot] = init;
        self.dyn_count += 1;
        Ok(slot as u8)
    }

    /// Back to the top of the root sequence, flags cleared.
    fn rewind(&mut self) {
        self.current = 0;
        for seq in self.seqs.iter_mut() {
            seq.pc = 0;
        }
        self.holding = false;
        self.locked = false;
        self.moved = 0;
    }
}
