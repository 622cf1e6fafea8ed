//! Description tree to pools.

use core::fmt;

use bb_ir::asl::{Operand, Stage};
use bb_ir::{Shape, Q16};

use super::{Asl, Elem, Node, Sequence, DYN_COUNT, NODE_COUNT, SEQ_COUNT};

/// Reasons a stage is skipped during compile, or a dynamic access fails.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AslError {
    /// Sequence pool exhausted
    NoSequences,
    /// Node pool exhausted
    NoNodes,
    /// Dynamic slot pool exhausted
    NoDynamics,
    /// The enclosing sequence has no room for another stage
    SequenceFull,
    UnknownStage(char),
    UnknownExpr(char),
    /// Missing operand or malformed slot index
    BadOperand,
    NoSuchDynamic(u8),
    /// A named slot was requested while the compiled program owns slots
    CompiledSlotsInUse,
}

impl fmt::Display for AslError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AslError::NoSequences => write!(f, "out of sequences"),
            AslError::NoNodes => write!(f, "out of nodes"),
            AslError::NoDynamics => write!(f, "out of dynamic slots"),
            AslError::SequenceFull => write!(f, "sequence is full"),
            AslError::UnknownStage(tag) => write!(f, "unknown stage '{}'", tag),
            AslError::UnknownExpr(tag) => write!(f, "unknown expression '{}'", tag),
            AslError::BadOperand => write!(f, "bad operand"),
            AslError::NoSuchDynamic(slot) => write!(f, "no dynamic slot {}", slot),
            AslError::CompiledSlotsInUse => write!(f, "named dynamics must be defined before compiling"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for AslError {}

/// Summary of one compile. Skipped stages are left out of the program;
/// everything else runs.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CompileReport {
    pub nodes: usize,
    pub sequences: usize,
    pub dynamics: usize,
    pub skipped: usize,
    pub first_error: Option<AslError>,
}

impl CompileReport {
    pub fn is_clean(&self) -> bool {
        self.skipped == 0
    }
}

impl Asl {
    /// Replace the program with `stages`. Previous sequences, nodes and
    /// auto-allocated slots are discarded; named slots are kept. The new
    /// program is idle until the next `Restart`.
    pub fn compile(&mut self, stages: &[Stage]) -> CompileReport {
        for seq in self.seqs.iter_mut() {
            *seq = Sequence::default();
        }
        self.seq_count = 1;
        self.node_count = 0;
        self.dyn_count = self.named_count;
        self.generation = self.generation.wrapping_add(1);
        self.rewind();

        let mut report = CompileReport::default();
        for stage in stages {
            self.compile_stage(stage, 0, &mut report);
        }
        report.nodes = self.node_count;
        report.sequences = self.seq_count;
        report.dynamics = self.dyn_count;
        log::debug!(
            "asl {}: compiled {} nodes, {} sequences, {} slots",
            self.channel,
            report.nodes,
            report.sequences,
            report.dynamics
        );
        report
    }

    fn compile_stage(&mut self, stage: &Stage, seq: u8, report: &mut CompileReport) {
        if let Err(e) = self.try_stage(stage, seq, report) {
            log::warn!("asl {}: stage skipped: {}", self.channel, e);
            report.skipped += 1;
            report.first_error.get_or_insert(e);
        }
    }

    fn try_stage(&mut self, stage: &Stage, seq: u8, report: &mut CompileReport) -> Result<(), AslError> {
        self.reserve(seq)?;
        match stage {
            Stage::Nest(children) => {
                if self.seq_count >= SEQ_COUNT {
                    return Err(AslError::NoSequences);
                }
                let child = self.seq_count as u8;
                self.seq_count += 1;
                self.seqs[child as usize].parent = Some(seq);
                self.append(seq, Node::Enter(child));
                for stage in children {
                    self.compile_stage(stage, child, report);
                }
            }
            Stage::Step { tag, operands } => {
                let node = self.build_node(*tag, operands)?;
                self.append(seq, node);
            }
        }
        Ok(())
    }

    fn reserve(&self, seq: u8) -> Result<(), AslError> {
        if self.node_count >= NODE_COUNT {
            return Err(AslError::NoNodes);
        }
        if self.seqs[seq as usize].stages.is_full() {
            return Err(AslError::SequenceFull);
        }
        Ok(())
    }

    /// Caller has checked `reserve`.
    fn append(&mut self, seq: u8, node: Node) {
        let ix = self.node_count;
        self.nodes[ix] = node;
        self.node_count += 1;
        let _ = self.seqs[seq as usize].stages.push(ix as u8);
    }

    fn build_node(&mut self, tag: char, operands: &[Operand]) -> Result<Node, AslError> {
        let node = match tag {
            'T' => {
                let volts = self.capture(operands.first())?;
                let time = self.capture(operands.get(1))?;
                let shape = match operands.get(2) {
                    Some(op) => self.capture(Some(op))?,
                    None => Elem::Shape(Shape::Linear),
                };
                Node::Literal { volts, time, shape }
            }
            'I' => Node::If(self.capture(operands.first())?),
            'R' => Node::Recur,
            'H' => Node::Held,
            'W' => Node::Wait,
            'U' => Node::Unheld,
            'L' => Node::Lock,
            'O' => Node::Open,
            other => return Err(AslError::UnknownStage(other)),
        };
        Ok(node)
    }

    fn capture(&mut self, operand: Option<&Operand>) -> Result<Elem, AslError> {
        match operand.ok_or(AslError::BadOperand)? {
            Operand::Num(v) => Ok(Elem::Fixed(Q16::from_f32(*v))),
            Operand::Bool(b) => Ok(Elem::Fixed(if *b { Q16::ONE } else { Q16::ZERO })),
            Operand::Name(name) => Ok(Elem::Shape(Shape::from_name(name))),
            Operand::Expr { tag, args } => self.capture_expr(*tag, args),
        }
    }

    fn capture_expr(&mut self, tag: char, args: &[Operand]) -> Result<Elem, AslError> {
        match tag {
            'D' => Ok(Elem::Dynamic(slot_index(args)?)),
            'N' => Ok(Elem::Mutable(slot_index(args)?)),
            'M' => {
                let init = self.capture(args.first())?;
                Ok(Elem::Mutable(self.alloc_dyn(init)?))
            }
            '~' => Ok(Elem::Negate(self.operand_slot(args.first())?)),
            '#' => Ok(Elem::Mutate(self.operand_slot(args.first())?)),
            '+' => self.binary(args, Elem::Add),
            '-' => self.binary(args, Elem::Sub),
            '*' => self.binary(args, Elem::Mul),
            '/' => self.binary(args, Elem::Div),
            '%' => self.binary(args, Elem::Mod),
            other => Err(AslError::UnknownExpr(other)),
        }
    }

    fn binary(&mut self, args: &[Operand], op: fn(u8, u8) -> Elem) -> Result<Elem, AslError> {
        let a = self.operand_slot(args.first())?;
        let b = self.operand_slot(args.get(1))?;
        Ok(op(a, b))
    }

    /// Operator operands live in freshly allocated slots.
    fn operand_slot(&mut self, operand: Option<&Operand>) -> Result<u8, AslError> {
        let e = self.capture(operand)?;
        self.alloc_dyn(e)
    }
}

fn slot_index(args: &[Operand]) -> Result<u8, AslError> {
    match args.first() {
        Some(Operand::Num(n)) if *n >= 0.0 && (*n as usize) < DYN_COUNT => Ok(*n as u8),
        _ => Err(AslError::BadOperand),
    }
}
