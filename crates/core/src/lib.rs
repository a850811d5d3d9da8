//! Instruction model for the mixweave bytecode weaver.
//!
//! A [`CompiledUnit`](unit::CompiledUnit) owns fields and procedures; each procedure body is
//! an [`InstructionSequence`](sequence::InstructionSequence) of typed
//! [`Instruction`](insn::Instruction)s and [`Label`](insn::Label)s. Units cross the binary
//! boundary through a [`UnitCodec`](codec::UnitCodec); bodies can be written and read in the
//! textual form of the [`asm`] module.

pub mod asm;
pub mod codec;
pub mod descriptor;
pub mod insn;
pub mod literal;
pub mod opcode;
pub mod result;
pub mod sequence;
pub mod types;
pub mod unit;

pub use insn::Instruction;
pub use opcode::Opcode;
pub use result::{Error, Result};
