//! Bytecode instruction model.
//!
//! # Modules
//!
//! - [`isa`]: Opcode table, descriptors and lookups
//! - [`operand`]: Operand kinds and stack-effect formulas
//! - [`encoder`]: Instruction sequences, encoding, decoding and in-place patching
//! - [`assembler`]: Textual listing parser, diagnostics and assembly
//! - [`disasm`]: Instruction sequence disassembly
//! - [`errors`]: Bytecode error type

pub mod assembler;
pub mod disasm;
pub mod encoder;
pub mod errors;
pub mod isa;
#[cfg(test)]
mod isa_static_check;
pub mod operand;
