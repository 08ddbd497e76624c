//! Bytecode toolkit for a Ruby-compatible virtual machine.
//!
//! - [`bytecode`]: opcode table, stack-effect formulas, instruction encoding and decoding,
//!   a text assembler and a disassembler.
//! - [`compiled_file`]: the `!RBIX` compiled-file container and its marshal format.
//! - [`config`]: environment-driven runtime settings.

pub mod bytecode;
pub mod compiled_file;
pub mod config;
pub mod utils;
