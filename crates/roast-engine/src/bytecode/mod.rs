//! Bytecode definitions
//!
//! - [`opcode`]: the opcode table, operand decoding and instruction lengths
//! - [`builder`]: an assembler producing [`MethodCode`](crate::vm::MethodCode)

pub mod builder;
pub mod opcode;

pub use builder::{BuildError, CodeBuilder, Label};
pub use opcode::Opcode;
