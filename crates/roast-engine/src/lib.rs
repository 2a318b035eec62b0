//! Roast Bytecode Execution Core
//!
//! This crate provides the execution core of a stack-based, JVM-style virtual machine:
//! - **Bytecode**: Opcode table, instruction lengths, and a method assembler (`bytecode` module)
//! - **VM**: Dispatch loop, quickening/inline caches, OSR, exception and monitor handling (`vm` module)
//!
//! Class loading, heap layout, native calls and the optimizing compiler are host
//! collaborators reached through the traits in [`vm::runtime`] and [`vm::osr`].
//!
//! # Example
//!
//! ```rust,ignore
//! use roast_engine::{CodeBuilder, Interpreter, MethodFlags, MethodInfo, Opcode, VmContext};
//!
//! let mut b = CodeBuilder::new(0, 2);
//! b.op(Opcode::Iconst1).op(Opcode::Iconst2).op(Opcode::Iadd).op(Opcode::Ireturn);
//! let code = b.finish(resolver)?;
//! let method = Arc::new(MethodInfo::new(holder, "three", "()I", MethodFlags::STATIC, Some(code))?);
//!
//! let ctx = VmContext::new(runtime);
//! let result = Interpreter::new(&ctx).invoke(&method, &[])?;
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]
#![allow(clippy::new_without_default)]
#![allow(clippy::too_many_arguments)]

// ============================================================================
// Core Modules
// ============================================================================

/// Bytecode module: opcode table, instruction decoding and method assembly
pub mod bytecode;

/// VM module: interpreter, quickening, OSR, exceptions and monitors
pub mod vm;

// ============================================================================
// Re-exports
// ============================================================================

pub use bytecode::{BuildError, CodeBuilder, Label, Opcode};

pub use vm::{
    // Errors
    VmError, VmResult,
    // Values and frames
    Frame, ObjRef, Value,
    // Class model
    ClassId, ClassInfo, FieldInfo, Kind, MethodFlags, MethodInfo,
    // Method versions
    HandlerEntry, HandlerTable, LineEntry, MethodCode,
    // Collaborators
    Constant, HookAction, Instrumentation, LinkError, Resolver, ResourceKind, Runtime,
    ThrowableKind,
    // Interpreter
    Interpreter, SafepointCoordinator, StopReason, VmContext,
    // Configuration
    BooleanPolicy, OptionsError, VmOptions,
    // OSR
    OsrCode, OsrCompiler, OsrEntry, OsrTransfer, ThresholdPolicy, TieringPolicy,
    // Monitors
    MonitorStack,
};
