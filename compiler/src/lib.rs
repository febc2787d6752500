//! Bytecode compilation of expressions that have already been interpreted.
//!
//! The interpreter leaves resolved members and observed result shapes in the
//! node caches; [`codegen::generate`] turns a fully warmed tree into a
//! [`Program`] and [`processor::execute`] runs it, falling back whenever a guard
//! sees a value the program was not generated for.

pub mod bytecode;
pub mod codegen;
pub mod processor;
pub mod type_flow;

pub use bytecode::{Instruction, Program, Site};
pub use codegen::{generate, NotCompilable};
pub use processor::{execute, VmExit};
pub use type_flow::Flow;
