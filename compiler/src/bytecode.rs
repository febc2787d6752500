//! Instruction set of the expression processor.
//!
//! A program is a flat list of instructions over an operand stack and a stack
//! of active objects (`#this`). Instructions that can fail carry the `Site` of
//! the node they were generated for, so errors point at the same source span
//! the interpreter would report. Guard instructions never fail with an error:
//! when a value no longer has the shape the program was generated for, the
//! processor asks the caller to fall back to the interpreter.

use std::fmt;
use std::sync::Arc;
use frontend::ast::{ExprRef, Node};
use interpreter::cache::TargetKey;
use interpreter::descriptor::ScalarKind;
use interpreter::operators::{ArithmeticOp, ComparisonOp};
use interpreter::resolver::{ConstructorExecutor, MethodExecutor, ResolvedProperty};
use interpreter::types::{TypeHandle, TypeKind};
use interpreter::{Function, Value};

/// Node and source span an instruction was generated for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Site {
    pub node: ExprRef,
    pub span: Node,
}

/// Forward distance from a jump to its target.
pub type Offset = usize;

#[derive(Debug, Clone)]
pub enum Instruction {
    PushConst(Value),
    LoadRoot,
    LoadActive,
    LoadVariable(String),
    /// Store the top of the stack without popping it.
    StoreVariable { name: String, node: ExprRef },

    /// Pop a value and make it the active object.
    EnterActive,
    /// Make the root the active object, for argument and index expressions.
    EnterRoot,
    ExitActive,

    /// Guard: the top of the stack is a non-null scalar of this kind.
    Unbox(ScalarKind),
    /// Guard: the top of the stack has exactly this type.
    CheckType(TypeHandle),
    Widen(ScalarKind),
    Convert { to: TypeHandle, site: Site },

    IntArith(ArithmeticOp, Site),
    LongArith(ArithmeticOp, Site),
    FloatArith(ArithmeticOp, Site),
    DoubleArith(ArithmeticOp, Site),
    IntCompare(ComparisonOp),
    LongCompare(ComparisonOp),
    FloatCompare(ComparisonOp),
    DoubleCompare(ComparisonOp),
    StringCompare(ComparisonOp),
    /// `==`/`!=` on operands that are never promoted.
    ReferenceEquals(ComparisonOp),
    Negate(ScalarKind),
    /// String concatenation; at least one operand must be a string.
    Concat,
    Not,
    InstanceOf,

    Jump(Offset),
    /// Pop a boolean and jump when it is false.
    JumpIfFalse(Offset),
    /// Pop a boolean and jump when it is true.
    JumpIfTrue(Offset),
    /// Keep the top and jump when it is neither null nor empty; pop it otherwise.
    JumpIfPresent(Offset),

    /// Read a property of the active object.
    GetProperty { accessor: Arc<dyn ResolvedProperty>, target: TargetKey, null_safe: bool, name: Arc<str>, site: Site },
    /// Pop `argc` arguments and invoke a method on the active object.
    InvokeMethod {
        executor: Arc<dyn MethodExecutor>,
        target: TargetKey,
        argument_types: Vec<TypeHandle>,
        argc: usize,
        null_safe: bool,
        name: Arc<str>,
        site: Site,
    },
    CallFunction { function: Arc<Function>, argc: usize, site: Site },
    Construct { executor: Arc<dyn ConstructorExecutor>, argument_types: Vec<TypeHandle>, argc: usize, site: Site },
    /// Pop an index and push `active[index]`; the active object must be of `target_kind`.
    Index { target_kind: TypeKind, site: Site },

    NewList(usize),
    NewMap(usize),
}

/// Generated code for one expression.
#[derive(Debug, Clone)]
pub struct Program {
    pub instructions: Vec<Instruction>,
    pub max_stack: usize,
}

impl Program {
    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Instruction::PushConst(v) => write!(f, "push_const {v}"),
            Instruction::LoadRoot => f.write_str("load_root"),
            Instruction::LoadActive => f.write_str("load_active"),
            Instruction::LoadVariable(name) => write!(f, "load_var #{name}"),
            Instruction::StoreVariable { name, .. } => write!(f, "store_var #{name}"),
            Instruction::EnterActive => f.write_str("enter_active"),
            Instruction::EnterRoot => f.write_str("enter_root"),
            Instruction::ExitActive => f.write_str("exit_active"),
            Instruction::Unbox(kind) => write!(f, "unbox {kind}"),
            Instruction::CheckType(t) => write!(f, "check_type {}", t.name()),
            Instruction::Widen(kind) => write!(f, "widen {kind}"),
            Instruction::Convert { to, .. } => write!(f, "convert {}", to.name()),
            Instruction::IntArith(op, _) => write!(f, "i{}", op.name()),
            Instruction::LongArith(op, _) => write!(f, "l{}", op.name()),
            Instruction::FloatArith(op, _) => write!(f, "f{}", op.name()),
            Instruction::DoubleArith(op, _) => write!(f, "d{}", op.name()),
            Instruction::IntCompare(op) => write!(f, "icmp_{}", op.name()),
            Instruction::LongCompare(op) => write!(f, "lcmp_{}", op.name()),
            Instruction::FloatCompare(op) => write!(f, "fcmp_{}", op.name()),
            Instruction::DoubleCompare(op) => write!(f, "dcmp_{}", op.name()),
            Instruction::StringCompare(op) => write!(f, "scmp_{}", op.name()),
            Instruction::ReferenceEquals(op) => write!(f, "ref_{}", op.name()),
            Instruction::Negate(kind) => write!(f, "neg {kind}"),
            Instruction::Concat => f.write_str("concat"),
            Instruction::Not => f.write_str("not"),
            Instruction::InstanceOf => f.write_str("instanceof"),
            Instruction::Jump(off) => write!(f, "jump +{off}"),
            Instruction::JumpIfFalse(off) => write!(f, "jump_if_false +{off}"),
            Instruction::JumpIfTrue(off) => write!(f, "jump_if_true +{off}"),
            Instruction::JumpIfPresent(off) => write!(f, "jump_if_present +{off}"),
            Instruction::GetProperty { name, target, null_safe, .. } => {
                write!(f, "get_property {}{name} on {}", if *null_safe { "?." } else { "." }, target.type_handle.name())
            }
            Instruction::InvokeMethod { name, target, argc, .. } => {
                write!(f, "invoke {name}/{argc} on {}", target.type_handle.name())
            }
            Instruction::CallFunction { function, argc, .. } => write!(f, "call #{}/{argc}", function.name()),
            Instruction::Construct { executor, argc, .. } => write!(f, "new {}/{argc}", executor.constructed_type().name()),
            Instruction::Index { target_kind, .. } => write!(f, "index {target_kind:?}"),
            Instruction::NewList(n) => write!(f, "new_list {n}"),
            Instruction::NewMap(n) => write!(f, "new_map {n}"),
        }
    }
}

impl fmt::Display for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, instruction) in self.instructions.iter().enumerate() {
            writeln!(f, "{i:4}: {instruction}")?;
        }
        Ok(())
    }
}
