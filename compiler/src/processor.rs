//! Runs a generated program against an evaluation context.

use std::sync::Arc;
use indexmap::IndexMap;
use interpreter::cache::same_argument_types;
use interpreter::conversion::cast_number;
use interpreter::descriptor::ScalarKind;
use interpreter::error::{AccessError, EvaluationErrorKind};
use interpreter::indexing::read_index;
use interpreter::operators::{self, ArithmeticOp, ComparisonOp};
use interpreter::types::TypeKind;
use interpreter::{EvaluationContext, EvaluationError, Replay, Value};
use thiserror::Error;
use crate::bytecode::{Instruction, Program, Site};

/// Why a program stopped without a value.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum VmExit {
    /// The same error the interpreter raises for this input.
    #[error(transparent)]
    Error(EvaluationError),
    /// A guard failed; the caller must interpret the expression instead,
    /// reusing `replay` for the calls and assignments that already ran.
    #[error("guard failed: {reason}")]
    Fallback { reason: &'static str, replay: Replay },
}

type Step<T> = Result<T, VmExit>;

fn fallback<T>(reason: &'static str) -> Step<T> {
    Err(VmExit::Fallback { reason, replay: Replay::default() })
}

fn raise(site: Site, kind: impl Into<EvaluationErrorKind>) -> VmExit {
    VmExit::Error(kind.into().at(site.node, site.span))
}

pub struct Processor<'a> {
    program: &'a Program,
    context: &'a EvaluationContext,
    stack: Vec<Value>,
    active: Vec<Value>,
    completed: Replay,
}

impl<'a> Processor<'a> {
    pub fn new(program: &'a Program, context: &'a EvaluationContext) -> Self {
        Processor {
            program,
            context,
            stack: Vec::with_capacity(program.max_stack),
            active: vec![context.root().clone()],
            completed: Replay::default(),
        }
    }

    fn pop(&mut self) -> Step<Value> {
        match self.stack.pop() {
            Some(value) => Ok(value),
            None => fallback("operand stack underflow"),
        }
    }

    fn pop_n(&mut self, n: usize) -> Step<Vec<Value>> {
        if self.stack.len() < n {
            return fallback("operand stack underflow");
        }
        let at = self.stack.len() - n;
        Ok(self.stack.split_off(at))
    }

    fn pop_pair(&mut self) -> Step<(Value, Value)> {
        let r = self.pop()?;
        let l = self.pop()?;
        Ok((l, r))
    }

    fn pop_bool(&mut self) -> Step<bool> {
        match self.pop()? {
            Value::Bool(b) => Ok(b),
            _ => fallback("condition is not a boolean"),
        }
    }

    fn peek(&self) -> Step<&Value> {
        match self.stack.last() {
            Some(value) => Ok(value),
            None => fallback("operand stack underflow"),
        }
    }

    fn active(&self) -> Value {
        self.active.last().cloned().unwrap_or_default()
    }

    fn root(&self) -> Value {
        self.active.first().cloned().unwrap_or_default()
    }

    pub fn run(mut self) -> Result<Value, VmExit> {
        match self.dispatch() {
            Err(VmExit::Fallback { reason, .. }) => Err(VmExit::Fallback { reason, replay: std::mem::take(&mut self.completed) }),
            outcome => outcome,
        }
    }

    fn dispatch(&mut self) -> Result<Value, VmExit> {
        let program = self.program;
        let instructions = &program.instructions;
        let mut pc = 0;
        while let Some(instruction) = instructions.get(pc) {
            pc += 1;
            match instruction {
                Instruction::PushConst(value) => self.stack.push(value.clone()),
                Instruction::LoadRoot => self.stack.push(self.context.root().clone()),
                Instruction::LoadActive => self.stack.push(self.active()),
                Instruction::LoadVariable(name) => self.stack.push(self.context.variable(name).unwrap_or_default()),
                Instruction::StoreVariable { name, node } => {
                    let value = self.peek()?.clone();
                    self.context.set_variable(name.as_str(), value.clone());
                    self.completed.record(*node, value);
                }

                Instruction::EnterActive => {
                    let value = self.pop()?;
                    self.active.push(value);
                }
                Instruction::EnterRoot => self.active.push(self.root()),
                Instruction::ExitActive => {
                    self.active.pop();
                }

                Instruction::Unbox(kind) => {
                    if self.peek()?.scalar_kind() != Some(*kind) {
                        return fallback("operand is no longer the expected scalar");
                    }
                }
                Instruction::CheckType(t) => {
                    if !Arc::ptr_eq(&self.peek()?.type_handle(), t) {
                        return fallback("argument type changed");
                    }
                }
                Instruction::Widen(kind) => {
                    let value = self.pop()?;
                    match cast_number(&value, *kind) {
                        Some(widened) => self.stack.push(widened),
                        None => return fallback("argument cannot be widened"),
                    }
                }
                Instruction::Convert { to, site } => {
                    let value = self.pop()?;
                    let converted = self.context.convert(value, to).map_err(|e| raise(*site, e))?;
                    self.stack.push(converted);
                }

                Instruction::IntArith(op, site) => self.typed_arithmetic(*op, ScalarKind::Int, *site)?,
                Instruction::LongArith(op, site) => self.typed_arithmetic(*op, ScalarKind::Long, *site)?,
                Instruction::FloatArith(op, site) => self.typed_arithmetic(*op, ScalarKind::Float, *site)?,
                Instruction::DoubleArith(op, site) => self.typed_arithmetic(*op, ScalarKind::Double, *site)?,
                Instruction::IntCompare(op) => self.typed_compare(*op, ScalarKind::Int)?,
                Instruction::LongCompare(op) => self.typed_compare(*op, ScalarKind::Long)?,
                Instruction::FloatCompare(op) => self.typed_compare(*op, ScalarKind::Float)?,
                Instruction::DoubleCompare(op) => self.typed_compare(*op, ScalarKind::Double)?,
                Instruction::StringCompare(op) => {
                    let (l, r) = self.pop_pair()?;
                    let comparable = |v: &Value| matches!(v, Value::String(_) | Value::Null);
                    if !comparable(&l) || !comparable(&r) {
                        return fallback("operand is no longer a string");
                    }
                    match operators::compare(*op, &l, &r) {
                        Ok(result) => self.stack.push(Value::Bool(result)),
                        Err(_) => return fallback("operand is no longer a string"),
                    }
                }
                Instruction::ReferenceEquals(op) => {
                    let (l, r) = self.pop_pair()?;
                    let equal = operators::equals(&l, &r);
                    self.stack.push(Value::Bool(if *op == ComparisonOp::Eq { equal } else { !equal }));
                }
                Instruction::Negate(kind) => {
                    let value = self.pop()?;
                    let negated = match (kind, value) {
                        (ScalarKind::Int, Value::Int(v)) => Value::Int(v.wrapping_neg()),
                        (ScalarKind::Long, Value::Long(v)) => Value::Long(v.wrapping_neg()),
                        (ScalarKind::Float, Value::Float(v)) => Value::Float(-v),
                        (ScalarKind::Double, Value::Double(v)) => Value::Double(-v),
                        _ => return fallback("operand is no longer the expected scalar"),
                    };
                    self.stack.push(negated);
                }
                Instruction::Concat => {
                    let (l, r) = self.pop_pair()?;
                    if !matches!(l, Value::String(_)) && !matches!(r, Value::String(_)) {
                        return fallback("neither operand is a string");
                    }
                    self.stack.push(Value::from(format!("{l}{r}")));
                }
                Instruction::Not => {
                    let value = self.pop_bool()?;
                    self.stack.push(Value::Bool(!value));
                }
                Instruction::InstanceOf => {
                    let (value, target) = self.pop_pair()?;
                    let Value::Type(t) = target else {
                        return fallback("instanceof target is not a type");
                    };
                    self.stack.push(Value::Bool(operators::instance_of(&value, &t)));
                }

                Instruction::Jump(offset) => pc = pc - 1 + offset,
                Instruction::JumpIfFalse(offset) => {
                    if !self.pop_bool()? {
                        pc = pc - 1 + offset;
                    }
                }
                Instruction::JumpIfTrue(offset) => {
                    if self.pop_bool()? {
                        pc = pc - 1 + offset;
                    }
                }
                Instruction::JumpIfPresent(offset) => {
                    if self.peek()?.is_absent() {
                        self.pop()?;
                    } else {
                        pc = pc - 1 + offset;
                    }
                }

                Instruction::GetProperty { accessor, target, null_safe, name, site } => {
                    let object = self.active();
                    if object.is_null() {
                        if *null_safe {
                            self.stack.push(Value::Null);
                            continue;
                        }
                        return Err(raise(*site, AccessError::NullTarget { member_name: name.to_string() }));
                    }
                    if !target.matches(&object) {
                        return fallback("property target type changed");
                    }
                    let value = accessor.read(&object).map_err(|e| raise(*site, e))?;
                    self.stack.push(value);
                }
                Instruction::InvokeMethod { executor, target, argument_types, argc, null_safe, name, site } => {
                    let args = self.pop_n(*argc)?;
                    let object = self.active();
                    if object.is_null() {
                        if *null_safe {
                            self.stack.push(Value::Null);
                            continue;
                        }
                        return Err(raise(*site, AccessError::NullTarget { member_name: name.to_string() }));
                    }
                    if !target.matches(&object) || !same_argument_types(argument_types, &args) {
                        return fallback("method target or argument types changed");
                    }
                    let value = executor.execute(self.context, &object, args).map_err(|e| raise(*site, e))?;
                    self.completed.record(site.node, value.clone());
                    self.stack.push(value);
                }
                Instruction::CallFunction { function, argc, site } => {
                    let registered = self.context.function(function.name());
                    if !registered.is_some_and(|f| Arc::ptr_eq(&f, function)) {
                        return fallback("function registration changed");
                    }
                    let args = self.pop_n(*argc)?;
                    let value = function.invoke(&args).map_err(|e| raise(*site, e))?;
                    self.completed.record(site.node, value.clone());
                    self.stack.push(value);
                }
                Instruction::Construct { executor, argument_types, argc, site } => {
                    let args = self.pop_n(*argc)?;
                    if !same_argument_types(argument_types, &args) {
                        return fallback("constructor argument types changed");
                    }
                    let value = executor.execute(self.context, args).map_err(|e| raise(*site, e))?;
                    self.completed.record(site.node, value.clone());
                    self.stack.push(value);
                }
                Instruction::Index { target_kind, site } => {
                    let index = self.pop()?;
                    let object = self.active();
                    let kind_matches = matches!(
                        (&object, target_kind),
                        (Value::List(_), TypeKind::List) | (Value::Map(_), TypeKind::Map) | (Value::Array(_), TypeKind::Array)
                    );
                    if !kind_matches {
                        return fallback("indexed target changed kind");
                    }
                    let value = read_index(self.context, &object, &index).map_err(|e| raise(*site, e))?;
                    self.stack.push(value);
                }

                Instruction::NewList(n) => {
                    let items = self.pop_n(*n)?;
                    self.stack.push(Value::list(items));
                }
                Instruction::NewMap(n) => {
                    let flat = self.pop_n(n * 2)?;
                    let mut entries = IndexMap::with_capacity(*n);
                    let mut iter = flat.into_iter();
                    while let (Some(key), Some(value)) = (iter.next(), iter.next()) {
                        entries.insert(key, value);
                    }
                    self.stack.push(Value::map(entries));
                }
            }
        }
        self.pop()
    }

    fn typed_arithmetic(&mut self, op: ArithmeticOp, kind: ScalarKind, site: Site) -> Step<()> {
        let (l, r) = self.pop_pair()?;
        if l.scalar_kind() != Some(kind) || r.scalar_kind() != Some(kind) {
            return fallback("operand is no longer the expected scalar");
        }
        let value = op.apply_kind(kind, &l, &r).map_err(|e| raise(site, e))?;
        self.stack.push(value);
        Ok(())
    }

    fn typed_compare(&mut self, op: ComparisonOp, kind: ScalarKind) -> Step<()> {
        let (l, r) = self.pop_pair()?;
        let result = match (kind, &l, &r) {
            (ScalarKind::Int, Value::Int(a), Value::Int(b)) => op.apply(a, b),
            (ScalarKind::Long, Value::Long(a), Value::Long(b)) => op.apply(a, b),
            (ScalarKind::Float, Value::Float(a), Value::Float(b)) => op.apply(a, b),
            (ScalarKind::Double, Value::Double(a), Value::Double(b)) => op.apply(a, b),
            _ => return fallback("operand is no longer the expected scalar"),
        };
        self.stack.push(Value::Bool(result));
        Ok(())
    }
}

/// Run `program` against `context`.
pub fn execute(program: &Program, context: &EvaluationContext) -> Result<Value, VmExit> {
    Processor::new(program, context).run()
}
