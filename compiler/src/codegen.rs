//! Decides compilability and generates bytecode in one walk.
//!
//! A node compiles only if its kind has a code form, every child compiles, and
//! any member it resolves has a cached, compilable resolution from earlier
//! interpreted runs. The first node that cannot be compiled aborts the walk;
//! each visited node's compile status is recorded in its cache.

use std::sync::Arc;
use frontend::ast::{Ast, Expr, ExprRef, Literal, Operator, SelectionKind, UnaryOp};
use frontend::visitor::{walk_expr, AstVisitor, DanglingRef};
use interpreter::cache::{CachedMember, CompileStatus, NodeCache, NodeCaches};
use interpreter::descriptor::{ScalarKind, ValueDescriptor};
use interpreter::operators::{ArithmeticOp, ComparisonOp};
use interpreter::overload::ArgConversion;
use interpreter::types::{builtin, TypeKind};
use interpreter::Value;
use string_interner::DefaultSymbol;
use thiserror::Error;
use tracing::debug;
use crate::bytecode::{Instruction, Program, Site};
use crate::type_flow::{coerce_to_scalar, common_numeric_kind, Flow, TypeFlow};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NotCompilable {
    #[error("{construct} has no compiled form (node {node:?})")]
    Unsupported { node: ExprRef, construct: &'static str },
    #[error("node {0:?} has no cached compilable resolution")]
    Unresolved(ExprRef),
    #[error("{consumer} cannot consume {found} (node {node:?})")]
    Incompatible { node: ExprRef, consumer: &'static str, found: String },
    #[error("'{operator}' mixes {left} and {right} (node {node:?})")]
    MixedNumericKinds { node: ExprRef, operator: &'static str, left: String, right: String },
    #[error(transparent)]
    Dangling(#[from] DanglingRef),
}

type GenResult = Result<(), NotCompilable>;

pub struct CodeGenerator<'a> {
    ast: &'a Ast,
    caches: &'a NodeCaches,
    code: Vec<Instruction>,
    flow: TypeFlow,
}

/// Generate a program for the whole expression. `root` describes the root
/// object the program will be run against.
pub fn generate(ast: &Ast, caches: &NodeCaches, root: Flow) -> Result<Program, NotCompilable> {
    let mut generator = CodeGenerator::new(ast, caches, root);
    match generator.generate_node(ast.root) {
        Ok(()) => Ok(generator.finish()),
        Err(reason) => {
            debug!(%reason, expression = %ast.source, "expression is not compilable");
            Err(reason)
        }
    }
}

impl<'a> CodeGenerator<'a> {
    pub fn new(ast: &'a Ast, caches: &'a NodeCaches, root: Flow) -> Self {
        CodeGenerator { ast, caches, code: Vec::new(), flow: TypeFlow::new(root) }
    }

    pub fn finish(self) -> Program {
        Program { instructions: self.code, max_stack: self.flow.max_depth() }
    }

    fn generate_node(&mut self, id: ExprRef) -> GenResult {
        let result = walk_expr(self, self.ast, id);
        let status = if result.is_ok() { CompileStatus::Compilable } else { CompileStatus::NotCompilable };
        self.cache(id).set_compile_status(status);
        result
    }

    fn cache(&self, id: ExprRef) -> &'a NodeCache {
        self.caches.node(id)
    }

    fn site(&self, id: ExprRef) -> Site {
        Site { node: id, span: self.ast.node(id) }
    }

    fn observed(&self, id: ExprRef) -> Flow {
        Flow::observed(self.cache(id).exit())
    }

    fn emit(&mut self, instruction: Instruction) -> usize {
        self.code.push(instruction);
        self.code.len() - 1
    }

    /// Point the jump at `at` to the next instruction emitted.
    fn patch(&mut self, at: usize) {
        let offset = self.code.len() - at;
        if let Some(Instruction::Jump(o) | Instruction::JumpIfFalse(o) | Instruction::JumpIfTrue(o) | Instruction::JumpIfPresent(o)) =
            self.code.get_mut(at)
        {
            *o = offset;
        }
    }

    /// Jumps are relative, so code inserted at the end of a finished fragment
    /// never disturbs jumps inside later fragments.
    fn insert(&mut self, at: usize, instructions: Vec<Instruction>) {
        self.code.splice(at..at, instructions);
    }

    fn unsupported(id: ExprRef, construct: &'static str) -> NotCompilable {
        NotCompilable::Unsupported { node: id, construct }
    }

    fn require_boolean(&self, id: ExprRef, flow: &Flow, consumer: &'static str) -> GenResult {
        if flow.is_boolean() {
            Ok(())
        } else {
            Err(NotCompilable::Incompatible { node: id, consumer, found: flow.descriptor.to_string() })
        }
    }

    fn condition(&mut self, id: ExprRef, consumer: &'static str) -> GenResult {
        self.generate_node(id)?;
        let flow = self.flow.pop();
        self.require_boolean(id, &flow, consumer)
    }

    /// Generate an argument or index expression, which sees the root as `#this`.
    fn generate_in_root_scope(&mut self, id: ExprRef) -> GenResult {
        self.emit(Instruction::EnterRoot);
        self.flow.enter_root();
        self.generate_node(id)?;
        self.emit(Instruction::ExitActive);
        self.flow.exit_active();
        Ok(())
    }

    fn generate_logical(&mut self, op: Operator, lhs: ExprRef, rhs: ExprRef) -> GenResult {
        let consumer = op.symbol();
        let short_circuit = |offset| match op {
            Operator::LogicalAnd => Instruction::JumpIfFalse(offset),
            _ => Instruction::JumpIfTrue(offset),
        };
        let decided = op != Operator::LogicalAnd;

        self.condition(lhs, consumer)?;
        let first = self.emit(short_circuit(0));
        self.condition(rhs, consumer)?;
        let second = self.emit(short_circuit(0));
        self.emit(Instruction::PushConst(Value::Bool(!decided)));
        let done = self.emit(Instruction::Jump(0));
        self.patch(first);
        self.patch(second);
        self.emit(Instruction::PushConst(Value::Bool(decided)));
        self.patch(done);
        self.flow.push(Flow::scalar(ScalarKind::Boolean));
        Ok(())
    }

    fn generate_arithmetic(&mut self, id: ExprRef, op: ArithmeticOp, lhs_end: usize, l: Flow, r: Flow) -> GenResult {
        if op == ArithmeticOp::Add && (l.is_string() || r.is_string()) {
            self.emit(Instruction::Concat);
            self.flow.push(Flow::proven(ValueDescriptor::Reference(builtin::string())));
            return Ok(());
        }
        let kind = self.numeric_operands(id, op.symbol(), &l, &r)?;
        let site = self.site(id);
        self.coerce_operands(kind, lhs_end, &l, &r);
        self.emit(match kind {
            ScalarKind::Int => Instruction::IntArith(op, site),
            ScalarKind::Long => Instruction::LongArith(op, site),
            ScalarKind::Float => Instruction::FloatArith(op, site),
            _ => Instruction::DoubleArith(op, site),
        });
        self.flow.push(Flow::scalar(kind));
        Ok(())
    }

    fn generate_comparison(&mut self, id: ExprRef, op: ComparisonOp, lhs_end: usize, l: Flow, r: Flow) -> GenResult {
        let instruction = if l.numeric_kind().is_some() || r.numeric_kind().is_some() {
            let kind = self.numeric_operands(id, op.symbol(), &l, &r)?;
            self.coerce_operands(kind, lhs_end, &l, &r);
            match kind {
                ScalarKind::Int => Instruction::IntCompare(op),
                ScalarKind::Long => Instruction::LongCompare(op),
                ScalarKind::Float => Instruction::FloatCompare(op),
                _ => Instruction::DoubleCompare(op),
            }
        } else if l.is_string() && r.is_string() {
            Instruction::StringCompare(op)
        } else if matches!(op, ComparisonOp::Eq | ComparisonOp::Ne) && l.is_plain_reference() && r.is_plain_reference() {
            Instruction::ReferenceEquals(op)
        } else {
            return Err(NotCompilable::Incompatible {
                node: id,
                consumer: op.symbol(),
                found: format!("{} and {}", l.descriptor, r.descriptor),
            });
        };
        self.emit(instruction);
        self.flow.push(Flow::scalar(ScalarKind::Boolean));
        Ok(())
    }

    fn numeric_operands(&self, id: ExprRef, operator: &'static str, l: &Flow, r: &Flow) -> Result<ScalarKind, NotCompilable> {
        common_numeric_kind(l, r).ok_or_else(|| match (l.numeric_kind(), r.numeric_kind()) {
            (Some(a), Some(b)) => NotCompilable::MixedNumericKinds {
                node: id,
                operator,
                left: a.to_string(),
                right: b.to_string(),
            },
            _ => NotCompilable::Incompatible { node: id, consumer: operator, found: format!("{} and {}", l.descriptor, r.descriptor) },
        })
    }

    /// Guards for both operands; the left one goes right after the left fragment.
    fn coerce_operands(&mut self, kind: ScalarKind, lhs_end: usize, l: &Flow, r: &Flow) {
        if let Some(guards) = coerce_to_scalar(r, kind) {
            self.code.extend(guards);
        }
        if let Some(guards) = coerce_to_scalar(l, kind) {
            self.insert(lhs_end, guards);
        }
    }

    fn generate_arguments_in_root_scope(&mut self, args: &[ExprRef]) -> GenResult {
        for arg in args {
            self.generate_in_root_scope(*arg)?;
        }
        Ok(())
    }

    fn is_type_reference(&self, id: ExprRef) -> Result<bool, NotCompilable> {
        Ok(matches!(self.ast.get(id).ok_or(DanglingRef(id))?, Expr::TypeReference { .. }))
    }
}

impl AstVisitor for CodeGenerator<'_> {
    type Output = ();
    type Error = NotCompilable;

    fn visit_literal(&mut self, id: ExprRef, literal: &Literal) -> GenResult {
        let value = self.cache(id).constant().cloned().unwrap_or_else(|| Value::from(literal));
        let flow = match ValueDescriptor::of_value(&value) {
            Some(descriptor) => Flow::proven(descriptor),
            None => Flow::null(),
        };
        self.emit(Instruction::PushConst(value));
        self.flow.push(flow);
        Ok(())
    }

    fn visit_binary(&mut self, id: ExprRef, op: Operator, lhs: ExprRef, rhs: ExprRef) -> GenResult {
        match op {
            Operator::LogicalAnd | Operator::LogicalOr => return self.generate_logical(op, lhs, rhs),
            Operator::InstanceOf => {
                if !self.is_type_reference(rhs)? {
                    return Err(Self::unsupported(id, "'instanceof' without a type reference"));
                }
                self.generate_node(lhs)?;
                self.generate_node(rhs)?;
                self.flow.pop_n(2);
                self.emit(Instruction::InstanceOf);
                self.flow.push(Flow::scalar(ScalarKind::Boolean));
                return Ok(());
            }
            Operator::Pow => return Err(Self::unsupported(id, "'^'")),
            Operator::Between => return Err(Self::unsupported(id, "'between'")),
            Operator::Matches => return Err(Self::unsupported(id, "'matches'")),
            _ => {}
        }
        self.generate_node(lhs)?;
        let lhs_end = self.code.len();
        self.generate_node(rhs)?;
        let r = self.flow.pop();
        let l = self.flow.pop();
        if let Some(arithmetic) = ArithmeticOp::from_operator(op) {
            return self.generate_arithmetic(id, arithmetic, lhs_end, l, r);
        }
        if let Some(comparison) = ComparisonOp::from_operator(op) {
            return self.generate_comparison(id, comparison, lhs_end, l, r);
        }
        Err(Self::unsupported(id, op.symbol()))
    }

    fn visit_unary(&mut self, id: ExprRef, op: UnaryOp, operand: ExprRef) -> GenResult {
        self.generate_node(operand)?;
        let flow = self.flow.pop();
        if op == UnaryOp::Not {
            self.require_boolean(id, &flow, "'!'")?;
            self.emit(Instruction::Not);
            self.flow.push(Flow::scalar(ScalarKind::Boolean));
            return Ok(());
        }
        let kind = flow.numeric_kind().ok_or_else(|| NotCompilable::Incompatible {
            node: id,
            consumer: op.symbol(),
            found: flow.descriptor.to_string(),
        })?;
        if let Some(guards) = coerce_to_scalar(&flow, kind) {
            self.code.extend(guards);
        }
        if op == UnaryOp::Minus {
            self.emit(Instruction::Negate(kind));
        }
        self.flow.push(Flow::scalar(kind));
        Ok(())
    }

    fn visit_ternary(&mut self, _id: ExprRef, cond: ExprRef, then: ExprRef, otherwise: ExprRef) -> GenResult {
        self.condition(cond, "'?:' condition")?;
        let to_otherwise = self.emit(Instruction::JumpIfFalse(0));
        self.generate_node(then)?;
        let then_flow = self.flow.pop();
        let to_end = self.emit(Instruction::Jump(0));
        self.patch(to_otherwise);
        self.generate_node(otherwise)?;
        let otherwise_flow = self.flow.pop();
        self.patch(to_end);
        self.flow.push(then_flow.join(&otherwise_flow));
        Ok(())
    }

    fn visit_elvis(&mut self, _id: ExprRef, lhs: ExprRef, rhs: ExprRef) -> GenResult {
        self.generate_node(lhs)?;
        let lhs_flow = self.flow.pop();
        let to_end = self.emit(Instruction::JumpIfPresent(0));
        self.generate_node(rhs)?;
        let rhs_flow = self.flow.pop();
        self.patch(to_end);
        self.flow.push(lhs_flow.join(&rhs_flow));
        Ok(())
    }

    fn visit_assign(&mut self, id: ExprRef, target: ExprRef, value: ExprRef) -> GenResult {
        let name = match self.ast.get(target).ok_or(DanglingRef(target))? {
            Expr::Variable(sym) => self.ast.resolve(*sym),
            _ => return Err(Self::unsupported(id, "assignment to a member")),
        };
        if name == "this" || name == "root" {
            return Err(Self::unsupported(id, "assignment to #this or #root"));
        }
        self.generate_node(value)?;
        self.emit(Instruction::StoreVariable { name: name.to_string(), node: id });
        Ok(())
    }

    fn visit_compound(&mut self, _id: ExprRef, parts: &[ExprRef]) -> GenResult {
        let Some((head, rest)) = parts.split_first() else {
            self.emit(Instruction::PushConst(Value::Null));
            self.flow.push(Flow::null());
            return Ok(());
        };
        self.generate_node(*head)?;
        for part in rest {
            self.emit(Instruction::EnterActive);
            self.flow.enter_active();
            self.generate_node(*part)?;
            self.emit(Instruction::ExitActive);
            self.flow.exit_active();
        }
        Ok(())
    }

    fn visit_property(&mut self, id: ExprRef, name: DefaultSymbol, null_safe: bool) -> GenResult {
        let member = self.cache(id).member();
        let Some(CachedMember::Property(entry)) = member.as_deref() else {
            return Err(NotCompilable::Unresolved(id));
        };
        if entry.for_write || !entry.accessor.is_compilable() {
            return Err(NotCompilable::Unresolved(id));
        }
        self.emit(Instruction::GetProperty {
            accessor: entry.accessor.clone(),
            target: entry.target.clone(),
            null_safe,
            name: Arc::from(self.ast.resolve(name)),
            site: self.site(id),
        });
        self.flow.push(self.observed(id));
        Ok(())
    }

    fn visit_method_call(&mut self, id: ExprRef, name: DefaultSymbol, args: &[ExprRef], null_safe: bool) -> GenResult {
        let member = self.cache(id).member();
        let Some(CachedMember::Method(entry)) = member.as_deref() else {
            return Err(NotCompilable::Unresolved(id));
        };
        if !entry.executor.is_compilable() {
            return Err(NotCompilable::Unresolved(id));
        }
        self.generate_arguments_in_root_scope(args)?;
        self.flow.pop_n(args.len());
        self.emit(Instruction::InvokeMethod {
            executor: entry.executor.clone(),
            target: entry.target.clone(),
            argument_types: entry.argument_types.clone(),
            argc: args.len(),
            null_safe,
            name: Arc::from(self.ast.resolve(name)),
            site: self.site(id),
        });
        self.flow.push(self.observed(id));
        Ok(())
    }

    fn visit_indexer(&mut self, id: ExprRef, index: ExprRef) -> GenResult {
        let active = self.flow.active();
        let target_kind = match &active.descriptor {
            ValueDescriptor::Reference(t) if matches!(t.kind(), TypeKind::List | TypeKind::Map | TypeKind::Array) => t.kind(),
            other => {
                return Err(NotCompilable::Incompatible { node: id, consumer: "indexer", found: other.to_string() });
            }
        };
        match self.ast.get(index).ok_or(DanglingRef(index))? {
            Expr::Property { name, .. } if target_kind == TypeKind::Map => {
                self.emit(Instruction::PushConst(Value::from(self.ast.resolve(*name))));
                self.flow.push(Flow::string());
            }
            _ => self.generate_in_root_scope(index)?,
        }
        self.flow.pop();
        self.emit(Instruction::Index { target_kind, site: self.site(id) });
        self.flow.push(self.observed(id));
        Ok(())
    }

    fn visit_selection(&mut self, id: ExprRef, _kind: SelectionKind, _predicate: ExprRef, _null_safe: bool) -> GenResult {
        Err(Self::unsupported(id, "selection"))
    }

    fn visit_projection(&mut self, id: ExprRef, _expr: ExprRef, _null_safe: bool) -> GenResult {
        Err(Self::unsupported(id, "projection"))
    }

    fn visit_variable(&mut self, id: ExprRef, name: DefaultSymbol) -> GenResult {
        match self.ast.resolve(name) {
            "this" => {
                self.emit(Instruction::LoadActive);
                self.flow.push(self.flow.active());
            }
            "root" => {
                self.emit(Instruction::LoadRoot);
                self.flow.push(self.flow.root());
            }
            other => {
                self.emit(Instruction::LoadVariable(other.to_string()));
                self.flow.push(self.observed(id));
            }
        }
        Ok(())
    }

    fn visit_function_call(&mut self, id: ExprRef, _name: DefaultSymbol, args: &[ExprRef]) -> GenResult {
        let member = self.cache(id).member();
        let Some(CachedMember::Function(entry)) = member.as_deref() else {
            return Err(NotCompilable::Unresolved(id));
        };
        if entry.plan.varargs.is_some() {
            return Err(Self::unsupported(id, "varargs function call"));
        }
        if args.len() != entry.argument_types.len() {
            return Err(NotCompilable::Unresolved(id));
        }
        let site = self.site(id);
        for ((arg, argument_type), conversion) in args.iter().zip(&entry.argument_types).zip(&entry.plan.conversions) {
            self.generate_in_root_scope(*arg)?;
            self.emit(Instruction::CheckType(argument_type.clone()));
            match conversion {
                ArgConversion::Identity => {}
                ArgConversion::Widen(kind) => {
                    self.emit(Instruction::Widen(*kind));
                }
                ArgConversion::Convert(to) => {
                    self.emit(Instruction::Convert { to: to.clone(), site });
                }
            }
        }
        self.flow.pop_n(args.len());
        self.emit(Instruction::CallFunction { function: entry.function.clone(), argc: args.len(), site });
        self.flow.push(self.observed(id));
        Ok(())
    }

    fn visit_bean_reference(&mut self, id: ExprRef, _name: &str) -> GenResult {
        Err(Self::unsupported(id, "bean reference"))
    }

    fn visit_type_reference(&mut self, id: ExprRef, _name: &str, _dimensions: usize) -> GenResult {
        let member = self.cache(id).member();
        let Some(CachedMember::Type(entry)) = member.as_deref() else {
            return Err(NotCompilable::Unresolved(id));
        };
        self.emit(Instruction::PushConst(Value::Type(entry.type_handle.clone())));
        self.flow.push(Flow::proven(ValueDescriptor::Reference(builtin::type_type())));
        Ok(())
    }

    fn visit_constructor(&mut self, id: ExprRef, _type_name: &str, args: &[ExprRef]) -> GenResult {
        let member = self.cache(id).member();
        let Some(CachedMember::Constructor(entry)) = member.as_deref() else {
            return Err(NotCompilable::Unresolved(id));
        };
        if !entry.executor.is_compilable() {
            return Err(NotCompilable::Unresolved(id));
        }
        for arg in args {
            self.generate_node(*arg)?;
        }
        self.flow.pop_n(args.len());
        self.emit(Instruction::Construct {
            executor: entry.executor.clone(),
            argument_types: entry.argument_types.clone(),
            argc: args.len(),
            site: self.site(id),
        });
        self.flow.push(Flow::proven(ValueDescriptor::Reference(entry.type_handle.clone())));
        Ok(())
    }

    fn visit_array_constructor(
        &mut self,
        id: ExprRef,
        _type_name: &str,
        _dimensions: &[Option<ExprRef>],
        _initializer: Option<ExprRef>,
    ) -> GenResult {
        Err(Self::unsupported(id, "array construction"))
    }

    fn visit_inline_list(&mut self, id: ExprRef, elements: &[ExprRef], constant: bool) -> GenResult {
        if constant {
            let folded = self.cache(id).constant().cloned().ok_or(NotCompilable::Unresolved(id))?;
            self.emit(Instruction::PushConst(folded));
        } else {
            for element in elements {
                self.generate_node(*element)?;
            }
            self.flow.pop_n(elements.len());
            self.emit(Instruction::NewList(elements.len()));
        }
        self.flow.push(Flow::proven(ValueDescriptor::Reference(builtin::list())));
        Ok(())
    }

    fn visit_inline_map(&mut self, id: ExprRef, entries: &[(ExprRef, ExprRef)], constant: bool) -> GenResult {
        if constant {
            let folded = self.cache(id).constant().cloned().ok_or(NotCompilable::Unresolved(id))?;
            self.emit(Instruction::PushConst(folded));
        } else {
            for (key, value) in entries {
                self.generate_node(*key)?;
                self.generate_node(*value)?;
            }
            self.flow.pop_n(entries.len() * 2);
            self.emit(Instruction::NewMap(entries.len()));
        }
        self.flow.push(Flow::proven(ValueDescriptor::Reference(builtin::map())));
        Ok(())
    }
}
