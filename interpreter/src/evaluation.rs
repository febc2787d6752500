use std::sync::Arc;
use string_interner::DefaultSymbol;
use frontend::ast::*;
use frontend::visitor::DanglingRef;
use indexmap::IndexMap;
use tracing::debug;
use crate::cache::{
    argument_types, same_argument_types, CachedMember, ConstructorEntry, FunctionEntry, MethodEntry, NodeCache, NodeCaches,
    PropertyEntry, TargetKey, TypeEntry,
};
use crate::conversion::to_boolean;
use crate::descriptor::ScalarKind;
use crate::environment::EvaluationContext;
use crate::error::{AccessError, ConversionError, EvaluationError, EvaluationErrorKind, EvaluationResult, MemberKind, OperatorError};
use crate::indexing::{read_index, write_index};
use crate::object::Value;
use crate::operators::{self, ArithmeticOp, ComparisonOp};
use crate::overload;
use crate::resolver::ResolvedProperty;
use crate::types::{array_of, builtin, TypeHandle};

/// Walks one parsed expression against one context.
///
/// `active` holds the object members are resolved against (`#this`); it
/// changes along a compound chain. `scope_roots` holds what method and
/// function arguments see; selection and projection push each element.
pub struct Interpreter<'a> {
    ast: &'a Ast,
    caches: &'a NodeCaches,
    context: &'a EvaluationContext,
    active: Vec<Value>,
    scope_roots: Vec<Value>,
    replay: Replay,
}

/// Results of calls and assignments that already ran once during this
/// evaluation. A node found here yields its recorded value instead of running
/// again.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Replay {
    completed: Vec<(ExprRef, Value)>,
}

impl Replay {
    pub fn record(&mut self, id: ExprRef, value: Value) {
        self.completed.push((id, value));
    }

    pub fn is_empty(&self) -> bool {
        self.completed.is_empty()
    }

    pub fn len(&self) -> usize {
        self.completed.len()
    }

    fn take(&mut self, id: ExprRef) -> Option<Value> {
        let at = self.completed.iter().position(|(recorded, _)| *recorded == id)?;
        Some(self.completed.swap_remove(at).1)
    }
}

enum Iterated {
    Sequence(Vec<Value>, Option<TypeHandle>),
    Entries(Vec<(Value, Value)>),
}

fn map_entry(key: Value, value: Value) -> Value {
    Value::object(&builtin::map_entry(), [("key", key), ("value", value)])
}

fn default_element(component: &TypeHandle) -> Value {
    match component.kind() {
        crate::types::TypeKind::Primitive(ScalarKind::Boolean) => Value::Bool(false),
        crate::types::TypeKind::Primitive(ScalarKind::Int) => Value::Int(0),
        crate::types::TypeKind::Primitive(ScalarKind::Long) => Value::Long(0),
        crate::types::TypeKind::Primitive(ScalarKind::Float) => Value::Float(0.0),
        crate::types::TypeKind::Primitive(ScalarKind::Double) => Value::Double(0.0),
        _ => Value::Null,
    }
}

impl<'a> Interpreter<'a> {
    pub fn new(ast: &'a Ast, caches: &'a NodeCaches, context: &'a EvaluationContext) -> Self {
        let root = context.root().clone();
        Interpreter { ast, caches, context, active: vec![root.clone()], scope_roots: vec![root], replay: Replay::default() }
    }

    pub fn with_replay(mut self, replay: Replay) -> Self {
        self.replay = replay;
        self
    }

    pub fn evaluate(&mut self) -> EvaluationResult<Value> {
        self.evaluate_expr(self.ast.root)
    }

    fn fail(&self, id: ExprRef, kind: impl Into<EvaluationErrorKind>) -> EvaluationError {
        kind.into().at(id, self.ast.node(id))
    }

    fn located<T, E: Into<EvaluationErrorKind>>(&self, id: ExprRef, result: Result<T, E>) -> EvaluationResult<T> {
        result.map_err(|e| self.fail(id, e))
    }

    fn source_of(&self, id: ExprRef) -> String {
        let span = self.ast.node(id);
        self.ast.source.get(span.start..span.end).unwrap_or_default().to_string()
    }

    fn cache(&self, id: ExprRef) -> &'a NodeCache {
        self.caches.node(id)
    }

    fn active(&self) -> Value {
        self.active.last().cloned().unwrap_or_default()
    }

    fn scope_root(&self) -> Value {
        self.scope_roots.last().cloned().unwrap_or_default()
    }

    fn expr(&self, id: ExprRef) -> EvaluationResult<&'a Expr> {
        self.ast.get(id).ok_or_else(|| self.fail(id, DanglingRef(id)))
    }

    /// Evaluate `id` with `object` as the active object.
    fn with_active(&mut self, object: Value, id: ExprRef) -> EvaluationResult<Value> {
        self.active.push(object);
        let result = self.evaluate_expr(id);
        self.active.pop();
        result
    }

    /// Evaluate `id` with `object` as both the active object and the scope root.
    fn with_scope(&mut self, object: Value, id: ExprRef) -> EvaluationResult<Value> {
        self.scope_roots.push(object.clone());
        let result = self.with_active(object, id);
        self.scope_roots.pop();
        result
    }

    /// Arguments see the scope root as `#this`.
    fn evaluate_arguments(&mut self, args: &[ExprRef]) -> EvaluationResult<Vec<Value>> {
        let scope_root = self.scope_root();
        args.iter().map(|arg| self.with_active(scope_root.clone(), *arg)).collect()
    }

    fn evaluate_condition(&mut self, id: ExprRef) -> EvaluationResult<bool> {
        let value = self.evaluate_expr(id)?;
        self.located(id, to_boolean(self.context.conversion_service(), value))
    }

    pub fn evaluate_expr(&mut self, id: ExprRef) -> EvaluationResult<Value> {
        if let Some(value) = self.replay.take(id) {
            return Ok(value);
        }
        let expr = self.expr(id)?;
        let value = match expr {
            Expr::Literal(literal) => Ok(self.cache(id).constant_or_init(|| Value::from(literal))),
            Expr::Binary(op, lhs, rhs) => self.evaluate_binary(id, *op, *lhs, *rhs),
            Expr::Unary(op, operand) => self.evaluate_unary(id, *op, *operand),
            Expr::Ternary(cond, then, otherwise) => {
                if self.evaluate_condition(*cond)? {
                    self.evaluate_expr(*then)
                } else {
                    self.evaluate_expr(*otherwise)
                }
            }
            Expr::Elvis(lhs, rhs) => {
                let value = self.evaluate_expr(*lhs)?;
                if value.is_absent() { self.evaluate_expr(*rhs) } else { Ok(value) }
            }
            Expr::Assign(target, value) => self.evaluate_assign(id, *target, *value),
            Expr::Compound(parts) => self.evaluate_compound(id, parts),
            Expr::Property { name, null_safe } => self.evaluate_property(id, *name, *null_safe),
            Expr::MethodCall { name, args, null_safe } => self.evaluate_method_call(id, *name, args, *null_safe),
            Expr::Indexer(index) => self.evaluate_indexer(id, *index),
            Expr::Selection { kind, predicate, null_safe } => self.evaluate_selection(id, *kind, *predicate, *null_safe),
            Expr::Projection { expr, null_safe } => self.evaluate_projection(id, *expr, *null_safe),
            Expr::Variable(name) => Ok(self.evaluate_variable(*name)),
            Expr::FunctionCall { name, args } => self.evaluate_function_call(id, *name, args),
            Expr::BeanReference(name) => self.located(id, self.context.bean(name)),
            Expr::TypeReference { name, dimensions } => self.evaluate_type_reference(id, name, *dimensions).map(Value::Type),
            Expr::Constructor { type_name, args } => self.evaluate_constructor(id, type_name, args),
            Expr::ArrayConstructor { type_name, dimensions, initializer } => {
                self.evaluate_array_constructor(id, type_name, dimensions, *initializer)
            }
            Expr::InlineList { elements, constant } => self.evaluate_inline_list(id, elements, *constant),
            Expr::InlineMap { entries, constant } => self.evaluate_inline_map(id, entries, *constant),
        }?;
        match expr {
            // Member nodes record their declared type themselves.
            Expr::Property { .. } | Expr::MethodCall { .. } | Expr::FunctionCall { .. } => {}
            Expr::Compound(parts) => {
                if let Some(exit) = parts.last().and_then(|last| self.cache(*last).exit()) {
                    self.cache(id).record_exit(exit);
                }
            }
            _ => self.cache(id).record_value(&value),
        }
        Ok(value)
    }

    fn evaluate_binary(&mut self, id: ExprRef, op: Operator, lhs: ExprRef, rhs: ExprRef) -> EvaluationResult<Value> {
        match op {
            Operator::LogicalAnd => {
                let result = self.evaluate_condition(lhs)? && self.evaluate_condition(rhs)?;
                return Ok(Value::Bool(result));
            }
            Operator::LogicalOr => {
                let result = self.evaluate_condition(lhs)? || self.evaluate_condition(rhs)?;
                return Ok(Value::Bool(result));
            }
            _ => {}
        }
        let l = self.evaluate_expr(lhs)?;
        let r = self.evaluate_expr(rhs)?;
        if let Some(arithmetic) = ArithmeticOp::from_operator(op) {
            return self.located(id, operators::arithmetic(arithmetic, &l, &r));
        }
        if let Some(comparison) = ComparisonOp::from_operator(op) {
            return self.located(id, operators::compare(comparison, &l, &r)).map(Value::Bool);
        }
        match op {
            Operator::Pow => self.located(id, operators::power(&l, &r)),
            Operator::Between => self.located(id, operators::between(&l, &r)).map(Value::Bool),
            Operator::InstanceOf => match &r {
                Value::Type(t) => Ok(Value::Bool(operators::instance_of(&l, t))),
                other => Err(self.fail(id, OperatorError::UnsupportedOperands {
                    operator: "instanceof",
                    left: l.type_name(),
                    right: other.type_name(),
                })),
            },
            Operator::Matches => self.evaluate_matches(id, &l, &r),
            _ => Err(self.fail(id, OperatorError::UnsupportedOperands {
                operator: op.symbol(),
                left: l.type_name(),
                right: r.type_name(),
            })),
        }
    }

    fn evaluate_matches(&mut self, id: ExprRef, value: &Value, pattern: &Value) -> EvaluationResult<Value> {
        let Value::String(source) = pattern else {
            return Err(self.fail(id, OperatorError::UnsupportedOperands {
                operator: "matches",
                left: value.type_name(),
                right: pattern.type_name(),
            }));
        };
        let cache = self.cache(id);
        let cached = match cache.member().as_deref() {
            Some(CachedMember::Pattern { source: cached, regex }) if **cached == **source => Some(regex.clone()),
            _ => None,
        };
        let regex = match cached {
            Some(regex) => regex,
            None => {
                let regex = self.located(id, operators::compile_pattern(source))?;
                cache.replace_member(CachedMember::Pattern { source: source.to_string(), regex: regex.clone() });
                regex
            }
        };
        self.located(id, operators::matches(value, &regex)).map(Value::Bool)
    }

    fn evaluate_unary(&mut self, id: ExprRef, op: UnaryOp, operand: ExprRef) -> EvaluationResult<Value> {
        if op == UnaryOp::Not {
            return Ok(Value::Bool(!self.evaluate_condition(operand)?));
        }
        let value = self.evaluate_expr(operand)?;
        self.located(id, operators::unary(op, &value))
    }

    fn evaluate_variable(&self, name: DefaultSymbol) -> Value {
        match self.ast.resolve(name) {
            "this" => self.active(),
            "root" => self.context.root().clone(),
            other => self.context.variable(other).unwrap_or_default(),
        }
    }

    fn evaluate_compound(&mut self, _id: ExprRef, parts: &[ExprRef]) -> EvaluationResult<Value> {
        let Some((head, rest)) = parts.split_first() else {
            return Ok(Value::Null);
        };
        let mut current = self.evaluate_expr(*head)?;
        for part in rest {
            current = self.with_active(current, *part)?;
        }
        Ok(current)
    }

    fn property_for(&self, id: ExprRef, target: &Value, name: &str, for_write: bool) -> EvaluationResult<Arc<dyn ResolvedProperty>> {
        let cache = self.cache(id);
        let fingerprint = self.context.fingerprint();
        if let Some(CachedMember::Property(entry)) = cache.member().as_deref() {
            if entry.for_write == for_write && entry.fingerprint == fingerprint && entry.target.matches(target) {
                return Ok(entry.accessor.clone());
            }
        }
        let accessor = if for_write {
            self.context.resolve_property_write(target, name)
        } else {
            self.context.resolve_property_read(target, name)
        };
        let accessor = self.located(id, accessor)?;
        debug!(property = name, target = %target.type_name(), "property cache replaced");
        cache.replace_member(CachedMember::Property(PropertyEntry {
            target: TargetKey::of(target),
            fingerprint,
            for_write,
            accessor: accessor.clone(),
        }));
        Ok(accessor)
    }

    fn evaluate_property(&mut self, id: ExprRef, name: DefaultSymbol, null_safe: bool) -> EvaluationResult<Value> {
        let target = self.active();
        let name = self.ast.resolve(name);
        if target.is_null() {
            return if null_safe {
                Ok(Value::Null)
            } else {
                Err(self.fail(id, AccessError::NullTarget { member_name: name.to_string() }))
            };
        }
        let accessor = self.property_for(id, &target, name, false)?;
        let value = self.located(id, accessor.read(&target))?;
        self.cache(id).record_declared(accessor.value_type(), &value);
        Ok(value)
    }

    fn evaluate_method_call(&mut self, id: ExprRef, name: DefaultSymbol, args: &[ExprRef], null_safe: bool) -> EvaluationResult<Value> {
        let target = self.active();
        let args = self.evaluate_arguments(args)?;
        let name = self.ast.resolve(name);
        if target.is_null() {
            return if null_safe {
                Ok(Value::Null)
            } else {
                Err(self.fail(id, AccessError::NullTarget { member_name: name.to_string() }))
            };
        }
        let cache = self.cache(id);
        let fingerprint = self.context.fingerprint();
        let cached = match cache.member().as_deref() {
            Some(CachedMember::Method(entry))
                if entry.fingerprint == fingerprint
                    && entry.target.matches(&target)
                    && same_argument_types(&entry.argument_types, &args) =>
            {
                Some(entry.executor.clone())
            }
            _ => None,
        };
        let executor = match cached {
            Some(executor) => executor,
            None => {
                let executor = self.located(id, self.context.resolve_method(&target, name, &args))?;
                debug!(method = name, target = %target.type_name(), "method cache replaced");
                cache.replace_member(CachedMember::Method(MethodEntry {
                    target: TargetKey::of(&target),
                    argument_types: argument_types(&args),
                    fingerprint,
                    executor: executor.clone(),
                }));
                executor
            }
        };
        let value = self.located(id, executor.execute(self.context, &target, args))?;
        cache.record_declared(executor.return_type(), &value);
        Ok(value)
    }

    fn evaluate_function_call(&mut self, id: ExprRef, name: DefaultSymbol, args: &[ExprRef]) -> EvaluationResult<Value> {
        let args = self.evaluate_arguments(args)?;
        let name = self.ast.resolve(name);
        let function = self
            .context
            .function(name)
            .ok_or_else(|| self.fail(id, AccessError::not_found("EvaluationContext", name, MemberKind::Function)))?;
        let cache = self.cache(id);
        let cached = match cache.member().as_deref() {
            Some(CachedMember::Function(entry))
                if Arc::ptr_eq(&entry.function, &function) && same_argument_types(&entry.argument_types, &args) =>
            {
                Some(entry.plan.clone())
            }
            _ => None,
        };
        let plan = match cached {
            Some(plan) => plan,
            None => {
                let signatures = [function.signature().clone()];
                let (_, plan) = self.located(
                    id,
                    overload::resolve(MemberKind::Function, name, &signatures, &args, self.context.conversion_service()),
                )?;
                debug!(function = name, "function cache replaced");
                cache.replace_member(CachedMember::Function(FunctionEntry {
                    function: function.clone(),
                    argument_types: argument_types(&args),
                    plan: plan.clone(),
                }));
                plan
            }
        };
        let args = self.located(id, plan.apply(self.context.conversion_service(), args))?;
        let value = self.located(id, function.invoke(&args))?;
        cache.record_declared(Some(function.return_type().clone()), &value);
        Ok(value)
    }

    /// Index expressions see the scope root as `#this`. A bare name indexing a
    /// map is the string key.
    fn index_value(&mut self, target: &Value, index: ExprRef) -> EvaluationResult<Value> {
        if let (Value::Map(_), Expr::Property { name, .. }) = (target, self.expr(index)?) {
            return Ok(Value::from(self.ast.resolve(*name)));
        }
        let scope_root = self.scope_root();
        self.with_active(scope_root, index)
    }

    fn evaluate_indexer(&mut self, id: ExprRef, index: ExprRef) -> EvaluationResult<Value> {
        let target = self.active();
        let key = self.index_value(&target, index)?;
        self.located(id, read_index(self.context, &target, &key))
    }

    fn iterate(&self, id: ExprRef, target: &Value, operation: &'static str) -> EvaluationResult<Iterated> {
        match target {
            Value::List(list) => Ok(Iterated::Sequence(list.snapshot(), None)),
            Value::Array(array) => Ok(Iterated::Sequence(array.snapshot(), Some(array.component.clone()))),
            Value::Map(map) => Ok(Iterated::Entries(map.snapshot())),
            other => Err(self.fail(id, AccessError::NotIterable { target_type: other.type_name(), operation })),
        }
    }

    fn select(&mut self, predicate: ExprRef, element: Value) -> EvaluationResult<bool> {
        match self.with_scope(element, predicate)? {
            Value::Bool(b) => Ok(b),
            other => Err(self.fail(
                predicate,
                ConversionError::failed(&other, "boolean", "selection criteria must evaluate to a boolean"),
            )),
        }
    }

    fn evaluate_selection(&mut self, id: ExprRef, kind: SelectionKind, predicate: ExprRef, null_safe: bool) -> EvaluationResult<Value> {
        let target = self.active();
        if target.is_null() {
            return if null_safe {
                Ok(Value::Null)
            } else {
                Err(self.fail(id, AccessError::NullTarget { member_name: "selection".to_string() }))
            };
        }
        match self.iterate(id, &target, "selection")? {
            Iterated::Sequence(items, component) => {
                let mut selected = Vec::new();
                for item in items {
                    if self.select(predicate, item.clone())? {
                        if kind == SelectionKind::First {
                            return Ok(item);
                        }
                        selected.push(item);
                    }
                }
                Ok(match kind {
                    SelectionKind::All => match component {
                        Some(component) => Value::array(component, selected),
                        None => Value::list(selected),
                    },
                    _ => selected.pop().unwrap_or_default(),
                })
            }
            Iterated::Entries(entries) => {
                let mut selected = IndexMap::new();
                for (key, value) in entries {
                    if self.select(predicate, map_entry(key.clone(), value.clone()))? {
                        if kind == SelectionKind::Last {
                            selected.clear();
                        }
                        selected.insert(key, value);
                        if kind == SelectionKind::First {
                            break;
                        }
                    }
                }
                if kind != SelectionKind::All && selected.is_empty() {
                    return Ok(Value::Null);
                }
                Ok(Value::map(selected))
            }
        }
    }

    fn evaluate_projection(&mut self, id: ExprRef, expr: ExprRef, null_safe: bool) -> EvaluationResult<Value> {
        let target = self.active();
        if target.is_null() {
            return if null_safe {
                Ok(Value::Null)
            } else {
                Err(self.fail(id, AccessError::NullTarget { member_name: "projection".to_string() }))
            };
        }
        let elements = match self.iterate(id, &target, "projection")? {
            Iterated::Sequence(items, _) => items,
            Iterated::Entries(entries) => entries.into_iter().map(|(k, v)| map_entry(k, v)).collect(),
        };
        let projected = elements
            .into_iter()
            .map(|element| self.with_scope(element, expr))
            .collect::<EvaluationResult<Vec<_>>>()?;
        Ok(Value::list(projected))
    }

    fn lookup_type(&self, id: ExprRef, name: &str, dimensions: usize) -> EvaluationResult<TypeHandle> {
        let mut found = self.located(id, self.context.find_type(name))?;
        for _ in 0..dimensions {
            found = array_of(&found);
        }
        Ok(found)
    }

    fn evaluate_type_reference(&mut self, id: ExprRef, name: &str, dimensions: usize) -> EvaluationResult<TypeHandle> {
        let cache = self.cache(id);
        let fingerprint = self.context.fingerprint();
        if let Some(CachedMember::Type(entry)) = cache.member().as_deref() {
            if entry.fingerprint == fingerprint {
                return Ok(entry.type_handle.clone());
            }
        }
        let type_handle = self.lookup_type(id, name, dimensions)?;
        cache.replace_member(CachedMember::Type(TypeEntry { fingerprint, type_handle: type_handle.clone() }));
        Ok(type_handle)
    }

    fn evaluate_constructor(&mut self, id: ExprRef, type_name: &str, args: &[ExprRef]) -> EvaluationResult<Value> {
        let args = args.iter().map(|arg| self.evaluate_expr(*arg)).collect::<EvaluationResult<Vec<_>>>()?;
        let cache = self.cache(id);
        let fingerprint = self.context.fingerprint();
        let cached = match cache.member().as_deref() {
            Some(CachedMember::Constructor(entry))
                if entry.fingerprint == fingerprint && same_argument_types(&entry.argument_types, &args) =>
            {
                Some(entry.executor.clone())
            }
            _ => None,
        };
        let executor = match cached {
            Some(executor) => executor,
            None => {
                let type_handle = self.lookup_type(id, type_name, 0)?;
                let executor = self.located(id, self.context.resolve_constructor(&type_handle, &args))?;
                debug!(constructor = type_name, "constructor cache replaced");
                cache.replace_member(CachedMember::Constructor(ConstructorEntry {
                    type_handle,
                    argument_types: argument_types(&args),
                    fingerprint,
                    executor: executor.clone(),
                }));
                executor
            }
        };
        self.located(id, executor.execute(self.context, args))
    }

    fn array_size(&mut self, dimension: ExprRef) -> EvaluationResult<usize> {
        let size = self.evaluate_expr(dimension)?;
        let converted = self.located(dimension, self.context.convert(size.clone(), &builtin::int()))?;
        match converted {
            Value::Int(n) if n >= 0 => Ok(n as usize),
            _ => Err(self.fail(dimension, ConversionError::failed(&size, "int", "array size must not be negative"))),
        }
    }

    fn evaluate_array_constructor(
        &mut self,
        id: ExprRef,
        type_name: &str,
        dimensions: &[Option<ExprRef>],
        initializer: Option<ExprRef>,
    ) -> EvaluationResult<Value> {
        let component = self.lookup_type(id, type_name, 0)?;
        let depth = dimensions.len().max(1);
        if let Some(initializer) = initializer {
            let element_type = (1..depth).fold(component, |t, _| array_of(&t));
            let elements = match self.expr(initializer)? {
                Expr::InlineList { elements, .. } => elements.clone(),
                _ => vec![initializer],
            };
            let mut items = Vec::with_capacity(elements.len());
            for element in elements {
                let value = self.evaluate_expr(element)?;
                items.push(self.located(element, self.context.convert(value, &element_type))?);
            }
            return Ok(Value::array(element_type, items));
        }
        let mut sizes = Vec::new();
        for dimension in dimensions.iter().map_while(|d| *d) {
            sizes.push(self.array_size(dimension)?);
        }
        // Element type of the innermost array that gets allocated.
        let unsized_dimensions = depth - sizes.len();
        let leaf = (0..unsized_dimensions).fold(component, |t, _| array_of(&t));
        Ok(allocate(&leaf, &sizes))
    }

    fn evaluate_inline_list(&mut self, id: ExprRef, elements: &[ExprRef], constant: bool) -> EvaluationResult<Value> {
        if let Some(folded) = self.cache(id).constant() {
            return Ok(folded.clone());
        }
        let items = elements.iter().map(|e| self.evaluate_expr(*e)).collect::<EvaluationResult<Vec<_>>>()?;
        if constant {
            Ok(self.cache(id).constant_or_init(|| Value::constant_list(items)))
        } else {
            Ok(Value::list(items))
        }
    }

    fn evaluate_inline_map(&mut self, id: ExprRef, entries: &[(ExprRef, ExprRef)], constant: bool) -> EvaluationResult<Value> {
        if let Some(folded) = self.cache(id).constant() {
            return Ok(folded.clone());
        }
        let mut map = IndexMap::with_capacity(entries.len());
        for (key, value) in entries {
            let key = self.evaluate_expr(*key)?;
            let value = self.evaluate_expr(*value)?;
            map.insert(key, value);
        }
        if constant {
            Ok(self.cache(id).constant_or_init(|| Value::constant_map(map)))
        } else {
            Ok(Value::map(map))
        }
    }

    fn evaluate_assign(&mut self, id: ExprRef, target: ExprRef, value: ExprRef) -> EvaluationResult<Value> {
        match self.expr(target)? {
            Expr::Variable(name) => {
                let name = self.ast.resolve(*name);
                if name == "this" || name == "root" {
                    return Err(self.fail(target, AccessError::NotAssignable(format!("#{name}"))));
                }
                let value = self.evaluate_expr(value)?;
                self.context.set_variable(name, value.clone());
                Ok(value)
            }
            Expr::Property { .. } | Expr::Indexer(_) => {
                let object = self.active();
                self.assign_to(target, object, value)
            }
            Expr::Compound(parts) => {
                let Some((last, head)) = parts.split_last() else {
                    return Err(self.fail(target, AccessError::NotAssignable("empty chain".to_string())));
                };
                let object = match head.split_first() {
                    Some((first, rest)) => {
                        let mut current = self.evaluate_expr(*first)?;
                        for part in rest {
                            current = self.with_active(current, *part)?;
                        }
                        current
                    }
                    None => self.active(),
                };
                self.assign_to(*last, object, value)
            }
            _ => Err(self.fail(id, AccessError::NotAssignable(self.source_of(target)))),
        }
    }

    /// Write the result of `value` into the property or index `part` of `object`.
    fn assign_to(&mut self, part: ExprRef, object: Value, value: ExprRef) -> EvaluationResult<Value> {
        match self.expr(part)? {
            Expr::Property { name, null_safe } => {
                let name = self.ast.resolve(*name);
                if object.is_null() {
                    if *null_safe {
                        return Ok(Value::Null);
                    }
                    return Err(self.fail(part, AccessError::NullTarget { member_name: name.to_string() }));
                }
                let property = self.property_for(part, &object, name, true)?;
                let new_value = self.evaluate_expr(value)?;
                let converted = match property.value_type() {
                    Some(t) => self.located(part, self.context.convert(new_value, &t))?,
                    None => new_value,
                };
                self.located(part, property.write(&object, converted.clone()))?;
                Ok(converted)
            }
            Expr::Indexer(index) => {
                let key = self.index_value(&object, *index)?;
                let new_value = self.evaluate_expr(value)?;
                self.located(part, write_index(self.context, &object, &key, new_value.clone()))?;
                Ok(new_value)
            }
            _ => Err(self.fail(part, AccessError::NotAssignable(self.source_of(part)))),
        }
    }
}

fn allocate(leaf: &TypeHandle, sizes: &[usize]) -> Value {
    match sizes.split_first() {
        None => Value::Null,
        Some((size, [])) => Value::array(leaf.clone(), vec![default_element(leaf); *size]),
        Some((size, rest)) => {
            let element_type = (0..rest.len()).fold(leaf.clone(), |t, _| array_of(&t));
            let items = (0..*size).map(|_| allocate(leaf, rest)).collect();
            Value::array(element_type, items)
        }
    }
}

/// Interpret `ast` against `context`, filling `caches` along the way.
pub fn evaluate(ast: &Ast, caches: &NodeCaches, context: &EvaluationContext) -> EvaluationResult<Value> {
    Interpreter::new(ast, caches, context).evaluate()
}

/// Interpret `ast` again after part of it already ran elsewhere; nodes in
/// `replay` are not run a second time.
pub fn resume(ast: &Ast, caches: &NodeCaches, context: &EvaluationContext, replay: Replay) -> EvaluationResult<Value> {
    Interpreter::new(ast, caches, context).with_replay(replay).evaluate()
}
