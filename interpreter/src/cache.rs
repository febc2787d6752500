//! Per-node caches shared by every evaluation of one parsed expression.
//!
//! Cache cells hold an immutable entry behind an `Arc` and are only ever
//! swapped wholesale, so concurrent readers see either the old entry or the
//! new one.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, OnceLock};
use frontend::ast::ExprRef;
use parking_lot::{RwLock, RwLockUpgradableReadGuard};
use regex::Regex;
use crate::descriptor::ValueDescriptor;
use crate::environment::Function;
use crate::object::Value;
use crate::overload::ArgumentPlan;
use crate::resolver::{ConstructorExecutor, MethodExecutor, ResolvedProperty};
use crate::types::{builtin, TypeHandle};

pub struct CacheCell<T> {
    slot: RwLock<Option<Arc<T>>>,
}

impl<T> Default for CacheCell<T> {
    fn default() -> Self {
        CacheCell { slot: RwLock::new(None) }
    }
}

impl<T> CacheCell<T> {
    pub fn get(&self) -> Option<Arc<T>> {
        self.slot.read().clone()
    }

    pub fn replace(&self, entry: T) -> Arc<T> {
        let entry = Arc::new(entry);
        *self.slot.write() = Some(entry.clone());
        entry
    }

    pub fn clear(&self) {
        *self.slot.write() = None;
    }
}

/// The type a member was resolved against. A type reference target resolves
/// static members, so it is keyed by the referenced type, not by `Type`.
#[derive(Debug, Clone)]
pub struct TargetKey {
    pub type_handle: TypeHandle,
    pub is_static: bool,
}

impl TargetKey {
    pub fn of(value: &Value) -> TargetKey {
        match value {
            Value::Type(t) => TargetKey { type_handle: t.clone(), is_static: true },
            other => TargetKey { type_handle: other.type_handle(), is_static: false },
        }
    }

    pub fn matches(&self, value: &Value) -> bool {
        match value {
            Value::Type(t) => self.is_static && Arc::ptr_eq(&self.type_handle, t),
            other => !self.is_static && Arc::ptr_eq(&self.type_handle, &other.type_handle()),
        }
    }
}

pub fn argument_types(args: &[Value]) -> Vec<TypeHandle> {
    args.iter().map(Value::type_handle).collect()
}

pub fn same_argument_types(types: &[TypeHandle], args: &[Value]) -> bool {
    types.len() == args.len() && types.iter().zip(args).all(|(t, a)| Arc::ptr_eq(t, &a.type_handle()))
}

#[derive(Debug)]
pub struct PropertyEntry {
    pub target: TargetKey,
    pub fingerprint: u64,
    pub for_write: bool,
    pub accessor: Arc<dyn ResolvedProperty>,
}

#[derive(Debug)]
pub struct MethodEntry {
    pub target: TargetKey,
    pub argument_types: Vec<TypeHandle>,
    pub fingerprint: u64,
    pub executor: Arc<dyn MethodExecutor>,
}

#[derive(Debug)]
pub struct FunctionEntry {
    pub function: Arc<Function>,
    pub argument_types: Vec<TypeHandle>,
    pub plan: ArgumentPlan,
}

#[derive(Debug)]
pub struct ConstructorEntry {
    pub type_handle: TypeHandle,
    pub argument_types: Vec<TypeHandle>,
    pub fingerprint: u64,
    pub executor: Arc<dyn ConstructorExecutor>,
}

#[derive(Debug)]
pub struct TypeEntry {
    pub fingerprint: u64,
    pub type_handle: TypeHandle,
}

/// What a node resolved on its last evaluation.
#[derive(Debug)]
pub enum CachedMember {
    Property(PropertyEntry),
    Method(MethodEntry),
    Function(FunctionEntry),
    Constructor(ConstructorEntry),
    Type(TypeEntry),
    Pattern { source: String, regex: Regex },
}

impl CachedMember {
    /// True when the entry was resolved against a fixed target and member,
    /// so compiled code may call it directly.
    pub fn is_compilable(&self) -> bool {
        match self {
            CachedMember::Property(entry) => !entry.for_write && entry.accessor.is_compilable(),
            CachedMember::Method(entry) => entry.executor.is_compilable(),
            CachedMember::Function(_) | CachedMember::Type(_) => true,
            CachedMember::Constructor(entry) => entry.executor.is_compilable(),
            CachedMember::Pattern { .. } => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CompileStatus {
    Unknown = 0,
    Compilable = 1,
    NotCompilable = 2,
    /// Was part of a compiled form that has since been discarded.
    Stale = 3,
}

impl CompileStatus {
    fn from_u8(raw: u8) -> CompileStatus {
        match raw {
            1 => CompileStatus::Compilable,
            2 => CompileStatus::NotCompilable,
            3 => CompileStatus::Stale,
            _ => CompileStatus::Unknown,
        }
    }
}

#[derive(Default)]
pub struct NodeCache {
    member: CacheCell<CachedMember>,
    exit: RwLock<Option<ValueDescriptor>>,
    constant: OnceLock<Value>,
    status: AtomicU8,
}

impl NodeCache {
    pub fn member(&self) -> Option<Arc<CachedMember>> {
        self.member.get()
    }

    pub fn replace_member(&self, entry: CachedMember) -> Arc<CachedMember> {
        self.member.replace(entry)
    }

    pub fn clear_member(&self) {
        self.member.clear();
    }

    /// Descriptor of what this node produced so far; `None` before the first
    /// non-null result.
    pub fn exit(&self) -> Option<ValueDescriptor> {
        self.exit.read().clone()
    }

    /// Read, merge and store happen under one upgradable lock, so racing
    /// recorders cannot drop each other's observations.
    pub fn record_exit(&self, observed: ValueDescriptor) {
        let current = self.exit.upgradable_read();
        let merged = match current.as_ref() {
            Some(previous) if *previous == observed => return,
            Some(previous) => previous.merge(&observed),
            None => observed,
        };
        *RwLockUpgradableReadGuard::upgrade(current) = Some(merged);
    }

    pub fn record_value(&self, value: &Value) {
        if let Some(observed) = ValueDescriptor::of_value(value) {
            self.record_exit(observed);
        }
    }

    /// Members with a declared type report it, unless it says no more than
    /// `Object`/`Number`, in which case the observed value is more useful.
    pub fn record_declared(&self, declared: Option<TypeHandle>, value: &Value) {
        match declared {
            Some(t) if !is_vague(&t) => self.record_exit(ValueDescriptor::of_declared(&t)),
            _ => self.record_value(value),
        }
    }

    pub fn constant(&self) -> Option<&Value> {
        self.constant.get()
    }

    pub fn constant_or_init(&self, init: impl FnOnce() -> Value) -> Value {
        self.constant.get_or_init(init).clone()
    }

    pub fn compile_status(&self) -> CompileStatus {
        CompileStatus::from_u8(self.status.load(Ordering::Acquire))
    }

    pub fn set_compile_status(&self, status: CompileStatus) {
        self.status.store(status as u8, Ordering::Release);
    }
}

fn is_vague(declared: &TypeHandle) -> bool {
    Arc::ptr_eq(declared, &builtin::object()) || Arc::ptr_eq(declared, &builtin::number())
}

/// One cache per node of a parsed expression, indexed by `ExprRef`.
pub struct NodeCaches {
    nodes: Vec<NodeCache>,
}

impl NodeCaches {
    pub fn new(len: usize) -> Self {
        NodeCaches { nodes: (0..len).map(|_| NodeCache::default()).collect() }
    }

    pub fn node(&self, id: ExprRef) -> &NodeCache {
        &self.nodes[id.to_index()]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn reset_compile_status(&self) {
        self.nodes.iter().for_each(|n| n.set_compile_status(CompileStatus::Unknown));
    }

    /// Nodes that were compiled into a form which has been dropped.
    pub fn mark_stale(&self) {
        self.nodes
            .iter()
            .filter(|n| n.compile_status() == CompileStatus::Compilable)
            .for_each(|n| n.set_compile_status(CompileStatus::Stale));
    }
}
