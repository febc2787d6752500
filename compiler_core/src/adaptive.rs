//! A parsed expression that switches itself from interpretation to compiled
//! bytecode once it has been evaluated often enough.
//!
//! State machine: `Interpreted -> CompilationAttempted -> Compiled`, with
//! `Compiled -> Decompiled -> Interpreted` when the compiled form no longer fits.
//! A compiled form is tied to the [`TypeShape`] it was generated under and is
//! only run against contexts with the same shape. Compilation is attempted at
//! most once per shape, and only one thread compiles at a time.
//!
//! A guard that fails mid-run hands the interpreter the results of the calls
//! and assignments the program already made, so none of them runs twice.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use compiler::{execute, generate, Flow, Program, VmExit};
use frontend::Ast;
use interpreter::descriptor::ValueDescriptor;
use interpreter::{EvaluationContext, EvaluationResult, NodeCaches, Replay, Value};
use parking_lot::{Mutex, RwLock};
use tracing::{debug, trace};
use crate::config::CompilerConfiguration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ExpressionState {
    Interpreted = 0,
    CompilationAttempted = 1,
    Compiled = 2,
    Decompiled = 3,
}

impl ExpressionState {
    fn from_u8(raw: u8) -> ExpressionState {
        match raw {
            1 => ExpressionState::CompilationAttempted,
            2 => ExpressionState::Compiled,
            3 => ExpressionState::Decompiled,
            _ => ExpressionState::Interpreted,
        }
    }
}

impl fmt::Display for ExpressionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ExpressionState::Interpreted => "interpreted",
            ExpressionState::CompilationAttempted => "compilation-attempted",
            ExpressionState::Compiled => "compiled",
            ExpressionState::Decompiled => "decompiled",
        })
    }
}

/// The runtime types a compiled form was generated for: the root's type, the
/// type of every variable the expression names, and the context fingerprint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeShape {
    root: u64,
    variables: Vec<u64>,
    fingerprint: u64,
}

impl TypeShape {
    pub fn of(variable_names: &[String], context: &EvaluationContext) -> TypeShape {
        TypeShape {
            root: context.root().type_handle().id(),
            variables: variable_names
                .iter()
                .map(|name| context.variable(name).unwrap_or_default().type_handle().id())
                .collect(),
            fingerprint: context.fingerprint(),
        }
    }
}

/// Counters since the expression was parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExpressionStats {
    pub interpreted: u64,
    pub compiled: u64,
    pub fallbacks: u64,
    pub compilations: u64,
    pub state: ExpressionState,
}

impl fmt::Display for ExpressionStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "state={} interpreted={} compiled={} fallbacks={} compilations={}",
            self.state, self.interpreted, self.compiled, self.fallbacks, self.compilations
        )
    }
}

#[derive(Debug)]
struct CompiledForm {
    program: Program,
    shape: TypeShape,
}

pub struct Expression {
    ast: Ast,
    caches: NodeCaches,
    variable_names: Vec<String>,
    configuration: CompilerConfiguration,
    state: AtomicU8,
    compiling: AtomicBool,
    compiled: RwLock<Option<Arc<CompiledForm>>>,
    attempted_shapes: Mutex<Vec<TypeShape>>,
    interpreted: AtomicU64,
    compiled_runs: AtomicU64,
    fallbacks: AtomicU64,
    compilations: AtomicU64,
}

impl fmt::Debug for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Expression")
            .field("source", &self.ast.source)
            .field("configuration", &self.configuration)
            .field("stats", &self.stats())
            .finish()
    }
}

impl Expression {
    pub fn new(ast: Ast, configuration: CompilerConfiguration) -> Self {
        let caches = NodeCaches::new(ast.len());
        let variable_names = ast.variable_names();
        Expression {
            ast,
            caches,
            variable_names,
            configuration,
            state: AtomicU8::new(ExpressionState::Interpreted as u8),
            compiling: AtomicBool::new(false),
            compiled: RwLock::new(None),
            attempted_shapes: Mutex::new(Vec::new()),
            interpreted: AtomicU64::new(0),
            compiled_runs: AtomicU64::new(0),
            fallbacks: AtomicU64::new(0),
            compilations: AtomicU64::new(0),
        }
    }

    pub fn source(&self) -> &str {
        &self.ast.source
    }

    pub fn ast(&self) -> &Ast {
        &self.ast
    }

    pub fn configuration(&self) -> CompilerConfiguration {
        self.configuration
    }

    pub fn to_canonical_string(&self) -> String {
        self.ast.to_canonical_string()
    }

    pub fn state(&self) -> ExpressionState {
        ExpressionState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn set_state(&self, state: ExpressionState) {
        self.state.store(state as u8, Ordering::Release);
    }

    pub fn stats(&self) -> ExpressionStats {
        ExpressionStats {
            interpreted: self.interpreted.load(Ordering::Relaxed),
            compiled: self.compiled_runs.load(Ordering::Relaxed),
            fallbacks: self.fallbacks.load(Ordering::Relaxed),
            compilations: self.compilations.load(Ordering::Relaxed),
            state: self.state(),
        }
    }

    /// The bytecode currently installed, if any.
    pub fn compiled_program(&self) -> Option<String> {
        self.compiled.read().as_ref().map(|form| form.program.to_string())
    }

    pub fn evaluate(&self, context: &EvaluationContext) -> EvaluationResult<Value> {
        let Some(threshold) = self.configuration.threshold() else {
            return self.interpret(context);
        };
        let installed = self.compiled.read().clone();
        let Some(form) = installed else {
            return self.interpret_then_compile(context, threshold, Replay::default());
        };
        let shape = TypeShape::of(&self.variable_names, context);
        if shape != form.shape {
            self.decompile(&form, "type shape changed");
            return self.interpret_then_compile(context, threshold, Replay::default());
        }
        match execute(&form.program, context) {
            Ok(value) => {
                self.compiled_runs.fetch_add(1, Ordering::Relaxed);
                Ok(value)
            }
            Err(VmExit::Error(error)) => {
                self.compiled_runs.fetch_add(1, Ordering::Relaxed);
                Err(error)
            }
            Err(VmExit::Fallback { reason, replay }) => {
                self.fallbacks.fetch_add(1, Ordering::Relaxed);
                self.decompile(&form, reason);
                self.interpret_then_compile(context, threshold, replay)
            }
        }
    }

    fn interpret(&self, context: &EvaluationContext) -> EvaluationResult<Value> {
        self.resume(context, Replay::default())
    }

    /// Interpret, reusing whatever a compiled run completed before it fell back.
    fn resume(&self, context: &EvaluationContext, replay: Replay) -> EvaluationResult<Value> {
        let value = interpreter::evaluation::resume(&self.ast, &self.caches, context, replay)?;
        self.interpreted.fetch_add(1, Ordering::Relaxed);
        Ok(value)
    }

    fn interpret_then_compile(&self, context: &EvaluationContext, threshold: u32, replay: Replay) -> EvaluationResult<Value> {
        let _ = self.state.compare_exchange(
            ExpressionState::Decompiled as u8,
            ExpressionState::Interpreted as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
        let value = self.resume(context, replay)?;
        if self.interpreted.load(Ordering::Relaxed) >= u64::from(threshold) {
            self.try_compile(context);
        }
        Ok(value)
    }

    /// Compile against the caches the last interpretation left behind. A
    /// failed attempt is only logged.
    fn try_compile(&self, context: &EvaluationContext) {
        let shape = TypeShape::of(&self.variable_names, context);
        if self.attempted_shapes.lock().contains(&shape) {
            return;
        }
        if self.compiling.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire).is_err() {
            trace!(expression = %self.ast.source, "compilation already in progress");
            return;
        }
        {
            let mut attempted = self.attempted_shapes.lock();
            if attempted.contains(&shape) {
                self.compiling.store(false, Ordering::Release);
                return;
            }
            attempted.push(shape.clone());
        }
        self.set_state(ExpressionState::CompilationAttempted);
        self.compilations.fetch_add(1, Ordering::Relaxed);
        self.caches.reset_compile_status();

        let root = Flow::observed(ValueDescriptor::of_value(context.root()));
        match generate(&self.ast, &self.caches, root) {
            Ok(program) => {
                debug!(expression = %self.ast.source, instructions = program.len(), "expression compiled");
                *self.compiled.write() = Some(Arc::new(CompiledForm { program, shape }));
                self.set_state(ExpressionState::Compiled);
            }
            Err(reason) => {
                debug!(expression = %self.ast.source, %reason, "compilation failed, staying interpreted");
                self.set_state(ExpressionState::Interpreted);
            }
        }
        self.compiling.store(false, Ordering::Release);
    }

    /// Drop `form` unless another thread already replaced it.
    fn decompile(&self, form: &Arc<CompiledForm>, reason: &str) {
        let mut slot = self.compiled.write();
        if slot.as_ref().is_some_and(|current| Arc::ptr_eq(current, form)) {
            *slot = None;
            self.caches.mark_stale();
            self.set_state(ExpressionState::Decompiled);
            debug!(expression = %self.ast.source, reason, "expression decompiled");
        }
    }
}
