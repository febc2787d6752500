//! Compile-time bookkeeping of what each generated fragment leaves on the
//! operand stack.
//!
//! Descriptors come from what the interpreter observed, which says what a node
//! produced so far but not what it will produce next time. A `Flow` is only
//! `proven` when the generated code itself guarantees the shape (a literal, or
//! the result of a typed instruction); everything else gets a guard before a
//! typed instruction consumes it.

use interpreter::descriptor::{ScalarKind, ValueDescriptor};
use interpreter::types::{builtin, TypeKind};
use crate::bytecode::Instruction;

#[derive(Debug, Clone, PartialEq)]
pub struct Flow {
    pub descriptor: ValueDescriptor,
    pub proven: bool,
    pub null_literal: bool,
}

impl Flow {
    pub fn observed(descriptor: Option<ValueDescriptor>) -> Flow {
        Flow { descriptor: descriptor.unwrap_or(ValueDescriptor::Dynamic), proven: false, null_literal: false }
    }

    pub fn proven(descriptor: ValueDescriptor) -> Flow {
        Flow { descriptor, proven: true, null_literal: false }
    }

    pub fn null() -> Flow {
        Flow { descriptor: ValueDescriptor::Dynamic, proven: true, null_literal: true }
    }

    pub fn scalar(kind: ScalarKind) -> Flow {
        Flow::proven(ValueDescriptor::Scalar(kind))
    }

    pub fn string() -> Flow {
        Flow::observed(Some(ValueDescriptor::Reference(builtin::string())))
    }

    /// Scalar kind this flow can be consumed as, directly or by unboxing.
    pub fn numeric_kind(&self) -> Option<ScalarKind> {
        self.descriptor.numeric_kind().filter(|k| k.is_numeric())
    }

    pub fn is_string(&self) -> bool {
        self.descriptor.is_reference_to(TypeKind::String)
    }

    pub fn is_boolean(&self) -> bool {
        self.descriptor.numeric_kind() == Some(ScalarKind::Boolean)
    }

    /// Neither numeric nor unknown; equality on it never involves promotion.
    pub fn is_plain_reference(&self) -> bool {
        self.null_literal
            || matches!(&self.descriptor, ValueDescriptor::Reference(t) if !matches!(t.kind(), TypeKind::Boxed(_) | TypeKind::Number))
            || self.descriptor == ValueDescriptor::Scalar(ScalarKind::Boolean)
    }

    /// The flow a conditional produces when either branch may run.
    pub fn join(&self, other: &Flow) -> Flow {
        if self.descriptor == other.descriptor {
            Flow {
                descriptor: self.descriptor.clone(),
                proven: self.proven && other.proven,
                null_literal: self.null_literal && other.null_literal,
            }
        } else {
            Flow::observed(None)
        }
    }
}

/// Instructions that make `flow` consumable as an unboxed `kind`, or `None`
/// when it cannot be.
pub fn coerce_to_scalar(flow: &Flow, kind: ScalarKind) -> Option<Vec<Instruction>> {
    match &flow.descriptor {
        ValueDescriptor::Scalar(k) if *k == kind && flow.proven => Some(Vec::new()),
        ValueDescriptor::Scalar(k) if *k == kind => Some(vec![Instruction::Unbox(kind)]),
        _ if flow.descriptor.boxed_kind() == Some(kind) => Some(vec![Instruction::Unbox(kind)]),
        _ => None,
    }
}

/// The single numeric kind two operands share. Mixed kinds are refused here
/// even though the interpreter widens them.
pub fn common_numeric_kind(l: &Flow, r: &Flow) -> Option<ScalarKind> {
    match (l.numeric_kind(), r.numeric_kind()) {
        (Some(a), Some(b)) if a == b => Some(a),
        _ => None,
    }
}

/// Operand-stack depth and the shapes on it, mirrored while generating code.
#[derive(Debug, Default)]
pub struct TypeFlow {
    stack: Vec<Flow>,
    active: Vec<Flow>,
    max_depth: usize,
}

impl TypeFlow {
    pub fn new(root: Flow) -> Self {
        TypeFlow { stack: Vec::new(), active: vec![root], max_depth: 0 }
    }

    pub fn push(&mut self, flow: Flow) {
        self.stack.push(flow);
        self.max_depth = self.max_depth.max(self.stack.len());
    }

    pub fn pop(&mut self) -> Flow {
        self.stack.pop().unwrap_or_else(|| Flow::observed(None))
    }

    pub fn pop_n(&mut self, n: usize) -> Vec<Flow> {
        let at = self.stack.len().saturating_sub(n);
        self.stack.split_off(at)
    }

    pub fn peek(&self) -> Option<&Flow> {
        self.stack.last()
    }

    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    /// Pop the top flow and make it the active object.
    pub fn enter_active(&mut self) {
        let flow = self.pop();
        self.active.push(flow);
    }

    pub fn enter_root(&mut self) {
        let root = self.active.first().cloned().unwrap_or_else(|| Flow::observed(None));
        self.active.push(root);
    }

    pub fn exit_active(&mut self) {
        self.active.pop();
    }

    pub fn active(&self) -> Flow {
        self.active.last().cloned().unwrap_or_else(|| Flow::observed(None))
    }

    pub fn root(&self) -> Flow {
        self.active.first().cloned().unwrap_or_else(|| Flow::observed(None))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn proven_scalars_need_no_guard() {
        assert_eq!(coerce_to_scalar(&Flow::scalar(ScalarKind::Int), ScalarKind::Int).map(|c| c.len()), Some(0));
        let observed = Flow::observed(Some(ValueDescriptor::Scalar(ScalarKind::Int)));
        assert!(matches!(coerce_to_scalar(&observed, ScalarKind::Int).as_deref(), Some([Instruction::Unbox(ScalarKind::Int)])));
        assert!(coerce_to_scalar(&observed, ScalarKind::Long).is_none());
    }

    #[test]
    fn boxed_references_unbox() {
        let boxed = Flow::observed(Some(ValueDescriptor::Reference(builtin::integer())));
        assert!(matches!(coerce_to_scalar(&boxed, ScalarKind::Int).as_deref(), Some([Instruction::Unbox(ScalarKind::Int)])));
        assert!(coerce_to_scalar(&Flow::string(), ScalarKind::Int).is_none());
        assert!(coerce_to_scalar(&Flow::observed(None), ScalarKind::Int).is_none());
    }

    #[test]
    fn mixed_kinds_have_no_common_kind() {
        let int = Flow::scalar(ScalarKind::Int);
        let double = Flow::scalar(ScalarKind::Double);
        assert_eq!(common_numeric_kind(&int, &int), Some(ScalarKind::Int));
        assert_eq!(common_numeric_kind(&int, &double), None);
        assert_eq!(common_numeric_kind(&Flow::scalar(ScalarKind::Boolean), &Flow::scalar(ScalarKind::Boolean)), None);
    }

    #[test]
    fn joins_keep_agreeing_shapes() {
        let a = Flow::scalar(ScalarKind::Int);
        let b = Flow::observed(Some(ValueDescriptor::Scalar(ScalarKind::Int)));
        let joined = a.join(&b);
        assert_eq!(joined.descriptor, ValueDescriptor::Scalar(ScalarKind::Int));
        assert!(!joined.proven);
        assert!(a.join(&Flow::string()).descriptor.is_dynamic());
    }

    #[test]
    fn stack_depth_is_tracked() {
        let mut flow = TypeFlow::new(Flow::observed(None));
        flow.push(Flow::scalar(ScalarKind::Int));
        flow.push(Flow::scalar(ScalarKind::Int));
        flow.pop_n(2);
        flow.push(Flow::string());
        assert_eq!(flow.depth(), 1);
        assert_eq!(flow.max_depth(), 2);
        flow.enter_active();
        assert!(flow.active().is_string());
        flow.exit_active();
        assert!(flow.active().descriptor.is_dynamic());
    }
}
