use string_interner::DefaultSymbol;
use thiserror::Error;
use crate::ast::{Ast, Expr, ExprRef, Literal, Operator, SelectionKind, UnaryOp};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("dangling expression reference {0:?}")]
pub struct DanglingRef(pub ExprRef);

/// One callback per node kind. `walk_expr` does the dispatch so every
/// visitor is checked for exhaustiveness when a node kind is added.
pub trait AstVisitor {
    type Output;
    type Error: From<DanglingRef>;

    fn visit_literal(&mut self, id: ExprRef, literal: &Literal) -> Result<Self::Output, Self::Error>;
    fn visit_binary(&mut self, id: ExprRef, op: Operator, lhs: ExprRef, rhs: ExprRef) -> Result<Self::Output, Self::Error>;
    fn visit_unary(&mut self, id: ExprRef, op: UnaryOp, operand: ExprRef) -> Result<Self::Output, Self::Error>;
    fn visit_ternary(&mut self, id: ExprRef, cond: ExprRef, then: ExprRef, otherwise: ExprRef) -> Result<Self::Output, Self::Error>;
    fn visit_elvis(&mut self, id: ExprRef, lhs: ExprRef, rhs: ExprRef) -> Result<Self::Output, Self::Error>;
    fn visit_assign(&mut self, id: ExprRef, target: ExprRef, value: ExprRef) -> Result<Self::Output, Self::Error>;
    fn visit_compound(&mut self, id: ExprRef, parts: &[ExprRef]) -> Result<Self::Output, Self::Error>;
    fn visit_property(&mut self, id: ExprRef, name: DefaultSymbol, null_safe: bool) -> Result<Self::Output, Self::Error>;
    fn visit_method_call(&mut self, id: ExprRef, name: DefaultSymbol, args: &[ExprRef], null_safe: bool) -> Result<Self::Output, Self::Error>;
    fn visit_indexer(&mut self, id: ExprRef, index: ExprRef) -> Result<Self::Output, Self::Error>;
    fn visit_selection(&mut self, id: ExprRef, kind: SelectionKind, predicate: ExprRef, null_safe: bool) -> Result<Self::Output, Self::Error>;
    fn visit_projection(&mut self, id: ExprRef, expr: ExprRef, null_safe: bool) -> Result<Self::Output, Self::Error>;
    fn visit_variable(&mut self, id: ExprRef, name: DefaultSymbol) -> Result<Self::Output, Self::Error>;
    fn visit_function_call(&mut self, id: ExprRef, name: DefaultSymbol, args: &[ExprRef]) -> Result<Self::Output, Self::Error>;
    fn visit_bean_reference(&mut self, id: ExprRef, name: &str) -> Result<Self::Output, Self::Error>;
    fn visit_type_reference(&mut self, id: ExprRef, name: &str, dimensions: usize) -> Result<Self::Output, Self::Error>;
    fn visit_constructor(&mut self, id: ExprRef, type_name: &str, args: &[ExprRef]) -> Result<Self::Output, Self::Error>;
    fn visit_array_constructor(
        &mut self,
        id: ExprRef,
        type_name: &str,
        dimensions: &[Option<ExprRef>],
        initializer: Option<ExprRef>,
    ) -> Result<Self::Output, Self::Error>;
    fn visit_inline_list(&mut self, id: ExprRef, elements: &[ExprRef], constant: bool) -> Result<Self::Output, Self::Error>;
    fn visit_inline_map(&mut self, id: ExprRef, entries: &[(ExprRef, ExprRef)], constant: bool) -> Result<Self::Output, Self::Error>;
}

pub fn walk_expr<V: AstVisitor>(visitor: &mut V, ast: &Ast, id: ExprRef) -> Result<V::Output, V::Error> {
    let expr = ast.get(id).ok_or(DanglingRef(id))?;
    match expr {
        Expr::Literal(literal) => visitor.visit_literal(id, literal),
        Expr::Binary(op, lhs, rhs) => visitor.visit_binary(id, *op, *lhs, *rhs),
        Expr::Unary(op, operand) => visitor.visit_unary(id, *op, *operand),
        Expr::Ternary(cond, then, otherwise) => visitor.visit_ternary(id, *cond, *then, *otherwise),
        Expr::Elvis(lhs, rhs) => visitor.visit_elvis(id, *lhs, *rhs),
        Expr::Assign(target, value) => visitor.visit_assign(id, *target, *value),
        Expr::Compound(parts) => visitor.visit_compound(id, parts),
        Expr::Property { name, null_safe } => visitor.visit_property(id, *name, *null_safe),
        Expr::MethodCall { name, args, null_safe } => visitor.visit_method_call(id, *name, args, *null_safe),
        Expr::Indexer(index) => visitor.visit_indexer(id, *index),
        Expr::Selection { kind, predicate, null_safe } => visitor.visit_selection(id, *kind, *predicate, *null_safe),
        Expr::Projection { expr, null_safe } => visitor.visit_projection(id, *expr, *null_safe),
        Expr::Variable(name) => visitor.visit_variable(id, *name),
        Expr::FunctionCall { name, args } => visitor.visit_function_call(id, *name, args),
        Expr::BeanReference(name) => visitor.visit_bean_reference(id, name),
        Expr::TypeReference { name, dimensions } => visitor.visit_type_reference(id, name, *dimensions),
        Expr::Constructor { type_name, args } => visitor.visit_constructor(id, type_name, args),
        Expr::ArrayConstructor { type_name, dimensions, initializer } => {
            visitor.visit_array_constructor(id, type_name, dimensions, *initializer)
        }
        Expr::InlineList { elements, constant } => visitor.visit_inline_list(id, elements, *constant),
        Expr::InlineMap { entries, constant } => visitor.visit_inline_map(id, entries, *constant),
    }
}
