pub mod cache;
pub mod conversion;
pub mod descriptor;
pub mod environment;
pub mod error;
pub mod error_formatter;
pub mod evaluation;
pub mod indexing;
pub mod object;
pub mod operators;
pub mod overload;
pub mod resolver;
pub mod type_locator;
pub mod types;

pub use cache::NodeCaches;
pub use environment::{ContextBuilder, EvaluationContext, Function};
pub use error::{EvaluationError, EvaluationErrorKind, EvaluationResult};
pub use evaluation::{Interpreter, Replay};
pub use object::Value;
pub use types::{builtin, TypeBuilder, TypeHandle};

use frontend::Ast;

/// Interpret `ast` once with fresh caches. Repeated evaluation should keep
/// one `NodeCaches` per parsed expression instead.
pub fn evaluate(ast: &Ast, context: &EvaluationContext) -> EvaluationResult<Value> {
    let caches = NodeCaches::new(ast.len());
    evaluation::evaluate(ast, &caches, context)
}
