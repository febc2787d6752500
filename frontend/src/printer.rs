use string_interner::DefaultSymbol;
use crate::ast::{Ast, Expr, ExprRef, Literal, Operator, SelectionKind, UnaryOp};
use crate::lexer::tokenize;
use crate::token::Kind;
use crate::visitor::{walk_expr, AstVisitor, DanglingRef};

/// Renders an AST back to source. Every operator application is
/// parenthesized, so printing a reparsed canonical string is a fixpoint.
pub struct CanonicalPrinter<'a> {
    ast: &'a Ast,
}

impl<'a> CanonicalPrinter<'a> {
    pub fn new(ast: &'a Ast) -> Self {
        CanonicalPrinter { ast }
    }

    pub fn print(&mut self) -> Result<String, DanglingRef> {
        self.print_expr(self.ast.root)
    }

    fn print_expr(&mut self, id: ExprRef) -> Result<String, DanglingRef> {
        walk_expr(self, self.ast, id)
    }

    fn print_list(&mut self, items: &[ExprRef]) -> Result<String, DanglingRef> {
        let printed = items.iter().map(|e| self.print_expr(*e)).collect::<Result<Vec<_>, _>>()?;
        Ok(printed.join(", "))
    }

    /// Accessor form used inside a chain, without the leading separator.
    fn print_accessor(&mut self, id: ExprRef) -> Result<(bool, String), DanglingRef> {
        let null_safe = match self.ast.get(id).ok_or(DanglingRef(id))? {
            Expr::Property { null_safe, .. }
            | Expr::MethodCall { null_safe, .. }
            | Expr::Selection { null_safe, .. }
            | Expr::Projection { null_safe, .. } => *null_safe,
            _ => false,
        };
        Ok((null_safe, self.print_expr(id)?))
    }

    fn name(&self, symbol: DefaultSymbol) -> &'a str {
        self.ast.resolve(symbol)
    }
}

pub fn quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

fn is_plain_identifier(name: &str) -> bool {
    matches!(tokenize(name).as_deref(), Ok([token]) if matches!(token.kind, Kind::Identifier(_)))
}

pub fn literal_to_source(literal: &Literal) -> String {
    match literal {
        Literal::Int(v) => v.to_string(),
        Literal::Long(v) => format!("{v}L"),
        Literal::Float(v) => format!("{v:?}f"),
        Literal::Double(v) => format!("{v:?}"),
        Literal::String(s) => quote(s),
        Literal::Bool(b) => b.to_string(),
        Literal::Null => "null".to_string(),
    }
}

impl AstVisitor for CanonicalPrinter<'_> {
    type Output = String;
    type Error = DanglingRef;

    fn visit_literal(&mut self, _id: ExprRef, literal: &Literal) -> Result<String, DanglingRef> {
        Ok(literal_to_source(literal))
    }

    fn visit_binary(&mut self, _id: ExprRef, op: Operator, lhs: ExprRef, rhs: ExprRef) -> Result<String, DanglingRef> {
        let lhs = self.print_expr(lhs)?;
        let rhs = self.print_expr(rhs)?;
        Ok(format!("({lhs} {} {rhs})", op.symbol()))
    }

    fn visit_unary(&mut self, _id: ExprRef, op: UnaryOp, operand: ExprRef) -> Result<String, DanglingRef> {
        let operand = self.print_expr(operand)?;
        Ok(format!("({}{operand})", op.symbol()))
    }

    fn visit_ternary(&mut self, _id: ExprRef, cond: ExprRef, then: ExprRef, otherwise: ExprRef) -> Result<String, DanglingRef> {
        let cond = self.print_expr(cond)?;
        let then = self.print_expr(then)?;
        let otherwise = self.print_expr(otherwise)?;
        Ok(format!("({cond} ? {then} : {otherwise})"))
    }

    fn visit_elvis(&mut self, _id: ExprRef, lhs: ExprRef, rhs: ExprRef) -> Result<String, DanglingRef> {
        let lhs = self.print_expr(lhs)?;
        let rhs = self.print_expr(rhs)?;
        Ok(format!("({lhs} ?: {rhs})"))
    }

    fn visit_assign(&mut self, _id: ExprRef, target: ExprRef, value: ExprRef) -> Result<String, DanglingRef> {
        let target = self.print_expr(target)?;
        let value = self.print_expr(value)?;
        Ok(format!("({target} = {value})"))
    }

    fn visit_compound(&mut self, _id: ExprRef, parts: &[ExprRef]) -> Result<String, DanglingRef> {
        let Some((head, rest)) = parts.split_first() else {
            return Ok(String::new());
        };
        let mut out = self.print_expr(*head)?;
        // A parenthesized chain used as the head of another chain.
        if matches!(self.ast.get(*head), Some(Expr::Compound(_))) {
            out = format!("({out})");
        }
        for part in rest {
            let (null_safe, text) = self.print_accessor(*part)?;
            if matches!(self.ast.get(*part), Some(Expr::Indexer(_))) {
                out.push_str(&text);
            } else {
                out.push_str(if null_safe { "?." } else { "." });
                out.push_str(&text);
            }
        }
        Ok(out)
    }

    fn visit_property(&mut self, _id: ExprRef, name: DefaultSymbol, _null_safe: bool) -> Result<String, DanglingRef> {
        Ok(self.name(name).to_string())
    }

    fn visit_method_call(&mut self, _id: ExprRef, name: DefaultSymbol, args: &[ExprRef], _null_safe: bool) -> Result<String, DanglingRef> {
        let args = self.print_list(args)?;
        Ok(format!("{}({args})", self.name(name)))
    }

    fn visit_indexer(&mut self, _id: ExprRef, index: ExprRef) -> Result<String, DanglingRef> {
        Ok(format!("[{}]", self.print_expr(index)?))
    }

    fn visit_selection(&mut self, _id: ExprRef, kind: SelectionKind, predicate: ExprRef, _null_safe: bool) -> Result<String, DanglingRef> {
        let open = match kind {
            SelectionKind::All => "?[",
            SelectionKind::First => "^[",
            SelectionKind::Last => "$[",
        };
        Ok(format!("{open}{}]", self.print_expr(predicate)?))
    }

    fn visit_projection(&mut self, _id: ExprRef, expr: ExprRef, _null_safe: bool) -> Result<String, DanglingRef> {
        Ok(format!("![{}]", self.print_expr(expr)?))
    }

    fn visit_variable(&mut self, _id: ExprRef, name: DefaultSymbol) -> Result<String, DanglingRef> {
        Ok(format!("#{}", self.name(name)))
    }

    fn visit_function_call(&mut self, _id: ExprRef, name: DefaultSymbol, args: &[ExprRef]) -> Result<String, DanglingRef> {
        let args = self.print_list(args)?;
        Ok(format!("#{}({args})", self.name(name)))
    }

    fn visit_bean_reference(&mut self, _id: ExprRef, name: &str) -> Result<String, DanglingRef> {
        if is_plain_identifier(name) {
            Ok(format!("@{name}"))
        } else {
            Ok(format!("@{}", quote(name)))
        }
    }

    fn visit_type_reference(&mut self, _id: ExprRef, name: &str, dimensions: usize) -> Result<String, DanglingRef> {
        Ok(format!("T({name}{})", "[]".repeat(dimensions)))
    }

    fn visit_constructor(&mut self, _id: ExprRef, type_name: &str, args: &[ExprRef]) -> Result<String, DanglingRef> {
        let args = self.print_list(args)?;
        Ok(format!("new {type_name}({args})"))
    }

    fn visit_array_constructor(
        &mut self,
        _id: ExprRef,
        type_name: &str,
        dimensions: &[Option<ExprRef>],
        initializer: Option<ExprRef>,
    ) -> Result<String, DanglingRef> {
        let mut out = format!("new {type_name}");
        for dim in dimensions {
            match dim {
                Some(size) => out.push_str(&format!("[{}]", self.print_expr(*size)?)),
                None => out.push_str("[]"),
            }
        }
        if let Some(init) = initializer {
            out.push_str(&self.print_expr(init)?);
        }
        Ok(out)
    }

    fn visit_inline_list(&mut self, _id: ExprRef, elements: &[ExprRef], _constant: bool) -> Result<String, DanglingRef> {
        Ok(format!("{{{}}}", self.print_list(elements)?))
    }

    fn visit_inline_map(&mut self, _id: ExprRef, entries: &[(ExprRef, ExprRef)], _constant: bool) -> Result<String, DanglingRef> {
        if entries.is_empty() {
            return Ok("{:}".to_string());
        }
        let mut printed = Vec::with_capacity(entries.len());
        for (key, value) in entries {
            // a bare identifier before ':' would reparse as a string key
            let key_text = match self.ast.get(*key).ok_or(DanglingRef(*key))? {
                Expr::Literal(_) => self.print_expr(*key)?,
                _ => format!("({})", self.print_expr(*key)?),
            };
            printed.push(format!("{key_text}: {}", self.print_expr(*value)?));
        }
        Ok(format!("{{{}}}", printed.join(", ")))
    }
}
