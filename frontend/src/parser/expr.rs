use crate::ast::*;
use crate::token::Kind;
use super::core::Parser;
use crate::parser::error::{ParserError, ParserResult};

#[derive(Debug)]
pub struct OperatorGroup<'a> {
    pub tokens: Vec<(Kind, Operator)>,
    pub next_precedence: fn(&mut Parser<'a>) -> ParserResult<ExprRef>,
}

impl<'a> Parser<'a> {
    pub fn parse_expr_impl(&mut self) -> ParserResult<ExprRef> {
        self.check_and_increment_recursion()?;

        let result = self.parse_expr_impl_internal();

        self.decrement_recursion();
        result
    }

    // expr := logicalOr ( '=' expr | '?:' expr | '?' expr ':' expr )?
    fn parse_expr_impl_internal(&mut self) -> ParserResult<ExprRef> {
        let start = self.current_start();
        let lhs = parse_logical_or(self)?;

        match self.peek() {
            Some(Kind::Assign) => {
                self.next();
                let rhs = self.parse_expr_impl()?;
                let node = self.node_from(start);
                Ok(self.ast_builder.assign_expr(lhs, rhs, node))
            }
            Some(Kind::Elvis) => {
                self.next();
                let rhs = self.parse_expr_impl()?;
                let node = self.node_from(start);
                Ok(self.ast_builder.elvis_expr(lhs, rhs, node))
            }
            Some(Kind::Question) => {
                self.next();
                let then = self.parse_expr_impl()?;
                self.expect(&Kind::Colon)?;
                let otherwise = self.parse_expr_impl()?;
                let node = self.node_from(start);
                Ok(self.ast_builder.ternary_expr(lhs, then, otherwise, node))
            }
            _ => Ok(lhs),
        }
    }
}

pub fn parse_logical_or(parser: &mut Parser) -> ParserResult<ExprRef> {
    let group = OperatorGroup {
        tokens: vec![(Kind::DoubleOr, Operator::LogicalOr)],
        next_precedence: parse_logical_and,
    };
    parse_binary(parser, &group)
}

pub fn parse_logical_and(parser: &mut Parser) -> ParserResult<ExprRef> {
    let group = OperatorGroup {
        tokens: vec![(Kind::DoubleAnd, Operator::LogicalAnd)],
        next_precedence: parse_relational,
    };
    parse_binary(parser, &group)
}

pub fn parse_relational(parser: &mut Parser) -> ParserResult<ExprRef> {
    let group = OperatorGroup {
        tokens: vec![
            (Kind::DoubleEqual, Operator::Eq),
            (Kind::NotEqual, Operator::Ne),
            (Kind::LT, Operator::Lt),
            (Kind::LE, Operator::Le),
            (Kind::GT, Operator::Gt),
            (Kind::GE, Operator::Ge),
            (Kind::InstanceOf, Operator::InstanceOf),
            (Kind::Matches, Operator::Matches),
            (Kind::Between, Operator::Between),
        ],
        next_precedence: parse_additive,
    };
    parse_binary(parser, &group)
}

pub fn parse_additive(parser: &mut Parser) -> ParserResult<ExprRef> {
    let group = OperatorGroup {
        tokens: vec![(Kind::Plus, Operator::Add), (Kind::Minus, Operator::Sub)],
        next_precedence: parse_multiplicative,
    };
    parse_binary(parser, &group)
}

pub fn parse_multiplicative(parser: &mut Parser) -> ParserResult<ExprRef> {
    let group = OperatorGroup {
        tokens: vec![
            (Kind::Star, Operator::Mul),
            (Kind::Div, Operator::Div),
            (Kind::Mod, Operator::Mod),
        ],
        next_precedence: parse_unary,
    };
    parse_binary(parser, &group)
}

pub fn parse_binary<'a>(parser: &mut Parser<'a>, group: &OperatorGroup<'a>) -> ParserResult<ExprRef> {
    let start = parser.current_start();
    let mut lhs = (group.next_precedence)(parser)?;

    loop {
        let next_token = parser.peek();
        let matched_op = group.tokens.iter().find(|(kind, _)| next_token == Some(kind)).map(|(_, op)| *op);

        match matched_op {
            Some(op) => {
                parser.next();
                let rhs_start = parser.current_start();
                let rhs = (group.next_precedence)(parser)?;
                if op == Operator::InstanceOf
                    && !matches!(parser.ast_builder.get(rhs), Some(Expr::TypeReference { .. }))
                {
                    return Err(invalid_at(
                        parser,
                        rhs_start,
                        "right operand of instanceof must be a type reference T(...)",
                    ));
                }
                let node = parser.node_from(start);
                lhs = parser.ast_builder.binary_expr(op, lhs, rhs, node);
            }
            None => return Ok(lhs),
        }
    }
}

// unary := ('+'|'-'|'!') unary | power
pub fn parse_unary(parser: &mut Parser) -> ParserResult<ExprRef> {
    parser.check_and_increment_recursion()?;

    let result = parse_unary_impl(parser);

    parser.decrement_recursion();
    result
}

fn parse_unary_impl(parser: &mut Parser) -> ParserResult<ExprRef> {
    let start = parser.current_start();
    let op = match parser.peek() {
        Some(Kind::Not) => UnaryOp::Not,
        Some(Kind::Minus) => UnaryOp::Minus,
        Some(Kind::Plus) => UnaryOp::Plus,
        _ => return parse_power(parser),
    };
    parser.next();
    let operand = parse_unary(parser)?;
    let node = parser.node_from(start);
    Ok(parser.ast_builder.unary_expr(op, operand, node))
}

// power := primary ( '^' unary )?
pub fn parse_power(parser: &mut Parser) -> ParserResult<ExprRef> {
    let start = parser.current_start();
    let base = parse_primary(parser)?;
    if parser.peek() == Some(&Kind::Power) {
        parser.next();
        let exponent = parse_unary(parser)?;
        let node = parser.node_from(start);
        return Ok(parser.ast_builder.binary_expr(Operator::Pow, base, exponent, node));
    }
    Ok(base)
}

// primary := startNode node*
pub fn parse_primary(parser: &mut Parser) -> ParserResult<ExprRef> {
    parser.check_and_increment_recursion()?;

    let result = parse_primary_impl(parser);

    parser.decrement_recursion();
    result
}

fn parse_primary_impl(parser: &mut Parser) -> ParserResult<ExprRef> {
    let start = parser.current_start();
    let head = parse_start_node(parser)?;
    let mut parts = vec![head];

    loop {
        match parser.peek() {
            Some(Kind::Dot) | Some(Kind::SafeNavigation) => {
                let null_safe = parser.peek() == Some(&Kind::SafeNavigation);
                parser.next();
                let part = parse_dotted_node(parser, null_safe)?;
                parts.push(part);
            }
            Some(Kind::BracketOpen) => {
                let part = parse_indexer(parser)?;
                parts.push(part);
            }
            _ => break,
        }
    }

    if parts.len() == 1 {
        return Ok(head);
    }
    let node = parser.node_from(start);
    Ok(parser.ast_builder.compound_expr(parts, node))
}

fn parse_dotted_node(parser: &mut Parser, null_safe: bool) -> ParserResult<ExprRef> {
    match parser.peek() {
        Some(Kind::Identifier(_)) => parse_member(parser, null_safe),
        Some(Kind::Select) | Some(Kind::SelectFirst) | Some(Kind::SelectLast) => parse_selection(parser, null_safe),
        Some(Kind::Project) => parse_projection(parser, null_safe),
        _ => Err(parser.unexpected("property or method name")),
    }
}

/// `ident` or `ident(args)` applied to the active context object.
fn parse_member(parser: &mut Parser, null_safe: bool) -> ParserResult<ExprRef> {
    let start = parser.current_start();
    let name = match parser.peek() {
        Some(Kind::Identifier(s)) => s.to_string(),
        _ => return Err(parser.unexpected("identifier")),
    };
    parser.next();
    let name = parser.string_interner.get_or_intern(name);

    if parser.peek() == Some(&Kind::ParenOpen) {
        let args = parse_args(parser)?;
        let node = parser.node_from(start);
        Ok(parser.ast_builder.add(Expr::MethodCall { name, args, null_safe }, node))
    } else {
        let node = parser.node_from(start);
        Ok(parser.ast_builder.add(Expr::Property { name, null_safe }, node))
    }
}

fn parse_indexer(parser: &mut Parser) -> ParserResult<ExprRef> {
    let start = parser.current_start();
    parser.expect(&Kind::BracketOpen)?;
    let index = parser.parse_expr_impl()?;
    parser.expect(&Kind::BracketClose)?;
    let node = parser.node_from(start);
    Ok(parser.ast_builder.add(Expr::Indexer(index), node))
}

fn parse_selection(parser: &mut Parser, null_safe: bool) -> ParserResult<ExprRef> {
    let start = parser.current_start();
    let kind = match parser.peek() {
        Some(Kind::Select) => SelectionKind::All,
        Some(Kind::SelectFirst) => SelectionKind::First,
        Some(Kind::SelectLast) => SelectionKind::Last,
        _ => return Err(parser.unexpected("selection")),
    };
    parser.next();
    let predicate = parser.parse_expr_impl()?;
    parser.expect(&Kind::BracketClose)?;
    let node = parser.node_from(start);
    Ok(parser.ast_builder.add(Expr::Selection { kind, predicate, null_safe }, node))
}

fn parse_projection(parser: &mut Parser, null_safe: bool) -> ParserResult<ExprRef> {
    let start = parser.current_start();
    parser.expect(&Kind::Project)?;
    let expr = parser.parse_expr_impl()?;
    parser.expect(&Kind::BracketClose)?;
    let node = parser.node_from(start);
    Ok(parser.ast_builder.add(Expr::Projection { expr, null_safe }, node))
}

fn parse_start_node(parser: &mut Parser) -> ParserResult<ExprRef> {
    let start = parser.current_start();
    let literal = match parser.peek() {
        Some(Kind::Int(v)) => Some(Literal::Int(*v)),
        Some(Kind::Long(v)) => Some(Literal::Long(*v)),
        Some(Kind::Float(v)) => Some(Literal::Float(*v)),
        Some(Kind::Double(v)) => Some(Literal::Double(*v)),
        Some(Kind::String(s)) => Some(Literal::String(s.clone())),
        Some(Kind::True) => Some(Literal::Bool(true)),
        Some(Kind::False) => Some(Literal::Bool(false)),
        Some(Kind::Null) => Some(Literal::Null),
        _ => None,
    };
    if let Some(literal) = literal {
        parser.next();
        let node = parser.node_from(start);
        return Ok(parser.ast_builder.literal_expr(literal, node));
    }

    let is_type_reference = matches!(parser.peek(), Some(Kind::Identifier(s)) if s == "T")
        && parser.peek_n(1) == Some(&Kind::ParenOpen);
    match parser.peek() {
        Some(Kind::ParenOpen) => {
            parser.next();
            let e = parser.parse_expr_impl()?;
            parser.expect(&Kind::ParenClose)?;
            Ok(e)
        }
        Some(Kind::Identifier(_)) if is_type_reference => parse_type_reference(parser),
        Some(Kind::Identifier(_)) => parse_member(parser, false),
        Some(Kind::New) => parse_constructor(parser),
        Some(Kind::Hash) => parse_variable_or_function(parser),
        Some(Kind::At) => parse_bean_reference(parser),
        Some(Kind::BraceOpen) => parse_inline_collection(parser),
        Some(Kind::BracketOpen) => parse_indexer(parser),
        Some(Kind::Select) | Some(Kind::SelectFirst) | Some(Kind::SelectLast) => parse_selection(parser, false),
        Some(Kind::Project) => parse_projection(parser, false),
        _ => Err(parser.unexpected("expression")),
    }
}

// 'T(' qualifiedId ('[' ']')* ')'
fn parse_type_reference(parser: &mut Parser) -> ParserResult<ExprRef> {
    let start = parser.current_start();
    parser.next();
    parser.expect(&Kind::ParenOpen)?;
    let name = parse_qualified_id(parser)?;
    let mut dimensions = 0;
    while parser.peek() == Some(&Kind::BracketOpen) {
        parser.next();
        parser.expect(&Kind::BracketClose)?;
        dimensions += 1;
    }
    parser.expect(&Kind::ParenClose)?;
    let node = parser.node_from(start);
    Ok(parser.ast_builder.add(Expr::TypeReference { name, dimensions }, node))
}

fn parse_qualified_id(parser: &mut Parser) -> ParserResult<String> {
    let mut name = match parser.peek() {
        Some(Kind::Identifier(s)) => s.to_string(),
        _ => return Err(parser.unexpected("type name")),
    };
    parser.next();
    while parser.peek() == Some(&Kind::Dot) {
        parser.next();
        match parser.peek() {
            Some(Kind::Identifier(s)) => {
                name.push('.');
                name.push_str(s);
            }
            _ => return Err(parser.unexpected("identifier")),
        }
        parser.next();
    }
    Ok(name)
}

// ctor := qualifiedId '(' args ')' | qualifiedId ('[' expr? ']')+ inlineList?
fn parse_constructor(parser: &mut Parser) -> ParserResult<ExprRef> {
    let start = parser.current_start();
    parser.expect(&Kind::New)?;
    let type_name = parse_qualified_id(parser)?;

    if parser.peek() != Some(&Kind::BracketOpen) {
        let args = parse_args(parser)?;
        let node = parser.node_from(start);
        return Ok(parser.ast_builder.add(Expr::Constructor { type_name, args }, node));
    }

    let mut dimensions = Vec::new();
    while parser.peek() == Some(&Kind::BracketOpen) {
        let dim_start = parser.current_start();
        parser.next();
        let size = if parser.peek() == Some(&Kind::BracketClose) {
            None
        } else {
            Some(parser.parse_expr_impl()?)
        };
        parser.expect(&Kind::BracketClose)?;
        if size.is_some() && dimensions.last().is_some_and(|d: &Option<ExprRef>| d.is_none()) {
            return Err(invalid_at(parser, dim_start, "array dimension cannot follow an unspecified dimension"));
        }
        dimensions.push(size);
    }

    let initializer = if parser.peek() == Some(&Kind::BraceOpen) {
        let init_start = parser.current_start();
        let init = parse_inline_collection(parser)?;
        if !matches!(parser.ast_builder.get(init), Some(Expr::InlineList { .. })) {
            return Err(invalid_at(parser, init_start, "array initializer must be a list"));
        }
        if dimensions.iter().any(Option::is_some) {
            return Err(invalid_at(parser, init_start, "array dimensions must be empty when an initializer is given"));
        }
        Some(init)
    } else {
        if dimensions.first().is_some_and(Option::is_none) {
            return Err(invalid_at(parser, start, "array constructor requires a size or an initializer"));
        }
        None
    };

    let node = parser.node_from(start);
    Ok(parser.ast_builder.add(Expr::ArrayConstructor { type_name, dimensions, initializer }, node))
}

fn invalid_at(parser: &Parser, offset: usize, message: &str) -> ParserError {
    let location = super::error::SourceLocation::from_offset(parser.source(), offset);
    ParserError::invalid_syntax(location, message)
}

// '#' ident ( '(' args ')' )?
fn parse_variable_or_function(parser: &mut Parser) -> ParserResult<ExprRef> {
    let start = parser.current_start();
    parser.expect(&Kind::Hash)?;
    let name = match parser.peek() {
        Some(Kind::Identifier(s)) => s.to_string(),
        _ => return Err(parser.unexpected("variable name")),
    };
    parser.next();
    let name = parser.string_interner.get_or_intern(name);

    if parser.peek() == Some(&Kind::ParenOpen) {
        let args = parse_args(parser)?;
        let node = parser.node_from(start);
        return Ok(parser.ast_builder.add(Expr::FunctionCall { name, args }, node));
    }
    let node = parser.node_from(start);
    Ok(parser.ast_builder.add(Expr::Variable(name), node))
}

// '@' (ident|string)
fn parse_bean_reference(parser: &mut Parser) -> ParserResult<ExprRef> {
    let start = parser.current_start();
    parser.expect(&Kind::At)?;
    let name = match parser.peek() {
        Some(Kind::Identifier(s)) | Some(Kind::String(s)) => s.to_string(),
        _ => return Err(parser.unexpected("bean name")),
    };
    parser.next();
    let node = parser.node_from(start);
    Ok(parser.ast_builder.add(Expr::BeanReference(name), node))
}

/// `{}` is an empty list, `{:}` an empty map; otherwise the first `:`
/// decides between a list and a map.
fn parse_inline_collection(parser: &mut Parser) -> ParserResult<ExprRef> {
    let start = parser.current_start();
    parser.expect(&Kind::BraceOpen)?;

    if parser.peek() == Some(&Kind::BraceClose) {
        parser.next();
        let node = parser.node_from(start);
        return Ok(parser.ast_builder.inline_list_expr(vec![], node));
    }
    if parser.peek() == Some(&Kind::Colon) && parser.peek_n(1) == Some(&Kind::BraceClose) {
        parser.next();
        parser.next();
        let node = parser.node_from(start);
        return Ok(parser.ast_builder.inline_map_expr(vec![], node));
    }

    let first = parse_collection_item(parser)?;
    if parser.peek() == Some(&Kind::Colon) {
        parser.next();
        let value = parser.parse_expr_impl()?;
        let mut entries = vec![(first, value)];
        while parser.peek() == Some(&Kind::Comma) {
            parser.next();
            let key = parse_collection_item(parser)?;
            parser.expect(&Kind::Colon)?;
            let value = parser.parse_expr_impl()?;
            entries.push((key, value));
        }
        parser.expect(&Kind::BraceClose)?;
        let node = parser.node_from(start);
        return Ok(parser.ast_builder.inline_map_expr(entries, node));
    }

    let mut elements = vec![first];
    while parser.peek() == Some(&Kind::Comma) {
        parser.next();
        elements.push(parser.parse_expr_impl()?);
    }
    parser.expect(&Kind::BraceClose)?;
    let node = parser.node_from(start);
    Ok(parser.ast_builder.inline_list_expr(elements, node))
}

// A bare identifier directly followed by ':' is a string map key.
fn parse_collection_item(parser: &mut Parser) -> ParserResult<ExprRef> {
    if let Some(Kind::Identifier(s)) = parser.peek() {
        let key = s.clone();
        if parser.peek_n(1) == Some(&Kind::Colon) {
            let start = parser.current_start();
            parser.next();
            let node = parser.node_from(start);
            return Ok(parser.ast_builder.literal_expr(Literal::String(key), node));
        }
    }
    parser.parse_expr_impl()
}

pub fn parse_args(parser: &mut Parser) -> ParserResult<Vec<ExprRef>> {
    parser.expect(&Kind::ParenOpen)?;
    let mut args = vec![];
    if parser.peek() == Some(&Kind::ParenClose) {
        parser.next();
        return Ok(args);
    }
    loop {
        args.push(parser.parse_expr_impl()?);
        match parser.peek() {
            Some(Kind::Comma) => parser.next(),
            Some(Kind::ParenClose) => {
                parser.next();
                return Ok(args);
            }
            _ => return Err(parser.unexpected("',' or ')'")),
        }
    }
}
