use string_interner::{DefaultStringInterner, DefaultSymbol};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ExprRef(pub u32);

impl ExprRef {
    pub fn to_index(self) -> usize {
        self.0 as usize
    }
}

/// Arena of parsed nodes. Children are referenced by `ExprRef` and never
/// change once the parser has handed the pool over.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExprPool {
    exprs: Vec<Expr>,
    nodes: Vec<Node>,
}

impl ExprPool {
    pub fn with_capacity(capacity: usize) -> Self {
        ExprPool {
            exprs: Vec::with_capacity(capacity),
            nodes: Vec::with_capacity(capacity),
        }
    }

    pub fn add(&mut self, expr: Expr, node: Node) -> ExprRef {
        let index = self.exprs.len() as u32;
        self.exprs.push(expr);
        self.nodes.push(node);
        ExprRef(index)
    }

    pub fn get(&self, r: ExprRef) -> Option<&Expr> {
        self.exprs.get(r.to_index())
    }

    pub fn node(&self, r: ExprRef) -> Option<&Node> {
        self.nodes.get(r.to_index())
    }

    pub fn len(&self) -> usize {
        self.exprs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.exprs.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (ExprRef, &Expr)> {
        self.exprs.iter().enumerate().map(|(i, e)| (ExprRef(i as u32), e))
    }
}

/// Byte span of a node in the expression source.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Default)]
pub struct Node {
    pub start: usize,
    pub end: usize,
}

impl Node {
    pub fn new(start: usize, end: usize) -> Self {
        Node { start, end }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    String(String),
    Bool(bool),
    Null,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SelectionKind {
    All,
    First,
    Last,
}

#[derive(Debug, PartialEq, Clone)]
pub enum Expr {
    Literal(Literal),
    Binary(Operator, ExprRef, ExprRef),
    Unary(UnaryOp, ExprRef),
    Ternary(ExprRef, ExprRef, ExprRef),
    Elvis(ExprRef, ExprRef),
    Assign(ExprRef, ExprRef),
    /// Chain of accessors applied left to right; the first element is the start node.
    Compound(Vec<ExprRef>),
    Property { name: DefaultSymbol, null_safe: bool },
    MethodCall { name: DefaultSymbol, args: Vec<ExprRef>, null_safe: bool },
    Indexer(ExprRef),
    Selection { kind: SelectionKind, predicate: ExprRef, null_safe: bool },
    Projection { expr: ExprRef, null_safe: bool },
    Variable(DefaultSymbol),
    FunctionCall { name: DefaultSymbol, args: Vec<ExprRef> },
    BeanReference(String),
    TypeReference { name: String, dimensions: usize },
    Constructor { type_name: String, args: Vec<ExprRef> },
    ArrayConstructor {
        type_name: String,
        dimensions: Vec<Option<ExprRef>>,
        initializer: Option<ExprRef>,
    },
    InlineList { elements: Vec<ExprRef>, constant: bool },
    InlineMap { entries: Vec<(ExprRef, ExprRef)>, constant: bool },
}

impl Expr {
    pub fn is_constant_collection(&self) -> bool {
        matches!(
            self,
            Expr::InlineList { constant: true, .. } | Expr::InlineMap { constant: true, .. }
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Pow,

    // Comparison operator
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,

    LogicalAnd,
    LogicalOr,

    InstanceOf,
    Matches,
    Between,
}

impl Operator {
    pub fn symbol(&self) -> &'static str {
        match self {
            Operator::Add => "+",
            Operator::Sub => "-",
            Operator::Mul => "*",
            Operator::Div => "/",
            Operator::Mod => "%",
            Operator::Pow => "^",
            Operator::Eq => "==",
            Operator::Ne => "!=",
            Operator::Lt => "<",
            Operator::Le => "<=",
            Operator::Gt => ">",
            Operator::Ge => ">=",
            Operator::LogicalAnd => "and",
            Operator::LogicalOr => "or",
            Operator::InstanceOf => "instanceof",
            Operator::Matches => "matches",
            Operator::Between => "between",
        }
    }

    pub fn is_comparison(&self) -> bool {
        matches!(
            self,
            Operator::Eq | Operator::Ne | Operator::Lt | Operator::Le | Operator::Gt | Operator::Ge
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    Not,
    Minus,
    Plus,
}

impl UnaryOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            UnaryOp::Not => "!",
            UnaryOp::Minus => "-",
            UnaryOp::Plus => "+",
        }
    }
}

/// Appends nodes to the pool while the parser runs.
#[derive(Debug, Default)]
pub struct AstBuilder {
    pool: ExprPool,
}

impl AstBuilder {
    pub fn with_capacity(capacity: usize) -> Self {
        AstBuilder { pool: ExprPool::with_capacity(capacity) }
    }

    pub fn get(&self, r: ExprRef) -> Option<&Expr> {
        self.pool.get(r)
    }

    pub fn node(&self, r: ExprRef) -> Option<&Node> {
        self.pool.node(r)
    }

    pub fn add(&mut self, expr: Expr, node: Node) -> ExprRef {
        self.pool.add(expr, node)
    }

    pub fn literal_expr(&mut self, literal: Literal, node: Node) -> ExprRef {
        self.add(Expr::Literal(literal), node)
    }

    pub fn binary_expr(&mut self, op: Operator, lhs: ExprRef, rhs: ExprRef, node: Node) -> ExprRef {
        self.add(Expr::Binary(op, lhs, rhs), node)
    }

    pub fn unary_expr(&mut self, op: UnaryOp, operand: ExprRef, node: Node) -> ExprRef {
        self.add(Expr::Unary(op, operand), node)
    }

    pub fn ternary_expr(&mut self, cond: ExprRef, then: ExprRef, otherwise: ExprRef, node: Node) -> ExprRef {
        self.add(Expr::Ternary(cond, then, otherwise), node)
    }

    pub fn elvis_expr(&mut self, lhs: ExprRef, rhs: ExprRef, node: Node) -> ExprRef {
        self.add(Expr::Elvis(lhs, rhs), node)
    }

    pub fn assign_expr(&mut self, target: ExprRef, value: ExprRef, node: Node) -> ExprRef {
        self.add(Expr::Assign(target, value), node)
    }

    pub fn compound_expr(&mut self, parts: Vec<ExprRef>, node: Node) -> ExprRef {
        self.add(Expr::Compound(parts), node)
    }

    /// A list or map is constant when every element is a literal, a negated
    /// numeric literal or itself a constant collection.
    pub fn is_constant_element(&self, r: ExprRef) -> bool {
        match self.pool.get(r) {
            Some(Expr::Literal(_)) => true,
            Some(Expr::Unary(UnaryOp::Minus, operand)) => matches!(
                self.pool.get(*operand),
                Some(Expr::Literal(
                    Literal::Int(_) | Literal::Long(_) | Literal::Float(_) | Literal::Double(_)
                ))
            ),
            Some(e) => e.is_constant_collection(),
            None => false,
        }
    }

    pub fn inline_list_expr(&mut self, elements: Vec<ExprRef>, node: Node) -> ExprRef {
        let constant = elements.iter().all(|e| self.is_constant_element(*e));
        self.add(Expr::InlineList { elements, constant }, node)
    }

    pub fn inline_map_expr(&mut self, entries: Vec<(ExprRef, ExprRef)>, node: Node) -> ExprRef {
        let constant = entries
            .iter()
            .all(|(k, v)| self.is_constant_element(*k) && self.is_constant_element(*v));
        self.add(Expr::InlineMap { entries, constant }, node)
    }

    pub fn extract_pool(self) -> ExprPool {
        self.pool
    }
}

/// A parsed expression: node arena, root, interned names and the source text.
#[derive(Debug)]
pub struct Ast {
    pub root: ExprRef,
    pub expression: ExprPool,
    pub string_interner: DefaultStringInterner,
    pub source: String,
}

impl Ast {
    pub fn get(&self, r: ExprRef) -> Option<&Expr> {
        self.expression.get(r)
    }

    pub fn node(&self, r: ExprRef) -> Node {
        self.expression.node(r).copied().unwrap_or_default()
    }

    pub fn resolve(&self, symbol: DefaultSymbol) -> &str {
        self.string_interner.resolve(symbol).unwrap_or("")
    }

    pub fn len(&self) -> usize {
        self.expression.len()
    }

    pub fn is_empty(&self) -> bool {
        self.expression.is_empty()
    }

    /// Parenthesized source form; reparsing it yields a structurally equal tree.
    pub fn to_canonical_string(&self) -> String {
        crate::printer::CanonicalPrinter::new(self).print().unwrap_or_default()
    }

    /// Names of every `#variable` the expression reads or writes, in first-use order.
    pub fn variable_names(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        for (_, expr) in self.expression.iter() {
            if let Expr::Variable(sym) = expr {
                let name = self.resolve(*sym);
                if name != "this" && name != "root" && !names.iter().any(|n| n == name) {
                    names.push(name.to_string());
                }
            }
        }
        names
    }

    /// Compare two trees by shape and content; positions are ignored and
    /// names are compared by their text.
    pub fn structural_eq(&self, other: &Ast) -> bool {
        self.subtree_eq(self.root, other, other.root)
    }

    fn subtree_eq(&self, a: ExprRef, other: &Ast, b: ExprRef) -> bool {
        let (Some(lhs), Some(rhs)) = (self.get(a), other.get(b)) else {
            return false;
        };
        let refs_eq = |xs: &[ExprRef], ys: &[ExprRef]| {
            xs.len() == ys.len() && xs.iter().zip(ys).all(|(x, y)| self.subtree_eq(*x, other, *y))
        };
        match (lhs, rhs) {
            (Expr::Literal(x), Expr::Literal(y)) => literal_eq(x, y),
            (Expr::Binary(op1, l1, r1), Expr::Binary(op2, l2, r2)) => {
                op1 == op2 && self.subtree_eq(*l1, other, *l2) && self.subtree_eq(*r1, other, *r2)
            }
            (Expr::Unary(op1, e1), Expr::Unary(op2, e2)) => op1 == op2 && self.subtree_eq(*e1, other, *e2),
            (Expr::Ternary(c1, t1, f1), Expr::Ternary(c2, t2, f2)) => refs_eq(&[*c1, *t1, *f1], &[*c2, *t2, *f2]),
            (Expr::Elvis(l1, r1), Expr::Elvis(l2, r2)) | (Expr::Assign(l1, r1), Expr::Assign(l2, r2)) => {
                refs_eq(&[*l1, *r1], &[*l2, *r2])
            }
            (Expr::Compound(p1), Expr::Compound(p2)) => refs_eq(p1, p2),
            (Expr::Property { name: n1, null_safe: s1 }, Expr::Property { name: n2, null_safe: s2 }) => {
                s1 == s2 && self.resolve(*n1) == other.resolve(*n2)
            }
            (
                Expr::MethodCall { name: n1, args: a1, null_safe: s1 },
                Expr::MethodCall { name: n2, args: a2, null_safe: s2 },
            ) => s1 == s2 && self.resolve(*n1) == other.resolve(*n2) && refs_eq(a1, a2),
            (Expr::Indexer(i1), Expr::Indexer(i2)) => self.subtree_eq(*i1, other, *i2),
            (
                Expr::Selection { kind: k1, predicate: p1, null_safe: s1 },
                Expr::Selection { kind: k2, predicate: p2, null_safe: s2 },
            ) => k1 == k2 && s1 == s2 && self.subtree_eq(*p1, other, *p2),
            (Expr::Projection { expr: e1, null_safe: s1 }, Expr::Projection { expr: e2, null_safe: s2 }) => {
                s1 == s2 && self.subtree_eq(*e1, other, *e2)
            }
            (Expr::Variable(v1), Expr::Variable(v2)) => self.resolve(*v1) == other.resolve(*v2),
            (Expr::FunctionCall { name: n1, args: a1 }, Expr::FunctionCall { name: n2, args: a2 }) => {
                self.resolve(*n1) == other.resolve(*n2) && refs_eq(a1, a2)
            }
            (Expr::BeanReference(b1), Expr::BeanReference(b2)) => b1 == b2,
            (
                Expr::TypeReference { name: n1, dimensions: d1 },
                Expr::TypeReference { name: n2, dimensions: d2 },
            ) => n1 == n2 && d1 == d2,
            (
                Expr::Constructor { type_name: t1, args: a1 },
                Expr::Constructor { type_name: t2, args: a2 },
            ) => t1 == t2 && refs_eq(a1, a2),
            (
                Expr::ArrayConstructor { type_name: t1, dimensions: d1, initializer: i1 },
                Expr::ArrayConstructor { type_name: t2, dimensions: d2, initializer: i2 },
            ) => {
                t1 == t2
                    && d1.len() == d2.len()
                    && d1.iter().zip(d2).all(|(x, y)| match (x, y) {
                        (Some(x), Some(y)) => self.subtree_eq(*x, other, *y),
                        (None, None) => true,
                        _ => false,
                    })
                    && match (i1, i2) {
                        (Some(x), Some(y)) => self.subtree_eq(*x, other, *y),
                        (None, None) => true,
                        _ => false,
                    }
            }
            (
                Expr::InlineList { elements: e1, constant: c1 },
                Expr::InlineList { elements: e2, constant: c2 },
            ) => c1 == c2 && refs_eq(e1, e2),
            (
                Expr::InlineMap { entries: e1, constant: c1 },
                Expr::InlineMap { entries: e2, constant: c2 },
            ) => {
                c1 == c2
                    && e1.len() == e2.len()
                    && e1.iter().zip(e2).all(|((k1, v1), (k2, v2))| {
                        self.subtree_eq(*k1, other, *k2) && self.subtree_eq(*v1, other, *v2)
                    })
            }
            _ => false,
        }
    }
}

fn literal_eq(a: &Literal, b: &Literal) -> bool {
    match (a, b) {
        (Literal::Float(x), Literal::Float(y)) => x.to_bits() == y.to_bits(),
        (Literal::Double(x), Literal::Double(y)) => x.to_bits() == y.to_bits(),
        _ => a == b,
    }
}
