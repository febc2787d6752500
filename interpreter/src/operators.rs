//! Operator semantics shared by the interpreter and the bytecode processor.

use std::cmp::Ordering;
use frontend::ast::{Operator, UnaryOp};
use regex::Regex;
use crate::conversion::cast_number;
use crate::descriptor::ScalarKind;
use crate::error::OperatorError;
use crate::object::Value;
use crate::types::TypeHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArithmeticOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
}

impl ArithmeticOp {
    pub fn from_operator(op: Operator) -> Option<ArithmeticOp> {
        match op {
            Operator::Add => Some(ArithmeticOp::Add),
            Operator::Sub => Some(ArithmeticOp::Sub),
            Operator::Mul => Some(ArithmeticOp::Mul),
            Operator::Div => Some(ArithmeticOp::Div),
            Operator::Mod => Some(ArithmeticOp::Mod),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ArithmeticOp::Add => "add",
            ArithmeticOp::Sub => "sub",
            ArithmeticOp::Mul => "mul",
            ArithmeticOp::Div => "div",
            ArithmeticOp::Mod => "mod",
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            ArithmeticOp::Add => "+",
            ArithmeticOp::Sub => "-",
            ArithmeticOp::Mul => "*",
            ArithmeticOp::Div => "/",
            ArithmeticOp::Mod => "%",
        }
    }

    /// Two's-complement wrapping, like the JVM.
    pub fn apply_int(&self, l: i32, r: i32) -> Result<i32, OperatorError> {
        Ok(match self {
            ArithmeticOp::Add => l.wrapping_add(r),
            ArithmeticOp::Sub => l.wrapping_sub(r),
            ArithmeticOp::Mul => l.wrapping_mul(r),
            ArithmeticOp::Div if r == 0 => return Err(OperatorError::DivisionByZero),
            ArithmeticOp::Div => l.wrapping_div(r),
            ArithmeticOp::Mod if r == 0 => return Err(OperatorError::DivisionByZero),
            ArithmeticOp::Mod => l.wrapping_rem(r),
        })
    }

    pub fn apply_long(&self, l: i64, r: i64) -> Result<i64, OperatorError> {
        Ok(match self {
            ArithmeticOp::Add => l.wrapping_add(r),
            ArithmeticOp::Sub => l.wrapping_sub(r),
            ArithmeticOp::Mul => l.wrapping_mul(r),
            ArithmeticOp::Div if r == 0 => return Err(OperatorError::DivisionByZero),
            ArithmeticOp::Div => l.wrapping_div(r),
            ArithmeticOp::Mod if r == 0 => return Err(OperatorError::DivisionByZero),
            ArithmeticOp::Mod => l.wrapping_rem(r),
        })
    }

    pub fn apply_float(&self, l: f32, r: f32) -> f32 {
        match self {
            ArithmeticOp::Add => l + r,
            ArithmeticOp::Sub => l - r,
            ArithmeticOp::Mul => l * r,
            ArithmeticOp::Div => l / r,
            ArithmeticOp::Mod => l % r,
        }
    }

    pub fn apply_double(&self, l: f64, r: f64) -> f64 {
        match self {
            ArithmeticOp::Add => l + r,
            ArithmeticOp::Sub => l - r,
            ArithmeticOp::Mul => l * r,
            ArithmeticOp::Div => l / r,
            ArithmeticOp::Mod => l % r,
        }
    }

    /// Operands already of `kind`.
    pub fn apply_kind(&self, kind: ScalarKind, l: &Value, r: &Value) -> Result<Value, OperatorError> {
        match (kind, l, r) {
            (ScalarKind::Int, Value::Int(a), Value::Int(b)) => self.apply_int(*a, *b).map(Value::Int),
            (ScalarKind::Long, Value::Long(a), Value::Long(b)) => self.apply_long(*a, *b).map(Value::Long),
            (ScalarKind::Float, Value::Float(a), Value::Float(b)) => Ok(Value::Float(self.apply_float(*a, *b))),
            (ScalarKind::Double, Value::Double(a), Value::Double(b)) => Ok(Value::Double(self.apply_double(*a, *b))),
            _ => Err(unsupported(self.symbol(), l, r)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComparisonOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl ComparisonOp {
    pub fn from_operator(op: Operator) -> Option<ComparisonOp> {
        match op {
            Operator::Eq => Some(ComparisonOp::Eq),
            Operator::Ne => Some(ComparisonOp::Ne),
            Operator::Lt => Some(ComparisonOp::Lt),
            Operator::Le => Some(ComparisonOp::Le),
            Operator::Gt => Some(ComparisonOp::Gt),
            Operator::Ge => Some(ComparisonOp::Ge),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ComparisonOp::Eq => "eq",
            ComparisonOp::Ne => "ne",
            ComparisonOp::Lt => "lt",
            ComparisonOp::Le => "le",
            ComparisonOp::Gt => "gt",
            ComparisonOp::Ge => "ge",
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            ComparisonOp::Eq => "==",
            ComparisonOp::Ne => "!=",
            ComparisonOp::Lt => "<",
            ComparisonOp::Le => "<=",
            ComparisonOp::Gt => ">",
            ComparisonOp::Ge => ">=",
        }
    }

    /// `None` is an unordered pair (NaN), for which only `!=` holds.
    pub fn apply_ordering(&self, ordering: Option<Ordering>) -> bool {
        match (self, ordering) {
            (ComparisonOp::Eq, o) => o == Some(Ordering::Equal),
            (ComparisonOp::Ne, o) => o != Some(Ordering::Equal),
            (_, None) => false,
            (ComparisonOp::Lt, Some(o)) => o == Ordering::Less,
            (ComparisonOp::Le, Some(o)) => o != Ordering::Greater,
            (ComparisonOp::Gt, Some(o)) => o == Ordering::Greater,
            (ComparisonOp::Ge, Some(o)) => o != Ordering::Less,
        }
    }

    pub fn apply<T: PartialOrd>(&self, l: T, r: T) -> bool {
        self.apply_ordering(l.partial_cmp(&r))
    }
}

fn unsupported(operator: &'static str, l: &Value, r: &Value) -> OperatorError {
    OperatorError::UnsupportedOperands { operator, left: l.type_name(), right: r.type_name() }
}

/// Both operands cast to their common numeric kind.
fn promote(l: &Value, r: &Value) -> Option<(ScalarKind, Value, Value)> {
    let kind = l.numeric_kind()?.promote(r.numeric_kind()?)?;
    Some((kind, cast_number(l, kind)?, cast_number(r, kind)?))
}

/// `+ - * / %` with string concatenation for `+` and numeric promotion.
pub fn arithmetic(op: ArithmeticOp, l: &Value, r: &Value) -> Result<Value, OperatorError> {
    if op == ArithmeticOp::Add && (matches!(l, Value::String(_)) || matches!(r, Value::String(_))) {
        return Ok(Value::from(format!("{l}{r}")));
    }
    let (kind, l, r) = promote(l, r).ok_or_else(|| unsupported(op.symbol(), l, r))?;
    op.apply_kind(kind, &l, &r)
}

/// `^`. Integer powers stay integral and widen to long on overflow.
pub fn power(l: &Value, r: &Value) -> Result<Value, OperatorError> {
    match (l, r) {
        (Value::Int(base), Value::Int(exp)) => Ok(match u32::try_from(*exp) {
            Ok(exp) => match base.checked_pow(exp) {
                Some(v) => Value::Int(v),
                None => Value::Long(i64::from(*base).checked_pow(exp).unwrap_or_else(|| f64::from(*base).powf(f64::from(exp)) as i64)),
            },
            Err(_) => Value::Int(f64::from(*base).powf(f64::from(*exp)) as i32),
        }),
        (Value::Long(_), Value::Int(_) | Value::Long(_)) | (Value::Int(_), Value::Long(_)) => {
            let (base, exp) = (l.as_i64().unwrap_or(0), r.as_i64().unwrap_or(0));
            Ok(Value::Long(match u32::try_from(exp) {
                Ok(e) => base.wrapping_pow(e),
                Err(_) => (base as f64).powf(exp as f64) as i64,
            }))
        }
        _ => match promote(l, r) {
            Some((ScalarKind::Float, Value::Float(a), Value::Float(b))) => Ok(Value::Float(a.powf(b))),
            Some((_, a, b)) => Ok(Value::Double(a.as_f64().unwrap_or(f64::NAN).powf(b.as_f64().unwrap_or(f64::NAN)))),
            None => Err(unsupported("^", l, r)),
        },
    }
}

/// Value equality with numeric promotion, so `1 == 1L` holds.
pub fn equals(l: &Value, r: &Value) -> bool {
    match promote(l, r) {
        Some((_, Value::Int(a), Value::Int(b))) => a == b,
        Some((_, Value::Long(a), Value::Long(b))) => a == b,
        Some((_, Value::Float(a), Value::Float(b))) => a == b,
        Some((_, Value::Double(a), Value::Double(b))) => a == b,
        _ => l == r,
    }
}

/// Ordering for `< <= > >=`: numbers after promotion, strings, booleans, and
/// null below everything else.
pub fn order(l: &Value, r: &Value, operator: &'static str) -> Result<Option<Ordering>, OperatorError> {
    match (l, r) {
        (Value::Null, Value::Null) => Ok(Some(Ordering::Equal)),
        (Value::Null, _) => Ok(Some(Ordering::Less)),
        (_, Value::Null) => Ok(Some(Ordering::Greater)),
        (Value::String(a), Value::String(b)) => Ok(Some(a.cmp(b))),
        (Value::Bool(a), Value::Bool(b)) => Ok(Some(a.cmp(b))),
        _ => match promote(l, r) {
            Some((_, Value::Int(a), Value::Int(b))) => Ok(Some(a.cmp(&b))),
            Some((_, Value::Long(a), Value::Long(b))) => Ok(Some(a.cmp(&b))),
            Some((_, Value::Float(a), Value::Float(b))) => Ok(a.partial_cmp(&b)),
            Some((_, Value::Double(a), Value::Double(b))) => Ok(a.partial_cmp(&b)),
            _ => Err(unsupported(operator, l, r)),
        },
    }
}

pub fn compare(op: ComparisonOp, l: &Value, r: &Value) -> Result<bool, OperatorError> {
    match op {
        ComparisonOp::Eq => Ok(equals(l, r)),
        ComparisonOp::Ne => Ok(!equals(l, r)),
        _ => Ok(op.apply_ordering(order(l, r, op.symbol())?)),
    }
}

/// `value between {low, high}`, inclusive on both ends.
pub fn between(value: &Value, range: &Value) -> Result<bool, OperatorError> {
    let bounds = match range {
        Value::List(list) => list.snapshot(),
        Value::Array(array) => array.snapshot(),
        _ => return Err(OperatorError::InvalidBetweenRange),
    };
    let [low, high] = bounds.as_slice() else {
        return Err(OperatorError::InvalidBetweenRange);
    };
    Ok(ComparisonOp::Ge.apply_ordering(order(value, low, "between")?)
        && ComparisonOp::Le.apply_ordering(order(value, high, "between")?))
}

/// Compile a `matches` pattern. The whole input must match.
pub fn compile_pattern(pattern: &str) -> Result<Regex, OperatorError> {
    Regex::new(&format!("^(?:{pattern})$")).map_err(|e| OperatorError::InvalidPattern {
        pattern: pattern.to_string(),
        message: e.to_string(),
    })
}

pub fn matches(value: &Value, regex: &Regex) -> Result<bool, OperatorError> {
    match value {
        Value::String(s) => Ok(regex.is_match(s)),
        other => Err(OperatorError::UnsupportedOperands {
            operator: "matches",
            left: other.type_name(),
            right: "String".to_string(),
        }),
    }
}

/// Null is an instance of nothing.
pub fn instance_of(value: &Value, target: &TypeHandle) -> bool {
    !value.is_null() && (value.type_handle().is_assignable_to(target) || value.scalar_kind().is_some_and(|k| target.scalar_kind() == Some(k)))
}

/// `-x` and `+x`; `!x` goes through boolean conversion in the caller.
pub fn unary(op: UnaryOp, value: &Value) -> Result<Value, OperatorError> {
    match (op, value) {
        (UnaryOp::Minus, Value::Int(v)) => Ok(Value::Int(v.wrapping_neg())),
        (UnaryOp::Minus, Value::Long(v)) => Ok(Value::Long(v.wrapping_neg())),
        (UnaryOp::Minus, Value::Float(v)) => Ok(Value::Float(-v)),
        (UnaryOp::Minus, Value::Double(v)) => Ok(Value::Double(-v)),
        (UnaryOp::Plus, v) if v.numeric_kind().is_some() => Ok(v.clone()),
        (op, v) => Err(OperatorError::UnsupportedOperand { operator: op.symbol(), operand: v.type_name() }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::builtin;
    use rstest::rstest;

    #[rstest]
    #[case(ArithmeticOp::Add, Value::Int(2), Value::Int(3), Value::Int(5))]
    #[case(ArithmeticOp::Sub, Value::Long(2), Value::Long(3), Value::Long(-1))]
    #[case(ArithmeticOp::Mul, Value::Int(i32::MAX), Value::Int(2), Value::Int(-2))]
    #[case(ArithmeticOp::Div, Value::Int(7), Value::Int(2), Value::Int(3))]
    #[case(ArithmeticOp::Mod, Value::Int(-7), Value::Int(3), Value::Int(-1))]
    #[case(ArithmeticOp::Div, Value::Double(1.0), Value::Double(4.0), Value::Double(0.25))]
    #[case(ArithmeticOp::Add, Value::Int(1), Value::Double(0.5), Value::Double(1.5))]
    #[case(ArithmeticOp::Add, Value::Int(1), Value::Long(2), Value::Long(3))]
    #[case(ArithmeticOp::Add, Value::from("a"), Value::Int(1), Value::from("a1"))]
    #[case(ArithmeticOp::Add, Value::Null, Value::from("b"), Value::from("nullb"))]
    fn arithmetic_cases(#[case] op: ArithmeticOp, #[case] l: Value, #[case] r: Value, #[case] expected: Value) {
        assert_eq!(arithmetic(op, &l, &r).unwrap(), expected);
    }

    #[test]
    fn integer_division_by_zero() {
        assert_eq!(arithmetic(ArithmeticOp::Div, &Value::Int(1), &Value::Int(0)), Err(OperatorError::DivisionByZero));
        assert_eq!(arithmetic(ArithmeticOp::Mod, &Value::Long(1), &Value::Long(0)), Err(OperatorError::DivisionByZero));
        let inf = arithmetic(ArithmeticOp::Div, &Value::Double(1.0), &Value::Double(0.0)).unwrap();
        assert_eq!(inf, Value::Double(f64::INFINITY));
    }

    #[test]
    fn unsupported_operands() {
        let err = arithmetic(ArithmeticOp::Sub, &Value::from("a"), &Value::Int(1)).unwrap_err();
        assert_eq!(err.to_string(), "operator '-' is not supported between String and Integer");
    }

    #[rstest]
    #[case(Value::Int(2), Value::Int(10), Value::Int(1024))]
    #[case(Value::Int(2), Value::Int(40), Value::Long(1 << 40))]
    #[case(Value::Int(2), Value::Int(-1), Value::Int(0))]
    #[case(Value::Long(3), Value::Int(2), Value::Long(9))]
    #[case(Value::Double(2.0), Value::Int(3), Value::Double(8.0))]
    fn power_cases(#[case] l: Value, #[case] r: Value, #[case] expected: Value) {
        assert_eq!(power(&l, &r).unwrap(), expected);
    }

    #[test]
    fn comparisons() {
        assert!(compare(ComparisonOp::Lt, &Value::Int(1), &Value::Double(3.0)).unwrap());
        assert!(compare(ComparisonOp::Eq, &Value::Int(1), &Value::Long(1)).unwrap());
        assert!(compare(ComparisonOp::Gt, &Value::from("b"), &Value::from("a")).unwrap());
        assert!(compare(ComparisonOp::Lt, &Value::Null, &Value::Int(0)).unwrap());
        assert!(!compare(ComparisonOp::Lt, &Value::Double(f64::NAN), &Value::Double(0.0)).unwrap());
        assert!(compare(ComparisonOp::Ne, &Value::Double(f64::NAN), &Value::Double(f64::NAN)).unwrap());
        assert!(compare(ComparisonOp::Lt, &Value::from("a"), &Value::Int(1)).is_err());
        assert!(compare(ComparisonOp::Eq, &Value::from("a"), &Value::Int(1)).is_ok());
    }

    #[test]
    fn between_needs_two_bounds() {
        let range = Value::list(vec![Value::Int(1), Value::Int(5)]);
        assert!(between(&Value::Int(3), &range).unwrap());
        assert!(between(&Value::Int(5), &range).unwrap());
        assert!(!between(&Value::Int(6), &range).unwrap());
        let bad = Value::list(vec![Value::Int(1)]);
        assert_eq!(between(&Value::Int(1), &bad), Err(OperatorError::InvalidBetweenRange));
    }

    #[test]
    fn patterns_match_whole_input() {
        let regex = compile_pattern("[0-9]+").unwrap();
        assert!(matches(&Value::from("123"), &regex).unwrap());
        assert!(!matches(&Value::from("12a"), &regex).unwrap());
        assert!(compile_pattern("(").is_err());
    }

    #[test]
    fn instanceof_checks() {
        assert!(instance_of(&Value::Int(1), &builtin::integer()));
        assert!(instance_of(&Value::Int(1), &builtin::number()));
        assert!(instance_of(&Value::Int(1), &builtin::int()));
        assert!(!instance_of(&Value::Int(1), &builtin::string()));
        assert!(!instance_of(&Value::Null, &builtin::object()));
    }

    #[test]
    fn unary_operators() {
        assert_eq!(unary(UnaryOp::Minus, &Value::Int(3)).unwrap(), Value::Int(-3));
        assert_eq!(unary(UnaryOp::Plus, &Value::Double(3.0)).unwrap(), Value::Double(3.0));
        assert!(unary(UnaryOp::Minus, &Value::from("x")).is_err());
    }
}
