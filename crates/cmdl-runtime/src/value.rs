use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;
use std::ops::{Add, Mul, Neg, Sub};

/// A numeric value. Integers stay integers until an operation needs a fraction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Number {
    Int(i64),
    Float(f64),
}

impl Number {
    pub fn as_f64(self) -> f64 {
        match self {
            Number::Int(i) => i as f64,
            Number::Float(f) => f,
        }
    }

    pub fn is_zero(self) -> bool {
        match self {
            Number::Int(i) => i == 0,
            Number::Float(f) => f == 0.0,
        }
    }

    /// Truncate toward zero. Out-of-range floats saturate.
    pub fn truncate(self) -> i64 {
        match self {
            Number::Int(i) => i,
            Number::Float(f) => f.trunc() as i64,
        }
    }

    /// Parse user input such as `4`, `-2` or `4.5`. Surrounding whitespace is ignored.
    pub fn parse(text: &str) -> Option<Number> {
        let text = text.trim();
        if let Ok(i) = text.parse::<i64>() {
            return Some(Number::Int(i));
        }
        match text.parse::<f64>() {
            Ok(f) if f.is_finite() => Some(Number::Float(f)),
            _ => None,
        }
    }

    /// Exact division: stays an integer only when the operands divide evenly.
    /// Returns `None` when dividing by zero.
    pub fn checked_div(self, rhs: Number) -> Option<Number> {
        if rhs.is_zero() {
            return None;
        }
        let quotient = match (self, rhs) {
            (Number::Int(a), Number::Int(b)) if a.checked_rem(b) == Some(0) => a
                .checked_div(b)
                .map(Number::Int)
                .unwrap_or(Number::Float(a as f64 / b as f64)),
            (a, b) => Number::Float(a.as_f64() / b.as_f64()),
        };
        Some(quotient)
    }

    pub fn compare(self, other: Number) -> Option<Ordering> {
        match (self, other) {
            (Number::Int(a), Number::Int(b)) => Some(a.cmp(&b)),
            (a, b) => a.as_f64().partial_cmp(&b.as_f64()),
        }
    }
}

fn int_or_float(
    lhs: Number,
    rhs: Number,
    int_op: fn(i64, i64) -> Option<i64>,
    float_op: fn(f64, f64) -> f64,
) -> Number {
    if let (Number::Int(a), Number::Int(b)) = (lhs, rhs) {
        if let Some(v) = int_op(a, b) {
            return Number::Int(v);
        }
    }
    Number::Float(float_op(lhs.as_f64(), rhs.as_f64()))
}

impl Add for Number {
    type Output = Number;

    fn add(self, rhs: Number) -> Number {
        int_or_float(self, rhs, i64::checked_add, |a, b| a + b)
    }
}

impl Sub for Number {
    type Output = Number;

    fn sub(self, rhs: Number) -> Number {
        int_or_float(self, rhs, i64::checked_sub, |a, b| a - b)
    }
}

impl Mul for Number {
    type Output = Number;

    fn mul(self, rhs: Number) -> Number {
        int_or_float(self, rhs, i64::checked_mul, |a, b| a * b)
    }
}

impl Neg for Number {
    type Output = Number;

    fn neg(self) -> Number {
        match self {
            Number::Int(i) => i
                .checked_neg()
                .map(Number::Int)
                .unwrap_or(Number::Float(-(i as f64))),
            Number::Float(f) => Number::Float(-f),
        }
    }
}

impl fmt::Display for Number {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Number::Int(i) => write!(f, "{i}"),
            Number::Float(x) => write!(f, "{x}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Number(Number),
    Text(String),
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Number(n) => write!(f, "{n}"),
            Value::Text(s) => f.write_str(s),
        }
    }
}

impl From<Number> for Value {
    fn from(n: Number) -> Self {
        Value::Number(n)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Number(Number::Int(i))
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Number(Number::Float(f))
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

/// The variables of one run. There is a single flat scope.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Environment {
    vars: HashMap<String, Value>,
}

impl Environment {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.vars.get(name)
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.vars.insert(name.into(), value.into());
    }

    pub fn contains(&self, name: &str) -> bool {
        self.vars.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.vars.iter().map(|(k, v)| (k.as_str(), v))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_int_arithmetic_stays_int() {
        assert_eq!(Number::Int(5) + Number::Int(2), Number::Int(7));
        assert_eq!(Number::Int(5) * Number::Int(-2), Number::Int(-10));
    }

    #[test]
    fn test_overflow_falls_back_to_float() {
        let n = Number::Int(i64::MAX) + Number::Int(1);
        assert!(matches!(n, Number::Float(_)));
    }

    #[test]
    fn test_division() {
        assert_eq!(Number::Int(6).checked_div(Number::Int(3)), Some(Number::Int(2)));
        assert_eq!(Number::Int(7).checked_div(Number::Int(2)), Some(Number::Float(3.5)));
        assert_eq!(Number::Int(1).checked_div(Number::Int(0)), None);
        assert_eq!(Number::Float(1.0).checked_div(Number::Float(0.0)), None);
    }

    #[test]
    fn test_mixed_compare() {
        assert_eq!(Number::Int(2).compare(Number::Float(2.0)), Some(Ordering::Equal));
        assert_eq!(Number::Int(2).compare(Number::Float(2.5)), Some(Ordering::Less));
    }

    #[test]
    fn test_parse() {
        assert_eq!(Number::parse(" 4 "), Some(Number::Int(4)));
        assert_eq!(Number::parse("-2"), Some(Number::Int(-2)));
        assert_eq!(Number::parse("4.5"), Some(Number::Float(4.5)));
        assert_eq!(Number::parse("abc"), None);
        assert_eq!(Number::parse("inf"), None);
        assert_eq!(Number::parse(""), None);
    }

    #[test]
    fn test_display() {
        assert_eq!(Value::from(7).to_string(), "7");
        assert_eq!(Value::from(4.5).to_string(), "4.5");
        assert_eq!(Value::from("hi").to_string(), "hi");
    }

    #[test]
    fn test_truncate() {
        assert_eq!(Number::Float(2.9).truncate(), 2);
        assert_eq!(Number::Float(-2.9).truncate(), -2);
    }
}
