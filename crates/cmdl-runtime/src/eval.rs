//! Expression and condition evaluation against an [`Environment`].

use cmdl_parser::ast::{BinOp, CmpOp, Condition, Expr, TextPart, UnaryOp};

use crate::error::RuntimeErrorKind;
use crate::value::{Environment, Number, Value};

pub type EvalResult<T> = Result<T, RuntimeErrorKind>;

pub fn lookup<'e>(env: &'e Environment, name: &str) -> EvalResult<&'e Value> {
    env.get(name)
        .ok_or_else(|| RuntimeErrorKind::UndefinedVariable(name.to_string()))
}

pub fn eval_expr(expr: &Expr, env: &Environment) -> EvalResult<Value> {
    match expr {
        Expr::IntLiteral { value, .. } => Ok(Value::Number(Number::Int(*value))),
        Expr::FloatLiteral { value, .. } => Ok(Value::Number(Number::Float(*value))),
        Expr::StringLiteral { value, .. } => Ok(Value::Text(value.clone())),
        Expr::Variable { name, .. } => lookup(env, name).cloned(),
        Expr::UnaryOp {
            op: UnaryOp::Neg,
            operand,
            ..
        } => {
            let n = expect_number(eval_expr(operand, env)?, "-")?;
            Ok(Value::Number(-n))
        }
        Expr::BinaryOp {
            op, left, right, ..
        } => {
            let symbol = binop_symbol(*op);
            let a = expect_number(eval_expr(left, env)?, symbol)?;
            let b = expect_number(eval_expr(right, env)?, symbol)?;
            let n = match op {
                BinOp::Add => a + b,
                BinOp::Sub => a - b,
                BinOp::Mul => a * b,
                BinOp::Div => a.checked_div(b).ok_or(RuntimeErrorKind::DivisionByZero)?,
            };
            Ok(Value::Number(n))
        }
    }
}

/// Evaluate an expression that must produce a number.
pub fn eval_number(expr: &Expr, env: &Environment) -> EvalResult<Number> {
    match eval_expr(expr, env)? {
        Value::Number(n) => Ok(n),
        Value::Text(_) => Err(RuntimeErrorKind::TypeMismatch(
            "expected a number, found text".to_string(),
        )),
    }
}

fn expect_number(value: Value, symbol: &str) -> EvalResult<Number> {
    match value {
        Value::Number(n) => Ok(n),
        Value::Text(_) => Err(RuntimeErrorKind::TypeMismatch(format!(
            "cannot apply `{symbol}` to text"
        ))),
    }
}

fn binop_symbol(op: BinOp) -> &'static str {
    match op {
        BinOp::Add => "+",
        BinOp::Sub => "-",
        BinOp::Mul => "*",
        BinOp::Div => "/",
    }
}

/// Numbers compare numerically. If either side is text, both sides are
/// rendered as text and only `=` / `!=` are allowed.
pub fn eval_condition(cond: &Condition, env: &Environment) -> EvalResult<bool> {
    let lhs = eval_expr(&cond.lhs, env)?;
    let rhs = eval_expr(&cond.rhs, env)?;

    if let (Value::Number(a), Value::Number(b)) = (&lhs, &rhs) {
        let Some(ord) = a.compare(*b) else {
            return Ok(cond.op == CmpOp::Neq);
        };
        return Ok(match cond.op {
            CmpOp::Eq => ord.is_eq(),
            CmpOp::Neq => ord.is_ne(),
            CmpOp::Lt => ord.is_lt(),
            CmpOp::Gt => ord.is_gt(),
            CmpOp::Le => ord.is_le(),
            CmpOp::Ge => ord.is_ge(),
        });
    }

    match cond.op {
        CmpOp::Eq => Ok(lhs.to_string() == rhs.to_string()),
        CmpOp::Neq => Ok(lhs.to_string() != rhs.to_string()),
        op => Err(RuntimeErrorKind::TypeMismatch(format!(
            "cannot compare text with `{}`",
            op.symbol()
        ))),
    }
}

/// Concatenate the parts of a `text` statement.
pub fn render_text(parts: &[TextPart], env: &Environment) -> EvalResult<String> {
    let mut out = String::new();
    for part in parts {
        match part {
            TextPart::Literal(s) => out.push_str(s),
            TextPart::Variable(name) => out.push_str(&lookup(env, name)?.to_string()),
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use cmdl_parser::parse;
    use cmdl_parser::ast::Statement;

    fn expr(src: &str) -> Expr {
        let line = parse(&format!("set _ = {src}")).unwrap().remove(0);
        match line.statement {
            Statement::Set { value, .. } => value,
            other => panic!("expected Set, got {other:?}"),
        }
    }

    fn condition(src: &str) -> Condition {
        let line = parse(&format!("if {src}:")).unwrap().remove(0);
        match line.statement {
            Statement::If { condition, .. } => condition,
            other => panic!("expected If, got {other:?}"),
        }
    }

    fn env() -> Environment {
        let mut env = Environment::new();
        env.set("x", 5);
        env.set("name", "bob");
        env
    }

    #[test]
    fn test_precedence_and_parentheses() {
        let env = env();
        assert_eq!(eval_expr(&expr("1 + 2 * 3"), &env), Ok(Value::from(7)));
        assert_eq!(eval_expr(&expr("(1 + 2) * 3"), &env), Ok(Value::from(9)));
        assert_eq!(eval_expr(&expr("x - 2 - 1"), &env), Ok(Value::from(2)));
        assert_eq!(eval_expr(&expr("-x + 1"), &env), Ok(Value::from(-4)));
    }

    #[test]
    fn test_fractional_division() {
        let env = env();
        assert_eq!(eval_expr(&expr("x / 2"), &env), Ok(Value::from(2.5)));
        assert_eq!(eval_expr(&expr("x / 5"), &env), Ok(Value::from(1)));
    }

    #[test]
    fn test_division_by_zero() {
        let env = env();
        assert_eq!(
            eval_expr(&expr("x / (x - 5)"), &env),
            Err(RuntimeErrorKind::DivisionByZero)
        );
    }

    #[test]
    fn test_undefined_variable() {
        assert_eq!(
            eval_expr(&expr("y + 1"), &env()),
            Err(RuntimeErrorKind::UndefinedVariable("y".into()))
        );
    }

    #[test]
    fn test_text_arithmetic_is_type_mismatch() {
        let err = eval_expr(&expr("name + 1"), &env()).unwrap_err();
        assert!(matches!(err, RuntimeErrorKind::TypeMismatch(_)));
    }

    #[test]
    fn test_numeric_conditions() {
        let env = env();
        assert_eq!(eval_condition(&condition("x = 5"), &env), Ok(true));
        assert_eq!(eval_condition(&condition("x != 5"), &env), Ok(false));
        assert_eq!(eval_condition(&condition("x < 10"), &env), Ok(true));
        assert_eq!(eval_condition(&condition("x >= 5.5"), &env), Ok(false));
        assert_eq!(eval_condition(&condition("x + 1 > x"), &env), Ok(true));
    }

    #[test]
    fn test_text_conditions() {
        let env = env();
        assert_eq!(eval_condition(&condition(r#"name = "bob""#), &env), Ok(true));
        assert_eq!(eval_condition(&condition(r#"name != "bob""#), &env), Ok(false));
        assert_eq!(eval_condition(&condition(r#"x = "5""#), &env), Ok(true));
        assert!(matches!(
            eval_condition(&condition(r#"name < "z""#), &env),
            Err(RuntimeErrorKind::TypeMismatch(_))
        ));
    }

    #[test]
    fn test_render_text() {
        let parts = vec![
            TextPart::Literal("x=".into()),
            TextPart::Variable("x".into()),
        ];
        assert_eq!(render_text(&parts, &env()), Ok("x=5".to_string()));
    }
}
