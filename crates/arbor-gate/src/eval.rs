//! Expression evaluation.
//!
//! Values are JSON values. Truthiness follows the usual scripting rules:
//! `null`, `false`, `0`, `""`, `[]` and `{}` are false, everything else is
//! true. `and`/`or` short-circuit and return the deciding operand.
//!
//! Built-in functions: `abs`, `min`, `max`, `floor`, `ceil`, `round`,
//! `sqrt`, `pow`, `len`, `str`, `int`, `float`, `now`.

use std::cmp::Ordering;

use arbor_types::Timestamp;
use serde_json::{Map, Number, Value};

use crate::ast::{BinaryOp, Expr, UnaryOp};
use crate::error::{GateError, GateResult};

/// Names visible to an expression.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Bindings {
    vars: Map<String, Value>,
}

impl Bindings {
    /// Only the helper constants: `now` (seconds since the epoch), `pi`, `e`.
    pub fn helpers() -> Self {
        let mut vars = Map::new();
        vars.insert("now".into(), Value::from(Timestamp::now().as_secs()));
        vars.insert("pi".into(), Value::from(std::f64::consts::PI));
        vars.insert("e".into(), Value::from(std::f64::consts::E));
        Self { vars }
    }

    /// Metadata fields on top of the helpers; a field shadows a helper of the
    /// same name.
    pub fn from_metadata(metadata: &Map<String, Value>) -> Self {
        let mut bindings = Self::helpers();
        for (name, value) in metadata {
            bindings.vars.insert(name.clone(), value.clone());
        }
        bindings
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.vars.get(name)
    }
}

/// Scripting-style truthiness of a value.
pub fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

#[derive(Clone, Copy, Debug)]
enum Num {
    Int(i64),
    Float(f64),
}

impl Num {
    fn of(value: &Value) -> Option<Self> {
        let n = value.as_number()?;
        Some(match n.as_i64() {
            Some(i) => Num::Int(i),
            None => Num::Float(n.as_f64()?),
        })
    }

    fn as_f64(self) -> f64 {
        match self {
            Num::Int(i) => i as f64,
            Num::Float(f) => f,
        }
    }
}

fn float(op: &str, f: f64) -> GateResult<Value> {
    Number::from_f64(f)
        .map(Value::Number)
        .ok_or_else(|| GateError::mismatch(op, "result is not a finite number"))
}

fn describe(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "map",
    }
}

fn numbers(op: BinaryOp, lhs: &Value, rhs: &Value) -> GateResult<(Num, Num)> {
    match (Num::of(lhs), Num::of(rhs)) {
        (Some(a), Some(b)) => Ok((a, b)),
        _ => Err(GateError::mismatch(
            op.to_string(),
            format!("{} and {}", describe(lhs), describe(rhs)),
        )),
    }
}

fn loose_eq(lhs: &Value, rhs: &Value) -> bool {
    match (Num::of(lhs), Num::of(rhs)) {
        (Some(a), Some(b)) => a.as_f64() == b.as_f64(),
        _ => lhs == rhs,
    }
}

fn compare(op: BinaryOp, lhs: &Value, rhs: &Value) -> GateResult<Ordering> {
    if let (Value::String(a), Value::String(b)) = (lhs, rhs) {
        return Ok(a.cmp(b));
    }
    let (a, b) = numbers(op, lhs, rhs)?;
    a.as_f64()
        .partial_cmp(&b.as_f64())
        .ok_or_else(|| GateError::mismatch(op.to_string(), "unordered numbers"))
}

/// Evaluate an expression tree.
pub fn evaluate(expr: &Expr, bindings: &Bindings) -> GateResult<Value> {
    match expr {
        Expr::Literal(value) => Ok(value.clone()),
        Expr::Path(path) => {
            let (head, fields) = path
                .split_first()
                .ok_or_else(|| GateError::UnknownVariable(String::new()))?;
            let mut value = bindings
                .get(head)
                .ok_or_else(|| GateError::UnknownVariable(head.clone()))?;
            for field in fields {
                match value.get(field) {
                    Some(inner) => value = inner,
                    None => return Ok(Value::Null),
                }
            }
            Ok(value.clone())
        }
        Expr::Unary(UnaryOp::Not, inner) => Ok(Value::Bool(!truthy(&evaluate(inner, bindings)?))),
        Expr::Unary(UnaryOp::Neg, inner) => {
            let value = evaluate(inner, bindings)?;
            match Num::of(&value) {
                Some(Num::Int(i)) => match i.checked_neg() {
                    Some(n) => Ok(Value::from(n)),
                    None => float("-", -(i as f64)),
                },
                Some(Num::Float(f)) => float("-", -f),
                None => Err(GateError::mismatch("-", describe(&value))),
            }
        }
        Expr::Binary(BinaryOp::And, lhs, rhs) => {
            let left = evaluate(lhs, bindings)?;
            if truthy(&left) {
                evaluate(rhs, bindings)
            } else {
                Ok(left)
            }
        }
        Expr::Binary(BinaryOp::Or, lhs, rhs) => {
            let left = evaluate(lhs, bindings)?;
            if truthy(&left) {
                Ok(left)
            } else {
                evaluate(rhs, bindings)
            }
        }
        Expr::Binary(op, lhs, rhs) => {
            let left = evaluate(lhs, bindings)?;
            let right = evaluate(rhs, bindings)?;
            binary(*op, &left, &right)
        }
        Expr::Call(name, args) => {
            let args = args
                .iter()
                .map(|arg| evaluate(arg, bindings))
                .collect::<GateResult<Vec<Value>>>()?;
            call(name, &args)
        }
    }
}

fn binary(op: BinaryOp, lhs: &Value, rhs: &Value) -> GateResult<Value> {
    let symbol = op.to_string();
    match op {
        BinaryOp::Eq => Ok(Value::Bool(loose_eq(lhs, rhs))),
        BinaryOp::Ne => Ok(Value::Bool(!loose_eq(lhs, rhs))),
        BinaryOp::Lt => Ok(Value::Bool(compare(op, lhs, rhs)? == Ordering::Less)),
        BinaryOp::Le => Ok(Value::Bool(compare(op, lhs, rhs)? != Ordering::Greater)),
        BinaryOp::Gt => Ok(Value::Bool(compare(op, lhs, rhs)? == Ordering::Greater)),
        BinaryOp::Ge => Ok(Value::Bool(compare(op, lhs, rhs)? != Ordering::Less)),
        BinaryOp::In => match (lhs, rhs) {
            (_, Value::Array(items)) => {
                Ok(Value::Bool(items.iter().any(|item| loose_eq(lhs, item))))
            }
            (Value::String(needle), Value::String(hay)) => {
                Ok(Value::Bool(hay.contains(needle.as_str())))
            }
            (Value::String(key), Value::Object(map)) => Ok(Value::Bool(map.contains_key(key))),
            _ => Err(GateError::mismatch(
                symbol,
                format!("{} in {}", describe(lhs), describe(rhs)),
            )),
        },
        BinaryOp::Add => match (lhs, rhs) {
            (Value::String(a), Value::String(b)) => Ok(Value::String(format!("{a}{b}"))),
            (Value::Array(a), Value::Array(b)) => {
                Ok(Value::Array(a.iter().chain(b).cloned().collect()))
            }
            _ => match numbers(op, lhs, rhs)? {
                (Num::Int(a), Num::Int(b)) => match a.checked_add(b) {
                    Some(n) => Ok(Value::from(n)),
                    None => float(&symbol, a as f64 + b as f64),
                },
                (a, b) => float(&symbol, a.as_f64() + b.as_f64()),
            },
        },
        BinaryOp::Sub => match numbers(op, lhs, rhs)? {
            (Num::Int(a), Num::Int(b)) => match a.checked_sub(b) {
                Some(n) => Ok(Value::from(n)),
                None => float(&symbol, a as f64 - b as f64),
            },
            (a, b) => float(&symbol, a.as_f64() - b.as_f64()),
        },
        BinaryOp::Mul => match numbers(op, lhs, rhs)? {
            (Num::Int(a), Num::Int(b)) => match a.checked_mul(b) {
                Some(n) => Ok(Value::from(n)),
                None => float(&symbol, a as f64 * b as f64),
            },
            (a, b) => float(&symbol, a.as_f64() * b.as_f64()),
        },
        BinaryOp::Div => {
            let (a, b) = numbers(op, lhs, rhs)?;
            if b.as_f64() == 0.0 {
                return Err(GateError::DivisionByZero);
            }
            float(&symbol, a.as_f64() / b.as_f64())
        }
        BinaryOp::Rem => match numbers(op, lhs, rhs)? {
            (_, b) if b.as_f64() == 0.0 => Err(GateError::DivisionByZero),
            (Num::Int(a), Num::Int(b)) => match a.checked_rem_euclid(b) {
                Some(n) => Ok(Value::from(n)),
                None => float(&symbol, (a as f64).rem_euclid(b as f64)),
            },
            (a, b) => float(&symbol, a.as_f64().rem_euclid(b.as_f64())),
        },
        BinaryOp::Pow => match numbers(op, lhs, rhs)? {
            (Num::Int(a), Num::Int(b)) if (0..=u32::MAX as i64).contains(&b) => {
                match a.checked_pow(b as u32) {
                    Some(n) => Ok(Value::from(n)),
                    None => float(&symbol, (a as f64).powf(b as f64)),
                }
            }
            (a, b) => float(&symbol, a.as_f64().powf(b.as_f64())),
        },
        BinaryOp::And | BinaryOp::Or => Err(GateError::mismatch(symbol, "handled by evaluate")),
    }
}

fn arity(name: &str, expected: &'static str, args: &[Value], ok: bool) -> GateResult<()> {
    if ok {
        Ok(())
    } else {
        Err(GateError::Arity {
            name: name.to_string(),
            expected,
            found: args.len(),
        })
    }
}

fn one_number(name: &str, args: &[Value]) -> GateResult<Num> {
    arity(name, "1", args, args.len() == 1)?;
    Num::of(&args[0]).ok_or_else(|| GateError::mismatch(name, describe(&args[0])))
}

fn call(name: &str, args: &[Value]) -> GateResult<Value> {
    match name {
        "abs" => match one_number(name, args)? {
            Num::Int(i) => Ok(Value::from(i.unsigned_abs().min(i64::MAX as u64) as i64)),
            Num::Float(f) => float(name, f.abs()),
        },
        "floor" | "ceil" | "sqrt" => {
            let n = one_number(name, args)?.as_f64();
            match name {
                "floor" => Ok(Value::from(n.floor() as i64)),
                "ceil" => Ok(Value::from(n.ceil() as i64)),
                _ => float(name, n.sqrt()),
            }
        }
        "round" => {
            arity(name, "1 or 2", args, matches!(args.len(), 1 | 2))?;
            let n = Num::of(&args[0]).ok_or_else(|| GateError::mismatch(name, describe(&args[0])))?;
            match args.get(1).map(Num::of) {
                None => Ok(Value::from(n.as_f64().round() as i64)),
                Some(Some(Num::Int(digits))) => {
                    let scale = 10f64.powi(digits.clamp(-300, 300) as i32);
                    float(name, (n.as_f64() * scale).round() / scale)
                }
                Some(_) => Err(GateError::mismatch(name, "digits must be an integer")),
            }
        }
        "pow" => {
            arity(name, "2", args, args.len() == 2)?;
            binary(BinaryOp::Pow, &args[0], &args[1])
        }
        "min" | "max" => {
            let items: &[Value] = match args {
                [Value::Array(items)] => items,
                _ => args,
            };
            arity(name, "at least 1", args, !items.is_empty())?;
            let mut best = &items[0];
            for item in &items[1..] {
                let ord = compare(BinaryOp::Lt, item, best)?;
                let better = if name == "min" {
                    ord == Ordering::Less
                } else {
                    ord == Ordering::Greater
                };
                if better {
                    best = item;
                }
            }
            Ok(best.clone())
        }
        "len" => {
            arity(name, "1", args, args.len() == 1)?;
            match &args[0] {
                Value::String(s) => Ok(Value::from(s.chars().count())),
                Value::Array(a) => Ok(Value::from(a.len())),
                Value::Object(o) => Ok(Value::from(o.len())),
                other => Err(GateError::mismatch(name, describe(other))),
            }
        }
        "str" => {
            arity(name, "1", args, args.len() == 1)?;
            Ok(Value::String(match &args[0] {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            }))
        }
        "int" | "float" => {
            arity(name, "1", args, args.len() == 1)?;
            let n = match &args[0] {
                Value::String(s) => s
                    .trim()
                    .parse::<f64>()
                    .map_err(|_| GateError::mismatch(name, format!("cannot parse {s:?}")))?,
                Value::Bool(b) => f64::from(u8::from(*b)),
                other => Num::of(other)
                    .ok_or_else(|| GateError::mismatch(name, describe(other)))?
                    .as_f64(),
            };
            if name == "int" {
                Ok(Value::from(n.trunc() as i64))
            } else {
                float(name, n)
            }
        }
        "now" => {
            arity(name, "0", args, args.is_empty())?;
            float(name, Timestamp::now().as_secs())
        }
        _ => Err(GateError::UnknownFunction(name.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Expression;
    use proptest::prelude::*;
    use serde_json::json;

    fn eval_with(source: &str, metadata: Value) -> GateResult<Value> {
        let bindings = Bindings::from_metadata(metadata.as_object().unwrap());
        Expression::compile(source)?.eval(&bindings)
    }

    fn eval(source: &str) -> Value {
        eval_with(source, json!({})).unwrap()
    }

    // ---- Arithmetic ----

    #[test]
    fn integer_arithmetic_stays_integral() {
        assert_eq!(eval("1 + 2 * 3"), json!(7));
        assert_eq!(eval("(1 + 2) * 3"), json!(9));
        assert_eq!(eval("7 % 3"), json!(1));
        assert_eq!(eval("-7 % 3"), json!(2));
        assert_eq!(eval("2 ** 10"), json!(1024));
        assert_eq!(eval("-2 ** 2"), json!(-4));
    }

    #[test]
    fn division_is_float() {
        assert_eq!(eval("7 / 2"), json!(3.5));
        assert_eq!(eval_with("1 / 0", json!({})), Err(GateError::DivisionByZero));
        assert_eq!(eval_with("1 % 0", json!({})), Err(GateError::DivisionByZero));
    }

    #[test]
    fn overflowing_integer_ops_fall_back_to_float() {
        assert_eq!(eval("(-9223372036854775807 - 1) % -1"), json!(0.0));
        assert_eq!(eval("9223372036854775807 + 1"), json!(9223372036854775808.0));
    }

    #[test]
    fn strings_and_lists() {
        assert_eq!(eval("'a' + 'b'"), json!("ab"));
        assert_eq!(eval("len('héllo')"), json!(5));
        assert_eq!(eval("'ell' in 'hello'"), json!(true));
        assert_eq!(eval("'z' not in 'hello'"), json!(true));
    }

    // ---- Bindings ----

    #[test]
    fn metadata_paths() {
        let meta = json!({"count": 3, "owner": {"name": "ada"}, "tags": ["x", "y"]});
        assert_eq!(eval_with("count + 1", meta.clone()).unwrap(), json!(4));
        assert_eq!(eval_with("owner.name", meta.clone()).unwrap(), json!("ada"));
        assert_eq!(eval_with("owner.missing", meta.clone()).unwrap(), Value::Null);
        assert_eq!(eval_with("'y' in tags", meta.clone()).unwrap(), json!(true));
        assert_eq!(
            eval_with("nope", meta),
            Err(GateError::UnknownVariable("nope".into()))
        );
    }

    #[test]
    fn helpers_are_bound() {
        assert!(eval("now").as_f64().unwrap() > 1_577_836_800.0);
        assert!(eval("now() >= now").as_bool().unwrap());
        assert_eq!(eval("round(pi, 2)"), json!(3.14));
        assert_eq!(eval_with("pi", json!({"pi": 3})).unwrap(), json!(3));
    }

    // ---- Logic ----

    #[test]
    fn logic_short_circuits() {
        assert_eq!(eval("0 or 'default'"), json!("default"));
        assert_eq!(eval("false and missing"), json!(false));
        assert_eq!(eval("not 0"), json!(true));
        assert_eq!(eval("1 < 2 and 2 <= 2 and 3 > 2 and 'b' >= 'a'"), json!(true));
        assert_eq!(eval("1 == 1.0"), json!(true));
        assert_eq!(eval("null == null"), json!(true));
    }

    #[test]
    fn builtins() {
        assert_eq!(eval("abs(-3)"), json!(3));
        assert_eq!(eval("max(1, 5, 3)"), json!(5));
        assert_eq!(eval("min(4, 2.5)"), json!(2.5));
        assert_eq!(eval("floor(2.7) + ceil(2.1)"), json!(5));
        assert_eq!(eval("sqrt(16)"), json!(4.0));
        assert_eq!(eval("int('42') + float(1)"), json!(43.0));
        assert_eq!(eval("str(12)"), json!("12"));
    }

    #[test]
    fn sandbox_rejects_unknown_functions_and_bad_types() {
        assert_eq!(
            eval_with("open('x')", json!({})),
            Err(GateError::UnknownFunction("open".into()))
        );
        assert!(matches!(eval_with("'a' - 1", json!({})), Err(GateError::TypeMismatch { .. })));
        assert!(matches!(eval_with("len()", json!({})), Err(GateError::Arity { .. })));
    }

    proptest! {
        #[test]
        fn addition_matches_i64(a in -1_000_000i64..1_000_000, b in -1_000_000i64..1_000_000) {
            let value = eval_with("a + b", json!({"a": a, "b": b})).unwrap();
            prop_assert_eq!(value, json!(a + b));
        }

        #[test]
        fn comparison_is_consistent(a in -1000i64..1000, b in -1000i64..1000) {
            let lt = eval_with("a < b", json!({"a": a, "b": b})).unwrap();
            let ge = eval_with("not (a >= b)", json!({"a": a, "b": b})).unwrap();
            prop_assert_eq!(lt, ge);
        }
    }
}
