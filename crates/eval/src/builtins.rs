//! Built-in functions of the reference engine.
//!
//! Builtins are resolved only at call sites and only when the name is not
//! bound in scope, so user definitions shadow them.

use crate::dist::Dist;
use crate::error::EvalError;
use crate::interp::Interpreter;
use crate::value::Value;

const BUILTINS: &[&str] = &[
    "normal",
    "lognormal",
    "uniform",
    "beta",
    "triangular",
    "pointMass",
    "mean",
    "stdev",
    "sample",
    "sampleN",
    "min",
    "max",
    "abs",
    "sqrt",
    "exp",
    "log",
    "floor",
    "ceil",
    "round",
    "length",
    "sum",
    "map",
    "concat",
];

pub(crate) fn is_builtin(name: &str) -> bool {
    BUILTINS.contains(&name)
}

pub(crate) fn call(
    interp: &mut Interpreter<'_>,
    name: &str,
    args: Vec<Value>,
) -> Result<Value, EvalError> {
    match name {
        "normal" => {
            arity(name, &args, 2)?;
            Dist::normal(number(name, &args, 0)?, number(name, &args, 1)?).map(Value::Dist)
        }
        "lognormal" => {
            arity(name, &args, 2)?;
            Dist::lognormal(number(name, &args, 0)?, number(name, &args, 1)?).map(Value::Dist)
        }
        "uniform" => {
            arity(name, &args, 2)?;
            Dist::uniform(number(name, &args, 0)?, number(name, &args, 1)?).map(Value::Dist)
        }
        "beta" => {
            arity(name, &args, 2)?;
            Dist::beta(number(name, &args, 0)?, number(name, &args, 1)?).map(Value::Dist)
        }
        "triangular" => {
            arity(name, &args, 3)?;
            Dist::triangular(
                number(name, &args, 0)?,
                number(name, &args, 1)?,
                number(name, &args, 2)?,
            )
            .map(Value::Dist)
        }
        "pointMass" => {
            arity(name, &args, 1)?;
            Dist::point_mass(number(name, &args, 0)?).map(Value::Dist)
        }
        "mean" | "stdev" | "sample" => {
            arity(name, &args, 1)?;
            match &args[0] {
                Value::Dist(d) => Ok(Value::Number(match name {
                    "mean" => d.mean(),
                    "stdev" => d.stdev(),
                    _ => d.sample(interp.rng),
                })),
                Value::Number(n) => Ok(Value::Number(if name == "stdev" { 0.0 } else { *n })),
                other => Err(expected(name, "a Dist", other)),
            }
        }
        "sampleN" => {
            arity(name, &args, 2)?;
            let n = count(name, &args, 1)?;
            match &args[0] {
                Value::Dist(d) => Ok(Value::Array(
                    d.sample_n(n, interp.rng)
                        .into_iter()
                        .map(Value::Number)
                        .collect(),
                )),
                other => Err(expected(name, "a Dist", other)),
            }
        }
        "min" | "max" => {
            let values = if args.len() == 1 {
                numbers(name, &args[0])?
            } else {
                (0..args.len())
                    .map(|i| number(name, &args, i))
                    .collect::<Result<Vec<_>, _>>()?
            };
            let folded = values.into_iter().reduce(|a, b| {
                if name == "min" {
                    a.min(b)
                } else {
                    a.max(b)
                }
            });
            folded
                .map(Value::Number)
                .ok_or_else(|| EvalError::type_error(format!("{} of an empty list", name)))
        }
        "abs" | "sqrt" | "exp" | "log" | "floor" | "ceil" | "round" => {
            arity(name, &args, 1)?;
            let x = number(name, &args, 0)?;
            Ok(Value::Number(match name {
                "abs" => x.abs(),
                "sqrt" => x.sqrt(),
                "exp" => x.exp(),
                "log" => x.ln(),
                "floor" => x.floor(),
                "ceil" => x.ceil(),
                _ => x.round(),
            }))
        }
        "length" => {
            arity(name, &args, 1)?;
            match &args[0] {
                Value::Array(items) => Ok(Value::Number(items.len() as f64)),
                Value::String(s) => Ok(Value::Number(s.chars().count() as f64)),
                other => Err(expected(name, "an Array or String", other)),
            }
        }
        "sum" => {
            arity(name, &args, 1)?;
            Ok(Value::Number(numbers(name, &args[0])?.into_iter().sum()))
        }
        "map" => {
            arity(name, &args, 2)?;
            let mut args = args.into_iter();
            let (items, f) = match (args.next(), args.next()) {
                (Some(Value::Array(items)), Some(Value::Lambda(f))) => (items, f),
                (Some(Value::Array(_)), Some(other)) => {
                    return Err(expected(name, "a function as argument 2", &other))
                }
                (Some(other), _) => return Err(expected(name, "an Array as argument 1", &other)),
                _ => return Err(EvalError::type_error("map expects 2 arguments")),
            };
            items
                .into_iter()
                .map(|item| interp.call_lambda(&f, vec![item]))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array)
        }
        "concat" => {
            arity(name, &args, 2)?;
            match (&args[0], &args[1]) {
                (Value::Array(a), Value::Array(b)) => {
                    Ok(Value::Array(a.iter().chain(b.iter()).cloned().collect()))
                }
                (Value::String(a), Value::String(b)) => Ok(Value::String(format!("{}{}", a, b))),
                (other, _) => Err(expected(name, "two Arrays or two Strings", other)),
            }
        }
        _ => Err(EvalError::UnboundName {
            name: name.to_owned(),
        }),
    }
}

fn arity(function: &str, args: &[Value], expected: usize) -> Result<(), EvalError> {
    if args.len() != expected {
        return Err(EvalError::Arity {
            function: function.to_owned(),
            expected,
            got: args.len(),
        });
    }
    Ok(())
}

fn number(function: &str, args: &[Value], i: usize) -> Result<f64, EvalError> {
    match &args[i] {
        Value::Number(n) => Ok(*n),
        other => Err(EvalError::type_error(format!(
            "{} expects a Number as argument {}, got {}",
            function,
            i + 1,
            other.tag()
        ))),
    }
}

fn count(function: &str, args: &[Value], i: usize) -> Result<usize, EvalError> {
    let n = number(function, args, i)?;
    if n < 0.0 || n.fract() != 0.0 || !n.is_finite() {
        return Err(EvalError::type_error(format!(
            "{} expects a non-negative integer as argument {}, got {}",
            function,
            i + 1,
            n
        )));
    }
    Ok(n as usize)
}

fn numbers(function: &str, v: &Value) -> Result<Vec<f64>, EvalError> {
    match v {
        Value::Array(items) => items
            .iter()
            .map(|item| {
                item.as_number().ok_or_else(|| {
                    EvalError::type_error(format!(
                        "{} expects an Array of Numbers, found {}",
                        function,
                        item.tag()
                    ))
                })
            })
            .collect(),
        other => Err(expected(function, "an Array of Numbers", other)),
    }
}

fn expected(function: &str, what: &str, got: &Value) -> EvalError {
    EvalError::type_error(format!("{} expects {}, got {}", function, what, got.tag()))
}
