//! Tree-walking evaluator for parsed source units.

use std::rc::Rc;

use indexmap::IndexMap;
use rand::rngs::StdRng;
use sqexport_core::{BinaryOp, Expr, Statement, UnaryOp};

use crate::builtins;
use crate::dist::Dist;
use crate::error::EvalError;
use crate::project::Environment;
use crate::scope::Scope;
use crate::value::{Lambda, Value};

const MAX_CALL_DEPTH: usize = 128;
/// Nested `eval` frames. Long operator chains parse iteratively into deep
/// trees, so the parser's nesting limit alone does not bound this.
const MAX_EVAL_DEPTH: usize = 256;

pub(crate) struct Interpreter<'a> {
    pub(crate) env: &'a Environment,
    pub(crate) rng: &'a mut StdRng,
    depth: usize,
    nesting: usize,
}

impl<'a> Interpreter<'a> {
    pub(crate) fn new(env: &'a Environment, rng: &'a mut StdRng) -> Self {
        Interpreter {
            env,
            rng,
            depth: 0,
            nesting: 0,
        }
    }

    /// Evaluate `statements` in order, defining bindings in `scope`. The
    /// value is that of the last statement, or `Void` when there is none.
    pub(crate) fn eval_statements(
        &mut self,
        statements: &[Statement],
        scope: &mut Scope,
    ) -> Result<Value, EvalError> {
        let mut last = Value::Void;
        for statement in statements {
            last = match statement {
                Statement::Let { name, value, .. } => {
                    let v = self.eval(value, scope)?;
                    scope.define(name.clone(), v.clone());
                    v
                }
                Statement::Defun {
                    name, params, body, ..
                } => {
                    let lambda = Value::Lambda(Rc::new(Lambda {
                        name: Some(name.clone()),
                        params: params.clone(),
                        body: body.clone(),
                        captured: Rc::new(scope.clone()),
                    }));
                    scope.define(name.clone(), lambda.clone());
                    lambda
                }
                Statement::Expr { expr, .. } => self.eval(expr, scope)?,
            };
        }
        Ok(last)
    }

    pub(crate) fn eval(&mut self, expr: &Expr, scope: &Scope) -> Result<Value, EvalError> {
        if self.nesting >= MAX_EVAL_DEPTH {
            return Err(EvalError::NestingExceeded(MAX_EVAL_DEPTH));
        }
        self.nesting += 1;
        let result = self.eval_expr(expr, scope);
        self.nesting -= 1;
        result
    }

    fn eval_expr(&mut self, expr: &Expr, scope: &Scope) -> Result<Value, EvalError> {
        match expr {
            Expr::Number(n) => Ok(Value::Number(*n)),
            Expr::Str(s) => Ok(Value::String(s.clone())),
            Expr::Bool(b) => Ok(Value::Bool(*b)),
            Expr::Ident(name) => scope
                .get(name)
                .cloned()
                .ok_or_else(|| EvalError::UnboundName { name: name.clone() }),
            Expr::Array(items) => items
                .iter()
                .map(|item| self.eval(item, scope))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array),
            Expr::Record(entries) => {
                let mut record = IndexMap::with_capacity(entries.len());
                for (key, value) in entries {
                    let v = self.eval(value, scope)?;
                    record.insert(key.clone(), v);
                }
                Ok(Value::Record(record))
            }
            Expr::Unary { op, operand } => {
                let v = self.eval(operand, scope)?;
                self.unary(*op, v)
            }
            Expr::Binary { op, lhs, rhs } => self.binary(*op, lhs, rhs, scope),
            Expr::Call { callee, args } => {
                let args = args
                    .iter()
                    .map(|a| self.eval(a, scope))
                    .collect::<Result<Vec<_>, _>>()?;
                if let Expr::Ident(name) = callee.as_ref() {
                    if scope.get(name).is_none() && builtins::is_builtin(name) {
                        return builtins::call(self, name, args);
                    }
                }
                match self.eval(callee, scope)? {
                    Value::Lambda(lambda) => self.call_lambda(&lambda, args),
                    other => Err(EvalError::type_error(format!(
                        "cannot call a value of type {}",
                        other.tag()
                    ))),
                }
            }
            Expr::Field { target, name } => match self.eval(target, scope)? {
                Value::Record(mut entries) => {
                    entries
                        .swap_remove(name)
                        .ok_or_else(|| EvalError::MissingField {
                            field: name.clone(),
                        })
                }
                other => Err(EvalError::type_error(format!(
                    "cannot access field '{}' of {}",
                    name,
                    other.tag()
                ))),
            },
            Expr::Index { target, index } => {
                let target = self.eval(target, scope)?;
                let index = self.eval(index, scope)?;
                index_value(target, index)
            }
            Expr::Lambda { params, body } => Ok(Value::Lambda(Rc::new(Lambda {
                name: None,
                params: params.clone(),
                body: body.as_ref().clone(),
                captured: Rc::new(scope.clone()),
            }))),
            Expr::Block(statements) => {
                let mut inner = Scope::child(Rc::new(scope.clone()));
                self.eval_statements(statements, &mut inner)
            }
            Expr::If {
                cond,
                then_branch,
                else_branch,
            } => match self.eval(cond, scope)? {
                Value::Bool(true) => self.eval(then_branch, scope),
                Value::Bool(false) => self.eval(else_branch, scope),
                other => Err(EvalError::type_error(format!(
                    "if condition must be a Boolean, got {}",
                    other.tag()
                ))),
            },
        }
    }

    pub(crate) fn call_lambda(
        &mut self,
        lambda: &Lambda,
        args: Vec<Value>,
    ) -> Result<Value, EvalError> {
        if args.len() != lambda.params.len() {
            return Err(EvalError::Arity {
                function: lambda.name.clone().unwrap_or_else(|| "lambda".to_owned()),
                expected: lambda.params.len(),
                got: args.len(),
            });
        }
        if self.depth >= MAX_CALL_DEPTH {
            return Err(EvalError::DepthExceeded(MAX_CALL_DEPTH));
        }
        let mut frame = Scope::child(lambda.captured.clone());
        for (param, arg) in lambda.params.iter().zip(args) {
            frame.define(param.clone(), arg);
        }
        self.depth += 1;
        let result = self.eval(&lambda.body, &frame);
        self.depth -= 1;
        result
    }

    fn unary(&mut self, op: UnaryOp, v: Value) -> Result<Value, EvalError> {
        match (op, v) {
            (UnaryOp::Neg, Value::Number(n)) => Ok(Value::Number(-n)),
            (UnaryOp::Neg, Value::Dist(d)) => {
                let samples = d.sample_n(self.env.sample_count, self.rng);
                Ok(Value::Dist(Dist::sample_set(
                    samples.into_iter().map(|x| -x).collect(),
                )?))
            }
            (UnaryOp::Not, Value::Bool(b)) => Ok(Value::Bool(!b)),
            (UnaryOp::Neg, other) => Err(EvalError::type_error(format!(
                "cannot negate {}",
                other.tag()
            ))),
            (UnaryOp::Not, other) => Err(EvalError::type_error(format!(
                "'!' expects a Boolean, got {}",
                other.tag()
            ))),
        }
    }

    fn binary(
        &mut self,
        op: BinaryOp,
        lhs: &Expr,
        rhs: &Expr,
        scope: &Scope,
    ) -> Result<Value, EvalError> {
        // Logical operators short-circuit.
        if matches!(op, BinaryOp::And | BinaryOp::Or) {
            let left = expect_bool(op, self.eval(lhs, scope)?)?;
            if (op == BinaryOp::And && !left) || (op == BinaryOp::Or && left) {
                return Ok(Value::Bool(left));
            }
            return Ok(Value::Bool(expect_bool(op, self.eval(rhs, scope)?)?));
        }
        let left = self.eval(lhs, scope)?;
        let right = self.eval(rhs, scope)?;
        self.apply(op, left, right)
    }

    fn apply(&mut self, op: BinaryOp, left: Value, right: Value) -> Result<Value, EvalError> {
        match (op, &left, &right) {
            (BinaryOp::To, Value::Number(a), Value::Number(b)) => {
                Ok(Value::Dist(Dist::credible_interval(*a, *b)?))
            }
            (_, Value::Number(a), Value::Number(b)) => match numeric(op, *a, *b) {
                Some(n) => Ok(Value::Number(n)),
                None => compare(op, *a, *b)
                    .map(Value::Bool)
                    .ok_or_else(|| mismatch(op, &left, &right)),
            },
            (BinaryOp::Add, Value::String(a), Value::String(b)) => {
                Ok(Value::String(format!("{}{}", a, b)))
            }
            (BinaryOp::Eq, Value::String(a), Value::String(b)) => Ok(Value::Bool(a == b)),
            (BinaryOp::Neq, Value::String(a), Value::String(b)) => Ok(Value::Bool(a != b)),
            (BinaryOp::Eq, Value::Bool(a), Value::Bool(b)) => Ok(Value::Bool(a == b)),
            (BinaryOp::Neq, Value::Bool(a), Value::Bool(b)) => Ok(Value::Bool(a != b)),
            (
                BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Pow,
                Value::Dist(_) | Value::Number(_),
                Value::Dist(_) | Value::Number(_),
            ) => {
                let xs = self.operand_samples(&left);
                let ys = self.operand_samples(&right);
                let combined = xs
                    .into_iter()
                    .zip(ys)
                    .filter_map(|(x, y)| numeric(op, x, y))
                    .collect();
                Ok(Value::Dist(Dist::sample_set(combined)?))
            }
            _ => Err(mismatch(op, &left, &right)),
        }
    }

    /// Samples for one side of a distribution operation; numbers broadcast.
    fn operand_samples(&mut self, v: &Value) -> Vec<f64> {
        let n = self.env.sample_count;
        match v {
            Value::Dist(d) => d.sample_n(n, self.rng),
            Value::Number(x) => vec![*x; n],
            _ => Vec::new(),
        }
    }
}

fn numeric(op: BinaryOp, a: f64, b: f64) -> Option<f64> {
    match op {
        BinaryOp::Add => Some(a + b),
        BinaryOp::Sub => Some(a - b),
        BinaryOp::Mul => Some(a * b),
        BinaryOp::Div => Some(a / b),
        BinaryOp::Pow => Some(a.powf(b)),
        _ => None,
    }
}

fn compare(op: BinaryOp, a: f64, b: f64) -> Option<bool> {
    match op {
        BinaryOp::Eq => Some(a == b),
        BinaryOp::Neq => Some(a != b),
        BinaryOp::Lt => Some(a < b),
        BinaryOp::Lte => Some(a <= b),
        BinaryOp::Gt => Some(a > b),
        BinaryOp::Gte => Some(a >= b),
        _ => None,
    }
}

fn expect_bool(op: BinaryOp, v: Value) -> Result<bool, EvalError> {
    match v {
        Value::Bool(b) => Ok(b),
        other => Err(EvalError::type_error(format!(
            "'{}' expects Boolean operands, got {}",
            op.symbol(),
            other.tag()
        ))),
    }
}

fn mismatch(op: BinaryOp, left: &Value, right: &Value) -> EvalError {
    EvalError::type_error(format!(
        "cannot apply '{}' to {} and {}",
        op.symbol(),
        left.tag(),
        right.tag()
    ))
}

fn index_value(target: Value, index: Value) -> Result<Value, EvalError> {
    match (target, index) {
        (Value::Array(mut items), Value::Number(i)) => {
            let len = items.len();
            if i.fract() != 0.0 || i < 0.0 || i >= len as f64 {
                return Err(EvalError::IndexOutOfBounds { index: i, len });
            }
            Ok(items.swap_remove(i as usize))
        }
        (Value::Record(mut entries), Value::String(key)) => entries
            .swap_remove(&key)
            .ok_or(EvalError::MissingField { field: key }),
        (target, index) => Err(EvalError::type_error(format!(
            "cannot index {} with {}",
            target.tag(),
            index.tag()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn run(src: &str) -> Result<Value, EvalError> {
        let env = Environment {
            sample_count: 100,
            ..Environment::default()
        };
        let mut rng = StdRng::seed_from_u64(1);
        let program = sqexport_core::parse(src, "test")?;
        let mut scope = Scope::default();
        Interpreter::new(&env, &mut rng).eval_statements(&program.statements, &mut scope)
    }

    fn number(src: &str) -> f64 {
        match run(src) {
            Ok(Value::Number(n)) => n,
            other => panic!("expected Number from {:?}, got {:?}", src, other),
        }
    }

    #[test]
    fn arithmetic_and_precedence() {
        assert_eq!(number("1 + 2 * 3"), 7.0);
        assert_eq!(number("(1 + 2) * 3"), 9.0);
        assert_eq!(number("2 ^ 3 ^ 2"), 512.0);
        assert_eq!(number("-2 ^ 2"), -4.0);
        assert_eq!(number("10 / 4"), 2.5);
    }

    #[test]
    fn final_assignment_is_the_result() {
        assert_eq!(number("x = 2\nresult = x * 3"), 6.0);
    }

    #[test]
    fn empty_program_is_void() {
        assert!(matches!(run(""), Ok(Value::Void)));
    }

    #[test]
    fn division_by_zero_is_infinite() {
        assert!(number("1 / 0").is_infinite());
    }

    #[test]
    fn records_keep_order_and_support_access() {
        match run("{z: 1, a: \"x\", m: true}") {
            Ok(Value::Record(entries)) => {
                let keys: Vec<&str> = entries.keys().map(String::as_str).collect();
                assert_eq!(keys, vec!["z", "a", "m"]);
            }
            other => panic!("expected Record, got {:?}", other),
        }
        assert_eq!(number("r = {a: {b: 4}}\nr.a.b"), 4.0);
        assert_eq!(number("r = {\"odd key\": 5}\nr[\"odd key\"]"), 5.0);
    }

    #[test]
    fn array_indexing() {
        assert_eq!(number("[10, 20, 30][1]"), 20.0);
        assert!(matches!(
            run("[1][3]"),
            Err(EvalError::IndexOutOfBounds { len: 1, .. })
        ));
    }

    #[test]
    fn functions_and_closures() {
        assert_eq!(number("f(x, y) = x * y\nf(3, 4)"), 12.0);
        assert_eq!(number("k = 10\nadd = {|x| x + k}\nadd(5)"), 15.0);
        assert_eq!(number("g(x) = { y = x + 1; y * 2 }\ng(1)"), 4.0);
    }

    #[test]
    fn function_definition_as_last_statement_is_lambda() {
        assert!(matches!(run("f(x) = x"), Ok(Value::Lambda(_))));
    }

    #[test]
    fn arity_mismatch() {
        let err = run("f(x) = x\nf(1, 2)").unwrap_err();
        assert_eq!(err.to_string(), "f expects 1 argument(s), got 2");
    }

    #[test]
    fn runaway_recursion_is_bounded() {
        let err = run("w = {|f| f(f)}\nw(w)").unwrap_err();
        assert_eq!(err, EvalError::DepthExceeded(MAX_CALL_DEPTH));
    }

    fn sum_of_ones(terms: usize) -> String {
        format!("1{}", " + 1".repeat(terms - 1))
    }

    #[test]
    fn long_sums_within_the_limit() {
        assert_eq!(number(&sum_of_ones(200)), 200.0);
    }

    #[test]
    fn overly_long_operator_chain_is_an_error() {
        let err = run(&sum_of_ones(5_000)).unwrap_err();
        assert_eq!(err, EvalError::NestingExceeded(MAX_EVAL_DEPTH));
        assert_eq!(
            err.to_string(),
            "expression nested too deeply (evaluation depth limit 256)"
        );
    }

    #[test]
    fn missing_field_message_stays_on_one_line() {
        let err = run("r = {a: 1}\nr[\"x\ny\"]").unwrap_err();
        assert_eq!(err.to_string(), r#"record has no field "x\ny""#);
    }

    #[test]
    fn unbound_name() {
        assert_eq!(
            run("x + 1").unwrap_err(),
            EvalError::UnboundName { name: "x".into() }
        );
    }

    #[test]
    fn conditionals_and_logic() {
        assert_eq!(number("if 1 < 2 && !false then 1 else 2"), 1.0);
        assert!(matches!(run("false && undefinedName"), Ok(Value::Bool(false))));
        assert!(run("if 1 then 2 else 3").is_err());
    }

    #[test]
    fn string_concatenation_and_mismatch() {
        assert!(matches!(run("\"a\" + \"b\""), Ok(Value::String(s)) if s == "ab"));
        assert_eq!(
            run("\"a\" + 1").unwrap_err().to_string(),
            "type error: cannot apply '+' to String and Number"
        );
    }

    #[test]
    fn dist_arithmetic_yields_sample_set() {
        match run("(1 to 10) * 2 + normal(0, 1)") {
            Ok(Value::Dist(Dist::SampleSet(samples))) => assert_eq!(samples.len(), 100),
            other => panic!("expected SampleSet, got {:?}", other),
        }
    }

    #[test]
    fn user_binding_shadows_builtin() {
        assert_eq!(number("normal(a, b) = a + b\nnormal(1, 2)"), 3.0);
    }
}
