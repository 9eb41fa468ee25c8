//! Named source units, their dependency edges, and evaluation.

use std::collections::HashMap;
use std::rc::Rc;

use indexmap::IndexMap;
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::debug;

use crate::dist::{Dist, Sampler};
use crate::error::EvalError;
use crate::interp::Interpreter;
use crate::scope::Scope;
use crate::value::Value;

/// Evaluation settings shared by every unit of a project.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Environment {
    /// Samples drawn per distribution, both during evaluation and when
    /// results are sampled afterwards.
    pub sample_count: usize,
    /// Point count for point-set conversions; accepted for compatibility
    /// with engines that use it.
    pub xy_point_length: usize,
    /// Fixed RNG seed; `None` seeds from OS entropy.
    pub seed: Option<u64>,
}

impl Default for Environment {
    fn default() -> Self {
        Environment {
            sample_count: 10_000,
            xy_point_length: 1_000,
            seed: None,
        }
    }
}

impl Environment {
    pub fn rng(&self) -> StdRng {
        match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        }
    }
}

/// The evaluation engine boundary: register named source units, declare
/// which units a unit continues from, run, and read back per-unit results.
pub trait Engine: Sampler {
    fn set_environment(&mut self, env: Environment);

    fn environment(&self) -> &Environment;

    fn set_source(&mut self, name: &str, code: &str);

    /// `name` may read the bindings defined by each unit in `deps`.
    fn set_continues(&mut self, name: &str, deps: &[&str]);

    /// Evaluate `entry` and every unit it transitively continues from.
    fn run_all(&mut self, entry: &str);

    /// `None` until the unit has been run.
    fn get_result(&self, name: &str) -> Option<Result<Value, EvalError>>;
}

struct Outcome {
    result: Result<Value, EvalError>,
    bindings: Rc<IndexMap<String, Value>>,
}

/// Built-in reference engine.
pub struct Project {
    env: Environment,
    rng: StdRng,
    sources: IndexMap<String, String>,
    continues: HashMap<String, Vec<String>>,
    outcomes: HashMap<String, Outcome>,
}

impl Default for Project {
    fn default() -> Self {
        Project::new(Environment::default())
    }
}

impl Project {
    pub fn new(env: Environment) -> Self {
        Project {
            rng: env.rng(),
            env,
            sources: IndexMap::new(),
            continues: HashMap::new(),
            outcomes: HashMap::new(),
        }
    }

    /// Bindings a unit exported after it ran successfully.
    pub fn bindings(&self, name: &str) -> Option<&IndexMap<String, Value>> {
        self.outcomes
            .get(name)
            .filter(|o| o.result.is_ok())
            .map(|o| o.bindings.as_ref())
    }

    fn run_unit(
        &mut self,
        name: &str,
        stack: &mut Vec<String>,
    ) -> Result<Rc<IndexMap<String, Value>>, EvalError> {
        if let Some(outcome) = self.outcomes.get(name) {
            return match &outcome.result {
                Ok(_) => Ok(outcome.bindings.clone()),
                Err(e) => Err(e.clone()),
            };
        }
        if stack.iter().any(|s| s == name) {
            return Err(EvalError::DependencyCycle {
                unit: name.to_owned(),
            });
        }
        let Some(source) = self.sources.get(name).cloned() else {
            return Err(EvalError::UnknownUnit {
                name: name.to_owned(),
            });
        };

        stack.push(name.to_owned());
        let deps = self.continues.get(name).cloned().unwrap_or_default();
        let mut visible = IndexMap::new();
        let mut failure = None;
        for dep in &deps {
            match self.run_unit(dep, stack) {
                Ok(bindings) => {
                    visible.extend(bindings.iter().map(|(k, v)| (k.clone(), v.clone())));
                }
                Err(e) => {
                    failure = Some(EvalError::DependencyFailed {
                        unit: dep.clone(),
                        source: Box::new(e),
                    });
                    break;
                }
            }
        }
        stack.pop();

        let (result, bindings) = match failure {
            Some(e) => (Err(e), IndexMap::new()),
            None => self.evaluate_source(name, &source, visible),
        };
        debug!(unit = name, ok = result.is_ok(), "evaluated source unit");

        let bindings = Rc::new(bindings);
        let ret = match &result {
            Ok(_) => Ok(bindings.clone()),
            Err(e) => Err(e.clone()),
        };
        self.outcomes
            .insert(name.to_owned(), Outcome { result, bindings });
        ret
    }

    fn evaluate_source(
        &mut self,
        name: &str,
        source: &str,
        visible: IndexMap<String, Value>,
    ) -> (Result<Value, EvalError>, IndexMap<String, Value>) {
        let program = match sqexport_core::parse(source, name) {
            Ok(p) => p,
            Err(e) => return (Err(e.into()), IndexMap::new()),
        };
        let mut scope = Scope::child(Rc::new(Scope::with_bindings(visible)));
        let result =
            Interpreter::new(&self.env, &mut self.rng).eval_statements(&program.statements, &mut scope);
        (result, scope.into_bindings())
    }
}

impl Sampler for Project {
    fn sample_n(&mut self, dist: &Dist, n: usize) -> Vec<f64> {
        dist.sample_n(n, &mut self.rng)
    }
}

impl Engine for Project {
    fn set_environment(&mut self, env: Environment) {
        self.rng = env.rng();
        self.env = env;
        self.outcomes.clear();
    }

    fn environment(&self) -> &Environment {
        &self.env
    }

    fn set_source(&mut self, name: &str, code: &str) {
        self.sources.insert(name.to_owned(), code.to_owned());
        self.outcomes.clear();
    }

    fn set_continues(&mut self, name: &str, deps: &[&str]) {
        self.continues.insert(
            name.to_owned(),
            deps.iter().map(|d| (*d).to_owned()).collect(),
        );
        self.outcomes.clear();
    }

    fn run_all(&mut self, entry: &str) {
        debug!(entry, units = self.sources.len(), "running project");
        if let Err(e) = self.run_unit(entry, &mut Vec::new()) {
            debug!(entry, error = %e, "entry unit failed");
            // Unknown entries fail before an outcome is stored.
            self.outcomes.entry(entry.to_owned()).or_insert(Outcome {
                result: Err(e),
                bindings: Rc::new(IndexMap::new()),
            });
        }
    }

    fn get_result(&self, name: &str) -> Option<Result<Value, EvalError>> {
        self.outcomes.get(name).map(|o| o.result.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seeded(sample_count: usize) -> Project {
        Project::new(Environment {
            sample_count,
            seed: Some(42),
            ..Environment::default()
        })
    }

    fn number(result: Option<Result<Value, EvalError>>) -> f64 {
        match result {
            Some(Ok(Value::Number(n))) => n,
            other => panic!("expected Number, got {:?}", other),
        }
    }

    #[test]
    fn main_reads_include_bindings() {
        let mut project = seeded(10);
        project.set_source("main", "result = $y + 1");
        project.set_source("include", "$y = 5\n");
        project.set_continues("main", &["include"]);
        project.run_all("main");
        assert_eq!(number(project.get_result("main")), 6.0);
        assert_eq!(number(project.get_result("include")), 5.0);
    }

    #[test]
    fn unrun_unit_has_no_result() {
        let mut project = seeded(10);
        project.set_source("main", "1");
        assert!(project.get_result("main").is_none());
        project.run_all("main");
        assert!(project.get_result("main").is_some());
        assert!(project.get_result("other").is_none());
    }

    #[test]
    fn parse_failure_is_reported_as_result() {
        let mut project = seeded(10);
        project.set_source("main", "x = = 2");
        project.run_all("main");
        match project.get_result("main") {
            Some(Err(EvalError::Parse(e))) => {
                assert_eq!(e.unit, "main");
                assert_eq!(e.line, 1);
            }
            other => panic!("expected parse error, got {:?}", other),
        }
    }

    #[test]
    fn failing_dependency_fails_dependant() {
        let mut project = seeded(10);
        project.set_source("main", "1");
        project.set_source("include", "$a = missing");
        project.set_continues("main", &["include"]);
        project.run_all("main");
        let err = project.get_result("main").unwrap().unwrap_err();
        assert_eq!(
            err.to_string(),
            "in dependency 'include': missing is not defined"
        );
    }

    #[test]
    fn missing_dependency_is_unknown_unit() {
        let mut project = seeded(10);
        project.set_source("main", "1");
        project.set_continues("main", &["nope"]);
        project.run_all("main");
        let err = project.get_result("main").unwrap().unwrap_err();
        assert!(matches!(
            err,
            EvalError::DependencyFailed { source, .. }
                if *source == EvalError::UnknownUnit { name: "nope".into() }
        ));
    }

    #[test]
    fn unknown_entry_is_recorded() {
        let mut project = seeded(10);
        project.run_all("main");
        assert!(matches!(
            project.get_result("main"),
            Some(Err(EvalError::UnknownUnit { name })) if name == "main"
        ));
    }

    #[test]
    fn cycles_are_detected() {
        let mut project = seeded(10);
        project.set_source("a", "1");
        project.set_source("b", "2");
        project.set_continues("a", &["b"]);
        project.set_continues("b", &["a"]);
        project.run_all("a");
        let err = project.get_result("a").unwrap().unwrap_err();
        assert!(err.to_string().contains("dependency cycle"), "{}", err);
    }

    #[test]
    fn shared_dependency_runs_once() {
        let mut project = seeded(10);
        project.set_source("base", "$d = 1 to 2");
        project.set_source("left", "l = mean($d)");
        project.set_source("right", "r = mean($d)");
        project.set_source("main", "l == r");
        project.set_continues("left", &["base"]);
        project.set_continues("right", &["base"]);
        project.set_continues("main", &["left", "right"]);
        project.run_all("main");
        assert!(matches!(project.get_result("main"), Some(Ok(Value::Bool(true)))));
        assert!(project.bindings("base").unwrap().contains_key("$d"));
    }

    #[test]
    fn setting_source_invalidates_results() {
        let mut project = seeded(10);
        project.set_source("main", "1");
        project.run_all("main");
        project.set_source("main", "2");
        assert!(project.get_result("main").is_none());
        project.run_all("main");
        assert_eq!(number(project.get_result("main")), 2.0);
    }

    #[test]
    fn seeded_runs_are_reproducible() {
        let sample = |seed| {
            let mut project = Project::new(Environment {
                seed: Some(seed),
                sample_count: 5,
                ..Environment::default()
            });
            project.set_source("main", "sample(normal(0, 1))");
            project.run_all("main");
            number(project.get_result("main"))
        };
        assert_eq!(sample(9), sample(9));
    }
}
