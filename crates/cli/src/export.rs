//! The export pipeline: read the model and parameters, evaluate through an
//! [`Engine`], flatten the result and write it out.
//!
//! Source units:
//!
//! - `main` -- the user's model
//! - `include` -- generated `$key = value` parameter bindings; `main`
//!   continues from it

use std::io::{self, Write as _};
use std::path::{Path, PathBuf};

use serde_json::{Map, Value as Json};
use sqexport_codegen::{encode_params_with, CodegenError, EncodeOptions};
use sqexport_eval::{Engine, Environment, EvalError};
use sqexport_interchange::{flatten, to_json_string};
use tracing::{debug, info};

pub const MAIN_UNIT: &str = "main";
pub const INCLUDE_UNIT: &str = "include";

/// Where the flattened JSON goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputTarget {
    File(PathBuf),
    Stdout,
}

impl OutputTarget {
    /// `-` means stdout.
    pub fn from_arg(path: &Path) -> Self {
        if path.as_os_str() == "-" {
            OutputTarget::Stdout
        } else {
            OutputTarget::File(path.to_path_buf())
        }
    }
}

/// Everything one export run needs; no process-wide state is consulted.
#[derive(Debug, Clone)]
pub struct ExportConfig {
    pub input: PathBuf,
    pub output: OutputTarget,
    /// Parameter file; when absent, `default_params` is used.
    pub params: Option<PathBuf>,
    pub default_params: Map<String, Json>,
    pub environment: Environment,
    pub encode: EncodeOptions,
    pub pretty: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("error reading input file '{path}': {source}")]
    ReadInput { path: PathBuf, source: io::Error },

    #[error("error reading params file '{path}': {source}")]
    ReadParams { path: PathBuf, source: io::Error },

    #[error("invalid JSON in params file '{path}': {source}")]
    ParseParams {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("params file '{path}' must contain a JSON object")]
    ParamsNotObject { path: PathBuf },

    #[error(transparent)]
    Encode(#[from] CodegenError),

    #[error("{0}")]
    Config(String),

    /// The engine's diagnostic for a failed evaluation, shown as-is.
    #[error("{0}")]
    Evaluation(EvalError),

    #[error("engine produced no result for source unit '{0}'")]
    NoResult(String),

    #[error("error serializing output: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("error writing output file '{path}': {source}")]
    WriteOutput { path: PathBuf, source: io::Error },
}

impl ExportError {
    /// 1 for evaluation failures, 2 for I/O, parameter and config errors.
    pub fn exit_code(&self) -> i32 {
        match self {
            ExportError::Evaluation(_) | ExportError::NoResult(_) => 1,
            _ => 2,
        }
    }

    /// The single line printed to stderr.
    pub fn diagnostic(&self) -> String {
        match self {
            ExportError::Evaluation(e) => e.to_string(),
            other => format!("error: {}", other),
        }
    }
}

/// What a successful run wrote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportSummary {
    pub result_tag: &'static str,
    pub bytes: usize,
}

/// Parameters for this run: the params file when given, else the defaults.
pub fn load_params(config: &ExportConfig) -> Result<Map<String, Json>, ExportError> {
    let Some(path) = &config.params else {
        return Ok(config.default_params.clone());
    };
    let text = std::fs::read_to_string(path).map_err(|source| ExportError::ReadParams {
        path: path.clone(),
        source,
    })?;
    match serde_json::from_str::<Json>(&text) {
        Ok(Json::Object(map)) => Ok(map),
        Ok(_) => Err(ExportError::ParamsNotObject { path: path.clone() }),
        Err(source) => Err(ExportError::ParseParams {
            path: path.clone(),
            source,
        }),
    }
}

/// Source text of the `include` unit for this run.
pub fn generate_params(config: &ExportConfig) -> Result<String, ExportError> {
    let params = load_params(config)?;
    debug!(keys = params.len(), strict = config.encode.strict, "encoding parameters");
    Ok(encode_params_with(&params, config.encode)?)
}

pub fn run<E: Engine>(engine: &mut E, config: &ExportConfig) -> Result<ExportSummary, ExportError> {
    let code = std::fs::read_to_string(&config.input).map_err(|source| ExportError::ReadInput {
        path: config.input.clone(),
        source,
    })?;
    let include = generate_params(config)?;

    engine.set_environment(config.environment);
    engine.set_source(MAIN_UNIT, &code);
    engine.set_source(INCLUDE_UNIT, &include);
    engine.set_continues(MAIN_UNIT, &[INCLUDE_UNIT]);
    engine.run_all(MAIN_UNIT);

    let value = match engine.get_result(MAIN_UNIT) {
        Some(Ok(value)) => value,
        Some(Err(e)) => return Err(ExportError::Evaluation(e)),
        None => return Err(ExportError::NoResult(MAIN_UNIT.to_owned())),
    };
    debug!(tag = value.tag(), "evaluation succeeded");

    let json = flatten(&value, config.environment.sample_count, engine);
    let text = to_json_string(&json, config.pretty)?;
    write_output(&config.output, &text)?;
    Ok(ExportSummary {
        result_tag: value.tag(),
        bytes: text.len(),
    })
}

fn write_output(target: &OutputTarget, text: &str) -> Result<(), ExportError> {
    match target {
        OutputTarget::File(path) => {
            std::fs::write(path, text).map_err(|source| ExportError::WriteOutput {
                path: path.clone(),
                source,
            })?;
            info!(path = %path.display(), bytes = text.len(), "wrote output");
        }
        OutputTarget::Stdout => {
            let mut stdout = io::stdout().lock();
            writeln!(stdout, "{}", text)
                .and_then(|_| stdout.flush())
                .map_err(|source| ExportError::WriteOutput {
                    path: PathBuf::from("-"),
                    source,
                })?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use sqexport_eval::{Dist, Project, Sampler, Value};
    use std::fs;
    use tempfile::TempDir;

    /// Records what the pipeline asked of it and returns a canned result.
    struct ScriptedEngine {
        env: Environment,
        sources: Vec<(String, String)>,
        continues: Vec<(String, Vec<String>)>,
        ran: Option<String>,
        result: Option<Result<Value, EvalError>>,
    }

    impl ScriptedEngine {
        fn returning(result: Option<Result<Value, EvalError>>) -> Self {
            ScriptedEngine {
                env: Environment::default(),
                sources: Vec::new(),
                continues: Vec::new(),
                ran: None,
                result,
            }
        }
    }

    impl Sampler for ScriptedEngine {
        fn sample_n(&mut self, _dist: &Dist, n: usize) -> Vec<f64> {
            vec![0.5; n]
        }
    }

    impl Engine for ScriptedEngine {
        fn set_environment(&mut self, env: Environment) {
            self.env = env;
        }
        fn environment(&self) -> &Environment {
            &self.env
        }
        fn set_source(&mut self, name: &str, code: &str) {
            self.sources.push((name.to_owned(), code.to_owned()));
        }
        fn set_continues(&mut self, name: &str, deps: &[&str]) {
            self.continues.push((
                name.to_owned(),
                deps.iter().map(|d| (*d).to_owned()).collect(),
            ));
        }
        fn run_all(&mut self, entry: &str) {
            self.ran = Some(entry.to_owned());
        }
        fn get_result(&self, _name: &str) -> Option<Result<Value, EvalError>> {
            self.result.clone()
        }
    }

    fn config_in(dir: &TempDir, model: &str) -> ExportConfig {
        let input = dir.path().join("model.squiggle");
        fs::write(&input, model).unwrap();
        ExportConfig {
            input,
            output: OutputTarget::File(dir.path().join("out.json")),
            params: None,
            default_params: Map::new(),
            environment: Environment {
                sample_count: 4,
                seed: Some(1),
                ..Environment::default()
            },
            encode: EncodeOptions::default(),
            pretty: false,
        }
    }

    fn output_of(config: &ExportConfig) -> String {
        match &config.output {
            OutputTarget::File(p) => fs::read_to_string(p).unwrap(),
            OutputTarget::Stdout => panic!("stdout output"),
        }
    }

    #[test]
    fn registers_units_and_dependency() {
        let dir = TempDir::new().unwrap();
        let mut config = config_in(&dir, "result = $y + 1");
        config.default_params = json!({"y": 5}).as_object().unwrap().clone();
        let mut engine = ScriptedEngine::returning(Some(Ok(Value::Number(6.0))));

        run(&mut engine, &config).unwrap();

        assert_eq!(
            engine.sources,
            vec![
                ("main".to_owned(), "result = $y + 1".to_owned()),
                ("include".to_owned(), "$y = 5\n".to_owned()),
            ]
        );
        assert_eq!(
            engine.continues,
            vec![("main".to_owned(), vec!["include".to_owned()])]
        );
        assert_eq!(engine.ran.as_deref(), Some("main"));
        assert_eq!(engine.env.sample_count, 4);
        assert_eq!(output_of(&config), "6");
    }

    #[test]
    fn distributions_are_sampled_through_the_engine() {
        let dir = TempDir::new().unwrap();
        let config = config_in(&dir, "ignored");
        let dist = Dist::normal(0.0, 1.0).unwrap();
        let mut engine = ScriptedEngine::returning(Some(Ok(Value::Dist(dist))));

        let summary = run(&mut engine, &config).unwrap();

        assert_eq!(summary.result_tag, "Dist");
        assert_eq!(output_of(&config), r#"{"samples":[0.5,0.5,0.5,0.5]}"#);
    }

    #[test]
    fn evaluation_failure_writes_nothing() {
        let dir = TempDir::new().unwrap();
        let config = config_in(&dir, "ignored");
        let mut engine = ScriptedEngine::returning(Some(Err(EvalError::UnboundName {
            name: "x".into(),
        })));

        let err = run(&mut engine, &config).unwrap_err();

        assert_eq!(err.exit_code(), 1);
        assert_eq!(err.diagnostic(), "x is not defined");
        assert!(!dir.path().join("out.json").exists());
    }

    #[test]
    fn stale_output_is_left_alone_on_failure() {
        let dir = TempDir::new().unwrap();
        let config = config_in(&dir, "ignored");
        fs::write(dir.path().join("out.json"), "old").unwrap();
        let mut engine = ScriptedEngine::returning(Some(Err(EvalError::UnboundName {
            name: "x".into(),
        })));

        assert!(run(&mut engine, &config).is_err());
        assert_eq!(output_of(&config), "old");
    }

    #[test]
    fn missing_result_is_an_evaluation_failure() {
        let dir = TempDir::new().unwrap();
        let config = config_in(&dir, "ignored");
        let err = run(&mut ScriptedEngine::returning(None), &config).unwrap_err();
        assert!(matches!(err, ExportError::NoResult(ref unit) if unit == "main"));
        assert_eq!(err.exit_code(), 1);
    }

    #[test]
    fn missing_input_is_io_error() {
        let dir = TempDir::new().unwrap();
        let mut config = config_in(&dir, "");
        config.input = dir.path().join("nope.squiggle");
        let err = run(&mut ScriptedEngine::returning(None), &config).unwrap_err();
        assert!(matches!(err, ExportError::ReadInput { .. }));
        assert_eq!(err.exit_code(), 2);
        assert!(err.diagnostic().starts_with("error: error reading input file"));
    }

    #[test]
    fn params_file_overrides_defaults() {
        let dir = TempDir::new().unwrap();
        let mut config = config_in(&dir, "");
        config.default_params = json!({"a": 1}).as_object().unwrap().clone();
        let params = dir.path().join("params.json");
        fs::write(&params, r#"{"b": [1, 2]}"#).unwrap();
        config.params = Some(params);
        assert_eq!(generate_params(&config).unwrap(), "$b = [1,2]\n");
    }

    #[test]
    fn params_must_be_an_object() {
        let dir = TempDir::new().unwrap();
        let mut config = config_in(&dir, "");
        let params = dir.path().join("params.json");
        fs::write(&params, "[1, 2]").unwrap();
        config.params = Some(params);
        let err = load_params(&config).unwrap_err();
        assert!(matches!(err, ExportError::ParamsNotObject { .. }));
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn malformed_params_json() {
        let dir = TempDir::new().unwrap();
        let mut config = config_in(&dir, "");
        let params = dir.path().join("params.json");
        fs::write(&params, "{not json").unwrap();
        config.params = Some(params);
        assert!(matches!(
            load_params(&config).unwrap_err(),
            ExportError::ParseParams { .. }
        ));
    }

    #[test]
    fn strict_encoding_error_is_reported() {
        let dir = TempDir::new().unwrap();
        let mut config = config_in(&dir, "");
        config.default_params = json!({"1x": 1}).as_object().unwrap().clone();
        config.encode = EncodeOptions { strict: true };
        let err = generate_params(&config).unwrap_err();
        assert!(matches!(err, ExportError::Encode(CodegenError::InvalidKey(_))));
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn reference_engine_end_to_end() {
        let dir = TempDir::new().unwrap();
        let mut config = config_in(&dir, "{mean: mean(normal($mu, 1)), d: $mu to 10}");
        config.default_params = json!({"mu": 3}).as_object().unwrap().clone();
        let mut project = Project::new(config.environment);

        run(&mut project, &config).unwrap();

        let out: Json = serde_json::from_str(&output_of(&config)).unwrap();
        assert_eq!(out["mean"], json!(3));
        assert_eq!(out["d"]["samples"].as_array().unwrap().len(), 4);
    }
}
