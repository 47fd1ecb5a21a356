//! A small sandboxed interpreter for a JavaScript-like scripting subset.
//!
//! Scripts have no filesystem, network, process or module access. The only
//! host surface is three functions:
//!
//! - `getInternalState()` returns the current state snapshot
//! - `updateSelfModel(obj)` merges fields into the state and returns the result
//! - `addLog(msg)` appends a line to the response log
//!
//! Every statement and expression costs one unit of fuel. A script that
//! exhausts its budget is stopped with an error, so runaway loops terminate.

mod interp;
mod lexer;
mod parser;
mod value;

use serde_json::{Map, Value as Json};

/// What a script may reach outside itself.
pub trait Host {
    fn internal_state(&mut self) -> Json;
    fn update_self_model(&mut self, delta: Map<String, Json>) -> Json;
    fn add_log(&mut self, line: String);
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ScriptError {
    #[error("SyntaxError: {message} (line {line})")]
    Syntax { message: String, line: usize },

    #[error("ReferenceError: {0} is not defined")]
    Reference(String),

    #[error("TypeError: {0}")]
    Type(String),

    #[error("RangeError: {0}")]
    Range(String),

    #[error("Uncaught {0}")]
    Thrown(String),

    #[error("execution budget of {0} steps exhausted")]
    OutOfFuel(u64),
}

impl ScriptError {
    pub fn syntax(message: impl Into<String>, line: usize) -> Self {
        Self::Syntax {
            message: message.into(),
            line,
        }
    }
}

/// Result of a completed script.
#[derive(Debug, Clone, PartialEq)]
pub struct Outcome {
    /// The top-level `return` value, if the script returned something
    pub value: Option<Json>,
    pub steps: u64,
}

/// Parse and run `source` against `host` with at most `fuel` steps.
pub fn run(source: &str, host: &mut dyn Host, fuel: u64) -> Result<Outcome, ScriptError> {
    let program = parser::parse_program(source)?;
    let mut interpreter = interp::Interpreter::new(host, fuel);
    let value = interpreter.run(&program)?;
    Ok(Outcome {
        value: match value {
            value::Value::Undefined => None,
            other => Some(other.to_json()),
        },
        steps: interpreter.steps(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Default)]
    struct RecordingHost {
        state: Map<String, Json>,
        logs: Vec<String>,
    }

    impl RecordingHost {
        fn new() -> Self {
            let state = json!({"coherence": 0.85, "novelty": 0.7});
            Self {
                state: state.as_object().cloned().unwrap_or_default(),
                logs: Vec::new(),
            }
        }
    }

    impl Host for RecordingHost {
        fn internal_state(&mut self) -> Json {
            Json::Object(self.state.clone())
        }

        fn update_self_model(&mut self, delta: Map<String, Json>) -> Json {
            self.state.extend(delta);
            Json::Object(self.state.clone())
        }

        fn add_log(&mut self, line: String) {
            self.logs.push(line);
        }
    }

    fn eval(source: &str) -> Result<Option<Json>, ScriptError> {
        run(source, &mut RecordingHost::new(), 10_000).map(|o| o.value)
    }

    #[test]
    fn arithmetic_and_return() {
        assert_eq!(eval("return 2 + 3 * 4;").unwrap(), Some(json!(14)));
        assert_eq!(eval("return (2 + 3) * 4 % 7;").unwrap(), Some(json!(6)));
        assert_eq!(eval("return 7 / 2;").unwrap(), Some(json!(3.5)));
        assert_eq!(eval("return 'a' + 1 + 2;").unwrap(), Some(json!("a12")));
    }

    #[test]
    fn no_return_yields_none() {
        assert_eq!(eval("let x = 1; x += 2;").unwrap(), None);
    }

    #[test]
    fn host_functions_round_trip() {
        let mut host = RecordingHost::new();
        let outcome = run(
            r#"
            const s = getInternalState();
            addLog(`coherence is ${s.coherence}`);
            const next = updateSelfModel({ novelty: Math.min(1, s.novelty + 0.1) });
            return next.novelty.toFixed(2);
            "#,
            &mut host,
            10_000,
        )
        .unwrap();
        assert_eq!(outcome.value, Some(json!("0.80")));
        assert_eq!(host.logs, vec!["coherence is 0.85"]);
        assert_eq!(host.state["novelty"], json!(0.7999999999999999));
        assert!(outcome.steps > 0);
    }

    #[test]
    fn loops_objects_and_arrays() {
        let result = eval(
            r#"
            let items = [];
            for (let i = 0; i < 5; i++) {
                if (i === 3) { continue; }
                items.push(i * 2);
            }
            let counts = { even: 0 };
            let n = 0;
            while (true) {
                n++;
                if (n > 4) break;
                counts.even += n % 2 === 0 ? 1 : 0;
            }
            return { items, joined: items.join('-'), counts, len: items.length };
            "#,
        )
        .unwrap();
        assert_eq!(
            result,
            Some(json!({
                "items": [0, 2, 4, 8],
                "joined": "0-2-4-8",
                "counts": {"even": 2},
                "len": 4
            }))
        );
    }

    #[test]
    fn block_scoping_and_const() {
        assert_eq!(
            eval("let x = 1; { let x = 2; } return x;").unwrap(),
            Some(json!(1))
        );
        let err = eval("const x = 1; x = 2;").unwrap_err();
        assert!(matches!(err, ScriptError::Type(_)));
        // const objects stay mutable
        assert_eq!(
            eval("const o = {}; o.a = 1; return o;").unwrap(),
            Some(json!({"a": 1}))
        );
    }

    #[test]
    fn runaway_loop_runs_out_of_fuel() {
        let err = run("while (true) {}", &mut RecordingHost::new(), 500).unwrap_err();
        assert_eq!(err, ScriptError::OutOfFuel(500));
    }

    #[test]
    fn unknown_identifiers_and_escape_hatches_fail() {
        assert!(matches!(eval("return x;"), Err(ScriptError::Reference(_))));
        assert!(matches!(eval("require('fs')"), Err(ScriptError::Reference(_))));
        assert!(matches!(eval("fetch('http://x')"), Err(ScriptError::Reference(_))));
        assert!(matches!(eval("process.exit(1)"), Err(ScriptError::Reference(_))));
        assert!(matches!(eval("let a = 1; a()"), Err(ScriptError::Type(_))));
    }

    #[test]
    fn thrown_errors_surface_message() {
        let err = eval("throw new Error('bad state');").unwrap_err();
        assert_eq!(err.to_string(), "Uncaught Error: bad state");
    }

    #[test]
    fn typeof_and_nullish() {
        assert_eq!(
            eval("return [typeof missing, typeof 1, null ?? 'd', 0 || 'f'];").unwrap(),
            Some(json!(["undefined", "number", "d", "f"]))
        );
    }

    #[test]
    fn memory_growth_is_bounded() {
        let err = run(
            "let s = 'xxxxxxxxxxxxxxxx'; while (true) { s = s + s; }",
            &mut RecordingHost::new(),
            100_000,
        )
        .unwrap_err();
        assert!(matches!(err, ScriptError::Range(_)));
    }

    #[test]
    fn update_self_model_requires_object() {
        let err = eval("updateSelfModel(3)").unwrap_err();
        assert!(err.to_string().contains("expects an object"));
    }

    #[test]
    fn only_math_intrinsics_are_global() {
        assert_eq!(eval("return Math.max(1, 4) + Math.floor(2.7);").unwrap(), Some(json!(6)));
        assert!(matches!(
            eval("return JSON.stringify({ a: 1 });"),
            Err(ScriptError::Reference(_))
        ));
        assert!(matches!(
            eval("return Object.keys({ x: 1 });"),
            Err(ScriptError::Reference(_))
        ));
        assert_eq!(
            eval("return 'a,b'.split(',').concat(['C'.toLowerCase()]);").unwrap(),
            Some(json!(["a", "b", "c"]))
        );
    }
}
