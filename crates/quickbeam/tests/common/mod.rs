//! Helpers for running code and inspecting what it wrote

#![allow(dead_code)]

use parking_lot::Mutex;
use std::sync::Arc;

use quickbeam::{
    ByteSink, EvalContext, EvalError, Evaluator, InputPort, OutputPort, Ports, Reason, Value,
    ValueSink,
};

/// Everything a run produced.
pub struct Run {
    pub values: Vec<Value>,
    pub stdout: String,
    pub stderr: String,
    pub result: Result<(), EvalError>,
}

impl Run {
    /// Output values, as strings.
    pub fn strings(&self) -> Vec<String> {
        self.values.iter().map(Value::to_string).collect()
    }

    /// Panic unless the run succeeded.
    pub fn ok(self) -> Self {
        if let Err(e) = &self.result {
            panic!("unexpected error: {}", e);
        }
        self
    }

    /// The error, panicking if the run succeeded.
    pub fn err(&self) -> &EvalError {
        match &self.result {
            Err(e) => e,
            Ok(()) => panic!("expected an error, got values {:?}", self.values),
        }
    }

    /// The exception reason, panicking on anything else.
    pub fn reason(&self) -> &Reason {
        match self.err().reason() {
            Some(reason) => reason,
            None => panic!("expected an exception, got {}", self.err()),
        }
    }
}

pub fn evaluator() -> Evaluator {
    Evaluator::new(EvalContext::new())
}

/// Run chunks one after another in `ev`, stopping at the first error.
pub fn run_in(ev: &Evaluator, chunks: &[&str]) -> Run {
    let values = Arc::new(Mutex::new(Vec::new()));
    let stdout = Arc::new(Mutex::new(Vec::new()));
    let stderr = Arc::new(Mutex::new(Vec::new()));
    let ports = Ports::new(
        InputPort::empty(),
        OutputPort::new(
            ValueSink::Buffer(values.clone()),
            ByteSink::Buffer(stdout.clone()),
        ),
        OutputPort::new(ValueSink::Discard, ByteSink::Buffer(stderr.clone())),
    );

    let mut result = Ok(());
    for (i, code) in chunks.iter().enumerate() {
        result = ev.eval_source(format!("[test {}]", i), *code, ports.clone());
        if result.is_err() {
            break;
        }
    }

    let values = values.lock().clone();
    let stdout = String::from_utf8_lossy(&stdout.lock()).into_owned();
    let stderr = String::from_utf8_lossy(&stderr.lock()).into_owned();
    Run {
        values,
        stdout,
        stderr,
        result,
    }
}

/// Run code in a fresh evaluator.
pub fn run(code: &str) -> Run {
    run_in(&evaluator(), &[code])
}

/// Run code that must succeed and return its output values as strings.
pub fn puts(code: &str) -> Vec<String> {
    run(code).ok().strings()
}
