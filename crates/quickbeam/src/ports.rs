//! I/O ports: where the values and bytes a command produces go
//!
//! Every frame carries three ports. Port 0 is input, ports 1 and 2 are
//! output and error. An output port has two lanes, one for structured
//! values and one for raw bytes, and each lane is backed by a sink.
//!
//! Sinks use enum dispatch, like the print handlers in the pack's
//! evaluator: the set of destinations is closed and hot.

use crossbeam::channel::{Receiver, Select, Sender};
use parking_lot::Mutex;
use std::fmt;
use std::fs::File;
use std::io::Write;
use std::sync::Arc;

use crate::error::{EvalError, Reason};
use crate::value::Value;

// ═══════════════════════════════════════════════════════════════════════
// Capture buffer
// ═══════════════════════════════════════════════════════════════════════

/// Collects both lanes of an output port into one list of values.
///
/// Values are kept as they are; bytes are split into lines, each line
/// becoming a string value at the point where its newline arrived.
#[derive(Debug, Default)]
pub struct Capture {
    state: Mutex<CaptureState>,
}

#[derive(Debug, Default)]
struct CaptureState {
    values: Vec<Value>,
    pending: Vec<u8>,
}

impl Capture {
    /// A new, empty capture.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn put(&self, value: Value) {
        self.state.lock().values.push(value);
    }

    fn write(&self, bytes: &[u8]) {
        let mut state = self.state.lock();
        state.pending.extend_from_slice(bytes);
        let lines = split_lines(&mut state.pending);
        state.values.extend(lines.into_iter().map(Value::from));
    }

    /// Take everything captured so far, including a trailing partial line.
    pub fn finish(&self) -> Vec<Value> {
        let mut state = self.state.lock();
        if let Some(rest) = flush_line(&mut state.pending) {
            state.values.push(Value::from(rest));
        }
        std::mem::take(&mut state.values)
    }
}

/// Remove and return every complete line at the front of `pending`.
fn split_lines(pending: &mut Vec<u8>) -> Vec<String> {
    let mut lines = Vec::new();
    while let Some(pos) = pending.iter().position(|&b| b == b'\n') {
        let line: Vec<u8> = pending.drain(..=pos).collect();
        lines.push(String::from_utf8_lossy(&line[..pos]).into_owned());
    }
    lines
}

/// Return the unterminated rest of `pending`, if any.
fn flush_line(pending: &mut Vec<u8>) -> Option<String> {
    if pending.is_empty() {
        return None;
    }
    let rest = std::mem::take(pending);
    Some(String::from_utf8_lossy(&rest).into_owned())
}

// ═══════════════════════════════════════════════════════════════════════
// Sinks
// ═══════════════════════════════════════════════════════════════════════

/// Destination for structured values.
#[derive(Clone)]
pub enum ValueSink {
    /// Next pipeline stage
    Chan(Sender<Value>),
    /// Output capture `(...)`
    Capture(Arc<Capture>),
    /// Plain list, for embedders and tests
    Buffer(Arc<Mutex<Vec<Value>>>),
    /// Render values onto a byte sink, one `▶ repr` line each
    Print(ByteSink),
    /// Drop everything
    Discard,
}

impl ValueSink {
    /// Send one value.
    ///
    /// # Errors
    ///
    /// `ReaderGone` if the receiving stage has finished; `Io` if printing
    /// fails.
    pub fn put(&self, value: Value) -> Result<(), Reason> {
        match self {
            ValueSink::Chan(tx) => tx.send(value).map_err(|_| Reason::ReaderGone),
            ValueSink::Capture(c) => {
                c.put(value);
                Ok(())
            }
            ValueSink::Buffer(buf) => {
                buf.lock().push(value);
                Ok(())
            }
            ValueSink::Print(sink) => sink.write(format!("▶ {}\n", value.repr()).as_bytes()),
            ValueSink::Discard => Ok(()),
        }
    }
}

impl fmt::Debug for ValueSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueSink::Chan(_) => write!(f, "Chan"),
            ValueSink::Capture(_) => write!(f, "Capture"),
            ValueSink::Buffer(_) => write!(f, "Buffer"),
            ValueSink::Print(sink) => write!(f, "Print({:?})", sink),
            ValueSink::Discard => write!(f, "Discard"),
        }
    }
}

/// Destination for raw bytes.
#[derive(Clone)]
pub enum ByteSink {
    /// Next pipeline stage
    Chan(Sender<Vec<u8>>),
    /// Output capture `(...)`
    Capture(Arc<Capture>),
    /// Plain byte buffer, for embedders and tests
    Buffer(Arc<Mutex<Vec<u8>>>),
    /// A file opened by a redirection
    File(Arc<Mutex<File>>),
    /// Host standard output
    Stdout,
    /// Host standard error
    Stderr,
    /// Drop everything
    Discard,
}

impl ByteSink {
    /// Write a chunk of bytes.
    ///
    /// # Errors
    ///
    /// `ReaderGone` if the receiving stage has finished; `Io` if the host
    /// write fails.
    pub fn write(&self, bytes: &[u8]) -> Result<(), Reason> {
        let io = |e: std::io::Error| Reason::Io(e.to_string());
        match self {
            ByteSink::Chan(tx) => tx.send(bytes.to_vec()).map_err(|_| Reason::ReaderGone),
            ByteSink::Capture(c) => {
                c.write(bytes);
                Ok(())
            }
            ByteSink::Buffer(buf) => {
                buf.lock().extend_from_slice(bytes);
                Ok(())
            }
            ByteSink::File(file) => file.lock().write_all(bytes).map_err(io),
            ByteSink::Stdout => std::io::stdout().lock().write_all(bytes).map_err(io),
            ByteSink::Stderr => std::io::stderr().lock().write_all(bytes).map_err(io),
            ByteSink::Discard => Ok(()),
        }
    }
}

impl fmt::Debug for ByteSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ByteSink::Chan(_) => "Chan",
            ByteSink::Capture(_) => "Capture",
            ByteSink::Buffer(_) => "Buffer",
            ByteSink::File(_) => "File",
            ByteSink::Stdout => "Stdout",
            ByteSink::Stderr => "Stderr",
            ByteSink::Discard => "Discard",
        };
        write!(f, "{}", name)
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Ports
// ═══════════════════════════════════════════════════════════════════════

/// An output port: a value lane and a byte lane.
#[derive(Debug, Clone)]
pub struct OutputPort {
    /// Where values go
    pub values: ValueSink,

    /// Where bytes go
    pub bytes: ByteSink,
}

impl OutputPort {
    /// A port with both lanes set.
    pub fn new(values: ValueSink, bytes: ByteSink) -> Self {
        Self { values, bytes }
    }

    /// A port that feeds both lanes into one capture.
    pub fn capture(capture: &Arc<Capture>) -> Self {
        Self::new(
            ValueSink::Capture(capture.clone()),
            ByteSink::Capture(capture.clone()),
        )
    }

    /// A port that drops everything.
    pub fn discard() -> Self {
        Self::new(ValueSink::Discard, ByteSink::Discard)
    }

    /// A port that writes bytes to `file` and drops values.
    pub fn file(file: File) -> Self {
        Self::new(ValueSink::Discard, ByteSink::File(Arc::new(Mutex::new(file))))
    }
}

/// The input port: values and byte lines from the previous stage.
#[derive(Debug, Clone, Default)]
pub struct InputPort {
    /// Incoming values
    pub values: Option<Receiver<Value>>,

    /// Incoming byte chunks
    pub bytes: Option<Receiver<Vec<u8>>>,
}

enum Event {
    Value(Value),
    Bytes(Vec<u8>),
    ValuesDone,
    BytesDone,
    Interrupted,
}

impl InputPort {
    /// An input port with nothing to read.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Feed every input to `f` until both lanes are exhausted.
    ///
    /// Byte input is delivered line by line as strings, interleaved with
    /// values in arrival order. Blocks without polling; returns
    /// `Interrupted` as soon as `interrupt` disconnects.
    pub fn iterate<F>(&self, interrupt: &Receiver<()>, mut f: F) -> Result<(), EvalError>
    where
        F: FnMut(Value) -> Result<(), EvalError>,
    {
        let mut values = self.values.clone();
        let mut bytes = self.bytes.clone();
        let mut pending = Vec::new();

        while values.is_some() || bytes.is_some() {
            match next_event(values.as_ref(), bytes.as_ref(), interrupt) {
                Event::Value(v) => f(v)?,
                Event::Bytes(chunk) => {
                    pending.extend_from_slice(&chunk);
                    for line in split_lines(&mut pending) {
                        f(Value::from(line))?;
                    }
                }
                Event::ValuesDone => values = None,
                Event::BytesDone => bytes = None,
                Event::Interrupted => return Err(Reason::Interrupted.into()),
            }
        }
        if let Some(rest) = flush_line(&mut pending) {
            f(Value::from(rest))?;
        }
        Ok(())
    }
}

fn next_event(
    values: Option<&Receiver<Value>>,
    bytes: Option<&Receiver<Vec<u8>>>,
    interrupt: &Receiver<()>,
) -> Event {
    let mut sel = Select::new();
    let value_index = values.map(|rx| sel.recv(rx));
    let byte_index = bytes.map(|rx| sel.recv(rx));
    let _ = sel.recv(interrupt);

    let op = sel.select();
    let index = op.index();
    if let (Some(i), Some(rx)) = (value_index, values) {
        if i == index {
            return match op.recv(rx) {
                Ok(v) => Event::Value(v),
                Err(_) => Event::ValuesDone,
            };
        }
    }
    if let (Some(i), Some(rx)) = (byte_index, bytes) {
        if i == index {
            return match op.recv(rx) {
                Ok(chunk) => Event::Bytes(chunk),
                Err(_) => Event::BytesDone,
            };
        }
    }
    let _ = op.recv(interrupt);
    Event::Interrupted
}

/// The three standard ports of a frame.
#[derive(Debug, Clone)]
pub struct Ports {
    /// Port 0
    pub input: InputPort,

    /// Port 1
    pub output: OutputPort,

    /// Port 2
    pub error: OutputPort,
}

impl Ports {
    /// Assemble ports.
    pub fn new(input: InputPort, output: OutputPort, error: OutputPort) -> Self {
        Self {
            input,
            output,
            error,
        }
    }

    /// Host standard output and error, values printed as `▶ repr`.
    pub fn stdio() -> Self {
        Self::new(
            InputPort::empty(),
            OutputPort::new(ValueSink::Print(ByteSink::Stdout), ByteSink::Stdout),
            OutputPort::new(ValueSink::Print(ByteSink::Stderr), ByteSink::Stderr),
        )
    }

    /// Ports that read nothing and drop all output.
    pub fn discard() -> Self {
        Self::new(
            InputPort::empty(),
            OutputPort::discard(),
            OutputPort::discard(),
        )
    }

    /// The output port numbered `fd`, if there is one.
    pub fn output_port(&self, fd: usize) -> Option<&OutputPort> {
        match fd {
            1 => Some(&self.output),
            2 => Some(&self.error),
            _ => None,
        }
    }

    /// Replace the output port numbered `fd`.
    ///
    /// # Errors
    ///
    /// `BadValue` unless `fd` is 1 or 2.
    pub fn set_output_port(&mut self, fd: usize, port: OutputPort) -> Result<(), Reason> {
        match fd {
            1 => self.output = port,
            2 => self.error = port,
            _ => {
                return Err(Reason::BadValue {
                    what: "output fd".to_string(),
                    valid: "1 or 2".to_string(),
                    actual: fd.to_string(),
                })
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam::channel;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_capture_orders_values_and_lines() {
        let cap = Capture::new();
        let port = OutputPort::capture(&cap);
        port.values.put(Value::from("a")).unwrap();
        port.bytes.write(b"line1\nli").unwrap();
        port.values.put(Value::from("b")).unwrap();
        port.bytes.write(b"ne2\ntail").unwrap();
        assert_eq!(
            cap.finish(),
            vec![
                Value::from("a"),
                Value::from("line1"),
                Value::from("b"),
                Value::from("line2"),
                Value::from("tail"),
            ]
        );
    }

    #[test]
    fn test_print_sink_renders_repr() {
        let buf = Arc::new(Mutex::new(Vec::new()));
        let sink = ValueSink::Print(ByteSink::Buffer(buf.clone()));
        sink.put(Value::from("a b")).unwrap();
        assert_eq!(String::from_utf8_lossy(&buf.lock()), "▶ 'a b'\n");
    }

    #[test]
    fn test_closed_channel_is_reader_gone() {
        let (tx, rx) = channel::bounded::<Value>(1);
        drop(rx);
        let err = ValueSink::Chan(tx).put(Value::Nil).unwrap_err();
        assert!(matches!(err, Reason::ReaderGone));
    }

    #[test]
    fn test_iterate_merges_lanes() {
        let (vtx, vrx) = channel::unbounded();
        let (btx, brx) = channel::unbounded();
        vtx.send(Value::from("v")).unwrap();
        btx.send(b"x\ny".to_vec()).unwrap();
        drop(vtx);
        drop(btx);

        let input = InputPort {
            values: Some(vrx),
            bytes: Some(brx),
        };
        let (_keep, never) = channel::bounded::<()>(0);
        let mut seen = Vec::new();
        input
            .iterate(&never, |v| {
                seen.push(v.to_string());
                Ok(())
            })
            .unwrap();
        seen.sort();
        assert_eq!(seen, vec!["v", "x", "y"]);
    }

    #[test]
    fn test_iterate_stops_on_interrupt() {
        let (_vtx, vrx) = channel::unbounded::<Value>();
        let input = InputPort {
            values: Some(vrx),
            bytes: None,
        };
        let (tx, interrupt) = channel::bounded::<()>(0);
        drop(tx);
        let err = input.iterate(&interrupt, |_| Ok(())).unwrap_err();
        assert!(matches!(err.reason(), Some(Reason::Interrupted)));
    }

    #[test]
    fn test_set_output_port() {
        let mut ports = Ports::discard();
        let cap = Capture::new();
        ports.set_output_port(2, OutputPort::capture(&cap)).unwrap();
        ports.error.values.put(Value::from("e")).unwrap();
        assert_eq!(cap.finish(), vec![Value::from("e")]);
        assert!(ports.set_output_port(0, OutputPort::discard()).is_err());
        assert!(ports.output_port(3).is_none());
    }
}
