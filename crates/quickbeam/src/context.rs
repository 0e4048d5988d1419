//! Evaluation context configuration

use crossbeam::channel::{self, Receiver, Sender};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Configuration and state for evaluation.
///
/// This is shared by every frame of an evaluator and controls behavior
/// like recursion limits, module search paths and interruption. The plain
/// settings can be loaded with serde; the interrupt handle and timer are
/// runtime-only.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EvalContext {
    /// Maximum call depth (stack overflow protection)
    pub max_call_depth: usize,

    /// Directories searched, in order, for bare module names
    pub lib_dirs: Vec<PathBuf>,

    /// Capacity of the value channel between pipeline stages
    pub value_buffer: usize,

    /// Emit a `tracing` event for every command form run
    pub trace: bool,

    /// Interrupt handle - trigger it to abort evaluation
    #[serde(skip)]
    pub interrupt: Interrupt,

    /// Source of timer channels for `sleep`
    #[serde(skip)]
    pub timer: Timer,
}

impl Default for EvalContext {
    fn default() -> Self {
        Self {
            max_call_depth: 1000,
            lib_dirs: Vec::new(),
            value_buffer: 32,
            trace: false,
            interrupt: Interrupt::new(),
            timer: Timer::default(),
        }
    }
}

impl EvalContext {
    /// Create a new context with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a context with a custom call depth limit.
    pub fn with_max_call_depth(max_depth: usize) -> Self {
        Self {
            max_call_depth: max_depth,
            ..Default::default()
        }
    }

    /// Append a module search directory.
    pub fn lib_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.lib_dirs.push(dir.into());
        self
    }

    /// Set the pipeline value channel capacity.
    pub fn value_buffer(mut self, capacity: usize) -> Self {
        self.value_buffer = capacity;
        self
    }

    /// Replace the timer used by `sleep`.
    pub fn timer(mut self, timer: Timer) -> Self {
        self.timer = timer;
        self
    }

    /// Check if evaluation has been interrupted.
    pub fn is_interrupted(&self) -> bool {
        self.interrupt.is_triggered()
    }

    /// Request interruption of evaluation.
    pub fn interrupt(&self) {
        self.interrupt.trigger();
    }

    /// Reset the interrupt flag.
    pub fn reset_interrupt(&self) {
        self.interrupt.reset();
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Interrupts
// ═══════════════════════════════════════════════════════════════════════

/// A broadcast interrupt.
///
/// Besides a flag that running forms poll between steps, the handle owns
/// a channel that never carries messages: triggering drops the sender, so
/// every receiver handed out by [`Interrupt::receiver`] becomes ready at
/// once. Blocking waits select on it alongside whatever they wait for.
#[derive(Clone)]
pub struct Interrupt {
    flag: Arc<AtomicBool>,
    chan: Arc<Mutex<(Option<Sender<()>>, Receiver<()>)>>,
}

impl Interrupt {
    /// A fresh, untriggered interrupt.
    pub fn new() -> Self {
        let (tx, rx) = channel::bounded(0);
        Self {
            flag: Arc::new(AtomicBool::new(false)),
            chan: Arc::new(Mutex::new((Some(tx), rx))),
        }
    }

    /// Fire the interrupt.
    pub fn trigger(&self) {
        self.flag.store(true, Ordering::SeqCst);
        self.chan.lock().0.take();
    }

    /// Whether the interrupt has fired.
    pub fn is_triggered(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Re-arm the interrupt. Receivers handed out before stay ready.
    pub fn reset(&self) {
        let mut chan = self.chan.lock();
        if chan.0.is_none() {
            let (tx, rx) = channel::bounded(0);
            *chan = (Some(tx), rx);
        }
        self.flag.store(false, Ordering::SeqCst);
    }

    /// A receiver that becomes disconnected once the interrupt fires.
    pub fn receiver(&self) -> Receiver<()> {
        self.chan.lock().1.clone()
    }
}

impl Default for Interrupt {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Interrupt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Interrupt({})", self.is_triggered())
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Timers
// ═══════════════════════════════════════════════════════════════════════

/// Type alias for timer factories to reduce complexity
pub type TimerFn = dyn Fn(Duration) -> Receiver<Instant> + Send + Sync;

/// Produces a channel that delivers one message after a duration.
///
/// The default is [`crossbeam::channel::after`]; tests swap in a timer
/// that records the requested duration and fires immediately.
#[derive(Clone)]
pub struct Timer(Arc<TimerFn>);

impl Timer {
    /// Wrap a timer factory.
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(Duration) -> Receiver<Instant> + Send + Sync + 'static,
    {
        Timer(Arc::new(f))
    }

    /// A channel that receives once `duration` has elapsed.
    pub fn after(&self, duration: Duration) -> Receiver<Instant> {
        (self.0)(duration)
    }
}

impl Default for Timer {
    fn default() -> Self {
        Timer::new(channel::after)
    }
}

impl fmt::Debug for Timer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Timer")
    }
}
