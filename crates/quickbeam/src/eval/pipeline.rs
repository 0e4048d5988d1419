//! Chunks and pipelines

use crossbeam::channel;
use std::sync::Arc;
use std::thread;
use tracing::instrument;

use super::at_site;
use crate::environment::Frame;
use crate::error::{combine_stages, EvalError, Reason};
use crate::frontend::{CallSite, Operation};
use crate::ports::{ByteSink, InputPort, OutputPort, ValueSink};

/// Pipelines run one after another.
pub(crate) struct ChunkOp {
    pub pipelines: Vec<Arc<dyn Operation>>,
}

impl Operation for ChunkOp {
    fn exec(&self, fm: &mut Frame) -> Result<(), EvalError> {
        for pipeline in &self.pipelines {
            fm.check_interrupt()?;
            pipeline.exec(fm)?;
        }
        Ok(())
    }
}

/// Two or more forms running concurrently, each reading what the previous
/// one wrote.
pub(crate) struct PipelineOp {
    pub site: CallSite,
    pub stages: Vec<Arc<dyn Operation>>,
}

impl PipelineOp {
    /// One frame per stage, wired together with bounded channels.
    fn stage_frames(&self, fm: &Frame) -> Vec<Frame> {
        let capacity = fm.evaluator().context().value_buffer.max(1);
        let last = self.stages.len() - 1;
        let mut input = fm.ports.input.clone();
        let mut frames = Vec::with_capacity(self.stages.len());
        for i in 0..self.stages.len() {
            let mut ports = fm.ports.clone();
            ports.input = std::mem::take(&mut input);
            if i < last {
                let (value_tx, value_rx) = channel::bounded(capacity);
                let (byte_tx, byte_rx) = channel::bounded(capacity);
                ports.output = OutputPort::new(ValueSink::Chan(value_tx), ByteSink::Chan(byte_tx));
                input = InputPort {
                    values: Some(value_rx),
                    bytes: Some(byte_rx),
                };
            }
            frames.push(fm.with_ports(ports));
        }
        frames
    }

    #[instrument(level = "debug", skip_all, fields(stages = self.stages.len()))]
    fn run(&self, fm: &mut Frame) -> Result<(), EvalError> {
        let frames = self.stage_frames(fm);
        let last = self.stages.len() - 1;

        let results: Vec<Result<(), EvalError>> = thread::scope(|scope| {
            let handles: Vec<_> = self
                .stages
                .iter()
                .zip(frames)
                .map(|(stage, mut stage_fm)| scope.spawn(move || stage.exec(&mut stage_fm)))
                .collect();
            handles
                .into_iter()
                .enumerate()
                .map(|(i, handle)| {
                    let result = handle
                        .join()
                        .unwrap_or_else(|_| Err(Reason::Io("pipeline stage panicked".into()).into()));
                    match result {
                        Err(err) if i < last && matches!(err.reason(), Some(Reason::ReaderGone)) => {
                            tracing::trace!(stage = i, "downstream closed");
                            Ok(())
                        }
                        other => other,
                    }
                })
                .collect()
        });

        combine_stages(results)
    }
}

impl Operation for PipelineOp {
    fn exec(&self, fm: &mut Frame) -> Result<(), EvalError> {
        at_site(fm, &self.site, |fm| self.run(fm))
    }
}
