//! Wiring a source, a worker pool and a sink into one run.
//!
//! [`Pipeline`] holds the run configuration. [`Pipeline::start`] spawns the
//! stage threads and returns a [`RunningPipeline`] handle at once;
//! [`Pipeline::run`] is start-then-join.
//!
//! ```
//! use xcut::pipeline::Pipeline;
//! use xcut::sink::{SinkMode, VecEmitter};
//! use xcut::source::IterReader;
//! use xcut::transform::from_fn;
//!
//! let out = VecEmitter::new();
//! let summary = Pipeline::default()
//!     .with_workers(4)
//!     .with_mode(SinkMode::Ordered)
//!     .run(IterReader::new(["a", "b", "c"]), from_fn(|s: &str| s.to_uppercase()), out.clone())?;
//! assert_eq!(summary.emitted, 3);
//! assert_eq!(out.payloads(), vec!["A", "B", "C"]);
//! # Ok::<(), xcut::Error>(())
//! ```

use crate::context::{DEFAULT_POLL_INTERVAL, PipelineContext};
use crate::error::{Error, Result};
use crate::phase::{Phase, PhaseCoordinator};
use crate::pool::TransformerPool;
use crate::sink::{Emit, OrderedSink, SinkMode};
use crate::source::{RecordReader, SequencedSource};
use crate::transform::Transform;
use log::debug;
use std::fmt;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Configuration of a run.
#[derive(Clone, Copy, Debug)]
pub struct Pipeline {
    pub workers: usize,
    pub mode: SinkMode,
    /// Upper bound of each idle wait; lower trades CPU for latency.
    pub poll_interval: Duration,
}

impl Default for Pipeline {
    fn default() -> Self {
        Self {
            workers: num_cpus::get().max(1),
            mode: SinkMode::default(),
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

fn spawn_named<T, F>(name: &str, role: &'static str, f: F) -> Result<JoinHandle<T>>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    thread::Builder::new()
        .name(name.to_string())
        .spawn(f)
        .map_err(|source| Error::Spawn { thread: role, source })
}

impl Pipeline {
    /// Number of transformer threads (values below one are raised to one).
    #[must_use]
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    #[must_use]
    pub fn with_mode(mut self, mode: SinkMode) -> Self {
        self.mode = mode;
        self
    }

    #[must_use]
    pub fn ordered(self, ordered: bool) -> Self {
        self.with_mode(if ordered { SinkMode::Ordered } else { SinkMode::Unordered })
    }

    #[must_use]
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Spawn every stage and return without waiting.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Spawn`] if a thread cannot be started; stages already
    /// running are aborted and wind down on their own.
    pub fn start<R, T, E>(&self, reader: R, transform: T, emitter: E) -> Result<RunningPipeline>
    where
        R: RecordReader + 'static,
        T: Transform + 'static,
        E: Emit + 'static,
    {
        let ctx = Arc::new(PipelineContext::new(self.poll_interval));
        let started = Instant::now();
        let abandon = |err: Error| {
            ctx.mark_exhausted();
            ctx.abort();
            err
        };

        let coordinator = {
            let ctx = Arc::clone(&ctx);
            spawn_named("xcut-coordinator", "coordinator", move || {
                PhaseCoordinator::new(&ctx).run()
            })?
        };

        let sink = {
            let ctx = Arc::clone(&ctx);
            let sink = OrderedSink::new(self.mode, emitter);
            spawn_named("xcut-sink", "sink", move || sink.run(&ctx)).map_err(abandon)?
        };

        let pool = TransformerPool::new(self.workers);
        let workers = pool.spawn(&ctx, &Arc::new(transform)).map_err(abandon)?;

        let source = {
            let ctx = Arc::clone(&ctx);
            let source = SequencedSource::new(reader);
            spawn_named("xcut-source", "source", move || source.run(&ctx)).map_err(abandon)?
        };

        debug!("pipeline started: {} workers, {} sink", pool.workers(), self.mode);
        Ok(RunningPipeline {
            ctx,
            source,
            workers,
            sink,
            coordinator,
            started,
            mode: self.mode,
        })
    }

    /// Run to completion.
    ///
    /// # Errors
    ///
    /// See [`Pipeline::start`] and [`RunningPipeline::join`].
    pub fn run<R, T, E>(&self, reader: R, transform: T, emitter: E) -> Result<RunSummary>
    where
        R: RecordReader + 'static,
        T: Transform + 'static,
        E: Emit + 'static,
    {
        self.start(reader, transform, emitter)?.join()
    }
}

/// Handle to a run in progress.
pub struct RunningPipeline {
    ctx: Arc<PipelineContext>,
    source: JoinHandle<Result<u64>>,
    workers: Vec<JoinHandle<u64>>,
    sink: JoinHandle<Result<u64>>,
    coordinator: JoinHandle<Phase>,
    started: Instant,
    mode: SinkMode,
}

impl RunningPipeline {
    /// True once every record has been emitted. Never blocks.
    pub fn is_complete(&self) -> bool {
        self.ctx.is_complete()
    }

    pub fn phase(&self) -> Phase {
        self.ctx.phase()
    }

    /// Live counters of the run.
    pub fn context(&self) -> &PipelineContext {
        &self.ctx
    }

    /// Wait for every stage to finish.
    ///
    /// All threads are joined even when one fails. The first error is
    /// returned, looking at the source, then the workers, then the sink.
    ///
    /// # Errors
    ///
    /// The source's read error, the sink's write error, or
    /// [`Error::WorkerPanicked`] if a stage thread panicked.
    pub fn join(self) -> Result<RunSummary> {
        let workers = self.workers.len();
        let source = self.source.join().map_err(|_| Error::WorkerPanicked("source"));
        let pool: Result<u64> = self
            .workers
            .into_iter()
            .map(|h| h.join().map_err(|_| Error::WorkerPanicked("worker")))
            .sum();
        let sink = self.sink.join().map_err(|_| Error::WorkerPanicked("sink"));
        let coordinator = self.coordinator.join().map_err(|_| Error::WorkerPanicked("coordinator"));

        source??;
        pool?;
        sink??;
        let phase = coordinator?;

        let ctx = &self.ctx;
        let summary = RunSummary {
            produced: ctx.produced(),
            emitted: ctx.emitted(),
            transform_failures: ctx.transform_failures(),
            workers,
            mode: self.mode,
            elapsed: self.started.elapsed(),
        };
        debug!("pipeline finished in phase {phase}: {summary}");
        Ok(summary)
    }
}

impl fmt::Debug for RunningPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunningPipeline")
            .field("mode", &self.mode)
            .field("workers", &self.workers.len())
            .field("ctx", &self.ctx)
            .finish_non_exhaustive()
    }
}

/// Outcome of a completed run.
#[derive(Clone, Debug, PartialEq)]
pub struct RunSummary {
    pub produced: u64,
    pub emitted: u64,
    /// Records passed through unchanged because the transform failed.
    pub transform_failures: u64,
    pub workers: usize,
    pub mode: SinkMode,
    pub elapsed: Duration,
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} records in, {} out, {} transform failures, {} workers, {} sink, {:.3}s",
            self.produced,
            self.emitted,
            self.transform_failures,
            self.workers,
            self.mode,
            self.elapsed.as_secs_f64()
        )
    }
}
