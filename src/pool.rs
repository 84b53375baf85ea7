//! The transformer worker pool.
//!
//! Each worker repeatedly takes an arbitrary record from the input store,
//! transforms it, and pushes the result under the same sequence number into
//! the output store. There is no closing signal on the input store: a worker
//! decides to stop on its own, from the source's exhaustion flag, the store's
//! emptiness and the pool's claim counters (see
//! [`PipelineContext::worker_may_exit`]). The pool is finished when its last
//! worker has stopped.

use crate::context::PipelineContext;
use crate::error::{Error, Result};
use crate::transform::{Transform, apply_guarded};
use log::{debug, trace, warn};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// Counts the worker out however its loop ends. A worker that unwinds may
/// leave a claim open forever, so the run is aborted too.
struct ExitOnDrop<'a>(&'a PipelineContext);

impl Drop for ExitOnDrop<'_> {
    fn drop(&mut self) {
        if thread::panicking() {
            self.0.abort();
        }
        self.0.worker_exited();
    }
}

/// Body of one worker thread. Returns the number of records it transformed.
pub fn run_worker<T: Transform + ?Sized>(ctx: &PipelineContext, transform: &T, id: usize) -> u64 {
    let _exit = ExitOnDrop(ctx);
    let mut done = 0u64;
    loop {
        // Nothing can arrive any more; only wait for siblings' claims to settle.
        if ctx.is_exhausted() && ctx.input.is_empty() {
            if ctx.worker_may_exit() || ctx.is_aborted() {
                break;
            }
            ctx.input.wait_nonempty(ctx.poll_interval());
            continue;
        }

        ctx.begin_claim();
        let Some((seq, payload)) = ctx.input.pull_any() else {
            ctx.end_claim();
            ctx.input.wait_nonempty(ctx.poll_interval());
            continue;
        };

        trace!("worker {id} took record {seq}");
        let result = match apply_guarded(transform, &payload) {
            Ok(result) => result,
            Err(e) => {
                warn!(
                    "{} failed on record {seq}, passing it through unchanged: {e}",
                    transform.name()
                );
                ctx.record_transform_failure();
                payload
            }
        };
        ctx.output.push(seq, result);
        ctx.record_transformed();
        ctx.end_claim();
        done += 1;
    }
    debug!("worker {id} exiting after {done} records");
    done
}

/// A fixed number of worker threads sharing one transform.
#[derive(Clone, Copy, Debug)]
pub struct TransformerPool {
    workers: usize,
}

impl TransformerPool {
    /// A pool of `workers` threads (at least one).
    pub fn new(workers: usize) -> Self {
        Self { workers: workers.max(1) }
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Start the workers. They run until the input is exhausted and drained.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Spawn`] if a thread cannot be started. Workers that
    /// did start are left running; the slots of the missing ones are released
    /// so the pool can still finish.
    pub fn spawn<T>(&self, ctx: &Arc<PipelineContext>, transform: &Arc<T>) -> Result<Vec<JoinHandle<u64>>>
    where
        T: Transform + ?Sized + 'static,
    {
        ctx.register_workers(self.workers);
        let mut handles = Vec::with_capacity(self.workers);
        for id in 0..self.workers {
            let ctx_w = Arc::clone(ctx);
            let transform = Arc::clone(transform);
            let spawned = thread::Builder::new()
                .name(format!("xcut-worker-{id}"))
                .spawn(move || run_worker(ctx_w.as_ref(), transform.as_ref(), id));
            match spawned {
                Ok(handle) => handles.push(handle),
                Err(e) => {
                    for _ in id..self.workers {
                        ctx.worker_exited();
                    }
                    return Err(Error::Spawn { thread: "worker", source: e });
                }
            }
        }
        debug!("started {} workers", self.workers);
        Ok(handles)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform::from_fn;

    fn fill(ctx: &PipelineContext, n: u64) {
        for seq in 1..=n {
            ctx.input.push(seq, format!("r{seq}"));
            ctx.record_produced();
        }
    }

    #[test]
    fn single_worker_drains_everything() {
        let ctx = PipelineContext::default();
        fill(&ctx, 10);
        ctx.mark_exhausted();
        ctx.register_workers(1);

        let upper = from_fn(|s: &str| s.to_uppercase());
        assert_eq!(run_worker(&ctx, &upper, 0), 10);
        assert!(ctx.pool_finished());
        assert_eq!(ctx.output.len(), 10);
        assert_eq!(ctx.output.pull_by_key(3).as_deref(), Some("R3"));
    }

    #[test]
    fn workers_wait_for_late_input() {
        let ctx = Arc::new(PipelineContext::default());
        let pool = TransformerPool::new(4);
        let handles = pool.spawn(&ctx, &Arc::new(crate::transform::Identity)).unwrap();

        thread::sleep(std::time::Duration::from_millis(20));
        assert!(!ctx.pool_finished());
        fill(&ctx, 100);
        ctx.mark_exhausted();

        let total: u64 = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(total, 100);
        assert_eq!(ctx.transformed(), 100);
        assert_eq!(ctx.in_flight(), 0);
        assert!(ctx.pool_finished());
    }

    #[test]
    fn failures_pass_the_original_through() {
        let ctx = PipelineContext::default();
        fill(&ctx, 4);
        ctx.mark_exhausted();
        ctx.register_workers(1);

        let picky = from_fn(|s: &str| {
            assert!(s != "r2", "no r2 please");
            s.to_uppercase()
        });
        run_worker(&ctx, &picky, 0);
        assert_eq!(ctx.transform_failures(), 1);
        assert_eq!(ctx.output.pull_by_key(2).as_deref(), Some("r2"));
        assert_eq!(ctx.output.pull_by_key(1).as_deref(), Some("R1"));
    }

    #[test]
    fn empty_input_exits_immediately() {
        let ctx = PipelineContext::default();
        ctx.mark_exhausted();
        ctx.register_workers(1);
        assert_eq!(run_worker(&ctx, &crate::transform::Identity, 0), 0);
        assert!(ctx.pool_finished());
    }
}
