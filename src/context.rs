//! Shared state of one pipeline run.
//!
//! A [`PipelineContext`] is built once per run and handed by reference to
//! every stage. It owns the two record stores and the handful of atomics the
//! stages use to publish progress. Nothing here is process-global, so any
//! number of runs may proceed side by side.

use crate::phase::{Phase, PhaseCell};
use crate::store::RecordStore;
use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

/// Default upper bound of every timed wait.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(1);

pub struct PipelineContext {
    /// Records read by the source, waiting for a worker.
    pub input: RecordStore,
    /// Transformed records, waiting for the sink.
    pub output: RecordStore,

    exhausted: AtomicBool,
    produced: AtomicU64,

    // Worker claims: `started` is bumped before a worker tries to take a
    // record, `ended` once the claim is settled (record written out, or
    // nothing was taken). `started == ended` means no worker holds a record.
    started: AtomicU64,
    ended: AtomicU64,
    transformed: AtomicU64,
    transform_failures: AtomicU64,
    live_workers: AtomicUsize,
    pool_finished: AtomicBool,

    emitted: AtomicU64,
    phase: PhaseCell,
    aborted: AtomicBool,

    progress_lock: Mutex<()>,
    progress: Condvar,
    poll_interval: Duration,
}

impl Default for PipelineContext {
    fn default() -> Self {
        Self::new(DEFAULT_POLL_INTERVAL)
    }
}

impl PipelineContext {
    #[must_use]
    pub fn new(poll_interval: Duration) -> Self {
        Self {
            input: RecordStore::new("input"),
            output: RecordStore::new("output"),
            exhausted: AtomicBool::new(false),
            produced: AtomicU64::new(0),
            started: AtomicU64::new(0),
            ended: AtomicU64::new(0),
            transformed: AtomicU64::new(0),
            transform_failures: AtomicU64::new(0),
            live_workers: AtomicUsize::new(0),
            pool_finished: AtomicBool::new(false),
            emitted: AtomicU64::new(0),
            phase: PhaseCell::default(),
            aborted: AtomicBool::new(false),
            progress_lock: Mutex::new(()),
            progress: Condvar::new(),
            poll_interval,
        }
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    // ---------------- source ----------------

    /// Count one record pushed into the input store.
    pub fn record_produced(&self) {
        self.produced.fetch_add(1, Ordering::AcqRel);
    }

    /// Records pushed by the source so far.
    pub fn produced(&self) -> u64 {
        self.produced.load(Ordering::Acquire)
    }

    /// Declare that the source will push nothing more.
    pub fn mark_exhausted(&self) {
        self.exhausted.store(true, Ordering::Release);
        self.input.notify_all();
        self.output.notify_all();
        self.signal_progress();
    }

    pub fn is_exhausted(&self) -> bool {
        self.exhausted.load(Ordering::Acquire)
    }

    /// Final record count, known once the source is exhausted.
    pub fn total(&self) -> Option<u64> {
        // `produced` is only bumped before `exhausted` is set.
        self.is_exhausted().then(|| self.produced())
    }

    // ---------------- workers ----------------

    /// Announce that a worker is about to try to take a record.
    pub fn begin_claim(&self) {
        self.started.fetch_add(1, Ordering::AcqRel);
    }

    /// Settle a claim made with [`begin_claim`](Self::begin_claim).
    pub fn end_claim(&self) {
        let ended = self.ended.fetch_add(1, Ordering::AcqRel) + 1;
        assert!(
            ended <= self.started.load(Ordering::Acquire),
            "claim counter underflow: more claims ended than started"
        );
    }

    /// Claims currently held by workers.
    pub fn in_flight(&self) -> u64 {
        // Read `ended` first: any end it counts belongs to a start the later
        // `started` load also counts, so a held claim can't be masked.
        let ended = self.ended.load(Ordering::Acquire);
        let started = self.started.load(Ordering::Acquire);
        started - ended
    }

    /// Worker exit condition: source exhausted, input drained, no claim held.
    ///
    /// The order of the checks matters. Exhaustion is read first so that
    /// every push it implies is visible to the emptiness check. Emptiness
    /// alone is not enough: a sibling may have taken the last record and not
    /// yet written its result, which only the claim counters reveal.
    pub fn worker_may_exit(&self) -> bool {
        self.is_exhausted() && self.input.is_empty() && self.in_flight() == 0
    }

    pub fn record_transformed(&self) {
        self.transformed.fetch_add(1, Ordering::AcqRel);
    }

    pub fn transformed(&self) -> u64 {
        self.transformed.load(Ordering::Acquire)
    }

    pub fn record_transform_failure(&self) {
        self.transform_failures.fetch_add(1, Ordering::AcqRel);
    }

    pub fn transform_failures(&self) -> u64 {
        self.transform_failures.load(Ordering::Acquire)
    }

    /// Set the number of workers about to be started.
    pub fn register_workers(&self, n: usize) {
        self.live_workers.store(n, Ordering::Release);
        if n == 0 {
            self.pool_finished.store(true, Ordering::Release);
        }
    }

    /// Called by each worker as it leaves its loop; the last one marks the pool finished.
    pub fn worker_exited(&self) {
        let before = self.live_workers.fetch_sub(1, Ordering::AcqRel);
        assert!(before > 0, "worker exit counted more often than workers registered");
        if before == 1 {
            self.pool_finished.store(true, Ordering::Release);
            self.output.notify_all();
            self.signal_progress();
        }
    }

    pub fn live_workers(&self) -> usize {
        self.live_workers.load(Ordering::Acquire)
    }

    pub fn pool_finished(&self) -> bool {
        self.pool_finished.load(Ordering::Acquire)
    }

    // ---------------- sink ----------------

    /// Count one emitted record; returns the new count.
    pub fn record_emitted(&self) -> u64 {
        let emitted = self.emitted.fetch_add(1, Ordering::AcqRel) + 1;
        if self.total() == Some(emitted) {
            self.signal_progress();
        }
        emitted
    }

    pub fn emitted(&self) -> u64 {
        self.emitted.load(Ordering::Acquire)
    }

    /// True once every produced record has been emitted.
    pub fn sink_finished(&self) -> bool {
        self.total() == Some(self.emitted())
    }

    // ---------------- phase ----------------

    pub fn phase(&self) -> Phase {
        self.phase.get()
    }

    pub(crate) fn phase_cell(&self) -> &PhaseCell {
        &self.phase
    }

    /// True once the run has reached [`Phase::Done`].
    pub fn is_complete(&self) -> bool {
        self.phase() == Phase::Done
    }

    /// Give up on the run: a stage died and its completion predicate can never hold.
    pub fn abort(&self) {
        self.aborted.store(true, Ordering::Release);
        self.input.notify_all();
        self.output.notify_all();
        self.signal_progress();
    }

    pub fn is_aborted(&self) -> bool {
        self.aborted.load(Ordering::Acquire)
    }

    /// Wake the coordinator: some stage's completion predicate may now hold.
    pub fn signal_progress(&self) {
        let _guard = self.progress_lock.lock();
        self.progress.notify_all();
    }

    /// Park for at most one poll interval, or until progress is signalled.
    pub fn wait_progress(&self) {
        let mut guard = self.progress_lock.lock();
        self.progress.wait_for(&mut guard, self.poll_interval);
    }
}

impl std::fmt::Debug for PipelineContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineContext")
            .field("phase", &self.phase())
            .field("produced", &self.produced())
            .field("exhausted", &self.is_exhausted())
            .field("in_flight", &self.in_flight())
            .field("live_workers", &self.live_workers())
            .field("emitted", &self.emitted())
            .field("aborted", &self.is_aborted())
            .field("input", &self.input)
            .field("output", &self.output)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn total_is_unknown_until_exhausted() {
        let ctx = PipelineContext::default();
        ctx.record_produced();
        ctx.record_produced();
        assert_eq!(ctx.total(), None);
        ctx.mark_exhausted();
        assert_eq!(ctx.total(), Some(2));
    }

    #[test]
    fn held_claim_blocks_worker_exit() {
        let ctx = PipelineContext::default();
        ctx.input.push(1, "x".to_string());
        ctx.record_produced();
        ctx.mark_exhausted();

        ctx.begin_claim();
        let taken = ctx.input.pull_any();
        assert!(taken.is_some());
        // Input is empty and the source is done, but a record is in flight.
        assert!(ctx.input.is_empty());
        assert!(!ctx.worker_may_exit());

        ctx.output.push(1, "X".to_string());
        ctx.end_claim();
        assert!(ctx.worker_may_exit());
    }

    #[test]
    #[should_panic(expected = "claim counter underflow")]
    fn ending_an_unstarted_claim_is_a_defect() {
        PipelineContext::default().end_claim();
    }

    #[test]
    fn last_worker_marks_pool_finished() {
        let ctx = PipelineContext::default();
        ctx.register_workers(2);
        ctx.worker_exited();
        assert!(!ctx.pool_finished());
        ctx.worker_exited();
        assert!(ctx.pool_finished());
        assert_eq!(ctx.live_workers(), 0);
    }

    #[test]
    fn sink_finished_after_all_emitted() {
        let ctx = PipelineContext::default();
        ctx.record_produced();
        assert!(!ctx.sink_finished());
        ctx.mark_exhausted();
        assert!(!ctx.sink_finished());
        assert_eq!(ctx.record_emitted(), 1);
        assert!(ctx.sink_finished());
    }
}
