//! Run phases and the coordinator that advances them.
//!
//! A run moves through `Reading → Processing → Writing → Done`, never back.
//! The [`PhaseCoordinator`] is the only writer: it polls the completion
//! predicates published on the [`PipelineContext`] and steps the phase forward
//! each time the next predicate holds. Other stages only read the phase; the
//! worker pool does not need it at all, its own counters suffice.

use crate::context::PipelineContext;
use log::debug;
use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};

/// Stage of life of a pipeline run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum Phase {
    /// The source may still push records.
    Reading = 0,
    /// All input has been read and taken by workers; transforms may be in flight.
    Processing = 1,
    /// Every worker has exited; the sink is draining the output store.
    Writing = 2,
    /// Every produced record has been emitted.
    Done = 3,
}

impl Phase {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => Phase::Reading,
            1 => Phase::Processing,
            2 => Phase::Writing,
            _ => Phase::Done,
        }
    }

    /// The phase following this one (`Done` is terminal).
    pub fn next(self) -> Self {
        Self::from_u8(self as u8 + 1)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Phase::Reading => "reading",
            Phase::Processing => "processing",
            Phase::Writing => "writing",
            Phase::Done => "done",
        };
        f.write_str(s)
    }
}

/// Atomic, forward-only holder of the current [`Phase`].
#[derive(Debug)]
pub struct PhaseCell(AtomicU8);

impl Default for PhaseCell {
    fn default() -> Self {
        Self(AtomicU8::new(Phase::Reading as u8))
    }
}

impl PhaseCell {
    #[inline]
    pub fn get(&self) -> Phase {
        Phase::from_u8(self.0.load(Ordering::Acquire))
    }

    /// Move to `to` if it is later than the current phase.
    ///
    /// Returns `true` if the phase changed. Requests to move backwards are
    /// ignored, so no reader ever observes a regression.
    pub fn advance(&self, to: Phase) -> bool {
        let prev = self.0.fetch_max(to as u8, Ordering::AcqRel);
        prev < to as u8
    }
}

/// Single writer of the run phase.
///
/// Transitions:
/// - `Reading → Processing` once the source is exhausted and the input store is empty.
/// - `Processing → Writing` once every worker has exited and the input store is empty.
/// - `Writing → Done` once the sink has emitted every produced record.
pub struct PhaseCoordinator<'a> {
    ctx: &'a PipelineContext,
}

impl<'a> PhaseCoordinator<'a> {
    pub fn new(ctx: &'a PipelineContext) -> Self {
        Self { ctx }
    }

    /// Whether the predicate guarding the move out of `phase` currently holds.
    fn may_leave(&self, phase: Phase) -> bool {
        let ctx = self.ctx;
        match phase {
            Phase::Reading => ctx.is_exhausted() && ctx.input.is_empty(),
            Phase::Processing => ctx.pool_finished() && ctx.input.is_empty(),
            Phase::Writing => ctx.sink_finished(),
            Phase::Done => false,
        }
    }

    /// Evaluate the predicates once, taking every transition that is satisfied.
    ///
    /// Returns the phase after polling.
    pub fn poll(&self) -> Phase {
        let mut phase = self.ctx.phase();
        while self.may_leave(phase) {
            let next = phase.next();
            if self.ctx.phase_cell().advance(next) {
                debug!("phase {phase} -> {next}");
                // Idle stages may be parked on a store; let them see the new phase.
                self.ctx.input.notify_all();
                self.ctx.output.notify_all();
            }
            phase = next;
        }
        phase
    }

    /// Poll until the run reaches [`Phase::Done`] (or is aborted), parking between polls.
    pub fn run(&self) -> Phase {
        loop {
            let phase = self.poll();
            if phase == Phase::Done || self.ctx.is_aborted() {
                return phase;
            }
            self.ctx.wait_progress();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phase_cell_never_regresses() {
        let cell = PhaseCell::default();
        assert_eq!(cell.get(), Phase::Reading);
        assert!(cell.advance(Phase::Writing));
        assert!(!cell.advance(Phase::Processing));
        assert_eq!(cell.get(), Phase::Writing);
        assert!(!cell.advance(Phase::Writing));
        assert!(cell.advance(Phase::Done));
        assert_eq!(cell.get(), Phase::Done);
    }

    #[test]
    fn next_saturates_at_done() {
        assert_eq!(Phase::Reading.next(), Phase::Processing);
        assert_eq!(Phase::Writing.next(), Phase::Done);
        assert_eq!(Phase::Done.next(), Phase::Done);
    }

    #[test]
    fn coordinator_walks_all_phases_for_an_empty_run() {
        let ctx = PipelineContext::default();
        let coordinator = PhaseCoordinator::new(&ctx);
        assert_eq!(coordinator.poll(), Phase::Reading);

        ctx.mark_exhausted();
        assert_eq!(coordinator.poll(), Phase::Processing);

        ctx.register_workers(1);
        ctx.worker_exited();
        assert_eq!(coordinator.poll(), Phase::Done);
    }

    #[test]
    fn coordinator_waits_for_sink() {
        let ctx = PipelineContext::default();
        let coordinator = PhaseCoordinator::new(&ctx);
        ctx.input.push(1, "a".to_string());
        ctx.record_produced();
        ctx.mark_exhausted();
        // Record still waiting in the input store.
        assert_eq!(coordinator.poll(), Phase::Reading);

        let (seq, payload) = ctx.input.pull_any().unwrap();
        ctx.output.push(seq, payload);
        ctx.register_workers(1);
        ctx.worker_exited();
        assert_eq!(coordinator.poll(), Phase::Writing);

        ctx.output.pull_by_key(1).unwrap();
        ctx.record_emitted();
        assert_eq!(coordinator.poll(), Phase::Done);
    }

    #[test]
    fn run_returns_early_when_aborted() {
        let ctx = PipelineContext::default();
        ctx.abort();
        assert_eq!(PhaseCoordinator::new(&ctx).run(), Phase::Reading);
    }
}
