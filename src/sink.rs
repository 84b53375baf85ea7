//! Draining the output store to a destination.
//!
//! The sink is the only consumer of the output store. In
//! [`SinkMode::Unordered`] it emits whatever arrives first; in
//! [`SinkMode::Ordered`] it emits strictly by increasing sequence number,
//! holding back results that overtook a slower predecessor.

use crate::context::PipelineContext;
use crate::error::{Error, Result};
use crate::phase::Phase;
use crate::record::{FIRST_SEQ, Record, Seq};
use log::{debug, trace, warn};
use parking_lot::Mutex;
use std::fmt;
use std::io::{self, BufWriter, Write};
use std::sync::Arc;

/// Order in which the sink emits records.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SinkMode {
    /// As soon as each result is available.
    #[default]
    Unordered,
    /// In source order.
    Ordered,
}

impl fmt::Display for SinkMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SinkMode::Unordered => "unordered",
            SinkMode::Ordered => "ordered",
        })
    }
}

/// Destination of emitted records. Called from the sink thread only.
pub trait Emit: Send {
    /// Emit one record.
    ///
    /// # Errors
    ///
    /// An I/O error of the destination. The run keeps draining but emits nothing further.
    fn emit(&mut self, seq: Seq, payload: &str) -> io::Result<()>;

    /// Called once after the last record.
    ///
    /// # Errors
    ///
    /// Flushing the destination failed.
    fn finish(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<F> Emit for F
where
    F: FnMut(Seq, &str) -> io::Result<()> + Send,
{
    fn emit(&mut self, seq: Seq, payload: &str) -> io::Result<()> {
        self(seq, payload)
    }
}

/// Writes each payload as one `\n` terminated line.
pub struct WriterEmitter<W: Write> {
    out: BufWriter<W>,
}

impl<W: Write> WriterEmitter<W> {
    pub fn new(out: W) -> Self {
        Self { out: BufWriter::new(out) }
    }
}

impl<W: Write + Send> Emit for WriterEmitter<W> {
    fn emit(&mut self, _seq: Seq, payload: &str) -> io::Result<()> {
        self.out.write_all(payload.as_bytes())?;
        self.out.write_all(b"\n")
    }

    fn finish(&mut self) -> io::Result<()> {
        self.out.flush()
    }
}

/// Collects emitted records in memory. Clones share the same buffer.
#[derive(Clone, Debug, Default)]
pub struct VecEmitter {
    records: Arc<Mutex<Vec<Record>>>,
}

impl VecEmitter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records emitted so far, in emission order.
    pub fn records(&self) -> Vec<Record> {
        self.records.lock().clone()
    }

    pub fn payloads(&self) -> Vec<String> {
        self.records.lock().iter().map(|r| r.payload.clone()).collect()
    }
}

impl Emit for VecEmitter {
    fn emit(&mut self, seq: Seq, payload: &str) -> io::Result<()> {
        self.records.lock().push(Record::new(seq, payload));
        Ok(())
    }
}

/// Aborts the run if the sink unwinds, since nothing else could finish it.
struct AbortOnPanic<'a>(&'a PipelineContext);

impl Drop for AbortOnPanic<'_> {
    fn drop(&mut self) {
        if std::thread::panicking() {
            self.0.abort();
        }
    }
}

/// Single consumer of the output store.
pub struct OrderedSink<E> {
    mode: SinkMode,
    emitter: E,
    error: Option<io::Error>,
}

impl<E: Emit> OrderedSink<E> {
    pub fn new(mode: SinkMode, emitter: E) -> Self {
        Self { mode, emitter, error: None }
    }

    /// Drain the output store until every produced record has been emitted.
    /// Returns the number of records taken from the store.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Sink`] with the first emit or flush failure. Records
    /// after a failure are still drained so the run can complete.
    pub fn run(mut self, ctx: &PipelineContext) -> Result<u64> {
        let _abort = AbortOnPanic(ctx);
        debug!("sink draining in {} mode", self.mode);
        match self.mode {
            SinkMode::Unordered => self.drain_unordered(ctx),
            SinkMode::Ordered => self.drain_ordered(ctx),
        }
        if let Err(e) = self.emitter.finish() {
            self.error.get_or_insert(e);
        }
        match self.error {
            Some(e) => Err(Error::Sink(e)),
            None => Ok(ctx.emitted()),
        }
    }

    fn drain_unordered(&mut self, ctx: &PipelineContext) {
        loop {
            if let Some((seq, payload)) = ctx.output.pull_any() {
                self.emit(ctx, seq, &payload);
                continue;
            }
            // Done implies every record was emitted; emptiness guards a late push.
            if (ctx.phase() == Phase::Done && ctx.output.is_empty()) || ctx.is_aborted() {
                return;
            }
            ctx.output.wait_nonempty(ctx.poll_interval());
        }
    }

    fn drain_ordered(&mut self, ctx: &PipelineContext) {
        let mut cursor = FIRST_SEQ;
        loop {
            if let Some(payload) = ctx.output.pull_by_key(cursor) {
                self.emit(ctx, cursor, &payload);
                cursor += 1;
                continue;
            }
            if ctx.sink_finished() || ctx.is_aborted() {
                return;
            }
            ctx.output.wait_for_key(cursor, ctx.poll_interval());
        }
    }

    fn emit(&mut self, ctx: &PipelineContext, seq: Seq, payload: &str) {
        if self.error.is_none() {
            trace!("emit record {seq}");
            if let Err(e) = self.emitter.emit(seq, payload) {
                warn!("write failed at record {seq}, discarding further output: {e}");
                self.error = Some(e);
            }
        }
        ctx.record_emitted();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::phase::PhaseCoordinator;

    #[test]
    fn ordered_sink_restores_sequence() {
        let ctx = PipelineContext::default();
        for seq in [3, 1, 4, 2] {
            ctx.output.push(seq, format!("p{seq}"));
            ctx.record_produced();
        }
        ctx.mark_exhausted();

        let out = VecEmitter::new();
        let n = OrderedSink::new(SinkMode::Ordered, out.clone()).run(&ctx).unwrap();
        assert_eq!(n, 4);
        assert_eq!(out.payloads(), vec!["p1", "p2", "p3", "p4"]);
        assert!(ctx.output.is_empty());
    }

    #[test]
    fn unordered_sink_stops_once_done() {
        let ctx = PipelineContext::default();
        for seq in 1..=3 {
            ctx.output.push(seq, seq.to_string());
            ctx.record_produced();
        }
        ctx.mark_exhausted();
        ctx.register_workers(0);

        std::thread::scope(|s| {
            s.spawn(|| PhaseCoordinator::new(&ctx).run());
            let out = VecEmitter::new();
            OrderedSink::new(SinkMode::Unordered, out.clone()).run(&ctx).unwrap();
            let mut got = out.payloads();
            got.sort();
            assert_eq!(got, vec!["1", "2", "3"]);
        });
        assert!(ctx.is_complete());
    }

    #[test]
    fn write_errors_are_reported_after_draining() {
        let ctx = PipelineContext::default();
        for seq in 1..=3 {
            ctx.output.push(seq, "x".to_string());
            ctx.record_produced();
        }
        ctx.mark_exhausted();

        let mut calls = 0;
        let failing = move |_seq: Seq, _p: &str| {
            calls += 1;
            if calls == 2 { Err(io::Error::other("disk full")) } else { Ok(()) }
        };
        let err = OrderedSink::new(SinkMode::Ordered, failing).run(&ctx).unwrap_err();
        assert!(matches!(err, Error::Sink(_)));
        assert_eq!(ctx.emitted(), 3);
        assert!(ctx.output.is_empty());
    }

    #[test]
    fn writer_emitter_terminates_lines() {
        let mut w = WriterEmitter::new(Vec::new());
        w.emit(1, "a b").unwrap();
        w.emit(2, "").unwrap();
        w.finish().unwrap();
        let bytes = w.out.into_inner().unwrap();
        assert_eq!(bytes, b"a b\n\n");
    }
}
