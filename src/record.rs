//! The unit of work flowing through a [`Pipeline`](crate::pipeline::Pipeline).
//!
//! Every line read by the [`SequencedSource`](crate::source::SequencedSource)
//! becomes a `Record`: a sequence number fixing its original position, plus
//! the text payload. Sequence numbers are assigned by the source only, start
//! at [`FIRST_SEQ`] and grow by one per record, so a record's sequence number
//! is also its 1-based line number across all inputs.

/// Sequence number of the first record a source produces.
pub const FIRST_SEQ: Seq = 1;

/// Position of a record in the input stream.
pub type Seq = u64;

/// One discrete input unit: a sequence number and a string payload.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Record {
    pub seq: Seq,
    pub payload: String,
}

impl Record {
    #[inline]
    pub fn new(seq: Seq, payload: impl Into<String>) -> Self {
        Self { seq, payload: payload.into() }
    }
}

/// Sequence number of the `n`-th record (0-based count of records before it).
#[inline]
pub(crate) fn seq_after(produced: u64) -> Seq {
    FIRST_SEQ + produced
}
