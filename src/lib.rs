//! # xcut
//!
//! A concurrent line-processing pipeline. Lines are read from a source,
//! transformed by a pool of worker threads, and written by a single sink,
//! either as soon as each result is ready or in the original input order.
//!
//! ## Key Features
//!
//! - **No closing signal needed** - workers detect "no more input" from an
//!   exhaustion flag plus claim counters, so a sibling holding the last
//!   record is never overlooked
//! - **Exactly once** - every line read is emitted exactly once, in both modes
//! - **Ordered or unordered output** - [`SinkMode::Ordered`] reassembles
//!   input order whatever order the workers finish in
//! - **Pluggable transforms** - anything implementing [`Transform`], closures included
//! - **No globals** - each run owns its state; runs can proceed side by side
//! - **Field cutting** - [`fields::FieldTransform`] splits, rewrites and selects fields
//!   like `cut` combined with `sed`
//!
//! ## Quick Start
//!
//! ```
//! use xcut::{Pipeline, SinkMode};
//! use xcut::sink::VecEmitter;
//! use xcut::source::IterReader;
//! use xcut::transform::from_fn;
//!
//! # fn main() -> xcut::Result<()> {
//! let out = VecEmitter::new();
//! Pipeline::default()
//!     .with_mode(SinkMode::Ordered)
//!     .run(
//!         IterReader::new(["b 2", "a 1"]),
//!         from_fn(|line: &str| line.replace(' ', "=")),
//!         out.clone(),
//!     )?;
//! assert_eq!(out.payloads(), vec!["b=2", "a=1"]);
//! # Ok(())
//! # }
//! ```
//!
//! ## Stages
//!
//! - [`source::SequencedSource`] numbers lines from [`FIRST_SEQ`] and pushes them
//!   into the input [`RecordStore`]
//! - [`pool::TransformerPool`] workers move records from the input to the output store
//! - [`sink::OrderedSink`] drains the output store to an [`Emit`] destination
//! - [`phase::PhaseCoordinator`] advances the run through
//!   `Reading → Processing → Writing → Done`
//!
//! All of them share one [`PipelineContext`].
//!
//! ## Feature Flags
//!
//! - `compression-gzip` (default) - read `.gz` input
//! - `compression-zstd` (default) - read `.zst` input
//! - `metrics` (default) - [`metrics`] reporting via `serde_json`

pub mod context;
pub mod error;
pub mod fields;
pub mod io;
pub mod phase;
pub mod pipeline;
pub mod pool;
pub mod record;
pub mod sink;
pub mod source;
pub mod store;
pub mod testing;
pub mod transform;

#[cfg_attr(docsrs, doc(cfg(feature = "metrics")))]
#[cfg(feature = "metrics")]
pub mod metrics;

pub use context::PipelineContext;
pub use error::{Error, Result, TransformError};
pub use phase::{Phase, PhaseCoordinator};
pub use pipeline::{Pipeline, RunSummary, RunningPipeline};
pub use pool::TransformerPool;
pub use record::{FIRST_SEQ, Record, Seq};
pub use sink::{Emit, OrderedSink, SinkMode};
pub use source::{InputSource, RecordReader, SequencedSource};
pub use store::RecordStore;
pub use transform::Transform;
