//! Reading input and numbering it.
//!
//! A [`RecordReader`] yields raw lines one at a time. The [`SequencedSource`]
//! drains a reader into the input store, giving each line the next sequence
//! number, and marks the run exhausted once the reader is done (or fails).

use crate::context::PipelineContext;
use crate::error::{Error, Result};
use crate::io::compression::{InputReader, auto_detect_reader};
use crate::io::glob::expand_inputs;
use crate::record::seq_after;
use log::{debug, trace};
use std::collections::VecDeque;
use std::fs::{self, File};
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};

/// Producer of raw records.
pub trait RecordReader: Send {
    /// The next record, or `None` once the input is exhausted.
    ///
    /// # Errors
    ///
    /// Any I/O error of the underlying input.
    fn read_next(&mut self) -> io::Result<Option<String>>;
}

impl<R: RecordReader + ?Sized> RecordReader for Box<R> {
    fn read_next(&mut self) -> io::Result<Option<String>> {
        (**self).read_next()
    }
}

/// Splits a byte stream into lines.
///
/// Line terminators (`\n` or `\r\n`) are stripped. A final line without a
/// terminator is still a record; an empty input yields no records. Bytes that
/// are not valid UTF-8 are replaced rather than failing the run.
pub struct LineReader<R> {
    inner: R,
    buf: Vec<u8>,
}

impl<R: BufRead> LineReader<R> {
    pub fn new(inner: R) -> Self {
        Self { inner, buf: Vec::with_capacity(256) }
    }
}

impl<R: BufRead + Send> RecordReader for LineReader<R> {
    fn read_next(&mut self) -> io::Result<Option<String>> {
        self.buf.clear();
        if self.inner.read_until(b'\n', &mut self.buf)? == 0 {
            return Ok(None);
        }
        if self.buf.last() == Some(&b'\n') {
            self.buf.pop();
            if self.buf.last() == Some(&b'\r') {
                self.buf.pop();
            }
        }
        let line = match String::from_utf8(std::mem::take(&mut self.buf)) {
            Ok(s) => s,
            Err(e) => String::from_utf8_lossy(e.as_bytes()).into_owned(),
        };
        Ok(Some(line))
    }
}

/// Records from an in-memory iterator. Never fails.
pub struct IterReader<I>(I);

impl<I, S> IterReader<I>
where
    I: Iterator<Item = S>,
    S: Into<String>,
{
    pub fn new(iter: impl IntoIterator<IntoIter = I>) -> Self {
        Self(iter.into_iter())
    }
}

impl<I, S> RecordReader for IterReader<I>
where
    I: Iterator<Item = S> + Send,
    S: Into<String>,
{
    fn read_next(&mut self) -> io::Result<Option<String>> {
        Ok(self.0.next().map(Into::into))
    }
}

/// Reads several line readers back to back.
pub struct ChainedReader {
    parts: VecDeque<LineReader<BufReader<InputReader>>>,
}

impl RecordReader for ChainedReader {
    fn read_next(&mut self) -> io::Result<Option<String>> {
        while let Some(front) = self.parts.front_mut() {
            if let Some(line) = front.read_next()? {
                return Ok(Some(line));
            }
            self.parts.pop_front();
        }
        Ok(None)
    }
}

/// Where input lines come from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum InputSource {
    Stdin,
    /// Named files, read in order. `-` stands for standard input.
    Files(Vec<PathBuf>),
}

impl InputSource {
    /// Build from command line arguments: none means standard input,
    /// otherwise files with glob patterns expanded.
    ///
    /// # Errors
    ///
    /// Fails if a pattern is malformed or matches nothing.
    pub fn from_args<S: AsRef<str>>(args: &[S]) -> Result<Self> {
        if args.is_empty() {
            return Ok(Self::Stdin);
        }
        Ok(Self::Files(expand_inputs(args)?))
    }

    /// Open every input up front, so a missing file aborts the run before
    /// any record is produced.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SourceUnavailable`] for the first input that is not a
    /// readable regular file.
    pub fn open(&self) -> Result<ChainedReader> {
        let paths: Vec<&Path> = match self {
            Self::Stdin => vec![Path::new("-")],
            Self::Files(paths) => paths.iter().map(PathBuf::as_path).collect(),
        };
        let parts = paths
            .into_iter()
            .map(|path| open_one(path).map(|r| LineReader::new(BufReader::new(r))))
            .collect::<Result<VecDeque<_>>>()?;
        Ok(ChainedReader { parts })
    }
}

fn open_one(path: &Path) -> Result<InputReader> {
    let unavailable = |source: io::Error| Error::SourceUnavailable { path: path.to_path_buf(), source };
    if path == Path::new("-") {
        return auto_detect_reader(io::stdin(), path).map_err(unavailable);
    }

    let meta = fs::metadata(path).map_err(unavailable)?;
    if !meta.is_file() {
        return Err(unavailable(io::Error::new(
            io::ErrorKind::InvalidInput,
            "not a regular file",
        )));
    }
    let file = File::open(path).map_err(unavailable)?;
    debug!("opened input {}", path.display());
    auto_detect_reader(file, path).map_err(unavailable)
}

/// Marks the run exhausted however the source stops, unwinding included.
struct ExhaustOnDrop<'a>(&'a PipelineContext);

impl Drop for ExhaustOnDrop<'_> {
    fn drop(&mut self) {
        if std::thread::panicking() {
            self.0.abort();
        }
        self.0.mark_exhausted();
    }
}

/// Drains a [`RecordReader`] into the input store.
pub struct SequencedSource<R> {
    reader: R,
}

impl<R: RecordReader> SequencedSource<R> {
    pub fn new(reader: R) -> Self {
        Self { reader }
    }

    /// Push every record with consecutive sequence numbers, then mark the
    /// run exhausted. Returns the number of records produced.
    ///
    /// A read error stops reading: the records already pushed still flow
    /// through the pipeline, and the error is returned.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SourceRead`] if the reader fails.
    pub fn run(mut self, ctx: &PipelineContext) -> Result<u64> {
        let _exhaust = ExhaustOnDrop(ctx);
        loop {
            match self.reader.read_next() {
                Ok(Some(payload)) => {
                    let seq = seq_after(ctx.produced());
                    trace!("read record {seq}");
                    ctx.input.push(seq, payload);
                    ctx.record_produced();
                }
                Ok(None) => {
                    debug!("source exhausted after {} records", ctx.produced());
                    return Ok(ctx.produced());
                }
                Err(e) => {
                    debug!("source failed after {} records: {e}", ctx.produced());
                    return Err(Error::SourceRead(e));
                }
            }
        }
    }
}
