//! Transparent decompression of input files.
//!
//! Inputs ending in a known extension, or starting with a known magic
//! signature, are wrapped in the matching decoder before lines are read.
//! Which codecs exist depends on feature flags:
//! - **Gzip** (`.gz`): `flate2`, feature `compression-gzip`
//! - **Zstd** (`.zst`): `zstd`, feature `compression-zstd`
//!
//! With no compression feature enabled, [`auto_detect_reader`] is a plain
//! buffering pass-through.
//!
//! ```no_run
//! use xcut::io::compression::auto_detect_reader;
//! use std::fs::File;
//! # fn main() -> std::io::Result<()> {
//! let file = File::open("access.log.gz")?;
//! let reader = auto_detect_reader(file, "access.log.gz")?;
//! // `reader` yields the decompressed text
//! # Ok(())
//! # }
//! ```

use std::io::{self, BufRead, BufReader, Read};
use std::path::Path;

/// Reader handed to the source thread.
pub type InputReader = Box<dyn Read + Send>;

/// A decompression format recognised on input.
pub trait CompressionCodec: Send + Sync {
    /// Human-readable codec name (e.g., "gzip").
    fn name(&self) -> &str;

    /// Lowercase extensions including the leading dot.
    fn extensions(&self) -> &[&str];

    /// Signature at the start of a compressed stream, if the format has one.
    fn magic_bytes(&self) -> Option<&[u8]>;

    /// Wrap `reader` so that it yields decompressed bytes.
    fn wrap_reader(&self, reader: InputReader) -> io::Result<InputReader>;
}

/// Codecs compiled into this build, in detection order.
pub fn codecs() -> Vec<Box<dyn CompressionCodec>> {
    vec![
        #[cfg(feature = "compression-gzip")]
        Box::new(GzipCodec),
        #[cfg(feature = "compression-zstd")]
        Box::new(ZstdCodec),
    ]
}

fn detect_from_extension(path: &Path) -> Option<Box<dyn CompressionCodec>> {
    let name = path.to_string_lossy().to_lowercase();
    codecs()
        .into_iter()
        .find(|codec| codec.extensions().iter().any(|ext| name.ends_with(ext)))
}

/// Peek at the head of `reader` without consuming it.
fn detect_from_magic<R: BufRead>(reader: &mut R) -> io::Result<Option<Box<dyn CompressionCodec>>> {
    loop {
        match reader.fill_buf() {
            Ok(_) => break,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    let buf = reader.fill_buf()?;
    if buf.is_empty() {
        return Ok(None);
    }
    Ok(codecs()
        .into_iter()
        .find(|codec| codec.magic_bytes().is_some_and(|magic| buf.starts_with(magic))))
}

/// Sniffs magic bytes on the first read, so opening a stream never waits for data.
enum SniffOnRead {
    /// `None` once sniffing has failed; later reads keep failing.
    Pending(Option<BufReader<InputReader>>),
    Ready(InputReader),
}

impl Read for SniffOnRead {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        loop {
            match self {
                Self::Ready(inner) => return inner.read(buf),
                Self::Pending(head) => {
                    let Some(mut head) = head.take() else {
                        return Err(io::Error::other("input decoder could not be initialised"));
                    };
                    let inner: InputReader = match detect_from_magic(&mut head)? {
                        Some(codec) => codec.wrap_reader(Box::new(head))?,
                        None => Box::new(head),
                    };
                    *self = Self::Ready(inner);
                }
            }
        }
    }
}

/// Wrap `reader` with a decoder if `path_hint` or the stream's first bytes call for one.
///
/// The extension is checked first. When it is not recognised the magic bytes
/// are checked on the first read, not here, so this never blocks on `reader`.
///
/// # Errors
///
/// Returns the decoder's error if it cannot be initialised. Errors while
/// sniffing magic bytes surface from the first read instead.
pub fn auto_detect_reader<R: Read + Send + 'static>(
    reader: R,
    path_hint: impl AsRef<Path>,
) -> io::Result<InputReader> {
    if let Some(codec) = detect_from_extension(path_hint.as_ref()) {
        return codec.wrap_reader(Box::new(reader));
    }

    let head: InputReader = Box::new(reader);
    Ok(Box::new(SniffOnRead::Pending(Some(BufReader::new(head)))))
}

#[cfg(feature = "compression-gzip")]
struct GzipCodec;

#[cfg(feature = "compression-gzip")]
impl CompressionCodec for GzipCodec {
    fn name(&self) -> &str {
        "gzip"
    }

    fn extensions(&self) -> &[&str] {
        &[".gz", ".gzip"]
    }

    fn magic_bytes(&self) -> Option<&[u8]> {
        Some(&[0x1f, 0x8b])
    }

    fn wrap_reader(&self, reader: InputReader) -> io::Result<InputReader> {
        // Concatenated members are common for rotated logs.
        Ok(Box::new(flate2::read::MultiGzDecoder::new(reader)))
    }
}

#[cfg(feature = "compression-zstd")]
struct ZstdCodec;

#[cfg(feature = "compression-zstd")]
impl CompressionCodec for ZstdCodec {
    fn name(&self) -> &str {
        "zstd"
    }

    fn extensions(&self) -> &[&str] {
        &[".zst", ".zstd"]
    }

    fn magic_bytes(&self) -> Option<&[u8]> {
        Some(&[0x28, 0xb5, 0x2f, 0xfd])
    }

    fn wrap_reader(&self, reader: InputReader) -> io::Result<InputReader> {
        zstd::stream::read::Decoder::new(reader).map(|d| Box::new(d) as InputReader)
    }
}
