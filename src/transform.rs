//! The per-record transformation applied by the worker pool.
//!
//! A [`Transform`] maps one payload to another. Workers call it concurrently
//! on different records, so implementations must be `Send + Sync` and keep no
//! hidden mutable state. A failed (or panicking) transform does not stop the
//! run: the worker forwards the original payload and counts the failure.

use crate::error::TransformError;
use std::fmt::Display;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

pub trait Transform: Send + Sync {
    /// Transform one payload.
    ///
    /// # Errors
    ///
    /// Returns a [`TransformError`] if the payload cannot be transformed.
    fn apply(&self, payload: &str) -> Result<String, TransformError>;

    /// Short name used in log messages.
    fn name(&self) -> &str {
        "transform"
    }
}

/// Passes every payload through unchanged.
#[derive(Clone, Copy, Debug, Default)]
pub struct Identity;

impl Transform for Identity {
    fn apply(&self, payload: &str) -> Result<String, TransformError> {
        Ok(payload.to_string())
    }

    fn name(&self) -> &str {
        "identity"
    }
}

/// Infallible transform from a closure. See [`from_fn`].
#[derive(Clone)]
pub struct FnTransform<F>(F);

impl<F> Transform for FnTransform<F>
where
    F: Fn(&str) -> String + Send + Sync,
{
    fn apply(&self, payload: &str) -> Result<String, TransformError> {
        Ok((self.0)(payload))
    }
}

/// Fallible transform from a closure. See [`try_from_fn`].
#[derive(Clone)]
pub struct TryFnTransform<F>(F);

impl<F, E> Transform for TryFnTransform<F>
where
    F: Fn(&str) -> Result<String, E> + Send + Sync,
    E: Display,
{
    fn apply(&self, payload: &str) -> Result<String, TransformError> {
        (self.0)(payload).map_err(|e| TransformError::new(e.to_string()))
    }
}

/// Wrap an infallible closure as a [`Transform`].
///
/// ```
/// use xcut::transform::{from_fn, Transform};
///
/// let upper = from_fn(|s: &str| s.to_uppercase());
/// assert_eq!(upper.apply("abc").unwrap(), "ABC");
/// ```
pub fn from_fn<F>(f: F) -> FnTransform<F>
where
    F: Fn(&str) -> String + Send + Sync,
{
    FnTransform(f)
}

/// Wrap a fallible closure as a [`Transform`]; its error is kept as a message.
pub fn try_from_fn<F, E>(f: F) -> TryFnTransform<F>
where
    F: Fn(&str) -> Result<String, E> + Send + Sync,
    E: Display,
{
    TryFnTransform(f)
}

impl<T: Transform + ?Sized> Transform for Arc<T> {
    fn apply(&self, payload: &str) -> Result<String, TransformError> {
        (**self).apply(payload)
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

impl<T: Transform + ?Sized> Transform for Box<T> {
    fn apply(&self, payload: &str) -> Result<String, TransformError> {
        (**self).apply(payload)
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

/// Apply `transform`, turning a panic into a [`TransformError`].
pub(crate) fn apply_guarded<T: Transform + ?Sized>(
    transform: &T,
    payload: &str,
) -> Result<String, TransformError> {
    match catch_unwind(AssertUnwindSafe(|| transform.apply(payload))) {
        Ok(result) => result,
        Err(panic) => Err(TransformError::from_panic(panic.as_ref())),
    }
}
