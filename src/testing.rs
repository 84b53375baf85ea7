//! Helpers for testing pipelines and transforms.
//!
//! - [`numbered_lines`] builds deterministic input
//! - [`DelayTransform`] makes workers finish out of order
//! - [`run_collect`] runs a pipeline into memory
//! - [`assert_in_order`] and [`assert_same_multiset`] check the output
//!
//! ```
//! use xcut::pipeline::Pipeline;
//! use xcut::sink::SinkMode;
//! use xcut::testing::*;
//! use xcut::transform::Identity;
//! use std::time::Duration;
//!
//! let input = numbered_lines(200);
//! let slow = DelayTransform::new(Identity, Duration::from_micros(300));
//! let out = run_collect(Pipeline::default().with_workers(8).with_mode(SinkMode::Ordered), &input, slow)?;
//! assert_in_order(&out, &input);
//! # Ok::<(), xcut::Error>(())
//! ```

use crate::error::{Result, TransformError};
use crate::pipeline::Pipeline;
use crate::sink::VecEmitter;
use crate::source::IterReader;
use crate::transform::Transform;
use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;
use std::thread;
use std::time::Duration;

/// `n` lines of the form `"line <i> field<i>"`, `i` from 1.
#[must_use]
pub fn numbered_lines(n: usize) -> Vec<String> {
    (1..=n).map(|i| format!("line {i} field{i}")).collect()
}

/// Wraps a transform and sleeps before each call.
///
/// The delay is a fixed pseudo-random function of the payload, in
/// `[0, max)`, so runs are reproducible while records still complete in a
/// scrambled order.
#[derive(Clone, Debug)]
pub struct DelayTransform<T> {
    inner: T,
    max: Duration,
}

impl<T: Transform> DelayTransform<T> {
    pub fn new(inner: T, max: Duration) -> Self {
        Self { inner, max }
    }

    fn delay_for(&self, payload: &str) -> Duration {
        let max_nanos = u64::try_from(self.max.as_nanos()).unwrap_or(u64::MAX);
        if max_nanos == 0 {
            return Duration::ZERO;
        }
        // FNV-1a, then one LCG step to spread short inputs.
        let mut h: u64 = 0xcbf2_9ce4_8422_2325;
        for b in payload.bytes() {
            h = (h ^ u64::from(b)).wrapping_mul(0x0100_0000_01b3);
        }
        h = h.wrapping_mul(6_364_136_223_846_793_005).wrapping_add(1_442_695_040_888_963_407);
        Duration::from_nanos((h >> 11) % max_nanos)
    }
}

impl<T: Transform> Transform for DelayTransform<T> {
    fn apply(&self, payload: &str) -> Result<String, TransformError> {
        thread::sleep(self.delay_for(payload));
        self.inner.apply(payload)
    }

    fn name(&self) -> &str {
        self.inner.name()
    }
}

/// Run `pipeline` over `inputs` and return the emitted payloads in emission order.
///
/// # Errors
///
/// Any error of [`Pipeline::run`].
pub fn run_collect<S, T>(pipeline: Pipeline, inputs: &[S], transform: T) -> Result<Vec<String>>
where
    S: AsRef<str>,
    T: Transform + 'static,
{
    let owned: Vec<String> = inputs.iter().map(|s| s.as_ref().to_string()).collect();
    let out = VecEmitter::new();
    pipeline.run(IterReader::new(owned), transform, out.clone())?;
    Ok(out.payloads())
}

/// Assert that two sequences are equal element by element.
///
/// # Panics
///
/// Panics at the first position where they differ, or on a length mismatch.
pub fn assert_in_order<A, E>(actual: &[A], expected: &[E])
where
    A: Debug + PartialEq<E>,
    E: Debug,
{
    assert_eq!(
        actual.len(),
        expected.len(),
        "Length mismatch:\n  Expected length: {}\n  Actual length: {}",
        expected.len(),
        actual.len()
    );
    for (i, (a, e)) in actual.iter().zip(expected).enumerate() {
        assert!(
            a == e,
            "Order mismatch at index {i}:\n  Expected: {e:?}\n  Actual: {a:?}"
        );
    }
}

fn counts<T: Eq + Hash>(items: &[T]) -> HashMap<&T, usize> {
    let mut m = HashMap::new();
    for item in items {
        *m.entry(item).or_insert(0) += 1;
    }
    m
}

/// Assert that two sequences hold the same elements with the same multiplicities.
///
/// # Panics
///
/// Panics listing missing and extra elements if the multisets differ.
pub fn assert_same_multiset<T: Debug + Eq + Hash>(actual: &[T], expected: &[T]) {
    let actual_counts = counts(actual);
    let expected_counts = counts(expected);
    if actual_counts == expected_counts {
        return;
    }
    let missing: Vec<_> = expected_counts
        .iter()
        .filter(|(k, n)| actual_counts.get(*k).copied().unwrap_or(0) < **n)
        .map(|(k, _)| *k)
        .collect();
    let extra: Vec<_> = actual_counts
        .iter()
        .filter(|(k, n)| expected_counts.get(*k).copied().unwrap_or(0) < **n)
        .map(|(k, _)| *k)
        .collect();
    panic!(
        "Multiset mismatch ({} actual vs {} expected):\n  Missing or short: {missing:?}\n  Extra or surplus: {extra:?}",
        actual.len(),
        expected.len()
    );
}
