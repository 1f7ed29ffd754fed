//! Exponential backoff with jitter, used by `QueueToInvocationAgent` (C3) to retry a
//! failing handler callback before dropping the item, and available to any other
//! component that needs the same shape.
//!
//! Synchronous (this engine has no async runtime), with a configurable multiplier, and a
//! policy shape of `{maxAttempts, initialBackoffMs, maxBackoffMs, multiplier, retryOn}`.

use std::{fmt::Debug, thread, time::Duration};

use rand::Rng;
use tracing::{debug, warn};

/// Default retry policy: 3 attempts, 5-100ms backoff, doubling each attempt.
const DEFAULT_MAX_ATTEMPTS: usize = 3;
const DEFAULT_INITIAL_BACKOFF: Duration = Duration::from_millis(5);
const DEFAULT_MAX_BACKOFF: Duration = Duration::from_millis(100);
const DEFAULT_MULTIPLIER: f64 = 2.0;

pub trait Retryable {
	fn is_retryable(&self) -> bool {
		false
	}
}

#[derive(Debug, Eq, PartialEq)]
pub enum Retry<E> {
	Permanent(E),
	Transient(E),
}

impl<E> Retry<E> {
	pub fn into_inner(self) -> E {
		match self {
			Self::Transient(error) => error,
			Self::Permanent(error) => error,
		}
	}
}

impl<E> Retryable for Retry<E> {
	fn is_retryable(&self) -> bool {
		match self {
			Retry::Permanent(_) => false,
			Retry::Transient(_) => true,
		}
	}
}

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
	pub initial_backoff: Duration,
	pub max_backoff: Duration,
	pub max_attempts: usize,
	pub multiplier: f64,
}

impl Default for RetryPolicy {
	fn default() -> Self {
		Self {
			initial_backoff: DEFAULT_INITIAL_BACKOFF,
			max_backoff: DEFAULT_MAX_BACKOFF,
			max_attempts: DEFAULT_MAX_ATTEMPTS,
			multiplier: DEFAULT_MULTIPLIER,
		}
	}
}

impl RetryPolicy {
	/// Computes the delay before the next attempt (full jitter, half-delay centered).
	///
	/// `num_attempts` is the number of attempts already performed; it must be nonzero.
	pub fn compute_delay(&self, num_attempts: usize) -> Duration {
		assert!(num_attempts > 0, "num_attempts should be greater than zero");
		let delay_ms = self.initial_backoff.as_millis() as f64
			* self.multiplier.powi(num_attempts as i32 - 1);
		let ceil_delay_ms = delay_ms.min(self.max_backoff.as_millis() as f64) as u64;
		let half_delay_ms = ceil_delay_ms / 2;
		let jitter_range = 0..half_delay_ms + 1;
		let jittered_delay_ms = half_delay_ms + rand::thread_rng().gen_range(jitter_range);
		Duration::from_millis(jittered_delay_ms)
	}

	#[cfg(any(test, feature = "testsuite"))]
	pub fn for_test() -> Self {
		Self {
			initial_backoff: Duration::from_micros(1),
			max_backoff: Duration::from_micros(2),
			..Default::default()
		}
	}
}

/// Calls `f` up to `policy.max_attempts` times, sleeping (blocking the calling thread,
/// which here is an agent's own duty-cycle thread, never a handler callback) between
/// attempts, stopping early on a non-retryable error.
pub fn retry<U, E>(policy: &RetryPolicy, mut f: impl FnMut() -> Result<U, E>) -> Result<U, E>
where
	E: Retryable + Debug,
{
	let mut num_attempts = 0;
	loop {
		let error = match f() {
			Ok(value) => return Ok(value),
			Err(error) => error,
		};
		if !error.is_retryable() {
			return Err(error);
		}
		num_attempts += 1;
		if num_attempts >= policy.max_attempts {
			warn!(num_attempts, "retry attempts exhausted");
			return Err(error);
		}
		let delay = policy.compute_delay(num_attempts);
		debug!(num_attempts, delay_micros = %delay.as_micros(), ?error, "retrying after backoff");
		thread::sleep(delay);
	}
}
