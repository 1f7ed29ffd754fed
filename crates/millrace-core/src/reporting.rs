//! ErrorReporting (C12): a central, fan-out error channel.
//!
//! Every component that detects a failure constructs an [`ErrorEvent`] and reports it
//! here rather than logging directly; a default sink still logs through `tracing` so a
//! plain subscriber sees the same information a dedicated reporter would (see
//! `millrace_common::error`). Sinks are arbitrary closures so an embedding application
//! can also forward events to its own alerting.

use std::{
	collections::VecDeque,
	sync::{Arc, Mutex},
};

use millrace_common::{
	metrics::IntCounter,
	ErrorEvent, Severity,
};
use tracing::{error, warn};

pub trait ErrorSink: Send + Sync {
	fn report(&self, event: &ErrorEvent);
}

/// Logs through `tracing` at a level matching the event's severity.
pub struct TracingSink;

impl ErrorSink for TracingSink {
	fn report(&self, event: &ErrorEvent) {
		match event.severity {
			Severity::Warning => warn!(source = %event.source_id, cause = ?event.cause, "{}", event.message),
			Severity::Error | Severity::Critical => {
				error!(source = %event.source_id, severity = %event.severity, cause = ?event.cause, "{}", event.message)
			},
		}
	}
}

struct Inner {
	sinks: Mutex<Vec<Arc<dyn ErrorSink>>>,
	recent: Mutex<VecDeque<ErrorEvent>>,
	recent_capacity: usize,
	warning_count: IntCounter,
	error_count: IntCounter,
	critical_count: IntCounter,
}

fn severity_counters() -> (IntCounter, IntCounter, IntCounter) {
	(
		IntCounter::new("millrace_errors_warning_total", "errors reported at WARNING severity")
			.expect("valid counter metadata"),
		IntCounter::new("millrace_errors_error_total", "errors reported at ERROR severity")
			.expect("valid counter metadata"),
		IntCounter::new("millrace_errors_critical_total", "errors reported at CRITICAL severity")
			.expect("valid counter metadata"),
	)
}

/// Cloneable handle to the shared error channel. `LifecycleOrchestrator` constructs one
/// and every component that needs to report failures receives a clone.
#[derive(Clone)]
pub struct ErrorReporting {
	inner: Arc<Inner>,
}

impl Default for ErrorReporting {
	fn default() -> Self {
		let reporting = ErrorReporting { inner: Arc::new(Inner::new(256)) };
		reporting.add_sink(Arc::new(TracingSink));
		reporting
	}
}

impl Inner {
	fn new(recent_capacity: usize) -> Self {
		let (warning_count, error_count, critical_count) = severity_counters();
		Inner {
			sinks: Mutex::new(Vec::new()),
			recent: Mutex::new(VecDeque::new()),
			recent_capacity,
			warning_count,
			error_count,
			critical_count,
		}
	}
}

impl ErrorReporting {
	pub fn with_recent_capacity(capacity: usize) -> Self {
		ErrorReporting { inner: Arc::new(Inner::new(capacity)) }
	}

	pub fn add_sink(&self, sink: Arc<dyn ErrorSink>) {
		self.inner.sinks.lock().unwrap().push(sink);
	}

	/// Per-severity counts of every error reported through this channel since
	/// construction, in `(warning, error, critical)` order.
	pub fn severity_counts(&self) -> (u64, u64, u64) {
		(
			self.inner.warning_count.get() as u64,
			self.inner.error_count.get() as u64,
			self.inner.critical_count.get() as u64,
		)
	}

	pub fn report(&self, event: ErrorEvent) {
		match event.severity {
			Severity::Warning => self.inner.warning_count.inc(),
			Severity::Error => self.inner.error_count.inc(),
			Severity::Critical => self.inner.critical_count.inc(),
		}
		for sink in self.inner.sinks.lock().unwrap().iter() {
			sink.report(&event);
		}
		let mut recent = self.inner.recent.lock().unwrap();
		recent.push_back(event);
		while recent.len() > self.inner.recent_capacity {
			recent.pop_front();
		}
	}

	/// Returns the most recent `limit` events, newest last.
	pub fn recent(&self, limit: usize) -> Vec<ErrorEvent> {
		let recent = self.inner.recent.lock().unwrap();
		recent.iter().rev().take(limit).rev().cloned().collect()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	struct CountingSink(Arc<std::sync::atomic::AtomicUsize>);

	impl ErrorSink for CountingSink {
		fn report(&self, _event: &ErrorEvent) {
			self.0.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
		}
	}

	#[test]
	fn severity_counts_track_each_severity_independently() {
		let reporting = ErrorReporting::with_recent_capacity(16);
		reporting.report(ErrorEvent::new("src", "w", Severity::Warning));
		reporting.report(ErrorEvent::new("src", "e1", Severity::Error));
		reporting.report(ErrorEvent::new("src", "e2", Severity::Error));
		reporting.report(ErrorEvent::new("src", "c", Severity::Critical));
		assert_eq!(reporting.severity_counts(), (1, 2, 1));
	}

	#[test]
	fn fans_out_to_every_sink() {
		let reporting = ErrorReporting::with_recent_capacity(16);
		let count = Arc::new(std::sync::atomic::AtomicUsize::new(0));
		reporting.add_sink(Arc::new(CountingSink(count.clone())));
		reporting.add_sink(Arc::new(CountingSink(count.clone())));
		reporting.report(ErrorEvent::new("src", "boom", Severity::Warning));
		assert_eq!(count.load(std::sync::atomic::Ordering::SeqCst), 2);
	}

	#[test]
	fn recent_respects_capacity_and_order() {
		let reporting = ErrorReporting::with_recent_capacity(2);
		reporting.report(ErrorEvent::new("src", "first", Severity::Warning));
		reporting.report(ErrorEvent::new("src", "second", Severity::Warning));
		reporting.report(ErrorEvent::new("src", "third", Severity::Warning));
		let recent = reporting.recent(10);
		assert_eq!(recent.len(), 2);
		assert_eq!(recent[0].message, "second");
		assert_eq!(recent[1].message, "third");
	}
}
