//! QueueToInvocationAgent (C3): drains one subscriber's queue on its own agent thread and
//! forwards each item through an `InvocationStrategy`, retrying a panicking callback
//! before giving up and reporting it.
//!
//! Each `(source, subscriber)` pair gets its own agent instance and its own queue handle
//! from `SourceQueuePublisher::add_target_queue`; `EventFlowManager` (C2) is what actually
//! owns the mapping from names to agents.

use std::sync::Arc;

use crossbeam_queue::ArrayQueue;
use millrace_common::{
	metrics::IntCounter,
	retry::{retry, Retry, RetryPolicy},
};

use crate::{
	agent::Agent,
	errors::EngineError,
	invocation::{Handler, InvocationStrategy},
	publisher::QueueItem,
	reporting::ErrorReporting,
	traits::Wire,
};

/// Max items drained per `do_work` call, the same bounded-batch discipline every other
/// agent's duty cycle in the engine follows.
const MAX_DRAIN_PER_CYCLE: usize = 256;

fn unwrap_wire<T>(wire: Wire<T>) -> T {
	match wire {
		Wire::Plain(value) => value,
		Wire::Named(event) => event.data,
	}
}

/// Hosts one `InvocationStrategy` and drains one queue. `role_name` is typically
/// `"{source}/{subscriber}"`, matching the queue's own name in `SourceQueuePublisher`.
pub struct QueueToInvocationAgent<T, S> {
	role_name: String,
	source_name: String,
	queue: Arc<ArrayQueue<QueueItem<T>>>,
	strategy: S,
	retry_policy: RetryPolicy,
	reporting: ErrorReporting,
	retried: IntCounter,
	dropped: IntCounter,
}

impl<T, S> QueueToInvocationAgent<T, S>
where
	T: Clone + Send + 'static,
	S: InvocationStrategy<T> + Send,
{
	pub fn new(
		role_name: impl Into<String>,
		source_name: impl Into<String>,
		queue: Arc<ArrayQueue<QueueItem<T>>>,
		strategy: S,
		reporting: ErrorReporting,
	) -> Self {
		let role_name = role_name.into();
		let metric_name = role_name.replace(['-', '/'], "_");
		QueueToInvocationAgent {
			source_name: source_name.into(),
			queue,
			strategy,
			retry_policy: RetryPolicy::default(),
			reporting,
			retried: IntCounter::new(format!("{metric_name}_retried_total"), "handler callback retry attempts")
				.expect("valid counter metadata"),
			dropped: IntCounter::new(format!("{metric_name}_dropped_total"), "items dropped after retries exhausted")
				.expect("valid counter metadata"),
			role_name,
		}
	}

	pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
		self.retry_policy = policy;
		self
	}

	pub fn listener_count(&self) -> usize {
		self.strategy.listener_count()
	}

	/// `(retried, dropped)` counts since construction: every retry attempt beyond the
	/// first, and every item whose retries were exhausted and was consequently dropped.
	pub fn retry_counts(&self) -> (u64, u64) {
		(self.retried.get() as u64, self.dropped.get() as u64)
	}

	pub fn register_processor(&mut self, handler: Box<dyn Handler<T>>) -> bool {
		self.strategy.register_processor(handler)
	}

	pub fn deregister_processor(&mut self, handler_id: &str) {
		self.strategy.deregister_processor(handler_id);
	}

	pub fn queue_depth(&self) -> usize {
		self.queue.len()
	}

	fn invoke_with_retry(&mut self, item: QueueItem<T>) {
		let strategy = &mut self.strategy;
		let retried = &self.retried;
		let mut first_attempt = true;
		let outcome = retry(&self.retry_policy, || {
			if first_attempt {
				first_attempt = false;
			} else {
				retried.inc();
			}
			let item = item.clone();
			std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| match item {
				QueueItem::Live(wire) => strategy.process_event(&unwrap_wire(wire)),
				QueueItem::Replay(record) => {
					strategy.process_replay(&unwrap_wire(record.event), record.wall_clock_millis)
				},
			}))
			.map_err(|payload| {
				let reason = payload
					.downcast_ref::<&str>()
					.map(|s| s.to_string())
					.or_else(|| payload.downcast_ref::<String>().cloned())
					.unwrap_or_else(|| "handler panicked with a non-string payload".to_string());
				Retry::Transient(reason)
			})
		});
		if let Err(retry_error) = outcome {
			self.dropped.inc();
			let reason = retry_error.into_inner();
			let err = EngineError::HandlerInvocationFailure(self.role_name.clone(), reason);
			self.reporting.report(err.report(&self.source_name));
		}
	}
}

impl<T, S> Agent for QueueToInvocationAgent<T, S>
where
	T: Clone + Send + 'static,
	S: InvocationStrategy<T> + Send,
{
	fn do_work(&mut self) -> usize {
		let mut drained = 0;
		while drained < MAX_DRAIN_PER_CYCLE {
			let Some(item) = self.queue.pop() else { break };
			self.invoke_with_retry(item);
			drained += 1;
		}
		drained
	}

	fn role_name(&self) -> &str {
		&self.role_name
	}
}
