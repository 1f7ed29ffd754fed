//! SourceQueuePublisher (C1): maps and wraps one source's emitted items and offers them
//! to every subscribed queue, with caching/replay and per-queue backpressure.
//!
//! The data mapper is implemented as an endomorphic `T -> T` transform rather than a
//! type-changing `T -> U`: every dispatch scenario maps a value to another value of the
//! same shape (uppercase, filter, identity), so this keeps one type parameter through
//! the whole pipeline. Wrapping
//! (`Wire<T>`) is a genuine type-level split from the raw/mapped item and is applied per
//! `WrapStrategy` at dispatch time.

use std::{
	sync::{
		atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering},
		Arc, Mutex,
	},
	time::{Duration, Instant, SystemTime, UNIX_EPOCH},
};

use crossbeam_queue::ArrayQueue;
use millrace_common::metrics::{IntCounter, IntGauge};
use tracing::warn;

use crate::{
	errors::{EngineError, EngineResult},
	pool::PoolHooks,
	reporting::ErrorReporting,
	traits::{NamedFeedEvent, ReplayRecord, SlowConsumerStrategy, Wire, WrapStrategy},
};

/// Default queue capacity: 1024, a power of two.
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

/// How long `publish`/`dispatch_cached_event_log` spin on a full queue before treating it
/// as a slow consumer (a bounded per-queue spin up to ~10ms).
pub const BACKPRESSURE_BUDGET: Duration = Duration::from_millis(10);

fn now_millis() -> i64 {
	SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_millis() as i64).unwrap_or(0)
}

/// What actually sits in a `NamedQueue` slot.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum QueueItem<T> {
	Live(Wire<T>),
	Replay(ReplayRecord<Wire<T>>),
}

/// A cache-log entry. Pool-aware payloads may be stored as a detached live value (the
/// explicit `cache` call) or, for `publish`'s implicit cache path, as a `Debug` snapshot
/// so implicit caching never holds a live pooled reference open.
#[derive(Clone, Debug)]
pub enum CacheEntryPayload<T> {
	Value(T),
	Snapshot(String),
}

struct CacheEntry<T> {
	sequence_number: u64,
	payload: CacheEntryPayload<T>,
}

/// A single subscriber's bounded queue plus its own cache-replay cursor. Equality by
/// name.
struct NamedQueue<T> {
	name: String,
	queue: Arc<ArrayQueue<QueueItem<T>>>,
	replayed: AtomicUsize,
}

/// Maps/wraps one source's emitted items and offers them to every subscribed queue
/// (C1). Cheaply cloneable; every clone shares the same queue set, cache, and sequence
/// counter.
#[derive(Clone)]
pub struct SourceQueuePublisher<T> {
	inner: Arc<Inner<T>>,
}

struct Inner<T> {
	source_name: String,
	queues: Mutex<Vec<NamedQueue<T>>>,
	sequence_number: AtomicU64,
	wrap_strategy: Mutex<WrapStrategy>,
	slow_consumer_strategy: Mutex<SlowConsumerStrategy>,
	data_mapper: Box<dyn Fn(T) -> Result<Option<T>, String> + Send + Sync>,
	cache_enabled: AtomicBool,
	event_log: Mutex<Vec<CacheEntry<T>>>,
	pool_hooks: Option<PoolHooks<T>>,
	reporting: ErrorReporting,
	published: IntCounter,
	dropped: IntCounter,
}

enum Abandon {
	SlowConsumer,
	Failure(String),
}

impl<T: Clone + Send + Sync + 'static> SourceQueuePublisher<T> {
	pub fn new(
		source_name: impl Into<String>,
		wrap_strategy: WrapStrategy,
		reporting: ErrorReporting,
	) -> Self {
		Self::with_mapper(source_name, wrap_strategy, reporting, |item| Ok(Some(item)))
	}

	pub fn with_mapper(
		source_name: impl Into<String>,
		wrap_strategy: WrapStrategy,
		reporting: ErrorReporting,
		data_mapper: impl Fn(T) -> Result<Option<T>, String> + Send + Sync + 'static,
	) -> Self {
		let source_name = source_name.into();
		SourceQueuePublisher {
			inner: Arc::new(Inner {
				published: IntCounter::new(
					format!("{source_name}_published_total").replace(['-', '/'], "_"),
					"items successfully dispatched to at least one queue",
				)
				.expect("valid counter metadata"),
				dropped: IntCounter::new(
					format!("{source_name}_dropped_total").replace(['-', '/'], "_"),
					"items dropped for a single slow-consumer queue",
				)
				.expect("valid counter metadata"),
				source_name,
				queues: Mutex::new(Vec::new()),
				sequence_number: AtomicU64::new(0),
				wrap_strategy: Mutex::new(wrap_strategy),
				slow_consumer_strategy: Mutex::new(SlowConsumerStrategy::Backoff),
				data_mapper: Box::new(data_mapper),
				cache_enabled: AtomicBool::new(false),
				event_log: Mutex::new(Vec::new()),
				pool_hooks: None,
				reporting,
			}),
		}
	}

	pub fn with_pool_hooks(mut self, hooks: PoolHooks<T>) -> Self {
		Arc::get_mut(&mut self.inner)
			.expect("with_pool_hooks must be called before the publisher is shared")
			.pool_hooks = Some(hooks);
		self
	}

	pub fn source_name(&self) -> &str {
		&self.inner.source_name
	}

	pub fn set_slow_consumer_strategy(&self, strategy: SlowConsumerStrategy) {
		*self.inner.slow_consumer_strategy.lock().unwrap() = strategy;
	}

	pub fn set_wrap_strategy(&self, strategy: WrapStrategy) {
		*self.inner.wrap_strategy.lock().unwrap() = strategy;
	}

	pub fn set_cache_enabled(&self, enabled: bool) {
		self.inner.cache_enabled.store(enabled, Ordering::Release);
	}

	pub fn sequence_number(&self) -> u64 {
		self.inner.sequence_number.load(Ordering::Acquire)
	}

	/// Idempotent by name.
	pub fn add_target_queue(
		&self,
		name: impl Into<String>,
		capacity: usize,
	) -> Arc<ArrayQueue<QueueItem<T>>> {
		let name = name.into();
		let mut queues = self.inner.queues.lock().unwrap();
		if let Some(existing) = queues.iter().find(|q| q.name == name) {
			return existing.queue.clone();
		}
		let queue = Arc::new(ArrayQueue::new(capacity.max(1)));
		queues.push(NamedQueue { name, queue: queue.clone(), replayed: AtomicUsize::new(0) });
		queue
	}

	/// Idempotent; removes all matches. Safe concurrent with `publish`.
	pub fn remove_target_queue_by_name(&self, name: &str) {
		self.inner.queues.lock().unwrap().retain(|q| q.name != name);
	}

	pub fn target_queue_names(&self) -> Vec<String> {
		self.inner.queues.lock().unwrap().iter().map(|q| q.name.clone()).collect()
	}

	/// Thread-safe immutable snapshot of cached entries; empty when caching is disabled.
	pub fn event_log(&self) -> Vec<CacheEntryPayload<T>> {
		self.inner.event_log.lock().unwrap().iter().map(|entry| entry.payload.clone()).collect()
	}

	/// Maps, sequences, optionally caches, and dispatches `item` to every target queue.
	pub fn publish(&self, item: T) -> EngineResult<()> {
		let mapped = match self.map(item) {
			Some(value) => value,
			None => return Ok(()),
		};
		let sequence_number = self.inner.sequence_number.fetch_add(1, Ordering::AcqRel) + 1;
		if self.inner.cache_enabled.load(Ordering::Acquire) {
			self.dispatch_cached_event_log();
			let payload = match &self.inner.pool_hooks {
				Some(hooks) => CacheEntryPayload::Snapshot((hooks.snapshot)(&mapped)),
				None => CacheEntryPayload::Value(mapped.clone()),
			};
			self.inner.event_log.lock().unwrap().push(CacheEntry { sequence_number, payload });
		} else if let Some(hooks) = &self.inner.pool_hooks {
			(hooks.release_reference)(&mapped);
		}
		self.dispatch(sequence_number, mapped)
	}

	/// Like `publish` without dispatch. Pool-aware items are detached so the cache can
	/// hold them indefinitely without starving the pool.
	pub fn cache(&self, item: T) -> EngineResult<()> {
		let mapped = match self.map(item) {
			Some(value) => value,
			None => return Ok(()),
		};
		if let Some(hooks) = &self.inner.pool_hooks {
			(hooks.remove_from_pool)(&mapped);
		}
		let sequence_number = self.inner.sequence_number.fetch_add(1, Ordering::AcqRel) + 1;
		self.inner
			.event_log
			.lock()
			.unwrap()
			.push(CacheEntry { sequence_number, payload: CacheEntryPayload::Value(mapped) });
		Ok(())
	}

	/// Fans an explicit replay record out to every queue verbatim, bypassing the mapper
	/// and wrap strategy.
	pub fn publish_replay(&self, event: T, wall_clock_millis: i64) {
		let wrapped = self.wrap(self.inner.sequence_number.load(Ordering::Acquire), event);
		let record = ReplayRecord { event: wrapped, wall_clock_millis };
		let queues = self.inner.queues.lock().unwrap();
		for queue in queues.iter() {
			let _ = self.offer_raw(&queue.queue, QueueItem::Replay(record.clone()));
		}
	}

	/// Flushes, per target queue, every cache entry that queue hasn't seen yet. Called
	/// at the start of every `publish` (so a queue added mid-stream catches up before the
	/// new item) and explicitly at `startComplete`/on new subscription.
	pub fn dispatch_cached_event_log(&self) {
		let log = self.inner.event_log.lock().unwrap();
		let queues = self.inner.queues.lock().unwrap();
		for queue in queues.iter() {
			let from = queue.replayed.load(Ordering::Acquire);
			if from >= log.len() {
				continue;
			}
			for entry in &log[from..] {
				let CacheEntryPayload::Value(value) = &entry.payload else {
					continue;
				};
				let wire = self.wrap(entry.sequence_number, value.clone());
				let _ = self.offer(queue, QueueItem::Live(wire));
			}
			queue.replayed.store(log.len(), Ordering::Release);
		}
	}

	fn map(&self, item: T) -> Option<T> {
		match (self.inner.data_mapper)(item) {
			Ok(Some(value)) => Some(value),
			Ok(None) => None,
			Err(reason) => {
				let err = EngineError::MapperFailure(self.inner.source_name.clone(), reason);
				self.inner.reporting.report(err.report(&self.inner.source_name));
				None
			},
		}
	}

	fn wrap(&self, sequence_number: u64, value: T) -> Wire<T> {
		if self.inner.wrap_strategy.lock().unwrap().wraps() {
			Wire::Named(NamedFeedEvent {
				name: self.inner.source_name.clone(),
				sequence_number,
				data: value,
			})
		} else {
			Wire::Plain(value)
		}
	}

	fn dispatch(&self, sequence_number: u64, mapped: T) -> EngineResult<()> {
		let wire = self.wrap(sequence_number, mapped.clone());
		let snapshot: Vec<(String, Arc<ArrayQueue<QueueItem<T>>>)> = self
			.inner
			.queues
			.lock()
			.unwrap()
			.iter()
			.map(|q| (q.name.clone(), q.queue.clone()))
			.collect();
		let mut to_disconnect = Vec::new();
		let mut failure = None;
		for (name, queue) in &snapshot {
			match self.offer_raw(queue, QueueItem::Live(wire.clone())) {
				Ok(()) => {
					self.inner.published.inc();
					if let Some(hooks) = &self.inner.pool_hooks {
						(hooks.acquire_reference)(&mapped);
					}
				},
				Err(Abandon::SlowConsumer) => {
					self.inner.dropped.inc();
					warn!(source = %self.inner.source_name, queue = %name, "slow-consumer-abandon");
					self.inner.reporting.report(
						EngineError::SlowConsumerAbandon { source: self.inner.source_name.clone(), queue: name.clone() }
							.report(&self.inner.source_name),
					);
					if matches!(
						*self.inner.slow_consumer_strategy.lock().unwrap(),
						SlowConsumerStrategy::Disconnect
					) {
						to_disconnect.push(name.clone());
					}
				},
				Err(Abandon::Failure(reason)) => {
					if let Some(hooks) = &self.inner.pool_hooks {
						(hooks.return_to_pool)(&mapped);
					}
					let err = EngineError::QueuePublishFailure {
						source: self.inner.source_name.clone(),
						queue: name.clone(),
						reason,
					};
					self.inner.reporting.report(err.report(&self.inner.source_name));
					failure = Some(err);
					break;
				},
			}
		}
		for name in to_disconnect {
			self.remove_target_queue_by_name(&name);
		}
		match failure {
			Some(err) => Err(err),
			None => Ok(()),
		}
	}

	/// Bounded spin of up to [`BACKPRESSURE_BUDGET`]; on timeout, `Backoff`/`Disconnect`
	/// abandon just this queue, while `Exit` escalates to a call-ending failure.
	fn offer(&self, queue: &NamedQueue<T>, item: QueueItem<T>) -> Result<(), Abandon> {
		self.offer_raw(&queue.queue, item)
	}

	/// Bounded spin of up to [`BACKPRESSURE_BUDGET`] directly against a queue handle, used
	/// by `dispatch` once it has already snapshotted the queue list out of the lock.
	fn offer_raw(&self, queue: &ArrayQueue<QueueItem<T>>, item: QueueItem<T>) -> Result<(), Abandon> {
		let mut item = item;
		let start = Instant::now();
		loop {
			match queue.push(item) {
				Ok(()) => return Ok(()),
				Err(rejected) => item = rejected,
			}
			if start.elapsed() >= BACKPRESSURE_BUDGET {
				return Err(match *self.inner.slow_consumer_strategy.lock().unwrap() {
					SlowConsumerStrategy::Exit => {
						Abandon::Failure("slow consumer budget exceeded under exit policy".to_string())
					},
					SlowConsumerStrategy::Backoff | SlowConsumerStrategy::Disconnect => Abandon::SlowConsumer,
				});
			}
			std::hint::spin_loop();
		}
	}
}

/// Gauge tracking a single queue's current depth; used by integrators that want queue
/// occupancy exposed without reaching into `ArrayQueue` internals.
pub fn queue_depth_gauge(name: &str) -> IntGauge {
	IntGauge::new(format!("{name}_queue_depth").replace(['-', '/'], "_"), "items currently queued")
		.expect("valid gauge metadata")
}
