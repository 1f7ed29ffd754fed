//! DeadlineWheelScheduler (C8): one-shot timers driven by a dedicated agent thread.
//!
//! There is no cancel API: to emulate cancellation, callers close over an
//! external flag (often a [`millrace_common::ShutdownSignal`]) and check it inside the
//! action before doing anything. Actions run on the scheduler's own agent thread and
//! must be non-blocking, the same constraint `doWork` methods are under everywhere else
//! in the engine; an action that needs to touch handler state should instead enqueue an
//! event into that handler's queue (via `EventFlowManager`/`SourceQueuePublisher`) so the
//! actual work happens back on the handler's own thread.

use std::{
	cmp::Reverse,
	collections::BinaryHeap,
	sync::{
		atomic::{AtomicU64, Ordering},
		Mutex,
	},
	time::{SystemTime, UNIX_EPOCH},
};

use tracing::error;

use crate::{agent::Agent, errors::EngineError, reporting::ErrorReporting};

pub type TimerId = u64;
type Action = Box<dyn FnOnce() + Send>;

struct Entry {
	expiry_millis: u64,
	id: TimerId,
	action: Action,
}

impl PartialEq for Entry {
	fn eq(&self, other: &Self) -> bool {
		self.expiry_millis == other.expiry_millis && self.id == other.id
	}
}
impl Eq for Entry {}
impl PartialOrd for Entry {
	fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
		Some(self.cmp(other))
	}
}
impl Ord for Entry {
	fn cmp(&self, other: &Self) -> std::cmp::Ordering {
		(self.expiry_millis, self.id).cmp(&(other.expiry_millis, other.id))
	}
}

/// Maximum number of due timers fired per `do_work` call, mirroring the bounded-batch
/// drain every other agent in the engine performs.
const MAX_FIRED_PER_CYCLE: usize = 64;

pub fn milli_time() -> u64 {
	SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_millis() as u64).unwrap_or(0)
}

pub fn micro_time() -> u64 {
	SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_micros() as u64).unwrap_or(0)
}

pub fn nano_time() -> u64 {
	SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_nanos() as u64).unwrap_or(0)
}

pub struct DeadlineWheelScheduler {
	wheel: Mutex<BinaryHeap<Reverse<Entry>>>,
	next_id: AtomicU64,
	reporting: ErrorReporting,
}

impl DeadlineWheelScheduler {
	pub fn new(reporting: ErrorReporting) -> Self {
		DeadlineWheelScheduler { wheel: Mutex::new(BinaryHeap::new()), next_id: AtomicU64::new(1), reporting }
	}

	pub fn schedule_after_delay(&self, delay_millis: u64, action: impl FnOnce() + Send + 'static) -> TimerId {
		self.schedule_at_time(milli_time() + delay_millis, action)
	}

	pub fn schedule_at_time(&self, epoch_millis: u64, action: impl FnOnce() + Send + 'static) -> TimerId {
		let id = self.next_id.fetch_add(1, Ordering::Relaxed);
		self.wheel
			.lock()
			.unwrap()
			.push(Reverse(Entry { expiry_millis: epoch_millis, id, action: Box::new(action) }));
		id
	}

	pub fn pending_count(&self) -> usize {
		self.wheel.lock().unwrap().len()
	}

	fn fire_due(&self, now: u64) -> usize {
		let mut fired = 0;
		while fired < MAX_FIRED_PER_CYCLE {
			let due = {
				let mut wheel = self.wheel.lock().unwrap();
				match wheel.peek() {
					Some(Reverse(entry)) if entry.expiry_millis <= now => wheel.pop().map(|Reverse(entry)| entry),
					_ => None,
				}
			};
			let Some(entry) = due else {
				break;
			};
			let id = entry.id;
			if let Err(panic) = std::panic::catch_unwind(std::panic::AssertUnwindSafe(entry.action)) {
				let reason = panic
					.downcast_ref::<&str>()
					.map(|s| s.to_string())
					.or_else(|| panic.downcast_ref::<String>().cloned())
					.unwrap_or_else(|| "scheduled action panicked".to_string());
				error!(timer_id = id, reason = %reason, "scheduler-action-failed");
				self.reporting.report(EngineError::SchedulerActionFailure(id.to_string(), reason).report("scheduler"));
			}
			fired += 1;
		}
		fired
	}
}

impl Agent for DeadlineWheelScheduler {
	fn do_work(&mut self) -> usize {
		self.fire_due(milli_time())
	}

	fn role_name(&self) -> &str {
		"scheduler"
	}
}

#[cfg(test)]
mod tests {
	use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};

	use super::*;

	#[test]
	fn fires_due_timers_and_leaves_future_ones_pending() {
		let scheduler = DeadlineWheelScheduler::new(ErrorReporting::default());
		let fired = Arc::new(AtomicUsize::new(0));
		let fired_clone = fired.clone();
		scheduler.schedule_at_time(0, move || {
			fired_clone.fetch_add(1, Ordering::SeqCst);
		});
		scheduler.schedule_at_time(milli_time() + 60_000, || {});
		let mut scheduler = scheduler;
		let count = Agent::do_work(&mut scheduler);
		assert_eq!(count, 1);
		assert_eq!(fired.load(Ordering::SeqCst), 1);
		assert_eq!(scheduler.pending_count(), 1);
	}

	#[test]
	fn a_panicking_action_is_reported_and_scheduler_continues() {
		let scheduler = DeadlineWheelScheduler::new(ErrorReporting::default());
		scheduler.schedule_at_time(0, || panic!("boom"));
		let ran_after = Arc::new(AtomicUsize::new(0));
		let ran_after_clone = ran_after.clone();
		scheduler.schedule_at_time(0, move || {
			ran_after_clone.fetch_add(1, Ordering::SeqCst);
		});
		let mut scheduler = scheduler;
		let count = Agent::do_work(&mut scheduler);
		assert_eq!(count, 2);
		assert_eq!(ran_after.load(Ordering::SeqCst), 1);
	}
}
