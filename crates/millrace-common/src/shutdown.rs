//! A hierarchical, idempotent kill switch.
//!
//! `LifecycleOrchestrator` (C7) holds the root and hands a child to every `AgentRunner`
//! (C6) it starts; killing the root kills every descendant. Scheduler (C8) actions that
//! want to emulate timer cancellation hold a child too and check `is_dead()` before
//! acting, since there is no separate per-timer cancel API.

use std::sync::{
	atomic::{AtomicBool, Ordering},
	Arc, Mutex, Weak,
};

use tracing::debug;

#[derive(Clone, Default)]
pub struct ShutdownSignal {
	inner: Arc<Inner>,
}

struct Inner {
	alive: AtomicBool,
	children: Mutex<Vec<Weak<Inner>>>,
}

impl Default for Inner {
	fn default() -> Self {
		Self { alive: AtomicBool::new(true), children: Mutex::default() }
	}
}

fn garbage_collect(children: &mut Vec<Weak<Inner>>) {
	let mut i = 0;
	while i < children.len() {
		if Weak::strong_count(&children[i]) == 0 {
			children.swap_remove(i);
		} else {
			i += 1;
		}
	}
}

impl ShutdownSignal {
	pub fn is_alive(&self) -> bool {
		self.inner.alive.load(Ordering::Relaxed)
	}

	pub fn is_dead(&self) -> bool {
		!self.is_alive()
	}

	pub fn kill(&self) {
		self.inner.kill();
	}

	/// Creates a child signal. If the parent is already dead, the child is born dead.
	pub fn child(&self) -> ShutdownSignal {
		let mut lock = self.inner.children.lock().unwrap();
		let child_inner = Inner { alive: AtomicBool::new(self.is_alive()), ..Default::default() };
		garbage_collect(&mut lock);
		let child_inner_arc = Arc::new(child_inner);
		lock.push(Arc::downgrade(&child_inner_arc));
		ShutdownSignal { inner: child_inner_arc }
	}
}

impl Inner {
	fn kill(&self) {
		debug!("shutdown-signal-activated");
		self.alive.store(false, Ordering::Relaxed);
		let mut lock = self.children.lock().unwrap();
		for weak in lock.drain(..) {
			if let Some(inner) = weak.upgrade() {
				inner.kill();
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use super::ShutdownSignal;

	#[test]
	fn starts_alive_and_kills_idempotently() {
		let sig = ShutdownSignal::default();
		assert!(sig.is_alive());
		sig.kill();
		assert!(sig.is_dead());
		sig.kill();
		assert!(sig.is_dead());
	}

	#[test]
	fn killing_parent_kills_children() {
		let parent = ShutdownSignal::default();
		let child_a = parent.child();
		let child_b = parent.child();
		assert!(child_a.is_alive());
		assert!(child_b.is_alive());
		parent.kill();
		assert!(child_a.is_dead());
		assert!(child_b.is_dead());
	}

	#[test]
	fn killing_grandchildren_cascades() {
		let parent = ShutdownSignal::default();
		let child = parent.child();
		let grandchild = child.child();
		parent.kill();
		assert!(child.is_dead());
		assert!(grandchild.is_dead());
	}

	#[test]
	fn killing_a_child_does_not_kill_the_parent() {
		let parent = ShutdownSignal::default();
		let child = parent.child();
		child.kill();
		assert!(parent.is_alive());
		assert!(child.is_dead());
	}
}
