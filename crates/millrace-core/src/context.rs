//! CurrentProcessorContext (C11): a thread-local holder of the handler currently being
//! dispatched, set/cleared by the invocation strategy around every callback so that
//! re-entrant publish APIs ("enqueue a new event cycle targeted at the handler that's
//! running right now") know where to send the item.

use std::cell::RefCell;

thread_local! {
	static CURRENT_HANDLER: RefCell<Option<String>> = const { RefCell::new(None) };
}

/// RAII guard restoring the previous handler id on drop, including on unwind, so a
/// panicking callback never leaves a stale handler id behind.
#[must_use]
pub struct ProcessorGuard {
	previous: Option<String>,
}

impl Drop for ProcessorGuard {
	fn drop(&mut self) {
		CURRENT_HANDLER.with(|cell| *cell.borrow_mut() = self.previous.take());
	}
}

/// Marks `handler_id` as the currently dispatching handler on this thread until the
/// returned guard drops.
pub fn enter(handler_id: &str) -> ProcessorGuard {
	let previous = CURRENT_HANDLER.with(|cell| cell.borrow_mut().replace(handler_id.to_string()));
	ProcessorGuard { previous }
}

/// The handler currently dispatching on this thread, if any.
pub fn current_handler() -> Option<String> {
	CURRENT_HANDLER.with(|cell| cell.borrow().clone())
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn enter_sets_and_drop_restores() {
		assert_eq!(current_handler(), None);
		{
			let _guard = enter("h1");
			assert_eq!(current_handler().as_deref(), Some("h1"));
			{
				let _nested = enter("h2");
				assert_eq!(current_handler().as_deref(), Some("h2"));
			}
			assert_eq!(current_handler().as_deref(), Some("h1"));
		}
		assert_eq!(current_handler(), None);
	}

	#[test]
	fn guard_restores_even_when_dropped_during_unwind() {
		let result = std::panic::catch_unwind(|| {
			let _guard = enter("panicking-handler");
			panic!("boom");
		});
		assert!(result.is_err());
		assert_eq!(current_handler(), None);
	}
}
