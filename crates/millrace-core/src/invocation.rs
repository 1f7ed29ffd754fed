//! InvocationStrategy SPI (C4) and the default implementation.
//!
//! A strategy maps one dequeued item to zero or more handler callbacks. The handler set
//! is guarded by a `Mutex<Vec<_>>` rather than a true lock-free copy-on-write list;
//! registration is rare relative to dispatch, so a short critical section around a
//! `Vec` gives the same externally-observed behavior (snapshot-consistent reads, safe
//! concurrent mutation) without a bespoke lock-free structure.

use std::sync::Mutex;

use crate::context;

/// Opaque handler callback. `on_event` is the universal entry point; a custom strategy
/// that wants typed dispatch downcasts `as_any`/`as_any_mut` to a capability trait and
/// falls back to `on_event` when the handler doesn't implement it.
pub trait Handler<T>: Send {
	fn id(&self) -> &str;

	fn on_event(&mut self, item: &T);

	/// Invoked by the strategy before a replay dispatch to give the handler a
	/// deterministic synthetic clock for replay dispatch.
	fn set_clock(&mut self, _wall_clock_millis: i64) {}

	fn as_any(&self) -> &dyn std::any::Any;
	fn as_any_mut(&mut self) -> &mut dyn std::any::Any;

	fn init(&mut self) {}
	fn start(&mut self) {}
	fn start_complete(&mut self) {}
	fn stop(&mut self) {}
	fn tear_down(&mut self) {}
}

struct HandlerSlot<T> {
	handler: Box<dyn Handler<T>>,
}

/// SPI every invocation strategy implements. `process_event`/`process_replay` are
/// provided in terms of the smaller per-handler hooks so a custom strategy only has to
/// override `dispatch_event` and `is_valid_target` to change fan-out behavior.
pub trait InvocationStrategy<T>: Send {
	fn process_event(&mut self, item: &T) {
		for handler_id in self.handler_ids() {
			let _guard = context::enter(&handler_id);
			self.dispatch_event(item, &handler_id);
		}
	}

	fn process_replay(&mut self, item: &T, wall_clock_millis: i64) {
		for handler_id in self.handler_ids() {
			self.set_handler_clock(&handler_id, wall_clock_millis);
		}
		self.process_event(item);
	}

	/// Concrete strategies override this to pick the actual callback; the default
	/// forwards to `Handler::on_event`.
	fn dispatch_event(&mut self, item: &T, handler_id: &str);

	fn set_handler_clock(&mut self, handler_id: &str, wall_clock_millis: i64);

	fn is_valid_target(&self, handler: &dyn Handler<T>) -> bool {
		let _ = handler;
		true
	}

	/// Returns `true` if the handler was admitted.
	fn register_processor(&mut self, handler: Box<dyn Handler<T>>) -> bool;

	fn deregister_processor(&mut self, handler_id: &str);

	fn listener_count(&self) -> usize;

	fn handler_ids(&self) -> Vec<String>;
}

/// Lets a type-erased `Box<dyn InvocationStrategy<T>>` be used anywhere a concrete
/// strategy is expected (`EventFlowManager`'s factories return one without knowing the
/// concrete type). Only the non-default methods are forwarded; the default
/// `process_event`/`process_replay`/`is_valid_target` bodies still run against this impl,
/// which is fine since they only ever call back into the forwarded methods.
impl<T> InvocationStrategy<T> for Box<dyn InvocationStrategy<T> + Send> {
	fn dispatch_event(&mut self, item: &T, handler_id: &str) {
		(**self).dispatch_event(item, handler_id);
	}

	fn set_handler_clock(&mut self, handler_id: &str, wall_clock_millis: i64) {
		(**self).set_handler_clock(handler_id, wall_clock_millis);
	}

	fn register_processor(&mut self, handler: Box<dyn Handler<T>>) -> bool {
		(**self).register_processor(handler)
	}

	fn deregister_processor(&mut self, handler_id: &str) {
		(**self).deregister_processor(handler_id);
	}

	fn listener_count(&self) -> usize {
		(**self).listener_count()
	}

	fn handler_ids(&self) -> Vec<String> {
		(**self).handler_ids()
	}
}

/// The default strategy: registration-order fan-out, `on_event` for every handler.
pub struct DefaultInvocationStrategy<T> {
	handlers: Mutex<Vec<HandlerSlot<T>>>,
}

impl<T> Default for DefaultInvocationStrategy<T> {
	fn default() -> Self {
		DefaultInvocationStrategy { handlers: Mutex::new(Vec::new()) }
	}
}

impl<T: Send> InvocationStrategy<T> for DefaultInvocationStrategy<T> {
	fn dispatch_event(&mut self, item: &T, handler_id: &str) {
		let mut handlers = self.handlers.lock().unwrap();
		if let Some(slot) = handlers.iter_mut().find(|slot| slot.handler.id() == handler_id) {
			slot.handler.on_event(item);
		}
	}

	fn set_handler_clock(&mut self, handler_id: &str, wall_clock_millis: i64) {
		let mut handlers = self.handlers.lock().unwrap();
		if let Some(slot) = handlers.iter_mut().find(|slot| slot.handler.id() == handler_id) {
			slot.handler.set_clock(wall_clock_millis);
		}
	}

	fn register_processor(&mut self, handler: Box<dyn Handler<T>>) -> bool {
		if !self.is_valid_target(handler.as_ref()) {
			return false;
		}
		self.handlers.lock().unwrap().push(HandlerSlot { handler });
		true
	}

	fn deregister_processor(&mut self, handler_id: &str) {
		self.handlers.lock().unwrap().retain(|slot| slot.handler.id() != handler_id);
	}

	fn listener_count(&self) -> usize {
		self.handlers.lock().unwrap().len()
	}

	fn handler_ids(&self) -> Vec<String> {
		self.handlers.lock().unwrap().iter().map(|slot| slot.handler.id().to_string()).collect()
	}
}
