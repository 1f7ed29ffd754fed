//! A custom `InvocationStrategy` that only admits handlers implementing a capability,
//! downcasting to it for typed dispatch and falling back to `on_event` otherwise, the
//! "dynamic dispatch to typed callbacks" re-architecture described for handlers that used
//! to rely on reflection to pick a typed `onX` method.

use std::any::Any;
use std::sync::{Arc, Mutex};

use millrace_core::{
	Agent, Dependencies, ErrorReporting, EventFlowManager, Handler, InvocationStrategy, Source, SourceKey,
	SourceQueuePublisher, SubscriptionKey, WrapStrategy,
};

#[derive(Clone, Debug, PartialEq, Eq)]
enum Item {
	Str(String),
	Num(i32),
}

/// The capability a subset of handlers implement: a typed `onString` entry point.
trait OnString {
	fn on_string(&mut self, value: String);
}

struct UppercaseHandler {
	id: String,
	received: Arc<Mutex<Vec<String>>>,
}

impl Handler<Item> for UppercaseHandler {
	fn id(&self) -> &str {
		&self.id
	}

	fn on_event(&mut self, _item: &Item) {}

	fn as_any(&self) -> &dyn Any {
		self
	}

	fn as_any_mut(&mut self) -> &mut dyn Any {
		self
	}
}

impl OnString for UppercaseHandler {
	fn on_string(&mut self, value: String) {
		self.received.lock().unwrap().push(value);
	}
}

struct PlainHandler {
	id: String,
	received: Arc<Mutex<Vec<Item>>>,
}

impl Handler<Item> for PlainHandler {
	fn id(&self) -> &str {
		&self.id
	}

	fn on_event(&mut self, item: &Item) {
		self.received.lock().unwrap().push(item.clone());
	}

	fn as_any(&self) -> &dyn Any {
		self
	}

	fn as_any_mut(&mut self) -> &mut dyn Any {
		self
	}
}

/// Admits only handlers downcastable to `UppercaseHandler`; on a `Str` item calls
/// `on_string(uppercase(item))`, otherwise forwards through `on_event`.
#[derive(Default)]
struct StringCapabilityStrategy {
	handlers: Vec<Box<dyn Handler<Item>>>,
}

impl InvocationStrategy<Item> for StringCapabilityStrategy {
	fn dispatch_event(&mut self, item: &Item, handler_id: &str) {
		let Some(handler) = self.handlers.iter_mut().find(|h| h.id() == handler_id) else {
			return;
		};
		match item {
			Item::Str(value) => {
				let uppercased = value.to_uppercase();
				if let Some(capable) = handler.as_any_mut().downcast_mut::<UppercaseHandler>() {
					capable.on_string(uppercased);
				} else {
					handler.on_event(item);
				}
			}
			Item::Num(_) => handler.on_event(item),
		}
	}

	fn set_handler_clock(&mut self, handler_id: &str, wall_clock_millis: i64) {
		if let Some(handler) = self.handlers.iter_mut().find(|h| h.id() == handler_id) {
			handler.set_clock(wall_clock_millis);
		}
	}

	fn is_valid_target(&self, handler: &dyn Handler<Item>) -> bool {
		handler.as_any().downcast_ref::<UppercaseHandler>().is_some()
	}

	fn register_processor(&mut self, handler: Box<dyn Handler<Item>>) -> bool {
		if !self.is_valid_target(handler.as_ref()) {
			return false;
		}
		self.handlers.push(handler);
		true
	}

	fn deregister_processor(&mut self, handler_id: &str) {
		self.handlers.retain(|h| h.id() != handler_id);
	}

	fn listener_count(&self) -> usize {
		self.handlers.len()
	}

	fn handler_ids(&self) -> Vec<String> {
		self.handlers.iter().map(|h| h.id().to_string()).collect()
	}
}

struct StubSource {
	name: String,
	publisher: Option<SourceQueuePublisher<Item>>,
}

impl Dependencies for StubSource {}

impl Source<Item> for StubSource {
	fn name(&self) -> &str {
		&self.name
	}

	fn subscribe(&mut self, _key: &SubscriptionKey) {}
	fn unsubscribe(&mut self, _key: &SubscriptionKey) {}

	fn set_publisher(&mut self, publisher: SourceQueuePublisher<Item>) {
		self.publisher = Some(publisher);
	}
}

#[test]
fn only_the_capability_implementing_handler_receives_typed_dispatch() {
	let reporting = ErrorReporting::default();
	let manager = EventFlowManager::new(reporting.clone());

	let source = Box::new(StubSource { name: "items".into(), publisher: None });
	let publisher = manager.register_source("items", source, WrapStrategy::BroadcastNoWrap).unwrap();
	manager.register_invocation_strategy_factory::<Item, _, _>("on-event", StringCapabilityStrategy::default);

	let mut agent = manager.get_mapping_agent::<Item>(&SourceKey::new("items"), "on-event", "h1").unwrap();

	let h1_received = Arc::new(Mutex::new(Vec::new()));
	let admitted = agent.register_processor(Box::new(UppercaseHandler {
		id: "h1".into(),
		received: h1_received.clone(),
	}));
	assert!(admitted, "a handler implementing the capability must be admitted");

	let h2_received = Arc::new(Mutex::new(Vec::new()));
	let h2_admitted = agent.register_processor(Box::new(PlainHandler {
		id: "h2".into(),
		received: h2_received.clone(),
	}));
	assert!(!h2_admitted, "a handler without the capability must be rejected by this strategy");
	assert_eq!(agent.listener_count(), 1);

	publisher.publish(Item::Str("hello".to_string())).unwrap();
	publisher.publish(Item::Num(123)).unwrap();

	assert_eq!(agent.queue_depth(), 2);
	assert_eq!(Agent::do_work(&mut agent), 2);

	assert_eq!(*h1_received.lock().unwrap(), vec!["HELLO".to_string()]);
	assert!(h2_received.lock().unwrap().is_empty(), "H2 was never admitted, so it receives nothing");
	assert!(reporting.recent(10).is_empty(), "no errors should be reported for this dispatch");
}
