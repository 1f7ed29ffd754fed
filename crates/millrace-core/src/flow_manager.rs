//! EventFlowManager (C2): registry of sources, invocation-strategy factories, and the
//! per-`(source, subscriber)` queues and agents built from them.
//!
//! Every collection here is a `Mutex`-guarded `HashMap` rather than a bespoke lock-free
//! map; `registry.rs`'s `ServiceRegistry` takes the same approach for the same reason:
//! registration is rare relative to the hot path (dispatch), so a short critical section
//! gives the same externally observed behavior as a lock-free structure would.

use std::{
	any::{Any, TypeId},
	collections::HashMap,
	fmt::Write as _,
	sync::{Arc, Mutex},
};

use crate::{
	agent::Agent,
	errors::{EngineError, EngineResult},
	invocation::InvocationStrategy,
	invocation_agent::QueueToInvocationAgent,
	keys::{CallbackType, SourceKey, SubscriptionKey},
	publisher::{SourceQueuePublisher, DEFAULT_QUEUE_CAPACITY},
	reporting::ErrorReporting,
	traits::{Source, WrapStrategy},
};

type StrategyFactory<T> = Arc<dyn Fn() -> Box<dyn InvocationStrategy<T> + Send> + Send + Sync>;

/// A C3 agent paired with the teardown action `EventFlowManager::get_mapping_agent`
/// promises: detaching the queue from the source's publisher and evicting it from this
/// manager's own registry. Runs on `Agent::tear_down`, the same
/// phase `LifecycleOrchestrator` (C7) already calls on every agent it stops.
pub struct MappingAgent<T, S> {
	agent: QueueToInvocationAgent<T, S>,
	on_unsubscribe: Option<Box<dyn FnOnce() + Send>>,
}

impl<T, S> MappingAgent<T, S>
where
	T: Clone + Send + 'static,
	S: InvocationStrategy<T> + Send,
{
	pub fn listener_count(&self) -> usize {
		self.agent.listener_count()
	}

	pub fn register_processor(&mut self, handler: Box<dyn crate::invocation::Handler<T>>) -> bool {
		self.agent.register_processor(handler)
	}

	pub fn deregister_processor(&mut self, handler_id: &str) {
		self.agent.deregister_processor(handler_id);
	}

	pub fn queue_depth(&self) -> usize {
		self.agent.queue_depth()
	}
}

impl<T, S> Agent for MappingAgent<T, S>
where
	T: Clone + Send + 'static,
	S: InvocationStrategy<T> + Send,
{
	fn do_work(&mut self) -> usize {
		self.agent.do_work()
	}

	fn role_name(&self) -> &str {
		self.agent.role_name()
	}

	fn tear_down(&mut self) {
		if let Some(unsubscribe) = self.on_unsubscribe.take() {
			unsubscribe();
		}
	}
}

pub struct EventFlowManager {
	sources: Mutex<HashMap<String, Arc<dyn Any + Send + Sync>>>,
	publishers: Mutex<HashMap<String, Arc<dyn Any + Send + Sync>>>,
	strategy_factories: Mutex<HashMap<(TypeId, CallbackType), Arc<dyn Any + Send + Sync>>>,
	reporting: ErrorReporting,
}

impl EventFlowManager {
	pub fn new(reporting: ErrorReporting) -> Self {
		EventFlowManager {
			sources: Mutex::new(HashMap::new()),
			publishers: Mutex::new(HashMap::new()),
			strategy_factories: Mutex::new(HashMap::new()),
			reporting,
		}
	}

	/// Creates and caches a `{publisher, source}` record, binds the publisher back into
	/// the source, and enforces name uniqueness.
	pub fn register_source<T>(
		&self,
		name: impl Into<String>,
		mut source: Box<dyn Source<T>>,
		wrap_strategy: WrapStrategy,
	) -> EngineResult<SourceQueuePublisher<T>>
	where
		T: Clone + Send + Sync + 'static,
	{
		let name = name.into();
		let mut sources = self.sources.lock().unwrap();
		if sources.contains_key(&name) {
			return Err(EngineError::SourceAlreadyRegistered(name));
		}
		let publisher = SourceQueuePublisher::new(name.clone(), wrap_strategy, self.reporting.clone());
		source.set_publisher(publisher.clone());
		sources.insert(name.clone(), Arc::new(Mutex::new(source)) as Arc<dyn Any + Send + Sync>);
		self.publishers.lock().unwrap().insert(name, Arc::new(publisher.clone()) as Arc<dyn Any + Send + Sync>);
		Ok(publisher)
	}

	/// Replaces any prior factory registered for `callback_type` against this `T`.
	pub fn register_invocation_strategy_factory<T, S, F>(&self, callback_type: impl Into<CallbackType>, factory: F)
	where
		T: 'static,
		S: InvocationStrategy<T> + Send + 'static,
		F: Fn() -> S + Send + Sync + 'static,
	{
		let erased: StrategyFactory<T> = Arc::new(move || Box::new(factory()) as Box<dyn InvocationStrategy<T> + Send>);
		self.strategy_factories
			.lock()
			.unwrap()
			.insert((TypeId::of::<T>(), callback_type.into()), Arc::new(erased) as Arc<dyn Any + Send + Sync>);
	}

	fn source_slot<T: Send + Sync + 'static>(
		&self,
		name: &str,
	) -> EngineResult<Arc<Mutex<Box<dyn Source<T>>>>> {
		let sources = self.sources.lock().unwrap();
		let slot = sources.get(name).ok_or_else(|| EngineError::UnknownSource(name.to_string()))?;
		slot.clone()
			.downcast::<Mutex<Box<dyn Source<T>>>>()
			.map_err(|_| EngineError::UnknownSource(name.to_string()))
	}

	/// Delegates to the named source; fails with `UnknownSource` when absent.
	pub fn subscribe<T: Send + Sync + 'static>(&self, key: &SubscriptionKey) -> EngineResult<()> {
		let slot = self.source_slot::<T>(key.source.as_str())?;
		slot.lock().unwrap().subscribe(key);
		Ok(())
	}

	pub fn unsubscribe<T: Send + Sync + 'static>(&self, key: &SubscriptionKey) -> EngineResult<()> {
		let slot = self.source_slot::<T>(key.source.as_str())?;
		slot.lock().unwrap().unsubscribe(key);
		Ok(())
	}

	/// Builds (or reattaches) a C3 agent draining a fresh `(sourceKey, subscriber)` queue
	/// off the source's publisher.
	pub fn get_mapping_agent<T>(
		&self,
		source_key: &SourceKey,
		callback_type: impl Into<CallbackType>,
		subscriber_role: impl Into<String>,
	) -> EngineResult<MappingAgent<T, Box<dyn InvocationStrategy<T> + Send>>>
	where
		T: Clone + Send + Sync + 'static,
	{
		let callback_type = callback_type.into();
		let subscriber_role = subscriber_role.into();

		let factory = {
			let factories = self.strategy_factories.lock().unwrap();
			let erased = factories
				.get(&(TypeId::of::<T>(), callback_type.clone()))
				.ok_or_else(|| EngineError::NoStrategyRegistered(callback_type.to_string()))?
				.clone();
			erased
				.downcast::<StrategyFactory<T>>()
				.map_err(|_| EngineError::NoStrategyRegistered(callback_type.to_string()))?
		};
		let strategy = (factory)();

		let publisher = {
			let publishers = self.publishers.lock().unwrap();
			let erased = publishers
				.get(source_key.as_str())
				.ok_or_else(|| EngineError::UnknownSource(source_key.to_string()))?
				.clone();
			erased
				.downcast::<SourceQueuePublisher<T>>()
				.map_err(|_| EngineError::UnknownSource(source_key.to_string()))?
		};

		let queue_name = format!("{subscriber_role}/{source_key}/{callback_type}");
		let queue = publisher.add_target_queue(queue_name.clone(), DEFAULT_QUEUE_CAPACITY);

		let agent = QueueToInvocationAgent::new(
			queue_name.clone(),
			source_key.as_str(),
			queue,
			strategy,
			self.reporting.clone(),
		);

		let publisher_for_teardown = (*publisher).clone();
		let queue_name_for_teardown = queue_name.clone();

		Ok(MappingAgent {
			agent,
			on_unsubscribe: Some(Box::new(move || {
				publisher_for_teardown.remove_target_queue_by_name(&queue_name_for_teardown);
			})),
		})
	}

	/// Diagnostic dump of every live queue name, grouped by source. Safe under concurrent
	/// registration: takes a single snapshot of the publisher map.
	pub fn append_queue_information<T: Send + Sync + 'static>(&self, out: &mut String) {
		let publishers = self.publishers.lock().unwrap();
		for (source_name, publisher) in publishers.iter() {
			let Ok(publisher) = publisher.clone().downcast::<SourceQueuePublisher<T>>() else {
				continue;
			};
			for queue_name in publisher.target_queue_names() {
				let _ = writeln!(out, "{source_name}: {queue_name}");
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use std::sync::atomic::{AtomicUsize, Ordering};

	use super::*;
	use crate::invocation::DefaultInvocationStrategy;

	struct StubSource {
		name: String,
		publisher: Option<SourceQueuePublisher<String>>,
		subscribed: Arc<AtomicUsize>,
		unsubscribed: Arc<AtomicUsize>,
	}

	impl crate::registry::Dependencies for StubSource {}

	impl Source<String> for StubSource {
		fn name(&self) -> &str {
			&self.name
		}

		fn subscribe(&mut self, _key: &SubscriptionKey) {
			self.subscribed.fetch_add(1, Ordering::SeqCst);
		}

		fn unsubscribe(&mut self, _key: &SubscriptionKey) {
			self.unsubscribed.fetch_add(1, Ordering::SeqCst);
		}

		fn set_publisher(&mut self, publisher: SourceQueuePublisher<String>) {
			self.publisher = Some(publisher);
		}
	}

	#[test]
	fn registering_the_same_source_name_twice_fails() {
		let manager = EventFlowManager::new(ErrorReporting::default());
		let source = Box::new(StubSource {
			name: "prices".into(),
			publisher: None,
			subscribed: Arc::new(AtomicUsize::new(0)),
			unsubscribed: Arc::new(AtomicUsize::new(0)),
		});
		manager.register_source("prices", source, WrapStrategy::BroadcastNoWrap).unwrap();
		let duplicate = Box::new(StubSource {
			name: "prices".into(),
			publisher: None,
			subscribed: Arc::new(AtomicUsize::new(0)),
			unsubscribed: Arc::new(AtomicUsize::new(0)),
		});
		let err = manager.register_source("prices", duplicate, WrapStrategy::BroadcastNoWrap).unwrap_err();
		assert!(matches!(err, EngineError::SourceAlreadyRegistered(name) if name == "prices"));
	}

	#[test]
	fn subscribe_and_unsubscribe_delegate_to_the_named_source() {
		let manager = EventFlowManager::new(ErrorReporting::default());
		let subscribed = Arc::new(AtomicUsize::new(0));
		let unsubscribed = Arc::new(AtomicUsize::new(0));
		let source = Box::new(StubSource {
			name: "prices".into(),
			publisher: None,
			subscribed: subscribed.clone(),
			unsubscribed: unsubscribed.clone(),
		});
		manager.register_source("prices", source, WrapStrategy::BroadcastNoWrap).unwrap();
		let key = SubscriptionKey::new("prices", "on-event");
		manager.subscribe::<String>(&key).unwrap();
		manager.unsubscribe::<String>(&key).unwrap();
		assert_eq!(subscribed.load(Ordering::SeqCst), 1);
		assert_eq!(unsubscribed.load(Ordering::SeqCst), 1);
	}

	#[test]
	fn subscribe_to_an_unknown_source_fails() {
		let manager = EventFlowManager::new(ErrorReporting::default());
		let key = SubscriptionKey::new("ghost", "on-event");
		let err = manager.subscribe::<String>(&key).unwrap_err();
		assert!(matches!(err, EngineError::UnknownSource(name) if name == "ghost"));
	}

	#[test]
	fn get_mapping_agent_without_a_registered_factory_fails() {
		let manager = EventFlowManager::new(ErrorReporting::default());
		let source = Box::new(StubSource {
			name: "prices".into(),
			publisher: None,
			subscribed: Arc::new(AtomicUsize::new(0)),
			unsubscribed: Arc::new(AtomicUsize::new(0)),
		});
		manager.register_source("prices", source, WrapStrategy::BroadcastNoWrap).unwrap();
		let err = manager
			.get_mapping_agent::<String>(&SourceKey::new("prices"), "on-event", "h1")
			.unwrap_err();
		assert!(matches!(err, EngineError::NoStrategyRegistered(tag) if tag == "on-event"));
	}

	#[test]
	fn get_mapping_agent_builds_a_draining_agent_and_tear_down_detaches_the_queue() {
		let manager = EventFlowManager::new(ErrorReporting::default());
		let source = Box::new(StubSource {
			name: "prices".into(),
			publisher: None,
			subscribed: Arc::new(AtomicUsize::new(0)),
			unsubscribed: Arc::new(AtomicUsize::new(0)),
		});
		let publisher = manager.register_source("prices", source, WrapStrategy::BroadcastNoWrap).unwrap();
		manager.register_invocation_strategy_factory::<String, _, _>(
			"on-event",
			DefaultInvocationStrategy::<String>::default,
		);

		let mut agent = manager
			.get_mapping_agent::<String>(&SourceKey::new("prices"), "on-event", "h1")
			.unwrap();
		assert_eq!(agent.listener_count(), 0);
		assert_eq!(publisher.target_queue_names(), vec!["h1/prices/on-event".to_string()]);

		publisher.publish("hi".to_string()).unwrap();
		assert_eq!(agent.queue_depth(), 1);
		assert_eq!(Agent::do_work(&mut agent), 1);

		Agent::tear_down(&mut agent);
		assert!(publisher.target_queue_names().is_empty());
	}
}
