//! External collaborator contracts: `Source`, `Sink`, `Service`, plus the
//! wrapper/replay shapes `SourceQueuePublisher` (C1) uses to wire an item onto a queue.
//!
//! These are plain Rust traits rather than duck-typed interfaces: optional lifecycle
//! hooks become default-implemented methods so a leaf source/sink
//! that doesn't care about a phase doesn't have to implement it, mirroring `Agent`'s own
//! default bodies in `agent.rs`.

use crate::{keys::SubscriptionKey, publisher::SourceQueuePublisher, registry::Dependencies};

/// A feed registered by name with `EventFlowManager` (C2). `T` is the raw item type this
/// source emits, before `SourceQueuePublisher`'s data mapper runs.
///
/// `set_publisher` is called exactly once by `EventFlowManager::register_source`, binding
/// the source back to the very publisher it was registered under; the other
/// `set_*` hooks let an integrator configure wrap/backpressure behavior on that same
/// publisher without reaching around the source.
pub trait Source<T>: Dependencies + Send {
	fn name(&self) -> &str;

	fn subscribe(&mut self, key: &SubscriptionKey);
	fn unsubscribe(&mut self, key: &SubscriptionKey);

	fn set_publisher(&mut self, publisher: SourceQueuePublisher<T>);
	fn set_wrap_strategy(&mut self, strategy: WrapStrategy) {
		let _ = strategy;
	}
	fn set_slow_consumer_strategy(&mut self, strategy: SlowConsumerStrategy) {
		let _ = strategy;
	}

	fn init(&mut self) {}
	fn start(&mut self) {}
	fn start_complete(&mut self) {}
	fn stop(&mut self) {}
	fn tear_down(&mut self) {}
}

/// An agent-hosted source additionally drives its own `do_work`, the way a file tailer or
/// poll-based adapter pumps itself on its own agent thread.
pub trait AgentHostedSource<T>: Source<T> {
	fn do_work(&mut self) -> usize;
}

/// A consumer at the system boundary. Like `Source`, may be agent-hosted by implementing
/// `do_work` directly on the same type and registering it with a `ComposingAgent`.
pub trait Sink<T>: Dependencies + Send {
	fn name(&self) -> &str;

	fn accept(&mut self, item: &T);

	fn init(&mut self) {}
	fn start(&mut self) {}
	fn start_complete(&mut self) {}
	fn stop(&mut self) {}
	fn tear_down(&mut self) {}
}

/// A named, lifecycle-aware collaborator resolvable through `ServiceRegistry` (C10).
pub trait Service: Dependencies + Send {
	fn name(&self) -> &str;

	fn init(&mut self) {}
	fn start(&mut self) {}
	fn start_complete(&mut self) {}
	fn stop(&mut self) {}
	fn tear_down(&mut self) {}
}

/// Wrapper emitted when a queue's wrap strategy calls for identification. Carries the
/// source name and the publish sequence number alongside the
/// (already data-mapped) payload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NamedFeedEvent<U> {
	pub name: String,
	pub sequence_number: u64,
	pub data: U,
}

/// What actually lands in a `NamedQueue` slot: either the mapped payload as-is or one
/// wrapped in a `NamedFeedEvent`, decided once per publisher at construction time by
/// which of `SourceQueuePublisher::{new_unwrapped, new_named}` the integrator chose; the
/// four-way `{subscription, broadcast} x {no-wrap, named-event}` combination
/// collapses to this binary choice in a statically typed port; the
/// `WrapStrategy` enum below is kept purely for config/diagnostics.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Wire<U> {
	Plain(U),
	Named(NamedFeedEvent<U>),
}

impl<U> Wire<U> {
	pub fn as_plain(&self) -> Option<&U> {
		match self {
			Wire::Plain(value) => Some(value),
			Wire::Named(_) => None,
		}
	}

	pub fn as_named(&self) -> Option<&NamedFeedEvent<U>> {
		match self {
			Wire::Named(event) => Some(event),
			Wire::Plain(_) => None,
		}
	}
}

/// Config/diagnostic tag for a publisher's wrap behavior. Runtime wrapping
/// is driven by which constructor built the `SourceQueuePublisher`, not by matching on
/// this enum, but it round-trips through `Config` (A4) so an external loader can select
/// the right constructor.
#[derive(Clone, Copy, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum WrapStrategy {
	SubscriptionNoWrap,
	SubscriptionNamedEvent,
	BroadcastNoWrap,
	BroadcastNamedEvent,
}

impl WrapStrategy {
	pub fn wraps(self) -> bool {
		matches!(self, WrapStrategy::SubscriptionNamedEvent | WrapStrategy::BroadcastNamedEvent)
	}

	pub fn is_broadcast(self) -> bool {
		matches!(self, WrapStrategy::BroadcastNoWrap | WrapStrategy::BroadcastNamedEvent)
	}
}

/// Policy applied once a queue's offer budget (a bounded ~10ms spin) is
/// exceeded. `Backoff` just drops the item for that queue; `Disconnect` additionally
/// detaches the queue so future publishes never attempt it again; `Exit` escalates to a
/// `QueuePublishFailure` that fails the whole `publish` call, chosen over silently
/// dropping in every case so a caller can notice total delivery failure.
#[derive(Clone, Copy, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SlowConsumerStrategy {
	Backoff,
	Disconnect,
	Exit,
}

impl Default for SlowConsumerStrategy {
	fn default() -> Self {
		SlowConsumerStrategy::Backoff
	}
}

/// An explicit replay record: `publishReplay` fans this out to every
/// queue verbatim, bypassing the data mapper and wrap strategy.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReplayRecord<W> {
	pub event: W,
	pub wall_clock_millis: i64,
}
