//! millrace-core: an in-process, event-driven dispatch engine connecting multiple event
//! sources ("feeds") to multiple stateful event handlers ("processors") through bounded
//! lock-free queues, executed on a pool of cooperative worker threads ("agents").
//!
//! Single-threaded, deterministic processing per handler is guaranteed while permitting
//! many concurrent feeds and handlers, with pluggable invocation strategies, subscription
//! routing, lifecycle orchestration, optional reference-counted object pooling for
//! zero-allocation hot paths, and a deadline-wheel scheduler for deferred work.
//!
//! Module map, leaves first:
//! - [`keys`]: `SourceKey`/`CallbackType`/`SubscriptionKey` identifiers.
//! - [`traits`]: the `Source`/`Sink`/`Service` contracts external collaborators implement.
//! - [`context`]: the thread-local "currently dispatching handler" (C11).
//! - [`errors`]: `EngineError` and its reporting severities.
//! - [`idle`]: pacing policies used between agent duty cycles.
//! - [`config`]: the plain, serde-derived configuration surface.
//! - [`reporting`]: `ErrorReporting`, the fan-out error channel (C12).
//! - [`pool`]: `Pool`/`Pooled`/`PoolRegistry`, the reference-counted object pool (C9).
//! - [`publisher`]: `SourceQueuePublisher` (C1).
//! - [`invocation`]: the `InvocationStrategy` SPI and its default implementation (C4).
//! - [`invocation_agent`]: `QueueToInvocationAgent`, a queue-draining worker (C3).
//! - [`agent`]: the `Agent` trait and `ComposingAgent` (C5).
//! - [`runner`]: `AgentRunner`, hosting an agent on its own OS thread (C6).
//! - [`scheduler`]: `DeadlineWheelScheduler`, one-shot deferred timers (C8).
//! - [`flow_manager`]: `EventFlowManager`, the source/queue/strategy registry (C2).
//! - [`registry`]: `ServiceRegistry` and the `Dependencies` injection descriptor (C10).
//! - [`orchestrator`]: `LifecycleOrchestrator`, global start/stop sequencing (C7).

#![deny(clippy::disallowed_methods)]

pub mod agent;
pub mod config;
pub mod context;
pub mod errors;
pub mod flow_manager;
pub mod idle;
pub mod invocation;
pub mod invocation_agent;
pub mod keys;
pub mod orchestrator;
pub mod pool;
pub mod publisher;
pub mod registry;
pub mod reporting;
pub mod runner;
pub mod scheduler;
pub mod traits;

pub use agent::{Agent, ComposingAgent, ComposingAgentState};
pub use config::Config;
pub use errors::{EngineError, EngineResult};
pub use flow_manager::{EventFlowManager, MappingAgent};
pub use idle::{IdleStrategy, IdleStrategyKind};
pub use invocation::{DefaultInvocationStrategy, Handler, InvocationStrategy};
pub use invocation_agent::QueueToInvocationAgent;
pub use keys::{CallbackType, SourceKey, SubscriptionKey};
pub use orchestrator::LifecycleOrchestrator;
pub use pool::{Pool, PoolHooks, PoolRegistry, Poolable, Pooled};
pub use publisher::{CacheEntryPayload, QueueItem, SourceQueuePublisher, DEFAULT_QUEUE_CAPACITY};
pub use registry::{Dependencies, ServiceRegistry};
pub use reporting::{ErrorReporting, ErrorSink};
pub use runner::{AgentErrorHandler, AgentRunner};
pub use scheduler::{DeadlineWheelScheduler, TimerId};
pub use traits::{
	AgentHostedSource, NamedFeedEvent, ReplayRecord, Service, Sink, SlowConsumerStrategy, Source, Wire, WrapStrategy,
};
