//! LifecycleOrchestrator (C7): global init -> start -> startComplete -> stop -> tearDown
//! sequencing across services and agent groups.
//!
//! Source and handler construction/wiring (steps 2/4 of the start sequence) happen
//! at the call site, against the shared [`ServiceRegistry`], [`EventFlowManager`], and
//! [`DeadlineWheelScheduler`] this orchestrator owns and exposes; those components
//! already carry their own lifecycle (a `ComposingAgent`'s `init`/`start`/`start_complete`
//! run once per thread, inside `AgentRunner::spawn`'s duty-cycle bootstrap). What this
//! orchestrator adds on top is the *service* layer's ordered lifecycle and the ordered
//! launch/join of every agent-hosted thread, plus the stop sequence:
//! "mark stopping -> stop AgentRunners -> stop services -> tearDown services".

use std::sync::{
	atomic::{AtomicBool, Ordering},
	Arc, Mutex,
};

use millrace_common::ShutdownSignal;

use crate::{
	agent::{Agent, ComposingAgent},
	flow_manager::EventFlowManager,
	idle::{IdleStrategy, IdleStrategyKind},
	pool::PoolRegistry,
	registry::ServiceRegistry,
	reporting::ErrorReporting,
	runner::{AgentErrorHandler, AgentRunner, ReportingErrorHandler},
	scheduler::DeadlineWheelScheduler,
	traits::Service,
};

/// A not-yet-launched agent group: a fully wired `ComposingAgent` plus the pacing policy
/// its `AgentRunner` thread will use. Added via [`LifecycleOrchestrator::add_agent_group`]
/// before [`LifecycleOrchestrator::start`]; spawned in registration order.
struct PendingGroup {
	composing: Box<dyn Agent>,
	idle_strategy: IdleStrategy,
}

/// Coordinates the ordered start/stop sequence across every service and agent group
/// registered with it. Owns the engine's shared infrastructure:
/// an [`ErrorReporting`] channel, a [`ServiceRegistry`], a [`PoolRegistry`], an
/// [`EventFlowManager`], and a [`DeadlineWheelScheduler`]; all four are handed out by
/// reference so sources/handlers/sinks constructed elsewhere can register against them
/// before `start()` is called.
pub struct LifecycleOrchestrator {
	reporting: ErrorReporting,
	registry: ServiceRegistry,
	pools: PoolRegistry,
	flow: Arc<EventFlowManager>,
	scheduler: Arc<DeadlineWheelScheduler>,
	error_handler: Arc<dyn AgentErrorHandler>,
	shutdown: ShutdownSignal,
	services: Mutex<Vec<Box<dyn Service>>>,
	pending_groups: Mutex<Vec<PendingGroup>>,
	runners: Mutex<Vec<AgentRunner>>,
	started: AtomicBool,
	stopped: AtomicBool,
}

impl Default for LifecycleOrchestrator {
	fn default() -> Self {
		Self::new()
	}
}

impl LifecycleOrchestrator {
	pub fn new() -> Self {
		let reporting = ErrorReporting::default();
		let shutdown = ShutdownSignal::default();
		LifecycleOrchestrator {
			flow: Arc::new(EventFlowManager::new(reporting.clone())),
			scheduler: Arc::new(DeadlineWheelScheduler::new(reporting.clone())),
			error_handler: Arc::new(ReportingErrorHandler::new(reporting.clone())),
			registry: ServiceRegistry::default(),
			pools: PoolRegistry::default(),
			reporting,
			shutdown,
			services: Mutex::new(Vec::new()),
			pending_groups: Mutex::new(Vec::new()),
			runners: Mutex::new(Vec::new()),
			started: AtomicBool::new(false),
			stopped: AtomicBool::new(false),
		}
	}

	pub fn reporting(&self) -> &ErrorReporting {
		&self.reporting
	}

	pub fn service_registry(&self) -> &ServiceRegistry {
		&self.registry
	}

	pub fn pool_registry(&self) -> &PoolRegistry {
		&self.pools
	}

	pub fn flow_manager(&self) -> &Arc<EventFlowManager> {
		&self.flow
	}

	pub fn scheduler(&self) -> &Arc<DeadlineWheelScheduler> {
		&self.scheduler
	}

	pub fn shutdown_signal(&self) -> ShutdownSignal {
		self.shutdown.clone()
	}

	/// Registers a service for ordered lifecycle sequencing.
	/// Dependency injection into the service (if it implements [`crate::registry::Dependencies`]
	/// beyond the default no-op) is the caller's responsibility before this call, since
	/// `ServiceRegistry::register` needs the concrete, still-`Sized` type this trait
	/// object has already erased.
	pub fn add_service(&self, service: Box<dyn Service>) {
		self.services.lock().unwrap().push(service);
	}

	/// Queues an agent group (typically hosting `QueueToInvocationAgent`s, agent-hosted
	/// sources/sinks/services, or the scheduler itself) to be launched on its own thread
	/// when `start()` runs. Groups are spawned in registration order.
	pub fn add_agent_group(&self, name: impl Into<String>, idle_strategy: IdleStrategyKind, core_id: Option<usize>) {
		let mut composing = ComposingAgent::new(name);
		if let Some(core_id) = core_id {
			composing = composing.with_core_id(core_id);
		}
		self.pending_groups.lock().unwrap().push(PendingGroup {
			composing: Box::new(composing),
			idle_strategy: IdleStrategy::from_kind(idle_strategy),
		});
	}

	/// Adds a pre-built [`Agent`] (any leaf worker, or another `ComposingAgent`) as its
	/// own top-level group with the given pacing policy.
	pub fn add_agent(&self, agent: Box<dyn Agent>, idle_strategy: IdleStrategyKind) {
		self.pending_groups
			.lock()
			.unwrap()
			.push(PendingGroup { composing: agent, idle_strategy: IdleStrategy::from_kind(idle_strategy) });
	}

	/// `init` then `start` then `startComplete` every registered service, then spawns an
	/// `AgentRunner` thread per queued agent group. Each
	/// `AgentRunner`'s own duty-cycle bootstrap runs `init`/`start`/`start_complete` on
	/// its hosted agent before entering the loop, so a `ComposingAgent`'s sub-agents (and
	/// therefore the sources whose caches flush at `start_complete`) see the same
	/// sequence without the orchestrator reaching into them directly.
	pub fn start(&self) {
		if self.started.swap(true, Ordering::AcqRel) {
			return;
		}
		let mut services = self.services.lock().unwrap();
		for service in services.iter_mut() {
			service.init();
		}
		for service in services.iter_mut() {
			service.start();
		}
		for service in services.iter_mut() {
			service.start_complete();
		}
		drop(services);

		let groups = std::mem::take(&mut *self.pending_groups.lock().unwrap());
		let mut runners = self.runners.lock().unwrap();
		for group in groups {
			runners.push(AgentRunner::spawn(
				group.composing,
				group.idle_strategy,
				self.shutdown.child(),
				self.error_handler.clone(),
			));
		}
	}

	/// Marks the orchestrator stopping, joins every `AgentRunner` thread (each one's duty
	/// cycle calls `stop`/`tear_down` on its hosted agent as it exits), then `stop`s and
	/// `tearDown`s every registered service. Idempotent:
	/// a second call is a no-op.
	pub fn stop(&self) {
		if self.stopped.swap(true, Ordering::AcqRel) {
			return;
		}
		self.shutdown.kill();
		let mut runners = self.runners.lock().unwrap();
		for runner in runners.iter_mut() {
			runner.join();
		}
		runners.clear();
		drop(runners);

		let mut services = self.services.lock().unwrap();
		for service in services.iter_mut() {
			service.stop();
		}
		for service in services.iter_mut() {
			service.tear_down();
		}
	}

	pub fn is_started(&self) -> bool {
		self.started.load(Ordering::Acquire)
	}

	pub fn is_stopped(&self) -> bool {
		self.stopped.load(Ordering::Acquire)
	}
}

impl Drop for LifecycleOrchestrator {
	fn drop(&mut self) {
		self.stop();
	}
}

#[cfg(test)]
mod tests {
	use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};

	use super::*;

	struct RecordingService {
		name: &'static str,
		log: Arc<Mutex<Vec<&'static str>>>,
	}

	impl crate::registry::Dependencies for RecordingService {}

	impl Service for RecordingService {
		fn name(&self) -> &str {
			self.name
		}

		fn init(&mut self) {
			self.log.lock().unwrap().push("init");
		}

		fn start(&mut self) {
			self.log.lock().unwrap().push("start");
		}

		fn start_complete(&mut self) {
			self.log.lock().unwrap().push("start_complete");
		}

		fn stop(&mut self) {
			self.log.lock().unwrap().push("stop");
		}

		fn tear_down(&mut self) {
			self.log.lock().unwrap().push("tear_down");
		}
	}

	#[test]
	fn services_go_through_every_phase_in_order() {
		let orchestrator = LifecycleOrchestrator::new();
		let log = Arc::new(Mutex::new(Vec::new()));
		orchestrator.add_service(Box::new(RecordingService { name: "svc", log: log.clone() }));
		orchestrator.start();
		orchestrator.stop();
		assert_eq!(*log.lock().unwrap(), vec!["init", "start", "start_complete", "stop", "tear_down"]);
	}

	struct CountingAgent {
		runs: Arc<AtomicUsize>,
	}

	impl Agent for CountingAgent {
		fn do_work(&mut self) -> usize {
			self.runs.fetch_add(1, AtomicOrdering::SeqCst);
			0
		}

		fn role_name(&self) -> &str {
			"counting"
		}
	}

	#[test]
	fn agent_groups_are_spawned_on_start_and_joined_on_stop() {
		let orchestrator = LifecycleOrchestrator::new();
		let runs = Arc::new(AtomicUsize::new(0));
		orchestrator.add_agent(Box::new(CountingAgent { runs: runs.clone() }), IdleStrategyKind::Yielding);
		orchestrator.start();
		while runs.load(AtomicOrdering::SeqCst) < 3 {
			std::thread::yield_now();
		}
		orchestrator.stop();
		assert!(runs.load(AtomicOrdering::SeqCst) >= 3);
	}

	#[test]
	fn start_and_stop_are_each_idempotent() {
		let orchestrator = LifecycleOrchestrator::new();
		let log = Arc::new(Mutex::new(Vec::new()));
		orchestrator.add_service(Box::new(RecordingService { name: "svc", log: log.clone() }));
		orchestrator.start();
		orchestrator.start();
		assert_eq!(log.lock().unwrap().iter().filter(|&&p| p == "init").count(), 1);
		orchestrator.stop();
		orchestrator.stop();
		assert_eq!(log.lock().unwrap().iter().filter(|&&p| p == "stop").count(), 1);
	}
}
