//! AgentRunner (C6): hosts one `Agent` (typically a `ComposingAgent`) on a dedicated OS
//! thread, looping `do_work -> idle_strategy.idle` and routing panics to a configured
//! error handler instead of letting them tear down the thread.

use std::{
	panic::{self, AssertUnwindSafe},
	sync::Arc,
	thread::{self, JoinHandle},
};

use millrace_common::ShutdownSignal;
use tracing::error;

use crate::{agent::Agent, errors::EngineError, idle::IdleStrategy, reporting::ErrorReporting};

pub trait AgentErrorHandler: Send + Sync {
	fn handle(&self, role_name: &str, reason: String);
}

/// Default handler: fans the panic out through `ErrorReporting` at CRITICAL, the
/// severity lifecycle failures are assigned.
pub struct ReportingErrorHandler {
	reporting: ErrorReporting,
}

impl ReportingErrorHandler {
	pub fn new(reporting: ErrorReporting) -> Self {
		ReportingErrorHandler { reporting }
	}
}

impl AgentErrorHandler for ReportingErrorHandler {
	fn handle(&self, role_name: &str, reason: String) {
		error!(agent = role_name, reason = %reason, "agent-duty-cycle-panicked");
		self.reporting.report(
			EngineError::LifecycleFailure { phase: "do_work".to_string(), target: role_name.to_string(), reason }
				.report(role_name),
		);
	}
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
	payload
		.downcast_ref::<&str>()
		.map(|s| s.to_string())
		.or_else(|| payload.downcast_ref::<String>().cloned())
		.unwrap_or_else(|| "agent panicked with a non-string payload".to_string())
}

/// A running agent thread. Dropping or calling [`AgentRunner::join`] waits for the duty
/// cycle loop to observe `shutdown` and exit; shutdown itself is triggered externally
/// (typically by `LifecycleOrchestrator`) by killing the `ShutdownSignal` passed in.
pub struct AgentRunner {
	role_name: String,
	join_handle: Option<JoinHandle<()>>,
}

impl AgentRunner {
	pub fn spawn(
		mut agent: Box<dyn Agent>,
		idle_strategy: IdleStrategy,
		shutdown: ShutdownSignal,
		error_handler: Arc<dyn AgentErrorHandler>,
	) -> Self {
		let role_name = agent.role_name().to_string();
		let thread_name = role_name.clone();
		let join_handle = thread::Builder::new()
			.name(thread_name)
			.spawn(move || run_duty_cycle(agent.as_mut(), idle_strategy, shutdown, error_handler))
			.expect("failed to spawn agent thread");
		AgentRunner { role_name, join_handle: Some(join_handle) }
	}

	pub fn role_name(&self) -> &str {
		&self.role_name
	}

	/// Waits for the duty cycle thread to exit. Idempotent: a second call is a no-op.
	pub fn join(&mut self) {
		if let Some(handle) = self.join_handle.take() {
			let _ = handle.join();
		}
	}
}

impl Drop for AgentRunner {
	fn drop(&mut self) {
		self.join();
	}
}

fn run_duty_cycle(
	agent: &mut dyn Agent,
	idle_strategy: IdleStrategy,
	shutdown: ShutdownSignal,
	error_handler: Arc<dyn AgentErrorHandler>,
) {
	agent.init();
	agent.start();
	agent.start_complete();

	let mut idle_streak: u32 = 0;
	while shutdown.is_alive() {
		match panic::catch_unwind(AssertUnwindSafe(|| agent.do_work())) {
			Ok(work_count) => {
				idle_streak = if work_count == 0 { idle_streak.saturating_add(1) } else { 0 };
				idle_strategy.idle(work_count, idle_streak);
			},
			Err(payload) => {
				error_handler.handle(agent.role_name(), panic_message(payload));
				idle_streak = 0;
			},
		}
	}
	agent.stop();
	agent.tear_down();
}
