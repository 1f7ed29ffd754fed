//! Typed errors for failures that compromise an invariant and must surface to the
//! caller, plus their reporting severity for `ErrorReporting` (C12) fan-out.
//!
//! Behavioral failures that are *always* recovered locally (a slow-consumer drop, a
//! mapper exception) are never returned to a caller; they are constructed here purely
//! so call sites have a typed value to hand to `ErrorReporting`, distinguishing a
//! recoverable lane from a fatal one.

use millrace_common::{ErrorEvent, Reportable, Severity};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
	#[error("source '{0}' is already registered")]
	SourceAlreadyRegistered(String),

	#[error("service '{0}' is already registered")]
	ServiceAlreadyRegistered(String),

	#[error("unknown source '{0}'")]
	UnknownSource(String),

	#[error("no invocation strategy registered for callback type '{0}'")]
	NoStrategyRegistered(String),

	#[error("failed to publish to queue '{queue}' on source '{source}': {reason}")]
	QueuePublishFailure { source: String, queue: String, reason: String },

	#[error("queue '{queue}' on source '{source}' abandoned the offer after the backpressure budget elapsed")]
	SlowConsumerAbandon { source: String, queue: String },

	#[error("data mapper for source '{0}' failed: {1}")]
	MapperFailure(String, String),

	#[error("handler '{0}' invocation failed: {1}")]
	HandlerInvocationFailure(String, String),

	#[error("scheduled action '{0}' failed: {1}")]
	SchedulerActionFailure(String, String),

	#[error("lifecycle phase '{phase}' failed for '{target}': {reason}")]
	LifecycleFailure { phase: String, target: String, reason: String },
}

impl Reportable for EngineError {
	fn severity(&self) -> Severity {
		use EngineError::*;
		match self {
			SourceAlreadyRegistered(_)
			| ServiceAlreadyRegistered(_)
			| UnknownSource(_)
			| NoStrategyRegistered(_) => Severity::Error,
			QueuePublishFailure { .. } => Severity::Critical,
			SlowConsumerAbandon { .. } => Severity::Warning,
			MapperFailure(..) => Severity::Error,
			HandlerInvocationFailure(..) => Severity::Error,
			SchedulerActionFailure(..) => Severity::Error,
			LifecycleFailure { .. } => Severity::Critical,
		}
	}
}

impl EngineError {
	pub fn report(self, source_id: impl Into<String>) -> ErrorEvent {
		self.into_error_event(source_id)
	}
}

pub type EngineResult<T> = Result<T, EngineError>;
