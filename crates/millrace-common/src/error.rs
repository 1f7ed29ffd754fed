//! Error-reporting primitives shared by every millrace component.
//!
//! The classification axis here is severity rather than a status code (the engine has
//! no network surface of its own): every fallible operation in the engine produces an
//! [`ErrorEvent`] tagged with a [`Severity`], which `ErrorReporting` fans out to sinks.

use std::{
	fmt,
	time::{SystemTime, UNIX_EPOCH},
};

/// Severity of a reported error, in increasing order of urgency.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum Severity {
	Warning,
	Error,
	Critical,
}

impl fmt::Display for Severity {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let s = match self {
			Severity::Warning => "WARNING",
			Severity::Error => "ERROR",
			Severity::Critical => "CRITICAL",
		};
		f.write_str(s)
	}
}

/// A single reported error, independent of whether it was also returned to a caller.
#[derive(Clone, Debug)]
pub struct ErrorEvent {
	pub source_id: String,
	pub message: String,
	pub cause: Option<String>,
	pub severity: Severity,
	/// Milliseconds since the Unix epoch.
	pub timestamp_millis: u64,
}

impl ErrorEvent {
	pub fn new(source_id: impl Into<String>, message: impl Into<String>, severity: Severity) -> Self {
		ErrorEvent {
			source_id: source_id.into(),
			message: message.into(),
			cause: None,
			severity,
			timestamp_millis: now_millis(),
		}
	}

	pub fn with_cause(mut self, cause: impl Into<String>) -> Self {
		self.cause = Some(cause.into());
		self
	}
}

impl fmt::Display for ErrorEvent {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "[{}] {}: {}", self.severity, self.source_id, self.message)?;
		if let Some(cause) = &self.cause {
			write!(f, " (cause: {cause})")?;
		}
		Ok(())
	}
}

fn now_millis() -> u64 {
	SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_millis() as u64).unwrap_or(0)
}

/// Implemented by error types that know their own reporting severity.
pub trait Reportable: ToString {
	fn severity(&self) -> Severity;

	fn into_error_event(self, source_id: impl Into<String>) -> ErrorEvent
	where
		Self: Sized,
	{
		ErrorEvent::new(source_id, self.to_string(), self.severity())
	}
}
