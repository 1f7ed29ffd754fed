//! Identifiers shared across the engine: source names, interned callback tags, and the
//! pair that together name one subscriber queue.

use std::fmt;

#[derive(Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct SourceKey(String);

impl SourceKey {
	pub fn new(name: impl Into<String>) -> Self {
		SourceKey(name.into())
	}

	pub fn as_str(&self) -> &str {
		&self.0
	}
}

impl fmt::Display for SourceKey {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.0)
	}
}

impl<S: Into<String>> From<S> for SourceKey {
	fn from(name: S) -> Self {
		SourceKey::new(name)
	}
}

/// An interned tag identifying a handler callback shape; selects an invocation strategy.
/// Defaults to `"on-event"`; custom tags may be registered against their own factory.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct CallbackType(String);

impl CallbackType {
	pub const DEFAULT: &'static str = "on-event";

	pub fn new(tag: impl Into<String>) -> Self {
		CallbackType(tag.into())
	}

	pub fn as_str(&self) -> &str {
		&self.0
	}
}

impl Default for CallbackType {
	fn default() -> Self {
		CallbackType::new(CallbackType::DEFAULT)
	}
}

impl fmt::Display for CallbackType {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.0)
	}
}

impl<S: Into<String>> From<S> for CallbackType {
	fn from(tag: S) -> Self {
		CallbackType::new(tag)
	}
}

#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct SubscriptionKey {
	pub source: SourceKey,
	pub callback_type: CallbackType,
}

impl SubscriptionKey {
	pub fn new(source: impl Into<SourceKey>, callback_type: impl Into<CallbackType>) -> Self {
		SubscriptionKey { source: source.into(), callback_type: callback_type.into() }
	}
}

impl fmt::Display for SubscriptionKey {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}/{}", self.source, self.callback_type)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn callback_type_defaults_to_on_event() {
		assert_eq!(CallbackType::default().as_str(), "on-event");
	}

	#[test]
	fn subscription_key_displays_source_and_callback() {
		let key = SubscriptionKey::new("prices", "on-event");
		assert_eq!(key.to_string(), "prices/on-event");
	}
}
