//! Configuration surface: a plain, immutable tree an external loader can populate. No
//! loader ships here, only the shape, derived from `serde::Deserialize`/`Serialize`
//! while the actual YAML/JSON loading lives in the binary that embeds it.
//!
//! Fields that name a runtime value (`instance`, `dataMapper`, `handlerSupplier`,
//! `valueMapper`, the `invocationStrategies{callbackType→factory}` map) are deliberately
//! absent: a `fn`/trait object can't round-trip through serde, so wiring those lives in
//! the code that reads this config and calls `EventFlowManager`/`ServiceRegistry`
//! directly. `eventFeeds[].broadcast` and
//! `.wrapWithNamedEvent` collapse into the single `wrap_strategy` field already, since
//! `WrapStrategy::{is_broadcast, wraps}` recover both booleans from it.

use serde::{Deserialize, Serialize};

use crate::{
	idle::IdleStrategyKind,
	traits::{SlowConsumerStrategy, WrapStrategy},
};

#[derive(Clone, Debug, Eq, PartialEq, Deserialize, Serialize)]
pub struct AgentThreadConfig {
	pub name: String,
	#[serde(default)]
	pub idle_strategy: Option<IdleStrategyKind>,
	#[serde(default)]
	pub core_id: Option<usize>,
}

#[derive(Clone, Debug, Eq, PartialEq, Deserialize, Serialize)]
pub struct ProcessorGroupConfig {
	pub agent_name: String,
	/// Names of the handlers hosted on this group; the supplier+per-handler config named
	/// `handlers{name→handlerSupplier+config}` is constructed in code.
	#[serde(default)]
	pub handler_names: Vec<String>,
	#[serde(default)]
	pub log_level: Option<String>,
	#[serde(default)]
	pub idle_strategy: Option<IdleStrategyKind>,
}

#[derive(Clone, Debug, Eq, PartialEq, Deserialize, Serialize)]
pub struct EventFeedConfig {
	pub name: String,
	pub wrap_strategy: WrapStrategy,
	#[serde(default)]
	pub slow_consumer_strategy: SlowConsumerStrategy,
	#[serde(default)]
	pub agent_name: Option<String>,
	#[serde(default)]
	pub idle_strategy: Option<IdleStrategyKind>,
}

#[derive(Clone, Debug, Eq, PartialEq, Deserialize, Serialize)]
pub struct EventSinkConfig {
	pub name: String,
	#[serde(default)]
	pub agent_name: Option<String>,
	#[serde(default)]
	pub idle_strategy: Option<IdleStrategyKind>,
}

#[derive(Clone, Debug, Eq, PartialEq, Deserialize, Serialize)]
pub struct ServiceConfig {
	pub name: String,
	#[serde(default)]
	pub agent_group: Option<String>,
	#[serde(default)]
	pub idle_strategy: Option<IdleStrategyKind>,
}

/// The whole recognized option set, with sensible defaults so a partially-specified
/// loader payload (or a `Config::default()` in tests) yields a runnable configuration.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct Config {
	#[serde(default = "Config::default_idle_strategy")]
	pub idle_strategy: IdleStrategyKind,
	#[serde(default)]
	pub agent_threads: Vec<AgentThreadConfig>,
	#[serde(default)]
	pub processor_groups: Vec<ProcessorGroupConfig>,
	#[serde(default)]
	pub event_feeds: Vec<EventFeedConfig>,
	#[serde(default)]
	pub event_sinks: Vec<EventSinkConfig>,
	#[serde(default)]
	pub services: Vec<ServiceConfig>,
}

impl Config {
	fn default_idle_strategy() -> IdleStrategyKind {
		IdleStrategyKind::Yielding
	}

	/// The idle strategy configured for `agent_name`, falling back to the top-level
	/// default when the agent isn't listed or didn't override it.
	pub fn idle_strategy_for(&self, agent_name: &str) -> IdleStrategyKind {
		self.agent_threads
			.iter()
			.find(|agent| agent.name == agent_name)
			.and_then(|agent| agent.idle_strategy)
			.unwrap_or(self.idle_strategy)
	}

	pub fn core_id_for(&self, agent_name: &str) -> Option<usize> {
		self.agent_threads.iter().find(|agent| agent.name == agent_name).and_then(|agent| agent.core_id)
	}
}

impl Default for Config {
	fn default() -> Self {
		Config {
			idle_strategy: Config::default_idle_strategy(),
			agent_threads: Vec::new(),
			processor_groups: Vec::new(),
			event_feeds: Vec::new(),
			event_sinks: Vec::new(),
			services: Vec::new(),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn default_config_is_empty_with_a_yielding_fallback() {
		let config = Config::default();
		assert_eq!(config.idle_strategy, IdleStrategyKind::Yielding);
		assert!(config.agent_threads.is_empty());
	}

	#[test]
	fn idle_strategy_for_falls_back_to_the_top_level_default() {
		let mut config = Config::default();
		config.idle_strategy = IdleStrategyKind::BusySpin;
		config.agent_threads.push(AgentThreadConfig {
			name: "io".to_string(),
			idle_strategy: Some(IdleStrategyKind::Sleeping),
			core_id: Some(3),
		});
		assert_eq!(config.idle_strategy_for("io"), IdleStrategyKind::Sleeping);
		assert_eq!(config.idle_strategy_for("unknown"), IdleStrategyKind::BusySpin);
		assert_eq!(config.core_id_for("io"), Some(3));
		assert_eq!(config.core_id_for("unknown"), None);
	}

	#[test]
	fn deserializes_from_a_minimal_json_document() {
		let json = r#"{
			"idle_strategy": "backoff",
			"event_feeds": [
				{"name": "prices", "wrap_strategy": "broadcast-no-wrap"}
			]
		}"#;
		let config: Config = serde_json::from_str(json).unwrap();
		assert_eq!(config.idle_strategy, IdleStrategyKind::Backoff);
		assert_eq!(config.event_feeds.len(), 1);
		assert_eq!(config.event_feeds[0].slow_consumer_strategy, SlowConsumerStrategy::Backoff);
	}
}
