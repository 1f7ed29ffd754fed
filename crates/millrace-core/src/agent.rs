//! The `Agent` trait and `ComposingAgent` (C5): a cooperative worker executing a bounded
//! `do_work` on a dedicated thread, optionally hosting other sub-agents.
//!
//! Lifecycle hooks mirror a `{NEW, ACTIVE, STOPPED}` state machine for
//! composing agents and the init/start/startComplete/stop/tearDown sequence every
//! lifecycle-aware component in the engine goes through (sources, handlers, sinks,
//! services, and agents alike); default bodies are no-ops so leaf agents that don't care
//! about a phase don't have to implement it, giving every agent the same state machine
//! for free without forcing every override.

use std::sync::{
	atomic::{AtomicU8, Ordering},
	Mutex,
};

use tracing::warn;

/// A cooperative worker. `do_work` must return promptly (never block) and report the
/// amount of work performed so the hosting `AgentRunner`'s idle strategy can pace itself.
pub trait Agent: Send {
	fn do_work(&mut self) -> usize;

	fn role_name(&self) -> &str {
		"agent"
	}

	fn init(&mut self) {}
	fn start(&mut self) {}
	fn start_complete(&mut self) {}
	fn stop(&mut self) {}
	fn tear_down(&mut self) {}
}

#[repr(u8)]
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ComposingAgentState {
	New = 0,
	Active = 1,
	Stopped = 2,
}

impl From<u8> for ComposingAgentState {
	fn from(value: u8) -> Self {
		match value {
			0 => ComposingAgentState::New,
			1 => ComposingAgentState::Active,
			2 => ComposingAgentState::Stopped,
			other => panic!("invalid ComposingAgentState discriminant {other}"),
		}
	}
}

enum Mutation {
	Add(Box<dyn Agent>),
	RemoveByName(String),
}

/// Hosts many sub-agents on one OS thread. Mutations to the sub-agent set are queued and
/// applied only at the top of `do_work`, never mid-cycle, so a sub-agent is never added
/// or removed while another sub-agent's `do_work` is executing.
pub struct ComposingAgent {
	name: String,
	sub_agents: Vec<Box<dyn Agent>>,
	pending: Mutex<Vec<Mutation>>,
	state: AtomicU8,
	core_id: Option<usize>,
}

impl ComposingAgent {
	pub fn new(name: impl Into<String>) -> Self {
		ComposingAgent {
			name: name.into(),
			sub_agents: Vec::new(),
			pending: Mutex::new(Vec::new()),
			state: AtomicU8::new(ComposingAgentState::New as u8),
			core_id: None,
		}
	}

	pub fn with_core_id(mut self, core_id: usize) -> Self {
		self.core_id = Some(core_id);
		self
	}

	pub fn state(&self) -> ComposingAgentState {
		ComposingAgentState::from(self.state.load(Ordering::Acquire))
	}

	/// Queues a sub-agent for addition on the next `do_work` call.
	pub fn enqueue_add(&self, agent: Box<dyn Agent>) {
		self.pending.lock().unwrap().push(Mutation::Add(agent));
	}

	/// Queues removal (by `role_name`) for the next `do_work` call.
	pub fn enqueue_remove(&self, role_name: impl Into<String>) {
		self.pending.lock().unwrap().push(Mutation::RemoveByName(role_name.into()));
	}

	fn apply_pending(&mut self) {
		let mutations: Vec<Mutation> = std::mem::take(&mut *self.pending.lock().unwrap());
		for mutation in mutations {
			match mutation {
				Mutation::Add(mut agent) => {
					agent.init();
					if self.state() != ComposingAgentState::New {
						agent.start();
						agent.start_complete();
					}
					self.sub_agents.push(agent);
				},
				Mutation::RemoveByName(name) => {
					if let Some(pos) = self.sub_agents.iter().position(|a| a.role_name() == name) {
						let mut removed = self.sub_agents.remove(pos);
						removed.stop();
						removed.tear_down();
					}
				},
			}
		}
	}
}

impl Agent for ComposingAgent {
	fn do_work(&mut self) -> usize {
		self.apply_pending();
		self.sub_agents.iter_mut().map(|agent| agent.do_work()).sum()
	}

	fn role_name(&self) -> &str {
		&self.name
	}

	fn init(&mut self) {
		for agent in &mut self.sub_agents {
			agent.init();
		}
	}

	fn start(&mut self) {
		if let Some(core_id) = self.core_id {
			pin_current_thread_to_core(&self.name, core_id);
		}
		for agent in &mut self.sub_agents {
			agent.start();
		}
		self.state.store(ComposingAgentState::Active as u8, Ordering::Release);
	}

	fn start_complete(&mut self) {
		for agent in &mut self.sub_agents {
			agent.start_complete();
		}
	}

	fn stop(&mut self) {
		for agent in &mut self.sub_agents {
			agent.stop();
		}
	}

	fn tear_down(&mut self) {
		for agent in &mut self.sub_agents {
			agent.tear_down();
		}
		self.state.store(ComposingAgentState::Stopped as u8, Ordering::Release);
	}
}

fn pin_current_thread_to_core(group_name: &str, core_id: usize) {
	let Some(core_ids) = core_affinity::get_core_ids() else {
		warn!(group = group_name, "core enumeration unavailable, skipping pin");
		return;
	};
	match core_ids.into_iter().find(|core| core.id == core_id) {
		Some(core) => {
			if !core_affinity::set_for_current(core) {
				warn!(group = group_name, core_id, "failed to pin agent group to core, continuing unpinned");
			}
		},
		None => warn!(group = group_name, core_id, "configured core id not found, continuing unpinned"),
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	struct CountingAgent {
		name: &'static str,
		work_per_call: usize,
		started: bool,
		stopped: bool,
	}

	impl Agent for CountingAgent {
		fn do_work(&mut self) -> usize {
			self.work_per_call
		}

		fn role_name(&self) -> &str {
			self.name
		}

		fn start(&mut self) {
			self.started = true;
		}

		fn stop(&mut self) {
			self.stopped = true;
		}
	}

	#[test]
	fn sums_work_across_sub_agents() {
		let mut composing = ComposingAgent::new("group");
		composing.enqueue_add(Box::new(CountingAgent { name: "a", work_per_call: 2, started: false, stopped: false }));
		composing.enqueue_add(Box::new(CountingAgent { name: "b", work_per_call: 3, started: false, stopped: false }));
		assert_eq!(composing.do_work(), 5);
		assert_eq!(composing.do_work(), 5);
	}

	#[test]
	fn late_additions_are_started_immediately_if_group_already_active() {
		let mut composing = ComposingAgent::new("group");
		composing.start();
		assert_eq!(composing.state(), ComposingAgentState::Active);
		composing.enqueue_add(Box::new(CountingAgent { name: "late", work_per_call: 1, started: false, stopped: false }));
		composing.do_work();
		assert_eq!(composing.do_work(), 1);
	}

	#[test]
	fn removal_is_deferred_to_next_do_work_and_stops_the_agent() {
		let mut composing = ComposingAgent::new("group");
		composing.enqueue_add(Box::new(CountingAgent { name: "a", work_per_call: 1, started: false, stopped: false }));
		composing.do_work();
		composing.enqueue_remove("a");
		assert_eq!(composing.do_work(), 0);
	}

	#[test]
	fn state_transitions_new_active_stopped() {
		let mut composing = ComposingAgent::new("group");
		assert_eq!(composing.state(), ComposingAgentState::New);
		composing.start();
		assert_eq!(composing.state(), ComposingAgentState::Active);
		composing.tear_down();
		assert_eq!(composing.state(), ComposingAgentState::Stopped);
	}
}
