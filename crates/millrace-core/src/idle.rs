//! Pacing policies used by `AgentRunner` (C6) between duty cycles, resolved per agent
//! name with a global default fallback (see `Config::idle_strategy` and
//! `AgentThreadConfig::idle_strategy`).

use std::{
	hint,
	thread,
	time::Duration,
};

#[derive(Clone, Copy, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum IdleStrategyKind {
	BusySpin,
	Yielding,
	Backoff,
	Sleeping,
	NoOp,
}

/// Stateful pacing strategy: `Backoff` escalates spin → yield → park across consecutive
/// idle calls and resets as soon as real work is observed again.
#[derive(Clone, Debug)]
pub enum IdleStrategy {
	BusySpin,
	Yielding,
	Backoff { spins: u32, yields: u32, park: Duration },
	Sleeping(Duration),
	NoOp,
}

impl IdleStrategy {
	pub fn from_kind(kind: IdleStrategyKind) -> Self {
		match kind {
			IdleStrategyKind::BusySpin => IdleStrategy::BusySpin,
			IdleStrategyKind::Yielding => IdleStrategy::Yielding,
			IdleStrategyKind::Backoff => IdleStrategy::backoff_default(),
			IdleStrategyKind::Sleeping => IdleStrategy::Sleeping(Duration::from_millis(1)),
			IdleStrategyKind::NoOp => IdleStrategy::NoOp,
		}
	}

	pub fn backoff_default() -> Self {
		IdleStrategy::Backoff { spins: 100, yields: 100, park: Duration::from_micros(100) }
	}

	/// Called once per duty cycle with the amount of work just performed. `idle_streak`
	/// is the number of consecutive calls (including this one) that observed zero work;
	/// callers own this counter so the strategy itself stays stateless and `Clone`.
	pub fn idle(&self, work_count: usize, idle_streak: u32) {
		if work_count > 0 {
			return;
		}
		match self {
			IdleStrategy::BusySpin => hint::spin_loop(),
			IdleStrategy::Yielding => thread::yield_now(),
			IdleStrategy::Backoff { spins, yields, park } => {
				if idle_streak < *spins {
					hint::spin_loop();
				} else if idle_streak < *spins + *yields {
					thread::yield_now();
				} else {
					thread::sleep(*park);
				}
			},
			IdleStrategy::Sleeping(duration) => thread::sleep(*duration),
			IdleStrategy::NoOp => {},
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn busy_spin_never_sleeps_and_returns_immediately_on_work() {
		let strategy = IdleStrategy::BusySpin;
		let start = std::time::Instant::now();
		strategy.idle(1, 0);
		assert!(start.elapsed() < Duration::from_millis(1));
	}

	#[test]
	fn from_kind_maps_every_variant() {
		assert!(matches!(IdleStrategy::from_kind(IdleStrategyKind::NoOp), IdleStrategy::NoOp));
		assert!(matches!(
			IdleStrategy::from_kind(IdleStrategyKind::Sleeping),
			IdleStrategy::Sleeping(_)
		));
	}
}
