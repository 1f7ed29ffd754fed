//! Prometheus registration helpers.
//!
//! The engine exposes plain counters and gauges (queue depth, drop counts, pool
//! occupancy, retry/error counts) rather than labeled `*Vec<N>` wrappers; millrace has
//! no per-tenant/per-route label dimension to carry, so a flat metric per component
//! instance is enough.

pub use prometheus::{Histogram, HistogramTimer, IntCounter, IntGauge};
use prometheus::{Encoder, HistogramOpts, Opts, TextEncoder};

const NAMESPACE: &str = "millrace";

pub fn new_counter(name: &str, description: &str) -> IntCounter {
	let opts = Opts::new(name, description).namespace(NAMESPACE);
	let counter = IntCounter::with_opts(opts).expect("failed to create counter");
	prometheus::register(Box::new(counter.clone())).expect("failed to register counter");
	counter
}

pub fn new_gauge(name: &str, description: &str) -> IntGauge {
	let opts = Opts::new(name, description).namespace(NAMESPACE);
	let gauge = IntGauge::with_opts(opts).expect("failed to create gauge");
	prometheus::register(Box::new(gauge.clone())).expect("failed to register gauge");
	gauge
}

pub fn new_histogram(name: &str, description: &str) -> Histogram {
	let opts = HistogramOpts::new(name, description).namespace(NAMESPACE);
	let histogram = Histogram::with_opts(opts).expect("failed to create histogram");
	prometheus::register(Box::new(histogram.clone())).expect("failed to register histogram");
	histogram
}

/// RAII occupancy tracking: increments on creation, decrements on drop. Used by the
/// object pool (C9) to track borrowed-vs-idle counts and by the agent runner (C6) to
/// track currently-active sub-agents.
pub struct GaugeGuard(IntGauge);

impl GaugeGuard {
	pub fn from_gauge(gauge: IntGauge) -> Self {
		gauge.inc();
		Self(gauge)
	}
}

impl Drop for GaugeGuard {
	fn drop(&mut self) {
		self.0.dec();
	}
}

/// Renders all registered metrics in the Prometheus text exposition format. millrace has
/// no HTTP endpoint of its own; embedding applications serve this however they serve the
/// rest of their metrics.
pub fn metrics_text_payload() -> String {
	let metric_families = prometheus::gather();
	let mut buffer = Vec::new();
	let encoder = TextEncoder::new();
	encoder.encode(&metric_families, &mut buffer).expect("prometheus text encoding cannot fail");
	String::from_utf8_lossy(&buffer).to_string()
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn gauge_guard_tracks_occupancy() {
		let gauge = new_gauge("gauge_guard_tracks_occupancy", "test gauge");
		assert_eq!(gauge.get(), 0);
		{
			let _guard = GaugeGuard::from_gauge(gauge.clone());
			assert_eq!(gauge.get(), 1);
		}
		assert_eq!(gauge.get(), 0);
	}
}
