//! ServiceRegistry & Injector (C10).
//!
//! Reflective, annotation-scanning dependency injection has no Rust equivalent, so
//! instead this module exposes a `Dependencies` descriptor trait below: a handler/source/sink/service that needs
//! collaborators implements `inject`, and the `LifecycleOrchestrator` (C7) calls it once
//! at construction time with the registry, in place of annotation scanning. Lookup by
//! declared interface becomes lookup by concrete Rust type, backed by
//! `millrace_common::TypeMap`'s idiom extended here to hold more than one named instance
//! per type.

use std::{
	any::{Any, TypeId},
	collections::HashMap,
	sync::{Arc, Mutex},
};

use crate::errors::EngineError;

/// Implemented by anything the registry can resolve dependencies into. Construction
/// sites call `inject` exactly once; the default implementation does nothing, matching
/// handlers/sources/sinks that declare no dependencies.
pub trait Dependencies {
	fn inject(&mut self, registry: &ServiceRegistry) {
		let _ = registry;
	}
}

#[derive(Default)]
struct Inner {
	by_name: HashMap<String, Arc<dyn Any + Send + Sync>>,
	by_type: HashMap<TypeId, Vec<String>>,
}

/// Named service lookup plus type-keyed "declared interface" lookup. Registration is
/// idempotent per name; a duplicate name fails with `ServiceAlreadyRegistered`.
#[derive(Default, Clone)]
pub struct ServiceRegistry {
	inner: Arc<Mutex<Inner>>,
}

impl ServiceRegistry {
	pub fn register<T: Any + Send + Sync>(
		&self,
		name: impl Into<String>,
		service: Arc<T>,
	) -> Result<(), EngineError> {
		let name = name.into();
		let mut inner = self.inner.lock().unwrap();
		if inner.by_name.contains_key(&name) {
			return Err(EngineError::ServiceAlreadyRegistered(name));
		}
		inner.by_name.insert(name.clone(), service as Arc<dyn Any + Send + Sync>);
		inner.by_type.entry(TypeId::of::<T>()).or_default().push(name);
		Ok(())
	}

	pub fn get<T: Any + Send + Sync>(&self, name: &str) -> Option<Arc<T>> {
		let inner = self.inner.lock().unwrap();
		inner.by_name.get(name).and_then(|service| service.clone().downcast::<T>().ok())
	}

	/// All services registered under the concrete type `T`, in registration order;
	/// the Rust-native stand-in for "services whose declared interface is assignable to
	/// the parameter type".
	pub fn all_of<T: Any + Send + Sync>(&self) -> Vec<Arc<T>> {
		let inner = self.inner.lock().unwrap();
		let Some(names) = inner.by_type.get(&TypeId::of::<T>()) else {
			return Vec::new();
		};
		names
			.iter()
			.filter_map(|name| inner.by_name.get(name).and_then(|service| service.clone().downcast::<T>().ok()))
			.collect()
	}

	pub fn contains(&self, name: &str) -> bool {
		self.inner.lock().unwrap().by_name.contains_key(name)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	struct Clock;
	struct OtherClock;

	#[test]
	fn register_then_get_round_trips() {
		let registry = ServiceRegistry::default();
		registry.register("clock", Arc::new(Clock)).unwrap();
		assert!(registry.get::<Clock>("clock").is_some());
		assert!(registry.get::<OtherClock>("clock").is_none());
	}

	#[test]
	fn duplicate_name_fails() {
		let registry = ServiceRegistry::default();
		registry.register("clock", Arc::new(Clock)).unwrap();
		let err = registry.register("clock", Arc::new(Clock)).unwrap_err();
		assert!(matches!(err, EngineError::ServiceAlreadyRegistered(name) if name == "clock"));
	}

	#[test]
	fn all_of_collects_every_instance_of_a_type_in_order() {
		let registry = ServiceRegistry::default();
		registry.register("a", Arc::new(Clock)).unwrap();
		registry.register("b", Arc::new(Clock)).unwrap();
		assert_eq!(registry.all_of::<Clock>().len(), 2);
		assert!(registry.all_of::<OtherClock>().is_empty());
	}

	#[derive(Default)]
	struct Injected {
		clock_present: bool,
	}

	impl Dependencies for Injected {
		fn inject(&mut self, registry: &ServiceRegistry) {
			self.clock_present = registry.get::<Clock>("clock").is_some();
		}
	}

	#[test]
	fn dependencies_default_inject_is_a_no_op() {
		struct Bare;
		impl Dependencies for Bare {}
		let registry = ServiceRegistry::default();
		let mut bare = Bare;
		bare.inject(&registry);
	}

	#[test]
	fn dependencies_inject_resolves_registered_services() {
		let registry = ServiceRegistry::default();
		registry.register("clock", Arc::new(Clock)).unwrap();
		let mut target = Injected::default();
		target.inject(&registry);
		assert!(target.clock_present);
	}
}
