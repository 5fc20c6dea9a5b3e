//! Process-wide pool registry and the default global pool: a
//! lazily-initialized, process-lifetime singleton sized to `ncpu - 1`.

use once_cell::sync::Lazy;
use std::sync::{Mutex, Weak};

use super::Pool;
use crate::cnf;

static REGISTRY: Lazy<Mutex<Vec<Weak<super::Inner>>>> = Lazy::new(|| Mutex::new(Vec::new()));

pub(super) fn register(pool: &Pool) {
	let mut registry = REGISTRY.lock().expect("pool registry poisoned");
	registry.retain(|w| w.strong_count() > 0);
	registry.push(std::sync::Arc::downgrade(&pool.inner));
}

/// The process-wide singleton pool, arity `ncpu - 1`.
pub fn global() -> Pool {
	static GLOBAL: Lazy<Pool> = Lazy::new(|| Pool::new_fixed("corekit-global", cnf::global_pool_arity()));
	GLOBAL.clone()
}

/// Resizes every still-live pool (global or named via [`Pool::new_fixed`])
/// down to zero workers and joins it, for orderly process shutdown.
pub fn shutdown_all() {
	let registry = REGISTRY.lock().expect("pool registry poisoned");
	for weak in registry.iter() {
		if let Some(inner) = weak.upgrade() {
			let pool = Pool { inner };
			pool.join();
			pool.resize(0);
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn global_pool_has_ncpu_minus_one_workers() {
		let pool = global();
		assert_eq!(pool.arity(), cnf::global_pool_arity());
	}
}
