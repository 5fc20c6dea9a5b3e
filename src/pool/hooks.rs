//! `on-work-start` / `on-work-finished` event hooks. Handler lists are
//! read far more often than written, so they're stored behind a
//! read-write lock rather than a plain mutex.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use super::task::{DebugId, ThreadContext};

pub type StartHook = Arc<dyn Fn(&ThreadContext, &DebugId) + Send + Sync>;
pub type FinishHook = Arc<dyn Fn(&ThreadContext, &DebugId, bool) + Send + Sync>;

/// An opaque handle returned from registering a hook; pass it to
/// [`Hooks::remove`] to unregister.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HookHandle(u64);

struct Slot<H> {
	id: u64,
	hook: H,
}

#[derive(Default)]
pub(super) struct Hooks {
	next_id: AtomicU64,
	start: RwLock<Vec<Slot<StartHook>>>,
	finish: RwLock<Vec<Slot<FinishHook>>>,
}

impl Hooks {
	fn next(&self) -> u64 {
		self.next_id.fetch_add(1, Ordering::Relaxed)
	}

	pub fn on_work_start(&self, cb: impl Fn(&ThreadContext, &DebugId) + Send + Sync + 'static) -> HookHandle {
		let id = self.next();
		self.start.write().expect("hooks lock poisoned").push(Slot { id, hook: Arc::new(cb) });
		HookHandle(id)
	}

	pub fn on_work_finished(
		&self,
		cb: impl Fn(&ThreadContext, &DebugId, bool) + Send + Sync + 'static,
	) -> HookHandle {
		let id = self.next();
		self.finish.write().expect("hooks lock poisoned").push(Slot { id, hook: Arc::new(cb) });
		HookHandle(id)
	}

	/// Removes a previously registered hook, from either list. No-op if
	/// already removed.
	pub fn remove(&self, handle: HookHandle) {
		self.start.write().expect("hooks lock poisoned").retain(|s| s.id != handle.0);
		self.finish.write().expect("hooks lock poisoned").retain(|s| s.id != handle.0);
	}

	pub fn fire_start(&self, ctx: &ThreadContext, debug_id: &DebugId) {
		for slot in self.start.read().expect("hooks lock poisoned").iter() {
			(slot.hook)(ctx, debug_id);
		}
	}

	pub fn fire_finish(&self, ctx: &ThreadContext, debug_id: &DebugId, panicked: bool) {
		for slot in self.finish.read().expect("hooks lock poisoned").iter() {
			(slot.hook)(ctx, debug_id, panicked);
		}
	}
}
