//! Task identity: priority, debug labels, and the per-worker execution
//! context handed to every task body.

use std::fmt;
use std::sync::Arc;

use super::Pool;

/// A task's scheduling class. `High` strictly preempts `Low` at dispatch
/// but never interrupts a task already running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Priority {
	High,
	Low,
}

/// A human-readable label attached to a queued task for logging and
/// diagnostics: a fixed category plus an optional lazily-rendered
/// argument producer. The producer is only invoked when the label is actually
/// displayed, so it's safe to carry an expensive one on the hot path.
#[derive(Clone)]
pub struct DebugId {
	pub category: &'static str,
	arg: Option<Arc<dyn Fn() -> String + Send + Sync>>,
}

impl DebugId {
	pub fn new(category: &'static str) -> Self {
		Self { category, arg: None }
	}

	pub fn with_arg(category: &'static str, arg: impl Fn() -> String + Send + Sync + 'static) -> Self {
		Self { category, arg: Some(Arc::new(arg)) }
	}
}

impl fmt::Debug for DebugId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		fmt::Display::fmt(self, f)
	}
}

impl fmt::Display for DebugId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match &self.arg {
			Some(producer) => write!(f, "{}({})", self.category, producer()),
			None => write!(f, "{}", self.category),
		}
	}
}

/// Passed to every task body; carries the worker's stable id and a
/// back-reference to the owning pool.
#[derive(Clone)]
pub struct ThreadContext {
	id: usize,
	pool: Pool,
}

impl ThreadContext {
	pub(super) fn new(id: usize, pool: Pool) -> Self {
		Self { id, pool }
	}

	/// Stable for this worker's lifetime.
	pub fn worker_id(&self) -> usize {
		self.id
	}

	/// The pool this worker belongs to.
	pub fn pool(&self) -> &Pool {
		&self.pool
	}
}

pub(super) type BoxTask = Box<dyn FnOnce(&ThreadContext) + Send + 'static>;
