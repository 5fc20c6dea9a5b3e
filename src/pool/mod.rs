//! Fixed-arity worker pool with two priority lanes.
//!
//! Scheduling, resize, and the panic-recovering worker supervisor follow
//! a background-thread singleton idiom built entirely on plain
//! `std::thread` plus hand-rolled synchronization primitives, rather
//! than reaching for an async runtime.

mod global;
mod hooks;
mod task;

pub use global::{global, shutdown_all};
pub use hooks::HookHandle;
pub use task::{DebugId, Priority, ThreadContext};

use std::collections::VecDeque;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};

use hooks::Hooks;
use task::BoxTask;

use crate::cnf;

enum QueuedTask {
	Work(BoxTask, DebugId),
	/// Causes the worker that receives it to exit its loop.
	Poison,
}

struct Lanes {
	high: VecDeque<QueuedTask>,
	low: VecDeque<QueuedTask>,
}

struct Queues {
	lanes: Mutex<Lanes>,
	not_empty: Condvar,
	not_full: Condvar,
	cap: usize,
}

impl Queues {
	fn new(cap: usize) -> Self {
		Self {
			lanes: Mutex::new(Lanes { high: VecDeque::new(), low: VecDeque::new() }),
			not_empty: Condvar::new(),
			not_full: Condvar::new(),
			cap,
		}
	}

	fn push(&self, priority: Priority, item: QueuedTask) {
		let mut lanes = self.lanes.lock().expect("pool queue poisoned");
		while lanes.high.len() + lanes.low.len() >= self.cap {
			lanes = self.not_full.wait(lanes).expect("pool queue poisoned");
		}
		match priority {
			Priority::High => lanes.high.push_back(item),
			Priority::Low => lanes.low.push_back(item),
		}
		self.not_empty.notify_one();
	}

	/// Strict HIGH-over-LOW dispatch: a worker that could take either lane
	/// always takes HIGH.
	fn pop(&self) -> QueuedTask {
		let mut lanes = self.lanes.lock().expect("pool queue poisoned");
		loop {
			if let Some(t) = lanes.high.pop_front() {
				self.not_full.notify_one();
				return t;
			}
			if let Some(t) = lanes.low.pop_front() {
				self.not_full.notify_one();
				return t;
			}
			lanes = self.not_empty.wait(lanes).expect("pool queue poisoned");
		}
	}
}

/// A worker's view into the pool, passed to a custom drain loop
/// registered via [`Pool::new_fixed_ex`].
pub struct Worker<'a> {
	ctx: &'a ThreadContext,
	inner: &'a Inner,
}

/// What a worker got back from the queue.
pub enum Next {
	Task,
	Poison,
}

impl<'a> Worker<'a> {
	/// The stable per-worker context.
	pub fn ctx(&self) -> &ThreadContext {
		self.ctx
	}

	/// Pulls the next item, running it (with panic recovery and hook
	/// firing) if it's work, and reporting whether the worker should keep
	/// looping.
	pub fn recv_and_run(&self) -> Next {
		match self.inner.queues.pop() {
			QueuedTask::Poison => Next::Poison,
			QueuedTask::Work(task, debug_id) => {
				self.inner.run_one(self.ctx, task, debug_id);
				Next::Task
			}
		}
	}
}

pub type WorkerLoop = Arc<dyn Fn(Worker<'_>) + Send + Sync>;

fn default_worker_loop(worker: Worker<'_>) {
	loop {
		if let Next::Poison = worker.recv_and_run() {
			break;
		}
	}
}

struct Inner {
	name: String,
	queues: Queues,
	hooks: Hooks,
	arity: AtomicUsize,
	next_worker_id: AtomicUsize,
	workload: AtomicUsize,
	submitted: AtomicU64,
	completed: Mutex<u64>,
	drain_done: Condvar,
	worker_loop: WorkerLoop,
}

impl Inner {
	fn run_one(&self, ctx: &ThreadContext, task: BoxTask, debug_id: DebugId) {
		self.hooks.fire_start(ctx, &debug_id);
		self.workload.fetch_add(1, Ordering::SeqCst);

		let result = catch_unwind(AssertUnwindSafe(|| task(ctx)));

		self.workload.fetch_sub(1, Ordering::SeqCst);
		let panicked = result.is_err();
		if let Err(payload) = result {
			let message = panic_message(payload);
			error!(pool = %self.name, worker = ctx.worker_id(), task = %debug_id, %message, "task panicked; worker recovered");
		}
		self.hooks.fire_finish(ctx, &debug_id, panicked);

		let mut completed = self.completed.lock().expect("pool drain-fence poisoned");
		*completed += 1;
		self.drain_done.notify_all();
	}

	fn spawn_worker(self: &Arc<Self>, pool: Pool) {
		let id = self.next_worker_id.fetch_add(1, Ordering::SeqCst);
		self.arity.fetch_add(1, Ordering::SeqCst);
		let inner = Arc::clone(self);
		let name = format!("{}-{id}", self.name);
		std::thread::Builder::new()
			.name(name)
			.spawn(move || {
				let ctx = ThreadContext::new(id, pool);
				let worker = Worker { ctx: &ctx, inner: &inner };
				(inner.worker_loop.clone())(worker);
				inner.arity.fetch_sub(1, Ordering::SeqCst);
			})
			.expect("failed to spawn pool worker thread");
	}
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
	if let Some(s) = payload.downcast_ref::<&str>() {
		s.to_string()
	} else if let Some(s) = payload.downcast_ref::<String>() {
		s.clone()
	} else {
		"non-string panic payload".to_string()
	}
}

/// A fixed(-ish)-arity worker pool with HIGH/LOW priority lanes.
#[derive(Clone)]
pub struct Pool {
	inner: Arc<Inner>,
}

impl Pool {
	/// A pool named `name` with `arity` workers running the default
	/// drain loop.
	pub fn new_fixed(name: impl Into<String>, arity: usize) -> Self {
		Self::new_fixed_ex(name, arity, Arc::new(default_worker_loop))
	}

	/// Like [`Pool::new_fixed`], but workers run `worker_loop` instead of
	/// the default strict-priority drain. Useful for callers such as a
	/// single-threaded logging pool that need a custom drain loop.
	pub fn new_fixed_ex(
		name: impl Into<String>,
		arity: usize,
		worker_loop: WorkerLoop,
	) -> Self {
		let inner = Arc::new(Inner {
			name: name.into(),
			queues: Queues::new(*cnf::POOL_LANE_CAPACITY),
			hooks: Hooks::default(),
			arity: AtomicUsize::new(0),
			next_worker_id: AtomicUsize::new(0),
			workload: AtomicUsize::new(0),
			submitted: AtomicU64::new(0),
			completed: Mutex::new(0),
			drain_done: Condvar::new(),
			worker_loop,
		});
		let pool = Self { inner };
		for _ in 0..arity {
			pool.inner.spawn_worker(pool.clone());
		}
		global::register(&pool);
		pool
	}

	/// Enqueues a task; non-blocking unless the lane is at capacity.
	pub fn queue(&self, priority: Priority, debug_id: DebugId, task: impl FnOnce(&ThreadContext) + Send + 'static) {
		self.inner.submitted.fetch_add(1, Ordering::SeqCst);
		self.inner.queues.push(priority, QueuedTask::Work(Box::new(task), debug_id));
	}

	/// Blocks until all work queued at call time has executed. Implemented
	/// as a drain-fence: `join` snapshots the pool's submission count and
	/// waits until its completion counter reaches it. This is simpler
	/// than routing literal barrier tasks through each lane and stays
	/// sound regardless of how many workers happen to service either
	/// lane, which a one-barrier-per-worker scheme would not once both
	/// lanes are shared queues rather than per-worker ones.
	pub fn join(&self) {
		let target = self.inner.submitted.load(Ordering::SeqCst);
		let completed = self.inner.completed.lock().expect("pool drain-fence poisoned");
		let _guard = self
			.inner
			.drain_done
			.wait_while(completed, |completed| *completed < target)
			.expect("pool drain-fence poisoned");
	}

	/// Grows or shrinks the worker count. Growing spawns new workers
	/// immediately; shrinking sends `arity() - n` poison tokens on the
	/// low-priority lane. Running tasks always complete.
	pub fn resize(&self, n: usize) {
		let current = self.arity();
		if n > current {
			for _ in 0..(n - current) {
				self.inner.spawn_worker(self.clone());
			}
		} else if n < current {
			for _ in 0..(current - n) {
				self.inner.queues.push(Priority::Low, QueuedTask::Poison);
			}
		}
	}

	/// Current worker count.
	pub fn arity(&self) -> usize {
		self.inner.arity.load(Ordering::SeqCst)
	}

	/// Number of tasks currently executing across all workers.
	pub fn workload(&self) -> usize {
		self.inner.workload.load(Ordering::SeqCst)
	}

	/// This pool's name, as given to `new_fixed`/`new_fixed_ex`.
	pub fn name(&self) -> &str {
		&self.inner.name
	}

	/// Registers a callback fired synchronously on the worker just before
	/// a task body runs.
	pub fn on_work_start(&self, cb: impl Fn(&ThreadContext, &DebugId) + Send + Sync + 'static) -> HookHandle {
		self.inner.hooks.on_work_start(cb)
	}

	/// Registers a callback fired synchronously on the worker just after
	/// a task body returns (or panics; `panicked` reflects that).
	pub fn on_work_finished(
		&self,
		cb: impl Fn(&ThreadContext, &DebugId, bool) + Send + Sync + 'static,
	) -> HookHandle {
		self.inner.hooks.on_work_finished(cb)
	}

	/// Removes a previously registered hook.
	pub fn remove(&self, handle: HookHandle) {
		self.inner.hooks.remove(handle)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::sync::mpsc;
	use std::time::Duration;

	#[test]
	fn runs_queued_work() {
		let pool = Pool::new_fixed("test-basic", 2);
		let (tx, rx) = mpsc::channel();
		pool.queue(Priority::Low, DebugId::new("test"), move |_ctx| {
			tx.send(42).unwrap();
		});
		assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), 42);
		pool.join();
	}

	#[test]
	fn high_priority_dispatched_before_low() {
		let pool = Pool::new_fixed("test-priority", 1);
		let order = Arc::new(Mutex::new(Vec::new()));

		// Occupy the single worker so both lanes build up a backlog
		// before either is serviced.
		let (block_tx, block_rx) = mpsc::channel::<()>();
		pool.queue(Priority::Low, DebugId::new("blocker"), move |_ctx| {
			block_rx.recv().unwrap();
		});
		std::thread::sleep(Duration::from_millis(50));

		let o = order.clone();
		pool.queue(Priority::Low, DebugId::new("low"), move |_ctx| {
			o.lock().unwrap().push("low");
		});
		let o = order.clone();
		pool.queue(Priority::High, DebugId::new("high"), move |_ctx| {
			o.lock().unwrap().push("high");
		});

		block_tx.send(()).unwrap();
		pool.join();

		assert_eq!(*order.lock().unwrap(), vec!["high", "low"]);
	}

	#[test]
	fn resize_grows_and_shrinks() {
		let pool = Pool::new_fixed("test-resize", 2);
		assert_eq!(pool.arity(), 2);
		pool.resize(4);
		std::thread::sleep(Duration::from_millis(50));
		assert_eq!(pool.arity(), 4);
		pool.resize(1);
		std::thread::sleep(Duration::from_millis(50));
		assert_eq!(pool.arity(), 1);
	}

	#[test]
	fn panicking_task_does_not_kill_worker() {
		let pool = Pool::new_fixed("test-panic", 1);
		pool.queue(Priority::Low, DebugId::new("boom"), |_ctx| {
			panic!("deliberate");
		});
		pool.join();
		assert_eq!(pool.arity(), 1);

		let (tx, rx) = mpsc::channel();
		pool.queue(Priority::Low, DebugId::new("after"), move |_ctx| {
			tx.send(()).unwrap();
		});
		rx.recv_timeout(Duration::from_secs(5)).unwrap();
	}

	#[test]
	fn hooks_fire_around_task() {
		let pool = Pool::new_fixed("test-hooks", 1);
		let started = Arc::new(AtomicUsize::new(0));
		let finished = Arc::new(AtomicUsize::new(0));
		let s = started.clone();
		pool.on_work_start(move |_ctx, _id| {
			s.fetch_add(1, Ordering::SeqCst);
		});
		let f = finished.clone();
		pool.on_work_finished(move |_ctx, _id, panicked| {
			assert!(!panicked);
			f.fetch_add(1, Ordering::SeqCst);
		});
		pool.queue(Priority::Low, DebugId::new("noop"), |_ctx| {});
		pool.join();
		assert_eq!(started.load(Ordering::SeqCst), 1);
		assert_eq!(finished.load(Ordering::SeqCst), 1);
	}
}
