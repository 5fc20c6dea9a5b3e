//! Write-once futures and parallel combinators.
//!
//! Built on the same "plain `std::thread`, no async runtime" texture as
//! [`crate::pool`]: the *async (goroutine)* constructor spawns a
//! worker-independent OS thread, and the *pool-scheduled* constructor
//! rides on [`crate::pool::Pool`].

mod outcome;
pub mod parallel;

pub use outcome::Outcome;

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Condvar, Mutex, OnceLock};

use crate::err::Error;
use crate::pool::{DebugId, Pool, Priority, ThreadContext};

/// A completion signal shared by every `Future::literal` (already
/// resolved, so there is never anything to wait for) to avoid allocating
/// a fresh one per literal future.
fn already_done_signal() -> &'static (Mutex<bool>, Condvar) {
	static SIGNAL: OnceLock<(Mutex<bool>, Condvar)> = OnceLock::new();
	SIGNAL.get_or_init(|| (Mutex::new(true), Condvar::new()))
}

enum Signal {
	Shared(&'static (Mutex<bool>, Condvar)),
	Owned(Arc<(Mutex<bool>, Condvar)>),
}

impl Signal {
	fn owned() -> Self {
		Signal::Owned(Arc::new((Mutex::new(false), Condvar::new())))
	}

	fn pair(&self) -> &(Mutex<bool>, Condvar) {
		match self {
			Signal::Shared(p) => p,
			Signal::Owned(p) => p,
		}
	}

	fn wait(&self) {
		let (lock, cvar) = self.pair();
		let done = lock.lock().expect("future signal poisoned");
		let _guard = cvar.wait_while(done, |done| !*done).expect("future signal poisoned");
	}

	fn signal(&self) {
		let (lock, cvar) = self.pair();
		*lock.lock().expect("future signal poisoned") = true;
		cvar.notify_all();
	}

	fn is_complete(&self) -> bool {
		*self.pair().0.lock().expect("future signal poisoned")
	}
}

type Body<T> = Box<dyn FnOnce() -> Outcome<T> + Send>;

struct Inner<T> {
	signal: Signal,
	slot: OnceLock<Outcome<T>>,
	/// `Some` only for the lazy (debug/synchronous) construction; taken
	/// and run on the first `join`.
	body: Mutex<Option<Body<T>>>,
	/// The thread currently running `body`, if any; lets a recursive
	/// `join` from within the body itself be told apart from a different
	/// thread legitimately waiting on the same future.
	running: Mutex<Option<std::thread::ThreadId>>,
	/// Captured only for the lazy variant, to name both endpoints of a
	/// re-entrant join in its panic message.
	created_at: Option<std::backtrace::Backtrace>,
}

fn run_catching<T>(body: impl FnOnce() -> Outcome<T>) -> Outcome<T> {
	match catch_unwind(AssertUnwindSafe(body)) {
		Ok(outcome) => outcome,
		Err(payload) => {
			let message = payload
				.downcast_ref::<&str>()
				.map(|s| s.to_string())
				.or_else(|| payload.downcast_ref::<String>().cloned())
				.unwrap_or_else(|| "non-string panic payload".to_string());
			Outcome::failure(Error::TaskPanicked(message))
		}
	}
}

/// A write-once cell resolving to an [`Outcome<T>`].
pub struct Future<T> {
	inner: Arc<Inner<T>>,
}

impl<T> Clone for Future<T> {
	fn clone(&self) -> Self {
		Self { inner: Arc::clone(&self.inner) }
	}
}

impl<T: Send + Sync + 'static> Future<T> {
	/// Already resolved at construction; its completion signal is a
	/// shared, pre-signaled static so literal futures never allocate one.
	pub fn literal(outcome: Outcome<T>) -> Self {
		let slot = OnceLock::new();
		let _ = slot.set(outcome);
		Self {
			inner: Arc::new(Inner {
				signal: Signal::Shared(already_done_signal()),
				slot,
				body: Mutex::new(None),
				running: Mutex::new(None),
				created_at: None,
			}),
		}
	}

	/// Launches `body` on a new, worker-independent OS thread.
	pub fn spawn_async(body: impl FnOnce() -> Outcome<T> + Send + 'static) -> Self {
		let inner = Arc::new(Inner {
			signal: Signal::owned(),
			slot: OnceLock::new(),
			body: Mutex::new(None),
			running: Mutex::new(None),
			created_at: None,
		});
		let bg = Arc::clone(&inner);
		std::thread::Builder::new()
			.name("corekit-future".into())
			.spawn(move || {
				let outcome = run_catching(body);
				let _ = bg.slot.set(outcome);
				bg.signal.signal();
			})
			.expect("failed to spawn future thread");
		Self { inner }
	}

	/// Enqueues `body` onto `pool`; the future completes when it returns.
	pub fn scheduled(
		pool: &Pool,
		priority: Priority,
		debug_id: DebugId,
		body: impl FnOnce() -> Outcome<T> + Send + 'static,
	) -> Self {
		let inner = Arc::new(Inner {
			signal: Signal::owned(),
			slot: OnceLock::new(),
			body: Mutex::new(None),
			running: Mutex::new(None),
			created_at: None,
		});
		let bg = Arc::clone(&inner);
		pool.queue(priority, debug_id, move |_ctx: &ThreadContext| {
			let outcome = run_catching(body);
			let _ = bg.slot.set(outcome);
			bg.signal.signal();
		});
		Self { inner }
	}

	/// Runs `body` on the first call to `join`, on the joining thread.
	/// Guards against a re-entrant join (the body joining its own
	/// future) and, in debug builds, captures both the future's creation
	/// and the re-entrant join's backtrace for the panic message.
	pub fn debug(body: impl FnOnce() -> Outcome<T> + Send + 'static) -> Self {
		Self {
			inner: Arc::new(Inner {
				signal: Signal::owned(),
				slot: OnceLock::new(),
				body: Mutex::new(Some(Box::new(body))),
				running: Mutex::new(None),
				created_at: Some(std::backtrace::Backtrace::capture()),
			}),
		}
	}

	fn drive(&self) {
		if self.inner.slot.get().is_some() {
			return;
		}

		// Eager futures (literal/async/pool-scheduled) have no lazy body;
		// they're driven by whoever constructed them, so `drive` just
		// waits for that to finish.
		if self.inner.body.lock().expect("future body lock poisoned").is_none() {
			self.inner.signal.wait();
			return;
		}

		let here = std::thread::current().id();
		{
			let mut running = self.inner.running.lock().expect("future running-guard poisoned");
			match *running {
				Some(id) if id == here => {
					drop(running);
					if cfg!(debug_assertions) {
						panic!(
							"future joined re-entrantly from within its own body\ncreated at:\n{}\nre-entered at:\n{}",
							self.inner.created_at.as_ref().map(ToString::to_string).unwrap_or_default(),
							std::backtrace::Backtrace::capture()
						);
					}
					let _ = self.inner.slot.set(Outcome::failure(Error::ReentrantJoin));
					self.inner.signal.signal();
					return;
				}
				Some(_other) => {
					// A different thread is already driving this future;
					// wait for it rather than racing to take the body.
					drop(running);
					self.inner.signal.wait();
					return;
				}
				None => *running = Some(here),
			}
		}

		let Some(body) = self.inner.body.lock().expect("future body lock poisoned").take() else {
			// Lost the race to another thread between the checks above;
			// it will drive the future, so just wait.
			self.inner.signal.wait();
			return;
		};
		let outcome = run_catching(body);
		let _ = self.inner.slot.set(outcome);
		self.inner.signal.signal();
		*self.inner.running.lock().expect("future running-guard poisoned") = None;
	}

	/// Blocks until resolved, returning the stored outcome.
	pub fn join(&self) -> &Outcome<T> {
		self.drive();
		self.inner.slot.get().expect("future signaled complete without a stored outcome")
	}

	pub fn is_complete(&self) -> bool {
		self.inner.slot.get().is_some() || self.inner.signal.is_complete()
	}

	/// `f` runs against the resolved success value by reference; failure
	/// propagates unchanged. The transform itself only
	/// runs once, on the first `join` of the returned future — reusing
	/// the same lazy, write-once machinery as [`Future::debug`] — so a
	/// mapped future is safe to `join` repeatedly without re-invoking
	/// `f`.
	pub fn map<U: Send + Sync + 'static>(
		&self,
		f: impl FnOnce(&T) -> Outcome<U> + Send + 'static,
	) -> Future<U> {
		let source = self.clone();
		Future::debug(move || match source.join().get() {
			(Some(value), None) => f(value),
			(None, Some(error)) => Outcome::failure(error.clone()),
			_ => unreachable!("Outcome always holds exactly one of a value or an error"),
		})
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::sync::atomic::{AtomicUsize, Ordering};

	#[test]
	fn literal_is_already_complete() {
		let f = Future::literal(Outcome::success(5));
		assert!(f.is_complete());
		assert_eq!(f.join().get().0.copied(), Some(5));
	}

	#[test]
	fn spawn_async_runs_on_its_own_thread() {
		let f = Future::spawn_async(|| Outcome::success(1 + 1));
		assert_eq!(*f.join().get().0.unwrap(), 2);
	}

	#[test]
	fn scheduled_runs_on_pool() {
		let pool = Pool::new_fixed("test-future-pool", 2);
		let f = Future::scheduled(&pool, Priority::Low, DebugId::new("test"), || Outcome::success(42));
		assert_eq!(*f.join().get().0.unwrap(), 42);
	}

	#[test]
	fn debug_future_runs_lazily_once() {
		let runs = Arc::new(AtomicUsize::new(0));
		let r = runs.clone();
		let f = Future::debug(move || {
			r.fetch_add(1, Ordering::SeqCst);
			Outcome::success(9)
		});
		assert_eq!(runs.load(Ordering::SeqCst), 0);
		f.join();
		f.join();
		f.join();
		assert_eq!(runs.load(Ordering::SeqCst), 1);
	}

	#[test]
	fn map_propagates_failure_unchanged() {
		let f: Future<i32> = Future::literal(Outcome::failure(Error::Cancelled));
		let mapped = f.map(|v| Outcome::success(v * 2));
		assert!(mapped.join().get().1.unwrap().is_cancelled());
	}

	#[test]
	fn map_memoizes_transform() {
		let calls = Arc::new(AtomicUsize::new(0));
		let c = calls.clone();
		let f = Future::literal(Outcome::success(10));
		let mapped = f.map(move |v| {
			c.fetch_add(1, Ordering::SeqCst);
			Outcome::success(v + 1)
		});
		mapped.join();
		mapped.join();
		assert_eq!(calls.load(Ordering::SeqCst), 1);
		assert_eq!(*mapped.join().get().0.unwrap(), 11);
	}
}
