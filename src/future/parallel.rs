//! Parallel combinators over [`Future`]s and plain functions (spec §4.3
//! "Parallel combinators"). Each combinator comes in a *sync* flavor
//! (sequential, no extra threads) and an *async* flavor (one thread per
//! item via `std::thread::scope`, which plays the role the spec assigns
//! to a wait-group / multi-channel select without requiring an async
//! runtime or a select! macro).
//!
//! Single-element calls shortcut to a direct invocation in every
//! combinator, skipping the sequencing or thread-spawning machinery
//! entirely (spec §4.3).

use std::sync::Mutex;

use super::{Future, Outcome};
use crate::err::Error;

/// The first error among a set of outcomes, in positional order.
pub fn first_error<T>(outcomes: &[Outcome<T>]) -> Option<&Error> {
	outcomes.iter().find_map(|o| o.get().1)
}

/// Joins every future in `futures` sequentially, in index order,
/// reporting each result via `on_result` as it resolves. Every failure is
/// reported through the callback; the return value is the *last* error
/// observed, since sync `join` surfaces every failure through the
/// per-item callback rather than only the first (spec §4.3).
pub fn parallel_join_sync<T>(
	futures: &[Future<T>],
	mut on_result: impl FnMut(usize, &Outcome<T>),
) -> Option<Error> {
	if let [only] = futures {
		let outcome = only.join();
		on_result(0, outcome);
		return outcome.get().1.cloned();
	}
	let mut last_error = None;
	for (i, f) in futures.iter().enumerate() {
		let outcome = f.join();
		if let Some(e) = outcome.get().1 {
			last_error = Some(e.clone());
		}
		on_result(i, outcome);
	}
	last_error
}

/// Joins every future in `futures` concurrently (one waiting thread per
/// future), reporting each result via `on_result` in completion order
/// rather than index order — the stand-in for a multi-channel select
/// (spec §4.3). Returns the first error observed.
pub fn parallel_join_async<T: Send + Sync + 'static>(
	futures: &[Future<T>],
	on_result: impl Fn(usize, &Outcome<T>) + Send + Sync,
) -> Option<Error> {
	if let [only] = futures {
		let outcome = only.join();
		on_result(0, outcome);
		return outcome.get().1.cloned();
	}
	let first_error: Mutex<Option<Error>> = Mutex::new(None);
	std::thread::scope(|scope| {
		for (i, f) in futures.iter().enumerate() {
			let on_result = &on_result;
			let first_error = &first_error;
			scope.spawn(move || {
				let outcome = f.join();
				if let Some(e) = outcome.get().1 {
					let mut slot = first_error.lock().expect("parallel-join error slot poisoned");
					if slot.is_none() {
						*slot = Some(e.clone());
					}
				}
				on_result(i, outcome);
			});
		}
	});
	first_error.into_inner().expect("parallel-join error slot poisoned")
}

/// Calls `f(i)` for every `i` in `0..n`, sequentially, stopping at the
/// first error (spec §4.3).
pub fn parallel_range_sync(n: usize, mut f: impl FnMut(usize) -> Outcome<()>) -> Option<Error> {
	if n == 1 {
		return f(0).get().1.cloned();
	}
	for i in 0..n {
		if let Some(e) = f(i).get().1 {
			return Some(e.clone());
		}
	}
	None
}

/// Calls `f(i)` for every `i` in `0..n` on its own thread, all launched
/// up front (no short-circuit once dispatched), keeping only the first
/// error observed across all of them (spec §4.3 "wait-group +
/// compare-and-swap(first-error)").
pub fn parallel_range_async(n: usize, f: impl Fn(usize) -> Outcome<()> + Send + Sync) -> Option<Error> {
	if n == 1 {
		return f(0).get().1.cloned();
	}
	let first_error: Mutex<Option<Error>> = Mutex::new(None);
	std::thread::scope(|scope| {
		for i in 0..n {
			let f = &f;
			let first_error = &first_error;
			scope.spawn(move || {
				if let Some(e) = f(i).get().1 {
					let mut slot = first_error.lock().expect("parallel-range error slot poisoned");
					if slot.is_none() {
						*slot = Some(e.clone());
					}
				}
			});
		}
	});
	first_error.into_inner().expect("parallel-range error slot poisoned")
}

/// Maps every item in `items` sequentially through `f`, collecting every
/// outcome (no short-circuit — a mapped output is expected for every
/// input) (spec §4.3).
pub fn parallel_map_sync<A, B>(items: &[A], mut f: impl FnMut(&A) -> Outcome<B>) -> Vec<Outcome<B>> {
	if let [only] = items {
		return vec![f(only)];
	}
	items.iter().map(&mut f).collect()
}

/// Maps every item in `items` through `f` concurrently, one thread per
/// item, preserving input order in the returned vector (spec §4.3
/// "wait-group + compare-and-swap(first-error)").
pub fn parallel_map_async<A: Sync, B: Send>(
	items: &[A],
	f: impl Fn(&A) -> Outcome<B> + Send + Sync,
) -> Vec<Outcome<B>> {
	if let [only] = items {
		return vec![f(only)];
	}
	let slots: Vec<Mutex<Option<Outcome<B>>>> = (0..items.len()).map(|_| Mutex::new(None)).collect();
	std::thread::scope(|scope| {
		for (i, item) in items.iter().enumerate() {
			let f = &f;
			let slot = &slots[i];
			scope.spawn(move || {
				*slot.lock().expect("parallel-map slot poisoned") = Some(f(item));
			});
		}
	});
	slots
		.into_iter()
		.map(|m| m.into_inner().expect("parallel-map slot poisoned").expect("every slot filled by its worker"))
		.collect()
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn range_sync_short_circuits() {
		let seen = Mutex::new(Vec::new());
		let err = parallel_range_sync(5, |i| {
			seen.lock().unwrap().push(i);
			if i == 2 {
				Outcome::failure(Error::Cancelled)
			} else {
				Outcome::success(())
			}
		});
		assert!(err.unwrap().is_cancelled());
		assert_eq!(*seen.lock().unwrap(), vec![0, 1, 2]);
	}

	#[test]
	fn range_async_runs_everything_keeps_first_error() {
		let err = parallel_range_async(8, |i| {
			if i % 2 == 0 {
				Outcome::failure(Error::Cancelled)
			} else {
				Outcome::success(())
			}
		});
		assert!(err.unwrap().is_cancelled());
	}

	#[test]
	fn map_sync_preserves_order() {
		let items = [1, 2, 3, 4];
		let out = parallel_map_sync(&items, |i| Outcome::success(i * 10));
		let values: Vec<i32> = out.into_iter().map(|o| o.unwrap_success()).collect();
		assert_eq!(values, vec![10, 20, 30, 40]);
	}

	#[test]
	fn map_async_preserves_order() {
		let items = [1, 2, 3, 4, 5];
		let out = parallel_map_async(&items, |i| Outcome::success(i * 2));
		let values: Vec<i32> = out.into_iter().map(|o| o.unwrap_success()).collect();
		assert_eq!(values, vec![2, 4, 6, 8, 10]);
	}

	#[test]
	fn join_sync_reports_in_index_order() {
		let futures = vec![
			Future::literal(Outcome::success(1)),
			Future::literal(Outcome::failure(Error::Cancelled)),
			Future::literal(Outcome::success(3)),
		];
		let seen = Mutex::new(Vec::new());
		let last = parallel_join_sync(&futures, |i, _outcome| {
			seen.lock().unwrap().push(i);
		});
		assert_eq!(*seen.lock().unwrap(), vec![0, 1, 2]);
		assert!(last.unwrap().is_cancelled());
	}

	#[test]
	fn single_element_shortcuts() {
		let futures = vec![Future::literal(Outcome::success(7))];
		let mut seen = None;
		parallel_join_sync(&futures, |i, outcome| seen = Some((i, *outcome.get().0.unwrap())));
		assert_eq!(seen, Some((0, 7)));
	}
}
