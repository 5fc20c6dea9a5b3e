//! Pooled fixed-size page allocator.
//!
//! A [`Recycler`] hands out [`Page`]s of a fixed stride and reclaims them
//! once the caller is done. Pages are handed back automatically when
//! dropped, which doubles as an explicit `release()`: calling
//! [`Recycler::release`] is just `drop`, named to give callers a verb
//! that reads naturally at a call site.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Weak};

use bytes::BytesMut;
use dashmap::DashMap;
use once_cell::sync::Lazy;

use crate::cnf;

struct Shared {
	stride: usize,
	cap: usize,
	free: Mutex<VecDeque<BytesMut>>,
	created: AtomicUsize,
}

impl Shared {
	fn release_raw(&self, mut buf: BytesMut) {
		// Clear ownership without zeroing content (§3 Page invariant).
		buf.resize(self.stride, 0);
		let mut free = self.free.lock().expect("recycler free-list poisoned");
		if free.len() < self.cap {
			free.push_back(buf);
		}
		// else: drop `buf`, shrinking the pool back towards its bound.
	}
}

/// A concurrent, fixed-stride page pool.
#[derive(Clone)]
pub struct Recycler {
	shared: Arc<Shared>,
}

impl Recycler {
	/// A recycler with the default LRU bound (`cnf::RECYCLER_FREE_LIST_CAP`).
	pub fn new(stride: usize) -> Self {
		Self::with_capacity(stride, *cnf::RECYCLER_FREE_LIST_CAP)
	}

	/// A recycler whose free-list never retains more than `cap` pages.
	pub fn with_capacity(stride: usize, cap: usize) -> Self {
		Self {
			shared: Arc::new(Shared {
				stride,
				cap,
				free: Mutex::new(VecDeque::with_capacity(cap.min(64))),
				created: AtomicUsize::new(0),
			}),
		}
	}

	/// The byte stride every page from this recycler carries.
	pub fn stride(&self) -> usize {
		self.shared.stride
	}

	/// Hand out a page of this recycler's stride, reusing a freed one when
	/// available. Never fails short of OS memory exhaustion (§4.1), which
	/// is handled by the allocator's own abort-on-OOM behavior.
	pub fn allocate(&self) -> Page {
		let mut free = self.shared.free.lock().expect("recycler free-list poisoned");
		let buf = match free.pop_back() {
			Some(buf) => buf,
			None => {
				self.shared.created.fetch_add(1, Ordering::Relaxed);
				let mut buf = BytesMut::with_capacity(self.shared.stride);
				buf.resize(self.shared.stride, 0);
				buf
			}
		};
		drop(free);
		trace!(stride = self.shared.stride, "recycler: page allocated");
		Page {
			buf: Some(buf),
			stride: self.shared.stride,
			origin: Arc::downgrade(&self.shared),
		}
	}

	/// Return a page to the pool. Equivalent to dropping it; spelled out
	/// as a named method so callers don't have to rely on scope-exit
	/// timing to express "I'm done with this page."
	pub fn release(&self, page: Page) {
		drop(page);
	}

	/// Current number of pages sitting in the free-list. Used by tests to
	/// verify that released pages don't leak out of the bounded pool.
	pub fn free_list_len(&self) -> usize {
		self.shared.free.lock().expect("recycler free-list poisoned").len()
	}

	/// Total number of pages ever freshly allocated (as opposed to reused)
	/// by this recycler. Observability only.
	pub fn pages_created(&self) -> usize {
		self.shared.created.load(Ordering::Relaxed)
	}

	/// True if `self` and `other` are the same recycler instance (as
	/// opposed to two different recyclers that merely share a stride).
	/// Used by the async I/O pipeline to confirm both ends of a splice
	/// agree on the same pool before transferring page ownership.
	pub fn ptr_eq(&self, other: &Recycler) -> bool {
		Arc::ptr_eq(&self.shared, &other.shared)
	}
}

/// A single fixed-stride byte buffer owned by exactly one caller at a
/// time.
pub struct Page {
	buf: Option<BytesMut>,
	stride: usize,
	origin: Weak<Shared>,
}

impl Page {
	/// The stride of this page (same as the recycler it came from).
	pub fn stride(&self) -> usize {
		self.stride
	}

	pub fn as_slice(&self) -> &[u8] {
		self.buf.as_deref().expect("page used after release")
	}

	pub fn as_mut_slice(&mut self) -> &mut [u8] {
		self.buf.as_deref_mut().expect("page used after release")
	}
}

impl std::fmt::Debug for Page {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Page").field("stride", &self.stride).finish_non_exhaustive()
	}
}

impl Drop for Page {
	fn drop(&mut self) {
		if let (Some(buf), Some(shared)) = (self.buf.take(), self.origin.upgrade()) {
			shared.release_raw(buf);
		}
	}
}

/// Picks a well-known transient recycler whose stride is the smallest one
/// that still fits `payload_len`, minimizing waste. Falls back to a
/// dedicated one-off recycler when the payload exceeds every well-known
/// stride.
pub fn for_payload(payload_len: usize) -> Recycler {
	static REGISTRY: Lazy<DashMap<usize, Recycler>> = Lazy::new(DashMap::new);

	let stride = cnf::RECYCLER_STRIDES
		.iter()
		.copied()
		.find(|&s| s >= payload_len)
		.unwrap_or_else(|| payload_len.max(1));

	REGISTRY.entry(stride).or_insert_with(|| Recycler::new(stride)).clone()
}
