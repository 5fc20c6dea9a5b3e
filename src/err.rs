//! Crate-wide error taxonomy (spec §7).
//!
//! Transient I/O errors and schema violations are represented as distinct
//! variants rather than collapsed into a single opaque wrapper, so that
//! callers can pattern-match on the kind of failure (e.g. to know whether
//! retrying is ever useful). Programming-contract violations panic in
//! debug builds via `debug_assert!`/`unreachable!` at the call site and
//! are only represented here for the release-mode path.

#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
	/// The underlying stream returned an I/O error. Wrapped in an `Arc`
	/// so the whole taxonomy can stay `Clone` (needed for sticky
	/// first-error-wins slots and for `Future::map` to propagate a
	/// source failure unchanged into the mapped future).
	#[error("i/o error: {0}")]
	Io(std::sync::Arc<std::io::Error>),

	/// A read or write exceeded the recycler's page stride.
	#[error("payload of {len} bytes exceeds page stride {stride}")]
	OversizedPayload { len: usize, stride: usize },

	/// The type-guard validator observed a tag mismatch between writer
	/// and reader.
	#[error("type guard mismatch: expected {expected}, found {found}")]
	TagMismatch { expected: &'static str, found: String },

	/// A string atom exceeded `cnf::STRING_SANITY_LIMIT`.
	#[error("string atom of {len} bytes exceeds sanity limit {limit}")]
	StringTooLong { len: usize, limit: usize },

	/// A string back-reference pointed outside the intern table built so
	/// far in this scope.
	#[error("string intern back-reference {index} out of range (table has {len} entries)")]
	InternOutOfRange { index: usize, len: usize },

	/// An atom call was made against an archive that has already
	/// recorded an error (sticky, first-error-wins per §4.5/§7). This
	/// variant is never itself surfaced to a caller except via
	/// `Archive::error()`; it exists so the sticky slot has something to
	/// hold before the first real error occurs only in debug assertions.
	#[error("archive is closed")]
	Closed,

	/// `diff` found a divergence between the two serializables.
	#[error("diff mismatch at {path}: {old} != {new}")]
	DiffMismatch { path: String, old: String, new: String },

	/// A future was joined re-entrantly from within its own body (debug
	/// variant only triggers for the synchronous/debug future flavor).
	#[error("future join is re-entrant")]
	ReentrantJoin,

	/// The operation observed cooperative cancellation. Not a failure in
	/// the usual sense — callers that requested cancellation should treat
	/// this as expected — but it must flow through the same `Result` as
	/// other errors since the spec models it as "a sentinel non-error to
	/// callers that asked to stop" (§7).
	#[error("cancelled")]
	Cancelled,

	/// Catch-all for a worker task body that panicked; the message is the
	/// panic payload formatted as text.
	#[error("task panicked: {0}")]
	TaskPanicked(String),
}

impl Error {
	/// True for [`Error::Cancelled`], the one variant callers are expected
	/// to treat as a non-error sentinel rather than a failure.
	pub fn is_cancelled(&self) -> bool {
		matches!(self, Error::Cancelled)
	}
}

impl From<std::io::Error> for Error {
	fn from(e: std::io::Error) -> Self {
		Error::Io(std::sync::Arc::new(e))
	}
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// A first-error-wins slot shared by the archive writer/reader and the
/// async I/O pipeline (spec §4.4 "atomic slot", §4.5 "first-error-wins").
/// Cloning `Error` is what makes this a plain `Mutex` rather than needing
/// a separate render-to-string wrapper.
#[derive(Debug, Default)]
pub struct StickySlot(std::sync::Mutex<Option<Error>>);

impl StickySlot {
	pub fn new() -> Self {
		Self(std::sync::Mutex::new(None))
	}

	/// Records `err` only if the slot is still empty; later errors are
	/// dropped, preserving the first failure.
	pub fn set(&self, err: Error) {
		let mut slot = self.0.lock().expect("sticky error slot poisoned");
		if slot.is_none() {
			*slot = Some(err);
		}
	}

	pub fn get(&self) -> Option<Error> {
		self.0.lock().expect("sticky error slot poisoned").clone()
	}

	pub fn is_set(&self) -> bool {
		self.0.lock().expect("sticky error slot poisoned").is_some()
	}
}
