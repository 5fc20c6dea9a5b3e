//! Observable wrappers: invoke a callback on every I/O operation with
//! `(bytes, error)`, without altering read/write semantics (spec §4.4
//! "Observable adapters"). Used for progress reporting.

use std::io::{Read, Write};

/// Wraps a [`Read`], reporting `(n, error)` for every underlying read.
pub struct ObservableReader<R, F> {
	inner: R,
	on_op: F,
}

impl<R: Read, F: FnMut(usize, Option<&std::io::Error>)> ObservableReader<R, F> {
	pub fn new(inner: R, on_op: F) -> Self {
		Self { inner, on_op }
	}

	pub fn into_inner(self) -> R {
		self.inner
	}
}

impl<R: Read, F: FnMut(usize, Option<&std::io::Error>)> Read for ObservableReader<R, F> {
	fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
		match self.inner.read(buf) {
			Ok(n) => {
				(self.on_op)(n, None);
				Ok(n)
			}
			Err(e) => {
				(self.on_op)(0, Some(&e));
				Err(e)
			}
		}
	}
}

/// Wraps a [`Write`], reporting `(n, error)` for every underlying write.
pub struct ObservableWriter<W, F> {
	inner: W,
	on_op: F,
}

impl<W: Write, F: FnMut(usize, Option<&std::io::Error>)> ObservableWriter<W, F> {
	pub fn new(inner: W, on_op: F) -> Self {
		Self { inner, on_op }
	}

	pub fn into_inner(self) -> W {
		self.inner
	}
}

impl<W: Write, F: FnMut(usize, Option<&std::io::Error>)> Write for ObservableWriter<W, F> {
	fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
		match self.inner.write(buf) {
			Ok(n) => {
				(self.on_op)(n, None);
				Ok(n)
			}
			Err(e) => {
				(self.on_op)(0, Some(&e));
				Err(e)
			}
		}
	}

	fn flush(&mut self) -> std::io::Result<()> {
		self.inner.flush()
	}
}
