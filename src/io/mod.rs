//! Chunked asynchronous I/O pipeline: a read-ahead [`AsyncReader`] and
//! write-behind [`AsyncWriter`] over pages drawn from [`crate::recycler`],
//! with a zero-copy splice path when both ends share a recycler (spec
//! §4.4).

mod block;
mod observable;
mod reader;
mod writer;

pub use observable::{ObservableReader, ObservableWriter};
pub use reader::AsyncReader;
pub use writer::AsyncWriter;

use std::io::{Read, Write};

use crate::err::Result;
use crate::pool::{Pool, Priority};
use crate::recycler::Recycler;

/// Compile-time capability marker deciding whether a stream type
/// benefits from read-ahead/write-behind wrapping (spec §4.4 "Selective
/// wrapping"). The spec describes this as the runtime collaborator
/// "inspecting" the stream; per §9's preference for capability traits
/// over reflection, this crate resolves the question at the type level
/// instead — files and compression streams opt in, in-memory buffers
/// default to passthrough.
pub trait AsyncIoHint {
	/// Whether wrapping this stream in async I/O is worth the
	/// thread-pool indirection. Defaults to `false`.
	fn prefers_async_io() -> bool {
		false
	}
}

impl AsyncIoHint for std::fs::File {
	fn prefers_async_io() -> bool {
		true
	}
}

impl<T> AsyncIoHint for std::io::Cursor<T> {}
impl AsyncIoHint for &[u8] {}

/// Either a wrapped [`AsyncReader`] or the stream passed straight
/// through, decided once at construction by [`wrap_reader_if_helpful`].
pub enum SelectiveReader<R> {
	Async(AsyncReader),
	Direct(R),
}

impl<R: Read> SelectiveReader<R> {
	pub fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
		match self {
			SelectiveReader::Async(r) => r.read(buf),
			SelectiveReader::Direct(r) => r.read(buf).map_err(crate::err::Error::from),
		}
	}
}

/// Wraps `source` in an [`AsyncReader`] only if `R::prefers_async_io()`
/// says it would help; otherwise returns it untouched (spec §4.4
/// "Selective wrapping").
pub fn wrap_reader_if_helpful<R: Read + Send + 'static + AsyncIoHint>(
	pool: &Pool,
	priority: Priority,
	recycler: Recycler,
	source: R,
) -> SelectiveReader<R> {
	if R::prefers_async_io() {
		SelectiveReader::Async(AsyncReader::wrap(pool, priority, recycler, source))
	} else {
		SelectiveReader::Direct(source)
	}
}

/// Either a wrapped [`AsyncWriter`] or the stream passed straight
/// through, the write-side mirror of [`SelectiveReader`].
pub enum SelectiveWriter<W> {
	Async(AsyncWriter),
	Direct(W),
}

impl<W: Write> SelectiveWriter<W> {
	pub fn write(&mut self, buf: &[u8]) -> Result<usize> {
		match self {
			SelectiveWriter::Async(w) => w.write(buf),
			SelectiveWriter::Direct(w) => w.write(buf).map_err(crate::err::Error::from),
		}
	}
}

/// Wraps `sink` in an [`AsyncWriter`] only if `W::prefers_async_io()`
/// says it would help; otherwise returns it untouched.
pub fn wrap_writer_if_helpful<W: Write + Send + 'static + AsyncIoHint>(
	pool: &Pool,
	priority: Priority,
	recycler: Recycler,
	sink: W,
) -> SelectiveWriter<W> {
	if W::prefers_async_io() {
		SelectiveWriter::Async(AsyncWriter::wrap(pool, priority, recycler, sink))
	} else {
		SelectiveWriter::Direct(sink)
	}
}
