//! Write-behind writer: accumulates writes into a held page and hands
//! full (or oversized) blocks off to a dedicated pool task, so the
//! caller's thread never blocks on the underlying sink except when the
//! channel to that task is momentarily full (spec §4.4 "AsyncWriter").

use std::io::Write;
use std::sync::{Arc, Condvar, Mutex};

use crate::cnf;
use crate::err::{Error, Result, StickySlot};
use crate::pool::{DebugId, Pool, Priority};
use crate::recycler::{Page, Recycler};

use super::block::{AsyncBlock, Delivery};

struct Held {
	page: Page,
	off: usize,
}

struct Done {
	lock: Mutex<bool>,
	cvar: Condvar,
}

impl Done {
	fn new() -> Self {
		Self { lock: Mutex::new(false), cvar: Condvar::new() }
	}

	fn signal(&self) {
		*self.lock.lock().expect("writer done-signal poisoned") = true;
		self.cvar.notify_all();
	}

	fn wait(&self) {
		let done = self.lock.lock().expect("writer done-signal poisoned");
		let _guard = self.cvar.wait_while(done, |done| !*done).expect("writer done-signal poisoned");
	}
}

/// Buffers writes into recycled pages and flushes full ones to the
/// underlying sink on a dedicated pool task.
pub struct AsyncWriter {
	recycler: Recycler,
	sender: Mutex<Option<channel::Sender<Delivery>>>,
	current: Mutex<Option<Held>>,
	error: Arc<StickySlot>,
	done: Arc<Done>,
}

impl AsyncWriter {
	/// Wraps `sink`, writing completed blocks on `pool` at `priority`.
	/// The write task starts immediately and runs until `close` drops
	/// the sending half.
	pub fn wrap<W: Write + Send + 'static>(
		pool: &Pool,
		priority: Priority,
		recycler: Recycler,
		mut sink: W,
	) -> Self {
		let (sender, receiver) = channel::bounded(*cnf::IO_CHANNEL_CAPACITY);
		let error = Arc::new(StickySlot::new());
		let done = Arc::new(Done::new());
		let task_error = Arc::clone(&error);
		let task_done = Arc::clone(&done);
		pool.queue(priority, DebugId::new("io.async_writer"), move |_ctx| {
			while let Ok(delivery) = receiver.recv_blocking() {
				let bytes: &[u8] = match &delivery {
					Delivery::Block(block) => block.as_slice(),
					Delivery::Raw(bytes) => bytes.as_slice(),
					Delivery::Done(_) => continue,
				};
				if task_error.is_set() {
					// Sticky error already recorded; keep draining so the
					// channel (and the pages it carries) don't back up,
					// but stop issuing further writes to the sink.
					continue;
				}
				if let Err(e) = sink.write_all(bytes) {
					error!(error = %e, "async writer: sink write failed");
					task_error.set(Error::from(e));
				}
			}
			if !task_error.is_set() {
				if let Err(e) = sink.flush() {
					task_error.set(Error::from(e));
				}
			}
			task_done.signal();
		});
		Self {
			recycler,
			sender: Mutex::new(Some(sender)),
			current: Mutex::new(None),
			error,
			done,
		}
	}

	pub fn recycler(&self) -> &Recycler {
		&self.recycler
	}

	fn check_error(&self) -> Result<()> {
		match self.error.get() {
			Some(e) => Err(e),
			None => Ok(()),
		}
	}

	fn send(&self, delivery: Delivery) -> Result<()> {
		let sender = self.sender.lock().expect("writer sender lock poisoned");
		match sender.as_ref() {
			Some(s) => {
				let _ = s.send_blocking(delivery);
				Ok(())
			}
			None => Err(Error::Closed),
		}
	}

	/// Sends a pre-built block straight to the write task without ever
	/// holding it in `current` — the other half of the zero-copy splice
	/// fast path (spec §4.4 "Zero-copy splice").
	pub(super) fn splice_block(&self, block: AsyncBlock) -> Result<()> {
		self.check_error()?;
		self.flush_current()?;
		self.send(Delivery::Block(block))
	}

	/// Sends raw bytes directly, bypassing the held page. Used both for
	/// genuinely oversized single writes (§4.4) and, by the splice path,
	/// for a reader's partially-consumed trailing bytes that can't be
	/// forwarded by page ownership.
	pub(super) fn write_raw(&self, bytes: Vec<u8>) -> Result<()> {
		if bytes.is_empty() {
			return Ok(());
		}
		self.check_error()?;
		self.send(Delivery::Raw(bytes))
	}

	fn flush_current(&self) -> Result<()> {
		let mut current = self.current.lock().expect("writer page lock poisoned");
		if let Some(held) = current.take() {
			if held.off > 0 {
				self.send(Delivery::Block(AsyncBlock::new(held.page, held.off)))?;
			}
		}
		Ok(())
	}

	/// Buffers `buf` into the held page, enqueuing it (and starting a
	/// fresh one) whenever it fills. A single write larger than the
	/// stride bypasses the page entirely and is enqueued as one raw
	/// block (§4.4 "Oversized writes").
	pub fn write(&self, buf: &[u8]) -> Result<usize> {
		self.check_error()?;
		let stride = self.recycler.stride();
		if buf.len() > stride {
			self.flush_current()?;
			self.write_raw(buf.to_vec())?;
			return Ok(buf.len());
		}

		let mut current = self.current.lock().expect("writer page lock poisoned");
		let mut written = 0;
		let mut remaining = buf;
		while !remaining.is_empty() {
			let held = current.get_or_insert_with(|| Held { page: self.recycler.allocate(), off: 0 });
			let capacity = stride - held.off;
			let n = capacity.min(remaining.len());
			held.page.as_mut_slice()[held.off..held.off + n].copy_from_slice(&remaining[..n]);
			held.off += n;
			written += n;
			remaining = &remaining[n..];
			if held.off == stride {
				let full = current.take().expect("just inserted");
				drop(current);
				self.send(Delivery::Block(AsyncBlock::new(full.page, full.off)))?;
				current = self.current.lock().expect("writer page lock poisoned");
			}
		}
		Ok(written)
	}

	/// Pushes any partial page to the write task without closing the
	/// writer.
	pub fn flush(&self) -> Result<()> {
		self.check_error()?;
		self.flush_current()
	}

	/// Flushes, joins pending writes (blocks until the write task has
	/// drained the channel and flushed the sink), and closes the
	/// underlying sink. Returns the first error observed on either the
	/// caller's side or the write thread.
	pub fn close(&self) -> Result<()> {
		let flush_result = self.flush_current();
		if let Some(sender) = self.sender.lock().expect("writer sender lock poisoned").take() {
			drop(sender);
		}
		self.done.wait();
		flush_result?;
		self.check_error()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::pool::Pool;
	use std::sync::Mutex as StdMutex;

	struct VecSink(Arc<StdMutex<Vec<u8>>>);
	impl Write for VecSink {
		fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
			self.0.lock().unwrap().extend_from_slice(buf);
			Ok(buf.len())
		}
		fn flush(&mut self) -> std::io::Result<()> {
			Ok(())
		}
	}

	#[test]
	fn buffers_and_flushes_partial_page() {
		let pool = Pool::new_fixed("test-writer-partial", 1);
		let recycler = Recycler::new(16);
		let sink = Arc::new(StdMutex::new(Vec::new()));
		let writer = AsyncWriter::wrap(&pool, Priority::Low, recycler, VecSink(sink.clone()));
		writer.write(b"hello").unwrap();
		writer.close().unwrap();
		assert_eq!(*sink.lock().unwrap(), b"hello");
	}

	#[test]
	fn fills_multiple_pages() {
		let pool = Pool::new_fixed("test-writer-multi", 1);
		let recycler = Recycler::new(4);
		let sink = Arc::new(StdMutex::new(Vec::new()));
		let writer = AsyncWriter::wrap(&pool, Priority::Low, recycler, VecSink(sink.clone()));
		writer.write(b"0123456789").unwrap();
		writer.close().unwrap();
		assert_eq!(*sink.lock().unwrap(), b"0123456789");
	}

	#[test]
	fn oversized_write_bypasses_page() {
		let pool = Pool::new_fixed("test-writer-oversized", 1);
		let recycler = Recycler::new(4);
		let sink = Arc::new(StdMutex::new(Vec::new()));
		let writer = AsyncWriter::wrap(&pool, Priority::Low, recycler, VecSink(sink.clone()));
		let big = vec![9u8; 64];
		writer.write(&big).unwrap();
		writer.close().unwrap();
		assert_eq!(*sink.lock().unwrap(), big);
	}

	#[test]
	fn sticky_error_surfaces_on_next_write() {
		struct FailingSink;
		impl Write for FailingSink {
			fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
				Err(std::io::Error::new(std::io::ErrorKind::Other, "boom"))
			}
			fn flush(&mut self) -> std::io::Result<()> {
				Ok(())
			}
		}
		let pool = Pool::new_fixed("test-writer-error", 1);
		let recycler = Recycler::new(4);
		let writer = AsyncWriter::wrap(&pool, Priority::Low, recycler, FailingSink);
		writer.write(b"0123456789").unwrap();
		// Give the write task a chance to observe the failure.
		std::thread::sleep(std::time::Duration::from_millis(50));
		let err = writer.close();
		assert!(err.is_err());
	}
}
