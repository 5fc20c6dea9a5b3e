//! Read-ahead reader: a dedicated pool task fills recycled pages from an
//! underlying [`std::io::Read`] while the caller's thread does other
//! work, handing filled blocks across a bounded channel (spec §4.4
//! "AsyncReader").

use std::io::Read;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::cnf;
use crate::err::{Error, Result};
use crate::pool::{DebugId, Pool, Priority};
use crate::recycler::Recycler;

use super::block::{AsyncBlock, Delivery};
use super::writer::AsyncWriter;

/// Shared between the reader handle and its producer task so that
/// `cancel()` is visible to the task on its next loop iteration (§5
/// "Cancellation" — cooperative, never forcible).
struct Cancel(AtomicBool);

impl Cancel {
	fn new() -> Self {
		Self(AtomicBool::new(false))
	}

	fn set(&self) {
		self.0.store(true, Ordering::SeqCst);
	}

	fn is_set(&self) -> bool {
		self.0.load(Ordering::SeqCst)
	}
}

/// Reads from an underlying [`Read`] one stride-sized page ahead of the
/// caller, on a dedicated thread-pool task.
pub struct AsyncReader {
	recycler: Recycler,
	receiver: channel::Receiver<Delivery>,
	cancel: Arc<Cancel>,
	/// The block currently being drained by `read`, plus how far into it
	/// the caller has already consumed.
	current: Option<(AsyncBlock, usize)>,
	terminal: Option<Result<()>>,
}

impl AsyncReader {
	/// Wraps `source`, producing blocks on `pool` at `priority`. The
	/// producer task starts immediately.
	pub fn wrap<R: Read + Send + 'static>(
		pool: &Pool,
		priority: Priority,
		recycler: Recycler,
		mut source: R,
	) -> Self {
		let (sender, receiver) = channel::bounded(*cnf::IO_CHANNEL_CAPACITY);
		let cancel = Arc::new(Cancel::new());
		let task_recycler = recycler.clone();
		let task_cancel = Arc::clone(&cancel);
		pool.queue(priority, DebugId::new("io.async_reader"), move |_ctx| {
			loop {
				if task_cancel.is_set() {
					trace!("async reader: cancelled, producer exiting");
					let _ = sender.send_blocking(Delivery::Done(Err(Error::Cancelled)));
					return;
				}
				let mut page = task_recycler.allocate();
				match source.read(page.as_mut_slice()) {
					Ok(0) => {
						trace!("async reader: source at EOF");
						let _ = sender.send_blocking(Delivery::Done(Ok(())));
						return;
					}
					Ok(n) => {
						if sender.send_blocking(Delivery::Block(AsyncBlock::new(page, n))).is_err() {
							// Consumer dropped; nothing left to do with this page.
							return;
						}
					}
					Err(e) => {
						error!(error = %e, "async reader: source read failed");
						let _ = sender.send_blocking(Delivery::Done(Err(Error::from(e))));
						return;
					}
				}
			}
		});
		Self { recycler, receiver, cancel, current: None, terminal: None }
	}

	/// Pulls the next block from the channel, releasing zero-length ones
	/// instead of surfacing them (§3 invariant never actually fires here
	/// since the producer never sends `off == 0`, but `Done` still needs
	/// handling).
	fn pull(&mut self) -> Result<bool> {
		if let Some(done) = &self.terminal {
			return done.clone().map(|_| false);
		}
		match self.receiver.recv_blocking() {
			Ok(Delivery::Block(block)) => {
				self.current = Some((block, 0));
				Ok(true)
			}
			Ok(Delivery::Raw(_)) => {
				unreachable!("a reader's producer never sends raw one-shot deliveries")
			}
			Ok(Delivery::Done(result)) => {
				self.terminal = Some(result.clone());
				result.map(|_| false)
			}
			Err(_) => {
				// Producer task gone without a terminal message (panicked
				// past its own recovery, or the process is shutting down).
				let err = Error::Io(Arc::new(std::io::Error::new(
					std::io::ErrorKind::BrokenPipe,
					"async reader producer terminated without a terminal block",
				)));
				self.terminal = Some(Err(err.clone()));
				Err(err)
			}
		}
	}

	/// Fills `buf` from the current block, fetching the next one from
	/// the producer when exhausted. Returns `0` at end of stream.
	/// Requests larger than the recycler's stride are rejected (§4.4).
	pub fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
		if buf.len() > self.recycler.stride() {
			return Err(Error::OversizedPayload { len: buf.len(), stride: self.recycler.stride() });
		}
		loop {
			if let Some((block, cursor)) = &mut self.current {
				let remaining = block.len() - *cursor;
				if remaining > 0 {
					let n = remaining.min(buf.len());
					buf[..n].copy_from_slice(&block.as_slice()[*cursor..*cursor + n]);
					*cursor += n;
					return Ok(n);
				}
				self.current = None;
			}
			if !self.pull()? {
				return Ok(0);
			}
		}
	}

	/// Cancels the producer task (cooperatively — it observes the flag on
	/// its next loop iteration, per §5) and drains any blocks already in
	/// flight back to the recycler, so an early `cancel` never leaks
	/// pages (spec §8 "Async I/O" post-condition).
	pub fn cancel(&mut self) {
		self.cancel.set();
		self.current = None;
		while let Ok(delivery) = self.receiver.recv_blocking() {
			match delivery {
				Delivery::Block(block) => drop(block.page),
				Delivery::Raw(_) => {}
				Delivery::Done(_) => break,
			}
		}
		self.terminal = Some(Err(Error::Cancelled));
	}

	/// The recycler this reader (and every block it produces) draws
	/// from. Used by [`AsyncReader::write_to`] and callers assembling a
	/// splice chain to confirm both ends agree.
	pub fn recycler(&self) -> &Recycler {
		&self.recycler
	}

	/// Zero-copy fast path (§4.4 "Zero-copy splice"): if `writer` shares
	/// this reader's recycler, every remaining block is forwarded by
	/// ownership transfer straight into the writer's pending-write
	/// channel, with no byte copy and no extra page allocation. Returns
	/// the total byte count written, or the first error encountered by
	/// either side.
	pub fn write_to(&mut self, writer: &AsyncWriter) -> Result<u64> {
		if !self.recycler.ptr_eq(writer.recycler()) {
			return self.write_to_by_copy(writer);
		}
		// Any partially-consumed current block still needs to go out;
		// splice it as a raw write since ownership of the backing page
		// can't be split.
		let mut total = 0u64;
		if let Some((block, cursor)) = self.current.take() {
			let bytes = block.as_slice()[cursor..].to_vec();
			if !bytes.is_empty() {
				total += bytes.len() as u64;
				writer.write_raw(bytes)?;
			}
		}
		loop {
			if self.terminal.is_some() {
				break;
			}
			match self.receiver.recv_blocking() {
				Ok(Delivery::Block(block)) => {
					total += block.len() as u64;
					writer.splice_block(block)?;
				}
				Ok(Delivery::Raw(_)) => unreachable!("a reader's producer never sends raw deliveries"),
				Ok(Delivery::Done(result)) => {
					self.terminal = Some(result.clone());
					result?;
					break;
				}
				Err(_) => break,
			}
		}
		Ok(total)
	}

	/// Fallback used when the reader and writer don't share a recycler:
	/// a plain byte-copy loop through a scratch buffer sized to the
	/// reader's stride.
	fn write_to_by_copy(&mut self, writer: &AsyncWriter) -> Result<u64> {
		let mut buf = vec![0u8; self.recycler.stride()];
		let mut total = 0u64;
		loop {
			let n = self.read(&mut buf)?;
			if n == 0 {
				break;
			}
			writer.write(&buf[..n])?;
			total += n as u64;
		}
		Ok(total)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::io::writer::AsyncWriter;
	use std::io::Cursor;

	fn test_pool() -> Pool {
		Pool::new_fixed("test-io-reader", 2)
	}

	#[test]
	fn reads_back_exact_bytes() {
		let pool = test_pool();
		let recycler = Recycler::new(64);
		let data = b"the quick brown fox jumps over the lazy dog".to_vec();
		let mut reader = AsyncReader::wrap(&pool, Priority::Low, recycler, Cursor::new(data.clone()));

		let mut out = Vec::new();
		let mut buf = [0u8; 8];
		loop {
			let n = reader.read(&mut buf).unwrap();
			if n == 0 {
				break;
			}
			out.extend_from_slice(&buf[..n]);
		}
		assert_eq!(out, data);
	}

	#[test]
	fn oversized_read_request_rejected() {
		let pool = test_pool();
		let recycler = Recycler::new(16);
		let mut reader = AsyncReader::wrap(&pool, Priority::Low, recycler, Cursor::new(vec![0u8; 4]));
		let mut buf = [0u8; 32];
		assert!(matches!(reader.read(&mut buf), Err(Error::OversizedPayload { .. })));
	}

	#[test]
	fn cancel_does_not_leak_pages() {
		let pool = test_pool();
		let recycler = Recycler::with_capacity(64, 16);
		let before = recycler.free_list_len();
		let big = vec![7u8; 64 * 1024];
		let mut reader = AsyncReader::wrap(&pool, Priority::Low, recycler.clone(), Cursor::new(big));
		// Pull one block, then cancel before exhausting the stream.
		let mut buf = [0u8; 8];
		let _ = reader.read(&mut buf).unwrap();
		reader.cancel();
		drop(reader);
		pool.join();
		assert!(recycler.free_list_len() >= before);
	}

	#[test]
	fn splice_preserves_bytes_and_bounds_allocation() {
		use rand::RngCore;
		let read_pool = Pool::new_fixed("test-splice-read", 2);
		let write_pool = Pool::new_fixed("test-splice-write", 2);
		let recycler = Recycler::new(4096);

		let mut data = vec![0u8; 218_732];
		rand::thread_rng().fill_bytes(&mut data);

		let before_created = recycler.pages_created();
		let mut reader = AsyncReader::wrap(&read_pool, Priority::Low, recycler.clone(), Cursor::new(data.clone()));
		let sink = Arc::new(std::sync::Mutex::new(Vec::new()));
		let writer = AsyncWriter::wrap(&write_pool, Priority::Low, recycler.clone(), SinkHandle(sink.clone()));

		let total = reader.write_to(&writer).unwrap();
		writer.close().unwrap();

		assert_eq!(total as usize, data.len());
		assert_eq!(*sink.lock().unwrap(), data);
		let allocated = recycler.pages_created() - before_created;
		assert!(allocated as u64 <= (218_732u64).div_ceil(4096) + 1);
	}

	struct SinkHandle(Arc<std::sync::Mutex<Vec<u8>>>);
	impl std::io::Write for SinkHandle {
		fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
			self.0.lock().unwrap().extend_from_slice(buf);
			Ok(buf.len())
		}
		fn flush(&mut self) -> std::io::Result<()> {
			Ok(())
		}
	}
}
