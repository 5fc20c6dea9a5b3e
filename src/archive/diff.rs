//! Structural diff: serialize `a` deterministically, then re-read `b`'s
//! serialization from that byte buffer one atom at a time, comparing
//! against `b`'s in-memory value without ever overwriting it, and
//! stopping at the first divergence (spec §4.5 "Structural diff").

use std::io::Cursor;
use std::time::SystemTime;

use super::binary::Archive;
use super::guard;
use super::{ArchiveOps, Direction, Flags, Serializable};
use crate::err::{Error, Result};

/// The first point of divergence found by [`diff`]: a stack-addressed
/// path (`[SRLZ][SI32]` etc., spec §4.5) naming where in the traversal
/// the mismatch occurred, and the two differing values rendered for
/// display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffOutcome {
	pub path: String,
	pub old: String,
	pub new: String,
}

/// Re-reads `a`'s serialized bytes against `b`'s in-memory fields,
/// comparing rather than assigning. Implements [`ArchiveOps`] so a
/// [`Serializable`] type's `archive` body is reused unchanged for
/// diffing.
pub struct DiffArchive<'b> {
	source: Archive<'b>,
	stack: Vec<&'static str>,
	mismatch: Option<DiffOutcome>,
}

impl<'b> DiffArchive<'b> {
	fn path_string(&self, leaf: &'static str) -> String {
		let mut s = String::new();
		for seg in &self.stack {
			s.push('[');
			s.push_str(seg);
			s.push(']');
		}
		s.push('[');
		s.push_str(leaf);
		s.push(']');
		s
	}

	/// Reads the next value from `a`'s stream into `v` (as a normal
	/// `Loading` archive would), then compares it against `v`'s
	/// pre-existing (B's) value. On mismatch, records the first
	/// divergence and restores `v` to B's original value — the "without
	/// overwriting" contract (spec §4.5).
	fn compare<T: Clone + PartialEq + std::fmt::Debug>(
		&mut self,
		v: &mut T,
		leaf: &'static str,
		load: impl FnOnce(&mut Archive<'b>, &mut T) -> Result<()>,
	) -> Result<()> {
		if self.mismatch.is_some() {
			return Ok(());
		}
		let original = v.clone();
		load(&mut self.source, v)?;
		if *v != original {
			// `v` now holds a's value (just read from the stream);
			// `original` is b's pre-existing in-memory value. a is the
			// baseline ("old"), b is what it's compared against ("new").
			self.mismatch =
				Some(DiffOutcome { path: self.path_string(leaf), old: format!("{v:?}"), new: format!("{original:?}") });
		}
		*v = original;
		Ok(())
	}
}

impl<'b> ArchiveOps for DiffArchive<'b> {
	fn byte(&mut self, v: &mut u8) -> Result<()> {
		self.compare(v, guard::BYTE, |a, v| a.byte(v))
	}

	fn bool_(&mut self, v: &mut bool) -> Result<()> {
		self.compare(v, guard::BOOL, |a, v| a.bool_(v))
	}

	fn i32(&mut self, v: &mut i32) -> Result<()> {
		self.compare(v, guard::SI32, |a, v| a.i32(v))
	}

	fn i64(&mut self, v: &mut i64) -> Result<()> {
		self.compare(v, guard::SI64, |a, v| a.i64(v))
	}

	fn u32(&mut self, v: &mut u32) -> Result<()> {
		self.compare(v, guard::UI32, |a, v| a.u32(v))
	}

	fn u64(&mut self, v: &mut u64) -> Result<()> {
		self.compare(v, guard::UI64, |a, v| a.u64(v))
	}

	fn f32(&mut self, v: &mut f32) -> Result<()> {
		self.compare(v, guard::FT32, |a, v| a.f32(v))
	}

	fn f64(&mut self, v: &mut f64) -> Result<()> {
		self.compare(v, guard::FT64, |a, v| a.f64(v))
	}

	fn string(&mut self, v: &mut String) -> Result<()> {
		self.compare(v, guard::STRG, |a, v| a.string(v))
	}

	fn time(&mut self, v: &mut SystemTime) -> Result<()> {
		self.compare(v, guard::TIME, |a, v| a.time(v))
	}

	fn raw(&mut self, v: &mut Vec<u8>) -> Result<()> {
		self.compare(v, guard::RAW_, |a, v| a.raw(v))
	}

	fn direction(&self) -> Direction {
		Direction::Loading
	}

	fn flags(&self) -> Flags {
		self.source.flags()
	}

	fn error(&self) -> Option<Error> {
		self.source.error()
	}

	fn on_error(&self, err: Error) {
		self.source.on_error(err)
	}

	fn serializable<T: Serializable>(&mut self, v: &mut T) -> Result<()>
	where
		Self: Sized,
	{
		if self.mismatch.is_some() {
			return Ok(());
		}
		self.stack.push(guard::SRLZ);
		let result = v.archive(self);
		self.stack.pop();
		result
	}
}

/// Compares `a` and `b` structurally: `Ok(None)` if they serialize
/// identically, `Ok(Some(outcome))` naming the first divergence
/// otherwise, `Err` only for a genuine archive error (e.g. a
/// serialization failure, not a mismatch).
pub fn diff<T: Serializable>(a: &mut T, b: &mut T) -> Result<Option<DiffOutcome>> {
	let flags = Flags::new().determinism(true);
	let mut buf = Vec::new();
	{
		let mut writer = Archive::writer(&mut buf, flags);
		a.archive(&mut writer)?;
		writer.close()?;
	}
	let mut cursor = Cursor::new(buf);
	let source = Archive::reader(&mut cursor, flags);
	let mut diff_archive = DiffArchive { source, stack: Vec::new(), mismatch: None };
	b.archive(&mut diff_archive)?;
	Ok(diff_archive.mismatch)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[derive(Clone)]
	struct Item {
		name: String,
		count: i32,
	}

	impl Serializable for Item {
		fn archive<A: ArchiveOps>(&mut self, ar: &mut A) -> Result<()> {
			ar.string(&mut self.name)?;
			ar.i32(&mut self.count)
		}
	}

	#[test]
	fn identical_values_produce_no_diff() {
		let mut a = Item { name: "foo".into(), count: 3 };
		let mut b = Item { name: "foo".into(), count: 3 };
		assert_eq!(diff(&mut a, &mut b).unwrap(), None);
	}

	#[test]
	fn diverging_scalar_is_reported_with_path_and_values() {
		let mut a = Item { name: "foo".into(), count: 3 };
		let mut b = Item { name: "foo".into(), count: 4 };
		let outcome = diff(&mut a, &mut b).unwrap().expect("count differs");
		assert!(outcome.path.ends_with(&format!("[{}]", guard::SI32)));
		assert_eq!(outcome.old, "3");
		assert_eq!(outcome.new, "4");
	}

	#[test]
	fn b_is_left_unmodified_by_a_mismatching_diff() {
		let mut a = Item { name: "foo".into(), count: 3 };
		let mut b = Item { name: "foo".into(), count: 4 };
		diff(&mut a, &mut b).unwrap();
		assert_eq!(b.count, 4);
		assert_eq!(b.name, "foo");
	}

	#[test]
	fn first_divergence_short_circuits_later_fields() {
		#[derive(Clone)]
		struct Two {
			first: i32,
			second: i32,
		}
		impl Serializable for Two {
			fn archive<A: ArchiveOps>(&mut self, ar: &mut A) -> Result<()> {
				ar.i32(&mut self.first)?;
				ar.i32(&mut self.second)
			}
		}
		let mut a = Two { first: 1, second: 10 };
		let mut b = Two { first: 2, second: 20 };
		let outcome = diff(&mut a, &mut b).unwrap().expect("first field differs");
		assert_eq!(outcome.old, "1");
		assert_eq!(outcome.new, "2");
		// `second` was never compared, so it's untouched and no second
		// mismatch overwrote the first.
		assert_eq!(b.second, 20);
	}

	#[test]
	fn nested_serializable_path_includes_srlz_frame() {
		#[derive(Clone)]
		struct Outer {
			inner: Item,
		}
		impl Serializable for Outer {
			fn archive<A: ArchiveOps>(&mut self, ar: &mut A) -> Result<()> {
				ar.serializable(&mut self.inner)
			}
		}
		let mut a = Outer { inner: Item { name: "x".into(), count: 1 } };
		let mut b = Outer { inner: Item { name: "x".into(), count: 2 } };
		let outcome = diff(&mut a, &mut b).unwrap().expect("nested count differs");
		assert_eq!(outcome.path, format!("[{}][{}]", guard::SRLZ, guard::SI32));
	}
}
