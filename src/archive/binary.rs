//! Binary reader/writer archive (spec §4.5 "Binary writer"/"Binary
//! reader"): fixed-width little-endian atoms, length-prefixed or
//! back-referenced strings, and an optional type-guard canary.

use std::io::{Read, Write};
use std::time::SystemTime;

use super::guard;
use super::intern::{ReaderIntern, WriterIntern};
use super::{ArchiveOps, Direction, Flags, IndexEncoding, Serializable};
use crate::cnf;
use crate::err::{Error, Result, StickySlot};

enum Backing<'s> {
	Write(&'s mut dyn Write),
	Read(&'s mut dyn Read),
}

enum Intern {
	Writer(WriterIntern),
	Reader(ReaderIntern),
}

/// The binary encode/decode archive. Construct with [`Archive::writer`]
/// or [`Archive::reader`]; the direction is fixed for the archive's
/// whole lifetime (spec §3 "created at the start of a serialization
/// scope, closed at the end").
pub struct Archive<'s> {
	backing: Backing<'s>,
	direction: Direction,
	flags: Flags,
	error: StickySlot,
	intern: Intern,
}

impl<'s> Archive<'s> {
	pub fn writer<W: Write>(writer: &'s mut W, flags: Flags) -> Self {
		Self {
			backing: Backing::Write(writer),
			direction: Direction::Storing,
			flags,
			error: StickySlot::new(),
			intern: Intern::Writer(WriterIntern::default()),
		}
	}

	pub fn reader<R: Read>(reader: &'s mut R, flags: Flags) -> Self {
		Self {
			backing: Backing::Read(reader),
			direction: Direction::Loading,
			flags,
			error: StickySlot::new(),
			intern: Intern::Reader(ReaderIntern::default()),
		}
	}

	/// Returns the archive's first recorded error, if any (spec §4.5
	/// "a top-level close() returns the accumulated error").
	pub fn close(&mut self) -> Result<()> {
		match self.error.get() {
			Some(e) => Err(e),
			None => Ok(()),
		}
	}

	fn write_bytes(&mut self, bytes: &[u8]) -> Result<()> {
		let result = match &mut self.backing {
			Backing::Write(w) => w.write_all(bytes),
			Backing::Read(_) => unreachable!("write_bytes called on a loading archive"),
		};
		match result {
			Ok(()) => Ok(()),
			Err(e) => {
				let err = Error::from(e);
				self.error.set(err.clone());
				Err(err)
			}
		}
	}

	fn read_bytes(&mut self, buf: &mut [u8]) -> Result<()> {
		let result = match &mut self.backing {
			Backing::Read(r) => r.read_exact(buf),
			Backing::Write(_) => unreachable!("read_bytes called on a storing archive"),
		};
		match result {
			Ok(()) => Ok(()),
			Err(e) => {
				let err = Error::from(e);
				self.error.set(err.clone());
				Err(err)
			}
		}
	}

	/// Writes/reads the canary + 4-char tag bracketing every atom when
	/// `flags.type_guard` is set (spec §4.5 "Type-guard validator").
	/// Called once before and once after each atom's body, so a reader
	/// compiled against a different layout than the writer catches the
	/// drift on either edge of the mismatched call.
	fn guard(&mut self, tag: &'static str) -> Result<()> {
		if !self.flags.type_guard {
			return Ok(());
		}
		match self.direction {
			Direction::Storing => {
				self.write_bytes(&cnf::GUARD_CANARY.to_le_bytes())?;
				self.write_bytes(tag.as_bytes())
			}
			Direction::Loading => {
				let mut canary_bytes = [0u8; 4];
				self.read_bytes(&mut canary_bytes)?;
				let canary = u32::from_le_bytes(canary_bytes);
				if canary != cnf::GUARD_CANARY {
					let err = Error::TagMismatch { expected: tag, found: format!("bad canary {canary:#x}") };
					self.error.set(err.clone());
					return Err(err);
				}
				let mut found_bytes = [0u8; 4];
				self.read_bytes(&mut found_bytes)?;
				let found = String::from_utf8_lossy(&found_bytes).to_string();
				if found != tag {
					let err = Error::TagMismatch { expected: tag, found };
					self.error.set(err.clone());
					return Err(err);
				}
				Ok(())
			}
		}
	}

	fn write_index(&mut self, value: i64) -> Result<()> {
		match self.flags.index_encoding {
			IndexEncoding::Fixed => self.write_bytes(&(value as i32).to_le_bytes()),
			IndexEncoding::Varint => self.write_varint(value),
		}
	}

	fn read_index(&mut self) -> Result<i64> {
		match self.flags.index_encoding {
			IndexEncoding::Fixed => {
				let mut bytes = [0u8; 4];
				self.read_bytes(&mut bytes)?;
				Ok(i32::from_le_bytes(bytes) as i64)
			}
			IndexEncoding::Varint => self.read_varint(),
		}
	}

	/// Zigzag LEB128: negative back-reference indices need a signed
	/// varint, not just an unsigned one (spec §9 "Alternate compact
	/// index encoding").
	fn write_varint(&mut self, value: i64) -> Result<()> {
		let mut zigzag = ((value << 1) ^ (value >> 63)) as u64;
		loop {
			let mut byte = (zigzag & 0x7f) as u8;
			zigzag >>= 7;
			if zigzag != 0 {
				byte |= 0x80;
			}
			self.write_bytes(&[byte])?;
			if zigzag == 0 {
				break;
			}
		}
		Ok(())
	}

	fn read_varint(&mut self) -> Result<i64> {
		let mut result: u64 = 0;
		let mut shift = 0u32;
		loop {
			let mut byte = [0u8; 1];
			self.read_bytes(&mut byte)?;
			result |= ((byte[0] & 0x7f) as u64) << shift;
			if byte[0] & 0x80 == 0 {
				break;
			}
			shift += 7;
		}
		Ok(((result >> 1) as i64) ^ -((result & 1) as i64))
	}
}

/// Generates the body of one fixed-width numeric atom method: write as
/// little-endian bytes, or read the same number of bytes back.
macro_rules! fixed_atom {
	($name:ident, $ty:ty, $tag:expr) => {
		fn $name(&mut self, v: &mut $ty) -> Result<()> {
			if let Some(e) = self.error.get() {
				return Err(e);
			}
			self.guard($tag)?;
			match self.direction {
				Direction::Storing => self.write_bytes(&v.to_le_bytes())?,
				Direction::Loading => {
					let mut bytes = [0u8; std::mem::size_of::<$ty>()];
					self.read_bytes(&mut bytes)?;
					*v = <$ty>::from_le_bytes(bytes);
				}
			}
			self.guard($tag)
		}
	};
}

impl<'s> ArchiveOps for Archive<'s> {
	fixed_atom!(i32, i32, guard::SI32);
	fixed_atom!(i64, i64, guard::SI64);
	fixed_atom!(u32, u32, guard::UI32);
	fixed_atom!(u64, u64, guard::UI64);
	fixed_atom!(f32, f32, guard::FT32);
	fixed_atom!(f64, f64, guard::FT64);

	fn byte(&mut self, v: &mut u8) -> Result<()> {
		if let Some(e) = self.error.get() {
			return Err(e);
		}
		self.guard(guard::BYTE)?;
		match self.direction {
			Direction::Storing => self.write_bytes(&[*v])?,
			Direction::Loading => {
				let mut b = [0u8; 1];
				self.read_bytes(&mut b)?;
				*v = b[0];
			}
		}
		self.guard(guard::BYTE)
	}

	fn bool_(&mut self, v: &mut bool) -> Result<()> {
		if let Some(e) = self.error.get() {
			return Err(e);
		}
		self.guard(guard::BOOL)?;
		match self.direction {
			Direction::Storing => self.write_bytes(&[if *v { 0xFF } else { 0x00 }])?,
			Direction::Loading => {
				let mut b = [0u8; 1];
				self.read_bytes(&mut b)?;
				*v = b[0] != 0x00;
			}
		}
		self.guard(guard::BOOL)
	}

	/// Strings are length-prefixed, except when the same string was
	/// already written once in this scope, in which case a negative
	/// back-reference replaces the length (spec §4.5 "Binary writer").
	fn string(&mut self, v: &mut String) -> Result<()> {
		if let Some(e) = self.error.get() {
			return Err(e);
		}
		self.guard(guard::STRG)?;
		match self.direction {
			Direction::Storing => {
				if v.len() > *cnf::STRING_SANITY_LIMIT {
					let err = Error::StringTooLong { len: v.len(), limit: *cnf::STRING_SANITY_LIMIT };
					self.error.set(err.clone());
					return Err(err);
				}
				let ordinal = match &mut self.intern {
					Intern::Writer(w) => w.record_or_lookup(v.as_str()),
					Intern::Reader(_) => unreachable!("storing archive always carries a writer intern table"),
				};
				match ordinal {
					Some(ordinal) => self.write_index(-ordinal as i64)?,
					None => {
						self.write_index(v.len() as i64)?;
						self.write_bytes(v.as_bytes())?;
					}
				}
			}
			Direction::Loading => {
				let prefix = self.read_index()?;
				if prefix < 0 {
					let back_index = (-prefix - 1) as usize;
					let (found, len) = match &self.intern {
						Intern::Reader(r) => (r.lookup(back_index).map(str::to_string), r.len()),
						Intern::Writer(_) => unreachable!("loading archive always carries a reader intern table"),
					};
					let found = found.ok_or_else(|| {
						let err = Error::InternOutOfRange { index: back_index, len };
						self.error.set(err.clone());
						err
					})?;
					*v = found;
				} else {
					let len = prefix as usize;
					if len > *cnf::STRING_SANITY_LIMIT {
						let err = Error::StringTooLong { len, limit: *cnf::STRING_SANITY_LIMIT };
						self.error.set(err.clone());
						return Err(err);
					}
					let mut bytes = vec![0u8; len];
					self.read_bytes(&mut bytes)?;
					let s = String::from_utf8(bytes).map_err(|e| {
						let err = Error::from(std::io::Error::new(std::io::ErrorKind::InvalidData, e));
						self.error.set(err.clone());
						err
					})?;
					match &mut self.intern {
						Intern::Reader(r) => r.push_new(s.clone()),
						Intern::Writer(_) => unreachable!(),
					}
					*v = s;
				}
			}
		}
		self.guard(guard::STRG)
	}

	/// Milliseconds-since-epoch as a signed 64-bit integer (spec §4.5
	/// "time as milliseconds-since-epoch as 64-bit"); negative values
	/// represent times before the epoch.
	fn time(&mut self, v: &mut SystemTime) -> Result<()> {
		if let Some(e) = self.error.get() {
			return Err(e);
		}
		self.guard(guard::TIME)?;
		match self.direction {
			Direction::Storing => {
				let ms: i64 = match v.duration_since(std::time::UNIX_EPOCH) {
					Ok(d) => d.as_millis() as i64,
					Err(e) => -(e.duration().as_millis() as i64),
				};
				self.write_bytes(&ms.to_le_bytes())?;
			}
			Direction::Loading => {
				let mut bytes = [0u8; 8];
				self.read_bytes(&mut bytes)?;
				let ms = i64::from_le_bytes(bytes);
				*v = if ms >= 0 {
					std::time::UNIX_EPOCH + std::time::Duration::from_millis(ms as u64)
				} else {
					std::time::UNIX_EPOCH - std::time::Duration::from_millis((-ms) as u64)
				};
			}
		}
		self.guard(guard::TIME)
	}

	/// Raw bytes: a fixed 8-byte length prefix (the determinism/varint
	/// knob applies only to string indices per §9) followed by the
	/// payload verbatim.
	fn raw(&mut self, v: &mut Vec<u8>) -> Result<()> {
		if let Some(e) = self.error.get() {
			return Err(e);
		}
		self.guard(guard::RAW_)?;
		match self.direction {
			Direction::Storing => {
				self.write_bytes(&(v.len() as u64).to_le_bytes())?;
				self.write_bytes(v)?;
			}
			Direction::Loading => {
				let mut len_bytes = [0u8; 8];
				self.read_bytes(&mut len_bytes)?;
				let len = u64::from_le_bytes(len_bytes) as usize;
				let mut buf = vec![0u8; len];
				self.read_bytes(&mut buf)?;
				*v = buf;
			}
		}
		self.guard(guard::RAW_)
	}

	fn direction(&self) -> Direction {
		self.direction
	}

	fn flags(&self) -> Flags {
		self.flags
	}

	fn error(&self) -> Option<Error> {
		self.error.get()
	}

	fn on_error(&self, err: Error) {
		self.error.set(err);
	}

	fn serializable<T: Serializable>(&mut self, v: &mut T) -> Result<()>
	where
		Self: Sized,
	{
		if let Some(e) = self.error.get() {
			return Err(e);
		}
		self.guard(guard::SRLZ)?;
		v.archive(self)?;
		self.guard(guard::SRLZ)
	}
}
