//! Content-addressed fingerprinting: a caller-supplied salt seeds a
//! SHA-256 digester, then the value's deterministic serialization is
//! streamed straight into it as the archive sink (spec §4.5
//! "Fingerprint").

use std::io::{Read, Write};

use sha2::{Digest, Sha256};

use super::binary::Archive;
use super::{Flags, Serializable};
use crate::err::{Error, Result};

/// Feeds every byte written through it straight into a [`Sha256`]
/// state, so the archive writer never materializes the serialized
/// bytes in memory.
struct DigestSink<'h>(&'h mut Sha256);

impl Write for DigestSink<'_> {
	fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
		self.0.update(buf);
		Ok(buf.len())
	}

	fn flush(&mut self) -> std::io::Result<()> {
		Ok(())
	}
}

/// Fingerprints `value`: `SHA-256(salt || deterministic-serialization(value))`.
/// Type-guard bytes are always disabled here regardless of build
/// profile — they would make the fingerprint depend on whether the
/// caller compiled with guards on, which defeats the point of a stable
/// content hash.
pub fn fingerprint<T: Serializable>(value: &mut T, salt: &[u8]) -> Result<[u8; 32]> {
	let mut hasher = Sha256::new();
	hasher.update(salt);
	let flags = Flags::new().determinism(true).guarded(false);
	{
		let mut sink = DigestSink(&mut hasher);
		let mut writer = Archive::writer(&mut sink, flags);
		value.archive(&mut writer)?;
		writer.close()?;
	}
	Ok(hasher.finalize().into())
}

/// Streams an arbitrary [`Read`] into the digester, for fingerprinting
/// raw file content rather than a [`Serializable`] value (spec §4.5 "A
/// helper streams an arbitrary Reader into the digester for file
/// hashing").
pub fn fingerprint_reader<R: Read>(reader: &mut R, salt: &[u8]) -> Result<[u8; 32]> {
	let mut hasher = Sha256::new();
	hasher.update(salt);
	let mut buf = [0u8; 64 * 1024];
	loop {
		let n = reader.read(&mut buf).map_err(Error::from)?;
		if n == 0 {
			break;
		}
		hasher.update(&buf[..n]);
	}
	Ok(hasher.finalize().into())
}

/// Lower-case hex rendering of a fingerprint, for logs and diagnostics.
pub fn to_hex(fp: &[u8; 32]) -> String {
	hex::encode(fp)
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::archive::ArchiveOps;
	use std::io::Cursor;

	struct Empty;
	impl Serializable for Empty {
		fn archive<A: ArchiveOps>(&mut self, _ar: &mut A) -> Result<()> {
			Ok(())
		}
	}

	struct One(i32);
	impl Serializable for One {
		fn archive<A: ArchiveOps>(&mut self, ar: &mut A) -> Result<()> {
			ar.i32(&mut self.0)
		}
	}

	#[test]
	fn empty_serializable_fingerprints_to_plain_salt_hash() {
		let salt = b"Z";
		let fp = fingerprint(&mut Empty, salt).unwrap();
		let mut expected = Sha256::new();
		expected.update(salt);
		let expected: [u8; 32] = expected.finalize().into();
		assert_eq!(fp, expected);
	}

	#[test]
	fn single_field_fingerprint_matches_salt_then_bytes() {
		let salt = b"Z";
		let fp = fingerprint(&mut One(1), salt).unwrap();
		let mut expected = Sha256::new();
		expected.update(salt);
		expected.update(1i32.to_le_bytes());
		let expected: [u8; 32] = expected.finalize().into();
		assert_eq!(fp, expected);
	}

	#[test]
	fn changing_a_byte_changes_the_fingerprint() {
		let salt = b"salt";
		let a = fingerprint(&mut One(1), salt).unwrap();
		let b = fingerprint(&mut One(2), salt).unwrap();
		assert_ne!(a, b);
	}

	#[test]
	fn fingerprint_is_stable_across_runs() {
		let salt = b"salt";
		let a = fingerprint(&mut One(42), salt).unwrap();
		let b = fingerprint(&mut One(42), salt).unwrap();
		assert_eq!(a, b);
	}

	#[test]
	fn reader_fingerprint_matches_direct_hash() {
		let data = b"file contents to hash".to_vec();
		let mut cursor = Cursor::new(data.clone());
		let fp = fingerprint_reader(&mut cursor, b"salt").unwrap();
		let mut expected = Sha256::new();
		expected.update(b"salt");
		expected.update(&data);
		let expected: [u8; 32] = expected.finalize().into();
		assert_eq!(fp, expected);
	}

	#[test]
	fn hex_rendering_is_lowercase_and_64_chars() {
		let fp = fingerprint(&mut One(7), b"s").unwrap();
		let rendered = to_hex(&fp);
		assert_eq!(rendered.len(), 64);
		assert!(rendered.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
	}
}
