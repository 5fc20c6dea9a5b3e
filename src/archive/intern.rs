//! String interning tables: a writer's `string -> i32` map from the
//! string's first occurrence (1-based ordinal) to the inverse
//! `i32 -> string` table a reader rebuilds from back-references (spec
//! §3 "Archive" / §4.5 "Binary writer/reader").

use std::collections::HashMap;

/// Built by a writer: remembers the 1-based ordinal each string was
/// first written at, so a later occurrence can be written as a
/// back-reference instead of repeating the bytes.
#[derive(Default)]
pub(super) struct WriterIntern {
	seen: HashMap<String, i32>,
}

impl WriterIntern {
	/// Returns the 1-based ordinal if `s` was already written, recording
	/// it as newly-seen (at the next ordinal) otherwise.
	pub(super) fn record_or_lookup(&mut self, s: &str) -> Option<i32> {
		if let Some(&ordinal) = self.seen.get(s) {
			return Some(ordinal);
		}
		let ordinal = self.seen.len() as i32 + 1;
		self.seen.insert(s.to_string(), ordinal);
		None
	}
}

/// Built by a reader: the inverse of [`WriterIntern`]. Index `i`
/// (0-based) holds the string whose first occurrence had 1-based
/// ordinal `i + 1`.
#[derive(Default)]
pub(super) struct ReaderIntern {
	table: Vec<String>,
}

impl ReaderIntern {
	pub(super) fn push_new(&mut self, s: String) {
		self.table.push(s);
	}

	/// `index` is the 0-based back-reference index (`-prefix - 1`).
	pub(super) fn lookup(&self, index: usize) -> Option<&str> {
		self.table.get(index).map(String::as_str)
	}

	pub(super) fn len(&self) -> usize {
		self.table.len()
	}
}
