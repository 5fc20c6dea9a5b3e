//! Reusable runtime foundation: a pooled page-buffer recycler, a
//! priority thread pool, write-once futures and parallel combinators, a
//! chunked async I/O pipeline, and a deterministic binary archive
//! format with string interning, type guards, structural diffing, and
//! content-addressed fingerprinting.

#[macro_use]
extern crate tracing;

#[macro_use]
mod mac;

#[doc(hidden)]
pub mod cnf;
#[doc(hidden)]
pub mod err;

pub mod archive;
pub mod future;
pub mod io;
pub mod pool;
pub mod recycler;
