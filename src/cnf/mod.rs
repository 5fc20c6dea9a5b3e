//! Process-wide tunables. Hardcoded where the spec fixes a value,
//! environment-overridable where it leaves one implementation-defined.

use once_cell::sync::Lazy;

/// Page strides offered by the well-known transient recyclers (§4.1),
/// smallest to largest.
pub const RECYCLER_STRIDES: &[usize] = &[4 * 1024, 64 * 1024, 1024 * 1024];

/// Bound on the number of free pages an LRU-bounded recycler retains
/// before releasing the underlying allocation instead of pooling it.
pub static RECYCLER_FREE_LIST_CAP: Lazy<usize> =
	lazy_env_parse!("COREKIT_RECYCLER_FREE_LIST_CAP", usize, 256);

/// Capacity of each thread-pool priority lane's channel. The spec leaves
/// "unbuffered or small-bounded" as an implementation choice (§4.2); a
/// small bound avoids unconditionally blocking `queue()` callers while
/// still applying backpressure under sustained overload.
pub static POOL_LANE_CAPACITY: Lazy<usize> =
	lazy_env_parse!("COREKIT_POOL_LANE_CAPACITY", usize, 256);

/// Default arity of the global process-wide pool: `ncpu - 1` per §4.2,
/// floored at 1.
pub fn global_pool_arity() -> usize {
	num_cpus::get().saturating_sub(1).max(1)
}

/// Sanity threshold beyond which a string atom is rejected rather than
/// written (§4.5). Chosen generously above any legitimate identifier or
/// path while still catching runaway/corrupt data.
pub static STRING_SANITY_LIMIT: Lazy<usize> =
	lazy_env_parse!("COREKIT_STRING_SANITY_LIMIT", usize, 16 * 1024 * 1024);

/// 4-byte canary written before every atom by the type-guard validator
/// (§4.5), ahead of the 4-character type tag.
pub const GUARD_CANARY: u32 = 0xC0DE_FEED;

/// Capacity of the bounded channel handing blocks from an [`crate::io`]
/// reader/writer producer task to its consumer (§5 "Suspension points").
/// Small enough to bound memory held by in-flight pages, large enough
/// that a fast consumer doesn't constantly stall the producer task.
pub static IO_CHANNEL_CAPACITY: Lazy<usize> =
	lazy_env_parse!("COREKIT_IO_CHANNEL_CAPACITY", usize, 4);
