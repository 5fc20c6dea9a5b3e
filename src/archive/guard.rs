//! Type-guard validator: a 4-byte canary plus a 4-character type tag
//! written before (and checked after) every atom, to catch schema drift
//! between a writer and a reader compiled from different struct layouts
//! (spec §4.5 "Type-guard validator"). Debug-build tooling only — the
//! closed set of tags below is exhaustive by construction, so there is
//! no reflection involved.

pub const BYTE: &str = "BYTE";
pub const BOOL: &str = "BOOL";
pub const SI32: &str = "SI32";
pub const SI64: &str = "SI64";
pub const UI32: &str = "UI32";
pub const UI64: &str = "UI64";
pub const FT32: &str = "FT32";
pub const FT64: &str = "FT64";
pub const STRG: &str = "STRG";
pub const TIME: &str = "TIME";
pub const RAW_: &str = "RAW_";
pub const SRLZ: &str = "SRLZ";
