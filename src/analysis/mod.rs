//! Searches and heuristics over segments.
//!
//! Byte-pattern search, function-entry candidates, control-flow driven
//! function parsing, and the helpers that reduce candidate sets to a single
//! survivor.

pub mod cfg;
pub mod crossval;
pub mod entries;
pub mod search;
