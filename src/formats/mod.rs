//! Executable format parsers.

pub mod pe;
