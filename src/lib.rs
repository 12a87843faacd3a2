//! Runtime signature resolution for a loaded PE image.
//!
//! The host program exports only part of what a plugin needs. The rest is
//! located by scanning the mapped image: unique strings anchor a search,
//! heuristics propose candidate addresses, and an independent source
//! (export call lists, parsed function bodies) confirms exactly one.

pub mod analysis;
pub mod config;
pub mod core;
pub mod disasm;
pub mod error;
pub mod fatal;
pub mod formats;
pub mod host;
pub mod logging;
pub mod resolve;
#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use config::ResolverConfig;
pub use core::image::ImageView;
pub use core::module::Module;
pub use core::segment::Segment;
pub use error::{FatalError, Result};
pub use resolve::{NotifierAddresses, Resolution, Resolver, Unresolved, UnresolvedReason};
