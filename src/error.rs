//! Error types for signature resolution.
//!
//! Structural violations (a malformed image, overlapping sections, an address
//! that lies outside every segment) are reported as [`FatalError`]. These are
//! never expected on a well-formed host image and are routed to process
//! termination by [`crate::fatal`]. Expected absence of a symbol is modelled
//! separately in [`crate::resolve::Unresolved`].

use thiserror::Error;

use crate::formats::pe::PeError;

/// Structural error that invalidates the whole analysis.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FatalError {
    /// Image headers could not be parsed
    #[error("malformed image header in {module}: {source}")]
    MalformedHeader {
        module: String,
        #[source]
        source: PeError,
    },

    /// DOS header points further into the image than allowed
    #[error("header offset {offset:#x} in {module} exceeds the maximum of {max:#x}")]
    ExcessiveHeaderOffset {
        module: String,
        offset: u32,
        max: u32,
    },

    /// Two sections share a name
    #[error("duplicate segment {name} in {module}")]
    DuplicateSegment { module: String, name: String },

    /// Two sections share address space
    #[error("segment {first} overlaps segment {second} in {module}")]
    SegmentOverlap {
        module: String,
        first: String,
        second: String,
    },

    /// A section extends beyond the mapped image
    #[error("segment {name} in {module} ends at {end:#x}, past the image end {image_end:#x}")]
    SegmentOutsideImage {
        module: String,
        name: String,
        end: u64,
        image_end: u64,
    },

    /// Address not strictly inside the expected range
    #[error("address {address:#x} is out of bounds for {scope}")]
    AddressOutOfBounds { scope: String, address: u64 },

    /// A segment the caller depends on is absent
    #[error("required segment {name} is missing from {module}")]
    MissingSegment { module: String, name: String },

    /// Configuration values that cannot drive the analysis
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// No image could be located for the current process
    #[error("host image unavailable: {0}")]
    NoHostImage(String),

    /// A mandatory symbol could not be resolved
    #[error("{symbol} could not be resolved: {reason}")]
    Unresolved { symbol: String, reason: String },
}

impl FatalError {
    /// Name of the module the error was raised for, when one applies.
    pub fn module(&self) -> Option<&str> {
        match self {
            Self::MalformedHeader { module, .. }
            | Self::ExcessiveHeaderOffset { module, .. }
            | Self::DuplicateSegment { module, .. }
            | Self::SegmentOverlap { module, .. }
            | Self::SegmentOutsideImage { module, .. }
            | Self::MissingSegment { module, .. } => Some(module),
            _ => None,
        }
    }
}

/// Result type alias for fallible structural operations
pub type Result<T> = std::result::Result<T, FatalError>;
