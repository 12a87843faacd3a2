//! Address-space model of a loaded image.
//!
//! An [`image::ImageView`] holds the mapped bytes; a [`module::Module`]
//! splits it into named [`segment::Segment`]s and exposes exports and
//! function reconstruction.

pub mod function;
pub mod image;
pub mod instruction;
pub mod module;
pub mod segment;
