//! Pixel bounding box types, overlap and regression delta functions.

mod common;

pub use pixel_box::*;
pub mod pixel_box;

pub use overlaps::*;
pub mod overlaps;

pub use delta::*;
pub mod delta;
