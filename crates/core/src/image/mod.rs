//! Embedded binary images: ingestion, normalization for the target device, JPEG density patch.

pub mod binary;
pub mod jfif;
pub mod normalize;

pub use binary::{BinaryImage, ImageKind, ProcessingFlags};
pub use normalize::flush_image;
