//! Packagers for the staged book tree: a zip writer for EPUB and a codec
//! seam for the Kindle formats.

pub mod epub;
pub mod kindle;

pub use epub::write_epub;
pub use kindle::{KindleCodec, KindlegenCodec};
