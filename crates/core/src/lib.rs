//! FictionBook2 to EPUB, MOBI and AZW3 conversion.
//!
//! [`processor::Processor`] runs one job: decode and parse the source, push it
//! through the [`pipeline`] stages, stage the result in a working directory and
//! package it. [`convert::convert_path`] wraps that for files on disk.

pub mod book;
pub mod config;
pub mod convert;
pub mod cover;
pub mod encoding;
pub mod error;
pub mod format;
pub mod hyphenation;
pub mod image;
pub mod language;
pub mod pipeline;
pub mod processor;
pub mod progress;
pub mod rename;
pub mod security;
pub mod transformer;
pub mod workdir;
pub mod writers;
pub mod xml;

pub mod prelude {
    pub use crate::book::Book;
    pub use crate::config::{load_config, ConvertConfig};
    pub use crate::convert::{convert_path, ConvertOutcome};
    pub use crate::error::*;
    pub use crate::format::OutputFormat;
    pub use crate::processor::{JobOptions, Processor};
    pub use crate::writers::{KindleCodec, KindlegenCodec};
}
