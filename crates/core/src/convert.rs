//! File level entry point: read an `.fb2` (or a zip holding one) and write
//! the converted book into an output directory.

use std::io::{Cursor, Read};
use std::path::{Path, PathBuf};

use crate::config::ConvertConfig;
use crate::error::{ConvertError, ParseError};
use crate::format::OutputFormat;
use crate::processor::{JobOptions, Processor};
use crate::progress::ProgressHandler;
use crate::security::{self, SecurityLimits};

const ZIP_MAGIC: &[u8] = b"PK\x03\x04";

/// Where the result ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConvertOutcome {
    pub output: PathBuf,
    /// Working directory, when the job was asked to keep it.
    pub retained_workdir: Option<PathBuf>,
}

/// Convert `input` into `out_dir` using `format`.
pub fn convert_path(
    input: &Path,
    out_dir: &Path,
    format: OutputFormat,
    config: ConvertConfig,
    charset: Option<&str>,
    opts: JobOptions,
    progress: Option<&dyn ProgressHandler>,
) -> Result<ConvertOutcome, ConvertError> {
    let (bytes, source_name) = read_source(input, &opts.limits)?;
    tracing::info!("Converting {} to {}", source_name, format.extension());

    let mut processor = Processor::new(&bytes, charset, &source_name, format, config, opts)?;
    processor.process(progress)?;
    let output = processor.save(out_dir)?;
    let retained_workdir = processor.finish();
    Ok(ConvertOutcome {
        output,
        retained_workdir,
    })
}

/// Raw source bytes plus the name used for the default output file name.
///
/// A zip archive is searched for its first `.fb2` entry.
pub fn read_source(input: &Path, limits: &SecurityLimits) -> Result<(Vec<u8>, String), ConvertError> {
    let bytes = std::fs::read(input)?;
    let file_name = input
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "book.fb2".to_string());

    if !bytes.starts_with(ZIP_MAGIC) {
        security::check_resource_size(&file_name, bytes.len() as u64, limits)?;
        return Ok((bytes, file_name));
    }

    let archive_err = |e: zip::result::ZipError| ParseError::Archive(format!("{}: {}", input.display(), e));
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).map_err(archive_err)?;
    for i in 0..archive.len() {
        let mut entry = archive.by_index(i).map_err(archive_err)?;
        let name = entry.name().to_string();
        if entry.is_dir() || !name.to_lowercase().ends_with(".fb2") {
            continue;
        }
        security::check_path_traversal(&name)?;
        security::check_resource_size(&name, entry.size(), limits)?;

        let mut data = Vec::with_capacity(entry.size() as usize);
        entry.read_to_end(&mut data)?;
        tracing::debug!("Using archive entry {}", name);
        let base = name.rsplit('/').next().unwrap_or(&name).to_string();
        return Ok((data, base));
    }
    Err(ParseError::Archive(format!("{}: no .fb2 entry found", input.display())).into())
}
