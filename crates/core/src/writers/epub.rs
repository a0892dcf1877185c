//! EPUB packaging: the staged working root zipped with `mimetype` first.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::error::PackageError;
use crate::pipeline::{EPUB_MIMETYPE, MIMETYPE_NAME};
use crate::security;

fn zip_err(e: zip::result::ZipError) -> PackageError {
    PackageError::WriteFailed {
        format: "EPUB".into(),
        detail: e.to_string(),
    }
}

/// Zip everything under `root` into `output`.
///
/// `mimetype` goes first and uncompressed (EPUB requirement); every other file
/// follows in path order, deflated.
pub fn write_epub(root: &Path, output: &Path) -> Result<(), PackageError> {
    let mut entries = Vec::new();
    collect_files(root, root, &mut entries)?;
    entries.sort();

    let file = File::create(output)?;
    let mut zip = zip::ZipWriter::new(BufWriter::new(file));

    let opts_store: zip::write::FileOptions<'_, ()> =
        zip::write::FileOptions::default().compression_method(zip::CompressionMethod::Stored);
    let opts_deflate: zip::write::FileOptions<'_, ()> =
        zip::write::FileOptions::default().compression_method(zip::CompressionMethod::Deflated);

    zip.start_file(MIMETYPE_NAME, opts_store).map_err(zip_err)?;
    zip.write_all(EPUB_MIMETYPE.as_bytes())?;

    for (name, path) in entries.iter().filter(|(name, _)| name != MIMETYPE_NAME) {
        security::check_path_traversal(name)?;
        zip.start_file(name.as_str(), opts_deflate).map_err(zip_err)?;
        zip.write_all(&std::fs::read(path)?)?;
    }

    let mut out = zip.finish().map_err(|e| PackageError::WriteFailed {
        format: "EPUB".into(),
        detail: format!("Zip finish: {}", e),
    })?;
    out.flush()?;
    tracing::debug!("Wrote {} entries to {}", entries.len(), output.display());
    Ok(())
}

/// Every regular file below `dir` as (`/`-separated name relative to `root`, path).
fn collect_files(root: &Path, dir: &Path, out: &mut Vec<(String, PathBuf)>) -> Result<(), PackageError> {
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            collect_files(root, &path, out)?;
            continue;
        }
        let Ok(rel) = path.strip_prefix(root) else { continue };
        let name = rel
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        out.push((name, path));
    }
    Ok(())
}
