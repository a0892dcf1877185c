//! Kindle output goes through an external codec that consumes the staged
//! OPF tree. The library never builds MOBI/AZW3 containers itself.

use std::path::{Path, PathBuf};
use std::process::Command;

use crate::error::PackageError;
use crate::format::OutputFormat;

/// Turns a staged `content.opf` into a Kindle container.
pub trait KindleCodec: Send + Sync {
    fn convert(&self, opf: &Path, format: OutputFormat, output: &Path) -> Result<(), PackageError>;
}

/// Runs a kindlegen compatible program.
///
/// The program is called as `<program> content.opf -c1 -dont_append_source -o <name>`
/// and writes `<name>` next to the OPF; the result is then moved to the output
/// path. Exit status 1 means "built with warnings" and is accepted.
#[derive(Debug, Clone)]
pub struct KindlegenCodec {
    pub program: PathBuf,
    /// Compression level passed as `-cN`.
    pub compression: u8,
}

impl KindlegenCodec {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            compression: 1,
        }
    }
}

impl KindleCodec for KindlegenCodec {
    fn convert(&self, opf: &Path, format: OutputFormat, output: &Path) -> Result<(), PackageError> {
        let dir = opf.parent().unwrap_or(Path::new("."));
        let name = format!("book.{}", format.extension());

        tracing::debug!("Running {} for {}", self.program.display(), opf.display());
        let result = Command::new(&self.program)
            .arg(opf)
            .arg(format!("-c{}", self.compression))
            .arg("-dont_append_source")
            .arg("-o")
            .arg(&name)
            .output()
            .map_err(|e| PackageError::Codec(format!("unable to run {}: {}", self.program.display(), e)))?;

        let code = result.status.code();
        if !matches!(code, Some(0) | Some(1)) {
            let stdout = String::from_utf8_lossy(&result.stdout);
            let last = stdout.lines().rev().find(|l| !l.trim().is_empty()).unwrap_or("");
            return Err(PackageError::Codec(format!(
                "{} exited with {:?}: {}",
                self.program.display(),
                code,
                last.trim()
            )));
        }
        if code == Some(1) {
            tracing::warn!("{} reported warnings for {}", self.program.display(), opf.display());
        }

        let produced = dir.join(&name);
        if !produced.is_file() {
            return Err(PackageError::Codec(format!(
                "{} did not produce {}",
                self.program.display(),
                produced.display()
            )));
        }
        if std::fs::rename(&produced, output).is_err() {
            // Across file systems rename fails; copy instead.
            std::fs::copy(&produced, output)?;
            std::fs::remove_file(&produced)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_program_is_codec_error() {
        let dir = tempfile::tempdir().unwrap();
        let opf = dir.path().join("content.opf");
        std::fs::write(&opf, "<package/>").unwrap();
        let codec = KindlegenCodec::new(dir.path().join("no-such-kindlegen"));
        let err = codec.convert(&opf, OutputFormat::Mobi, &dir.path().join("out.mobi"));
        assert!(matches!(err, Err(PackageError::Codec(_))));
    }

    #[cfg(unix)]
    fn script(dir: &Path, name: &str, body: &str) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;

        let path = dir.join(name);
        std::fs::write(&path, body).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    // One test so the scripts are never written while another test forks.
    #[cfg(unix)]
    #[test]
    fn exit_statuses() {
        let dir = tempfile::tempdir().unwrap();
        let oebps = dir.path().join("OEBPS");
        std::fs::create_dir(&oebps).unwrap();
        let opf = oebps.join("content.opf");
        std::fs::write(&opf, "<package/>").unwrap();

        let warns = script(
            dir.path(),
            "fake-kindlegen",
            "#!/bin/sh\nd=$(dirname \"$1\")\nfor last; do :; done\necho mobi > \"$d/$last\"\nexit 1\n",
        );
        let broken = script(dir.path(), "broken-kindlegen", "#!/bin/sh\necho 'Error(prcgen): bad opf'\nexit 2\n");

        let out = dir.path().join("out.azw3");
        KindlegenCodec::new(&warns).convert(&opf, OutputFormat::Azw3, &out).unwrap();
        assert_eq!(std::fs::read_to_string(&out).unwrap(), "mobi\n");
        assert!(!oebps.join("book.azw3").exists());

        let err = KindlegenCodec::new(&broken)
            .convert(&opf, OutputFormat::Mobi, &dir.path().join("o.mobi"))
            .unwrap_err();
        assert!(err.to_string().contains("bad opf"));
    }
}
