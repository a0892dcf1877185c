//! One conversion job: decode, parse, run the pipeline, stage and package.

use std::path::{Path, PathBuf};

use crate::book::{Book, FileContent};
use crate::config::{ConvertConfig, Settings};
use crate::encoding::decode_source;
use crate::error::{ConvertError, PackageError, ParseError};
use crate::format::OutputFormat;
use crate::hyphenation::Hyphenator;
use crate::image::flush_image;
use crate::pipeline::{JobContext, Pipeline, OPF_NAME};
use crate::progress::ProgressHandler;
use crate::rename::output_file_name;
use crate::security::SecurityLimits;
use crate::workdir::WorkDir;
use crate::writers::{write_epub, KindleCodec};
use crate::xml;

/// Per-job knobs that are not part of the user configuration.
#[derive(Default)]
pub struct JobOptions {
    /// Keep the working directory after the job, for debugging.
    pub retain_workdir: bool,
    /// Where to create the working directory; the system temp dir otherwise.
    pub workdir_parent: Option<PathBuf>,
    pub hyphenator: Option<Box<dyn Hyphenator>>,
    /// Required for MOBI and AZW3 output.
    pub codec: Option<Box<dyn KindleCodec>>,
    pub limits: SecurityLimits,
}

/// Owns everything a single conversion touches. The working directory is
/// removed when the processor is dropped unless it was asked to be kept.
pub struct Processor {
    ctx: JobContext,
    workdir: WorkDir,
    codec: Option<Box<dyn KindleCodec>>,
    processed: bool,
}

impl Processor {
    pub fn new(
        input: &[u8],
        charset: Option<&str>,
        source_name: &str,
        format: OutputFormat,
        config: ConvertConfig,
        opts: JobOptions,
    ) -> Result<Self, ConvertError> {
        let workdir = WorkDir::create(opts.workdir_parent.as_deref(), opts.retain_workdir)?;

        let text = decode_source(input, charset)?;
        let source = xml::parse(&text, &opts.limits)?;
        if source.name != "FictionBook" {
            return Err(ParseError::NotFictionBook(source.name).into());
        }

        let settings = Settings::resolve(config, format);
        let mut ctx = JobContext::new(source, Book::new(source_name), settings);
        ctx.hyphenator = opts.hyphenator;
        ctx.limits = opts.limits;

        Ok(Self {
            ctx,
            workdir,
            codec: opts.codec,
            processed: false,
        })
    }

    /// Run every pipeline stage over the parsed book.
    pub fn process(&mut self, progress: Option<&dyn ProgressHandler>) -> Result<(), ConvertError> {
        if self.processed {
            return Ok(());
        }
        Pipeline::standard()?.run(&mut self.ctx, progress)?;
        self.processed = true;
        Ok(())
    }

    pub fn book(&self) -> &Book {
        &self.ctx.book
    }

    pub fn workdir(&self) -> &Path {
        self.workdir.path()
    }

    pub fn format(&self) -> OutputFormat {
        self.ctx.settings.format
    }

    /// File name of the result, from `file_name_format` or the source name.
    pub fn output_name(&self) -> String {
        output_file_name(
            &self.ctx.settings.config.file_name_format,
            &self.ctx.book,
            self.format().extension(),
        )
    }

    /// Stage the book under the working directory and package it into `out_dir`.
    pub fn save(&mut self, out_dir: &Path) -> Result<PathBuf, ConvertError> {
        self.process(None)?;
        let root = self.workdir.path();

        for file in &self.ctx.book.files {
            let path = root.join(file.rel_path());
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            match &file.content {
                FileContent::Markup(el) if file.media_type == "application/xhtml+xml" => {
                    std::fs::write(&path, xml::to_xhtml_document(el))?
                }
                FileContent::Markup(el) => std::fs::write(&path, xml::to_xml_document(el))?,
                FileContent::Text(text) => std::fs::write(&path, text)?,
                FileContent::Bytes(data) => std::fs::write(&path, data)?,
            }
        }
        for img in &self.ctx.book.images {
            flush_image(img, root)?;
        }

        std::fs::create_dir_all(out_dir)?;
        let output = out_dir.join(self.output_name());
        let format = self.format();
        match format {
            OutputFormat::Epub => write_epub(root, &output)?,
            OutputFormat::Mobi | OutputFormat::Azw3 => {
                let codec = self
                    .codec
                    .as_deref()
                    .ok_or_else(|| PackageError::MissingCodec(format.extension().to_string()))?;
                codec.convert(&root.join("OEBPS").join(OPF_NAME), format, &output)?;
            }
        }
        tracing::info!("Saved {}", output.display());
        Ok(output)
    }

    /// Consume the processor. Returns the working directory when it is retained.
    pub fn finish(self) -> Option<PathBuf> {
        self.workdir.release()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BOOK: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<FictionBook xmlns="http://www.gribuser.ru/xml/fictionbook/2.0" xmlns:l="http://www.w3.org/1999/xlink">
<description><title-info><book-title>Small</book-title><lang>en</lang></title-info></description>
<body><section><title><p>Only</p></title><p>Text</p></section></body>
</FictionBook>"#;

    #[test]
    fn wrong_root_is_rejected() {
        let err = Processor::new(
            b"<html/>",
            None,
            "x.fb2",
            OutputFormat::Epub,
            ConvertConfig::default(),
            JobOptions::default(),
        )
        .err()
        .unwrap();
        assert!(matches!(err, ConvertError::Parse(ParseError::NotFictionBook(_))));
    }

    #[test]
    fn kindle_without_codec_fails_to_save() {
        let parent = tempfile::tempdir().unwrap();
        let opts = JobOptions {
            workdir_parent: Some(parent.path().to_path_buf()),
            ..Default::default()
        };
        let mut config = ConvertConfig::default();
        config.cover.width = 60;
        config.cover.height = 80;
        let mut p = Processor::new(BOOK.as_bytes(), None, "small.fb2", OutputFormat::Mobi, config, opts).unwrap();
        let out = tempfile::tempdir().unwrap();
        let err = p.save(out.path()).unwrap_err();
        assert!(matches!(err, ConvertError::Package(PackageError::MissingCodec(_))));
        // Staged tree is still there for inspection until the processor is dropped.
        assert!(p.workdir().join("OEBPS/content.opf").is_file());
        let workdir = p.workdir().to_path_buf();
        assert_eq!(p.finish(), None);
        assert!(!workdir.exists());
    }

    #[test]
    fn output_name_from_source() {
        let parent = tempfile::tempdir().unwrap();
        let opts = JobOptions {
            workdir_parent: Some(parent.path().to_path_buf()),
            ..Default::default()
        };
        let p = Processor::new(BOOK.as_bytes(), None, "small.fb2", OutputFormat::Azw3, ConvertConfig::default(), opts)
            .unwrap();
        assert_eq!(p.output_name(), "small.azw3");
    }
}
