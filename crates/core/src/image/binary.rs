//! Ingestion of FB2 `binary` payloads.

use std::ops::BitOr;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use image::{DynamicImage, ImageFormat};

use crate::error::ConvertError;
use crate::security::{self, SecurityLimits};

/// Directory (relative to the working root) all images are stored in.
pub const IMAGES_DIR: &str = "OEBPS/images";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageKind {
    Jpeg,
    Png,
    Gif,
    Bmp,
    Svg,
    Other,
}

impl ImageKind {
    pub fn from_format(format: ImageFormat) -> Self {
        match format {
            ImageFormat::Jpeg => Self::Jpeg,
            ImageFormat::Png => Self::Png,
            ImageFormat::Gif => Self::Gif,
            ImageFormat::Bmp => Self::Bmp,
            _ => Self::Other,
        }
    }

    /// Best guess from a declared `content-type`.
    pub fn from_declared(content_type: &str) -> Self {
        let ct = content_type.trim().to_ascii_lowercase();
        if ct.ends_with("svg") || ct.ends_with("svg+xml") {
            Self::Svg
        } else if ct.ends_with("jpeg") || ct.ends_with("jpg") {
            Self::Jpeg
        } else if ct.ends_with("png") {
            Self::Png
        } else if ct.ends_with("gif") {
            Self::Gif
        } else if ct.ends_with("bmp") {
            Self::Bmp
        } else {
            Self::Other
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            Self::Jpeg => "jpg",
            Self::Png => "png",
            Self::Gif => "gif",
            Self::Bmp => "bmp",
            Self::Svg => "svg",
            Self::Other => "bin",
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            Self::Jpeg => "image/jpeg",
            Self::Png => "image/png",
            Self::Gif => "image/gif",
            Self::Bmp => "image/bmp",
            Self::Svg => "image/svg+xml",
            Self::Other => "application/octet-stream",
        }
    }

    /// Raster types Kindle devices render natively.
    pub fn kindle_supported(&self) -> bool {
        matches!(self, Self::Jpeg | Self::Png | Self::Gif)
    }
}

/// Flush-time processing requested for an image.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProcessingFlags(u8);

impl ProcessingFlags {
    pub const NONE: Self = Self(0);
    /// Re-encode as JPEG for a device that cannot render the source type.
    pub const TARGET_REENCODE: Self = Self(1);
    pub const STRIP_ALPHA: Self = Self(1 << 1);
    pub const RESCALE: Self = Self(1 << 2);

    pub fn contains(&self, other: Self) -> bool {
        self.0 & other.0 == other.0 && other.0 != 0
    }

    pub fn insert(&mut self, other: Self) {
        self.0 |= other.0;
    }

    pub fn remove(&mut self, other: Self) {
        self.0 &= !other.0;
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }
}

impl BitOr for ProcessingFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

#[derive(Debug, Clone)]
pub struct BinaryImage {
    pub id: String,
    pub declared_type: String,
    pub kind: ImageKind,
    /// `binNNNNNNNN.ext`, stored under [`IMAGES_DIR`].
    pub filename: String,
    pub index: usize,
    pub flags: ProcessingFlags,
    pub scale_factor: f64,
    pub data: Vec<u8>,
    pub bitmap: Option<DynamicImage>,
    /// Undecodable image kept as-is; never processed.
    pub untouched: bool,
}

/// Options that decide how an ingested image is flagged.
#[derive(Debug, Clone, Default)]
pub struct IngestOptions {
    pub kindle: bool,
    pub remove_png_transparency: bool,
    pub scale_factor: f64,
    pub use_broken: bool,
    pub limits: SecurityLimits,
}

/// Filename for the image at ingestion index `index`.
pub fn image_file_name(index: usize, kind: ImageKind) -> String {
    format!("bin{:08}.{}", index, kind.extension())
}

/// Base64 decode, tolerating whitespace anywhere inside the payload.
pub fn decode_base64(id: &str, text: &str) -> Result<Vec<u8>, ConvertError> {
    let compact: Vec<u8> = text.bytes().filter(|b| !b.is_ascii_whitespace()).collect();
    STANDARD.decode(&compact).map_err(|source| ConvertError::Binary {
        id: id.to_string(),
        source,
    })
}

impl BinaryImage {
    /// Decode and classify one `binary` element.
    ///
    /// `Ok(None)` means the image was dropped: empty payload, or undecodable
    /// with broken-image tolerance off.
    pub fn ingest(
        id: &str,
        declared_type: &str,
        payload: &str,
        index: usize,
        opts: &IngestOptions,
    ) -> Result<Option<Self>, ConvertError> {
        let data = decode_base64(id, payload)?;
        if data.is_empty() {
            tracing::warn!("Binary '{}' has no data, skipping", id);
            return Ok(None);
        }
        security::check_resource_size(id, data.len() as u64, &opts.limits)?;

        if ImageKind::from_declared(declared_type) == ImageKind::Svg {
            return Ok(Some(Self {
                id: id.to_string(),
                declared_type: declared_type.to_string(),
                kind: ImageKind::Svg,
                filename: image_file_name(index, ImageKind::Svg),
                index,
                flags: ProcessingFlags::NONE,
                scale_factor: 0.0,
                data,
                bitmap: None,
                untouched: true,
            }));
        }

        let decoded = image::guess_format(&data)
            .and_then(|format| image::load_from_memory_with_format(&data, format).map(|img| (format, img)));

        let (format, bitmap) = match decoded {
            Ok(v) => v,
            Err(e) if opts.use_broken => {
                tracing::warn!("Unable to decode image '{}', keeping it as is: {}", id, e);
                let kind = ImageKind::from_declared(declared_type);
                return Ok(Some(Self {
                    id: id.to_string(),
                    declared_type: declared_type.to_string(),
                    kind,
                    filename: image_file_name(index, kind),
                    index,
                    flags: ProcessingFlags::NONE,
                    scale_factor: 0.0,
                    data,
                    bitmap: None,
                    untouched: true,
                }));
            }
            Err(e) => {
                tracing::warn!("Unable to decode image '{}', skipping: {}", id, e);
                return Ok(None);
            }
        };

        let kind = ImageKind::from_format(format);
        if ImageKind::from_declared(declared_type) != kind {
            tracing::warn!(
                "Declared and detected image types do not match for '{}': '{}' vs '{}'",
                id,
                declared_type,
                kind.mime_type()
            );
        }

        let mut flags = ProcessingFlags::NONE;
        let mut scale_factor = 0.0;
        if opts.kindle && !kind.kindle_supported() {
            flags.insert(ProcessingFlags::TARGET_REENCODE);
        }
        if opts.remove_png_transparency && kind == ImageKind::Png {
            flags.insert(ProcessingFlags::STRIP_ALPHA);
        }
        if opts.scale_factor > 0.0 && matches!(kind, ImageKind::Png | ImageKind::Jpeg) {
            flags.insert(ProcessingFlags::RESCALE);
            scale_factor = opts.scale_factor;
        }

        // Pages link to the stored name, so it reflects the re-encoded type.
        let stored = if flags.contains(ProcessingFlags::TARGET_REENCODE) {
            ImageKind::Jpeg
        } else {
            kind
        };

        Ok(Some(Self {
            id: id.to_string(),
            declared_type: declared_type.to_string(),
            kind,
            filename: image_file_name(index, stored),
            index,
            flags,
            scale_factor,
            data,
            bitmap: Some(bitmap),
            untouched: false,
        }))
    }

    /// Media type of the stored file after normalization.
    pub fn target_mime_type(&self) -> &'static str {
        if self.flags.contains(ProcessingFlags::TARGET_REENCODE) && !self.untouched && self.kind != ImageKind::Svg {
            ImageKind::Jpeg.mime_type()
        } else {
            self.kind.mime_type()
        }
    }

    /// Path relative to `OEBPS/`, as referenced from pages.
    pub fn href(&self) -> String {
        format!("images/{}", self.filename)
    }
}
