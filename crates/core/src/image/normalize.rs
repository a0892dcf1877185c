//! Flush-time image normalization.
//!
//! decode -> rescale -> strip alpha -> coerce target -> encode -> DPI patch.
//! Every step is fallible; the first failure short-circuits to storing the
//! original bytes. Nothing here aborts a job except writing an empty file.

use std::borrow::Cow;
use std::io::Cursor;
use std::path::{Path, PathBuf};

use image::codecs::jpeg::JpegEncoder;
use image::imageops::{self, FilterType};
use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};

use super::binary::{BinaryImage, ImageKind, ProcessingFlags, IMAGES_DIR};
use super::jfif::{self, DEFAULT_DPI};
use crate::error::{ConvertError, ImageError};

pub const JPEG_QUALITY: u8 = 75;

/// Bytes to store for `img`. Untouched, SVG and unflagged images are returned verbatim.
pub fn normalize(img: &BinaryImage) -> Cow<'_, [u8]> {
    if img.untouched || img.kind == ImageKind::Svg || img.flags.is_empty() {
        return Cow::Borrowed(&img.data);
    }
    match process(img) {
        Ok(buf) => Cow::Owned(buf),
        Err(e) => {
            tracing::warn!("Unable to process image '{}', storing as is: {}", img.id, e);
            Cow::Borrowed(&img.data)
        }
    }
}

/// Normalize `img` and write it to `<root>/OEBPS/images/<filename>`.
pub fn flush_image(img: &BinaryImage, root: &Path) -> Result<PathBuf, ConvertError> {
    let dir = root.join(IMAGES_DIR);
    std::fs::create_dir_all(&dir)?;
    let path = dir.join(&img.filename);

    let data = normalize(img);
    if data.is_empty() {
        return Err(ConvertError::EmptyImage {
            id: img.id.clone(),
            path: path.display().to_string(),
        });
    }
    std::fs::write(&path, &data)?;
    Ok(path)
}

fn process(img: &BinaryImage) -> Result<Vec<u8>, ImageError> {
    let mut bitmap = match &img.bitmap {
        Some(b) => b.clone(),
        None => image::load_from_memory(&img.data).map_err(ImageError::Decode)?,
    };

    if img.flags.contains(ProcessingFlags::RESCALE) {
        bitmap = rescale(&bitmap, img.scale_factor)?;
    }

    if img.flags.contains(ProcessingFlags::STRIP_ALPHA) && !is_opaque(&bitmap) {
        tracing::debug!("Removing PNG transparency from '{}'", img.id);
        bitmap = remove_alpha(&bitmap);
    }

    let mut target = img.kind;
    if img.flags.contains(ProcessingFlags::TARGET_REENCODE) && target != ImageKind::Jpeg {
        tracing::warn!(
            "Image type is not supported by targeted device, converting '{}' ({}) to jpeg",
            img.id,
            img.kind.mime_type()
        );
        target = ImageKind::Jpeg;
    }

    let encoded = encode(&bitmap, target)?;
    if target != ImageKind::Jpeg {
        return Ok(encoded);
    }

    let (patched, inserted) = jfif::set_jpeg_dpi(encoded, DEFAULT_DPI);
    if inserted {
        tracing::debug!("Inserted JFIF APP0 segment into '{}'", img.id);
    }
    Ok(patched)
}

/// Linear resampling to `floor(w*s)` x `floor(h*s)`.
pub fn rescale(bitmap: &DynamicImage, factor: f64) -> Result<DynamicImage, ImageError> {
    let width = (bitmap.width() as f64 * factor).floor() as u32;
    let height = (bitmap.height() as f64 * factor).floor() as u32;
    if width == 0 || height == 0 {
        return Err(ImageError::EmptyScale { width, height });
    }
    Ok(bitmap.resize_exact(width, height, FilterType::Triangle))
}

pub fn is_opaque(bitmap: &DynamicImage) -> bool {
    if !bitmap.color().has_alpha() {
        return true;
    }
    bitmap.to_rgba8().pixels().all(|p| p.0[3] == 255)
}

/// White canvas, source-over composite, opaque RGB result.
pub fn remove_alpha(bitmap: &DynamicImage) -> DynamicImage {
    let mut canvas = RgbaImage::from_pixel(bitmap.width(), bitmap.height(), Rgba([255, 255, 255, 255]));
    imageops::overlay(&mut canvas, &bitmap.to_rgba8(), 0, 0);
    DynamicImage::ImageRgb8(DynamicImage::ImageRgba8(canvas).to_rgb8())
}

pub fn encode(bitmap: &DynamicImage, kind: ImageKind) -> Result<Vec<u8>, ImageError> {
    match kind {
        ImageKind::Png => {
            let mut buf = Cursor::new(Vec::new());
            bitmap
                .write_to(&mut buf, ImageFormat::Png)
                .map_err(|source| ImageError::Encode {
                    format: "png".into(),
                    source,
                })?;
            Ok(buf.into_inner())
        }
        ImageKind::Jpeg => {
            let mut out = Vec::new();
            JpegEncoder::new_with_quality(&mut out, JPEG_QUALITY)
                .encode_image(&bitmap.to_rgb8())
                .map_err(|source| ImageError::Encode {
                    format: "jpeg".into(),
                    source,
                })?;
            Ok(out)
        }
        other => Err(ImageError::Unsupported(other.mime_type().to_string())),
    }
}
