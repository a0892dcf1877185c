//! Cover image handling: default cover synthesis, sizing and stamping.

use image::imageops::FilterType;
use image::{DynamicImage, Rgb, RgbImage};

use crate::config::{CoverConfig, CoverResize, StampPlacement};
use crate::error::{ConvertError, ImageError};
use crate::image::binary::image_file_name;
use crate::image::jfif::{self, DEFAULT_DPI};
use crate::image::normalize::encode;
use crate::image::{BinaryImage, ImageKind, ProcessingFlags};

pub const DEFAULT_COVER_ID: &str = "fb2c-default-cover";

const BACKGROUND: Rgb<u8> = Rgb([236, 232, 222]);
const STAMP_COLOR: Rgb<u8> = Rgb([60, 60, 60]);

/// Build the default cover for a book without one.
///
/// Uses `cover.default_image` when configured (unreadable or undecodable is
/// fatal), otherwise a plain generated bitmap of the configured size.
pub fn default_cover(cfg: &CoverConfig, index: usize) -> Result<BinaryImage, ConvertError> {
    let (kind, data, bitmap) = match &cfg.default_image {
        Some(path) => {
            let data = std::fs::read(path)
                .map_err(|e| ConvertError::DefaultCover(format!("{}: {}", path.display(), e)))?;
            let format = image::guess_format(&data)
                .map_err(|e| ConvertError::DefaultCover(format!("{}: {}", path.display(), e)))?;
            let bitmap = image::load_from_memory_with_format(&data, format)
                .map_err(|e| ConvertError::DefaultCover(format!("{}: {}", path.display(), e)))?;
            (ImageKind::from_format(format), data, bitmap)
        }
        None => {
            let bitmap = DynamicImage::ImageRgb8(RgbImage::from_pixel(
                cfg.width.max(1),
                cfg.height.max(1),
                BACKGROUND,
            ));
            let data = encode(&bitmap, ImageKind::Jpeg).map_err(|e| ConvertError::DefaultCover(e.to_string()))?;
            (ImageKind::Jpeg, data, bitmap)
        }
    };

    tracing::debug!("Using default cover ({})", kind.mime_type());
    Ok(BinaryImage {
        id: DEFAULT_COVER_ID.to_string(),
        declared_type: kind.mime_type().to_string(),
        kind,
        filename: image_file_name(index, kind),
        index,
        flags: ProcessingFlags::NONE,
        scale_factor: 0.0,
        data,
        bitmap: Some(bitmap),
        untouched: false,
    })
}

/// Resize and stamp a raster cover in place. SVG and broken covers are left alone.
/// Returns `true` when the image was changed.
pub fn prepare_cover(
    img: &mut BinaryImage,
    resize: CoverResize,
    width: u32,
    height: u32,
    stamp: Option<StampPlacement>,
) -> Result<bool, ImageError> {
    if img.untouched || img.kind == ImageKind::Svg {
        return Ok(false);
    }
    let stamp = stamp.filter(|s| *s != StampPlacement::None);
    if resize == CoverResize::None && stamp.is_none() {
        return Ok(false);
    }

    let mut bitmap = match img.bitmap.take() {
        Some(b) => b,
        None => image::load_from_memory(&img.data).map_err(ImageError::Decode)?,
    };

    bitmap = resize_cover(bitmap, resize, width, height);
    if let Some(placement) = stamp {
        bitmap = stamp_cover(bitmap, placement);
    }

    // Only PNG and JPEG are re-encoded; anything else becomes JPEG.
    let kind = match img.kind {
        ImageKind::Png => ImageKind::Png,
        _ => ImageKind::Jpeg,
    };
    let mut data = encode(&bitmap, kind)?;
    if kind == ImageKind::Jpeg {
        data = jfif::set_jpeg_dpi(data, DEFAULT_DPI).0;
    }
    if kind != img.kind {
        img.kind = kind;
        img.filename = image_file_name(img.index, kind);
    }
    img.data = data;
    img.bitmap = Some(bitmap);
    // Already in final form; flush must not redo it.
    img.flags = ProcessingFlags::NONE;
    Ok(true)
}

fn resize_cover(bitmap: DynamicImage, mode: CoverResize, width: u32, height: u32) -> DynamicImage {
    let (w, h) = (bitmap.width(), bitmap.height());
    if width == 0 || height == 0 || w == 0 || h == 0 {
        return bitmap;
    }
    match mode {
        CoverResize::None => bitmap,
        CoverResize::Stretch if (w, h) != (width, height) => bitmap.resize_exact(width, height, FilterType::Lanczos3),
        CoverResize::KeepAspect if h != height => {
            let new_w = ((w as f64 * height as f64 / h as f64).round() as u32).max(1);
            bitmap.resize_exact(new_w, height, FilterType::Lanczos3)
        }
        _ => bitmap,
    }
}

/// Paint a horizontal band at the requested position.
fn stamp_cover(bitmap: DynamicImage, placement: StampPlacement) -> DynamicImage {
    let mut rgb = bitmap.to_rgb8();
    let (w, h) = rgb.dimensions();
    let band = (h / 8).max(1);
    let top = match placement {
        StampPlacement::Top => h / 16,
        StampPlacement::Middle => h.saturating_sub(band) / 2,
        StampPlacement::Bottom => h.saturating_sub(band + h / 16),
        StampPlacement::None => return DynamicImage::ImageRgb8(rgb),
    };
    for y in top..(top + band).min(h) {
        for x in 0..w {
            let p = rgb.get_pixel_mut(x, y);
            for (c, s) in p.0.iter_mut().zip(STAMP_COLOR.0) {
                *c = ((*c as u16 + 3 * s as u16) / 4) as u8;
            }
        }
    }
    DynamicImage::ImageRgb8(rgb)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::ImageFormat;

    fn small_config() -> CoverConfig {
        CoverConfig {
            width: 60,
            height: 80,
            ..Default::default()
        }
    }

    #[test]
    fn generated_default_cover_is_jpeg() {
        let img = default_cover(&small_config(), 4).unwrap();
        assert_eq!(img.id, DEFAULT_COVER_ID);
        assert_eq!(img.kind, ImageKind::Jpeg);
        assert_eq!(img.filename, "bin00000004.jpg");
        assert_eq!(image::guess_format(&img.data).unwrap(), ImageFormat::Jpeg);
    }

    #[test]
    fn unreadable_default_image_is_fatal() {
        let cfg = CoverConfig {
            default_image: Some("/nonexistent/cover.jpg".into()),
            ..small_config()
        };
        assert!(matches!(default_cover(&cfg, 0), Err(ConvertError::DefaultCover(_))));

        let dir = tempfile::tempdir().unwrap();
        let junk = dir.path().join("cover.png");
        std::fs::write(&junk, b"not an image").unwrap();
        let cfg = CoverConfig {
            default_image: Some(junk),
            ..small_config()
        };
        assert!(default_cover(&cfg, 0).is_err());
    }

    #[test]
    fn stretch_resizes_to_configured_size() {
        let mut img = default_cover(&small_config(), 0).unwrap();
        let changed = prepare_cover(&mut img, CoverResize::Stretch, 30, 50, None).unwrap();
        assert!(changed);
        let decoded = image::load_from_memory(&img.data).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (30, 50));
    }

    #[test]
    fn keep_aspect_scales_to_height() {
        let mut img = default_cover(&small_config(), 0).unwrap();
        prepare_cover(&mut img, CoverResize::KeepAspect, 1000, 160, None).unwrap();
        let bitmap = img.bitmap.as_ref().unwrap();
        assert_eq!((bitmap.width(), bitmap.height()), (120, 160));
    }

    #[test]
    fn stamp_darkens_band() {
        let mut img = default_cover(&small_config(), 0).unwrap();
        prepare_cover(&mut img, CoverResize::None, 0, 0, Some(StampPlacement::Middle)).unwrap();
        let rgb = img.bitmap.as_ref().unwrap().to_rgb8();
        assert_eq!(rgb.get_pixel(0, 0).0, BACKGROUND.0);
        assert!(rgb.get_pixel(30, 40).0[0] < BACKGROUND.0[0]);
    }

    #[test]
    fn nothing_to_do_leaves_image_alone() {
        let mut img = default_cover(&small_config(), 0).unwrap();
        let before = img.data.clone();
        assert!(!prepare_cover(&mut img, CoverResize::None, 10, 10, Some(StampPlacement::None)).unwrap());
        assert_eq!(img.data, before);
    }
}
