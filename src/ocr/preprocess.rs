use super::FieldKind;
use crate::error::{AppError, Result};
use crate::reading::Field;
use image::imageops::{self, FilterType};
use image::{GrayImage, Luma};

/// Below this spread between darkest and lightest pixel the image is
/// treated as blank.
const MIN_CONTRAST: u8 = 48;

/// White border added around the glyphs; the engine misreads characters
/// touching the image edge.
const PADDING: u32 = 8;

/// Decode and normalize one field image for recognition.
///
/// Steps: alpha-composite onto white and convert to grayscale, stretch to a
/// binary black-on-white bitmap, upscale by an integer factor until the glyph
/// height reaches `min_height` (time fields get half again as much because
/// their separators are only a few pixels wide), then pad.
pub fn preprocess(
    field: Field,
    kind: FieldKind,
    bytes: &[u8],
    min_height: u32,
) -> Result<GrayImage> {
    let decoded = image::load_from_memory(bytes).map_err(|e| AppError::Ocr {
        field: field.to_string(),
        raw: String::new(),
        reason: format!("cannot decode image: {}", e),
    })?;

    let gray = flatten_to_gray(&decoded.to_rgba8());
    let binary = binarize(&gray).ok_or_else(|| AppError::Ocr {
        field: field.to_string(),
        raw: String::new(),
        reason: "blank image".to_string(),
    })?;

    let target = match kind {
        FieldKind::Numeric => min_height,
        FieldKind::Time => min_height + min_height / 2,
    };
    let scaled = upscale(&binary, target);

    Ok(pad(&scaled, PADDING))
}

fn flatten_to_gray(rgba: &image::RgbaImage) -> GrayImage {
    GrayImage::from_fn(rgba.width(), rgba.height(), |x, y| {
        let [r, g, b, a] = rgba.get_pixel(x, y).0;
        let luma = 0.299 * r as f32 + 0.587 * g as f32 + 0.114 * b as f32;
        let alpha = a as f32 / 255.0;
        let blended = luma * alpha + 255.0 * (1.0 - alpha);
        Luma([blended.round().clamp(0.0, 255.0) as u8])
    })
}

/// Threshold at the midpoint of the observed range. Returns `None` when the
/// image has no usable contrast.
fn binarize(gray: &GrayImage) -> Option<GrayImage> {
    let (min, max) = gray
        .pixels()
        .fold((u8::MAX, u8::MIN), |(lo, hi), p| (lo.min(p.0[0]), hi.max(p.0[0])));

    if gray.width() == 0 || gray.height() == 0 || max.saturating_sub(min) < MIN_CONTRAST {
        return None;
    }

    let threshold = ((min as u16 + max as u16) / 2) as u8;
    let dark = gray.pixels().filter(|p| p.0[0] <= threshold).count();
    let total = (gray.width() * gray.height()) as usize;
    // Glyphs cover less area than background; invert light-on-dark images.
    let invert = dark * 2 > total;

    Some(GrayImage::from_fn(gray.width(), gray.height(), |x, y| {
        let is_dark = gray.get_pixel(x, y).0[0] <= threshold;
        if is_dark != invert {
            Luma([0])
        } else {
            Luma([255])
        }
    }))
}

fn upscale(image: &GrayImage, min_height: u32) -> GrayImage {
    if image.height() >= min_height {
        return image.clone();
    }
    let factor = min_height.div_ceil(image.height());
    imageops::resize(
        image,
        image.width() * factor,
        image.height() * factor,
        FilterType::Nearest,
    )
}

fn pad(image: &GrayImage, padding: u32) -> GrayImage {
    let mut canvas = GrayImage::from_pixel(
        image.width() + padding * 2,
        image.height() + padding * 2,
        Luma([255]),
    );
    imageops::overlay(&mut canvas, image, padding as i64, padding as i64);
    canvas
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, Rgba, RgbaImage};
    use std::io::Cursor;

    fn png(image: &RgbaImage) -> Vec<u8> {
        let mut bytes = Vec::new();
        image
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .unwrap();
        bytes
    }

    fn glyph_image(fg: [u8; 4], bg: [u8; 4]) -> RgbaImage {
        RgbaImage::from_fn(30, 12, |x, y| {
            if (4..8).contains(&x) && (2..10).contains(&y) {
                Rgba(fg)
            } else {
                Rgba(bg)
            }
        })
    }

    #[test]
    fn test_upscales_and_pads() {
        let bytes = png(&glyph_image([0, 0, 0, 255], [255, 255, 255, 255]));
        let out = preprocess(Field::Temperature, FieldKind::Numeric, &bytes, 48).unwrap();

        // 12px high needs a factor of 4 to reach 48px.
        assert_eq!(out.height(), 48 + 2 * PADDING);
        assert_eq!(out.width(), 120 + 2 * PADDING);
        assert!(out.pixels().all(|p| p.0[0] == 0 || p.0[0] == 255));
    }

    #[test]
    fn test_time_fields_upscale_further() {
        let bytes = png(&glyph_image([0, 0, 0, 255], [255, 255, 255, 255]));
        let out = preprocess(Field::MeasurementTime, FieldKind::Time, &bytes, 48).unwrap();
        assert_eq!(out.height(), 72 + 2 * PADDING);
    }

    #[test]
    fn test_light_on_dark_is_inverted() {
        let bytes = png(&glyph_image([250, 250, 250, 255], [10, 10, 40, 255]));
        let out = preprocess(Field::Humidity, FieldKind::Numeric, &bytes, 12).unwrap();

        let dark = out.pixels().filter(|p| p.0[0] == 0).count();
        let light = out.pixels().filter(|p| p.0[0] == 255).count();
        assert!(dark < light, "background should end up white");
        assert_eq!(out.get_pixel(PADDING + 5, PADDING + 5).0[0], 0);
    }

    #[test]
    fn test_transparent_background_becomes_white() {
        let bytes = png(&glyph_image([0, 0, 0, 255], [0, 0, 0, 0]));
        let out = preprocess(Field::Temperature, FieldKind::Numeric, &bytes, 12).unwrap();
        assert_eq!(out.get_pixel(PADDING, PADDING).0[0], 255);
        assert_eq!(out.get_pixel(PADDING + 5, PADDING + 5).0[0], 0);
    }

    #[test]
    fn test_blank_image_is_ocr_error() {
        let blank = RgbaImage::from_pixel(30, 12, Rgba([255, 255, 255, 255]));
        let err = preprocess(Field::DewPoint, FieldKind::Numeric, &png(&blank), 48).unwrap_err();
        match err {
            AppError::Ocr { field, reason, .. } => {
                assert_eq!(field, "dew_point");
                assert!(reason.contains("blank"));
            }
            e => panic!("Expected Ocr error, got: {:?}", e),
        }
    }

    #[test]
    fn test_undecodable_bytes_are_ocr_error() {
        let err =
            preprocess(Field::Temperature, FieldKind::Numeric, b"not an image", 48).unwrap_err();
        assert!(matches!(err, AppError::Ocr { .. }));
    }
}
