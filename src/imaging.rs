//! Image probing and thumbnail rendering with the `image` crate.
//!
//! All functions here are CPU-bound and synchronous; handlers call them through
//! `tokio::task::spawn_blocking`.

use std::io::Cursor;

use image::{DynamicImage, ImageFormat, ImageReader, ImageResult, imageops::FilterType};

use crate::models::ThumbnailSize;

/// A rendered JPEG thumbnail ready to be stored.
#[derive(Debug, Clone)]
pub struct RenderedThumbnail {
    pub size: ThumbnailSize,
    pub width: u32,
    pub height: u32,
    pub bytes: Vec<u8>,
}

/// Reads width and height from the image header without decoding pixels. `None` for
/// formats the build does not support (SVG, for instance).
pub fn dimensions(bytes: &[u8]) -> Option<(u32, u32)> {
    ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .ok()?
        .into_dimensions()
        .ok()
}

/// fit_within
///
/// Scales `(width, height)` so the longest side equals `bound`, keeping the aspect
/// ratio. Images already inside the bound are returned unchanged.
pub fn fit_within(width: u32, height: u32, bound: u32) -> (u32, u32) {
    if width <= bound && height <= bound {
        return (width, height);
    }
    let longest = u64::from(width.max(height));
    let scale = |side: u32| -> u32 {
        let scaled = (u64::from(side) * u64::from(bound) + longest / 2) / longest;
        scaled.clamp(1, u64::from(bound)) as u32
    };
    (scale(width), scale(height))
}

fn encode_jpeg(image: &DynamicImage) -> ImageResult<Vec<u8>> {
    let mut out = Cursor::new(Vec::new());
    // JPEG has no alpha channel.
    DynamicImage::ImageRgb8(image.to_rgb8()).write_to(&mut out, ImageFormat::Jpeg)?;
    Ok(out.into_inner())
}

/// render_thumbnails
///
/// Decodes `bytes` once and produces one JPEG per `ThumbnailSize`.
pub fn render_thumbnails(bytes: &[u8]) -> ImageResult<Vec<RenderedThumbnail>> {
    let source = image::load_from_memory(bytes)?;

    ThumbnailSize::ALL
        .iter()
        .map(|&size| {
            let (width, height) = fit_within(source.width(), source.height(), size.bound());
            let resized = if (width, height) == (source.width(), source.height()) {
                source.clone()
            } else {
                source.resize_exact(width, height, FilterType::Lanczos3)
            };
            Ok(RenderedThumbnail {
                size,
                width,
                height,
                bytes: encode_jpeg(&resized)?,
            })
        })
        .collect()
}
