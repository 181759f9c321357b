use image::{DynamicImage, GenericImageView, Rgba, RgbaImage};
use image_queue_core::Filter;

/// Run a resolved filter over a decoded image
pub fn apply(filter: Filter, img: &DynamicImage) -> DynamicImage {
    match filter {
        Filter::Grayscale => img.grayscale(),
        Filter::Blur { sigma } => {
            if sigma <= 0.0 {
                img.clone()
            } else {
                img.blur(sigma)
            }
        }
        Filter::Sharpen { sigma } => {
            if sigma <= 0.0 {
                img.clone()
            } else {
                img.unsharpen(sigma, 0)
            }
        }
        Filter::Negative => DynamicImage::ImageRgba8(negative(img)),
    }
}

/// Column the pixel at `x` is written to, for an image spanning `[min_x, max_x)`.
fn mirrored_x(x: u32, min_x: u32, max_x: u32) -> u32 {
    max_x - (x - min_x + 1)
}

/// Writes each source pixel's RGB, fully opaque, to the horizontally mirrored
/// column. Colours are not inverted.
pub fn negative(img: &DynamicImage) -> RgbaImage {
    let (width, height) = img.dimensions();
    let source = img.to_rgba8();
    let mut out = RgbaImage::new(width, height);

    for (x, y, pixel) in source.enumerate_pixels() {
        let Rgba([r, g, b, _]) = *pixel;
        out.put_pixel(mirrored_x(x, 0, width), y, Rgba([r, g, b, 255]));
    }
    out
}
