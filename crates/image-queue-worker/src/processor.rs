use crate::filters;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::ImageFormat;
use image_queue_core::{CoreError, Filter, TaskPayload, TaskStatus};
use std::io::Cursor;
use thiserror::Error;

/// Why a task ended up `failed`. The display text is stored as the result.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProcessingError {
    #[error("Invalid image data")]
    InvalidImageData,

    #[error("Failed to decode image")]
    DecodeFailed,

    #[error("Unknown filter")]
    UnknownFilter,

    #[error("Invalid parameters")]
    InvalidParameters,

    #[error("Failed to encode image")]
    EncodeFailed,

    #[error("Image processing panicked")]
    Panicked,
}

impl From<CoreError> for ProcessingError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::UnknownFilter(_) => ProcessingError::UnknownFilter,
            _ => ProcessingError::InvalidParameters,
        }
    }
}

/// Terminal status and result for one task
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    pub status: TaskStatus,
    pub result: String,
}

impl Outcome {
    pub fn ready(result: String) -> Self {
        Outcome {
            status: TaskStatus::Ready,
            result,
        }
    }

    pub fn failed(err: ProcessingError) -> Self {
        Outcome {
            status: TaskStatus::Failed,
            result: err.to_string(),
        }
    }
}

/// Decode, filter and re-encode the task image. CPU bound.
pub fn process(payload: &TaskPayload) -> Outcome {
    match run_pipeline(payload) {
        Ok(encoded) => Outcome::ready(encoded),
        Err(err) => Outcome::failed(err),
    }
}

fn run_pipeline(payload: &TaskPayload) -> Result<String, ProcessingError> {
    let bytes = STANDARD
        .decode(payload.image.as_bytes())
        .map_err(|_| ProcessingError::InvalidImageData)?;
    let img = image::load_from_memory(&bytes).map_err(|_| ProcessingError::DecodeFailed)?;

    let filter = Filter::resolve(&payload.filter)?;
    let output = filters::apply(filter, &img);

    let mut buf = Cursor::new(Vec::new());
    output
        .write_to(&mut buf, ImageFormat::Png)
        .map_err(|_| ProcessingError::EncodeFailed)?;

    Ok(STANDARD.encode(buf.into_inner()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, GenericImageView, Rgb, RgbImage};
    use image_queue_core::FilterSpec;

    fn encode_png(img: &DynamicImage) -> String {
        let mut buf = Cursor::new(Vec::new());
        img.write_to(&mut buf, ImageFormat::Png).unwrap();
        STANDARD.encode(buf.into_inner())
    }

    fn payload(filter: FilterSpec, image: String) -> TaskPayload {
        TaskPayload { filter, image }
    }

    fn sample_image() -> String {
        let img = RgbImage::from_fn(8, 5, |x, y| Rgb([(x * 30) as u8, (y * 50) as u8, 90]));
        encode_png(&DynamicImage::ImageRgb8(img))
    }

    #[test]
    fn test_grayscale_round_trip() {
        let outcome = process(&payload(FilterSpec::new("Grayscale"), sample_image()));
        assert_eq!(outcome.status, TaskStatus::Ready);

        let bytes = STANDARD.decode(&outcome.result).unwrap();
        let decoded = image::load_from_memory(&bytes).unwrap();
        assert_eq!(decoded.dimensions(), (8, 5));
    }

    #[test]
    fn test_blur_without_sigma_fails() {
        let outcome = process(&payload(FilterSpec::new("Blur"), sample_image()));
        assert_eq!(outcome, Outcome::failed(ProcessingError::InvalidParameters));
        assert_eq!(outcome.result, "Invalid parameters");
    }

    #[test]
    fn test_sharpen_with_string_sigma_fails() {
        let spec = FilterSpec::new("Sharpen").with_parameter("sigma", "2");
        let outcome = process(&payload(spec, sample_image()));
        assert_eq!(outcome.result, "Invalid parameters");
    }

    #[test]
    fn test_sharpen_with_sigma_succeeds() {
        let spec = FilterSpec::new("Sharpen").with_parameter("sigma", 1.2);
        let outcome = process(&payload(spec, sample_image()));
        assert_eq!(outcome.status, TaskStatus::Ready);
    }

    #[test]
    fn test_unknown_filter() {
        let outcome = process(&payload(FilterSpec::new("Sepia"), sample_image()));
        assert_eq!(outcome.status, TaskStatus::Failed);
        assert_eq!(outcome.result, "Unknown filter");
    }

    #[test]
    fn test_invalid_base64() {
        let outcome = process(&payload(FilterSpec::new("Grayscale"), "not base64!".to_string()));
        assert_eq!(outcome.result, "Invalid image data");
    }

    #[test]
    fn test_undecodable_image() {
        let garbage = STANDARD.encode(b"definitely not an image");
        let outcome = process(&payload(FilterSpec::new("Grayscale"), garbage));
        assert_eq!(outcome.result, "Failed to decode image");
    }

    #[test]
    fn test_negative_on_solid_image() {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(4, 3, Rgb([200, 100, 50])));
        let outcome = process(&payload(FilterSpec::new("Negative"), encode_png(&img)));
        assert_eq!(outcome.status, TaskStatus::Ready);

        let bytes = STANDARD.decode(&outcome.result).unwrap();
        let decoded = image::load_from_memory(&bytes).unwrap().to_rgba8();
        assert_eq!(decoded.dimensions(), (4, 3));
        assert!(decoded.pixels().all(|p| p.0 == [200, 100, 50, 255]));
    }
}
