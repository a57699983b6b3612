pub mod fetch;
pub mod gps;

pub use fetch::{encode_png, fetch_image, validate_image_bytes, HttpImageFetcher};
pub use gps::{extract_gps, read_gps};

use image::DynamicImage;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("Invalid image reference: {0}")]
    InvalidReference(String),

    #[error("Image request failed: {0}")]
    Transport(String),

    #[error("Image request timed out after {0}s")]
    Timeout(u64),

    #[error("Image server returned HTTP {status}")]
    HttpStatus { status: u16 },

    #[error("Image data too small to be valid ({0} bytes)")]
    TooSmall(usize),

    #[error("Image data exceeds {limit_mb}MB limit")]
    TooLarge { limit_mb: usize },

    #[error("Image decoding failed: {0}")]
    Decode(String),

    #[error("PNG encoding failed: {0}")]
    Encode(String),
}

/// A retrieved image in the forms the rest of the pipeline needs.
#[derive(Debug, Clone)]
pub struct FetchedImage {
    /// Decoded pixels.
    pub image: DynamicImage,
    /// PNG re-encoding handed to the image analyzer.
    pub png_bytes: Vec<u8>,
    /// Bytes exactly as retrieved. Decoders drop EXIF, so GPS is read from these.
    pub source_bytes: Vec<u8>,
}

/// Retrieves and decodes an image from a reference (usually a URL).
pub trait ImageFetcher: Send + Sync {
    fn fetch(&self, reference: &str) -> Result<FetchedImage, FetchError>;
}
