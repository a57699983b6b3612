use std::io::{Cursor, Read};
use std::time::Duration;

use image::{DynamicImage, GenericImageView, ImageOutputFormat};

use super::{FetchError, FetchedImage, ImageFetcher};
use crate::config::{APP_NAME, APP_VERSION, FETCH_TIMEOUT_SECS, MAX_IMAGE_BYTES};

/// Smallest plausible image file (a 1x1 PNG is ~67 bytes).
const MIN_IMAGE_BYTES: usize = 67;

/// Blocking HTTP(S) image fetcher.
pub struct HttpImageFetcher {
    client: reqwest::blocking::Client,
    timeout_secs: u64,
}

impl HttpImageFetcher {
    pub fn new(timeout: Duration) -> Result<Self, FetchError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .user_agent(format!("{APP_NAME}/{APP_VERSION}"))
            .build()
            .map_err(|e| FetchError::Transport(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            timeout_secs: timeout.as_secs(),
        })
    }

    /// Fetcher with the standard 10 second bound.
    pub fn with_default_timeout() -> Result<Self, FetchError> {
        Self::new(Duration::from_secs(FETCH_TIMEOUT_SECS))
    }

    fn download(&self, url: reqwest::Url) -> Result<Vec<u8>, FetchError> {
        let response = self.client.get(url).send().map_err(|e| {
            if e.is_timeout() {
                FetchError::Timeout(self.timeout_secs)
            } else {
                FetchError::Transport(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::HttpStatus {
                status: status.as_u16(),
            });
        }

        if response
            .content_length()
            .is_some_and(|len| len > MAX_IMAGE_BYTES as u64)
        {
            return Err(FetchError::TooLarge {
                limit_mb: MAX_IMAGE_BYTES / (1024 * 1024),
            });
        }

        read_capped(response, MAX_IMAGE_BYTES, self.timeout_secs)
    }
}

impl ImageFetcher for HttpImageFetcher {
    fn fetch(&self, reference: &str) -> Result<FetchedImage, FetchError> {
        let url = reqwest::Url::parse(reference.trim())
            .map_err(|e| FetchError::InvalidReference(format!("{reference}: {e}")))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(FetchError::InvalidReference(format!(
                "unsupported scheme '{}'",
                url.scheme()
            )));
        }

        let start = std::time::Instant::now();
        let bytes = self.download(url)?;
        let fetched = decode_image(bytes)?;

        tracing::debug!(
            elapsed_ms = %start.elapsed().as_millis(),
            source_bytes = fetched.source_bytes.len(),
            png_bytes = fetched.png_bytes.len(),
            dimensions = ?fetched.image.dimensions(),
            "Image fetched and decoded"
        );

        Ok(fetched)
    }
}

/// Read at most `limit` bytes. Servers that omit `Content-Length` cannot push
/// more than `limit + 1` bytes into memory.
fn read_capped(reader: impl Read, limit: usize, timeout_secs: u64) -> Result<Vec<u8>, FetchError> {
    let mut body = Vec::new();
    reader
        .take(limit as u64 + 1)
        .read_to_end(&mut body)
        .map_err(|e| {
            if e.kind() == std::io::ErrorKind::TimedOut {
                FetchError::Timeout(timeout_secs)
            } else {
                FetchError::Transport(e.to_string())
            }
        })?;

    if body.len() > limit {
        return Err(FetchError::TooLarge {
            limit_mb: limit / (1024 * 1024),
        });
    }
    Ok(body)
}

/// Fetch an optional reference, swallowing every failure.
///
/// `None` or a blank reference skips the fetch entirely. Failures are logged
/// and reported as "no image".
pub fn fetch_image(fetcher: &dyn ImageFetcher, reference: Option<&str>) -> Option<FetchedImage> {
    let reference = reference.map(str::trim).filter(|r| !r.is_empty())?;

    match fetcher.fetch(reference) {
        Ok(image) => Some(image),
        Err(e) => {
            tracing::warn!(reference, error = %e, "Image fetch failed, continuing without image");
            None
        }
    }
}

/// Decode retrieved bytes and produce the canonical PNG form.
pub fn decode_image(bytes: Vec<u8>) -> Result<FetchedImage, FetchError> {
    validate_image_bytes(&bytes)?;
    let image =
        image::load_from_memory(&bytes).map_err(|e| FetchError::Decode(e.to_string()))?;
    let png_bytes = encode_png(&image)?;

    Ok(FetchedImage {
        image,
        png_bytes,
        source_bytes: bytes,
    })
}

/// Reject clearly invalid input before decoding.
pub fn validate_image_bytes(bytes: &[u8]) -> Result<(), FetchError> {
    if bytes.len() < MIN_IMAGE_BYTES {
        return Err(FetchError::TooSmall(bytes.len()));
    }
    if bytes.len() > MAX_IMAGE_BYTES {
        return Err(FetchError::TooLarge {
            limit_mb: MAX_IMAGE_BYTES / (1024 * 1024),
        });
    }
    Ok(())
}

/// Encode a decoded image as PNG bytes.
pub fn encode_png(image: &DynamicImage) -> Result<Vec<u8>, FetchError> {
    let mut cursor = Cursor::new(Vec::new());
    image
        .write_to(&mut cursor, ImageOutputFormat::Png)
        .map_err(|e| FetchError::Encode(e.to_string()))?;
    Ok(cursor.into_inner())
}
