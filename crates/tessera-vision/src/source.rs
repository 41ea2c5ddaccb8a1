//! Image Sources
//!
//! Resolves an image argument to decoded RGB pixels. Arguments starting with
//! `http://` or `https://` are downloaded; anything else is a file path.
//!
//! @version 0.1.0
//! @author Tessera Development Team

use std::fmt;
use std::path::{Path, PathBuf};

use image::RgbImage;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, info};

use crate::error::{VisionError, VisionResult};

/// Sample image used when the pipeline is run without one.
pub const DEFAULT_SAMPLE_URL: &str =
    "https://thumbs.dreamstime.com/b/golden-retriever-dog-21668976.jpg";

/// Where image bytes come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageSource {
    /// Remote image fetched over HTTP(S).
    Url(String),
    /// Local file.
    Path(PathBuf),
}

impl ImageSource {
    /// Classifies an argument as a URL or a path.
    pub fn parse(arg: &str) -> Self {
        if arg.starts_with("http://") || arg.starts_with("https://") {
            ImageSource::Url(arg.to_string())
        } else {
            ImageSource::Path(PathBuf::from(arg))
        }
    }

    /// Returns true for remote sources.
    pub fn is_remote(&self) -> bool {
        matches!(self, ImageSource::Url(_))
    }
}

impl fmt::Display for ImageSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImageSource::Url(url) => f.write_str(url),
            ImageSource::Path(path) => write!(f, "{}", path.display()),
        }
    }
}

impl From<&Path> for ImageSource {
    fn from(path: &Path) -> Self {
        ImageSource::Path(path.to_path_buf())
    }
}

/// Loads and decodes an image, converting it to 8-bit RGB.
pub fn load_image(source: &ImageSource) -> VisionResult<RgbImage> {
    let bytes = match source {
        ImageSource::Url(url) => fetch(url)?,
        ImageSource::Path(path) => std::fs::read(path).map_err(|e| VisionError::Read {
            path: path.clone(),
            source: e,
        })?,
    };
    let image = image::load_from_memory(&bytes).map_err(|e| VisionError::Decode {
        origin: source.to_string(),
        message: e.to_string(),
    })?;
    let rgb = image.to_rgb8();
    info!(
        source = %source,
        width = rgb.width(),
        height = rgb.height(),
        "Loaded image"
    );
    Ok(rgb)
}

fn fetch(url: &str) -> VisionResult<Vec<u8>> {
    debug!(url, "Fetching image");
    let fetch_error = |e: reqwest::Error| VisionError::Fetch {
        url: url.to_string(),
        message: e.to_string(),
    };
    let response = reqwest::blocking::get(url).map_err(fetch_error)?;
    let status = response.status();
    if !status.is_success() {
        return Err(VisionError::HttpStatus {
            url: url.to_string(),
            status: status.as_u16(),
        });
    }
    Ok(response.bytes().map_err(fetch_error)?.to_vec())
}

/// A deterministic noise image, used when no real image is available.
pub fn synthetic_image(width: u32, height: u32, seed: u64) -> RgbImage {
    let mut rng = StdRng::seed_from_u64(seed);
    RgbImage::from_fn(width, height, |_, _| image::Rgb([rng.gen(), rng.gen(), rng.gen()]))
}
