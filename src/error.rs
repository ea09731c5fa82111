//! Error types for slide loading and image discovery

use std::path::PathBuf;
use thiserror::Error;

/// Why an image source could not become a slide
#[derive(Debug, Error)]
pub enum SlideError {
    /// The path does not resolve to a file
    #[error("image source not found: {}", .0.display())]
    NotFound(PathBuf),

    /// The file exists but could not be decoded
    #[error("failed to decode image {}: {source}", path.display())]
    Decode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    /// A directory could not be listed
    #[error("failed to read directory {}: {source}", path.display())]
    ReadDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A directory was listed but held no usable images
    #[error("no image files found in directory: {}", .0.display())]
    NoImages(PathBuf),
}

impl SlideError {
    /// True for the "source not found" condition callers are expected to skip over
    pub fn is_not_found(&self) -> bool {
        matches!(self, SlideError::NotFound(_))
    }
}
