//! Image loading seam
//!
//! Slides never touch the filesystem directly; they ask an [`ImageLoader`].
//! The default implementation decodes with the `image` crate.

use std::path::Path;
use std::sync::Arc;
use tracing::debug;

use super::ImageHandle;
use crate::error::SlideError;

/// Turns a path into decoded pixels, or says why it can't
pub trait ImageLoader: Send + Sync {
    /// Load and decode the image at `path`.
    /// Called synchronously; a slow decode stalls the caller.
    fn load(&self, path: &Path) -> Result<ImageHandle, SlideError>;
}

/// Loads images from the local filesystem
#[derive(Debug, Default, Clone, Copy)]
pub struct FsImageLoader;

impl ImageLoader for FsImageLoader {
    fn load(&self, path: &Path) -> Result<ImageHandle, SlideError> {
        if !path.is_file() {
            return Err(SlideError::NotFound(path.to_path_buf()));
        }

        let decoded = image::open(path).map_err(|source| SlideError::Decode {
            path: path.to_path_buf(),
            source,
        })?;
        let rgba = decoded.to_rgba8();
        debug!("Decoded {:?} ({}x{})", path, rgba.width(), rgba.height());

        Ok(ImageHandle::new(rgba))
    }
}

/// Create the loader used when nothing else is injected
pub fn default_loader() -> Arc<dyn ImageLoader> {
    Arc::new(FsImageLoader)
}
