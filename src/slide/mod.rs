//! Slides: one image source bound to its decoded pixels
//!
//! A slide is built from a path and loads synchronously at construction
//! through an [`ImageLoader`]. After that it never changes; replacing a
//! slide means building a new one (see [`Slide::reload`]).

mod loader;
pub mod scan;

pub use loader::{default_loader, FsImageLoader, ImageLoader};

use image::RgbaImage;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::SlideError;

/// Shared handle to a decoded image
///
/// Cloning is cheap; every clone points at the same pixel buffer.
#[derive(Clone)]
pub struct ImageHandle(Arc<RgbaImage>);

impl ImageHandle {
    pub fn new(image: RgbaImage) -> Self {
        Self(Arc::new(image))
    }

    pub fn width(&self) -> u32 {
        self.0.width()
    }

    pub fn height(&self) -> u32 {
        self.0.height()
    }

    /// Borrow the decoded pixels
    pub fn pixels(&self) -> &RgbaImage {
        &self.0
    }
}

impl fmt::Debug for ImageHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImageHandle")
            .field("width", &self.width())
            .field("height", &self.height())
            .finish()
    }
}

/// One entry in a slideshow
#[derive(Debug, Clone)]
pub struct Slide {
    path: PathBuf,
    /// Only set once the image has loaded
    display_name: Option<String>,
    image: Option<ImageHandle>,
}

impl Slide {
    /// Build a slide, keeping it in the "failed to load" state on any error
    pub fn load(path: impl Into<PathBuf>, loader: &dyn ImageLoader) -> Self {
        let path = path.into();
        match Self::try_load(&path, loader) {
            Ok(slide) => slide,
            Err(_) => Self {
                path,
                display_name: None,
                image: None,
            },
        }
    }

    /// Build a slide, reporting why the image could not be loaded
    pub fn try_load(path: impl Into<PathBuf>, loader: &dyn ImageLoader) -> Result<Self, SlideError> {
        let path = path.into();
        let image = loader.load(&path)?;
        let display_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.to_string_lossy().into_owned());

        Ok(Self {
            path,
            display_name: Some(display_name),
            image: Some(image),
        })
    }

    /// Rebuild this slide from its own path
    pub fn reload(&self, loader: &dyn ImageLoader) -> Self {
        Self::load(self.path.clone(), loader)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// File name of the image, present only when loaded
    pub fn display_name(&self) -> Option<&str> {
        self.display_name.as_deref()
    }

    pub fn image(&self) -> Option<&ImageHandle> {
        self.image.as_ref()
    }

    pub fn is_loaded(&self) -> bool {
        self.image.is_some()
    }
}
