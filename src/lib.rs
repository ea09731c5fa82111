//! spotlight-slideshow
//!
//! Timed slideshows for several image windows at once, with a scheduler that
//! lets exactly one window play at a time and rotates that spotlight fairly.
//!
//! - [`slide`] loads images and scans directories for them
//! - [`slideshow`] runs one window's slides on a delay
//! - [`spotlight`] registers windows and rotates the spotlight among them
//! - [`viewer`] is the headless window layer that follows an instance

pub mod config;
pub mod error;
pub mod logging;
pub mod slide;
pub mod slideshow;
pub mod spotlight;
pub mod viewer;
