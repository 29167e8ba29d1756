pub mod geometry;
pub mod graphic;
pub mod overlay;
pub mod surface;
pub mod tracker;

// Re-export the top-level error type so callers only need `overlay_core::Error`
pub use anyhow::Error;
pub use anyhow::Result;
