//! geometry — detector-space → view-space coordinate mapping
//!
//! Detections are expressed in terms of the capture preview size, but have to
//! be scaled up to the full view size, and also mirrored horizontally when the
//! capture source is front-facing so that displayed motion matches the user's
//! real motion.
//!
//! The transform is a pure function of four dimensions plus the mirror flag;
//! it carries no other state and is cheap to copy per render pass.

use nalgebra::Point2;

/// A single frame's detected geometry for one entity, in detector-space
/// (preview) pixel coordinates.  Treated as an immutable snapshot per
/// detection callback.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Observation {
    /// Top-left corner of the detected extent.
    pub position: Point2<f32>,
    pub width: f32,
    pub height: f32,
}

impl Observation {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            position: Point2::new(x, y),
            width,
            height,
        }
    }

    pub fn center(&self) -> Point2<f32> {
        Point2::new(
            self.position.x + self.width / 2.0,
            self.position.y + self.height / 2.0,
        )
    }
}

/// An axis-aligned rectangle in view-space pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Region {
    pub left: f32,
    pub top: f32,
    pub right: f32,
    pub bottom: f32,
}

impl Region {
    pub fn new(left: f32, top: f32, right: f32, bottom: f32) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    pub fn width(&self) -> f32 {
        self.right - self.left
    }

    pub fn height(&self) -> f32 {
        self.bottom - self.top
    }

    pub fn is_empty(&self) -> bool {
        self.width() < 1.0 || self.height() < 1.0
    }
}

/// Maps detector-space geometry into view-space pixels.
///
/// Until both the preview and the view size are known the transform degrades
/// to returning zeros rather than dividing by zero — annotations simply don't
/// move off the origin until sizing is established.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct OverlayTransform {
    pub preview_width: f32,
    pub preview_height: f32,
    pub view_width: f32,
    pub view_height: f32,
    pub mirrored: bool,
}

impl OverlayTransform {
    /// Whether valid sizing has arrived on both sides of the mapping.
    pub fn is_ready(&self) -> bool {
        self.preview_width > 0.0
            && self.preview_height > 0.0
            && self.view_width > 0.0
            && self.view_height > 0.0
    }

    /// Horizontal scale factor from preview to view, `0.0` until sizing is known.
    pub fn scale_x(&self) -> f32 {
        if self.preview_width > 0.0 && self.view_width > 0.0 {
            self.view_width / self.preview_width
        } else {
            0.0
        }
    }

    /// Vertical scale factor from preview to view, `0.0` until sizing is known.
    pub fn scale_y(&self) -> f32 {
        if self.preview_height > 0.0 && self.view_height > 0.0 {
            self.view_height / self.preview_height
        } else {
            0.0
        }
    }

    /// Map a horizontal detector-space coordinate to view-space.  Mirroring
    /// flips only this axis.
    pub fn translate_x(&self, x: f32) -> f32 {
        let scaled = x * self.scale_x();
        if self.mirrored {
            self.view_width.max(0.0) - scaled
        } else {
            scaled
        }
    }

    /// Map a vertical detector-space coordinate to view-space.  Never mirrored.
    pub fn translate_y(&self, y: f32) -> f32 {
        y * self.scale_y()
    }

    /// Map a detector-space point to view-space.
    pub fn translate_point(&self, p: Point2<f32>) -> Point2<f32> {
        Point2::new(self.translate_x(p.x), self.translate_y(p.y))
    }

    /// Project an observation's extent into a view-space bounding region.
    ///
    /// The mapping is center-based: translate the center point, scale the
    /// half-extents, expand symmetrically.  This keeps the region well-formed
    /// (left < right) even when the center translation is mirrored.
    pub fn project(&self, observation: &Observation) -> Region {
        let center = self.translate_point(observation.center());
        let half_w = self.scale_x() * observation.width / 2.0;
        let half_h = self.scale_y() * observation.height / 2.0;
        Region::new(
            center.x - half_w,
            center.y - half_h,
            center.x + half_w,
            center.y + half_h,
        )
    }
}
