//! graphic — annotated drawable units bound to the overlay
//!
//! Two variants: `EntityGraphic` follows a tracked entity and re-anchors
//! itself from the latest detector observation every pass; `AvatarGraphic`
//! composites a fixed image for a remote participant at a static view-space
//! anchor.  Both carry a string attribute bag (identity, occupancy, status)
//! and render the same information band.
//!
//! A graphic's `draw` runs on the render thread while the detection thread
//! may be mutating it concurrently, so the observation is handed off as a
//! single atomic reference swap and attributes live behind their own
//! short-lived lock.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use anyhow::Result;
use arc_swap::ArcSwapOption;
use image::RgbImage;
use nalgebra::Point2;

use crate::geometry::{Observation, OverlayTransform, Region};
use crate::overlay::RedrawHandle;
use crate::surface::Surface;

// ── Attribute keys ───────────────────────────────────────────────────────────

pub const ATTR_ID: &str = "id";
pub const ATTR_IN_PROCESS_COUNT: &str = "inProcessCount";
pub const ATTR_STATUS: &str = "status";

// ── Drawing constants ────────────────────────────────────────────────────────

/// Height of the filled information band above the bounding region.
const BAND_HEIGHT: f32 = 120.0;
/// Label text size inside the band.
const LABEL_TEXT_SIZE: f32 = 40.0;
/// Horizontal label inset from the band's left edge.
const LABEL_INSET: f32 = 4.0;
/// Vertical label inset from the band's top edge.
const LABEL_TOP_INSET: f32 = 10.0;
/// Stroke width for the bounding region outline.
const BOX_STROKE_WIDTH: f32 = 5.0;

/// Fixed banner extent for the avatar variant, which has no detected
/// geometry to derive one from.
const AVATAR_BAND_WIDTH: f32 = 360.0;
const AVATAR_BAND_HEIGHT: f32 = 180.0;

const WHITE: [u8; 3] = [255, 255, 255];

// ── Status → style mapping ───────────────────────────────────────────────────

/// Visual style derived from an entity's status code.  The mapping is total:
/// any code outside {1, 2, 3} falls back to `Nominal`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Status {
    #[default]
    Nominal,
    Alert,
    Warning,
}

impl Status {
    pub fn from_code(code: i32) -> Self {
        match code {
            1 => Status::Nominal,
            2 => Status::Alert,
            3 => Status::Warning,
            _ => Status::Nominal,
        }
    }

    pub fn color(self) -> [u8; 3] {
        match self {
            Status::Nominal => [0, 255, 0],
            Status::Alert => [255, 0, 0],
            Status::Warning => [255, 255, 0],
        }
    }
}

// ── Attribute map ────────────────────────────────────────────────────────────

/// Per-graphic string key/value bag.  Written from the tracker callback
/// thread, read during `draw` on the render thread; each access takes the
/// internal lock only for the duration of the single operation.
#[derive(Debug, Default)]
pub struct AttributeMap {
    entries: Mutex<HashMap<String, String>>,
}

impl AttributeMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, key: impl Into<String>, value: impl Into<String>) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }
}

// ── Entity profile ───────────────────────────────────────────────────────────

/// Caller-supplied identity, occupancy, and status for one entity.  Status is
/// always supplied explicitly; this crate never computes it.
#[derive(Debug, Clone)]
pub struct EntityInfo {
    pub id: String,
    pub in_process_count: u32,
    pub status: i32,
}

impl EntityInfo {
    pub fn new(id: impl Into<String>, in_process_count: u32, status: i32) -> Self {
        Self {
            id: id.into(),
            in_process_count,
            status,
        }
    }
}

// ── Graphic contract ─────────────────────────────────────────────────────────

/// A drawable unit owned by the overlay registry.
///
/// `draw` is only ever invoked from the registry's render pass (under the
/// registry lock); everything else may be called from the tracker callback
/// thread at the same time.
pub trait Graphic: Send + Sync {
    /// Render onto `surface`, placing geometry through `transform`.
    fn draw(&self, surface: &mut dyn Surface, transform: &OverlayTransform) -> Result<()>;

    fn attributes(&self) -> &AttributeMap;

    fn set_attribute(&self, key: &str, value: &str) {
        self.attributes().set(key, value);
    }

    fn attribute(&self, key: &str) -> Option<String> {
        self.attributes().get(key)
    }

    /// Current style, parsed from the `status` attribute on every call so
    /// attribute updates take effect on the next frame.
    fn status(&self) -> Status {
        self.attributes()
            .get(ATTR_STATUS)
            .and_then(|v| v.parse::<i32>().ok())
            .map(Status::from_code)
            .unwrap_or_default()
    }
}

fn seed_attributes(attributes: &AttributeMap, info: &EntityInfo) {
    attributes.set(ATTR_ID, info.id.clone());
    attributes.set(ATTR_IN_PROCESS_COUNT, info.in_process_count.to_string());
    attributes.set(ATTR_STATUS, info.status.to_string());
}

/// Stroke the bounding region and draw the information band anchored above
/// it: a filled bar in the status color carrying `"{id}: {count} IP"`.
pub fn draw_info_band(
    surface: &mut dyn Surface,
    attributes: &AttributeMap,
    region: Region,
    style: Status,
) -> Result<()> {
    surface.draw_rect(region, style.color(), BOX_STROKE_WIDTH)?;

    let band = Region::new(
        region.left,
        region.top - BAND_HEIGHT,
        region.right,
        region.top,
    );
    surface.fill_rect(band, style.color())?;

    let id = attributes.get(ATTR_ID).unwrap_or_default();
    let count = attributes.get(ATTR_IN_PROCESS_COUNT).unwrap_or_default();
    let label = format!("{id}: {count} IP");
    surface.draw_text(
        &label,
        band.left + LABEL_INSET,
        band.top + LABEL_TOP_INSET,
        LABEL_TEXT_SIZE,
        WHITE,
    )
}

// ── Tracked-entity variant ───────────────────────────────────────────────────

/// Graphic following one tracked entity.  The latest observation is swapped
/// in wholesale so a draw that races an update sees either the old or the new
/// snapshot, never a half-written one.
pub struct EntityGraphic {
    attributes: AttributeMap,
    observation: ArcSwapOption<Observation>,
    redraw: RedrawHandle,
}

impl EntityGraphic {
    pub fn new(info: &EntityInfo, redraw: RedrawHandle) -> Self {
        let attributes = AttributeMap::new();
        seed_attributes(&attributes, info);
        Self {
            attributes,
            observation: ArcSwapOption::empty(),
            redraw,
        }
    }

    /// Replace the observation from the most recent detection frame and
    /// request a redraw.
    pub fn update_item(&self, observation: Observation) {
        self.observation.store(Some(Arc::new(observation)));
        self.redraw.request();
    }

    /// Latest applied observation, `None` before the first detection.
    pub fn observation(&self) -> Option<Observation> {
        self.observation.load_full().map(|obs| *obs)
    }
}

impl Graphic for EntityGraphic {
    fn draw(&self, surface: &mut dyn Surface, transform: &OverlayTransform) -> Result<()> {
        // One snapshot up front; a concurrent update lands next frame.
        let Some(observation) = self.observation.load_full() else {
            return Ok(());
        };
        let region = transform.project(&observation);
        draw_info_band(surface, &self.attributes, region, self.status())
    }

    fn attributes(&self) -> &AttributeMap {
        &self.attributes
    }
}

// ── Static-anchor variant ────────────────────────────────────────────────────

/// Graphic compositing a fixed avatar image at a view-space anchor, for
/// participants that have no live detection feed.  Position is fixed at
/// construction; only the attributes can change afterwards.
pub struct AvatarGraphic {
    attributes: AttributeMap,
    avatar: RgbImage,
    center: Point2<f32>,
}

impl AvatarGraphic {
    pub fn new(info: &EntityInfo, avatar: RgbImage, center: Point2<f32>) -> Self {
        let attributes = AttributeMap::new();
        seed_attributes(&attributes, info);
        Self {
            attributes,
            avatar,
            center,
        }
    }
}

impl Graphic for AvatarGraphic {
    fn draw(&self, surface: &mut dyn Surface, _transform: &OverlayTransform) -> Result<()> {
        let left = self.center.x - self.avatar.width() as f32 / 2.0;
        let top = self.center.y - self.avatar.height() as f32 / 2.0;
        surface.draw_image(&self.avatar, left, top)?;

        let region = Region::new(left, top, left + AVATAR_BAND_WIDTH, top + AVATAR_BAND_HEIGHT);
        draw_info_band(surface, &self.attributes, region, self.status())
    }

    fn attributes(&self) -> &AttributeMap {
        &self.attributes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::surface::testutil::{DrawOp, RecordingSurface};

    fn transform() -> OverlayTransform {
        OverlayTransform {
            preview_width: 640.0,
            preview_height: 480.0,
            view_width: 1280.0,
            view_height: 960.0,
            mirrored: false,
        }
    }

    #[test]
    fn status_mapping_is_total() {
        assert_eq!(Status::from_code(1), Status::Nominal);
        assert_eq!(Status::from_code(2), Status::Alert);
        assert_eq!(Status::from_code(3), Status::Warning);
        for code in [0, -1, 999, i32::MIN, i32::MAX] {
            assert_eq!(Status::from_code(code), Status::Nominal);
        }
    }

    #[test]
    fn attributes_round_trip() {
        let map = AttributeMap::new();
        assert_eq!(map.get("id"), None);
        map.set("id", "FRE955");
        assert_eq!(map.get("id"), Some("FRE955".to_string()));
        map.set("id", "Sean");
        assert_eq!(map.get("id"), Some("Sean".to_string()));
    }

    #[test]
    fn entity_graphic_skips_draw_without_observation() {
        let graphic = EntityGraphic::new(&EntityInfo::new("FRE955", 2, 1), RedrawHandle::new());
        let mut surface = RecordingSurface::new();
        graphic.draw(&mut surface, &transform()).unwrap();
        assert!(surface.ops.is_empty());
    }

    #[test]
    fn entity_graphic_draws_box_band_and_label() {
        let graphic = EntityGraphic::new(&EntityInfo::new("FRE955", 2, 1), RedrawHandle::new());
        graphic.update_item(Observation::new(100.0, 100.0, 50.0, 50.0));

        let mut surface = RecordingSurface::new();
        graphic.draw(&mut surface, &transform()).unwrap();

        let expected = Region::new(200.0, 200.0, 300.0, 300.0);
        assert_eq!(
            surface.ops[0],
            DrawOp::Rect {
                region: expected,
                color: [0, 255, 0],
            }
        );
        assert_eq!(
            surface.ops[1],
            DrawOp::Fill {
                region: Region::new(200.0, 80.0, 300.0, 200.0),
                color: [0, 255, 0],
            }
        );
        match &surface.ops[2] {
            DrawOp::Text { text, .. } => assert_eq!(text, "FRE955: 2 IP"),
            other => panic!("expected text op, got {other:?}"),
        }
    }

    #[test]
    fn status_attribute_drives_style() {
        let graphic = EntityGraphic::new(&EntityInfo::new("FRE955", 2, 2), RedrawHandle::new());
        assert_eq!(graphic.status(), Status::Alert);

        graphic.set_attribute(ATTR_STATUS, "3");
        assert_eq!(graphic.status(), Status::Warning);

        // Garbage falls back to the default style rather than failing.
        graphic.set_attribute(ATTR_STATUS, "not-a-number");
        assert_eq!(graphic.status(), Status::Nominal);
    }

    #[test]
    fn update_item_requests_redraw() {
        let redraw = RedrawHandle::new();
        let graphic = EntityGraphic::new(&EntityInfo::new("FRE955", 2, 1), redraw.clone());
        assert!(!redraw.take());
        graphic.update_item(Observation::new(0.0, 0.0, 10.0, 10.0));
        assert!(redraw.take());
        assert!(!redraw.take());
    }

    #[test]
    fn latest_observation_wins() {
        let graphic = EntityGraphic::new(&EntityInfo::new("FRE955", 2, 1), RedrawHandle::new());
        graphic.update_item(Observation::new(0.0, 0.0, 10.0, 10.0));
        graphic.update_item(Observation::new(5.0, 5.0, 10.0, 10.0));
        assert_eq!(
            graphic.observation(),
            Some(Observation::new(5.0, 5.0, 10.0, 10.0))
        );
    }

    #[test]
    fn avatar_graphic_composites_at_fixed_anchor() {
        let avatar = RgbImage::new(64, 32);
        let graphic = AvatarGraphic::new(
            &EntityInfo::new("Sean", 2, 2),
            avatar,
            Point2::new(400.0, 300.0),
        );

        let mut surface = RecordingSurface::new();
        graphic.draw(&mut surface, &transform()).unwrap();

        // Image offset by half its extent from the anchor.
        assert_eq!(surface.ops[0], DrawOp::Image { x: 368.0, y: 284.0 });
        assert_eq!(
            surface.ops[1],
            DrawOp::Rect {
                region: Region::new(368.0, 284.0, 728.0, 464.0),
                color: [255, 0, 0],
            }
        );
        match &surface.ops[3] {
            DrawOp::Text { text, .. } => assert_eq!(text, "Sean: 2 IP"),
            other => panic!("expected text op, got {other:?}"),
        }
    }
}
