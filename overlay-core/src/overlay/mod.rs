//! overlay — the shared registry of active graphics
//!
//! The registry is the only state crossing the two threads: the detection
//! thread adds/removes graphics as entities appear and vanish, while the
//! render thread draws the current membership once per display frame.  One
//! exclusive lock covers membership and the sizing fields together and is
//! held for the whole render pass, so each frame draws from a consistent
//! snapshot — no graphic removed mid-pass, no half-added graphic observed.
//!
//! Redraw requests are a shared flag: any mutation marks it, the render loop
//! swaps it back once per frame, so bursts of updates coalesce into a single
//! redraw.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, warn};

use crate::geometry::OverlayTransform;
use crate::graphic::Graphic;
use crate::surface::Surface;

/// Shared invalidation flag.  Graphics hold a clone so `update_item` can
/// request a redraw without touching the registry lock.
#[derive(Debug, Clone, Default)]
pub struct RedrawHandle(Arc<AtomicBool>);

impl RedrawHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark the overlay as needing a redraw.
    pub fn request(&self) {
        self.0.store(true, Ordering::Release);
    }

    /// Consume the pending request, returning whether one was set.
    pub fn take(&self) -> bool {
        self.0.swap(false, Ordering::AcqRel)
    }
}

#[derive(Default)]
struct State {
    graphics: Vec<Arc<dyn Graphic>>,
    transform: OverlayTransform,
}

struct Shared {
    state: Mutex<State>,
    redraw: RedrawHandle,
}

/// Thread-safe collection of the currently active graphics, plus the sizing
/// state feeding the coordinate transform.  Cloning yields another handle to
/// the same registry.
#[derive(Clone)]
pub struct OverlayRegistry {
    shared: Arc<Shared>,
}

impl OverlayRegistry {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(State::default()),
                redraw: RedrawHandle::new(),
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.shared
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Insert a graphic.  Membership is identity-based; adding the same
    /// graphic twice is a no-op.
    pub fn add(&self, graphic: Arc<dyn Graphic>) {
        {
            let mut state = self.state();
            if state.graphics.iter().any(|g| Arc::ptr_eq(g, &graphic)) {
                return;
            }
            state.graphics.push(graphic);
        }
        self.shared.redraw.request();
    }

    /// Remove a graphic; silently does nothing when it is not a member.
    pub fn remove(&self, graphic: &Arc<dyn Graphic>) {
        {
            let mut state = self.state();
            state.graphics.retain(|g| !Arc::ptr_eq(g, graphic));
        }
        self.shared.redraw.request();
    }

    /// Drop every graphic — used when tracking resets (camera restart).
    pub fn clear(&self) {
        let dropped = {
            let mut state = self.state();
            std::mem::take(&mut state.graphics).len()
        };
        debug!(dropped, "overlay cleared");
        self.shared.redraw.request();
    }

    /// Update the capture-side sizing and mirror mode.  Takes effect for all
    /// subsequent render passes; frames already drawn are not revisited.
    pub fn set_preview_size(&self, width: u32, height: u32, mirrored: bool) {
        {
            let mut state = self.state();
            state.transform.preview_width = width as f32;
            state.transform.preview_height = height as f32;
            state.transform.mirrored = mirrored;
        }
        debug!(width, height, mirrored, "preview size updated");
        self.shared.redraw.request();
    }

    /// Update the display-side sizing, e.g. after a surface resize.
    pub fn set_view_size(&self, width: u32, height: u32) {
        {
            let mut state = self.state();
            state.transform.view_width = width as f32;
            state.transform.view_height = height as f32;
        }
        debug!(width, height, "view size updated");
        self.shared.redraw.request();
    }

    /// Copy of the current transform.
    pub fn transform(&self) -> OverlayTransform {
        self.state().transform
    }

    pub fn len(&self) -> usize {
        self.state().graphics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state().graphics.is_empty()
    }

    /// Handle graphics use to request redraws without holding the registry
    /// lock.
    pub fn redraw_handle(&self) -> RedrawHandle {
        self.shared.redraw.clone()
    }

    /// Whether a redraw was requested since the last call.  Coalesces any
    /// number of requests into one.
    pub fn take_redraw_request(&self) -> bool {
        self.shared.redraw.take()
    }

    /// Draw every active graphic onto `surface`.
    ///
    /// The lock is held for the entire pass.  An individual graphic's draw
    /// failure costs that annotation for the frame, never the pass or the
    /// process.
    pub fn render(&self, surface: &mut dyn Surface) {
        let state = self.state();
        for graphic in &state.graphics {
            if let Err(e) = graphic.draw(surface, &state.transform) {
                warn!("graphic draw failed: {e:#}");
            }
        }
    }
}

impl Default for OverlayRegistry {
    fn default() -> Self {
        Self::new()
    }
}
