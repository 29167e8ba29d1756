//! tracker — per-entity lifecycle plumbing
//!
//! The external detection integration calls `TrackerFactory::create` once per
//! newly observed entity, then drives the returned `EntityTracker` through
//! `on_new_item` / `on_update` / `on_missing` / `on_done` from its own
//! thread.  Each tracker owns exactly one `EntityGraphic` for the entity's
//! whole visible lifetime; the pair is created together and retired together,
//! never reused for another entity.
//!
//! State machine: Created → Active → Done, no re-entry.  Callbacks arriving
//! out of order (update before creation, anything after done) are ignored
//! locally — a stale detection-thread callback must never resurrect a
//! just-removed graphic.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::geometry::Observation;
use crate::graphic::{EntityGraphic, EntityInfo, Graphic};
use crate::overlay::OverlayRegistry;

const STATE_CREATED: u8 = 0;
const STATE_ACTIVE: u8 = 1;
const STATE_DONE: u8 = 2;

/// Lifecycle handle for one tracked entity, bound one-to-one to its graphic.
pub struct EntityTracker {
    registry: OverlayRegistry,
    graphic: Arc<EntityGraphic>,
    state: AtomicU8,
}

impl EntityTracker {
    fn new(registry: OverlayRegistry, graphic: Arc<EntityGraphic>) -> Self {
        Self {
            registry,
            graphic,
            state: AtomicU8::new(STATE_CREATED),
        }
    }

    pub fn graphic(&self) -> &Arc<EntityGraphic> {
        &self.graphic
    }

    pub fn is_done(&self) -> bool {
        self.state.load(Ordering::Acquire) == STATE_DONE
    }

    /// First sighting: attach the graphic to the overlay and apply the
    /// initial observation.  Invoked exactly once by a well-behaved
    /// integration; repeats are ignored.
    pub fn on_new_item(&self, observation: Observation) {
        match self.state.compare_exchange(
            STATE_CREATED,
            STATE_ACTIVE,
            Ordering::AcqRel,
            Ordering::Acquire,
        ) {
            Ok(_) => {
                self.registry.add(self.graphic.clone());
                self.graphic.update_item(observation);
                debug!("entity tracker activated");
            }
            Err(state) => {
                warn!(state, "on_new_item on an already started tracker ignored");
            }
        }
    }

    /// Per-frame refresh while the entity stays visible.
    pub fn on_update(&self, observation: Observation) {
        if self.state.load(Ordering::Acquire) == STATE_ACTIVE {
            self.graphic.update_item(observation);
        } else {
            // Stale callback racing activation or retirement; the entity is
            // not on screen, so the observation is dropped.
            debug!("update for inactive tracker ignored");
        }
    }

    /// The detector lost the entity.
    pub fn on_missing(&self) {
        self.retire();
    }

    /// The detection session ended for this entity.
    pub fn on_done(&self) {
        self.retire();
    }

    fn retire(&self) {
        if self.state.swap(STATE_DONE, Ordering::AcqRel) != STATE_DONE {
            let graphic: Arc<dyn Graphic> = self.graphic.clone();
            self.registry.remove(&graphic);
            debug!("entity tracker retired");
        }
    }
}

/// Creates one fresh tracker/graphic pair per newly observed entity.
///
/// Identity, occupancy, and status come from the supplied provider; the
/// factory never computes a status itself.
pub struct TrackerFactory {
    registry: OverlayRegistry,
    info_source: Box<dyn Fn(&Observation) -> EntityInfo + Send + Sync>,
}

impl TrackerFactory {
    pub fn new(
        registry: OverlayRegistry,
        info_source: impl Fn(&Observation) -> EntityInfo + Send + Sync + 'static,
    ) -> Self {
        Self {
            registry,
            info_source: Box::new(info_source),
        }
    }

    /// Build a fresh graphic and tracker for a newly observed entity.  Every
    /// call yields a new pair; instances are never shared across entities.
    pub fn create(&self, observation: &Observation) -> EntityTracker {
        let info = (self.info_source)(observation);
        info!(id = %info.id, "creating tracker for new entity");
        let graphic = Arc::new(EntityGraphic::new(&info, self.registry.redraw_handle()));
        EntityTracker::new(self.registry.clone(), graphic)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graphic::ATTR_ID;

    fn factory(registry: &OverlayRegistry) -> TrackerFactory {
        TrackerFactory::new(registry.clone(), |_obs| EntityInfo::new("FRE955", 2, 1))
    }

    fn obs(x: f32) -> Observation {
        Observation::new(x, 100.0, 50.0, 50.0)
    }

    #[test]
    fn lifecycle_adds_then_removes_graphic() {
        let registry = OverlayRegistry::new();
        let tracker = factory(&registry).create(&obs(0.0));
        assert!(registry.is_empty());

        tracker.on_new_item(obs(0.0));
        assert_eq!(registry.len(), 1);
        assert_eq!(tracker.graphic().observation(), Some(obs(0.0)));

        tracker.on_update(obs(10.0));
        assert_eq!(tracker.graphic().observation(), Some(obs(10.0)));

        tracker.on_done();
        assert!(tracker.is_done());
        assert!(registry.is_empty());
    }

    #[test]
    fn on_done_is_idempotent() {
        let registry = OverlayRegistry::new();
        let tracker = factory(&registry).create(&obs(0.0));
        tracker.on_new_item(obs(0.0));
        tracker.on_done();
        let after_first = registry.len();
        tracker.on_done();
        tracker.on_missing();
        assert_eq!(registry.len(), after_first);
        assert!(registry.is_empty());
    }

    #[test]
    fn update_after_done_is_suppressed() {
        let registry = OverlayRegistry::new();
        let tracker = factory(&registry).create(&obs(0.0));
        tracker.on_new_item(obs(1.0));
        tracker.on_done();
        tracker.on_update(obs(99.0));
        // obs2 must never be applied; the last applied observation stays.
        assert_eq!(tracker.graphic().observation(), Some(obs(1.0)));
        assert!(registry.is_empty());
    }

    #[test]
    fn update_before_new_item_is_ignored() {
        let registry = OverlayRegistry::new();
        let tracker = factory(&registry).create(&obs(0.0));
        tracker.on_update(obs(5.0));
        assert_eq!(tracker.graphic().observation(), None);
        assert!(registry.is_empty());
    }

    #[test]
    fn missing_before_new_item_retires_without_registry_noise() {
        let registry = OverlayRegistry::new();
        let tracker = factory(&registry).create(&obs(0.0));
        tracker.on_missing();
        assert!(tracker.is_done());
        assert!(registry.is_empty());
        // A late creation callback must not resurrect the entity.
        tracker.on_new_item(obs(1.0));
        assert!(registry.is_empty());
    }

    #[test]
    fn duplicate_new_item_is_ignored() {
        let registry = OverlayRegistry::new();
        let tracker = factory(&registry).create(&obs(0.0));
        tracker.on_new_item(obs(1.0));
        tracker.on_new_item(obs(2.0));
        assert_eq!(registry.len(), 1);
        // The repeat's observation is dropped along with the callback.
        assert_eq!(tracker.graphic().observation(), Some(obs(1.0)));
    }

    #[test]
    fn factory_never_reuses_instances() {
        let registry = OverlayRegistry::new();
        let factory = factory(&registry);
        let first = factory.create(&obs(0.0));
        let second = factory.create(&obs(0.0));
        assert!(!Arc::ptr_eq(first.graphic(), second.graphic()));

        first.on_new_item(obs(0.0));
        second.on_new_item(obs(0.0));
        assert_eq!(registry.len(), 2);

        first.on_done();
        assert_eq!(registry.len(), 1);
        assert_eq!(second.graphic().attribute(ATTR_ID).as_deref(), Some("FRE955"));
    }
}
