//! Component lifecycle: which item is displayed by which component instance.
//!
//! The lifecycle manager mirrors the committed item sequence as a list of slots. Applying an
//! [`EditScript`](crate::diff::EditScript) edits those slots and queues container patches; nothing
//! reaches the container until [`Lifecycle::flush`], so one diff-apply cycle is one visual
//! transaction.
//!
//! Only slots inside the live window (the viewport plus look-ahead) own an instance. Instances
//! that leave the window, or whose item is removed, are recycled: their image requests are
//! cancelled, and they go on a per-category free list to be rebound to the next item that needs
//! one. Instances beyond the pool limit are destroyed.

use crate::component::{Component, ComponentFactory, Context, InstanceId, Registry};
use crate::config::ScreenConfig;
use crate::container::{Container, Patch, Row, RowContent};
use crate::diff::{Edit, SlotEdit, ViewModelDiff};
use crate::error::{InvariantViolation, ItemError, ResolutionError};
use crate::image::{ImageCoordinator, ImageDelivery};
use crate::rect::{size, Size};
use crate::view_model::{Category, ItemId, ItemModel};
use core::fmt;
use core::ops::Range;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// What a diff-apply cycle did.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ApplyReport {
    /// Non-fatal per-item errors.
    pub errors: Vec<ItemError>,
    pub inserted: usize,
    pub removed: usize,
    pub moved: usize,
    pub updated: usize,
}

/// A live instance.
struct Instance {
    component: Box<dyn Component>,
    category: Category,
    /// The item the instance is currently bound to.
    bound: Option<ItemId>,
}

/// Owns every instance, bound or pooled.
struct Pool {
    instances: HashMap<InstanceId, Instance>,
    free: HashMap<Category, Vec<InstanceId>>,
    limit: usize,
}

impl Pool {
    /// Binds a pooled or fresh instance to an item and requests its images.
    fn attach(
        &mut self,
        factory: &Arc<dyn ComponentFactory>,
        item: &ItemModel,
        context: &Context,
        images: &mut ImageCoordinator,
    ) -> InstanceId {
        let pooled = self.free.get_mut(item.category()).and_then(Vec::pop);
        let id = match pooled {
            Some(id) => {
                trace!(?id, item = %item.id(), "reusing instance");
                id
            }
            None => {
                let id = InstanceId::new();
                trace!(?id, item = %item.id(), category = %item.category(), "creating instance");
                self.instances.insert(
                    id,
                    Instance {
                        component: factory.create_instance(),
                        category: item.category().clone(),
                        bound: None,
                    },
                );
                id
            }
        };

        if let Some(instance) = self.instances.get_mut(&id) {
            factory.bind(&mut *instance.component, item, context);
            instance.bound = Some(item.id().clone());
        }
        request_images(images, id, item);
        id
    }

    /// Rebinds an instance to a new model of its item.
    fn update(
        &mut self,
        id: InstanceId,
        item: &ItemModel,
        context: &Context,
        images: &mut ImageCoordinator,
    ) {
        if let Some(instance) = self.instances.get_mut(&id) {
            instance.component.update(item, context);
            instance.bound = Some(item.id().clone());
        }
        request_images(images, id, item);
    }

    /// Unbinds an instance and pools or destroys it.
    fn release(&mut self, id: InstanceId, images: &mut ImageCoordinator) {
        // must happen before the instance can be rebound
        images.cancel_instance(id);

        let instance = match self.instances.get_mut(&id) {
            Some(instance) => instance,
            None => return,
        };
        instance.bound = None;
        let free = self.free.entry(instance.category.clone()).or_default();
        if free.len() < self.limit {
            instance.component.prepare_for_reuse();
            free.push(id);
        } else {
            instance.component.will_disappear();
            self.instances.remove(&id);
            trace!(?id, "destroyed instance");
        }
    }

    fn destroy_all(&mut self) -> usize {
        let count = self.instances.len();
        for (_, mut instance) in self.instances.drain() {
            instance.component.will_disappear();
        }
        self.free.clear();
        count
    }
}

/// Issues requests for the item's images and cancels those for slots the item no longer has.
fn request_images(images: &mut ImageCoordinator, id: InstanceId, item: &ItemModel) {
    for slot in images.pending_slots(id) {
        if item.image(&slot).is_none() {
            images.cancel(id, &slot);
        }
    }
    for (slot, descriptor) in item.images() {
        images.request(id, slot.clone(), item.id(), descriptor.clone());
    }
}

/// Memoized sizes per `(item, container width)`.
#[derive(Debug, Default)]
struct SizeCache {
    entries: HashMap<ItemId, Vec<(u64, Size)>>,
    placeholder_height: f64,
}

impl SizeCache {
    fn measure(
        &mut self,
        factory: Option<&Arc<dyn ComponentFactory>>,
        item: &ItemModel,
        width: f64,
    ) -> Size {
        let key = width.to_bits();
        let entry = self.entries.entry(item.id().clone()).or_default();
        if let Some((_, cached)) = entry.iter().find(|(w, _)| *w == key) {
            return *cached;
        }
        let measured = match factory {
            Some(factory) => factory.preferred_size(item, width),
            None => size(width, self.placeholder_height),
        };
        entry.push((key, measured));
        measured
    }

    fn forget(&mut self, item: &ItemId) {
        self.entries.remove(item);
    }

    fn clear(&mut self) {
        self.entries.clear();
    }
}

/// One item in the mirrored sequence.
struct Slot {
    item: ItemModel,
    /// None if the category could not be resolved; the slot is then a placeholder.
    factory: Option<Arc<dyn ComponentFactory>>,
    instance: Option<InstanceId>,
}

impl Slot {
    fn content(&self) -> RowContent {
        match (self.instance, &self.factory) {
            (Some(id), _) => RowContent::Component(id),
            (None, None) => RowContent::Placeholder,
            (None, Some(_)) => RowContent::Unrealized,
        }
    }

    fn row(&self, sizes: &mut SizeCache, width: f64) -> Row {
        Row {
            item: self.item.id().clone(),
            size: sizes.measure(self.factory.as_ref(), &self.item, width),
            content: self.content(),
        }
    }
}

/// Owns the item → instance mapping and applies edit scripts to it.
pub struct Lifecycle {
    registry: Arc<dyn Registry>,
    context: Context,
    slots: Vec<Slot>,
    header: Option<Slot>,
    overlay: Option<Slot>,
    pool: Pool,
    sizes: SizeCache,
    live: Range<usize>,
    /// Instances may sit anywhere until the next `set_live_window`.
    structure_changed: bool,
    patches: Vec<Patch>,
}

impl Lifecycle {
    pub fn new(registry: Arc<dyn Registry>, context: Context, config: &ScreenConfig) -> Lifecycle {
        Lifecycle {
            registry,
            context,
            slots: Vec::new(),
            header: None,
            overlay: None,
            pool: Pool {
                instances: HashMap::new(),
                free: HashMap::new(),
                limit: config.reuse_pool_limit,
            },
            sizes: SizeCache {
                entries: HashMap::new(),
                placeholder_height: config.placeholder_height,
            },
            live: 0..0,
            structure_changed: false,
            patches: Vec::new(),
        }
    }

    pub fn context(&self) -> &Context {
        &self.context
    }

    pub(crate) fn set_screen(&mut self, screen: &str) {
        if &*self.context.screen != screen {
            self.context.screen = screen.into();
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn items(&self) -> impl Iterator<Item = &ItemModel> + '_ {
        self.slots.iter().map(|slot| &slot.item)
    }

    pub fn index_of(&self, id: &ItemId) -> Option<usize> {
        self.slots.iter().position(|slot| slot.item.id() == id)
    }

    /// The live window applied last.
    pub fn live_window(&self) -> Range<usize> {
        self.live.clone()
    }

    fn slot_for(&self, id: &ItemId) -> Option<&Slot> {
        self.slots
            .iter()
            .chain(self.header.iter())
            .chain(self.overlay.iter())
            .find(|slot| slot.item.id() == id)
    }

    /// The instance bound to an item (including the header and overlay), if it is live.
    pub fn instance_id_for(&self, id: &ItemId) -> Option<InstanceId> {
        self.slot_for(id).and_then(|slot| slot.instance)
    }

    /// The component displaying an item, if it is live.
    pub fn instance_for(&self, id: &ItemId) -> Option<&dyn Component> {
        let instance = self.instance_id_for(id)?;
        self.pool
            .instances
            .get(&instance)
            .map(|instance| &*instance.component)
    }

    /// Number of instances bound to an item.
    pub fn live_instances(&self) -> usize {
        self.pool
            .instances
            .values()
            .filter(|instance| instance.bound.is_some())
            .count()
    }

    /// Number of recycled instances waiting for reuse.
    pub fn pooled(&self, category: &Category) -> usize {
        self.pool.free.get(category).map_or(0, Vec::len)
    }

    /// The size of an item at a container width; memoized until the item is updated or the
    /// container width changes.
    pub fn size_for(&mut self, item: &ItemModel, width: f64) -> Size {
        let factory = self
            .slot_for(item.id())
            .and_then(|slot| slot.factory.clone())
            .or_else(|| self.registry.resolve(item.category()));
        self.sizes.measure(factory.as_ref(), item, width)
    }

    /// Heights of all rows at the current container width.
    pub fn heights(&mut self) -> Vec<f64> {
        let width = self.context.container_width;
        let sizes = &mut self.sizes;
        self.slots
            .iter()
            .map(|slot| sizes.measure(slot.factory.as_ref(), &slot.item, width).y)
            .collect()
    }

    /// Applies a diff to the mirrored sequence, which must end up `expected` items long.
    ///
    /// The script is checked against the current sequence first; if it is malformed or yields the
    /// wrong number of items, nothing is changed. Inserted rows start out unrealized; call [`set_live_window`](Self::set_live_window)
    /// afterwards to bind instances, then [`flush`](Self::flush).
    pub fn apply_edits(
        &mut self,
        diff: &ViewModelDiff,
        expected: usize,
        images: &mut ImageCoordinator,
    ) -> Result<ApplyReport, InvariantViolation> {
        let script = &diff.items.script;
        let mut preview: Vec<ItemModel> = self.items().cloned().collect();
        script.apply(&mut preview)?;
        if preview.len() != expected {
            return Err(InvariantViolation::LengthMismatch {
                expected,
                actual: preview.len(),
            });
        }

        let mut report = ApplyReport::default();
        let width = self.context.container_width;

        for edit in script {
            match edit {
                Edit::Remove(index) => {
                    let slot = self.slots.remove(*index);
                    self.release(slot, images);
                    self.patches.push(Patch::Remove(*index));
                    report.removed += 1;
                }
                Edit::Move(from, to) => {
                    let slot = self.slots.remove(*from);
                    self.slots.insert(*to, slot);
                    self.patches.push(Patch::Move(*from, *to));
                    report.moved += 1;
                }
                Edit::Insert(index, item) => {
                    let slot = self.new_slot(item.clone(), &mut report);
                    let row = slot.row(&mut self.sizes, width);
                    self.slots.insert(*index, slot);
                    self.patches.push(Patch::Insert(*index, row));
                    report.inserted += 1;
                }
                Edit::Update(index, item) => {
                    self.update_slot(*index, item, images, &mut report);
                    report.updated += 1;
                }
            }
        }

        for duplicate in &diff.items.duplicates {
            warn!(id = %duplicate.id, index = duplicate.index, "duplicate item identity");
            report.errors.push(ItemError::DuplicateIdentity {
                id: duplicate.id.clone(),
                index: duplicate.index,
            });
        }

        if let Some(edit) = &diff.header {
            let current = self.header.take();
            self.header = self.apply_slot_edit(current, edit, images, &mut report);
            let row = self.header.as_ref().map(|slot| slot.row(&mut self.sizes, width));
            self.patches.push(Patch::Header(row));
        }
        if let Some(edit) = &diff.overlay {
            let current = self.overlay.take();
            self.overlay = self.apply_slot_edit(current, edit, images, &mut report);
            let row = self.overlay.as_ref().map(|slot| slot.row(&mut self.sizes, width));
            self.patches.push(Patch::Overlay(row));
        }

        self.structure_changed = true;
        debug!(
            inserted = report.inserted,
            removed = report.removed,
            moved = report.moved,
            updated = report.updated,
            errors = report.errors.len(),
            "applied edits"
        );
        Ok(report)
    }

    /// Resolves the factory for a new item.
    fn new_slot(&self, item: ItemModel, report: &mut ApplyReport) -> Slot {
        let factory = self.registry.resolve(item.category());
        if factory.is_none() {
            warn!(item = %item.id(), category = %item.category(), "unresolved component category");
            report.errors.push(ItemError::Resolution(ResolutionError {
                item: item.id().clone(),
                category: item.category().clone(),
            }));
        }
        Slot {
            item,
            factory,
            instance: None,
        }
    }

    /// Replaces the model at an index; a category change replaces the row entirely.
    fn update_slot(
        &mut self,
        index: usize,
        item: &ItemModel,
        images: &mut ImageCoordinator,
        report: &mut ApplyReport,
    ) {
        let width = self.context.container_width;
        self.sizes.forget(item.id());

        let slot = &mut self.slots[index];
        if slot.factory.is_some() && slot.item.category() == item.category() {
            slot.item = item.clone();
            if let Some(id) = slot.instance {
                self.pool.update(id, &slot.item, &self.context, images);
            }
            let row = self.slots[index].row(&mut self.sizes, width);
            self.patches.push(Patch::Update(index, row));
            return;
        }

        let fresh = self.new_slot(item.clone(), report);
        let old = std::mem::replace(&mut self.slots[index], fresh);
        let was_live = old.instance.is_some();
        self.release(old, images);

        let row = self.slots[index].row(&mut self.sizes, width);
        self.patches.push(Patch::Remove(index));
        self.patches.push(Patch::Insert(index, row));
        if was_live {
            self.realize(index, images);
        }
    }

    /// Applies a header or overlay edit. Those slots are always live.
    fn apply_slot_edit(
        &mut self,
        current: Option<Slot>,
        edit: &SlotEdit,
        images: &mut ImageCoordinator,
        report: &mut ApplyReport,
    ) -> Option<Slot> {
        if let Some(mut slot) = current {
            if let SlotEdit::Update(item) = edit {
                if slot.factory.is_some()
                    && slot.item.id() == item.id()
                    && slot.item.category() == item.category()
                {
                    self.sizes.forget(item.id());
                    slot.item = item.clone();
                    if let Some(id) = slot.instance {
                        self.pool.update(id, &slot.item, &self.context, images);
                    }
                    return Some(slot);
                }
            }
            self.release(slot, images);
        }

        match edit {
            SlotEdit::Remove => None,
            SlotEdit::Insert(item) | SlotEdit::Update(item) => {
                let mut slot = self.new_slot(item.clone(), report);
                if let Some(factory) = &slot.factory {
                    let id = self.pool.attach(factory, &slot.item, &self.context, images);
                    slot.instance = Some(id);
                }
                Some(slot)
            }
        }
    }

    fn release(&mut self, slot: Slot, images: &mut ImageCoordinator) {
        if let Some(id) = slot.instance {
            self.pool.release(id, images);
        }
        self.sizes.forget(slot.item.id());
    }

    /// Binds an instance to the slot at `index` if it has none.
    fn realize(&mut self, index: usize, images: &mut ImageCoordinator) {
        let width = self.context.container_width;
        let slot = &mut self.slots[index];
        if slot.instance.is_some() {
            return;
        }
        let factory = match &slot.factory {
            Some(factory) => factory,
            None => return,
        };
        let id = self.pool.attach(factory, &slot.item, &self.context, images);
        slot.instance = Some(id);

        let row = self.slots[index].row(&mut self.sizes, width);
        self.patches.push(Patch::Update(index, row));
    }

    /// Recycles the instance of the slot at `index`, if any.
    fn unrealize(&mut self, index: usize, images: &mut ImageCoordinator) {
        let width = self.context.container_width;
        if let Some(id) = self.slots[index].instance.take() {
            self.pool.release(id, images);
            let row = self.slots[index].row(&mut self.sizes, width);
            self.patches.push(Patch::Update(index, row));
        }
    }

    /// Makes sure exactly the slots in `window` have instances.
    ///
    /// Slots leaving the window are recycled before slots entering it are bound, so the freed
    /// instances are reused straight away.
    pub fn set_live_window(&mut self, window: Range<usize>, images: &mut ImageCoordinator) {
        let len = self.slots.len();
        let window = window.start.min(len)..window.end.min(len);

        let leaving: Vec<usize> = if self.structure_changed {
            (0..len)
                .filter(|i| !window.contains(i) && self.slots[*i].instance.is_some())
                .collect()
        } else {
            self.live
                .clone()
                .filter(|i| *i < len && !window.contains(i))
                .collect()
        };
        for index in leaving {
            self.unrealize(index, images);
        }
        for index in window.clone() {
            self.realize(index, images);
        }

        self.live = window;
        self.structure_changed = false;
    }

    /// Changes the container width; every size is measured again.
    pub fn set_container_width(&mut self, width: f64) {
        if self.context.container_width == width {
            return;
        }
        self.context.container_width = width;
        self.sizes.clear();

        for index in 0..self.slots.len() {
            let row = self.slots[index].row(&mut self.sizes, width);
            self.patches.push(Patch::Update(index, row));
        }
        if let Some(slot) = &self.header {
            self.patches.push(Patch::Header(Some(slot.row(&mut self.sizes, width))));
        }
        if let Some(slot) = &self.overlay {
            self.patches.push(Patch::Overlay(Some(slot.row(&mut self.sizes, width))));
        }
    }

    /// Hands an image to the component that asked for it.
    ///
    /// The delivery is dropped unless the instance is still bound to the item the image was
    /// requested for.
    pub fn deliver_image(&mut self, delivery: ImageDelivery) -> bool {
        let instance = match self.pool.instances.get_mut(&delivery.instance) {
            Some(instance) => instance,
            None => {
                debug!(instance = ?delivery.instance, "discarding image for destroyed instance");
                return false;
            }
        };
        if instance.bound.as_ref() != Some(&delivery.item) {
            debug!(
                instance = ?delivery.instance,
                item = %delivery.item,
                "discarding image for rebound instance"
            );
            return false;
        }

        match &delivery.result {
            Ok(image) => instance.component.image_loaded(&delivery.slot, image),
            Err(error) => {
                warn!(item = %delivery.item, slot = ?delivery.slot, %error, "image failed to load");
                instance.component.image_failed(&delivery.slot, error);
            }
        }
        true
    }

    /// Notifies the component at `index` that it was selected. Returns false if it is not live.
    pub fn select(&mut self, index: usize) -> bool {
        let id = match self.slots.get(index).and_then(|slot| slot.instance) {
            Some(id) => id,
            None => return false,
        };
        match self.pool.instances.get_mut(&id) {
            Some(instance) => {
                instance.component.did_select();
                true
            }
            None => false,
        }
    }

    /// Sends queued patches to the container as one transaction.
    pub fn flush(&mut self, container: &mut dyn Container) {
        let patches = std::mem::take(&mut self.patches);
        if !patches.is_empty() {
            trace!(count = patches.len(), "flushing container patches");
        }
        container.apply_batch(patches);
    }

    /// Discards queued patches without sending them.
    pub(crate) fn discard_patches(&mut self) {
        self.patches.clear();
    }

    /// Cancels all image requests and destroys every instance. Returns how many were destroyed.
    pub fn teardown(&mut self, images: &mut ImageCoordinator) -> usize {
        images.cancel_all();
        let destroyed = self.pool.destroy_all();
        self.slots.clear();
        self.header = None;
        self.overlay = None;
        self.sizes.clear();
        self.patches.clear();
        self.live = 0..0;
        self.structure_changed = false;
        destroyed
    }
}

impl fmt::Debug for Lifecycle {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Lifecycle")
            .field("context", &self.context)
            .field("items", &self.slots.len())
            .field("instances", &self.pool.instances.len())
            .field("live", &self.live)
            .field("queued_patches", &self.patches.len())
            .finish()
    }
}
