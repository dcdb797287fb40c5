//! Components: live rendering objects bound to items, and the registry that makes them.
//!
//! A component category is resolved through a [`Registry`] to a [`ComponentFactory`], which
//! creates instances, sizes items, and binds instances to item models. Instances themselves are
//! owned by the [lifecycle manager](crate::lifecycle::Lifecycle) and may be recycled: rebound to a
//! different item of the same category.

use crate::error::ImageLoadError;
use crate::image::Image;
use crate::rect::Size;
use crate::view_model::{Category, ImageSlot, ItemModel};
use core::any::Any;
use core::fmt;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

/// A unique identifier for a component instance.
///
/// (this is just a UUID)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct InstanceId(Uuid);

impl InstanceId {
    pub(crate) fn new() -> InstanceId {
        InstanceId(Uuid::new_v4())
    }
}

/// Per-screen context handed to components.
#[derive(Debug, Clone, PartialEq)]
pub struct Context {
    pub(crate) screen: Arc<str>,
    pub(crate) container_width: f64,
}

impl Context {
    pub fn new(screen: impl Into<Arc<str>>, container_width: f64) -> Context {
        Context {
            screen: screen.into(),
            container_width,
        }
    }

    /// Identifier of the view model currently on screen.
    pub fn screen(&self) -> &str {
        &self.screen
    }

    pub fn container_width(&self) -> f64 {
        self.container_width
    }
}

/// A live component instance.
///
/// All hooks are called on the screen's logical sequence, never concurrently.
pub trait Component: Any + fmt::Debug {
    /// For downcasting.
    fn as_any(&self) -> &dyn Any;

    /// For downcasting.
    fn as_any_mut(&mut self) -> &mut dyn Any;

    /// Binds the instance to an item. Called for fresh and recycled instances alike.
    fn bind(&mut self, item: &ItemModel, context: &Context);

    /// Called when the bound item was replaced by a new model of the same identity.
    fn update(&mut self, item: &ItemModel, context: &Context) {
        self.bind(item, context);
    }

    /// Called before a recycled instance is rebound to another item.
    fn prepare_for_reuse(&mut self) {}

    /// Called right before the instance is destroyed.
    fn will_disappear(&mut self) {}

    /// Called when the bound item is selected.
    fn did_select(&mut self) {}

    /// An image requested for the bound item has arrived.
    fn image_loaded(&mut self, slot: &ImageSlot, image: &Image) {
        let _ = (slot, image);
    }

    /// An image requested for the bound item could not be loaded; show a fallback.
    fn image_failed(&mut self, slot: &ImageSlot, error: &ImageLoadError) {
        let _ = (slot, error);
    }
}

/// Creates, sizes and binds components of one category.
pub trait ComponentFactory: Send + Sync {
    /// Creates a new, unbound instance.
    fn create_instance(&self) -> Box<dyn Component>;

    /// The size an item wants at the given container width.
    fn preferred_size(&self, item: &ItemModel, width: f64) -> Size;

    /// Binds an instance to an item.
    fn bind(&self, instance: &mut dyn Component, item: &ItemModel, context: &Context) {
        instance.bind(item, context);
    }
}

/// Resolves component categories to factories.
pub trait Registry: Send + Sync {
    fn resolve(&self, category: &Category) -> Option<Arc<dyn ComponentFactory>>;
}

/// A registry backed by a map.
#[derive(Default, Clone)]
pub struct ComponentRegistry {
    factories: HashMap<Category, Arc<dyn ComponentFactory>>,
}

impl ComponentRegistry {
    pub fn new() -> ComponentRegistry {
        ComponentRegistry::default()
    }

    /// Registers a factory, returning the one it replaced.
    pub fn register(
        &mut self,
        category: impl Into<Category>,
        factory: Arc<dyn ComponentFactory>,
    ) -> Option<Arc<dyn ComponentFactory>> {
        self.factories.insert(category.into(), factory)
    }

    pub fn unregister(&mut self, category: &Category) -> Option<Arc<dyn ComponentFactory>> {
        self.factories.remove(category)
    }
}

impl Registry for ComponentRegistry {
    fn resolve(&self, category: &Category) -> Option<Arc<dyn ComponentFactory>> {
        self.factories.get(category).cloned()
    }
}

impl fmt::Debug for ComponentRegistry {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_set().entries(self.factories.keys()).finish()
    }
}
