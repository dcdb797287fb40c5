//! View models: immutable, declarative descriptions of what should be on screen.
//!
//! A [`ViewModel`] is never mutated once built; a new snapshot replaces the old one wholesale and
//! the two are reconciled by the [diff engine](crate::diff).

use core::any::Any;
use core::fmt;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Stable identity of an item; the same identity in two snapshots denotes the same logical row.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ItemId(Arc<str>);

impl ItemId {
    pub fn new(id: impl Into<Arc<str>>) -> ItemId {
        ItemId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ItemId {
    fn from(id: &str) -> ItemId {
        ItemId::new(id)
    }
}

impl From<String> for ItemId {
    fn from(id: String) -> ItemId {
        ItemId::new(id)
    }
}

/// A component category, used to look up a factory in the registry.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Category(Arc<str>);

impl Category {
    pub fn new(name: impl Into<Arc<str>>) -> Category {
        Category(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Category {
    fn from(name: &str) -> Category {
        Category::new(name)
    }
}

/// Arbitrary typed data attached to an item.
///
/// Implemented for every `PartialEq + Debug + Send + Sync` type; payloads of different concrete
/// types are never equal.
pub trait Payload: Any + fmt::Debug + Send + Sync {
    /// For downcasting.
    fn as_any(&self) -> &dyn Any;

    /// Compares this payload to another by value; used for diffing.
    fn payload_eq(&self, other: &dyn Payload) -> bool;
}

impl<T: Any + PartialEq + fmt::Debug + Send + Sync> Payload for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn payload_eq(&self, other: &dyn Payload) -> bool {
        match other.as_any().downcast_ref::<T>() {
            Some(other) => self == other,
            None => false,
        }
    }
}

/// Named image slot on a component.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ImageSlot {
    Main,
    Background,
    Custom(Arc<str>),
}

impl ImageSlot {
    pub fn custom(name: impl Into<Arc<str>>) -> ImageSlot {
        ImageSlot::Custom(name.into())
    }
}

/// Where an image comes from.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ImageDescriptor {
    /// Opaque source (usually a URL) handed to the image loader.
    pub source: Arc<str>,
    /// Optional local placeholder to show until the image arrives.
    pub placeholder: Option<Arc<str>>,
}

impl ImageDescriptor {
    pub fn new(source: impl Into<Arc<str>>) -> ImageDescriptor {
        ImageDescriptor {
            source: source.into(),
            placeholder: None,
        }
    }

    pub fn with_placeholder(mut self, placeholder: impl Into<Arc<str>>) -> ImageDescriptor {
        self.placeholder = Some(placeholder.into());
        self
    }
}

/// One row of a view model.
#[derive(Clone)]
pub struct ItemModel {
    id: ItemId,
    category: Category,
    payload: Arc<dyn Payload>,
    images: BTreeMap<ImageSlot, ImageDescriptor>,
    target: Option<Arc<str>>,
}

impl ItemModel {
    /// Creates an item with an empty payload.
    pub fn new(id: impl Into<ItemId>, category: impl Into<Category>) -> ItemModel {
        ItemModel {
            id: id.into(),
            category: category.into(),
            payload: Arc::new(()),
            images: BTreeMap::new(),
            target: None,
        }
    }

    pub fn with_payload<T: Payload>(mut self, payload: T) -> ItemModel {
        self.payload = Arc::new(payload);
        self
    }

    pub fn with_image(mut self, slot: ImageSlot, descriptor: ImageDescriptor) -> ItemModel {
        self.images.insert(slot, descriptor);
        self
    }

    /// Sets the opaque target reported when the item is selected.
    pub fn with_target(mut self, target: impl Into<Arc<str>>) -> ItemModel {
        self.target = Some(target.into());
        self
    }

    pub fn id(&self) -> &ItemId {
        &self.id
    }

    pub fn category(&self) -> &Category {
        &self.category
    }

    pub fn payload(&self) -> &dyn Payload {
        &*self.payload
    }

    /// Returns the payload if it is of type `T`.
    pub fn payload_as<T: Any>(&self) -> Option<&T> {
        self.payload.as_any().downcast_ref::<T>()
    }

    pub fn images(&self) -> &BTreeMap<ImageSlot, ImageDescriptor> {
        &self.images
    }

    pub fn image(&self, slot: &ImageSlot) -> Option<&ImageDescriptor> {
        self.images.get(slot)
    }

    pub fn target(&self) -> Option<&str> {
        self.target.as_deref()
    }

    /// True if everything except the identity is equal.
    pub fn content_eq(&self, other: &ItemModel) -> bool {
        self.category == other.category
            && (Arc::ptr_eq(&self.payload, &other.payload)
                || self.payload.payload_eq(&*other.payload))
            && self.images == other.images
            && self.target == other.target
    }
}

impl PartialEq for ItemModel {
    fn eq(&self, other: &ItemModel) -> bool {
        self.id == other.id && self.content_eq(other)
    }
}

impl fmt::Debug for ItemModel {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("ItemModel")
            .field("id", &self.id)
            .field("category", &self.category)
            .field("payload", &self.payload)
            .field("images", &self.images)
            .field("target", &self.target)
            .finish()
    }
}

/// An immutable view model snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct ViewModel {
    id: Arc<str>,
    title: Option<Arc<str>>,
    header: Option<ItemModel>,
    overlay: Option<ItemModel>,
    items: Vec<ItemModel>,
    has_more: bool,
}

impl ViewModel {
    pub fn builder(id: impl Into<Arc<str>>) -> ViewModelBuilder {
        ViewModelBuilder {
            model: ViewModel {
                id: id.into(),
                title: None,
                header: None,
                overlay: None,
                items: Vec::new(),
                has_more: false,
            },
        }
    }

    /// The empty tree that an initial load is diffed against.
    pub fn empty() -> ViewModel {
        ViewModel::builder("").build()
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn title(&self) -> Option<&str> {
        self.title.as_deref()
    }

    pub fn header(&self) -> Option<&ItemModel> {
        self.header.as_ref()
    }

    pub fn overlay(&self) -> Option<&ItemModel> {
        self.overlay.as_ref()
    }

    pub fn items(&self) -> &[ItemModel] {
        &self.items
    }

    /// Whether the loader can provide more trailing content.
    pub fn has_more(&self) -> bool {
        self.has_more
    }

    pub fn index_of(&self, id: &ItemId) -> Option<usize> {
        self.items.iter().position(|item| item.id() == id)
    }
}

/// Assembles a [`ViewModel`].
#[derive(Debug)]
pub struct ViewModelBuilder {
    model: ViewModel,
}

impl ViewModelBuilder {
    pub fn title(mut self, title: impl Into<Arc<str>>) -> Self {
        self.model.title = Some(title.into());
        self
    }

    pub fn header(mut self, header: ItemModel) -> Self {
        self.model.header = Some(header);
        self
    }

    pub fn overlay(mut self, overlay: ItemModel) -> Self {
        self.model.overlay = Some(overlay);
        self
    }

    pub fn item(mut self, item: ItemModel) -> Self {
        self.model.items.push(item);
        self
    }

    pub fn items(mut self, items: impl IntoIterator<Item = ItemModel>) -> Self {
        self.model.items.extend(items);
        self
    }

    pub fn has_more(mut self, has_more: bool) -> Self {
        self.model.has_more = has_more;
        self
    }

    pub fn build(self) -> ViewModel {
        self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct Track {
        title: &'static str,
    }

    #[test]
    fn test_payloads_compare_by_value_and_type() {
        let a = ItemModel::new("1", "row").with_payload(Track { title: "a" });
        let b = ItemModel::new("1", "row").with_payload(Track { title: "a" });
        let c = ItemModel::new("1", "row").with_payload(Track { title: "c" });
        let d = ItemModel::new("1", "row").with_payload("a");

        assert!(a.content_eq(&b));
        assert!(!a.content_eq(&c));
        assert!(!a.content_eq(&d), "payloads of different types are never equal");
        assert_eq!(a.payload_as::<Track>().map(|t| t.title), Some("a"));
        assert!(a.payload_as::<String>().is_none());
    }

    #[test]
    fn test_images_and_category_participate_in_equality() {
        let a = ItemModel::new("1", "row").with_image(ImageSlot::Main, ImageDescriptor::new("x"));
        let b = ItemModel::new("1", "row").with_image(ImageSlot::Main, ImageDescriptor::new("y"));
        let c = ItemModel::new("1", "card").with_image(ImageSlot::Main, ImageDescriptor::new("x"));
        assert!(!a.content_eq(&b));
        assert!(!a.content_eq(&c));
        assert_eq!(a.image(&ImageSlot::Main).map(|d| &*d.source), Some("x"));
    }

    #[test]
    fn test_builder_keeps_item_order() {
        let model = ViewModel::builder("home")
            .title("Home")
            .header(ItemModel::new("h", "header"))
            .items(vec![ItemModel::new("a", "row"), ItemModel::new("b", "row")])
            .item(ItemModel::new("c", "row"))
            .has_more(true)
            .build();

        let ids: Vec<_> = model.items().iter().map(|i| i.id().as_str()).collect();
        assert_eq!(ids, ["a", "b", "c"]);
        assert_eq!(model.title(), Some("Home"));
        assert_eq!(model.index_of(&"b".into()), Some(1));
        assert!(model.has_more());
        assert!(model.overlay().is_none());
    }
}
