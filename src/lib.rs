//! Reconciling, component-based scrollable screens.
//!
//! # Conceptual overview
//! Plume displays a scrollable column of components driven by a [`ViewModel`]: an immutable
//! snapshot of what should be on screen. Snapshots arrive over time (initial load, refresh,
//! pagination) and each new one is reconciled against the one currently on screen, so that only
//! the rows that actually changed are touched.
//!
//! ## View models
//! A view model holds an ordered list of items, plus an optional header and overlay. Every item
//! has an identity, a component category, a typed payload and a set of image descriptors.
//! Identity is what ties two snapshots together: items with the same identity are the same
//! logical row, wherever they are in the list.
//!
//! ## Diffing
//! The [diff engine](diff) turns two item lists into an [`EditScript`]: removals, moves,
//! insertions and in-place updates, each index referring to the list as it is at that step.
//! Applying the script to the old list yields exactly the new one.
//!
//! ## Components
//! Categories are resolved through a [`Registry`] to a [`ComponentFactory`], which creates
//! [`Component`] instances and reports preferred sizes. Instances are owned by the
//! [lifecycle manager](lifecycle::Lifecycle). Only rows near the viewport have an instance; rows
//! that scroll away give theirs up, and it is rebound to the next row of the same category that
//! needs one. If a category cannot be resolved, the row is kept as an empty placeholder and the
//! error is reported alongside the rest of the cycle.
//!
//! ## Images
//! Components do not fetch images themselves. Each item lists its images by slot and the
//! [image coordinator](image::ImageCoordinator) requests them on behalf of the instance bound to
//! the item. Requests are cancelled before an instance is rebound, and every delivery is checked
//! against the item the instance is bound to at that moment, so an image can never end up on the
//! wrong row.
//!
//! ## Screens
//! A [`Screen`] ties everything together. It is a small state machine
//! (idle, loading, ready, torn down) that starts loads, applies their results, keeps the scroll
//! position stable across changes and asks for more content near the end of the list.
//!
//! Loaders and image loaders may run on any thread. They reply through responders that send
//! their results over a channel; the host calls [`Screen::poll`] on the screen's own sequence to
//! fold them in. If loads complete out of order, the newest one wins.
//!
//! ## Containers
//! The rows themselves live in a host-provided [`Container`]. Every cycle ends in a single batch
//! of [container patches](container::Patch) wrapped in one visual transaction.

pub mod component;
pub mod config;
pub mod container;
pub mod diff;
pub mod error;
pub mod image;
pub mod lifecycle;
pub mod loader;
pub mod rect;
pub mod screen;
pub mod view_model;
pub mod viewport;

#[cfg(test)]
mod test_support;

pub use component::{Component, ComponentFactory, ComponentRegistry, Context, InstanceId, Registry};
pub use config::ScreenConfig;
pub use container::{Container, Patch, Row, RowContent};
pub use diff::{compute_edits, diff_view_models, Edit, EditScript};
pub use error::{
    ImageLoadError, InvariantViolation, ItemError, LoadError, ResolutionError, ScreenError,
};
pub use image::{Image, ImageLoader, ImageRequest, ImageResponder};
pub use lifecycle::ApplyReport;
pub use loader::{LoadKind, LoadResponder, LoadSeq, ViewModelLoader};
pub use rect::{size, Rect, Size};
pub use screen::{Screen, ScreenEvent, ScreenState};
pub use view_model::{Category, ImageDescriptor, ImageSlot, ItemId, ItemModel, ViewModel};
