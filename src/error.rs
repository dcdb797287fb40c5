//! Errors.

use crate::view_model::{Category, ItemId};
use std::sync::Arc;
use thiserror::Error;

/// A view model load failed.
///
/// Recoverable: the committed tree is left untouched and the load may be retried.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum LoadError {
    #[error("view model load failed: {0}")]
    Failed(Arc<str>),
    #[error("view model loader dropped the request without responding")]
    Abandoned,
}

impl LoadError {
    pub fn failed(message: impl Into<Arc<str>>) -> LoadError {
        LoadError::Failed(message.into())
    }
}

/// The registry had no factory for a category.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("no component registered for category {category:?} (item {item:?})")]
pub struct ResolutionError {
    pub item: ItemId,
    pub category: Category,
}

/// An image could not be loaded for a component slot.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ImageLoadError {
    #[error("image fetch failed: {0}")]
    Failed(Arc<str>),
    #[error("image loader dropped the request without responding")]
    Abandoned,
}

impl ImageLoadError {
    pub fn failed(message: impl Into<Arc<str>>) -> ImageLoadError {
        ImageLoadError::Failed(message.into())
    }
}

/// A malformed edit script or a broken internal invariant.
///
/// Fatal to the current diff-apply cycle; nothing from the cycle is applied.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum InvariantViolation {
    #[error("edit {edit} refers to index {index}, but the sequence has {len} items")]
    IndexOutOfRange { edit: usize, index: usize, len: usize },
    #[error("edit script produced {actual} items, expected {expected}")]
    LengthMismatch { expected: usize, actual: usize },
    #[error("update at index {index} targets {found:?}, but the item there is {expected:?}")]
    IdentityMismatch {
        index: usize,
        expected: ItemId,
        found: ItemId,
    },
}

/// A non-fatal error attached to a single item of an otherwise successful cycle.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ItemError {
    #[error(transparent)]
    Resolution(#[from] ResolutionError),
    #[error("identity {id:?} appears more than once; duplicate at index {index} left unmatched")]
    DuplicateIdentity { id: ItemId, index: usize },
}

/// Errors returned by the public screen entry points.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ScreenError {
    #[error("{operation} is not allowed while the screen is {state}")]
    InvalidState {
        operation: &'static str,
        state: &'static str,
    },
    #[error("no surface is attached")]
    NotAttached,
    #[error("no item with identity {0:?}")]
    UnknownItem(ItemId),
}
