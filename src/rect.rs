//! Rectangles and sizes.

use cgmath::{Point2, Vector2};

/// A width/height pair.
pub type Size = Vector2<f64>;

/// Creates a size.
pub fn size(width: f64, height: f64) -> Size {
    Vector2::new(width, height)
}

/// A rectangle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    /// Rectangle origin.
    pub origin: Point2<f64>,

    /// Rectangle size.
    pub size: Size,
}

impl Rect {
    /// Creates a new rectangle.
    pub fn new(origin: Point2<f64>, size: Size) -> Rect {
        Rect { origin, size }
    }

    pub fn min_y(&self) -> f64 {
        self.origin.y
    }

    pub fn max_y(&self) -> f64 {
        self.origin.y + self.size.y
    }

    /// Returns true if the rectangle overlaps the vertical span `[top, bottom)`.
    ///
    /// Zero-height rectangles overlap the span if their origin lies inside it.
    pub fn overlaps_span(&self, top: f64, bottom: f64) -> bool {
        if self.size.y <= 0. {
            self.origin.y >= top && self.origin.y < bottom
        } else {
            self.min_y() < bottom && self.max_y() > top
        }
    }
}
