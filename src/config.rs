//! Screen configuration.

use serde::Deserialize;

/// Tuning knobs for a [`Screen`](crate::Screen).
///
/// Deserializable so hosts can keep it next to their other settings; missing fields fall back to
/// the defaults.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ScreenConfig {
    /// Extra distance, in points, kept live above and below the viewport.
    pub look_ahead: f64,
    /// Pagination is requested once the last visible item is this close to the end.
    pub pagination_threshold: usize,
    /// Maximum number of recycled instances kept per category.
    pub reuse_pool_limit: usize,
    /// Height reserved for items whose category could not be resolved.
    pub placeholder_height: f64,
    /// Container width until the host reports one.
    pub initial_width: f64,
    /// Viewport height until the host reports one.
    pub viewport_height: f64,
}

impl Default for ScreenConfig {
    fn default() -> Self {
        ScreenConfig {
            look_ahead: 200.,
            pagination_threshold: 5,
            reuse_pool_limit: 8,
            placeholder_height: 0.,
            initial_width: 320.,
            viewport_height: 480.,
        }
    }
}

impl ScreenConfig {
    pub fn with_look_ahead(mut self, look_ahead: f64) -> Self {
        self.look_ahead = look_ahead;
        self
    }

    pub fn with_pagination_threshold(mut self, threshold: usize) -> Self {
        self.pagination_threshold = threshold;
        self
    }

    pub fn with_reuse_pool_limit(mut self, limit: usize) -> Self {
        self.reuse_pool_limit = limit;
        self
    }

    pub fn with_placeholder_height(mut self, height: f64) -> Self {
        self.placeholder_height = height;
        self
    }

    pub fn with_viewport(mut self, width: f64, height: f64) -> Self {
        self.initial_width = width;
        self.viewport_height = height;
        self
    }
}
