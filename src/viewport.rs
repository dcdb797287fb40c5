//! Scroll position, visible range and pagination triggering.

use crate::config::ScreenConfig;
use crate::rect::{size, Rect, Size};
use cgmath::Point2;
use core::ops::Range;
use tracing::{debug, trace};

/// The first visible row and its distance from the top of the viewport.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Anchor {
    pub index: usize,
    /// `row top - scroll offset`; negative if the row is partly scrolled out.
    pub delta: f64,
}

/// Tracks the scroll offset over a column of rows.
///
/// Row frames are stacked top to bottom starting at zero; the viewport spans
/// `offset..offset + height`.
#[derive(Debug, Clone)]
pub struct Viewport {
    frames: Vec<Rect>,
    offset: f64,
    size: Size,
    look_ahead: f64,
    pagination_threshold: usize,
    paginating: bool,
}

impl Viewport {
    pub fn new(config: &ScreenConfig) -> Viewport {
        Viewport {
            frames: Vec::new(),
            offset: 0.,
            size: size(config.initial_width, config.viewport_height),
            look_ahead: config.look_ahead.max(0.),
            pagination_threshold: config.pagination_threshold,
            paginating: false,
        }
    }

    /// Replaces the row heights. The offset is clamped to the new content.
    pub fn set_heights(&mut self, heights: &[f64]) {
        let width = self.size.x;
        let mut y = 0.;
        self.frames.clear();
        self.frames.extend(heights.iter().map(|height| {
            let frame = Rect::new(Point2::new(0., y), size(width, height.max(0.)));
            y = frame.max_y();
            frame
        }));
        self.offset = self.clamp(self.offset);
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn content_height(&self) -> f64 {
        self.frames.last().map_or(0., Rect::max_y)
    }

    pub fn offset(&self) -> f64 {
        self.offset
    }

    pub fn size(&self) -> Size {
        self.size
    }

    pub fn frame(&self, index: usize) -> Option<Rect> {
        self.frames.get(index).copied()
    }

    fn max_offset(&self) -> f64 {
        (self.content_height() - self.size.y).max(0.)
    }

    fn clamp(&self, offset: f64) -> f64 {
        if offset.is_nan() {
            return 0.;
        }
        offset.max(0.).min(self.max_offset())
    }

    /// Scrolls to an offset; returns the offset actually applied.
    pub fn on_scroll(&mut self, offset: f64) -> f64 {
        self.offset = self.clamp(offset);
        trace!(offset = self.offset, "scrolled");
        self.offset
    }

    /// Changes the container width. Returns true if it changed; row heights must be set again.
    pub fn on_container_resize(&mut self, width: f64) -> bool {
        if self.size.x == width {
            return false;
        }
        debug!(from = self.size.x, to = width, "container resized");
        self.size.x = width;
        true
    }

    pub fn set_viewport_height(&mut self, height: f64) {
        self.size.y = height.max(0.);
        self.offset = self.clamp(self.offset);
    }

    /// Rows overlapping `top..bottom`, in the sense of [`Rect::overlaps_span`].
    fn range_in(&self, top: f64, bottom: f64) -> Range<usize> {
        let start = self.frames.partition_point(|frame| {
            frame.max_y() < top || (frame.max_y() == top && frame.size.y > 0.)
        });
        let end = self.frames.partition_point(|frame| frame.min_y() < bottom);
        start..end.max(start)
    }

    /// Rows at least partly inside the viewport.
    pub fn visible_range(&self) -> Range<usize> {
        self.range_in(self.offset, self.offset + self.size.y)
    }

    /// Rows that must have live instances: the visible range extended by the look-ahead
    /// distance on both edges.
    pub fn render_range(&self) -> Range<usize> {
        self.range_in(
            self.offset - self.look_ahead,
            self.offset + self.size.y + self.look_ahead,
        )
    }

    pub fn is_visible(&self, index: usize) -> bool {
        self.frames
            .get(index)
            .map_or(false, |frame| frame.overlaps_span(self.offset, self.offset + self.size.y))
    }

    /// Scrolls so that a row's top edge is at the top of the viewport, as far as the content
    /// allows. Returns the new offset.
    pub fn scroll_to(&mut self, index: usize) -> Option<f64> {
        let frame = self.frames.get(index)?;
        Some(self.on_scroll(frame.min_y()))
    }

    /// The first visible row, for keeping it in place across a change of content.
    pub fn anchor(&self) -> Option<Anchor> {
        let index = self.visible_range().start;
        let frame = self.frames.get(index)?;
        Some(Anchor {
            index,
            delta: frame.min_y() - self.offset,
        })
    }

    /// Scrolls so that the row now at `index` is at the same distance from the top as the
    /// anchored row was.
    pub fn restore(&mut self, index: usize, delta: f64) {
        if let Some(frame) = self.frames.get(index) {
            self.offset = self.clamp(frame.min_y() - delta);
        }
    }

    pub fn is_paginating(&self) -> bool {
        self.paginating
    }

    /// Whether to ask for more content.
    ///
    /// True once the trailing edge of the visible range comes within the pagination threshold
    /// of the last loaded row while more content exists. After returning true, returns false
    /// until [`pagination_finished`](Self::pagination_finished) is called.
    pub fn check_pagination(&mut self, has_more: bool) -> bool {
        if self.paginating || !has_more {
            return false;
        }
        let trailing = self.visible_range().end;
        if trailing.saturating_add(self.pagination_threshold) < self.frames.len() {
            return false;
        }
        debug!(trailing, len = self.frames.len(), "requesting pagination");
        self.paginating = true;
        true
    }

    pub fn pagination_finished(&mut self) {
        self.paginating = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn viewport(rows: usize) -> Viewport {
        let config = ScreenConfig::default()
            .with_viewport(100., 100.)
            .with_look_ahead(20.)
            .with_pagination_threshold(2);
        let mut viewport = Viewport::new(&config);
        viewport.set_heights(&vec![10.; rows]);
        viewport
    }

    #[test]
    fn test_visible_and_render_ranges() {
        let mut viewport = viewport(50);
        assert_eq!(viewport.content_height(), 500.);
        assert_eq!(viewport.visible_range(), 0..10);
        assert_eq!(viewport.render_range(), 0..12);

        viewport.on_scroll(105.);
        assert_eq!(viewport.visible_range(), 10..21);
        assert_eq!(viewport.render_range(), 8..23);
        assert!(viewport.is_visible(10));
        assert!(!viewport.is_visible(9));
    }

    #[test]
    fn test_scroll_is_clamped_to_content() {
        let mut viewport = viewport(15);
        assert_eq!(viewport.on_scroll(-4.), 0.);
        assert_eq!(viewport.on_scroll(1000.), 50.);
        viewport.set_heights(&[10.; 5]);
        assert_eq!(viewport.offset(), 0.);
        assert_eq!(viewport.visible_range(), 0..5);
    }

    #[test]
    fn test_empty_viewport() {
        let viewport = viewport(0);
        assert!(viewport.is_empty());
        assert_eq!(viewport.visible_range(), 0..0);
        assert_eq!(viewport.anchor(), None);
    }

    #[test]
    fn test_scroll_to_item() {
        let mut viewport = viewport(50);
        assert_eq!(viewport.scroll_to(20), Some(200.));
        assert_eq!(viewport.visible_range().start, 20);
        assert_eq!(viewport.scroll_to(49), Some(400.));
        assert_eq!(viewport.scroll_to(50), None);
    }

    #[test]
    fn test_anchor_survives_content_above() {
        let mut viewport = viewport(50);
        viewport.on_scroll(205.);
        let anchor = viewport.anchor().unwrap();
        assert_eq!(anchor, Anchor { index: 20, delta: -5. });

        // three rows inserted above
        viewport.set_heights(&[10.; 53]);
        viewport.restore(anchor.index + 3, anchor.delta);
        assert_eq!(viewport.offset(), 235.);
        assert_eq!(viewport.visible_range().start, 23);
    }

    #[test]
    fn test_pagination_fires_once_while_in_flight() {
        let mut viewport = viewport(20);
        assert!(!viewport.check_pagination(true), "far from the end");

        viewport.on_scroll(80.);
        assert_eq!(viewport.visible_range(), 8..18);
        assert!(viewport.check_pagination(true));
        for offset in [81., 90., 95., 100.] {
            viewport.on_scroll(offset);
            assert!(!viewport.check_pagination(true));
        }

        viewport.pagination_finished();
        assert!(viewport.check_pagination(true));
    }

    #[test]
    fn test_no_pagination_without_more_content() {
        let mut viewport = viewport(3);
        assert!(!viewport.check_pagination(false));
        assert!(viewport.check_pagination(true));
    }

    #[test]
    fn test_huge_pagination_threshold_always_paginates() {
        let config = ScreenConfig::default()
            .with_viewport(100., 100.)
            .with_pagination_threshold(usize::MAX);
        let mut viewport = Viewport::new(&config);
        viewport.set_heights(&[10.; 50]);
        assert_eq!(viewport.visible_range(), 0..10);
        assert!(viewport.check_pagination(true));
    }

    #[test]
    fn test_resize() {
        let mut viewport = viewport(3);
        assert!(!viewport.on_container_resize(100.));
        assert!(viewport.on_container_resize(200.));
        viewport.set_heights(&[10.; 3]);
        assert_eq!(viewport.frame(0).unwrap().size, size(200., 10.));

        viewport.set_viewport_height(15.);
        viewport.on_scroll(100.);
        assert_eq!(viewport.offset(), 15.);
        assert_eq!(viewport.visible_range(), 1..3);
    }
}
