//! The scrollable surface that rows are attached to.

use crate::component::InstanceId;
use crate::rect::Size;
use crate::view_model::ItemId;

/// What a row currently displays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowContent {
    /// A live component instance.
    Component(InstanceId),
    /// Reserved space for an item whose component could not be resolved.
    Placeholder,
    /// Space for an item that is outside the live window and has no instance.
    Unrealized,
}

/// A row as seen by the container.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    pub item: ItemId,
    pub size: Size,
    pub content: RowContent,
}

/// Patches for the container.
#[derive(Debug, Clone, PartialEq)]
pub enum Patch {
    /// Inserts a row.
    Insert(usize, Row),
    /// Removes a row.
    Remove(usize),
    /// Removes a row at `.0` and re-inserts it at `.1`.
    Move(usize, usize),
    /// Replaces a row.
    Update(usize, Row),
    /// Sets or clears the header.
    Header(Option<Row>),
    /// Sets or clears the overlay.
    Overlay(Option<Row>),
}

/// A scrollable container.
///
/// Rows are addressed by index, each index referring to the container as it is at that point of
/// the batch.
pub trait Container {
    /// Starts a visual transaction; nothing may be shown until `end_updates`.
    fn begin_updates(&mut self) {}

    /// Ends a visual transaction.
    fn end_updates(&mut self) {}

    fn insert(&mut self, index: usize, row: Row);

    fn remove(&mut self, index: usize);

    fn move_row(&mut self, from: usize, to: usize);

    fn update(&mut self, index: usize, row: Row);

    fn set_header(&mut self, row: Option<Row>);

    fn set_overlay(&mut self, row: Option<Row>);

    /// Applies a single patch.
    fn patch(&mut self, patch: Patch) {
        match patch {
            Patch::Insert(index, row) => self.insert(index, row),
            Patch::Remove(index) => self.remove(index),
            Patch::Move(from, to) => self.move_row(from, to),
            Patch::Update(index, row) => self.update(index, row),
            Patch::Header(row) => self.set_header(row),
            Patch::Overlay(row) => self.set_overlay(row),
        }
    }

    /// Applies patches as one visual transaction.
    fn apply_batch(&mut self, patches: Vec<Patch>) {
        if patches.is_empty() {
            return;
        }
        self.begin_updates();
        for patch in patches {
            self.patch(patch);
        }
        self.end_updates();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rect::size;
    use crate::test_support::RecordingContainer;

    fn row(id: &str) -> Row {
        Row {
            item: id.into(),
            size: size(10., 10.),
            content: RowContent::Unrealized,
        }
    }

    #[test]
    fn test_batches_are_wrapped_in_one_transaction() {
        let mut container = RecordingContainer::default();
        container.apply_batch(vec![
            Patch::Insert(0, row("a")),
            Patch::Insert(1, row("b")),
            Patch::Move(1, 0),
            Patch::Header(Some(row("h"))),
        ]);
        container.apply_batch(Vec::new());

        assert_eq!(container.transactions, 1);
        assert_eq!(container.ids(), ["b", "a"]);
        assert_eq!(container.header.as_ref().map(|r| r.item.as_str()), Some("h"));
    }
}
