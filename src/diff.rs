//! Reconciliation of two view model snapshots.
//!
//! Items are matched by identity, irrespective of position. The resulting [`EditScript`] is meant
//! to be applied in order, each index referring to the sequence as it is *at that step*:
//!
//! 1. removals, back to front;
//! 2. moves, placing every item outside the longest run that is already in order;
//! 3. insertions, front to back;
//! 4. in-place updates, at their final indices.
//!
//! If an identity occurs more than once in a sequence, only its first occurrence takes part in
//! matching. Later occurrences in the old sequence are removed and later occurrences in the new
//! sequence are inserted as distinct rows (and reported as [`Duplicate`]s).

use crate::error::InvariantViolation;
use crate::view_model::{ItemId, ItemModel, ViewModel};
use std::collections::{HashMap, HashSet};

/// A single structural change.
#[derive(Debug, Clone, PartialEq)]
pub enum Edit {
    /// Removes the item at the index.
    Remove(usize),
    /// Removes the item at `.0` and re-inserts it so that it ends up at `.1`.
    Move(usize, usize),
    /// Inserts a new item at the index.
    Insert(usize, ItemModel),
    /// Replaces the item at the index with a new model of the same identity.
    Update(usize, ItemModel),
}

/// An ordered list of edits.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EditScript {
    edits: Vec<Edit>,
}

impl EditScript {
    pub fn new(edits: Vec<Edit>) -> EditScript {
        EditScript { edits }
    }

    pub fn is_empty(&self) -> bool {
        self.edits.is_empty()
    }

    pub fn len(&self) -> usize {
        self.edits.len()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Edit> {
        self.edits.iter()
    }

    /// Checks that every index is in range for a sequence that starts out with `len` items.
    ///
    /// Returns the length of the sequence after the script has been applied.
    pub fn validate(&self, mut len: usize) -> Result<usize, InvariantViolation> {
        for (n, edit) in self.edits.iter().enumerate() {
            let check = |index: usize, bound: usize| {
                if index < bound {
                    Ok(())
                } else {
                    Err(InvariantViolation::IndexOutOfRange {
                        edit: n,
                        index,
                        len,
                    })
                }
            };
            match edit {
                Edit::Remove(index) => {
                    check(*index, len)?;
                    len -= 1;
                }
                Edit::Move(from, to) => {
                    check(*from, len)?;
                    check(*to, len)?;
                }
                Edit::Insert(index, _) => {
                    check(*index, len + 1)?;
                    len += 1;
                }
                Edit::Update(index, _) => check(*index, len)?,
            }
        }
        Ok(len)
    }

    /// Applies the script to a sequence.
    ///
    /// On error the sequence is left partially edited; apply to a copy if that matters.
    pub fn apply(&self, items: &mut Vec<ItemModel>) -> Result<(), InvariantViolation> {
        for (n, edit) in self.edits.iter().enumerate() {
            let len = items.len();
            let check = |index: usize, bound: usize| {
                if index < bound {
                    Ok(())
                } else {
                    Err(InvariantViolation::IndexOutOfRange {
                        edit: n,
                        index,
                        len,
                    })
                }
            };
            match edit {
                Edit::Remove(index) => {
                    check(*index, len)?;
                    items.remove(*index);
                }
                Edit::Move(from, to) => {
                    check(*from, len)?;
                    check(*to, len)?;
                    let item = items.remove(*from);
                    items.insert(*to, item);
                }
                Edit::Insert(index, item) => {
                    check(*index, len + 1)?;
                    items.insert(*index, item.clone());
                }
                Edit::Update(index, item) => {
                    check(*index, len)?;
                    if items[*index].id() != item.id() {
                        return Err(InvariantViolation::IdentityMismatch {
                            index: *index,
                            expected: items[*index].id().clone(),
                            found: item.id().clone(),
                        });
                    }
                    items[*index] = item.clone();
                }
            }
        }
        Ok(())
    }
}

impl<'a> IntoIterator for &'a EditScript {
    type Item = &'a Edit;
    type IntoIter = std::slice::Iter<'a, Edit>;

    fn into_iter(self) -> Self::IntoIter {
        self.edits.iter()
    }
}

/// A repeated identity found in the new sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Duplicate {
    pub id: ItemId,
    /// Index of the repeated occurrence in the new sequence.
    pub index: usize,
}

/// The result of diffing two item sequences.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SequenceDiff {
    pub script: EditScript,
    pub duplicates: Vec<Duplicate>,
}

/// A change to a single-slot model (header or overlay).
#[derive(Debug, Clone, PartialEq)]
pub enum SlotEdit {
    Insert(ItemModel),
    Remove,
    Update(ItemModel),
}

/// The result of diffing two view models.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ViewModelDiff {
    pub items: SequenceDiff,
    pub header: Option<SlotEdit>,
    pub overlay: Option<SlotEdit>,
}

impl ViewModelDiff {
    /// True if nothing on screen needs to change.
    pub fn is_empty(&self) -> bool {
        self.items.script.is_empty() && self.header.is_none() && self.overlay.is_none()
    }
}

/// Diffs two view models: the item sequences and the header and overlay slots.
pub fn diff_view_models(old: &ViewModel, new: &ViewModel) -> ViewModelDiff {
    ViewModelDiff {
        items: compute_edits(old.items(), new.items()),
        header: diff_slot(old.header(), new.header()),
        overlay: diff_slot(old.overlay(), new.overlay()),
    }
}

/// Diffs a single-slot model.
pub fn diff_slot(old: Option<&ItemModel>, new: Option<&ItemModel>) -> Option<SlotEdit> {
    match (old, new) {
        (None, None) => None,
        (Some(_), None) => Some(SlotEdit::Remove),
        (None, Some(new)) => Some(SlotEdit::Insert(new.clone())),
        (Some(old), Some(new)) if old == new => None,
        (Some(_), Some(new)) => Some(SlotEdit::Update(new.clone())),
    }
}

/// Computes the edits that turn `old` into `new`.
///
/// Pure and deterministic; runs in O(n log n).
pub fn compute_edits(old: &[ItemModel], new: &[ItemModel]) -> SequenceDiff {
    // first occurrence of each identity
    let mut old_index = HashMap::with_capacity(old.len());
    for (i, item) in old.iter().enumerate() {
        old_index.entry(item.id()).or_insert(i);
    }

    let mut duplicates = Vec::new();
    let mut seen = HashSet::with_capacity(new.len());
    let mut old_matched = vec![false; old.len()];
    // new index -> matched old index
    let mut matches = Vec::with_capacity(new.len());

    for (i, item) in new.iter().enumerate() {
        if !seen.insert(item.id()) {
            duplicates.push(Duplicate {
                id: item.id().clone(),
                index: i,
            });
            matches.push(None);
            continue;
        }
        let matched = old_index.get(item.id()).copied();
        if let Some(o) = matched {
            old_matched[o] = true;
        }
        matches.push(matched);
    }

    let mut edits = Vec::new();

    for (i, matched) in old_matched.iter().enumerate().rev() {
        if !matched {
            edits.push(Edit::Remove(i));
        }
    }

    // Survivors are ranked by their position among the matched items of the new sequence; after
    // the removals, `order` holds those ranks in their current on-screen order.
    let mut rank_of_old = vec![0; old.len()];
    let mut rank_count = 0;
    for o in matches.iter().flatten() {
        rank_of_old[*o] = rank_count;
        rank_count += 1;
    }
    let order: Vec<usize> = (0..old.len())
        .filter(|o| old_matched[*o])
        .map(|o| rank_of_old[o])
        .collect();

    // Items in the longest increasing run stay put. Every other item is moved, in rank order, to
    // sit directly after its predecessor, which leaves the survivors in new-sequence order.
    let stable = longest_increasing_run(&order);
    let layout = SlotLayout::new(&order, &stable);
    let mut occupied = Occupancy::new(layout.len);
    for rank in 0..rank_count {
        occupied.insert(layout.home[rank]);
    }
    for rank in 0..rank_count {
        if stable[rank] {
            continue;
        }
        let from = occupied.before(layout.home[rank]);
        occupied.remove(layout.home[rank]);
        let to = occupied.before(layout.target[rank]);
        occupied.insert(layout.target[rank]);
        if from != to {
            edits.push(Edit::Move(from, to));
        }
    }

    for (i, matched) in matches.iter().enumerate() {
        if matched.is_none() {
            edits.push(Edit::Insert(i, new[i].clone()));
        }
    }

    for (i, matched) in matches.iter().enumerate() {
        if let Some(o) = matched {
            if !old[*o].content_eq(&new[i]) {
                edits.push(Edit::Update(i, new[i].clone()));
            }
        }
    }

    SequenceDiff {
        script: EditScript::new(edits),
        duplicates,
    }
}

/// A fixed total order over every place a survivor can be during the move phase.
///
/// Each survivor has a home slot, where it sits before the moves. Every moved item also has a
/// target slot directly after its predecessor's final slot. Moved items only ever land right
/// after their predecessor, so runs of moved items following a stable item (or the front of the
/// list) are contiguous and the slot order stays consistent with the on-screen order throughout.
struct SlotLayout {
    home: Vec<usize>,
    target: Vec<usize>,
    len: usize,
}

impl SlotLayout {
    fn new(order: &[usize], stable: &[bool]) -> SlotLayout {
        let mut layout = SlotLayout {
            home: vec![0; order.len()],
            target: vec![0; order.len()],
            len: 0,
        };
        layout.place_run(0, stable);
        for rank in order {
            layout.home[*rank] = layout.len;
            layout.len += 1;
            if stable[*rank] {
                layout.target[*rank] = layout.home[*rank];
                layout.place_run(rank + 1, stable);
            }
        }
        layout
    }

    /// Gives consecutive target slots to the moved ranks starting at `rank`.
    fn place_run(&mut self, mut rank: usize, stable: &[bool]) {
        while rank < stable.len() && !stable[rank] {
            self.target[rank] = self.len;
            self.len += 1;
            rank += 1;
        }
    }
}

/// Which slots are occupied, as a Fenwick tree; turns a slot into an index in O(log n).
struct Occupancy {
    tree: Vec<usize>,
}

impl Occupancy {
    fn new(len: usize) -> Occupancy {
        Occupancy {
            tree: vec![0; len + 1],
        }
    }

    fn insert(&mut self, slot: usize) {
        let mut i = slot + 1;
        while i < self.tree.len() {
            self.tree[i] += 1;
            i += i & i.wrapping_neg();
        }
    }

    /// The slot must be occupied.
    fn remove(&mut self, slot: usize) {
        let mut i = slot + 1;
        while i < self.tree.len() {
            self.tree[i] -= 1;
            i += i & i.wrapping_neg();
        }
    }

    /// Number of occupied slots before `slot`.
    fn before(&self, slot: usize) -> usize {
        let mut i = slot;
        let mut count = 0;
        while i > 0 {
            count += self.tree[i];
            i -= i & i.wrapping_neg();
        }
        count
    }
}

/// Marks the members of one longest strictly increasing subsequence.
///
/// `seq` must be a permutation of `0..seq.len()`; the result is indexed by value.
fn longest_increasing_run(seq: &[usize]) -> Vec<bool> {
    let mut tails: Vec<usize> = Vec::new();
    let mut prev: Vec<Option<usize>> = vec![None; seq.len()];

    for (i, value) in seq.iter().enumerate() {
        let pos = tails.partition_point(|t| seq[*t] < *value);
        if pos > 0 {
            prev[i] = Some(tails[pos - 1]);
        }
        if pos == tails.len() {
            tails.push(i);
        } else {
            tails[pos] = i;
        }
    }

    let mut stable = vec![false; seq.len()];
    let mut cursor = tails.last().copied();
    while let Some(i) = cursor {
        stable[seq[i]] = true;
        cursor = prev[i];
    }
    stable
}
