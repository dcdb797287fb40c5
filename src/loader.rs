//! View model loading.
//!
//! Loads are tagged with a monotonically increasing [`LoadSeq`]. The newest load that completes
//! wins: once a load has been applied, every older load still in flight is superseded and its
//! result is dropped when it arrives.

use crate::error::LoadError;
use crate::view_model::ViewModel;
use core::fmt;
use crossbeam::channel::Sender;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Sequence number of a load request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LoadSeq(pub(crate) u64);

/// Why a view model is being loaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LoadKind {
    Initial,
    Refresh,
    Paginate,
}

impl LoadKind {
    pub fn name(self) -> &'static str {
        match self {
            LoadKind::Initial => "initial",
            LoadKind::Refresh => "refresh",
            LoadKind::Paginate => "paginate",
        }
    }
}

/// Produces view models.
pub trait ViewModelLoader: Send + Sync {
    /// Loads the first page of content. Also used for reloads.
    fn load_initial(&self, responder: LoadResponder);

    /// Loads the tree that follows `from`, with more trailing content.
    fn load_next(&self, from: Arc<ViewModel>, responder: LoadResponder);

    /// Stops work on a load if possible. The result of a cancelled load is dropped either way.
    fn cancel(&self, seq: LoadSeq) {
        let _ = seq;
    }
}

#[derive(Debug)]
pub(crate) struct LoadCompletion {
    pub(crate) seq: LoadSeq,
    pub(crate) kind: LoadKind,
    pub(crate) result: Result<ViewModel, LoadError>,
}

/// Replies to exactly one load request, from any thread.
///
/// Dropping a responder without replying delivers [`LoadError::Abandoned`].
pub struct LoadResponder {
    seq: LoadSeq,
    kind: LoadKind,
    sender: Option<Sender<LoadCompletion>>,
}

impl LoadResponder {
    pub(crate) fn new(seq: LoadSeq, kind: LoadKind, sender: Sender<LoadCompletion>) -> Self {
        LoadResponder {
            seq,
            kind,
            sender: Some(sender),
        }
    }

    pub fn seq(&self) -> LoadSeq {
        self.seq
    }

    pub fn kind(&self) -> LoadKind {
        self.kind
    }

    pub fn respond(mut self, result: Result<ViewModel, LoadError>) {
        self.send(result);
    }

    fn send(&mut self, result: Result<ViewModel, LoadError>) {
        if let Some(sender) = self.sender.take() {
            // the screen may already be gone
            let _ = sender.send(LoadCompletion {
                seq: self.seq,
                kind: self.kind,
                result,
            });
        }
    }
}

impl Drop for LoadResponder {
    fn drop(&mut self) {
        self.send(Err(LoadError::Abandoned));
    }
}

impl fmt::Debug for LoadResponder {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("LoadResponder")
            .field("seq", &self.seq)
            .field("kind", &self.kind)
            .field("responded", &self.sender.is_none())
            .finish()
    }
}

/// What to do with a load that has completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Verdict {
    /// Newer than anything applied so far.
    Current,
    /// Not outstanding: superseded, cancelled, or never issued.
    Stale,
}

/// Bookkeeping for outstanding loads.
#[derive(Debug, Default)]
pub(crate) struct LoadSequencer {
    next: u64,
    outstanding: BTreeMap<LoadSeq, LoadKind>,
    latest_applied: Option<LoadSeq>,
}

impl LoadSequencer {
    pub(crate) fn issue(&mut self, kind: LoadKind) -> LoadSeq {
        let seq = LoadSeq(self.next);
        self.next += 1;
        self.outstanding.insert(seq, kind);
        seq
    }

    /// Marks a load as completed.
    pub(crate) fn complete(&mut self, seq: LoadSeq) -> Verdict {
        if self.outstanding.remove(&seq).is_none() {
            return Verdict::Stale;
        }
        match self.latest_applied {
            Some(applied) if applied >= seq => Verdict::Stale,
            _ => Verdict::Current,
        }
    }

    /// Records that a load's result is now on screen.
    ///
    /// Returns the older loads still in flight; they are superseded and forgotten.
    pub(crate) fn commit(&mut self, seq: LoadSeq) -> Vec<LoadSeq> {
        self.latest_applied = Some(seq);
        let newer = self.outstanding.split_off(&seq);
        let superseded = std::mem::replace(&mut self.outstanding, newer);
        superseded.into_keys().collect()
    }

    /// The kind of the newest load in flight.
    pub(crate) fn loading(&self) -> Option<LoadKind> {
        self.outstanding.values().next_back().copied()
    }

    pub(crate) fn is_outstanding(&self, kind: LoadKind) -> bool {
        self.outstanding.values().any(|k| *k == kind)
    }

    /// Forgets every load in flight and returns them.
    pub(crate) fn cancel_all(&mut self) -> Vec<LoadSeq> {
        std::mem::take(&mut self.outstanding).into_keys().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam::channel;

    #[test]
    fn test_later_load_completing_first_supersedes_the_earlier_one() {
        let mut loads = LoadSequencer::default();
        let a = loads.issue(LoadKind::Refresh);
        let b = loads.issue(LoadKind::Refresh);
        assert_eq!(loads.loading(), Some(LoadKind::Refresh));

        assert_eq!(loads.complete(b), Verdict::Current);
        assert_eq!(loads.commit(b), [a]);
        assert_eq!(loads.complete(a), Verdict::Stale);
        assert_eq!(loads.loading(), None);
    }

    #[test]
    fn test_in_order_completions_both_apply() {
        let mut loads = LoadSequencer::default();
        let a = loads.issue(LoadKind::Initial);
        let b = loads.issue(LoadKind::Refresh);

        assert_eq!(loads.complete(a), Verdict::Current);
        assert!(loads.commit(a).is_empty());
        assert_eq!(loads.loading(), Some(LoadKind::Refresh));
        assert_eq!(loads.complete(b), Verdict::Current);
        assert!(loads.commit(b).is_empty());
    }

    #[test]
    fn test_cancelled_loads_are_stale() {
        let mut loads = LoadSequencer::default();
        let a = loads.issue(LoadKind::Paginate);
        assert!(loads.is_outstanding(LoadKind::Paginate));
        assert_eq!(loads.cancel_all(), [a]);
        assert!(!loads.is_outstanding(LoadKind::Paginate));
        assert_eq!(loads.complete(a), Verdict::Stale);
    }

    #[test]
    fn test_responder_replies_once() {
        let (sender, receiver) = channel::unbounded();
        let responder = LoadResponder::new(LoadSeq(4), LoadKind::Initial, sender);
        assert_eq!(responder.seq(), LoadSeq(4));
        responder.respond(Ok(ViewModel::empty()));

        let completion = receiver.try_recv().unwrap();
        assert_eq!(completion.seq, LoadSeq(4));
        assert!(completion.result.is_ok());
        assert!(receiver.try_recv().is_err(), "drop must not send a second reply");
    }

    #[test]
    fn test_dropped_responder_reports_abandoned() {
        let (sender, receiver) = channel::unbounded();
        drop(LoadResponder::new(LoadSeq(0), LoadKind::Paginate, sender));
        let completion = receiver.try_recv().unwrap();
        assert_eq!(completion.kind, LoadKind::Paginate);
        assert_eq!(completion.result, Err(LoadError::Abandoned));
    }
}
