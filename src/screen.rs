//! The screen: sequences loading, diffing and applying.
//!
//! A [`Screen`] owns the committed view model, the lifecycle manager, the image coordinator and
//! the viewport. Everything runs on the caller's sequence: loaders and image loaders reply through
//! channels, and the host calls [`Screen::poll`] to fold their results in.
//!
//! ```text
//! Idle ─attach─▶ Loading(initial) ─▶ Ready ⇄ Loading(refresh | paginate)
//!   ▲                  │ (failed)      │
//!   └──────────────────┘               └─detach─▶ TornDown
//! ```
//!
//! Loads may overlap. Each one gets a sequence number; when a load is committed, every older load
//! still in flight is cancelled and its result is dropped on arrival, so the newest result always
//! wins.

use crate::component::{Context, Registry};
use crate::config::ScreenConfig;
use crate::container::Container;
use crate::diff::diff_view_models;
use crate::error::{InvariantViolation, ItemError, LoadError, ScreenError};
use crate::image::{ImageCoordinator, ImageLoader};
use crate::lifecycle::Lifecycle;
use crate::loader::{
    LoadCompletion, LoadKind, LoadResponder, LoadSeq, LoadSequencer, Verdict, ViewModelLoader,
};
use crate::view_model::{ItemId, ViewModel};
use crate::viewport::Viewport;
use crossbeam::channel::{self, Receiver, Sender, TryRecvError};
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// Where a screen is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScreenState {
    /// Not attached yet, or the initial load failed.
    Idle,
    /// A load is in flight; the kind is that of the newest one.
    Loading(LoadKind),
    /// Content is on screen and nothing is loading.
    Ready,
    /// Detached. Terminal.
    TornDown,
}

impl ScreenState {
    pub fn name(self) -> &'static str {
        match self {
            ScreenState::Idle => "idle",
            ScreenState::Loading(_) => "loading",
            ScreenState::Ready => "ready",
            ScreenState::TornDown => "torn down",
        }
    }
}

/// Notifications for the host.
#[derive(Debug, Clone, PartialEq)]
pub enum ScreenEvent {
    /// A view model was committed and is on screen.
    Committed {
        seq: LoadSeq,
        kind: LoadKind,
        items: usize,
    },
    /// Per-item errors of the last committed cycle.
    ItemErrors(Vec<ItemError>),
    /// A load failed; the committed view model is unchanged. Retry with `reload`.
    LoadFailed { kind: LoadKind, error: LoadError },
    /// A loaded view model could not be applied; the committed view model is unchanged.
    CycleAborted {
        seq: LoadSeq,
        error: InvariantViolation,
    },
    ItemSelected {
        id: ItemId,
        index: usize,
        target: Option<Arc<str>>,
    },
    /// More content was requested because the viewport neared the end.
    PaginationRequested { seq: LoadSeq },
}

/// A scrollable, component-based screen.
pub struct Screen<C: Container> {
    state: ScreenState,
    attached: bool,
    has_committed: bool,
    loader: Arc<dyn ViewModelLoader>,
    loads: LoadSequencer,
    load_sender: Sender<LoadCompletion>,
    load_receiver: Receiver<LoadCompletion>,
    committed: Arc<ViewModel>,
    lifecycle: Lifecycle,
    images: ImageCoordinator,
    viewport: Viewport,
    container: C,
    events: VecDeque<ScreenEvent>,
}

impl<C: Container> Screen<C> {
    /// Creates a new screen. Nothing is loaded until it is attached to a surface.
    pub fn new(
        loader: Arc<dyn ViewModelLoader>,
        image_loader: Arc<dyn ImageLoader>,
        registry: Arc<dyn Registry>,
        container: C,
        config: ScreenConfig,
    ) -> Screen<C> {
        let (load_sender, load_receiver) = channel::unbounded();
        let context = Context::new("", config.initial_width);

        Screen {
            state: ScreenState::Idle,
            attached: false,
            has_committed: false,
            loader,
            loads: LoadSequencer::default(),
            load_sender,
            load_receiver,
            committed: Arc::new(ViewModel::empty()),
            lifecycle: Lifecycle::new(registry, context, &config),
            images: ImageCoordinator::new(image_loader),
            viewport: Viewport::new(&config),
            container,
            events: VecDeque::new(),
        }
    }

    pub fn state(&self) -> ScreenState {
        self.state
    }

    pub fn is_attached(&self) -> bool {
        self.attached
    }

    /// The view model on screen. Empty until the first load is committed.
    pub fn committed(&self) -> &Arc<ViewModel> {
        &self.committed
    }

    pub fn lifecycle(&self) -> &Lifecycle {
        &self.lifecycle
    }

    pub fn images(&self) -> &ImageCoordinator {
        &self.images
    }

    pub fn viewport(&self) -> &Viewport {
        &self.viewport
    }

    pub fn container(&self) -> &C {
        &self.container
    }

    pub fn container_mut(&mut self) -> &mut C {
        &mut self.container
    }

    /// Returns an iterator over queued events.
    ///
    /// Does not drain the queue immediately.
    /// Calling `next` will always remove an event from the queue.
    pub fn events(&mut self) -> impl Iterator<Item = ScreenEvent> + '_ {
        struct EventIterator<'a, C: Container>(&'a mut Screen<C>);
        impl<'a, C: Container> Iterator for EventIterator<'a, C> {
            type Item = ScreenEvent;
            fn next(&mut self) -> Option<ScreenEvent> {
                self.0.events.pop_front()
            }
        }

        EventIterator(self)
    }

    fn transition(&mut self, state: ScreenState) {
        if self.state != state {
            debug!(from = ?self.state, to = ?state, "screen state changed");
            self.state = state;
        }
    }

    /// The state implied by the loads in flight.
    fn settled_state(&self) -> ScreenState {
        if self.state == ScreenState::TornDown {
            return ScreenState::TornDown;
        }
        match self.loads.loading() {
            Some(kind) => ScreenState::Loading(kind),
            None if self.has_committed => ScreenState::Ready,
            None => ScreenState::Idle,
        }
    }

    fn invalid(&self, operation: &'static str) -> ScreenError {
        ScreenError::InvalidState {
            operation,
            state: self.state.name(),
        }
    }

    /// Attaches the screen to its surface and starts the initial load.
    ///
    /// Only valid once, in `Idle`.
    pub fn attach_to_surface(&mut self) -> Result<LoadSeq, ScreenError> {
        if self.state == ScreenState::TornDown {
            return Err(self.invalid("attach_to_surface"));
        }
        if self.attached {
            return Err(ScreenError::InvalidState {
                operation: "attach_to_surface",
                state: "attached",
            });
        }
        self.attached = true;
        Ok(self.start_load(LoadKind::Initial))
    }

    /// Tears the screen down: cancels every load and image request and destroys every instance.
    ///
    /// Terminal and idempotent.
    pub fn detach_from_surface(&mut self) {
        if self.state == ScreenState::TornDown {
            return;
        }
        for seq in self.loads.cancel_all() {
            self.loader.cancel(seq);
        }
        let destroyed = self.lifecycle.teardown(&mut self.images);
        self.committed = Arc::new(ViewModel::empty());
        self.attached = false;
        self.transition(ScreenState::TornDown);
        debug!(destroyed, "screen torn down");
    }

    /// Loads the content again.
    ///
    /// Valid while `Ready` or `Loading` (the newer load wins), and in `Idle` after a failed
    /// initial load, which is then retried.
    pub fn reload(&mut self) -> Result<LoadSeq, ScreenError> {
        match self.state {
            ScreenState::TornDown => Err(self.invalid("reload")),
            ScreenState::Idle if !self.attached => Err(ScreenError::NotAttached),
            _ if self.has_committed => Ok(self.start_load(LoadKind::Refresh)),
            _ => Ok(self.start_load(LoadKind::Initial)),
        }
    }

    /// Scrolls an item to the top of the viewport. Returns the new scroll offset.
    pub fn scroll_to_item(&mut self, id: &ItemId) -> Result<f64, ScreenError> {
        if self.state == ScreenState::TornDown {
            return Err(self.invalid("scroll_to_item"));
        }
        let index = self
            .lifecycle
            .index_of(id)
            .ok_or_else(|| ScreenError::UnknownItem(id.clone()))?;
        let offset = self
            .viewport
            .scroll_to(index)
            .ok_or_else(|| ScreenError::UnknownItem(id.clone()))?;
        self.settle();
        Ok(offset)
    }

    /// Selects an item: notifies its component, if live, and queues
    /// [`ScreenEvent::ItemSelected`].
    pub fn select_item(&mut self, id: &ItemId) -> Result<(), ScreenError> {
        if self.state == ScreenState::TornDown {
            return Err(self.invalid("select_item"));
        }
        let index = self
            .committed
            .index_of(id)
            .ok_or_else(|| ScreenError::UnknownItem(id.clone()))?;
        self.lifecycle.select(index);

        let target = self.committed.items()[index].target().map(Arc::from);
        self.events.push_back(ScreenEvent::ItemSelected {
            id: id.clone(),
            index,
            target,
        });
        Ok(())
    }

    /// The host scrolled.
    pub fn on_scroll(&mut self, offset: f64) {
        if self.state == ScreenState::TornDown {
            return;
        }
        self.viewport.on_scroll(offset);
        self.settle();
    }

    /// The container changed width. Sizes are measured again and the first visible row stays
    /// in place.
    pub fn on_container_resize(&mut self, width: f64) {
        if self.state == ScreenState::TornDown || !self.viewport.on_container_resize(width) {
            return;
        }
        let anchor = self.viewport.anchor();
        self.lifecycle.set_container_width(width);
        self.viewport.set_heights(&self.lifecycle.heights());
        if let Some(anchor) = anchor {
            self.viewport.restore(anchor.index, anchor.delta);
        }
        self.settle();
    }

    /// The viewport changed height.
    pub fn set_viewport_height(&mut self, height: f64) {
        if self.state == ScreenState::TornDown {
            return;
        }
        self.viewport.set_viewport_height(height);
        self.settle();
    }

    /// Folds in every load and image result that has arrived.
    pub fn poll(&mut self) {
        loop {
            match self.load_receiver.try_recv() {
                Ok(completion) => self.complete_load(completion),
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }

        let deliveries = self.images.poll();
        if self.state == ScreenState::TornDown {
            return;
        }
        for delivery in deliveries {
            self.lifecycle.deliver_image(delivery);
        }
    }

    fn start_load(&mut self, kind: LoadKind) -> LoadSeq {
        let seq = self.loads.issue(kind);
        let responder = LoadResponder::new(seq, kind, self.load_sender.clone());
        debug!(?seq, kind = kind.name(), "starting load");
        match kind {
            LoadKind::Paginate => self.loader.load_next(Arc::clone(&self.committed), responder),
            LoadKind::Initial | LoadKind::Refresh => self.loader.load_initial(responder),
        }
        self.transition(self.settled_state());
        seq
    }

    fn complete_load(&mut self, completion: LoadCompletion) {
        let LoadCompletion { seq, kind, result } = completion;
        if self.state == ScreenState::TornDown {
            trace!(?seq, "dropping load completed after teardown");
            return;
        }

        match self.loads.complete(seq) {
            Verdict::Stale => {
                debug!(?seq, kind = kind.name(), "dropping superseded load");
            }
            Verdict::Current => match result {
                Ok(view_model) => self.commit(seq, kind, view_model),
                Err(error) => {
                    warn!(?seq, kind = kind.name(), %error, "load failed");
                    self.events.push_back(ScreenEvent::LoadFailed { kind, error });
                }
            },
        }

        // a failed page is asked for again on the next scroll, not right away
        if !self.loads.is_outstanding(LoadKind::Paginate) {
            self.viewport.pagination_finished();
        }
        self.transition(self.settled_state());
    }

    /// Diffs a loaded view model against the committed one and applies it.
    fn commit(&mut self, seq: LoadSeq, kind: LoadKind, view_model: ViewModel) {
        let view_model = Arc::new(view_model);
        let diff = diff_view_models(&self.committed, &view_model);

        let anchor = self.viewport.anchor().and_then(|anchor| {
            let id = self.lifecycle.items().nth(anchor.index)?.id().clone();
            Some((id, anchor.delta))
        });

        let previous_screen = self.lifecycle.context().screen().to_string();
        self.lifecycle.set_screen(view_model.id());
        let expected = view_model.items().len();
        let report = match self.lifecycle.apply_edits(&diff, expected, &mut self.images) {
            Ok(report) => report,
            Err(error) => {
                warn!(?seq, %error, "aborting diff-apply cycle");
                self.lifecycle.set_screen(&previous_screen);
                self.lifecycle.discard_patches();
                self.events.push_back(ScreenEvent::CycleAborted { seq, error });
                return;
            }
        };

        self.committed = view_model;
        self.has_committed = true;
        for superseded in self.loads.commit(seq) {
            debug!(?superseded, "cancelling superseded load");
            self.loader.cancel(superseded);
        }

        self.viewport.set_heights(&self.lifecycle.heights());
        if let Some((id, delta)) = anchor {
            if let Some(index) = self.lifecycle.index_of(&id) {
                self.viewport.restore(index, delta);
            }
        }

        debug!(?seq, kind = kind.name(), items = self.committed.items().len(), "committed view model");
        self.events.push_back(ScreenEvent::Committed {
            seq,
            kind,
            items: self.committed.items().len(),
        });
        if !report.errors.is_empty() {
            self.events.push_back(ScreenEvent::ItemErrors(report.errors));
        }
        self.settle();
    }

    /// Brings instances in line with the viewport, flushes the container and requests more
    /// content if needed.
    fn settle(&mut self) {
        self.lifecycle
            .set_live_window(self.viewport.render_range(), &mut self.images);
        self.lifecycle.flush(&mut self.container);

        if !self.loads.is_outstanding(LoadKind::Paginate) {
            self.viewport.pagination_finished();
        }
        if self.has_committed
            && self.state != ScreenState::TornDown
            && self.viewport.check_pagination(self.committed.has_more())
        {
            let seq = self.start_load(LoadKind::Paginate);
            self.events.push_back(ScreenEvent::PaginationRequested { seq });
        }
    }
}

impl<C: Container> Drop for Screen<C> {
    fn drop(&mut self) {
        self.detach_from_surface();
    }
}
