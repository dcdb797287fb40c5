//! Fakes shared by the unit tests.

use crate::component::{Component, ComponentFactory, ComponentRegistry, Context};
use crate::container::{Container, Patch, Row};
use crate::error::{ImageLoadError, LoadError};
use crate::image::{Image, ImageLoader, ImageRequest, ImageResponder, RequestToken};
use crate::loader::{LoadKind, LoadResponder, LoadSeq, ViewModelLoader};
use crate::rect::{size, Size};
use crate::view_model::{ImageSlot, ItemId, ItemModel, ViewModel};
use core::any::Any;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

pub fn image() -> Image {
    Image::new(size(8., 8.), "pixels")
}

/// A component that records what happened to it.
#[derive(Debug, Default)]
pub struct Probe {
    pub bound: Option<ItemId>,
    pub binds: usize,
    pub updates: usize,
    pub reuses: usize,
    pub selected: usize,
    /// Images received, with the item bound at the time.
    pub loaded: Vec<(Option<ItemId>, ImageSlot)>,
    pub failed: Vec<ImageSlot>,
    destroyed: Arc<AtomicUsize>,
    delivered: Arc<AtomicUsize>,
}

impl Component for Probe {
    fn as_any(&self) -> &dyn Any {
        self
    }
    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
    fn bind(&mut self, item: &ItemModel, _: &Context) {
        self.bound = Some(item.id().clone());
        self.binds += 1;
    }
    fn update(&mut self, item: &ItemModel, _: &Context) {
        self.bound = Some(item.id().clone());
        self.updates += 1;
    }
    fn prepare_for_reuse(&mut self) {
        self.reuses += 1;
        self.loaded.clear();
        self.failed.clear();
    }
    fn will_disappear(&mut self) {
        self.destroyed.fetch_add(1, Ordering::SeqCst);
    }
    fn did_select(&mut self) {
        self.selected += 1;
    }
    fn image_loaded(&mut self, slot: &ImageSlot, _: &Image) {
        self.delivered.fetch_add(1, Ordering::SeqCst);
        self.loaded.push((self.bound.clone(), slot.clone()));
    }
    fn image_failed(&mut self, slot: &ImageSlot, _: &ImageLoadError) {
        self.failed.push(slot.clone());
    }
}

pub fn probe(component: &dyn Component) -> &Probe {
    component.as_any().downcast_ref::<Probe>().unwrap()
}

/// Makes probes. Items are 44 points tall unless their payload is an `f64` height.
#[derive(Debug, Default)]
pub struct ProbeFactory {
    created: AtomicUsize,
    measured: AtomicUsize,
    destroyed: Arc<AtomicUsize>,
    delivered: Arc<AtomicUsize>,
}

impl ProbeFactory {
    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }
    pub fn measured(&self) -> usize {
        self.measured.load(Ordering::SeqCst)
    }
    pub fn destroyed(&self) -> usize {
        self.destroyed.load(Ordering::SeqCst)
    }
    /// Images delivered to any probe.
    pub fn delivered(&self) -> usize {
        self.delivered.load(Ordering::SeqCst)
    }
}

impl ComponentFactory for ProbeFactory {
    fn create_instance(&self) -> Box<dyn Component> {
        self.created.fetch_add(1, Ordering::SeqCst);
        Box::new(Probe {
            destroyed: Arc::clone(&self.destroyed),
            delivered: Arc::clone(&self.delivered),
            ..Probe::default()
        })
    }
    fn preferred_size(&self, item: &ItemModel, width: f64) -> Size {
        self.measured.fetch_add(1, Ordering::SeqCst);
        size(width, item.payload_as::<f64>().copied().unwrap_or(44.))
    }
}

/// A registry with the categories `row` and `card`, both backed by the same probe factory.
pub fn registry() -> (Arc<ComponentRegistry>, Arc<ProbeFactory>) {
    let factory = Arc::new(ProbeFactory::default());
    let mut registry = ComponentRegistry::new();
    registry.register("row", factory.clone());
    registry.register("card", factory.clone());
    (Arc::new(registry), factory)
}

/// An image loader that holds on to responders until told to reply.
#[derive(Debug, Default)]
pub struct ManualImageLoader {
    in_flight: Mutex<Vec<(ImageRequest, ImageResponder)>>,
    fetched: Mutex<Vec<ImageRequest>>,
    cancelled: Mutex<Vec<RequestToken>>,
}

impl ManualImageLoader {
    pub fn respond_all(&self, mut f: impl FnMut(&ImageRequest) -> Result<Image, ImageLoadError>) {
        let in_flight = std::mem::take(&mut *self.in_flight.lock());
        for (request, responder) in in_flight {
            responder.respond(f(&request));
        }
    }

    pub fn drop_all(&self) {
        self.in_flight.lock().clear();
    }

    pub fn take_oldest(&self) -> Option<(ImageRequest, ImageResponder)> {
        let mut in_flight = self.in_flight.lock();
        if in_flight.is_empty() {
            None
        } else {
            Some(in_flight.remove(0))
        }
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.lock().len()
    }

    pub fn fetched(&self) -> Vec<ImageRequest> {
        self.fetched.lock().clone()
    }

    pub fn cancelled(&self) -> Vec<RequestToken> {
        self.cancelled.lock().clone()
    }
}

impl ImageLoader for ManualImageLoader {
    fn fetch(&self, request: ImageRequest, responder: ImageResponder) {
        self.fetched.lock().push(request.clone());
        self.in_flight.lock().push((request, responder));
    }

    fn cancel(&self, token: RequestToken) {
        self.cancelled.lock().push(token);
    }
}

/// A view model loader that holds on to responders until told to reply.
#[derive(Debug, Default)]
pub struct ManualLoader {
    in_flight: Mutex<Vec<(LoadKind, Option<Arc<ViewModel>>, LoadResponder)>>,
    cancelled: Mutex<Vec<LoadSeq>>,
}

impl ManualLoader {
    /// Sequence numbers and kinds of the loads in flight, oldest first.
    pub fn pending(&self) -> Vec<(LoadSeq, LoadKind)> {
        self.in_flight
            .lock()
            .iter()
            .map(|(kind, _, responder)| (responder.seq(), *kind))
            .collect()
    }

    /// The tree a pagination load was asked to extend.
    pub fn paginating_from(&self, seq: LoadSeq) -> Option<Arc<ViewModel>> {
        self.in_flight
            .lock()
            .iter()
            .find(|(_, _, responder)| responder.seq() == seq)
            .and_then(|(_, from, _)| from.clone())
    }

    /// Replies to one load. Returns false if it is not in flight.
    pub fn respond(&self, seq: LoadSeq, result: Result<ViewModel, LoadError>) -> bool {
        let responder = {
            let mut in_flight = self.in_flight.lock();
            match in_flight.iter().position(|(_, _, r)| r.seq() == seq) {
                Some(index) => in_flight.remove(index).2,
                None => return false,
            }
        };
        responder.respond(result);
        true
    }

    /// Replies to the newest load in flight.
    pub fn respond_latest(&self, result: Result<ViewModel, LoadError>) -> bool {
        let responder = self.in_flight.lock().pop();
        match responder {
            Some((_, _, responder)) => {
                responder.respond(result);
                true
            }
            None => false,
        }
    }

    pub fn cancelled(&self) -> Vec<LoadSeq> {
        self.cancelled.lock().clone()
    }
}

impl ViewModelLoader for ManualLoader {
    fn load_initial(&self, responder: LoadResponder) {
        self.in_flight.lock().push((responder.kind(), None, responder));
    }

    fn load_next(&self, from: Arc<ViewModel>, responder: LoadResponder) {
        self.in_flight
            .lock()
            .push((responder.kind(), Some(from), responder));
    }

    fn cancel(&self, seq: LoadSeq) {
        self.cancelled.lock().push(seq);
    }
}

/// A container that keeps a mirror of its rows.
#[derive(Debug, Default)]
pub struct RecordingContainer {
    pub rows: Vec<Row>,
    pub header: Option<Row>,
    pub overlay: Option<Row>,
    /// Completed transactions.
    pub transactions: usize,
    pub log: Vec<Patch>,
    open: bool,
}

impl RecordingContainer {
    pub fn ids(&self) -> Vec<&str> {
        self.rows.iter().map(|row| row.item.as_str()).collect()
    }
}

impl Container for RecordingContainer {
    fn begin_updates(&mut self) {
        assert!(!self.open, "nested transaction");
        self.open = true;
    }

    fn end_updates(&mut self) {
        assert!(self.open, "no transaction to end");
        self.open = false;
        self.transactions += 1;
    }

    fn insert(&mut self, index: usize, row: Row) {
        self.log.push(Patch::Insert(index, row.clone()));
        self.rows.insert(index, row);
    }

    fn remove(&mut self, index: usize) {
        self.log.push(Patch::Remove(index));
        self.rows.remove(index);
    }

    fn move_row(&mut self, from: usize, to: usize) {
        self.log.push(Patch::Move(from, to));
        let row = self.rows.remove(from);
        self.rows.insert(to, row);
    }

    fn update(&mut self, index: usize, row: Row) {
        self.log.push(Patch::Update(index, row.clone()));
        self.rows[index] = row;
    }

    fn set_header(&mut self, row: Option<Row>) {
        self.log.push(Patch::Header(row.clone()));
        self.header = row;
    }

    fn set_overlay(&mut self, row: Option<Row>) {
        self.log.push(Patch::Overlay(row.clone()));
        self.overlay = row;
    }
}
