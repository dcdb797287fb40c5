//! Image load coordination.
//!
//! Image requests are keyed by `(instance, slot)`; at most one is outstanding per key. Loaders run
//! wherever they like and reply through an [`ImageResponder`], which queues the result on a
//! channel. The screen drains that channel on its own sequence in [`ImageCoordinator::poll`], so
//! nothing an image loader does ever touches component state directly.

use crate::component::InstanceId;
use crate::error::ImageLoadError;
use crate::rect::Size;
use crate::view_model::{ImageDescriptor, ImageSlot, ItemId};
use core::any::Any;
use core::fmt;
use crossbeam::channel::{self, Receiver, Sender, TryRecvError};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, trace};

/// A loaded image. The pixel representation is up to the image loader.
#[derive(Debug, Clone)]
pub struct Image {
    pub size: Size,
    data: Arc<dyn Any + Send + Sync>,
}

impl Image {
    pub fn new<T: Any + Send + Sync>(size: Size, data: T) -> Image {
        Image {
            size,
            data: Arc::new(data),
        }
    }

    /// Returns the image data if it is of type `T`.
    pub fn data<T: Any>(&self) -> Option<&T> {
        self.data.downcast_ref::<T>()
    }
}

/// Identifies one image request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RequestToken(u64);

/// A request handed to an [`ImageLoader`].
#[derive(Debug, Clone)]
pub struct ImageRequest {
    pub token: RequestToken,
    pub descriptor: ImageDescriptor,
}

/// Fetches images.
pub trait ImageLoader: Send + Sync {
    /// Starts fetching an image. Must not block; reply through the responder, from any thread.
    fn fetch(&self, request: ImageRequest, responder: ImageResponder);

    /// Stops work on a request if possible. A reply for a cancelled request is dropped either way.
    fn cancel(&self, token: RequestToken) {
        let _ = token;
    }
}

type CancelSet = Arc<Mutex<HashSet<RequestToken>>>;

#[derive(Debug)]
struct ImageCompletion {
    token: RequestToken,
    result: Result<Image, ImageLoadError>,
}

/// Replies to exactly one image request.
///
/// Dropping a responder without replying delivers [`ImageLoadError::Abandoned`].
pub struct ImageResponder {
    token: RequestToken,
    sender: Option<Sender<ImageCompletion>>,
    cancelled: CancelSet,
}

impl ImageResponder {
    pub fn token(&self) -> RequestToken {
        self.token
    }

    /// Whether the request has been cancelled; loaders may use this to skip work.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.lock().contains(&self.token)
    }

    pub fn respond(mut self, result: Result<Image, ImageLoadError>) {
        self.send(result);
    }

    fn send(&mut self, result: Result<Image, ImageLoadError>) {
        if let Some(sender) = self.sender.take() {
            if self.cancelled.lock().remove(&self.token) {
                return;
            }
            // the screen may already be gone
            let _ = sender.send(ImageCompletion {
                token: self.token,
                result,
            });
        }
    }
}

impl Drop for ImageResponder {
    fn drop(&mut self) {
        self.send(Err(ImageLoadError::Abandoned));
    }
}

impl fmt::Debug for ImageResponder {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("ImageResponder")
            .field("token", &self.token)
            .field("responded", &self.sender.is_none())
            .finish()
    }
}

#[derive(Debug)]
struct PendingImage {
    token: RequestToken,
    item: ItemId,
    descriptor: ImageDescriptor,
}

/// An image result that arrived for a request that was still outstanding.
#[derive(Debug)]
pub struct ImageDelivery {
    pub instance: InstanceId,
    pub slot: ImageSlot,
    /// The item the instance was bound to when the request was issued.
    pub item: ItemId,
    pub result: Result<Image, ImageLoadError>,
}

/// Tracks outstanding image requests.
pub struct ImageCoordinator {
    loader: Arc<dyn ImageLoader>,
    pending: BTreeMap<(InstanceId, ImageSlot), PendingImage>,
    by_token: HashMap<RequestToken, (InstanceId, ImageSlot)>,
    cancelled: CancelSet,
    sender: Sender<ImageCompletion>,
    receiver: Receiver<ImageCompletion>,
    next_token: u64,
}

impl ImageCoordinator {
    pub fn new(loader: Arc<dyn ImageLoader>) -> ImageCoordinator {
        let (sender, receiver) = channel::unbounded();
        ImageCoordinator {
            loader,
            pending: BTreeMap::new(),
            by_token: HashMap::new(),
            cancelled: Arc::new(Mutex::new(HashSet::new())),
            sender,
            receiver,
            next_token: 0,
        }
    }

    /// Requests an image for an instance slot on behalf of the item the instance is bound to.
    ///
    /// Any other request for the slot is cancelled first. Returns false if an identical request
    /// is already outstanding, in which case it is left alone.
    pub fn request(
        &mut self,
        instance: InstanceId,
        slot: ImageSlot,
        item: &ItemId,
        descriptor: ImageDescriptor,
    ) -> bool {
        let key = (instance, slot);
        if let Some(pending) = self.pending.get(&key) {
            if pending.item == *item && pending.descriptor == descriptor {
                return false;
            }
            self.cancel(key.0, &key.1);
        }

        let token = RequestToken(self.next_token);
        self.next_token += 1;
        trace!(?token, ?instance, slot = ?key.1, source = %descriptor.source, "requesting image");

        self.by_token.insert(token, key.clone());
        self.pending.insert(
            key,
            PendingImage {
                token,
                item: item.clone(),
                descriptor: descriptor.clone(),
            },
        );

        let responder = ImageResponder {
            token,
            sender: Some(self.sender.clone()),
            cancelled: Arc::clone(&self.cancelled),
        };
        self.loader.fetch(ImageRequest { token, descriptor }, responder);
        true
    }

    /// Cancels the request for an instance slot, if any.
    pub fn cancel(&mut self, instance: InstanceId, slot: &ImageSlot) -> bool {
        match self.pending.remove(&(instance, slot.clone())) {
            Some(pending) => {
                self.forget(pending.token);
                debug!(token = ?pending.token, ?instance, ?slot, "cancelled image request");
                true
            }
            None => false,
        }
    }

    /// Cancels every request bound to an instance. Returns how many were cancelled.
    pub fn cancel_instance(&mut self, instance: InstanceId) -> usize {
        let keys: Vec<_> = self
            .pending
            .range((instance, ImageSlot::Main)..)
            .take_while(|((id, _), _)| *id == instance)
            .map(|(k, _)| k.clone())
            .collect();
        for (id, slot) in &keys {
            self.cancel(*id, slot);
        }
        keys.len()
    }

    /// Cancels everything. Returns how many requests were cancelled.
    pub fn cancel_all(&mut self) -> usize {
        let pending = std::mem::take(&mut self.pending);
        for pending in pending.values() {
            self.forget(pending.token);
        }
        if !pending.is_empty() {
            debug!(count = pending.len(), "cancelled all image requests");
        }
        pending.len()
    }

    fn forget(&mut self, token: RequestToken) {
        self.by_token.remove(&token);
        self.cancelled.lock().insert(token);
        self.loader.cancel(token);
    }

    pub fn is_pending(&self, instance: InstanceId, slot: &ImageSlot) -> bool {
        self.pending.contains_key(&(instance, slot.clone()))
    }

    /// Number of outstanding requests.
    pub fn outstanding(&self) -> usize {
        self.pending.len()
    }

    /// Slots with an outstanding request for an instance.
    pub fn pending_slots(&self, instance: InstanceId) -> Vec<ImageSlot> {
        self.pending
            .range((instance, ImageSlot::Main)..)
            .take_while(|((id, _), _)| *id == instance)
            .map(|((_, slot), _)| slot.clone())
            .collect()
    }

    /// Drains results that have arrived, dropping those of requests no longer outstanding.
    pub fn poll(&mut self) -> Vec<ImageDelivery> {
        let mut deliveries = Vec::new();
        loop {
            let completion = match self.receiver.try_recv() {
                Ok(completion) => completion,
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            };

            let key = match self.by_token.remove(&completion.token) {
                Some(key) => key,
                None => {
                    // cancelled after the loader had already replied
                    self.cancelled.lock().remove(&completion.token);
                    trace!(token = ?completion.token, "discarding stale image");
                    continue;
                }
            };
            let pending = match self.pending.remove(&key) {
                Some(pending) => pending,
                None => continue,
            };
            let (instance, slot) = key;
            deliveries.push(ImageDelivery {
                instance,
                slot,
                item: pending.item,
                result: completion.result,
            });
        }
        deliveries
    }
}

impl fmt::Debug for ImageCoordinator {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("ImageCoordinator")
            .field("pending", &self.pending)
            .field("next_token", &self.next_token)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rect::size;
    use crate::test_support::ManualImageLoader;

    fn setup() -> (Arc<ManualImageLoader>, ImageCoordinator) {
        let loader = Arc::new(ManualImageLoader::default());
        let coordinator = ImageCoordinator::new(loader.clone());
        (loader, coordinator)
    }

    fn image() -> Image {
        Image::new(size(10., 10.), "pixels")
    }

    #[test]
    fn test_delivers_outstanding_requests() {
        let (loader, mut images) = setup();
        let instance = InstanceId::new();
        images.request(instance, ImageSlot::Main, &"a".into(), ImageDescriptor::new("x"));
        assert_eq!(images.outstanding(), 1);

        loader.respond_all(|_| Ok(image()));
        let deliveries = images.poll();
        assert_eq!(deliveries.len(), 1);
        assert_eq!(deliveries[0].instance, instance);
        assert_eq!(deliveries[0].item, ItemId::from("a"));
        let delivered = deliveries[0].result.as_ref().unwrap();
        assert_eq!(delivered.data::<&str>(), Some(&"pixels"));
        assert_eq!(images.outstanding(), 0);
    }

    #[test]
    fn test_new_request_replaces_the_previous_one_for_the_slot() {
        let (loader, mut images) = setup();
        let instance = InstanceId::new();
        images.request(instance, ImageSlot::Main, &"a".into(), ImageDescriptor::new("x"));
        images.request(instance, ImageSlot::Main, &"a".into(), ImageDescriptor::new("y"));

        assert_eq!(images.outstanding(), 1);
        assert_eq!(loader.cancelled().len(), 1);

        loader.respond_all(|_| Ok(image()));
        let deliveries = images.poll();
        assert_eq!(deliveries.len(), 1, "the replaced request must not be delivered");
    }

    #[test]
    fn test_identical_request_is_kept() {
        let (loader, mut images) = setup();
        let instance = InstanceId::new();
        assert!(images.request(instance, ImageSlot::Main, &"a".into(), ImageDescriptor::new("x")));
        assert!(!images.request(instance, ImageSlot::Main, &"a".into(), ImageDescriptor::new("x")));
        assert_eq!(loader.fetched().len(), 1);
    }

    #[test]
    fn test_reply_after_cancel_is_dropped() {
        let (loader, mut images) = setup();
        let instance = InstanceId::new();
        images.request(instance, ImageSlot::Main, &"a".into(), ImageDescriptor::new("x"));
        images.request(
            instance,
            ImageSlot::Background,
            &"a".into(),
            ImageDescriptor::new("y"),
        );
        assert_eq!(images.pending_slots(instance).len(), 2);
        assert_eq!(images.cancel_instance(instance), 2);

        loader.respond_all(|_| Ok(image()));
        assert!(images.poll().is_empty());
    }

    #[test]
    fn test_reply_already_queued_when_cancelled_is_dropped() {
        let (loader, mut images) = setup();
        let instance = InstanceId::new();
        images.request(instance, ImageSlot::Main, &"a".into(), ImageDescriptor::new("x"));
        loader.respond_all(|_| Ok(image()));
        assert!(images.cancel(instance, &ImageSlot::Main));
        assert!(images.poll().is_empty());
    }

    #[test]
    fn test_dropped_responder_reports_abandoned() {
        let (loader, mut images) = setup();
        images.request(
            InstanceId::new(),
            ImageSlot::Main,
            &"a".into(),
            ImageDescriptor::new("x"),
        );
        loader.drop_all();
        let deliveries = images.poll();
        assert!(matches!(
            deliveries[0].result,
            Err(ImageLoadError::Abandoned)
        ));
    }

    #[test]
    fn test_cancel_all() {
        let (loader, mut images) = setup();
        for _ in 0..3 {
            images.request(
                InstanceId::new(),
                ImageSlot::Main,
                &"a".into(),
                ImageDescriptor::new("x"),
            );
        }
        assert_eq!(images.cancel_all(), 3);
        assert_eq!(images.outstanding(), 0);
        assert_eq!(loader.cancelled().len(), 3);
        loader.respond_all(|_| Ok(image()));
        assert!(images.poll().is_empty());
    }
}
