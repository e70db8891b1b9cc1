use crate::event::Event;
use crate::queue;
use futures::stream::BoxStream;
use futures::StreamExt;
use std::any::TypeId;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use tokio::task::AbortHandle;

/// Where a running subscription delivers its events. Returns `false` once
/// the program has stopped listening.
pub(crate) type Sink<M> = Arc<dyn Fn(Event<M>) -> bool + Send + Sync>;

/// A long-lived event source managed by the runtime.
///
/// Subscriptions are declared in [`Model::subscriptions`](crate::Model::subscriptions) and automatically
/// started or stopped through diffing: the runtime compares the set of
/// subscriptions returned on each update cycle and starts any new ones while
/// stopping any that are no longer present.
pub struct Subscription<M: Send + 'static> {
    pub(crate) id: SubscriptionId,
    pub(crate) spawn: Box<dyn FnOnce(Sink<M>) -> AbortHandle + Send>,
}

/// Identity for diffing subscriptions between update cycles.
///
/// Each subscription carries a `SubscriptionId` composed of a Rust [`TypeId`]
/// and an optional numeric discriminant. The runtime uses this to determine
/// which subscriptions are new, unchanged, or removed when reconciling.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct SubscriptionId {
    type_id: TypeId,
    discriminant: u64,
}

impl SubscriptionId {
    /// Create an ID from a type and a numeric discriminant.
    pub fn new<T: 'static>(discriminant: u64) -> Self {
        Self {
            type_id: TypeId::of::<T>(),
            discriminant,
        }
    }

    /// Create an ID from a type alone (for singletons).
    pub fn of<T: 'static>() -> Self {
        Self::new::<T>(0)
    }

    /// Create an ID from a type and a string discriminant.
    pub fn with_str<T: 'static>(s: &str) -> Self {
        let mut hasher = std::hash::DefaultHasher::new();
        s.hash(&mut hasher);
        Self::new::<T>(hasher.finish())
    }
}

/// Trait for types that produce a stream of values.
///
/// Implement this to create custom subscription sources. The runtime will call
/// [`stream`](SubscriptionSource::stream) once when the subscription is first
/// started, and will drop the stream when the subscription is removed.
pub trait SubscriptionSource: Send + 'static {
    /// The type of values this source emits.
    type Output: Send + 'static;

    /// Unique ID for this subscription instance.
    fn id(&self) -> SubscriptionId;

    /// Create the stream of values.
    fn stream(self) -> BoxStream<'static, Self::Output>;
}

/// Create a [`Subscription`] from a [`SubscriptionSource`]. Every value the
/// source emits arrives as [`Event::App`].
pub fn subscribe<S>(source: S) -> Subscription<S::Output>
where
    S: SubscriptionSource,
{
    let id = source.id();
    Subscription::from_events(id, source.stream().map(Event::App).boxed())
}

impl<M: Send + 'static> Subscription<M> {
    /// Create from a raw stream of messages and an id.
    pub fn from_stream(id: SubscriptionId, stream: BoxStream<'static, M>) -> Self {
        Self::from_events(id, stream.map(Event::App).boxed())
    }

    /// Create from a stream of events, for sources that produce runtime
    /// events such as [`Event::Tick`].
    pub fn from_events(id: SubscriptionId, stream: BoxStream<'static, Event<M>>) -> Self {
        Subscription {
            id,
            spawn: Box::new(move |sink| {
                let handle = tokio::spawn(async move {
                    let mut stream = stream;
                    while let Some(event) = stream.next().await {
                        if !sink(event) {
                            break;
                        }
                    }
                });
                handle.abort_handle()
            }),
        }
    }

    pub fn id(&self) -> &SubscriptionId {
        &self.id
    }

    /// Transform the message type (for component composition).
    pub fn map<N: Send + 'static>(self, f: impl Fn(M) -> N + Send + Sync + 'static) -> Subscription<N> {
        Subscription {
            id: self.id,
            spawn: Box::new(move |outer: Sink<N>| {
                let inner: Sink<M> = Arc::new(move |event: Event<M>| outer(event.map(&f)));
                (self.spawn)(inner)
            }),
        }
    }
}

/// Manages active subscriptions, performing diffing between cycles.
pub(crate) struct SubscriptionManager<M: Send + 'static> {
    active: HashMap<SubscriptionId, AbortHandle>,
    sink: Sink<M>,
}

impl<M: Send + 'static> SubscriptionManager<M> {
    pub(crate) fn new(queue: queue::Sender<M>) -> Self {
        Self {
            active: HashMap::new(),
            sink: Arc::new(move |event| queue.event(event)),
        }
    }

    /// Diff new subscriptions against active ones.
    /// Start new ones, stop removed ones, keep unchanged ones.
    pub(crate) fn reconcile(&mut self, subs: Vec<Subscription<M>>) {
        let mut wanted: HashMap<SubscriptionId, Subscription<M>> = HashMap::new();
        for sub in subs {
            wanted.insert(sub.id.clone(), sub);
        }

        self.active.retain(|id, handle| {
            let keep = wanted.contains_key(id);
            if !keep {
                handle.abort();
            }
            keep
        });

        for (id, sub) in wanted {
            if !self.active.contains_key(&id) {
                let handle = (sub.spawn)(self.sink.clone());
                self.active.insert(id, handle);
            }
        }
    }

    /// Abort all active subscriptions.
    pub(crate) fn shutdown(&mut self) {
        for (_, handle) in self.active.drain() {
            handle.abort();
        }
    }

    pub(crate) fn active_count(&self) -> usize {
        self.active.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::{channel, Envelope};

    fn pending_sub(id: SubscriptionId) -> Subscription<i32> {
        Subscription::from_stream(id, Box::pin(futures::stream::pending()))
    }

    #[test]
    fn subscription_id_equality() {
        assert_eq!(SubscriptionId::of::<String>(), SubscriptionId::of::<String>());
        assert_ne!(SubscriptionId::of::<String>(), SubscriptionId::of::<i32>());
        assert_ne!(
            SubscriptionId::new::<String>(1),
            SubscriptionId::new::<String>(2)
        );
    }

    #[test]
    fn subscription_id_with_str() {
        let a = SubscriptionId::with_str::<String>("a");
        assert_ne!(a, SubscriptionId::with_str::<String>("b"));
        assert_eq!(a, SubscriptionId::with_str::<String>("a"));
    }

    #[tokio::test]
    async fn manager_starts_stops_and_keeps() {
        let (tx, _rx) = channel::<i32>();
        let mut manager = SubscriptionManager::new(tx);

        manager.reconcile(vec![
            pending_sub(SubscriptionId::new::<String>(1)),
            pending_sub(SubscriptionId::new::<String>(2)),
        ]);
        assert_eq!(manager.active_count(), 2);

        manager.reconcile(vec![pending_sub(SubscriptionId::new::<String>(1))]);
        assert_eq!(manager.active_count(), 1);

        manager.shutdown();
        assert_eq!(manager.active_count(), 0);
    }

    #[tokio::test]
    async fn unchanged_subscription_is_not_restarted() {
        let (tx, mut rx) = channel::<i32>();
        let mut manager = SubscriptionManager::new(tx);
        let id = SubscriptionId::of::<u8>();

        manager.reconcile(vec![Subscription::from_stream(
            id.clone(),
            futures::stream::iter([1]).boxed(),
        )]);
        manager.reconcile(vec![Subscription::from_stream(
            id,
            futures::stream::iter([2]).boxed(),
        )]);

        match rx.recv().await {
            Some(Envelope::Event(event)) => assert_eq!(event, Event::App(1)),
            _ => panic!("Expected the first subscription's value"),
        }
        tokio::task::yield_now().await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn mapped_subscription_delivers_mapped_messages() {
        let (tx, mut rx) = channel::<String>();
        let mut manager = SubscriptionManager::new(tx);
        let sub = Subscription::from_stream(
            SubscriptionId::of::<u8>(),
            futures::stream::iter([7]).boxed(),
        )
        .map(|n: i32| format!("got {n}"));

        manager.reconcile(vec![sub]);
        match rx.recv().await {
            Some(Envelope::Event(event)) => assert_eq!(event, Event::App("got 7".to_string())),
            _ => panic!("Expected a mapped message"),
        }
    }
}
