use crate::event::Event;
use crate::subscription::{Subscription, SubscriptionId, SubscriptionSource};
use futures::stream::BoxStream;
use futures::StreamExt;
use std::time::{Duration, Instant};
use tokio::time::MissedTickBehavior;
use tokio_stream::wrappers::IntervalStream;

/// A repeating timer that fires at a fixed interval.
///
/// Each tick emits the current [`Instant`]. The `id` field allows multiple
/// `Every` subscriptions to coexist with distinct identities.
///
/// # Example
///
/// ```rust,ignore
/// use std::time::Duration;
/// use tapioca_core::subscriptions::Every;
/// use tapioca_core::subscription::subscribe;
///
/// let sub = subscribe(Every::new(Duration::from_secs(1), "refresh"))
///     .map(|instant| Msg::Refresh(instant));
/// ```
pub struct Every {
    /// The interval between ticks.
    pub interval: Duration,
    /// A string identifier used to distinguish this timer from others.
    pub id: &'static str,
}

impl Every {
    pub fn new(interval: Duration, id: &'static str) -> Self {
        Self { interval, id }
    }
}

impl SubscriptionSource for Every {
    type Output = Instant;

    fn id(&self) -> SubscriptionId {
        SubscriptionId::with_str::<Self>(self.id)
    }

    fn stream(self) -> BoxStream<'static, Instant> {
        interval_stream(self.interval).boxed()
    }
}

/// A one-shot delay that fires once after the specified duration.
///
/// Emits a single [`Instant`] when the delay elapses, then the subscription
/// stream completes.
pub struct After {
    /// How long to wait before firing.
    pub duration: Duration,
}

impl After {
    pub fn new(duration: Duration) -> Self {
        Self { duration }
    }
}

impl SubscriptionSource for After {
    type Output = Instant;

    fn id(&self) -> SubscriptionId {
        SubscriptionId::new::<Self>(u64::try_from(self.duration.as_nanos()).unwrap_or(u64::MAX))
    }

    fn stream(self) -> BoxStream<'static, Instant> {
        futures::stream::once(async move {
            tokio::time::sleep(self.duration).await;
            Instant::now()
        })
        .boxed()
    }
}

/// Clock ticks delivered as [`Event::Tick`], the first one after `interval`.
///
/// Ticks that fall behind (e.g. while the terminal is released) are skipped
/// rather than delivered in a burst.
pub fn ticks<M: Send + 'static>(interval: Duration) -> Subscription<M> {
    struct Ticks;
    let id = SubscriptionId::new::<Ticks>(u64::try_from(interval.as_nanos()).unwrap_or(u64::MAX));
    Subscription::from_events(id, interval_stream(interval).map(Event::Tick).boxed())
}

fn interval_stream(period: Duration) -> impl futures::Stream<Item = Instant> + Send {
    let start = tokio::time::Instant::now() + period;
    let mut interval = tokio::time::interval_at(start, period.max(Duration::from_millis(1)));
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    IntervalStream::new(interval).map(|tick| tick.into_std())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::subscription::subscribe;

    #[tokio::test]
    async fn timer_ids() {
        let a = subscribe(Every::new(Duration::from_secs(1), "a"));
        let b = subscribe(Every::new(Duration::from_secs(1), "b"));
        assert_ne!(a.id(), b.id());

        let t1 = ticks::<()>(Duration::from_millis(100));
        let t2 = ticks::<()>(Duration::from_millis(100));
        let t3 = ticks::<()>(Duration::from_millis(200));
        assert_eq!(t1.id(), t2.id());
        assert_ne!(t1.id(), t3.id());
    }

    #[tokio::test(start_paused = true)]
    async fn every_waits_one_interval_before_first_tick() {
        let started = tokio::time::Instant::now();
        let mut stream = Every::new(Duration::from_secs(2), "clock").stream();
        stream.next().await;
        assert!(started.elapsed() >= Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn after_fires_once() {
        let mut stream = After::new(Duration::from_millis(500)).stream();
        assert!(stream.next().await.is_some());
        assert!(stream.next().await.is_none());
    }
}
