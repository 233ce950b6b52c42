//! Interval ticks.
//!
//! [`Timer`] drives the refetch interval of mounted queries and can be used
//! directly by components that need periodic work.

use std::hash::{DefaultHasher, Hash, Hasher};
use std::time::Duration;

use futures::StreamExt;
use futures::stream::BoxStream;
use tokio::time::{MissedTickBehavior, interval_at};
use tokio_stream::wrappers::IntervalStream;

use super::{SubscriptionId, SubscriptionSource};

/// Messages produced by the [`Timer`] subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Message {
    /// One period has elapsed.
    Tick,
}

/// Emits [`Message::Tick`] once per period.
///
/// The first tick arrives one full period after the stream is created, never
/// immediately. Missed ticks are skipped rather than replayed, so a slow
/// consumer sees at most one pending tick.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use reims_query::subscription::{Subscription, time::Timer};
///
/// enum Message {
///     Poll,
/// }
///
/// let sub = Subscription::new(Timer::new(Duration::from_secs(30))).map(|_| Message::Poll);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Timer {
    period: Duration,
}

impl Timer {
    /// Creates a timer with the given period.
    ///
    /// A zero period is clamped to one millisecond.
    #[must_use]
    pub fn new(period: Duration) -> Self {
        Self {
            period: period.max(Duration::from_millis(1)),
        }
    }

    #[must_use]
    pub fn from_millis(ms: u64) -> Self {
        Self::new(Duration::from_millis(ms))
    }

    #[must_use]
    pub const fn period(&self) -> Duration {
        self.period
    }
}

impl SubscriptionSource for Timer {
    type Output = Message;

    fn stream(&self) -> BoxStream<'static, Message> {
        let start = tokio::time::Instant::now() + self.period;
        let mut interval = interval_at(start, self.period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        IntervalStream::new(interval).map(|_| Message::Tick).boxed()
    }

    fn id(&self) -> SubscriptionId {
        let mut hasher = DefaultHasher::new();
        self.hash(&mut hasher);
        SubscriptionId::of::<Self>(hasher.finish())
    }
}
