//! Long-lived message sources tied to a component's lifetime.
//!
//! A component declares its subscriptions from
//! [`Component::subscriptions`](crate::component::Component::subscriptions). After
//! every update the runtime diffs that list by [`SubscriptionId`]: new sources are
//! started, sources that disappeared are cancelled, unchanged sources keep
//! running. Unmounting the component cancels everything that is left.
//!
//! Queries are subscriptions too, so a query's refetch timer lives exactly as
//! long as the component that declared it.

pub mod time;

use std::any::TypeId;
use std::collections::HashMap;
use std::collections::hash_map::Entry;

use futures::StreamExt;
use futures::stream::BoxStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::command::Action;

/// Identity of a subscription, used to decide whether it must be restarted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId {
    type_id: TypeId,
    hash: u64,
}

impl SubscriptionId {
    /// Builds an id from the source type and a hash of its configuration.
    #[must_use]
    pub fn of<T: 'static>(hash: u64) -> Self {
        Self {
            type_id: TypeId::of::<T>(),
            hash,
        }
    }
}

/// A source of values that can be turned into a stream.
pub trait SubscriptionSource: Send + 'static {
    /// The values emitted by this source.
    type Output;

    /// Creates a fresh stream of values.
    ///
    /// Called once every time the subscription is started.
    fn stream(&self) -> BoxStream<'static, Self::Output>;

    /// Identity of this source. Equal ids mean the running stream is kept.
    fn id(&self) -> SubscriptionId;
}

/// A subscription producing messages of type `Msg`.
pub struct Subscription<Msg> {
    pub(crate) id: SubscriptionId,
    pub(crate) spawn: Box<dyn Fn() -> BoxStream<'static, Msg> + Send>,
}

impl<Msg: 'static> Subscription<Msg> {
    /// Wraps a subscription source.
    pub fn new<S>(source: S) -> Self
    where
        S: SubscriptionSource<Output = Msg>,
    {
        let id = source.id();
        Self {
            id,
            spawn: Box::new(move || source.stream()),
        }
    }

    /// Converts the messages produced by this subscription.
    pub fn map<B: 'static>(self, f: impl Fn(Msg) -> B + Send + Sync + Clone + 'static) -> Subscription<B> {
        let spawn = self.spawn;
        Subscription {
            id: self.id,
            spawn: Box::new(move || {
                let f = f.clone();
                spawn().map(f).boxed()
            }),
        }
    }

    /// Returns the identity of this subscription.
    pub const fn id(&self) -> SubscriptionId {
        self.id
    }
}

/// Handle for a running subscription task.
pub struct Handle {
    token: CancellationToken,
    join: JoinHandle<()>,
}

impl Handle {
    pub fn new(token: CancellationToken, join: JoinHandle<()>) -> Self {
        Self { token, join }
    }

    /// Cancel the subscription and wait for the task to finish.
    pub async fn cancel(self) {
        self.token.cancel();
        let _ = self.join.await;
    }

    /// Returns `true` once the subscription task has exited.
    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }
}

/// Starts and stops subscriptions as a component's declared set changes.
pub struct SubscriptionManager<Msg> {
    tx: mpsc::UnboundedSender<Action<Msg>>,
    running: HashMap<SubscriptionId, Handle>,
}

impl<Msg: Send + 'static> SubscriptionManager<Msg> {
    pub fn new(tx: mpsc::UnboundedSender<Action<Msg>>) -> Self {
        Self {
            tx,
            running: HashMap::new(),
        }
    }

    /// Reconciles running subscriptions with the declared ones.
    pub fn update(&mut self, subscriptions: Vec<Subscription<Msg>>) {
        let mut declared = HashMap::with_capacity(subscriptions.len());
        for subscription in subscriptions {
            declared.entry(subscription.id).or_insert(subscription);
        }

        let stale: Vec<_> = self
            .running
            .keys()
            .filter(|id| !declared.contains_key(id))
            .copied()
            .collect();

        for id in stale {
            if let Some(handle) = self.running.remove(&id) {
                tracing::trace!(?id, "stopping subscription");
                handle.token.cancel();
            }
        }

        for (id, subscription) in declared {
            if let Entry::Vacant(slot) = self.running.entry(id) {
                tracing::trace!(?id, "starting subscription");
                slot.insert(spawn_subscription(subscription, self.tx.clone()));
            }
        }
    }

    /// Number of subscriptions currently running.
    pub fn len(&self) -> usize {
        self.running.len()
    }

    pub fn is_empty(&self) -> bool {
        self.running.is_empty()
    }

    /// Cancels every running subscription and waits for them to stop.
    pub async fn shutdown(&mut self) {
        for (_, handle) in self.running.drain() {
            handle.cancel().await;
        }
    }
}

fn spawn_subscription<Msg: Send + 'static>(
    subscription: Subscription<Msg>,
    tx: mpsc::UnboundedSender<Action<Msg>>,
) -> Handle {
    let token = CancellationToken::new();
    let mut stream = (subscription.spawn)();
    let cancelled = token.clone();

    let join = tokio::spawn(async move {
        loop {
            tokio::select! {
                () = cancelled.cancelled() => break,
                next = stream.next() => match next {
                    Some(msg) => {
                        if tx.send(Action::Message(msg)).is_err() {
                            break;
                        }
                    }
                    None => break,
                },
            }
        }
    });

    Handle::new(token, join)
}
