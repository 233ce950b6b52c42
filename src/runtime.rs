use color_eyre::eyre::Result;
use futures::stream::StreamExt;
use tokio::sync::mpsc;

use crate::{
    command::{Action, Command},
    component::Component,
    subscription::SubscriptionManager,
};

#[repr(transparent)]
struct Instance<C: Component> {
    inner: C,
}

/// Drives a [`Component`]: executes its commands and keeps its subscriptions
/// in sync with what it declares.
///
/// The component is mounted while [`run`](Self::run) executes. A
/// [`Action::Quit`] unmounts it, which cancels every subscription and with
/// them any query refetch timers.
pub struct Runtime<C: Component> {
    app: Instance<C>,
    tx: mpsc::UnboundedSender<Action<C::Message>>,
    rx: mpsc::UnboundedReceiver<Action<C::Message>>,
    subscription_manager: SubscriptionManager<C::Message>,
    init: Option<Command<C::Message>>,
}

impl<C: Component> Runtime<C> {
    /// Creates a runtime for the component built from `flags`.
    ///
    /// The initial command returned by [`Component::new`] executes once
    /// [`run`](Self::run) is called.
    pub fn new(flags: C::Flags) -> Self {
        let (app, init) = C::new(flags);
        let (tx, rx) = mpsc::unbounded_channel();
        let subscription_manager = SubscriptionManager::new(tx.clone());

        Self {
            app: Instance { inner: app },
            tx,
            rx,
            subscription_manager,
            init: Some(init),
        }
    }

    /// Returns a sender that injects actions into the running component.
    pub fn sender(&self) -> mpsc::UnboundedSender<Action<C::Message>> {
        self.tx.clone()
    }

    fn execute(&self, cmd: Command<C::Message>) {
        let Some(mut stream) = cmd.stream else {
            return;
        };

        let tx = self.tx.clone();
        tokio::spawn(async move {
            while let Some(action) = stream.next().await {
                if tx.send(action).is_err() {
                    break;
                }
            }
        });
    }

    /// Runs until the component quits, then returns it.
    pub async fn run(mut self) -> Result<C> {
        if let Some(init) = self.init.take() {
            self.execute(init);
        }
        self.subscription_manager
            .update(self.app.inner.subscriptions());
        tracing::debug!(
            subscriptions = self.subscription_manager.len(),
            "component mounted"
        );

        while let Some(action) = self.rx.recv().await {
            match action {
                Action::Message(msg) => {
                    let cmd = self.app.inner.update(msg);
                    self.execute(cmd);

                    self.subscription_manager
                        .update(self.app.inner.subscriptions());
                }
                Action::Quit => break,
            }
        }

        self.subscription_manager.shutdown().await;
        tracing::debug!("component unmounted");

        Ok(self.app.inner)
    }
}
