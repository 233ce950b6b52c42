use futures::{
    FutureExt, Stream, StreamExt,
    stream::{self, BoxStream, select_all},
};

/// An action emitted by a command and handled by the [`Runtime`](crate::runtime::Runtime).
pub enum Action<Msg> {
    /// Deliver a message to the component's `update` function.
    Message(Msg),

    /// Unmount the component.
    ///
    /// The runtime stops its event loop and cancels every running subscription,
    /// which stops refetch timers owned by mounted queries.
    Quit,
}

impl<Msg> Action<Msg> {
    /// Transforms the message carried by this action.
    pub fn map<B>(self, f: impl FnOnce(Msg) -> B) -> Action<B> {
        match self {
            Self::Message(msg) => Action::Message(f(msg)),
            Self::Quit => Action::Quit,
        }
    }
}

/// A side effect that eventually produces messages or actions.
///
/// Commands are how components start asynchronous work: mutations, cache
/// invalidation, one-off fetches. They are returned from
/// [`Component::new`](crate::component::Component::new) and
/// [`Component::update`](crate::component::Component::update) and executed by the
/// runtime.
///
/// # Examples
///
/// ```
/// use reims_query::command::Command;
///
/// enum Message {
///     Loaded(u32),
/// }
///
/// let cmd = Command::perform(async { 42 }, Message::Loaded);
/// ```
pub struct Command<Msg: Send + 'static> {
    pub(crate) stream: Option<BoxStream<'static, Action<Msg>>>,
}

impl<Msg: Send + 'static> Command<Msg> {
    /// A command that does nothing.
    pub fn none() -> Self {
        Self { stream: None }
    }

    /// Runs a future and converts its output into a message.
    ///
    /// ```
    /// use reims_query::command::Command;
    ///
    /// async fn load_occupancy() -> f64 {
    ///     0.94
    /// }
    ///
    /// enum Message {
    ///     Occupancy(f64),
    /// }
    ///
    /// let cmd = Command::perform(load_occupancy(), Message::Occupancy);
    /// ```
    pub fn perform<A>(
        future: impl Future<Output = A> + Send + 'static,
        f: impl FnOnce(A) -> Msg + Send + 'static,
    ) -> Self {
        Self::future(future.map(f))
    }

    /// Runs a future that resolves directly to a message.
    pub fn future(future: impl Future<Output = Msg> + Send + 'static) -> Self {
        Self {
            stream: Some(future.into_stream().map(Action::Message).boxed()),
        }
    }

    /// Delivers a message on the next turn of the event loop.
    pub fn message(msg: Msg) -> Self {
        Self::effect(Action::Message(msg))
    }

    /// Performs a single action immediately.
    ///
    /// ```
    /// use reims_query::command::{Action, Command};
    ///
    /// let unmount: Command<()> = Command::effect(Action::Quit);
    /// ```
    pub fn effect(action: Action<Msg>) -> Self {
        Self {
            stream: Some(stream::once(async move { action }).boxed()),
        }
    }

    /// Runs several commands concurrently.
    ///
    /// Message order across the batched commands is not guaranteed.
    /// `Command::none()` entries are dropped.
    pub fn batch(commands: impl IntoIterator<Item = Command<Msg>>) -> Self {
        let streams: Vec<_> = commands.into_iter().filter_map(|cmd| cmd.stream).collect();

        if streams.is_empty() {
            Self::none()
        } else {
            Self {
                stream: Some(select_all(streams).boxed()),
            }
        }
    }

    /// Delivers every item of a stream as a message.
    pub fn stream(stream: impl Stream<Item = Msg> + Send + 'static) -> Self {
        Self {
            stream: Some(stream.map(Action::Message).boxed()),
        }
    }

    /// Consumes a stream, converting each item into a message.
    pub fn run<A>(
        stream: impl Stream<Item = A> + Send + 'static,
        f: impl Fn(A) -> Msg + Send + 'static,
    ) -> Self {
        Self::stream(stream.map(f))
    }

    /// Converts the messages produced by this command.
    ///
    /// ```
    /// use reims_query::command::Command;
    ///
    /// enum Message {
    ///     Saved(Result<u32, String>),
    /// }
    ///
    /// let cmd = Command::future(async { Ok::<_, String>(7) }).map(Message::Saved);
    /// ```
    pub fn map<B: Send + 'static>(self, f: impl Fn(Msg) -> B + Send + 'static) -> Command<B> {
        Command {
            stream: self
                .stream
                .map(|stream| stream.map(move |action| action.map(&f)).boxed()),
        }
    }

    /// Returns `true` if this command performs no work.
    pub const fn is_none(&self) -> bool {
        self.stream.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    async fn collect_messages<Msg: Send + 'static>(cmd: Command<Msg>) -> (Vec<Msg>, bool) {
        let mut messages = Vec::new();
        let mut quit = false;

        if let Some(mut stream) = cmd.stream {
            while let Some(action) = stream.next().await {
                match action {
                    Action::Message(msg) => messages.push(msg),
                    Action::Quit => quit = true,
                }
            }
        }

        (messages, quit)
    }

    #[tokio::test]
    async fn test_batch_empty() {
        let cmd: Command<i32> = Command::batch(vec![]);
        assert!(cmd.is_none());
    }

    #[tokio::test]
    async fn test_batch_drops_none_commands() {
        let cmd = Command::batch(vec![
            Command::future(async { 1 }),
            Command::<i32>::none(),
            Command::future(async { 3 }),
        ]);

        let (mut messages, quit) = collect_messages(cmd).await;
        messages.sort_unstable();

        assert_eq!(messages, vec![1, 3]);
        assert!(!quit);
    }

    #[tokio::test]
    async fn test_batch_with_quit_action() {
        let cmd = Command::batch(vec![
            Command::future(async { 1 }),
            Command::effect(Action::Quit),
        ]);

        let (messages, quit) = collect_messages(cmd).await;
        assert_eq!(messages, vec![1]);
        assert!(quit, "should receive quit action");
    }

    #[tokio::test]
    async fn test_message() {
        let (messages, _) = collect_messages(Command::message("refresh")).await;
        assert_eq!(messages, vec!["refresh"]);
    }

    #[tokio::test]
    async fn test_run_with_conversion() {
        let cmd = Command::run(futures::stream::iter(vec![1, 2, 3]), |x| x * 10);
        let (messages, _) = collect_messages(cmd).await;
        assert_eq!(messages, vec![10, 20, 30]);
    }

    #[tokio::test]
    async fn test_map_preserves_quit() {
        let cmd = Command::batch(vec![
            Command::future(async { 2 }),
            Command::effect(Action::Quit),
        ])
        .map(|n: i32| format!("kpi-{n}"));

        let (messages, quit) = collect_messages(cmd).await;
        assert_eq!(messages, vec!["kpi-2".to_string()]);
        assert!(quit);
    }

    #[tokio::test]
    async fn test_map_none_stays_none() {
        let cmd = Command::<i32>::none().map(|n| n + 1);
        assert!(cmd.is_none());
    }
}
