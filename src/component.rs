use crate::{command::Command, subscription::Subscription};

/// A headless component following the Elm Architecture.
///
/// A component owns its state, reacts to messages in [`update`](Self::update)
/// and declares the long-lived sources it listens to in
/// [`subscriptions`](Self::subscriptions). Queries are subscriptions, so a
/// component mounts a query simply by declaring it and unmounts it by no
/// longer doing so.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use reims_query::{command::{Action, Command}, component::Component, subscription::Subscription};
/// use reims_query::subscription::time::Timer;
///
/// #[derive(Debug)]
/// enum Message {
///     Tick,
/// }
///
/// struct Countdown {
///     remaining: u32,
/// }
///
/// impl Component for Countdown {
///     type Message = Message;
///     type Flags = u32;
///
///     fn new(remaining: u32) -> (Self, Command<Message>) {
///         (Countdown { remaining }, Command::none())
///     }
///
///     fn update(&mut self, msg: Message) -> Command<Message> {
///         match msg {
///             Message::Tick => {
///                 self.remaining = self.remaining.saturating_sub(1);
///                 if self.remaining == 0 {
///                     Command::effect(Action::Quit)
///                 } else {
///                     Command::none()
///                 }
///             }
///         }
///     }
///
///     fn subscriptions(&self) -> Vec<Subscription<Message>> {
///         vec![Subscription::new(Timer::new(Duration::from_secs(1))).map(|_| Message::Tick)]
///     }
/// }
/// ```
pub trait Component: Sized {
    /// The type of messages the component processes.
    ///
    /// Messages come from subscriptions (query results, timers) and from
    /// commands returned by `update`.
    type Message: Send + 'static;

    /// Configuration data for initializing the component.
    ///
    /// Use `()` if no configuration is needed.
    type Flags: Send;

    /// Initialize the component with the given flags.
    ///
    /// Returns the initial state and a command to run at startup.
    fn new(flags: Self::Flags) -> (Self, Command<Self::Message>);

    /// Process a message and update the component state.
    ///
    /// All state changes happen here. The returned command runs concurrently
    /// and feeds its messages back into `update`.
    fn update(&mut self, msg: Self::Message) -> Command<Self::Message>;

    /// Declare the subscriptions the component currently wants.
    ///
    /// Called once at mount and again after every `update`. Subscriptions that
    /// are no longer declared are cancelled; new ones are started.
    fn subscriptions(&self) -> Vec<Subscription<Self::Message>>;
}
