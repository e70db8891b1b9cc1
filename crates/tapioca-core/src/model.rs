use crate::command::Command;
use crate::event::Event;
use crate::frame::Frame;
use crate::subscription::Subscription;

/// The top-level application trait, following the [Elm Architecture].
///
/// Every tapioca application implements `Model`. The runtime drives a continuous
/// **init -> view -> update -> view** cycle:
///
/// 1. [`init`](Model::init) creates the initial state and may return a
///    [`Command`] for early side effects (e.g. fetching data).
/// 2. [`view`](Model::view) renders the current state to a [`Frame`].
/// 3. Terminal input, command results, subscription output and messages
///    sent through a [`ProgramHandle`](crate::ProgramHandle) arrive as
///    [`Event`]s, one at a time.
/// 4. [`update`](Model::update) processes each event, mutates state, and
///    optionally returns a [`Command`] for further work.
/// 5. Steps 2--4 repeat until the program exits.
///
/// The event loop is the only caller of these methods, so the model never
/// needs interior locking.
///
/// # Example
///
/// ```rust,ignore
/// use tapioca_core::{Command, Event, Frame, Model};
///
/// struct Counter {
///     count: i32,
/// }
///
/// impl Model for Counter {
///     type Message = ();
///     type Flags = ();
///
///     fn init(_flags: ()) -> (Self, Command<()>) {
///         (Counter { count: 0 }, Command::none())
///     }
///
///     fn update(&mut self, event: Event<()>) -> Command<()> {
///         match event {
///             Event::Key(key) if key.matches("up") => self.count += 1,
///             Event::Key(key) if key.matches("down") => self.count -= 1,
///             Event::Key(key) if key.matches("q") => return Command::quit(),
///             _ => {}
///         }
///         Command::none()
///     }
///
///     fn view(&self) -> Frame {
///         Frame::new(format!("Count: {}", self.count))
///     }
/// }
/// ```
///
/// [Elm Architecture]: https://guide.elm-lang.org/architecture/
pub trait Model: Sized + Send + 'static {
    /// The application's message type, carried in [`Event::App`].
    ///
    /// Messages arrive from [`Command::message`], from async work completed
    /// via [`Command::perform`], from [`Subscription`]s, or from outside the
    /// program through [`ProgramHandle::send`](crate::ProgramHandle::send).
    type Message: Send + 'static;

    /// Initialization data passed to [`Model::init`].
    ///
    /// Use `()` when no startup data is needed.
    type Flags: Send + 'static;

    /// Create the initial model state and an optional startup command.
    ///
    /// Called once, before the first render. Use [`Command::none()`] if no
    /// startup side effects are needed.
    fn init(flags: Self::Flags) -> (Self, Command<Self::Message>);

    /// Process an event, mutate state, and return a command for side effects.
    ///
    /// After `update` returns, the runtime hands the command to the
    /// scheduler, reconciles [`subscriptions`](Model::subscriptions) and
    /// calls [`view`](Model::view).  [`Event::Quit`] never reaches `update`.
    fn update(&mut self, event: Event<Self::Message>) -> Command<Self::Message>;

    /// Render the current state.
    ///
    /// This should be a pure function of `&self`.  Build the frame from a
    /// string, or draw ratatui widgets with [`Frame::draw`].
    fn view(&self) -> Frame;

    /// Declare active subscriptions.  Called after every update.
    ///
    /// The runtime diffs the returned list against the previously active
    /// set by [`SubscriptionId`](crate::SubscriptionId): new subscriptions
    /// are started and removed ones are cancelled.
    fn subscriptions(&self) -> Vec<Subscription<Self::Message>> {
        vec![]
    }
}
