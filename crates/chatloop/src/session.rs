use chatloop_core::conversation::Conversation;
use chatloop_core::tool::Tool;
use chatloop_core::{DriverBuilder, Transcript, TurnDriver};
use chatloop_protocol::TurnTransport;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

/// A session builder.
///
/// See [`Session`].
pub struct SessionBuilder<T> {
    driver_builder: DriverBuilder<T>,
    on_idle: Option<Box<dyn Fn() + Send + Sync>>,
}

impl<T: TurnTransport + 'static> SessionBuilder<T> {
    /// Creates a session builder with a specified transport.
    pub fn with_transport(transport: T) -> Self {
        Self {
            driver_builder: DriverBuilder::with_transport(transport),
            on_idle: None,
        }
    }

    /// Sets the developer prompt prepended to every turn request.
    #[inline]
    pub fn with_developer_prompt<S: Into<String>>(mut self, prompt: S) -> Self {
        self.driver_builder = self.driver_builder.with_developer_prompt(prompt);
        self
    }

    /// Registers a tool.
    #[inline]
    pub fn with_tool<Tl: Tool>(mut self, tool: Tl) -> Self {
        self.driver_builder = self.driver_builder.with_tool(tool);
        self
    }

    /// Caps how many streams one user message may trigger.
    #[inline]
    pub fn with_max_turns(mut self, max_turns: usize) -> Self {
        self.driver_builder = self.driver_builder.with_max_turns(max_turns);
        self
    }

    /// Attaches a callback to be invoked when the session is idle.
    #[inline]
    pub fn on_idle(
        mut self,
        on_idle: impl Fn() + Send + Sync + 'static,
    ) -> Self {
        self.on_idle = Some(Box::new(on_idle));
        self
    }

    /// Builds a new session.
    pub fn build(self) -> Session {
        let driver = self.driver_builder.build();
        let waiting = driver.waiting();
        let transcript = driver.transcript();
        let (input_tx, input_rx) = mpsc::unbounded_channel();
        let (cancel_tx, cancel_rx) = watch::channel(0u64);
        let task =
            tokio::spawn(run_session(driver, input_rx, cancel_rx, self.on_idle));
        Session {
            input_tx,
            cancel_tx,
            waiting,
            transcript,
            task,
        }
    }
}

/// A chat session, like a window that displays messages and has an input
/// box.
///
/// The session owns the conversation and a task that feeds queued user
/// messages through the turn driver, one at a time. Messages sent while
/// a turn is in flight are queued and processed in order.
pub struct Session {
    input_tx: mpsc::UnboundedSender<String>,
    cancel_tx: watch::Sender<u64>,
    waiting: watch::Receiver<bool>,
    transcript: watch::Receiver<Transcript>,
    task: JoinHandle<()>,
}

impl Session {
    /// Sends a message to the session.
    #[inline]
    pub fn send_message(&self, message: &str) {
        self.input_tx.send(message.to_owned()).ok();
    }

    /// Returns a receiver for the waiting-for-reply flag.
    #[inline]
    pub fn waiting(&self) -> watch::Receiver<bool> {
        self.waiting.clone()
    }

    /// Returns a receiver for transcript snapshots.
    #[inline]
    pub fn transcript(&self) -> watch::Receiver<Transcript> {
        self.transcript.clone()
    }

    /// Abandons the in-flight turn, if any.
    ///
    /// The underlying stream read is dropped, further frames are
    /// discarded, and the transcript keeps its last consistent state.
    /// Queued messages are unaffected.
    #[inline]
    pub fn cancel_turn(&self) {
        self.cancel_tx.send_modify(|generation| *generation += 1);
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn run_session<T: TurnTransport>(
    driver: TurnDriver<T>,
    mut input_rx: mpsc::UnboundedReceiver<String>,
    mut cancel_rx: watch::Receiver<u64>,
    on_idle: Option<Box<dyn Fn() + Send + Sync>>,
) {
    let mut convo = Conversation::new();
    while let Some(input) = input_rx.recv().await {
        convo.push_user_message(input);

        // Only cancellations issued after this point apply to the turn.
        cancel_rx.mark_unchanged();
        tokio::select! {
            _ = driver.start_turn(&mut convo) => {}
            _ = cancel_rx.changed() => {
                debug!("turn cancelled by the caller");
                driver.clear_waiting();
            }
        }

        if input_rx.is_empty() {
            if let Some(on_idle) = &on_idle {
                on_idle();
            }
        }
    }
}
