//! The turn driver.
//!
//! One driver owns the tool registry, the developer prompt, and the
//! observable channels; the conversation is lent to it per turn. A turn
//! runs as `Requesting -> Streaming -> (ToolPending -> Requesting)* ->
//! Idle`: the stream is fully drained and all tool outputs are appended
//! before the next stream is opened, so the model always sees tool
//! results the way a synchronous implementation would send them.

use chatloop_protocol::{
    StreamEvent, TransportError, TurnRequest, TurnTransport,
};
use tokio::sync::watch;

use crate::conversation::Conversation;
use crate::reconstruct::{CompletedCall, Reconstructor};
use crate::sse::Framer;
use crate::tool::{Registry, Tool};
use crate::transcript::{Transcript, TranscriptItem};

/// Default bound on consecutive tool-call turns within one
/// [`TurnDriver::start_turn`] call.
const DEFAULT_MAX_TURNS: usize = 8;

/// [`TurnDriver`] builder.
pub struct DriverBuilder<T> {
    transport: T,
    developer_prompt: String,
    max_turns: usize,
    tools: Registry,
}

impl<T: TurnTransport> DriverBuilder<T> {
    /// Creates a builder with the specified transport.
    #[inline]
    pub fn with_transport(transport: T) -> Self {
        Self {
            transport,
            developer_prompt: String::new(),
            max_turns: DEFAULT_MAX_TURNS,
            tools: Registry::default(),
        }
    }

    /// Sets the developer prompt prepended to every turn request.
    #[inline]
    pub fn with_developer_prompt<S: Into<String>>(mut self, prompt: S) -> Self {
        self.developer_prompt = prompt.into();
        self
    }

    /// Registers a tool.
    #[inline]
    pub fn with_tool<Tl: Tool>(mut self, tool: Tl) -> Self {
        self.tools.add_tool(tool);
        self
    }

    /// Caps how many streams one `start_turn` call may open.
    ///
    /// A misbehaving model could chain tool calls indefinitely; when the
    /// bound is reached the driver stops re-entering and leaves the last
    /// tool outputs in the conversation for the next explicit turn.
    #[inline]
    pub fn with_max_turns(mut self, max_turns: usize) -> Self {
        self.max_turns = max_turns;
        self
    }

    /// Builds the driver.
    pub fn build(self) -> TurnDriver<T> {
        let (waiting_tx, _) = watch::channel(false);
        let (snapshot_tx, _) = watch::channel(Transcript::default());
        TurnDriver {
            transport: self.transport,
            developer_prompt: self.developer_prompt,
            max_turns: self.max_turns,
            tools: self.tools,
            waiting_tx,
            snapshot_tx,
        }
    }
}

/// Drives conversation turns against a transport.
///
/// Nothing here panics or escapes as an error: every failure mode is
/// folded into the conversation state, logged, and reflected in the
/// waiting flag, so a UI layer never has to catch anything.
pub struct TurnDriver<T> {
    transport: T,
    developer_prompt: String,
    max_turns: usize,
    tools: Registry,
    waiting_tx: watch::Sender<bool>,
    snapshot_tx: watch::Sender<Transcript>,
}

impl<T: TurnTransport> TurnDriver<T> {
    /// Returns a receiver for the waiting-for-reply flag.
    ///
    /// The flag turns on when a request is sent and off at the first
    /// meaningful frame of the reply, or unconditionally when the stream
    /// ends or fails without one.
    #[inline]
    pub fn waiting(&self) -> watch::Receiver<bool> {
        self.waiting_tx.subscribe()
    }

    /// Returns a receiver for transcript snapshots.
    ///
    /// Every frame application publishes a fresh snapshot; a snapshot
    /// never changes after it has been published.
    #[inline]
    pub fn transcript(&self) -> watch::Receiver<Transcript> {
        self.snapshot_tx.subscribe()
    }

    /// Force-clears the waiting flag.
    ///
    /// For callers that abandon an in-flight `start_turn` future; the
    /// conversation stays in its last consistent state on its own.
    #[inline]
    pub fn clear_waiting(&self) {
        self.waiting_tx.send_replace(false);
    }

    /// Runs one turn, plus any tool-call turns it triggers.
    ///
    /// Returns when the model produces a turn with no tool calls, when a
    /// transport error aborts the turn, or when the turn bound is
    /// reached. Dropping the future abandons the in-flight stream and
    /// leaves the conversation in its last consistent state.
    pub async fn start_turn(&self, convo: &mut Conversation) {
        for depth in 0..self.max_turns {
            let Some(calls) = self.run_stream(convo).await else {
                return;
            };
            if calls.is_empty() {
                return;
            }
            for call in calls {
                self.run_tool(convo, call).await;
            }
            trace!("re-entering the turn loop (depth {})", depth + 1);
        }
        warn!(
            "turn bound ({}) reached, not re-entering the loop",
            self.max_turns
        );
    }

    /// Opens one stream and folds it to completion.
    ///
    /// `None` means the turn was aborted by a transport failure; the
    /// collected tool calls of a failed stream are never dispatched.
    async fn run_stream(
        &self,
        convo: &mut Conversation,
    ) -> Option<Vec<CompletedCall>> {
        self.waiting_tx.send_replace(true);
        // Caller-side mutations (the user message) become visible to
        // observers as soon as the turn starts.
        self.publish(convo);

        let request = TurnRequest {
            messages: convo.request_items(&self.developer_prompt),
            tools: self.tools.manifest(),
        };
        let stream = match self.transport.send_turn(&request).await {
            Ok(stream) => stream,
            Err(err) => {
                error!(
                    "failed to open the turn stream: {err} ({:?})",
                    err.kind()
                );
                self.waiting_tx.send_replace(false);
                return None;
            }
        };

        let mut framer = Framer::new(stream);
        let mut reconstructor = Reconstructor::new();
        let mut completed = Vec::new();
        let mut got_reply_signal = false;

        loop {
            let payload = match framer.next_frame().await {
                Ok(Some(payload)) => payload,
                Ok(None) => break,
                Err(err) => {
                    error!("turn stream failed: {err:?}");
                    self.waiting_tx.send_replace(false);
                    return None;
                }
            };

            let event = match StreamEvent::decode(&payload) {
                Ok(Some(event)) => event,
                // Unhandled event kinds are no-ops.
                Ok(None) => continue,
                Err(err) => {
                    warn!("dropping malformed frame: {err}");
                    continue;
                }
            };

            if !got_reply_signal && event.is_reply_signal() {
                self.waiting_tx.send_replace(false);
                got_reply_signal = true;
            }

            if let Some(call) = reconstructor.apply(convo, event) {
                completed.push(call);
            }
            self.publish(convo);
        }

        // The stream may end without a single meaningful frame.
        self.waiting_tx.send_replace(false);
        Some(completed)
    }

    /// Dispatches one finalized function call and appends its output.
    async fn run_tool(&self, convo: &mut Conversation, call: CompletedCall) {
        let name = call.name.as_deref().unwrap_or_default();
        let output = self.tools.dispatch(name, call.arguments).await;

        if let Some(TranscriptItem::ToolCall(item)) =
            convo.transcript.find_mut(&call.item_id)
        {
            item.output = Some(output.clone());
        }
        convo.push_function_call_output(
            call.call_id.unwrap_or_default(),
            output,
        );
        self.publish(convo);
    }

    #[inline]
    fn publish(&self, convo: &Conversation) {
        self.snapshot_tx.send_replace(convo.transcript().clone());
    }
}
