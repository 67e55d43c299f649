//! Transcript-related types.
//!
//! The transcript is the chat-facing record of the conversation: it also
//! carries partially-streamed items, unlike the upstream input which only
//! ever sees finalized ones.

use serde_json::{Map, Value};

/// The role a message is attributed to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Role {
    /// End-user input.
    User,
    /// Model output.
    Assistant,
    /// System-injected content.
    System,
}

/// The kind of a message content part.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ContentKind {
    /// Text supplied by the user.
    InputText,
    /// Text produced by the model.
    OutputText,
    /// A refusal from the model.
    Refusal,
    /// Audio produced by the model.
    OutputAudio,
}

/// One content part of a message item.
#[derive(Clone, Debug, PartialEq)]
pub struct ContentPart {
    /// The kind of this part.
    pub kind: ContentKind,
    /// The text of this part. Grows by appending while streaming.
    pub text: String,
    /// Annotations attached to this part, in arrival order. Duplicates
    /// are allowed.
    pub annotations: Vec<Value>,
    /// Follow-up questions extracted when the item is finalized.
    pub follow_up_questions: Vec<String>,
}

impl ContentPart {
    /// Creates an input-text part.
    #[inline]
    pub fn input_text<S: Into<String>>(text: S) -> Self {
        Self::with_kind(ContentKind::InputText, text)
    }

    /// Creates an output-text part.
    #[inline]
    pub fn output_text<S: Into<String>>(text: S) -> Self {
        Self::with_kind(ContentKind::OutputText, text)
    }

    #[inline]
    fn with_kind<S: Into<String>>(kind: ContentKind, text: S) -> Self {
        Self {
            kind,
            text: text.into(),
            annotations: Vec::new(),
            follow_up_questions: Vec::new(),
        }
    }
}

/// The type of a tool call.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ToolType {
    /// A local function call.
    FunctionCall,
    /// A server-side web search.
    WebSearchCall,
    /// A server-side file search.
    FileSearchCall,
}

/// The lifecycle status of a tool call.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ToolStatus {
    /// The call is still streaming in.
    InProgress,
    /// A search call is running server-side.
    Searching,
    /// The call has all of its inputs and, for searches, its output.
    Completed,
    /// The call's final arguments were not valid JSON.
    Failed,
}

impl ToolStatus {
    /// Maps a wire status string, defaulting to `InProgress` for absent
    /// or unknown values.
    pub(crate) fn from_wire(status: Option<&str>) -> Self {
        match status {
            Some("completed") => ToolStatus::Completed,
            Some("searching") => ToolStatus::Searching,
            Some("failed") => ToolStatus::Failed,
            _ => ToolStatus::InProgress,
        }
    }
}

/// A message item in the transcript.
#[derive(Clone, Debug, PartialEq)]
pub struct MessageItem {
    /// Server-assigned identifier, unset until the server provides one.
    pub id: Option<String>,
    /// The role this message is attributed to.
    pub role: Role,
    /// Ordered content parts.
    pub content: Vec<ContentPart>,
}

/// A tool call item in the transcript.
#[derive(Clone, Debug, PartialEq)]
pub struct ToolCallItem {
    /// Server-assigned identifier.
    pub id: String,
    /// The type of this call.
    pub tool_type: ToolType,
    /// The lifecycle status of this call.
    pub status: ToolStatus,
    /// The tool name, present for function calls.
    pub name: Option<String>,
    /// The server-assigned call id, back-filled on finalization.
    pub call_id: Option<String>,
    /// The accumulating raw arguments string.
    pub raw_arguments: String,
    /// Best-effort parsed arguments; may be partial while streaming.
    pub parsed_arguments: Value,
    /// The call output, set on completion.
    pub output: Option<String>,
}

impl ToolCallItem {
    /// Creates a tool call in its initial streaming state.
    pub(crate) fn new(id: String, tool_type: ToolType) -> Self {
        Self {
            id,
            tool_type,
            status: ToolStatus::InProgress,
            name: None,
            call_id: None,
            raw_arguments: String::new(),
            parsed_arguments: Value::Object(Map::new()),
            output: None,
        }
    }
}

/// An item in the transcript.
#[derive(Clone, Debug, PartialEq)]
pub enum TranscriptItem {
    /// A message item.
    Message(MessageItem),
    /// A tool call item.
    ToolCall(ToolCallItem),
}

impl TranscriptItem {
    /// Returns the server-assigned id of this item, if any.
    pub fn id(&self) -> Option<&str> {
        match self {
            TranscriptItem::Message(m) => m.id.as_deref(),
            TranscriptItem::ToolCall(c) => Some(&c.id),
        }
    }
}

/// The ordered, session-lifetime record of message and tool-call items.
///
/// The transcript is append-mostly: only the last item of a given id is
/// mutated in place while streaming, everything else is immutable.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Transcript {
    items: Vec<TranscriptItem>,
}

impl Transcript {
    /// Returns the items in this transcript.
    #[inline]
    pub fn items(&self) -> &[TranscriptItem] {
        &self.items
    }

    /// Returns the number of items in this transcript.
    #[inline]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether this transcript has no items.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    #[inline]
    pub(crate) fn push(&mut self, item: TranscriptItem) {
        self.items.push(item);
    }

    #[inline]
    pub(crate) fn last_mut(&mut self) -> Option<&mut TranscriptItem> {
        self.items.last_mut()
    }

    /// Finds the item with the given server-assigned id.
    pub(crate) fn find_mut(
        &mut self,
        id: &str,
    ) -> Option<&mut TranscriptItem> {
        self.items.iter_mut().find(|item| item.id() == Some(id))
    }
}
