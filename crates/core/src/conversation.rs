//! Conversation-related types.

use std::collections::HashSet;

use chatloop_protocol::{
    FunctionCallOutput, InputItem, TextInput, TextRole,
};
use serde_json::Value;

use crate::transcript::{
    ContentPart, MessageItem, Role, Transcript, TranscriptItem,
};

/// Represents a conversation.
///
/// The conversation owns both views of the exchange: the [`Transcript`]
/// that also carries partially-streamed items, and the flattened input
/// list of finalized items that future turn requests are built from. The
/// caller owns the value and lends it to the turn driver for the
/// duration of a turn.
#[derive(Clone, Debug, Default)]
pub struct Conversation {
    pub(crate) transcript: Transcript,
    items: Vec<InputItem>,
    finalized: HashSet<String>,
}

impl Conversation {
    /// Creates an empty conversation.
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the current transcript.
    #[inline]
    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    /// Appends a user message to both the transcript and the upstream
    /// input.
    pub fn push_user_message<S: Into<String>>(&mut self, text: S) {
        let text = text.into();
        self.transcript.push(TranscriptItem::Message(MessageItem {
            id: None,
            role: Role::User,
            content: vec![ContentPart::input_text(text.clone())],
        }));
        self.items.push(InputItem::Text(TextInput {
            role: TextRole::User,
            content: text,
        }));
    }

    /// Builds the flattened input for the next turn request, with the
    /// developer prompt prepended.
    pub(crate) fn request_items(
        &self,
        developer_prompt: &str,
    ) -> Vec<InputItem> {
        let mut items = Vec::with_capacity(self.items.len() + 1);
        items.push(InputItem::Text(TextInput {
            role: TextRole::Developer,
            content: developer_prompt.to_owned(),
        }));
        items.extend(self.items.iter().cloned());
        items
    }

    /// Whether the item with this id has already been finalized.
    #[inline]
    pub(crate) fn is_finalized(&self, id: &str) -> bool {
        self.finalized.contains(id)
    }

    /// Appends a finalized raw item to the upstream input.
    ///
    /// Each id contributes at most one entry; replayed finalization
    /// frames are ignored.
    pub(crate) fn push_finalized(&mut self, id: &str, raw: Value) -> bool {
        if !self.finalized.insert(id.to_owned()) {
            return false;
        }
        self.items.push(InputItem::Item(raw));
        true
    }

    /// Appends the serialized result of a local function call.
    pub(crate) fn push_function_call_output(
        &mut self,
        call_id: String,
        output: String,
    ) {
        self.items.push(InputItem::FunctionCallOutput(
            FunctionCallOutput::new(call_id, output),
        ));
    }
}
