//! Folding decoded stream events into the conversation.

use std::collections::HashMap;

use chatloop_protocol::{OutputItem, OutputItemDetail, StreamEvent};
use serde_json::Value;

use crate::conversation::Conversation;
use crate::followup;
use crate::partial_json::parse_partial;
use crate::transcript::{
    ContentKind, ContentPart, MessageItem, Role, ToolCallItem, ToolStatus,
    ToolType, TranscriptItem,
};

/// A finalized `function_call` ready for local dispatch.
#[derive(Clone, Debug)]
pub(crate) struct CompletedCall {
    pub(crate) item_id: String,
    pub(crate) call_id: Option<String>,
    pub(crate) name: Option<String>,
    pub(crate) arguments: Value,
}

/// Applies decoded events to a conversation, one frame at a time.
///
/// One reconstructor drives exactly one turn; the raw-text accumulators
/// it keeps per item id don't outlive the stream. Item ids never repeat
/// across turns, so the accumulators always start empty.
#[derive(Default)]
pub(crate) struct Reconstructor {
    text_accums: HashMap<String, String>,
}

impl Reconstructor {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Folds one event into the conversation.
    ///
    /// Returns a completed function call when this frame finalizes one;
    /// the caller hands it to the tool registry once the stream drains.
    pub(crate) fn apply(
        &mut self,
        convo: &mut Conversation,
        event: StreamEvent,
    ) -> Option<CompletedCall> {
        match event {
            StreamEvent::OutputTextDelta {
                item_id,
                delta,
                annotation,
            } => {
                self.apply_text_delta(convo, item_id, &delta, annotation);
                None
            }
            StreamEvent::OutputItemAdded(item) => {
                apply_item_added(convo, item);
                None
            }
            StreamEvent::OutputItemDone(item) => apply_item_done(convo, item),
            StreamEvent::FunctionCallArgumentsDelta { item_id, delta } => {
                apply_arguments_delta(convo, &item_id, &delta);
                None
            }
            StreamEvent::FunctionCallArgumentsDone { item_id, arguments } => {
                apply_arguments_done(convo, &item_id, arguments);
                None
            }
            StreamEvent::WebSearchCallCompleted { item_id, output }
            | StreamEvent::FileSearchCallCompleted { item_id, output } => {
                apply_search_completed(convo, &item_id, output);
                None
            }
        }
    }

    /// Appends delta text to the accumulator for `item_id` and refreshes
    /// the displayed text of the matching assistant message.
    ///
    /// The displayed text is the accumulator truncated at the last
    /// follow-up marker; the truncation never discards accumulated raw
    /// text.
    fn apply_text_delta(
        &mut self,
        convo: &mut Conversation,
        item_id: String,
        delta: &str,
        annotation: Option<Value>,
    ) {
        let accum = self.text_accums.entry(item_id.clone()).or_default();
        accum.push_str(delta);
        let display = followup::display_text(accum).to_owned();

        // Mutate the last item only when it is an open assistant message
        // for this id; a fresh id always appends.
        match convo.transcript.last_mut() {
            Some(TranscriptItem::Message(message))
                if message.role == Role::Assistant
                    && message
                        .id
                        .as_deref()
                        .is_none_or(|id| id == item_id) =>
            {
                if let Some(part) = message.content.first_mut() {
                    if part.kind == ContentKind::OutputText {
                        part.text = display;
                        if let Some(annotation) = annotation {
                            part.annotations.push(annotation);
                        }
                    }
                }
            }
            _ => {
                let mut part = ContentPart::output_text(display);
                if let Some(annotation) = annotation {
                    part.annotations.push(annotation);
                }
                convo.transcript.push(TranscriptItem::Message(MessageItem {
                    id: Some(item_id),
                    role: Role::Assistant,
                    content: vec![part],
                }));
            }
        }
    }
}

fn apply_item_added(convo: &mut Conversation, item: OutputItem) {
    match item.detail {
        OutputItemDetail::Message { text, .. } => {
            convo.transcript.push(TranscriptItem::Message(MessageItem {
                id: item.id,
                role: Role::Assistant,
                content: vec![ContentPart::output_text(
                    text.unwrap_or_default(),
                )],
            }));
        }
        OutputItemDetail::FunctionCall {
            name, arguments, ..
        } => {
            // A call without an id can never be referenced again.
            let Some(id) = item.id else { return };
            let mut call = ToolCallItem::new(id, ToolType::FunctionCall);
            call.name = name;
            call.raw_arguments = arguments;
            convo.transcript.push(TranscriptItem::ToolCall(call));
        }
        OutputItemDetail::WebSearchCall { status } => {
            push_search_call(convo, item.id, ToolType::WebSearchCall, status);
        }
        OutputItemDetail::FileSearchCall { status } => {
            push_search_call(convo, item.id, ToolType::FileSearchCall, status);
        }
        OutputItemDetail::Other => {}
    }
}

fn push_search_call(
    convo: &mut Conversation,
    id: Option<String>,
    tool_type: ToolType,
    status: Option<String>,
) {
    let Some(id) = id else { return };
    let mut call = ToolCallItem::new(id, tool_type);
    call.status = ToolStatus::from_wire(status.as_deref());
    convo.transcript.push(TranscriptItem::ToolCall(call));
}

/// Finalizes an item: runs follow-up extraction on assistant messages,
/// back-fills tool call ids, and appends the raw item to the upstream
/// input exactly once per id.
fn apply_item_done(
    convo: &mut Conversation,
    item: OutputItem,
) -> Option<CompletedCall> {
    let OutputItem { id, detail, mut raw } = item;
    let id = id?;
    if convo.is_finalized(&id) {
        // A replayed finalization frame must not duplicate the upstream
        // entry, re-run the tool, or touch the transcript again.
        return None;
    }

    let mut completed = None;
    match detail {
        OutputItemDetail::Message { role, text } => {
            if role.as_deref() == Some("assistant") {
                if let Some(final_text) = text {
                    let (visible, questions) = followup::extract(&final_text);
                    // The upstream history sees the stripped text too.
                    rewrite_raw_text(&mut raw, visible, &questions);
                    if let Some(TranscriptItem::Message(message)) =
                        convo.transcript.find_mut(&id)
                    {
                        if let Some(part) = message.content.first_mut() {
                            part.text = visible.to_owned();
                            part.follow_up_questions = questions;
                        }
                    }
                }
            }
        }
        OutputItemDetail::FunctionCall { call_id, .. } => {
            if let Some(TranscriptItem::ToolCall(call)) =
                convo.transcript.find_mut(&id)
            {
                call.call_id = call_id;
                if call.tool_type == ToolType::FunctionCall
                    && call.status == ToolStatus::Completed
                {
                    completed = Some(CompletedCall {
                        item_id: id.clone(),
                        call_id: call.call_id.clone(),
                        name: call.name.clone(),
                        arguments: call.parsed_arguments.clone(),
                    });
                }
            }
        }
        OutputItemDetail::WebSearchCall { .. }
        | OutputItemDetail::FileSearchCall { .. }
        | OutputItemDetail::Other => {}
    }

    convo.push_finalized(&id, raw);
    completed
}

fn rewrite_raw_text(raw: &mut Value, visible: &str, questions: &[String]) {
    let Some(part) = raw
        .get_mut("content")
        .and_then(|content| content.get_mut(0))
        .and_then(Value::as_object_mut)
    else {
        return;
    };
    part.insert("text".to_owned(), Value::String(visible.to_owned()));
    part.insert(
        "followUpQuestions".to_owned(),
        questions.iter().cloned().map(Value::String).collect(),
    );
}

fn apply_arguments_delta(
    convo: &mut Conversation,
    item_id: &str,
    delta: &str,
) {
    let Some(TranscriptItem::ToolCall(call)) =
        convo.transcript.find_mut(item_id)
    else {
        return;
    };
    call.raw_arguments.push_str(delta);
    if call.raw_arguments.is_empty() {
        return;
    }
    // A failed speculative parse keeps the previous value; the caller
    // never observes a regression to an error state.
    if let Some(parsed) = parse_partial(&call.raw_arguments) {
        call.parsed_arguments = parsed;
    }
}

fn apply_arguments_done(
    convo: &mut Conversation,
    item_id: &str,
    arguments: String,
) {
    let Some(TranscriptItem::ToolCall(call)) =
        convo.transcript.find_mut(item_id)
    else {
        return;
    };
    match serde_json::from_str::<Value>(&arguments) {
        Ok(parsed) => {
            call.parsed_arguments = parsed;
            call.status = ToolStatus::Completed;
        }
        Err(err) => {
            warn!("final arguments for `{item_id}` are not valid JSON: {err}");
            call.status = ToolStatus::Failed;
        }
    }
    call.raw_arguments = arguments;
}

fn apply_search_completed(
    convo: &mut Conversation,
    item_id: &str,
    output: Option<String>,
) {
    let Some(TranscriptItem::ToolCall(call)) =
        convo.transcript.find_mut(item_id)
    else {
        return;
    };
    call.output = output;
    call.status = ToolStatus::Completed;
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn decode(event: &str, data: Value) -> StreamEvent {
        let payload = json!({ "event": event, "data": data }).to_string();
        StreamEvent::decode(&payload).unwrap().unwrap()
    }

    fn text_delta(item_id: &str, delta: &str) -> StreamEvent {
        decode(
            "response.output_text.delta",
            json!({ "item_id": item_id, "delta": delta }),
        )
    }

    #[test]
    fn test_text_deltas_accumulate_into_one_message() {
        let mut convo = Conversation::new();
        let mut rec = Reconstructor::new();
        for delta in ["Hel", "lo", " world"] {
            rec.apply(&mut convo, text_delta("msg:1", delta));
        }

        let items = convo.transcript().items();
        assert_eq!(items.len(), 1);
        let TranscriptItem::Message(message) = &items[0] else {
            panic!("expected a message");
        };
        assert_eq!(message.role, Role::Assistant);
        assert_eq!(message.content[0].text, "Hello world");
    }

    #[test]
    fn test_fresh_id_appends_instead_of_mutating() {
        let mut convo = Conversation::new();
        let mut rec = Reconstructor::new();
        rec.apply(&mut convo, text_delta("msg:1", "First"));
        rec.apply(&mut convo, text_delta("msg:2", "Second"));

        let items = convo.transcript().items();
        assert_eq!(items.len(), 2);
    }

    #[test]
    fn test_marker_is_hidden_during_streaming() {
        let mut convo = Conversation::new();
        let mut rec = Reconstructor::new();
        rec.apply(&mut convo, text_delta("msg:1", "Done. \nFollow-up"));
        rec.apply(&mut convo, text_delta("msg:1", " questions: [\"A?\""));

        let TranscriptItem::Message(message) =
            &convo.transcript().items()[0]
        else {
            panic!("expected a message");
        };
        assert_eq!(message.content[0].text, "Done.");
    }

    #[test]
    fn test_annotations_append_in_order() {
        let mut convo = Conversation::new();
        let mut rec = Reconstructor::new();
        rec.apply(&mut convo, text_delta("msg:1", "See: "));
        for n in [1, 2] {
            rec.apply(
                &mut convo,
                decode(
                    "response.output_text.annotation.added",
                    json!({ "item_id": "msg:1", "annotation": { "n": n } }),
                ),
            );
        }

        let TranscriptItem::Message(message) =
            &convo.transcript().items()[0]
        else {
            panic!("expected a message");
        };
        assert_eq!(
            message.content[0].annotations,
            vec![json!({ "n": 1 }), json!({ "n": 2 })]
        );
    }

    #[test]
    fn test_function_call_argument_streaming() {
        let mut convo = Conversation::new();
        let mut rec = Reconstructor::new();
        rec.apply(
            &mut convo,
            decode(
                "response.output_item.added",
                json!({
                    "item": {
                        "type": "function_call",
                        "id": "fc:1",
                        "name": "get_answer"
                    }
                }),
            ),
        );
        rec.apply(
            &mut convo,
            decode(
                "response.function_call_arguments.delta",
                json!({ "item_id": "fc:1", "delta": "{\"a\":1" }),
            ),
        );

        let TranscriptItem::ToolCall(call) = &convo.transcript().items()[0]
        else {
            panic!("expected a tool call");
        };
        assert_eq!(call.status, ToolStatus::InProgress);
        assert_eq!(call.raw_arguments, "{\"a\":1");
        assert_eq!(call.parsed_arguments, json!({ "a": 1 }));

        rec.apply(
            &mut convo,
            decode(
                "response.function_call_arguments.done",
                json!({ "item_id": "fc:1", "arguments": "{\"a\":1}" }),
            ),
        );
        let TranscriptItem::ToolCall(call) = &convo.transcript().items()[0]
        else {
            panic!("expected a tool call");
        };
        assert_eq!(call.status, ToolStatus::Completed);
        assert_eq!(call.parsed_arguments, json!({ "a": 1 }));
    }

    #[test]
    fn test_bad_final_arguments_fail_the_call() {
        let mut convo = Conversation::new();
        let mut rec = Reconstructor::new();
        rec.apply(
            &mut convo,
            decode(
                "response.output_item.added",
                json!({
                    "item": { "type": "function_call", "id": "fc:1" }
                }),
            ),
        );
        rec.apply(
            &mut convo,
            decode(
                "response.function_call_arguments.done",
                json!({ "item_id": "fc:1", "arguments": "{broken" }),
            ),
        );

        let TranscriptItem::ToolCall(call) = &convo.transcript().items()[0]
        else {
            panic!("expected a tool call");
        };
        assert_eq!(call.status, ToolStatus::Failed);
        assert_eq!(call.raw_arguments, "{broken");
    }

    #[test]
    fn test_partial_parse_failure_keeps_previous_value() {
        let mut convo = Conversation::new();
        let mut rec = Reconstructor::new();
        rec.apply(
            &mut convo,
            decode(
                "response.output_item.added",
                json!({
                    "item": { "type": "function_call", "id": "fc:1" }
                }),
            ),
        );
        rec.apply(
            &mut convo,
            decode(
                "response.function_call_arguments.delta",
                json!({ "item_id": "fc:1", "delta": "{\"a\":1" }),
            ),
        );
        // A fragment that is not a JSON prefix fails the speculative
        // parse; the previous best-effort value must survive.
        rec.apply(
            &mut convo,
            decode(
                "response.function_call_arguments.delta",
                json!({ "item_id": "fc:1", "delta": " %%" }),
            ),
        );
        let TranscriptItem::ToolCall(call) = &convo.transcript().items()[0]
        else {
            panic!("expected a tool call");
        };
        assert_eq!(call.parsed_arguments, json!({ "a": 1 }));
        assert_eq!(call.raw_arguments, "{\"a\":1 %%");
    }

    fn done_message(id: &str, text: &str) -> StreamEvent {
        decode(
            "response.output_item.done",
            json!({
                "item": {
                    "type": "message",
                    "id": id,
                    "role": "assistant",
                    "content": [{ "type": "output_text", "text": text }]
                }
            }),
        )
    }

    #[test]
    fn test_done_extracts_follow_ups_and_rewrites_raw() {
        let mut convo = Conversation::new();
        let mut rec = Reconstructor::new();
        rec.apply(&mut convo, text_delta("msg:1", "The answer."));
        rec.apply(
            &mut convo,
            done_message(
                "msg:1",
                "The answer.\nFollow-up questions: [\"A?\", \"B?\"]",
            ),
        );

        let TranscriptItem::Message(message) =
            &convo.transcript().items()[0]
        else {
            panic!("expected a message");
        };
        assert_eq!(message.content[0].text, "The answer.");
        assert_eq!(
            message.content[0].follow_up_questions,
            vec!["A?".to_owned(), "B?".to_owned()]
        );

        // The forwarded raw item carries the stripped text.
        let items = convo.request_items("p");
        let value = serde_json::to_value(&items).unwrap();
        assert_eq!(value[1]["content"][0]["text"], "The answer.");
        assert_eq!(
            value[1]["content"][0]["followUpQuestions"],
            json!(["A?", "B?"])
        );
    }

    #[test]
    fn test_done_replay_is_idempotent() {
        let mut convo = Conversation::new();
        let mut rec = Reconstructor::new();
        rec.apply(&mut convo, text_delta("msg:1", "Hi"));
        rec.apply(&mut convo, done_message("msg:1", "Hi"));
        rec.apply(&mut convo, done_message("msg:1", "Hi"));

        assert_eq!(convo.transcript().len(), 1);
        // Developer prompt + the single finalized item.
        assert_eq!(convo.request_items("p").len(), 2);
    }

    #[test]
    fn test_completed_function_call_is_handed_off() {
        let mut convo = Conversation::new();
        let mut rec = Reconstructor::new();
        rec.apply(
            &mut convo,
            decode(
                "response.output_item.added",
                json!({
                    "item": {
                        "type": "function_call",
                        "id": "fc:1",
                        "name": "get_answer"
                    }
                }),
            ),
        );
        rec.apply(
            &mut convo,
            decode(
                "response.function_call_arguments.done",
                json!({ "item_id": "fc:1", "arguments": "{\"a\":1}" }),
            ),
        );
        let completed = rec.apply(
            &mut convo,
            decode(
                "response.output_item.done",
                json!({
                    "item": {
                        "type": "function_call",
                        "id": "fc:1",
                        "call_id": "call:1"
                    }
                }),
            ),
        );

        let completed = completed.unwrap();
        assert_eq!(completed.item_id, "fc:1");
        assert_eq!(completed.call_id.as_deref(), Some("call:1"));
        assert_eq!(completed.name.as_deref(), Some("get_answer"));
        assert_eq!(completed.arguments, json!({ "a": 1 }));
    }

    #[test]
    fn test_failed_function_call_is_not_handed_off() {
        let mut convo = Conversation::new();
        let mut rec = Reconstructor::new();
        rec.apply(
            &mut convo,
            decode(
                "response.output_item.added",
                json!({
                    "item": { "type": "function_call", "id": "fc:1" }
                }),
            ),
        );
        rec.apply(
            &mut convo,
            decode(
                "response.function_call_arguments.done",
                json!({ "item_id": "fc:1", "arguments": "{broken" }),
            ),
        );
        let completed = rec.apply(
            &mut convo,
            decode(
                "response.output_item.done",
                json!({
                    "item": { "type": "function_call", "id": "fc:1" }
                }),
            ),
        );
        assert!(completed.is_none());
        // The raw item still joins the upstream input.
        assert_eq!(convo.request_items("p").len(), 2);
    }

    #[test]
    fn test_web_search_lifecycle() {
        let mut convo = Conversation::new();
        let mut rec = Reconstructor::new();
        rec.apply(
            &mut convo,
            decode(
                "response.output_item.added",
                json!({
                    "item": { "type": "web_search_call", "id": "ws:1" }
                }),
            ),
        );
        rec.apply(
            &mut convo,
            decode(
                "response.web_search_call.completed",
                json!({ "item_id": "ws:1", "output": "results" }),
            ),
        );

        let TranscriptItem::ToolCall(call) = &convo.transcript().items()[0]
        else {
            panic!("expected a tool call");
        };
        assert_eq!(call.tool_type, ToolType::WebSearchCall);
        assert_eq!(call.status, ToolStatus::Completed);
        assert_eq!(call.output.as_deref(), Some("results"));
    }
}
