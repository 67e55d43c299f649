use std::fmt::{self, Display};

use serde::Deserialize;
use serde_json::Value;

/// Error produced when a frame payload cannot be decoded into a
/// [`StreamEvent`].
#[derive(Debug)]
pub struct DecodeError {
    message: String,
}

impl DecodeError {
    fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for DecodeError {}

impl From<serde_json::Error> for DecodeError {
    fn from(err: serde_json::Error) -> Self {
        Self::new(format!("{err}"))
    }
}

/// A typed stream event, decoded and shape-validated at the frame
/// boundary.
///
/// Every variant corresponds to one upstream event name; event kinds this
/// client does not handle decode to `None` and are no-ops.
#[derive(Clone, Debug, PartialEq)]
pub enum StreamEvent {
    /// `response.output_text.delta` and
    /// `response.output_text.annotation.added`.
    OutputTextDelta {
        /// The id of the item this delta belongs to.
        item_id: String,
        /// The appended text, empty when the frame carries none.
        delta: String,
        /// An annotation attached by this frame, if any.
        annotation: Option<Value>,
    },
    /// `response.output_item.added`.
    OutputItemAdded(OutputItem),
    /// `response.output_item.done`.
    OutputItemDone(OutputItem),
    /// `response.function_call_arguments.delta`.
    FunctionCallArgumentsDelta {
        /// The id of the function call item.
        item_id: String,
        /// The appended arguments fragment, empty when absent.
        delta: String,
    },
    /// `response.function_call_arguments.done`.
    FunctionCallArgumentsDone {
        /// The id of the function call item.
        item_id: String,
        /// The authoritative final arguments string.
        arguments: String,
    },
    /// `response.web_search_call.completed`.
    WebSearchCallCompleted {
        /// The id of the search call item.
        item_id: String,
        /// The search output, if any.
        output: Option<String>,
    },
    /// `response.file_search_call.completed`.
    FileSearchCallCompleted {
        /// The id of the search call item.
        item_id: String,
        /// The search output, if any.
        output: Option<String>,
    },
}

/// An output item as carried by `output_item.added` / `output_item.done`
/// frames.
///
/// The raw value is retained verbatim so finalized items can be forwarded
/// upstream unchanged.
#[derive(Clone, Debug, PartialEq)]
pub struct OutputItem {
    /// Server-assigned identifier, absent on some partial items.
    pub id: Option<String>,
    /// The shape-validated view used for dispatch.
    pub detail: OutputItemDetail,
    /// The item value exactly as received.
    pub raw: Value,
}

/// Shape-validated view of an output item.
#[derive(Clone, Debug, PartialEq)]
pub enum OutputItemDetail {
    /// A `message` item.
    Message {
        /// The role carried by the item, if any.
        role: Option<String>,
        /// Text of the first output-text content part. `None` when the
        /// item carries no such part.
        text: Option<String>,
    },
    /// A `function_call` item.
    FunctionCall {
        /// The tool name, if present.
        name: Option<String>,
        /// The server-assigned call id, if present.
        call_id: Option<String>,
        /// The initial arguments fragment carried by the item.
        arguments: String,
        /// The item status string, if present.
        status: Option<String>,
    },
    /// A `web_search_call` item.
    WebSearchCall {
        /// The item status string, if present.
        status: Option<String>,
    },
    /// A `file_search_call` item.
    FileSearchCall {
        /// The item status string, if present.
        status: Option<String>,
    },
    /// Any other item type. Finalized entries are still forwarded
    /// upstream verbatim.
    Other,
}

#[derive(Deserialize)]
struct Envelope {
    event: String,
    #[serde(default)]
    data: Value,
}

#[derive(Deserialize)]
struct TextDeltaData {
    item_id: String,
    #[serde(default)]
    delta: Option<Value>,
    #[serde(default)]
    annotation: Option<Value>,
}

#[derive(Deserialize)]
struct ItemData {
    #[serde(default)]
    item: Option<Value>,
}

#[derive(Deserialize)]
struct ArgumentsDeltaData {
    item_id: String,
    #[serde(default)]
    delta: Option<String>,
}

#[derive(Deserialize)]
struct ArgumentsDoneData {
    item_id: String,
    arguments: String,
}

#[derive(Deserialize)]
struct SearchCompletedData {
    item_id: String,
    #[serde(default)]
    output: Option<String>,
}

impl StreamEvent {
    /// Decodes one frame payload into a typed event.
    ///
    /// Returns `Ok(None)` for event kinds this client does not handle,
    /// and for item frames missing the fields required to track them.
    /// Payloads that are not a well-formed envelope, or whose required
    /// fields have the wrong shape, are a [`DecodeError`].
    pub fn decode(payload: &str) -> Result<Option<Self>, DecodeError> {
        let envelope: Envelope = serde_json::from_str(payload)?;
        let data = envelope.data;
        let event = match envelope.event.as_str() {
            "response.output_text.delta"
            | "response.output_text.annotation.added" => {
                let data: TextDeltaData = serde_json::from_value(data)?;
                // Non-string deltas contribute no text, as in frames that
                // only carry an annotation.
                let delta = data
                    .delta
                    .as_ref()
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_owned();
                StreamEvent::OutputTextDelta {
                    item_id: data.item_id,
                    delta,
                    annotation: data.annotation,
                }
            }
            "response.output_item.added" => {
                let data: ItemData = serde_json::from_value(data)?;
                let Some(item) = data.item.and_then(decode_item) else {
                    return Ok(None);
                };
                StreamEvent::OutputItemAdded(item)
            }
            "response.output_item.done" => {
                let data: ItemData = serde_json::from_value(data)?;
                let Some(item) = data.item.and_then(decode_item) else {
                    return Ok(None);
                };
                StreamEvent::OutputItemDone(item)
            }
            "response.function_call_arguments.delta" => {
                let data: ArgumentsDeltaData = serde_json::from_value(data)?;
                StreamEvent::FunctionCallArgumentsDelta {
                    item_id: data.item_id,
                    delta: data.delta.unwrap_or_default(),
                }
            }
            "response.function_call_arguments.done" => {
                let data: ArgumentsDoneData = serde_json::from_value(data)?;
                StreamEvent::FunctionCallArgumentsDone {
                    item_id: data.item_id,
                    arguments: data.arguments,
                }
            }
            "response.web_search_call.completed" => {
                let data: SearchCompletedData = serde_json::from_value(data)?;
                StreamEvent::WebSearchCallCompleted {
                    item_id: data.item_id,
                    output: data.output,
                }
            }
            "response.file_search_call.completed" => {
                let data: SearchCompletedData = serde_json::from_value(data)?;
                StreamEvent::FileSearchCallCompleted {
                    item_id: data.item_id,
                    output: data.output,
                }
            }
            _ => return Ok(None),
        };
        Ok(Some(event))
    }

    /// Whether this event counts as the first meaningful sign of a reply.
    ///
    /// The turn driver clears its waiting flag on the first event for
    /// which this returns `true`.
    #[inline]
    pub fn is_reply_signal(&self) -> bool {
        matches!(
            self,
            StreamEvent::OutputTextDelta { .. }
                | StreamEvent::OutputItemAdded(_)
                | StreamEvent::FunctionCallArgumentsDelta { .. }
                | StreamEvent::FunctionCallArgumentsDone { .. }
        )
    }
}

fn decode_item(raw: Value) -> Option<OutputItem> {
    let id = raw
        .get("id")
        .and_then(Value::as_str)
        .map(str::to_owned);
    let detail = match raw.get("type").and_then(Value::as_str) {
        Some("message") => OutputItemDetail::Message {
            role: raw
                .get("role")
                .and_then(Value::as_str)
                .map(str::to_owned),
            text: message_text(&raw),
        },
        Some("function_call") => OutputItemDetail::FunctionCall {
            name: raw
                .get("name")
                .and_then(Value::as_str)
                .map(str::to_owned),
            call_id: raw
                .get("call_id")
                .and_then(Value::as_str)
                .map(str::to_owned),
            arguments: raw
                .get("arguments")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_owned(),
            status: item_status(&raw),
        },
        Some("web_search_call") => OutputItemDetail::WebSearchCall {
            status: item_status(&raw),
        },
        Some("file_search_call") => OutputItemDetail::FileSearchCall {
            status: item_status(&raw),
        },
        _ => OutputItemDetail::Other,
    };
    // An item with neither an id nor a recognized type cannot be
    // tracked or forwarded; drop the frame.
    if id.is_none() && matches!(detail, OutputItemDetail::Other) {
        return None;
    }
    Some(OutputItem { id, detail, raw })
}

fn item_status(raw: &Value) -> Option<String> {
    raw.get("status")
        .and_then(Value::as_str)
        .map(str::to_owned)
}

/// Extracts the text of an item's first output-text content part.
///
/// Partial `added` items carry `content` as an object with a `text`
/// field; finalized `done` items carry an array of content parts.
fn message_text(raw: &Value) -> Option<String> {
    let content = raw.get("content")?;
    if let Some(parts) = content.as_array() {
        let first = parts.first()?;
        if first.get("type").and_then(Value::as_str) != Some("output_text") {
            return None;
        }
        return Some(
            first
                .get("text")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_owned(),
        );
    }
    content
        .get("text")
        .and_then(Value::as_str)
        .map(str::to_owned)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn decode(event: &str, data: Value) -> Option<StreamEvent> {
        let payload = json!({ "event": event, "data": data }).to_string();
        StreamEvent::decode(&payload).unwrap()
    }

    #[test]
    fn test_decode_text_delta() {
        let event = decode(
            "response.output_text.delta",
            json!({ "item_id": "msg:1", "delta": "Hel" }),
        )
        .unwrap();
        assert_eq!(
            event,
            StreamEvent::OutputTextDelta {
                item_id: "msg:1".to_owned(),
                delta: "Hel".to_owned(),
                annotation: None,
            }
        );
        assert!(event.is_reply_signal());
    }

    #[test]
    fn test_decode_annotation_without_delta() {
        let event = decode(
            "response.output_text.annotation.added",
            json!({ "item_id": "msg:1", "annotation": { "url": "x" } }),
        )
        .unwrap();
        let StreamEvent::OutputTextDelta {
            delta, annotation, ..
        } = event
        else {
            panic!("unexpected event");
        };
        assert_eq!(delta, "");
        assert_eq!(annotation, Some(json!({ "url": "x" })));
    }

    #[test]
    fn test_decode_function_call_item() {
        let event = decode(
            "response.output_item.added",
            json!({
                "item": {
                    "type": "function_call",
                    "id": "fc:1",
                    "name": "get_weather",
                    "arguments": "{\"ci"
                }
            }),
        )
        .unwrap();
        let StreamEvent::OutputItemAdded(item) = event else {
            panic!("unexpected event");
        };
        assert_eq!(item.id.as_deref(), Some("fc:1"));
        assert_eq!(
            item.detail,
            OutputItemDetail::FunctionCall {
                name: Some("get_weather".to_owned()),
                call_id: None,
                arguments: "{\"ci".to_owned(),
                status: None,
            }
        );
    }

    #[test]
    fn test_decode_done_message_text() {
        let event = decode(
            "response.output_item.done",
            json!({
                "item": {
                    "type": "message",
                    "id": "msg:1",
                    "role": "assistant",
                    "content": [
                        { "type": "output_text", "text": "All done." }
                    ]
                }
            }),
        )
        .unwrap();
        let StreamEvent::OutputItemDone(item) = event else {
            panic!("unexpected event");
        };
        assert_eq!(
            item.detail,
            OutputItemDetail::Message {
                role: Some("assistant".to_owned()),
                text: Some("All done.".to_owned()),
            }
        );
        assert!(!StreamEvent::OutputItemDone(item).is_reply_signal());
    }

    #[test]
    fn test_unknown_event_is_noop() {
        assert_eq!(decode("response.created", json!({})), None);
    }

    #[test]
    fn test_item_frame_without_item_is_noop() {
        assert_eq!(decode("response.output_item.added", json!({})), None);
    }

    #[test]
    fn test_malformed_payload_is_error() {
        assert!(StreamEvent::decode("not json").is_err());
        // A delta frame without its item id has the wrong shape.
        let payload = json!({
            "event": "response.output_text.delta",
            "data": { "delta": "x" }
        })
        .to_string();
        assert!(StreamEvent::decode(&payload).is_err());
    }
}
