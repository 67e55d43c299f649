use serde::Serialize;
use serde_json::Value;

/// A request for one conversation turn.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TurnRequest {
    /// The flattened conversation input.
    pub messages: Vec<InputItem>,
    /// Tools that are available to the model.
    pub tools: Vec<ToolSpec>,
}

/// One entry of the flattened conversation input sent upstream.
///
/// Only finalized items contribute entries; partially-streamed items live
/// in the transcript alone.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum InputItem {
    /// A plain role-tagged text message.
    Text(TextInput),
    /// A finalized output item from a previous turn, forwarded verbatim.
    Item(Value),
    /// The result of a local function call.
    FunctionCallOutput(FunctionCallOutput),
}

/// A plain role-tagged text message.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
pub struct TextInput {
    /// The role this text is attributed to.
    pub role: TextRole,
    /// The message body.
    pub content: String,
}

/// Roles a [`TextInput`] can carry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TextRole {
    /// The developer prompt pseudo-item prepended to every request.
    Developer,
    /// End-user input.
    User,
}

/// The serialized result of a local function call, keyed by the
/// server-assigned call id.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
pub struct FunctionCallOutput {
    r#type: &'static str,
    /// The call id this output answers.
    pub call_id: String,
    status: &'static str,
    /// The serialized tool result.
    pub output: String,
}

impl FunctionCallOutput {
    /// Creates a completed function call output entry.
    #[inline]
    pub fn new<S1: Into<String>, S2: Into<String>>(
        call_id: S1,
        output: S2,
    ) -> Self {
        Self {
            r#type: "function_call_output",
            call_id: call_id.into(),
            status: "completed",
            output: output.into(),
        }
    }
}

/// Describes a function tool offered to the model.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ToolSpec {
    r#type: &'static str,
    /// Name of the tool.
    pub name: String,
    /// Description of the tool.
    pub description: String,
    /// Parameters definition of the tool.
    ///
    /// The parameters should typically be defined by a
    /// [JSON schema](https://json-schema.org/).
    pub parameters: Value,
}

impl ToolSpec {
    /// Creates a function tool entry.
    #[inline]
    pub fn function<S1: Into<String>, S2: Into<String>>(
        name: S1,
        description: S2,
        parameters: Value,
    ) -> Self {
        Self {
            r#type: "function",
            name: name.into(),
            description: description.into(),
            parameters,
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_serialize_request() {
        let request = TurnRequest {
            messages: vec![
                InputItem::Text(TextInput {
                    role: TextRole::Developer,
                    content: "Be helpful.".to_owned(),
                }),
                InputItem::Text(TextInput {
                    role: TextRole::User,
                    content: "Hello".to_owned(),
                }),
                InputItem::FunctionCallOutput(FunctionCallOutput::new(
                    "call:1", "42",
                )),
            ],
            tools: vec![ToolSpec::function(
                "get_answer",
                "Returns the answer.",
                json!({ "type": "object", "properties": {} }),
            )],
        };

        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(
            value,
            json!({
                "messages": [
                    { "role": "developer", "content": "Be helpful." },
                    { "role": "user", "content": "Hello" },
                    {
                        "type": "function_call_output",
                        "call_id": "call:1",
                        "status": "completed",
                        "output": "42"
                    }
                ],
                "tools": [{
                    "type": "function",
                    "name": "get_answer",
                    "description": "Returns the answer.",
                    "parameters": { "type": "object", "properties": {} }
                }]
            })
        );
    }

    #[test]
    fn test_raw_item_passes_through() {
        let raw = json!({
            "type": "message",
            "id": "msg:1",
            "role": "assistant",
            "content": [{ "type": "output_text", "text": "Hi" }]
        });
        let item = InputItem::Item(raw.clone());
        assert_eq!(serde_json::to_value(&item).unwrap(), raw);
    }
}
