//! Extraction of the follow-up questions embedded in assistant text.
//!
//! The model is prompted to end its answer with a JSON array of suggested
//! questions prefixed by a literal marker. Finalized text is split into
//! the visible answer and the parsed array; while text is still
//! streaming, everything from the marker on is hidden from display.

/// The literal marker that precedes an embedded follow-up-questions
/// array.
pub const FOLLOW_UP_MARKER: &str = "Follow-up questions: ";

/// Splits finalized assistant text into the visible answer and the
/// embedded follow-up questions.
///
/// The payload must be a JSON array of strings between the first `[` and
/// the last `]` after the last marker occurrence. Anything malformed
/// degrades to the full text with no questions; this function never
/// fails and never partially applies.
pub(crate) fn extract(text: &str) -> (&str, Vec<String>) {
    let Some(marker_idx) = text.rfind(FOLLOW_UP_MARKER) else {
        return (text, Vec::new());
    };
    let tail = &text[marker_idx + FOLLOW_UP_MARKER.len()..];
    let (Some(start), Some(end)) = (tail.find('['), tail.rfind(']')) else {
        return (text, Vec::new());
    };
    if end <= start {
        return (text, Vec::new());
    }
    let Ok(questions) = serde_json::from_str::<Vec<String>>(&tail[start..=end])
    else {
        return (text, Vec::new());
    };
    (text[..marker_idx].trim(), questions)
}

/// Truncates streaming text at the last marker occurrence.
///
/// The truncation is display-only; callers keep accumulating the raw
/// text and run [`extract`] on the finalized value.
pub(crate) fn display_text(text: &str) -> &str {
    match text.rfind(FOLLOW_UP_MARKER) {
        Some(idx) => text[..idx].trim(),
        None => text,
    }
}
