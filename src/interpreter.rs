//! Best-effort extraction of results from free-form script output.
//!
//! Scripts are opaque; the only contract is a pair of text conventions:
//!
//! | Convention     | Recognised as                                        |
//! |----------------|------------------------------------------------------|
//! | `Answer:`      | Everything after the first occurrence on the line    |
//! | `chat_history` | A JSON array of `{role, content}` objects that starts |
//! |                | on the marker line and may continue on later lines   |
//!
//! Both scans are pure functions of the log so far. They never fail; anything
//! that does not fit the convention yields `None`.

use serde_json::Value;
use tracing::debug;

use crate::models::transcript::{ChatTurn, Speaker};

/// Token introducing the final answer.
pub const ANSWER_MARKER: &str = "Answer:";

/// Token introducing the embedded chat transcript.
pub const TRANSCRIPT_MARKER: &str = "chat_history";

/// Lines after the marker line that may carry the rest of the JSON array.
pub const TRANSCRIPT_SPAN: usize = 9;

/// Return the trimmed text following `Answer:` on the first line carrying it.
#[must_use]
pub fn extract_answer<S: AsRef<str>>(lines: &[S]) -> Option<String> {
    lines.iter().find_map(|line| {
        line.as_ref()
            .split_once(ANSWER_MARKER)
            .map(|(_, rest)| rest.trim().to_owned())
    })
}

/// Reconstruct the chat transcript from the first `chat_history` line that
/// opens a JSON array after the marker. Brackets before the marker, such as
/// a `[INFO]` level prefix, are not part of the array.
///
/// The array may be split across the marker line and up to
/// [`TRANSCRIPT_SPAN`] following lines. Text after the closing bracket is
/// ignored. Elements without both `role` and `content` are skipped.
#[must_use]
pub fn extract_chat_history<S: AsRef<str>>(lines: &[S]) -> Option<Vec<ChatTurn>> {
    let (index, start) = lines.iter().enumerate().find_map(|(i, line)| {
        let line = line.as_ref();
        let marker = line.find(TRANSCRIPT_MARKER)?;
        let after = marker + TRANSCRIPT_MARKER.len();
        line[after..].find('[').map(|pos| (i, after + pos))
    })?;

    let mut fragment = lines[index].as_ref()[start..].trim_end().to_owned();
    let mut following = lines.iter().skip(index + 1).take(TRANSCRIPT_SPAN);

    loop {
        match parse_array_prefix(&fragment) {
            Ok(items) => return Some(items.iter().filter_map(to_turn).collect()),
            Err(err) if err.is_eof() => {
                let next = following.next()?;
                fragment.push('\n');
                fragment.push_str(next.as_ref().trim_end());
            }
            Err(err) => {
                debug!(%err, "chat_history fragment is not a JSON array, ignoring");
                return None;
            }
        }
    }
}

/// Parse the JSON array at the start of `fragment`, ignoring trailing text.
fn parse_array_prefix(fragment: &str) -> Result<Vec<Value>, serde_json::Error> {
    serde_json::Deserializer::from_str(fragment)
        .into_iter::<Vec<Value>>()
        .next()
        .unwrap_or_else(|| Ok(Vec::new()))
}

fn to_turn(item: &Value) -> Option<ChatTurn> {
    let role = item.get("role")?;
    let content = item.get("content")?;
    let speaker = Speaker::from_role(role.as_str().unwrap_or_default());
    let content = match content {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    };
    Some(ChatTurn { speaker, content })
}
