//! Unit tests for answer and transcript extraction from script output.

use agent_console::interpreter::{extract_answer, extract_chat_history, TRANSCRIPT_SPAN};
use agent_console::models::transcript::Speaker;

#[test]
fn answer_is_taken_from_first_marker_line() {
    let lines = [
        "starting agent",
        "Final Answer: Paris ",
        "Answer: ignored",
    ];
    assert_eq!(extract_answer(&lines).as_deref(), Some("Paris"));
}

#[test]
fn answer_is_absent_without_marker() {
    let lines = ["step 1", "step 2"];
    assert_eq!(extract_answer(&lines), None);
}

#[test]
fn empty_answer_text_is_an_empty_string() {
    let lines = ["Answer:   "];
    assert_eq!(extract_answer(&lines).as_deref(), Some(""));
}

#[test]
fn single_line_transcript_is_parsed() {
    let lines = [r#"chat_history: [{"role":"user","content":"Q"},{"role":"assistant","content":"A"}]"#];
    let turns = extract_chat_history(&lines).expect("transcript");

    assert_eq!(turns.len(), 2);
    assert_eq!(turns[0].speaker, Speaker::User);
    assert_eq!(turns[0].content, "Q");
    assert_eq!(turns[1].speaker, Speaker::Assistant);
    assert_eq!(turns[1].content, "A");
}

#[test]
fn transcript_split_across_lines_is_reassembled() {
    let lines = [
        "chat_history: [",
        r#"  {"role": "user", "content": "Q"},"#,
        r#"  {"role": "assistant", "content": "A"}"#,
        "]",
        "done",
    ];
    let turns = extract_chat_history(&lines).expect("transcript");
    assert_eq!(turns.len(), 2);
    assert_eq!(turns[1].content, "A");
}

#[test]
fn non_user_roles_map_to_assistant() {
    let lines = [r#"chat_history=[{"role":"system","content":"s"},{"role":"tool","content":"t"}]"#];
    let turns = extract_chat_history(&lines).expect("transcript");
    assert!(turns.iter().all(|t| t.speaker == Speaker::Assistant));
}

#[test]
fn bracketed_log_prefix_before_marker_is_ignored() {
    let lines = [r#"[INFO] chat_history: [{"role":"user","content":"Q"}]"#];
    let turns = extract_chat_history(&lines).expect("transcript");
    assert_eq!(turns.len(), 1);
    assert_eq!(turns[0].content, "Q");

    let lines = [r#"[2024-01-01 10:00:00] [agent] chat_history=[{"role":"assistant","content":"A"}]"#];
    let turns = extract_chat_history(&lines).expect("transcript");
    assert_eq!(turns[0].speaker, Speaker::Assistant);
}

#[test]
fn prefixed_marker_with_split_array_is_reassembled() {
    let lines = [
        "[DEBUG] chat_history: [",
        r#"  {"role": "user", "content": "Q"}"#,
        "]",
    ];
    let turns = extract_chat_history(&lines).expect("transcript");
    assert_eq!(turns.len(), 1);
    assert_eq!(turns[0].speaker, Speaker::User);
}

#[test]
fn bracket_only_before_marker_is_absent() {
    let lines = ["[INFO] chat_history pending"];
    assert_eq!(extract_chat_history(&lines), None);
}

#[test]
fn items_missing_fields_are_skipped() {
    let lines = [r#"chat_history: [{"role":"user"},{"content":"x"},{"role":"user","content":"kept"}]"#];
    let turns = extract_chat_history(&lines).expect("transcript");
    assert_eq!(turns.len(), 1);
    assert_eq!(turns[0].content, "kept");
}

#[test]
fn array_spanning_more_than_the_window_is_absent() {
    let mut lines = vec!["chat_history: [".to_owned()];
    for i in 0..=TRANSCRIPT_SPAN {
        lines.push(format!(r#"{{"role":"user","content":"{i}"}},"#));
    }
    lines.push(r#"{"role":"user","content":"last"}]"#.to_owned());
    assert_eq!(extract_chat_history(&lines), None);
}

#[test]
fn array_closing_within_the_window_is_present() {
    let mut lines = vec!["chat_history: [".to_owned()];
    for i in 0..TRANSCRIPT_SPAN - 1 {
        lines.push(format!(r#"{{"role":"user","content":"{i}"}},"#));
    }
    lines.push(r#"{"role":"user","content":"last"}]"#.to_owned());
    assert_eq!(lines.len(), TRANSCRIPT_SPAN + 1);

    let turns = extract_chat_history(&lines).expect("transcript");
    assert_eq!(turns.len(), TRANSCRIPT_SPAN);
}

#[test]
fn invalid_json_is_absent() {
    let lines = ["chat_history: [not json]"];
    assert_eq!(extract_chat_history(&lines), None);
}

#[test]
fn missing_marker_is_absent() {
    let lines = [r#"[{"role":"user","content":"Q"}]"#];
    assert_eq!(extract_chat_history(&lines), None);
}

#[test]
fn extraction_is_stable_as_the_log_grows() {
    let mut lines = vec!["Answer: 42".to_owned()];
    let first = extract_answer(&lines);
    lines.push("Answer: 43".to_owned());
    assert_eq!(extract_answer(&lines), first);
}
