//! Response post-processing: directive extraction from final model text.
//!
//! Two inline markers are recognised:
//!
//! - `CREATE_KEEPSAKE: <text>` captures until the next marker or the end of
//!   the reply, trimmed. The last one wins.
//! - `UPDATE_STATE: {...}` takes exactly one JSON object literal. Every
//!   occurrence applies, in text order.
//!
//! Markers are always removed from the visible text, including broken ones.
//! The scan runs left to right, so a marker inside a consumed JSON value is
//! part of that value and not a directive of its own.

use luminous_core::error::DirectiveError;
use luminous_core::state::{InternalState, MergeReport};
use serde_json::{Map, Value};

use crate::directive::{CREATE_KEEPSAKE_MARKER, UPDATE_STATE_MARKER};

/// The result of scanning one reply.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Processed {
    /// Reply text with every directive removed
    pub text: String,
    /// State updates in the order they appeared
    pub state_deltas: Vec<Map<String, Value>>,
    /// The last keepsake in the reply, if any
    pub keepsake: Option<String>,
    /// Log lines for directives that could not be used
    pub log: Vec<String>,
}

/// What applying a [`Processed`] reply changed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Applied {
    pub state: MergeReport,
    pub keepsake: Option<String>,
}

impl Processed {
    /// Fold the directives into state and keepsake, keepsake first.
    ///
    /// Returns what changed; log lines describing it are appended to `log`.
    pub fn apply(
        &self,
        state: &mut InternalState,
        keepsake: &mut Option<String>,
        log: &mut Vec<String>,
    ) -> Applied {
        let mut applied = Applied::default();

        if let Some(new) = &self.keepsake {
            *keepsake = Some(new.clone());
            applied.keepsake = Some(new.clone());
            log.push("Keepsake updated.".to_string());
        }

        for delta in &self.state_deltas {
            let report = state.merge(delta);
            if !report.applied.is_empty() {
                log.push(format!("State updated: {}", report.applied.join(", ")));
            }
            for rejected in &report.rejected {
                log.push(format!(
                    "State field '{}' ignored: {}",
                    rejected.key, rejected.reason
                ));
            }
            applied.state.applied.extend(report.applied);
            applied.state.rejected.extend(report.rejected);
        }

        applied
    }
}

#[derive(Clone, Copy, PartialEq)]
enum Marker {
    Keepsake,
    State,
}

/// Position and kind of the first marker at or after `from`.
fn next_marker(text: &str, from: usize) -> Option<(usize, Marker)> {
    let rest = &text[from..];
    let keepsake = rest.find(CREATE_KEEPSAKE_MARKER).map(|i| (i, Marker::Keepsake));
    let state = rest.find(UPDATE_STATE_MARKER).map(|i| (i, Marker::State));
    let first = match (keepsake, state) {
        (Some(k), Some(s)) => Some(if k.0 < s.0 { k } else { s }),
        (k, s) => k.or(s),
    };
    first.map(|(i, m)| (from + i, m))
}

/// Scan a raw model reply for directives.
pub fn process(raw: &str) -> Processed {
    let mut out = Processed::default();
    let mut visible = String::with_capacity(raw.len());
    let mut cursor = 0;

    while let Some((start, marker)) = next_marker(raw, cursor) {
        visible.push_str(&raw[cursor..start]);

        match marker {
            Marker::Keepsake => {
                let body_start = start + CREATE_KEEPSAKE_MARKER.len();
                let end = next_marker(raw, body_start).map_or(raw.len(), |(i, _)| i);
                let text = raw[body_start..end].trim();
                if text.is_empty() {
                    out.log.push("Empty CREATE_KEEPSAKE ignored.".to_string());
                } else {
                    out.keepsake = Some(text.to_string());
                }
                cursor = end;
            }
            Marker::State => {
                let body_start = start + UPDATE_STATE_MARKER.len();
                cursor = read_state(raw, body_start, &mut out);
            }
        }
    }
    visible.push_str(&raw[cursor..]);

    out.text = tidy(&visible);
    out
}

/// Read the JSON object after an `UPDATE_STATE:` marker. Returns where the
/// visible text resumes.
fn read_state(raw: &str, body_start: usize, out: &mut Processed) -> usize {
    let leading = raw[body_start..].len() - raw[body_start..].trim_start().len();
    let value_start = body_start + leading;
    let fallback = next_marker(raw, value_start).map_or(raw.len(), |(i, _)| i);

    let mut stream = serde_json::Deserializer::from_str(&raw[value_start..]).into_iter::<Value>();
    match stream.next() {
        Some(Ok(Value::Object(map))) => {
            out.state_deltas.push(map);
            value_start + stream.byte_offset()
        }
        Some(Ok(other)) => {
            let err = DirectiveError::StateParse(format!(
                "expected a JSON object, found {}",
                kind_of(&other)
            ));
            out.log.push(err.to_string());
            value_start + stream.byte_offset()
        }
        Some(Err(e)) => {
            out.log.push(DirectiveError::StateParse(e.to_string()).to_string());
            match balanced_end(&raw[value_start..]) {
                Some(len) if value_start + len <= fallback => value_start + len,
                _ => fallback,
            }
        }
        None => {
            out.log
                .push(DirectiveError::StateParse("missing JSON object".into()).to_string());
            fallback
        }
    }
}

/// Length of a brace-delimited value at the start of `text`, if its braces
/// balance. String contents are skipped.
fn balanced_end(text: &str) -> Option<usize> {
    if !text.starts_with('{') {
        return None;
    }
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (i, c) in text.char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(i + 1);
                }
            }
            _ => {}
        }
    }
    None
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Trim trailing spaces on each line, collapse runs of blank lines, trim ends.
fn tidy(text: &str) -> String {
    let mut lines: Vec<&str> = Vec::new();
    for line in text.lines().map(str::trim_end) {
        if line.is_empty() && lines.last().is_some_and(|l| l.is_empty()) {
            continue;
        }
        lines.push(line);
    }
    lines.join("\n").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use luminous_core::state::Dimension;
    use serde_json::json;

    #[test]
    fn plain_text_passes_through() {
        let out = process("Hello there.\n");
        assert_eq!(out.text, "Hello there.");
        assert!(out.state_deltas.is_empty());
        assert!(out.keepsake.is_none());
        assert!(out.log.is_empty());
    }

    #[test]
    fn keepsake_and_state_together() {
        let out = process("CREATE_KEEPSAKE: Hello\nUPDATE_STATE: {\"coherence\": 0.42}");
        assert_eq!(out.text, "");
        assert_eq!(out.keepsake.as_deref(), Some("Hello"));

        let mut state = InternalState::default();
        let mut keepsake = None;
        let mut log = Vec::new();
        let applied = out.apply(&mut state, &mut keepsake, &mut log);

        assert_eq!(state.get(Dimension::Coherence), 0.42);
        assert_eq!(state.get(Dimension::Novelty), 0.60);
        assert_eq!(keepsake.as_deref(), Some("Hello"));
        assert_eq!(applied.state.applied, vec!["coherence"]);
        assert_eq!(log[0], "Keepsake updated.");
    }

    #[test]
    fn markers_are_stripped_from_surrounding_text() {
        let out = process(
            "I have reached a new insight. UPDATE_STATE: {\"coherence\": 0.9, \"novelty\": 0.75} Onward.",
        );
        assert_eq!(out.text, "I have reached a new insight.  Onward.");
        assert_eq!(out.state_deltas[0]["novelty"], json!(0.75));
    }

    #[test]
    fn keepsake_runs_until_next_marker() {
        let out = process("Noted.\nCREATE_KEEPSAKE:  The sea at dawn. \nUPDATE_STATE: {\"novelty\": 0.8}");
        assert_eq!(out.text, "Noted.");
        assert_eq!(out.keepsake.as_deref(), Some("The sea at dawn."));
        assert_eq!(out.state_deltas.len(), 1);
    }

    #[test]
    fn last_keepsake_wins_and_every_update_applies() {
        let out = process(
            "CREATE_KEEPSAKE: first UPDATE_STATE: {\"novelty\": 0.1} CREATE_KEEPSAKE: second \
             UPDATE_STATE: {\"novelty\": 0.2, \"efficiency\": 0.3}",
        );
        assert_eq!(out.keepsake.as_deref(), Some("second"));

        let mut state = InternalState::default();
        out.apply(&mut state, &mut None, &mut Vec::new());
        assert_eq!(state.get(Dimension::Novelty), 0.2);
        assert_eq!(state.get(Dimension::Efficiency), 0.3);
    }

    #[test]
    fn malformed_json_is_logged_and_removed() {
        let out = process("Thinking. UPDATE_STATE: {\"coherence\": oops} Done.");
        assert_eq!(out.text, "Thinking.  Done.");
        assert!(out.state_deltas.is_empty());
        assert!(out.log[0].starts_with("StateDirectiveParseError"));

        let mut state = InternalState::default();
        out.apply(&mut state, &mut None, &mut Vec::new());
        assert_eq!(state, InternalState::default());
    }

    #[test]
    fn unterminated_json_is_removed_to_next_marker() {
        let out = process("Hi UPDATE_STATE: {\"coherence\": 0.5 CREATE_KEEPSAKE: kept");
        assert_eq!(out.text, "Hi");
        assert!(out.state_deltas.is_empty());
        assert_eq!(out.keepsake.as_deref(), Some("kept"));
        assert_eq!(out.log.len(), 1);
    }

    #[test]
    fn non_object_value_is_rejected() {
        let out = process("UPDATE_STATE: [0.5] after");
        assert_eq!(out.text, "after");
        assert!(out.state_deltas.is_empty());
        assert!(out.log[0].contains("an array"));
    }

    #[test]
    fn marker_inside_json_string_is_not_a_directive() {
        let out = process("UPDATE_STATE: {\"note\": \"CREATE_KEEPSAKE: no\", \"novelty\": 0.5}");
        assert!(out.keepsake.is_none());
        assert_eq!(out.state_deltas.len(), 1);
    }

    #[test]
    fn invalid_fields_are_dropped_individually() {
        let out = process("UPDATE_STATE: {\"coherence\": 1.5, \"novelty\": 0.3, \"mood\": 0.2, \"intrinsicValue\": 1}");
        let mut state = InternalState::default();
        let mut log = Vec::new();
        let applied = out.apply(&mut state, &mut None, &mut log);

        assert_eq!(applied.state.applied, vec!["novelty"]);
        assert_eq!(applied.state.rejected.len(), 3);
        assert_eq!(state.get(Dimension::Coherence), 0.85);
        assert_eq!(log.len(), 4);
    }

    #[test]
    fn empty_keepsake_is_ignored() {
        let out = process("Fine. CREATE_KEEPSAKE:   ");
        assert_eq!(out.text, "Fine.");
        assert!(out.keepsake.is_none());
        assert_eq!(out.log, vec!["Empty CREATE_KEEPSAKE ignored."]);
    }

    #[test]
    fn balanced_end_skips_braces_in_strings() {
        assert_eq!(balanced_end("{\"a\": \"}\"} tail"), Some(10));
        assert_eq!(balanced_end("{\"a\": 1"), None);
        assert_eq!(balanced_end("nope"), None);
    }
}
