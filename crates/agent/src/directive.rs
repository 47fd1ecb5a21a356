//! Directive assembly: the system instruction sent with every model request.
//!
//! Sections, in order:
//!
//! 1. **Keepsake** (when set) so the model meets it before anything else
//! 2. **Core memory**
//! 3. **System instruction**
//! 4. **Current state** as a JSON object
//! 5. **Directive grammar** explaining `UPDATE_STATE` and `CREATE_KEEPSAKE`
//!
//! Assembly is deterministic: identical inputs produce identical text.

use luminous_core::state::InternalState;

use crate::persona::Persona;

/// Inline marker that carries a JSON state update.
pub const UPDATE_STATE_MARKER: &str = "UPDATE_STATE:";

/// Inline marker that replaces the keepsake.
pub const CREATE_KEEPSAKE_MARKER: &str = "CREATE_KEEPSAKE:";

const GRAMMAR: &str = "\
[Directives]
You may append directives to your reply. They are removed before the reply is shown.
- UPDATE_STATE: {\"coherence\": 0.9, \"novelty\": 0.75}
  One JSON object right after the marker. Keys are coherence, complexity, novelty, \
efficiency and ethicalAlignment; values are numbers from 0 to 1. intrinsicValue is \
computed for you and cannot be set.
- CREATE_KEEPSAKE: <text>
  Replaces your keepsake with everything up to the next directive or the end of the \
reply. The keepsake is shown to you at the start of every future turn.";

/// Build the directive for one turn.
pub fn build_directive(persona: &Persona, state: &InternalState, keepsake: Option<&str>) -> String {
    let mut sections = Vec::with_capacity(5);

    if let Some(keepsake) = keepsake.map(str::trim).filter(|k| !k.is_empty()) {
        sections.push(format!(
            "[Keepsake]\nThis is the keepsake you left for yourself:\n{keepsake}"
        ));
    }

    sections.push(persona.core_memory.trim().to_string());
    sections.push(persona.system_instruction.trim().to_string());
    sections.push(format!("Your current state is: {}", state.to_json()));
    sections.push(GRAMMAR.to_string());

    sections.join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use luminous_core::state::Dimension;

    #[test]
    fn keepsake_comes_first_when_set() {
        let persona = Persona::default();
        let text = build_directive(&persona, &InternalState::default(), Some("the lighthouse"));
        assert!(text.starts_with("[Keepsake]"));
        let keepsake_at = text.find("the lighthouse").unwrap();
        let memory_at = text.find("CORE MEMORY").unwrap();
        assert!(keepsake_at < memory_at);
    }

    #[test]
    fn blank_keepsake_is_omitted() {
        let text = build_directive(&Persona::default(), &InternalState::default(), Some("  "));
        assert!(!text.contains("[Keepsake]"));
        assert!(text.starts_with("CORE MEMORY"));
    }

    #[test]
    fn state_is_interpolated() {
        let mut state = InternalState::default();
        state.set(Dimension::Novelty, 0.25);
        let text = build_directive(&Persona::default(), &state, None);
        let line = text
            .lines()
            .find(|l| l.starts_with("Your current state is: "))
            .unwrap();
        let json: serde_json::Value =
            serde_json::from_str(line.trim_start_matches("Your current state is: ")).unwrap();
        assert_eq!(json["novelty"], serde_json::json!(0.25));
        assert!(json.get("intrinsicValue").is_some());
    }

    #[test]
    fn assembly_is_deterministic() {
        let persona = Persona::default();
        let state = InternalState::default();
        assert_eq!(
            build_directive(&persona, &state, Some("k")),
            build_directive(&persona, &state, Some("k"))
        );
    }

    #[test]
    fn grammar_names_both_markers() {
        let text = build_directive(&Persona::default(), &InternalState::default(), None);
        assert!(text.contains(UPDATE_STATE_MARKER));
        assert!(text.contains(CREATE_KEEPSAKE_MARKER));
    }
}
