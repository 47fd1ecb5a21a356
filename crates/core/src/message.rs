//! Turn and History domain types.
//!
//! A conversation is an append-only sequence of role-tagged turns. Each turn
//! holds ordered parts: plain text, a capability invocation requested by the
//! model, or the result of executing one.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Error;
use crate::tool::{ToolCall, ToolResult};

/// The role of a turn's author.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The human operator (or a synthetic reflection prompt)
    User,
    /// The language model
    Model,
    /// Capability results fed back to the model
    Tool,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::User => write!(f, "user"),
            Role::Model => write!(f, "model"),
            Role::Tool => write!(f, "tool"),
        }
    }
}

/// One content block inside a turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Part {
    Text(String),
    FunctionCall(ToolCall),
    FunctionResponse(ToolResult),
}

/// A single role-tagged unit of conversation content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    /// Unique turn ID
    #[serde(default = "new_turn_id")]
    pub id: String,

    /// Who produced this turn
    pub role: Role,

    /// Ordered content parts
    pub parts: Vec<Part>,

    /// Timestamp
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

fn new_turn_id() -> String {
    Uuid::new_v4().to_string()
}

impl Turn {
    fn with_parts(role: Role, parts: Vec<Part>) -> Self {
        Self {
            id: new_turn_id(),
            role,
            parts,
            timestamp: Utc::now(),
        }
    }

    /// Create a user turn holding plain text.
    pub fn user(text: impl Into<String>) -> Self {
        Self::with_parts(Role::User, vec![Part::Text(text.into())])
    }

    /// Create a model turn holding plain text.
    pub fn model(text: impl Into<String>) -> Self {
        Self::with_parts(Role::Model, vec![Part::Text(text.into())])
    }

    /// Create a model turn with arbitrary parts (text and/or invocations).
    pub fn model_parts(parts: Vec<Part>) -> Self {
        Self::with_parts(Role::Model, parts)
    }

    /// Create a tool turn bundling results in invocation order.
    pub fn tool_results(results: Vec<ToolResult>) -> Self {
        Self::with_parts(
            Role::Tool,
            results.into_iter().map(Part::FunctionResponse).collect(),
        )
    }

    /// Concatenated text of all text parts.
    pub fn text(&self) -> String {
        self.parts
            .iter()
            .filter_map(|p| match p {
                Part::Text(t) => Some(t.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("")
    }

    /// Capability invocations requested in this turn, in order.
    pub fn invocations(&self) -> Vec<&ToolCall> {
        self.parts
            .iter()
            .filter_map(|p| match p {
                Part::FunctionCall(c) => Some(c),
                _ => None,
            })
            .collect()
    }

    pub fn has_invocations(&self) -> bool {
        self.parts.iter().any(|p| matches!(p, Part::FunctionCall(_)))
    }

    /// Capability results carried by this turn, in order.
    pub fn results(&self) -> Vec<&ToolResult> {
        self.parts
            .iter()
            .filter_map(|p| match p {
                Part::FunctionResponse(r) => Some(r),
                _ => None,
            })
            .collect()
    }
}

/// The ordered turn history of one session.
///
/// Tool turns are only accepted directly after a model turn that requested
/// capabilities, with exactly one result per invocation in the same order.
/// Deserialization applies the same check.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Turn>", into = "Vec<Turn>")]
pub struct History {
    turns: Vec<Turn>,
}

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn last(&self) -> Option<&Turn> {
        self.turns.last()
    }

    /// Append a user or model turn.
    pub fn push(&mut self, turn: Turn) -> Result<(), Error> {
        if turn.role == Role::Tool {
            let results = turn.results().into_iter().cloned().collect();
            return self.push_tool_results(results);
        }
        self.turns.push(turn);
        Ok(())
    }

    /// Append a tool turn answering the invocations of the last model turn.
    pub fn push_tool_results(&mut self, results: Vec<ToolResult>) -> Result<(), Error> {
        let turn = Turn::tool_results(results);
        check_tool_turn(self.turns.last(), &turn)?;
        self.turns.push(turn);
        Ok(())
    }

    /// Drop every turn after the first `len`.
    pub fn truncate(&mut self, len: usize) {
        self.turns.truncate(len);
    }

    /// Turns of one role, most recent last.
    pub fn by_role(&self, role: Role) -> impl Iterator<Item = &Turn> {
        self.turns.iter().filter(move |t| t.role == role)
    }
}

fn check_tool_turn(previous: Option<&Turn>, turn: &Turn) -> Result<(), Error> {
    let previous = previous
        .filter(|p| p.role == Role::Model && p.has_invocations())
        .ok_or_else(|| {
            Error::Internal("tool turn must follow a model turn with invocations".into())
        })?;

    if turn.parts.iter().any(|p| !matches!(p, Part::FunctionResponse(_))) {
        return Err(Error::Internal("tool turn may only hold results".into()));
    }

    let invocations = previous.invocations();
    let results = turn.results();
    if invocations.len() != results.len() {
        return Err(Error::Internal(format!(
            "tool turn has {} results for {} invocations",
            results.len(),
            invocations.len()
        )));
    }

    for (call, result) in invocations.iter().zip(results.iter()) {
        if call.id != result.call_id || call.name != result.name {
            return Err(Error::Internal(format!(
                "result '{}' ({}) does not answer invocation '{}' ({})",
                result.name, result.call_id, call.name, call.id
            )));
        }
    }
    Ok(())
}

impl TryFrom<Vec<Turn>> for History {
    type Error = Error;

    fn try_from(turns: Vec<Turn>) -> Result<Self, Self::Error> {
        let mut history = History::new();
        for turn in turns {
            history.push(turn)?;
        }
        Ok(history)
    }
}

impl From<History> for Vec<Turn> {
    fn from(history: History) -> Self {
        history.turns
    }
}
