//! The explicit session context passed into every core call.

use serde::{Deserialize, Serialize};

use crate::message::History;
use crate::state::InternalState;

/// Everything one conversation owns: turns, state vector and keepsake.
///
/// This is also the persisted blob shape: `{history, state, keepsake}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Session {
    #[serde(default)]
    pub history: History,

    #[serde(default)]
    pub state: InternalState,

    /// The single long-lived memory blob set by the model
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keepsake: Option<String>,
}

impl Session {
    pub fn new(history: History) -> Self {
        Self {
            history,
            ..Self::default()
        }
    }

    pub fn with_state(mut self, state: InternalState) -> Self {
        self.state = state;
        self
    }

    pub fn with_keepsake(mut self, keepsake: Option<String>) -> Self {
        self.keepsake = keepsake.filter(|k| !k.trim().is_empty());
        self
    }
}
