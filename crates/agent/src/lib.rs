//! The orchestration core of Luminous.
//!
//! One advance follows a **directive → call → act → observe** cycle:
//!
//! 1. **Append** the operator message (or a synthetic reflection prompt)
//! 2. **Build the directive** from persona text, current state and keepsake
//! 3. **Call the model** via the configured provider
//! 4. **If it requests capabilities**: run them, append the results, go to 3
//! 5. **Otherwise** strip and apply the inline directives, then commit
//!
//! The loop stops on a reply without invocations, or fails once the round
//! limit or the wall-clock deadline is reached.

pub mod directive;
pub mod loop_runner;
pub mod persona;
pub mod post_process;
pub mod session;

#[cfg(test)]
mod test_helpers;

pub use directive::build_directive;
pub use loop_runner::{AdvanceFailure, AdvanceOutcome, AgentLoop, Input};
pub use persona::Persona;
pub use post_process::{Processed, process};
pub use session::{Exchange, SessionRunner};
