//! Wire protocol between the host and a handler module.
//!
//! The handler receives a `HandlerInput` as JSON on its WASI stdin. Whatever it
//! writes to stdout is its return value. Its stderr is the host's stderr.

use serde::{Deserialize, Serialize};

use crate::context::Context;
use crate::event::Event;

/// Input envelope sent to the handler on stdin.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HandlerInput {
    /// The parsed event.
    pub event: Event,
    /// Synthetic execution context.
    pub context: Context,
}

/// Captured output of one handler call.
#[derive(Debug, Clone, Default)]
pub struct HandlerOutput {
    /// Return value, as written to stdout.
    pub stdout: String,
}

/// Default textual form of a handler's return value.
///
/// Trailing line terminators are dropped so the caller's single newline ends
/// the value. Newlines inside the value pass through unchanged, the way a
/// multi-line `toString` would print. A handler that wrote nothing renders
/// as `null`.
pub fn render(output: &HandlerOutput) -> String {
    let value = output.stdout.trim_end_matches(['\n', '\r']);
    if value.is_empty() {
        "null".to_string()
    } else {
        value.to_string()
    }
}
