//! Reading and parsing the input event.

use std::io::Read;
use std::path::Path;

use serde_json::{Map, Value};
use tracing::debug;

use crate::error::{InvokeError, Result};

/// The parsed event: a string-keyed mapping of JSON values.
pub type Event = Map<String, Value>;

/// Drain standard input to end-of-stream as UTF-8 text.
pub fn read_input() -> Result<String> {
    read_input_from(std::io::stdin().lock())
}

/// Drain any reader to end-of-stream as UTF-8 text.
pub fn read_input_from<R: Read>(mut reader: R) -> Result<String> {
    let mut input = String::new();
    reader
        .read_to_string(&mut input)
        .map_err(InvokeError::ReadInput)?;
    debug!(bytes = input.len(), "Read event input");
    Ok(input)
}

/// Read the event text from a file instead of standard input.
pub fn read_event_file(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).map_err(|e| InvokeError::ReadEventFile {
        path: path.to_path_buf(),
        source: e,
    })
}

/// Parse event text into a mapping.
///
/// Empty and whitespace-only text are rejected, as is any JSON document
/// other than an object.
pub fn parse_event(text: &str) -> Result<Event> {
    serde_json::from_str(text).map_err(InvokeError::ParseEvent)
}
